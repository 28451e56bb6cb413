//! The standard `increment` and `decrement` tags.

use crate::{
    ast::Node,
    context::RenderContext,
    error::Result,
    expression::{self, Identifier},
    output::Output,
    parser::Parser,
    stream::MarkupStream,
    tags::Tag,
    token::Span,
};

fn parse_counter_name(stream: &mut MarkupStream) -> Result<(Span, Identifier)> {
    let span = stream.current().span();
    let mut tokens = stream.tag_expression()?;
    let name = expression::parse_string_or_identifier(tokens.next())?;
    tokens.expect_eos()?;
    Ok((span, name))
}

/// An `{% increment name %}` node. Outputs the counter value before the
/// increment.
#[derive(Debug)]
pub struct IncrementNode {
    /// The source range of the tag.
    pub span: Span,
    /// The counter name.
    pub name: Identifier,
}

impl Node for IncrementNode {
    fn span(&self) -> Span {
        self.span
    }

    fn tag_name(&self) -> Option<&str> {
        Some("increment")
    }

    fn render_to_output(&self, ctx: &mut RenderContext<'_>, out: &mut Output) -> Result<usize> {
        let value = ctx.increment(&self.name.name);
        out.write(&value.to_string())
    }

    fn template_scope(&self) -> Vec<Identifier> {
        vec![self.name.clone()]
    }
}

/// The standard `increment` tag.
#[derive(Debug)]
pub struct IncrementTag;

impl Tag for IncrementTag {
    fn parse(&self, stream: &mut MarkupStream, _parser: &Parser<'_>) -> Result<Box<dyn Node>> {
        let (span, name) = parse_counter_name(stream)?;
        Ok(Box::new(IncrementNode { span, name }))
    }
}

/// A `{% decrement name %}` node. Outputs the counter value after the
/// decrement.
#[derive(Debug)]
pub struct DecrementNode {
    /// The source range of the tag.
    pub span: Span,
    /// The counter name.
    pub name: Identifier,
}

impl Node for DecrementNode {
    fn span(&self) -> Span {
        self.span
    }

    fn tag_name(&self) -> Option<&str> {
        Some("decrement")
    }

    fn render_to_output(&self, ctx: &mut RenderContext<'_>, out: &mut Output) -> Result<usize> {
        let value = ctx.decrement(&self.name.name);
        out.write(&value.to_string())
    }

    fn template_scope(&self) -> Vec<Identifier> {
        vec![self.name.clone()]
    }
}

/// The standard `decrement` tag.
#[derive(Debug)]
pub struct DecrementTag;

impl Tag for DecrementTag {
    fn parse(&self, stream: &mut MarkupStream, _parser: &Parser<'_>) -> Result<Box<dyn Node>> {
        let (span, name) = parse_counter_name(stream)?;
        Ok(Box::new(DecrementNode { span, name }))
    }
}
