//! The standard `echo` tag: `{{ ... }}` in tag form, for use inside
//! `{% liquid %}` blocks.

use crate::{
    ast::{write_expression, write_expression_async, Node},
    context::RenderContext,
    error::Result,
    expression::{self, Expression},
    output::Output,
    parser::Parser,
    stream::MarkupStream,
    tags::Tag,
    token::Span,
};
use futures::future::BoxFuture;

/// An `{% echo expr %}` node.
#[derive(Debug)]
pub struct EchoNode {
    /// The source range of the tag.
    pub span: Span,
    /// The filtered expression to write.
    pub expression: Expression,
}

impl Node for EchoNode {
    fn span(&self) -> Span {
        self.span
    }

    fn tag_name(&self) -> Option<&str> {
        Some("echo")
    }

    fn render_to_output(&self, ctx: &mut RenderContext<'_>, out: &mut Output) -> Result<usize> {
        write_expression(&self.expression, ctx, out)
    }

    fn render_to_output_async<'a, 'env: 'a>(
        &'a self,
        ctx: &'a mut RenderContext<'env>,
        out: &'a mut Output,
    ) -> BoxFuture<'a, Result<usize>> {
        Box::pin(write_expression_async(&self.expression, ctx, out))
    }

    fn expressions(&self) -> Vec<&Expression> {
        vec![&self.expression]
    }
}

/// The standard `echo` tag.
#[derive(Debug)]
pub struct EchoTag;

impl Tag for EchoTag {
    fn parse(&self, stream: &mut MarkupStream, parser: &Parser<'_>) -> Result<Box<dyn Node>> {
        let span = stream.current().span();
        let mut tokens = stream.tag_expression()?;
        let expression = expression::parse_filtered(&mut tokens)?;
        tokens.expect_eos()?;
        parser.validate_filters(&expression)?;
        Ok(Box::new(EchoNode { span, expression }))
    }
}
