//! The standard `cycle` tag.

use crate::{
    ast::{write_expression, Node},
    context::RenderContext,
    error::{Error, Result},
    expression::{self, Expression},
    output::Output,
    parser::Parser,
    stream::MarkupStream,
    tags::Tag,
    token::{Span, TokenKind},
};
use std::hash::{Hash, Hasher};

/// A `{% cycle (name:)? a, b, c %}` node.
#[derive(Debug)]
pub struct CycleNode {
    /// The source range of the tag.
    pub span: Span,
    /// The optional group name.
    pub name: Option<String>,
    /// The expressions cycled through.
    pub items: Vec<Expression>,
    /// A stable fingerprint of the group name and item list.
    cycle_hash: u64,
}

impl CycleNode {
    fn new(span: Span, name: Option<String>, items: Vec<Expression>) -> Self {
        // State is keyed by the group name and the item list's source
        // form, so identical cycle tags share a cursor.
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        name.hash(&mut hasher);
        for item in &items {
            item.to_string().hash(&mut hasher);
        }
        let cycle_hash = hasher.finish();

        Self {
            span,
            name,
            items,
            cycle_hash,
        }
    }
}

impl Node for CycleNode {
    fn span(&self) -> Span {
        self.span
    }

    fn tag_name(&self) -> Option<&str> {
        Some("cycle")
    }

    fn render_to_output(&self, ctx: &mut RenderContext<'_>, out: &mut Output) -> Result<usize> {
        let index = ctx.cycle(self.cycle_hash, self.items.len());
        write_expression(&self.items[index], ctx, out)
    }

    fn expressions(&self) -> Vec<&Expression> {
        self.items.iter().collect()
    }
}

/// The standard `cycle` tag.
#[derive(Debug)]
pub struct CycleTag;

impl Tag for CycleTag {
    fn parse(&self, stream: &mut MarkupStream, _parser: &Parser<'_>) -> Result<Box<dyn Node>> {
        let span = stream.current().span();
        let mut tokens = stream.tag_expression()?;

        // A group name is a leading primary followed by a colon.
        let name = if tokens.peek().is_kind(TokenKind::Colon) {
            let name = expression::parse_string_or_identifier(tokens.next())?;
            tokens.next(); // the colon
            Some(name.name)
        } else {
            None
        };

        let mut items = vec![expression::parse_primary(&mut tokens)?];

        loop {
            let token = tokens.next();
            match token.kind() {
                Some(TokenKind::Eoi) => break,
                Some(TokenKind::Comma) => {}
                _ => {
                    return Err(Error::syntax(
                        format!("expected a comma separated list, found {}", token.description()),
                        token.span(),
                    ))
                }
            }

            // Trailing commas are fine.
            if tokens.at_end() {
                break;
            }
            items.push(expression::parse_primary(&mut tokens)?);
        }

        Ok(Box::new(CycleNode::new(span, name, items)))
    }
}
