//! The standard `unless` tag: `if` with a negated opening condition.

use crate::{
    ast::Node,
    error::Result,
    expression::Expression,
    parser::Parser,
    stream::MarkupStream,
    tags::{
        if_tag::{parse_branches, parse_condition},
        Tag,
    },
};

/// The standard `unless` tag.
///
/// `elsif` and `else` branches behave exactly as they do in `if`; only
/// the opening condition is inverted.
#[derive(Debug)]
pub struct UnlessTag;

impl Tag for UnlessTag {
    fn block(&self) -> bool {
        true
    }

    fn end_block(&self) -> &'static [&'static str] {
        &["endunless", "elsif", "else"]
    }

    fn parse(&self, stream: &mut MarkupStream, parser: &Parser<'_>) -> Result<Box<dyn Node>> {
        let (span, condition) = parse_condition(stream)?;
        let condition = Expression::Not {
            expr: Box::new(condition),
            span,
        };
        let node = parse_branches(
            stream,
            parser,
            "unless",
            span,
            condition,
            self.end_block(),
            "endunless",
        )?;
        Ok(Box::new(node))
    }
}
