//! The standard `if` tag.

use crate::{
    ast::{render_flow_block, render_flow_block_async, BlockNode, ConditionalBlockNode, Node},
    context::RenderContext,
    error::{Error, Result},
    expression::{self, Expression},
    output::Output,
    parser::Parser,
    stream::{ExprStream, MarkupStream},
    tags::Tag,
    token::{Markup, Span},
};
use futures::future::BoxFuture;

/// An `{% if %}` node with its `elsif` and `else` branches. Also the
/// node behind `unless`, which negates the opening condition.
#[derive(Debug)]
pub struct IfNode {
    /// The tag this node renders for: `if` or `unless`.
    pub tag: &'static str,
    /// The source range of the opening tag.
    pub span: Span,
    /// The `if` condition.
    pub condition: Expression,
    /// The block rendered when the condition holds.
    pub consequence: BlockNode,
    /// The `elsif` branches, in order.
    pub alternatives: Vec<ConditionalBlockNode>,
    /// The `else` branch.
    pub default: Option<BlockNode>,
}

impl IfNode {
    fn choose_block(&self, ctx: &mut RenderContext<'_>) -> Result<Option<&BlockNode>> {
        if self.condition.evaluate(ctx)?.is_truthy() {
            return Ok(Some(&self.consequence));
        }
        for alternative in &self.alternatives {
            if alternative.condition.evaluate(ctx)?.is_truthy() {
                return Ok(Some(&alternative.block));
            }
        }
        Ok(self.default.as_ref())
    }
}

impl Node for IfNode {
    fn span(&self) -> Span {
        self.span
    }

    fn tag_name(&self) -> Option<&str> {
        Some(self.tag)
    }

    fn render_to_output(&self, ctx: &mut RenderContext<'_>, out: &mut Output) -> Result<usize> {
        match self.choose_block(ctx)? {
            Some(block) => render_flow_block(block, ctx, out),
            None => Ok(0),
        }
    }

    fn render_to_output_async<'a, 'env: 'a>(
        &'a self,
        ctx: &'a mut RenderContext<'env>,
        out: &'a mut Output,
    ) -> BoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            match self.choose_block(ctx)? {
                Some(block) => render_flow_block_async(block, ctx, out).await,
                None => Ok(0),
            }
        })
    }

    fn children(&self) -> Vec<&dyn Node> {
        let mut children: Vec<&dyn Node> = vec![&self.consequence];
        for alternative in &self.alternatives {
            children.push(alternative);
        }
        if let Some(default) = &self.default {
            children.push(default);
        }
        children
    }

    fn expressions(&self) -> Vec<&Expression> {
        vec![&self.condition]
    }
}

/// The standard `if` tag.
#[derive(Debug)]
pub struct IfTag;

impl Tag for IfTag {
    fn block(&self) -> bool {
        true
    }

    fn end_block(&self) -> &'static [&'static str] {
        &["endif", "elsif", "else"]
    }

    fn parse(&self, stream: &mut MarkupStream, parser: &Parser<'_>) -> Result<Box<dyn Node>> {
        let (span, condition) = parse_condition(stream)?;
        let node = parse_branches(stream, parser, "if", span, condition, self.end_block(), "endif")?;
        Ok(Box::new(node))
    }
}

/// Parses the opening tag's boolean condition, consuming the tag.
pub(super) fn parse_condition(stream: &mut MarkupStream) -> Result<(Span, Expression)> {
    let Markup::Tag {
        span, expression, ..
    } = stream.next()
    else {
        return Err(Error::syntax("expected a tag", Span::default()));
    };

    let mut tokens = ExprStream::new(expression, span);
    let condition = expression::parse_boolean(&mut tokens)?;
    tokens.expect_eos()?;
    Ok((span, condition))
}

/// Parses the branch structure shared by `if` and `unless`: a
/// consequence block, `elsif` arms and an optional `else`.
pub(super) fn parse_branches(
    stream: &mut MarkupStream,
    parser: &Parser<'_>,
    tag: &'static str,
    span: Span,
    condition: Expression,
    end_block: &[&str],
    end_name: &str,
) -> Result<IfNode> {
    let block_span = stream.current().span();
    let consequence = BlockNode {
        span: block_span,
        nodes: parser.parse_block(stream, end_block)?,
    };

    let mut alternatives = Vec::new();
    while stream.current().is_tag("elsif") {
        let (alt_span, alt_condition) = parse_condition(stream)?;
        let block = BlockNode {
            span: alt_span,
            nodes: parser.parse_block(stream, end_block)?,
        };
        alternatives.push(ConditionalBlockNode {
            span: alt_span,
            condition: alt_condition,
            block,
        });
    }

    let mut default = None;
    if stream.current().is_tag("else") {
        let else_span = stream.current().span();
        stream.next();
        default = Some(BlockNode {
            span: else_span,
            nodes: parser.parse_block(stream, end_block)?,
        });
    }

    if !stream.current().is_eoi() {
        stream.expect_tag(end_name)?;
    }

    Ok(IfNode {
        tag,
        span,
        condition,
        consequence,
        alternatives,
        default,
    })
}
