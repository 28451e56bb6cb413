//! The standard `case` tag.

use crate::{
    ast::{render_flow_block, render_flow_block_async, BlockNode, Node},
    context::RenderContext,
    error::{Error, Result},
    expression::{self, Expression},
    output::Output,
    parser::Parser,
    stream::{ExprStream, MarkupStream},
    tags::Tag,
    token::{Markup, Span, TokenKind},
    value::liquid_eq,
};
use futures::future::BoxFuture;

/// One `{% when a, b or c %}` arm.
#[derive(Debug)]
pub struct WhenArm {
    /// The source range of the `when` tag.
    pub span: Span,
    /// The candidate values; the arm matches when any equals the `case`
    /// subject.
    pub values: Vec<Expression>,
    /// The arm's block.
    pub block: BlockNode,
}

/// A `{% case %}` node.
///
/// Every matching arm renders, not just the first; the `else` block
/// renders only when no arm matched.
#[derive(Debug)]
pub struct CaseNode {
    /// The source range of the opening tag.
    pub span: Span,
    /// The subject expression.
    pub left: Expression,
    /// The `when` arms, in order.
    pub whens: Vec<WhenArm>,
    /// The `else` block.
    pub default: Option<BlockNode>,
}

impl CaseNode {
    fn matching_arms(&self, ctx: &mut RenderContext<'_>) -> Result<Vec<&WhenArm>> {
        let left = self.left.evaluate(ctx)?;
        let mut matched = Vec::new();
        for arm in &self.whens {
            for value in &arm.values {
                if liquid_eq(&left, &value.evaluate(ctx)?) {
                    matched.push(arm);
                    break;
                }
            }
        }
        Ok(matched)
    }
}

impl Node for CaseNode {
    fn span(&self) -> Span {
        self.span
    }

    fn tag_name(&self) -> Option<&str> {
        Some("case")
    }

    fn render_to_output(&self, ctx: &mut RenderContext<'_>, out: &mut Output) -> Result<usize> {
        let arms = self.matching_arms(ctx)?;
        let mut count = 0;

        if arms.is_empty() {
            if let Some(default) = &self.default {
                count += render_flow_block(default, ctx, out)?;
            }
            return Ok(count);
        }

        for arm in arms {
            count += render_flow_block(&arm.block, ctx, out)?;
        }
        Ok(count)
    }

    fn render_to_output_async<'a, 'env: 'a>(
        &'a self,
        ctx: &'a mut RenderContext<'env>,
        out: &'a mut Output,
    ) -> BoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            let arms = self.matching_arms(ctx)?;
            let mut count = 0;

            if arms.is_empty() {
                if let Some(default) = &self.default {
                    count += render_flow_block_async(default, ctx, out).await?;
                }
                return Ok(count);
            }

            for arm in arms {
                count += render_flow_block_async(&arm.block, ctx, out).await?;
            }
            Ok(count)
        })
    }

    fn children(&self) -> Vec<&dyn Node> {
        let mut children: Vec<&dyn Node> =
            self.whens.iter().map(|arm| &arm.block as &dyn Node).collect();
        if let Some(default) = &self.default {
            children.push(default);
        }
        children
    }

    fn expressions(&self) -> Vec<&Expression> {
        let mut exprs = vec![&self.left];
        for arm in &self.whens {
            exprs.extend(arm.values.iter());
        }
        exprs
    }
}

/// The standard `case` tag.
#[derive(Debug)]
pub struct CaseTag;

impl Tag for CaseTag {
    fn block(&self) -> bool {
        true
    }

    fn end_block(&self) -> &'static [&'static str] {
        &["endcase", "when", "else"]
    }

    fn parse(&self, stream: &mut MarkupStream, parser: &Parser<'_>) -> Result<Box<dyn Node>> {
        let Markup::Tag {
            span, expression, ..
        } = stream.next()
        else {
            return Err(Error::syntax("expected a tag", Span::default()));
        };

        let mut tokens = ExprStream::new(expression, span);
        let left = expression::parse_primary(&mut tokens)?;
        tokens.expect_eos()?;

        // Nothing but whitespace and comments may sit between `case` and
        // the first `when` or `else`.
        loop {
            match stream.current() {
                Markup::Content { text, span, .. } => {
                    if !text.chars().all(char::is_whitespace) {
                        return Err(Error::syntax("unexpected text after 'case' tag", *span));
                    }
                    stream.next();
                }
                Markup::Comment { .. } => {
                    stream.next();
                }
                Markup::Tag { name, span, .. } => {
                    if !self.end_block().contains(&name.as_str()) {
                        return Err(Error::syntax(
                            format!("expected a 'when' tag, found '{name}'"),
                            *span,
                        ));
                    }
                    break;
                }
                other => {
                    return Err(Error::syntax(
                        "unexpected markup after 'case' tag",
                        other.span(),
                    ))
                }
            }
        }

        let mut whens = Vec::new();
        while stream.current().is_tag("when") {
            let Markup::Tag {
                span: when_span,
                expression,
                ..
            } = stream.next()
            else {
                unreachable!()
            };

            let mut tokens = ExprStream::new(expression, when_span);
            let values = parse_when_values(&mut tokens)?;
            let block = BlockNode {
                span: when_span,
                nodes: parser.parse_block(stream, self.end_block())?,
            };
            whens.push(WhenArm {
                span: when_span,
                values,
                block,
            });
        }

        let mut default = None;
        if stream.current().is_tag("else") {
            let else_span = stream.current().span();
            stream.next();
            default = Some(BlockNode {
                span: else_span,
                nodes: parser.parse_block(stream, self.end_block())?,
            });
        }

        stream.expect_tag("endcase")?;

        Ok(Box::new(CaseNode {
            span,
            left,
            whens,
            default,
        }))
    }
}

/// Parses a `when` tag's candidate list: primaries separated by commas
/// or the `or` keyword.
fn parse_when_values(tokens: &mut ExprStream) -> Result<Vec<Expression>> {
    let mut values = vec![expression::parse_primary(tokens)?];
    while tokens.is_kind(TokenKind::Comma) || tokens.is_kind(TokenKind::Or) {
        tokens.next();
        values.push(expression::parse_primary(tokens)?);
    }
    tokens.expect_eos()?;
    Ok(values)
}
