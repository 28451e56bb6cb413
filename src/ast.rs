//! Base contracts for all template nodes.

use crate::{
    context::RenderContext,
    error::{Error, Result},
    expression::{Expression, Identifier},
    output::Output,
    token::Span,
    value::to_liquid_string,
};
use core::fmt;
use futures::future::BoxFuture;

/// A node in a parsed template's syntax tree.
///
/// Nodes render themselves and expose their children, expressions and
/// introduced names to the static analyzer.
pub trait Node: fmt::Debug + Send + Sync {
    /// The source range of the markup this node was parsed from.
    fn span(&self) -> Span;

    /// The tag name this node renders for, used by the disabled-tag
    /// check. `None` for nodes that are not tags.
    fn tag_name(&self) -> Option<&str> {
        None
    }

    /// Writes this node's output, after checking the context's disabled
    /// tag set.
    fn render(&self, ctx: &mut RenderContext<'_>, out: &mut Output) -> Result<usize> {
        self.check_disabled(ctx)?;
        self.render_to_output(ctx, out)
    }

    /// An async version of [`Node::render`].
    fn render_async<'a, 'env: 'a>(
        &'a self,
        ctx: &'a mut RenderContext<'env>,
        out: &'a mut Output,
    ) -> BoxFuture<'a, Result<usize>> {
        if let Err(err) = self.check_disabled(ctx) {
            return Box::pin(core::future::ready(Err(err)));
        }
        self.render_to_output_async(ctx, out)
    }

    /// Writes this node's output. Implementations return the number of
    /// bytes written.
    fn render_to_output(&self, ctx: &mut RenderContext<'_>, out: &mut Output) -> Result<usize>;

    /// An async version of [`Node::render_to_output`]. The default
    /// delegates to the synchronous renderer; containers, outputs and
    /// partial loaders override this so awaits propagate.
    fn render_to_output_async<'a, 'env: 'a>(
        &'a self,
        ctx: &'a mut RenderContext<'env>,
        out: &'a mut Output,
    ) -> BoxFuture<'a, Result<usize>> {
        Box::pin(core::future::ready(self.render_to_output(ctx, out)))
    }

    /// Raises a `DisabledTagError` if this node's tag is in the
    /// context's disabled set.
    fn check_disabled(&self, ctx: &RenderContext<'_>) -> Result<()> {
        if let Some(name) = self.tag_name() {
            if ctx.is_tag_disabled(name) {
                return Err(Error::DisabledTag {
                    name: name.to_string(),
                    span: self.span(),
                });
            }
        }
        Ok(())
    }

    /// This node's child nodes.
    fn children(&self) -> Vec<&dyn Node> {
        Vec::new()
    }

    /// The expressions this node evaluates.
    fn expressions(&self) -> Vec<&Expression> {
        Vec::new()
    }

    /// Names this node introduces into the enclosing template scope.
    fn template_scope(&self) -> Vec<Identifier> {
        Vec::new()
    }

    /// Names this node introduces only inside its own children.
    fn block_scope(&self) -> Vec<Identifier> {
        Vec::new()
    }

    /// Information about a partial template this node loads.
    fn partial_scope(&self) -> Option<Partial<'_>> {
        None
    }

    /// The inheritance fragment this node defines, if it is a `block`
    /// tag: its name, required flag and shared body.
    fn block_fragment(&self) -> Option<(Identifier, bool, std::sync::Arc<BlockNode>)> {
        None
    }
}

/// The kind of scope a partial template has when loaded.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PartialScope {
    /// The partial shares the loading template's scope.
    Shared,
    /// The partial sees only the names named by the loading tag.
    Isolated,
    /// The partial inherits the full scope chain.
    Inherited,
}

/// Metadata about a partial template loaded by a node.
#[derive(Debug)]
pub struct Partial<'a> {
    /// The expression resolving to the partial's name.
    pub name: &'a Expression,
    /// The kind of scope the partial is rendered with.
    pub scope: PartialScope,
    /// Names the loading tag adds to the partial's scope.
    pub in_scope: Vec<Identifier>,
}

/// A sequence of nodes rendered in order.
#[derive(Debug)]
pub struct BlockNode {
    /// The source range of the block's opening markup.
    pub span: Span,
    /// The block's nodes.
    pub nodes: Vec<Box<dyn Node>>,
}

impl Node for BlockNode {
    fn span(&self) -> Span {
        self.span
    }

    fn render_to_output(&self, ctx: &mut RenderContext<'_>, out: &mut Output) -> Result<usize> {
        let mut count = 0;
        for node in &self.nodes {
            count += node.render(ctx, out)?;
        }
        Ok(count)
    }

    fn render_to_output_async<'a, 'env: 'a>(
        &'a self,
        ctx: &'a mut RenderContext<'env>,
        out: &'a mut Output,
    ) -> BoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            let mut count = 0;
            for node in &self.nodes {
                count += node.render_async(ctx, out).await?;
            }
            Ok(count)
        })
    }

    fn children(&self) -> Vec<&dyn Node> {
        self.nodes.iter().map(AsRef::as_ref).collect()
    }
}

/// A block guarded by a boolean expression, such as an `elsif` arm.
#[derive(Debug)]
pub struct ConditionalBlockNode {
    /// The source range of the arm's opening markup.
    pub span: Span,
    /// The guard expression.
    pub condition: Expression,
    /// The guarded block.
    pub block: BlockNode,
}

impl Node for ConditionalBlockNode {
    fn span(&self) -> Span {
        self.span
    }

    fn render_to_output(&self, ctx: &mut RenderContext<'_>, out: &mut Output) -> Result<usize> {
        if self.condition.evaluate(ctx)?.is_truthy() {
            self.block.render(ctx, out)
        } else {
            Ok(0)
        }
    }

    fn render_to_output_async<'a, 'env: 'a>(
        &'a self,
        ctx: &'a mut RenderContext<'env>,
        out: &'a mut Output,
    ) -> BoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            if self.condition.evaluate_async(ctx).await?.is_truthy() {
                self.block.render_async(ctx, out).await
            } else {
                Ok(0)
            }
        })
    }

    fn children(&self) -> Vec<&dyn Node> {
        vec![&self.block]
    }

    fn expressions(&self) -> Vec<&Expression> {
        vec![&self.condition]
    }
}

/// Renders `block`, discarding the output when the environment is
/// configured to suppress whitespace-only control-flow output.
pub(crate) fn render_flow_block(
    block: &BlockNode,
    ctx: &mut RenderContext<'_>,
    out: &mut Output,
) -> Result<usize> {
    if !ctx.env().suppress_blank_control_flow_blocks {
        return block.render(ctx, out);
    }

    let mut buf = Output::new(out.limit().map(|limit| limit.saturating_sub(out.len())));
    block.render(ctx, &mut buf)?;
    let text = buf.into_string();
    if text.chars().all(char::is_whitespace) {
        Ok(0)
    } else {
        out.write(&text)
    }
}

/// An async version of [`render_flow_block`].
pub(crate) async fn render_flow_block_async(
    block: &BlockNode,
    ctx: &mut RenderContext<'_>,
    out: &mut Output,
) -> Result<usize> {
    if !ctx.env().suppress_blank_control_flow_blocks {
        return block.render_async(ctx, out).await;
    }

    let mut buf = Output::new(out.limit().map(|limit| limit.saturating_sub(out.len())));
    block.render_async(ctx, &mut buf).await?;
    let text = buf.into_string();
    if text.chars().all(char::is_whitespace) {
        Ok(0)
    } else {
        out.write(&text)
    }
}

/// Evaluates an expression and writes its stringified value.
pub(crate) fn write_expression(
    expr: &Expression,
    ctx: &mut RenderContext<'_>,
    out: &mut Output,
) -> Result<usize> {
    let value = expr.evaluate(ctx)?;
    out.write(&to_liquid_string(&value, ctx.auto_escape()))
}

/// An async version of [`write_expression`].
pub(crate) async fn write_expression_async(
    expr: &Expression,
    ctx: &mut RenderContext<'_>,
    out: &mut Output,
) -> Result<usize> {
    let value = expr.evaluate_async(ctx).await?;
    out.write(&to_liquid_string(&value, ctx.auto_escape()))
}
