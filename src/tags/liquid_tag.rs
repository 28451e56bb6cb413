//! The `{% liquid %}` line-statement block.
//!
//! The lexer turns the block into a list of per-line tag and comment
//! tokens; the statement parser assembles them here like any other
//! stream, so block tags may span lines.

use crate::{
    ast::Node,
    context::RenderContext,
    error::Result,
    output::Output,
    token::Span,
};
use futures::future::BoxFuture;

/// A `{% liquid ... %}` node.
#[derive(Debug)]
pub struct LiquidNode {
    /// The source range of the whole block.
    pub span: Span,
    /// The parsed statements.
    pub nodes: Vec<Box<dyn Node>>,
}

impl Node for LiquidNode {
    fn span(&self) -> Span {
        self.span
    }

    fn tag_name(&self) -> Option<&str> {
        Some("liquid")
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
