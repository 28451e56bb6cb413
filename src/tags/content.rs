//! Nodes for content, comments, raw blocks and output statements.
//!
//! These have no named tag; the statement parser builds them directly
//! from their markup tokens.

use crate::{
    ast::{write_expression, write_expression_async, Node},
    context::RenderContext,
    error::Result,
    expression::Expression,
    output::Output,
    token::Span,
};
use futures::future::BoxFuture;

/// Literal template text, with whitespace control already applied.
#[derive(Debug)]
pub struct ContentNode {
    /// The source range of the text.
    pub span: Span,
    /// The trimmed text.
    pub text: String,
}

impl Node for ContentNode {
    fn span(&self) -> Span {
        self.span
    }

    fn render_to_output(&self, _ctx: &mut RenderContext<'_>, out: &mut Output) -> Result<usize> {
        out.write(&self.text)
    }
}

/// A `{# ... #}` comment. Renders nothing.
#[derive(Debug)]
pub struct CommentNode {
    /// The source range of the comment.
    pub span: Span,
    /// The comment text.
    pub text: String,
}

impl Node for CommentNode {
    fn span(&self) -> Span {
        self.span
    }

    fn render_to_output(&self, _ctx: &mut RenderContext<'_>, _out: &mut Output) -> Result<usize> {
        Ok(0)
    }
}

/// The interior of a `{% raw %}` block, emitted verbatim.
#[derive(Debug)]
pub struct RawNode {
    /// The source range of the whole construct.
    pub span: Span,
    /// The opaque text.
    pub text: String,
}

impl Node for RawNode {
    fn span(&self) -> Span {
        self.span
    }

    fn render_to_output(&self, _ctx: &mut RenderContext<'_>, out: &mut Output) -> Result<usize> {
        out.write(&self.text)
    }
}

/// An `{{ ... }}` output statement.
#[derive(Debug)]
pub struct OutputNode {
    /// The source range of the statement.
    pub span: Span,
    /// The filtered expression to evaluate and write.
    pub expression: Expression,
}

impl Node for OutputNode {
    fn span(&self) -> Span {
        self.span
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
