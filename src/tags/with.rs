//! The `with` tag: an inline scope of keyword bindings.

use crate::{
    ast::{BlockNode, Node},
    context::RenderContext,
    error::{Error, Result},
    expression::{self, Expression, Identifier},
    output::Output,
    parser::Parser,
    stream::{ExprStream, MarkupStream},
    tags::Tag,
    token::{Markup, Span},
    value::ValueMap,
};
use futures::future::BoxFuture;

/// A `{% with a: 1, b: x %}...{% endwith %}` node.
#[derive(Debug)]
pub struct WithNode {
    /// The source range of the opening tag.
    pub span: Span,
    /// The scope bindings.
    pub args: Vec<(Identifier, Expression)>,
    /// The scoped block.
    pub block: BlockNode,
}

impl WithNode {
    fn evaluate_args(&self, ctx: &mut RenderContext<'_>) -> Result<ValueMap> {
        let mut namespace = ValueMap::new();
        for (name, value) in &self.args {
            namespace.insert(name.name.clone(), value.evaluate(ctx)?);
        }
        Ok(namespace)
    }
}

impl Node for WithNode {
    fn span(&self) -> Span {
        self.span
    }

    fn tag_name(&self) -> Option<&str> {
        Some("with")
    }

    fn render_to_output(&self, ctx: &mut RenderContext<'_>, out: &mut Output) -> Result<usize> {
        let namespace = self.evaluate_args(ctx)?;
        ctx.extend(namespace, self.span, |ctx| self.block.render(ctx, out))
    }

    fn render_to_output_async<'a, 'env: 'a>(
        &'a self,
        ctx: &'a mut RenderContext<'env>,
        out: &'a mut Output,
    ) -> BoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            let namespace = self.evaluate_args(ctx)?;
            ctx.push_scope(namespace, self.span)?;
            let result = self.block.render_async(ctx, out).await;
            ctx.pop_scope();
            result
        })
    }

    fn children(&self) -> Vec<&dyn Node> {
        vec![&self.block]
    }

    fn expressions(&self) -> Vec<&Expression> {
        self.args.iter().map(|(_, value)| value).collect()
    }

    fn block_scope(&self) -> Vec<Identifier> {
        self.args.iter().map(|(name, _)| name.clone()).collect()
    }
}

/// The `with` tag.
#[derive(Debug)]
pub struct WithTag;

impl Tag for WithTag {
    fn block(&self) -> bool {
        true
    }

    fn end_block(&self) -> &'static [&'static str] {
        &["endwith"]
    }

    fn parse(&self, stream: &mut MarkupStream, parser: &Parser<'_>) -> Result<Box<dyn Node>> {
        let Markup::Tag {
            span, expression, ..
        } = stream.next()
        else {
            return Err(Error::syntax("expected a tag", Span::default()));
        };

        let mut tokens = ExprStream::new(expression, span);
        let args = expression::parse_keyword_arguments(&mut tokens)?;

        let nodes = parser.parse_block(stream, self.end_block())?;
        stream.expect_tag("endwith")?;

        Ok(Box::new(WithNode {
            span,
            args,
            block: BlockNode { span, nodes },
        }))
    }
}
