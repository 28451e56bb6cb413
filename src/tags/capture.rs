//! The standard `capture` tag.

use crate::{
    ast::{BlockNode, Node},
    context::RenderContext,
    error::Result,
    expression::{self, Identifier},
    output::Output,
    parser::Parser,
    stream::MarkupStream,
    tags::Tag,
    token::Span,
    value::Value,
};
use futures::future::BoxFuture;

/// A `{% capture name %}...{% endcapture %}` node.
#[derive(Debug)]
pub struct CaptureNode {
    /// The source range of the opening tag.
    pub span: Span,
    /// The target name.
    pub name: Identifier,
    /// The captured block.
    pub block: BlockNode,
}

impl CaptureNode {
    fn store(&self, ctx: &mut RenderContext<'_>, text: String) -> Result<usize> {
        let value = if ctx.auto_escape() {
            // The block rendered with escaping already applied.
            Value::markup(text)
        } else {
            Value::from(text)
        };
        ctx.assign(self.name.name.clone(), value, self.span)?;
        Ok(0)
    }
}

impl Node for CaptureNode {
    fn span(&self) -> Span {
        self.span
    }

    fn tag_name(&self) -> Option<&str> {
        Some("capture")
    }

    fn render_to_output(&self, ctx: &mut RenderContext<'_>, out: &mut Output) -> Result<usize> {
        let mut buf = Output::new(out.limit());
        self.block.render(ctx, &mut buf)?;
        self.store(ctx, buf.into_string())
    }

    fn render_to_output_async<'a, 'env: 'a>(
        &'a self,
        ctx: &'a mut RenderContext<'env>,
        out: &'a mut Output,
    ) -> BoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            let mut buf = Output::new(out.limit());
            self.block.render_async(ctx, &mut buf).await?;
            self.store(ctx, buf.into_string())
        })
    }

    fn children(&self) -> Vec<&dyn Node> {
        vec![&self.block]
    }

    fn template_scope(&self) -> Vec<Identifier> {
        vec![self.name.clone()]
    }
}

/// The standard `capture` tag.
#[derive(Debug)]
pub struct CaptureTag;

impl Tag for CaptureTag {
    fn block(&self) -> bool {
        true
    }

    fn end_block(&self) -> &'static [&'static str] {
        &["endcapture"]
    }

    fn parse(&self, stream: &mut MarkupStream, parser: &Parser<'_>) -> Result<Box<dyn Node>> {
        let span = stream.current().span();
        let mut tokens = stream.tag_expression()?;
        let name = expression::parse_string_or_identifier(tokens.next())?;
        tokens.expect_eos()?;
        stream.next();

        let nodes = parser.parse_block(stream, self.end_block())?;
        stream.expect_tag("endcapture")?;

        Ok(Box::new(CaptureNode {
            span,
            name,
            block: BlockNode { span, nodes },
        }))
    }
}
