//! The standard `assign` tag.

use crate::{
    ast::Node,
    context::RenderContext,
    error::Result,
    expression::{self, Expression, Identifier},
    output::Output,
    parser::Parser,
    stream::MarkupStream,
    tags::Tag,
    token::{Span, TokenKind},
};
use futures::future::BoxFuture;

/// An `{% assign name = expr %}` node.
#[derive(Debug)]
pub struct AssignNode {
    /// The source range of the tag.
    pub span: Span,
    /// The target name.
    pub name: Identifier,
    /// The assigned expression.
    pub expression: Expression,
}

impl Node for AssignNode {
    fn span(&self) -> Span {
        self.span
    }

    fn tag_name(&self) -> Option<&str> {
        Some("assign")
    }

    fn render_to_output(&self, ctx: &mut RenderContext<'_>, _out: &mut Output) -> Result<usize> {
        let value = self.expression.evaluate(ctx)?;
        ctx.assign(self.name.name.clone(), value, self.span)?;
        Ok(0)
    }

    fn render_to_output_async<'a, 'env: 'a>(
        &'a self,
        ctx: &'a mut RenderContext<'env>,
        _out: &'a mut Output,
    ) -> BoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            let value = self.expression.evaluate_async(ctx).await?;
            ctx.assign(self.name.name.clone(), value, self.span)?;
            Ok(0)
        })
    }

    fn expressions(&self) -> Vec<&Expression> {
        vec![&self.expression]
    }

    fn template_scope(&self) -> Vec<Identifier> {
        vec![self.name.clone()]
    }
}

/// The standard `assign` tag.
#[derive(Debug)]
pub struct AssignTag;

impl Tag for AssignTag {
    fn parse(&self, stream: &mut MarkupStream, parser: &Parser<'_>) -> Result<Box<dyn Node>> {
        let span = stream.current().span();
        let mut tokens = stream.tag_expression()?;

        let name = expression::parse_identifier(tokens.next())?;
        tokens.expect(TokenKind::Assign)?;
        tokens.next();
        let expression = expression::parse_filtered(&mut tokens)?;
        tokens.expect_eos()?;
        parser.validate_filters(&expression)?;

        Ok(Box::new(AssignNode {
            span,
            name,
            expression,
        }))
    }
}
