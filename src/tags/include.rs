//! The standard `include` tag.
//!
//! An included partial shares the including template's scope: names
//! assigned inside it are visible to the caller, and loop interrupts
//! cross the boundary.

use crate::{
    ast::{Node, Partial, PartialScope},
    context::RenderContext,
    error::Result,
    expression::{self, Expression, Identifier},
    output::Output,
    parser::Parser,
    stream::{ExprStream, MarkupStream},
    tags::Tag,
    template::Template,
    token::{Span, TokenKind},
    value::{to_liquid_string, ValueMap},
};
use futures::future::BoxFuture;
use std::sync::Arc;

/// An `{% include 'name' %}` node.
#[derive(Debug)]
pub struct IncludeNode {
    /// The source range of the tag.
    pub span: Span,
    /// The partial's name expression.
    pub name: Expression,
    /// Whether the bound variable is iterated (`for` instead of `with`).
    pub repeat: bool,
    /// The bound variable, if any.
    pub var: Option<Expression>,
    /// The alias the bound variable is exposed as.
    pub alias: Option<Identifier>,
    /// Keyword arguments added to the partial's scope.
    pub args: Vec<(Identifier, Expression)>,
}

impl IncludeNode {
    /// The name the bound variable takes inside the partial: the alias,
    /// or the template name up to its first dot.
    fn bound_name(&self, template: &Template<'_>) -> String {
        match &self.alias {
            Some(alias) => alias.name.clone(),
            None => template
                .name()
                .split('.')
                .next()
                .unwrap_or_default()
                .to_string(),
        }
    }

    fn render_partial(
        &self,
        template: &Template<'_>,
        ctx: &mut RenderContext<'_>,
        out: &mut Output,
    ) -> Result<usize> {
        let Some(var) = &self.var else {
            return template.render_with_context(ctx, out);
        };

        let key = self.bound_name(template);
        let value = var.evaluate(ctx)?;

        if self.repeat {
            let items = value.try_iter(self.span)?;
            ctx.push_loop(items.len() as u64, self.span)?;
            let mut count = 0;
            let mut failure = None;
            for item in items {
                ctx.set_scope_value(&key, item);
                match template.render_with_context(ctx, out) {
                    Ok(written) => count += written,
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                }
            }
            ctx.pop_loop();
            match failure {
                Some(err) => Err(err),
                None => Ok(count),
            }
        } else {
            ctx.set_scope_value(&key, value);
            template.render_with_context(ctx, out)
        }
    }

    async fn render_partial_async(
        &self,
        template: &Template<'_>,
        ctx: &mut RenderContext<'_>,
        out: &mut Output,
    ) -> Result<usize> {
        let Some(var) = &self.var else {
            return template.render_with_context_async(ctx, out).await;
        };

        let key = self.bound_name(template);
        let value = var.evaluate_async(ctx).await?;

        if self.repeat {
            let items = value.try_iter(self.span)?;
            ctx.push_loop(items.len() as u64, self.span)?;
            let mut count = 0;
            let mut failure = None;
            for item in items {
                ctx.set_scope_value(&key, item);
                match template.render_with_context_async(ctx, out).await {
                    Ok(written) => count += written,
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                }
            }
            ctx.pop_loop();
            match failure {
                Some(err) => Err(err),
                None => Ok(count),
            }
        } else {
            ctx.set_scope_value(&key, value);
            template.render_with_context_async(ctx, out).await
        }
    }

    fn evaluate_args(&self, ctx: &mut RenderContext<'_>) -> Result<ValueMap> {
        let mut namespace = ValueMap::new();
        for (name, value) in &self.args {
            namespace.insert(name.name.clone(), value.evaluate(ctx)?);
        }
        Ok(namespace)
    }
}

impl Node for IncludeNode {
    fn span(&self) -> Span {
        self.span
    }

    fn tag_name(&self) -> Option<&str> {
        Some("include")
    }

    fn render_to_output(&self, ctx: &mut RenderContext<'_>, out: &mut Output) -> Result<usize> {
        let name = to_liquid_string(&self.name.evaluate(ctx)?, false);
        let template = ctx.env().get_template_from(&name, Some(&*ctx))?;

        let namespace = self.evaluate_args(ctx)?;
        ctx.push_scope(namespace, self.span)?;
        let saved = ctx.enter_template(
            Arc::from(template.name()),
            template.matter.clone(),
        );

        let result = self.render_partial(&template, ctx, out);

        ctx.restore_template(saved);
        ctx.pop_scope();
        result.map_err(|err| err.in_partial(&name))
    }

    fn render_to_output_async<'a, 'env: 'a>(
        &'a self,
        ctx: &'a mut RenderContext<'env>,
        out: &'a mut Output,
    ) -> BoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            let name = to_liquid_string(&self.name.evaluate_async(ctx).await?, false);
            let template = ctx
                .env()
                .get_template_from_async(&name, Some(&*ctx))
                .await?;

            let namespace = self.evaluate_args(ctx)?;
            ctx.push_scope(namespace, self.span)?;
            let saved = ctx.enter_template(
                Arc::from(template.name()),
                template.matter.clone(),
            );

            let result = self.render_partial_async(&template, ctx, out).await;

            ctx.restore_template(saved);
            ctx.pop_scope();
            result.map_err(|err| err.in_partial(&name))
        })
    }

    fn expressions(&self) -> Vec<&Expression> {
        let mut exprs = vec![&self.name];
        if let Some(var) = &self.var {
            exprs.push(var);
        }
        exprs.extend(self.args.iter().map(|(_, value)| value));
        exprs
    }

    fn partial_scope(&self) -> Option<Partial<'_>> {
        let mut in_scope: Vec<Identifier> =
            self.args.iter().map(|(name, _)| name.clone()).collect();

        if self.var.is_some() {
            if let Some(alias) = &self.alias {
                in_scope.push(alias.clone());
            } else if let Expression::Str { value, span } = &self.name {
                in_scope.push(Identifier {
                    name: value.split('.').next().unwrap_or_default().to_string(),
                    span: *span,
                });
            }
        }

        Some(Partial {
            name: &self.name,
            scope: PartialScope::Shared,
            in_scope,
        })
    }
}

/// The standard `include` tag.
#[derive(Debug)]
pub struct IncludeTag;

impl Tag for IncludeTag {
    fn parse(&self, stream: &mut MarkupStream, _parser: &Parser<'_>) -> Result<Box<dyn Node>> {
        let span = stream.current().span();
        let mut tokens = stream.tag_expression()?;
        let (name, repeat, var, alias, args) = parse_partial_expression(&mut tokens)?;
        Ok(Box::new(IncludeNode {
            span,
            name,
            repeat,
            var,
            alias,
            args,
        }))
    }
}

/// Parses the argument surface shared by `include` and `render`:
/// `'name' ((with | for) expr (as ident)?)? (, key: value)*`.
pub(super) fn parse_partial_expression(
    tokens: &mut ExprStream,
) -> Result<(
    Expression,
    bool,
    Option<Expression>,
    Option<Identifier>,
    Vec<(Identifier, Expression)>,
)> {
    let name = expression::parse_primary(tokens)?;

    let mut repeat = false;
    let mut var = None;
    let mut alias = None;

    // A `for` or `with` followed by a separator is a keyword argument
    // named "for"/"with", not a binding.
    let binding = |tokens: &ExprStream| {
        !tokens.peek().is_kind(TokenKind::Colon) && !tokens.peek().is_kind(TokenKind::Comma)
    };

    if tokens.is_kind(TokenKind::For) && binding(tokens) {
        tokens.next();
        repeat = true;
        var = Some(expression::parse_primary(tokens)?);
    } else if tokens.is_kind(TokenKind::With) && binding(tokens) {
        tokens.next();
        var = Some(expression::parse_primary(tokens)?);
    }

    if var.is_some() && tokens.is_kind(TokenKind::As) {
        tokens.next();
        alias = Some(expression::parse_string_or_identifier(tokens.next())?);
    }

    let args = expression::parse_keyword_arguments(tokens)?;
    Ok((name, repeat, var, alias, args))
}
