//! The standard `render` tag.
//!
//! Unlike `include`, a rendered partial gets an isolated scope: only the
//! names bound by the tag and the render globals are visible, `assign`
//! inside it is invisible to the caller, loop interrupts do not cross
//! the boundary, and nested `include` is disabled.

use crate::{
    ast::{Node, Partial, PartialScope},
    context::RenderContext,
    error::{Error, Interrupt, Result},
    expression::{Expression, Identifier},
    output::Output,
    parser::Parser,
    stream::MarkupStream,
    tags::{
        for_tag::forloop_value,
        include::parse_partial_expression,
        Tag,
    },
    template::Template,
    token::Span,
    value::{to_liquid_string, Value, ValueMap},
};
use futures::future::BoxFuture;
use std::{collections::HashSet, sync::Arc};

/// A `{% render 'name' %}` node.
#[derive(Debug)]
pub struct RenderNode {
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
    /// Keyword arguments seeding the partial's scope.
    pub args: Vec<(Identifier, Expression)>,
}

impl RenderNode {
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

    fn disabled_tags(&self, ctx: &RenderContext<'_>) -> HashSet<String> {
        // `include` is forbidden inside rendered partials; existing
        // restrictions propagate.
        let mut disabled = HashSet::new();
        disabled.insert("include".to_string());
        for name in ["include", "render", "break", "continue"] {
            if ctx.is_tag_disabled(name) {
                disabled.insert(name.to_string());
            }
        }
        disabled
    }

    /// Renders the partial once with the given namespace in an isolated
    /// context. Loop interrupts stop the partial without escaping it.
    fn render_isolated(
        &self,
        template: &Template<'_>,
        namespace: ValueMap,
        ctx: &mut RenderContext<'_>,
        out: &mut Output,
    ) -> Result<usize> {
        let mut partial_ctx = ctx.copy(
            self.span,
            namespace,
            Arc::from(template.name()),
            template.matter.clone(),
            self.disabled_tags(ctx),
            true,
            false,
        )?;

        match template.render_with_context(&mut partial_ctx, out) {
            Ok(count) => Ok(count),
            Err(Error::Interrupt(Interrupt::Break | Interrupt::Continue)) => Ok(0),
            Err(err) => Err(err),
        }
    }

    async fn render_isolated_async(
        &self,
        template: &Template<'_>,
        namespace: ValueMap,
        ctx: &mut RenderContext<'_>,
        out: &mut Output,
    ) -> Result<usize> {
        let mut partial_ctx = ctx.copy(
            self.span,
            namespace,
            Arc::from(template.name()),
            template.matter.clone(),
            self.disabled_tags(ctx),
            true,
            false,
        )?;

        match template.render_with_context_async(&mut partial_ctx, out).await {
            Ok(count) => Ok(count),
            Err(Error::Interrupt(Interrupt::Break | Interrupt::Continue)) => Ok(0),
            Err(err) => Err(err),
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

impl Node for RenderNode {
    fn span(&self) -> Span {
        self.span
    }

    fn tag_name(&self) -> Option<&str> {
        Some("render")
    }

    fn render_to_output(&self, ctx: &mut RenderContext<'_>, out: &mut Output) -> Result<usize> {
        let name = to_liquid_string(&self.name.evaluate(ctx)?, false);
        let template = ctx.env().get_template_from(&name, Some(&*ctx))?;
        let base_args = self.evaluate_args(ctx)?;

        let result = (|| -> Result<usize> {
            let Some(var) = &self.var else {
                return self.render_isolated(&template, base_args.clone(), ctx, out);
            };

            let key = self.bound_name(&template);
            let value = var.evaluate(ctx)?;

            if self.repeat {
                let items = value.try_iter(self.span)?;
                let length = items.len();
                ctx.push_loop(length as u64, self.span)?;

                let mut count = 0;
                let mut failure = None;
                for (index, item) in items.into_iter().enumerate() {
                    let mut namespace = base_args.clone();
                    namespace.insert(key.clone(), item);
                    namespace.insert(
                        "forloop".to_string(),
                        forloop_value(index, length, &Value::Null),
                    );
                    match self.render_isolated(&template, namespace, ctx, out) {
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
                let mut namespace = base_args.clone();
                namespace.insert(key, value);
                self.render_isolated(&template, namespace, ctx, out)
            }
        })();

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
            let base_args = self.evaluate_args(ctx)?;

            let result = if let Some(var) = &self.var {
                let key = self.bound_name(&template);
                let value = var.evaluate_async(ctx).await?;

                if self.repeat {
                    match value.try_iter(self.span) {
                        Ok(items) => {
                            let length = items.len();
                            match ctx.push_loop(length as u64, self.span) {
                                Ok(()) => {
                                    let mut count = 0;
                                    let mut failure = None;
                                    for (index, item) in items.into_iter().enumerate() {
                                        let mut namespace = base_args.clone();
                                        namespace.insert(key.clone(), item);
                                        namespace.insert(
                                            "forloop".to_string(),
                                            forloop_value(index, length, &Value::Null),
                                        );
                                        match self
                                            .render_isolated_async(&template, namespace, ctx, out)
                                            .await
                                        {
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
                                }
                                Err(err) => Err(err),
                            }
                        }
                        Err(err) => Err(err),
                    }
                } else {
                    let mut namespace = base_args.clone();
                    namespace.insert(key, value);
                    self.render_isolated_async(&template, namespace, ctx, out).await
                }
            } else {
                self.render_isolated_async(&template, base_args, ctx, out).await
            };

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

        if self.repeat {
            in_scope.push(Identifier {
                name: "forloop".to_string(),
                span: self.span,
            });
        }

        Some(Partial {
            name: &self.name,
            scope: PartialScope::Isolated,
            in_scope,
        })
    }
}

/// The standard `render` tag.
#[derive(Debug)]
pub struct RenderTag;

impl Tag for RenderTag {
    fn parse(&self, stream: &mut MarkupStream, _parser: &Parser<'_>) -> Result<Box<dyn Node>> {
        let span = stream.current().span();
        let mut tokens = stream.tag_expression()?;
        let (name, repeat, var, alias, args) = parse_partial_expression(&mut tokens)?;
        Ok(Box::new(RenderNode {
            span,
            name,
            repeat,
            var,
            alias,
            args,
        }))
    }
}
