//! The `macro` and `call` tags: reusable parameterized blocks.

use crate::{
    ast::{BlockNode, Node},
    context::RenderContext,
    error::{Error, Interrupt, Result},
    expression::{self, Expression, FilterArg, Identifier},
    output::Output,
    parser::Parser,
    stream::{ExprStream, MarkupStream},
    tags::Tag,
    token::{ExprToken, Markup, Span, TokenKind},
    value::{Value, ValueMap},
};
use futures::future::BoxFuture;
use std::sync::Arc;

/// A macro definition registered at render time.
#[derive(Debug)]
pub struct Macro {
    /// Parameter names with optional default expressions.
    pub params: Vec<(Identifier, Option<Expression>)>,
    /// The macro body.
    pub block: Arc<BlockNode>,
}

/// A `{% macro 'name' params %}` node. Registers the macro; renders
/// nothing itself.
#[derive(Debug)]
pub struct MacroNode {
    /// The source range of the opening tag.
    pub span: Span,
    /// The macro's name.
    pub name: Identifier,
    /// The macro definition.
    pub macro_: Arc<Macro>,
}

impl Node for MacroNode {
    fn span(&self) -> Span {
        self.span
    }

    fn tag_name(&self) -> Option<&str> {
        Some("macro")
    }

    fn render_to_output(&self, ctx: &mut RenderContext<'_>, _out: &mut Output) -> Result<usize> {
        ctx.macros
            .insert(self.name.name.clone(), Arc::clone(&self.macro_));
        Ok(0)
    }

    fn children(&self) -> Vec<&dyn Node> {
        vec![self.macro_.block.as_ref()]
    }

    fn expressions(&self) -> Vec<&Expression> {
        self.macro_
            .params
            .iter()
            .filter_map(|(_, default)| default.as_ref())
            .collect()
    }

    fn block_scope(&self) -> Vec<Identifier> {
        self.macro_.params.iter().map(|(name, _)| name.clone()).collect()
    }
}

/// The `macro` tag.
#[derive(Debug)]
pub struct MacroTag;

impl Tag for MacroTag {
    fn block(&self) -> bool {
        true
    }

    fn end_block(&self) -> &'static [&'static str] {
        &["endmacro"]
    }

    fn parse(&self, stream: &mut MarkupStream, parser: &Parser<'_>) -> Result<Box<dyn Node>> {
        let Markup::Tag {
            span, expression, ..
        } = stream.next()
        else {
            return Err(Error::syntax("expected a tag", Span::default()));
        };

        let mut tokens = ExprStream::new(expression, span);
        let name = expression::parse_string_or_identifier(tokens.next())?;
        let params = parse_macro_params(&mut tokens)?;

        let nodes = parser.parse_block(stream, self.end_block())?;
        stream.expect_tag("endmacro")?;

        Ok(Box::new(MacroNode {
            span,
            name,
            macro_: Arc::new(Macro {
                params,
                block: Arc::new(BlockNode { span, nodes }),
            }),
        }))
    }
}

/// Parses a macro's parameter list: names with optional `: default` or
/// `= default` values, separated by optional commas.
fn parse_macro_params(
    tokens: &mut ExprStream,
) -> Result<Vec<(Identifier, Option<Expression>)>> {
    let mut params = Vec::new();

    loop {
        let token = tokens.next();
        match &token {
            ExprToken::Token(atom) => match atom.kind {
                TokenKind::Eoi => break,
                TokenKind::Comma => continue,
                TokenKind::Word => {
                    let name = expression::parse_identifier(token)?;
                    let mut default = None;
                    if tokens.is_kind(TokenKind::Colon) || tokens.is_kind(TokenKind::Assign) {
                        tokens.next();
                        default = Some(expression::parse_primary(tokens)?);
                    }
                    params.push((name, default));
                }
                _ => {
                    return Err(Error::syntax(
                        format!("expected a parameter name, found {}", token.description()),
                        token.span(),
                    ))
                }
            },
            _ => {
                return Err(Error::syntax(
                    format!("expected a parameter name, found {}", token.description()),
                    token.span(),
                ))
            }
        }
    }

    Ok(params)
}

/// A `{% call 'name' args %}` node.
#[derive(Debug)]
pub struct CallNode {
    /// The source range of the tag.
    pub span: Span,
    /// The macro name to invoke.
    pub name: Identifier,
    /// The invocation arguments.
    pub args: Vec<FilterArg>,
}

impl CallNode {
    /// Binds arguments to the macro's parameters: positional first, then
    /// keyword, then declared defaults, then undefined.
    fn bind(&self, macro_: &Macro, ctx: &mut RenderContext<'_>) -> Result<ValueMap> {
        let mut positional = Vec::new();
        let mut keyword = ValueMap::new();
        for arg in &self.args {
            match arg {
                FilterArg::Positional(expr) => positional.push(expr.evaluate(ctx)?),
                FilterArg::Keyword(name, expr) => {
                    keyword.insert(name.name.clone(), expr.evaluate(ctx)?);
                }
                FilterArg::Symbol(name) => positional.push(Value::string(&name.name)),
            }
        }

        let mut namespace = ValueMap::new();
        let mut positional = positional.into_iter();
        for (param, default) in &macro_.params {
            let value = if let Some(value) = keyword.shift_remove(param.name.as_str()) {
                value
            } else if let Some(value) = positional.next() {
                value
            } else if let Some(default) = default {
                default.evaluate(ctx)?
            } else {
                ctx.undefined(&param.name, &param.name, param.span)?
            };
            namespace.insert(param.name.clone(), value);
        }

        Ok(namespace)
    }
}

impl Node for CallNode {
    fn span(&self) -> Span {
        self.span
    }

    fn tag_name(&self) -> Option<&str> {
        Some("call")
    }

    fn render_to_output(&self, ctx: &mut RenderContext<'_>, out: &mut Output) -> Result<usize> {
        let Some(macro_) = ctx.macros.get(&self.name.name).cloned() else {
            return Err(Error::Name {
                message: format!("undefined macro '{}'", self.name.name),
                span: self.span,
            });
        };

        let namespace = self.bind(&macro_, ctx)?;

        // Macros render with an isolated scope, like `render` partials.
        let template_name = ctx.template_name().clone();
        let mut macro_ctx = ctx.copy(
            self.span,
            namespace,
            template_name,
            ValueMap::new(),
            Default::default(),
            true,
            false,
        )?;

        match macro_.block.render(&mut macro_ctx, out) {
            Ok(count) => Ok(count),
            Err(Error::Interrupt(Interrupt::Break | Interrupt::Continue)) => Ok(0),
            Err(err) => Err(err),
        }
    }

    fn render_to_output_async<'a, 'env: 'a>(
        &'a self,
        ctx: &'a mut RenderContext<'env>,
        out: &'a mut Output,
    ) -> BoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            let Some(macro_) = ctx.macros.get(&self.name.name).cloned() else {
                return Err(Error::Name {
                    message: format!("undefined macro '{}'", self.name.name),
                    span: self.span,
                });
            };

            let namespace = self.bind(&macro_, ctx)?;
            let template_name = ctx.template_name().clone();
            let mut macro_ctx = ctx.copy(
                self.span,
                namespace,
                template_name,
                ValueMap::new(),
                Default::default(),
                true,
                false,
            )?;

            match macro_.block.render_async(&mut macro_ctx, out).await {
                Ok(count) => Ok(count),
                Err(Error::Interrupt(Interrupt::Break | Interrupt::Continue)) => Ok(0),
                Err(err) => Err(err),
            }
        })
    }

    fn expressions(&self) -> Vec<&Expression> {
        self.args.iter().filter_map(FilterArg::value).collect()
    }
}

/// The `call` tag.
#[derive(Debug)]
pub struct CallTag;

impl Tag for CallTag {
    fn parse(&self, stream: &mut MarkupStream, _parser: &Parser<'_>) -> Result<Box<dyn Node>> {
        let span = stream.current().span();
        let mut tokens = stream.tag_expression()?;
        let name = expression::parse_string_or_identifier(tokens.next())?;

        let mut args = Vec::new();
        loop {
            match tokens.kind() {
                Some(TokenKind::Eoi) => break,
                Some(TokenKind::Comma) => {
                    tokens.next();
                }
                Some(TokenKind::Word)
                    if tokens.peek().is_kind(TokenKind::Colon)
                        || tokens.peek().is_kind(TokenKind::Assign) =>
                {
                    let key = expression::parse_identifier(tokens.next())?;
                    tokens.next();
                    args.push(FilterArg::Keyword(
                        key,
                        expression::parse_primary(&mut tokens)?,
                    ));
                }
                _ => args.push(FilterArg::Positional(expression::parse_primary(
                    &mut tokens,
                )?)),
            }
        }

        Ok(Box::new(CallNode { span, name, args }))
    }
}
