//! The standard `for` tag, with `break` and `continue`.

use crate::{
    ast::{BlockNode, Node},
    context::RenderContext,
    error::{Error, Interrupt, Result},
    expression::{Expression, Identifier, LoopExpression, LoopOffset},
    output::Output,
    parser::Parser,
    stream::{ExprStream, MarkupStream},
    tags::Tag,
    token::{Markup, Span},
    value::{Number, Value, ValueMap},
};
use futures::future::BoxFuture;

/// A `{% for x in xs %}` node with an optional `else` block.
#[derive(Debug)]
pub struct ForNode {
    /// The source range of the opening tag.
    pub span: Span,
    /// The loop expression.
    pub expr: LoopExpression,
    /// The loop body.
    pub block: BlockNode,
    /// The `else` block, rendered when the iterable is empty.
    pub default: Option<BlockNode>,
}

/// Evaluates a loop expression into the items to iterate, applying
/// `offset`, `limit` and `reversed`, and updating the context's stop
/// index for `offset: continue`.
pub(super) fn evaluate_loop(
    expr: &LoopExpression,
    span: Span,
    ctx: &mut RenderContext<'_>,
) -> Result<Vec<Value>> {
    let iterable = expr.iterable.evaluate(ctx)?;
    let mut items = iterable.try_iter(span)?;
    let len = items.len();
    let key = expr.fingerprint();

    let limit = match &expr.limit {
        Some(limit) => Some(eval_index(limit, ctx)?),
        None => None,
    };

    if limit.is_none() && expr.offset.is_none() {
        ctx.stop_index(&key, Some(len));
        if expr.reversed {
            items.reverse();
        }
        return Ok(items);
    }

    let offset = match &expr.offset {
        Some(LoopOffset::Continue(_)) => Some(ctx.stop_index(&key, None)),
        Some(LoopOffset::Expr(offset)) => Some(eval_index(offset, ctx)?),
        None => None,
    };

    let start = offset.unwrap_or(0);
    let mut length = len.saturating_sub(start);
    if let Some(limit) = limit {
        length = length.min(limit);
    }

    let stop = start + length;
    ctx.stop_index(&key, Some(stop));

    let mut sliced = items[start.min(len)..stop.min(len)].to_vec();
    if expr.reversed {
        sliced.reverse();
    }
    Ok(sliced)
}

fn eval_index(expr: &Expression, ctx: &mut RenderContext<'_>) -> Result<usize> {
    let value = expr.evaluate(ctx)?;
    match value.to_number() {
        Some(Number::Int(value)) => Ok(value.max(0) as usize),
        Some(Number::Float(value)) => Ok(value.max(0.0) as usize),
        None => Err(Error::Type {
            message: format!("expected an integer, found {}", value.type_name()),
            span: expr.span(),
        }),
    }
}

/// Builds the `forloop` object for one iteration.
pub(super) fn forloop_value(index: usize, length: usize, parentloop: &Value) -> Value {
    let mut map = ValueMap::new();
    map.insert("index".to_string(), Value::Int(index as i64 + 1));
    map.insert("index0".to_string(), Value::Int(index as i64));
    map.insert(
        "rindex".to_string(),
        Value::Int((length - index) as i64),
    );
    map.insert(
        "rindex0".to_string(),
        Value::Int((length - index) as i64 - 1),
    );
    map.insert("first".to_string(), Value::Bool(index == 0));
    map.insert("last".to_string(), Value::Bool(index + 1 == length));
    map.insert("length".to_string(), Value::Int(length as i64));
    map.insert("parentloop".to_string(), parentloop.clone());
    Value::object(map)
}

impl ForNode {
    fn render_loop(&self, ctx: &mut RenderContext<'_>, out: &mut Output) -> Result<usize> {
        let items = evaluate_loop(&self.expr, self.span, ctx)?;
        let length = items.len();

        if items.is_empty() {
            return match &self.default {
                Some(default) => default.render(ctx, out),
                None => Ok(0),
            };
        }

        ctx.push_loop(length as u64, self.span)?;
        let parentloop = ctx.resolve_name("forloop").unwrap_or(Value::Null);
        if let Err(err) = ctx.push_scope(ValueMap::new(), self.span) {
            ctx.pop_loop();
            return Err(err);
        }

        let mut count = 0;
        let mut failure = None;
        for (index, item) in items.into_iter().enumerate() {
            ctx.set_scope_value(&self.expr.ident.name, item);
            ctx.set_scope_value("forloop", forloop_value(index, length, &parentloop));

            match self.block.render(ctx, out) {
                Ok(written) => count += written,
                Err(Error::Interrupt(Interrupt::Break)) => break,
                Err(Error::Interrupt(Interrupt::Continue)) => continue,
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        ctx.pop_scope();
        ctx.pop_loop();
        match failure {
            Some(err) => Err(err),
            None => Ok(count),
        }
    }

    async fn render_loop_async(
        &self,
        ctx: &mut RenderContext<'_>,
        out: &mut Output,
    ) -> Result<usize> {
        let items = evaluate_loop(&self.expr, self.span, ctx)?;
        let length = items.len();

        if items.is_empty() {
            return match &self.default {
                Some(default) => default.render_async(ctx, out).await,
                None => Ok(0),
            };
        }

        ctx.push_loop(length as u64, self.span)?;
        let parentloop = ctx.resolve_name("forloop").unwrap_or(Value::Null);
        if let Err(err) = ctx.push_scope(ValueMap::new(), self.span) {
            ctx.pop_loop();
            return Err(err);
        }

        let mut count = 0;
        let mut failure = None;
        for (index, item) in items.into_iter().enumerate() {
            ctx.set_scope_value(&self.expr.ident.name, item);
            ctx.set_scope_value("forloop", forloop_value(index, length, &parentloop));

            match self.block.render_async(ctx, out).await {
                Ok(written) => count += written,
                Err(Error::Interrupt(Interrupt::Break)) => break,
                Err(Error::Interrupt(Interrupt::Continue)) => continue,
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        ctx.pop_scope();
        ctx.pop_loop();
        match failure {
            Some(err) => Err(err),
            None => Ok(count),
        }
    }
}

impl Node for ForNode {
    fn span(&self) -> Span {
        self.span
    }

    fn tag_name(&self) -> Option<&str> {
        Some("for")
    }

    fn render_to_output(&self, ctx: &mut RenderContext<'_>, out: &mut Output) -> Result<usize> {
        if !ctx.env().suppress_blank_control_flow_blocks {
            return self.render_loop(ctx, out);
        }

        let mut buf = Output::new(out.limit().map(|limit| limit.saturating_sub(out.len())));
        self.render_loop(ctx, &mut buf)?;
        let text = buf.into_string();
        if text.chars().all(char::is_whitespace) {
            Ok(0)
        } else {
            out.write(&text)
        }
    }

    fn render_to_output_async<'a, 'env: 'a>(
        &'a self,
        ctx: &'a mut RenderContext<'env>,
        out: &'a mut Output,
    ) -> BoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            if !ctx.env().suppress_blank_control_flow_blocks {
                return self.render_loop_async(ctx, out).await;
            }

            let mut buf = Output::new(out.limit().map(|limit| limit.saturating_sub(out.len())));
            self.render_loop_async(ctx, &mut buf).await?;
            let text = buf.into_string();
            if text.chars().all(char::is_whitespace) {
                Ok(0)
            } else {
                out.write(&text)
            }
        })
    }

    fn children(&self) -> Vec<&dyn Node> {
        let mut children: Vec<&dyn Node> = vec![&self.block];
        if let Some(default) = &self.default {
            children.push(default);
        }
        children
    }

    fn expressions(&self) -> Vec<&Expression> {
        self.expr.expressions()
    }

    fn block_scope(&self) -> Vec<Identifier> {
        vec![
            self.expr.ident.clone(),
            Identifier {
                name: "forloop".to_string(),
                span: self.span,
            },
        ]
    }
}

/// The standard `for` tag.
#[derive(Debug)]
pub struct ForTag;

impl Tag for ForTag {
    fn block(&self) -> bool {
        true
    }

    fn end_block(&self) -> &'static [&'static str] {
        &["endfor", "else"]
    }

    fn parse(&self, stream: &mut MarkupStream, parser: &Parser<'_>) -> Result<Box<dyn Node>> {
        let Markup::Tag {
            span, expression, ..
        } = stream.next()
        else {
            return Err(Error::syntax("expected a tag", Span::default()));
        };

        let mut tokens = ExprStream::new(expression, span);
        let expr = LoopExpression::parse(&mut tokens)?;

        let block = BlockNode {
            span,
            nodes: parser.parse_block(stream, self.end_block())?,
        };

        let mut default = None;
        if stream.current().is_tag("else") {
            let else_span = stream.current().span();
            stream.next();
            default = Some(BlockNode {
                span: else_span,
                nodes: parser.parse_block(stream, &["endfor"])?,
            });
        }

        if !stream.current().is_eoi() {
            stream.expect_tag("endfor")?;
        }

        Ok(Box::new(ForNode {
            span,
            expr,
            block,
            default,
        }))
    }
}

/// A `{% break %}` node.
#[derive(Debug)]
pub struct BreakNode {
    /// The source range of the tag.
    pub span: Span,
}

impl Node for BreakNode {
    fn span(&self) -> Span {
        self.span
    }

    fn tag_name(&self) -> Option<&str> {
        Some("break")
    }

    fn render_to_output(&self, _ctx: &mut RenderContext<'_>, _out: &mut Output) -> Result<usize> {
        Err(Error::Interrupt(Interrupt::Break))
    }
}

/// The standard `break` tag.
#[derive(Debug)]
pub struct BreakTag;

impl Tag for BreakTag {
    fn parse(&self, stream: &mut MarkupStream, _parser: &Parser<'_>) -> Result<Box<dyn Node>> {
        Ok(Box::new(BreakNode {
            span: stream.current().span(),
        }))
    }
}

/// A `{% continue %}` node.
#[derive(Debug)]
pub struct ContinueNode {
    /// The source range of the tag.
    pub span: Span,
}

impl Node for ContinueNode {
    fn span(&self) -> Span {
        self.span
    }

    fn tag_name(&self) -> Option<&str> {
        Some("continue")
    }

    fn render_to_output(&self, _ctx: &mut RenderContext<'_>, _out: &mut Output) -> Result<usize> {
        Err(Error::Interrupt(Interrupt::Continue))
    }
}

/// The standard `continue` tag.
#[derive(Debug)]
pub struct ContinueTag;

impl Tag for ContinueTag {
    fn parse(&self, stream: &mut MarkupStream, _parser: &Parser<'_>) -> Result<Box<dyn Node>> {
        Ok(Box::new(ContinueNode {
            span: stream.current().span(),
        }))
    }
}
