//! The standard `tablerow` tag.

use crate::{
    ast::{BlockNode, Node},
    context::RenderContext,
    error::{Error, Interrupt, Result},
    expression::{Expression, Identifier, LoopExpression},
    output::Output,
    parser::Parser,
    stream::{ExprStream, MarkupStream},
    tags::{for_tag::evaluate_loop, Tag},
    token::{Markup, Span},
    value::{Number, Value, ValueMap},
};
use futures::future::BoxFuture;

/// A `{% tablerow x in xs cols: n %}` node, emitting an HTML table body.
#[derive(Debug)]
pub struct TablerowNode {
    /// The source range of the opening tag.
    pub span: Span,
    /// The loop expression, including the `cols:` option.
    pub expr: LoopExpression,
    /// The cell body.
    pub block: BlockNode,
}

/// Builds the `tablerowloop` object for one cell.
fn tablerowloop_value(index: usize, length: usize, cols: usize, row: usize, col: usize) -> Value {
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
    map.insert("col".to_string(), Value::Int(col as i64 + 1));
    map.insert("col0".to_string(), Value::Int(col as i64));
    map.insert("col_first".to_string(), Value::Bool(col == 0));
    map.insert(
        "col_last".to_string(),
        Value::Bool(col + 1 == cols || index + 1 == length),
    );
    map.insert("row".to_string(), Value::Int(row as i64 + 1));
    Value::object(map)
}

impl TablerowNode {
    fn cols(&self, length: usize, ctx: &mut RenderContext<'_>) -> Result<usize> {
        let Some(cols) = &self.expr.cols else {
            return Ok(length.max(1));
        };
        let value = cols.evaluate(ctx)?;
        match value.to_number() {
            Some(Number::Int(value)) if value > 0 => Ok(value as usize),
            Some(Number::Float(value)) if value >= 1.0 => Ok(value as usize),
            _ => Err(Error::Type {
                message: format!("cols: expected a positive integer, found {}", value.type_name()),
                span: cols.span(),
            }),
        }
    }

    fn render_rows(&self, ctx: &mut RenderContext<'_>, out: &mut Output) -> Result<usize> {
        let items = evaluate_loop(&self.expr, self.span, ctx)?;
        let length = items.len();
        let cols = self.cols(length, ctx)?;

        let mut count = out.write("<tr class=\"row1\">\n")?;

        if items.is_empty() {
            return Ok(count + out.write("</tr>\n")?);
        }

        ctx.push_loop(length as u64, self.span)?;
        if let Err(err) = ctx.push_scope(ValueMap::new(), self.span) {
            ctx.pop_loop();
            return Err(err);
        }

        let mut failure = None;
        for (index, item) in items.into_iter().enumerate() {
            let row = index / cols;
            let col = index % cols;

            ctx.set_scope_value(&self.expr.ident.name, item);
            ctx.set_scope_value(
                "tablerowloop",
                tablerowloop_value(index, length, cols, row, col),
            );

            match out.write(&format!("<td class=\"col{}\">", col + 1)) {
                Ok(written) => count += written,
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }

            let mut stop = false;
            match self.block.render(ctx, out) {
                Ok(written) => count += written,
                Err(Error::Interrupt(Interrupt::Break)) => stop = true,
                Err(Error::Interrupt(Interrupt::Continue)) => {}
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }

            match out.write("</td>") {
                Ok(written) => count += written,
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }

            if stop {
                break;
            }

            if col + 1 == cols && index + 1 != length {
                match out.write(&format!("</tr>\n<tr class=\"row{}\">", row + 2)) {
                    Ok(written) => count += written,
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                }
            }
        }

        ctx.pop_scope();
        ctx.pop_loop();

        match failure {
            Some(err) => Err(err),
            None => Ok(count + out.write("</tr>\n")?),
        }
    }
}

impl Node for TablerowNode {
    fn span(&self) -> Span {
        self.span
    }

    fn tag_name(&self) -> Option<&str> {
        Some("tablerow")
    }

    fn render_to_output(&self, ctx: &mut RenderContext<'_>, out: &mut Output) -> Result<usize> {
        self.render_rows(ctx, out)
    }

    fn render_to_output_async<'a, 'env: 'a>(
        &'a self,
        ctx: &'a mut RenderContext<'env>,
        out: &'a mut Output,
    ) -> BoxFuture<'a, Result<usize>> {
        // Cell bodies are plain blocks; the synchronous walk is
        // sufficient unless a cell loads a partial, which `tablerow`
        // does not do itself.
        Box::pin(core::future::ready(self.render_rows(ctx, out)))
    }

    fn children(&self) -> Vec<&dyn Node> {
        vec![&self.block]
    }

    fn expressions(&self) -> Vec<&Expression> {
        self.expr.expressions()
    }

    fn block_scope(&self) -> Vec<Identifier> {
        vec![
            self.expr.ident.clone(),
            Identifier {
                name: "tablerowloop".to_string(),
                span: self.span,
            },
        ]
    }
}

/// The standard `tablerow` tag.
#[derive(Debug)]
pub struct TablerowTag;

impl Tag for TablerowTag {
    fn block(&self) -> bool {
        true
    }

    fn end_block(&self) -> &'static [&'static str] {
        &["endtablerow"]
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
        stream.expect_tag("endtablerow")?;

        Ok(Box::new(TablerowNode { span, expr, block }))
    }
}
