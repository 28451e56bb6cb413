//! The statement parser: a markup token stream becomes a syntax tree.

use crate::{
    ast::Node,
    environment::Environment,
    error::{Error, Result},
    expression::{self, Expression},
    stream::{ExprStream, MarkupStream},
    tags::{
        content::{CommentNode, ContentNode, OutputNode, RawNode},
        liquid_tag::LiquidNode,
    },
    token::{Markup, Span, WhitespaceControl},
};

/// A statement parser bound to an environment's tag and filter
/// registries.
#[derive(Debug)]
pub struct Parser<'env> {
    /// The owning environment.
    pub env: &'env Environment,
}

impl<'env> Parser<'env> {
    /// Creates a parser for the given environment.
    pub fn new(env: &'env Environment) -> Self {
        Self { env }
    }

    /// Parses a markup stream into a list of top-level nodes.
    pub fn parse(&self, markup: Vec<Markup>) -> Result<Vec<Box<dyn Node>>> {
        let mut stream = MarkupStream::new(markup);
        self.parse_block(&mut stream, &[])
    }

    /// Parses markup until end of input or a tag named in `end`.
    ///
    /// On an end tag the stream is left positioned at that tag and its
    /// right-trim hint is stored in the stream's trim carry, so the
    /// caller's next content node picks it up.
    pub fn parse_block(
        &self,
        stream: &mut MarkupStream,
        end: &[&str],
    ) -> Result<Vec<Box<dyn Node>>> {
        let mut nodes: Vec<Box<dyn Node>> = Vec::new();
        let mut left_trim = stream.trim_carry;
        stream.trim_carry = WhitespaceControl::Default;

        loop {
            match stream.current() {
                Markup::Content { span, text } => {
                    let right_trim = stream.peek().left_trim();
                    let text = self.env.trim(text, left_trim, right_trim).to_string();
                    nodes.push(Box::new(ContentNode { span: *span, text }));
                    left_trim = WhitespaceControl::Default;
                }
                Markup::Comment { span, text, .. } => {
                    left_trim = stream.current().right_trim();
                    nodes.push(Box::new(CommentNode {
                        span: *span,
                        text: text.clone(),
                    }));
                }
                Markup::Raw { span, wc, text } => {
                    left_trim = stream.current().right_trim();
                    // The inner hints trim the raw interior itself.
                    let text = self.env.trim(text, wc[1], wc[2]).to_string();
                    nodes.push(Box::new(RawNode { span: *span, text }));
                }
                Markup::Output { span, expression, .. } => {
                    left_trim = stream.current().right_trim();
                    let span = *span;
                    let mut expr_stream = ExprStream::new(expression.clone(), span);
                    let expression = expression::parse_filtered(&mut expr_stream)?;
                    expr_stream.expect_eos()?;
                    self.validate_filters(&expression)?;
                    nodes.push(Box::new(OutputNode { span, expression }));
                }
                Markup::Tag { name, span, .. } => {
                    let name = name.clone();
                    let span = *span;
                    left_trim = stream.current().right_trim();

                    if end.contains(&name.as_str()) {
                        stream.trim_carry = left_trim;
                        break;
                    }

                    let Some(tag) = self.env.tags.get(name.as_str()) else {
                        return Err(Error::syntax(format!("unknown tag '{name}'"), span));
                    };

                    // Block tags replace the carry with their end tag's
                    // hint; leaf tags leave it as set here.
                    stream.trim_carry = left_trim;
                    nodes.push(tag.parse(stream, self)?);
                    left_trim = stream.trim_carry;
                }
                Markup::Lines {
                    span, statements, ..
                } => {
                    left_trim = stream.current().right_trim();
                    let span = *span;
                    let statements = statements.clone();
                    let children = self.parse_lines(statements, span)?;
                    nodes.push(Box::new(LiquidNode {
                        span,
                        nodes: children,
                    }));
                }
                Markup::Eoi { .. } => break,
            }

            stream.next();
        }

        Ok(nodes)
    }

    /// Parses the statements of a `{% liquid %}` block. Block tags may
    /// span statements, so the list is parsed like any other stream.
    pub(crate) fn parse_lines(
        &self,
        mut statements: Vec<Markup>,
        span: Span,
    ) -> Result<Vec<Box<dyn Node>>> {
        statements.push(Markup::Eoi {
            span: Span::new(span.stop, span.stop),
        });
        let mut stream = MarkupStream::new(statements);
        self.parse_block(&mut stream, &[])
    }

    /// Checks every filter referenced by `expr` against the filter
    /// registry, when the environment asks for parse-time validation.
    pub(crate) fn validate_filters(&self, expr: &Expression) -> Result<()> {
        if !self.env.validate_filter_arguments {
            return Ok(());
        }
        self.validate_filters_inner(expr)
    }

    fn validate_filters_inner(&self, expr: &Expression) -> Result<()> {
        let check = |calls: &[expression::FilterCall]| -> Result<()> {
            for call in calls {
                let Some(filter) = self.env.filters.get(call.name.as_str()) else {
                    return Err(Error::UnknownFilter {
                        name: call.name.clone(),
                        span: call.span,
                    });
                };
                filter.validate(self.env, call.span, &call.name, &call.args)?;
            }
            Ok(())
        };

        match expr {
            Expression::Filtered(filtered) => check(&filtered.filters)?,
            Expression::Ternary(ternary) => {
                check(&ternary.left.filters)?;
                check(&ternary.alt_filters)?;
                check(&ternary.tail_filters)?;
            }
            _ => {}
        }

        for child in expr.children() {
            self.validate_filters_inner(child)?;
        }
        Ok(())
    }
}
