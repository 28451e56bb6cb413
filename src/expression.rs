//! Expressions for output statements and built-in tags.
//!
//! Three grammars are composed here: filtered expressions (`{{ ... }}`
//! and most tag arguments), boolean expressions (`if`/`unless` and the
//! condition of a ternary), and loop expressions (`for`/`tablerow`).

use crate::{
    context::RenderContext,
    error::{Error, Result},
    lexer,
    stream::ExprStream,
    token::{ExprToken, PathToken, Span, Token, TokenKind},
    value::{liquid_contains, liquid_eq, liquid_lt, to_liquid_string, Value, ValueMap},
};
use core::fmt;
use futures::future::BoxFuture;
use std::sync::Arc;

/// A name with the source range it was parsed from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Identifier {
    /// The name.
    pub name: String,
    /// The source range of the name.
    pub span: Span,
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A parsed expression.
#[derive(Clone, Debug)]
pub enum Expression {
    /// The `true` literal.
    True {
        /// The source range.
        span: Span,
    },
    /// The `false` literal.
    False {
        /// The source range.
        span: Span,
    },
    /// The `null`/`nil` literal.
    Null {
        /// The source range.
        span: Span,
    },
    /// The `empty` sentinel.
    Empty {
        /// The source range.
        span: Span,
    },
    /// The `blank` sentinel.
    Blank {
        /// The source range.
        span: Span,
    },
    /// An integer literal.
    Int {
        /// The value.
        value: i64,
        /// The source range.
        span: Span,
    },
    /// A float literal.
    Float {
        /// The value.
        value: f64,
        /// The source range.
        span: Span,
    },
    /// A string literal, after unescaping.
    Str {
        /// The decoded value.
        value: String,
        /// The source range.
        span: Span,
    },
    /// A string literal with `${ ... }` interpolations: a concatenation
    /// of literal chunks and embedded expressions.
    TemplateStr {
        /// The alternating parts.
        parts: Vec<TemplatePart>,
        /// The source range.
        span: Span,
    },
    /// A `(start..stop)` range literal.
    Range {
        /// The start bound.
        start: Box<Expression>,
        /// The stop bound, inclusive.
        stop: Box<Expression>,
        /// The source range.
        span: Span,
    },
    /// A variable path.
    Path(PathToken),
    /// A lambda passed as a filter argument.
    Lambda(Arc<Lambda>),
    /// A primary with a chain of filters.
    Filtered(Box<FilteredExpression>),
    /// An inline conditional with optional alternative and tail filters.
    Ternary(Box<TernaryExpression>),
    /// Logical negation.
    Not {
        /// The negated expression.
        expr: Box<Expression>,
        /// The source range of the operator.
        span: Span,
    },
    /// A binary operation.
    BinOp {
        /// The operator.
        op: BinaryOperator,
        /// The left operand.
        left: Box<Expression>,
        /// The right operand.
        right: Box<Expression>,
        /// The source range of the operator.
        span: Span,
    },
}

/// One part of a template string.
#[derive(Clone, Debug)]
pub enum TemplatePart {
    /// A literal chunk.
    Literal(String),
    /// An embedded `${ ... }` expression.
    Expr(Expression),
}

/// A binary operator in a boolean expression.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BinaryOperator {
    /// `==`
    Eq,
    /// `!=` and `<>`
    Ne,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Le,
    /// `>=`
    Ge,
    /// `and`
    And,
    /// `or`
    Or,
    /// `contains`
    Contains,
    /// `in`
    In,
}

impl BinaryOperator {
    fn as_str(self) -> &'static str {
        match self {
            BinaryOperator::Eq => "==",
            BinaryOperator::Ne => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::Gt => ">",
            BinaryOperator::Le => "<=",
            BinaryOperator::Ge => ">=",
            BinaryOperator::And => "and",
            BinaryOperator::Or => "or",
            BinaryOperator::Contains => "contains",
            BinaryOperator::In => "in",
        }
    }
}

/// A primary expression with a left-to-right filter chain.
#[derive(Clone, Debug)]
pub struct FilteredExpression {
    /// The primary.
    pub left: Expression,
    /// The filters, applied in order.
    pub filters: Vec<FilterCall>,
}

/// An `expr if cond else alt || tail` ternary.
///
/// Tail filters apply after either branch; the alternative's own filters
/// apply only to the alternative.
#[derive(Clone, Debug)]
pub struct TernaryExpression {
    /// The consequent and its filters.
    pub left: FilteredExpression,
    /// The condition.
    pub condition: Expression,
    /// The alternative, if one was given.
    pub alternative: Option<Expression>,
    /// Filters applied to the alternative only.
    pub alt_filters: Vec<FilterCall>,
    /// Filters applied after either branch.
    pub tail_filters: Vec<FilterCall>,
    /// The source range of the `if` keyword.
    pub span: Span,
}

/// A single filter application.
#[derive(Clone, Debug)]
pub struct FilterCall {
    /// The filter name.
    pub name: String,
    /// The source range of the name.
    pub span: Span,
    /// The arguments.
    pub args: Vec<FilterArg>,
}

/// An argument to a filter or tag.
#[derive(Clone, Debug)]
pub enum FilterArg {
    /// A positional argument.
    Positional(Expression),
    /// A `name: value` or `name = value` keyword argument.
    Keyword(Identifier, Expression),
    /// An unevaluated bare name.
    Symbol(Identifier),
}

impl FilterArg {
    /// The argument's value expression, if it has one.
    pub fn value(&self) -> Option<&Expression> {
        match self {
            FilterArg::Positional(expr) | FilterArg::Keyword(_, expr) => Some(expr),
            FilterArg::Symbol(_) => None,
        }
    }
}

/// A lambda such as `x => x.name` or `(x, i) => i`.
#[derive(Clone, Debug)]
pub struct Lambda {
    /// The parameter names; one or two.
    pub params: Vec<Identifier>,
    /// The body.
    pub body: Expression,
    /// The source range of the whole lambda.
    pub span: Span,
}

impl Lambda {
    /// Evaluates the body once for each item, binding the first parameter
    /// to the item and the optional second parameter to its index.
    pub fn map_over(&self, items: &[Value], ctx: &mut RenderContext<'_>) -> Result<Vec<Value>> {
        let mut out = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let mut scope = ValueMap::new();
            scope.insert(self.params[0].name.clone(), item.clone());
            if let Some(param) = self.params.get(1) {
                scope.insert(param.name.clone(), Value::Int(index as i64));
            }
            ctx.push_scope(scope, self.span)?;
            let value = self.body.evaluate(ctx);
            ctx.pop_scope();
            out.push(value?);
        }
        Ok(out)
    }
}

impl fmt::Display for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.len() == 1 {
            write!(f, "{} => {}", self.params[0], self.body)
        } else {
            let params: Vec<_> = self.params.iter().map(ToString::to_string).collect();
            write!(f, "({}) => {}", params.join(", "), self.body)
        }
    }
}

impl Expression {
    /// The source range of this expression.
    pub fn span(&self) -> Span {
        match self {
            Expression::True { span }
            | Expression::False { span }
            | Expression::Null { span }
            | Expression::Empty { span }
            | Expression::Blank { span }
            | Expression::Int { span, .. }
            | Expression::Float { span, .. }
            | Expression::Str { span, .. }
            | Expression::TemplateStr { span, .. }
            | Expression::Range { span, .. }
            | Expression::Not { span, .. }
            | Expression::BinOp { span, .. } => *span,
            Expression::Path(path) => path.span,
            Expression::Lambda(lambda) => lambda.span,
            Expression::Filtered(filtered) => filtered.left.span(),
            Expression::Ternary(ternary) => ternary.span,
        }
    }

    /// Evaluates the expression against the given render context.
    pub fn evaluate(&self, ctx: &mut RenderContext<'_>) -> Result<Value> {
        match self {
            Expression::True { .. } => Ok(Value::Bool(true)),
            Expression::False { .. } => Ok(Value::Bool(false)),
            Expression::Null { .. } => Ok(Value::Null),
            Expression::Empty { .. } => Ok(Value::Empty),
            Expression::Blank { .. } => Ok(Value::Blank),
            Expression::Int { value, .. } => Ok(Value::Int(*value)),
            Expression::Float { value, .. } => Ok(Value::Float(*value)),
            Expression::Str { value, .. } => {
                if ctx.auto_escape() {
                    Ok(Value::markup(value))
                } else {
                    Ok(Value::string(value))
                }
            }
            Expression::TemplateStr { parts, .. } => {
                let mut out = String::new();
                let auto_escape = ctx.auto_escape();
                for part in parts {
                    match part {
                        TemplatePart::Literal(text) => out.push_str(text),
                        TemplatePart::Expr(expr) => {
                            let value = expr.evaluate(ctx)?;
                            out.push_str(&to_liquid_string(&value, auto_escape));
                        }
                    }
                }
                if auto_escape {
                    Ok(Value::markup(out))
                } else {
                    Ok(Value::from(out))
                }
            }
            Expression::Range { start, stop, .. } => {
                let start = eval_range_bound(start, ctx)?;
                let stop = eval_range_bound(stop, ctx)?;
                Ok(Value::Range(start, stop))
            }
            Expression::Path(path) => ctx.get(path),
            Expression::Lambda(lambda) => Ok(Value::Lambda(Arc::clone(lambda))),
            Expression::Filtered(filtered) => filtered.evaluate(ctx),
            Expression::Ternary(ternary) => ternary.evaluate(ctx),
            Expression::Not { expr, .. } => Ok(Value::Bool(!expr.evaluate(ctx)?.is_truthy())),
            Expression::BinOp {
                op,
                left,
                right,
                span,
            } => eval_binop(*op, left, right, *span, ctx),
        }
    }

    /// An async version of [`Expression::evaluate`].
    ///
    /// Only filter applications can suspend; everything else delegates to
    /// the synchronous evaluator.
    pub fn evaluate_async<'a, 'env>(
        &'a self,
        ctx: &'a mut RenderContext<'env>,
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            match self {
                Expression::Filtered(filtered) => filtered.evaluate_async(ctx).await,
                Expression::Ternary(ternary) => ternary.evaluate_async(ctx).await,
                _ => self.evaluate(ctx),
            }
        })
    }

    /// The immediate sub-expressions of this expression.
    pub fn children(&self) -> Vec<&Expression> {
        match self {
            Expression::TemplateStr { parts, .. } => parts
                .iter()
                .filter_map(|part| match part {
                    TemplatePart::Expr(expr) => Some(expr),
                    TemplatePart::Literal(_) => None,
                })
                .collect(),
            Expression::Range { start, stop, .. } => vec![start, stop],
            Expression::Lambda(lambda) => vec![&lambda.body],
            Expression::Filtered(filtered) => filtered.children(),
            Expression::Ternary(ternary) => ternary.children(),
            Expression::Not { expr, .. } => vec![expr],
            Expression::BinOp { left, right, .. } => vec![left, right],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::True { .. } => f.write_str("true"),
            Expression::False { .. } => f.write_str("false"),
            Expression::Null { .. } => f.write_str("null"),
            Expression::Empty { .. } => f.write_str("empty"),
            Expression::Blank { .. } => f.write_str("blank"),
            Expression::Int { value, .. } => write!(f, "{value}"),
            Expression::Float { value, .. } => write!(f, "{value}"),
            Expression::Str { value, .. } => write!(f, "'{value}'"),
            Expression::TemplateStr { parts, .. } => {
                f.write_str("'")?;
                for part in parts {
                    match part {
                        TemplatePart::Literal(text) => f.write_str(text)?,
                        TemplatePart::Expr(expr) => write!(f, "${{{expr}}}")?,
                    }
                }
                f.write_str("'")
            }
            Expression::Range { start, stop, .. } => write!(f, "({start}..{stop})"),
            Expression::Path(path) => write!(f, "{path}"),
            Expression::Lambda(lambda) => write!(f, "{lambda}"),
            Expression::Filtered(filtered) => {
                write!(f, "{}", filtered.left)?;
                for filter in &filtered.filters {
                    write!(f, " | {filter}")?;
                }
                Ok(())
            }
            Expression::Ternary(ternary) => {
                write!(f, "{}", Expression::Filtered(Box::new(ternary.left.clone())))?;
                write!(f, " if {}", ternary.condition)?;
                if let Some(alternative) = &ternary.alternative {
                    write!(f, " else {alternative}")?;
                    for filter in &ternary.alt_filters {
                        write!(f, " | {filter}")?;
                    }
                }
                for filter in &ternary.tail_filters {
                    write!(f, " || {filter}")?;
                }
                Ok(())
            }
            Expression::Not { expr, .. } => write!(f, "not {expr}"),
            Expression::BinOp {
                op, left, right, ..
            } => write!(f, "{left} {} {right}", op.as_str()),
        }
    }
}

impl fmt::Display for FilterCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (index, arg) in self.args.iter().enumerate() {
            f.write_str(if index == 0 { ": " } else { ", " })?;
            match arg {
                FilterArg::Positional(expr) => write!(f, "{expr}")?,
                FilterArg::Keyword(name, expr) => write!(f, "{name}: {expr}")?,
                FilterArg::Symbol(name) => write!(f, "{name}")?,
            }
        }
        Ok(())
    }
}

/// A bound that does not coerce to a number falls back to zero, matching
/// the reference dialect.
fn eval_range_bound(expr: &Expression, ctx: &mut RenderContext<'_>) -> Result<i64> {
    let value = expr.evaluate(ctx)?;
    Ok(value
        .to_number()
        .map_or(0, |number| number.as_f64() as i64))
}

fn eval_binop(
    op: BinaryOperator,
    left: &Expression,
    right: &Expression,
    span: Span,
    ctx: &mut RenderContext<'_>,
) -> Result<Value> {
    // Logical connectives short-circuit.
    match op {
        BinaryOperator::And => {
            let value = left.evaluate(ctx)?.is_truthy() && right.evaluate(ctx)?.is_truthy();
            return Ok(Value::Bool(value));
        }
        BinaryOperator::Or => {
            let value = left.evaluate(ctx)?.is_truthy() || right.evaluate(ctx)?.is_truthy();
            return Ok(Value::Bool(value));
        }
        _ => {}
    }

    let left = left.evaluate(ctx)?;
    let right = right.evaluate(ctx)?;

    let value = match op {
        BinaryOperator::Eq => liquid_eq(&left, &right),
        BinaryOperator::Ne => !liquid_eq(&left, &right),
        BinaryOperator::Lt => liquid_lt(&left, &right, span)?,
        BinaryOperator::Gt => liquid_lt(&right, &left, span)?,
        BinaryOperator::Le => liquid_eq(&left, &right) || liquid_lt(&left, &right, span)?,
        BinaryOperator::Ge => liquid_eq(&left, &right) || liquid_lt(&right, &left, span)?,
        BinaryOperator::Contains => liquid_contains(&left, &right, span)?,
        BinaryOperator::In => liquid_contains(&right, &left, span)?,
        BinaryOperator::And | BinaryOperator::Or => unreachable!(),
    };
    Ok(Value::Bool(value))
}

impl FilteredExpression {
    fn evaluate(&self, ctx: &mut RenderContext<'_>) -> Result<Value> {
        let mut value = self.left.evaluate(ctx)?;
        for filter in &self.filters {
            value = filter.evaluate(value, ctx)?;
        }
        Ok(value)
    }

    async fn evaluate_async(&self, ctx: &mut RenderContext<'_>) -> Result<Value> {
        let mut value = self.left.evaluate_async(ctx).await?;
        for filter in &self.filters {
            value = filter.evaluate_async(value, ctx).await?;
        }
        Ok(value)
    }

    fn children(&self) -> Vec<&Expression> {
        let mut children = vec![&self.left];
        for filter in &self.filters {
            children.extend(filter.args.iter().filter_map(FilterArg::value));
        }
        children
    }
}

impl TernaryExpression {
    fn evaluate(&self, ctx: &mut RenderContext<'_>) -> Result<Value> {
        let mut value = Value::Null;

        if self.condition.evaluate(ctx)?.is_truthy() {
            value = self.left.evaluate(ctx)?;
        } else if let Some(alternative) = &self.alternative {
            value = alternative.evaluate(ctx)?;
            for filter in &self.alt_filters {
                value = filter.evaluate(value, ctx)?;
            }
        }

        for filter in &self.tail_filters {
            value = filter.evaluate(value, ctx)?;
        }

        Ok(value)
    }

    async fn evaluate_async(&self, ctx: &mut RenderContext<'_>) -> Result<Value> {
        let mut value = Value::Null;

        if self.condition.evaluate(ctx)?.is_truthy() {
            value = self.left.evaluate_async(ctx).await?;
        } else if let Some(alternative) = &self.alternative {
            value = alternative.evaluate_async(ctx).await?;
            for filter in &self.alt_filters {
                value = filter.evaluate_async(value, ctx).await?;
            }
        }

        for filter in &self.tail_filters {
            value = filter.evaluate_async(value, ctx).await?;
        }

        Ok(value)
    }

    fn children(&self) -> Vec<&Expression> {
        let mut children = self.left.children();
        children.push(&self.condition);
        if let Some(alternative) = &self.alternative {
            children.push(alternative);
        }
        for filter in self.alt_filters.iter().chain(&self.tail_filters) {
            children.extend(filter.args.iter().filter_map(FilterArg::value));
        }
        children
    }
}

impl FilterCall {
    /// Applies the filter to `input`.
    pub fn evaluate(&self, input: Value, ctx: &mut RenderContext<'_>) -> Result<Value> {
        let filter = ctx.filter(&self.name, self.span)?;
        let args = self.evaluate_args(ctx)?;
        filter.call(input, &args, ctx, self.span)
    }

    /// An async version of [`FilterCall::evaluate`].
    pub async fn evaluate_async(&self, input: Value, ctx: &mut RenderContext<'_>) -> Result<Value> {
        let filter = ctx.filter(&self.name, self.span)?;
        let args = self.evaluate_args(ctx)?;
        filter.call_async(input, args, ctx, self.span).await
    }

    fn evaluate_args(&self, ctx: &mut RenderContext<'_>) -> Result<crate::filters::FilterArgs> {
        let mut positional = Vec::new();
        let mut keyword = ValueMap::new();
        for arg in &self.args {
            match arg {
                FilterArg::Positional(expr) => positional.push(expr.evaluate(ctx)?),
                FilterArg::Keyword(name, expr) => {
                    keyword.insert(name.name.clone(), expr.evaluate(ctx)?);
                }
                FilterArg::Symbol(name) => {
                    positional.push(Value::string(&name.name));
                }
            }
        }
        Ok(crate::filters::FilterArgs {
            positional,
            keyword,
            span: self.span,
        })
    }
}

// Parsing.

/// Parses a filtered expression, optionally extended to a ternary.
pub fn parse_filtered(stream: &mut ExprStream) -> Result<Expression> {
    let left = parse_primary(stream)?;
    let filters = parse_filters(stream, &[TokenKind::Pipe])?;
    let filtered = FilteredExpression { left, filters };

    if stream.is_kind(TokenKind::If) {
        let if_token = stream.next();
        let condition = parse_boolean(stream)?;

        let mut alternative = None;
        let mut alt_filters = Vec::new();
        if stream.is_kind(TokenKind::Else) {
            stream.next();
            alternative = Some(parse_primary(stream)?);
            if stream.is_kind(TokenKind::Pipe) {
                alt_filters = parse_filters(stream, &[TokenKind::Pipe])?;
            }
        }

        let mut tail_filters = Vec::new();
        if stream.is_kind(TokenKind::DoublePipe) {
            tail_filters = parse_filters(stream, &[TokenKind::Pipe, TokenKind::DoublePipe])?;
        }

        return Ok(Expression::Ternary(Box::new(TernaryExpression {
            left: filtered,
            condition,
            alternative,
            alt_filters,
            tail_filters,
            span: if_token.span(),
        })));
    }

    if filtered.filters.is_empty() {
        Ok(filtered.left)
    } else {
        Ok(Expression::Filtered(Box::new(filtered)))
    }
}

/// Parses a boolean expression with the grammar's full operator set.
pub fn parse_boolean(stream: &mut ExprStream) -> Result<Expression> {
    parse_boolean_primitive(stream, Precedence::Lowest)
}

/// Operator precedence, low to high.
#[derive(Copy, Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
enum Precedence {
    Lowest,
    LogicalOr,
    LogicalAnd,
    Relational,
    Membership,
    Prefix,
}

fn precedence_of(kind: TokenKind) -> Precedence {
    match kind {
        TokenKind::Or => Precedence::LogicalOr,
        TokenKind::And => Precedence::LogicalAnd,
        TokenKind::Eq
        | TokenKind::Ne
        | TokenKind::Lt
        | TokenKind::Gt
        | TokenKind::Le
        | TokenKind::Ge => Precedence::Relational,
        TokenKind::In | TokenKind::Contains => Precedence::Membership,
        _ => Precedence::Lowest,
    }
}

fn binary_operator(kind: TokenKind) -> Option<BinaryOperator> {
    match kind {
        TokenKind::Eq => Some(BinaryOperator::Eq),
        TokenKind::Ne => Some(BinaryOperator::Ne),
        TokenKind::Lt => Some(BinaryOperator::Lt),
        TokenKind::Gt => Some(BinaryOperator::Gt),
        TokenKind::Le => Some(BinaryOperator::Le),
        TokenKind::Ge => Some(BinaryOperator::Ge),
        TokenKind::And => Some(BinaryOperator::And),
        TokenKind::Or => Some(BinaryOperator::Or),
        TokenKind::Contains => Some(BinaryOperator::Contains),
        TokenKind::In => Some(BinaryOperator::In),
        _ => None,
    }
}

fn parse_boolean_primitive(stream: &mut ExprStream, precedence: Precedence) -> Result<Expression> {
    let mut left = match stream.kind() {
        Some(TokenKind::Not) => {
            let token = stream.next();
            // `not` binds tighter than any infix operator.
            let expr = parse_boolean_primitive(stream, Precedence::Prefix)?;
            Expression::Not {
                expr: Box::new(expr),
                span: token.span(),
            }
        }
        Some(TokenKind::LParen) => {
            stream.next();
            let expr = parse_boolean_primitive(stream, Precedence::Lowest)?;
            stream.expect(TokenKind::RParen)?;
            stream.next();
            expr
        }
        _ => parse_primary(stream)?,
    };

    loop {
        let Some(kind) = stream.kind() else {
            // A path or range is never an infix operator.
            return Ok(left);
        };
        let Some(op) = binary_operator(kind) else {
            return Ok(left);
        };
        let op_precedence = precedence_of(kind);
        if op_precedence < precedence {
            return Ok(left);
        }

        let token = stream.next();
        // Passing the operator's own precedence keeps connectives
        // right-associative, matching the reference dialect.
        let right = parse_boolean_primitive(stream, op_precedence)?;
        left = Expression::BinOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
            span: token.span(),
        };
    }
}

/// Parses a single primary expression from the stream.
pub fn parse_primary(stream: &mut ExprStream) -> Result<Expression> {
    let token = stream.next();
    parse_primitive(token)
}

/// Converts a single token into a primary expression.
pub fn parse_primitive(token: ExprToken) -> Result<Expression> {
    match token {
        ExprToken::Token(token) => parse_atom(token),
        ExprToken::Path(path) => Ok(Expression::Path(path)),
        ExprToken::Range(range) => {
            let start = parse_primitive(*range.start)?;
            let stop = parse_primitive(*range.stop)?;
            Ok(Expression::Range {
                start: Box::new(start),
                stop: Box::new(stop),
                span: range.span,
            })
        }
    }
}

fn parse_atom(token: Token) -> Result<Expression> {
    let span = token.span;
    match token.kind {
        TokenKind::True => Ok(Expression::True { span }),
        TokenKind::False => Ok(Expression::False { span }),
        TokenKind::Null => Ok(Expression::Null { span }),
        TokenKind::Word if token.value == "empty" => Ok(Expression::Empty { span }),
        TokenKind::Word if token.value == "blank" => Ok(Expression::Blank { span }),
        TokenKind::Word => Ok(Expression::Path(PathToken {
            segments: vec![crate::token::PathSegment::Name(token.value)],
            span,
        })),
        TokenKind::Int => {
            // Integers may carry a non-negative exponent.
            let value = if token.value.contains(['e', 'E']) {
                token
                    .value
                    .parse::<f64>()
                    .map_err(|_| Error::syntax("invalid integer literal", span))?
                    as i64
            } else {
                token
                    .value
                    .parse::<i64>()
                    .map_err(|_| Error::syntax("integer literal out of range", span))?
            };
            Ok(Expression::Int { value, span })
        }
        TokenKind::Float => {
            let value = token
                .value
                .parse::<f64>()
                .map_err(|_| Error::syntax("invalid float literal", span))?;
            Ok(Expression::Float { value, span })
        }
        TokenKind::SingleQuoteString | TokenKind::DoubleQuoteString => {
            parse_string_literal(&token.value, span)
        }
        _ => Err(Error::syntax(
            format!(
                "expected a primitive expression, found {}",
                token.kind.description()
            ),
            span,
        )),
    }
}

/// Parses a string literal, splitting `${ ... }` interpolations into a
/// template string. The unescape pass runs on each literal chunk.
fn parse_string_literal(raw: &str, span: Span) -> Result<Expression> {
    if !raw.contains("${") {
        return Ok(Expression::Str {
            value: lexer::unescape(raw, span)?,
            span,
        });
    }

    // The literal's interior starts one byte after the opening quote.
    let base = span.start + 1;
    let bytes = raw.as_bytes();
    let mut parts = Vec::new();
    let mut chunk_start = 0;
    let mut index = 0;

    while index < bytes.len() {
        match bytes[index] {
            b'\\' => index += 2,
            b'$' if bytes.get(index + 1) == Some(&b'{') => {
                if index > chunk_start {
                    parts.push(TemplatePart::Literal(lexer::unescape(
                        &raw[chunk_start..index],
                        span,
                    )?));
                }

                let expr_start = index + 2;
                let Some(offset) = raw[expr_start..].find('}') else {
                    return Err(Error::syntax("unclosed '${' in string literal", span));
                };
                let expr_stop = expr_start + offset;

                let tokens =
                    lexer::tokenize_fragment(&raw[expr_start..expr_stop], base + expr_start)?;
                let mut expr_stream =
                    ExprStream::new(tokens, Span::new(base + expr_start, base + expr_stop));
                let expr = parse_filtered(&mut expr_stream)?;
                expr_stream.expect_eos()?;
                parts.push(TemplatePart::Expr(expr));

                index = expr_stop + 1;
                chunk_start = index;
            }
            _ => index += 1,
        }
    }

    if chunk_start < bytes.len() {
        parts.push(TemplatePart::Literal(lexer::unescape(
            &raw[chunk_start..],
            span,
        )?));
    }

    // `\$` escapes can leave a literal with no interpolations after all.
    if parts.len() == 1 {
        if let TemplatePart::Literal(value) = &parts[0] {
            return Ok(Expression::Str {
                value: value.clone(),
                span,
            });
        }
    }

    Ok(Expression::TemplateStr { parts, span })
}

/// Parses a filter chain introduced by any of the delimiters in `delims`.
///
/// Leading, trailing and duplicate commas between arguments are
/// tolerated, matching the reference dialect.
pub fn parse_filters(stream: &mut ExprStream, delims: &[TokenKind]) -> Result<Vec<FilterCall>> {
    let mut filters = Vec::new();

    while stream.kind().is_some_and(|kind| delims.contains(&kind)) {
        stream.next();
        stream.expect(TokenKind::Word)?;
        let ExprToken::Token(name_token) = stream.next() else {
            unreachable!()
        };

        let mut args = Vec::new();
        if stream.is_kind(TokenKind::Colon) {
            stream.next();
            parse_filter_arguments(stream, &mut args)?;
        }

        filters.push(FilterCall {
            name: name_token.value,
            span: name_token.span,
            args,
        });
    }

    Ok(filters)
}

fn parse_filter_arguments(stream: &mut ExprStream, args: &mut Vec<FilterArg>) -> Result<()> {
    loop {
        match stream.current() {
            ExprToken::Token(token) => match token.kind {
                TokenKind::Comma => {
                    stream.next();
                }
                TokenKind::Word => {
                    if stream.peek().is_kind(TokenKind::Assign)
                        || stream.peek().is_kind(TokenKind::Colon)
                    {
                        let name = parse_identifier(stream.next())?;
                        stream.next(); // the separator
                        let value = parse_primary(stream)?;
                        args.push(FilterArg::Keyword(name, value));
                    } else if stream.peek().is_kind(TokenKind::Arrow) {
                        args.push(FilterArg::Positional(parse_lambda(stream)?));
                    } else {
                        args.push(FilterArg::Positional(parse_primary(stream)?));
                    }
                }
                TokenKind::LParen => {
                    args.push(FilterArg::Positional(parse_lambda(stream)?));
                }
                TokenKind::Int
                | TokenKind::Float
                | TokenKind::SingleQuoteString
                | TokenKind::DoubleQuoteString
                | TokenKind::True
                | TokenKind::False
                | TokenKind::Null => {
                    args.push(FilterArg::Positional(parse_primary(stream)?));
                }
                _ => return Ok(()),
            },
            ExprToken::Path(_) | ExprToken::Range(_) => {
                args.push(FilterArg::Positional(parse_primary(stream)?));
            }
        }
    }
}

/// Parses a lambda: `name => expr` or `(a, b) => expr`.
fn parse_lambda(stream: &mut ExprStream) -> Result<Expression> {
    let start = stream.current().span();
    let mut params = Vec::new();

    if stream.is_kind(TokenKind::LParen) {
        stream.next();
        loop {
            match stream.kind() {
                Some(TokenKind::RParen) => {
                    stream.next();
                    break;
                }
                Some(TokenKind::Comma) => {
                    stream.next();
                }
                _ => {
                    stream.expect(TokenKind::Word)?;
                    params.push(parse_identifier(stream.next())?);
                }
            }
        }
    } else {
        stream.expect(TokenKind::Word)?;
        params.push(parse_identifier(stream.next())?);
    }

    if params.is_empty() {
        return Err(Error::syntax("expected a lambda parameter", start));
    }

    stream.expect(TokenKind::Arrow)?;
    stream.next();

    let body = parse_boolean_primitive(stream, Precedence::Lowest)?;
    let span = start.merge(body.span());

    Ok(Expression::Lambda(Arc::new(Lambda { params, body, span })))
}

/// Parses a loop expression: `ident in iterable` followed by `limit:`,
/// `offset:`, `cols:` and `reversed` options in any order.
#[derive(Clone, Debug)]
pub struct LoopExpression {
    /// The loop variable name.
    pub ident: Identifier,
    /// The iterable.
    pub iterable: Expression,
    /// The `limit:` option.
    pub limit: Option<Expression>,
    /// The `offset:` option.
    pub offset: Option<LoopOffset>,
    /// The `cols:` option (used by `tablerow`).
    pub cols: Option<Expression>,
    /// The `reversed` flag.
    pub reversed: bool,
    /// The source range of the loop variable.
    pub span: Span,
}

/// The `offset:` option of a loop expression.
#[derive(Clone, Debug)]
pub enum LoopOffset {
    /// A numeric offset.
    Expr(Expression),
    /// The `continue` marker: resume after the previous co-fingerprinted
    /// loop's stop index.
    Continue(Span),
}

impl LoopExpression {
    /// Parses a loop expression from the stream.
    pub fn parse(stream: &mut ExprStream) -> Result<Self> {
        let ident = parse_identifier(stream.next())?;
        stream.expect(TokenKind::In)?;
        stream.next();
        let iterable = parse_primary(stream)?;

        let mut limit = None;
        let mut offset = None;
        let mut cols = None;
        let mut reversed = false;

        loop {
            let token = stream.next();
            match &token {
                ExprToken::Token(atom) => match atom.kind {
                    TokenKind::Eoi => break,
                    TokenKind::Comma => continue,
                    TokenKind::Word if atom.value == "reversed" => reversed = true,
                    TokenKind::Word if atom.value == "limit" => {
                        stream.expect_one_of(&[TokenKind::Colon, TokenKind::Assign])?;
                        stream.next();
                        limit = Some(parse_primary(stream)?);
                    }
                    TokenKind::Word if atom.value == "cols" => {
                        stream.expect_one_of(&[TokenKind::Colon, TokenKind::Assign])?;
                        stream.next();
                        cols = Some(parse_primary(stream)?);
                    }
                    TokenKind::Word if atom.value == "offset" => {
                        stream.expect_one_of(&[TokenKind::Colon, TokenKind::Assign])?;
                        stream.next();
                        let offset_token = stream.next();
                        if offset_token.is_word("continue") {
                            offset = Some(LoopOffset::Continue(offset_token.span()));
                        } else {
                            offset = Some(LoopOffset::Expr(parse_primitive(offset_token)?));
                        }
                    }
                    _ => {
                        return Err(Error::syntax(
                            "expected 'reversed', 'offset', 'cols' or 'limit'",
                            token.span(),
                        ))
                    }
                },
                _ => {
                    return Err(Error::syntax(
                        "expected 'reversed', 'offset', 'cols' or 'limit'",
                        token.span(),
                    ))
                }
            }
        }

        let span = ident.span;
        Ok(LoopExpression {
            ident,
            iterable,
            limit,
            offset,
            cols,
            reversed,
            span,
        })
    }

    /// The expressions referenced by this loop, for static analysis.
    pub fn expressions(&self) -> Vec<&Expression> {
        let mut exprs = vec![&self.iterable];
        if let Some(limit) = &self.limit {
            exprs.push(limit);
        }
        if let Some(LoopOffset::Expr(offset)) = &self.offset {
            exprs.push(offset);
        }
        if let Some(cols) = &self.cols {
            exprs.push(cols);
        }
        exprs
    }

    /// The stop-index fingerprint for `offset: continue`, combining the
    /// loop variable with its iterable source.
    pub fn fingerprint(&self) -> String {
        format!("{}-{}", self.ident, self.iterable)
    }
}

/// Parses a token as an identifier.
pub fn parse_identifier(token: ExprToken) -> Result<Identifier> {
    match token {
        ExprToken::Token(Token {
            kind: TokenKind::Word,
            value,
            span,
        }) => Ok(Identifier { name: value, span }),
        token => Err(Error::syntax(
            format!("expected an identifier, found {}", token.description()),
            token.span(),
        )),
    }
}

/// Parses a token as an identifier or a string literal.
pub fn parse_string_or_identifier(token: ExprToken) -> Result<Identifier> {
    match token {
        ExprToken::Token(Token {
            kind: TokenKind::Word,
            value,
            span,
        }) => Ok(Identifier { name: value, span }),
        ExprToken::Token(Token {
            kind: TokenKind::SingleQuoteString | TokenKind::DoubleQuoteString,
            value,
            span,
        }) => Ok(Identifier {
            name: lexer::unescape(&value, span)?,
            span,
        }),
        token => Err(Error::syntax(
            format!("expected an identifier, found {}", token.description()),
            token.span(),
        )),
    }
}

/// Parses the remainder of the stream as keyword arguments.
///
/// Keys and values may be separated by `:` or `=`; commas between pairs
/// are optional and duplicates are tolerated.
pub fn parse_keyword_arguments(stream: &mut ExprStream) -> Result<Vec<(Identifier, Expression)>> {
    let mut args = Vec::new();

    loop {
        let token = stream.next();
        match &token {
            ExprToken::Token(atom) => match atom.kind {
                TokenKind::Eoi => break,
                TokenKind::Comma => continue,
                TokenKind::Word => {
                    let name = parse_identifier(token)?;
                    stream.expect_one_of(&[TokenKind::Colon, TokenKind::Assign])?;
                    stream.next();
                    let value = parse_primary(stream)?;
                    args.push((name, value));
                }
                _ => {
                    return Err(Error::syntax(
                        format!(
                            "expected a list of keyword arguments, found {}",
                            token.description()
                        ),
                        token.span(),
                    ))
                }
            },
            _ => {
                return Err(Error::syntax(
                    format!(
                        "expected a list of keyword arguments, found {}",
                        token.description()
                    ),
                    token.span(),
                ))
            }
        }
    }

    Ok(args)
}
