//! Top-level markup and expression tokens produced by the lexer.

use core::fmt;
use regex::Regex;
use std::sync::LazyLock;

/// A range of text within a template source buffer.
#[derive(Copy, Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Span {
    /// The byte offset of the first byte of the span.
    pub start: usize,
    /// The byte offset after the last byte of the span.
    pub stop: usize,
}

impl Span {
    /// Creates a new span.
    #[inline]
    pub fn new(start: usize, stop: usize) -> Self {
        Span { start, stop }
    }

    /// Returns true if this span is empty.
    #[inline]
    pub fn is_empty(self) -> bool {
        self.start >= self.stop
    }

    /// The length of the span, in bytes.
    #[inline]
    pub fn len(self) -> usize {
        self.stop - self.start
    }

    /// Creates a span that encloses both `self` and `other`.
    #[inline]
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            stop: self.stop.max(other.stop),
        }
    }

    /// Converts the span into a range that can be used for string indexing.
    #[inline]
    pub fn into_range(self) -> core::ops::Range<usize> {
        self.start..self.stop
    }
}

/// A whitespace control hint attached to one side of a markup delimiter.
///
/// `Default` defers to the environment's configured trim policy.
#[derive(Copy, Clone, Debug, Default, Eq, Hash, PartialEq)]
pub enum WhitespaceControl {
    /// No explicit hint; the environment decides.
    #[default]
    Default,
    /// `+`: preserve whitespace.
    Plus,
    /// `-`: strip all whitespace.
    Minus,
    /// `~`: strip only carriage returns and newlines.
    Tilde,
}

impl fmt::Display for WhitespaceControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WhitespaceControl::Default => "",
            WhitespaceControl::Plus => "+",
            WhitespaceControl::Minus => "-",
            WhitespaceControl::Tilde => "~",
        })
    }
}

/// A top-level markup token.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Markup {
    /// Literal template text between markup delimiters.
    Content {
        /// The source range of the text.
        span: Span,
        /// The text itself.
        text: String,
    },
    /// Literal content bracketed by `{% raw %}` and `{% endraw %}`.
    Raw {
        /// The source range of the whole construct.
        span: Span,
        /// Whitespace control for the four delimiter sides, outer-left to
        /// outer-right.
        wc: [WhitespaceControl; 4],
        /// The opaque interior.
        text: String,
    },
    /// A `{# ... #}` comment with any number of balanced hash characters.
    Comment {
        /// The source range of the whole construct.
        span: Span,
        /// Whitespace control for the two delimiter sides.
        wc: (WhitespaceControl, WhitespaceControl),
        /// The comment text.
        text: String,
        /// The number of hash characters in each delimiter.
        hashes: usize,
    },
    /// The interior of an `{{ ... }}` output statement.
    Output {
        /// The source range of the whole construct.
        span: Span,
        /// Whitespace control for the two delimiter sides.
        wc: (WhitespaceControl, WhitespaceControl),
        /// The expression tokens between the delimiters.
        expression: Vec<ExprToken>,
    },
    /// A `{% name ... %}` tag.
    Tag {
        /// The source range of the whole construct.
        span: Span,
        /// Whitespace control for the two delimiter sides.
        wc: (WhitespaceControl, WhitespaceControl),
        /// The tag name.
        name: String,
        /// The expression tokens after the name.
        expression: Vec<ExprToken>,
    },
    /// The multi-statement `{% liquid ... %}` block. Statements are `Tag`
    /// and `Comment` tokens, one per physical line.
    Lines {
        /// The source range of the whole construct.
        span: Span,
        /// Whitespace control for the two delimiter sides.
        wc: (WhitespaceControl, WhitespaceControl),
        /// The inner statements.
        statements: Vec<Markup>,
    },
    /// The end-of-input sentinel.
    Eoi {
        /// The (empty) source range at the end of input.
        span: Span,
    },
}

impl Markup {
    /// The source range of this token.
    pub fn span(&self) -> Span {
        match self {
            Markup::Content { span, .. }
            | Markup::Raw { span, .. }
            | Markup::Comment { span, .. }
            | Markup::Output { span, .. }
            | Markup::Tag { span, .. }
            | Markup::Lines { span, .. }
            | Markup::Eoi { span } => *span,
        }
    }

    /// The whitespace control hint on the left side of this token, if any.
    pub fn left_trim(&self) -> WhitespaceControl {
        match self {
            Markup::Raw { wc, .. } => wc[0],
            Markup::Comment { wc, .. }
            | Markup::Output { wc, .. }
            | Markup::Tag { wc, .. }
            | Markup::Lines { wc, .. } => wc.0,
            Markup::Content { .. } | Markup::Eoi { .. } => WhitespaceControl::Default,
        }
    }

    /// The whitespace control hint on the right side of this token, if any.
    pub fn right_trim(&self) -> WhitespaceControl {
        match self {
            Markup::Raw { wc, .. } => wc[3],
            Markup::Comment { wc, .. }
            | Markup::Output { wc, .. }
            | Markup::Tag { wc, .. }
            | Markup::Lines { wc, .. } => wc.1,
            Markup::Content { .. } | Markup::Eoi { .. } => WhitespaceControl::Default,
        }
    }

    /// Returns true if this is a `Tag` token with the given name.
    pub fn is_tag(&self, tag_name: &str) -> bool {
        matches!(self, Markup::Tag { name, .. } if name == tag_name)
    }

    /// Returns true if this is a `Tag` token with a name in `tag_names`.
    pub fn is_one_of(&self, tag_names: &[&str]) -> bool {
        matches!(self, Markup::Tag { name, .. } if tag_names.contains(&name.as_str()))
    }

    /// Returns true if this is the end-of-input sentinel.
    pub fn is_eoi(&self) -> bool {
        matches!(self, Markup::Eoi { .. })
    }
}

impl fmt::Display for Markup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Markup::Content { text, .. } => f.write_str(text),
            Markup::Raw { wc, text, .. } => {
                write!(
                    f,
                    "{{%{} raw {}%}}{text}{{%{} endraw {}%}}",
                    wc[0], wc[1], wc[2], wc[3]
                )
            }
            Markup::Comment {
                wc, text, hashes, ..
            } => {
                let hashes = "#".repeat(*hashes);
                write!(f, "{{{hashes}{}{text}{}{hashes}}}", wc.0, wc.1)
            }
            Markup::Output { wc, expression, .. } => {
                write!(f, "{{{{{} {} {}}}}}", wc.0, ExprTokens(expression), wc.1)
            }
            Markup::Tag {
                wc,
                name,
                expression,
                ..
            } => {
                if expression.is_empty() {
                    write!(f, "{{%{} {name} {}%}}", wc.0, wc.1)
                } else {
                    write!(f, "{{%{} {name} {} {}%}}", wc.0, ExprTokens(expression), wc.1)
                }
            }
            Markup::Lines { wc, statements, .. } => {
                write!(f, "{{%{} liquid", wc.0)?;
                for statement in statements {
                    match statement {
                        Markup::Tag {
                            name, expression, ..
                        } => {
                            if expression.is_empty() {
                                write!(f, "\n{name}")?;
                            } else {
                                write!(f, "\n{name} {}", ExprTokens(expression))?;
                            }
                        }
                        Markup::Comment { text, .. } => write!(f, "\n# {text}")?,
                        _ => {}
                    }
                }
                write!(f, " {}%}}", wc.1)
            }
            Markup::Eoi { .. } => Ok(()),
        }
    }
}

/// Display adapter joining a list of expression tokens with spaces.
struct ExprTokens<'a>(&'a [ExprToken]);

impl fmt::Display for ExprTokens<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, token) in self.0.iter().enumerate() {
            if index != 0 {
                f.write_str(" ")?;
            }
            write!(f, "{token}")?;
        }
        Ok(())
    }
}

/// The kind of an atomic expression token.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum TokenKind {
    /// The `true` keyword.
    True,
    /// The `false` keyword.
    False,
    /// The `null` or `nil` keyword.
    Null,
    /// The `and` keyword.
    And,
    /// The `or` keyword.
    Or,
    /// The `not` keyword.
    Not,
    /// The `in` keyword.
    In,
    /// The `contains` keyword.
    Contains,
    /// The `if` keyword.
    If,
    /// The `else` keyword.
    Else,
    /// The `with` keyword.
    With,
    /// The `required` keyword.
    Required,
    /// The `as` keyword.
    As,
    /// The `for` keyword.
    For,
    /// A bare word.
    Word,
    /// An integer literal.
    Int,
    /// A float literal.
    Float,
    /// A single-quoted string literal.
    SingleQuoteString,
    /// A double-quoted string literal.
    DoubleQuoteString,
    /// `==`
    Eq,
    /// `!=` or `<>`
    Ne,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Le,
    /// `>=`
    Ge,
    /// `..`
    DoubleDot,
    /// `||`
    DoublePipe,
    /// `|`
    Pipe,
    /// `=`
    Assign,
    /// `:`
    Colon,
    /// `,`
    Comma,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `=>`
    Arrow,
    /// The end of an expression token stream.
    Eoi,
}

impl TokenKind {
    /// A human-readable description used in error messages.
    pub fn description(self) -> &'static str {
        match self {
            TokenKind::True => "'true'",
            TokenKind::False => "'false'",
            TokenKind::Null => "'null'",
            TokenKind::And => "'and'",
            TokenKind::Or => "'or'",
            TokenKind::Not => "'not'",
            TokenKind::In => "'in'",
            TokenKind::Contains => "'contains'",
            TokenKind::If => "'if'",
            TokenKind::Else => "'else'",
            TokenKind::With => "'with'",
            TokenKind::Required => "'required'",
            TokenKind::As => "'as'",
            TokenKind::For => "'for'",
            TokenKind::Word => "a word",
            TokenKind::Int => "an integer",
            TokenKind::Float => "a float",
            TokenKind::SingleQuoteString | TokenKind::DoubleQuoteString => "a string",
            TokenKind::Eq => "'=='",
            TokenKind::Ne => "'!='",
            TokenKind::Lt => "'<'",
            TokenKind::Gt => "'>'",
            TokenKind::Le => "'<='",
            TokenKind::Ge => "'>='",
            TokenKind::DoubleDot => "'..'",
            TokenKind::DoublePipe => "'||'",
            TokenKind::Pipe => "'|'",
            TokenKind::Assign => "'='",
            TokenKind::Colon => "':'",
            TokenKind::Comma => "','",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::Arrow => "'=>'",
            TokenKind::Eoi => "end of expression",
        }
    }
}

/// An atomic expression lexeme.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Token {
    /// The kind of the lexeme.
    pub kind: TokenKind,
    /// The lexeme text. For string tokens this is the raw interior,
    /// excluding the quotes but including escape sequences.
    pub value: String,
    /// The source range of the lexeme.
    pub span: Span,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::SingleQuoteString => write!(f, "'{}'", self.value),
            TokenKind::DoubleQuoteString => write!(f, "\"{}\"", self.value),
            _ => f.write_str(&self.value),
        }
    }
}

/// One segment of a variable path.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PathSegment {
    /// A property name, from shorthand or bracketed string notation.
    Name(String),
    /// A sequence index; may be negative.
    Index(i64),
    /// A nested path whose scalar result is the segment value.
    Sub(PathToken),
}

/// A variable path: a head name and zero or more segments.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PathToken {
    /// The path segments. The first segment is always a `Name`, the head.
    pub segments: Vec<PathSegment>,
    /// The source range of the whole path.
    pub span: Span,
}

static PROPERTY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\u{80}-\u{10FFFF}a-zA-Z_][\u{80}-\u{10FFFF}a-zA-Z0-9_-]*$").unwrap());

impl PathToken {
    /// The head name of the path.
    pub fn head(&self) -> &str {
        match &self.segments[0] {
            PathSegment::Name(name) => name,
            // The lexer only ever emits a name head.
            _ => "",
        }
    }
}

impl fmt::Display for PathToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut it = self.segments.iter();
        if let Some(PathSegment::Name(head)) = it.next() {
            f.write_str(head)?;
        }
        for segment in it {
            match segment {
                PathSegment::Name(name) if PROPERTY.is_match(name) => write!(f, ".{name}")?,
                PathSegment::Name(name) => write!(f, "['{name}']")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
                PathSegment::Sub(path) => write!(f, "[{path}]")?,
            }
        }
        Ok(())
    }
}

/// A `(start..stop)` range expression, rewritten by the lexer from its
/// component tokens.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RangeToken {
    /// The start bound.
    pub start: Box<ExprToken>,
    /// The stop bound, inclusive.
    pub stop: Box<ExprToken>,
    /// The source range of the whole construct.
    pub span: Span,
}

impl fmt::Display for RangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}..{})", self.start, self.stop)
    }
}

/// A token inside an output statement, tag expression, or line statement.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExprToken {
    /// An atomic lexeme.
    Token(Token),
    /// A variable path.
    Path(PathToken),
    /// A range expression.
    Range(RangeToken),
}

impl ExprToken {
    /// The source range of this token.
    pub fn span(&self) -> Span {
        match self {
            ExprToken::Token(token) => token.span,
            ExprToken::Path(path) => path.span,
            ExprToken::Range(range) => range.span,
        }
    }

    /// The kind of this token. Paths and ranges have no atomic kind and
    /// report `Word`-like behavior through [`ExprToken::is_kind`] instead.
    pub fn kind(&self) -> Option<TokenKind> {
        match self {
            ExprToken::Token(token) => Some(token.kind),
            _ => None,
        }
    }

    /// Returns true if this is an atomic token of the given kind.
    pub fn is_kind(&self, kind: TokenKind) -> bool {
        matches!(self, ExprToken::Token(token) if token.kind == kind)
    }

    /// Returns true if this is a `Word` token with the given value.
    pub fn is_word(&self, value: &str) -> bool {
        matches!(
            self,
            ExprToken::Token(Token {
                kind: TokenKind::Word,
                value: v,
                ..
            }) if v == value
        )
    }

    /// Returns true if this is a path token.
    pub fn is_path(&self) -> bool {
        matches!(self, ExprToken::Path(_))
    }

    /// A human-readable description used in error messages.
    pub fn description(&self) -> &'static str {
        match self {
            ExprToken::Token(token) => token.kind.description(),
            ExprToken::Path(_) => "a path",
            ExprToken::Range(_) => "a range",
        }
    }
}

impl fmt::Display for ExprToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprToken::Token(token) => write!(f, "{token}"),
            ExprToken::Path(path) => write!(f, "{path}"),
            ExprToken::Range(range) => write!(f, "{range}"),
        }
    }
}
