//! Cursor types for stepping through markup and expression token streams.

use crate::{
    error::{Error, Result},
    token::{ExprToken, Markup, Span, Token, TokenKind, WhitespaceControl},
};
use core::mem;

/// A cursor over a top-level markup token stream.
///
/// The stream carries the pending left-trim hint for the next content
/// token in `trim_carry`; see the statement parser for the protocol.
#[derive(Debug)]
pub struct MarkupStream {
    tokens: Vec<Markup>,
    index: usize,
    eoi: Markup,
    /// The right-trim hint of the most recently closed markup, applied as
    /// the left trim of the next content node.
    pub(crate) trim_carry: WhitespaceControl,
}

impl MarkupStream {
    /// Creates a new stream over `tokens`.
    pub fn new(tokens: Vec<Markup>) -> Self {
        let stop = tokens.last().map_or(0, |token| token.span().stop);
        Self {
            tokens,
            index: 0,
            eoi: Markup::Eoi {
                span: Span::new(stop, stop),
            },
            trim_carry: WhitespaceControl::Default,
        }
    }

    /// The current token, or the end-of-input sentinel.
    pub fn current(&self) -> &Markup {
        self.tokens.get(self.index).unwrap_or(&self.eoi)
    }

    /// The token after the current one, or the end-of-input sentinel.
    pub fn peek(&self) -> &Markup {
        self.tokens.get(self.index + 1).unwrap_or(&self.eoi)
    }

    /// Returns the current token and advances the cursor.
    pub fn next(&mut self) -> Markup {
        match self.tokens.get_mut(self.index) {
            Some(slot) => {
                self.index += 1;
                mem::replace(slot, self.eoi.clone())
            }
            None => self.eoi.clone(),
        }
    }

    /// Raises a syntax error unless the current token is a tag named
    /// `tag_name`.
    pub fn expect_tag(&self, tag_name: &str) -> Result<()> {
        match self.current() {
            Markup::Tag { name, .. } if name == tag_name => Ok(()),
            token => Err(Error::syntax(
                format!("expected tag '{tag_name}'"),
                token.span(),
            )),
        }
    }

    /// Returns an expression stream over the current tag's expression,
    /// leaving the cursor in place. The expression is taken, not cloned.
    ///
    /// Raises a syntax error if the current token is not a tag.
    pub fn tag_expression(&mut self) -> Result<ExprStream> {
        let span = self.current().span();
        match self.tokens.get_mut(self.index) {
            Some(Markup::Tag { expression, .. }) => {
                Ok(ExprStream::new(mem::take(expression), span))
            }
            _ => Err(Error::syntax("expected a tag", span)),
        }
    }
}

/// A cursor over the expression tokens of a single output statement, tag,
/// or line statement.
#[derive(Debug)]
pub struct ExprStream {
    tokens: Vec<ExprToken>,
    index: usize,
    eoi: ExprToken,
}

impl ExprStream {
    /// Creates a new stream over `tokens`. `span` locates the owning
    /// markup for end-of-expression error reporting.
    pub fn new(tokens: Vec<ExprToken>, span: Span) -> Self {
        Self {
            tokens,
            index: 0,
            eoi: ExprToken::Token(Token {
                kind: TokenKind::Eoi,
                value: String::new(),
                span: Span::new(span.stop, span.stop),
            }),
        }
    }

    /// The current token, or the end-of-expression sentinel.
    pub fn current(&self) -> &ExprToken {
        self.tokens.get(self.index).unwrap_or(&self.eoi)
    }

    /// The token after the current one, or the end-of-expression sentinel.
    pub fn peek(&self) -> &ExprToken {
        self.tokens.get(self.index + 1).unwrap_or(&self.eoi)
    }

    /// Returns the current token and advances the cursor.
    pub fn next(&mut self) -> ExprToken {
        match self.tokens.get_mut(self.index) {
            Some(slot) => {
                self.index += 1;
                mem::replace(slot, self.eoi.clone())
            }
            None => self.eoi.clone(),
        }
    }

    /// The kind of the current token, with paths and ranges reported as
    /// `None`.
    pub fn kind(&self) -> Option<TokenKind> {
        self.current().kind()
    }

    /// Returns true if the current token is an atom of the given kind.
    pub fn is_kind(&self, kind: TokenKind) -> bool {
        self.current().is_kind(kind)
    }

    /// Returns true if the current token is a word with the given value.
    pub fn is_word(&self, value: &str) -> bool {
        self.current().is_word(value)
    }

    /// Returns true if the cursor is at the end of the expression.
    pub fn at_end(&self) -> bool {
        self.is_kind(TokenKind::Eoi)
    }

    /// Raises a syntax error unless the current token is an atom of the
    /// given kind.
    pub fn expect(&self, kind: TokenKind) -> Result<()> {
        let token = self.current();
        if token.is_kind(kind) {
            Ok(())
        } else {
            Err(Error::syntax(
                format!("expected {}, found {}", kind.description(), token.description()),
                token.span(),
            ))
        }
    }

    /// Raises a syntax error unless the current token is one of `kinds`.
    pub fn expect_one_of(&self, kinds: &[TokenKind]) -> Result<()> {
        let token = self.current();
        if kinds.iter().any(|kind| token.is_kind(*kind)) {
            Ok(())
        } else {
            let expected = kinds
                .iter()
                .map(|kind| kind.description())
                .collect::<Vec<_>>()
                .join(" or ");
            Err(Error::syntax(
                format!("expected {expected}, found {}", token.description()),
                token.span(),
            ))
        }
    }

    /// Raises a syntax error unless the whole expression was consumed.
    pub fn expect_eos(&self) -> Result<()> {
        let token = self.current();
        if token.is_kind(TokenKind::Eoi) {
            Ok(())
        } else {
            Err(Error::syntax(
                format!("unexpected {}", token.description()),
                token.span(),
            ))
        }
    }
}
