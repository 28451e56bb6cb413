//! Liquid template lexical scanner.
//!
//! Two coupled scanners produce the token stream: an outer markup scanner
//! that partitions source text into [`Markup`] tokens, and an inner
//! expression scanner that tokenizes the interiors of output statements,
//! tags, and `{% liquid %}` line statements. Recognizers are applied in
//! priority order at each position: raw blocks, output statements, tags,
//! comments, then literal content.

use crate::{
    error::{Error, Result},
    token::{
        ExprToken, Markup, PathSegment, PathToken, RangeToken, Span, Token, TokenKind,
        WhitespaceControl,
    },
};

/// Reserved words recognized inside expressions.
static KEYWORDS: phf::Map<&'static str, TokenKind> = phf::phf_map! {
    "true" => TokenKind::True,
    "false" => TokenKind::False,
    "nil" => TokenKind::Null,
    "null" => TokenKind::Null,
    "and" => TokenKind::And,
    "or" => TokenKind::Or,
    "not" => TokenKind::Not,
    "in" => TokenKind::In,
    "contains" => TokenKind::Contains,
    "if" => TokenKind::If,
    "else" => TokenKind::Else,
    "with" => TokenKind::With,
    "required" => TokenKind::Required,
    "as" => TokenKind::As,
    "for" => TokenKind::For,
};

/// Scans Liquid template `source` and returns the top-level markup stream.
///
/// The stream always ends with a [`Markup::Eoi`] sentinel.
pub fn tokenize(source: &str) -> Result<Vec<Markup>> {
    let mut lexer = Lexer::new(source, 0);
    let mut markup = Vec::new();

    loop {
        if lexer.at_end() {
            markup.push(Markup::Eoi {
                span: Span::new(lexer.abs(), lexer.abs()),
            });
            return Ok(markup);
        }

        if let Some(raw) = lexer.scan_raw()? {
            markup.push(raw);
            continue;
        }

        if lexer.starts_with("{{") {
            markup.push(lexer.scan_output()?);
            continue;
        }

        if lexer.starts_with("{%") {
            markup.push(lexer.scan_tag()?);
            continue;
        }

        if let Some(comment) = lexer.scan_comment()? {
            markup.push(comment);
            continue;
        }

        markup.push(lexer.scan_content());
    }
}

/// Tokenizes an expression fragment embedded in a string literal.
///
/// `offset` is the byte position of the fragment within its template
/// source, so emitted spans line up with the outer buffer.
pub(crate) fn tokenize_fragment(fragment: &str, offset: usize) -> Result<Vec<ExprToken>> {
    let mut lexer = Lexer::new(fragment, offset);
    let mut tokens = Vec::new();

    loop {
        lexer.skip_whitespace();
        if lexer.at_end() {
            return Ok(tokens);
        }
        lexer.scan_expr_token(&mut tokens)?;
    }
}

/// How an expression scan terminates.
enum ExprEnd {
    /// `}}`, closing an output statement.
    Output,
    /// `%}`, closing a tag.
    Tag,
    /// A physical line end or `%}` inside a `{% liquid %}` block.
    Line,
}

/// What actually terminated an expression scan.
enum ExprStop {
    /// The closing delimiter, with its whitespace control hint.
    Close(crate::token::WhitespaceControl),
    /// A physical line end (line statements only).
    Newline,
}

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    /// Span offset applied when lexing embedded fragments.
    base: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str, base: usize) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            base,
        }
    }

    /// The absolute position of the cursor within the originating buffer.
    #[inline]
    fn abs(&self) -> usize {
        self.base + self.pos
    }

    #[inline]
    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    #[inline]
    fn peek_byte(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    #[inline]
    fn peek_byte_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    #[inline]
    fn peek_char(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    #[inline]
    fn starts_with(&self, prefix: &str) -> bool {
        self.source[self.pos..].starts_with(prefix)
    }

    /// Advances past `prefix` if the cursor is on it.
    fn accept(&mut self, prefix: &str) -> bool {
        if self.starts_with(prefix) {
            self.pos += prefix.len();
            true
        } else {
            false
        }
    }

    /// Consumes a whitespace control character, if present.
    fn accept_wc(&mut self) -> WhitespaceControl {
        let wc = match self.peek_byte() {
            Some(b'+') => WhitespaceControl::Plus,
            Some(b'-') => WhitespaceControl::Minus,
            Some(b'~') => WhitespaceControl::Tilde,
            _ => return WhitespaceControl::Default,
        };
        self.pos += 1;
        wc
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek_byte(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    /// Skips space and tab only; used inside line statements where a
    /// newline is significant.
    fn skip_line_space(&mut self) {
        while matches!(self.peek_byte(), Some(b' ' | b'\t')) {
            self.pos += 1;
        }
    }

    fn error(&self, message: impl Into<String>, start: usize) -> Error {
        Error::syntax(message, Span::new(self.base + start, self.abs()))
    }

    // Markup recognizers, in priority order.

    /// Scans a `{% raw %}...{% endraw %}` block.
    fn scan_raw(&mut self) -> Result<Option<Markup>> {
        let start = self.pos;
        if !self.accept("{%") {
            return Ok(None);
        }

        let wc0 = self.accept_wc();
        self.skip_whitespace();
        if !self.accept_tag_word("raw") {
            self.pos = start;
            return Ok(None);
        }
        self.skip_whitespace();
        let wc1 = self.accept_wc();
        if !self.accept("%}") {
            self.pos = start;
            return Ok(None);
        }

        let text_start = self.pos;
        loop {
            let Some(offset) = self.source[self.pos..].find("{%") else {
                return Err(self.error("missing '{% endraw %}'", start));
            };
            self.pos += offset;

            let close_start = self.pos;
            self.pos += 2;
            let wc2 = self.accept_wc();
            self.skip_whitespace();
            if !self.accept_tag_word("endraw") {
                self.pos = close_start + 2;
                continue;
            }
            self.skip_whitespace();
            let wc3 = self.accept_wc();
            if !self.accept("%}") {
                return Err(self.error("malformed '{% endraw %}'", close_start));
            }

            return Ok(Some(Markup::Raw {
                span: Span::new(self.base + start, self.abs()),
                wc: [wc0, wc1, wc2, wc3],
                text: self.source[text_start..close_start].to_string(),
            }));
        }
    }

    /// Scans a `{#+ ... #+}` comment with balanced hash runs.
    fn scan_comment(&mut self) -> Result<Option<Markup>> {
        let start = self.pos;
        if self.peek_byte() != Some(b'{') || self.peek_byte_at(1) != Some(b'#') {
            return Ok(None);
        }
        self.pos += 1;

        let mut hashes = 0;
        while self.peek_byte() == Some(b'#') {
            hashes += 1;
            self.pos += 1;
        }

        let wc0 = self.accept_wc();
        let text_start = self.pos;

        // The closing delimiter is the first '}' preceded by a run of at
        // least `hashes` hash characters. Shorter runs are comment text,
        // which is what lets a longer outer run nest a shorter comment.
        let mut search = text_start;
        let close = loop {
            let Some(offset) = memchr::memchr(b'}', &self.bytes[search..]) else {
                return Err(self.error("unclosed comment", start));
            };
            let brace = search + offset;
            let mut run = 0;
            while brace > text_start + run && self.bytes[brace - run - 1] == b'#' {
                run += 1;
            }
            if run >= hashes {
                break brace - hashes;
            }
            search = brace + 1;
        };

        let mut text_stop = close;
        let mut wc1 = WhitespaceControl::Default;
        if text_stop > text_start {
            wc1 = match self.bytes[text_stop - 1] {
                b'+' => WhitespaceControl::Plus,
                b'-' => WhitespaceControl::Minus,
                b'~' => WhitespaceControl::Tilde,
                _ => WhitespaceControl::Default,
            };
            if wc1 != WhitespaceControl::Default {
                text_stop -= 1;
            }
        }

        let text = self.source[text_start..text_stop].to_string();
        self.pos = close + hashes + 1;

        Ok(Some(Markup::Comment {
            span: Span::new(self.base + start, self.abs()),
            wc: (wc0, wc1),
            text,
            hashes,
        }))
    }

    /// Scans an `{{ ... }}` output statement.
    fn scan_output(&mut self) -> Result<Markup> {
        let start = self.pos;
        self.pos += 2;
        let wc0 = self.accept_wc();

        let mut expression = Vec::new();
        let stop = self.scan_expression(&mut expression, ExprEnd::Output)?;
        let ExprStop::Close(wc1) = stop else {
            return Err(self.error("unexpected end of output statement", start));
        };

        Ok(Markup::Output {
            span: Span::new(self.base + start, self.abs()),
            wc: (wc0, wc1),
            expression,
        })
    }

    /// Scans a `{% name ... %}` tag, or a `{% liquid %}` block.
    fn scan_tag(&mut self) -> Result<Markup> {
        let start = self.pos;
        self.pos += 2;
        let wc0 = self.accept_wc();
        self.skip_whitespace();

        let name_start = self.pos;
        let Some(name) = self.scan_tag_name() else {
            return Err(self.error("expected a tag name", name_start));
        };

        if name == "liquid" {
            return self.scan_liquid_lines(start, wc0);
        }

        let mut expression = Vec::new();
        let stop = self.scan_expression(&mut expression, ExprEnd::Tag)?;
        let ExprStop::Close(wc1) = stop else {
            return Err(self.error("unexpected end of tag", start));
        };

        Ok(Markup::Tag {
            span: Span::new(self.base + start, self.abs()),
            wc: (wc0, wc1),
            name,
            expression,
        })
    }

    /// Scans the statements of a `{% liquid ... %}` block, one per line.
    fn scan_liquid_lines(&mut self, start: usize, wc0: WhitespaceControl) -> Result<Markup> {
        let mut statements = Vec::new();

        let wc1 = loop {
            self.skip_whitespace();

            // End of the whole block?
            let mark = self.pos;
            let wc = self.accept_wc();
            if self.accept("%}") {
                break wc;
            }
            self.pos = mark;

            if self.at_end() {
                return Err(self.error("unexpected end of 'liquid' tag", start));
            }

            let line_start = self.pos;

            // A `# comment` line statement.
            if self.accept("#") {
                self.skip_line_space();
                let text_start = self.pos;
                while !self.at_end()
                    && self.peek_byte() != Some(b'\n')
                    && !self.line_at_close_tag()
                {
                    self.pos += 1;
                }
                statements.push(Markup::Comment {
                    span: Span::new(self.base + line_start, self.abs()),
                    wc: (WhitespaceControl::Default, WhitespaceControl::Default),
                    text: self.source[text_start..self.pos].trim_end().to_string(),
                    hashes: 1,
                });
                continue;
            }

            let Some(name) = self.scan_tag_name() else {
                return Err(self.error("expected a tag name", self.pos));
            };

            let mut expression = Vec::new();
            let stop = self.scan_expression(&mut expression, ExprEnd::Line)?;

            statements.push(Markup::Tag {
                span: Span::new(self.base + line_start, self.abs()),
                wc: (WhitespaceControl::Default, WhitespaceControl::Default),
                name,
                expression,
            });

            if let ExprStop::Close(wc) = stop {
                break wc;
            }
        };

        Ok(Markup::Lines {
            span: Span::new(self.base + start, self.abs()),
            wc: (wc0, wc1),
            statements,
        })
    }

    /// Scans literal content up to the next markup delimiter.
    fn scan_content(&mut self) -> Markup {
        let start = self.pos;
        let mut cursor = self.pos;

        // The first position was already rejected by the other recognizers,
        // so always take at least one byte.
        cursor += 1;

        loop {
            match memchr::memchr(b'{', &self.bytes[cursor..]) {
                Some(offset) => {
                    let found = cursor + offset;
                    match self.bytes.get(found + 1) {
                        Some(b'{' | b'%' | b'#') => {
                            cursor = found;
                            break;
                        }
                        _ => cursor = found + 1,
                    }
                }
                None => {
                    cursor = self.bytes.len();
                    break;
                }
            }
        }

        self.pos = cursor;
        Markup::Content {
            span: Span::new(self.base + start, self.abs()),
            text: self.source[start..cursor].to_string(),
        }
    }

    /// Scans a lowercase tag name, requiring a word boundary after it.
    fn scan_tag_name(&mut self) -> Option<String> {
        let start = self.pos;
        match self.peek_byte() {
            Some(b'a'..=b'z') => self.pos += 1,
            _ => return None,
        }
        while matches!(self.peek_byte(), Some(b'a'..=b'z' | b'0'..=b'9' | b'_')) {
            self.pos += 1;
        }
        // Reject a longer word such as `rawhide` when matching `raw`.
        if self.peek_char().is_some_and(is_word_continue) {
            self.pos = start;
            return None;
        }
        Some(self.source[start..self.pos].to_string())
    }

    /// Accepts the exact word `word` followed by a word boundary.
    fn accept_tag_word(&mut self, word: &str) -> bool {
        if !self.starts_with(word) {
            return false;
        }
        let after = self.source[self.pos + word.len()..].chars().next();
        if after.is_some_and(is_word_continue) {
            return false;
        }
        self.pos += word.len();
        true
    }

    /// True if the cursor sits on the closing `%}` of a line statement,
    /// optionally preceded by whitespace control.
    fn line_at_close_tag(&self) -> bool {
        let mut offset = 0;
        if matches!(self.peek_byte(), Some(b'+' | b'-' | b'~')) {
            offset = 1;
        }
        self.peek_byte_at(offset) == Some(b'%') && self.peek_byte_at(offset + 1) == Some(b'}')
    }

    // The expression scanner.

    /// Scans expression tokens until the terminator selected by `end`.
    fn scan_expression(&mut self, tokens: &mut Vec<ExprToken>, end: ExprEnd) -> Result<ExprStop> {
        loop {
            match end {
                ExprEnd::Line => self.skip_line_space(),
                _ => self.skip_whitespace(),
            }

            // Terminators take priority over everything else so that a
            // trailing `-` binds to the delimiter, not an expression.
            let mark = self.pos;
            let wc = self.accept_wc();
            let closed = match end {
                ExprEnd::Output => self.accept("}}"),
                ExprEnd::Tag | ExprEnd::Line => self.accept("%}"),
            };
            if closed {
                return Ok(ExprStop::Close(wc));
            }
            self.pos = mark;

            if matches!(end, ExprEnd::Line) {
                match self.peek_byte() {
                    Some(b'\r') => {
                        self.pos += 1;
                        continue;
                    }
                    Some(b'\n') => {
                        self.pos += 1;
                        return Ok(ExprStop::Newline);
                    }
                    _ => {}
                }
            }

            if self.at_end() {
                return Err(self.error("unexpected end of template", self.pos));
            }

            self.scan_expr_token(tokens)?;
        }
    }

    /// Scans a single expression token, appending it to `tokens`.
    fn scan_expr_token(&mut self, tokens: &mut Vec<ExprToken>) -> Result<()> {
        let start = self.pos;
        let c = self.peek_char().unwrap_or('\0');

        if is_word_start(c) {
            let word = self.scan_word();
            if let Some(kind) = KEYWORDS.get(word.as_str()) {
                tokens.push(self.atom(*kind, word, start));
            } else if matches!(self.peek_byte(), Some(b'.' | b'[')) {
                let path = self.scan_path(word, start)?;
                tokens.push(ExprToken::Path(path));
            } else {
                tokens.push(self.atom(TokenKind::Word, word, start));
            }
            return Ok(());
        }

        if c.is_ascii_digit() || (c == '-' && self.peek_byte_at(1).is_some_and(|b| b.is_ascii_digit()))
        {
            let token = self.scan_number(start)?;
            tokens.push(token);
            return Ok(());
        }

        if c == '\'' || c == '"' {
            let token = self.scan_string(c, start)?;
            tokens.push(token);
            return Ok(());
        }

        // Multi-character operators first.
        for (text, kind) in [
            ("==", TokenKind::Eq),
            ("!=", TokenKind::Ne),
            ("<>", TokenKind::Ne),
            (">=", TokenKind::Ge),
            ("<=", TokenKind::Le),
            ("=>", TokenKind::Arrow),
            ("..", TokenKind::DoubleDot),
            ("||", TokenKind::DoublePipe),
        ] {
            if self.accept(text) {
                tokens.push(self.atom(kind, text.to_string(), start));
                return Ok(());
            }
        }

        let kind = match c {
            '<' => TokenKind::Lt,
            '>' => TokenKind::Gt,
            '|' => TokenKind::Pipe,
            '=' => TokenKind::Assign,
            ':' => TokenKind::Colon,
            ',' => TokenKind::Comma,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            _ => {
                self.pos += c.len_utf8();
                return Err(self.error(format!("unknown symbol '{c}'"), start));
            }
        };
        self.pos += 1;

        if kind == TokenKind::RParen && try_range_rewrite(tokens, self.abs()) {
            return Ok(());
        }

        tokens.push(self.atom(kind, c.to_string(), start));
        Ok(())
    }

    fn atom(&self, kind: TokenKind, value: String, start: usize) -> ExprToken {
        ExprToken::Token(Token {
            kind,
            value,
            span: Span::new(self.base + start, self.abs()),
        })
    }

    fn scan_word(&mut self) -> String {
        let start = self.pos;
        while self.peek_char().is_some_and(is_word_continue) {
            self.pos += self.peek_char().map_or(1, char::len_utf8);
        }
        self.source[start..self.pos].to_string()
    }

    /// Scans an integer or float literal. The cursor sits on a digit or a
    /// minus sign followed by a digit.
    fn scan_number(&mut self, start: usize) -> Result<ExprToken> {
        self.accept("-");
        while self.peek_byte().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }

        let mut is_float = false;

        // A decimal point, but not the start of a `..` range operator.
        if self.peek_byte() == Some(b'.')
            && self.peek_byte_at(1).is_some_and(|b| b.is_ascii_digit())
        {
            is_float = true;
            self.pos += 1;
            while self.peek_byte().is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1;
            }
        }

        if matches!(self.peek_byte(), Some(b'e' | b'E'))
            && (self.peek_byte_at(1).is_some_and(|b| b.is_ascii_digit())
                || (matches!(self.peek_byte_at(1), Some(b'+' | b'-'))
                    && self.peek_byte_at(2).is_some_and(|b| b.is_ascii_digit())))
        {
            self.pos += 1;
            // An integer with a negative exponent is a float.
            if self.peek_byte() == Some(b'-') {
                is_float = true;
            }
            if matches!(self.peek_byte(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            while self.peek_byte().is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1;
            }
        }

        let value = self.source[start..self.pos].to_string();
        let kind = if is_float {
            TokenKind::Float
        } else {
            TokenKind::Int
        };
        Ok(self.atom(kind, value, start))
    }

    /// Scans a string literal. The cursor sits on the opening quote.
    ///
    /// The emitted token value is the raw interior with escape sequences
    /// intact; unescaping and `${ ... }` interpolation are parse steps.
    fn scan_string(&mut self, quote: char, start: usize) -> Result<ExprToken> {
        self.pos += 1;
        let value_start = self.pos;

        loop {
            let Some(c) = self.peek_char() else {
                return Err(self.error(format!("unclosed string starting at index {start}"), start));
            };

            if c == '\\' {
                let escape_start = self.pos;
                self.pos += 1;
                match self.peek_char() {
                    Some('b' | 'f' | 'n' | 'r' | 't' | 'u' | '/' | '\\' | '$' | '\'' | '"') => {
                        self.pos += 1;
                    }
                    _ => return Err(self.error("invalid escape", escape_start)),
                }
                continue;
            }

            if c == quote {
                let value = self.source[value_start..self.pos].to_string();
                self.pos += 1;
                let kind = if quote == '\'' {
                    TokenKind::SingleQuoteString
                } else {
                    TokenKind::DoubleQuoteString
                };
                return Ok(self.atom(kind, value, start));
            }

            self.pos += c.len_utf8();
        }
    }

    /// Scans the segments of a path whose head word was already consumed.
    fn scan_path(&mut self, head: String, start: usize) -> Result<PathToken> {
        let mut segments = vec![PathSegment::Name(head)];

        loop {
            match self.peek_byte() {
                Some(b'.') => {
                    self.pos += 1;
                    let name_start = self.pos;
                    if !self.peek_char().is_some_and(is_word_start) {
                        return Err(self.error("expected a property name", name_start));
                    }
                    segments.push(PathSegment::Name(self.scan_word()));
                }
                Some(b'[') => {
                    self.pos += 1;
                    self.skip_whitespace();
                    segments.push(self.scan_bracketed_segment()?);
                    self.skip_whitespace();
                    if !self.accept("]") {
                        return Err(self.error("unclosed bracketed selection", self.pos));
                    }
                }
                _ => break,
            }
        }

        Ok(PathToken {
            segments,
            span: Span::new(self.base + start, self.abs()),
        })
    }

    /// Scans the interior of one `[...]` path segment.
    fn scan_bracketed_segment(&mut self) -> Result<PathSegment> {
        let start = self.pos;
        let c = self.peek_char().unwrap_or('\0');

        if c == '\'' || c == '"' {
            let token = self.scan_string(c, start)?;
            let ExprToken::Token(token) = token else {
                unreachable!()
            };
            let value = unescape(&token.value, token.span)?;
            return Ok(PathSegment::Name(value));
        }

        if c.is_ascii_digit() || c == '-' {
            let digits_start = self.pos;
            self.accept("-");
            if !self.peek_byte().is_some_and(|b| b.is_ascii_digit()) {
                return Err(self.error("expected an index", digits_start));
            }
            while self.peek_byte().is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1;
            }
            let index: i64 = self.source[digits_start..self.pos]
                .parse()
                .map_err(|_| self.error("index out of range", digits_start))?;
            return Ok(PathSegment::Index(index));
        }

        if is_word_start(c) {
            let head = self.scan_word();
            let path = self.scan_path(head, start)?;
            return Ok(PathSegment::Sub(path));
        }

        Err(self.error(
            format!("unexpected token '{c}' in bracketed selection"),
            start,
        ))
    }
}

/// Rewrites the trailing `( start .. stop` tokens plus the just-scanned
/// `)` into a single range token. Returns false when the tail does not
/// form a range.
fn try_range_rewrite(tokens: &mut Vec<ExprToken>, stop_pos: usize) -> bool {
    let n = tokens.len();
    if n < 4 {
        return false;
    }

    let is_primary = |token: &ExprToken| {
        token.is_path()
            || matches!(
                token.kind(),
                Some(
                    TokenKind::Int
                        | TokenKind::Float
                        | TokenKind::Word
                        | TokenKind::SingleQuoteString
                        | TokenKind::DoubleQuoteString
                )
            )
    };

    if !(tokens[n - 4].is_kind(TokenKind::LParen)
        && is_primary(&tokens[n - 3])
        && tokens[n - 2].is_kind(TokenKind::DoubleDot)
        && is_primary(&tokens[n - 1]))
    {
        return false;
    }

    let stop = Box::new(tokens.pop().unwrap());
    tokens.pop(); // `..`
    let start = Box::new(tokens.pop().unwrap());
    let lparen = tokens.pop().unwrap();

    tokens.push(ExprToken::Range(RangeToken {
        span: Span::new(lparen.span().start, stop_pos),
        start,
        stop,
    }));
    true
}

/// Returns true for characters that may start a word.
fn is_word_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic() || c >= '\u{80}'
}

/// Returns true for characters that may continue a word.
fn is_word_continue(c: char) -> bool {
    c == '_' || c == '-' || c.is_ascii_alphanumeric() || c >= '\u{80}'
}

/// Decodes the escape sequences of a string literal interior.
///
/// Handles `\b \f \n \r \t \\ \/ \' \" \$` and `\uXXXX`, including
/// surrogate pairs. `span` locates the literal for error reporting.
pub(crate) fn unescape(value: &str, span: Span) -> Result<String> {
    if !value.contains('\\') {
        return Ok(value.to_string());
    }

    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }

        match chars.next() {
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some('/') => out.push('/'),
            Some('$') => out.push('$'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('u') => {
                let first = read_hex4(&mut chars, span)?;
                let code = if (0xD800..0xDC00).contains(&first) {
                    // A high surrogate must be followed by a low surrogate.
                    if chars.next() != Some('\\') || chars.next() != Some('u') {
                        return Err(Error::syntax("unpaired surrogate", span));
                    }
                    let second = read_hex4(&mut chars, span)?;
                    if !(0xDC00..0xE000).contains(&second) {
                        return Err(Error::syntax("unpaired surrogate", span));
                    }
                    0x10000 + ((first - 0xD800) << 10) + (second - 0xDC00)
                } else {
                    first
                };
                let decoded = char::from_u32(code)
                    .ok_or_else(|| Error::syntax("invalid \\uXXXX escape", span))?;
                out.push(decoded);
            }
            _ => return Err(Error::syntax("invalid escape sequence", span)),
        }
    }

    Ok(out)
}

fn read_hex4(chars: &mut core::str::Chars<'_>, span: Span) -> Result<u32> {
    let mut code = 0;
    for _ in 0..4 {
        let digit = chars
            .next()
            .and_then(|c| c.to_digit(16))
            .ok_or_else(|| Error::syntax("invalid \\uXXXX escape", span))?;
        code = code * 16 + digit;
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Markup;

    fn tag_names(markup: &[Markup]) -> Vec<&str> {
        markup
            .iter()
            .filter_map(|m| match m {
                Markup::Tag { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn content_only() {
        let markup = tokenize("Hello, World!").unwrap();
        assert_eq!(markup.len(), 2);
        assert!(matches!(
            &markup[0],
            Markup::Content { text, .. } if text == "Hello, World!"
        ));
        assert!(markup[1].is_eoi());
    }

    #[test]
    fn output_statement() {
        let markup = tokenize("Hello, {{ you }}!").unwrap();
        let Markup::Output { expression, wc, .. } = &markup[1] else {
            panic!("expected an output statement, found {:?}", markup[1]);
        };
        assert_eq!(*wc, (WhitespaceControl::Default, WhitespaceControl::Default));
        assert_eq!(expression.len(), 1);
        assert!(expression[0].is_word("you"));
    }

    #[test]
    fn whitespace_control() {
        let markup = tokenize("{{- x ~}}").unwrap();
        let Markup::Output { wc, .. } = &markup[0] else {
            panic!("expected an output statement");
        };
        assert_eq!(*wc, (WhitespaceControl::Minus, WhitespaceControl::Tilde));
    }

    #[test]
    fn tag_with_expression() {
        let markup = tokenize("{% assign x = 'a' %}").unwrap();
        let Markup::Tag {
            name, expression, ..
        } = &markup[0]
        else {
            panic!("expected a tag");
        };
        assert_eq!(name, "assign");
        assert_eq!(expression.len(), 3);
        assert!(expression[1].is_kind(TokenKind::Assign));
    }

    #[test]
    fn path_tokens() {
        let markup = tokenize("{{ a.b[0]['c d'][e.f] }}").unwrap();
        let Markup::Output { expression, .. } = &markup[0] else {
            panic!("expected an output statement");
        };
        let ExprToken::Path(path) = &expression[0] else {
            panic!("expected a path, found {:?}", expression[0]);
        };
        assert_eq!(path.head(), "a");
        assert_eq!(path.segments.len(), 5);
        assert!(matches!(&path.segments[1], PathSegment::Name(n) if n == "b"));
        assert!(matches!(path.segments[2], PathSegment::Index(0)));
        assert!(matches!(&path.segments[3], PathSegment::Name(n) if n == "c d"));
        assert!(matches!(&path.segments[4], PathSegment::Sub(p) if p.head() == "e"));
    }

    #[test]
    fn range_rewrite() {
        let markup = tokenize("{% for n in (1..3) %}{% endfor %}").unwrap();
        let Markup::Tag { expression, .. } = &markup[0] else {
            panic!("expected a tag");
        };
        assert!(matches!(expression.last(), Some(ExprToken::Range(_))));
    }

    #[test]
    fn raw_block() {
        let markup = tokenize("{% raw %}{{ not liquid }}{% endraw %}").unwrap();
        let Markup::Raw { text, .. } = &markup[0] else {
            panic!("expected a raw block, found {:?}", markup[0]);
        };
        assert_eq!(text, "{{ not liquid }}");
    }

    #[test]
    fn comments_balance_hashes() {
        let markup = tokenize("{## outer {# inner #} outer ##}x").unwrap();
        let Markup::Comment { text, hashes, .. } = &markup[0] else {
            panic!("expected a comment, found {:?}", markup[0]);
        };
        assert_eq!(*hashes, 2);
        assert_eq!(text, " outer {# inner #} outer ");
        assert!(matches!(&markup[1], Markup::Content { text, .. } if text == "x"));
    }

    #[test]
    fn comment_wc() {
        let markup = tokenize("{#- note -#}").unwrap();
        let Markup::Comment { wc, text, .. } = &markup[0] else {
            panic!("expected a comment");
        };
        assert_eq!(*wc, (WhitespaceControl::Minus, WhitespaceControl::Minus));
        assert_eq!(text, " note ");
    }

    #[test]
    fn liquid_lines() {
        let markup = tokenize("{% liquid\nassign x = 1\n# note\necho x\n%}").unwrap();
        let Markup::Lines { statements, .. } = &markup[0] else {
            panic!("expected a lines token, found {:?}", markup[0]);
        };
        assert_eq!(statements.len(), 3);
        assert!(statements[0].is_tag("assign"));
        assert!(matches!(&statements[1], Markup::Comment { text, .. } if text == "note"));
        assert!(statements[2].is_tag("echo"));
    }

    #[test]
    fn number_classification() {
        let markup = tokenize("{{ 1 -2 3.4 1e2 1e-2 -3.4e+1 }}").unwrap();
        let Markup::Output { expression, .. } = &markup[0] else {
            panic!("expected an output statement");
        };
        let kinds: Vec<_> = expression.iter().filter_map(ExprToken::kind).collect();
        assert_eq!(
            kinds,
            [
                TokenKind::Int,
                TokenKind::Int,
                TokenKind::Float,
                TokenKind::Int,
                TokenKind::Float,
                TokenKind::Float,
            ]
        );
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert!(tokenize("{{ 'oops }}").is_err());
    }

    #[test]
    fn unknown_symbol_is_an_error() {
        assert!(tokenize("{{ a ^ b }}").is_err());
    }

    #[test]
    fn unescape_basics() {
        let span = Span::new(0, 0);
        assert_eq!(unescape(r"a\nb", span).unwrap(), "a\nb");
        assert_eq!(unescape(r"é", span).unwrap(), "é");
        assert_eq!(unescape(r"😀", span).unwrap(), "😀");
        assert!(unescape(r"\q", span).is_err());
        assert!(unescape(r"\ud83d", span).is_err());
    }

    #[test]
    fn end_tags_scan_as_tags() {
        let markup = tokenize("{% if x %}a{% elsif y %}b{% else %}c{% endif %}").unwrap();
        assert_eq!(tag_names(&markup), ["if", "elsif", "else", "endif"]);
    }
}
