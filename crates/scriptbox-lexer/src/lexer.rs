//! Core lexer: converts snippet source text to a token stream.
//!
//! Features:
//! - Indentation tracking with `Indent`/`Dedent` tokens and a level stack
//! - Implicit line joining inside brackets, explicit joining with `\`
//! - `;` as a statement separator, `#` comments stripped
//! - Single, double and triple-quoted strings with `r`/`f` prefixes
//! - f-strings split into literal text and replacement-field source
//! - Error recovery: collects up to [`MAX_ERRORS`](scriptbox_types::MAX_ERRORS) errors instead of stopping

use scriptbox_types::{CodeError, CodeErrors, ErrorCode, SourceFile, Span};

use crate::token::{FStringPiece, Token, TokenKind, RESERVED_WORDS};

/// Column width a tab advances to.
const TAB_WIDTH: usize = 8;

/// Position of a token's first character.
type Mark = (u32, u32);

#[derive(Debug, Clone, Copy, Default)]
struct StringFlags {
    raw: bool,
    format: bool,
}

/// The snippet lexer.
///
/// Converts source text into a vector of [`Token`]s, collecting up to
/// [`MAX_ERRORS`](scriptbox_types::MAX_ERRORS) errors along the way.
pub struct Lexer<'src> {
    chars: Vec<char>,
    source_file: &'src SourceFile,
    pos: usize,
    line: u32,
    col: u32,
    tokens: Vec<Token>,
    errors: CodeErrors,
    /// Open indentation widths; the bottom entry is always 0.
    indent_stack: Vec<usize>,
    /// Nesting of `(`, `[` and `{`; newlines inside brackets are ignored.
    paren_depth: u32,
    at_line_start: bool,
}

/// Result of lexing: tokens + any errors collected.
pub struct LexResult {
    /// The token stream (always ends with [`TokenKind::Eof`]).
    pub tokens: Vec<Token>,
    pub errors: CodeErrors,
}

impl<'src> Lexer<'src> {
    pub fn new(source_file: &'src SourceFile) -> Self {
        Self {
            chars: source_file.source.chars().collect(),
            source_file,
            pos: 0,
            line: 1,
            col: 1,
            tokens: Vec::new(),
            errors: CodeErrors::empty(),
            indent_stack: vec![0],
            paren_depth: 0,
            at_line_start: true,
        }
    }

    /// Lex the entire source file into a token stream.
    pub fn lex(mut self) -> LexResult {
        while !self.errors.is_full() {
            if self.at_line_start {
                self.at_line_start = false;
                if self.paren_depth == 0 {
                    self.scan_indentation();
                }
            }

            self.skip_whitespace();
            let Some(ch) = self.peek() else { break };
            match ch {
                '#' => self.skip_comment(),
                '\n' => {
                    let start = self.mark();
                    self.advance();
                    if self.paren_depth == 0 {
                        self.push_newline(start);
                    }
                    self.at_line_start = true;
                }
                ';' => {
                    let start = self.mark();
                    self.advance();
                    self.push_newline(start);
                }
                _ => self.scan_token(),
            }
        }

        self.finish()
    }

    /// Close the last logical line and every open block.
    fn finish(mut self) -> LexResult {
        let end = self.mark();
        self.push_newline(end);
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.tokens
                .push(Token::new(TokenKind::Dedent, Span::point(end.0, end.1)));
        }
        self.tokens
            .push(Token::new(TokenKind::Eof, Span::point(end.0, end.1)));
        LexResult {
            tokens: self.tokens,
            errors: self.errors,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Character-level helpers
    // ─────────────────────────────────────────────────────────────

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn mark(&self) -> Mark {
        (self.line, self.col)
    }

    fn span_from(&self, start: Mark) -> Span {
        Span::new(start.0, start.1, self.line, self.col.saturating_sub(1).max(1))
    }

    fn push(&mut self, kind: TokenKind, start: Mark) {
        let span = self.span_from(start);
        self.tokens.push(Token::new(kind, span));
    }

    /// Emit `Newline` unless the current logical line is empty.
    fn push_newline(&mut self, start: Mark) {
        if matches!(self.tokens.last(), Some(t) if t.kind != TokenKind::Newline) {
            self.tokens
                .push(Token::new(TokenKind::Newline, Span::point(start.0, start.1)));
        }
    }

    fn emit_error(&mut self, code: ErrorCode, message: impl Into<String>, span: Span) {
        let source_line = self.source_file.line(span.start_line).unwrap_or("");
        let err = CodeError::new(&self.source_file.name, code, message, span, source_line);
        self.errors.push_error(err);
    }

    fn emit_error_with_suggestion(
        &mut self,
        code: ErrorCode,
        message: impl Into<String>,
        span: Span,
        suggestion: impl Into<String>,
    ) {
        let source_line = self.source_file.line(span.start_line).unwrap_or("");
        let err = CodeError::new(&self.source_file.name, code, message, span, source_line)
            .with_suggestion(suggestion);
        self.errors.push_error(err);
    }

    // ─────────────────────────────────────────────────────────────
    // Layout: whitespace, comments, indentation
    // ─────────────────────────────────────────────────────────────

    /// Skip blanks and explicit `\` line continuations.
    fn skip_whitespace(&mut self) {
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r' | '\x0c') => {
                    self.advance();
                }
                Some('\\') if self.peek_at(1) == Some('\n') => {
                    self.advance();
                    self.advance();
                }
                Some('\\') if self.peek_at(1) == Some('\r') && self.peek_at(2) == Some('\n') => {
                    self.advance();
                    self.advance();
                    self.advance();
                }
                _ => break,
            }
        }
    }

    /// Skip a `# ...` comment up to (not including) the newline.
    fn skip_comment(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            self.advance();
        }
    }

    /// Measure the indentation of the line starting at `pos` and emit
    /// `Indent`/`Dedent` tokens. Blank and comment-only lines are ignored.
    fn scan_indentation(&mut self) {
        let mut width = 0usize;
        let mut look = self.pos;
        while let Some(&ch) = self.chars.get(look) {
            match ch {
                ' ' => width += 1,
                '\t' => width = (width / TAB_WIDTH + 1) * TAB_WIDTH,
                '\x0c' => width = 0,
                _ => break,
            }
            look += 1;
        }
        if matches!(self.chars.get(look), None | Some('\n' | '\r' | '#')) {
            return;
        }

        let span = Span::point(self.line, (look - self.pos) as u32 + 1);
        let current = self.indent_stack.last().copied().unwrap_or(0);
        if width > current {
            self.indent_stack.push(width);
            self.tokens.push(Token::new(TokenKind::Indent, span));
        } else if width < current {
            while self.indent_stack.last().is_some_and(|&top| top > width) {
                self.indent_stack.pop();
                self.tokens.push(Token::new(TokenKind::Dedent, span));
            }
            if self.indent_stack.last() != Some(&width) {
                self.emit_error_with_suggestion(
                    ErrorCode::INCONSISTENT_INDENTATION,
                    "unindent does not match any outer indentation level",
                    span,
                    "indent each block by the same number of spaces",
                );
                self.indent_stack.push(width);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Tokens
    // ─────────────────────────────────────────────────────────────

    fn scan_token(&mut self) {
        let start = self.mark();
        let Some(ch) = self.advance() else { return };

        match ch {
            c if c.is_ascii_digit() => self.scan_number(start, c),
            '.' if self.peek().is_some_and(|c| c.is_ascii_digit()) => self.scan_number(start, ch),
            c if is_name_start(c) => self.scan_name(start),
            '"' | '\'' => self.scan_string(start, ch, StringFlags::default()),

            '+' => self.push_with_eq(start, TokenKind::Plus, TokenKind::PlusEq),
            '%' => self.push_with_eq(start, TokenKind::Percent, TokenKind::PercentEq),
            '=' => self.push_with_eq(start, TokenKind::Eq, TokenKind::EqEq),
            '<' => self.push_with_eq(start, TokenKind::Less, TokenKind::LessEq),
            '>' => self.push_with_eq(start, TokenKind::Greater, TokenKind::GreaterEq),
            '-' => {
                if self.peek() == Some('>') {
                    self.advance();
                    self.push(TokenKind::Arrow, start);
                } else {
                    self.push_with_eq(start, TokenKind::Minus, TokenKind::MinusEq);
                }
            }
            '*' => {
                if self.peek() == Some('*') {
                    self.advance();
                    self.push_with_eq(start, TokenKind::DoubleStar, TokenKind::DoubleStarEq);
                } else {
                    self.push_with_eq(start, TokenKind::Star, TokenKind::StarEq);
                }
            }
            '/' => {
                if self.peek() == Some('/') {
                    self.advance();
                    self.push_with_eq(start, TokenKind::DoubleSlash, TokenKind::DoubleSlashEq);
                } else {
                    self.push_with_eq(start, TokenKind::Slash, TokenKind::SlashEq);
                }
            }
            '!' => {
                if self.peek() == Some('=') {
                    self.advance();
                    self.push(TokenKind::NotEq, start);
                } else {
                    let span = self.span_from(start);
                    self.emit_error_with_suggestion(
                        ErrorCode::UNEXPECTED_TOKEN,
                        "unexpected character '!'",
                        span,
                        "use 'not' for negation, or '!=' for inequality",
                    );
                }
            }

            '(' | '[' | '{' => {
                self.paren_depth += 1;
                let kind = match ch {
                    '(' => TokenKind::LParen,
                    '[' => TokenKind::LBracket,
                    _ => TokenKind::LBrace,
                };
                self.push(kind, start);
            }
            ')' | ']' | '}' => {
                self.paren_depth = self.paren_depth.saturating_sub(1);
                let kind = match ch {
                    ')' => TokenKind::RParen,
                    ']' => TokenKind::RBracket,
                    _ => TokenKind::RBrace,
                };
                self.push(kind, start);
            }
            ',' => self.push(TokenKind::Comma, start),
            '.' => self.push(TokenKind::Dot, start),
            ':' => {
                if self.peek() == Some('=') {
                    self.advance();
                    let span = self.span_from(start);
                    self.emit_error_with_suggestion(
                        ErrorCode::UNSUPPORTED_SYNTAX,
                        "assignment expressions (':=') are not supported",
                        span,
                        "assign the value in a separate statement",
                    );
                } else {
                    self.push(TokenKind::Colon, start);
                }
            }

            '@' | '&' | '|' | '^' | '~' => {
                // Consume a trailing `=` so `|=` reports once.
                if self.peek() == Some('=') {
                    self.advance();
                }
                let span = self.span_from(start);
                self.emit_error(
                    ErrorCode::UNSUPPORTED_SYNTAX,
                    format!("operator '{ch}' is not supported"),
                    span,
                );
            }

            _ => {
                let span = self.span_from(start);
                self.emit_error(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("unexpected character '{}'", ch.escape_default()),
                    span,
                );
            }
        }
    }

    /// Push `with_eq` if the next character is `=`, else `plain`.
    fn push_with_eq(&mut self, start: Mark, plain: TokenKind, with_eq: TokenKind) {
        if self.peek() == Some('=') {
            self.advance();
            self.push(with_eq, start);
        } else {
            self.push(plain, start);
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Names & keywords
    // ─────────────────────────────────────────────────────────────

    fn scan_name(&mut self, start: Mark) {
        let begin = self.pos - 1;
        while self.peek().is_some_and(is_name_continue) {
            self.advance();
        }
        let text: String = self.chars[begin..self.pos].iter().collect();

        if let Some(quote @ ('"' | '\'')) = self.peek() {
            if let Some(flags) = self.string_prefix(&text, start) {
                self.advance();
                self.scan_string(start, quote, flags);
                return;
            }
        }

        let kind = if let Some(kind) = TokenKind::from_keyword(&text) {
            kind
        } else if RESERVED_WORDS.contains(&text.as_str()) {
            TokenKind::Reserved(text)
        } else {
            TokenKind::Name(text)
        };
        self.push(kind, start);
    }

    /// Interpret `text` as a string prefix, if it is one.
    fn string_prefix(&mut self, text: &str, start: Mark) -> Option<StringFlags> {
        let lower = text.to_ascii_lowercase();
        match lower.as_str() {
            "u" => Some(StringFlags::default()),
            "r" => Some(StringFlags {
                raw: true,
                format: false,
            }),
            "f" => Some(StringFlags {
                raw: false,
                format: true,
            }),
            "rf" | "fr" => Some(StringFlags {
                raw: true,
                format: true,
            }),
            "b" | "br" | "rb" => {
                let span = self.span_from(start);
                self.emit_error_with_suggestion(
                    ErrorCode::UNSUPPORTED_SYNTAX,
                    "bytes literals are not supported",
                    span,
                    "use a regular string",
                );
                Some(StringFlags {
                    raw: lower.contains('r'),
                    format: false,
                })
            }
            _ => None,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Number literals
    // ─────────────────────────────────────────────────────────────

    fn scan_number(&mut self, start: Mark, first: char) {
        let begin = self.pos - 1;

        if first == '0' && matches!(self.peek(), Some('x' | 'X' | 'o' | 'O' | 'b' | 'B')) {
            let radix = match self.advance() {
                Some('x' | 'X') => 16,
                Some('o' | 'O') => 8,
                _ => 2,
            };
            let digits_begin = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
                self.advance();
            }
            let digits: String = self.chars[digits_begin..self.pos]
                .iter()
                .filter(|&&c| c != '_')
                .collect();
            match i64::from_str_radix(&digits, radix) {
                Ok(value) => self.push(TokenKind::Int(value), start),
                Err(_) => {
                    let span = self.span_from(start);
                    self.emit_error(ErrorCode::INVALID_LITERAL, "invalid integer literal", span);
                }
            }
            return;
        }

        let mut is_float = first == '.';
        self.skip_digits();

        if !is_float && self.peek() == Some('.') {
            let after = self.peek_at(1);
            if after.is_some_and(|c| c.is_ascii_digit())
                || !after.is_some_and(|c| is_name_start(c) || c == '.')
            {
                is_float = true;
                self.advance();
                self.skip_digits();
            }
        } else if is_float {
            self.skip_digits();
        }

        if matches!(self.peek(), Some('e' | 'E')) {
            let digit_at = if matches!(self.peek_at(1), Some('+' | '-')) { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                for _ in 0..digit_at {
                    self.advance();
                }
                self.skip_digits();
            }
        }

        if self.peek().is_some_and(is_name_continue) {
            while self.peek().is_some_and(is_name_continue) {
                self.advance();
            }
            let span = self.span_from(start);
            self.emit_error(ErrorCode::INVALID_LITERAL, "invalid number literal", span);
            return;
        }

        let text: String = self.chars[begin..self.pos]
            .iter()
            .filter(|&&c| c != '_')
            .collect();
        if is_float {
            match text.parse::<f64>() {
                Ok(value) => self.push(TokenKind::Float(value), start),
                Err(_) => {
                    let span = self.span_from(start);
                    self.emit_error(ErrorCode::INVALID_LITERAL, "invalid float literal", span);
                }
            }
        } else {
            match text.parse::<i64>() {
                Ok(value) => self.push(TokenKind::Int(value), start),
                Err(_) => {
                    let span = self.span_from(start);
                    self.emit_error_with_suggestion(
                        ErrorCode::INVALID_LITERAL,
                        "integer literal is too large",
                        span,
                        "integers must fit in 64 bits",
                    );
                }
            }
        }
    }

    fn skip_digits(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '_') {
            self.advance();
        }
    }

    // ─────────────────────────────────────────────────────────────
    // String literals & f-strings
    // ─────────────────────────────────────────────────────────────

    /// Scan a string literal after its opening quote.
    fn scan_string(&mut self, start: Mark, quote: char, flags: StringFlags) {
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.advance();
            self.advance();
        }

        let mut text = String::new();
        let mut pieces = Vec::new();
        loop {
            let Some(ch) = self.peek() else {
                self.report_unterminated(start);
                break;
            };

            if ch == quote {
                if !triple {
                    self.advance();
                    break;
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.advance();
                    self.advance();
                    self.advance();
                    break;
                }
            }
            if ch == '\n' && !triple {
                self.report_unterminated(start);
                break;
            }

            match ch {
                '\\' if flags.raw => {
                    self.advance();
                    text.push('\\');
                    if let Some(next) = self.advance() {
                        text.push(next);
                    }
                }
                '\\' => self.scan_escape(&mut text),
                '{' if flags.format => {
                    self.advance();
                    if self.peek() == Some('{') {
                        self.advance();
                        text.push('{');
                        continue;
                    }
                    if !text.is_empty() {
                        pieces.push(FStringPiece::Text(std::mem::take(&mut text)));
                    }
                    if let Some(field) = self.scan_fstring_field(quote, triple) {
                        pieces.push(field);
                    }
                }
                '}' if flags.format => {
                    let brace = self.mark();
                    self.advance();
                    if self.peek() == Some('}') {
                        self.advance();
                    } else {
                        let span = self.span_from(brace);
                        self.emit_error_with_suggestion(
                            ErrorCode::UNEXPECTED_TOKEN,
                            "single '}' is not allowed in an f-string",
                            span,
                            "write '}}' for a literal brace",
                        );
                    }
                    text.push('}');
                }
                _ => {
                    self.advance();
                    text.push(ch);
                }
            }
        }

        let kind = if flags.format {
            if !text.is_empty() {
                pieces.push(FStringPiece::Text(text));
            }
            TokenKind::FString(pieces)
        } else {
            TokenKind::Str(text)
        };
        self.push(kind, start);
    }

    fn report_unterminated(&mut self, start: Mark) {
        let span = self.span_from(start);
        self.emit_error_with_suggestion(
            ErrorCode::UNTERMINATED_STRING,
            "unterminated string literal",
            span,
            "close the string with a matching quote",
        );
    }

    /// Scan an escape sequence starting at the `\`.
    fn scan_escape(&mut self, text: &mut String) {
        let start = self.mark();
        self.advance();
        let resolved = match self.advance() {
            // Reported by the caller as an unterminated string.
            None => return,
            Some('\n') => return,
            Some('n') => '\n',
            Some('t') => '\t',
            Some('r') => '\r',
            Some('0') => '\0',
            Some('a') => '\x07',
            Some('b') => '\x08',
            Some('f') => '\x0c',
            Some('v') => '\x0b',
            Some(c @ ('\\' | '\'' | '"')) => c,
            Some(c @ ('x' | 'u' | 'U')) => {
                let len = match c {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                match self.read_hex_char(len) {
                    Some(decoded) => decoded,
                    None => {
                        let span = self.span_from(start);
                        self.emit_error(
                            ErrorCode::INVALID_LITERAL,
                            format!("invalid \\{c} escape"),
                            span,
                        );
                        return;
                    }
                }
            }
            Some(other) => {
                text.push('\\');
                other
            }
        };
        text.push(resolved);
    }

    fn read_hex_char(&mut self, len: usize) -> Option<char> {
        let digits: String = (0..len).filter_map(|i| self.peek_at(i)).collect();
        if digits.len() != len || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        for _ in 0..len {
            self.advance();
        }
        u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32)
    }

    /// Scan a replacement field after its `{`, through the closing `}`.
    fn scan_fstring_field(&mut self, quote: char, triple: bool) -> Option<FStringPiece> {
        let (line, col) = self.mark();
        let mut source = String::new();
        let mut spec = None;
        let mut depth = 0u32;
        let mut inner_quote: Option<char> = None;

        loop {
            let Some(ch) = self.peek() else {
                self.report_unclosed_field(line, col);
                return None;
            };
            let closes_string = ch == quote
                && (!triple || (self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote)));
            if (ch == '\n' && !triple) || (closes_string && inner_quote.is_none()) {
                self.report_unclosed_field(line, col);
                return None;
            }

            if let Some(q) = inner_quote {
                self.advance();
                source.push(ch);
                if ch == q {
                    inner_quote = None;
                }
                continue;
            }

            match ch {
                '\'' | '"' => inner_quote = Some(ch),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' => depth = depth.saturating_sub(1),
                '}' if depth > 0 => depth -= 1,
                '}' => {
                    self.advance();
                    break;
                }
                ':' if depth == 0 => {
                    self.advance();
                    spec = Some(self.scan_format_spec(line, col)?);
                    break;
                }
                '!' if depth == 0 && self.peek_at(1) != Some('=') => {
                    let bang = self.mark();
                    self.advance();
                    self.advance();
                    let span = self.span_from(bang);
                    self.emit_error_with_suggestion(
                        ErrorCode::UNSUPPORTED_SYNTAX,
                        "conversion flags in f-strings are not supported",
                        span,
                        "call repr(...) or str(...) inside the braces",
                    );
                    continue;
                }
                _ => {}
            }
            self.advance();
            source.push(ch);
        }

        if source.trim().is_empty() {
            self.emit_error(
                ErrorCode::UNEXPECTED_TOKEN,
                "empty expression in f-string",
                Span::point(line, col),
            );
            return None;
        }
        Some(FStringPiece::Field {
            source,
            spec,
            line,
            col,
        })
    }

    /// Scan a format spec after `:`, through the closing `}`.
    fn scan_format_spec(&mut self, line: u32, col: u32) -> Option<String> {
        let mut spec = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    self.report_unclosed_field(line, col);
                    return None;
                }
                Some('}') => {
                    self.advance();
                    return Some(spec);
                }
                Some(ch) => {
                    self.advance();
                    spec.push(ch);
                }
            }
        }
    }

    fn report_unclosed_field(&mut self, line: u32, col: u32) {
        self.emit_error_with_suggestion(
            ErrorCode::UNTERMINATED_STRING,
            "unterminated replacement field in f-string",
            Span::point(line, col),
            "close the field with '}'",
        );
    }
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
