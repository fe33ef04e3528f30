//! Core parser infrastructure: token cursor, error reporting, helpers.

use scriptbox_lexer::token::{Token, TokenKind};
use scriptbox_types::ast::{Ident, Program, Stmt};
use scriptbox_types::{CodeError, CodeErrors, ErrorCode, SourceFile, Span};

/// Maximum expression nesting depth.
pub const MAX_EXPR_DEPTH: u32 = 64;
/// Maximum depth of an expression tree, counting each link of a left-nested
/// operator, attribute, call or subscript chain as one level.
pub const MAX_TREE_DEPTH: u32 = 256;
/// Maximum nesting depth of indented blocks.
pub const MAX_BLOCK_DEPTH: u32 = 32;

/// The snippet parser.
///
/// Consumes a token stream produced by the lexer and builds an AST.
/// Collects errors and attempts recovery when possible.
pub struct Parser<'src> {
    tokens: Vec<Token>,
    pos: usize,
    /// Source file for error context.
    source_file: &'src SourceFile,
    file_name: String,
    errors: CodeErrors,
    pub(crate) expr_depth: u32,
    pub(crate) chain_depth: u32,
    pub(crate) block_depth: u32,
}

/// Result of parsing.
pub struct ParseResult {
    /// The program; present even when errors were reported, with the
    /// statements that failed to parse left out.
    pub program: Option<Program>,
    pub errors: CodeErrors,
}

impl<'src> Parser<'src> {
    /// Create a new parser from a token stream and source file.
    pub fn new(tokens: Vec<Token>, source_file: &'src SourceFile) -> Self {
        let tokens = if tokens.is_empty() {
            vec![Token::new(TokenKind::Eof, Span::point(1, 1))]
        } else {
            tokens
        };
        Self {
            tokens,
            pos: 0,
            file_name: source_file.name.clone(),
            source_file,
            errors: CodeErrors::empty(),
            expr_depth: 0,
            chain_depth: 0,
            block_depth: 0,
        }
    }

    // ── Token Cursor ──────────────────────────────────────────────────────────

    /// Returns the current token without advancing.
    pub(crate) fn peek(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.pos.min(last)]
    }

    pub(crate) fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    /// Advance the cursor by one and return the consumed token.
    pub(crate) fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    /// Returns the previously consumed token's span.
    pub(crate) fn previous_span(&self) -> Span {
        if self.pos > 0 {
            self.tokens[self.pos - 1].span
        } else {
            Span::point(1, 1)
        }
    }

    pub(crate) fn current_span(&self) -> Span {
        self.peek().span
    }

    pub(crate) fn at_end(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    /// Check if the current token matches the given kind exactly.
    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    /// If the current token matches, advance and return `true`.
    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Look ahead by `n` tokens from current position.
    pub(crate) fn look_ahead(&self, n: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    /// Whether the current token ends a simple statement.
    pub(crate) fn at_line_end(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Newline | TokenKind::Dedent | TokenKind::Eof
        )
    }

    // ── Newline Handling ──────────────────────────────────────────────────────

    pub(crate) fn skip_newlines(&mut self) {
        while self.check(&TokenKind::Newline) {
            self.advance();
        }
    }

    /// Expect the end of a simple statement.
    pub(crate) fn expect_newline(&mut self) {
        match self.peek_kind() {
            TokenKind::Newline => {
                self.advance();
            }
            TokenKind::Dedent | TokenKind::Eof => {}
            other => {
                let message = format!("expected newline, got '{other}'");
                self.error_at_current(ErrorCode::UNEXPECTED_TOKEN, message);
            }
        }
    }

    // ── Expect Helpers ────────────────────────────────────────────────────────

    /// Expect a specific token kind. Returns the token if matched, or emits an error.
    pub(crate) fn expect(&mut self, expected: &TokenKind) -> Option<Token> {
        if self.check(expected) {
            Some(self.advance())
        } else {
            let message = format!("expected '{}', got '{}'", expected, self.peek_kind());
            self.error_at_current(ErrorCode::UNEXPECTED_TOKEN, message);
            None
        }
    }

    /// Expect a name token.
    pub(crate) fn expect_name(&mut self) -> Option<Ident> {
        match self.peek_kind().clone() {
            TokenKind::Name(name) => {
                let span = self.advance().span;
                Some(Ident::new(name, span))
            }
            TokenKind::Reserved(word) => {
                self.error_at_current(
                    ErrorCode::UNSUPPORTED_SYNTAX,
                    format!("'{word}' is reserved and cannot be used as a name"),
                );
                None
            }
            other => {
                self.error_at_current(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("expected a name, got '{other}'"),
                );
                None
            }
        }
    }

    // ── Error Reporting ───────────────────────────────────────────────────────

    /// Report an error at the current token position.
    pub(crate) fn error_at_current(&mut self, code: ErrorCode, message: impl Into<String>) {
        let span = self.current_span();
        self.error_at(code, message, span);
    }

    /// Report an error at a specific span.
    pub(crate) fn error_at(&mut self, code: ErrorCode, message: impl Into<String>, span: Span) {
        let error = self.make_error(code, message, span);
        self.errors.push_error(error);
    }

    pub(crate) fn error_with_suggestion(
        &mut self,
        code: ErrorCode,
        message: impl Into<String>,
        span: Span,
        suggestion: impl Into<String>,
    ) {
        let error = self.make_error(code, message, span).with_suggestion(suggestion);
        self.errors.push_error(error);
    }

    fn make_error(&self, code: ErrorCode, message: impl Into<String>, span: Span) -> CodeError {
        let source_line = self.source_file.line(span.start_line).unwrap_or("");
        CodeError::new(&self.file_name, code, message, span, source_line)
    }

    /// Adopt errors produced for the same source elsewhere (f-string fields).
    pub(crate) fn absorb_errors(&mut self, errors: CodeErrors) {
        self.errors.extend(errors);
    }

    pub(crate) fn into_errors(self) -> CodeErrors {
        self.errors
    }

    pub(crate) fn has_errors(&self) -> bool {
        self.errors.has_errors()
    }

    /// Returns `true` if we've hit the error limit and should stop.
    pub(crate) fn too_many_errors(&self) -> bool {
        self.errors.is_full()
    }

    pub(crate) fn source_file(&self) -> &'src SourceFile {
        self.source_file
    }

    pub(crate) fn file_name(&self) -> &str {
        &self.file_name
    }

    // ── Synchronization ───────────────────────────────────────────────────────

    /// Skip to the start of the next statement after an error.
    ///
    /// Stops after the next newline (skipping any block that hangs off the
    /// broken line) or before a `Dedent` that closes the current block.
    pub(crate) fn synchronize(&mut self) {
        while !self.at_end() {
            match self.peek_kind() {
                TokenKind::Newline => {
                    self.advance();
                    if self.check(&TokenKind::Indent) {
                        self.skip_indented_block();
                    }
                    return;
                }
                TokenKind::Dedent => return,
                TokenKind::Indent => self.skip_indented_block(),
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// Skip from an `Indent` through its matching `Dedent`.
    pub(crate) fn skip_indented_block(&mut self) {
        let mut depth = 0u32;
        while !self.at_end() {
            match self.advance().kind {
                TokenKind::Indent => depth += 1,
                TokenKind::Dedent => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    // ── Public API ────────────────────────────────────────────────────────────

    /// Parse the token stream into a `Program` AST.
    pub fn parse(mut self) -> ParseResult {
        let program = self.parse_program();
        ParseResult {
            program: Some(program),
            errors: self.errors,
        }
    }

    fn parse_program(&mut self) -> Program {
        let mut body: Vec<Stmt> = Vec::new();
        self.skip_newlines();
        while !self.at_end() && !self.too_many_errors() {
            match self.peek_kind() {
                TokenKind::Indent => {
                    self.error_at_current(ErrorCode::INCONSISTENT_INDENTATION, "unexpected indent");
                    self.skip_indented_block();
                    continue;
                }
                TokenKind::Dedent | TokenKind::Newline => {
                    self.advance();
                    continue;
                }
                _ => {}
            }
            match self.parse_statement() {
                Some(stmt) => body.push(stmt),
                None => self.synchronize(),
            }
        }

        let span = match (body.first(), body.last()) {
            (Some(first), Some(last)) => first.span.merge(last.span),
            _ => Span::point(1, 1),
        };
        Program { body, span }
    }
}
