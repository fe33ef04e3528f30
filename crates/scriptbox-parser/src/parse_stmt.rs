//! Statement parsing: simple statements, compound statements and blocks.

use std::sync::Arc;

use scriptbox_lexer::token::TokenKind;
use scriptbox_types::ast::*;
use scriptbox_types::ErrorCode;

use crate::parser::{Parser, MAX_BLOCK_DEPTH};

impl<'src> Parser<'src> {
    // ══════════════════════════════════════════════════════════════════════════
    // Dispatch
    // ══════════════════════════════════════════════════════════════════════════

    /// Parse one statement. Returns `None` after reporting an error; the
    /// caller is expected to [`synchronize`](Parser::synchronize).
    pub(crate) fn parse_statement(&mut self) -> Option<Stmt> {
        match self.peek_kind() {
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Def => self.parse_def(),
            TokenKind::Try => self.parse_try(),
            TokenKind::Reserved(word) => {
                let message = format!("'{word}' statements are not supported");
                self.error_at_current(ErrorCode::UNSUPPORTED_SYNTAX, message);
                None
            }
            _ => {
                let stmt = self.parse_simple_statement()?;
                self.expect_newline();
                Some(stmt)
            }
        }
    }

    fn parse_simple_statement(&mut self) -> Option<Stmt> {
        let start = self.current_span();
        match self.peek_kind() {
            TokenKind::Pass => {
                self.advance();
                Some(Stmt::new(StmtKind::Pass, start))
            }
            TokenKind::Break => {
                self.advance();
                Some(Stmt::new(StmtKind::Break, start))
            }
            TokenKind::Continue => {
                self.advance();
                Some(Stmt::new(StmtKind::Continue, start))
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.at_line_end() {
                    None
                } else {
                    Some(self.parse_expr_list()?)
                };
                let span = start.merge(self.previous_span());
                Some(Stmt::new(StmtKind::Return(value), span))
            }
            TokenKind::Raise => self.parse_raise(),
            TokenKind::Assert => {
                self.advance();
                let condition = self.parse_expression()?;
                let message = if self.eat(&TokenKind::Comma) {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                let span = start.merge(self.previous_span());
                Some(Stmt::new(StmtKind::Assert { condition, message }, span))
            }
            TokenKind::Import => self.parse_import(),
            TokenKind::From => self.parse_from_import(),
            _ => self.parse_expression_statement(),
        }
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Expression statements & assignment
    // ══════════════════════════════════════════════════════════════════════════

    /// `expr`, `t1 = t2 = expr`, `t op= expr` or `name: annotation = expr`.
    fn parse_expression_statement(&mut self) -> Option<Stmt> {
        let first = self.parse_expr_list()?;
        let start = first.span;

        if self.check(&TokenKind::Eq) {
            let mut chain = vec![first];
            while self.eat(&TokenKind::Eq) {
                chain.push(self.parse_expr_list()?);
            }
            let value = chain.pop()?;
            let targets = chain
                .into_iter()
                .map(|expr| self.expr_to_target(expr))
                .collect::<Option<Vec<_>>>()?;
            let span = start.merge(value.span);
            return Some(Stmt::new(StmtKind::Assign { targets, value }, span));
        }

        if let Some(op) = augmented_op(self.peek_kind()) {
            self.advance();
            if matches!(first.kind, ExprKind::Tuple(_) | ExprKind::List(_)) {
                self.error_at(
                    ErrorCode::INVALID_ASSIGNMENT_TARGET,
                    "augmented assignment needs a single target",
                    first.span,
                );
                return None;
            }
            let target = self.expr_to_target(first)?;
            let value = self.parse_expr_list()?;
            let span = start.merge(value.span);
            return Some(Stmt::new(StmtKind::AugAssign { target, op, value }, span));
        }

        if self.check(&TokenKind::Colon) && matches!(first.kind, ExprKind::Name(_)) {
            // Annotated assignment: the annotation is parsed and dropped.
            self.advance();
            self.parse_expression()?;
            if !self.eat(&TokenKind::Eq) {
                self.error_with_suggestion(
                    ErrorCode::UNSUPPORTED_SYNTAX,
                    "annotations without a value are not supported",
                    start.merge(self.previous_span()),
                    "assign a value, e.g. `x: int = 0`",
                );
                return None;
            }
            let value = self.parse_expr_list()?;
            let target = self.expr_to_target(first)?;
            let span = start.merge(value.span);
            return Some(Stmt::new(
                StmtKind::Assign {
                    targets: vec![target],
                    value,
                },
                span,
            ));
        }

        Some(Stmt::new(StmtKind::Expr(first), start))
    }

    /// Convert a parsed expression to an assignment target.
    pub(crate) fn expr_to_target(&mut self, expr: Expr) -> Option<Target> {
        match expr.kind {
            ExprKind::Name(name) => Some(Target::Name(Ident::new(name, expr.span))),
            ExprKind::Subscript { object, index } => Some(Target::Subscript {
                object,
                index,
                span: expr.span,
            }),
            ExprKind::Tuple(items) | ExprKind::List(items) => {
                let targets = items
                    .into_iter()
                    .map(|item| self.expr_to_target(item))
                    .collect::<Option<Vec<_>>>()?;
                Some(Target::Tuple(targets, expr.span))
            }
            ExprKind::Attribute { .. } => {
                self.error_with_suggestion(
                    ErrorCode::INVALID_ASSIGNMENT_TARGET,
                    "assignment to attributes is not supported",
                    expr.span,
                    "store the value in a dict or a plain variable",
                );
                None
            }
            other => {
                let message = format!("cannot assign to {}", describe_expr(&other));
                self.error_at(ErrorCode::INVALID_ASSIGNMENT_TARGET, message, expr.span);
                None
            }
        }
    }

    // ══════════════════════════════════════════════════════════════════════════
    // raise / import
    // ══════════════════════════════════════════════════════════════════════════

    fn parse_raise(&mut self) -> Option<Stmt> {
        let start = self.advance().span;
        let value = if self.at_line_end() {
            None
        } else {
            Some(self.parse_expression()?)
        };
        if self.check(&TokenKind::From) {
            self.error_at_current(
                ErrorCode::UNSUPPORTED_SYNTAX,
                "'raise ... from ...' is not supported",
            );
            return None;
        }
        let span = start.merge(self.previous_span());
        Some(Stmt::new(StmtKind::Raise(value), span))
    }

    /// `import a, b.c as d`
    fn parse_import(&mut self) -> Option<Stmt> {
        let start = self.advance().span;
        let mut names = Vec::new();
        loop {
            let name = self.parse_dotted_name()?;
            let alias = if self.eat(&TokenKind::As) {
                Some(self.expect_name()?)
            } else {
                None
            };
            names.push(ImportName { name, alias });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let span = start.merge(self.previous_span());
        Some(Stmt::new(StmtKind::Import(names), span))
    }

    /// `from module import a, b as c` or `from module import (a, b)`
    fn parse_from_import(&mut self) -> Option<Stmt> {
        let start = self.advance().span;
        if self.check(&TokenKind::Dot) {
            self.error_at_current(
                ErrorCode::UNSUPPORTED_SYNTAX,
                "relative imports are not supported",
            );
            return None;
        }
        let module = self.parse_dotted_name()?;
        self.expect(&TokenKind::Import)?;
        if self.check(&TokenKind::Star) {
            self.error_with_suggestion(
                ErrorCode::UNSUPPORTED_SYNTAX,
                "wildcard imports are not supported",
                self.current_span(),
                format!("import the names you need, or `import {}`", module.name),
            );
            return None;
        }

        let parenthesized = self.eat(&TokenKind::LParen);
        let mut names = Vec::new();
        loop {
            let name = self.expect_name()?;
            let alias = if self.eat(&TokenKind::As) {
                Some(self.expect_name()?)
            } else {
                None
            };
            names.push(ImportName { name, alias });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
            if parenthesized && self.check(&TokenKind::RParen) {
                break;
            }
        }
        if parenthesized {
            self.expect(&TokenKind::RParen)?;
        }
        let span = start.merge(self.previous_span());
        Some(Stmt::new(StmtKind::ImportFrom { module, names }, span))
    }

    /// `a.b.c` as a single identifier.
    fn parse_dotted_name(&mut self) -> Option<Ident> {
        let mut ident = self.expect_name()?;
        while self.eat(&TokenKind::Dot) {
            let part = self.expect_name()?;
            ident.name.push('.');
            ident.name.push_str(&part.name);
            ident.span = ident.span.merge(part.span);
        }
        Some(ident)
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Compound statements
    // ══════════════════════════════════════════════════════════════════════════

    /// `if c: ... elif c: ... else: ...`
    fn parse_if(&mut self) -> Option<Stmt> {
        let start = self.advance().span;
        let mut branches = Vec::new();
        let condition = self.parse_expression()?;
        let body = self.parse_block()?;
        branches.push(IfBranch { condition, body });

        while self.check(&TokenKind::Elif) {
            self.advance();
            let condition = self.parse_expression()?;
            let body = self.parse_block()?;
            branches.push(IfBranch { condition, body });
        }

        let else_block = if self.eat(&TokenKind::Else) {
            Some(self.parse_block()?)
        } else {
            None
        };

        let span = start.merge(self.previous_span());
        Some(Stmt::new(
            StmtKind::If(IfStmt {
                branches,
                else_block,
            }),
            span,
        ))
    }

    fn parse_while(&mut self) -> Option<Stmt> {
        let start = self.advance().span;
        let condition = self.parse_expression()?;
        let body = self.parse_block()?;
        self.reject_loop_else()?;
        let span = start.merge(self.previous_span());
        Some(Stmt::new(StmtKind::While { condition, body }, span))
    }

    fn parse_for(&mut self) -> Option<Stmt> {
        let start = self.advance().span;
        let target = self.parse_target_list()?;
        self.expect(&TokenKind::In)?;
        let iterable = self.parse_expr_list()?;
        let body = self.parse_block()?;
        self.reject_loop_else()?;
        let span = start.merge(self.previous_span());
        Some(Stmt::new(
            StmtKind::For {
                target,
                iterable,
                body,
            },
            span,
        ))
    }

    fn reject_loop_else(&mut self) -> Option<()> {
        if self.check(&TokenKind::Else) {
            self.error_with_suggestion(
                ErrorCode::UNSUPPORTED_SYNTAX,
                "'else' clauses on loops are not supported",
                self.current_span(),
                "track completion with a flag variable",
            );
            return None;
        }
        Some(())
    }

    /// `def name(a, b=1) -> T: body`
    fn parse_def(&mut self) -> Option<Stmt> {
        let start = self.advance().span;
        let name = self.expect_name()?;
        self.expect(&TokenKind::LParen)?;
        let params = self.parse_params(&TokenKind::RParen, true)?;
        self.expect(&TokenKind::RParen)?;
        if self.eat(&TokenKind::Arrow) {
            // Return annotations are accepted and ignored.
            self.parse_expression()?;
        }
        let body = self.parse_block()?;
        let span = start.merge(self.previous_span());
        let def = FunctionDef {
            name,
            params,
            body,
            span,
        };
        Some(Stmt::new(StmtKind::FunctionDef(Arc::new(def)), span))
    }

    /// Parameters up to (not including) `close`. Annotations are allowed in
    /// `def` headers and dropped.
    pub(crate) fn parse_params(
        &mut self,
        close: &TokenKind,
        allow_annotations: bool,
    ) -> Option<Vec<Param>> {
        let mut params: Vec<Param> = Vec::new();
        while !self.check(close) {
            if matches!(self.peek_kind(), TokenKind::Star | TokenKind::DoubleStar) {
                self.error_with_suggestion(
                    ErrorCode::UNSUPPORTED_SYNTAX,
                    "variadic parameters are not supported",
                    self.current_span(),
                    "take a list or dict argument instead",
                );
                return None;
            }
            let name = self.expect_name()?;
            if params.iter().any(|p| p.name.name == name.name) {
                let message = format!("duplicate parameter '{}'", name.name);
                self.error_at(ErrorCode::UNEXPECTED_TOKEN, message, name.span);
                return None;
            }
            if allow_annotations && self.eat(&TokenKind::Colon) {
                self.parse_expression()?;
            }
            let default = if self.eat(&TokenKind::Eq) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            if default.is_none() && params.iter().any(|p| p.default.is_some()) {
                self.error_at(
                    ErrorCode::UNEXPECTED_TOKEN,
                    "parameter without a default follows parameter with a default",
                    name.span,
                );
                return None;
            }
            params.push(Param { name, default });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Some(params)
    }

    /// `try: ... except K as e: ... finally: ...`
    fn parse_try(&mut self) -> Option<Stmt> {
        let start = self.advance().span;
        let body = self.parse_block()?;

        let mut handlers = Vec::new();
        while self.check(&TokenKind::Except) {
            let handler_start = self.advance().span;
            let kind = match self.peek_kind() {
                TokenKind::Name(_) => Some(self.expect_name()?),
                TokenKind::LParen => {
                    self.error_with_suggestion(
                        ErrorCode::UNSUPPORTED_SYNTAX,
                        "catching several exception kinds in one clause is not supported",
                        self.current_span(),
                        "write one 'except' clause per kind",
                    );
                    return None;
                }
                _ => None,
            };
            let binding = if kind.is_some() && self.eat(&TokenKind::As) {
                Some(self.expect_name()?)
            } else {
                None
            };
            let handler_body = self.parse_block()?;
            let span = handler_start.merge(handler_body.span);
            handlers.push(ExceptHandler {
                kind,
                binding,
                body: handler_body,
                span,
            });
        }

        if self.check(&TokenKind::Else) {
            self.error_at_current(
                ErrorCode::UNSUPPORTED_SYNTAX,
                "'else' clauses on try statements are not supported",
            );
            return None;
        }

        let finally = if self.eat(&TokenKind::Finally) {
            Some(self.parse_block()?)
        } else {
            None
        };

        if handlers.is_empty() && finally.is_none() {
            self.error_at_current(
                ErrorCode::UNEXPECTED_TOKEN,
                "expected 'except' or 'finally' after try block",
            );
            return None;
        }

        let span = start.merge(self.previous_span());
        Some(Stmt::new(
            StmtKind::Try(TryStmt {
                body,
                handlers,
                finally,
            }),
            span,
        ))
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Blocks
    // ══════════════════════════════════════════════════════════════════════════

    /// `: NEWLINE INDENT stmt+ DEDENT`, or `: simple_stmt` on the same line.
    pub(crate) fn parse_block(&mut self) -> Option<Block> {
        let colon = self.expect(&TokenKind::Colon)?.span;

        if !self.check(&TokenKind::Newline) {
            let stmt = self.parse_simple_statement()?;
            self.expect_newline();
            let span = stmt.span;
            return Some(Block {
                stmts: vec![stmt],
                span,
            });
        }
        self.advance();

        if !self.check(&TokenKind::Indent) {
            self.error_with_suggestion(
                ErrorCode::INCONSISTENT_INDENTATION,
                "expected an indented block",
                self.current_span(),
                "indent the block body, or write `pass` for an empty body",
            );
            return None;
        }
        self.advance();

        self.block_depth += 1;
        if self.block_depth > MAX_BLOCK_DEPTH {
            self.error_at(
                ErrorCode::STRUCTURAL_LIMIT_EXCEEDED,
                format!("blocks may be nested at most {MAX_BLOCK_DEPTH} deep"),
                colon,
            );
            self.block_depth -= 1;
            return None;
        }

        let mut stmts = Vec::new();
        loop {
            match self.peek_kind() {
                TokenKind::Dedent => {
                    self.advance();
                    break;
                }
                TokenKind::Eof => break,
                TokenKind::Newline => {
                    self.advance();
                    continue;
                }
                TokenKind::Indent => {
                    self.error_at_current(ErrorCode::INCONSISTENT_INDENTATION, "unexpected indent");
                    self.skip_indented_block();
                    continue;
                }
                _ => {}
            }
            if self.too_many_errors() {
                break;
            }
            match self.parse_statement() {
                Some(stmt) => stmts.push(stmt),
                None => self.synchronize(),
            }
        }
        self.block_depth -= 1;

        let span = match (stmts.first(), stmts.last()) {
            (Some(first), Some(last)) => first.span.merge(last.span),
            _ => colon,
        };
        Some(Block { stmts, span })
    }
}

fn augmented_op(kind: &TokenKind) -> Option<BinOp> {
    Some(match kind {
        TokenKind::PlusEq => BinOp::Add,
        TokenKind::MinusEq => BinOp::Sub,
        TokenKind::StarEq => BinOp::Mul,
        TokenKind::SlashEq => BinOp::Div,
        TokenKind::DoubleSlashEq => BinOp::FloorDiv,
        TokenKind::PercentEq => BinOp::Mod,
        TokenKind::DoubleStarEq => BinOp::Pow,
        _ => return None,
    })
}

/// Describe an expression form for "cannot assign to ..." messages.
fn describe_expr(kind: &ExprKind) -> &'static str {
    match kind {
        ExprKind::Int(_) | ExprKind::Float(_) | ExprKind::Str(_) | ExprKind::FString(_) => {
            "a literal"
        }
        ExprKind::Bool(_) | ExprKind::NoneLit => "a constant",
        ExprKind::Call { .. } => "a function call",
        ExprKind::Binary { .. } | ExprKind::Unary { .. } | ExprKind::BoolOp { .. } => {
            "an expression"
        }
        ExprKind::Compare { .. } => "a comparison",
        ExprKind::Lambda(_) => "a lambda",
        ExprKind::IfExp { .. } => "a conditional expression",
        ExprKind::ListComp { .. } | ExprKind::DictComp { .. } => "a comprehension",
        ExprKind::Dict(_) => "a dict literal",
        _ => "this expression",
    }
}
