//! Expression parsing with full operator precedence.
//!
//! Precedence (lowest → highest):
//! 1. `lambda`
//! 2. `x if c else y`
//! 3. `or`
//! 4. `and`
//! 5. `not`
//! 6. comparisons, chained: `==` `!=` `<` `>` `<=` `>=` `in` `not in` `is` `is not`
//! 7. `+`, `-`
//! 8. `*`, `/`, `//`, `%`
//! 9. unary `-`, `+`
//! 10. `**` (right-associative, binds tighter than a unary on its left)
//! 11. `.attr`, `(call)`, `[subscript]`

use std::sync::Arc;

use scriptbox_lexer::token::{FStringPiece, Token, TokenKind};
use scriptbox_lexer::Lexer;
use scriptbox_types::ast::*;
use scriptbox_types::{ErrorCode, SourceFile, Span};

use crate::parser::{Parser, MAX_EXPR_DEPTH, MAX_TREE_DEPTH};

impl<'src> Parser<'src> {
    // ══════════════════════════════════════════════════════════════════════════
    // Entry Points
    // ══════════════════════════════════════════════════════════════════════════

    /// `expr ("," expr)* [","]`, producing a tuple when a comma is present.
    pub(crate) fn parse_expr_list(&mut self) -> Option<Expr> {
        let first = self.parse_expression()?;
        if !self.check(&TokenKind::Comma) {
            return Some(first);
        }
        let start = first.span;
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.at_expr_list_end() {
                break;
            }
            items.push(self.parse_expression()?);
        }
        let span = start.merge(self.previous_span());
        Some(Expr::new(ExprKind::Tuple(items), span))
    }

    fn at_expr_list_end(&self) -> bool {
        self.at_line_end()
            || matches!(
                self.peek_kind(),
                TokenKind::Eq
                    | TokenKind::RParen
                    | TokenKind::RBracket
                    | TokenKind::RBrace
                    | TokenKind::Colon
            )
    }

    /// Parse a single expression.
    pub(crate) fn parse_expression(&mut self) -> Option<Expr> {
        self.enter_expr()?;
        let result = if self.check(&TokenKind::Lambda) {
            self.parse_lambda()
        } else {
            self.parse_ternary()
        };
        self.expr_depth -= 1;
        result
    }

    fn enter_expr(&mut self) -> Option<()> {
        self.expr_depth += 1;
        if self.expr_depth > MAX_EXPR_DEPTH {
            self.error_at_current(
                ErrorCode::STRUCTURAL_LIMIT_EXCEEDED,
                format!("expressions may be nested at most {MAX_EXPR_DEPTH} deep"),
            );
            self.expr_depth -= 1;
            return None;
        }
        Some(())
    }

    /// Count one more link of a left-nested chain such as `a + b + c`.
    fn extend_chain(&mut self) -> Option<()> {
        if self.expr_depth + self.chain_depth >= MAX_TREE_DEPTH {
            self.error_at_current(
                ErrorCode::STRUCTURAL_LIMIT_EXCEEDED,
                format!("expressions may be at most {MAX_TREE_DEPTH} operations deep"),
            );
            return None;
        }
        self.chain_depth += 1;
        Some(())
    }

    /// Run a chain parser, releasing the links it counted once it returns.
    fn chain(&mut self, parse: fn(&mut Self) -> Option<Expr>) -> Option<Expr> {
        let base = self.chain_depth;
        let result = parse(self);
        self.chain_depth = base;
        result
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Precedence Chain
    // ══════════════════════════════════════════════════════════════════════════

    /// `OrExpr [ "if" OrExpr "else" Expression ]`
    fn parse_ternary(&mut self) -> Option<Expr> {
        let then = self.parse_or()?;
        if !self.check(&TokenKind::If) {
            return Some(then);
        }
        self.advance();
        let condition = self.parse_or()?;
        self.expect(&TokenKind::Else)?;
        let otherwise = self.parse_expression()?;
        let span = then.span.merge(otherwise.span);
        Some(Expr::new(
            ExprKind::IfExp {
                condition: Box::new(condition),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
            span,
        ))
    }

    /// `AndExpr { "or" AndExpr }`
    pub(crate) fn parse_or(&mut self) -> Option<Expr> {
        self.chain(Self::parse_or_chain)
    }

    fn parse_or_chain(&mut self) -> Option<Expr> {
        let mut left = self.parse_and()?;
        while self.eat(&TokenKind::Or) {
            self.extend_chain()?;
            let right = self.parse_and()?;
            left = bool_op(BoolOp::Or, left, right);
        }
        Some(left)
    }

    /// `NotExpr { "and" NotExpr }`
    fn parse_and(&mut self) -> Option<Expr> {
        self.chain(Self::parse_and_chain)
    }

    fn parse_and_chain(&mut self) -> Option<Expr> {
        let mut left = self.parse_not()?;
        while self.eat(&TokenKind::And) {
            self.extend_chain()?;
            let right = self.parse_not()?;
            left = bool_op(BoolOp::And, left, right);
        }
        Some(left)
    }

    /// `"not" NotExpr | Comparison`
    fn parse_not(&mut self) -> Option<Expr> {
        if !self.check(&TokenKind::Not) {
            return self.parse_comparison();
        }
        let start = self.advance().span;
        self.enter_expr()?;
        let operand = self.parse_not();
        self.expr_depth -= 1;
        let operand = operand?;
        let span = start.merge(operand.span);
        Some(Expr::new(
            ExprKind::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    /// `AddExpr { CmpOp AddExpr }`, chaining like `a < b <= c`.
    fn parse_comparison(&mut self) -> Option<Expr> {
        let left = self.parse_add()?;
        let mut rest = Vec::new();
        while let Some(op) = self.eat_comparison_op() {
            rest.push((op, self.parse_add()?));
        }
        if rest.is_empty() {
            return Some(left);
        }
        let span = rest
            .last()
            .map_or(left.span, |(_, right)| left.span.merge(right.span));
        Some(Expr::new(
            ExprKind::Compare {
                left: Box::new(left),
                rest,
            },
            span,
        ))
    }

    /// Consume a comparison operator (one or two tokens) if present.
    fn eat_comparison_op(&mut self) -> Option<CmpOp> {
        let op = match self.peek_kind() {
            TokenKind::EqEq => CmpOp::Eq,
            TokenKind::NotEq => CmpOp::NotEq,
            TokenKind::Less => CmpOp::Lt,
            TokenKind::Greater => CmpOp::Gt,
            TokenKind::LessEq => CmpOp::LtE,
            TokenKind::GreaterEq => CmpOp::GtE,
            TokenKind::In => CmpOp::In,
            TokenKind::Not if self.look_ahead(1) == &TokenKind::In => {
                self.advance();
                CmpOp::NotIn
            }
            TokenKind::Is if self.look_ahead(1) == &TokenKind::Not => {
                self.advance();
                CmpOp::IsNot
            }
            TokenKind::Is => CmpOp::Is,
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    /// `MulExpr { ("+" | "-") MulExpr }`
    fn parse_add(&mut self) -> Option<Expr> {
        self.chain(Self::parse_add_chain)
    }

    fn parse_add_chain(&mut self) -> Option<Expr> {
        let mut left = self.parse_mul()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            self.extend_chain()?;
            let right = self.parse_mul()?;
            left = binary(op, left, right);
        }
        Some(left)
    }

    /// `UnaryExpr { ("*" | "/" | "//" | "%") UnaryExpr }`
    fn parse_mul(&mut self) -> Option<Expr> {
        self.chain(Self::parse_mul_chain)
    }

    fn parse_mul_chain(&mut self) -> Option<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::DoubleSlash => BinOp::FloorDiv,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            self.extend_chain()?;
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
        Some(left)
    }

    /// `("-" | "+") UnaryExpr | PowerExpr`
    fn parse_unary(&mut self) -> Option<Expr> {
        let op = match self.peek_kind() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Pos,
            _ => return self.parse_power(),
        };
        let start = self.advance().span;
        self.enter_expr()?;
        let operand = self.parse_unary();
        self.expr_depth -= 1;
        let operand = operand?;

        // `-5` folds to a literal.
        if op == UnaryOp::Neg {
            let span = start.merge(operand.span);
            match operand.kind {
                ExprKind::Int(n) if n != i64::MIN => {
                    return Some(Expr::new(ExprKind::Int(-n), span));
                }
                ExprKind::Float(f) => return Some(Expr::new(ExprKind::Float(-f), span)),
                _ => {}
            }
        }

        let span = start.merge(operand.span);
        Some(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    /// `Postfix [ "**" UnaryExpr ]`
    fn parse_power(&mut self) -> Option<Expr> {
        let base = self.parse_postfix()?;
        if !self.eat(&TokenKind::DoubleStar) {
            return Some(base);
        }
        self.enter_expr()?;
        let exponent = self.parse_unary();
        self.expr_depth -= 1;
        Some(binary(BinOp::Pow, base, exponent?))
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Postfix: attribute, call, subscript
    // ══════════════════════════════════════════════════════════════════════════

    pub(crate) fn parse_postfix(&mut self) -> Option<Expr> {
        self.chain(Self::parse_postfix_chain)
    }

    fn parse_postfix_chain(&mut self) -> Option<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if matches!(
                self.peek_kind(),
                TokenKind::Dot | TokenKind::LParen | TokenKind::LBracket
            ) {
                self.extend_chain()?;
            }
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let attr = self.expect_name()?;
                    let span = expr.span.merge(attr.span);
                    expr = Expr::new(
                        ExprKind::Attribute {
                            object: Box::new(expr),
                            attr,
                        },
                        span,
                    );
                }
                TokenKind::LParen => {
                    self.advance();
                    let (args, kwargs) = self.parse_call_args()?;
                    let close = self.expect(&TokenKind::RParen)?;
                    let span = expr.span.merge(close.span);
                    expr = Expr::new(
                        ExprKind::Call {
                            func: Box::new(expr),
                            args,
                            kwargs,
                        },
                        span,
                    );
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_subscript_index()?;
                    let close = self.expect(&TokenKind::RBracket)?;
                    let span = expr.span.merge(close.span);
                    expr = Expr::new(
                        ExprKind::Subscript {
                            object: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    );
                }
                _ => break,
            }
        }
        Some(expr)
    }

    /// Positional and keyword arguments up to `)`. A lone generator
    /// argument (`sum(x for x in xs)`) becomes a list comprehension.
    fn parse_call_args(&mut self) -> Option<(Vec<Expr>, Vec<Keyword>)> {
        let mut args = Vec::new();
        let mut kwargs: Vec<Keyword> = Vec::new();
        while !self.check(&TokenKind::RParen) {
            if matches!(self.peek_kind(), TokenKind::Star | TokenKind::DoubleStar) {
                self.error_with_suggestion(
                    ErrorCode::UNSUPPORTED_SYNTAX,
                    "argument unpacking is not supported",
                    self.current_span(),
                    "pass the arguments explicitly",
                );
                return None;
            }

            if matches!(self.peek_kind(), TokenKind::Name(_))
                && self.look_ahead(1) == &TokenKind::Eq
            {
                let name = self.expect_name()?;
                self.advance();
                let value = self.parse_expression()?;
                if kwargs.iter().any(|k| k.name.name == name.name) {
                    let message = format!("keyword argument '{}' repeated", name.name);
                    self.error_at(ErrorCode::UNEXPECTED_TOKEN, message, name.span);
                    return None;
                }
                kwargs.push(Keyword { name, value });
            } else {
                let arg = self.parse_expression()?;
                if !kwargs.is_empty() {
                    self.error_at(
                        ErrorCode::UNEXPECTED_TOKEN,
                        "positional argument follows keyword argument",
                        arg.span,
                    );
                    return None;
                }
                if self.check(&TokenKind::For) && args.is_empty() {
                    let comp = self.parse_list_comp_tail(arg)?;
                    args.push(comp);
                    break;
                }
                args.push(arg);
            }

            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Some((args, kwargs))
    }

    /// An index expression or slice, possibly a tuple of them.
    fn parse_subscript_index(&mut self) -> Option<Expr> {
        let first = self.parse_slice_item()?;
        if !self.check(&TokenKind::Comma) {
            return Some(first);
        }
        let start = first.span;
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.check(&TokenKind::RBracket) {
                break;
            }
            items.push(self.parse_slice_item()?);
        }
        let span = start.merge(self.previous_span());
        Some(Expr::new(ExprKind::Tuple(items), span))
    }

    /// `expr` or `[lower]:[upper][:[step]]`
    fn parse_slice_item(&mut self) -> Option<Expr> {
        let start = self.current_span();
        let lower = if self.check(&TokenKind::Colon) {
            None
        } else {
            let expr = self.parse_expression()?;
            if !self.check(&TokenKind::Colon) {
                return Some(expr);
            }
            Some(Box::new(expr))
        };

        self.expect(&TokenKind::Colon)?;
        let upper = self.parse_slice_bound()?;
        let step = if self.eat(&TokenKind::Colon) {
            self.parse_slice_bound()?
        } else {
            None
        };
        let span = start.merge(self.previous_span());
        Some(Expr::new(ExprKind::Slice { lower, upper, step }, span))
    }

    fn parse_slice_bound(&mut self) -> Option<Option<Box<Expr>>> {
        if matches!(
            self.peek_kind(),
            TokenKind::Colon | TokenKind::RBracket | TokenKind::Comma
        ) {
            Some(None)
        } else {
            Some(Some(Box::new(self.parse_expression()?)))
        }
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Primary
    // ══════════════════════════════════════════════════════════════════════════

    fn parse_primary(&mut self) -> Option<Expr> {
        let token = self.peek().clone();
        let span = token.span;
        match token.kind {
            TokenKind::Int(n) => {
                self.advance();
                Some(Expr::new(ExprKind::Int(n), span))
            }
            TokenKind::Float(f) => {
                self.advance();
                Some(Expr::new(ExprKind::Float(f), span))
            }
            TokenKind::True => {
                self.advance();
                Some(Expr::new(ExprKind::Bool(true), span))
            }
            TokenKind::False => {
                self.advance();
                Some(Expr::new(ExprKind::Bool(false), span))
            }
            TokenKind::None => {
                self.advance();
                Some(Expr::new(ExprKind::NoneLit, span))
            }
            TokenKind::Str(_) | TokenKind::FString(_) => self.parse_string_run(),
            TokenKind::Name(name) => {
                self.advance();
                Some(Expr::new(ExprKind::Name(name), span))
            }
            TokenKind::LParen => self.parse_paren(),
            TokenKind::LBracket => self.parse_list(),
            TokenKind::LBrace => self.parse_dict(),
            TokenKind::Lambda => self.parse_lambda(),
            TokenKind::Reserved(word) => {
                self.error_at_current(
                    ErrorCode::UNSUPPORTED_SYNTAX,
                    format!("'{word}' is not supported"),
                );
                None
            }
            TokenKind::Star => {
                self.error_at_current(
                    ErrorCode::UNSUPPORTED_SYNTAX,
                    "starred expressions are not supported",
                );
                None
            }
            other => {
                self.error_at_current(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("expected an expression, got '{other}'"),
                );
                None
            }
        }
    }

    /// `( )`, `( expr )`, `( expr, ... )` or a parenthesized generator.
    fn parse_paren(&mut self) -> Option<Expr> {
        let open = self.advance().span;
        if let Some(close) = self.eat_span(&TokenKind::RParen) {
            return Some(Expr::new(ExprKind::Tuple(Vec::new()), open.merge(close)));
        }

        let first = self.parse_expression()?;
        if self.check(&TokenKind::For) {
            let comp = self.parse_list_comp_tail(first)?;
            let close = self.expect(&TokenKind::RParen)?.span;
            return Some(Expr::new(comp.kind, open.merge(close)));
        }
        if !self.check(&TokenKind::Comma) {
            self.expect(&TokenKind::RParen)?;
            return Some(first);
        }

        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.check(&TokenKind::RParen) {
                break;
            }
            items.push(self.parse_expression()?);
        }
        let close = self.expect(&TokenKind::RParen)?.span;
        Some(Expr::new(ExprKind::Tuple(items), open.merge(close)))
    }

    /// `[ ]`, `[ a, b ]` or `[ x for x in xs ]`
    fn parse_list(&mut self) -> Option<Expr> {
        let open = self.advance().span;
        if let Some(close) = self.eat_span(&TokenKind::RBracket) {
            return Some(Expr::new(ExprKind::List(Vec::new()), open.merge(close)));
        }

        let first = self.parse_expression()?;
        if self.check(&TokenKind::For) {
            let comp = self.parse_list_comp_tail(first)?;
            let close = self.expect(&TokenKind::RBracket)?.span;
            return Some(Expr::new(comp.kind, open.merge(close)));
        }

        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.check(&TokenKind::RBracket) {
                break;
            }
            items.push(self.parse_expression()?);
        }
        let close = self.expect(&TokenKind::RBracket)?.span;
        Some(Expr::new(ExprKind::List(items), open.merge(close)))
    }

    /// `{ }`, `{ k: v, ... }` or `{ k: v for ... }`. Set displays are rejected.
    fn parse_dict(&mut self) -> Option<Expr> {
        let open = self.advance().span;
        if let Some(close) = self.eat_span(&TokenKind::RBrace) {
            return Some(Expr::new(ExprKind::Dict(Vec::new()), open.merge(close)));
        }
        if self.check(&TokenKind::DoubleStar) {
            self.error_with_suggestion(
                ErrorCode::UNSUPPORTED_SYNTAX,
                "dict unpacking is not supported",
                self.current_span(),
                "merge dicts with .update()",
            );
            return None;
        }

        let key = self.parse_expression()?;
        if !self.check(&TokenKind::Colon) {
            self.error_with_suggestion(
                ErrorCode::UNSUPPORTED_SYNTAX,
                "set literals are not supported",
                key.span,
                "use a list, or a dict with the items as keys",
            );
            return None;
        }
        self.advance();
        let value = self.parse_expression()?;

        if self.check(&TokenKind::For) {
            let generators = self.parse_comprehension_clauses()?;
            let close = self.expect(&TokenKind::RBrace)?.span;
            return Some(Expr::new(
                ExprKind::DictComp {
                    key: Box::new(key),
                    value: Box::new(value),
                    generators,
                },
                open.merge(close),
            ));
        }

        let mut entries = vec![(key, value)];
        while self.eat(&TokenKind::Comma) {
            if self.check(&TokenKind::RBrace) {
                break;
            }
            let key = self.parse_expression()?;
            self.expect(&TokenKind::Colon)?;
            let value = self.parse_expression()?;
            entries.push((key, value));
        }
        let close = self.expect(&TokenKind::RBrace)?.span;
        Some(Expr::new(ExprKind::Dict(entries), open.merge(close)))
    }

    fn eat_span(&mut self, kind: &TokenKind) -> Option<Span> {
        if self.check(kind) {
            Some(self.advance().span)
        } else {
            None
        }
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Comprehensions & targets
    // ══════════════════════════════════════════════════════════════════════════

    fn parse_list_comp_tail(&mut self, element: Expr) -> Option<Expr> {
        let start = element.span;
        let generators = self.parse_comprehension_clauses()?;
        let span = start.merge(self.previous_span());
        Some(Expr::new(
            ExprKind::ListComp {
                element: Box::new(element),
                generators,
            },
            span,
        ))
    }

    /// One or more `for target in iterable [if cond]*` clauses.
    fn parse_comprehension_clauses(&mut self) -> Option<Vec<Comprehension>> {
        let mut generators = Vec::new();
        while self.eat(&TokenKind::For) {
            let target = self.parse_target_list()?;
            self.expect(&TokenKind::In)?;
            let iterable = self.parse_or()?;
            let mut conditions = Vec::new();
            while self.eat(&TokenKind::If) {
                conditions.push(self.parse_or()?);
            }
            generators.push(Comprehension {
                target,
                iterable,
                conditions,
            });
        }
        Some(generators)
    }

    /// Loop targets: `x`, `a, b`, `(a, b)`, `d[k]`. Parsed below the
    /// comparison level so the following `in` is not consumed.
    pub(crate) fn parse_target_list(&mut self) -> Option<Target> {
        let first = self.parse_postfix()?;
        if !self.check(&TokenKind::Comma) {
            return self.expr_to_target(first);
        }
        let start = first.span;
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.check(&TokenKind::In) {
                break;
            }
            items.push(self.parse_postfix()?);
        }
        let span = start.merge(self.previous_span());
        self.expr_to_target(Expr::new(ExprKind::Tuple(items), span))
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Lambda
    // ══════════════════════════════════════════════════════════════════════════

    /// `lambda a, b=1: expr`
    fn parse_lambda(&mut self) -> Option<Expr> {
        let start = self.advance().span;
        let params = self.parse_params(&TokenKind::Colon, false)?;
        self.expect(&TokenKind::Colon)?;
        let body = self.parse_expression()?;
        let span = start.merge(body.span);
        let def = FunctionDef {
            name: Ident::new("<lambda>", start),
            params,
            body: Block {
                stmts: vec![Stmt::new(StmtKind::Return(Some(body)), span)],
                span,
            },
            span,
        };
        Some(Expr::new(ExprKind::Lambda(Arc::new(def)), span))
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Strings & f-strings
    // ══════════════════════════════════════════════════════════════════════════

    /// Adjacent string literals concatenate; if any of them is an f-string
    /// the result is an f-string.
    fn parse_string_run(&mut self) -> Option<Expr> {
        let start = self.current_span();
        let mut parts: Vec<FStringPart> = Vec::new();
        let mut formatted = false;
        loop {
            match self.peek_kind().clone() {
                TokenKind::Str(text) => {
                    self.advance();
                    push_literal(&mut parts, text);
                }
                TokenKind::FString(pieces) => {
                    self.advance();
                    formatted = true;
                    for piece in pieces {
                        match piece {
                            FStringPiece::Text(text) => push_literal(&mut parts, text),
                            FStringPiece::Field {
                                source,
                                spec,
                                line,
                                col,
                            } => {
                                let expr = self.parse_fstring_field(&source, line, col)?;
                                parts.push(FStringPart::Field { expr, spec });
                            }
                        }
                    }
                }
                _ => break,
            }
        }
        let span = start.merge(self.previous_span());

        if formatted {
            return Some(Expr::new(ExprKind::FString(parts), span));
        }
        let text = match parts.pop() {
            Some(FStringPart::Literal(text)) => text,
            _ => String::new(),
        };
        Some(Expr::new(ExprKind::Str(text), span))
    }

    /// Parse the source of one replacement field. Token spans are shifted so
    /// diagnostics and AST spans point into the enclosing snippet.
    fn parse_fstring_field(&mut self, source: &str, line: u32, col: u32) -> Option<Expr> {
        let trimmed = source.trim_start();
        let lead = source[..source.len() - trimmed.len()].chars().count() as u32;
        let (line_offset, col_offset) = (line - 1, col - 1 + lead);

        let field_file = SourceFile::new(self.file_name(), trimmed);
        let lexed = Lexer::new(&field_file).lex();
        if lexed.errors.has_errors() {
            let mut errors = lexed.errors;
            for error in &mut errors.errors {
                error.span = error.span.relocate(line_offset, col_offset);
                error.source_line = self
                    .source_file()
                    .line(error.span.start_line)
                    .unwrap_or("")
                    .to_string();
            }
            self.absorb_errors(errors);
            return None;
        }

        let tokens: Vec<Token> = lexed
            .tokens
            .into_iter()
            .map(|t| Token::new(t.kind, t.span.relocate(line_offset, col_offset)))
            .collect();
        let mut field_parser = Parser::new(tokens, self.source_file());
        field_parser.expr_depth = self.expr_depth;
        field_parser.chain_depth = self.chain_depth;
        let expr = field_parser.parse_expr_list();
        if expr.is_some() && !field_parser.at_line_end() {
            field_parser.error_at_current(
                ErrorCode::UNEXPECTED_TOKEN,
                "unexpected token in f-string replacement field",
            );
        }
        let failed = field_parser.has_errors();
        self.absorb_errors(field_parser.into_errors());
        if failed {
            None
        } else {
            expr
        }
    }
}

fn push_literal(parts: &mut Vec<FStringPart>, text: String) {
    if let Some(FStringPart::Literal(last)) = parts.last_mut() {
        last.push_str(&text);
    } else {
        parts.push(FStringPart::Literal(text));
    }
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    let span = left.span.merge(right.span);
    Expr::new(
        ExprKind::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        },
        span,
    )
}

fn bool_op(op: BoolOp, left: Expr, right: Expr) -> Expr {
    let span = left.span.merge(right.span);
    Expr::new(
        ExprKind::BoolOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    )
}
