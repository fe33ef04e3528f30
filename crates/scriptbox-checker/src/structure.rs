//! Structural checks the grammar alone does not enforce.
//!
//! Error codes emitted:
//! - E105: `return` outside a function, `break`/`continue` outside a loop

use scriptbox_types::ast::*;
use scriptbox_types::{CodeError, CodeErrors, ErrorCode, SourceFile, Span};

/// Walks a parsed [`Program`] and validates where control flow may appear.
pub struct StructureChecker<'a> {
    errors: &'a mut CodeErrors,
    source: &'a SourceFile,
    in_function: bool,
    loop_depth: u32,
}

impl<'a> StructureChecker<'a> {
    pub fn new(errors: &'a mut CodeErrors, source: &'a SourceFile) -> Self {
        Self {
            errors,
            source,
            in_function: false,
            loop_depth: 0,
        }
    }

    pub fn check(&mut self, program: &Program) {
        self.check_stmts(&program.body);
    }

    fn check_stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            if self.errors.is_full() {
                return;
            }
            self.check_stmt(stmt);
        }
    }

    fn check_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Return(_) if !self.in_function => {
                self.error(
                    ErrorCode::MISPLACED_CONTROL_FLOW,
                    "'return' outside function",
                    stmt.span,
                );
            }
            StmtKind::Break | StmtKind::Continue if self.loop_depth == 0 => {
                let keyword = stmt.kind.describe();
                self.error(
                    ErrorCode::MISPLACED_CONTROL_FLOW,
                    format!("'{keyword}' outside loop"),
                    stmt.span,
                );
            }
            StmtKind::If(if_stmt) => {
                for branch in &if_stmt.branches {
                    self.check_stmts(&branch.body.stmts);
                }
                if let Some(block) = &if_stmt.else_block {
                    self.check_stmts(&block.stmts);
                }
            }
            StmtKind::While { body, .. } | StmtKind::For { body, .. } => {
                self.loop_depth += 1;
                self.check_stmts(&body.stmts);
                self.loop_depth -= 1;
            }
            StmtKind::FunctionDef(def) => self.check_function(def),
            StmtKind::Try(try_stmt) => {
                self.check_stmts(&try_stmt.body.stmts);
                for handler in &try_stmt.handlers {
                    self.check_stmts(&handler.body.stmts);
                }
                if let Some(block) = &try_stmt.finally {
                    self.check_stmts(&block.stmts);
                }
            }
            _ => {}
        }
    }

    /// A function body starts a fresh context: loops around the `def` do
    /// not make `break` legal inside it.
    fn check_function(&mut self, def: &FunctionDef) {
        let saved = (self.in_function, self.loop_depth);
        self.in_function = true;
        self.loop_depth = 0;
        self.check_stmts(&def.body.stmts);
        (self.in_function, self.loop_depth) = saved;
    }

    fn error(&mut self, code: ErrorCode, message: impl Into<String>, span: Span) {
        let source_line = self.source.line(span.start_line).unwrap_or("");
        self.errors
            .push_error(CodeError::new(&self.source.name, code, message, span, source_line));
    }
}
