//! Permission policy: walks a parsed AST and rejects constructs the caller
//! did not grant.
//!
//! Error codes emitted:
//! - E400: construct family not covered by the permission
//! - E401: reference to a name that is never available to snippets
//! - E402: dunder attribute access

use scriptbox_types::ast::*;
use scriptbox_types::{CodeError, CodeErrors, ErrorCode, Permission, SourceFile, Span};

/// Names that reach outside the interpreter or around the policy itself.
/// Rejected regardless of permission.
pub const FORBIDDEN_NAMES: &[&str] = &[
    "exec",
    "eval",
    "compile",
    "open",
    "__import__",
    "globals",
    "locals",
    "vars",
    "getattr",
    "setattr",
    "delattr",
    "input",
    "breakpoint",
    "exit",
    "quit",
];

/// Whether `attr` is a `__dunder__` name.
pub fn is_dunder(attr: &str) -> bool {
    attr.len() > 4 && attr.starts_with("__") && attr.ends_with("__")
}

fn permission_name(flag: Permission) -> String {
    format!("Permission::{flag}")
}

// ══════════════════════════════════════════════════════════════════════════════
// PolicyChecker
// ══════════════════════════════════════════════════════════════════════════════

/// Validates a [`Program`] against a [`Permission`].
pub struct PolicyChecker<'a> {
    errors: &'a mut CodeErrors,
    source: &'a SourceFile,
    permission: Permission,
}

impl<'a> PolicyChecker<'a> {
    pub fn new(errors: &'a mut CodeErrors, source: &'a SourceFile, permission: Permission) -> Self {
        Self {
            errors,
            source,
            permission,
        }
    }

    pub fn check(&mut self, program: &Program) {
        if !self.permission.contains(Permission::BASIC) {
            let span = program.body.first().map_or(program.span, |s| s.span);
            self.error_with_suggestion(
                ErrorCode::CONSTRUCT_NOT_PERMITTED,
                "running any code requires the BASIC permission".to_string(),
                span,
                format!("grant {}", permission_name(Permission::BASIC)),
            );
        }
        self.check_stmts(&program.body);
    }

    // ══════════════════════════════════════════════════════════════════════
    // Statements
    // ══════════════════════════════════════════════════════════════════════

    fn check_block(&mut self, block: &Block) {
        self.check_stmts(&block.stmts);
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
            StmtKind::Expr(expr) => self.check_expr(expr),
            StmtKind::Assign { targets, value } => {
                for target in targets {
                    self.check_target(target);
                }
                self.check_expr(value);
            }
            StmtKind::AugAssign { target, value, .. } => {
                self.check_target(target);
                self.check_expr(value);
            }
            StmtKind::If(if_stmt) => {
                self.require(Permission::CONDITION, "'if' statement", stmt.span);
                for branch in &if_stmt.branches {
                    self.check_expr(&branch.condition);
                    self.check_block(&branch.body);
                }
                if let Some(block) = &if_stmt.else_block {
                    self.check_block(block);
                }
            }
            StmtKind::While { condition, body } => {
                self.require(Permission::LOOP, "'while' loop", stmt.span);
                self.check_expr(condition);
                self.check_block(body);
            }
            StmtKind::For {
                target,
                iterable,
                body,
            } => {
                self.require(Permission::LOOP, "'for' loop", stmt.span);
                self.check_target(target);
                self.check_expr(iterable);
                self.check_block(body);
            }
            StmtKind::FunctionDef(def) => {
                self.require(
                    Permission::FUNCTION_DEFINITION,
                    "function definition",
                    stmt.span,
                );
                self.check_binding_name(&def.name);
                self.check_function(def);
            }
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.check_expr(value);
                }
            }
            StmtKind::Break | StmtKind::Continue | StmtKind::Pass => {}
            StmtKind::Import(names) => {
                self.require(Permission::IMPORT, "'import'", stmt.span);
                for name in names {
                    self.check_import_name(name);
                }
            }
            StmtKind::ImportFrom { names, .. } => {
                self.require(Permission::IMPORT, "'from ... import'", stmt.span);
                for name in names {
                    self.check_import_name(name);
                }
            }
            StmtKind::Raise(value) => {
                self.require(Permission::EXCEPTION, "'raise'", stmt.span);
                if let Some(value) = value {
                    self.check_expr(value);
                }
            }
            StmtKind::Try(try_stmt) => {
                self.require(Permission::EXCEPTION, "'try' statement", stmt.span);
                self.check_block(&try_stmt.body);
                for handler in &try_stmt.handlers {
                    if let Some(binding) = &handler.binding {
                        self.check_binding_name(binding);
                    }
                    self.check_block(&handler.body);
                }
                if let Some(block) = &try_stmt.finally {
                    self.check_block(block);
                }
            }
            StmtKind::Assert { condition, message } => {
                self.require(Permission::EXCEPTION, "'assert'", stmt.span);
                self.check_expr(condition);
                if let Some(message) = message {
                    self.check_expr(message);
                }
            }
        }
    }

    fn check_function(&mut self, def: &FunctionDef) {
        for param in &def.params {
            self.check_binding_name(&param.name);
            if let Some(default) = &param.default {
                self.check_expr(default);
            }
        }
        self.check_block(&def.body);
    }

    fn check_import_name(&mut self, import: &ImportName) {
        self.check_name(&import.name.name, import.name.span);
        if let Some(alias) = &import.alias {
            self.check_binding_name(alias);
        }
    }

    fn check_target(&mut self, target: &Target) {
        match target {
            Target::Name(ident) => self.check_binding_name(ident),
            Target::Subscript { object, index, .. } => {
                self.check_expr(object);
                self.check_expr(index);
            }
            Target::Tuple(items, _) => {
                for item in items {
                    self.check_target(item);
                }
            }
        }
    }

    fn check_binding_name(&mut self, ident: &Ident) {
        self.check_name(&ident.name, ident.span);
    }

    // ══════════════════════════════════════════════════════════════════════
    // Expressions
    // ══════════════════════════════════════════════════════════════════════

    fn check_expr(&mut self, expr: &Expr) {
        if self.errors.is_full() {
            return;
        }
        match &expr.kind {
            ExprKind::Int(_)
            | ExprKind::Float(_)
            | ExprKind::Str(_)
            | ExprKind::Bool(_)
            | ExprKind::NoneLit => {}
            ExprKind::FString(parts) => {
                for part in parts {
                    if let FStringPart::Field { expr, .. } = part {
                        self.check_expr(expr);
                    }
                }
            }
            ExprKind::List(items) | ExprKind::Tuple(items) => {
                for item in items {
                    self.check_expr(item);
                }
            }
            ExprKind::Dict(entries) => {
                for (key, value) in entries {
                    self.check_expr(key);
                    self.check_expr(value);
                }
            }
            ExprKind::ListComp {
                element,
                generators,
            } => {
                self.require(Permission::LOOP, "comprehension", expr.span);
                self.check_comprehensions(generators);
                self.check_expr(element);
            }
            ExprKind::DictComp {
                key,
                value,
                generators,
            } => {
                self.require(Permission::LOOP, "comprehension", expr.span);
                self.check_comprehensions(generators);
                self.check_expr(key);
                self.check_expr(value);
            }
            ExprKind::Name(name) => self.check_name(name, expr.span),
            ExprKind::Attribute { object, attr } => {
                self.check_expr(object);
                if is_dunder(&attr.name) {
                    self.error_with_suggestion(
                        ErrorCode::FORBIDDEN_ATTRIBUTE,
                        format!("access to attribute '{}' is not allowed", attr.name),
                        attr.span,
                        "dunder attributes expose interpreter internals; use the public API"
                            .to_string(),
                    );
                }
            }
            ExprKind::Subscript { object, index } => {
                self.check_expr(object);
                self.check_expr(index);
            }
            ExprKind::Slice { lower, upper, step } => {
                for part in [lower, upper, step].into_iter().flatten() {
                    self.check_expr(part);
                }
            }
            ExprKind::Call { func, args, kwargs } => {
                self.check_expr(func);
                for arg in args {
                    self.check_expr(arg);
                }
                for kwarg in kwargs {
                    self.check_expr(&kwarg.value);
                }
            }
            ExprKind::Binary { left, right, .. } | ExprKind::BoolOp { left, right, .. } => {
                self.check_expr(left);
                self.check_expr(right);
            }
            ExprKind::Unary { operand, .. } => self.check_expr(operand),
            ExprKind::Compare { left, rest } => {
                self.check_expr(left);
                for (_, right) in rest {
                    self.check_expr(right);
                }
            }
            ExprKind::IfExp {
                condition,
                then,
                otherwise,
            } => {
                self.require(Permission::CONDITION, "conditional expression", expr.span);
                self.check_expr(condition);
                self.check_expr(then);
                self.check_expr(otherwise);
            }
            ExprKind::Lambda(def) => {
                self.require(Permission::FUNCTION_DEFINITION, "'lambda'", expr.span);
                self.check_function(def);
            }
        }
    }

    fn check_comprehensions(&mut self, generators: &[Comprehension]) {
        for generator in generators {
            self.check_target(&generator.target);
            self.check_expr(&generator.iterable);
            for condition in &generator.conditions {
                self.check_expr(condition);
            }
        }
    }

    fn check_name(&mut self, name: &str, span: Span) {
        if FORBIDDEN_NAMES.contains(&name) {
            self.error_with_suggestion(
                ErrorCode::FORBIDDEN_NAME,
                format!("use of '{name}' is not allowed"),
                span,
                "snippets cannot evaluate code, touch files or read input".to_string(),
            );
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Error Reporting
    // ══════════════════════════════════════════════════════════════════════

    fn require(&mut self, flag: Permission, construct: &str, span: Span) {
        if self.permission.contains(flag) {
            return;
        }
        self.error_with_suggestion(
            ErrorCode::CONSTRUCT_NOT_PERMITTED,
            format!("{construct} is not permitted (requires {flag})"),
            span,
            format!(
                "grant {} or rewrite the snippet without it",
                permission_name(flag)
            ),
        );
    }

    fn error_with_suggestion(
        &mut self,
        code: ErrorCode,
        message: String,
        span: Span,
        suggestion: String,
    ) {
        let source_line = self.source.line(span.start_line).unwrap_or("");
        let error = CodeError::new(&self.source.name, code, message, span, source_line)
            .with_suggestion(suggestion);
        self.errors.push_error(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_dunder() {
        assert!(is_dunder("__class__"));
        assert!(is_dunder("__dict__"));
        assert!(!is_dunder("__"));
        assert!(!is_dunder("____"));
        assert!(!is_dunder("_private"));
        assert!(!is_dunder("__mangled"));
    }

    #[test]
    fn test_forbidden_names_cover_code_evaluation() {
        for name in ["exec", "eval", "compile", "__import__"] {
            assert!(FORBIDDEN_NAMES.contains(&name));
        }
        assert!(!FORBIDDEN_NAMES.contains(&"print"));
    }
}
