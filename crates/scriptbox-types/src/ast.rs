//! AST node types for snippet programs.
//!
//! Every node carries a [`Span`] for diagnostics. Function bodies are held
//! behind [`Arc`] so a defined function can be turned into a runtime value
//! without copying its body.

use crate::Span;
use std::sync::Arc;

// ══════════════════════════════════════════════════════════════════════════════
// Top Level
// ══════════════════════════════════════════════════════════════════════════════

/// A complete snippet: a sequence of top-level statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// A spanned identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

/// An indented suite of statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

// ══════════════════════════════════════════════════════════════════════════════
// Statements
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// A bare expression evaluated for its value or effect.
    Expr(Expr),
    /// `a = b = value`; targets are listed left to right.
    Assign { targets: Vec<Target>, value: Expr },
    /// `a += value`
    AugAssign {
        target: Target,
        op: BinOp,
        value: Expr,
    },
    If(IfStmt),
    While { condition: Expr, body: Block },
    For {
        target: Target,
        iterable: Expr,
        body: Block,
    },
    FunctionDef(Arc<FunctionDef>),
    Return(Option<Expr>),
    Break,
    Continue,
    Pass,
    /// `import a, b as c`
    Import(Vec<ImportName>),
    /// `from module import a, b as c`
    ImportFrom {
        module: Ident,
        names: Vec<ImportName>,
    },
    /// `raise` or `raise expr`
    Raise(Option<Expr>),
    Try(TryStmt),
    Assert {
        condition: Expr,
        message: Option<Expr>,
    },
}

impl StmtKind {
    /// Short name of the statement form, for diagnostics and logs.
    pub fn describe(&self) -> &'static str {
        match self {
            StmtKind::Expr(_) => "expression",
            StmtKind::Assign { .. } => "assignment",
            StmtKind::AugAssign { .. } => "augmented assignment",
            StmtKind::If(_) => "if statement",
            StmtKind::While { .. } => "while loop",
            StmtKind::For { .. } => "for loop",
            StmtKind::FunctionDef(_) => "function definition",
            StmtKind::Return(_) => "return",
            StmtKind::Break => "break",
            StmtKind::Continue => "continue",
            StmtKind::Pass => "pass",
            StmtKind::Import(_) | StmtKind::ImportFrom { .. } => "import",
            StmtKind::Raise(_) => "raise",
            StmtKind::Try(_) => "try statement",
            StmtKind::Assert { .. } => "assert",
        }
    }
}

/// `if c: ... elif c: ... else: ...`
#[derive(Debug, Clone, PartialEq)]
pub struct IfStmt {
    /// The `if` branch followed by every `elif`, in order.
    pub branches: Vec<IfBranch>,
    pub else_block: Option<Block>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfBranch {
    pub condition: Expr,
    pub body: Block,
}

/// `try: ... except K as e: ... finally: ...`
#[derive(Debug, Clone, PartialEq)]
pub struct TryStmt {
    pub body: Block,
    pub handlers: Vec<ExceptHandler>,
    pub finally: Option<Block>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExceptHandler {
    /// Exception kind to match; `None` for a bare `except:`.
    pub kind: Option<Ident>,
    pub binding: Option<Ident>,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportName {
    pub name: Ident,
    pub alias: Option<Ident>,
}

impl ImportName {
    /// The name the import binds in the program.
    pub fn bound_name(&self) -> &str {
        &self.alias.as_ref().unwrap_or(&self.name).name
    }
}

/// `def name(params): body`, or a lambda (named `<lambda>`).
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: Ident,
    pub params: Vec<Param>,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub default: Option<Expr>,
}

/// Something that can be assigned to.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(Ident),
    /// `object[index]`
    Subscript {
        object: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    /// `a, b` or `[a, b]`
    Tuple(Vec<Target>, Span),
}

impl Target {
    pub fn span(&self) -> Span {
        match self {
            Target::Name(ident) => ident.span,
            Target::Subscript { span, .. } | Target::Tuple(_, span) => *span,
        }
    }

    /// Every plain name bound by this target, left to right.
    pub fn names(&self) -> Vec<&str> {
        match self {
            Target::Name(ident) => vec![ident.name.as_str()],
            Target::Subscript { .. } => Vec::new(),
            Target::Tuple(items, _) => items.iter().flat_map(Target::names).collect(),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Expressions
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    // ── Literals ──
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    NoneLit,
    /// `f"total: {x:.2f}"`
    FString(Vec<FStringPart>),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    /// `[element for ... in ... if ...]`, also used for generator arguments.
    ListComp {
        element: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    /// `{key: value for ... in ...}`
    DictComp {
        key: Box<Expr>,
        value: Box<Expr>,
        generators: Vec<Comprehension>,
    },

    // ── Names & access ──
    Name(String),
    Attribute {
        object: Box<Expr>,
        attr: Ident,
    },
    Subscript {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    /// `lower:upper:step`, only valid as a subscript index.
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<Keyword>,
    },

    // ── Operators ──
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// `a and b`, `a or b`: yields one of the operands.
    BoolOp {
        op: BoolOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `a < b <= c`: each comparison uses the previous right operand.
    Compare {
        left: Box<Expr>,
        rest: Vec<(CmpOp, Expr)>,
    },
    /// `then if condition else otherwise`
    IfExp {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Lambda(Arc<FunctionDef>),
}

/// One `for target in iterable if cond...` clause of a comprehension.
#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
    pub target: Target,
    pub iterable: Expr,
    pub conditions: Vec<Expr>,
}

/// `name=value` in a call.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    pub name: Ident,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
    Literal(String),
    /// `{expr}` or `{expr:spec}`
    Field { expr: Expr, spec: Option<String> },
}

// ── Operators ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl BinOp {
    /// Returns the operator symbol for error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `+x`
    Pos,
    /// `not x`
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    Gt,
    LtE,
    GtE,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CmpOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::NotEq => "!=",
            CmpOp::Lt => "<",
            CmpOp::Gt => ">",
            CmpOp::LtE => "<=",
            CmpOp::GtE => ">=",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
            CmpOp::Is => "is",
            CmpOp::IsNot => "is not",
        }
    }
}
