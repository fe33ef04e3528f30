//! Token types for the snippet lexer.
//!
//! Defines [`TokenKind`] covering every lexeme of the snippet language and
//! [`Token`], which pairs a kind with a source [`Span`].

use scriptbox_types::Span;
use std::fmt;

/// Keywords that produce a dedicated token instead of [`TokenKind::Name`].
pub const ALL_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "break", "continue", "def", "elif", "else",
    "except", "finally", "for", "from", "if", "import", "in", "is", "lambda", "not", "or", "pass",
    "raise", "return", "try", "while",
];

/// Words reserved by the language family but not supported in snippets.
///
/// They lex as [`TokenKind::Reserved`] so the parser can name them in its
/// diagnostic instead of reporting a confusing unexpected identifier.
pub const RESERVED_WORDS: &[&str] = &[
    "class", "global", "nonlocal", "with", "yield", "async", "await", "del",
];

// ─────────────────────────────────────────────────────────────────────
// Token
// ─────────────────────────────────────────────────────────────────────

/// A single token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Returns `true` if this token is a keyword.
    pub fn is_keyword(&self) -> bool {
        self.kind.is_keyword()
    }
}

/// One piece of an f-string body.
#[derive(Debug, Clone, PartialEq)]
pub enum FStringPiece {
    /// Literal text with escapes and doubled braces already resolved.
    Text(String),
    /// A `{...}` replacement field, kept as source so the parser can parse
    /// it. `line`/`col` locate the first character of `source`.
    Field {
        source: String,
        spec: Option<String>,
        line: u32,
        col: u32,
    },
}

// ─────────────────────────────────────────────────────────────────────
// TokenKind
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // ── Literals ──────────────────────────────────────────────
    Int(i64),
    Float(f64),
    Str(String),
    FString(Vec<FStringPiece>),
    Name(String),
    /// A reserved but unsupported word such as `class`.
    Reserved(String),

    // ── Keywords ─────────────────────────────────────────────
    False,
    None,
    True,
    And,
    As,
    Assert,
    Break,
    Continue,
    Def,
    Elif,
    Else,
    Except,
    Finally,
    For,
    From,
    If,
    Import,
    In,
    Is,
    Lambda,
    Not,
    Or,
    Pass,
    Raise,
    Return,
    Try,
    While,

    // ── Operators ────────────────────────────────────────────
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    EqEq,
    NotEq,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    Eq,
    PlusEq,
    MinusEq,
    StarEq,
    DoubleStarEq,
    SlashEq,
    DoubleSlashEq,
    PercentEq,
    Arrow,

    // ── Punctuation ──────────────────────────────────────────
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,

    // ── Layout ───────────────────────────────────────────────
    Newline,
    Indent,
    Dedent,
    Eof,
}

impl TokenKind {
    /// Map a keyword string to its token kind.
    pub fn from_keyword(s: &str) -> Option<TokenKind> {
        Some(match s {
            "False" => TokenKind::False,
            "None" => TokenKind::None,
            "True" => TokenKind::True,
            "and" => TokenKind::And,
            "as" => TokenKind::As,
            "assert" => TokenKind::Assert,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "def" => TokenKind::Def,
            "elif" => TokenKind::Elif,
            "else" => TokenKind::Else,
            "except" => TokenKind::Except,
            "finally" => TokenKind::Finally,
            "for" => TokenKind::For,
            "from" => TokenKind::From,
            "if" => TokenKind::If,
            "import" => TokenKind::Import,
            "in" => TokenKind::In,
            "is" => TokenKind::Is,
            "lambda" => TokenKind::Lambda,
            "not" => TokenKind::Not,
            "or" => TokenKind::Or,
            "pass" => TokenKind::Pass,
            "raise" => TokenKind::Raise,
            "return" => TokenKind::Return,
            "try" => TokenKind::Try,
            "while" => TokenKind::While,
            _ => return Option::None,
        })
    }

    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::False
                | TokenKind::None
                | TokenKind::True
                | TokenKind::And
                | TokenKind::As
                | TokenKind::Assert
                | TokenKind::Break
                | TokenKind::Continue
                | TokenKind::Def
                | TokenKind::Elif
                | TokenKind::Else
                | TokenKind::Except
                | TokenKind::Finally
                | TokenKind::For
                | TokenKind::From
                | TokenKind::If
                | TokenKind::Import
                | TokenKind::In
                | TokenKind::Is
                | TokenKind::Lambda
                | TokenKind::Not
                | TokenKind::Or
                | TokenKind::Pass
                | TokenKind::Raise
                | TokenKind::Return
                | TokenKind::Try
                | TokenKind::While
        )
    }

    /// Whether the token closes a logical line or block.
    pub fn is_layout(&self) -> bool {
        matches!(
            self,
            TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent | TokenKind::Eof
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Int(n) => return write!(f, "{n}"),
            TokenKind::Float(n) => return write!(f, "{n:?}"),
            TokenKind::Str(s) => return write!(f, "{s:?}"),
            TokenKind::FString(_) => "f-string",
            TokenKind::Name(name) | TokenKind::Reserved(name) => return write!(f, "{name}"),
            TokenKind::False => "False",
            TokenKind::None => "None",
            TokenKind::True => "True",
            TokenKind::And => "and",
            TokenKind::As => "as",
            TokenKind::Assert => "assert",
            TokenKind::Break => "break",
            TokenKind::Continue => "continue",
            TokenKind::Def => "def",
            TokenKind::Elif => "elif",
            TokenKind::Else => "else",
            TokenKind::Except => "except",
            TokenKind::Finally => "finally",
            TokenKind::For => "for",
            TokenKind::From => "from",
            TokenKind::If => "if",
            TokenKind::Import => "import",
            TokenKind::In => "in",
            TokenKind::Is => "is",
            TokenKind::Lambda => "lambda",
            TokenKind::Not => "not",
            TokenKind::Or => "or",
            TokenKind::Pass => "pass",
            TokenKind::Raise => "raise",
            TokenKind::Return => "return",
            TokenKind::Try => "try",
            TokenKind::While => "while",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::DoubleStar => "**",
            TokenKind::Slash => "/",
            TokenKind::DoubleSlash => "//",
            TokenKind::Percent => "%",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Less => "<",
            TokenKind::Greater => ">",
            TokenKind::LessEq => "<=",
            TokenKind::GreaterEq => ">=",
            TokenKind::Eq => "=",
            TokenKind::PlusEq => "+=",
            TokenKind::MinusEq => "-=",
            TokenKind::StarEq => "*=",
            TokenKind::DoubleStarEq => "**=",
            TokenKind::SlashEq => "/=",
            TokenKind::DoubleSlashEq => "//=",
            TokenKind::PercentEq => "%=",
            TokenKind::Arrow => "->",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Dot => ".",
            TokenKind::Newline => "newline",
            TokenKind::Indent => "indent",
            TokenKind::Dedent => "dedent",
            TokenKind::Eof => "end of input",
        };
        write!(f, "{text}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_keyword_maps_to_a_keyword_token() {
        for kw in ALL_KEYWORDS {
            let kind = TokenKind::from_keyword(kw)
                .unwrap_or_else(|| panic!("'{kw}' should be a keyword"));
            assert!(kind.is_keyword(), "'{kw}' should report is_keyword");
            assert_eq!(kind.to_string(), *kw);
        }
    }

    #[test]
    fn test_reserved_words_are_not_keywords() {
        for word in RESERVED_WORDS {
            assert!(TokenKind::from_keyword(word).is_none());
        }
    }

    #[test]
    fn test_keywords_are_case_sensitive() {
        assert!(TokenKind::from_keyword("true").is_none());
        assert!(TokenKind::from_keyword("IF").is_none());
        assert_eq!(TokenKind::from_keyword("True"), Some(TokenKind::True));
    }

    #[test]
    fn test_display_operators() {
        assert_eq!(TokenKind::DoubleSlashEq.to_string(), "//=");
        assert_eq!(TokenKind::NotEq.to_string(), "!=");
        assert_eq!(TokenKind::Eof.to_string(), "end of input");
        assert_eq!(TokenKind::Name("total".into()).to_string(), "total");
    }

    #[test]
    fn test_layout_tokens() {
        assert!(TokenKind::Dedent.is_layout());
        assert!(!TokenKind::Colon.is_layout());
    }
}
