//! Runtime error types for the interpreter.

use scriptbox_types::SourceFile;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A fault raised while a snippet runs.
///
/// Variants mirror the exception kinds snippets can name in `except`
/// clauses; anything raised under another name is [`RuntimeError::Raised`].
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum RuntimeError {
    #[error("NameError: {0}")]
    Name(String),
    #[error("TypeError: {0}")]
    Type(String),
    #[error("ValueError: {0}")]
    Value(String),
    #[error("ZeroDivisionError: {0}")]
    ZeroDivision(String),
    #[error("IndexError: {0}")]
    Index(String),
    #[error("KeyError: {0}")]
    Key(String),
    #[error("AttributeError: {0}")]
    Attribute(String),
    #[error("OverflowError: {0}")]
    Overflow(String),
    #[error("ImportError: {0}")]
    Import(String),
    #[error("AssertionError: {0}")]
    Assertion(String),
    #[error("RecursionError: {0}")]
    RecursionLimit(String),
    /// `raise Kind(message)` for kinds without a dedicated variant.
    #[error("{kind}: {message}")]
    Raised { kind: String, message: String },
    /// The step budget ran out. Not catchable by `except`.
    #[error("step budget of {0} exhausted")]
    GasExhausted(u64),
}

/// Exception kinds snippets may name, with their parent class.
pub const EXCEPTION_KINDS: &[(&str, Option<&str>)] = &[
    ("BaseException", None),
    ("Exception", Some("BaseException")),
    ("ArithmeticError", Some("Exception")),
    ("LookupError", Some("Exception")),
    ("NameError", Some("Exception")),
    ("TypeError", Some("Exception")),
    ("ValueError", Some("Exception")),
    ("ZeroDivisionError", Some("ArithmeticError")),
    ("OverflowError", Some("ArithmeticError")),
    ("IndexError", Some("LookupError")),
    ("KeyError", Some("LookupError")),
    ("AttributeError", Some("Exception")),
    ("ImportError", Some("Exception")),
    ("AssertionError", Some("Exception")),
    ("RuntimeError", Some("Exception")),
    ("RecursionError", Some("RuntimeError")),
    ("NotImplementedError", Some("RuntimeError")),
    ("StopIteration", Some("Exception")),
];

/// Whether `kind` is `class` or one of its subclasses.
pub fn is_subclass(kind: &str, class: &str) -> bool {
    let mut current = Some(kind);
    while let Some(name) = current {
        if name == class {
            return true;
        }
        current = EXCEPTION_KINDS
            .iter()
            .find(|(k, _)| *k == name)
            .and_then(|(_, parent)| *parent);
    }
    false
}

impl RuntimeError {
    /// Build the error for `raise Kind(message)`.
    pub fn from_exception(kind: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            "NameError" => Self::Name(message),
            "TypeError" => Self::Type(message),
            "ValueError" => Self::Value(message),
            "ZeroDivisionError" => Self::ZeroDivision(message),
            "IndexError" => Self::Index(message),
            "KeyError" => Self::Key(message),
            "AttributeError" => Self::Attribute(message),
            "OverflowError" => Self::Overflow(message),
            "ImportError" => Self::Import(message),
            "AssertionError" => Self::Assertion(message),
            "RecursionError" => Self::RecursionLimit(message),
            _ => Self::Raised {
                kind: kind.to_string(),
                message,
            },
        }
    }

    /// The script-facing exception kind.
    pub fn kind(&self) -> &str {
        match self {
            Self::Name(_) => "NameError",
            Self::Type(_) => "TypeError",
            Self::Value(_) => "ValueError",
            Self::ZeroDivision(_) => "ZeroDivisionError",
            Self::Index(_) => "IndexError",
            Self::Key(_) => "KeyError",
            Self::Attribute(_) => "AttributeError",
            Self::Overflow(_) => "OverflowError",
            Self::Import(_) => "ImportError",
            Self::Assertion(_) => "AssertionError",
            Self::RecursionLimit(_) => "RecursionError",
            Self::Raised { kind, .. } => kind,
            Self::GasExhausted(_) => "GasExhausted",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Name(m)
            | Self::Type(m)
            | Self::Value(m)
            | Self::ZeroDivision(m)
            | Self::Index(m)
            | Self::Key(m)
            | Self::Attribute(m)
            | Self::Overflow(m)
            | Self::Import(m)
            | Self::Assertion(m)
            | Self::RecursionLimit(m) => m.clone(),
            Self::Raised { message, .. } => message.clone(),
            Self::GasExhausted(limit) => format!("step budget of {limit} exhausted"),
        }
    }

    /// Whether snippet code may catch this error at all.
    pub fn is_catchable(&self) -> bool {
        !matches!(self, Self::GasExhausted(_))
    }

    /// Whether `except class:` catches this error.
    pub fn matches(&self, class: &str) -> bool {
        if !self.is_catchable() {
            return false;
        }
        matches!(class, "Exception" | "BaseException") || is_subclass(self.kind(), class)
    }
}

/// Result alias for interpreter operations.
pub type EvalResult<T> = Result<T, RuntimeError>;

/// A runtime fault paired with the normalised snippet it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationFault {
    /// Normalised snippet text.
    pub source: String,
    pub cause: RuntimeError,
    /// 1-based line of the statement that raised, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl EvaluationFault {
    pub fn new(source: impl Into<String>, cause: RuntimeError, line: Option<u32>) -> Self {
        Self {
            source: source.into(),
            cause,
            line,
        }
    }
}

impl fmt::Display for EvaluationFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => writeln!(f, "line {line}: {}", self.cause)?,
            None => writeln!(f, "{}", self.cause)?,
        }
        writeln!(f)?;
        write!(f, "{}", SourceFile::new("", self.source.as_str()).numbered())
    }
}

impl std::error::Error for EvaluationFault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subclass_chain() {
        assert!(is_subclass("ZeroDivisionError", "ArithmeticError"));
        assert!(is_subclass("ZeroDivisionError", "Exception"));
        assert!(is_subclass("KeyError", "LookupError"));
        assert!(!is_subclass("KeyError", "ArithmeticError"));
        assert!(is_subclass("MyError", "MyError"));
        assert!(!is_subclass("MyError", "Exception"));
    }

    #[test]
    fn test_exception_matches_everything_but_gas() {
        assert!(RuntimeError::Value("x".into()).matches("Exception"));
        assert!(RuntimeError::RecursionLimit("x".into()).matches("RuntimeError"));
        assert!(!RuntimeError::GasExhausted(10).matches("Exception"));
        assert!(!RuntimeError::GasExhausted(10).matches("BaseException"));
    }

    #[test]
    fn test_from_exception_maps_known_kinds() {
        assert_eq!(
            RuntimeError::from_exception("KeyError", "'a'"),
            RuntimeError::Key("'a'".into())
        );
        let custom = RuntimeError::from_exception("ParseFailure", "bad");
        assert_eq!(custom.kind(), "ParseFailure");
        assert_eq!(custom.to_string(), "ParseFailure: bad");
    }

    #[test]
    fn test_fault_display_shows_numbered_source() {
        let fault = EvaluationFault::new(
            "a = 1\nb = a / 0",
            RuntimeError::ZeroDivision("division by zero".into()),
            Some(2),
        );
        let text = fault.to_string();
        assert!(text.starts_with("line 2: ZeroDivisionError: division by zero"));
        assert!(text.contains("1 | a = 1"));
        assert!(text.contains("2 | b = a / 0"));
    }
}
