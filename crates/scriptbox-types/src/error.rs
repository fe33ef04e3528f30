use crate::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of diagnostics kept before the rest are only counted.
pub const MAX_ERRORS: usize = 20;

/// Diagnostic category, determined by error code range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// The text is not a well-formed program.
    Syntax,
    /// The program is well formed but uses something the permission forbids.
    Policy,
}

/// Numeric diagnostic code (E100–E499).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    // ── Syntax errors (E100–E199) ──
    pub const UNEXPECTED_TOKEN: Self = Self(100);
    pub const UNTERMINATED_STRING: Self = Self(101);
    pub const INCONSISTENT_INDENTATION: Self = Self(102);
    pub const INVALID_LITERAL: Self = Self(103);
    pub const UNSUPPORTED_SYNTAX: Self = Self(104);
    pub const MISPLACED_CONTROL_FLOW: Self = Self(105);
    pub const INVALID_ASSIGNMENT_TARGET: Self = Self(106);
    pub const STRUCTURAL_LIMIT_EXCEEDED: Self = Self(107);
    pub const EMPTY_PROGRAM: Self = Self(108);

    // ── Policy errors (E400–E499) ──
    pub const CONSTRUCT_NOT_PERMITTED: Self = Self(400);
    pub const FORBIDDEN_NAME: Self = Self(401);
    pub const FORBIDDEN_ATTRIBUTE: Self = Self(402);

    /// Get the category for this error code.
    pub fn category(self) -> ErrorCategory {
        match self.0 {
            400..=499 => ErrorCategory::Policy,
            _ => ErrorCategory::Syntax,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax => write!(f, "syntax"),
            Self::Policy => write!(f, "policy"),
        }
    }
}

/// A structured diagnostic about a snippet, raised before it runs.
///
/// Structured rather than free-form so a host can feed the exact location
/// and suggestion back to whatever generated the code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeError {
    /// Source name (`<snippet>` unless the host chose one).
    pub file: String,
    pub code: ErrorCode,
    /// Derived from `code`.
    pub category: ErrorCategory,
    pub message: String,
    #[serde(flatten)]
    pub span: Span,
    /// The offending source line, verbatim.
    pub source_line: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub suggestion: Option<String>,
}

impl CodeError {
    /// Create a new diagnostic.
    pub fn new(
        file: impl Into<String>,
        code: ErrorCode,
        message: impl Into<String>,
        span: Span,
        source_line: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            code,
            category: code.category(),
            message: message.into(),
            span,
            source_line: source_line.into(),
            suggestion: None,
        }
    }

    /// Attach a fix suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl fmt::Display for CodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} [{}] {}",
            self.span, self.code, self.category, self.message
        )
    }
}

impl std::error::Error for CodeError {}

/// Diagnostics collected by one pipeline stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeErrors {
    pub errors: Vec<CodeError>,
    pub total_errors: usize,
}

impl CodeErrors {
    /// Create an empty collection.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_errors(&self) -> bool {
        self.total_errors > 0
    }

    /// Add an error, keeping at most [`MAX_ERRORS`] of them.
    pub fn push_error(&mut self, error: CodeError) {
        if self.errors.len() < MAX_ERRORS {
            self.errors.push(error);
        }
        self.total_errors += 1;
    }

    /// Move every error of `other` into `self`.
    pub fn extend(&mut self, other: CodeErrors) {
        let dropped = other.total_errors - other.errors.len();
        for error in other.errors {
            self.push_error(error);
        }
        self.total_errors += dropped;
    }

    /// True once the cap is reached and further work would only be counted.
    pub fn is_full(&self) -> bool {
        self.total_errors >= MAX_ERRORS
    }

    /// Whether any error carries `code`.
    pub fn contains(&self, code: ErrorCode) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }
}

impl fmt::Display for CodeErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{error}")?;
            if !error.source_line.is_empty() {
                write!(f, "\n    {}", error.source_line.trim_end())?;
            }
        }
        let hidden = self.total_errors - self.errors.len();
        if hidden > 0 {
            write!(f, "\n... and {hidden} more")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(code: ErrorCode, message: &str) -> CodeError {
        CodeError::new("<snippet>", code, message, Span::new(2, 1, 2, 7), "import os")
    }

    #[test]
    fn test_error_code_category() {
        assert_eq!(ErrorCode::UNEXPECTED_TOKEN.category(), ErrorCategory::Syntax);
        assert_eq!(ErrorCode::EMPTY_PROGRAM.category(), ErrorCategory::Syntax);
        assert_eq!(ErrorCode::CONSTRUCT_NOT_PERMITTED.category(), ErrorCategory::Policy);
        assert_eq!(ErrorCode::FORBIDDEN_ATTRIBUTE.category(), ErrorCategory::Policy);
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::UNTERMINATED_STRING.to_string(), "E101");
        assert_eq!(ErrorCode::FORBIDDEN_NAME.to_string(), "E401");
    }

    #[test]
    fn test_code_error_display() {
        let err = sample(ErrorCode::CONSTRUCT_NOT_PERMITTED, "import is not permitted");
        assert_eq!(err.to_string(), "2:1: E400 [policy] import is not permitted");
    }

    #[test]
    fn test_code_error_json_field_names() {
        let err = sample(ErrorCode::CONSTRUCT_NOT_PERMITTED, "import is not permitted")
            .with_suggestion("compute the value without importing modules");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"line\":2"));
        assert!(json.contains("\"column\":1"));
        assert!(json.contains("\"end_column\":7"));
        assert!(json.contains("\"category\":\"policy\""));
        assert!(json.contains("\"suggestion\""));

        let back: CodeError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn test_suggestion_omitted_when_absent() {
        let json = serde_json::to_string(&sample(ErrorCode::FORBIDDEN_NAME, "x")).unwrap();
        assert!(!json.contains("suggestion"));
    }

    #[test]
    fn test_code_errors_cap() {
        let mut errs = CodeErrors::empty();
        for i in 0..25 {
            errs.push_error(sample(ErrorCode::UNEXPECTED_TOKEN, &format!("error {i}")));
        }
        assert_eq!(errs.errors.len(), MAX_ERRORS);
        assert_eq!(errs.total_errors, 25);
        assert!(errs.is_full());
        assert!(errs.to_string().ends_with("... and 5 more"));
    }

    #[test]
    fn test_code_errors_extend_keeps_hidden_count() {
        let mut a = CodeErrors::empty();
        a.push_error(sample(ErrorCode::UNEXPECTED_TOKEN, "a"));
        let mut b = CodeErrors::empty();
        for _ in 0..22 {
            b.push_error(sample(ErrorCode::FORBIDDEN_NAME, "b"));
        }
        a.extend(b);
        assert_eq!(a.total_errors, 23);
        assert_eq!(a.errors.len(), MAX_ERRORS);
        assert!(a.contains(ErrorCode::FORBIDDEN_NAME));
    }
}
