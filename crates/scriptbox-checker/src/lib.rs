//! scriptbox checker: turns raw snippet text into a vetted program.
//!
//! ```text
//! raw text → normalize → Lexer → Parser → StructureChecker → PolicyChecker → ParsedCode
//! ```
//!
//! Syntax problems (E1xx) are reported before policy is looked at, so a
//! snippet is only ever rejected for policy once it is well formed.

mod normalize;
mod policy;
mod structure;

use log::debug;
use scriptbox_lexer::Lexer;
use scriptbox_parser::Parser;
use scriptbox_types::ast::Program;
use scriptbox_types::{CodeError, CodeErrors, ErrorCode, Permission, SourceFile, Span, SNIPPET_NAME};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub use normalize::normalize;
pub use policy::{is_dunder, PolicyChecker, FORBIDDEN_NAMES};
pub use structure::StructureChecker;

/// A snippet that passed every check.
#[derive(Debug, Clone)]
pub struct ParsedCode {
    /// The normalised text the program was parsed from.
    pub source: String,
    pub program: Program,
    /// Lowercase hex SHA-256 of `source`.
    pub fingerprint: String,
}

/// Why a snippet was rejected before running.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum CheckError {
    #[error("syntax error:\n{0}")]
    Syntax(CodeErrors),
    #[error("permission denied:\n{0}")]
    Policy(CodeErrors),
}

impl CheckError {
    /// The diagnostics behind the rejection.
    pub fn errors(&self) -> &CodeErrors {
        match self {
            CheckError::Syntax(errors) | CheckError::Policy(errors) => errors,
        }
    }

    pub fn codes(&self) -> Vec<ErrorCode> {
        self.errors().errors.iter().map(|e| e.code).collect()
    }
}

/// Normalise, parse and vet `source` under `permission`.
pub fn parse(source: &str, permission: Permission) -> Result<ParsedCode, CheckError> {
    parse_named(SNIPPET_NAME, source, permission)
}

/// Like [`parse`], with diagnostics attributed to `name`.
pub fn parse_named(
    name: &str,
    source: &str,
    permission: Permission,
) -> Result<ParsedCode, CheckError> {
    let normalized = normalize(source);
    let fingerprint = fingerprint(&normalized);
    let source_file = SourceFile::new(name, normalized);

    let lexed = Lexer::new(&source_file).lex();
    let parsed = Parser::new(lexed.tokens, &source_file).parse();
    let mut errors = lexed.errors;
    errors.extend(parsed.errors);

    let program = match parsed.program {
        Some(program) if !errors.has_errors() => program,
        _ => return Err(reject_syntax(&fingerprint, errors)),
    };

    if program.body.is_empty() {
        errors.push_error(CodeError::new(
            name,
            ErrorCode::EMPTY_PROGRAM,
            "snippet contains no statements",
            Span::point(1, 1),
            "",
        ));
        return Err(reject_syntax(&fingerprint, errors));
    }

    StructureChecker::new(&mut errors, &source_file).check(&program);
    if errors.has_errors() {
        return Err(reject_syntax(&fingerprint, errors));
    }

    PolicyChecker::new(&mut errors, &source_file, permission).check(&program);
    if errors.has_errors() {
        debug!(
            "snippet {} rejected under {permission}: {} policy error(s)",
            short(&fingerprint),
            errors.total_errors
        );
        return Err(CheckError::Policy(errors));
    }

    Ok(ParsedCode {
        source: source_file.source,
        program,
        fingerprint,
    })
}

/// Hex SHA-256 of normalised snippet text.
pub fn fingerprint(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn reject_syntax(fingerprint: &str, errors: CodeErrors) -> CheckError {
    debug!(
        "snippet {} rejected: {} syntax error(s)",
        short(fingerprint),
        errors.total_errors
    );
    CheckError::Syntax(errors)
}

fn short(fingerprint: &str) -> &str {
    &fingerprint[..fingerprint.len().min(12)]
}
