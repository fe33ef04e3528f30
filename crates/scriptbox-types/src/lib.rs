//! Shared types for the scriptbox pipeline.
//!
//! This crate defines the AST node types, source spans, structured
//! diagnostics and the [`Permission`] token used by every stage.

mod error;
mod span;
pub mod ast;
pub mod permission;

pub use error::{CodeError, CodeErrors, ErrorCategory, ErrorCode, MAX_ERRORS};
pub use permission::Permission;
pub use span::{SourceFile, Span};

/// Name given to snippets that have no file of their own.
pub const SNIPPET_NAME: &str = "<snippet>";
