//! scriptbox evaluation: runs vetted snippets and captures their results.
//!
//! ```text
//! context::current() + extra ─┐
//!                             ├→ Interpreter → locals + __result__
//! scriptbox_checker::parse ───┘
//! ```
//!
//! [`run`] is the entry point. Ambient names come from the calling thread's
//! [`context`] stack with `extra` layered on top; the snippet's own
//! assignments come back as an ordered [`Bindings`] map.

pub mod builtins;
pub mod context;
pub mod engine;
pub mod error;
pub mod format;
pub mod interpreter;
pub mod methods;
pub mod modules;
pub mod ops;
pub mod value;

pub use engine::{run, Engine, EngineConfig, Execution, Mode, RunError};
pub use error::{EvalResult, EvaluationFault, RuntimeError};
pub use interpreter::Interpreter;
pub use value::{Bindings, Dict, Key, Value, RESULT_KEY};
