//! Evaluation engine: runs a snippet and captures the value it computes.
//!
//! The last top-level statement decides how the result is taken:
//!
//! | last statement        | `__result__`                                   |
//! |-----------------------|------------------------------------------------|
//! | expression            | its value                                      |
//! | `a = b = expr`        | the assigned value (each target holds it too)  |
//! | `a += expr`           | the target's value afterwards                  |
//! | anything else         | the most recently introduced local, or `None`  |

use crate::context;
use crate::error::{EvaluationFault, RuntimeError};
use crate::interpreter::Interpreter;
use crate::value::{Bindings, Value, RESULT_KEY};
use log::debug;
use scriptbox_checker::{CheckError, ParsedCode};
use scriptbox_types::ast::{Stmt, StmtKind};
use scriptbox_types::{permission, Permission};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic;
use std::thread;
use thiserror::Error;

/// Default limit on nested snippet function calls.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 200;
/// Default stack reserved for the evaluation thread.
pub const DEFAULT_STACK_SIZE: usize = 256 << 20;

/// Interpreter limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum statements plus expressions evaluated; `None` is unbounded.
    pub gas_limit: Option<u64>,
    pub max_call_depth: usize,
    /// Stack size in bytes of the thread each evaluation runs on. Must cover
    /// `max_call_depth` nested calls.
    pub stack_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gas_limit: None,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

/// Why [`run`] produced no bindings.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum RunError {
    /// The checker refused the snippet; nothing ran.
    #[error(transparent)]
    Rejected(#[from] CheckError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationFault),
}

impl RunError {
    /// The runtime fault, if the snippet got as far as running.
    pub fn cause(&self) -> Option<&RuntimeError> {
        match self {
            RunError::Rejected(_) => None,
            RunError::Evaluation(fault) => Some(&fault.cause),
        }
    }
}

/// How the result of a snippet is captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Expression,
    Assignment,
    AugmentedAssignment,
    Effect,
}

impl Mode {
    fn of(last: &Stmt) -> Self {
        match last.kind {
            StmtKind::Expr(_) => Mode::Expression,
            StmtKind::Assign { .. } => Mode::Assignment,
            StmtKind::AugAssign { .. } => Mode::AugmentedAssignment,
            _ => Mode::Effect,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Expression => "trailing expression",
            Mode::Assignment => "trailing assignment",
            Mode::AugmentedAssignment => "trailing augmented assignment",
            Mode::Effect => "effect only",
        })
    }
}

/// Everything one evaluation produced.
#[derive(Debug, Clone)]
pub struct Execution {
    /// Snippet locals followed by `__result__`.
    pub bindings: Bindings,
    /// Text written by `print`.
    pub stdout: String,
    /// Hex SHA-256 of the normalised snippet.
    pub fingerprint: String,
    pub mode: Mode,
    pub steps: u64,
}

impl Execution {
    pub fn result(&self) -> &Value {
        self.bindings.get(RESULT_KEY).unwrap_or(&Value::None)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluate `source` and return its bindings.
    ///
    /// `permission` defaults to [`permission::current`]. Names from the
    /// thread's context stack are visible, overridden by `extra`.
    pub fn run(
        &self,
        source: &str,
        permission: Option<Permission>,
        extra: Bindings,
    ) -> Result<Bindings, RunError> {
        self.execute(source, permission, extra).map(|e| e.bindings)
    }

    /// Like [`Engine::run`], also returning captured output and metadata.
    pub fn execute(
        &self,
        source: &str,
        permission: Option<Permission>,
        extra: Bindings,
    ) -> Result<Execution, RunError> {
        let permission = permission.unwrap_or_else(permission::current);
        let mut globals = context::current();
        globals.extend(extra);

        // Parsing and evaluation recurse with the snippet, so they run on a
        // thread whose stack is sized by the config, not the caller's.
        thread::scope(|scope| {
            let spawned = thread::Builder::new()
                .name("scriptbox-eval".into())
                .stack_size(self.config.stack_size)
                .spawn_scoped(scope, || self.execute_here(source, permission, globals));
            match spawned {
                Ok(handle) => handle
                    .join()
                    .unwrap_or_else(|payload| panic::resume_unwind(payload)),
                Err(err) => {
                    let cause = RuntimeError::Raised {
                        kind: "MemoryError".into(),
                        message: format!("cannot start evaluation thread: {err}"),
                    };
                    Err(EvaluationFault::new(source, cause, None).into())
                }
            }
        })
    }

    fn execute_here(
        &self,
        source: &str,
        permission: Permission,
        globals: Bindings,
    ) -> Result<Execution, RunError> {
        let ParsedCode {
            source,
            program,
            fingerprint,
        } = scriptbox_checker::parse(source, permission)?;
        let short = fingerprint.get(..12).unwrap_or(&fingerprint);

        let mut interpreter = Interpreter::new(globals, &self.config);
        let (mode, outcome) = match program.body.split_last() {
            Some((last, body)) => {
                let mode = Mode::of(last);
                debug!("snippet {short}: {mode}");
                (mode, evaluate(&mut interpreter, mode, last, body))
            }
            None => (Mode::Effect, Ok(Value::None)),
        };

        let result = match outcome {
            Ok(result) => result,
            Err(cause) => {
                let line = interpreter
                    .fault_line()
                    .or_else(|| program.body.last().map(|s| s.span.start_line));
                debug!("snippet {short} raised {} at line {line:?}", cause.kind());
                return Err(EvaluationFault::new(source, cause, line).into());
            }
        };

        let steps = interpreter.steps();
        let (mut bindings, stdout) = interpreter.into_parts();
        bindings.shift_remove(RESULT_KEY);
        bindings.insert(RESULT_KEY.to_string(), result);
        Ok(Execution {
            bindings,
            stdout,
            fingerprint,
            mode,
            steps,
        })
    }
}

fn evaluate(
    interpreter: &mut Interpreter,
    mode: Mode,
    last: &Stmt,
    body: &[Stmt],
) -> Result<Value, RuntimeError> {
    match (&last.kind, mode) {
        (StmtKind::Expr(expr), Mode::Expression) => {
            interpreter.exec_block(body)?;
            interpreter.eval(expr)
        }
        (StmtKind::Assign { targets, value }, Mode::Assignment) => {
            interpreter.exec_block(body)?;
            let value = interpreter.eval(value)?;
            for target in targets {
                interpreter.assign(target, value.clone())?;
            }
            Ok(value)
        }
        (StmtKind::AugAssign { target, .. }, Mode::AugmentedAssignment) => {
            interpreter.exec_block(body)?;
            interpreter.exec_block(std::slice::from_ref(last))?;
            interpreter.read_target(target)
        }
        _ => {
            interpreter.exec_block(body)?;
            interpreter.exec_block(std::slice::from_ref(last))?;
            Ok(interpreter
                .locals()
                .last()
                .map(|(_, value)| value.clone())
                .unwrap_or_default())
        }
    }
}

/// Evaluate `source` with the default [`Engine`].
pub fn run(
    source: &str,
    permission: Option<Permission>,
    extra: Bindings,
) -> Result<Bindings, RunError> {
    Engine::default().run(source, permission, extra)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(source: &str) -> Value {
        run(source, None, Bindings::new()).unwrap()[RESULT_KEY].clone()
    }

    #[test]
    fn test_modes_are_chosen_from_last_statement() {
        let engine = Engine::default();
        let mode = |src: &str| engine.execute(src, None, Bindings::new()).unwrap().mode;
        assert_eq!(mode("1 + 1"), Mode::Expression);
        assert_eq!(mode("x = 1"), Mode::Assignment);
        assert_eq!(mode("x = 1\nx += 1"), Mode::AugmentedAssignment);
        assert_eq!(mode("for i in range(2):\n    pass"), Mode::Effect);
    }

    #[test]
    fn test_result_key_is_last() {
        let bindings = run("b = 2\na = 1\nb = 3", None, Bindings::new()).unwrap();
        let keys: Vec<&str> = bindings.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["b", "a", RESULT_KEY]);
        assert_eq!(bindings[RESULT_KEY], Value::Int(3));
    }

    #[test]
    fn test_effect_only_uses_first_assignment_order() {
        // Re-assigning `a` does not move it after `b`.
        assert_eq!(
            result("a = 1\nb = 2\nif True:\n    a = 5"),
            Value::Int(2)
        );
        assert_eq!(result("if False:\n    x = 1"), Value::None);
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"gas_limit": 10}"#).unwrap();
        assert_eq!(config.gas_limit, Some(10));
        assert_eq!(config.max_call_depth, DEFAULT_MAX_CALL_DEPTH);
        assert_eq!(config.stack_size, DEFAULT_STACK_SIZE);
    }

    #[test]
    fn test_evaluation_runs_on_its_own_thread() {
        use std::sync::{Arc, Mutex};

        let seen = Arc::new(Mutex::new(None));
        let record = Arc::clone(&seen);
        let where_am_i = Value::native("where_am_i", move |_: &[Value]| {
            *record.lock().unwrap() = std::thread::current().name().map(String::from);
            Ok(Value::None)
        });
        let extra: Bindings = [("where_am_i".to_string(), where_am_i)].into_iter().collect();
        run("where_am_i()", None, extra).unwrap();
        assert_eq!(seen.lock().unwrap().as_deref(), Some("scriptbox-eval"));
    }
}
