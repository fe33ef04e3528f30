//! scriptbox isolation: run a task in a forked worker with a hard deadline.
//!
//! ```text
//! caller ──fork──→ worker: catch_unwind(task) → JSON Outcome → pipe → _exit
//!   │                                                         │
//!   └── waitpid(WNOHANG) poll ── deadline? SIGKILL group ─────┘ reader thread
//! ```
//!
//! [`isolate`] works for any task whose value and error are serde types.
//! [`isolated_run`] composes it with [`scriptbox_eval::run`]. The worker is a
//! copy of the calling process, so it sees the caller's context stack and
//! permission override.

mod channel;
pub mod error;
pub mod isolate;
mod worker;

pub use error::IsolateError;
pub use isolate::{isolate, Isolation, IsolationConfig, DEFAULT_POLL_INTERVAL_MS};

use scriptbox_eval::{run, Bindings, RunError};
use scriptbox_types::Permission;
use std::time::Duration;

/// [`run`] a snippet inside a worker process.
///
/// Faults and rejections come back as [`IsolateError::Raised`]; a snippet
/// still running at `timeout` is killed and reported as
/// [`IsolateError::Timeout`].
pub fn isolated_run(
    source: &str,
    permission: Option<Permission>,
    timeout: Option<Duration>,
    bindings: Bindings,
) -> Result<Bindings, IsolateError<RunError>> {
    isolate(move || run(source, permission, bindings), timeout)
}
