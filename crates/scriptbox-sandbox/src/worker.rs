//! Child side of a fork: run the task, report once, `_exit`.
//!
//! Nothing here logs or returns. The host's destructors and atexit handlers
//! belong to the parent and never run in the worker.

use nix::unistd::{close, setpgid, Pid};
use serde::Serialize;
use std::any::Any;
use std::fs::File;
use std::io::Write;
use std::os::unix::io::{FromRawFd, RawFd};
use std::panic::{self, AssertUnwindSafe};

use crate::channel::{self, Outcome};

pub(crate) fn run<T, E, F>(task: F, read_fd: RawFd, write_fd: RawFd) -> !
where
    F: FnOnce() -> Result<T, E>,
    T: Serialize,
    E: Serialize,
{
    // Own group, so a timeout kill takes anything the task spawned with it.
    let _ = setpgid(Pid::from_raw(0), Pid::from_raw(0));
    let _ = close(read_fd);
    panic::set_hook(Box::new(|_| {}));

    let outcome = match panic::catch_unwind(AssertUnwindSafe(task)) {
        Ok(Ok(value)) => Outcome::Value(value),
        Ok(Err(err)) => Outcome::Raised(err),
        Err(payload) => Outcome::Panicked(panic_message(payload.as_ref())),
    };
    let message = channel::encode(&outcome);

    // SAFETY: this process owns its copy of the write end.
    let mut pipe = unsafe { File::from_raw_fd(write_fd) };
    let code = match pipe.write_all(&message) {
        Ok(()) => 0,
        Err(_) => 1,
    };
    drop(pipe);
    // SAFETY: `_exit` is async-signal-safe and skips the parent's cleanup.
    unsafe { libc::_exit(code) }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
