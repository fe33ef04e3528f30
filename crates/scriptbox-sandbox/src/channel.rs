//! The one-message channel between worker and runner.
//!
//! The worker writes a single JSON-encoded [`Outcome`] and exits; the runner
//! drains the pipe on a reader thread until EOF, or until the worker has been
//! reaped and the pipe is empty.

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Read};
use std::os::unix::io::{FromRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::IsolateError;

const READ_BACKOFF: Duration = Duration::from_millis(1);

/// What the worker reports. The tag keeps "the task failed" apart from
/// "the task returned something that looks like a failure".
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "payload", rename_all = "snake_case")]
pub(crate) enum Outcome<T, E> {
    Value(T),
    Raised(E),
    Panicked(String),
    Unserializable(String),
}

impl<T, E> Outcome<T, E> {
    pub(crate) fn into_result(self) -> Result<T, IsolateError<E>> {
        match self {
            Outcome::Value(value) => Ok(value),
            Outcome::Raised(err) => Err(IsolateError::Raised(err)),
            Outcome::Panicked(message) => Err(IsolateError::Panicked(message)),
            Outcome::Unserializable(reason) => Err(IsolateError::Serialization(reason)),
        }
    }
}

/// Encode `outcome`, degrading to `Unserializable` when the payload refuses.
pub(crate) fn encode<T: Serialize, E: Serialize>(outcome: &Outcome<T, E>) -> Vec<u8> {
    serde_json::to_vec(outcome).unwrap_or_else(|err| {
        let fallback: Outcome<(), ()> = Outcome::Unserializable(err.to_string());
        serde_json::to_vec(&fallback).unwrap_or_default()
    })
}

pub(crate) fn decode<T: DeserializeOwned, E: DeserializeOwned>(
    bytes: &[u8],
) -> Result<T, IsolateError<E>> {
    serde_json::from_slice::<Outcome<T, E>>(bytes)
        .map_err(|err| IsolateError::Serialization(format!("malformed worker message: {err}")))?
        .into_result()
}

/// Drains the read end of the worker pipe.
pub(crate) struct Reader {
    finished: Arc<AtomicBool>,
    handle: JoinHandle<io::Result<Vec<u8>>>,
}

impl Reader {
    /// Take ownership of `fd` and start draining it.
    ///
    /// The fd is switched to non-blocking so a write end leaked into some
    /// other forked process cannot keep the reader alive after our worker is
    /// gone.
    pub(crate) fn spawn(fd: RawFd) -> io::Result<Self> {
        // SAFETY: the runner hands over the only copy of the read end.
        let mut file = unsafe { File::from_raw_fd(fd) };
        fcntl(fd, FcntlArg::F_SETFL(OFlag::O_NONBLOCK)).map_err(io::Error::from)?;

        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let handle = thread::Builder::new()
            .name("scriptbox-reader".into())
            .spawn(move || drain(&mut file, &flag))?;
        Ok(Self { finished, handle })
    }

    /// Wait for everything the (already reaped) worker wrote.
    pub(crate) fn finish(self) -> io::Result<Vec<u8>> {
        self.finished.store(true, Ordering::Release);
        self.handle
            .join()
            .unwrap_or_else(|_| Err(io::Error::other("reader thread panicked")))
    }
}

fn drain(file: &mut File, finished: &AtomicBool) -> io::Result<Vec<u8>> {
    let mut message = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        // Loaded before the read: once set, the worker's writes are all
        // already in the pipe, so an empty read means there is nothing left.
        let worker_gone = finished.load(Ordering::Acquire);
        match file.read(&mut buf) {
            Ok(0) => return Ok(message),
            Ok(n) => message.extend_from_slice(&buf[..n]),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                if worker_gone {
                    return Ok(message);
                }
                thread::sleep(READ_BACKOFF);
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
}
