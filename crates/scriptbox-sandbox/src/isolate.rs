//! Runner side: fork a worker, enforce the deadline, collect the message.

use log::{debug, warn};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::{kill, killpg, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{close, fork, pipe2, setpgid, ForkResult, Pid};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::{Duration, Instant};

use crate::channel::{self, Reader};
use crate::error::{os_error, IsolateError};
use crate::worker;

/// Default gap between `waitpid` polls.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationConfig {
    /// Wall-clock limit for the worker; `None` waits forever.
    pub timeout_ms: Option<u64>,
    pub poll_interval_ms: u64,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

/// Runs tasks in forked worker processes.
#[derive(Debug, Clone, Default)]
pub struct Isolation {
    config: IsolationConfig,
    timeout: Option<Duration>,
}

impl Isolation {
    pub fn new(config: IsolationConfig) -> Self {
        Self {
            timeout: config.timeout_ms.map(Duration::from_millis),
            config,
        }
    }

    /// Use `timeout` exactly; the config records it rounded up to whole
    /// milliseconds.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        let config = IsolationConfig {
            timeout_ms: timeout.map(ceil_millis),
            ..IsolationConfig::default()
        };
        Self { config, timeout }
    }

    pub fn config(&self) -> &IsolationConfig {
        &self.config
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.poll_interval_ms.max(1))
    }

    /// Run `task` in a worker process and hand back what it returned.
    ///
    /// The calling thread blocks until the worker exits or the timeout
    /// passes, in which case the worker's whole process group is killed.
    pub fn call<T, E, F>(&self, task: F) -> Result<T, IsolateError<E>>
    where
        F: FnOnce() -> Result<T, E>,
        T: Serialize + DeserializeOwned,
        E: Serialize + DeserializeOwned,
    {
        let (read_fd, write_fd) =
            pipe2(OFlag::O_CLOEXEC).map_err(|e| os_error("failed to create pipe", e))?;

        // SAFETY: the child only runs the task and leaves through `_exit`.
        let child = match unsafe { fork() } {
            Ok(ForkResult::Child) => worker::run(task, read_fd, write_fd),
            Ok(ForkResult::Parent { child }) => child,
            Err(err) => {
                let _ = close(read_fd);
                let _ = close(write_fd);
                return Err(os_error("failed to fork worker", err));
            }
        };
        // Also set from this side so a kill never races the child's own call.
        let _ = setpgid(child, child);
        let _ = close(write_fd);
        debug!("spawned worker {child}");

        let reader = match Reader::spawn(read_fd) {
            Ok(reader) => reader,
            Err(err) => {
                terminate_group(child);
                reap(child);
                return Err(os_error("failed to start pipe reader", err));
            }
        };

        let status = match self.wait(child) {
            Ok(status) => status,
            Err(err) => {
                let _ = reader.finish();
                return Err(err);
            }
        };
        debug!("reaped worker {child}: {}", describe(&status));

        let message = reader
            .finish()
            .map_err(|e| os_error("failed to read worker message", e))?;
        if message.is_empty() {
            warn!("worker {child} exited without a result: {}", describe(&status));
            return Err(IsolateError::WorkerCrashed(describe(&status)));
        }
        channel::decode(&message)
    }

    /// Poll until the worker exits. Every error path leaves it reaped.
    fn wait<E>(&self, child: Pid) -> Result<WaitStatus, IsolateError<E>> {
        let deadline = self.timeout().map(|t| (t, Instant::now() + t));
        let poll = self.poll_interval();
        loop {
            match waitpid(child, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => {}
                Ok(status @ (WaitStatus::Exited(..) | WaitStatus::Signaled(..))) => {
                    return Ok(status)
                }
                Ok(_) | Err(Errno::EINTR) => continue,
                Err(err) => {
                    terminate_group(child);
                    reap(child);
                    return Err(os_error("failed to wait for worker", err));
                }
            }

            match deadline {
                Some((timeout, at)) => {
                    let now = Instant::now();
                    if now >= at {
                        warn!("worker {child} exceeded {timeout:?}; killing its process group");
                        terminate_group(child);
                        reap(child);
                        return Err(IsolateError::Timeout(timeout));
                    }
                    thread::sleep(poll.min(at - now));
                }
                None => thread::sleep(poll),
            }
        }
    }
}

/// Run `task` in a fresh worker process, killing it after `timeout`.
pub fn isolate<T, E, F>(task: F, timeout: Option<Duration>) -> Result<T, IsolateError<E>>
where
    F: FnOnce() -> Result<T, E>,
    T: Serialize + DeserializeOwned,
    E: Serialize + DeserializeOwned,
{
    Isolation::with_timeout(timeout).call(task)
}

fn ceil_millis(timeout: Duration) -> u64 {
    let millis = timeout.as_nanos().div_ceil(1_000_000);
    millis.try_into().unwrap_or(u64::MAX)
}

fn terminate_group(child: Pid) {
    if killpg(child, Signal::SIGKILL).is_err() {
        let _ = kill(child, Signal::SIGKILL);
    }
}

fn reap(child: Pid) {
    loop {
        match waitpid(child, None) {
            Err(Errno::EINTR) => continue,
            Ok(WaitStatus::Exited(..) | WaitStatus::Signaled(..)) | Err(_) => break,
            Ok(_) => continue,
        }
    }
    debug!("reaped worker {child}");
}

fn describe(status: &WaitStatus) -> String {
    match status {
        WaitStatus::Exited(_, code) => format!("exit status {code}"),
        WaitStatus::Signaled(_, signal, _) => format!("killed by {signal}"),
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: IsolationConfig = serde_json::from_str(r#"{"timeout_ms": 250}"#).unwrap();
        assert_eq!(config.timeout_ms, Some(250));
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);

        let config: IsolationConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, IsolationConfig::default());
    }

    #[test]
    fn test_timeout_round_trips_through_builder() {
        let isolation = Isolation::with_timeout(Some(Duration::from_millis(1500)));
        assert_eq!(isolation.timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(Isolation::with_timeout(None).timeout(), None);

        let short = Duration::from_micros(900);
        let isolation = Isolation::with_timeout(Some(short));
        assert_eq!(isolation.timeout(), Some(short));
        assert_eq!(isolation.config().timeout_ms, Some(1));
        assert_eq!(ceil_millis(Duration::from_micros(1001)), 2);
        assert_eq!(ceil_millis(Duration::ZERO), 0);
    }

    #[test]
    fn test_describe_status() {
        let pid = Pid::from_raw(1);
        assert_eq!(describe(&WaitStatus::Exited(pid, 3)), "exit status 3");
        assert_eq!(
            describe(&WaitStatus::Signaled(pid, Signal::SIGKILL, false)),
            "killed by SIGKILL"
        );
    }
}
