//! Pairing engine invocation.
//!
//! The pairing engine is an opaque computation whose only interface is
//! "rewrite the record at this path with one more round". This module
//! provides the [`PairingEngine`] trait for that contract, the
//! [`ProcessEngine`] implementation that runs an external program, and the
//! [`CancelToken`] used to abort a run in progress.
//!
//! # Example
//!
//! ```no_run
//! use captain::engine::{CancelToken, PairingEngine, ProcessEngine};
//! use std::path::Path;
//! use std::time::Duration;
//!
//! let engine = ProcessEngine::new("/usr/local/bin/swiss-pairer", Vec::new(), Duration::from_secs(30));
//! engine.run(Path::new("tournaments/club.json"), &CancelToken::new())?;
//! # Ok::<(), captain::engine::EngineError>(())
//! ```

use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::EngineConfig;

/// How often a running engine is checked for completion, cancellation and timeout.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Errors that can occur while running the pairing engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine process could not be started.
    #[error("Failed to spawn pairing engine {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Waiting on the engine process failed.
    #[error("Failed to wait for pairing engine: {0}")]
    Wait(#[from] std::io::Error),
    /// The engine process exited with a failure status.
    #[error("Pairing engine exited with {0}")]
    Failed(ExitStatus),
    /// An in-process engine reported a failure.
    #[error("Pairing engine failed: {0}")]
    Rejected(String),
    /// The engine did not finish in time and was killed.
    #[error("Pairing engine did not finish within {0:?}")]
    TimedOut(Duration),
    /// The run was cancelled and the engine was killed.
    #[error("Pairing engine run was cancelled")]
    Cancelled,
}

/// A shared flag used to cancel a pairing run from another thread.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clears a previous cancellation request.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Computes the next round of a tournament record.
///
/// Implementations read the record at `slot`, append the next round and
/// write the record back to the same path. Returning `Ok` means the engine
/// believes it succeeded; the caller still validates the result.
pub trait PairingEngine {
    fn run(&self, slot: &Path, cancel: &CancelToken) -> Result<(), EngineError>;
}

/// In-process engines: any function with the engine signature.
impl<F> PairingEngine for F
where
    F: Fn(&Path, &CancelToken) -> Result<(), EngineError>,
{
    fn run(&self, slot: &Path, cancel: &CancelToken) -> Result<(), EngineError> {
        self(slot, cancel)
    }
}

/// Runs the pairing engine as a child process.
///
/// The process is started as `program [args...] <slot>` with no shell in
/// between, so the slot path is never interpreted. Its stdout is discarded
/// and its stderr is passed through for diagnostics.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    poll_interval: Duration,
}

impl ProcessEngine {
    /// Creates an engine runner for the given executable.
    ///
    /// # Arguments
    ///
    /// * `program` - Path to the pairing engine executable.
    /// * `args` - Arguments passed before the slot path.
    /// * `timeout` - How long to wait before killing the engine.
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Creates an engine runner from the `[engine]` configuration section.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone(), config.timeout())
    }

    /// Overrides how often the running process is polled.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl PairingEngine for ProcessEngine {
    fn run(&self, slot: &Path, cancel: &CancelToken) -> Result<(), EngineError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(slot)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());
        // Own process group: terminal signals skip the engine, and killing the
        // group also reaches anything the engine started.
        #[cfg(unix)]
        std::os::unix::process::CommandExt::process_group(&mut command, 0);

        let child = command
            .spawn()
            .map_err(|source| EngineError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let mut running = RunningEngine { child };
        tracing::debug!(program = %self.program.display(), pid = running.child.id(), "pairing engine started");

        let started = Instant::now();
        loop {
            if let Some(status) = running.child.try_wait()? {
                tracing::debug!(%status, elapsed = ?started.elapsed(), "pairing engine exited");
                running.kill_group();
                return if status.success() {
                    Ok(())
                } else if cancel.is_cancelled() {
                    Err(EngineError::Cancelled)
                } else {
                    Err(EngineError::Failed(status))
                };
            }
            if cancel.is_cancelled() {
                running.terminate();
                return Err(EngineError::Cancelled);
            }
            if started.elapsed() >= self.timeout {
                running.terminate();
                return Err(EngineError::TimedOut(self.timeout));
            }
            thread::sleep(self.poll_interval);
        }
    }
}

/// A spawned engine process that is killed and reaped if it is still
/// running when dropped.
///
/// On Unix the engine leads its own process group; terminating it kills the
/// whole group so no helper process can write the slot after the run ends.
struct RunningEngine {
    child: Child,
}

impl RunningEngine {
    fn terminate(&mut self) {
        self.kill_group();
        let _ = self.child.kill();
        let _ = self.child.wait();
    }

    /// Kills every process left in the engine's process group.
    #[cfg(unix)]
    fn kill_group(&self) {
        let Ok(pgid) = libc::pid_t::try_from(self.child.id()) else {
            return;
        };
        // SAFETY: killpg only sends a signal; the group was created for this child.
        // ESRCH (nothing left in the group) is expected and ignored.
        unsafe {
            libc::killpg(pgid, libc::SIGKILL);
        }
    }

    #[cfg(not(unix))]
    fn kill_group(&self) {}
}

impl Drop for RunningEngine {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            tracing::warn!(pid = self.child.id(), "killing pairing engine");
            self.terminate();
        }
    }
}
