//! Package inventory extraction: run an environment's package manager and
//! capture what it reports as installed.
//!
//! Every failure here is a value, not an error. A missing manager, a launch
//! failure, a non-zero exit and a timeout all come back as an [`Inventory`]
//! whose [`InventoryStatus`] says what happened, so one broken environment
//! never stops a sweep.

#![allow(missing_docs)]

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

use crate::core::paths::normalize_syntactic;
use crate::scanner::locator::EnvironmentCandidate;

/// Argument list handed to the manager when none is configured.
pub const DEFAULT_MANAGER_ARGS: &[&str] = &["freeze"];

const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// How long to wait for the output pipes to drain once the manager is gone.
/// A grandchild that inherited stdout can keep it open indefinitely.
const READER_GRACE: Duration = Duration::from_secs(2);

/// Manager location relative to an environment root on this platform.
pub fn default_manager_path() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from("Scripts/pip.exe")
    } else {
        PathBuf::from("bin/pip")
    }
}

/// How the inventory of one environment was obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InventoryStatus {
    Ok,
    /// No manager executable at the expected location; nothing was run.
    ManagerNotFound,
    /// The manager ran and exited unsuccessfully. `None` when it was ended
    /// by a signal rather than exiting.
    InvocationFailed { code: Option<i32> },
    /// The manager could not be launched, or was killed after the timeout.
    InvocationError { message: String },
}

impl InventoryStatus {
    /// Whether the manager ran to a successful exit.
    pub fn is_reachable(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Installed-package lines reported for one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Inventory {
    pub environment: EnvironmentCandidate,
    /// Raw `name==version` lines, unparsed, trailing blank lines removed.
    pub entries: Vec<String>,
    pub status: InventoryStatus,
    /// Whatever the manager wrote to stderr, trimmed.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

impl Inventory {
    fn without_output(environment: &EnvironmentCandidate, status: InventoryStatus) -> Self {
        Self {
            environment: environment.clone(),
            entries: Vec::new(),
            status,
            stderr: String::new(),
        }
    }
}

/// Runs `<env root>/<manager_path> <args...>` inside each environment.
#[derive(Debug, Clone)]
pub struct InventoryExtractor {
    manager_path: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl Default for InventoryExtractor {
    fn default() -> Self {
        Self::new(default_manager_path())
    }
}

impl InventoryExtractor {
    /// Extractor for `manager_path` with the default `freeze` argument and
    /// no timeout.
    pub fn new(manager_path: impl Into<PathBuf>) -> Self {
        Self {
            manager_path: manager_path.into(),
            args: DEFAULT_MANAGER_ARGS.iter().map(|a| (*a).to_string()).collect(),
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Kill a manager still running after `timeout`. `None` waits forever.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn manager_path(&self) -> &Path {
        &self.manager_path
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Human-readable invocation, e.g. `bin/pip freeze`.
    pub fn command_line(&self) -> String {
        let mut line = self.manager_path.to_string_lossy().into_owned();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Absolute manager location for an environment, or `None` when the
    /// configured path leads outside of it.
    pub fn manager_for(&self, environment: &Path) -> Option<PathBuf> {
        let root = normalize_syntactic(environment);
        let manager = normalize_syntactic(&root.join(&self.manager_path));
        (manager != root && manager.starts_with(&root)).then_some(manager)
    }

    /// Run the manager for one environment. One process at most, no retries.
    pub fn extract(&self, candidate: &EnvironmentCandidate) -> Inventory {
        let root = candidate.root.as_path();
        let Some(manager) = self.manager_for(root).filter(|m| m.is_file()) else {
            return Inventory::without_output(candidate, InventoryStatus::ManagerNotFound);
        };

        let mut command = Command::new(&manager);
        command.args(&self.args).current_dir(root).stdin(Stdio::null());

        let captured = match self.timeout {
            None => run_to_completion(command),
            Some(limit) => run_with_deadline(command, limit),
        };
        let captured = match captured {
            Ok(captured) => captured,
            Err(err) => {
                return Inventory::without_output(
                    candidate,
                    InventoryStatus::InvocationError {
                        message: err.to_string(),
                    },
                );
            }
        };

        let status = match captured.exit {
            Exit::Status(status) if status.success() => InventoryStatus::Ok,
            Exit::Status(status) => InventoryStatus::InvocationFailed {
                code: status.code(),
            },
            Exit::TimedOut(limit) => InventoryStatus::InvocationError {
                message: format!("timed out after {limit:?}"),
            },
        };
        // A manager that exited cleanly but left its stdout held open may
        // not have reported everything.
        let status = match status {
            InventoryStatus::Ok if !captured.stdout_drained => InventoryStatus::InvocationError {
                message: format!(
                    "output not drained within {READER_GRACE:?} after the manager exited"
                ),
            },
            other => other,
        };

        Inventory {
            environment: candidate.clone(),
            entries: split_entries(&captured.stdout),
            status,
            stderr: String::from_utf8_lossy(&captured.stderr).trim().to_string(),
        }
    }
}

/// Run `manager_relative_path freeze` in `candidate` with no timeout.
pub fn extract(candidate: &EnvironmentCandidate, manager_relative_path: &Path) -> Inventory {
    InventoryExtractor::new(manager_relative_path).extract(candidate)
}

/// Output lines, lossily decoded. Trailing blank lines are dropped; blank
/// lines in between are kept as reported.
fn split_entries(stdout: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(stdout);
    let mut entries: Vec<String> = text.lines().map(str::to_string).collect();
    while entries.last().is_some_and(|line| line.trim().is_empty()) {
        entries.pop();
    }
    entries
}

enum Exit {
    Status(ExitStatus),
    TimedOut(Duration),
}

struct Captured {
    exit: Exit,
    stdout: Vec<u8>,
    /// False when stdout was still open after the grace period.
    stdout_drained: bool,
    stderr: Vec<u8>,
}

fn run_to_completion(mut command: Command) -> io::Result<Captured> {
    let output = command.output()?;
    Ok(Captured {
        exit: Exit::Status(output.status),
        stdout: output.stdout,
        stdout_drained: true,
        stderr: output.stderr,
    })
}

/// Spawn with both pipes drained on reader threads while this thread polls
/// the child against `limit`. This thread alone owns the child and is the
/// only one that kills it.
fn run_with_deadline(mut command: Command, limit: Duration) -> io::Result<Captured> {
    let mut child = command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    let stdout_reader = child.stdout.take().map(spawn_reader::<ChildStdout>);
    let stderr_reader = child.stderr.take().map(spawn_reader::<ChildStderr>);

    let deadline = Instant::now() + limit;
    let exit = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Exit::Status(status),
            Ok(None) => {}
            Err(err) => {
                kill_and_reap(&mut child);
                return Err(err);
            }
        }
        if Instant::now() >= deadline {
            kill_and_reap(&mut child);
            break Exit::TimedOut(limit);
        }
        thread::sleep(POLL_INTERVAL);
    };
    drop(child);

    let (stdout, stdout_drained) = join_reader(stdout_reader);
    let (stderr, _) = join_reader(stderr_reader);
    Ok(Captured {
        exit,
        stdout,
        stdout_drained,
        stderr,
    })
}

/// A pipe being drained on its own thread into a shared buffer, so that
/// what arrived so far can be taken even if the pipe never closes.
struct PipeReader {
    buffer: Arc<Mutex<Vec<u8>>>,
    handle: JoinHandle<()>,
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> PipeReader {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&buffer);
    let handle = thread::spawn(move || {
        let mut chunk = [0_u8; 8192];
        loop {
            match pipe.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => sink.lock().extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(_) => break,
            }
        }
    });
    PipeReader { buffer, handle }
}

/// Collect a reader's bytes, abandoning it after [`READER_GRACE`]. The flag
/// is false when the reader was abandoned with the pipe still open.
fn join_reader(reader: Option<PipeReader>) -> (Vec<u8>, bool) {
    let Some(reader) = reader else {
        return (Vec::new(), true);
    };
    let deadline = Instant::now() + READER_GRACE;
    while !reader.handle.is_finished() {
        if Instant::now() >= deadline {
            return (std::mem::take(&mut *reader.buffer.lock()), false);
        }
        thread::sleep(POLL_INTERVAL);
    }
    let _ = reader.handle.join();
    (std::mem::take(&mut *reader.buffer.lock()), true)
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
