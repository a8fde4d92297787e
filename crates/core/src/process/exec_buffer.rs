//! File-backed execution handle.
//!
//! The tool runs in a subshell under `sh -c` with stdout and stderr
//! redirected into a storage file. After the tool exits, the shell appends a
//! marker line `[<boundary>:<exit code>]`, which lets any process that knows
//! the storage location and boundary decide completion without owning the
//! child.

use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::ProcessError;
use super::portable::PortableId;
use super::traits::{ExecutionHandle, HandleFactory};
use crate::metrics::{PROCESSES_FINISHED, PROCESSES_STARTED, PROCESS_DURATION};

/// File name prefix of every storage file.
pub const STORAGE_PREFIX: &str = "vidkit_";

const SHELL: &str = "sh";

/// Interval between marker checks while blocking on an attached handle.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Default)]
struct RunState {
    child: Option<Child>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    exit_code: Option<i32>,
}

/// Execution handle that captures tool output in a temp file.
#[derive(Debug)]
pub struct ExecBuffer {
    command: String,
    storage: PathBuf,
    boundary: String,
    blocking: bool,
    garbage_collection: bool,
    state: Mutex<RunState>,
}

impl ExecBuffer {
    /// Creates a handle for `command` with a fresh storage file in `storage_dir`.
    ///
    /// The handle starts in blocking mode with garbage collection enabled.
    pub fn new(command: impl Into<String>, storage_dir: &Path) -> Result<Self, ProcessError> {
        fs::create_dir_all(storage_dir)?;
        let file = tempfile::Builder::new()
            .prefix(STORAGE_PREFIX)
            .tempfile_in(storage_dir)?;
        let (_, storage) = file.keep().map_err(|e| e.error)?;

        let buffer = Self {
            command: command.into(),
            storage,
            boundary: Uuid::new_v4().simple().to_string(),
            blocking: true,
            garbage_collection: true,
            state: Mutex::new(RunState::default()),
        };
        debug!(storage = %buffer.storage.display(), "Created exec buffer");
        Ok(buffer)
    }

    /// Re-attaches to the storage of a process started by another invocation.
    ///
    /// The returned handle is non-blocking, never removes the storage on drop
    /// and cannot be executed again. Its command is unknown and reported empty.
    pub fn attach(id: &PortableId, storage_dir: &Path) -> Result<Self, ProcessError> {
        let storage = id.storage_path(storage_dir);
        if !storage.is_file() {
            return Err(ProcessError::StorageNotFound { path: storage });
        }

        let state = RunState {
            started_at: Some(id.created_at()),
            ..RunState::default()
        };
        debug!(storage = %storage.display(), "Attached to exec buffer");
        Ok(Self {
            command: String::new(),
            storage,
            boundary: id.boundary().to_string(),
            blocking: false,
            garbage_collection: false,
            state: Mutex::new(state),
        })
    }

    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the run state after folding in any completion observed since the last query.
    fn refreshed(&self) -> MutexGuard<'_, RunState> {
        let mut state = self.lock();
        if state.finished_at.is_some() || state.started_at.is_none() {
            return state;
        }

        let mut exited_code = None;
        if let Some(child) = state.child.as_mut() {
            match child.try_wait() {
                Ok(Some(status)) => exited_code = Some(status.code()),
                Ok(None) => return state,
                Err(e) => {
                    warn!(storage = %self.storage.display(), "Failed to poll child: {}", e);
                    return state;
                }
            }
        }

        let code = match (marker_code(&self.read_storage(), &self.boundary), exited_code) {
            (Some(code), _) => Some(code),
            // The shell went away without writing the marker.
            (None, Some(status_code)) => status_code,
            (None, None) => return state,
        };

        state.child = None;
        state.exit_code = code;
        state.finished_at = Some(Utc::now());
        self.record_finish(&state);
        state
    }

    fn record_finish(&self, state: &RunState) {
        let result = if state.exit_code == Some(0) {
            "success"
        } else {
            "error"
        };
        PROCESSES_FINISHED.with_label_values(&[result]).inc();
        if let Some(elapsed) = elapsed(state) {
            PROCESS_DURATION
                .with_label_values(&[result])
                .observe(elapsed.as_secs_f64());
        }
        info!(
            storage = %self.storage.display(),
            exit_code = ?state.exit_code,
            "Process finished"
        );
    }

    fn read_storage(&self) -> String {
        match fs::read(&self.storage) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                debug!(storage = %self.storage.display(), "Failed to read storage: {}", e);
                String::new()
            }
        }
    }

    fn spawn(&self) -> Result<Child, ProcessError> {
        let executed = self.executed_command();
        let stdout = OpenOptions::new().append(true).open(&self.storage)?;
        let stderr = stdout.try_clone()?;
        Command::new(SHELL)
            .arg("-c")
            .arg(&executed)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                command: executed,
                source,
            })
    }

    fn marker_prefix(&self) -> String {
        format!("\n[{}:", self.boundary)
    }
}

impl ExecutionHandle for ExecBuffer {
    fn identity(&self) -> String {
        format!("exec-buffer {}", self.storage.display())
    }

    fn set_blocking(&mut self, blocking: bool) {
        self.blocking = blocking;
    }

    fn blocking(&self) -> bool {
        self.blocking
    }

    fn execute(&mut self) -> Result<(), ProcessError> {
        let mut state = self.lock();
        if state.started_at.is_some() {
            debug!(storage = %self.storage.display(), "Process already started");
        } else {
            let child = self.spawn()?;
            let mode = if self.blocking {
                "blocking"
            } else {
                "non_blocking"
            };
            PROCESSES_STARTED.with_label_values(&[mode]).inc();
            info!(command = %self.command, mode, "Process started");
            state.started_at = Some(Utc::now());
            state.child = Some(child);
        }

        if !self.blocking {
            drop(state);
            drop(self.refreshed());
            return Ok(());
        }

        if let Some(child) = state.child.as_mut() {
            child.wait()?;
        }
        drop(state);

        // Attached handles own no child; the marker is the only completion signal.
        loop {
            if self.refreshed().finished_at.is_some() {
                return Ok(());
            }
            if !self.storage.is_file() {
                return Err(ProcessError::StorageNotFound {
                    path: self.storage.clone(),
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn run_time(&self) -> Option<Duration> {
        elapsed(&self.refreshed())
    }

    fn command(&self) -> String {
        self.command.clone()
    }

    fn executed_command(&self) -> String {
        format!(
            "( {} ) ; printf '\\n[%s:%s]\\n' '{}' \"$?\"",
            self.command, self.boundary
        )
    }

    fn buffer(&self) -> String {
        let mut raw = self.read_storage();
        if let Some(pos) = raw.find(&self.marker_prefix()) {
            raw.truncate(pos);
        }
        raw
    }

    fn raw_buffer(&self) -> String {
        self.read_storage()
    }

    fn last_line(&self) -> Option<String> {
        last_line_of(&self.buffer())
    }

    fn last_split(&self) -> Option<String> {
        last_split_of(&self.buffer())
    }

    fn error_code(&self) -> Option<i32> {
        self.refreshed().exit_code
    }

    fn has_error(&self) -> bool {
        let state = self.refreshed();
        state.finished_at.is_some() && state.exit_code != Some(0)
    }

    fn is_completed(&self) -> bool {
        self.refreshed().finished_at.is_some()
    }

    fn buffer_output(&self) -> PathBuf {
        self.storage.clone()
    }

    fn boundary(&self) -> String {
        self.boundary.clone()
    }

    fn set_garbage_collection(&mut self, enabled: bool) {
        self.garbage_collection = enabled;
    }
}

impl Drop for ExecBuffer {
    fn drop(&mut self) {
        if !self.garbage_collection {
            return;
        }
        match fs::remove_file(&self.storage) {
            Ok(()) => debug!(storage = %self.storage.display(), "Removed exec buffer storage"),
            Err(e) => debug!(
                storage = %self.storage.display(),
                "Failed to remove exec buffer storage: {}", e
            ),
        }
    }
}

/// Creates [`ExecBuffer`] handles in a fixed storage directory.
#[derive(Debug, Clone)]
pub struct ExecBufferFactory {
    storage_dir: Arc<PathBuf>,
}

impl ExecBufferFactory {
    /// Creates a factory writing storage files to `storage_dir`.
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: Arc::new(storage_dir.into()),
        }
    }

    /// Directory that receives storage files.
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }
}

impl HandleFactory for ExecBufferFactory {
    fn create(&self, command: String) -> Result<Box<dyn ExecutionHandle>, ProcessError> {
        Ok(Box::new(ExecBuffer::new(command, &self.storage_dir)?))
    }
}

fn elapsed(state: &RunState) -> Option<Duration> {
    let started = state.started_at?;
    let end = state.finished_at.unwrap_or_else(Utc::now);
    (end - started).to_std().ok()
}

/// Exit code recorded by the boundary marker, if the marker has been written.
fn marker_code(raw: &str, boundary: &str) -> Option<i32> {
    let prefix = format!("\n[{}:", boundary);
    let start = raw.find(&prefix)? + prefix.len();
    let rest = &raw[start..];
    let end = rest.find(']')?;
    rest[..end].trim().parse().ok()
}

pub(crate) fn last_line_of(buffer: &str) -> Option<String> {
    buffer
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .last()
        .map(str::to_string)
}

pub(crate) fn last_split_of(buffer: &str) -> Option<String> {
    buffer
        .split(['\r', '\n'])
        .filter(|segment| !segment.trim().is_empty())
        .last()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_marker_code_parsing() {
        assert_eq!(marker_code("out\n[abc:0]\n", "abc"), Some(0));
        assert_eq!(marker_code("\n[abc:137]\n", "abc"), Some(137));
        assert_eq!(marker_code("out\n[other:1]\n", "abc"), None);
        assert_eq!(marker_code("out\n[abc:", "abc"), None);
    }

    #[test]
    fn test_last_line_and_split() {
        let buffer = "Input #0\nframe=  1 fps=0\rframe=  2 fps=0\r\n\n";
        assert_eq!(last_line_of(buffer).as_deref(), Some("frame=  1 fps=0\rframe=  2 fps=0"));
        assert_eq!(last_split_of(buffer).as_deref(), Some("frame=  2 fps=0"));
        assert_eq!(last_line_of(""), None);
        assert_eq!(last_split_of("\r\n"), None);
    }

    #[test]
    fn test_new_buffer_creates_prefixed_storage() {
        let dir = TempDir::new().unwrap();
        let buffer = ExecBuffer::new("echo hi", dir.path()).unwrap();

        let name = buffer.buffer_output();
        let file_name = name.file_name().unwrap().to_string_lossy().to_string();
        assert!(file_name.starts_with(STORAGE_PREFIX));
        assert!(name.is_file());
        assert!(buffer.blocking());
        assert!(!buffer.is_completed());
        assert_eq!(buffer.run_time(), None);
    }

    #[test]
    fn test_drop_removes_storage_only_with_garbage_collection() {
        let dir = TempDir::new().unwrap();

        let collected = ExecBuffer::new("true", dir.path()).unwrap();
        let collected_path = collected.buffer_output();
        drop(collected);
        assert!(!collected_path.exists());

        let mut kept = ExecBuffer::new("true", dir.path()).unwrap();
        kept.set_garbage_collection(false);
        let kept_path = kept.buffer_output();
        drop(kept);
        assert!(kept_path.exists());
    }

    #[test]
    fn test_blocking_execute_captures_output_and_exit_code() {
        let dir = TempDir::new().unwrap();
        let mut buffer = ExecBuffer::new("echo hello; echo oops >&2; exit 3", dir.path()).unwrap();
        buffer.execute().unwrap();

        assert!(buffer.is_completed());
        assert_eq!(buffer.error_code(), Some(3));
        assert!(buffer.has_error());
        assert_eq!(buffer.buffer(), "hello\noops\n");
        assert!(buffer.raw_buffer().contains(&format!("[{}:3]", buffer.boundary())));
        assert_eq!(buffer.last_line().as_deref(), Some("oops"));
        assert!(buffer.run_time().is_some());
    }

    #[test]
    fn test_successful_execute_has_no_error() {
        let dir = TempDir::new().unwrap();
        let mut buffer = ExecBuffer::new("printf done", dir.path()).unwrap();
        buffer.execute().unwrap();

        assert_eq!(buffer.error_code(), Some(0));
        assert!(!buffer.has_error());
        assert_eq!(buffer.buffer(), "done");
    }

    #[test]
    fn test_second_execute_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let mut buffer = ExecBuffer::new("echo once", dir.path()).unwrap();
        buffer.execute().unwrap();
        buffer.execute().unwrap();
        assert_eq!(buffer.buffer(), "once\n");
    }

    #[test]
    fn test_blocking_execute_after_non_blocking_start_waits() {
        let dir = TempDir::new().unwrap();
        let mut buffer = ExecBuffer::new("sleep 0.2; exit 4", dir.path()).unwrap();
        buffer.set_blocking(false);
        buffer.execute().unwrap();
        assert!(!buffer.is_completed());

        buffer.set_blocking(true);
        buffer.execute().unwrap();
        assert!(buffer.is_completed());
        assert_eq!(buffer.error_code(), Some(4));
    }

    #[test]
    fn test_factory_creates_storage_in_its_directory() {
        let dir = TempDir::new().unwrap();
        let factory = ExecBufferFactory::new(dir.path());
        assert_eq!(factory.storage_dir(), dir.path());

        let handle = factory.create("true".to_string()).unwrap();
        let storage = handle.buffer_output();
        assert!(storage.starts_with(factory.storage_dir()));
        assert!(storage.is_file());
    }
}
