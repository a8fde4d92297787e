//! Trait definitions for the process module.

use std::fmt::Debug;
use std::path::PathBuf;
use std::time::Duration;

use super::error::ProcessError;
use super::types::Operation;

/// One spawned (or spawnable) external process and the output it produced.
///
/// Tool failures are reported through [`has_error`](Self::has_error) and
/// [`error_code`](Self::error_code), never as `Err`.
pub trait ExecutionHandle: Send + Debug {
    /// Human-readable identity used in diagnostics.
    fn identity(&self) -> String;

    /// Whether this handle implements `operation`.
    ///
    /// Handles that cannot honour part of the interface override this so the
    /// proxy reports misuse instead of returning a meaningless default.
    fn supports(&self, _operation: Operation) -> bool {
        true
    }

    /// Switches between blocking and non-blocking execution.
    fn set_blocking(&mut self, blocking: bool);

    /// Whether [`execute`](Self::execute) waits for the process to exit.
    fn blocking(&self) -> bool;

    /// Runs the command. Returns after exit when blocking, after spawn otherwise.
    fn execute(&mut self) -> Result<(), ProcessError>;

    /// Time elapsed since execution started, frozen once the process completes.
    fn run_time(&self) -> Option<Duration>;

    /// The tool command as it was handed to the handle.
    fn command(&self) -> String;

    /// The full shell command actually run, including output redirection.
    fn executed_command(&self) -> String;

    /// Captured output with handle bookkeeping removed.
    fn buffer(&self) -> String;

    /// Captured output exactly as stored.
    fn raw_buffer(&self) -> String;

    /// Last non-empty line of [`buffer`](Self::buffer).
    fn last_line(&self) -> Option<String>;

    /// Last non-empty segment of [`buffer`](Self::buffer) split on `\r` or `\n`.
    fn last_split(&self) -> Option<String>;

    /// Exit code of the tool, once known.
    fn error_code(&self) -> Option<i32>;

    /// Whether the tool completed with a non-zero exit code.
    fn has_error(&self) -> bool;

    /// Whether the tool has finished.
    fn is_completed(&self) -> bool;

    /// Location of the backing output storage.
    fn buffer_output(&self) -> PathBuf;

    /// Marker that delimits this execution's bookkeeping in the storage.
    fn boundary(&self) -> String;

    /// Enables or disables removal of the backing storage when the handle is dropped.
    fn set_garbage_collection(&mut self, enabled: bool);
}

/// Builds execution handles for finished command strings.
pub trait HandleFactory: Send + Sync + Debug {
    /// Creates a handle bound to `command`. The process is not started.
    fn create(&self, command: String) -> Result<Box<dyn ExecutionHandle>, ProcessError>;
}
