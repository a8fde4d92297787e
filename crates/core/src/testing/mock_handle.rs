//! Mock execution handle for testing.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::process::{
    last_line_of, last_split_of, ExecutionHandle, HandleFactory, Operation, ProcessError,
    STORAGE_PREFIX,
};

/// Behavior shared by every handle a [`MockHandleFactory`] creates.
#[derive(Debug, Clone)]
struct Preset {
    buffer: String,
    exit_code: i32,
    run_time: Duration,
    complete_on_start: bool,
    unsupported: HashSet<Operation>,
}

impl Default for Preset {
    fn default() -> Self {
        Self {
            buffer: String::new(),
            exit_code: 0,
            run_time: Duration::from_millis(250),
            complete_on_start: false,
            unsupported: HashSet::new(),
        }
    }
}

#[derive(Debug)]
struct HandleState {
    index: usize,
    command: String,
    preset: Preset,
    blocking: bool,
    garbage_collection: bool,
    executions: usize,
    completed: bool,
}

/// Mock implementation of the ExecutionHandle trait.
///
/// Clones share state, so a clone kept by the test observes everything the
/// proxy does with the boxed original.
///
/// Provides controllable behavior for testing:
/// - Canned buffer and exit code
/// - Non-blocking runs that complete only when [`finish`](Self::finish) is called
/// - Operations declared unsupported
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Arc<Mutex<HandleState>>,
}

impl MockHandle {
    fn new(index: usize, command: String, preset: Preset) -> Self {
        Self {
            state: Arc::new(Mutex::new(HandleState {
                index,
                command,
                preset,
                blocking: true,
                garbage_collection: true,
                executions: 0,
                completed: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HandleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Completes a started run with `exit_code`.
    pub fn finish(&self, exit_code: i32) {
        let mut state = self.lock();
        state.preset.exit_code = exit_code;
        state.completed = true;
    }

    /// Command string the handle was created with.
    pub fn created_command(&self) -> String {
        self.lock().command.clone()
    }

    /// Number of `execute` calls.
    pub fn executions(&self) -> usize {
        self.lock().executions
    }

    /// Whether the storage would be removed on drop.
    pub fn garbage_collection(&self) -> bool {
        self.lock().garbage_collection
    }

    /// Current blocking mode.
    pub fn is_blocking(&self) -> bool {
        self.lock().blocking
    }

    fn started(&self) -> bool {
        self.lock().executions > 0
    }
}

impl ExecutionHandle for MockHandle {
    fn identity(&self) -> String {
        format!("mock-handle #{}", self.lock().index)
    }

    fn supports(&self, operation: Operation) -> bool {
        !self.lock().preset.unsupported.contains(&operation)
    }

    fn set_blocking(&mut self, blocking: bool) {
        self.lock().blocking = blocking;
    }

    fn blocking(&self) -> bool {
        self.is_blocking()
    }

    /// A blocking call completes the run, including one made after a
    /// non-blocking start.
    fn execute(&mut self) -> Result<(), ProcessError> {
        let mut state = self.lock();
        state.executions += 1;
        if state.blocking || state.preset.complete_on_start {
            state.completed = true;
        }
        Ok(())
    }

    fn run_time(&self) -> Option<Duration> {
        self.started().then(|| self.lock().preset.run_time)
    }

    fn command(&self) -> String {
        self.created_command()
    }

    fn executed_command(&self) -> String {
        format!("{} > {}", self.created_command(), self.buffer_output().display())
    }

    fn buffer(&self) -> String {
        if self.started() {
            self.lock().preset.buffer.clone()
        } else {
            String::new()
        }
    }

    fn raw_buffer(&self) -> String {
        let state = self.lock();
        if state.completed {
            format!(
                "{}\n[{}:{}]\n",
                state.preset.buffer,
                self.boundary_of(&state),
                state.preset.exit_code
            )
        } else if state.executions > 0 {
            state.preset.buffer.clone()
        } else {
            String::new()
        }
    }

    fn last_line(&self) -> Option<String> {
        last_line_of(&self.buffer())
    }

    fn last_split(&self) -> Option<String> {
        last_split_of(&self.buffer())
    }

    fn error_code(&self) -> Option<i32> {
        let state = self.lock();
        state.completed.then_some(state.preset.exit_code)
    }

    fn has_error(&self) -> bool {
        let state = self.lock();
        state.completed && state.preset.exit_code != 0
    }

    fn is_completed(&self) -> bool {
        self.lock().completed
    }

    fn buffer_output(&self) -> PathBuf {
        let index = self.lock().index;
        std::env::temp_dir().join(format!("{}mock{}", STORAGE_PREFIX, index))
    }

    fn boundary(&self) -> String {
        let state = self.lock();
        self.boundary_of(&state)
    }

    fn set_garbage_collection(&mut self, enabled: bool) {
        self.lock().garbage_collection = enabled;
    }
}

impl MockHandle {
    fn boundary_of(&self, state: &HandleState) -> String {
        format!("mockboundary{}", state.index)
    }
}

/// Mock implementation of the HandleFactory trait.
///
/// Records every handle it creates.
///
/// # Example
///
/// ```rust,ignore
/// use vidkit_core::testing::MockHandleFactory;
///
/// let factory = MockHandleFactory::new()
///     .with_buffer("[mp4 @ 0x1] moov atom not found\n")
///     .with_exit_code(1);
/// let mut process = FfmpegProcess::with_factory("ffmpeg", Arc::new(factory.clone()));
/// process.add_input("in.mp4").set_output_path("out.mp4");
/// process.execute()?;
///
/// assert!(process.has_error(false)?);
/// assert_eq!(factory.created_count(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockHandleFactory {
    preset: Arc<Mutex<Preset>>,
    created: Arc<Mutex<Vec<MockHandle>>>,
}

impl MockHandleFactory {
    /// Create a new mock factory.
    pub fn new() -> Self {
        Self::default()
    }

    fn preset(&self) -> MutexGuard<'_, Preset> {
        self.preset.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn created(&self) -> MutexGuard<'_, Vec<MockHandle>> {
        self.created.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Output every created handle reports.
    pub fn with_buffer(self, buffer: impl Into<String>) -> Self {
        self.preset().buffer = buffer.into();
        self
    }

    /// Exit code every created handle reports on completion.
    pub fn with_exit_code(self, exit_code: i32) -> Self {
        self.preset().exit_code = exit_code;
        self
    }

    /// Run time reported once started.
    pub fn with_run_time(self, run_time: Duration) -> Self {
        self.preset().run_time = run_time;
        self
    }

    /// Non-blocking runs complete as soon as they start.
    pub fn completing_immediately(self) -> Self {
        self.preset().complete_on_start = true;
        self
    }

    /// Declares `operation` unsupported on every created handle.
    pub fn without_operation(self, operation: Operation) -> Self {
        self.preset().unsupported.insert(operation);
        self
    }

    /// Number of handles created so far.
    pub fn created_count(&self) -> usize {
        self.created().len()
    }

    /// Every handle created so far, in creation order.
    pub fn handles(&self) -> Vec<MockHandle> {
        self.created().clone()
    }

    /// The most recently created handle.
    pub fn last_handle(&self) -> Option<MockHandle> {
        self.created().last().cloned()
    }
}

impl HandleFactory for MockHandleFactory {
    fn create(&self, command: String) -> Result<Box<dyn ExecutionHandle>, ProcessError> {
        let preset = self.preset().clone();
        let mut created = self.created();
        let handle = MockHandle::new(created.len(), command, preset);
        created.push(handle.clone());
        Ok(Box::new(handle))
    }
}
