//! FFmpeg command assembly and execution proxy.

use chrono::Utc;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::builder::ProcessBuilder;
use super::config::ProcessConfig;
use super::error::ProcessError;
use super::exec_buffer::{ExecBuffer, ExecBufferFactory};
use super::messages::{parse_messages, Messages};
use super::portable::PortableId;
use super::traits::{ExecutionHandle, HandleFactory};
use super::types::{CommandArgument, CommandSet, InputPosition, Insertion, Operation};
use crate::metrics::{COMMANDS_COMBINED, OUTPUTS_REMOVED};

/// Token introducing each input path.
pub const INPUT_MARKER: &str = "-i";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CombineState {
    NotBuilt,
    Built,
}

/// A multi-input, multi-output ffmpeg invocation.
///
/// Inputs, outputs and commands are configured first. The first call that
/// needs the final command line ([`combine`](Self::combine),
/// [`command_string`](Self::command_string),
/// [`execution_handle`](Self::execution_handle), [`execute`](Self::execute))
/// freezes that configuration into one token sequence:
///
/// 1. pre-input commands
/// 2. `-i <path>` for every input
/// 3. for each output index from 0 through the current one: that index's
///    commands, then the global arguments, then the output path
/// 4. post-output commands
///
/// Global arguments are whatever was added with
/// [`add_global_argument`](Self::add_global_argument) and are repeated in
/// every output block.
///
/// # Example
///
/// ```no_run
/// use vidkit_core::process::{CommandArgument, FfmpegProcess};
///
/// # fn example() -> Result<(), vidkit_core::process::ProcessError> {
/// let mut process = FfmpegProcess::new("ffmpeg");
/// process
///     .add_input("in.mkv")
///     .add_command("-c:v", "libx264".into(), false)
///     .set_output_path("out.mp4")
///     .set_output_index(1)
///     .add_command("-vn", CommandArgument::Flag, false)
///     .set_output_path("audio.m4a");
///
/// process.execute()?;
/// if process.has_error(true)? {
///     eprintln!("{:?}", process.last_line()?);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FfmpegProcess {
    id: Uuid,
    builder: ProcessBuilder,
    factory: Arc<dyn HandleFactory>,
    pre_input_commands: CommandSet,
    inputs: BTreeMap<usize, String>,
    output_index: usize,
    post_input_commands: BTreeMap<usize, CommandSet>,
    outputs: BTreeMap<usize, String>,
    post_output_commands: CommandSet,
    state: CombineState,
    handle: Option<Box<dyn ExecutionHandle>>,
}

impl FfmpegProcess {
    /// Creates a process for `program` storing output in the default temp directory.
    pub fn new(program: impl Into<String>) -> Self {
        let config = ProcessConfig::default();
        Self::with_factory(program, Arc::new(ExecBufferFactory::new(config.temp_dir)))
    }

    /// Creates a process whose execution handle comes from `factory`.
    pub fn with_factory(program: impl Into<String>, factory: Arc<dyn HandleFactory>) -> Self {
        Self {
            id: Uuid::new_v4(),
            builder: ProcessBuilder::new(program),
            factory,
            pre_input_commands: CommandSet::new(),
            inputs: BTreeMap::new(),
            output_index: 0,
            post_input_commands: BTreeMap::new(),
            outputs: BTreeMap::new(),
            post_output_commands: CommandSet::new(),
            state: CombineState::NotBuilt,
            handle: None,
        }
    }

    /// Creates a process from configuration.
    ///
    /// Configured defaults (`-hide_banner`, `-y`, `-loglevel`) become
    /// pre-input commands.
    pub fn from_config(config: &ProcessConfig) -> Self {
        let factory = Arc::new(ExecBufferFactory::new(config.temp_dir.clone()));
        let mut process = Self::with_factory(config.program(), factory);
        if config.hide_banner {
            process.add_pre_input_command("-hide_banner", CommandArgument::Flag, false);
        }
        if config.overwrite {
            process.add_pre_input_command("-y", CommandArgument::Flag, false);
        }
        if let Some(level) = &config.log_level {
            process.add_pre_input_command("-loglevel", level.as_str().into(), false);
        }
        process
    }

    /// Re-attaches to a non-blocking process started by another invocation.
    ///
    /// The returned process has no command configuration of its own; only the
    /// status and diagnostic queries are meaningful.
    pub fn resume(id: &PortableId, config: &ProcessConfig) -> Result<Self, ProcessError> {
        let buffer = ExecBuffer::attach(id, &config.temp_dir)?;
        let factory = Arc::new(ExecBufferFactory::new(config.temp_dir.clone()));
        let mut process = Self::with_factory(config.program(), factory);
        process.state = CombineState::Built;
        process.handle = Some(Box::new(buffer));
        info!(portable_id = %id, "Resumed process");
        Ok(process)
    }

    /// Identity used in diagnostics.
    pub fn identity(&self) -> String {
        format!("{} [{}]", self.builder.program(), self.id)
    }

    /// Whether the command line has been frozen.
    pub fn is_combined(&self) -> bool {
        self.state == CombineState::Built
    }

    fn warn_if_frozen(&self, what: &str) {
        if self.is_combined() {
            warn!(
                process = %self.identity(),
                "{} changed after the command was built; the change is ignored",
                what
            );
        }
    }

    // ---- Inputs and outputs ----

    /// Selects the output scope that subsequent output calls configure.
    pub fn set_output_index(&mut self, index: usize) -> &mut Self {
        self.output_index = index;
        self
    }

    /// The currently selected output scope.
    pub fn output_index(&self) -> usize {
        self.output_index
    }

    /// Places an input path.
    pub fn set_input_path(&mut self, path: impl Into<String>, position: InputPosition) -> &mut Self {
        self.warn_if_frozen("Input");
        let path = path.into();
        match position {
            InputPosition::Append => {
                let next = self.inputs.keys().next_back().map_or(0, |last| last + 1);
                self.inputs.insert(next, path);
            }
            InputPosition::Prepend => {
                let existing = std::mem::take(&mut self.inputs).into_values();
                self.inputs = std::iter::once(path).chain(existing).enumerate().collect();
            }
            InputPosition::At(index) => {
                self.inputs.insert(index, path);
            }
        }
        self
    }

    /// Appends an input path.
    pub fn add_input(&mut self, path: impl Into<String>) -> &mut Self {
        self.set_input_path(path, InputPosition::Append)
    }

    /// The input at `index`.
    pub fn input_path(&self, index: usize) -> Result<&str, ProcessError> {
        self.inputs
            .get(&index)
            .map(String::as_str)
            .ok_or(ProcessError::InputNotFound { index })
    }

    /// Every input keyed by position.
    pub fn all_inputs(&self) -> &BTreeMap<usize, String> {
        &self.inputs
    }

    /// Every output keyed by output index.
    pub fn all_outputs(&self) -> &BTreeMap<usize, String> {
        &self.outputs
    }

    /// Sets the output path of the current output scope.
    pub fn set_output_path(&mut self, path: impl Into<String>) -> &mut Self {
        self.warn_if_frozen("Output");
        self.outputs.insert(self.output_index, path.into());
        self
    }

    /// The output path at `index`, or at the current scope when `None`.
    pub fn output_path(&self, index: Option<usize>) -> Option<&str> {
        let index = index.unwrap_or(self.output_index);
        self.outputs.get(&index).map(String::as_str)
    }

    /// Number of registered output paths.
    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    // ---- Commands ----

    /// Adds a command emitted before the inputs.
    pub fn add_pre_input_command(
        &mut self,
        name: impl Into<String>,
        argument: CommandArgument,
        allow_repetition: bool,
    ) -> &mut Self {
        self.warn_if_frozen("Pre-input command");
        let name = name.into();
        let outcome = self
            .pre_input_commands
            .insert(name.clone(), argument.clone(), allow_repetition);
        self.note_insertion("pre-input", &name, &argument, outcome);
        self
    }

    /// Adds a command to the current output scope.
    pub fn add_command(
        &mut self,
        name: impl Into<String>,
        argument: CommandArgument,
        allow_repetition: bool,
    ) -> &mut Self {
        self.warn_if_frozen("Output command");
        let name = name.into();
        let outcome = self
            .post_input_commands
            .entry(self.output_index)
            .or_default()
            .insert(name.clone(), argument.clone(), allow_repetition);
        let scope = format!("output {}", self.output_index);
        self.note_insertion(&scope, &name, &argument, outcome);
        self
    }

    /// Adds a command emitted after every output.
    pub fn add_post_output_command(
        &mut self,
        name: impl Into<String>,
        argument: CommandArgument,
        allow_repetition: bool,
    ) -> &mut Self {
        self.warn_if_frozen("Post-output command");
        let name = name.into();
        let outcome = self
            .post_output_commands
            .insert(name.clone(), argument.clone(), allow_repetition);
        self.note_insertion("post-output", &name, &argument, outcome);
        self
    }

    /// Adds a raw token repeated in every output block.
    pub fn add_global_argument(&mut self, token: impl Into<String>) -> &mut Self {
        self.warn_if_frozen("Global argument");
        self.builder.add(token);
        self
    }

    fn note_insertion(
        &self,
        scope: &str,
        name: &str,
        argument: &CommandArgument,
        outcome: Insertion,
    ) {
        let Insertion::Replaced { previous } = outcome else {
            return;
        };
        if previous.as_slice() != std::slice::from_ref(argument) {
            warn!(
                process = %self.identity(),
                scope,
                command = name,
                ?previous,
                "Command overwritten; pass allow_repetition to keep both"
            );
        }
    }

    /// Whether `name` is a pre-input command.
    pub fn has_pre_input_command(&self, name: &str) -> bool {
        self.pre_input_commands.contains(name)
    }

    /// Arguments of pre-input command `name`.
    pub fn pre_input_command(&self, name: &str) -> Option<&[CommandArgument]> {
        self.pre_input_commands.get(name)
    }

    /// Whether `name` is set for output `index` (current scope when `None`).
    pub fn has_command(&self, name: &str, index: Option<usize>) -> bool {
        self.command(name, index).is_some()
    }

    /// Arguments of command `name` for output `index` (current scope when `None`).
    pub fn command(&self, name: &str, index: Option<usize>) -> Option<&[CommandArgument]> {
        let index = index.unwrap_or(self.output_index);
        self.post_input_commands.get(&index)?.get(name)
    }

    /// Whether `name` is a post-output command.
    pub fn has_post_output_command(&self, name: &str) -> bool {
        self.post_output_commands.contains(name)
    }

    /// Arguments of post-output command `name`.
    pub fn post_output_command(&self, name: &str) -> Option<&[CommandArgument]> {
        self.post_output_commands.get(name)
    }

    // ---- Combination ----

    /// Freezes the configuration into the final token sequence.
    ///
    /// Only the first call does any work.
    pub fn combine(&mut self) {
        if self.state == CombineState::Built {
            return;
        }
        self.state = CombineState::Built;

        let globals = self.builder.take_arguments();
        self.builder.add_commands(&self.pre_input_commands);
        for path in self.inputs.values() {
            self.builder.add(INPUT_MARKER).add(path.as_str());
        }
        for index in 0..=self.output_index {
            if let Some(commands) = self.post_input_commands.get(&index) {
                self.builder.add_commands(commands);
            }
            self.builder.add_all(globals.iter().cloned());
            if let Some(path) = self.outputs.get(&index).filter(|p| !p.is_empty()) {
                self.builder.add(path.as_str());
            }
        }
        self.builder.add_commands(&self.post_output_commands);

        COMMANDS_COMBINED.inc();
        debug!(
            process = %self.identity(),
            tokens = self.builder.arguments().len(),
            "Combined command"
        );
    }

    /// The final argument tokens, program excluded.
    pub fn arguments(&mut self) -> &[String] {
        self.combine();
        self.builder.arguments()
    }

    /// The final command rendered for a POSIX shell.
    pub fn command_string(&mut self) -> String {
        self.combine();
        self.builder.command_string()
    }

    // ---- Execution ----

    /// The execution handle, created on first use.
    pub fn execution_handle(&mut self) -> Result<&mut dyn ExecutionHandle, ProcessError> {
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => {
                self.combine();
                let handle = self.builder.build_handle(self.factory.as_ref())?;
                debug!(
                    process = %self.identity(),
                    handle = %handle.identity(),
                    "Created execution handle"
                );
                handle
            }
        };
        Ok(self.handle.insert(handle).as_mut())
    }

    /// Runs the command and waits for it to exit.
    ///
    /// A failing tool is not an error; check [`has_error`](Self::has_error).
    pub fn execute(&mut self) -> Result<&mut Self, ProcessError> {
        self.run(true)?;
        Ok(self)
    }

    /// Starts the command without waiting for it.
    pub fn start(&mut self) -> Result<&mut Self, ProcessError> {
        self.run(false)?;
        Ok(self)
    }

    fn run(&mut self, blocking: bool) -> Result<(), ProcessError> {
        let process = self.identity();
        let handle = self.execution_handle()?;
        require(&*handle, Operation::SetBlocking, &process)?;
        require(&*handle, Operation::Execute, &process)?;
        handle.set_blocking(blocking);
        handle.execute()
    }

    fn delegate<T>(
        &self,
        operation: Operation,
        query: impl FnOnce(&dyn ExecutionHandle) -> T,
    ) -> Result<Option<T>, ProcessError> {
        let Some(handle) = self.handle.as_deref() else {
            return Ok(None);
        };
        require(handle, operation, &self.identity())?;
        Ok(Some(query(handle)))
    }

    /// Time the process has been running.
    pub fn run_time(&self) -> Result<Option<Duration>, ProcessError> {
        Ok(self.delegate(Operation::RunTime, |h| h.run_time())?.flatten())
    }

    /// The command as handed to the handle, or with `raw` the full shell command.
    pub fn executed_command(&self, raw: bool) -> Result<Option<String>, ProcessError> {
        if raw {
            self.delegate(Operation::ExecutedCommand, |h| h.executed_command())
        } else {
            self.delegate(Operation::Command, |h| h.command())
        }
    }

    /// Captured output, or with `raw` the storage content as written.
    pub fn buffer(&self, raw: bool) -> Result<Option<String>, ProcessError> {
        if raw {
            self.delegate(Operation::RawBuffer, |h| h.raw_buffer())
        } else {
            self.delegate(Operation::Buffer, |h| h.buffer())
        }
    }

    /// Last non-empty output line.
    pub fn last_line(&self) -> Result<Option<String>, ProcessError> {
        Ok(self.delegate(Operation::LastLine, |h| h.last_line())?.flatten())
    }

    /// Last non-empty output segment, split on `\r` as well as `\n`.
    pub fn last_split(&self) -> Result<Option<String>, ProcessError> {
        Ok(self.delegate(Operation::LastSplit, |h| h.last_split())?.flatten())
    }

    /// Exit code of the tool, once it has completed.
    pub fn error_code(&self) -> Result<Option<i32>, ProcessError> {
        Ok(self.delegate(Operation::ErrorCode, |h| h.error_code())?.flatten())
    }

    /// Whether the tool has completed. `false` before the process is started.
    pub fn is_completed(&self) -> Result<bool, ProcessError> {
        Ok(self
            .delegate(Operation::IsCompleted, |h| h.is_completed())?
            .unwrap_or(false))
    }

    /// Location of the handle's output storage.
    pub fn buffer_output(&self) -> Result<Option<PathBuf>, ProcessError> {
        self.delegate(Operation::BufferOutput, |h| h.buffer_output())
    }

    /// Whether the tool reported an error.
    ///
    /// With `delete_output_on_error`, every registered output that exists as a
    /// file is removed when an error is reported. Removal is best effort:
    /// failures are logged and the remaining outputs are still attempted.
    pub fn has_error(&self, delete_output_on_error: bool) -> Result<bool, ProcessError> {
        let has_error = self
            .delegate(Operation::HasError, |h| h.has_error())?
            .unwrap_or(false);

        if has_error && delete_output_on_error {
            self.remove_outputs();
        }
        Ok(has_error)
    }

    fn remove_outputs(&self) {
        for output in self.outputs.values() {
            let path = Path::new(output);
            if output.is_empty() || !path.is_file() {
                continue;
            }
            match fs::remove_file(path) {
                Ok(()) => {
                    OUTPUTS_REMOVED.inc();
                    info!(process = %self.identity(), output = %path.display(), "Removed output after error");
                }
                Err(e) => warn!(
                    process = %self.identity(),
                    output = %path.display(),
                    "Failed to remove output after error: {}", e
                ),
            }
        }
    }

    /// Diagnostics of the form `[tag @ address] text` found in the output.
    pub fn messages(&self) -> Result<Messages, ProcessError> {
        Ok(self
            .buffer(false)?
            .map(|buffer| parse_messages(&buffer))
            .unwrap_or_default())
    }

    /// Issues an id that lets a later invocation re-attach to this process.
    ///
    /// Only non-blocking handles can be resumed. On success the handle stops
    /// removing its storage when dropped; whoever holds the id owns the cleanup.
    pub fn portable_id(&mut self) -> Result<PortableId, ProcessError> {
        let process = self.identity();
        let Some(handle) = self.handle.as_deref_mut() else {
            return Err(ProcessError::NotStarted {
                operation: "portable_id",
                process,
            });
        };

        require(handle, Operation::Blocking, &process)?;
        if handle.blocking() {
            return Err(ProcessError::PortableIdWhileBlocking {
                process,
                handle: handle.identity(),
            });
        }

        require(handle, Operation::SetGarbageCollection, &process)?;
        require(handle, Operation::BufferOutput, &process)?;
        require(handle, Operation::Boundary, &process)?;
        handle.set_garbage_collection(false);

        let id = PortableId::new(&handle.buffer_output(), &handle.boundary(), Utc::now())?;
        info!(process = %process, portable_id = %id, "Issued portable id");
        Ok(id)
    }
}

fn require(
    handle: &dyn ExecutionHandle,
    operation: Operation,
    process: &str,
) -> Result<(), ProcessError> {
    if handle.supports(operation) {
        Ok(())
    } else {
        Err(ProcessError::UnsupportedOperation {
            operation,
            process: process.to_string(),
            handle: handle.identity(),
        })
    }
}
