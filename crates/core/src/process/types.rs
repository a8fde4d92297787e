//! Types for the process module.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Value carried by a single command-line option.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandArgument {
    /// The option is emitted on its own, with no value token.
    #[default]
    Flag,
    /// The option is followed by exactly one value token.
    Value(String),
}

impl CommandArgument {
    /// Creates a value argument.
    pub fn value(value: impl Into<String>) -> Self {
        Self::Value(value.into())
    }

    /// Returns the value token, if any.
    pub fn as_value(&self) -> Option<&str> {
        match self {
            Self::Flag => None,
            Self::Value(v) => Some(v),
        }
    }

    /// Whether this is a flag-only argument.
    pub fn is_flag(&self) -> bool {
        matches!(self, Self::Flag)
    }
}

impl From<&str> for CommandArgument {
    fn from(value: &str) -> Self {
        Self::Value(value.to_string())
    }
}

impl From<String> for CommandArgument {
    fn from(value: String) -> Self {
        Self::Value(value)
    }
}

impl From<Option<String>> for CommandArgument {
    fn from(value: Option<String>) -> Self {
        value.map_or(Self::Flag, Self::Value)
    }
}

/// A named command and every argument recorded for it.
///
/// A command holds more than one argument only when it was added with
/// repetition allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEntry {
    name: String,
    arguments: Vec<CommandArgument>,
}

impl CommandEntry {
    /// The option name, including any leading dash.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Arguments in insertion order.
    pub fn arguments(&self) -> &[CommandArgument] {
        &self.arguments
    }
}

/// Outcome of [`CommandSet::insert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insertion {
    /// The name was not present before.
    Added,
    /// The name was present and the argument was appended after the existing ones.
    Repeated,
    /// The name was present and its previous arguments were discarded.
    Replaced { previous: Vec<CommandArgument> },
}

/// Ordered set of commands that share one scope.
///
/// Names are unique. Iteration follows the order in which each name was first
/// inserted, so overwriting a command keeps its original position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSet {
    entries: Vec<CommandEntry>,
}

impl CommandSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `argument` under `name`.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        argument: CommandArgument,
        allow_repetition: bool,
    ) -> Insertion {
        let name = name.into();
        match self.entries.iter_mut().find(|e| e.name == name) {
            None => {
                self.entries.push(CommandEntry {
                    name,
                    arguments: vec![argument],
                });
                Insertion::Added
            }
            Some(entry) if allow_repetition => {
                entry.arguments.push(argument);
                Insertion::Repeated
            }
            Some(entry) => {
                let previous = std::mem::replace(&mut entry.arguments, vec![argument]);
                Insertion::Replaced { previous }
            }
        }
    }

    /// Arguments recorded for `name`.
    pub fn get(&self, name: &str) -> Option<&[CommandArgument]> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(CommandEntry::arguments)
    }

    /// Whether `name` has been recorded.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of distinct command names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set holds no commands.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &CommandEntry> {
        self.entries.iter()
    }

    /// Flattens the set into argument tokens.
    ///
    /// Each argument emits the name, followed by its value unless it is a flag.
    pub fn to_tokens(&self) -> Vec<String> {
        let mut tokens = Vec::new();
        for entry in &self.entries {
            for argument in &entry.arguments {
                tokens.push(entry.name.clone());
                if let CommandArgument::Value(value) = argument {
                    tokens.push(value.clone());
                }
            }
        }
        tokens
    }
}

/// Where [`set_input_path`](super::FfmpegProcess::set_input_path) places a path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InputPosition {
    /// After every existing input.
    #[default]
    Append,
    /// Before every existing input; positions are renumbered from zero without gaps.
    Prepend,
    /// At an explicit position, replacing whatever was there.
    At(usize),
}

/// An operation the proxy forwards to its execution handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    SetBlocking,
    Execute,
    RunTime,
    Command,
    ExecutedCommand,
    Buffer,
    RawBuffer,
    LastLine,
    LastSplit,
    ErrorCode,
    HasError,
    IsCompleted,
    BufferOutput,
    Boundary,
    Blocking,
    SetGarbageCollection,
}

impl Operation {
    /// Every operation, in declaration order.
    pub const ALL: [Operation; 16] = [
        Self::SetBlocking,
        Self::Execute,
        Self::RunTime,
        Self::Command,
        Self::ExecutedCommand,
        Self::Buffer,
        Self::RawBuffer,
        Self::LastLine,
        Self::LastSplit,
        Self::ErrorCode,
        Self::HasError,
        Self::IsCompleted,
        Self::BufferOutput,
        Self::Boundary,
        Self::Blocking,
        Self::SetGarbageCollection,
    ];

    /// Stable snake_case name used in errors and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetBlocking => "set_blocking",
            Self::Execute => "execute",
            Self::RunTime => "run_time",
            Self::Command => "command",
            Self::ExecutedCommand => "executed_command",
            Self::Buffer => "buffer",
            Self::RawBuffer => "raw_buffer",
            Self::LastLine => "last_line",
            Self::LastSplit => "last_split",
            Self::ErrorCode => "error_code",
            Self::HasError => "has_error",
            Self::IsCompleted => "is_completed",
            Self::BufferOutput => "buffer_output",
            Self::Boundary => "boundary",
            Self::Blocking => "blocking",
            Self::SetGarbageCollection => "set_garbage_collection",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_emits_name_only() {
        let mut set = CommandSet::new();
        set.insert("-y", CommandArgument::Flag, false);
        assert_eq!(set.to_tokens(), vec!["-y"]);
    }

    #[test]
    fn test_overwrite_keeps_first_position() {
        let mut set = CommandSet::new();
        set.insert("-c:v", "libx264".into(), false);
        set.insert("-c:a", "aac".into(), false);
        let outcome = set.insert("-c:v", "libx265".into(), false);

        assert_eq!(
            outcome,
            Insertion::Replaced {
                previous: vec![CommandArgument::value("libx264")]
            }
        );
        assert_eq!(set.to_tokens(), vec!["-c:v", "libx265", "-c:a", "aac"]);

        let entries: Vec<(&str, usize)> = set
            .iter()
            .map(|e| (e.name(), e.arguments().len()))
            .collect();
        assert_eq!(entries, vec![("-c:v", 1), ("-c:a", 1)]);
    }

    #[test]
    fn test_repetition_keeps_insertion_order() {
        let mut set = CommandSet::new();
        assert_eq!(set.insert("-map", "0:v".into(), true), Insertion::Added);
        assert_eq!(set.insert("-map", "1:a".into(), true), Insertion::Repeated);

        assert_eq!(set.len(), 1);
        assert_eq!(set.to_tokens(), vec!["-map", "0:v", "-map", "1:a"]);
    }

    #[test]
    fn test_non_repeating_insert_collapses_repeated_entry() {
        let mut set = CommandSet::new();
        set.insert("-map", "0:v".into(), true);
        set.insert("-map", "1:a".into(), true);
        set.insert("-map", "2:s".into(), false);

        assert_eq!(set.get("-map"), Some(&[CommandArgument::value("2:s")][..]));
    }

    #[test]
    fn test_get_absent_name() {
        let set = CommandSet::new();
        assert!(set.get("-vf").is_none());
        assert!(!set.contains("-vf"));
        assert!(set.is_empty());
    }

    #[test]
    fn test_argument_conversions() {
        assert_eq!(CommandArgument::from("23"), CommandArgument::value("23"));
        assert_eq!(CommandArgument::from(None), CommandArgument::Flag);
        assert_eq!(CommandArgument::value("x").as_value(), Some("x"));
        assert!(CommandArgument::Flag.is_flag());
    }

    #[test]
    fn test_operation_names_are_unique() {
        let mut names: Vec<_> = Operation::ALL.iter().map(Operation::name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Operation::ALL.len());
    }
}
