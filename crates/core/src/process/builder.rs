//! Generic token storage and command rendering.

use shell_escape::unix::escape;
use std::borrow::Cow;

use super::error::ProcessError;
use super::traits::{ExecutionHandle, HandleFactory};
use super::types::CommandSet;

/// Accumulates the argument tokens of one program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessBuilder {
    program: String,
    arguments: Vec<String>,
}

impl ProcessBuilder {
    /// Creates a builder for `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            arguments: Vec::new(),
        }
    }

    /// The program token.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Appends a single token.
    pub fn add(&mut self, token: impl Into<String>) -> &mut Self {
        self.arguments.push(token.into());
        self
    }

    /// Appends several tokens verbatim.
    pub fn add_all(&mut self, tokens: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.arguments.extend(tokens.into_iter().map(Into::into));
        self
    }

    /// Appends a command set as flattened tokens.
    pub fn add_commands(&mut self, commands: &CommandSet) -> &mut Self {
        self.arguments.extend(commands.to_tokens());
        self
    }

    /// Tokens accumulated so far, program excluded.
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// Removes and returns every accumulated token.
    pub fn take_arguments(&mut self) -> Vec<String> {
        std::mem::take(&mut self.arguments)
    }

    /// Renders the invocation as a single shell-safe string.
    pub fn command_string(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.arguments)
            .map(|token| quote(token))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Builds an execution handle for the rendered command.
    pub fn build_handle(
        &self,
        factory: &dyn HandleFactory,
    ) -> Result<Box<dyn ExecutionHandle>, ProcessError> {
        factory.create(self.command_string())
    }
}

/// Quotes a token for a POSIX shell. Plain tokens are returned unchanged.
pub fn quote(token: &str) -> Cow<'_, str> {
    escape(Cow::Borrowed(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CommandArgument;

    #[test]
    fn test_plain_tokens_are_not_quoted() {
        let mut builder = ProcessBuilder::new("ffmpeg");
        builder.add("-i").add("in.mp4").add("out.mp4");
        assert_eq!(builder.command_string(), "ffmpeg -i in.mp4 out.mp4");
    }

    #[test]
    fn test_tokens_with_shell_metacharacters_are_quoted() {
        let mut builder = ProcessBuilder::new("ffmpeg");
        builder.add("-i").add("my movie.mkv").add("$HOME/out.mp4");
        let rendered = builder.command_string();
        assert!(rendered.contains("'my movie.mkv'"));
        assert!(rendered.contains("'$HOME/out.mp4'"));
    }

    #[test]
    fn test_add_commands_flattens() {
        let mut commands = CommandSet::new();
        commands.insert("-y", CommandArgument::Flag, false);
        commands.insert("-threads", "4".into(), false);

        let mut builder = ProcessBuilder::new("ffmpeg");
        builder.add_commands(&commands);
        assert_eq!(builder.arguments(), ["-y", "-threads", "4"]);
    }

    #[test]
    fn test_take_arguments_empties_builder() {
        let mut builder = ProcessBuilder::new("ffmpeg");
        builder.add_all(["-an", "-sn"]);
        assert_eq!(builder.take_arguments(), vec!["-an", "-sn"]);
        assert!(builder.arguments().is_empty());
    }
}
