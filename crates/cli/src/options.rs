//! Parsing of `[INDEX/]NAME[=VALUE]` command-line option specs.

use vidkit_core::process::CommandArgument;

/// One ffmpeg option given on the vidkit command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Output index the option is scoped to, if any.
    pub index: Option<usize>,
    pub name: String,
    pub argument: CommandArgument,
}

/// Parses `[INDEX/]NAME[=VALUE]`.
///
/// The value is everything after the first `=`, so filter graphs and
/// metadata assignments survive intact.
pub fn parse_scoped_command(spec: &str) -> Result<CommandSpec, String> {
    let (index, rest) = match spec.split_once('/') {
        Some((prefix, rest)) if !prefix.is_empty() && prefix.bytes().all(|b| b.is_ascii_digit()) => {
            let index = prefix
                .parse()
                .map_err(|e| format!("invalid output index '{}': {}", prefix, e))?;
            (Some(index), rest)
        }
        _ => (None, spec),
    };

    let (name, argument) = match rest.split_once('=') {
        Some((name, value)) => (name, CommandArgument::value(value)),
        None => (rest, CommandArgument::Flag),
    };

    if name.is_empty() {
        return Err(format!("missing option name in '{}'", spec));
    }

    Ok(CommandSpec {
        index,
        name: name.to_string(),
        argument,
    })
}

/// Parses `NAME[=VALUE]`, rejecting an output index.
pub fn parse_unscoped_command(spec: &str) -> Result<CommandSpec, String> {
    let parsed = parse_scoped_command(spec)?;
    if parsed.index.is_some() {
        return Err(format!(
            "'{}' is not scoped to an output; drop the index prefix",
            spec
        ));
    }
    Ok(parsed)
}
