use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::options::{parse_scoped_command, parse_unscoped_command, CommandSpec};

#[derive(Parser, Debug)]
#[command(name = "vidkit")]
#[command(author, version, about = "Assemble, run and track ffmpeg invocations")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = "VIDKIT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print Prometheus metrics to stderr before exiting
    #[arg(long, global = true)]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run ffmpeg and wait for it to finish
    Run {
        #[command(flatten)]
        invocation: InvocationArgs,

        /// Keep output files when ffmpeg reports an error
        #[arg(long)]
        keep_output: bool,
    },

    /// Start ffmpeg in the background and print its portable id
    Start {
        #[command(flatten)]
        invocation: InvocationArgs,
    },

    /// Print the assembled command line without running it
    Command {
        #[command(flatten)]
        invocation: InvocationArgs,
    },

    /// Show the state of a background run
    Status {
        /// Portable id printed by `start`
        portable_id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Remove the captured output once the run has completed
        #[arg(long)]
        discard: bool,
    },

    /// Show diagnostics reported by a background run
    Messages {
        /// Portable id printed by `start`
        portable_id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Inputs, outputs and options of one ffmpeg invocation.
#[derive(Args, Debug, Clone, Default)]
pub struct InvocationArgs {
    /// Input path, in order (repeatable)
    #[arg(short = 'i', long = "input", value_name = "PATH", required = true)]
    pub inputs: Vec<String>,

    /// Option placed before the inputs
    #[arg(
        long = "pre",
        value_name = "NAME[=VALUE]",
        value_parser = parse_unscoped_command,
        allow_hyphen_values = true
    )]
    pub pre: Vec<CommandSpec>,

    /// Option for an output, the first one unless INDEX is given
    #[arg(
        short = 'o',
        long = "opt",
        value_name = "[INDEX/]NAME[=VALUE]",
        value_parser = parse_scoped_command,
        allow_hyphen_values = true
    )]
    pub opts: Vec<CommandSpec>,

    /// Token repeated before every output path
    #[arg(short = 'g', long = "global", value_name = "TOKEN", allow_hyphen_values = true)]
    pub globals: Vec<String>,

    /// Option placed after every output
    #[arg(
        long = "post",
        value_name = "NAME[=VALUE]",
        value_parser = parse_unscoped_command,
        allow_hyphen_values = true
    )]
    pub post: Vec<CommandSpec>,

    /// Output paths, one per output index
    #[arg(value_name = "OUTPUT")]
    pub outputs: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use vidkit_core::process::CommandArgument;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_invocation() {
        let cli = Cli::try_parse_from([
            "vidkit", "run", "-i", "in.mkv", "--pre", "-re", "--opt", "-c:v=libx264",
            "--opt", "1/-vn", "-g", "-map_metadata", "-g", "0", "video.mp4", "audio.m4a",
            "--keep-output",
        ])
        .unwrap();

        let Commands::Run {
            invocation,
            keep_output,
        } = cli.command
        else {
            panic!("expected run");
        };
        assert!(keep_output);
        assert_eq!(invocation.inputs, vec!["in.mkv"]);
        assert_eq!(invocation.pre[0].name, "-re");
        assert_eq!(invocation.opts[0].argument, CommandArgument::value("libx264"));
        assert_eq!(invocation.opts[1].index, Some(1));
        assert_eq!(invocation.globals, vec!["-map_metadata", "0"]);
        assert_eq!(invocation.outputs, vec!["video.mp4", "audio.m4a"]);
    }

    #[test]
    fn test_run_requires_input() {
        assert!(Cli::try_parse_from(["vidkit", "run", "out.mp4"]).is_err());
    }

    #[test]
    fn test_parse_status_with_global_flags() {
        let cli = Cli::try_parse_from([
            "vidkit", "status", "abc.def.1700000000", "--json", "--metrics", "-c", "x.toml",
        ])
        .unwrap();
        assert!(cli.metrics);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(cli.command, Commands::Status { json: true, discard: false, .. }));
    }
}
