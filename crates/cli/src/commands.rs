//! Subcommand implementations.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::fs;
use tracing::{info, warn};

use vidkit_core::{Config, FfmpegProcess, Messages, PortableId};

use crate::cli::InvocationArgs;

/// Exit code used when the tool failed without reporting one.
const UNKNOWN_FAILURE: i32 = 1;

/// Builds the ffmpeg invocation described by `args`.
///
/// Options without an index apply to the first output. Repeated options are
/// all kept, in the order given.
pub fn assemble(config: &Config, args: &InvocationArgs) -> Result<FfmpegProcess> {
    let mut process = FfmpegProcess::from_config(&config.ffmpeg);
    let last_output = args.outputs.len().saturating_sub(1);

    for spec in &args.pre {
        process.add_pre_input_command(&spec.name, spec.argument.clone(), true);
    }
    for input in &args.inputs {
        process.add_input(input.as_str());
    }
    for token in &args.globals {
        process.add_global_argument(token.as_str());
    }
    for (index, output) in args.outputs.iter().enumerate() {
        process.set_output_index(index).set_output_path(output.as_str());
    }
    for spec in &args.opts {
        let index = spec.index.unwrap_or(0);
        if index > last_output {
            bail!(
                "Option {} targets output {} but only {} output(s) were given",
                spec.name,
                index,
                args.outputs.len()
            );
        }
        process
            .set_output_index(index)
            .add_command(&spec.name, spec.argument.clone(), true);
    }
    for spec in &args.post {
        process.add_post_output_command(&spec.name, spec.argument.clone(), true);
    }

    process.set_output_index(last_output);
    Ok(process)
}

/// `vidkit command`
pub fn print_command(config: &Config, args: &InvocationArgs) -> Result<i32> {
    let mut process = assemble(config, args)?;
    println!("{}", process.command_string());
    Ok(0)
}

/// `vidkit run`
pub fn run(config: &Config, args: &InvocationArgs, keep_output: bool) -> Result<i32> {
    let mut process = assemble(config, args)?;
    info!(command = %process.command_string(), "Running ffmpeg");
    process.execute().context("Failed to run ffmpeg")?;

    if !process.has_error(!keep_output)? {
        if let Some(run_time) = process.run_time()? {
            info!("Finished in {:.2}s", run_time.as_secs_f64());
        }
        return Ok(0);
    }

    let code = process.error_code()?.unwrap_or(UNKNOWN_FAILURE);
    if let Some(line) = process.last_line()? {
        eprintln!("ffmpeg failed with exit code {}: {}", code, line);
    } else {
        eprintln!("ffmpeg failed with exit code {}", code);
    }
    print_messages(&process.messages()?);
    Ok(code)
}

/// `vidkit start`
pub fn start(config: &Config, args: &InvocationArgs) -> Result<i32> {
    let mut process = assemble(config, args)?;
    process.start().context("Failed to start ffmpeg")?;
    let id = process.portable_id()?;
    println!("{}", id);
    Ok(0)
}

#[derive(Debug, Serialize)]
struct StatusReport {
    portable_id: String,
    completed: bool,
    has_error: bool,
    exit_code: Option<i32>,
    run_time_secs: Option<f64>,
    last_line: Option<String>,
}

fn resume(config: &Config, portable_id: &str) -> Result<FfmpegProcess> {
    let id: PortableId = portable_id.parse()?;
    FfmpegProcess::resume(&id, &config.ffmpeg)
        .with_context(|| format!("Failed to resume {}", portable_id))
}

/// `vidkit status`
pub fn status(config: &Config, portable_id: &str, json: bool, discard: bool) -> Result<i32> {
    let process = resume(config, portable_id)?;
    let report = StatusReport {
        portable_id: portable_id.to_string(),
        completed: process.is_completed()?,
        has_error: process.has_error(false)?,
        exit_code: process.error_code()?,
        run_time_secs: process.run_time()?.map(|d| d.as_secs_f64()),
        last_line: process.last_split()?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let state = match (report.completed, report.has_error) {
            (false, _) => "running",
            (true, false) => "completed",
            (true, true) => "failed",
        };
        println!("State:     {}", state);
        if let Some(code) = report.exit_code {
            println!("Exit code: {}", code);
        }
        if let Some(secs) = report.run_time_secs {
            println!("Run time:  {:.1}s", secs);
        }
        if let Some(line) = &report.last_line {
            println!("Last line: {}", line.trim());
        }
    }

    if discard {
        if report.completed {
            if let Some(storage) = process.buffer_output()? {
                fs::remove_file(&storage)
                    .with_context(|| format!("Failed to remove {}", storage.display()))?;
                info!(storage = %storage.display(), "Discarded captured output");
            }
        } else {
            warn!("Run is still in progress; captured output kept");
        }
    }

    Ok(0)
}

/// `vidkit messages`
pub fn messages(config: &Config, portable_id: &str, json: bool) -> Result<i32> {
    let process = resume(config, portable_id)?;
    let messages = process.messages()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
    } else {
        print_messages(&messages);
    }
    Ok(0)
}

fn print_messages(messages: &Messages) {
    for (tag, address, lines) in messages.iter() {
        for line in lines {
            println!("[{} @ {}] {}", tag, address, line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{parse_scoped_command, parse_unscoped_command};

    fn invocation(inputs: &[&str], opts: &[&str], outputs: &[&str]) -> InvocationArgs {
        InvocationArgs {
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            opts: opts.iter().map(|s| parse_scoped_command(s).unwrap()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn bare_config() -> Config {
        let mut config = Config::default();
        config.ffmpeg.overwrite = false;
        config.ffmpeg.hide_banner = false;
        config
    }

    #[test]
    fn test_assemble_scopes_options_per_output() {
        let args = invocation(
            &["in.mkv"],
            &["-c:v=libx264", "1/-vn", "-map=0:v", "-map=0:a"],
            &["video.mp4", "audio.m4a"],
        );
        let mut process = assemble(&bare_config(), &args).unwrap();
        assert_eq!(
            process.arguments(),
            [
                "-i", "in.mkv", "-c:v", "libx264", "-map", "0:v", "-map", "0:a", "video.mp4",
                "-vn", "audio.m4a",
            ]
        );
    }

    #[test]
    fn test_assemble_pre_post_and_globals() {
        let mut args = invocation(&["a.mp4", "b.mp4"], &[], &["out.mkv"]);
        args.pre = vec![parse_unscoped_command("-re").unwrap()];
        args.post = vec![parse_unscoped_command("-f=matroska").unwrap()];
        args.globals = vec!["-shortest".to_string()];

        let mut process = assemble(&Config::default(), &args).unwrap();
        assert_eq!(
            process.arguments(),
            [
                "-hide_banner", "-y", "-re", "-i", "a.mp4", "-i", "b.mp4", "-shortest",
                "out.mkv", "-f", "matroska",
            ]
        );
    }

    #[test]
    fn test_assemble_rejects_option_for_missing_output() {
        let args = invocation(&["in.mkv"], &["3/-an"], &["only.mp4"]);
        let err = assemble(&bare_config(), &args).unwrap_err();
        assert!(err.to_string().contains("targets output 3"));
    }
}
