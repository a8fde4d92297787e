mod cli;
mod commands;
mod metrics;
mod options;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vidkit_core::{load_config, validate_config, Config, LoggingConfig};

use cli::{Cli, Commands};

/// Config file used when none is given.
const DEFAULT_CONFIG: &str = "vidkit.toml";

fn main() {
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("Fatal error: {:#}", e);
            eprintln!("Error: {:#}", e);
            1
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let config = load(cli.config.as_deref())?;
    init_logging(&config.logging, cli.verbose);
    debug!(?config, "Configuration loaded");

    let code = match &cli.command {
        Commands::Run {
            invocation,
            keep_output,
        } => commands::run(&config, invocation, *keep_output)?,
        Commands::Start { invocation } => commands::start(&config, invocation)?,
        Commands::Command { invocation } => commands::print_command(&config, invocation)?,
        Commands::Status {
            portable_id,
            json,
            discard,
        } => commands::status(&config, portable_id, *json, *discard)?,
        Commands::Messages { portable_id, json } => {
            commands::messages(&config, portable_id, *json)?
        }
    };

    if cli.metrics {
        eprint!("{}", metrics::encode_metrics()?);
    }
    Ok(code)
}

/// Loads and validates configuration.
///
/// A missing default config file is not an error; built-in defaults apply.
fn load(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None if Path::new(DEFAULT_CONFIG).exists() => {
            let path = PathBuf::from(DEFAULT_CONFIG);
            load_config(&path).with_context(|| format!("Failed to load config from {:?}", path))?
        }
        None => Config::default(),
    };

    validate_config(&config).context("Configuration validation failed")?;
    Ok(config)
}

/// Logs go to stderr so stdout stays parseable.
fn init_logging(config: &LoggingConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter))
    };

    let json_layer = config
        .json
        .then(|| fmt::layer().json().with_writer(std::io::stderr));
    let text_layer = (!config.json).then(|| fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}
