pub mod config;
pub mod metrics;
pub mod process;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, LoggingConfig,
};
pub use process::{
    parse_messages, CommandArgument, ExecBuffer, ExecutionHandle, FfmpegProcess, InputPosition,
    Messages, PortableId, ProcessConfig, ProcessError,
};
