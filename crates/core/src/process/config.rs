//! Configuration for the process module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Log levels accepted by ffmpeg's `-loglevel` option.
pub const FFMPEG_LOG_LEVELS: &[&str] = &[
    "quiet", "panic", "fatal", "error", "warning", "info", "verbose", "debug", "trace",
];

/// Configuration for ffmpeg process assembly and execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Path to the ffmpeg binary.
    #[serde(default = "default_binary_path")]
    pub binary_path: PathBuf,

    /// Directory receiving process output storage files.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Whether to overwrite existing outputs (`-y`).
    #[serde(default = "default_true")]
    pub overwrite: bool,

    /// Whether to suppress the ffmpeg banner (`-hide_banner`).
    #[serde(default = "default_true")]
    pub hide_banner: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[serde(default)]
    pub log_level: Option<String>,
}

fn default_binary_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("vidkit")
}

fn default_true() -> bool {
    true
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            binary_path: default_binary_path(),
            temp_dir: default_temp_dir(),
            overwrite: true,
            hide_banner: true,
            log_level: None,
        }
    }
}

impl ProcessConfig {
    /// Creates a config for a custom ffmpeg binary.
    pub fn with_binary_path(binary_path: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
            ..Default::default()
        }
    }

    /// Sets the storage directory.
    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }

    /// Sets the ffmpeg log level.
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    /// Sets whether outputs are overwritten.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Program token for the command line.
    pub fn program(&self) -> String {
        self.binary_path.to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProcessConfig::default();
        assert_eq!(config.binary_path, PathBuf::from("ffmpeg"));
        assert!(config.overwrite);
        assert!(config.hide_banner);
        assert!(config.log_level.is_none());
        assert!(config.temp_dir.ends_with("vidkit"));
    }

    #[test]
    fn test_config_builder() {
        let config = ProcessConfig::with_binary_path("/usr/local/bin/ffmpeg")
            .with_temp_dir("/tmp/test")
            .with_log_level("error")
            .with_overwrite(false);

        assert_eq!(config.program(), "/usr/local/bin/ffmpeg");
        assert_eq!(config.temp_dir, PathBuf::from("/tmp/test"));
        assert_eq!(config.log_level.as_deref(), Some("error"));
        assert!(!config.overwrite);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ProcessConfig = toml::from_str(r#"log_level = "warning""#).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("warning"));
        assert_eq!(config.binary_path, PathBuf::from("ffmpeg"));
        assert!(config.overwrite);
    }
}
