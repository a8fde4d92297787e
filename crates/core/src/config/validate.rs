use super::{types::Config, ConfigError};
use crate::process::FFMPEG_LOG_LEVELS;

/// Validate configuration
/// Currently validates:
/// - ffmpeg.binary_path and ffmpeg.temp_dir are not empty
/// - ffmpeg.log_level, when set, is a level ffmpeg accepts
/// - logging.filter is not empty
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // FFmpeg validation
    if config.ffmpeg.binary_path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "ffmpeg.binary_path cannot be empty".to_string(),
        ));
    }

    if config.ffmpeg.temp_dir.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "ffmpeg.temp_dir cannot be empty".to_string(),
        ));
    }

    if let Some(level) = &config.ffmpeg.log_level {
        if !FFMPEG_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "ffmpeg.log_level '{}' is not one of: {}",
                level,
                FFMPEG_LOG_LEVELS.join(", ")
            )));
        }
    }

    // Logging validation
    if config.logging.filter.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "logging.filter cannot be empty".to_string(),
        ));
    }

    Ok(())
}
