use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Prefix of environment variables overriding file values.
///
/// Sections are separated by a double underscore, so
/// `VIDKIT_FFMPEG__BINARY_PATH` sets `ffmpeg.binary_path`.
pub const ENV_PREFIX: &str = "VIDKIT_";

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[ffmpeg]
log_level = "warning"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.ffmpeg.log_level.as_deref(), Some("warning"));
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_load_config_from_str_wrong_type() {
        let toml = r#"
[ffmpeg]
overwrite = "sometimes"
"#;
        let result = load_config_from_str(toml);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/vidkit.toml"));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[ffmpeg]
binary_path = "/usr/bin/ffmpeg"
temp_dir = "/tmp/vidkit-test"

[logging]
json = true
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.ffmpeg.binary_path, PathBuf::from("/usr/bin/ffmpeg"));
        assert_eq!(config.ffmpeg.temp_dir, PathBuf::from("/tmp/vidkit-test"));
        assert!(config.logging.json);
    }
}
