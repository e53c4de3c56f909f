use crate::compress::DEFAULT_COMPRESSION_WORKERS;
use crate::error::{Result, RotalogError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound on concurrent compression jobs
const MAX_COMPRESSION_WORKERS: usize = 64;

/// Settings for one rotating log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogFileConfig {
    /// Logical path of the log (the symlink)
    pub path: PathBuf,

    /// Rotate once the active file reaches this many bytes (0 disables)
    #[serde(default)]
    pub max_bytes: u64,

    /// Maximum age of a file in seconds (0 for none)
    #[serde(default)]
    pub max_age_secs: u64,

    /// Gzip rotated files in the background
    #[serde(default)]
    pub compress: bool,

    /// Number of compression jobs allowed to run at once
    #[serde(default = "default_compression_workers")]
    pub compression_workers: usize,

    /// Prefix every line with a timestamp
    #[serde(default)]
    pub timestamps: bool,

    /// Use UTC for line timestamps
    #[serde(default)]
    pub utc: bool,
}

fn default_compression_workers() -> usize {
    DEFAULT_COMPRESSION_WORKERS
}

impl LogFileConfig {
    /// Configuration with defaults for everything but the path
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            max_bytes: 0,
            max_age_secs: 0,
            compress: false,
            compression_workers: default_compression_workers(),
            timestamps: false,
            utc: false,
        }
    }

    /// Load a configuration from a file (supports TOML and JSON)
    pub fn from_file(path: &Path) -> Result<LogFileConfig> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RotalogError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        let mut config = match extension {
            "toml" => Self::parse_toml(&contents)?,
            "json" => Self::parse_json(&contents)?,
            _ => {
                return Err(RotalogError::InvalidConfig(format!(
                    "Unsupported file format: {}. Use .toml or .json",
                    extension
                )))
            }
        };

        config.path = expand_env_in_path(&config.path);
        config.validate()?;

        Ok(config)
    }

    fn parse_toml(contents: &str) -> Result<LogFileConfig> {
        toml::from_str(contents)
            .map_err(|e| RotalogError::InvalidConfig(format!("Failed to parse TOML: {}", e)))
    }

    fn parse_json(contents: &str) -> Result<LogFileConfig> {
        serde_json::from_str(contents)
            .map_err(|e| RotalogError::InvalidConfig(format!("Failed to parse JSON: {}", e)))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(RotalogError::MissingConfigField("path".to_string()));
        }

        if self.compression_workers == 0 {
            return Err(RotalogError::ConfigValidationError(
                "compression_workers must be at least 1".to_string(),
            ));
        }

        if self.compression_workers > MAX_COMPRESSION_WORKERS {
            return Err(RotalogError::ConfigValidationError(format!(
                "compression_workers cannot exceed {}",
                MAX_COMPRESSION_WORKERS
            )));
        }

        Ok(())
    }

    /// Get the age threshold as Duration, if any
    pub fn max_age(&self) -> Option<Duration> {
        (self.max_age_secs > 0).then(|| Duration::from_secs(self.max_age_secs))
    }
}

/// Expand `$VAR` and `${VAR}` in a string from the process environment
///
/// A bare `$VAR` takes the longest run of `[A-Za-z0-9_]` as the name. Unset
/// variables and a `$` not followed by a name are left as written.
fn expand_env_in_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(pos) = rest.find('$') {
        result.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        match std::env::var(name) {
            Ok(value) if !name.is_empty() => result.push_str(&value),
            _ => result.push_str(&rest[pos..pos + 1 + consumed]),
        }
        rest = &after[consumed..];
    }

    result.push_str(rest);
    result
}

fn expand_env_in_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    PathBuf::from(expand_env_in_string(&path_str))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_config_defaults() {
        let config = LogFileConfig::new("/var/log/app.log");
        assert_eq!(config.max_bytes, 0);
        assert!(!config.compress);
        assert_eq!(config.compression_workers, DEFAULT_COMPRESSION_WORKERS);
        assert_eq!(config.max_age(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_path() {
        let config = LogFileConfig::new("");
        assert!(matches!(
            config.validate(),
            Err(RotalogError::MissingConfigField(_))
        ));
    }

    #[test]
    fn test_validate_workers() {
        let mut config = LogFileConfig::new("/var/log/app.log");
        config.compression_workers = 0;
        assert!(config.validate().is_err());

        config.compression_workers = MAX_COMPRESSION_WORKERS + 1;
        assert!(config.validate().is_err());

        config.compression_workers = MAX_COMPRESSION_WORKERS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml_minimal() {
        let config = LogFileConfig::parse_toml(r#"path = "/var/log/app.log""#).unwrap();
        assert_eq!(config.path, PathBuf::from("/var/log/app.log"));
        assert_eq!(config.compression_workers, DEFAULT_COMPRESSION_WORKERS);
        assert!(!config.timestamps);
    }

    #[test]
    fn test_parse_json_full() {
        let json = r#"{
            "path": "/var/log/app.log",
            "max_bytes": 1048576,
            "max_age_secs": 86400,
            "compress": true,
            "compression_workers": 4,
            "timestamps": true,
            "utc": true
        }"#;
        let config = LogFileConfig::parse_json(json).unwrap();
        assert_eq!(config.max_bytes, 1048576);
        assert_eq!(config.max_age(), Some(Duration::from_secs(86400)));
        assert!(config.compress);
        assert_eq!(config.compression_workers, 4);
        assert!(config.timestamps);
        assert!(config.utc);
    }

    #[test]
    fn test_from_file_unsupported_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, "path: /var/log/app.log").unwrap();

        let result = LogFileConfig::from_file(&path);
        assert!(matches!(result, Err(RotalogError::InvalidConfig(_))));
    }

    #[test]
    fn test_from_file_expands_env() {
        let temp_dir = TempDir::new().unwrap();
        std::env::set_var("ROTALOG_TEST_LOG_DIR", "/srv/logs");
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "path = \"${ROTALOG_TEST_LOG_DIR}/app.log\"\n").unwrap();

        let config = LogFileConfig::from_file(&path).unwrap();
        assert_eq!(config.path, PathBuf::from("/srv/logs/app.log"));
    }

    #[test]
    fn test_expand_env_in_string() {
        std::env::set_var("ROTALOG_TEST_NAME", "worker");
        assert_eq!(
            expand_env_in_string("$ROTALOG_TEST_NAME.log"),
            "worker.log"
        );
        assert_eq!(expand_env_in_string("plain.log"), "plain.log");
    }

    #[test]
    fn test_expand_env_matches_whole_names() {
        std::env::set_var("ROTALOG_TEST_HOME", "/home/app");
        std::env::remove_var("ROTALOG_TEST_HOME_DIR");

        // A longer unset name is not expanded through a set prefix
        assert_eq!(
            expand_env_in_string("$ROTALOG_TEST_HOME_DIR/app.log"),
            "$ROTALOG_TEST_HOME_DIR/app.log"
        );
        assert_eq!(
            expand_env_in_string("${ROTALOG_TEST_HOME}_DIR/app.log"),
            "/home/app_DIR/app.log"
        );
        assert_eq!(
            expand_env_in_string("$ROTALOG_TEST_HOME/app.log"),
            "/home/app/app.log"
        );
    }

    #[test]
    fn test_expand_env_keeps_unmatched_dollars() {
        assert_eq!(expand_env_in_string("cost$"), "cost$");
        assert_eq!(expand_env_in_string("a$/b"), "a$/b");
        assert_eq!(expand_env_in_string("${UNCLOSED/app.log"), "${UNCLOSED/app.log");
        assert_eq!(expand_env_in_string("${}"), "${}");
    }
}
