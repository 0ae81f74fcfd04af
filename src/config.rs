use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::batch::MAX_BATCH_SIZE;
use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use crate::sync::SyncOptions;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub spotify: SpotifyConfig,
    pub tidal: TidalConfig,
    pub retry: RetryPolicy,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotifyConfig {
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TidalConfig {
    pub access_token: Option<String>,
    pub country_code: String,
    pub requests_per_second: u32,
}

impl Default for TidalConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            country_code: "US".to_string(),
            requests_per_second: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub batch_size: usize,
    pub inter_batch_delay_ms: u64,
    pub resolution_group_size: usize,
    pub inter_group_delay_ms: u64,
    pub verify_availability: bool,
    pub shutdown_grace_secs: u64,
    pub checkpoint_path: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: MAX_BATCH_SIZE,
            inter_batch_delay_ms: 500,
            resolution_group_size: 10,
            inter_group_delay_ms: 500,
            verify_availability: false,
            shutdown_grace_secs: 10,
            checkpoint_path: None,
        }
    }
}

impl SyncConfig {
    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }

    /// Sync options from config; per-run flags are layered on by the caller.
    pub fn options(&self) -> SyncOptions {
        SyncOptions {
            resolution_group_size: self.resolution_group_size.min(self.batch_size),
            inter_group_delay: Duration::from_millis(self.inter_group_delay_ms),
            verify_availability: self.verify_availability,
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
            ..SyncOptions::default()
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&contents, path)
    }

    fn from_toml(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|path| path.join("playlist-transfer").join("config.toml"))
    }

    /// Load the default config file, falling back to defaults if it doesn't exist
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path().ok_or(ConfigError::NoConfigDir)?;
        if !config_path.exists() {
            log::debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        Self::from_file(&config_path)
    }

    /// Write a default config file, if it doesn't exist. Returns its path.
    pub fn create_default() -> Result<PathBuf, ConfigError> {
        let config_path = Self::config_path().ok_or(ConfigError::NoConfigDir)?;
        if config_path.exists() {
            log::info!("Config file already exists at {}", config_path.display());
            return Ok(config_path);
        }

        let write_error = |source| ConfigError::Write {
            path: config_path.display().to_string(),
            source,
        };
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }
        let contents = toml::to_string_pretty(&Self::default())
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        std::fs::write(&config_path, contents).map_err(write_error)?;

        Ok(config_path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts < 1 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.retry.backoff_multiplier <= 1.0 {
            return Err(ConfigError::Invalid(
                "retry.backoff_multiplier must be greater than 1".into(),
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Invalid(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".into(),
            ));
        }
        if !(1..=MAX_BATCH_SIZE).contains(&self.sync.batch_size) {
            return Err(ConfigError::Invalid(format!(
                "sync.batch_size must be between 1 and {}",
                MAX_BATCH_SIZE
            )));
        }
        if self.sync.resolution_group_size < 1 {
            return Err(ConfigError::Invalid(
                "sync.resolution_group_size must be at least 1".into(),
            ));
        }
        if self.tidal.requests_per_second < 1 {
            return Err(ConfigError::Invalid(
                "tidal.requests_per_second must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Checkpoint file, defaulting to the platform data directory.
    pub fn checkpoint_path(&self) -> Option<PathBuf> {
        match &self.sync.checkpoint_path {
            Some(path) => Some(expand_path(path)),
            None => dirs::data_dir().map(|dir| dir.join("playlist-transfer").join("checkpoint.json")),
        }
    }
}

/// Expand ~ to home directory
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(contents: &str) -> Result<Config, ConfigError> {
        Config::from_toml(contents, Path::new("config.toml"))
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.sync.batch_size, 20);
        assert_eq!(config.tidal.country_code, "US");
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = parse(
            r#"
            [tidal]
            access_token = "abc"

            [retry]
            max_attempts = 5

            [sync]
            resolution_group_size = 50
            batch_size = 15
            "#,
        )
        .unwrap();

        assert_eq!(config.tidal.access_token.as_deref(), Some("abc"));
        assert_eq!(config.tidal.requests_per_second, 4);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.sync.options().resolution_group_size, 15);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for contents in [
            "[retry]\nmax_attempts = 0",
            "[retry]\nbackoff_multiplier = 1.0",
            "[sync]\nbatch_size = 21",
            "[sync]\nbatch_size = 0",
            "[sync]\nresolution_group_size = 0",
        ] {
            assert!(
                matches!(parse(contents), Err(ConfigError::Invalid(_))),
                "{} should be invalid",
                contents
            );
        }
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        assert!(matches!(
            parse("[retry\nmax_attempts = 3"),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sync]\nverify_availability = true\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert!(config.sync.verify_availability);

        let missing = Config::from_file(&dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_expand_path() {
        assert_eq!(expand_path("/tmp/x.json"), PathBuf::from("/tmp/x.json"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_path("~/x.json"), home.join("x.json"));
        }
    }
}
