use crate::constants;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Engine configuration. Every field has a serde default so a partial file
/// (or none at all) yields a working configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// First segment of sync topics.
    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,

    /// Second segment of sync topics; identifies this device's broadcast
    /// namespace.
    #[serde(default)]
    pub device_id: String,

    /// Time-to-live for outstanding-request entries, in seconds.
    #[serde(default = "default_echo_ttl_secs")]
    pub echo_ttl_secs: u64,

    /// Where the best-effort snapshot is written; `None` disables it.
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
}

fn default_channel_prefix() -> String {
    constants::DEFAULT_CHANNEL_PREFIX.to_string()
}

fn default_echo_ttl_secs() -> u64 {
    constants::DEFAULT_ECHO_TTL_SECS
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            channel_prefix: default_channel_prefix(),
            device_id: String::new(),
            echo_ttl_secs: default_echo_ttl_secs(),
            snapshot_path: None,
        }
    }
}

impl SyncConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            });
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the platform config directory, falling back to defaults when
    /// no file exists.
    pub fn load_or_default() -> Self {
        match Self::default_config_path().map(|p| Self::load(&p)) {
            Some(Ok(config)) => config,
            Some(Err(ConfigError::NotFound { .. })) | None => Self::default(),
            Some(Err(e)) => {
                tracing::warn!(error = %e, "config unreadable, using defaults");
                Self::default()
            }
        }
    }

    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(constants::CONFIG_FILE))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_prefix.is_empty() || self.channel_prefix.contains('/') {
            return Err(ConfigError::InvalidValue {
                field: "channel_prefix".to_string(),
                reason: "must be a single non-empty topic segment".to_string(),
            });
        }
        if self.echo_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "echo_ttl_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn echo_ttl(&self) -> Duration {
        Duration::from_secs(self.echo_ttl_secs)
    }
}
