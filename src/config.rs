use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::HeartwatchError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub keepalive: KeepAliveConfig,
    pub activity: ActivityConfig,
    pub heartbeat: HeartbeatConfig,
    pub token: TokenConfig,
    pub document: DocumentConfig,
}

/// Timing of the keep-alive loop and the autosaver
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepAliveConfig {
    pub poll_period_ms: u64,
    pub idle_threshold_ms: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub save_period_ms: u64,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            poll_period_ms: 2 * 60 * 1000,
            idle_threshold_ms: 30 * 60 * 1000,
            retry_attempts: 6,
            retry_delay_ms: 15 * 1000,
            save_period_ms: 15 * 1000,
        }
    }
}

impl KeepAliveConfig {
    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_period_ms)
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_millis(self.idle_threshold_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn save_period(&self) -> Duration {
        Duration::from_millis(self.save_period_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    pub signals: Vec<String>,
    pub coalesce_window_ms: u64,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            signals: vec!["click".to_string(), "keydown".to_string(), "mousemove".to_string()],
            coalesce_window_ms: 500,
        }
    }
}

impl ActivityConfig {
    pub fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.coalesce_window_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub url: String,
    pub auth_scheme: String,
    pub timeout_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            url: "https://nebula.udacity.com/api/v1/remote/keep-alive".to_string(),
            auth_scheme: "Star".to_string(),
            timeout_ms: 30000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub metadata_url: String,
    pub metadata_header: String,
    pub metadata_header_value: String,
    /// Fixed token; skips the metadata endpoint when set
    pub value: Option<String>,
    pub timeout_ms: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            metadata_url: "http://metadata.google.internal/computeMetadata/v1/instance/attributes/keep_alive_token"
                .to_string(),
            metadata_header: "Metadata-Flavor".to_string(),
            metadata_header_value: "Google".to_string(),
            value: None,
            timeout_ms: 10000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Exits 0 when the document has unsaved changes
    pub dirty_command: Option<String>,
    pub save_command: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            keepalive: KeepAliveConfig::default(),
            activity: ActivityConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            token: TokenConfig::default(),
            document: DocumentConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_name = env!("CARGO_PKG_NAME");

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Reject values the keep-alive loop cannot run with
    pub fn validate(&self) -> crate::error::Result<()> {
        let ka = &self.keepalive;
        if ka.idle_threshold_ms == 0 {
            return Err(HeartwatchError::Config("idle_threshold_ms must be positive".to_string()));
        }
        if ka.retry_attempts == 0 {
            return Err(HeartwatchError::Config("retry_attempts must be at least 1".to_string()));
        }
        if ka.poll_period_ms == 0 {
            return Err(HeartwatchError::Config("poll_period_ms must be positive".to_string()));
        }
        if ka.save_period_ms == 0 {
            return Err(HeartwatchError::Config("save_period_ms must be positive".to_string()));
        }
        if self.activity.coalesce_window_ms == 0 {
            return Err(HeartwatchError::Config("coalesce_window_ms must be positive".to_string()));
        }
        if self.activity.signals.is_empty() {
            return Err(HeartwatchError::Config("at least one activity signal is required".to_string()));
        }
        if self.heartbeat.url.is_empty() {
            return Err(HeartwatchError::Config("heartbeat url is empty".to_string()));
        }
        Ok(())
    }
}
