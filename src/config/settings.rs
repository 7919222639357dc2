//! Server settings
//!
//! Manages settings stored in ~/.sqlagent/config.toml. Every field has a
//! default so the file is optional; command-line flags and environment
//! variables are layered on top by the binary.

use crate::config::connections::PoolOptions;
use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// PostgreSQL connection URL
    #[serde(default)]
    pub database_url: Option<String>,

    /// Gemini API key
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,

    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,

    /// Retries after the first failed completion call
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,

    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    #[serde(default = "default_pool_wait_secs")]
    pub pool_wait_secs: u64,

    #[serde(default = "default_statement_timeout_secs")]
    pub statement_timeout_secs: u64,
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_llm_timeout_secs() -> u64 {
    60
}

/// Upper bound on `max_retries`; backoff is capped, so more only adds latency
pub const MAX_RETRIES: u32 = 10;

fn default_max_retries() -> u32 {
    3
}

fn default_max_tool_rounds() -> usize {
    8
}

fn default_pool_size() -> usize {
    16
}

fn default_pool_wait_secs() -> u64 {
    10
}

fn default_statement_timeout_secs() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: None,
            api_key: None,
            model: default_model(),
            bind: default_bind(),
            static_dir: default_static_dir(),
            llm_timeout_secs: default_llm_timeout_secs(),
            max_retries: default_max_retries(),
            max_tool_rounds: default_max_tool_rounds(),
            pool_size: default_pool_size(),
            pool_wait_secs: default_pool_wait_secs(),
            statement_timeout_secs: default_statement_timeout_secs(),
        }
    }
}

impl Settings {
    /// Get the config directory path (~/.sqlagent/)
    pub fn config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".sqlagent"))
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            max_size: self.pool_size,
            wait_timeout: Duration::from_secs(self.pool_wait_secs),
            statement_timeout: Duration::from_secs(self.statement_timeout_secs),
        }
    }

    /// Reject values that would make the server unusable
    pub fn validate(&self) -> ConfigResult<()> {
        if self.pool_size == 0 {
            return Err(ConfigError::Invalid("pool_size must be > 0".into()));
        }
        if self.max_retries > MAX_RETRIES {
            return Err(ConfigError::Invalid(format!(
                "max_retries must be at most {}",
                MAX_RETRIES
            )));
        }
        if self.max_tool_rounds == 0 {
            return Err(ConfigError::Invalid("max_tool_rounds must be > 0".into()));
        }
        if self.llm_timeout_secs == 0 {
            return Err(ConfigError::Invalid("llm_timeout_secs must be > 0".into()));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model must not be empty".into()));
        }
        Ok(())
    }
}

/// Load settings from the default config file, or defaults if it is absent
pub fn load_settings() -> ConfigResult<Settings> {
    let path = Settings::config_dir()?.join("config.toml");
    if !path.exists() {
        return Ok(Settings::default());
    }
    load_settings_from(&path)
}

/// Load settings from an explicit path; the file must exist
pub fn load_settings_from(path: &Path) -> ConfigResult<Settings> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::NotFound(format!("{}: {}", path.display(), e)))?;
    parse_settings(&content)
}

fn parse_settings(content: &str) -> ConfigResult<Settings> {
    let settings: Settings = toml::from_str(content)?;
    Ok(settings)
}
