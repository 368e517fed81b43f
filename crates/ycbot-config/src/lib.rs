use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable holding the identity-endpoint refresh token.
pub const OAUTH_TOKEN_VAR: &str = "OAUTH_TOKEN";
/// Environment variable holding the Telegram bot token.
pub const BOT_TOKEN_VAR: &str = "BOT_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON5 parse error: {0}")]
    Json5(#[from] json5::Error),
    #[error("Config directory not found")]
    NoDirFound,
    #[error("missing required secret {0} (set it in the environment or in .env)")]
    MissingSecret(&'static str),
}

/// Cloud API endpoints and HTTP policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    #[serde(default = "default_iam_endpoint")]
    pub iam_endpoint: String,
    #[serde(default = "default_resource_manager_endpoint")]
    pub resource_manager_endpoint: String,
    #[serde(default = "default_compute_endpoint")]
    pub compute_endpoint: String,
    #[serde(default = "default_organization_manager_endpoint")]
    pub organization_manager_endpoint: String,
    /// Upper bound for any single HTTP call, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_iam_endpoint() -> String {
    "https://iam.api.cloud.yandex.net".to_string()
}

fn default_resource_manager_endpoint() -> String {
    "https://resource-manager.api.cloud.yandex.net".to_string()
}

fn default_compute_endpoint() -> String {
    "https://compute.api.cloud.yandex.net".to_string()
}

fn default_organization_manager_endpoint() -> String {
    "https://organization-manager.api.cloud.yandex.net".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl CloudConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            iam_endpoint: default_iam_endpoint(),
            resource_manager_endpoint: default_resource_manager_endpoint(),
            compute_endpoint: default_compute_endpoint(),
            organization_manager_endpoint: default_organization_manager_endpoint(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Credential refresh policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    /// How long before expiry the credential is refreshed, in seconds.
    #[serde(default = "default_refresh_margin_secs")]
    pub refresh_margin_secs: u64,
    /// Consecutive failed exchanges tolerated before the supplier gives up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_secs")]
    pub initial_backoff_secs: u64,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
}

fn default_refresh_margin_secs() -> u64 {
    3600
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff_secs() -> u64 {
    2
}

fn default_max_backoff_secs() -> u64 {
    60
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            refresh_margin_secs: default_refresh_margin_secs(),
            max_attempts: default_max_attempts(),
            initial_backoff_secs: default_initial_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
        }
    }
}

/// Default auto-shutdown schedule, as `HH:MM` strings.
///
/// Values are validated by the schedule parser when the bot starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoShutdownConfig {
    #[serde(default = "default_start")]
    pub start: String,
    #[serde(default = "default_period")]
    pub period: String,
}

fn default_start() -> String {
    "00:01".to_string()
}

fn default_period() -> String {
    "24:00".to_string()
}

impl Default for AutoShutdownConfig {
    fn default() -> Self {
        Self {
            start: default_start(),
            period: default_period(),
        }
    }
}

/// Telegram channel settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Chats allowed to issue commands. Empty means every chat.
    #[serde(default)]
    pub allowed_chat_ids: Vec<i64>,
}

/// Top-level ycbot configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct YcBotConfig {
    #[serde(default)]
    pub cloud: CloudConfig,
    #[serde(default)]
    pub credential: CredentialConfig,
    #[serde(default)]
    pub auto_shutdown: AutoShutdownConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

/// Process secrets. Never part of the config file.
#[derive(Clone)]
pub struct Secrets {
    pub oauth_token: String,
    pub bot_token: String,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("oauth_token", &"<redacted>")
            .field("bot_token", &"<redacted>")
            .finish()
    }
}

impl Secrets {
    /// Read secrets from the process environment, loading `.env` first.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read secrets through an arbitrary lookup. Empty values count as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingSecret(key))
        };
        Ok(Self {
            oauth_token: require(OAUTH_TOKEN_VAR)?,
            bot_token: require(BOT_TOKEN_VAR)?,
        })
    }
}

/// Only the cloud secret, for tools that never talk to the chat platform.
pub fn oauth_token_from_env() -> Result<String, ConfigError> {
    let _ = dotenvy::dotenv();
    std::env::var(OAUTH_TOKEN_VAR)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::MissingSecret(OAUTH_TOKEN_VAR))
}

/// Resolve the ycbot config directory (~/.ycbot/).
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join(".ycbot"))
        .ok_or(ConfigError::NoDirFound)
}

/// Resolve the config file path (~/.ycbot/config.json5).
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.json5"))
}

/// Load configuration from the default path, falling back to defaults.
pub fn load_config() -> Result<YcBotConfig, ConfigError> {
    let path = config_file_path()?;
    load_config_from(&path)
}

/// Load configuration from a specific path, falling back to defaults if not found.
pub fn load_config_from(path: &Path) -> Result<YcBotConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!("Config file not found at {}, using defaults", path.display());
        return Ok(YcBotConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: YcBotConfig = json5::from_str(&content)?;
    tracing::debug!("Loaded config from {}", path.display());
    Ok(config)
}
