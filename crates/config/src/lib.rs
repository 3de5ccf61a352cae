//! Configuration loading, validation, and management for Leadline.
//!
//! Loads configuration from `~/.leadline/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.leadline/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// External search service answering FETCH queries
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Agent profile service
    #[serde(default)]
    pub profile: ProfileConfig,

    /// Relevance re-ranking of fetched records
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,

    /// Session lifetime policy
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_true() -> bool {
    true
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("gateway", &self.gateway)
            .field("fetch", &self.fetch)
            .field("profile", &self.profile)
            .field("embeddings", &self.embeddings)
            .field("sessions", &self.sessions)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Origins allowed by the CORS layer
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// When false, `/chat/stream` answers with a single error event
    #[serde(default = "default_true")]
    pub enable_streaming: bool,
}

fn default_port() -> u16 {
    8070
}
fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".into(),
        "http://localhost:3000".into(),
    ]
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            cors_origins: default_cors_origins(),
            enable_streaming: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_url")]
    pub url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_fetch_url() -> String {
    "http://localhost:8090/search/smart".into()
}
fn default_timeout_secs() -> u64 {
    30
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            url: default_fetch_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Base URL; profiles live under `{url}/api/profile/{agent_id}`
    #[serde(default = "default_profile_url")]
    pub url: String,

    #[serde(default = "default_profile_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_profile_url() -> String {
    "http://localhost:8080".into()
}
fn default_profile_timeout_secs() -> u64 {
    5
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            url: default_profile_url(),
            timeout_secs: default_profile_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// How many records survive re-ranking
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_top_k() -> usize {
    5
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: default_embedding_model(),
            top_k: default_top_k(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Sessions idle longer than this are evicted by the sweeper
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,

    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_idle_ttl_secs() -> u64 {
    3600
}
fn default_max_sessions() -> usize {
    1000
}
fn default_sweep_interval_secs() -> u64 {
    300
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: default_idle_ttl_secs(),
            max_sessions: default_max_sessions(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.leadline/config.toml).
    ///
    /// Environment variables override file values; see
    /// [`AppConfig::apply_env_overrides`].
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup` (normally `std::env::var`).
    ///
    /// API key: `LEADLINE_API_KEY`, then `OPENAI_API_KEY`, only when the file
    /// set none. Every other variable wins over the file.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if self.api_key.is_none() {
            self.api_key = var("LEADLINE_API_KEY").or_else(|| var("OPENAI_API_KEY"));
        }
        if let Some(provider) = var("LEADLINE_PROVIDER") {
            self.default_provider = provider;
        }
        if let Some(model) = var("LEADLINE_MODEL") {
            self.default_model = model;
        }
        if let Some(url) = var("FETCH_URL") {
            self.fetch.url = url;
        }
        if let Some(url) = var("PROFILE_URL") {
            self.profile.url = url;
        }
        if let Some(host) = var("SERVER_HOST") {
            self.gateway.host = host;
        }
        if let Some(port) = var("SERVER_PORT") {
            self.gateway.port = parse_env("SERVER_PORT", &port)?;
        }
        if let Some(origins) = var("CORS_ORIGINS") {
            self.gateway.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(flag) = var("ENABLE_STREAMING") {
            self.gateway.enable_streaming = parse_flag(&flag);
        }
        if let Some(flag) = var("USE_EMBEDDINGS") {
            self.embeddings.enabled = parse_flag(&flag);
        }
        if let Some(model) = var("EMBEDDING_MODEL") {
            self.embeddings.model = model;
        }
        if let Some(top_k) = var("EMBEDDING_TOP_K") {
            self.embeddings.top_k = parse_env("EMBEDDING_TOP_K", &top_k)?;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".leadline")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.embeddings.top_k == 0 {
            return Err(ConfigError::ValidationError(
                "embeddings.top_k must be > 0".into(),
            ));
        }

        if self.sessions.max_sessions == 0 {
            return Err(ConfigError::ValidationError(
                "sessions.max_sessions must be > 0".into(),
            ));
        }

        if self.fetch.url.is_empty() {
            return Err(ConfigError::ValidationError("fetch.url must be set".into()));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            gateway: GatewayConfig::default(),
            fetch: FetchConfig::default(),
            profile: ProfileConfig::default(),
            embeddings: EmbeddingsConfig::default(),
            sessions: SessionsConfig::default(),
            providers: HashMap::new(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| {
        ConfigError::ValidationError(format!("{key} has an invalid value: {value}"))
    })
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
