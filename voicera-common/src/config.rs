//! Configuration management for VoicEra services.
//!
//! The gateway server and the CLI share one configuration file at
//! `~/.voicera/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Default values
//! 2. Explicit config file values
//! 3. Environment variables (VOICERA_* prefix)
//!
//! Command-line flags are applied on top by the binaries.
//!
//! # Environment Variable Mapping
//!
//! - `VOICERA_GATEWAY_PORT` → gateway.port
//! - `VOICERA_BIND_ADDRESS` → network.bind
//! - `VOICERA_SEARCH_URL` → backend.search_url
//! - `VOICERA_EMBED_URL` → backend.embed_url
//! - `VOICERA_CONTEXTS_URL` → backend.contexts_url
//! - `VOICERA_GATEWAY_URL` → client.gateway_url
//! - `VOICERA_LOG_LEVEL` → observability.log_level

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result, ResultExt};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".voicera"),
        |dirs| dirs.home_dir().join(".voicera"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Expand `~` and environment variables in a user-supplied path.
pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::full(raw).map_or_else(|_| raw.to_string(), |p| p.into_owned()))
}

/// Pick the config file: an explicit path, else `VOICERA_CONFIG`, else `None`
/// (the default location). The chosen path is shell-expanded.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    explicit
        .map(|p| p.to_string_lossy().into_owned())
        .or_else(|| std::env::var("VOICERA_CONFIG").ok().filter(|v| !v.is_empty()))
        .map(|raw| expand_path(&raw))
}

/// Contexts served by the gateway when no upstream directory is configured.
pub const DEFAULT_CONTEXTS: &[&str] = &[
    "Software Development",
    "Hardware Engineering",
    "AI Research",
    "Cloud Computing",
    "Data Science",
    "Robotics",
    "Cybersecurity",
];

fn default_bind_address() -> String {
    "127.0.0.1".into()
}

fn default_gateway_port() -> u16 {
    4480
}

fn default_body_limit() -> usize {
    25 * 1024 * 1024
}

fn default_contexts() -> Vec<String> {
    DEFAULT_CONTEXTS.iter().map(|c| (*c).to_string()).collect()
}

fn default_search_url() -> String {
    "http://localhost:5000/search".into()
}

fn default_embed_url() -> String {
    "http://localhost:5000/embed".into()
}

fn default_gateway_url() -> String {
    "http://127.0.0.1:4480".into()
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Sections
// ============================================================================

/// Network configuration for the gateway listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Bind address. Default is `127.0.0.1` (local only).
    #[serde(default = "default_bind_address")]
    pub bind: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
        }
    }
}

/// Gateway server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Listen port
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Maximum accepted request body (uploads included)
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,

    /// Static context list, used when `backend.contexts_url` is unset
    #[serde(default = "default_contexts")]
    pub contexts: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            body_limit_bytes: default_body_limit(),
            contexts: default_contexts(),
        }
    }
}

/// Backend (inference + embedding service) endpoints the gateway forwards to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Inference endpoint for chat messages
    #[serde(default = "default_search_url")]
    pub search_url: String,

    /// Embedding endpoint for document uploads
    #[serde(default = "default_embed_url")]
    pub embed_url: String,

    /// Optional upstream context directory
    #[serde(default)]
    pub contexts_url: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            search_url: default_search_url(),
            embed_url: default_embed_url(),
            contexts_url: None,
        }
    }
}

/// Client-side settings used by the CLI and the session crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the gateway server
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// Request timeout in seconds. `None` leaves timeouts to the transport.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            timeout_secs: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets pinned to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path, falling back to defaults.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config from {}", path.display()))?;

        Self::from_json(&content).context(format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment overrides.
    ///
    /// The file is `path`, else `VOICERA_CONFIG`, else the default location.
    pub fn load_with_env(path: Option<&Path>) -> Result<Self> {
        let mut config = match resolve_config_path(path) {
            Some(p) => Self::load_from(&p)?,
            None => Self::load()?,
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("VOICERA_GATEWAY_PORT") {
            match port.parse() {
                Ok(p) => self.gateway.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid VOICERA_GATEWAY_PORT"),
            }
        }

        if let Ok(bind) = std::env::var("VOICERA_BIND_ADDRESS") {
            self.network.bind = bind;
        }

        if let Ok(url) = std::env::var("VOICERA_SEARCH_URL") {
            self.backend.search_url = url;
        }
        if let Ok(url) = std::env::var("VOICERA_EMBED_URL") {
            self.backend.embed_url = url;
        }
        if let Ok(url) = std::env::var("VOICERA_CONTEXTS_URL") {
            self.backend.contexts_url = Some(url);
        }

        if let Ok(url) = std::env::var("VOICERA_GATEWAY_URL") {
            self.client.gateway_url = url;
        }

        if let Ok(level) = std::env::var("VOICERA_LOG_LEVEL") {
            self.observability.log_level = level;
        }
    }

    /// Get the effective bind address.
    pub fn bind_address(&self) -> &str {
        &self.network.bind
    }

    /// Socket address string the gateway listens on.
    pub fn gateway_listen_addr(&self) -> String {
        format!("{}:{}", self.network.bind, self.gateway.port)
    }

    /// Gateway base URL with any trailing slash removed.
    pub fn gateway_url(&self) -> &str {
        self.client.gateway_url.trim_end_matches('/')
    }

    /// Parse an arbitrary JSON string into a config, reporting field errors.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }
}
