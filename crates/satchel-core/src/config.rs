use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Session backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Backend provider name: "memory" or "redis".
    pub provider: String,
    /// Network address of the durable store (host:port).
    pub address: String,
    /// Store credential. Empty means no AUTH.
    pub password: String,
    /// Namespace (database) index.
    pub db: i64,
    /// Prefix prepended to session ids to form store keys.
    pub key_prefix: String,
    /// Expiration applied to newly created sessions. 0 = no expiry.
    pub default_ttl_secs: u64,
    /// Per-operation I/O timeout against the store. None = client default.
    pub io_timeout_secs: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            provider: "memory".to_string(),
            address: "127.0.0.1:6379".to_string(),
            password: String::new(),
            db: 0,
            key_prefix: String::new(),
            default_ttl_secs: 0,
            io_timeout_secs: None,
        }
    }
}

impl SessionConfig {
    /// Render the credential / namespace pair as positional factory options.
    pub fn positional_options(&self) -> Vec<String> {
        if self.db != 0 {
            vec![self.password.clone(), self.db.to_string()]
        } else if !self.password.is_empty() {
            vec![self.password.clone()]
        } else {
            Vec::new()
        }
    }

    /// Backend options derived from this config.
    ///
    /// Credential and namespace go through the same positional parsing as the
    /// factory; prefix, ttl and timeout are layered on top.
    pub fn backend_options(&self) -> Result<BackendOptions, ConfigError> {
        let mut opts = BackendOptions::from_positional(&self.positional_options())?
            .with_key_prefix(self.key_prefix.clone())
            .with_default_ttl(self.default_ttl_secs);
        if let Some(secs) = self.io_timeout_secs {
            opts = opts.with_io_timeout(Duration::from_secs(secs));
        }
        Ok(opts)
    }
}

/// Connection options for a session backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendOptions {
    pub password: Option<String>,
    pub db: i64,
    pub key_prefix: String,
    pub default_ttl_secs: u64,
    pub io_timeout: Option<Duration>,
}

impl BackendOptions {
    /// Parse positional options: `[]`, `[credential]` or `[credential, namespace]`.
    ///
    /// Any other count is ignored and defaults apply.
    pub fn from_positional<S: AsRef<str>>(options: &[S]) -> Result<Self, ConfigError> {
        let mut opts = BackendOptions::default();
        match options {
            [] => {}
            [password] => {
                opts.password = non_empty(password.as_ref());
            }
            [password, db] => {
                opts.password = non_empty(password.as_ref());
                let raw = db.as_ref().trim();
                opts.db = raw
                    .parse::<i64>()
                    .map_err(|_| ConfigError::InvalidNamespace(raw.to_string()))?;
            }
            other => {
                tracing::warn!(
                    "Ignoring {} backend options (expected at most 2)",
                    other.len()
                );
            }
        }
        Ok(opts)
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_default_ttl(mut self, secs: u64) -> Self {
        self.default_ttl_secs = secs;
        self
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = Some(timeout);
        self
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// Get the satchel data directory (~/.satchel).
pub fn get_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".satchel")
}

pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.json")
}

/// Load configuration from a file, falling back to defaults.
pub fn load_config(config_path: Option<&Path>) -> SessionConfig {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(get_config_path);

    if path.exists() {
        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<SessionConfig>(&content) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to parse config from {}: {}", path.display(), e);
                    tracing::warn!("Using default configuration.");
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config from {}: {}", path.display(), e);
                tracing::warn!("Using default configuration.");
            }
        }
    }

    SessionConfig::default()
}

/// Load configuration from the environment.
///
/// `SATCHEL_CONFIG` holds a full JSON config and wins outright. Otherwise the
/// config file is read and individual `SATCHEL_*` variables are overlaid.
pub fn load_config_from_env() -> Result<SessionConfig, ConfigError> {
    if let Ok(json) = std::env::var("SATCHEL_CONFIG") {
        return Ok(serde_json::from_str::<SessionConfig>(&json)?);
    }

    let mut cfg = load_config(None);

    if let Ok(v) = std::env::var("SATCHEL_PROVIDER") {
        cfg.provider = v;
    }
    if let Ok(v) = std::env::var("SATCHEL_ADDRESS") {
        cfg.address = v;
    }
    if let Ok(v) = std::env::var("SATCHEL_PASSWORD") {
        cfg.password = v;
    }
    if let Ok(v) = std::env::var("SATCHEL_DB") {
        cfg.db = v
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNamespace(v.clone()))?;
    }
    if let Ok(v) = std::env::var("SATCHEL_KEY_PREFIX") {
        cfg.key_prefix = v;
    }
    if let Ok(v) = std::env::var("SATCHEL_TTL") {
        match v.trim().parse() {
            Ok(secs) => cfg.default_ttl_secs = secs,
            Err(_) => tracing::warn!("Ignoring non-numeric SATCHEL_TTL: {}", v),
        }
    }

    Ok(cfg)
}
