/// Core error types for satchel.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unsupported backend '{0}': only 'memory' and 'redis' are available")]
    UnsupportedBackend(String),
}

impl SessionError {
    /// True for both a missing session and a missing key.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SessionError::SessionNotFound(_) | SessionError::KeyNotFound(_)
        )
    }
}

#[cfg(feature = "redis-backend")]
impl From<redis::RedisError> for SessionError {
    fn from(e: redis::RedisError) -> Self {
        SessionError::Connection(e.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid namespace index '{0}': expected an integer")]
    InvalidNamespace(String),

    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
