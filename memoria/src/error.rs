use thiserror::Error;

/// Failure to derive a cache key from a set of arguments.
///
/// Memoizers never surface this to the caller: the call bypasses the cache instead.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("arguments cannot be serialized into a cache key: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("arguments rejected by key strategy: {0}")]
    Rejected(String),
}

impl KeyError {
    /// Error for custom key strategies that cannot key a particular argument list.
    pub fn rejected(reason: impl Into<String>) -> KeyError {
        KeyError::Rejected(reason.into())
    }
}

/// Invalid memoizer configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cache capacity must be at least 1")]
    ZeroCapacity,
    #[error("invalid memoizer configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
