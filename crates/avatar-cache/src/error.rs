//! Error types for the avatar cache

use std::fmt;

/// Errors raised inside the cache engine.
///
/// Only [`CacheError::Config`] is ever returned to callers of the public
/// facade (from [`crate::AvatarCache::open`]). Everything else is logged and
/// degraded to a miss or a skipped write.
#[derive(Debug)]
pub enum CacheError {
    Config(String),
    Io(Box<std::io::Error>),
    Metadata(serde_json::Error),
    CorruptEntry(String),
    Timeout(&'static str),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CacheError::Io(err) => write!(f, "IO error: {}", err),
            CacheError::Metadata(err) => write!(f, "Metadata error: {}", err),
            CacheError::CorruptEntry(msg) => write!(f, "Corrupt cache entry: {}", msg),
            CacheError::Timeout(op) => write!(f, "Timed out during {}", op),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Io(err) => Some(err.as_ref()),
            CacheError::Metadata(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(Box::new(err))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Metadata(err)
    }
}

impl From<tokio::time::error::Elapsed> for CacheError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        CacheError::Timeout("disk operation")
    }
}

impl CacheError {
    /// True when the underlying I/O error is "file not found".
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::Io(err) if err.kind() == std::io::ErrorKind::NotFound)
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
