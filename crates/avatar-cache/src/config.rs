//! Cache configuration

use crate::error::{CacheError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Limits and locations for an [`crate::AvatarCache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory holding payload and metadata files
    pub directory: PathBuf,
    /// Maximum age of an entry in either tier
    pub max_age: Duration,
    /// Disk budget enforced by each reclamation pass
    pub max_total_bytes: u64,
    /// Capacity of the memory tier
    pub max_memory_items: usize,
    /// Period of the background reclamation scheduler
    pub reclaim_interval: Duration,
    pub memory_enabled: bool,
    pub disk_enabled: bool,
    /// Extension of payload files, without the leading dot
    pub payload_extension: String,
    /// Budget for a single disk operation issued by the facade
    pub io_timeout: Duration,
    /// Files without metadata younger than this are assumed to be mid-write
    pub orphan_grace: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./cache"),
            max_age: Duration::from_secs(24 * 60 * 60), // 24 hours
            max_total_bytes: 100 * 1024 * 1024,         // 100MB
            max_memory_items: 100,
            reclaim_interval: Duration::from_secs(60 * 60), // 1 hour
            memory_enabled: true,
            disk_enabled: true,
            payload_extension: "png".to_string(),
            io_timeout: Duration::from_secs(5),
            orphan_grace: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    /// Config rooted at `directory` with every other limit at its default
    pub fn with_directory(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    /// Reject limits the engine cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.memory_enabled && self.max_memory_items == 0 {
            return Err(CacheError::Config(
                "max_memory_items must be greater than zero".to_string(),
            ));
        }
        if self.reclaim_interval.is_zero() {
            return Err(CacheError::Config(
                "reclaim_interval must be greater than zero".to_string(),
            ));
        }
        if self.io_timeout.is_zero() {
            return Err(CacheError::Config(
                "io_timeout must be greater than zero".to_string(),
            ));
        }
        let ext = self.payload_extension.as_str();
        if ext.is_empty() || ext.contains(['.', '/', '\\']) || ext == "tmp" {
            return Err(CacheError::Config(format!(
                "invalid payload extension: {:?}",
                self.payload_extension
            )));
        }
        Ok(())
    }
}
