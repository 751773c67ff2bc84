//! Configuration and response types for the avatar cache server

use avatar_cache::CacheConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Process configuration, read from the environment
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Required on every route except `/health`
    pub api_token: Option<String>,
    /// Required on cache routes when `api_token` is unset
    pub cache_api_token: Option<String>,
    pub cache_enabled: bool,
    pub cache: CacheConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            api_token: None,
            cache_api_token: None,
            cache_enabled: true,
            cache: CacheConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; unset or unparseable values keep
    /// their defaults
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parse_u64 = |name: &str| var(name).and_then(|s| s.trim().parse::<u64>().ok());
        let flag = |name: &str| var(name).map(|v| v == "true").unwrap_or(false);
        let token = |name: &str| var(name).filter(|t| !t.is_empty());

        let port = var("PORT")
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(defaults.port);

        let cache = CacheConfig {
            directory: var("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache.directory),
            max_age: parse_u64("CACHE_MAX_AGE")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache.max_age),
            max_total_bytes: parse_u64("CACHE_MAX_SIZE")
                .map(|mb| mb.saturating_mul(1024 * 1024))
                .unwrap_or(defaults.cache.max_total_bytes),
            max_memory_items: parse_u64("CACHE_MAX_MEMORY_ITEMS")
                .map(|n| n as usize)
                .unwrap_or(defaults.cache.max_memory_items),
            reclaim_interval: parse_u64("CACHE_CLEANUP_INTERVAL")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache.reclaim_interval),
            memory_enabled: !flag("CACHE_MEMORY_DISABLED"),
            disk_enabled: !flag("CACHE_DISK_DISABLED"),
            ..defaults.cache
        };

        Self {
            port,
            api_token: token("API_TOKEN"),
            cache_api_token: token("CACHE_API_TOKEN"),
            cache_enabled: !flag("CACHE_DISABLED"),
            cache,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub cache_enabled: bool,
}

/// Response to a cache clear or entry delete
#[derive(Debug, Serialize, Deserialize)]
pub struct ClearResponse {
    pub success: bool,
    pub removed: usize,
}
