//! Cache types

use crate::key::{CacheKey, RequestDescriptor, RetrievalMethod};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::SystemTime;

/// Metadata record persisted next to each payload file.
///
/// Carries enough to rebuild statistics and drive eviction without reading
/// the payload. Timestamps are stored as epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMetadata {
    #[serde(alias = "cacheKey")]
    pub key: CacheKey,
    pub method: RetrievalMethod,
    pub model_type: String,
    pub size: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_access: Option<DateTime<Utc>>,
    #[serde(default)]
    pub generate_options: Value,
    #[serde(default)]
    pub background_options: Option<Value>,
}

impl EntryMetadata {
    /// Fresh record for a payload of `size` bytes rendered from `descriptor`
    pub fn new(
        key: CacheKey,
        descriptor: &RequestDescriptor,
        size: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            method: descriptor.method,
            model_type: descriptor.model_type.clone(),
            size,
            created: now,
            last_access: Some(now),
            generate_options: descriptor.generate_options.clone(),
            background_options: descriptor.effective_background().cloned(),
        }
    }
}

/// A live disk entry as seen by a scan
#[derive(Debug, Clone)]
pub struct DiskEntry {
    pub key: CacheKey,
    pub metadata: EntryMetadata,
    /// Payload size on disk in bytes
    pub size: u64,
    /// Payload file modification time
    pub modified: SystemTime,
}

impl DiskEntry {
    /// Last access, falling back to the payload mtime for records that
    /// never recorded one
    pub fn last_access(&self) -> DateTime<Utc> {
        self.metadata
            .last_access
            .unwrap_or_else(|| DateTime::<Utc>::from(self.modified))
    }
}

/// Read-only snapshot of both tiers and the configured limits
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStatistics {
    pub disk_file_count: usize,
    pub disk_total_bytes: u64,
    pub memory_item_count: usize,
    pub memory_capacity: usize,
    pub max_age_ms: u64,
    pub max_total_bytes: u64,
    pub reclaim_interval_ms: u64,
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
}

/// Outcome of one reclamation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclaimReport {
    /// Live entries returned by the scan
    pub scanned: usize,
    /// Entries removed because they outlived `max_age`
    pub expired: usize,
    /// Entries removed to get under `max_total_bytes`
    pub evicted: usize,
    /// Orphaned or corrupt files removed during the scan
    pub orphans_removed: usize,
    pub remaining_entries: usize,
    pub remaining_bytes: u64,
    /// Entries that could not be processed and were skipped
    pub failures: usize,
}

impl ReclaimReport {
    pub fn removed(&self) -> usize {
        self.expired + self.evicted + self.orphans_removed
    }
}
