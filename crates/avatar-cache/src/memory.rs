//! In-memory tier with least-recently-accessed eviction

use crate::key::CacheKey;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// A payload held in memory
#[derive(Debug, Clone)]
struct MemoryEntry {
    payload: Vec<u8>,
    created_at: DateTime<Utc>,
    last_access: DateTime<Utc>,
}

impl MemoryEntry {
    fn is_expired(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        (now - self.created_at)
            .to_std()
            .map(|age| age > max_age)
            .unwrap_or(false)
    }
}

/// Bounded map from key to payload.
///
/// Holds at most `max_items` entries. When full, inserting a new key evicts
/// the entry with the oldest `last_access`. Entries older than `max_age` are
/// dropped lazily on read.
pub struct MemoryTier {
    entries: Mutex<HashMap<CacheKey, MemoryEntry>>,
    max_items: usize,
    max_age: Duration,
}

impl MemoryTier {
    pub fn new(max_items: usize, max_age: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::with_capacity(max_items.min(1024))),
            max_items,
            max_age,
        }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        self.get_at(key, Utc::now()).await
    }

    pub(crate) async fn get_at(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<Vec<u8>> {
        let mut entries = self.entries.lock().await;

        let entry = entries.get_mut(key)?;
        if entry.is_expired(now, self.max_age) {
            debug!(key = %key, "Memory entry expired");
            entries.remove(key);
            return None;
        }

        entry.last_access = now;
        Some(entry.payload.clone())
    }

    pub async fn put(&self, key: CacheKey, payload: Vec<u8>) {
        self.put_at(key, payload, Utc::now()).await
    }

    pub(crate) async fn put_at(&self, key: CacheKey, payload: Vec<u8>, now: DateTime<Utc>) {
        let mut entries = self.entries.lock().await;

        // Overwriting an existing key never needs room
        if !entries.contains_key(&key) && entries.len() >= self.max_items {
            // Linear scan; capacity is small
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone());

            if let Some(oldest) = oldest {
                entries.remove(&oldest);
                debug!(
                    evicted = %oldest,
                    capacity = self.max_items,
                    "Memory tier full, evicted least recently accessed entry"
                );
            }
        }

        entries.insert(
            key,
            MemoryEntry {
                payload,
                created_at: now,
                last_access: now,
            },
        );
    }

    /// Drop a key, returning whether it was present
    pub async fn remove(&self, key: &CacheKey) -> bool {
        self.entries.lock().await.remove(key).is_some()
    }

    /// Drop a key only if its entry was stored before `cutoff`. Entries
    /// written at or after `cutoff` are kept.
    pub async fn remove_if_created_before(&self, key: &CacheKey, cutoff: DateTime<Utc>) -> bool {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.created_at < cutoff => entries.remove(key).is_some(),
            _ => false,
        }
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, key: &CacheKey) -> bool {
        self.entries.lock().await.contains_key(key)
    }

    pub fn capacity(&self) -> usize {
        self.max_items
    }
}
