//! Two-tier cache facade

use crate::cleanup::CleanupQueue;
use crate::config::CacheConfig;
use crate::disk::{DiskLookup, DiskTier, DiskUsage};
use crate::error::Result;
use crate::key::{CacheKey, RequestDescriptor};
use crate::memory::MemoryTier;
use crate::reclaim::{spawn_scheduler, Reclaimer};
use crate::types::{CacheStatistics, EntryMetadata, ReclaimReport};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Handle to an open avatar cache.
///
/// Lookups go to memory first, then disk; disk hits are promoted into
/// memory. Writes go to both tiers. Nothing here fails a caller: disk
/// problems are logged and turn into misses or skipped writes.
///
/// Background tasks (expiry cleanup and, unless opened without one, the
/// reclamation scheduler) stop on [`AvatarCache::shutdown`] or when the
/// handle is dropped.
pub struct AvatarCache {
    config: CacheConfig,
    memory: Option<Arc<MemoryTier>>,
    disk: Option<DiskTier>,
    reclaimer: Option<Arc<Reclaimer>>,
    cleanup: Option<CleanupQueue>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
}

impl AvatarCache {
    /// Open the cache and start background reclamation (first pass runs
    /// immediately). Must be called inside a tokio runtime.
    pub async fn open(config: CacheConfig) -> Result<Self> {
        let cache = Self::open_without_scheduler(config).await?;

        if let Some(reclaimer) = &cache.reclaimer {
            let handle = spawn_scheduler(
                Arc::clone(reclaimer),
                cache.config.reclaim_interval,
                cache.shutdown.clone(),
            );
            cache.tasks.lock().await.push(handle);
        }

        Ok(cache)
    }

    /// Open the cache without the periodic scheduler. Reclamation then only
    /// happens through [`AvatarCache::reclaim_now`].
    pub async fn open_without_scheduler(config: CacheConfig) -> Result<Self> {
        config.validate()?;

        let shutdown = CancellationToken::new();
        let memory = config
            .memory_enabled
            .then(|| Arc::new(MemoryTier::new(config.max_memory_items, config.max_age)));

        let mut tasks = Vec::new();
        let (disk, reclaimer, cleanup) = if config.disk_enabled {
            let disk = DiskTier::from_config(&config);
            disk.init().await?;

            let reclaimer = Arc::new(Reclaimer::new(
                disk.clone(),
                memory.clone(),
                config.max_age,
                config.max_total_bytes,
            ));
            let (cleanup, handle) =
                CleanupQueue::spawn(disk.clone(), memory.clone(), shutdown.clone());
            tasks.push(handle);

            (Some(disk), Some(reclaimer), Some(cleanup))
        } else {
            (None, None, None)
        };

        info!(
            directory = ?config.directory,
            memory = config.memory_enabled,
            disk = config.disk_enabled,
            max_age_secs = config.max_age.as_secs(),
            max_mb = config.max_total_bytes / (1024 * 1024),
            max_memory_items = config.max_memory_items,
            "Avatar cache opened"
        );

        Ok(Self {
            config,
            memory,
            disk,
            reclaimer,
            cleanup,
            shutdown,
            tasks: Mutex::new(tasks),
            memory_hits: AtomicU64::new(0),
            disk_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up the artifact for `descriptor`
    pub async fn get(&self, descriptor: &RequestDescriptor) -> Option<Vec<u8>> {
        self.get_by_key(&descriptor.cache_key()).await
    }

    pub async fn get_by_key(&self, key: &CacheKey) -> Option<Vec<u8>> {
        if let Some(memory) = &self.memory {
            if let Some(payload) = memory.get(key).await {
                self.memory_hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Memory cache hit");
                return Some(payload);
            }
        }

        if let (Some(disk), Some(cleanup)) = (&self.disk, &self.cleanup) {
            match timeout(self.config.io_timeout, disk.get(key)).await {
                Ok(DiskLookup::Hit(payload)) => {
                    if let Some(memory) = &self.memory {
                        memory.put(key.clone(), payload.clone()).await;
                        // Reclaimed while being read
                        if !disk.contains(key).await {
                            memory.remove(key).await;
                        }
                    }
                    self.disk_hits.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %key, "Disk cache hit");
                    return Some(payload);
                }
                Ok(DiskLookup::Expired) => cleanup.dispatch(key.clone()),
                Ok(DiskLookup::Absent) => {}
                Err(_) => warn!(key = %key, "Disk lookup timed out, treating as miss"),
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "Cache miss");
        None
    }

    /// Store `payload` for `descriptor` in both tiers, replacing any
    /// existing entry
    pub async fn put(&self, descriptor: &RequestDescriptor, payload: &[u8]) {
        let key = descriptor.cache_key();

        if let Some(memory) = &self.memory {
            memory.put(key.clone(), payload.to_vec()).await;
        }

        if let Some(disk) = &self.disk {
            let size = payload.len() as u64;
            let meta = EntryMetadata::new(key.clone(), descriptor, size, Utc::now());
            match timeout(self.config.io_timeout, disk.put(&key, payload, &meta)).await {
                Ok(Ok(())) => debug!(key = %key, size = payload.len(), "Cached artifact"),
                Ok(Err(e)) => warn!(key = %key, error = %e, "Failed to persist artifact"),
                Err(_) => warn!(key = %key, "Persisting artifact timed out"),
            }
        }
    }

    /// Remove one entry from both tiers. Unknown keys are ignored. Returns
    /// whether either tier held the key.
    pub async fn delete_entry(&self, key: &CacheKey) -> bool {
        let mut removed = false;
        if let Some(memory) = &self.memory {
            removed |= memory.remove(key).await;
        }
        if let Some(disk) = &self.disk {
            match timeout(self.config.io_timeout, disk.delete(key)).await {
                Ok(Ok(deleted)) => removed |= deleted,
                Ok(Err(e)) => warn!(key = %key, error = %e, "Failed to delete cache entry"),
                Err(_) => warn!(key = %key, "Deleting cache entry timed out"),
            }
        }
        if removed {
            info!(key = %key, "Cache entry deleted");
        }
        removed
    }

    /// Empty both tiers. Returns the number of disk files removed.
    pub async fn clear(&self) -> usize {
        if let Some(memory) = &self.memory {
            memory.clear().await;
        }

        let removed = match &self.disk {
            Some(disk) => match timeout(self.config.io_timeout, disk.clear()).await {
                Ok(Ok(removed)) => removed,
                Ok(Err(e)) => {
                    warn!(error = %e, "Failed to clear disk tier");
                    0
                }
                Err(_) => {
                    warn!("Clearing disk tier timed out");
                    0
                }
            },
            None => 0,
        };

        info!(removed, "Cache cleared");
        removed
    }

    /// Snapshot of both tiers. Does not modify either.
    pub async fn stats(&self) -> CacheStatistics {
        let disk_usage = match &self.disk {
            Some(disk) => match timeout(self.config.io_timeout, disk.usage()).await {
                Ok(Ok(usage)) => usage,
                Ok(Err(e)) => {
                    warn!(error = %e, "Failed to scan disk tier for stats");
                    DiskUsage::default()
                }
                Err(_) => {
                    warn!("Scanning disk tier for stats timed out");
                    DiskUsage::default()
                }
            },
            None => DiskUsage::default(),
        };

        let (memory_item_count, memory_capacity) = match &self.memory {
            Some(memory) => (memory.len().await, memory.capacity()),
            None => (0, 0),
        };

        CacheStatistics {
            disk_file_count: disk_usage.entries,
            disk_total_bytes: disk_usage.total_bytes,
            memory_item_count,
            memory_capacity,
            max_age_ms: self.config.max_age.as_millis() as u64,
            max_total_bytes: self.config.max_total_bytes,
            reclaim_interval_ms: self.config.reclaim_interval.as_millis() as u64,
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Run one reclamation pass now. `None` when the disk tier is disabled,
    /// the pass fails or it runs past the I/O timeout.
    pub async fn reclaim_now(&self) -> Option<ReclaimReport> {
        let reclaimer = self.reclaimer.as_ref()?;
        match timeout(self.config.io_timeout, reclaimer.run_pass()).await {
            Ok(Ok(report)) => Some(report),
            Ok(Err(e)) => {
                warn!(error = %e, "Reclamation pass failed");
                None
            }
            Err(_) => {
                warn!("Reclamation pass timed out");
                None
            }
        }
    }

    /// Stop background tasks and wait for them to finish
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Cache background task ended abnormally");
            }
        }
        info!("Avatar cache shut down");
    }
}

impl Drop for AvatarCache {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
