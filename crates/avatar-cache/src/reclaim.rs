//! Background reclamation of the disk tier
//!
//! One pass:
//! 1. scan the disk tier (orphans and corrupt entries are pruned by the scan)
//! 2. delete entries whose payload is older than `max_age`
//! 3. if the remaining bytes exceed `max_total_bytes`, delete entries in
//!    ascending `last_access` order until the total fits
//!
//! Every deletion also purges the key from the memory tier, after the disk
//! delete. A lookup that read the payload just before the delete re-checks
//! the disk tier after promoting it, so memory does not keep a copy of an
//! entry that is gone from disk.

use crate::disk::DiskTier;
use crate::error::Result;
use crate::key::CacheKey;
use crate::memory::MemoryTier;
use crate::types::ReclaimReport;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct Reclaimer {
    disk: DiskTier,
    memory: Option<Arc<MemoryTier>>,
    max_age: Duration,
    max_total_bytes: u64,
}

impl Reclaimer {
    pub fn new(
        disk: DiskTier,
        memory: Option<Arc<MemoryTier>>,
        max_age: Duration,
        max_total_bytes: u64,
    ) -> Self {
        Self {
            disk,
            memory,
            max_age,
            max_total_bytes,
        }
    }

    /// Run one pass. Fails only when the directory itself cannot be listed.
    pub async fn run_pass(&self) -> Result<ReclaimReport> {
        self.run_pass_at(SystemTime::now()).await
    }

    pub(crate) async fn run_pass_at(&self, now: SystemTime) -> Result<ReclaimReport> {
        let scan = self.disk.scan_all_at(now).await?;
        let mut report = ReclaimReport {
            scanned: scan.entries.len(),
            orphans_removed: scan.orphans_removed,
            failures: scan.failures,
            ..ReclaimReport::default()
        };

        let mut live = Vec::with_capacity(scan.entries.len());
        for entry in scan.entries {
            let age = now.duration_since(entry.modified).unwrap_or(Duration::ZERO);
            if age > self.max_age {
                match self.disk.delete_if_expired_at(&entry.key, now).await {
                    Ok(true) => {
                        self.purge_memory(&entry.key).await;
                        report.expired += 1;
                    }
                    // Rewritten since the scan; counted again next pass
                    Ok(false) => {}
                    Err(e) => {
                        warn!(key = %entry.key, error = %e, "Failed to reclaim expired entry");
                        report.failures += 1;
                    }
                }
            } else {
                live.push(entry);
            }
        }

        let mut total: u64 = live.iter().map(|e| e.size).sum();
        let mut remaining = live.len();

        if total > self.max_total_bytes {
            live.sort_by_key(|e| e.last_access());

            for entry in &live {
                if total <= self.max_total_bytes {
                    break;
                }
                if self.remove(&entry.key).await {
                    total -= entry.size;
                    remaining -= 1;
                    report.evicted += 1;
                } else {
                    report.failures += 1;
                }
            }
        }

        report.remaining_entries = remaining;
        report.remaining_bytes = total;

        if report.removed() > 0 {
            info!(
                expired = report.expired,
                evicted = report.evicted,
                orphans = report.orphans_removed,
                "Reclamation removed cache entries"
            );
        }
        info!(
            files = report.remaining_entries,
            size_mb = report.remaining_bytes / (1024 * 1024),
            failures = report.failures,
            "Cache status"
        );

        Ok(report)
    }

    async fn remove(&self, key: &CacheKey) -> bool {
        match self.disk.delete(key).await {
            Ok(_) => {
                debug!(key = %key, "Reclaimed disk entry");
                self.purge_memory(key).await;
                true
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to reclaim disk entry");
                false
            }
        }
    }

    async fn purge_memory(&self, key: &CacheKey) {
        if let Some(memory) = &self.memory {
            memory.remove(key).await;
        }
    }
}

/// Start the periodic scheduler: one pass immediately, then one per
/// `period`, until `shutdown` is cancelled.
pub fn spawn_scheduler(
    reclaimer: Arc<Reclaimer>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = period.as_secs(), "Reclamation scheduler started");

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Reclamation scheduler shutting down");
                    break;
                }

                _ = ticker.tick() => {
                    if let Err(e) = reclaimer.run_pass().await {
                        warn!(error = %e, "Reclamation pass failed");
                    }
                }
            }
        }
    })
}
