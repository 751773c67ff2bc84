//! Deferred deletion of expired entries found on the read path
//!
//! A key is only deleted if it is still expired when the worker gets to it,
//! so an entry stored again after the expired read survives.

use crate::disk::DiskTier;
use crate::key::CacheKey;
use crate::memory::MemoryTier;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Sending side of the cleanup worker. Dispatch never blocks or fails the
/// caller.
#[derive(Debug, Clone)]
pub struct CleanupQueue {
    tx: mpsc::UnboundedSender<(CacheKey, DateTime<Utc>)>,
}

impl CleanupQueue {
    /// Spawn the worker and return its queue
    pub fn spawn(
        disk: DiskTier,
        memory: Option<Arc<MemoryTier>>,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_worker(rx, disk, memory, shutdown));
        (Self { tx }, handle)
    }

    pub fn dispatch(&self, key: CacheKey) {
        if self.tx.send((key, Utc::now())).is_err() {
            debug!("Cleanup worker stopped, dropping deletion request");
        }
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<(CacheKey, DateTime<Utc>)>,
    disk: DiskTier,
    memory: Option<Arc<MemoryTier>>,
    shutdown: CancellationToken,
) {
    loop {
        let (key, dispatched_at) = tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,

            item = rx.recv() => match item {
                Some(item) => item,
                None => break,
            },
        };

        match disk.delete_if_expired(&key).await {
            Ok(true) => debug!(key = %key, "Deleted expired entry"),
            Ok(false) => {}
            Err(e) => warn!(key = %key, error = %e, "Failed to delete expired entry"),
        }
        if let Some(memory) = &memory {
            memory.remove_if_created_before(&key, dispatched_at).await;
        }
    }
}
