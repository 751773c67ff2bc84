//! On-disk tier: one payload file and one JSON metadata file per key
//!
//! Layout under the cache directory:
//!
//! ```text
//! <key>.<ext>          payload bytes
//! <key>.meta.json      EntryMetadata
//! .<name>.<pid>.<n>.tmp  in-flight write, renamed into place when complete
//! ```
//!
//! The payload is written first and the metadata last, so metadata marks an
//! entry as committed. Deletion removes metadata first for the same reason.
//!
//! Writes share a lock with [`DiskTier::delete_if_expired`], so an expiry
//! re-check and its delete never interleave with a put of the same entry.

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::key::CacheKey;
use crate::types::{DiskEntry, EntryMetadata};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub const META_SUFFIX: &str = ".meta.json";
const TMP_SUFFIX: &str = ".tmp";
const PROBE_FILE: &str = ".write-probe";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Result of a disk lookup
#[derive(Debug, PartialEq, Eq)]
pub enum DiskLookup {
    Hit(Vec<u8>),
    Absent,
    /// Present but older than `max_age`; the caller should schedule deletion
    Expired,
}

/// Live entries plus what the scan had to clean up on the way
#[derive(Debug, Default)]
pub struct DiskScan {
    pub entries: Vec<DiskEntry>,
    pub orphans_removed: usize,
    pub failures: usize,
}

/// Read-only totals over committed entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskUsage {
    pub entries: usize,
    pub total_bytes: u64,
}

enum FileKind {
    Metadata(CacheKey),
    Payload(CacheKey),
    Temp,
    Other,
}

/// File-backed store keyed by [`CacheKey`]
#[derive(Debug, Clone)]
pub struct DiskTier {
    directory: PathBuf,
    extension: String,
    max_age: Duration,
    orphan_grace: Duration,
    /// Shared by puts, exclusive for conditional deletes
    writes: Arc<RwLock<()>>,
}

impl DiskTier {
    pub fn new(
        directory: PathBuf,
        extension: impl Into<String>,
        max_age: Duration,
        orphan_grace: Duration,
    ) -> Self {
        Self {
            directory,
            extension: extension.into(),
            max_age,
            orphan_grace,
            writes: Arc::new(RwLock::new(())),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            config.directory.clone(),
            config.payload_extension.clone(),
            config.max_age,
            config.orphan_grace,
        )
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn payload_path(&self, key: &CacheKey) -> PathBuf {
        self.directory.join(self.payload_name(key))
    }

    pub fn meta_path(&self, key: &CacheKey) -> PathBuf {
        self.directory.join(Self::meta_name(key))
    }

    fn payload_name(&self, key: &CacheKey) -> String {
        format!("{}.{}", key, self.extension)
    }

    fn meta_name(key: &CacheKey) -> String {
        format!("{}{}", key, META_SUFFIX)
    }

    /// Create the directory if needed and check that it is writable
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.directory).await.map_err(|e| {
            CacheError::Config(format!(
                "cannot create cache directory {:?}: {}",
                self.directory, e
            ))
        })?;

        let probe = self.directory.join(PROBE_FILE);
        fs::write(&probe, b"").await.map_err(|e| {
            CacheError::Config(format!(
                "cache directory {:?} is not writable: {}",
                self.directory, e
            ))
        })?;
        let _ = fs::remove_file(&probe).await;

        info!(directory = ?self.directory, "Disk tier initialized");
        Ok(())
    }

    pub async fn get(&self, key: &CacheKey) -> DiskLookup {
        self.get_at(key, SystemTime::now()).await
    }

    pub(crate) async fn get_at(&self, key: &CacheKey, now: SystemTime) -> DiskLookup {
        let payload_path = self.payload_path(key);
        let meta_path = self.meta_path(key);

        let (payload_stat, meta_stat) =
            tokio::join!(fs::metadata(&payload_path), fs::metadata(&meta_path));

        let payload_stat = match payload_stat {
            Ok(stat) => stat,
            Err(e) => {
                log_stat_failure(key, &e);
                return DiskLookup::Absent;
            }
        };
        if let Err(e) = meta_stat {
            log_stat_failure(key, &e);
            return DiskLookup::Absent;
        }

        let modified = match payload_stat.modified() {
            Ok(modified) => modified,
            Err(e) => {
                warn!(key = %key, error = %e, "Payload mtime unavailable");
                return DiskLookup::Absent;
            }
        };
        if age(now, modified) > self.max_age {
            debug!(key = %key, "Disk entry expired");
            return DiskLookup::Expired;
        }

        let payload = match fs::read(&payload_path).await {
            Ok(payload) => payload,
            Err(e) => {
                log_stat_failure(key, &e);
                return DiskLookup::Absent;
            }
        };

        let mut meta = match self.read_metadata(key).await {
            Ok(meta) => meta,
            Err(e) => {
                if !e.is_not_found() {
                    warn!(key = %key, error = %e, "Unreadable metadata, treating as miss");
                }
                return DiskLookup::Absent;
            }
        };

        meta.last_access = Some(DateTime::<Utc>::from(now));
        if let Err(e) = self.write_metadata(&meta).await {
            // The payload is still good; only the access time is stale
            warn!(key = %key, error = %e, "Failed to update access time");
        }

        DiskLookup::Hit(payload)
    }

    /// Write payload then metadata, each via rename
    pub async fn put(&self, key: &CacheKey, payload: &[u8], meta: &EntryMetadata) -> Result<()> {
        let _writing = self.writes.read().await;
        self.write_atomic(&self.payload_name(key), payload).await?;
        self.write_metadata(meta).await?;
        debug!(key = %key, size = payload.len(), "Wrote disk entry");
        Ok(())
    }

    /// Remove both files. Missing files are not an error. Returns whether
    /// anything was removed.
    pub async fn delete(&self, key: &CacheKey) -> Result<bool> {
        let meta = remove_if_exists(&self.meta_path(key)).await;
        let payload = remove_if_exists(&self.payload_path(key)).await;
        Ok(meta? | payload?)
    }

    /// Delete the entry only if its payload is still older than `max_age`.
    /// An entry rewritten since it was seen expired is kept. Returns whether
    /// anything was removed.
    pub async fn delete_if_expired(&self, key: &CacheKey) -> Result<bool> {
        self.delete_if_expired_at(key, SystemTime::now()).await
    }

    pub(crate) async fn delete_if_expired_at(
        &self,
        key: &CacheKey,
        now: SystemTime,
    ) -> Result<bool> {
        let _exclusive = self.writes.write().await;

        let modified = match fs::metadata(self.payload_path(key)).await {
            Ok(stat) => stat.modified()?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if age(now, modified) <= self.max_age {
            debug!(key = %key, "Entry refreshed since it expired, keeping it");
            return Ok(false);
        }
        self.delete(key).await
    }

    /// Whether a payload file exists for `key`. Errors count as absent.
    pub async fn contains(&self, key: &CacheKey) -> bool {
        matches!(fs::try_exists(self.payload_path(key)).await, Ok(true))
    }

    pub async fn read_metadata(&self, key: &CacheKey) -> Result<EntryMetadata> {
        let raw = fs::read(self.meta_path(key)).await?;
        let meta: EntryMetadata = serde_json::from_slice(&raw)?;
        if meta.key != *key {
            return Err(CacheError::CorruptEntry(format!(
                "metadata for {} names key {}",
                key, meta.key
            )));
        }
        Ok(meta)
    }

    async fn write_metadata(&self, meta: &EntryMetadata) -> Result<()> {
        let json = serde_json::to_vec_pretty(meta)?;
        self.write_atomic(&Self::meta_name(&meta.key), &json).await
    }

    async fn write_atomic(&self, file_name: &str, bytes: &[u8]) -> Result<()> {
        let tmp = self.directory.join(format!(
            ".{}.{}.{}{}",
            file_name,
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed),
            TMP_SUFFIX
        ));

        if let Err(e) = fs::write(&tmp, bytes).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&tmp, self.directory.join(file_name)).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    fn classify(&self, name: &str) -> FileKind {
        if let Some(stem) = name.strip_suffix(META_SUFFIX) {
            return CacheKey::parse(stem).map_or(FileKind::Other, FileKind::Metadata);
        }
        if name.starts_with('.') && name.ends_with(TMP_SUFFIX) {
            return FileKind::Temp;
        }
        name.strip_suffix(self.extension.as_str())
            .and_then(|s| s.strip_suffix('.'))
            .and_then(CacheKey::parse)
            .map_or(FileKind::Other, FileKind::Payload)
    }

    /// Enumerate committed entries, pruning what cannot be served.
    ///
    /// Metadata without a payload and unparseable metadata are removed at
    /// once. Payloads without metadata and leftover temp files are removed
    /// once they are older than the orphan grace period, since a younger one
    /// may belong to a write still in progress.
    pub async fn scan_all(&self) -> Result<DiskScan> {
        self.scan_all_at(SystemTime::now()).await
    }

    pub(crate) async fn scan_all_at(&self, now: SystemTime) -> Result<DiskScan> {
        let mut meta_keys = Vec::new();
        let mut payload_keys = Vec::new();
        let mut temp_files = Vec::new();

        let mut dir = fs::read_dir(&self.directory).await?;
        loop {
            let item = match dir.next_entry().await {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Directory listing interrupted");
                    break;
                }
            };
            let Ok(name) = item.file_name().into_string() else {
                continue;
            };
            match self.classify(&name) {
                FileKind::Metadata(key) => meta_keys.push(key),
                FileKind::Payload(key) => payload_keys.push(key),
                FileKind::Temp => temp_files.push(item.path()),
                FileKind::Other => {}
            }
        }

        let mut scan = DiskScan::default();
        let committed: HashSet<CacheKey> = meta_keys.iter().cloned().collect();

        for key in meta_keys {
            match self.inspect(&key).await {
                Ok(Some(entry)) => scan.entries.push(entry),
                Ok(None) => {
                    debug!(key = %key, "Removing metadata without payload");
                    match remove_if_exists(&self.meta_path(&key)).await {
                        Ok(_) => scan.orphans_removed += 1,
                        Err(e) => {
                            warn!(key = %key, error = %e, "Failed to remove orphaned metadata");
                            scan.failures += 1;
                        }
                    }
                }
                Err(e) if e.is_not_found() => {
                    // Deleted by someone else since the listing
                }
                Err(e @ (CacheError::Metadata(_) | CacheError::CorruptEntry(_))) => {
                    warn!(key = %key, error = %e, "Removing corrupt entry");
                    match self.delete(&key).await {
                        Ok(_) => scan.orphans_removed += 1,
                        Err(e) => {
                            warn!(key = %key, error = %e, "Failed to remove corrupt entry");
                            scan.failures += 1;
                        }
                    }
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping unreadable entry");
                    scan.failures += 1;
                }
            }
        }

        let stale_paths = payload_keys
            .iter()
            .filter(|key| !committed.contains(*key))
            .map(|key| self.payload_path(key))
            .chain(temp_files);

        for path in stale_paths {
            match self.older_than_grace(&path, now).await {
                Ok(true) => match remove_if_exists(&path).await {
                    Ok(true) => {
                        debug!(path = ?path, "Removed orphaned file");
                        scan.orphans_removed += 1;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!(path = ?path, error = %e, "Failed to remove orphaned file");
                        scan.failures += 1;
                    }
                },
                Ok(false) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    warn!(path = ?path, error = %e, "Skipping unreadable file");
                    scan.failures += 1;
                }
            }
        }

        Ok(scan)
    }

    /// Load one committed entry; `None` when its payload is missing
    async fn inspect(&self, key: &CacheKey) -> Result<Option<DiskEntry>> {
        let metadata = self.read_metadata(key).await?;
        let stat = match fs::metadata(self.payload_path(key)).await {
            Ok(stat) => stat,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(DiskEntry {
            key: key.clone(),
            metadata,
            size: stat.len(),
            modified: stat.modified()?,
        }))
    }

    async fn older_than_grace(&self, path: &Path, now: SystemTime) -> Result<bool> {
        let modified = fs::metadata(path).await?.modified()?;
        Ok(age(now, modified) > self.orphan_grace)
    }

    /// Count committed entries and their payload bytes without touching
    /// anything
    pub async fn usage(&self) -> Result<DiskUsage> {
        let mut usage = DiskUsage::default();
        let mut dir = fs::read_dir(&self.directory).await?;

        while let Some(item) = dir.next_entry().await? {
            let Ok(name) = item.file_name().into_string() else {
                continue;
            };
            let FileKind::Metadata(key) = self.classify(&name) else {
                continue;
            };
            if let Ok(stat) = fs::metadata(self.payload_path(&key)).await {
                usage.entries += 1;
                usage.total_bytes += stat.len();
            }
        }

        Ok(usage)
    }

    /// Delete every file in the directory. Failures are logged and the
    /// remaining files are still attempted. Returns the number removed.
    pub async fn clear(&self) -> Result<usize> {
        let mut dir = fs::read_dir(&self.directory).await?;
        let mut removed = 0;
        let mut failed = 0;

        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            match item.file_type().await {
                Ok(kind) if kind.is_file() => {}
                _ => continue,
            }
            match remove_if_exists(&path).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(path = ?path, error = %e, "Failed to remove cache file");
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            warn!(removed, failed, "Disk tier partially cleared");
        }
        Ok(removed)
    }
}

fn age(now: SystemTime, modified: SystemTime) -> Duration {
    now.duration_since(modified).unwrap_or(Duration::ZERO)
}

fn log_stat_failure(key: &CacheKey, err: &std::io::Error) {
    if err.kind() != std::io::ErrorKind::NotFound {
        warn!(key = %key, error = %err, "Disk tier read failed, treating as miss");
    }
}

async fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::RetrievalMethod;
    use serde_json::Value;
    use tempfile::tempdir;

    const HOUR: Duration = Duration::from_secs(3600);

    fn key(n: u8) -> CacheKey {
        CacheKey::parse(&format!("{:02x}", n).repeat(32)).unwrap()
    }

    fn meta(key: &CacheKey, size: usize) -> EntryMetadata {
        EntryMetadata {
            key: key.clone(),
            method: RetrievalMethod::Mojang,
            model_type: "minimal".to_string(),
            size: size as u64,
            created: Utc::now(),
            last_access: Some(Utc::now()),
            generate_options: Value::Null,
            background_options: None,
        }
    }

    fn tier(dir: &Path) -> DiskTier {
        DiskTier::new(dir.to_path_buf(), "png", HOUR, Duration::from_secs(60))
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(time).unwrap();
    }

    async fn put(tier: &DiskTier, key: &CacheKey, payload: &[u8]) {
        tier.put(key, payload, &meta(key, payload.len())).await.unwrap();
    }

    #[tokio::test]
    async fn test_init_creates_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a/b/cache");
        let tier = tier(&nested);
        tier.init().await.unwrap();
        assert!(nested.is_dir());
        assert!(!nested.join(PROBE_FILE).exists());
    }

    #[tokio::test]
    async fn test_init_fails_when_path_is_a_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();

        let err = tier(&file).init().await.unwrap_err();
        assert!(matches!(err, CacheError::Config(_)));
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let dir = tempdir().unwrap();
        let tier = tier(dir.path());
        put(&tier, &key(1), b"png bytes").await;

        assert!(tier.payload_path(&key(1)).exists());
        assert!(tier.meta_path(&key(1)).exists());
        assert_eq!(tier.get(&key(1)).await, DiskLookup::Hit(b"png bytes".to_vec()));
        assert_eq!(tier.get(&key(2)).await, DiskLookup::Absent);
    }

    #[tokio::test]
    async fn test_no_temp_files_left_after_put() {
        let dir = tempdir().unwrap();
        let tier = tier(dir.path());
        put(&tier, &key(1), b"x").await;

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names.len(), 2, "{:?}", names);
    }

    #[tokio::test]
    async fn test_get_updates_last_access() {
        let dir = tempdir().unwrap();
        let tier = tier(dir.path());
        let k = key(1);
        let mut m = meta(&k, 1);
        m.last_access = Some(Utc::now() - chrono::Duration::minutes(30));
        tier.put(&k, b"x", &m).await.unwrap();

        let before = tier.read_metadata(&k).await.unwrap().last_access.unwrap();
        assert!(matches!(tier.get(&k).await, DiskLookup::Hit(_)));
        let after = tier.read_metadata(&k).await.unwrap().last_access.unwrap();
        assert!(after > before);
    }

    #[tokio::test]
    async fn test_missing_metadata_is_absent() {
        let dir = tempdir().unwrap();
        let tier = tier(dir.path());
        put(&tier, &key(1), b"x").await;
        std::fs::remove_file(tier.meta_path(&key(1))).unwrap();

        assert_eq!(tier.get(&key(1)).await, DiskLookup::Absent);
    }

    #[tokio::test]
    async fn test_missing_payload_is_absent() {
        let dir = tempdir().unwrap();
        let tier = tier(dir.path());
        put(&tier, &key(1), b"x").await;
        std::fs::remove_file(tier.payload_path(&key(1))).unwrap();

        assert_eq!(tier.get(&key(1)).await, DiskLookup::Absent);
    }

    #[tokio::test]
    async fn test_corrupt_metadata_is_absent() {
        let dir = tempdir().unwrap();
        let tier = tier(dir.path());
        put(&tier, &key(1), b"x").await;
        std::fs::write(tier.meta_path(&key(1)), b"{ truncated").unwrap();

        assert_eq!(tier.get(&key(1)).await, DiskLookup::Absent);
    }

    #[tokio::test]
    async fn test_expired_entry() {
        let dir = tempdir().unwrap();
        let tier = tier(dir.path());
        put(&tier, &key(1), b"x").await;
        set_mtime(&tier.payload_path(&key(1)), SystemTime::now() - 2 * HOUR);

        assert_eq!(tier.get(&key(1)).await, DiskLookup::Expired);
        // The read path leaves deletion to the caller
        assert!(tier.payload_path(&key(1)).exists());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let tier = tier(dir.path());
        put(&tier, &key(1), b"x").await;

        assert!(tier.delete(&key(1)).await.unwrap());
        assert!(!tier.delete(&key(1)).await.unwrap());
        assert!(!tier.payload_path(&key(1)).exists());
        assert!(!tier.meta_path(&key(1)).exists());
    }

    #[tokio::test]
    async fn test_delete_if_expired_removes_stale_entry() {
        let dir = tempdir().unwrap();
        let tier = tier(dir.path());
        put(&tier, &key(1), b"x").await;
        set_mtime(&tier.payload_path(&key(1)), SystemTime::now() - 2 * HOUR);

        assert!(tier.delete_if_expired(&key(1)).await.unwrap());
        assert!(!tier.payload_path(&key(1)).exists());
        assert!(!tier.meta_path(&key(1)).exists());
        assert!(!tier.delete_if_expired(&key(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_if_expired_keeps_rewritten_entry() {
        let dir = tempdir().unwrap();
        let tier = tier(dir.path());
        put(&tier, &key(1), b"old").await;
        set_mtime(&tier.payload_path(&key(1)), SystemTime::now() - 2 * HOUR);
        assert_eq!(tier.get(&key(1)).await, DiskLookup::Expired);

        put(&tier, &key(1), b"new").await;

        assert!(!tier.delete_if_expired(&key(1)).await.unwrap());
        assert_eq!(tier.get(&key(1)).await, DiskLookup::Hit(b"new".to_vec()));
    }

    #[tokio::test]
    async fn test_contains_checks_payload() {
        let dir = tempdir().unwrap();
        let tier = tier(dir.path());
        assert!(!tier.contains(&key(1)).await);

        put(&tier, &key(1), b"x").await;
        assert!(tier.contains(&key(1)).await);

        tier.delete(&key(1)).await.unwrap();
        assert!(!tier.contains(&key(1)).await);
    }

    #[tokio::test]
    async fn test_scan_lists_committed_entries() {
        let dir = tempdir().unwrap();
        let tier = tier(dir.path());
        put(&tier, &key(1), b"aaaa").await;
        put(&tier, &key(2), b"bb").await;
        std::fs::write(dir.path().join("README"), b"not ours").unwrap();

        let scan = tier.scan_all().await.unwrap();
        assert_eq!(scan.entries.len(), 2);
        assert_eq!(scan.orphans_removed, 0);
        let total: u64 = scan.entries.iter().map(|e| e.size).sum();
        assert_eq!(total, 6);
        assert!(dir.path().join("README").exists());
    }

    #[tokio::test]
    async fn test_scan_prunes_metadata_without_payload() {
        let dir = tempdir().unwrap();
        let tier = tier(dir.path());
        put(&tier, &key(1), b"x").await;
        std::fs::remove_file(tier.payload_path(&key(1))).unwrap();

        let scan = tier.scan_all().await.unwrap();
        assert!(scan.entries.is_empty());
        assert_eq!(scan.orphans_removed, 1);
        assert!(!tier.meta_path(&key(1)).exists());
    }

    #[tokio::test]
    async fn test_scan_removes_old_payload_orphans_only() {
        let dir = tempdir().unwrap();
        let tier = tier(dir.path());
        let old = tier.payload_path(&key(1));
        let fresh = tier.payload_path(&key(2));
        std::fs::write(&old, b"old").unwrap();
        std::fs::write(&fresh, b"fresh").unwrap();
        set_mtime(&old, SystemTime::now() - Duration::from_secs(600));

        let scan = tier.scan_all().await.unwrap();
        assert_eq!(scan.orphans_removed, 1);
        assert!(!old.exists());
        assert!(fresh.exists());
    }

    #[tokio::test]
    async fn test_scan_removes_stale_temp_files() {
        let dir = tempdir().unwrap();
        let tier = tier(dir.path());
        let tmp = dir.path().join(format!(".{}.png.1.0.tmp", key(1)));
        std::fs::write(&tmp, b"partial").unwrap();
        set_mtime(&tmp, SystemTime::now() - Duration::from_secs(600));

        let scan = tier.scan_all().await.unwrap();
        assert_eq!(scan.orphans_removed, 1);
        assert!(!tmp.exists());
    }

    #[tokio::test]
    async fn test_scan_removes_corrupt_entries() {
        let dir = tempdir().unwrap();
        let tier = tier(dir.path());
        put(&tier, &key(1), b"x").await;
        std::fs::write(tier.meta_path(&key(1)), b"garbage").unwrap();

        let scan = tier.scan_all().await.unwrap();
        assert!(scan.entries.is_empty());
        assert_eq!(scan.orphans_removed, 1);
        assert!(!tier.payload_path(&key(1)).exists());
        assert!(!tier.meta_path(&key(1)).exists());
    }

    #[tokio::test]
    async fn test_usage_is_read_only() {
        let dir = tempdir().unwrap();
        let tier = tier(dir.path());
        put(&tier, &key(1), b"12345").await;
        put(&tier, &key(2), b"123").await;
        put(&tier, &key(3), b"1").await;
        std::fs::remove_file(tier.payload_path(&key(3))).unwrap();

        let usage = tier.usage().await.unwrap();
        assert_eq!(usage, DiskUsage { entries: 2, total_bytes: 8 });
        // The orphan is only counted out, not removed
        assert!(tier.meta_path(&key(3)).exists());
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let dir = tempdir().unwrap();
        let tier = tier(dir.path());
        put(&tier, &key(1), b"x").await;
        put(&tier, &key(2), b"y").await;
        std::fs::create_dir(dir.path().join("subdir")).unwrap();

        assert_eq!(tier.clear().await.unwrap(), 4);
        assert_eq!(tier.usage().await.unwrap(), DiskUsage::default());
        assert!(dir.path().join("subdir").is_dir());
    }
}
