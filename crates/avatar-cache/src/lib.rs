//! Two-tier cache for rendered avatar images
//!
//! Artifacts are addressed by a [`CacheKey`] derived from the
//! [`RequestDescriptor`] that produced them. Lookups hit a bounded in-memory
//! tier first and fall back to an on-disk tier of payload + JSON metadata
//! files. A background scheduler expires old entries and keeps the disk tier
//! under its byte budget by evicting the least recently accessed entries.
//!
//! ```ignore
//! let cache = AvatarCache::open(CacheConfig::with_directory("./cache")).await?;
//! let descriptor = RequestDescriptor::new(
//!     RetrievalMethod::Mojang,
//!     SkinSource::username("Notch"),
//!     "minimal",
//! );
//!
//! let png = match cache.get(&descriptor).await {
//!     Some(png) => png,
//!     None => {
//!         let png = render(&descriptor).await?;
//!         cache.put(&descriptor, &png).await;
//!         png
//!     }
//! };
//! ```

mod cache;
mod cleanup;
mod config;
mod disk;
mod error;
mod key;
mod memory;
mod reclaim;
mod types;

pub use cache::AvatarCache;
pub use config::CacheConfig;
pub use disk::{DiskLookup, DiskScan, DiskTier, DiskUsage};
pub use error::{CacheError, Result};
pub use key::{content_hash, derive_key, CacheKey, RequestDescriptor, RetrievalMethod, SkinSource};
pub use memory::MemoryTier;
pub use reclaim::{spawn_scheduler, Reclaimer};
pub use types::{CacheStatistics, DiskEntry, EntryMetadata, ReclaimReport};
