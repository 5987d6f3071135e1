//! In-memory cache of extracted archives.
//!
//! ZIP artifacts are downloaded and extracted once, then served from memory
//! until their time-to-live runs out.
//!
//! ## Keys
//!
//! Entries are keyed by prototyper ID, prototype ID, and source URL. Editing
//! a prototype changes its source URL, so a stale entry is simply never hit
//! again and ages out.
//!
//! ## Expiry
//!
//! There is no background timer. Every lookup first sweeps the whole table
//! and drops entries whose expiry has passed, so eviction keeps working in
//! single-threaded or short-lived deployments. The clock is injected so
//! tests can step past the TTL deterministically.
//!
//! ## Coalescing
//!
//! Concurrent misses on the same key wait on a per-key async lock; the first
//! waiter loads, the rest re-check the table and find the fresh entry.
//! The lock is dropped from the map once its last holder goes away, even if
//! that holder's request was cancelled mid-load.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use protogate_core::metrics::names;
use protogate_core::{ArchiveTable, ExtractOptions, extract_archive};

use crate::error::GatewayError;
use crate::fetch::BlobFetcher;

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock [`Clock`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Identity of one cached archive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Owning prototyper.
    pub prototyper_id: String,
    /// Prototype within the prototyper's workspace.
    pub prototype_id: String,
    /// Blob URL the archive was fetched from.
    pub source_url: String,
}

impl CacheKey {
    /// Build a key from its parts.
    pub fn new(prototyper_id: &str, prototype_id: &str, source_url: &str) -> Self {
        Self {
            prototyper_id: prototyper_id.to_string(),
            prototype_id: prototype_id.to_string(),
            source_url: source_url.to_string(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}@{}",
            self.prototyper_id, self.prototype_id, self.source_url
        )
    }
}

/// A member resolved out of a cached archive.
#[derive(Debug, Clone)]
pub struct ResolvedMember {
    /// Stored path that matched (after extensionless fallbacks).
    pub path: String,
    /// Member bytes.
    pub data: Bytes,
}

#[derive(Clone)]
struct CacheEntry {
    table: Arc<ArchiveTable>,
    expires_at: DateTime<Utc>,
}

/// Process-wide table of extracted archives.
pub struct ArchiveCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    loading: LoadingMap,
    fetcher: Arc<dyn BlobFetcher>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    extract: ExtractOptions,
}

impl ArchiveCache {
    /// Create an empty cache.
    pub fn new(
        fetcher: Arc<dyn BlobFetcher>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        extract: ExtractOptions,
    ) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self {
            entries: RwLock::new(HashMap::new()),
            loading: Mutex::new(HashMap::new()),
            fetcher,
            clock,
            ttl,
            extract,
        }
    }

    /// Number of archives currently held (expired ones included until swept).
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop every entry whose expiry has passed. Returns the number evicted.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| now <= entry.expires_at);
        let evicted = before - entries.len();

        if evicted > 0 {
            tracing::debug!(evicted, remaining = entries.len(), "archive cache swept");
            metrics::counter!(names::ARCHIVE_CACHE_EVICTIONS).increment(evicted as u64);
        }
        metrics::gauge!(names::ARCHIVE_CACHE_ENTRIES).set(entries.len() as f64);

        evicted
    }

    /// Resolve `requested` inside the archive identified by `key`.
    ///
    /// Loads the archive on a miss. See [`ArchiveTable::resolve`] for the
    /// fallback order.
    pub async fn resolve(
        &self,
        key: &CacheKey,
        requested: &str,
    ) -> Result<ResolvedMember, GatewayError> {
        let table = self.table(key).await?;

        table
            .resolve(requested)
            .map(|(path, data)| ResolvedMember {
                path: path.to_string(),
                data: data.clone(),
            })
            .ok_or_else(|| GatewayError::MemberNotFound(requested.to_string()))
    }

    /// Get the extracted table for `key`, loading it on a miss or expiry.
    pub async fn table(&self, key: &CacheKey) -> Result<Arc<ArchiveTable>, GatewayError> {
        self.sweep();

        if let Some(table) = self.fresh(key) {
            tracing::debug!(key = %key, "archive cache hit");
            metrics::counter!(names::ARCHIVE_CACHE_HITS).increment(1);
            return Ok(table);
        }

        let slot = LoadSlot::claim(&self.loading, key);
        let _guard = slot.lock.lock().await;

        // Another request may have finished loading while we waited
        if let Some(table) = self.fresh(key) {
            tracing::debug!(key = %key, "archive cache hit after wait");
            metrics::counter!(names::ARCHIVE_CACHE_HITS).increment(1);
            return Ok(table);
        }

        tracing::debug!(key = %key, "archive cache miss, loading");
        metrics::counter!(names::ARCHIVE_CACHE_MISSES).increment(1);

        self.load(key).await
    }

    fn fresh(&self, key: &CacheKey) -> Option<Arc<ArchiveTable>> {
        let now = self.clock.now();
        self.entries
            .read()
            .get(key)
            .filter(|entry| now <= entry.expires_at)
            .map(|entry| entry.table.clone())
    }

    async fn load(&self, key: &CacheKey) -> Result<Arc<ArchiveTable>, GatewayError> {
        let data = self.fetcher.fetch(&key.source_url).await.map_err(|e| {
            metrics::counter!(names::UPSTREAM_FETCH_FAILURES).increment(1);
            GatewayError::UpstreamFetchFailed(format!("{}: {e}", key.source_url))
        })?;
        metrics::counter!(names::UPSTREAM_FETCH_BYTES).increment(data.len() as u64);

        let opts = self.extract.clone();
        let started = Instant::now();
        let table = tokio::task::spawn_blocking(move || extract_archive(&data, &opts))
            .await
            .map_err(|e| GatewayError::Internal(anyhow::anyhow!("extraction task failed: {e}")))??;
        metrics::histogram!(names::ARCHIVE_EXTRACT_SECONDS).record(started.elapsed().as_secs_f64());

        tracing::info!(
            key = %key,
            files = table.len(),
            bytes = table.total_bytes(),
            stripped_prefix = ?table.stripped_prefix(),
            "archive extracted"
        );

        let table = Arc::new(table);
        let entry = CacheEntry {
            table: table.clone(),
            expires_at: self
                .clock
                .now()
                .checked_add_signed(self.ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        self.entries.write().insert(key.clone(), entry);

        Ok(table)
    }
}

type LoadingMap = Mutex<HashMap<CacheKey, Arc<tokio::sync::Mutex<()>>>>;

/// One caller's hold on the per-key load lock.
struct LoadSlot<'a> {
    loading: &'a LoadingMap,
    key: &'a CacheKey,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl<'a> LoadSlot<'a> {
    fn claim(loading: &'a LoadingMap, key: &'a CacheKey) -> Self {
        let lock = loading.lock().entry(key.clone()).or_default().clone();
        Self { loading, key, lock }
    }
}

impl Drop for LoadSlot<'_> {
    fn drop(&mut self) {
        // Clones are only taken under the map lock, so the count is stable here
        let mut loading = self.loading.lock();
        let last_holder = loading
            .get(self.key)
            .is_some_and(|lock| Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2);
        if last_holder {
            loading.remove(self.key);
        }
    }
}
