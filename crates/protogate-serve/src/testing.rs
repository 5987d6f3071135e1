//! Test doubles for the gateway's collaborators.

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use zip::write::{FileOptions, ZipWriter};

use crate::cache::Clock;
use crate::config::{Config, StoreSource};
use crate::fetch::{BlobFetcher, FetchError};
use crate::state::AppState;
use crate::store::{ArtifactRecord, ManifestArtifactStore};
use crate::transpile::{Dialect, Transpiler};

/// Serves canned bodies by URL and counts every call.
pub struct CountingFetcher {
    bodies: HashMap<String, Bytes>,
    calls: AtomicUsize,
}

impl CountingFetcher {
    pub fn new<'a, I>(bodies: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Bytes)>,
    {
        Self {
            bodies: bodies
                .into_iter()
                .map(|(url, body)| (url.to_string(), body))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobFetcher for CountingFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Yield so concurrent callers interleave
        tokio::task::yield_now().await;
        self.bodies.get(url).cloned().ok_or(FetchError::Status(404))
    }
}

/// Counts calls and never finishes a fetch.
pub struct PendingFetcher {
    calls: AtomicUsize,
}

impl PendingFetcher {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobFetcher for PendingFetcher {
    async fn fetch(&self, _url: &str) -> Result<Bytes, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += chrono::Duration::from_std(by).unwrap();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Returns the source unchanged, or fails on demand.
pub struct StubTranspiler {
    fail: bool,
    calls: AtomicUsize,
}

impl StubTranspiler {
    pub fn passthrough() -> Self {
        Self {
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transpiler for StubTranspiler {
    async fn transpile(&self, source: &str, _dialect: Dialect) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("Unexpected token at 1:1");
        }
        Ok(source.to_string())
    }
}

/// Build a ZIP archive in memory. Names ending in `/` become directories.
pub fn build_zip(entries: &[(&str, &[u8])]) -> Bytes {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options: FileOptions<()> = FileOptions::default();
    for (name, data) in entries {
        if name.ends_with('/') {
            zip.add_directory(*name, options).unwrap();
        } else {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
    }
    Bytes::from(zip.finish().unwrap().into_inner())
}

/// Shorthand for an artifact record.
pub fn record(file_name: &str, file_url: &str) -> ArtifactRecord {
    ArtifactRecord {
        file_name: file_name.to_string(),
        file_url: file_url.to_string(),
    }
}

/// Application state wired to in-memory collaborators.
pub fn test_state(
    records: Vec<(&str, &str, ArtifactRecord)>,
    fetcher: Arc<CountingFetcher>,
    transpiler: Arc<StubTranspiler>,
) -> AppState {
    let store = ManifestArtifactStore::from_records(
        records
            .into_iter()
            .map(|(a, b, r)| (a.to_string(), b.to_string(), r)),
    );
    let config = Config::with_store(StoreSource::Manifest("manifest.json".into()));

    AppState::with_collaborators(
        config,
        Arc::new(store),
        fetcher,
        transpiler,
        Arc::new(ManualClock::new()),
    )
}
