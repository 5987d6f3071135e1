//! Application state shared across all request handlers.

use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use moka::future::Cache;
use protogate_core::ExtractOptions;

use crate::cache::{ArchiveCache, Clock, SystemClock};
use crate::config::{Config, StoreSource};
use crate::fetch::{BlobFetcher, HttpFetcher};
use crate::store::{ArtifactStore, HttpArtifactStore, ManifestArtifactStore};
use crate::transpile::{EsbuildTranspiler, Transpiler};

/// A rendered JSX/TSX document.
#[derive(Clone, Debug)]
pub struct CachedDocument {
    /// Complete HTML document.
    pub html: Bytes,
    /// When this entry was cached.
    pub cached_at: chrono::DateTime<chrono::Utc>,
}

/// Rendered component documents keyed by source URL and file name.
pub type DocumentCache = Cache<String, CachedDocument>;

/// Rendered documents are small (a few KB each).
const DOCUMENT_CACHE_CAPACITY: u64 = 10_000;

/// Shared application state available to all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,

    /// Artifact record lookup.
    pub store: Arc<dyn ArtifactStore>,

    /// Blob downloads for non-archive artifacts.
    pub fetcher: Arc<dyn BlobFetcher>,

    /// JSX/TSX syntax stripping.
    pub transpiler: Arc<dyn Transpiler>,

    /// Extracted ZIP archives.
    pub archives: Arc<ArchiveCache>,

    /// Rendered component documents.
    pub documents: DocumentCache,
}

impl AppState {
    /// Create the production state: HTTP fetcher, configured store,
    /// `esbuild` transpiler, wall clock.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .user_agent(concat!("protogate-serve/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;

        let store: Arc<dyn ArtifactStore> = match &config.store {
            StoreSource::Http(url) => Arc::new(HttpArtifactStore::new(client.clone(), url)),
            StoreSource::Manifest(path) => Arc::new(ManifestArtifactStore::from_path(path)?),
        };

        let transpiler = Arc::new(EsbuildTranspiler::new(config.esbuild_path.clone()));

        Ok(Self::with_collaborators(
            config,
            store,
            Arc::new(HttpFetcher::new(client)),
            transpiler,
            Arc::new(SystemClock),
        ))
    }

    /// Assemble state from explicit collaborators.
    pub fn with_collaborators(
        config: Config,
        store: Arc<dyn ArtifactStore>,
        fetcher: Arc<dyn BlobFetcher>,
        transpiler: Arc<dyn Transpiler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let archives = ArchiveCache::new(
            fetcher.clone(),
            clock,
            config.archive_ttl,
            ExtractOptions {
                max_total_bytes: config.max_archive_bytes,
            },
        );

        let documents = Cache::builder()
            .max_capacity(DOCUMENT_CACHE_CAPACITY)
            .time_to_live(config.archive_ttl)
            .build();

        tracing::info!(
            archive_ttl_secs = config.archive_ttl.as_secs(),
            max_archive_bytes = config.max_archive_bytes,
            document_cache_capacity = DOCUMENT_CACHE_CAPACITY,
            "application state initialized"
        );

        Self {
            config: Arc::new(config),
            store,
            fetcher,
            transpiler,
            archives: Arc::new(archives),
            documents,
        }
    }
}
