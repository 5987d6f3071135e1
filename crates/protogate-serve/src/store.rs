//! Artifact metadata lookup.
//!
//! The gateway only reads artifact records: which file a prototype points
//! at and where its bytes live. Two backends are provided:
//!
//! - [`HttpArtifactStore`] - a document store exposed over HTTP
//! - [`ManifestArtifactStore`] - a JSON manifest loaded once at startup

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use protogate_core::FileKind;
use reqwest::StatusCode;
use serde::Deserialize;

/// The slice of a prototype record the gateway needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRecord {
    /// Declared file name; its extension selects the serving strategy.
    #[serde(default)]
    pub file_name: String,

    /// Durable blob URL of the artifact. Empty when nothing is uploaded.
    #[serde(default)]
    pub file_url: String,
}

impl ArtifactRecord {
    /// Serving strategy for this record.
    pub fn kind(&self) -> FileKind {
        FileKind::from_file_name(&self.file_name)
    }

    /// Returns true if the record points at a source file.
    pub fn has_source(&self) -> bool {
        !self.file_url.trim().is_empty()
    }
}

/// Lookup of artifact records by prototyper and prototype ID.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Fetch the record, or `None` if it does not exist.
    async fn lookup(
        &self,
        prototyper_id: &str,
        prototype_id: &str,
    ) -> anyhow::Result<Option<ArtifactRecord>>;
}

/// Document store reached over HTTP.
///
/// Records are read from
/// `{base_url}/prototypers/{prototyper_id}/prototypes/{prototype_id}`.
#[derive(Debug, Clone)]
pub struct HttpArtifactStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpArtifactStore {
    /// Create a store client. `base_url` may carry a trailing slash.
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn record_url(&self, prototyper_id: &str, prototype_id: &str) -> String {
        format!(
            "{}/prototypers/{prototyper_id}/prototypes/{prototype_id}",
            self.base_url
        )
    }
}

#[async_trait]
impl ArtifactStore for HttpArtifactStore {
    async fn lookup(
        &self,
        prototyper_id: &str,
        prototype_id: &str,
    ) -> anyhow::Result<Option<ArtifactRecord>> {
        let url = self.record_url(prototyper_id, prototype_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("document store request to {url} failed"))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = response
            .error_for_status()
            .context("document store returned an error status")?;

        let record = response
            .json::<ArtifactRecord>()
            .await
            .context("document store returned an invalid record")?;

        Ok(Some(record))
    }
}

/// Read-only store backed by a JSON manifest:
///
/// ```json
/// { "alice/p1": { "fileName": "site.zip", "fileUrl": "https://..." } }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManifestArtifactStore {
    records: HashMap<String, ArtifactRecord>,
}

impl ManifestArtifactStore {
    /// Load a manifest file.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        let store = Self::from_json(&text)
            .with_context(|| format!("failed to parse manifest {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            records = store.len(),
            "artifact manifest loaded"
        );

        Ok(store)
    }

    /// Parse a manifest document.
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        let records: HashMap<String, ArtifactRecord> = serde_json::from_str(text)?;
        Ok(Self { records })
    }

    /// Build a store from `(prototyper_id, prototype_id, record)` triples.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = (String, String, ArtifactRecord)>,
    {
        let records = records
            .into_iter()
            .map(|(prototyper_id, prototype_id, record)| {
                (manifest_key(&prototyper_id, &prototype_id), record)
            })
            .collect();
        Self { records }
    }

    /// Number of records in the manifest.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the manifest holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl ArtifactStore for ManifestArtifactStore {
    async fn lookup(
        &self,
        prototyper_id: &str,
        prototype_id: &str,
    ) -> anyhow::Result<Option<ArtifactRecord>> {
        Ok(self
            .records
            .get(&manifest_key(prototyper_id, prototype_id))
            .cloned())
    }
}

fn manifest_key(prototyper_id: &str, prototype_id: &str) -> String {
    format!("{prototyper_id}/{prototype_id}")
}
