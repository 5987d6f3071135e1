//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use protogate_core::{DEFAULT_ARCHIVE_TTL_SECS, DEFAULT_MAX_ARCHIVE_BYTES, ImportMapOptions};

/// Where artifact records come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreSource {
    /// Document store reached over HTTP at this base URL.
    Http(String),
    /// JSON manifest file read at startup.
    Manifest(PathBuf),
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g., "0.0.0.0:8080").
    pub bind_addr: String,

    /// Route prefix of the serving endpoint, without a trailing slash.
    pub serve_prefix: String,

    /// Artifact record source.
    pub store: StoreSource,

    /// ES-module CDN used for component import maps.
    pub cdn_url: String,

    /// React version pinned in component import maps.
    pub react_version: String,

    /// How long an extracted archive stays cached.
    pub archive_ttl: Duration,

    /// Ceiling on the total uncompressed size of one archive.
    pub max_archive_bytes: u64,

    /// Timeout for upstream HTTP requests.
    pub fetch_timeout: Duration,

    /// Path or name of the `esbuild` executable.
    pub esbuild_path: PathBuf,

    /// Port for the Prometheus exporter; disabled when unset.
    pub metrics_port: Option<u16>,
}

impl Config {
    /// Defaults for everything except the record source.
    pub fn with_store(store: StoreSource) -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            serve_prefix: "/serve".to_string(),
            store,
            cdn_url: "https://esm.sh".to_string(),
            react_version: "18.2.0".to_string(),
            archive_ttl: Duration::from_secs(DEFAULT_ARCHIVE_TTL_SECS),
            max_archive_bytes: DEFAULT_MAX_ARCHIVE_BYTES,
            fetch_timeout: Duration::from_secs(30),
            esbuild_path: PathBuf::from("esbuild"),
            metrics_port: None,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Required (one of):
    /// - `PROTOGATE_STORE_URL`: Base URL of the HTTP document store (wins if both are set)
    /// - `PROTOGATE_MANIFEST_PATH`: JSON manifest of artifact records
    ///
    /// Optional:
    /// - `PROTOGATE_BIND_ADDR`: Server bind address (default: "0.0.0.0:8080")
    /// - `PROTOGATE_SERVE_PREFIX`: Serving route prefix (default: "/serve")
    /// - `PROTOGATE_CDN_URL`: ES-module CDN (default: "https://esm.sh")
    /// - `PROTOGATE_REACT_VERSION`: Pinned React version (default: "18.2.0")
    /// - `PROTOGATE_ARCHIVE_TTL_SECS`: Archive cache TTL (default: 300)
    /// - `PROTOGATE_MAX_ARCHIVE_BYTES`: Uncompressed archive ceiling (default: 256 MiB)
    /// - `PROTOGATE_FETCH_TIMEOUT_SECS`: Upstream request timeout (default: 30)
    /// - `PROTOGATE_ESBUILD_PATH`: Transpiler executable (default: "esbuild")
    /// - `PROTOGATE_METRICS_PORT`: Prometheus exporter port (default: disabled)
    pub fn from_env() -> anyhow::Result<Self> {
        let store = match (
            non_empty_var("PROTOGATE_STORE_URL"),
            non_empty_var("PROTOGATE_MANIFEST_PATH"),
        ) {
            (Some(url), _) => StoreSource::Http(url.trim_end_matches('/').to_string()),
            (None, Some(path)) => StoreSource::Manifest(PathBuf::from(path)),
            (None, None) => anyhow::bail!(
                "PROTOGATE_STORE_URL or PROTOGATE_MANIFEST_PATH environment variable is required"
            ),
        };

        let defaults = Self::with_store(store);

        let bind_addr = non_empty_var("PROTOGATE_BIND_ADDR").unwrap_or(defaults.bind_addr);

        let serve_prefix = match non_empty_var("PROTOGATE_SERVE_PREFIX") {
            Some(prefix) => {
                let prefix = prefix.trim_end_matches('/').to_string();
                if !prefix.starts_with('/') {
                    anyhow::bail!("PROTOGATE_SERVE_PREFIX must start with '/'");
                }
                prefix
            }
            None => defaults.serve_prefix,
        };

        let cdn_url = non_empty_var("PROTOGATE_CDN_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.cdn_url);

        let react_version =
            non_empty_var("PROTOGATE_REACT_VERSION").unwrap_or(defaults.react_version);

        let archive_ttl = Duration::from_secs(parse_var(
            "PROTOGATE_ARCHIVE_TTL_SECS",
            DEFAULT_ARCHIVE_TTL_SECS,
        )?);

        let max_archive_bytes = parse_var("PROTOGATE_MAX_ARCHIVE_BYTES", DEFAULT_MAX_ARCHIVE_BYTES)?;

        let fetch_timeout = Duration::from_secs(parse_var("PROTOGATE_FETCH_TIMEOUT_SECS", 30)?);

        let esbuild_path = non_empty_var("PROTOGATE_ESBUILD_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.esbuild_path);

        let metrics_port = non_empty_var("PROTOGATE_METRICS_PORT")
            .map(|port| {
                port.parse::<u16>()
                    .with_context(|| format!("invalid PROTOGATE_METRICS_PORT: {port}"))
            })
            .transpose()?;

        tracing::info!(
            bind_addr = %bind_addr,
            serve_prefix = %serve_prefix,
            store = ?defaults.store,
            cdn_url = %cdn_url,
            archive_ttl_secs = archive_ttl.as_secs(),
            metrics_port = ?metrics_port,
            "configuration loaded"
        );

        Ok(Self {
            bind_addr,
            serve_prefix,
            store: defaults.store,
            cdn_url,
            react_version,
            archive_ttl,
            max_archive_bytes,
            fetch_timeout,
            esbuild_path,
            metrics_port,
        })
    }

    /// Import-map settings for component documents.
    pub fn import_map_options(&self) -> ImportMapOptions {
        ImportMapOptions {
            cdn_url: self.cdn_url.clone(),
            react_version: self.react_version.clone(),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match non_empty_var(name) {
        Some(value) => value
            .parse()
            .with_context(|| format!("invalid {name}: {value}")),
        None => Ok(default),
    }
}
