//! Prometheus metrics helpers for the gateway.
//!
//! # Usage
//!
//! ```rust,ignore
//! use protogate_core::metrics::{init_metrics, start_metrics_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     if let Some(handle) = init_metrics() {
//!         start_metrics_server(9091, handle).await.unwrap();
//!     }
//!
//!     metrics::counter!(protogate_core::metrics::names::ARCHIVE_CACHE_HITS).increment(1);
//! }
//! ```
//!
//! # Metric Naming Conventions
//!
//! - Prefix: subsystem (`gateway_`, `archive_`, `upstream_`, `jsx_`)
//! - Suffix: unit or type (`_total`, `_bytes`, `_seconds`)
//! - Labels: only low-cardinality values (artifact kind, error code)

use axum::{Router, routing::get};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Metric names used across the gateway.
pub mod names {
    /// Requests handled, labelled by artifact `kind`.
    pub const GATEWAY_REQUESTS: &str = "gateway_requests_total";
    /// Error responses, labelled by `error` code.
    pub const GATEWAY_ERRORS: &str = "gateway_errors_total";
    /// Archive cache lookups served from memory.
    pub const ARCHIVE_CACHE_HITS: &str = "archive_cache_hits_total";
    /// Archive cache lookups that required a fetch.
    pub const ARCHIVE_CACHE_MISSES: &str = "archive_cache_misses_total";
    /// Expired archives removed by the sweep.
    pub const ARCHIVE_CACHE_EVICTIONS: &str = "archive_cache_evictions_total";
    /// Archives currently held in memory.
    pub const ARCHIVE_CACHE_ENTRIES: &str = "archive_cache_entries";
    /// Time spent extracting archives.
    pub const ARCHIVE_EXTRACT_SECONDS: &str = "archive_extract_seconds";
    /// Bytes downloaded from upstream blob storage.
    pub const UPSTREAM_FETCH_BYTES: &str = "upstream_fetch_bytes_total";
    /// Failed upstream fetches.
    pub const UPSTREAM_FETCH_FAILURES: &str = "upstream_fetch_failures_total";
    /// Component documents served from the rendered-document cache.
    pub const JSX_DOCUMENT_CACHE_HITS: &str = "jsx_document_cache_hits_total";
}

/// Install the Prometheus recorder and register metric descriptions.
///
/// Returns `None` if a recorder is already installed.
pub fn init_metrics() -> Option<PrometheusHandle> {
    let handle = try_init_metrics()?;
    register_gateway_metrics();
    Some(handle)
}

/// Try to install the Prometheus recorder without registering descriptions.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    PrometheusBuilder::new().install_recorder().ok()
}

/// Start the Prometheus metrics HTTP server.
///
/// Binds `0.0.0.0:{port}` before returning, then serves `/metrics` from a
/// background task.
pub async fn start_metrics_server(
    port: u16,
    handle: PrometheusHandle,
) -> Result<(), std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "metrics server stopped");
        }
    });

    Ok(())
}

/// Register descriptions for every gateway metric.
///
/// Called automatically by [`init_metrics`].
fn register_gateway_metrics() {
    describe_counter!(
        names::GATEWAY_REQUESTS,
        "Serving requests handled, by artifact kind"
    );
    describe_counter!(names::GATEWAY_ERRORS, "Error responses, by error code");

    describe_counter!(
        names::ARCHIVE_CACHE_HITS,
        "Archive lookups answered from the in-memory cache"
    );
    describe_counter!(
        names::ARCHIVE_CACHE_MISSES,
        "Archive lookups that fetched and extracted the archive"
    );
    describe_counter!(
        names::ARCHIVE_CACHE_EVICTIONS,
        "Expired archives removed by the lazy sweep"
    );
    describe_gauge!(
        names::ARCHIVE_CACHE_ENTRIES,
        "Extracted archives currently held in memory"
    );
    describe_histogram!(
        names::ARCHIVE_EXTRACT_SECONDS,
        "Time spent extracting one archive"
    );

    describe_counter!(
        names::UPSTREAM_FETCH_BYTES,
        "Bytes downloaded from artifact blob storage"
    );
    describe_counter!(
        names::UPSTREAM_FETCH_FAILURES,
        "Artifact downloads that failed or returned a non-success status"
    );

    describe_counter!(
        names::JSX_DOCUMENT_CACHE_HITS,
        "Component documents served without re-running the transpiler"
    );
}
