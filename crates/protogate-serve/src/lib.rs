//! Protogate Serve - HTTP gateway for prototype artifacts.
//!
//! Turns an uploaded artifact (ZIP bundle, JSX/TSX component, or HTML
//! document) into a same-origin response that runs inside a sandboxed
//! iframe.
//!
//! # Architecture
//!
//! - **Store**: Artifact record lookup (HTTP document store or JSON manifest)
//! - **Fetch**: Blob downloads over HTTP
//! - **Cache**: Extracted archives with a TTL and lazy sweep
//! - **Transpile**: JSX/TSX syntax stripping via `esbuild`
//! - **Dispatch**: Per-file-type serving strategy
//! - **Routes**: `/health` plus `GET`/`OPTIONS` serving endpoints
//!
//! # URL Pattern
//!
//! ```text
//! GET /serve/{prototyper_id}/{prototype_id}/{*path}
//! ```
//!
//! Every response carries `Access-Control-Allow-Origin: *`; the sandboxed
//! iframe reports a `null` origin.

pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fetch;
pub mod routes;
pub mod state;
pub mod store;
pub mod transpile;

#[cfg(test)]
mod testing;

pub use self::config::{Config, StoreSource};
pub use self::error::GatewayError;
pub use self::routes::router;
pub use self::state::AppState;
