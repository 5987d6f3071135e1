//! Core logic for the Protogate prototype-serving gateway.
//!
//! This crate is I/O-free. It provides:
//! - Identifier and path validation for the `/serve` route
//! - ZIP extraction with metadata filtering and common-prefix stripping
//! - Member resolution with extensionless fallbacks
//! - HTML rewriting and the runtime request interception shim
//! - JSX/TSX auto-render documents with synthesized import maps
//! - Content-type lookup and Prometheus metrics helpers
//!
//! Fetching, caching, and HTTP concerns live in `protogate-serve`.

pub mod archive;
mod error;
pub mod html;
pub mod interceptor;
pub mod jsx;
pub mod metrics;
pub mod mime;
pub mod validate;

// ═══════════════════════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════════════════════

/// Default time-to-live for an extracted archive, in seconds.
pub const DEFAULT_ARCHIVE_TTL_SECS: u64 = 300;

/// Default ceiling on the total uncompressed size of one archive (256 MiB).
pub const DEFAULT_MAX_ARCHIVE_BYTES: u64 = 256 * 1024 * 1024;

pub use archive::{ArchiveTable, ExtractOptions, extract_archive};
pub use error::{Error, Result};
pub use html::rewrite_html;
pub use interceptor::interceptor_script;
pub use jsx::{ImportMapOptions, JsxDocument};
pub use mime::{FileKind, content_type_for};
pub use validate::{serving_base, validate_identifier, validate_request};
