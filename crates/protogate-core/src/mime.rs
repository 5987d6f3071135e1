//! Content-type lookup and artifact file-type classification.

use std::path::Path;

/// Serving strategy selected by an artifact's declared file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// A ZIP bundle of a multi-file site.
    Zip,
    /// A JSX component module.
    Jsx,
    /// A TSX component module.
    Tsx,
    /// A standalone HTML document.
    Html,
    /// Anything else; proxied with a guessed content type.
    Other,
}

impl FileKind {
    /// Classify by the lower-cased extension of `file_name`.
    pub fn from_file_name(file_name: &str) -> Self {
        match extension(file_name).as_deref() {
            Some("zip") => Self::Zip,
            Some("jsx") => Self::Jsx,
            Some("tsx") => Self::Tsx,
            Some("html" | "htm") => Self::Html,
            _ => Self::Other,
        }
    }

    /// Short label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Jsx => "jsx",
            Self::Tsx => "tsx",
            Self::Html => "html",
            Self::Other => "other",
        }
    }
}

/// Content type for HTML responses.
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Content type for a file name, with `charset=utf-8` on text-like types.
///
/// Unknown extensions map to `application/octet-stream`.
pub fn content_type_for(file_name: &str) -> String {
    let mime = mime_guess::from_path(file_name).first_or_octet_stream();

    let textual = mime.type_() == mime_guess::mime::TEXT
        || matches!(
            mime.essence_str(),
            "application/javascript" | "application/json" | "application/xml" | "image/svg+xml"
        );

    if textual {
        format!("{}; charset=utf-8", mime.essence_str())
    } else {
        mime.essence_str().to_string()
    }
}

/// Returns true if `file_name` names an HTML document.
pub fn is_html(file_name: &str) -> bool {
    FileKind::from_file_name(file_name) == FileKind::Html
}

fn extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}
