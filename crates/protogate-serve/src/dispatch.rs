//! The request dispatcher.
//!
//! One request walks a fixed sequence: validate, look up the artifact
//! record, then branch on the declared file type:
//!
//! | type | source | response |
//! |------|--------|----------|
//! | `zip` | archive cache | rewritten HTML for HTML members, raw bytes otherwise |
//! | `jsx`/`tsx` | blob fetch | transpiled auto-render document |
//! | `html`/`htm` | blob fetch | the document verbatim |
//! | other | blob fetch | raw bytes with a guessed content type |
//!
//! The response is built only after every step succeeds; any failure
//! becomes a [`GatewayError`] and nothing partial is sent.

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use protogate_core::metrics::names;
use protogate_core::mime::{HTML_CONTENT_TYPE, is_html};
use protogate_core::{
    FileKind, JsxDocument, content_type_for, rewrite_html, serving_base, validate_request,
};

use crate::cache::CacheKey;
use crate::error::GatewayError;
use crate::state::{AppState, CachedDocument};
use crate::store::ArtifactRecord;
use crate::transpile::Dialect;

/// A fully prepared response body.
#[derive(Debug, Clone)]
pub struct Served {
    /// Value of the `Content-Type` header.
    pub content_type: String,
    /// Response body.
    pub body: Bytes,
}

impl Served {
    fn new(content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    /// Strong ETag over the body (xxHash3, hex).
    pub fn etag(&self) -> String {
        let hash = xxhash_rust::xxh3::xxh3_64(&self.body);
        format!("\"{}\"", hex_fmt::HexFmt(&hash.to_be_bytes()))
    }

    /// Build the HTTP response, answering `304` when `if_none_match`
    /// already names this body.
    pub fn into_response_for(self, if_none_match: Option<&str>) -> Response {
        let etag = self.etag();

        let mut headers = HeaderMap::new();
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        if let Ok(val) = HeaderValue::from_str(&etag) {
            headers.insert(header::ETAG, val);
        }

        if if_none_match.is_some_and(|value| etag_matches(value, &etag)) {
            return (StatusCode::NOT_MODIFIED, headers).into_response();
        }

        if let Ok(val) = HeaderValue::from_str(&self.content_type) {
            headers.insert(header::CONTENT_TYPE, val);
        }
        headers.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );

        (StatusCode::OK, headers, Body::from(self.body)).into_response()
    }
}

/// Returns true if an `If-None-Match` header value covers `etag`.
fn etag_matches(if_none_match: &str, etag: &str) -> bool {
    if_none_match.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || candidate.strip_prefix("W/").unwrap_or(candidate) == etag
    })
}

/// Serve `path` from the artifact owned by `prototyper_id`/`prototype_id`.
pub async fn dispatch(
    state: &AppState,
    prototyper_id: &str,
    prototype_id: &str,
    path: &str,
    if_none_match: Option<&str>,
) -> Result<Response, GatewayError> {
    let served = serve(state, prototyper_id, prototype_id, path).await?;
    Ok(served.into_response_for(if_none_match))
}

/// Produce the body for one request without building the HTTP response.
pub async fn serve(
    state: &AppState,
    prototyper_id: &str,
    prototype_id: &str,
    path: &str,
) -> Result<Served, GatewayError> {
    validate_request(prototyper_id, prototype_id, path)?;

    let artifact = format!("{prototyper_id}/{prototype_id}");
    let record = state
        .store
        .lookup(prototyper_id, prototype_id)
        .await?
        .ok_or_else(|| GatewayError::NotFoundMetadata(artifact.clone()))?;

    if !record.has_source() {
        return Err(GatewayError::NoFileConfigured(artifact));
    }

    let kind = record.kind();
    metrics::counter!(names::GATEWAY_REQUESTS, "kind" => kind.as_str()).increment(1);
    tracing::debug!(
        artifact = %artifact,
        kind = kind.as_str(),
        path = %path,
        "dispatching artifact request"
    );

    if let Some(dialect) = Dialect::for_kind(kind) {
        return serve_component(state, &record, dialect).await;
    }

    match kind {
        FileKind::Zip => {
            let base = serving_base(&state.config.serve_prefix, prototyper_id, prototype_id);
            let key = CacheKey::new(prototyper_id, prototype_id, &record.file_url);
            serve_archive_member(state, &key, path, &base).await
        }
        FileKind::Html => {
            let body = fetch_source(state, &record.file_url).await?;
            Ok(Served::new(HTML_CONTENT_TYPE, body))
        }
        _ => {
            let body = fetch_source(state, &record.file_url).await?;
            Ok(Served::new(content_type_for(&record.file_name), body))
        }
    }
}

async fn serve_archive_member(
    state: &AppState,
    key: &CacheKey,
    path: &str,
    base: &str,
) -> Result<Served, GatewayError> {
    let member = state.archives.resolve(key, path).await?;

    if is_html(&member.path) {
        let html = String::from_utf8_lossy(&member.data);
        return Ok(Served::new(HTML_CONTENT_TYPE, rewrite_html(&html, base)));
    }

    Ok(Served::new(content_type_for(&member.path), member.data))
}

async fn serve_component(
    state: &AppState,
    record: &ArtifactRecord,
    dialect: Dialect,
) -> Result<Served, GatewayError> {
    let cache_key = format!("{}#{}", record.file_url, record.file_name);

    if let Some(cached) = state.documents.get(&cache_key).await {
        tracing::debug!(file_name = %record.file_name, "document cache hit");
        metrics::counter!(names::JSX_DOCUMENT_CACHE_HITS).increment(1);
        return Ok(Served::new(HTML_CONTENT_TYPE, cached.html));
    }

    let bytes = fetch_source(state, &record.file_url).await?;
    let source = std::str::from_utf8(&bytes).map_err(|e| {
        GatewayError::TransformFailure(format!("{} is not valid UTF-8: {e}", record.file_name))
    })?;

    let transpiled = state
        .transpiler
        .transpile(source, dialect)
        .await
        .map_err(|e| GatewayError::TransformFailure(format!("{}: {e:#}", record.file_name)))?;

    let document = JsxDocument {
        file_name: &record.file_name,
        source,
        transpiled: &transpiled,
    };
    let html = Bytes::from(document.render(&state.config.import_map_options())?);

    state
        .documents
        .insert(
            cache_key,
            CachedDocument {
                html: html.clone(),
                cached_at: chrono::Utc::now(),
            },
        )
        .await;

    Ok(Served::new(HTML_CONTENT_TYPE, html))
}

async fn fetch_source(state: &AppState, url: &str) -> Result<Bytes, GatewayError> {
    match state.fetcher.fetch(url).await {
        Ok(body) => {
            metrics::counter!(names::UPSTREAM_FETCH_BYTES).increment(body.len() as u64);
            Ok(body)
        }
        Err(e) => {
            metrics::counter!(names::UPSTREAM_FETCH_FAILURES).increment(1);
            Err(GatewayError::UpstreamFetchFailed(format!("{url}: {e}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::{CountingFetcher, StubTranspiler, build_zip, record, test_state};

    const SITE_INDEX: &str = r#"<!doctype html>
<html>
<head>
  <title>Site</title>
  <link rel="stylesheet" href="/style.css" crossorigin>
</head>
<body>
  <a href="/">Home</a>
  <script type="module" src="/app.js" crossorigin="anonymous"></script>
</body>
</html>"#;

    fn site_zip() -> Bytes {
        build_zip(&[
            ("site/", b""),
            ("site/index.html", SITE_INDEX.as_bytes()),
            ("site/app.js", b"console.log('app');"),
            ("site/style.css", b"body { margin: 0; }"),
            ("site/about.html", b"<html><head></head><body>About</body></html>"),
            ("__MACOSX/site/._index.html", b"junk"),
        ])
    }

    fn site_state() -> (AppState, Arc<CountingFetcher>) {
        let fetcher = Arc::new(CountingFetcher::new([(
            "https://blob.example/site.zip",
            site_zip(),
        )]));
        let state = test_state(
            vec![(
                "alice",
                "p1",
                record("site.zip", "https://blob.example/site.zip"),
            )],
            fetcher.clone(),
            Arc::new(StubTranspiler::passthrough()),
        );
        (state, fetcher)
    }

    fn header_str<'a>(response: &'a Response, name: header::HeaderName) -> &'a str {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_zip_root_serves_rewritten_index() {
        let (state, fetcher) = site_state();

        let response = dispatch(&state, "alice", "p1", "", None).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, header::CONTENT_TYPE), HTML_CONTENT_TYPE);
        assert_eq!(header_str(&response, header::CACHE_CONTROL), "no-cache");
        assert!(!header_str(&response, header::ETAG).is_empty());

        let body = body_text(response).await;
        assert!(body.contains(r#"src="/serve/alice/p1/app.js""#));
        assert!(body.contains(r#"href="/serve/alice/p1/style.css""#));
        assert!(body.contains(r#"href="/serve/alice/p1/index.html""#));
        assert!(!body.contains("crossorigin"));

        let after_head = body.split_once("<head>").unwrap().1;
        assert!(after_head.starts_with("<script>"));
        assert!(after_head.contains("/serve/alice/p1"));

        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_zip_members_share_one_fetch() {
        let (state, fetcher) = site_state();

        let js = serve(&state, "alice", "p1", "app.js").await.unwrap();
        assert!(js.content_type.contains("javascript"));
        assert_eq!(js.body, Bytes::from_static(b"console.log('app');"));

        let css = serve(&state, "alice", "p1", "style.css").await.unwrap();
        assert_eq!(css.content_type, "text/css; charset=utf-8");

        let about = serve(&state, "alice", "p1", "about").await.unwrap();
        assert_eq!(about.content_type, HTML_CONTENT_TYPE);
        assert!(String::from_utf8_lossy(&about.body).contains("About"));

        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_zip_missing_member() {
        let (state, _) = site_state();

        let err = serve(&state, "alice", "p1", "missing.png")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::MemberNotFound(_)));

        let err = serve(&state, "alice", "p1", "__MACOSX/site/._index.html")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::MemberNotFound(_)));
    }

    #[tokio::test]
    async fn test_tsx_component_document() {
        let source = r#"import { format } from "date-fns";
import React from "react";

export default function Widget() {
  return <p>{format(new Date(), "yyyy")}</p>;
}
"#;
        let fetcher = Arc::new(CountingFetcher::new([(
            "https://blob.example/Component.tsx",
            Bytes::from_static(source.as_bytes()),
        )]));
        let transpiler = Arc::new(StubTranspiler::passthrough());
        let state = test_state(
            vec![(
                "bob",
                "widget",
                record("Component.tsx", "https://blob.example/Component.tsx"),
            )],
            fetcher.clone(),
            transpiler.clone(),
        );

        let served = serve(&state, "bob", "widget", "").await.unwrap();
        assert_eq!(served.content_type, HTML_CONTENT_TYPE);

        let html = String::from_utf8(served.body.to_vec()).unwrap();
        assert!(html.contains(r#""date-fns": "https://esm.sh/date-fns?external=react,react-dom""#));
        assert!(html.contains(r#""date-fns/": "https://esm.sh/date-fns/""#));
        assert!(html.contains("const __protogateComponent = Widget;"));
        assert!(html.contains("<title>Component.tsx</title>"));

        // Second request is answered from the document cache
        serve(&state, "bob", "widget", "").await.unwrap();
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(transpiler.calls(), 1);
    }

    #[tokio::test]
    async fn test_transpile_failure_is_transform_error() {
        let fetcher = Arc::new(CountingFetcher::new([(
            "https://blob.example/Broken.jsx",
            Bytes::from_static(b"export default function ("),
        )]));
        let state = test_state(
            vec![(
                "bob",
                "broken",
                record("Broken.jsx", "https://blob.example/Broken.jsx"),
            )],
            fetcher,
            Arc::new(StubTranspiler::failing()),
        );

        let err = serve(&state, "bob", "broken", "").await.unwrap_err();
        assert!(matches!(err, GatewayError::TransformFailure(_)));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_missing_file_url_skips_fetch() {
        let fetcher = Arc::new(CountingFetcher::empty());
        let state = test_state(
            vec![("carol", "draft", record("draft.zip", ""))],
            fetcher.clone(),
            Arc::new(StubTranspiler::passthrough()),
        );

        let err = serve(&state, "carol", "draft", "").await.unwrap_err();
        assert!(matches!(err, GatewayError::NoFileConfigured(_)));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "no_file_configured");
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_artifact() {
        let (state, fetcher) = site_state();

        let err = serve(&state, "alice", "nope", "").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFoundMetadata(_)));
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_input_rejected_before_io() {
        let (state, fetcher) = site_state();

        let err = serve(&state, "alice!", "p1", "").await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidIdentifier(_)));

        let err = serve(&state, "alice", "p1", "../secret").await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidPath(_)));

        let err = serve(&state, "alice", "p1", "assets/../../x").await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidPath(_)));

        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_direct_html_is_verbatim() {
        let page = "<html><head></head><body><img src=\"/logo.png\"></body></html>";
        let fetcher = Arc::new(CountingFetcher::new([(
            "https://blob.example/page.html",
            Bytes::from_static(page.as_bytes()),
        )]));
        let state = test_state(
            vec![("dave", "page", record("page.HTML", "https://blob.example/page.html"))],
            fetcher,
            Arc::new(StubTranspiler::passthrough()),
        );

        let served = serve(&state, "dave", "page", "").await.unwrap();
        assert_eq!(served.content_type, HTML_CONTENT_TYPE);
        assert_eq!(served.body, Bytes::from_static(page.as_bytes()));
    }

    #[tokio::test]
    async fn test_other_types_pass_through() {
        let fetcher = Arc::new(CountingFetcher::new([(
            "https://blob.example/mock.png",
            Bytes::from_static(b"\x89PNG"),
        )]));
        let state = test_state(
            vec![("erin", "mock", record("mock.png", "https://blob.example/mock.png"))],
            fetcher,
            Arc::new(StubTranspiler::passthrough()),
        );

        let served = serve(&state, "erin", "mock", "").await.unwrap();
        assert_eq!(served.content_type, "image/png");
        assert_eq!(served.body, Bytes::from_static(b"\x89PNG"));
    }

    #[tokio::test]
    async fn test_upstream_failure_is_bad_gateway() {
        let state = test_state(
            vec![("frank", "gone", record("gone.html", "https://blob.example/gone.html"))],
            Arc::new(CountingFetcher::empty()),
            Arc::new(StubTranspiler::passthrough()),
        );

        let err = serve(&state, "frank", "gone", "").await.unwrap_err();
        assert!(matches!(err, GatewayError::UpstreamFetchFailed(_)));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_matching_etag_returns_not_modified() {
        let (state, _) = site_state();

        let first = dispatch(&state, "alice", "p1", "style.css", None)
            .await
            .unwrap();
        let etag = header_str(&first, header::ETAG).to_string();

        let second = dispatch(&state, "alice", "p1", "style.css", Some(etag.as_str()))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(header_str(&second, header::ETAG), etag);
        assert!(body_text(second).await.is_empty());

        let third = dispatch(&state, "alice", "p1", "style.css", Some("\"0000\""))
            .await
            .unwrap();
        assert_eq!(third.status(), StatusCode::OK);
    }

    #[test]
    fn test_etag_matching() {
        assert!(etag_matches("\"abc\"", "\"abc\""));
        assert!(etag_matches("W/\"abc\"", "\"abc\""));
        assert!(etag_matches("\"x\", \"abc\"", "\"abc\""));
        assert!(etag_matches("*", "\"abc\""));
        assert!(!etag_matches("\"abd\"", "\"abc\""));
    }
}
