//! HTML rewriting for documents served out of an archive.
//!
//! A bundled single-page application usually references its assets with
//! root-relative URLs (`/assets/index.js`). Behind the gateway those must
//! resolve under the artifact's serving base instead of the host root.
//!
//! Rewrites, in order:
//! 1. `src`/`href`/`action` equal to `/` becomes `<base>/index.html`
//! 2. other root-relative values gain the `<base>` prefix, except
//!    protocol-relative `//host` URLs and values already under the base
//! 3. `crossorigin` attributes are removed
//! 4. the interception shim is inserted right after the opening `<head>`
//!
//! This is pattern matching over raw text, not a DOM parse. Only quoted
//! attribute values are rewritten.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::interceptor::interceptor_tag;

static URL_ATTR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(\s)(src|href|action)(\s*=\s*)(?:"([^"]*)"|'([^']*)')"#)
        .expect("URL attribute regex should compile")
});

static CROSSORIGIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(<[a-z][^>]*?)\s+crossorigin\b(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>"']+))?"#)
        .expect("crossorigin regex should compile")
});

static HEAD_OPEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<head(?:\s[^>]*)?>").expect("head regex should compile"));

static HTML_OPEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<html(?:\s[^>]*)?>").expect("html regex should compile"));

/// Rewrite an HTML document so it loads correctly under `base`.
///
/// `base` is the serving base path without a trailing slash, e.g.
/// `/serve/alice/p1`.
pub fn rewrite_html(html: &str, base: &str) -> String {
    let rewritten = rewrite_url_attributes(html, base);
    let rewritten = strip_crossorigin(&rewritten);
    inject_after_head(&rewritten, &interceptor_tag(base))
}

/// Apply rewrites 1 and 2 to every quoted `src`/`href`/`action` attribute.
pub fn rewrite_url_attributes(html: &str, base: &str) -> String {
    URL_ATTR_REGEX
        .replace_all(html, |caps: &Captures| {
            let (value, quote) = match (caps.get(4), caps.get(5)) {
                (Some(v), _) => (v.as_str(), '"'),
                (None, Some(v)) => (v.as_str(), '\''),
                (None, None) => return caps[0].to_string(),
            };

            match rewrite_url(value, base) {
                Some(new_value) => {
                    format!("{}{}{}{quote}{new_value}{quote}", &caps[1], &caps[2], &caps[3])
                }
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Compute the rewritten value of one attribute, or `None` to keep it.
fn rewrite_url(value: &str, base: &str) -> Option<String> {
    if value == "/" {
        return Some(format!("{base}/index.html"));
    }

    if !value.starts_with('/') || value.starts_with("//") || is_under_base(value, base) {
        return None;
    }

    Some(format!("{base}{value}"))
}

/// Returns true if `path` is `base` itself or a location beneath it.
fn is_under_base(path: &str, base: &str) -> bool {
    match path.strip_prefix(base) {
        Some(rest) => rest.is_empty() || rest.starts_with(['/', '?', '#']),
        None => false,
    }
}

/// Remove `crossorigin` attributes from tags.
pub fn strip_crossorigin(html: &str) -> String {
    CROSSORIGIN_REGEX.replace_all(html, "$1").into_owned()
}

/// Insert `snippet` immediately after the opening `<head>` tag.
///
/// Falls back to after `<html>`, then to the start of the document.
pub fn inject_after_head(html: &str, snippet: &str) -> String {
    let anchor = HEAD_OPEN_REGEX
        .find(html)
        .or_else(|| HTML_OPEN_REGEX.find(html))
        .map(|m| m.end())
        .unwrap_or(0);

    let mut out = String::with_capacity(html.len() + snippet.len());
    out.push_str(&html[..anchor]);
    out.push_str(snippet);
    out.push_str(&html[anchor..]);
    out
}
