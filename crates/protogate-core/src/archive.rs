//! ZIP extraction and member resolution.
//!
//! An uploaded prototype bundle is expanded into an [`ArchiveTable`]: a map
//! from normalized relative path to file bytes. Extraction applies three
//! normalization passes:
//!
//! 1. **Filtering** - directories, macOS resource forks (`__MACOSX/`, `._*`),
//!    Finder metadata (`.DS_Store`), hidden top-level entries, and entries
//!    that would escape the archive root are dropped.
//! 2. **Common-prefix stripping** - if every surviving entry lives under the
//!    same top-level folder, that folder is removed so `project/index.html`
//!    becomes `index.html`.
//! 3. **Size ceiling** - the total uncompressed size is bounded.
//!
//! Resolution then maps a requested path onto the table, with extensionless
//! fallbacks to `<path>.html` and `<path>/index.html`.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use bytes::Bytes;
use zip::ZipArchive;

use crate::DEFAULT_MAX_ARCHIVE_BYTES;
use crate::error::{Error, Result};

/// Folder macOS adds to archives to hold resource forks.
const RESOURCE_FORK_DIR: &str = "__MACOSX";

/// Prefix of AppleDouble sidecar files.
const APPLE_DOUBLE_PREFIX: &str = "._";

/// Finder metadata file name.
const FINDER_METADATA: &str = ".DS_Store";

/// Options controlling archive extraction.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Maximum total uncompressed bytes across all kept members.
    pub max_total_bytes: u64,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            max_total_bytes: DEFAULT_MAX_ARCHIVE_BYTES,
        }
    }
}

/// The extracted, normalized contents of one archive.
#[derive(Debug, Clone, Default)]
pub struct ArchiveTable {
    files: BTreeMap<String, Bytes>,
    stripped_prefix: Option<String>,
}

impl ArchiveTable {
    /// Build a table from raw `(path, bytes)` entries.
    ///
    /// Applies the same filtering and common-prefix stripping as
    /// [`extract_archive`]. Directory entries are recognised by a trailing `/`.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Bytes)>,
    {
        let kept: Vec<(String, Bytes)> = entries
            .into_iter()
            .filter(|(name, _)| !name.ends_with('/') && !is_metadata_entry(name))
            .filter_map(|(name, data)| sanitize_entry_path(&name).map(|path| (path, data)))
            .collect();

        let stripped_prefix = common_root(kept.iter().map(|(path, _)| path.as_str()));

        let files = kept
            .into_iter()
            .filter_map(|(path, data)| {
                let path = match &stripped_prefix {
                    Some(root) => path[root.len() + 1..].to_string(),
                    None => path,
                };
                (!path.is_empty()).then_some((path, data))
            })
            .collect();

        Self {
            files,
            stripped_prefix,
        }
    }

    /// Number of files in the table.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true if the archive held no servable files.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterate over stored paths in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Exact lookup of a stored path.
    pub fn get(&self, path: &str) -> Option<&Bytes> {
        self.files.get(path)
    }

    /// The top-level folder removed during normalization, if any.
    pub fn stripped_prefix(&self) -> Option<&str> {
        self.stripped_prefix.as_deref()
    }

    /// Total size of all stored files in bytes.
    pub fn total_bytes(&self) -> usize {
        self.files.values().map(Bytes::len).sum()
    }

    /// Resolve a requested path to a stored member.
    ///
    /// Order:
    /// 1. Exact match on `requested`
    /// 2. If `requested` has no `.`: `<path>.html`, then `<path>/index.html`
    ///    (the root path maps to `index.html`)
    ///
    /// Returns the resolved stored path alongside the bytes.
    pub fn resolve(&self, requested: &str) -> Option<(&str, &Bytes)> {
        if let Some((path, data)) = self.files.get_key_value(requested) {
            return Some((path.as_str(), data));
        }

        if requested.contains('.') {
            return None;
        }

        let trimmed = requested.trim_end_matches('/');
        let candidates = if trimmed.is_empty() {
            vec!["index.html".to_string()]
        } else {
            vec![format!("{trimmed}.html"), format!("{trimmed}/index.html")]
        };

        candidates.into_iter().find_map(|candidate| {
            self.files
                .get_key_value(candidate.as_str())
                .map(|(path, data)| (path.as_str(), data))
        })
    }
}

/// Extract a ZIP archive held in memory into a normalized [`ArchiveTable`].
///
/// # Errors
///
/// Returns an error if the archive is malformed, a member cannot be
/// decompressed, or the total uncompressed size exceeds
/// [`ExtractOptions::max_total_bytes`].
pub fn extract_archive(data: &[u8], opts: &ExtractOptions) -> Result<ArchiveTable> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;
    let mut entries = Vec::with_capacity(archive.len());
    let mut total: u64 = 0;

    for i in 0..archive.len() {
        let zip_file = archive.by_index(i)?;

        // Skip directories
        if zip_file.is_dir() {
            continue;
        }

        let name = zip_file.name().to_string();
        if is_metadata_entry(&name) {
            continue;
        }

        // Declared sizes can lie, so the read itself is also capped
        let remaining = opts.max_total_bytes.saturating_sub(total);
        if zip_file.size() > remaining {
            return Err(Error::ArchiveTooLarge {
                limit: opts.max_total_bytes,
            });
        }

        let mut contents = Vec::with_capacity(zip_file.size() as usize);
        zip_file.take(remaining + 1).read_to_end(&mut contents)?;
        total += contents.len() as u64;
        if total > opts.max_total_bytes {
            return Err(Error::ArchiveTooLarge {
                limit: opts.max_total_bytes,
            });
        }

        entries.push((name, Bytes::from(contents)));
    }

    Ok(ArchiveTable::from_entries(entries))
}

/// Returns true for OS metadata entries that never belong in a served site.
fn is_metadata_entry(name: &str) -> bool {
    if name.starts_with(RESOURCE_FORK_DIR) || name.starts_with('.') {
        return true;
    }

    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    base.starts_with(APPLE_DOUBLE_PREFIX) || base == FINDER_METADATA
}

/// Normalize separators and reject names that would escape the archive root.
///
/// Returns `None` for absolute names, names with `..` segments, and names
/// that are empty once `.` and empty segments are dropped.
fn sanitize_entry_path(name: &str) -> Option<String> {
    if name.starts_with('/') || name.starts_with('\\') {
        return None;
    }

    let mut segments = Vec::new();
    for segment in name.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => return None,
            s => segments.push(s),
        }
    }

    (!segments.is_empty()).then(|| segments.join("/"))
}

/// Find the first path segment shared by every entry, if there is one.
///
/// An entry with a single segment (a file at the archive root) means there
/// is no shared folder.
fn common_root<'a, I>(paths: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut root: Option<&str> = None;

    for path in paths {
        let (head, _) = path.split_once('/')?;
        match root {
            None => root = Some(head),
            Some(existing) if existing == head => {}
            Some(_) => return None,
        }
    }

    root.map(str::to_string)
}
