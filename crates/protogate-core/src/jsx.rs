//! Auto-render documents for JSX/TSX component artifacts.
//!
//! A component file is turned into a self-contained HTML page:
//!
//! - the transpiled module is inlined into a `<script type="module">`
//! - bare imports are resolved by a synthesized browser import map that
//!   points at a public ES-module CDN
//! - a bootstrap renders the default-exported component into `#root`
//!
//! Transpilation itself happens outside this crate; here the transpiled
//! text is treated as opaque apart from import scanning.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use maud::{DOCTYPE, PreEscaped, html};
use regex::Regex;
use serde::Serialize;

use crate::error::Result;
use crate::interceptor::escape_script_close;

/// Packages pinned by the import map and kept external on the CDN.
const REACT_PACKAGES: [&str; 2] = ["react", "react-dom"];

/// Words that can follow `export default` but never name a binding.
const RESERVED_WORDS: &[&str] = &[
    "async", "await", "class", "extends", "false", "function", "implements", "new", "null",
    "this", "true", "typeof", "void", "yield",
];

static EXPORT_DEFAULT_DECL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"export\s+default\s+(?:async\s+)?(?:function|class)\s*\*?\s*([A-Za-z_$][\w$]*)")
        .expect("default export declaration regex should compile")
});

static EXPORT_DEFAULT_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)export\s+default\s+([A-Za-z_$][\w$]*)\s*(?:;|$)")
        .expect("default export name regex should compile")
});

static STATIC_IMPORT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bimport\s*(?:[^"'();]*?\bfrom\s*)?["']([^"'\n]+)["']"#)
        .expect("static import regex should compile")
});

static REEXPORT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bexport\s*(?:\*\s*(?:as\s+[\w$]+\s*)?|\{[^}]*\}\s*)from\s*["']([^"'\n]+)["']"#)
        .expect("re-export regex should compile")
});

static DYNAMIC_IMPORT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bimport\s*\(\s*["']([^"'\n]+)["']\s*\)"#)
        .expect("dynamic import regex should compile")
});

static REACT_BINDING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bimport\s+(?:\*\s*as\s+)?React\b").expect("React binding regex should compile")
});

static SCRIPT_CLOSE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</script").expect("script close regex should compile"));

/// Where import-map entries point.
#[derive(Debug, Clone)]
pub struct ImportMapOptions {
    /// ES-module CDN base URL without a trailing slash.
    pub cdn_url: String,
    /// React version pinned for `react` and `react-dom`.
    pub react_version: String,
}

impl Default for ImportMapOptions {
    fn default() -> Self {
        Self {
            cdn_url: "https://esm.sh".to_string(),
            react_version: "18.2.0".to_string(),
        }
    }
}

/// A browser import map (`<script type="importmap">` payload).
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ImportMap {
    /// Specifier (or `prefix/`) to URL.
    pub imports: BTreeMap<String, String>,
}

impl ImportMap {
    /// Look up the URL mapped for a specifier.
    pub fn get(&self, specifier: &str) -> Option<&str> {
        self.imports.get(specifier).map(String::as_str)
    }
}

/// Detect the name bound by the module's default export.
///
/// Recognises `export default function|class Name` and `export default Name;`.
///
/// Anonymous declarations such as `export default class extends Base {}`
/// yield `None`.
pub fn detect_default_export(source: &str) -> Option<String> {
    EXPORT_DEFAULT_DECL_REGEX
        .captures_iter(source)
        .chain(EXPORT_DEFAULT_NAME_REGEX.captures_iter(source))
        .map(|caps| caps[1].to_string())
        .find(|name| !RESERVED_WORDS.contains(&name.as_str()))
}

/// Collect the distinct bare module specifiers imported by `code`.
///
/// Relative (`./x`), absolute (`/x`), and URL specifiers are skipped.
pub fn scan_bare_imports(code: &str) -> BTreeSet<String> {
    [&*STATIC_IMPORT_REGEX, &*REEXPORT_REGEX, &*DYNAMIC_IMPORT_REGEX]
        .into_iter()
        .flat_map(|re| re.captures_iter(code).map(|caps| caps[1].trim().to_string()))
        .filter(|spec| is_bare_specifier(spec))
        .collect()
}

/// Returns true for specifiers that name a package rather than a location.
pub fn is_bare_specifier(spec: &str) -> bool {
    !spec.is_empty()
        && !spec.starts_with('.')
        && !spec.starts_with('/')
        && !spec.contains("://")
        && !spec.starts_with("data:")
        && !spec.starts_with("blob:")
}

/// Package name of a bare specifier: `@org/pkg` for scoped packages,
/// otherwise the first path segment.
pub fn package_name(spec: &str) -> &str {
    let mut boundaries = spec.match_indices('/').map(|(i, _)| i);
    let end = if spec.starts_with('@') {
        boundaries.nth(1)
    } else {
        boundaries.next()
    };
    end.map_or(spec, |i| &spec[..i])
}

/// Build the import map for a set of bare specifiers.
///
/// `react`, `react/jsx-runtime`, `react-dom` and `react-dom/client` are
/// always present at the pinned version. Every other package gets an
/// exact entry (with React marked external on the CDN) and a `pkg/` prefix
/// entry so deep subpaths resolve.
pub fn build_import_map<'a, I>(specifiers: I, opts: &ImportMapOptions) -> ImportMap
where
    I: IntoIterator<Item = &'a str>,
{
    let cdn = opts.cdn_url.trim_end_matches('/');
    let version = &opts.react_version;

    let mut imports = BTreeMap::new();
    imports.insert("react".to_string(), format!("{cdn}/react@{version}"));
    imports.insert(
        "react/jsx-runtime".to_string(),
        format!("{cdn}/react@{version}/jsx-runtime"),
    );
    imports.insert("react-dom".to_string(), format!("{cdn}/react-dom@{version}"));
    imports.insert(
        "react-dom/client".to_string(),
        format!("{cdn}/react-dom@{version}/client"),
    );

    for spec in specifiers {
        let package = package_name(spec);

        if REACT_PACKAGES.contains(&package) {
            // Other React subpaths resolve against the pinned version too
            let subpath = &spec[package.len()..];
            imports
                .entry(spec.to_string())
                .or_insert_with(|| format!("{cdn}/{package}@{version}{subpath}"));
            continue;
        }

        imports
            .entry(spec.to_string())
            .or_insert_with(|| format!("{cdn}/{spec}?external=react,react-dom"));
        imports
            .entry(format!("{package}/"))
            .or_insert_with(|| format!("{cdn}/{package}/"));
    }

    ImportMap { imports }
}

/// Returns true if `code` already binds `React` through an import.
pub fn imports_react_binding(code: &str) -> bool {
    REACT_BINDING_REGEX.is_match(code)
}

/// Inputs for one auto-render document.
#[derive(Debug, Clone, Copy)]
pub struct JsxDocument<'a> {
    /// Declared artifact file name, used as the page title.
    pub file_name: &'a str,
    /// Original component source (default-export detection runs here).
    pub source: &'a str,
    /// Transpiled ES module text.
    pub transpiled: &'a str,
}

impl JsxDocument<'_> {
    /// The expression the bootstrap renders.
    ///
    /// Falls back to looking up `App`, then `Main`; evaluates to `null`
    /// (render nothing) when neither exists.
    pub fn component_expr(&self) -> String {
        match detect_default_export(self.source) {
            Some(name) => name,
            None => r#"typeof App !== "undefined" ? App : typeof Main !== "undefined" ? Main : null"#
                .to_string(),
        }
    }

    /// The module script body: imports, inlined code, and bootstrap.
    pub fn module_source(&self) -> String {
        let mut module = String::with_capacity(self.transpiled.len() + 512);
        module.push_str("import { createRoot as __protogateCreateRoot } from \"react-dom/client\";\n");
        if !imports_react_binding(self.transpiled) {
            module.push_str("import React from \"react\";\n");
        }
        module.push_str(self.transpiled);
        module.push_str("\n\nconst __protogateComponent = ");
        module.push_str(&self.component_expr());
        module.push_str(";\nif (__protogateComponent) {\n");
        module.push_str(
            "  __protogateCreateRoot(document.getElementById(\"root\")).render(React.createElement(__protogateComponent));\n",
        );
        module.push_str("}\n");
        module
    }

    /// Render the complete HTML document.
    pub fn render(&self, opts: &ImportMapOptions) -> Result<String> {
        let specifiers = scan_bare_imports(self.transpiled);
        let import_map = build_import_map(specifiers.iter().map(String::as_str), opts);
        let import_map_json = escape_script_close(&serde_json::to_string_pretty(&import_map)?);
        let module = SCRIPT_CLOSE_REGEX
            .replace_all(&self.module_source(), "<\\/script")
            .into_owned();

        let markup = html! {
            (DOCTYPE)
            html lang="en" {
                head {
                    meta charset="utf-8";
                    meta name="viewport" content="width=device-width, initial-scale=1";
                    title { (self.file_name) }
                    script type="importmap" { (PreEscaped(import_map_json)) }
                }
                body {
                    div id="root" {}
                    script type="module" { (PreEscaped(module)) }
                }
            }
        };

        Ok(markup.into_string())
    }
}
