//! Runtime request interception shim.
//!
//! Static attribute rewriting cannot reach URLs that single-page
//! applications build in script. The shim generated here is injected into
//! every HTML member served from an archive and patches the browser
//! surfaces those applications load through:
//!
//! - `window.fetch`
//! - `XMLHttpRequest.prototype.open`
//! - the `src` / `href` setters of `<script>` and `<link>` elements created
//!   via `document.createElement`
//!
//! Rewrite rule, applied to string URLs only:
//! - `/path` (but not `//host`) gains the serving base unless already under it
//! - `<origin>/path` gains the serving base after the origin unless the
//!   path is already under it

/// Placeholder replaced by the JSON-encoded serving base.
const BASE_PLACEHOLDER: &str = "__PROTOGATE_BASE__";

const SHIM_TEMPLATE: &str = r#"(function () {
  var BASE = __PROTOGATE_BASE__;
  var ORIGIN = window.location.origin;
  function underBase(path) {
    return path === BASE || path.indexOf(BASE + "/") === 0 || path.indexOf(BASE + "?") === 0;
  }
  function rewrite(url) {
    if (typeof url !== "string") return url;
    if (url.charAt(0) === "/" && url.charAt(1) !== "/") {
      return underBase(url) ? url : BASE + url;
    }
    if (ORIGIN && ORIGIN !== "null" && url.indexOf(ORIGIN + "/") === 0) {
      var path = url.slice(ORIGIN.length);
      return underBase(path) ? url : ORIGIN + BASE + path;
    }
    return url;
  }
  var originalFetch = window.fetch;
  if (typeof originalFetch === "function") {
    window.fetch = function (input, init) {
      if (typeof input === "string") {
        input = rewrite(input);
      } else if (typeof URL !== "undefined" && input instanceof URL) {
        input = rewrite(input.href);
      }
      return originalFetch.call(this, input, init);
    };
  }
  if (typeof XMLHttpRequest !== "undefined") {
    var originalOpen = XMLHttpRequest.prototype.open;
    XMLHttpRequest.prototype.open = function (method, url) {
      var args = Array.prototype.slice.call(arguments);
      if (typeof url === "string") args[1] = rewrite(url);
      return originalOpen.apply(this, args);
    };
  }
  var originalCreateElement = document.createElement;
  document.createElement = function (tagName, options) {
    var el = originalCreateElement.call(document, tagName, options);
    var tag = String(tagName).toLowerCase();
    var prop = tag === "script" ? "src" : tag === "link" ? "href" : null;
    if (prop) {
      var proto = tag === "script" ? HTMLScriptElement.prototype : HTMLLinkElement.prototype;
      var desc = Object.getOwnPropertyDescriptor(proto, prop);
      if (desc && desc.set && desc.get) {
        Object.defineProperty(el, prop, {
          configurable: true,
          enumerable: true,
          get: function () { return desc.get.call(this); },
          set: function (value) { desc.set.call(this, rewrite(value)); }
        });
      }
    }
    return el;
  };
})();"#;

/// JavaScript source of the interception shim for a serving base path.
pub fn interceptor_script(base: &str) -> String {
    SHIM_TEMPLATE.replace(BASE_PLACEHOLDER, &js_string_literal(base))
}

/// The shim wrapped in a `<script>` element, ready to splice into a document.
pub fn interceptor_tag(base: &str) -> String {
    format!("<script>{}</script>", interceptor_script(base))
}

/// Encode `value` as a JavaScript string literal that is safe inside an
/// inline `<script>` element.
pub(crate) fn js_string_literal(value: &str) -> String {
    escape_script_close(&serde_json::Value::String(value.to_string()).to_string())
}

/// Break up `</` so inlined text cannot terminate the enclosing script.
pub(crate) fn escape_script_close(text: &str) -> String {
    text.replace("</", "<\\/")
}
