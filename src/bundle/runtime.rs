//! Chunk rendering and the module registry every chunk carries.

use crate::bundle::js_patch::{ModuleRewriter, js_string};
use crate::error::{BuildError, BuildResult};
use crate::graph::ModuleGraph;
use crate::models::Chunk;

/// Registry prelude emitted at the top of every chunk.
///
/// Chunks load as classic scripts in document order, so whichever chunk runs first installs the
/// registry on `globalThis.__wvb` and later chunks reuse it.
pub const RUNTIME_PRELUDE: &str = r#"var __wvb = globalThis.__wvb || (globalThis.__wvb = (function () {
  "use strict";
  var factories = Object.create(null);
  var cache = Object.create(null);
  function define(id, factory) {
    if (!(id in factories)) factories[id] = factory;
  }
  function require(id) {
    if (id in cache) return cache[id];
    var factory = factories[id];
    if (!factory) throw new Error("module not bundled: " + id);
    var exports = Object.create(null);
    cache[id] = exports;
    factory(exports, require);
    return exports;
  }
  function load(id) {
    return new Promise(function (resolve) { resolve(require(id)); });
  }
  function bind(target, getters) {
    Object.keys(getters).forEach(function (name) {
      Object.defineProperty(target, name, { enumerable: true, get: getters[name] });
    });
  }
  function reexport(target, source) {
    Object.keys(source).forEach(function (name) {
      if (name === "default" || Object.prototype.hasOwnProperty.call(target, name)) return;
      Object.defineProperty(target, name, {
        enumerable: true,
        get: function () { return source[name]; }
      });
    });
  }
  function style(href) {
    if (typeof document === "undefined") return;
    var link = document.createElement("link");
    link.rel = "stylesheet";
    link.href = href;
    document.head.appendChild(link);
  }
  var base = typeof document !== "undefined" ? document.baseURI : location.href;
  return {
    define: define,
    require: require,
    load: load,
    bind: bind,
    reexport: reexport,
    style: style,
    base: base,
    meta: { url: base }
  };
})());
"#;

/// Render `chunk`: the prelude, each module registration in execution order and, for entry
/// chunks, the call that runs the entry module.
pub fn render_chunk(
  chunk: &Chunk,
  graph: &ModuleGraph,
  rewriter: &ModuleRewriter<'_>,
) -> BuildResult<String> {
  let mut out = String::from(RUNTIME_PRELUDE);
  for path in &chunk.modules {
    let node = graph.node(path).ok_or_else(|| {
      BuildError::InvalidConfig(format!(
        "chunk `{}` lists {} which is not in the module graph",
        chunk.name,
        path.display()
      ))
    })?;
    out.push_str(&rewriter.rewrite(node)?);
  }
  if let Some(entry) = chunk.entry.as_deref().and_then(|path| graph.node(path)) {
    out.push_str(&format!("__wvb.require({});\n", js_string(&entry.id)));
  }
  Ok(out)
}
