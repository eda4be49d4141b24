//! Rewrites module sources into registrations on the bundle runtime.
//!
//! Import and export statements are replaced in place using the byte spans recorded by the
//! scanner, so the rest of the module body (and its line numbers) is left untouched.

use std::cmp::Reverse;
use std::collections::HashSet;
use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;

use crate::asset_paths::public_url;
use crate::bundle::manifest::OutputManifest;
use crate::error::{BuildError, BuildResult};
use crate::graph::{ModuleGraph, comment_spans, in_comment, is_json_module, parse_binding_list};
use crate::models::{
  Classification, DependencyKind, ImportClause, ModuleNode, ReExportClause, ResolvedDependency,
};

/// Rewrites script modules of one build.
#[derive(Debug, Clone, Copy)]
pub struct ModuleRewriter<'a> {
  graph: &'a ModuleGraph,
  outputs: &'a OutputManifest,
  base: &'a str,
}

#[derive(Debug)]
struct Edit {
  span: Range<usize>,
  replacement: String,
  exports: Vec<(String, String)>,
}

impl Edit {
  fn replace(span: Range<usize>, replacement: impl Into<String>) -> Self {
    Self {
      span,
      replacement: replacement.into(),
      exports: Vec::new(),
    }
  }

  fn exporting(mut self, name: impl Into<String>, expression: impl Into<String>) -> Self {
    self.exports.push((name.into(), expression.into()));
    self
  }
}

struct ExportPatterns {
  declaration: Regex,
  default: Regex,
  list: Regex,
  meta_url: Regex,
  meta: Regex,
  leftover: Regex,
}

fn export_patterns() -> &'static ExportPatterns {
  static PATTERNS: OnceLock<ExportPatterns> = OnceLock::new();
  PATTERNS.get_or_init(|| ExportPatterns {
    declaration: Regex::new(
      r"(?m)^[ \t]*(export\s+)((?:async\s+)?function\b\s*\*?\s*([\w$]+)|class\s+([\w$]+)|(?:const|let|var)\s+([\w$]+))",
    )
    .expect("invalid export declaration regex"),
    default: Regex::new(
      r"(?m)^[ \t]*(export\s+default\s+)(?:(?:async\s+)?function\b\s*\*?\s*([\w$]+)\s*\(|class\s+([\w$]+))?",
    )
    .expect("invalid default export regex"),
    list: Regex::new(r"(?m)^[ \t]*export\s*\{([^}]*)\}[ \t]*;?").expect("invalid export list regex"),
    meta_url: Regex::new(r"\bimport\.meta\.url\b").expect("invalid import.meta.url regex"),
    meta: Regex::new(r"\bimport\.meta\b").expect("invalid import.meta regex"),
    leftover: Regex::new(r#"(?m)^[ \t]*(?:export\b|import\s*[\w${*'"])"#)
      .expect("invalid leftover module syntax regex"),
  })
}

impl<'a> ModuleRewriter<'a> {
  /// Create a rewriter resolving asset URLs through `outputs` with public `base`.
  pub fn new(graph: &'a ModuleGraph, outputs: &'a OutputManifest, base: &'a str) -> Self {
    Self {
      graph,
      outputs,
      base,
    }
  }

  /// Produce the `__wvb.define(…)` registration for `node`.
  pub fn rewrite(&self, node: &ModuleNode) -> BuildResult<String> {
    let Some(source) = node.payload.text() else {
      return Err(BuildError::UnsupportedReference {
        importer: node.path.clone(),
        specifier: node.id.clone(),
        reason: "only script modules can be emitted into a chunk".into(),
      });
    };

    let (body, exports) = if is_json_module(&node.path) {
      json_body(node, source)?
    } else {
      self.script_body(node, source)?
    };

    let mut out = String::with_capacity(body.len() + 128);
    out.push_str("__wvb.define(");
    out.push_str(&js_string(&node.id));
    out.push_str(", function (__exports, __require) {\n\"use strict\";\n");
    if !exports.is_empty() {
      out.push_str("__wvb.bind(__exports, {");
      for (position, (name, expression)) in exports.iter().enumerate() {
        if position > 0 {
          out.push(',');
        }
        out.push_str(&format!(
          " {}: function () {{ return {expression}; }}",
          js_string(name)
        ));
      }
      out.push_str(" });\n");
    }
    out.push_str(&body);
    if !body.ends_with('\n') {
      out.push('\n');
    }
    out.push_str("});\n");
    Ok(out)
  }

  fn script_body(
    &self,
    node: &ModuleNode,
    source: &str,
  ) -> BuildResult<(String, Vec<(String, String)>)> {
    let mut edits = Vec::new();
    for (index, dep) in node.dependencies.iter().enumerate() {
      if let Some(edit) = self.dependency_edit(node, index, dep)? {
        edits.push(edit);
      }
    }
    edits.extend(local_export_edits(source));

    let patterns = export_patterns();
    edits.extend(
      patterns
        .meta_url
        .find_iter(source)
        .map(|found| Edit::replace(found.range(), "__wvb.base")),
    );
    edits.extend(
      patterns
        .meta
        .find_iter(source)
        .map(|found| Edit::replace(found.range(), "__wvb.meta")),
    );

    let comments = comment_spans(source);
    edits.retain(|edit| !in_comment(&comments, edit.span.start));
    let (body, exports) = apply_edits(source, edits);
    let comments = comment_spans(&body);
    if let Some(found) = patterns
      .leftover
      .find_iter(&body)
      .find(|found| !in_comment(&comments, found.start()))
    {
      return Err(BuildError::UnsupportedReference {
        importer: node.path.clone(),
        specifier: found.as_str().trim().to_string(),
        reason: "module syntax in this form cannot be rewritten".into(),
      });
    }
    Ok((body, exports))
  }

  fn dependency_edit(
    &self,
    node: &ModuleNode,
    index: usize,
    dep: &ResolvedDependency,
  ) -> BuildResult<Option<Edit>> {
    let target = self
      .graph
      .node(&dep.target)
      .ok_or_else(|| BuildError::ModuleResolution {
        importer: node.path.clone(),
        specifier: dep.dependency.specifier.clone(),
      })?;
    let span = dep.dependency.span.clone();
    let binding = format!("__wvb_{index}");
    let unsupported = |reason: &str| BuildError::UnsupportedReference {
      importer: node.path.clone(),
      specifier: dep.dependency.specifier.clone(),
      reason: reason.into(),
    };

    let edit = match (&dep.dependency.kind, &target.classification) {
      (DependencyKind::Import(clause), Classification::Script) => {
        Edit::replace(span, import_bindings(&binding, &target.id, clause))
      }
      (DependencyKind::Import(clause), Classification::Asset { .. }) => {
        if !clause.named.is_empty() {
          return Err(unsupported("assets only provide a default export"));
        }
        let url = js_string(&self.asset_url(node, dep)?);
        let mut statements = Vec::new();
        if let Some(local) = &clause.default {
          statements.push(format!("const {local} = {url};"));
        }
        if let Some(local) = &clause.namespace {
          statements.push(format!("const {local} = {{ default: {url} }};"));
        }
        Edit::replace(span, statements.join(" "))
      }
      (DependencyKind::SideEffect, Classification::Script) => {
        Edit::replace(span, format!("__require({});", js_string(&target.id)))
      }
      (DependencyKind::SideEffect, Classification::Asset { extension }) => {
        if extension.eq_ignore_ascii_case("css") {
          let url = self.asset_url(node, dep)?;
          Edit::replace(span, format!("__wvb.style({});", js_string(&url)))
        } else {
          Edit::replace(span, "")
        }
      }
      (DependencyKind::ReExport(clause), Classification::Script) => {
        let id = js_string(&target.id);
        match clause {
          ReExportClause::All => {
            Edit::replace(span, format!("__wvb.reexport(__exports, __require({id}));"))
          }
          ReExportClause::Namespace(name) => {
            Edit::replace(span, format!("const {binding} = __require({id});"))
              .exporting(name.clone(), binding.clone())
          }
          ReExportClause::Named(pairs) => {
            let mut edit = Edit::replace(span, format!("const {binding} = __require({id});"));
            for (imported, exported) in pairs {
              edit = edit.exporting(exported.clone(), member(&binding, imported));
            }
            edit
          }
        }
      }
      (DependencyKind::ReExport(clause), Classification::Asset { .. }) => {
        let url = js_string(&self.asset_url(node, dep)?);
        match clause {
          ReExportClause::All => Edit::replace(span, ""),
          ReExportClause::Namespace(name) => {
            Edit::replace(span, "").exporting(name.clone(), format!("{{ default: {url} }}"))
          }
          ReExportClause::Named(pairs) => {
            let mut edit = Edit::replace(span, "");
            for (imported, exported) in pairs {
              if imported != "default" {
                return Err(unsupported("assets only provide a default export"));
              }
              edit = edit.exporting(exported.clone(), url.clone());
            }
            edit
          }
        }
      }
      (DependencyKind::Dynamic, Classification::Script) => {
        Edit::replace(span, format!("__wvb.load({})", js_string(&target.id)))
      }
      (DependencyKind::AssetUrl, Classification::Asset { .. }) => {
        let url = self.asset_url(node, dep)?;
        Edit::replace(span, format!("new URL({}, __wvb.base)", js_string(&url)))
      }
      (kind, classification) => {
        tracing::debug!(
          module = %node.id,
          specifier = %dep.dependency.specifier,
          ?kind,
          ?classification,
          "dependency left as written"
        );
        return Ok(None);
      }
    };
    Ok(Some(edit))
  }

  fn asset_url(&self, node: &ModuleNode, dep: &ResolvedDependency) -> BuildResult<String> {
    self
      .outputs
      .output_for(&dep.target)
      .map(|output| public_url(self.base, output))
      .ok_or_else(|| BuildError::ModuleResolution {
        importer: node.path.clone(),
        specifier: dep.dependency.specifier.clone(),
      })
  }
}

fn import_bindings(binding: &str, id: &str, clause: &ImportClause) -> String {
  let mut statements = vec![format!("const {binding} = __require({});", js_string(id))];
  if let Some(local) = &clause.default {
    statements.push(format!("const {local} = {binding}.default;"));
  }
  if let Some(local) = &clause.namespace {
    statements.push(format!("const {local} = {binding};"));
  }
  for (imported, local) in &clause.named {
    statements.push(format!("const {local} = {};", member(binding, imported)));
  }
  statements.join(" ")
}

fn local_export_edits(source: &str) -> Vec<Edit> {
  let patterns = export_patterns();
  let mut edits = Vec::new();

  for caps in patterns.declaration.captures_iter(source) {
    let (Some(keyword), Some(name)) = (
      caps.get(1),
      caps.get(3).or_else(|| caps.get(4)).or_else(|| caps.get(5)),
    ) else {
      continue;
    };
    let mut edit = Edit::replace(keyword.range(), "").exporting(name.as_str(), name.as_str());
    if caps.get(5).is_some() {
      // Left in place, a destructuring declarator trips the leftover-syntax check.
      let Some(more) = further_declarators(source, name.end()) else {
        continue;
      };
      for extra in more {
        edit = edit.exporting(extra.clone(), extra);
      }
    }
    edits.push(edit);
  }

  for caps in patterns.default.captures_iter(source) {
    let Some(keyword) = caps.get(1) else {
      continue;
    };
    let named = caps
      .get(2)
      .or_else(|| caps.get(3))
      .map(|name| name.as_str())
      .filter(|name| *name != "extends");
    edits.push(match named {
      Some(name) => Edit::replace(keyword.range(), "").exporting("default", name),
      None => Edit::replace(keyword.range(), "const __wvb_default = ")
        .exporting("default", "__wvb_default"),
    });
  }

  for caps in patterns.list.captures_iter(source) {
    let Some(whole) = caps.get(0) else {
      continue;
    };
    let mut edit = Edit::replace(whole.range(), "");
    for (local, exported) in parse_binding_list(&caps[1]) {
      edit = edit.exporting(exported, local);
    }
    edits.push(edit);
  }

  edits
}

/// Names of the declarators after the first in `const a = 1, b = 2`, scanned from the end of the
/// first name to the end of the statement. `None` when a later declarator destructures.
fn further_declarators(source: &str, from: usize) -> Option<Vec<String>> {
  let bytes = source.as_bytes();
  let mut names = Vec::new();
  let mut depth = 0usize;
  let mut quote: Option<u8> = None;
  let mut last = b'_';
  let mut index = from;
  while index < bytes.len() {
    let byte = bytes[index];
    if let Some(open) = quote {
      if byte == b'\\' {
        index += 2;
        continue;
      }
      if byte == open {
        quote = None;
      }
      index += 1;
      continue;
    }
    match byte {
      b'\'' | b'"' | b'`' => quote = Some(byte),
      b'(' | b'[' | b'{' => depth += 1,
      b')' | b']' | b'}' => depth = depth.saturating_sub(1),
      b';' if depth == 0 => break,
      b'\n' if depth == 0 => {
        let continued = matches!(last, b',' | b'=') || source[index..].trim_start().starts_with(',');
        if !continued {
          break;
        }
      }
      b',' if depth == 0 => {
        let name: String = source[index + 1..]
          .trim_start()
          .chars()
          .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '$')
          .collect();
        if name.is_empty() {
          return None;
        }
        names.push(name);
      }
      _ => {}
    }
    if !byte.is_ascii_whitespace() {
      last = byte;
    }
    index += 1;
  }
  Some(names)
}

/// Apply non-overlapping edits; when two overlap the one starting first (or the longer of two
/// starting together) wins. Returns the rewritten text and the exports of the applied edits.
fn apply_edits(source: &str, mut edits: Vec<Edit>) -> (String, Vec<(String, String)>) {
  edits.sort_by_key(|edit| (edit.span.start, Reverse(edit.span.end)));

  let mut out = String::with_capacity(source.len());
  let mut exports: Vec<(String, String)> = Vec::new();
  let mut exported = HashSet::new();
  let mut cursor = 0;
  for edit in edits {
    if edit.span.start < cursor {
      continue;
    }
    out.push_str(&source[cursor..edit.span.start]);
    out.push_str(&edit.replacement);
    cursor = edit.span.end;
    for (name, expression) in edit.exports {
      if exported.insert(name.clone()) {
        exports.push((name, expression));
      }
    }
  }
  out.push_str(&source[cursor..]);
  (out, exports)
}

fn json_body(node: &ModuleNode, source: &str) -> BuildResult<(String, Vec<(String, String)>)> {
  let value: serde_json::Value =
    serde_json::from_str(source).map_err(|err| BuildError::UnsupportedReference {
      importer: node.path.clone(),
      specifier: node.id.clone(),
      reason: format!("invalid JSON module: {err}"),
    })?;
  Ok((
    format!("var __json = {value};\n"),
    vec![("default".to_string(), "__json".to_string())],
  ))
}

fn member(binding: &str, name: &str) -> String {
  if is_identifier(name) {
    format!("{binding}.{name}")
  } else {
    format!("{binding}[{}]", js_string(name))
  }
}

fn is_identifier(name: &str) -> bool {
  let mut chars = name.chars();
  chars
    .next()
    .is_some_and(|first| first.is_alphabetic() || first == '_' || first == '$')
    && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Quote `value` as a JavaScript string literal.
pub(crate) fn js_string(value: &str) -> String {
  serde_json::Value::from(value).to_string()
}
