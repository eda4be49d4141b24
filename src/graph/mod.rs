//! Module graph construction from the configured entry points.
//!
//! Traversal proceeds in layers. Every module of a layer is read, transformed, scanned and has
//! its specifiers resolved on the rayon pool; the coordinator then merges the layer in frontier
//! order, which keeps node discovery order identical to a sequential breadth-first walk.

mod order;
mod scan;

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

pub use order::execution_order;
pub use scan::{
  comment_spans, in_comment, parse_binding_list, parse_import_clause, scan_html, scan_script,
};

use crate::asset_paths::AssetClassifier;
use crate::error::{BuildError, BuildResult};
use crate::models::{
  Classification, Dependency, DependencyKind, ImportEdge, ModuleNode, ModulePayload,
  ResolvedDependency,
};
use crate::resolve::Resolver;
use crate::stages::StagePipeline;

/// Collaborators needed while traversing.
#[derive(Debug, Clone, Copy)]
pub struct TraversalContext<'a> {
  /// Canonical project root, used to derive module identifiers.
  pub root: &'a Path,
  /// Specifier resolver.
  pub resolver: Resolver<'a>,
  /// File classifier.
  pub classifier: &'a AssetClassifier,
  /// Registered transform stages.
  pub stages: &'a StagePipeline,
}

/// Directed graph of every module reachable from the entry points.
#[derive(Debug, Default)]
pub struct ModuleGraph {
  nodes: Vec<ModuleNode>,
  index: HashMap<PathBuf, usize>,
  script_children: Vec<Vec<usize>>,
  entries: Vec<PathBuf>,
  html_entry: Option<PathBuf>,
}

impl ModuleGraph {
  /// Nodes in discovery order.
  pub fn nodes(&self) -> &[ModuleNode] {
    &self.nodes
  }

  /// Look a node up by canonical path.
  pub fn node(&self, path: &Path) -> Option<&ModuleNode> {
    self.index.get(path).map(|&index| &self.nodes[index])
  }

  /// Discovery index of a node.
  pub fn index_of(&self, path: &Path) -> Option<usize> {
    self.index.get(path).copied()
  }

  /// Script entry points: HTML `<script>` targets in document order, then configured entries.
  pub fn entries(&self) -> &[PathBuf] {
    &self.entries
  }

  /// The HTML entry document, when the build has one.
  pub fn html_entry(&self) -> Option<&ModuleNode> {
    self.html_entry.as_deref().and_then(|path| self.node(path))
  }

  /// Every edge in discovery order, then source order.
  pub fn edges(&self) -> impl Iterator<Item = ImportEdge<'_>> {
    self.nodes.iter().flat_map(|node| {
      node.dependencies.iter().map(move |dep| ImportEdge {
        from: &node.path,
        to: &dep.target,
        specifier: &dep.dependency.specifier,
      })
    })
  }

  /// Indices of the scripts `index` depends on, in source order without duplicates.
  pub fn script_dependency_indices(&self, index: usize) -> &[usize] {
    self
      .script_children
      .get(index)
      .map(Vec::as_slice)
      .unwrap_or_default()
  }

  /// Passthrough assets in discovery order.
  pub fn assets(&self) -> impl Iterator<Item = &ModuleNode> {
    self
      .nodes
      .iter()
      .filter(|node| node.classification.is_asset())
  }

  fn insert(&mut self, node: ModuleNode) {
    self.index.insert(node.path.clone(), self.nodes.len());
    self.nodes.push(node);
  }

  fn link(&mut self) {
    let children = self
      .nodes
      .iter()
      .map(|node| {
        if !node.classification.is_script() {
          return Vec::new();
        }
        let mut seen = HashSet::new();
        node
          .dependencies
          .iter()
          .filter_map(|dep| self.index.get(&dep.target).copied())
          .filter(|&child| self.nodes[child].classification.is_script())
          .filter(|&child| seen.insert(child))
          .collect()
      })
      .collect();
    self.script_children = children;
  }
}

/// Build the module graph starting from `entry_paths` (canonical paths of the HTML entry and any
/// script entries).
///
/// Fails on the first unresolvable specifier in discovery order; broken edges are never dropped.
pub fn resolve(entry_paths: &[PathBuf], ctx: &TraversalContext<'_>) -> BuildResult<ModuleGraph> {
  let mut graph = ModuleGraph::default();
  let mut seen: HashSet<PathBuf> = HashSet::new();
  let mut frontier: Vec<PathBuf> = entry_paths
    .iter()
    .filter(|path| seen.insert((*path).clone()))
    .cloned()
    .collect();

  let mut layer = 0usize;
  while !frontier.is_empty() {
    tracing::trace!(layer, modules = frontier.len(), "resolving layer");
    let loaded: Vec<BuildResult<ModuleNode>> = frontier
      .par_iter()
      .map(|path| load_module(path, ctx))
      .collect();

    let mut next = Vec::new();
    for result in loaded {
      let node = result?;
      for dep in &node.dependencies {
        if seen.insert(dep.target.clone()) {
          next.push(dep.target.clone());
        }
      }
      tracing::debug!(module = %node.id, dependencies = node.dependencies.len(), "loaded module");
      graph.insert(node);
    }

    frontier = next;
    layer += 1;
  }

  let mut entries: Vec<PathBuf> = Vec::new();
  let mut html_entry = None;
  for path in entry_paths {
    let Some(node) = graph.node(path) else {
      continue;
    };
    match node.classification {
      Classification::EntryHtml => {
        html_entry = Some(path.clone());
        for dep in &node.dependencies {
          if dep.dependency.kind == DependencyKind::HtmlScript && !entries.contains(&dep.target) {
            entries.push(dep.target.clone());
          }
        }
      }
      Classification::Script => {
        if !entries.contains(path) {
          entries.push(path.clone());
        }
      }
      Classification::Asset { .. } => {
        return Err(BuildError::UnsupportedReference {
          importer: ctx.root.to_path_buf(),
          specifier: module_id(ctx.root, path),
          reason: "an asset cannot be a build entry".into(),
        });
      }
    }
  }
  graph.entries = entries;
  graph.html_entry = html_entry;
  graph.link();

  Ok(graph)
}

/// Root-relative, forward-slashed identifier for `path`.
pub fn module_id(root: &Path, path: &Path) -> String {
  let relative = pathdiff::diff_paths(path, root).unwrap_or_else(|| path.to_path_buf());
  relative
    .components()
    .map(|component| component.as_os_str().to_string_lossy())
    .collect::<Vec<_>>()
    .join("/")
}

fn load_module(path: &Path, ctx: &TraversalContext<'_>) -> BuildResult<ModuleNode> {
  let classification = ctx.classifier.classify(path);
  let payload = if classification.is_asset() {
    ModulePayload::Passthrough
  } else {
    ModulePayload::Text(fs::read_to_string(path).map_err(|err| BuildError::read(path, err))?)
  };

  let node = ModuleNode {
    path: path.to_path_buf(),
    id: module_id(ctx.root, path),
    classification,
    payload,
    dependencies: Vec::new(),
  };
  if node.classification.is_asset() {
    return Ok(node);
  }

  let mut node = ctx.stages.apply_module(node)?;
  let scanned = match (&node.classification, node.payload.text()) {
    (Classification::EntryHtml, Some(text)) => scan_html(text),
    (Classification::Script, Some(text)) if !is_json_module(path) => scan_script(text),
    _ => Vec::new(),
  };

  let resolved: Vec<BuildResult<ResolvedDependency>> = scanned
    .into_par_iter()
    .map(|dependency| resolve_dependency(path, dependency, ctx))
    .collect();
  node.dependencies = resolved.into_iter().collect::<BuildResult<Vec<_>>>()?;
  Ok(node)
}

fn resolve_dependency(
  importer: &Path,
  dependency: Dependency,
  ctx: &TraversalContext<'_>,
) -> BuildResult<ResolvedDependency> {
  let target = ctx.resolver.resolve(importer, &dependency.specifier)?;
  let classification = ctx.classifier.classify(&target);

  let rejection = match (&dependency.kind, &classification) {
    (_, Classification::EntryHtml) => Some("the HTML entry document cannot be imported"),
    (DependencyKind::HtmlScript, Classification::Asset { .. }) => {
      Some("a <script> must reference a script module")
    }
    (DependencyKind::HtmlResource | DependencyKind::AssetUrl, Classification::Script) => {
      Some("referenced as a static resource but not a recognised asset type")
    }
    (DependencyKind::Dynamic, Classification::Asset { .. }) => {
      Some("assets cannot be loaded with import()")
    }
    _ => None,
  };
  if let Some(reason) = rejection {
    return Err(BuildError::UnsupportedReference {
      importer: importer.to_path_buf(),
      specifier: dependency.specifier,
      reason: reason.into(),
    });
  }

  Ok(ResolvedDependency { dependency, target })
}

/// JSON files imported as modules are emitted as data, without scanning.
pub fn is_json_module(path: &Path) -> bool {
  path.extension().is_some_and(|ext| ext == "json")
}
