//! Data structures produced while resolving, splitting and emitting a bundle.

use std::ops::Range;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Bucket a source file falls into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum Classification {
  /// Bundlable JavaScript (or JSON) module.
  Script,
  /// Passthrough file copied byte-for-byte into the asset subtree.
  Asset {
    /// Extension that matched, without the leading dot.
    extension: String,
  },
  /// The designated HTML entry document.
  EntryHtml,
}

impl Classification {
  /// Returns `true` for bundlable modules.
  pub fn is_script(&self) -> bool {
    matches!(self, Self::Script)
  }

  /// Returns `true` for passthrough assets.
  pub fn is_asset(&self) -> bool {
    matches!(self, Self::Asset { .. })
  }
}

/// Contents of a module as loaded from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModulePayload {
  /// UTF-8 source text of a script or HTML document.
  Text(String),
  /// Asset bytes stay on disk and are copied verbatim at emit time.
  Passthrough,
}

impl ModulePayload {
  /// Borrow the source text, if the payload has any.
  pub fn text(&self) -> Option<&str> {
    match self {
      Self::Text(text) => Some(text),
      Self::Passthrough => None,
    }
  }
}

/// Binding list of a static `import … from` statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportClause {
  /// Local name bound to the default export.
  pub default: Option<String>,
  /// Local name bound to the namespace object (`* as ns`).
  pub namespace: Option<String>,
  /// `(imported, local)` pairs from the braced list.
  pub named: Vec<(String, String)>,
}

/// Shape of an `export … from` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReExportClause {
  /// `export * from`
  All,
  /// `export * as name from`
  Namespace(String),
  /// `export { a, b as c } from`, as `(imported, exported)` pairs.
  Named(Vec<(String, String)>),
}

/// How a dependency is referenced from its importer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyKind {
  /// Static import with bindings.
  Import(ImportClause),
  /// `import "x"` evaluated for side effects only.
  SideEffect,
  /// Re-export from another module.
  ReExport(ReExportClause),
  /// `import("x")` call.
  Dynamic,
  /// `new URL("x", import.meta.url)` asset reference.
  AssetUrl,
  /// `<script src>` in the HTML entry document.
  HtmlScript,
  /// `src`/`href`/`poster` attribute in the HTML entry document.
  HtmlResource,
}

/// Dependency specifier extracted by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
  /// Specifier text exactly as written in source.
  pub specifier: String,
  /// Syntactic form of the reference.
  pub kind: DependencyKind,
  /// Byte range in the source that is replaced when the reference is rewritten.
  pub span: Range<usize>,
}

/// Dependency paired with the canonical path it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDependency {
  /// Scanned reference.
  pub dependency: Dependency,
  /// Canonical absolute path of the target module.
  pub target: PathBuf,
}

/// Unique module discovered while traversing the graph.
#[derive(Debug, Clone)]
pub struct ModuleNode {
  /// Canonical absolute source path, the node identity.
  pub path: PathBuf,
  /// Root-relative identifier with forward slashes, used in emitted code.
  pub id: String,
  /// Classification tag.
  pub classification: Classification,
  /// Loaded contents.
  pub payload: ModulePayload,
  /// Dependencies in source order.
  pub dependencies: Vec<ResolvedDependency>,
}

impl ModuleNode {
  /// File name without extension, used to derive chunk names.
  pub fn stem(&self) -> &str {
    self
      .path
      .file_stem()
      .and_then(|stem| stem.to_str())
      .unwrap_or("module")
  }
}

/// Directed edge between two graph nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportEdge<'a> {
  /// Importing module.
  pub from: &'a Path,
  /// Imported module.
  pub to: &'a Path,
  /// Specifier as written in the importer.
  pub specifier: &'a str,
}

/// Role of a chunk in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkKind {
  /// Owns one entry module and runs it when loaded.
  Entry,
  /// Holds modules reachable from several entries.
  Shared,
}

/// Unit of emitted code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
  /// Deterministic chunk name.
  pub name: String,
  /// Output-relative file name.
  pub file_name: String,
  /// Role of the chunk.
  pub kind: ChunkKind,
  /// Module paths in execution order.
  pub modules: Vec<PathBuf>,
  /// Entry module for [`ChunkKind::Entry`] chunks.
  pub entry: Option<PathBuf>,
  /// File names of other chunks that must be loaded before this one.
  pub imports: Vec<String>,
}

/// Asset scheduled for emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRecord {
  /// Canonical source path.
  pub source_path: PathBuf,
  /// Classified extension without the leading dot.
  pub extension: String,
  /// Output-relative destination, always forward-slashed.
  pub output_path: String,
}
