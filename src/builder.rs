//! Build orchestrator: resolve, split, name, render and write.

use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;

use crate::asset_paths::OutputLayout;
use crate::bundle::assets::{collect_public_files, plan_assets};
use crate::bundle::js_patch::ModuleRewriter;
use crate::bundle::manifest::OutputManifest;
use crate::bundle::runtime::render_chunk;
use crate::bundle::site::rewrite_html;
use crate::bundle::writer::{OutputFile, write_output};
use crate::code_splitter::split;
use crate::error::{BuildError, BuildResult};
use crate::graph::{ModuleGraph, TraversalContext, resolve};
use crate::models::{AssetRecord, Chunk, ChunkKind};
use crate::project::OfflineBuildContext;
use crate::resolve::{Resolver, canonical};

/// File name of the optional output manifest.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Resolved graph, chunks and output names of a build that has not been written yet.
#[derive(Debug)]
pub struct BuildPlan {
  /// Module graph.
  pub graph: ModuleGraph,
  /// Chunks in emission order.
  pub chunks: Vec<Chunk>,
  /// Claimed output paths.
  pub outputs: OutputManifest,
  /// Assets referenced from the graph.
  pub assets: Vec<AssetRecord>,
  /// Files copied from the public directory.
  pub public_files: Vec<AssetRecord>,
  /// Output path of the rewritten HTML entry.
  pub html_output: Option<String>,
}

/// Summary of a finished build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
  /// Output root that was written.
  pub out_dir: PathBuf,
  /// Number of modules in the graph, assets included.
  pub modules: usize,
  /// Output paths of the emitted chunks, entry chunks first.
  pub chunks: Vec<String>,
  /// Number of copied assets, public files included.
  pub assets: usize,
  /// Every written file, sorted.
  pub files: Vec<String>,
  /// Bytes of generated code and markup.
  pub generated_bytes: u64,
  /// Bytes of copied assets.
  pub asset_bytes: u64,
}

/// Bundler for a single configured project.
#[derive(Debug)]
pub struct OfflineBundler {
  context: OfflineBuildContext,
}

impl OfflineBundler {
  /// Create a bundler for the provided build context.
  pub fn new(context: OfflineBuildContext) -> Self {
    Self { context }
  }

  /// Build context in use.
  pub fn context(&self) -> &OfflineBuildContext {
    &self.context
  }

  /// Resolve the graph, split it into chunks and claim every output path without writing.
  pub fn plan(&self) -> BuildResult<BuildPlan> {
    let options = &self.context.options;
    let started = Instant::now();

    let html_entry = match &options.html_entry {
      Some(path) => Some(canonical(path).ok_or_else(|| BuildError::ModuleResolution {
        importer: options.root.clone(),
        specifier: display_relative(&options.root, path),
      })?),
      None => None,
    };
    let mut entry_paths: Vec<PathBuf> = html_entry.iter().cloned().collect();
    for entry in &options.entries {
      let path = canonical(entry).ok_or_else(|| BuildError::ModuleResolution {
        importer: options.root.clone(),
        specifier: display_relative(&options.root, entry),
      })?;
      entry_paths.push(path);
    }

    let classifier = options.classifier.for_html_entry(html_entry.clone());
    let ctx = TraversalContext {
      root: &options.root,
      resolver: Resolver::new(&options.root, &options.aliases, &options.extensions),
      classifier: &classifier,
      stages: &self.context.stages,
    };
    let graph = resolve(&entry_paths, &ctx)?;
    tracing::info!(
      modules = graph.nodes().len(),
      entries = graph.entries().len(),
      elapsed = ?started.elapsed(),
      "resolved module graph"
    );

    let chunks = split(&graph, &options.layout)?;

    let mut outputs = OutputManifest::default();
    let html_output = match graph.html_entry() {
      Some(html) => {
        let name = html
          .path
          .file_name()
          .map(|name| name.to_string_lossy().to_string())
          .unwrap_or_else(|| "index.html".into());
        outputs.assign(&html.path, &name)?;
        Some(name)
      }
      None => None,
    };
    for chunk in &chunks {
      let owner = chunk
        .entry
        .as_ref()
        .or_else(|| chunk.modules.first())
        .cloned()
        .unwrap_or_else(|| options.root.join(&chunk.file_name));
      outputs.claim(&chunk.file_name, &owner)?;
      for module in &chunk.modules {
        outputs.record(module, &chunk.file_name);
      }
    }
    let assets = plan_assets(&graph, &options.layout, &self.context.stages, &mut outputs)?;
    let public_files = collect_public_files(&options.public_dir, &mut outputs)?;
    if options.write_manifest {
      outputs.claim(MANIFEST_FILE, &options.out_dir.join(MANIFEST_FILE))?;
    }

    tracing::info!(
      chunks = chunks.len(),
      assets = assets.len(),
      public = public_files.len(),
      "planned output"
    );

    Ok(BuildPlan {
      graph,
      chunks,
      outputs,
      assets,
      public_files,
      html_output,
    })
  }

  /// Run the full pipeline and write the bundle.
  ///
  /// Nothing is written unless every module resolved, every output name is unique and every
  /// file rendered.
  pub fn build(&self) -> BuildResult<BuildReport> {
    let options = &self.context.options;
    let started = Instant::now();
    let plan = self.plan()?;
    let generated = self.render(&plan)?;

    let copies: Vec<AssetRecord> = plan
      .assets
      .iter()
      .chain(&plan.public_files)
      .cloned()
      .collect();
    let summary = write_output(
      &options.out_dir,
      &options.root,
      &generated,
      &copies,
      &output_directories(&options.layout),
      options.clean,
    )?;

    let report = BuildReport {
      out_dir: options.out_dir.clone(),
      modules: plan.graph.nodes().len(),
      chunks: plan
        .chunks
        .iter()
        .map(|chunk| chunk.file_name.clone())
        .collect(),
      assets: copies.len(),
      files: summary.files,
      generated_bytes: summary.generated_bytes,
      asset_bytes: summary.asset_bytes,
    };
    tracing::info!(
      out_dir = %report.out_dir.display(),
      files = report.files.len(),
      entry_chunks = plan.chunks.iter().filter(|c| c.kind == ChunkKind::Entry).count(),
      elapsed = ?started.elapsed(),
      "bundle written"
    );
    Ok(report)
  }

  /// Render chunks, the HTML entry and the optional manifest into memory.
  pub fn render(&self, plan: &BuildPlan) -> BuildResult<Vec<OutputFile>> {
    let options = &self.context.options;
    let rewriter = ModuleRewriter::new(&plan.graph, &plan.outputs, &options.base);

    let mut files = plan
      .chunks
      .par_iter()
      .map(|chunk| {
        let contents = render_chunk(chunk, &plan.graph, &rewriter)?;
        tracing::debug!(chunk = %chunk.file_name, bytes = contents.len(), "rendered chunk");
        Ok(OutputFile {
          path: chunk.file_name.clone(),
          contents,
        })
      })
      .collect::<BuildResult<Vec<_>>>()?;

    if let (Some(html), Some(output)) = (plan.graph.html_entry(), &plan.html_output) {
      files.push(OutputFile {
        path: output.clone(),
        contents: rewrite_html(html, &plan.chunks, &plan.outputs, &options.base)?,
      });
    }
    if options.write_manifest {
      files.push(OutputFile {
        path: MANIFEST_FILE.into(),
        contents: plan.outputs.summary(&options.root).to_json()?,
      });
    }
    Ok(files)
  }
}

/// Directories the chunk and asset patterns write into, created even when empty.
fn output_directories(layout: &OutputLayout) -> Vec<String> {
  [
    layout.chunk_path("chunk"),
    layout.asset_path(Path::new("asset.bin"), "bin"),
  ]
  .iter()
  .filter_map(|output| output.rsplit_once('/').map(|(dir, _)| dir.to_string()))
  .collect()
}

fn display_relative(root: &Path, path: &Path) -> String {
  pathdiff::diff_paths(path, root)
    .unwrap_or_else(|| path.to_path_buf())
    .to_string_lossy()
    .replace('\\', "/")
}
