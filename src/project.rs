//! Resolved build options and the per-build context handed to the bundler.

use std::path::{Component, Path, PathBuf};

use crate::asset_paths::{AssetClassifier, OutputLayout};
use crate::config::ProjectConfig;
use crate::resolve::AliasTable;
use crate::stages::{EnvReplaceStage, StagePipeline, TransformStage};

/// Validated options with every path made absolute.
#[derive(Debug, Clone)]
pub struct BuildOptions {
  /// Canonical project root; module identifiers are relative to it.
  pub root: PathBuf,
  /// HTML entry document, if the project has one.
  pub html_entry: Option<PathBuf>,
  /// Additional script entries.
  pub entries: Vec<PathBuf>,
  /// Normalised public base, always ending with `/`.
  pub base: String,
  /// Alias rules.
  pub aliases: AliasTable,
  /// File classifier.
  pub classifier: AssetClassifier,
  /// Output naming.
  pub layout: OutputLayout,
  /// Extensions tried for extension-less specifiers.
  pub extensions: Vec<String>,
  /// Output root.
  pub out_dir: PathBuf,
  /// Directory copied verbatim into the output root.
  pub public_dir: PathBuf,
  /// Replace the output root instead of writing into it.
  pub clean: bool,
  /// Build mode.
  pub mode: String,
  /// Write `manifest.json`.
  pub write_manifest: bool,
}

/// Everything a single build needs. Each build owns its own context, so concurrent builds do
/// not share mutable state.
#[derive(Debug)]
pub struct OfflineBuildContext {
  /// Resolved options.
  pub options: BuildOptions,
  /// Registered transform stages.
  pub stages: StagePipeline,
}

impl OfflineBuildContext {
  /// Context with the default stages (environment replacement) registered.
  pub fn new(options: BuildOptions) -> Self {
    let mut stages = StagePipeline::default();
    stages.register(EnvReplaceStage::new(&options.mode, &options.base));
    Self { options, stages }
  }

  /// Context without any transform stage.
  pub fn bare(options: BuildOptions) -> Self {
    Self {
      options,
      stages: StagePipeline::default(),
    }
  }

  /// Load configuration for `project_dir` (discovering `webview.config.json`) and build a
  /// default context from it.
  pub fn discover(project_dir: &Path) -> anyhow::Result<Self> {
    let config = ProjectConfig::discover(project_dir)?;
    Ok(Self::new(config.into_options(project_dir)?))
  }

  /// Append a transform stage, run after the ones already registered.
  pub fn with_stage(mut self, stage: impl TransformStage + 'static) -> Self {
    self.stages.register(stage);
    self
  }
}

/// Normalise `.` and `..` components without touching the filesystem.
pub fn lexical_clean(path: &Path) -> PathBuf {
  let mut cleaned = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        let popped = matches!(cleaned.components().next_back(), Some(Component::Normal(_)))
          && cleaned.pop();
        if !popped && !cleaned.has_root() {
          cleaned.push("..");
        }
      }
      other => cleaned.push(other.as_os_str()),
    }
  }
  cleaned
}
