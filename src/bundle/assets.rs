//! Asset naming and byte-for-byte emission.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::asset_paths::OutputLayout;
use crate::bundle::manifest::OutputManifest;
use crate::error::{BuildError, BuildResult};
use crate::graph::ModuleGraph;
use crate::models::{AssetRecord, Classification};
use crate::stages::StagePipeline;

/// Name every asset in the graph, in discovery order, and claim its output path.
///
/// Asset stages run before the claim, so a stage that renames an output still goes through
/// collision detection and output-root validation.
pub fn plan_assets(
  graph: &ModuleGraph,
  layout: &OutputLayout,
  stages: &StagePipeline,
  outputs: &mut OutputManifest,
) -> BuildResult<Vec<AssetRecord>> {
  let mut records = Vec::new();
  for node in graph.assets() {
    let Classification::Asset { extension } = &node.classification else {
      continue;
    };
    let record = stages.apply_asset(AssetRecord {
      source_path: node.path.clone(),
      extension: extension.clone(),
      output_path: layout.asset_path(&node.path, extension),
    })?;
    outputs.assign(&record.source_path, &record.output_path)?;
    tracing::debug!(asset = %node.id, output = %record.output_path, "planned asset");
    records.push(record);
  }
  Ok(records)
}

/// Collect every file below `public_dir`, mapped to the same relative path in the output root.
///
/// Hidden files are skipped. A missing directory yields nothing.
pub fn collect_public_files(
  public_dir: &Path,
  outputs: &mut OutputManifest,
) -> BuildResult<Vec<AssetRecord>> {
  let mut files = Vec::new();
  walk_public_dir(public_dir, Path::new(""), &mut files)?;
  files.sort();

  let mut records = Vec::with_capacity(files.len());
  for relative in files {
    let output_path = relative
      .components()
      .map(|component| component.as_os_str().to_string_lossy())
      .collect::<Vec<_>>()
      .join("/");
    let source_path = public_dir.join(&relative);
    outputs.assign(&source_path, &output_path)?;
    let extension = relative
      .extension()
      .map(|ext| ext.to_string_lossy().to_string())
      .unwrap_or_default();
    records.push(AssetRecord {
      source_path,
      extension,
      output_path,
    });
  }
  Ok(records)
}

fn walk_public_dir(root: &Path, relative: &Path, files: &mut Vec<PathBuf>) -> BuildResult<()> {
  let current = root.join(relative);
  let entries = match fs::read_dir(&current) {
    Ok(entries) => entries,
    Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
    Err(err) => return Err(BuildError::read(&current, err)),
  };

  for entry in entries {
    let entry = entry.map_err(|err| BuildError::read(&current, err))?;
    let file_name = entry.file_name();
    if file_name.to_string_lossy().starts_with('.') {
      continue;
    }
    let child = relative.join(&file_name);
    let file_type = entry
      .file_type()
      .map_err(|err| BuildError::read(entry.path(), err))?;
    if file_type.is_dir() {
      walk_public_dir(root, &child, files)?;
    } else if file_type.is_file() {
      files.push(child);
    }
  }
  Ok(())
}

/// Copy every record below `out_root`, creating parent directories as needed.
///
/// Copies run on the rayon pool; the first failure is returned.
pub fn copy_assets(records: &[AssetRecord], out_root: &Path) -> BuildResult<u64> {
  records
    .par_iter()
    .map(|record| {
      let destination = out_root.join(&record.output_path);
      install_asset(&record.source_path, &destination)
    })
    .try_reduce(|| 0, |total, bytes| Ok(total + bytes))
}

fn install_asset(source: &Path, destination: &Path) -> BuildResult<u64> {
  if let Some(parent) = destination.parent() {
    fs::create_dir_all(parent).map_err(|err| BuildError::write(parent, err))?;
  }
  fs::copy(source, destination).map_err(|err| BuildError::write(destination, err))
}
