//! Atomic-ish installation of a finished build into the output root.
//!
//! Everything is first written into a staging directory next to the output root. Only when all
//! writes succeeded is the staging tree moved into place, so a failed pass never leaves a
//! half-written bundle behind.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use same_file::is_same_file;

use crate::bundle::assets::copy_assets;
use crate::error::{BuildError, BuildResult};
use crate::models::AssetRecord;

/// Generated file ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
  /// Output-relative path with forward slashes.
  pub path: String,
  /// File contents.
  pub contents: String,
}

/// Files and byte counts written by [`write_output`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
  /// Output-relative paths of every installed file, sorted.
  pub files: Vec<String>,
  /// Bytes of generated text written.
  pub generated_bytes: u64,
  /// Bytes of assets copied.
  pub asset_bytes: u64,
}

/// Write `generated` files and copy `assets` into `out_dir`, creating `directories` even when
/// nothing lands in them.
///
/// With `clean`, the previous contents of `out_dir` are replaced entirely. Otherwise existing
/// files that this build does not produce are left alone.
pub fn write_output(
  out_dir: &Path,
  project_root: &Path,
  generated: &[OutputFile],
  assets: &[AssetRecord],
  directories: &[String],
  clean: bool,
) -> BuildResult<WriteSummary> {
  ensure_safe_output_root(out_dir, project_root)?;

  let parent = out_dir
    .parent()
    .filter(|parent| !parent.as_os_str().is_empty())
    .unwrap_or(Path::new("."));
  fs::create_dir_all(parent).map_err(|err| BuildError::write(parent, err))?;
  let staging = tempfile::Builder::new()
    .prefix(".wvb-staging-")
    .tempdir_in(parent)
    .map_err(|err| BuildError::write(parent, err))?;
  for directory in directories {
    let path = staging.path().join(directory);
    fs::create_dir_all(&path).map_err(|err| BuildError::write(&path, err))?;
  }

  let (generated_bytes, asset_bytes) = rayon::join(
    || write_generated(staging.path(), generated),
    || copy_assets(assets, staging.path()),
  );
  let summary = WriteSummary {
    files: installed_files(generated, assets),
    generated_bytes: generated_bytes?,
    asset_bytes: asset_bytes?,
  };

  if clean {
    swap_into_place(staging.keep(), out_dir)?;
  } else {
    merge_into_place(staging.path(), out_dir, directories, &summary.files)?;
  }

  tracing::debug!(
    out_dir = %out_dir.display(),
    files = summary.files.len(),
    "installed build output"
  );
  Ok(summary)
}

/// Refuse to clear an output root that is, or contains, the project root.
pub fn ensure_safe_output_root(out_dir: &Path, project_root: &Path) -> BuildResult<()> {
  let refuse = |reason: &str| BuildError::Cleanup {
    path: out_dir.to_path_buf(),
    reason: reason.into(),
  };
  if out_dir.as_os_str().is_empty() || out_dir.parent().is_none() {
    return Err(refuse("the output root must not be a filesystem root"));
  }
  if out_dir.exists() && is_same_file(out_dir, project_root).unwrap_or(false) {
    return Err(refuse("the output root is the project root"));
  }
  let out_abs = dunce::canonicalize(out_dir).unwrap_or_else(|_| out_dir.to_path_buf());
  let root_abs = dunce::canonicalize(project_root).unwrap_or_else(|_| project_root.to_path_buf());
  if root_abs.starts_with(&out_abs) {
    return Err(refuse("the output root contains the project root"));
  }
  Ok(())
}

fn write_generated(root: &Path, files: &[OutputFile]) -> BuildResult<u64> {
  files
    .par_iter()
    .map(|file| {
      let destination = root.join(&file.path);
      if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|err| BuildError::write(parent, err))?;
      }
      fs::write(&destination, &file.contents)
        .map_err(|err| BuildError::write(&destination, err))?;
      Ok(file.contents.len() as u64)
    })
    .try_reduce(|| 0, |total, bytes| Ok(total + bytes))
}

fn installed_files(generated: &[OutputFile], assets: &[AssetRecord]) -> Vec<String> {
  let mut files: Vec<String> = generated
    .iter()
    .map(|file| file.path.clone())
    .chain(assets.iter().map(|record| record.output_path.clone()))
    .collect();
  files.sort();
  files
}

fn swap_into_place(staged: PathBuf, out_dir: &Path) -> BuildResult<()> {
  let backup = backup_path(out_dir);
  let had_previous = match fs::symlink_metadata(out_dir) {
    Ok(_) => {
      fs::rename(out_dir, &backup).map_err(|err| {
        discard(&staged);
        BuildError::Cleanup {
          path: out_dir.to_path_buf(),
          reason: err.to_string(),
        }
      })?;
      true
    }
    Err(err) if err.kind() == ErrorKind::NotFound => false,
    Err(err) => {
      discard(&staged);
      return Err(BuildError::Cleanup {
        path: out_dir.to_path_buf(),
        reason: err.to_string(),
      });
    }
  };

  if let Err(err) = fs::rename(&staged, out_dir) {
    if had_previous && let Err(restore) = fs::rename(&backup, out_dir) {
      tracing::error!(
        backup = %backup.display(),
        "failed to restore previous output: {restore}"
      );
    }
    discard(&staged);
    return Err(BuildError::write(out_dir, err));
  }

  if had_previous && let Err(err) = remove_path(&backup) {
    tracing::warn!(
      backup = %backup.display(),
      "failed to remove previous output: {err}"
    );
  }
  Ok(())
}

fn merge_into_place(
  staged: &Path,
  out_dir: &Path,
  directories: &[String],
  files: &[String],
) -> BuildResult<()> {
  fs::create_dir_all(out_dir).map_err(|err| BuildError::write(out_dir, err))?;
  for directory in directories {
    let path = out_dir.join(directory);
    fs::create_dir_all(&path).map_err(|err| BuildError::write(&path, err))?;
  }
  for file in files {
    let from = staged.join(file);
    let to = out_dir.join(file);
    if let Some(parent) = to.parent() {
      fs::create_dir_all(parent).map_err(|err| BuildError::write(parent, err))?;
    }
    if to.is_dir() {
      return Err(BuildError::write(
        &to,
        std::io::Error::new(ErrorKind::AlreadyExists, "a directory occupies this path"),
      ));
    }
    fs::rename(&from, &to).map_err(|err| BuildError::write(&to, err))?;
  }
  Ok(())
}

fn backup_path(out_dir: &Path) -> PathBuf {
  let name = out_dir
    .file_name()
    .map(|name| name.to_string_lossy().to_string())
    .unwrap_or_else(|| "output".into());
  out_dir.with_file_name(format!(".{name}.wvb-previous-{}", std::process::id()))
}

fn remove_path(path: &Path) -> std::io::Result<()> {
  match fs::symlink_metadata(path) {
    Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
    Ok(_) => fs::remove_file(path),
    Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
    Err(err) => Err(err),
  }
}

fn discard(path: &Path) {
  if let Err(err) = remove_path(path) {
    tracing::warn!(path = %path.display(), "failed to remove staging directory: {err}");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;
  use tempfile::tempdir;

  fn file(path: &str, contents: &str) -> OutputFile {
    OutputFile {
      path: path.into(),
      contents: contents.into(),
    }
  }

  fn listing(root: &Path) -> Vec<String> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
      for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
          stack.push(path);
        } else {
          let relative = path.strip_prefix(root).unwrap();
          found.push(relative.to_string_lossy().replace('\\', "/"));
        }
      }
    }
    found.sort();
    found
  }

  #[test]
  fn clean_builds_replace_previous_output() {
    let dir = tempdir().unwrap();
    let project = dir.path().join("project");
    let out = dir.path().join("assets");
    fs::create_dir_all(&project).unwrap();
    fs::create_dir_all(out.join("chunks")).unwrap();
    fs::write(out.join("chunks/stale.js"), "stale").unwrap();

    let summary = write_output(
      &out,
      &project,
      &[file("main.js", "run()"), file("index.html", "<html>")],
      &[],
      &["chunks".to_string(), "assets".to_string()],
      true,
    )
    .unwrap();

    assert_eq!(summary.files, vec!["index.html", "main.js"]);
    assert_eq!(summary.generated_bytes, 11);
    assert_eq!(listing(&out), vec!["index.html", "main.js"]);
    assert!(out.join("chunks").is_dir());
    assert!(out.join("assets").is_dir());
    let leftovers: Vec<_> = fs::read_dir(dir.path())
      .unwrap()
      .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
      .filter(|name| name.starts_with('.'))
      .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
  }

  #[test]
  fn incremental_builds_keep_unrelated_files() {
    let dir = tempdir().unwrap();
    let project = dir.path().join("project");
    let out = dir.path().join("assets");
    fs::create_dir_all(&project).unwrap();
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("notes.txt"), "keep").unwrap();
    fs::write(out.join("main.js"), "old").unwrap();

    write_output(&out, &project, &[file("main.js", "new")], &[], &[], false).unwrap();

    assert_eq!(listing(&out), vec!["main.js", "notes.txt"]);
    assert_eq!(fs::read_to_string(out.join("main.js")).unwrap(), "new");
  }

  #[test]
  fn refuses_to_clean_the_project_root_or_its_ancestors() {
    let dir = tempdir().unwrap();
    let project = dir.path().join("project");
    fs::create_dir_all(&project).unwrap();

    for out in [project.clone(), dir.path().to_path_buf()] {
      let err =
        write_output(&out, &project, &[file("main.js", "")], &[], &[], true).unwrap_err();
      assert!(matches!(err, BuildError::Cleanup { .. }), "{err}");
    }
    assert!(project.exists());
  }

  #[test]
  fn failed_writes_leave_the_previous_output_untouched() {
    let dir = tempdir().unwrap();
    let project = dir.path().join("project");
    let out = dir.path().join("assets");
    fs::create_dir_all(&project).unwrap();
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("main.js"), "previous").unwrap();

    let assets = vec![AssetRecord {
      source_path: project.join("missing.glb"),
      extension: "glb".into(),
      output_path: "assets/missing.glb".into(),
    }];
    let err =
      write_output(&out, &project, &[file("main.js", "next")], &assets, &[], true).unwrap_err();
    assert!(matches!(err, BuildError::Write { .. }));
    assert_eq!(fs::read_to_string(out.join("main.js")).unwrap(), "previous");
  }

  #[test]
  fn failed_swaps_remove_the_staging_directory() {
    let dir = tempdir().unwrap();
    let project = dir.path().join("project");
    let out = dir.path().join("assets");
    fs::create_dir_all(&project).unwrap();
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("main.js"), "previous").unwrap();
    let blocker = backup_path(&out);
    fs::create_dir_all(&blocker).unwrap();
    fs::write(blocker.join("occupied"), "").unwrap();

    let err =
      write_output(&out, &project, &[file("main.js", "next")], &[], &[], true).unwrap_err();
    assert!(matches!(err, BuildError::Cleanup { .. }), "{err}");
    assert_eq!(fs::read_to_string(out.join("main.js")).unwrap(), "previous");
    let staging: Vec<_> = fs::read_dir(dir.path())
      .unwrap()
      .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
      .filter(|name| name.starts_with(".wvb-staging-"))
      .collect();
    assert!(staging.is_empty(), "{staging:?}");
  }
}
