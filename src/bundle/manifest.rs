//! Bookkeeping of which source owns which output path.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{BuildError, BuildResult};
use crate::graph::module_id;

/// Output paths claimed during a build pass.
///
/// Every emitted file, whether a chunk, an asset or the rewritten HTML document, claims its
/// output-relative path here before anything touches the disk. A second source claiming an
/// already owned path aborts the pass with [`BuildError::NamingCollision`].
#[derive(Debug, Default, Clone)]
pub struct OutputManifest {
  by_source: BTreeMap<PathBuf, String>,
  claims: BTreeMap<String, (String, PathBuf)>,
}

impl OutputManifest {
  /// Claim `output` on behalf of `source`.
  ///
  /// Claiming the same pair twice is a no-op.
  pub fn claim(&mut self, output: &str, source: &Path) -> BuildResult<()> {
    let key = output_key(output);
    if let Some((_, owner)) = self.claims.get(&key) {
      if owner == source {
        return Ok(());
      }
      return Err(BuildError::NamingCollision {
        output: output.to_string(),
        first: owner.clone(),
        second: source.to_path_buf(),
      });
    }
    self
      .claims
      .insert(key, (output.to_string(), source.to_path_buf()));
    Ok(())
  }

  /// Claim `output` and remember it as the emitted location of `source`.
  pub fn assign(&mut self, source: &Path, output: &str) -> BuildResult<()> {
    self.claim(output, source)?;
    self
      .by_source
      .insert(source.to_path_buf(), output.to_string());
    Ok(())
  }

  /// Remember that `source` is emitted inside `output`, which was claimed separately.
  ///
  /// Used for modules bundled into a chunk.
  pub fn record(&mut self, source: &Path, output: &str) {
    self
      .by_source
      .insert(source.to_path_buf(), output.to_string());
  }

  /// Emitted location of `source`, if it was assigned one.
  pub fn output_for(&self, source: &Path) -> Option<&str> {
    self.by_source.get(source).map(String::as_str)
  }

  /// Every claimed output path, sorted case-insensitively.
  pub fn outputs(&self) -> impl Iterator<Item = &str> {
    self.claims.values().map(|(output, _)| output.as_str())
  }

  /// Number of claimed outputs.
  pub fn len(&self) -> usize {
    self.claims.len()
  }

  /// Returns `true` when nothing has been claimed.
  pub fn is_empty(&self) -> bool {
    self.claims.is_empty()
  }

  /// Serialisable summary mapping root-relative sources to their outputs.
  pub fn summary(&self, root: &Path) -> ManifestSummary {
    ManifestSummary {
      outputs: self
        .by_source
        .iter()
        .map(|(source, output)| (module_id(root, source), output.clone()))
        .collect(),
    }
  }
}

/// JSON document written as `manifest.json` when enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestSummary {
  /// Root-relative source path to output-relative path.
  pub outputs: BTreeMap<String, String>,
}

impl ManifestSummary {
  /// Pretty-printed JSON followed by a newline.
  pub fn to_json(&self) -> BuildResult<String> {
    let mut text = serde_json::to_string_pretty(self)
      .map_err(|err| BuildError::InvalidConfig(format!("failed to encode manifest: {err}")))?;
    text.push('\n');
    Ok(text)
  }
}

// Output names are compared case-insensitively so a bundle built on Linux
// still unpacks onto case-insensitive filesystems.
fn output_key(output: &str) -> String {
  output
    .trim_start_matches("./")
    .replace('\\', "/")
    .to_lowercase()
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn rejects_two_sources_for_one_output() {
    let mut manifest = OutputManifest::default();
    manifest
      .assign(Path::new("/p/a/model.glb"), "assets/model.glb")
      .unwrap();
    let err = manifest
      .assign(Path::new("/p/b/model.glb"), "assets/model.glb")
      .unwrap_err();
    match err {
      BuildError::NamingCollision {
        output,
        first,
        second,
      } => {
        assert_eq!(output, "assets/model.glb");
        assert_eq!(first, PathBuf::from("/p/a/model.glb"));
        assert_eq!(second, PathBuf::from("/p/b/model.glb"));
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn case_only_differences_collide() {
    let mut manifest = OutputManifest::default();
    manifest
      .claim("assets/Model.glb", Path::new("/p/Model.glb"))
      .unwrap();
    assert!(
      manifest
        .claim("assets/model.glb", Path::new("/p/x/model.glb"))
        .is_err()
    );
  }

  #[test]
  fn repeated_claims_by_the_same_source_are_allowed() {
    let mut manifest = OutputManifest::default();
    let source = Path::new("/p/main.js");
    manifest.assign(source, "main.js").unwrap();
    manifest.assign(source, "main.js").unwrap();
    assert_eq!(manifest.len(), 1);
    assert_eq!(manifest.output_for(source), Some("main.js"));
  }

  #[test]
  fn summary_uses_root_relative_sources() {
    let mut manifest = OutputManifest::default();
    manifest
      .assign(Path::new("/p/models/tree.glb"), "assets/tree.glb")
      .unwrap();
    let json = manifest.summary(Path::new("/p")).to_json().unwrap();
    assert_eq!(
      json,
      "{\n  \"outputs\": {\n    \"models/tree.glb\": \"assets/tree.glb\"\n  }\n}\n"
    );
  }
}
