//! Specifier resolution: alias rewriting, then filesystem and package lookup.

mod alias;
mod filesystem;
mod packages;

use std::path::{Path, PathBuf};

pub use alias::{AliasMatch, AliasRule, AliasTable};
pub use filesystem::{canonical, resolve_file};
pub use packages::{resolve_package, split_package_specifier};

use crate::asset_paths::strip_query;
use crate::error::{BuildError, BuildResult};

/// Stateless resolver shared by every traversal worker.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
  root: &'a Path,
  aliases: &'a AliasTable,
  extensions: &'a [String],
}

impl<'a> Resolver<'a> {
  /// Create a resolver rooted at the canonical project `root`.
  pub fn new(root: &'a Path, aliases: &'a AliasTable, extensions: &'a [String]) -> Self {
    Self {
      root,
      aliases,
      extensions,
    }
  }

  /// Resolve `specifier` as written in `importer` to a canonical absolute path.
  pub fn resolve(&self, importer: &Path, specifier: &str) -> BuildResult<PathBuf> {
    let cleaned = strip_query(specifier);
    if has_url_scheme(cleaned) || cleaned.starts_with("//") {
      return Err(BuildError::UnsupportedReference {
        importer: importer.to_path_buf(),
        specifier: specifier.to_string(),
        reason: "remote URLs are unavailable to an offline WebView".into(),
      });
    }

    if let Some(AliasMatch { rule, expanded }) = self.aliases.apply(cleaned) {
      return resolve_file(&expanded, self.extensions).ok_or_else(|| {
        BuildError::AliasResolution {
          importer: importer.to_path_buf(),
          specifier: specifier.to_string(),
          prefix: rule.prefix.clone(),
          expanded,
        }
      });
    }

    let importer_dir = importer.parent().unwrap_or(self.root);
    let resolved = if let Some(rooted) = cleaned.strip_prefix('/') {
      resolve_file(&self.root.join(rooted), self.extensions)
        .or_else(|| resolve_file(Path::new(cleaned), self.extensions))
    } else if is_relative(cleaned) {
      resolve_file(&importer_dir.join(cleaned), self.extensions)
    } else {
      resolve_package(cleaned, importer_dir, self.extensions)
    };

    resolved.ok_or_else(|| BuildError::ModuleResolution {
      importer: importer.to_path_buf(),
      specifier: specifier.to_string(),
    })
  }
}

fn is_relative(specifier: &str) -> bool {
  specifier == "."
    || specifier == ".."
    || specifier.starts_with("./")
    || specifier.starts_with("../")
}

fn has_url_scheme(specifier: &str) -> bool {
  specifier.split_once(':').is_some_and(|(scheme, _)| {
    scheme.len() > 1 && scheme.chars().all(|c| c.is_ascii_alphabetic())
  })
}
