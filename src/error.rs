//! Error kinds that abort a build pass.
//!
//! Every variant names the path, specifier or output file responsible so the CLI can report a
//! precise failure instead of a generic one. None of these are recoverable within a pass.

use std::path::PathBuf;

use thiserror::Error;

/// Generic build result type used across the crate.
pub type BuildResult<T> = Result<T, BuildError>;

/// Failure raised by any stage of the bundling pipeline.
#[derive(Debug, Error)]
pub enum BuildError {
  /// A specifier matched an alias rule but the rewritten path does not exist.
  #[error(
    "alias `{prefix}` in \"{specifier}\" (imported by {}) points at {}, which does not exist",
    importer.display(),
    expanded.display()
  )]
  AliasResolution {
    /// Module containing the specifier.
    importer: PathBuf,
    /// Specifier as written in source.
    specifier: String,
    /// Alias prefix that matched.
    prefix: String,
    /// Path produced by applying the alias.
    expanded: PathBuf,
  },
  /// A specifier resolves to no existing file.
  #[error("could not resolve \"{specifier}\" imported by {}", importer.display())]
  ModuleResolution {
    /// Module containing the specifier.
    importer: PathBuf,
    /// Specifier as written in source.
    specifier: String,
  },
  /// Two distinct sources map to the same output file.
  #[error(
    "{} and {} would both be written to `{output}`",
    first.display(),
    second.display()
  )]
  NamingCollision {
    /// Output-relative path both sources claim.
    output: String,
    /// Source that claimed the output path first.
    first: PathBuf,
    /// Source that collided with it.
    second: PathBuf,
  },
  /// The output root could not be cleared.
  #[error("failed to clear output directory {}: {reason}", path.display())]
  Cleanup {
    /// Directory that was being cleared.
    path: PathBuf,
    /// Human readable cause.
    reason: String,
  },
  /// An I/O failure while emitting output.
  #[error("failed to write {}", path.display())]
  Write {
    /// File or directory being written.
    path: PathBuf,
    /// Underlying I/O error.
    #[source]
    source: std::io::Error,
  },
  /// A source file could not be read.
  #[error("failed to read {}", path.display())]
  Read {
    /// File being read.
    path: PathBuf,
    /// Underlying I/O error.
    #[source]
    source: std::io::Error,
  },
  /// A reference that cannot be packaged for an offline WebView.
  #[error("\"{specifier}\" in {} cannot be bundled: {reason}", importer.display())]
  UnsupportedReference {
    /// Module or document containing the reference.
    importer: PathBuf,
    /// Reference as written in source.
    specifier: String,
    /// Why the reference was rejected.
    reason: String,
  },
  /// Options failed validation before the build started.
  #[error("invalid configuration: {0}")]
  InvalidConfig(String),
  /// A registered transform stage rejected a module or asset.
  #[error("transform stage `{stage}` failed on {}: {reason}", path.display())]
  Transform {
    /// Name of the failing stage.
    stage: String,
    /// Module or asset being transformed.
    path: PathBuf,
    /// Stage supplied failure reason.
    reason: String,
  },
}

impl BuildError {
  /// Wrap an I/O error raised while writing `path`.
  pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    Self::Write {
      path: path.into(),
      source,
    }
  }

  /// Wrap an I/O error raised while reading `path`.
  pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    Self::Read {
      path: path.into(),
      source,
    }
  }
}
