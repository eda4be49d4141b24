//! Filesystem probing: literal path, implicit extensions, then directory index.

use std::path::{Path, PathBuf};

/// Resolve `candidate` to a canonical existing file.
///
/// Tries the literal path, then the path with each extension appended, then
/// `candidate/index` with each extension.
pub fn resolve_file(candidate: &Path, extensions: &[String]) -> Option<PathBuf> {
  if candidate.is_file() {
    return canonical(candidate);
  }

  let base = candidate.as_os_str();
  for extension in extensions {
    let mut probe = base.to_owned();
    probe.push(extension);
    let probe = PathBuf::from(probe);
    if probe.is_file() {
      return canonical(&probe);
    }
  }

  if candidate.is_dir() {
    for extension in extensions {
      let probe = candidate.join(format!("index{extension}"));
      if probe.is_file() {
        return canonical(&probe);
      }
    }
  }

  None
}

/// Canonicalize without Windows verbatim prefixes.
pub fn canonical(path: &Path) -> Option<PathBuf> {
  dunce::canonicalize(path).ok()
}
