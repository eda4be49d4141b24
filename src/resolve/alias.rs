//! Validated alias table mapping symbolic prefixes to base directories.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// A single `prefix → directory` rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasRule {
  /// Symbolic prefix such as `@`.
  pub prefix: String,
  /// Absolute directory the prefix stands for.
  pub base_dir: PathBuf,
}

/// Alias rules resolved once at pipeline start, ordered longest prefix first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable {
  rules: Vec<AliasRule>,
}

/// Result of applying an alias rule to a specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasMatch<'a> {
  /// Rule that matched.
  pub rule: &'a AliasRule,
  /// Specifier with the prefix replaced by the base directory.
  pub expanded: PathBuf,
}

impl AliasTable {
  /// Build a table from rules, rejecting empty, duplicate or relative entries.
  pub fn new(rules: impl IntoIterator<Item = AliasRule>) -> Result<Self, String> {
    let mut rules: Vec<AliasRule> = rules.into_iter().collect();
    for rule in &rules {
      if rule.prefix.trim_end_matches('/').is_empty() {
        return Err("alias prefixes must not be empty".into());
      }
      if !rule.base_dir.is_absolute() {
        return Err(format!(
          "alias `{}` must point at an absolute directory, got {}",
          rule.prefix,
          rule.base_dir.display()
        ));
      }
    }

    let mut declared = BTreeSet::new();
    for rule in &rules {
      if !declared.insert(normalise_prefix(&rule.prefix)) {
        return Err(format!("alias `{}` is declared more than once", rule.prefix));
      }
    }

    rules.sort_by(|a, b| {
      let (a, b) = (normalise_prefix(&a.prefix), normalise_prefix(&b.prefix));
      b.len().cmp(&a.len()).then_with(|| a.cmp(b))
    });

    Ok(Self { rules })
  }

  /// Build a table from a configuration map whose directories are relative to `root`.
  pub fn from_config(map: &BTreeMap<String, String>, root: &Path) -> Result<Self, String> {
    Self::new(map.iter().map(|(prefix, dir)| AliasRule {
      prefix: prefix.clone(),
      base_dir: absolutize(root, dir),
    }))
  }

  /// Apply the longest matching rule to `specifier`.
  ///
  /// A rule matches the bare prefix or the prefix followed by `/`, so `@` matches `@/scene.js`
  /// but leaves scoped packages such as `@scope/pkg` alone.
  pub fn apply(&self, specifier: &str) -> Option<AliasMatch<'_>> {
    self.rules.iter().find_map(|rule| {
      let prefix = normalise_prefix(&rule.prefix);
      let rest = if specifier == prefix {
        Some("")
      } else {
        specifier
          .strip_prefix(prefix)
          .and_then(|rest| rest.strip_prefix('/'))
      }?;

      let expanded = if rest.is_empty() {
        rule.base_dir.clone()
      } else {
        rule.base_dir.join(rest)
      };
      Some(AliasMatch { rule, expanded })
    })
  }

  /// Rules in match order.
  pub fn rules(&self) -> &[AliasRule] {
    &self.rules
  }
}

fn normalise_prefix(prefix: &str) -> &str {
  prefix.trim_end_matches('/')
}

fn absolutize(root: &Path, dir: &str) -> PathBuf {
  let path = Path::new(dir);
  let joined = if path.is_absolute() {
    path.to_path_buf()
  } else {
    root.join(path)
  };
  dunce::canonicalize(&joined).unwrap_or(joined)
}
