//! Bare specifier resolution through `node_modules` directories.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::filesystem::resolve_file;

const CONDITIONS: &[&str] = &["import", "module", "browser", "default"];

/// Split `three/addons/x.js` into `("three", "addons/x.js")` and
/// `@scope/pkg/sub` into `("@scope/pkg", "sub")`.
pub fn split_package_specifier(specifier: &str) -> Option<(&str, &str)> {
  let mut boundary = specifier.find('/').unwrap_or(specifier.len());
  if specifier.starts_with('@') {
    let rest = specifier.get(boundary + 1..)?;
    boundary += 1 + rest.find('/').unwrap_or(rest.len());
  }
  let name = &specifier[..boundary];
  if name.is_empty() || name == "@" {
    return None;
  }
  let subpath = specifier.get(boundary + 1..).unwrap_or("");
  Some((name, subpath))
}

/// Resolve a bare specifier by walking up from `importer_dir` looking for `node_modules/<name>`.
pub fn resolve_package(
  specifier: &str,
  importer_dir: &Path,
  extensions: &[String],
) -> Option<PathBuf> {
  let (name, subpath) = split_package_specifier(specifier)?;
  let package_dir = importer_dir
    .ancestors()
    .map(|dir| dir.join("node_modules").join(name))
    .find(|dir| dir.is_dir())?;

  let manifest = read_manifest(&package_dir);
  if let Some(exports) = manifest.as_ref().and_then(|manifest| manifest.get("exports")) {
    let key = if subpath.is_empty() {
      ".".to_string()
    } else {
      format!("./{subpath}")
    };
    if let Some(target) = match_exports(exports, &key) {
      return resolve_file(&package_dir.join(target.trim_start_matches("./")), extensions);
    }
  }

  if !subpath.is_empty() {
    return resolve_file(&package_dir.join(subpath), extensions);
  }

  let main_field = manifest.as_ref().and_then(|manifest| {
    ["module", "main"]
      .iter()
      .find_map(|field| manifest.get(*field).and_then(Value::as_str))
      .map(str::to_string)
  });
  if let Some(main) = main_field
    && let Some(resolved) = resolve_file(&package_dir.join(main.trim_start_matches("./")), extensions)
  {
    return Some(resolved);
  }

  resolve_file(&package_dir.join("index"), extensions)
}

fn read_manifest(package_dir: &Path) -> Option<Value> {
  let content = fs::read_to_string(package_dir.join("package.json")).ok()?;
  serde_json::from_str(&content).ok()
}

/// Look up `key` (`.` or `./sub`) in a package `exports` field.
fn match_exports(exports: &Value, key: &str) -> Option<String> {
  let is_subpath_map = exports
    .as_object()
    .is_some_and(|map| map.keys().any(|k| k.starts_with('.')));

  if !is_subpath_map {
    return if key == "." {
      pick_condition(exports)
    } else {
      None
    };
  }

  let map = exports.as_object()?;
  if let Some(value) = map.get(key) {
    return pick_condition(value);
  }

  let mut best: Option<(&str, &str, &Value)> = None;
  for (pattern, value) in map {
    let Some((prefix, suffix)) = pattern.split_once('*') else {
      continue;
    };
    let matches = key.len() >= prefix.len() + suffix.len()
      && key.starts_with(prefix)
      && key.ends_with(suffix);
    if matches && best.is_none_or(|(current, _, _)| prefix.len() > current.len()) {
      best = Some((prefix, suffix, value));
    }
  }

  let (prefix, suffix, value) = best?;
  let captured = &key[prefix.len()..key.len() - suffix.len()];
  pick_condition(value).map(|target| target.replace('*', captured))
}

fn pick_condition(value: &Value) -> Option<String> {
  match value {
    Value::String(target) => Some(target.clone()),
    Value::Object(map) => CONDITIONS
      .iter()
      .find_map(|condition| map.get(*condition).and_then(pick_condition)),
    Value::Array(options) => options.iter().find_map(pick_condition),
    _ => None,
  }
}
