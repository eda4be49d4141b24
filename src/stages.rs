//! Transform stages registered on a build before it starts.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::Path;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::asset_paths::ensure_relative_output;
use crate::error::{BuildError, BuildResult};
use crate::models::{AssetRecord, ModuleNode, ModulePayload};

/// A named transform applied to every module and asset, in registration order.
///
/// Module transforms run right after a module is read and before its dependencies are scanned,
/// so a stage may add or remove imports. Asset transforms run before output names are checked
/// for collisions, so a stage may rename an asset's output path.
pub trait TransformStage: Debug + Send + Sync {
  /// Stage name reported in errors and logs.
  fn name(&self) -> &str;

  /// Transform a freshly loaded module.
  fn transform_module(&self, node: ModuleNode) -> BuildResult<ModuleNode> {
    Ok(node)
  }

  /// Transform an asset scheduled for emission.
  fn transform_asset(&self, record: AssetRecord) -> BuildResult<AssetRecord> {
    Ok(record)
  }
}

/// Ordered list of stages composed into a single transform.
#[derive(Debug, Default)]
pub struct StagePipeline {
  stages: Vec<Box<dyn TransformStage>>,
}

impl StagePipeline {
  /// Append a stage; stages run in the order they were registered.
  pub fn register(&mut self, stage: impl TransformStage + 'static) {
    self.stages.push(Box::new(stage));
  }

  /// Names of the registered stages in run order.
  pub fn names(&self) -> Vec<&str> {
    self.stages.iter().map(|stage| stage.name()).collect()
  }

  /// Run every module transform.
  pub fn apply_module(&self, node: ModuleNode) -> BuildResult<ModuleNode> {
    self.stages.iter().try_fold(node, |node, stage| {
      tracing::trace!(stage = stage.name(), module = %node.id, "transform module");
      stage.transform_module(node)
    })
  }

  /// Run every asset transform, rejecting an output path a stage moved outside the output root.
  pub fn apply_asset(&self, record: AssetRecord) -> BuildResult<AssetRecord> {
    self.stages.iter().try_fold(record, |record, stage| {
      let record = stage.transform_asset(record)?;
      ensure_relative_output("asset output", &record.output_path)
        .map_err(|reason| stage_error(&**stage, &record.source_path, reason))?;
      Ok(record)
    })
  }
}

fn env_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r"(^|[^\w$.])import\.meta\.env([\w$]*)(?:\.([A-Za-z_$][\w$]*))?")
      .expect("invalid env regex")
  })
}

/// Replaces `import.meta.env.*` reads with literals for the build mode.
///
/// Known keys become literals; any other key reads from the inlined env object and is
/// therefore `undefined`.
#[derive(Debug, Clone)]
pub struct EnvReplaceStage {
  values: BTreeMap<&'static str, String>,
  env_object: String,
}

impl EnvReplaceStage {
  /// Build the replacement table for `mode` with public base `base`.
  pub fn new(mode: &str, base: &str) -> Self {
    let production = mode == "production";
    let literal = |value: &str| serde_json::Value::from(value).to_string();
    let env_object = serde_json::json!({
      "MODE": mode,
      "BASE_URL": base,
      "PROD": production,
      "DEV": !production,
      "SSR": false,
    });

    let values = BTreeMap::from([
      ("MODE", literal(mode)),
      ("BASE_URL", literal(base)),
      ("PROD", production.to_string()),
      ("DEV", (!production).to_string()),
      ("SSR", "false".to_string()),
    ]);
    Self {
      values,
      env_object: format!("({env_object})"),
    }
  }

  fn replace(&self, caps: &Captures<'_>) -> String {
    let lead = &caps[1];
    if !caps[2].is_empty() {
      return caps[0].to_string();
    }
    match caps.get(3) {
      Some(key) => match self.values.get(key.as_str()) {
        Some(value) => format!("{lead}{value}"),
        None => format!("{lead}{}.{}", self.env_object, key.as_str()),
      },
      None => format!("{lead}{}", self.env_object),
    }
  }
}

impl TransformStage for EnvReplaceStage {
  fn name(&self) -> &str {
    "env-replace"
  }

  fn transform_module(&self, mut node: ModuleNode) -> BuildResult<ModuleNode> {
    if !node.classification.is_script() {
      return Ok(node);
    }
    if let ModulePayload::Text(source) = &mut node.payload
      && source.contains("import.meta.env")
    {
      let rewritten = env_pattern()
        .replace_all(source, |caps: &Captures<'_>| self.replace(caps))
        .into_owned();
      *source = rewritten;
    }
    Ok(node)
  }
}

/// Convenience constructor for stage failures.
pub fn stage_error(
  stage: &dyn TransformStage,
  path: &Path,
  reason: impl Into<String>,
) -> BuildError {
  BuildError::Transform {
    stage: stage.name().to_string(),
    path: path.to_path_buf(),
    reason: reason.into(),
  }
}
