use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use offline_webview_bundler::models::AssetRecord;
use offline_webview_bundler::{
  BuildError, BuildResult, OfflineBuildContext, OfflineBundler, ProjectConfig, TransformStage,
};
use pretty_assertions::assert_eq;
use regex::Regex;
use tempfile::{TempDir, tempdir};

struct Project {
  dir: TempDir,
}

impl Project {
  fn new(files: &[(&str, &[u8])]) -> Self {
    let dir = tempdir().unwrap();
    let project = Self { dir };
    for (path, contents) in files {
      project.write(path, contents);
    }
    project
  }

  fn write(&self, path: &str, contents: &[u8]) {
    let path = self.web().join(path);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
  }

  fn web(&self) -> PathBuf {
    self.dir.path().join("web")
  }

  fn out(&self) -> PathBuf {
    self.dir.path().join("assets")
  }

  fn bundler(&self, config: ProjectConfig) -> OfflineBundler {
    let options = ProjectConfig {
      root: "web".into(),
      ..config
    }
    .into_options(self.dir.path())
    .unwrap();
    OfflineBundler::new(OfflineBuildContext::new(options))
  }

  fn build(&self) -> Result<offline_webview_bundler::BuildReport, BuildError> {
    self.bundler(ProjectConfig::default()).build()
  }
}

fn snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
  let mut files = BTreeMap::new();
  let mut stack = vec![root.to_path_buf()];
  while let Some(dir) = stack.pop() {
    for entry in fs::read_dir(dir).unwrap() {
      let path = entry.unwrap().path();
      if path.is_dir() {
        stack.push(path);
      } else {
        let relative = path
          .strip_prefix(root)
          .unwrap()
          .to_string_lossy()
          .replace('\\', "/");
        files.insert(relative, fs::read(&path).unwrap());
      }
    }
  }
  files
}

const SCENE_HTML: &[u8] = br#"<!doctype html>
<html>
  <head>
    <link rel="icon" href="./textures/icon.png">
  </head>
  <body>
    <script type="module" src="./main.js"></script>
  </body>
</html>
"#;

const MODEL_BYTES: &[u8] = &[0x67, 0x6c, 0x54, 0x46, 0x02, 0x00, 0x00, 0x00, 0xff, 0x00, 0x10];

fn scene_project() -> Project {
  Project::new(&[
    ("index.html", SCENE_HTML),
    (
      "main.js",
      b"import { loadScene } from './scene.js';\nimport modelUrl from './model.glb';\nloadScene(modelUrl);\n",
    ),
    (
      "scene.js",
      b"import modelUrl from './model.glb';\nexport function loadScene(url = modelUrl) {\n  return fetch(url);\n}\n",
    ),
    ("model.glb", MODEL_BYTES),
    ("textures/icon.png", &[0x89, b'P', b'N', b'G']),
  ])
}

#[test]
fn single_entry_scene_bundles_into_main_js() {
  let project = scene_project();
  let report = project.build().unwrap();

  assert_eq!(report.chunks, vec!["main.js"]);
  assert_eq!(
    report.files,
    vec!["assets/icon.png", "assets/model.glb", "index.html", "main.js"]
  );

  let main = fs::read_to_string(project.out().join("main.js")).unwrap();
  let scene_at = main.find("__wvb.define(\"scene.js\"").unwrap();
  let main_at = main.find("__wvb.define(\"main.js\"").unwrap();
  assert!(scene_at < main_at, "dependencies are defined first");
  assert_eq!(main.matches("const modelUrl = \"./assets/model.glb\";").count(), 2);
  assert!(main.ends_with("__wvb.require(\"main.js\");\n"));

  let html = fs::read_to_string(project.out().join("index.html")).unwrap();
  assert!(html.contains(r#"<script defer src="./main.js"></script>"#));
  assert!(html.contains(r#"href="./assets/icon.png""#));
  assert!(!html.contains("type=\"module\""));
}

#[test]
fn assets_are_copied_byte_for_byte() {
  let project = scene_project();
  project.build().unwrap();
  assert_eq!(
    fs::read(project.out().join("assets/model.glb")).unwrap(),
    MODEL_BYTES
  );
  assert_eq!(
    fs::read(project.out().join("assets/icon.png")).unwrap(),
    vec![0x89, b'P', b'N', b'G']
  );
}

#[test]
fn rebuilding_unchanged_input_is_byte_identical() {
  let project = scene_project();
  project.build().unwrap();
  let first = snapshot(&project.out());
  project.build().unwrap();
  let second = snapshot(&project.out());
  assert_eq!(first, second);
}

#[test]
fn modules_shared_by_entries_are_emitted_once() {
  let project = Project::new(&[
    (
      "index.html",
      br#"<script type="module" src="./app.js"></script>
<script type="module" src="./viewer.js"></script>"#,
    ),
    ("app.js", b"import { renderer } from './common/renderer.js';\nrenderer('app');\n"),
    (
      "viewer.js",
      b"import { renderer } from './common/renderer.js';\nrenderer('viewer');\n",
    ),
    (
      "common/renderer.js",
      b"import { clamp } from './math.js';\nexport function renderer(name) { return clamp(name.length); }\n",
    ),
    ("common/math.js", b"export const clamp = (v) => Math.min(v, 1);\n"),
  ]);
  let report = project.build().unwrap();
  assert_eq!(
    report.chunks,
    vec!["main.js", "chunks/viewer.js", "chunks/math.js"]
  );

  let tree = snapshot(&project.out());
  for id in ["app.js", "viewer.js", "common/renderer.js", "common/math.js"] {
    let needle = format!("__wvb.define(\"{id}\"");
    let holders: Vec<&String> = tree
      .iter()
      .filter(|(name, _)| name.ends_with(".js"))
      .filter(|(_, bytes)| String::from_utf8_lossy(bytes).contains(&needle))
      .map(|(name, _)| name)
      .collect();
    assert_eq!(holders.len(), 1, "{id} defined in {holders:?}");
  }

  let html = String::from_utf8(tree["index.html"].clone()).unwrap();
  assert_eq!(html.matches("chunks/math.js").count(), 1);
  let shared = html.find("./chunks/math.js").unwrap();
  let main = html.find("./main.js").unwrap();
  let viewer = html.find("./chunks/viewer.js").unwrap();
  assert!(shared < main && main < viewer);
}

#[test]
fn every_emitted_reference_resolves_inside_the_output() {
  let project = Project::new(&[
    (
      "index.html",
      br#"<link rel="stylesheet" href="./styles/site.css">
<img src="./textures/logo.png">
<script type="module" src="./src/main.js"></script>"#,
    ),
    (
      "src/main.js",
      b"import './theme.css';\nimport sky from '@/textures/sky.hdr';\nconst ambience = new URL('../audio/ambience.ogg', import.meta.url);\nexport default { sky, ambience };\n",
    ),
    ("src/theme.css", b"body { margin: 0; }"),
    ("styles/site.css", b"html { height: 100%; }"),
    ("textures/logo.png", b"png"),
    ("textures/sky.hdr", b"hdr"),
    ("audio/ambience.ogg", b"ogg"),
  ]);
  project.build().unwrap();

  let tree = snapshot(&project.out());
  let reference = Regex::new(r#""\./([^"]+)""#).unwrap();
  let mut checked = 0;
  for (name, bytes) in &tree {
    if !(name.ends_with(".js") || name.ends_with(".html")) {
      continue;
    }
    let text = String::from_utf8_lossy(bytes);
    for caps in reference.captures_iter(&text) {
      assert!(
        tree.contains_key(&caps[1]),
        "{name} references missing ./{}",
        &caps[1]
      );
      checked += 1;
    }
  }
  assert!(checked >= 6, "only {checked} references checked");
  assert!(!tree.values().any(|bytes| {
    let text = String::from_utf8_lossy(bytes);
    text.contains("\"/assets/") || text.contains("import.meta")
  }));
}

#[test]
fn cyclic_imports_are_bundled_once() {
  let project = Project::new(&[
    ("index.html", br#"<script src="./main.js"></script>"#),
    ("main.js", b"import { a } from './a.js';\na();\n"),
    (
      "a.js",
      b"import { b } from './b.js';\nexport function a() { return b(); }\n",
    ),
    (
      "b.js",
      b"import { a } from './a.js';\nexport function b() { return typeof a; }\n",
    ),
  ]);
  project.build().unwrap();
  let main = fs::read_to_string(project.out().join("main.js")).unwrap();
  assert_eq!(main.matches("__wvb.define(\"a.js\"").count(), 1);
  assert_eq!(main.matches("__wvb.define(\"b.js\"").count(), 1);
}

#[test]
fn duplicate_asset_basenames_abort_without_output() {
  let project = Project::new(&[
    ("index.html", br#"<script src="./main.js"></script>"#),
    (
      "main.js",
      b"import a from './trees/model.glb';\nimport b from './rocks/model.glb';\n",
    ),
    ("trees/model.glb", b"tree"),
    ("rocks/model.glb", b"rock"),
  ]);
  let err = project.build().unwrap_err();
  match err {
    BuildError::NamingCollision {
      output,
      first,
      second,
    } => {
      assert_eq!(output, "assets/model.glb");
      assert!(first.ends_with("trees/model.glb"));
      assert!(second.ends_with("rocks/model.glb"));
    }
    other => panic!("unexpected error: {other}"),
  }
  assert!(!project.out().exists());
}

#[test]
fn broken_imports_abort_and_keep_the_previous_bundle() {
  let project = scene_project();
  project.build().unwrap();
  let before = snapshot(&project.out());

  project.write(
    "scene.js",
    b"import missing from './missing.glb';\nexport function loadScene() {}\n",
  );
  let err = project.build().unwrap_err();
  match &err {
    BuildError::ModuleResolution {
      importer,
      specifier,
    } => {
      assert!(importer.ends_with("scene.js"));
      assert_eq!(specifier, "./missing.glb");
    }
    other => panic!("unexpected error: {other}"),
  }
  assert_eq!(snapshot(&project.out()), before);
}

#[test]
fn unmatched_alias_targets_are_alias_errors() {
  let project = Project::new(&[
    ("index.html", br#"<script src="./main.js"></script>"#),
    ("main.js", b"import scene from '@/scenes/forest.js';\n"),
  ]);
  let err = project.build().unwrap_err();
  match err {
    BuildError::AliasResolution { prefix, specifier, .. } => {
      assert_eq!(prefix, "@");
      assert_eq!(specifier, "@/scenes/forest.js");
    }
    other => panic!("unexpected error: {other}"),
  }
}

#[test]
fn env_replacement_and_packages_are_bundled() {
  let project = Project::new(&[
    ("index.html", br#"<script src="./main.js"></script>"#),
    (
      "main.js",
      b"import * as THREE from 'three';\nif (import.meta.env.DEV) console.log(THREE.REVISION);\n",
    ),
    (
      "node_modules/three/package.json",
      br#"{ "name": "three", "exports": { ".": { "import": "./build/three.module.js" } } }"#,
    ),
    (
      "node_modules/three/build/three.module.js",
      b"export const REVISION = '170';\n",
    ),
  ]);
  project.build().unwrap();
  let main = fs::read_to_string(project.out().join("main.js")).unwrap();
  assert!(main.contains("__wvb.define(\"node_modules/three/build/three.module.js\""));
  assert!(main.contains("const THREE = __wvb_0;"));
  assert!(main.contains("if (false) console.log"));
}

#[test]
fn incremental_builds_keep_hand_placed_files() {
  let project = scene_project();
  fs::create_dir_all(project.out()).unwrap();
  fs::write(project.out().join("README.txt"), "keep me").unwrap();

  let config = ProjectConfig {
    empty_out_dir: false,
    ..ProjectConfig::default()
  };
  project.bundler(config).build().unwrap();
  assert_eq!(
    fs::read_to_string(project.out().join("README.txt")).unwrap(),
    "keep me"
  );
  assert!(project.out().join("main.js").exists());

  project.build().unwrap();
  assert!(!project.out().join("README.txt").exists());
}

#[derive(Debug)]
struct ModelFolder;

impl TransformStage for ModelFolder {
  fn name(&self) -> &str {
    "model-folder"
  }

  fn transform_asset(&self, mut record: AssetRecord) -> BuildResult<AssetRecord> {
    if record.extension == "glb" {
      record.output_path = record.output_path.replace("assets/", "assets/models/");
    }
    Ok(record)
  }
}

#[test]
fn registered_stages_rename_asset_outputs() {
  let project = scene_project();
  let options = ProjectConfig {
    root: "web".into(),
    ..ProjectConfig::default()
  }
  .into_options(project.dir.path())
  .unwrap();
  let context = OfflineBuildContext::new(options).with_stage(ModelFolder);
  let report = OfflineBundler::new(context).build().unwrap();

  assert!(report.files.contains(&"assets/models/model.glb".to_string()));
  assert!(report.files.contains(&"assets/icon.png".to_string()));
  let main = fs::read_to_string(project.out().join("main.js")).unwrap();
  assert_eq!(
    main
      .matches("const modelUrl = \"./assets/models/model.glb\";")
      .count(),
    2
  );
}

#[test]
fn entries_imported_by_entries_load_after_their_shared_chunks() {
  let project = Project::new(&[
    (
      "index.html",
      br#"<script type="module" src="./main.js"></script>
<script type="module" src="./tools.js"></script>"#,
    ),
    ("main.js", b"import { tool } from './tools.js';\ntool();\n"),
    (
      "tools.js",
      b"import { clamp } from './util.js';\nexport const tool = () => clamp(2);\n",
    ),
    ("util.js", b"export const clamp = (v) => Math.min(v, 1);\n"),
  ]);
  let report = project.build().unwrap();
  assert_eq!(
    report.chunks,
    vec!["main.js", "chunks/tools.js", "chunks/util.js"]
  );

  let html = fs::read_to_string(project.out().join("index.html")).unwrap();
  let tags: Vec<&str> = html
    .lines()
    .filter(|line| line.starts_with("<script"))
    .collect();
  assert_eq!(
    tags,
    vec![
      r#"<script defer src="./chunks/util.js"></script>"#,
      r#"<script defer src="./chunks/tools.js"></script>"#,
      r#"<script defer src="./main.js"></script>"#,
    ]
  );
  let tools = fs::read_to_string(project.out().join("chunks/tools.js")).unwrap();
  assert!(tools.ends_with("__wvb.require(\"tools.js\");\n"));
  assert!(!tools.contains("__wvb.define(\"util.js\""));
}
