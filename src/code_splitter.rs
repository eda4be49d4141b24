//! Partitioning of the script graph into entry and shared chunks.

use std::collections::{BTreeMap, BTreeSet};

use crate::asset_paths::{OutputLayout, unique_chunk_name};
use crate::error::{BuildError, BuildResult};
use crate::graph::{ModuleGraph, execution_order};
use crate::models::{Chunk, ChunkKind};

/// Split `graph` into chunks.
///
/// A module reachable from one entry lives in that entry's chunk; a module reachable from
/// several entries is hoisted into a shared chunk keyed by the exact set of entries reaching it.
/// Entry modules always stay in their own chunk. The first entry's chunk is written under the
/// layout's fixed entry file name; every other chunk follows the chunk pattern.
pub fn split(graph: &ModuleGraph, layout: &OutputLayout) -> BuildResult<Vec<Chunk>> {
  let entries = graph.entries();
  if entries.is_empty() {
    return Err(BuildError::InvalidConfig(
      "no script entries were found; add a <script src> to the HTML entry or configure `entries`"
        .into(),
    ));
  }

  let order = execution_order(graph);
  let position: BTreeMap<usize, usize> = order
    .iter()
    .enumerate()
    .filter_map(|(position, path)| graph.index_of(path).map(|index| (index, position)))
    .collect();

  let entry_indices: Vec<usize> = entries
    .iter()
    .filter_map(|entry| graph.index_of(entry))
    .collect();

  let mut reached_by: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
  for (entry_number, &entry_index) in entry_indices.iter().enumerate() {
    let mut stack = vec![entry_index];
    let mut visited = BTreeSet::new();
    while let Some(index) = stack.pop() {
      if !visited.insert(index) {
        continue;
      }
      reached_by.entry(index).or_default().insert(entry_number);
      stack.extend(graph.script_dependency_indices(index).iter().rev());
    }
  }

  let mut owner: BTreeMap<usize, Owner> = BTreeMap::new();
  for (&index, entry_set) in &reached_by {
    let assigned = if let Some(entry_number) = entry_indices.iter().position(|&e| e == index) {
      Owner::Entry(entry_number)
    } else if entry_set.len() == 1 {
      Owner::Entry(*entry_set.iter().next().unwrap_or(&0))
    } else {
      Owner::Shared(entry_set.clone())
    };
    owner.insert(index, assigned);
  }

  let by_position = |indices: &mut Vec<usize>| {
    indices.sort_by_key(|index| position.get(index).copied().unwrap_or(usize::MAX));
  };

  let mut entry_members: Vec<Vec<usize>> = vec![Vec::new(); entry_indices.len()];
  let mut shared_members: BTreeMap<BTreeSet<usize>, Vec<usize>> = BTreeMap::new();
  for (&index, assigned) in &owner {
    match assigned {
      Owner::Entry(entry_number) => entry_members[*entry_number].push(index),
      Owner::Shared(set) => shared_members.entry(set.clone()).or_default().push(index),
    }
  }
  entry_members.iter_mut().for_each(by_position);
  let mut shared_groups: Vec<Vec<usize>> = shared_members.into_values().collect();
  shared_groups.iter_mut().for_each(by_position);
  shared_groups.sort_by_key(|members| {
    members
      .first()
      .and_then(|index| position.get(index).copied())
      .unwrap_or(usize::MAX)
  });

  let nodes = graph.nodes();
  let mut used_names = BTreeSet::new();
  let mut chunks = Vec::with_capacity(entry_members.len() + shared_groups.len());
  let mut chunk_of: BTreeMap<usize, usize> = BTreeMap::new();

  for (entry_number, members) in entry_members.into_iter().enumerate() {
    let entry_index = entry_indices[entry_number];
    let name = unique_chunk_name(nodes[entry_index].stem(), &mut used_names);
    let file_name = if entry_number == 0 {
      layout.entry_file_name.clone()
    } else {
      layout.chunk_path(&name)
    };
    for &index in &members {
      chunk_of.insert(index, chunks.len());
    }
    chunks.push(Chunk {
      name,
      file_name,
      kind: ChunkKind::Entry,
      modules: members.iter().map(|&index| nodes[index].path.clone()).collect(),
      entry: Some(nodes[entry_index].path.clone()),
      imports: Vec::new(),
    });
  }

  for members in shared_groups {
    let first = members.first().copied().unwrap_or_default();
    let name = unique_chunk_name(nodes[first].stem(), &mut used_names);
    for &index in &members {
      chunk_of.insert(index, chunks.len());
    }
    chunks.push(Chunk {
      file_name: layout.chunk_path(&name),
      name,
      kind: ChunkKind::Shared,
      modules: members.iter().map(|&index| nodes[index].path.clone()).collect(),
      entry: None,
      imports: Vec::new(),
    });
  }

  for (chunk_number, &entry_index) in entry_indices.iter().enumerate() {
    let mut needed: Vec<usize> = reached_by
      .iter()
      .filter(|(_, set)| set.contains(&chunk_number))
      .filter_map(|(index, _)| chunk_of.get(index).copied())
      .filter(|&chunk| chunk != chunk_number)
      .collect::<BTreeSet<_>>()
      .into_iter()
      .collect();
    // Entry chunks run on load: shared chunks first, then imported entries in execution order.
    needed.sort_by_key(|&chunk| match chunks[chunk].kind {
      ChunkKind::Shared => (0, chunk),
      ChunkKind::Entry => (1, position.get(&entry_indices[chunk]).copied().unwrap_or(usize::MAX)),
    });
    tracing::trace!(entry = %nodes[entry_index].id, ?needed, "chunk imports");
    let imports: Vec<String> = needed
      .into_iter()
      .map(|chunk| chunks[chunk].file_name.clone())
      .collect();
    chunks[chunk_number].imports = imports;
  }

  for chunk in &chunks {
    tracing::debug!(
      chunk = %chunk.name,
      file = %chunk.file_name,
      modules = chunk.modules.len(),
      "planned chunk"
    );
  }

  Ok(chunks)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Owner {
  Entry(usize),
  Shared(BTreeSet<usize>),
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::asset_paths::AssetClassifier;
  use crate::graph::{TraversalContext, module_id, resolve};
  use crate::resolve::{AliasTable, Resolver, canonical};
  use crate::stages::StagePipeline;
  use pretty_assertions::assert_eq;
  use std::fs;
  use std::path::{Path, PathBuf};
  use tempfile::tempdir;

  fn build(files: &[(&str, &str)], entries: &[&str]) -> (PathBuf, Vec<Chunk>, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let root = canonical(dir.path()).unwrap();
    for (path, contents) in files {
      let path = root.join(path);
      fs::create_dir_all(path.parent().unwrap()).unwrap();
      fs::write(path, contents).unwrap();
    }
    let aliases = AliasTable::default();
    let extensions = vec![".js".to_string()];
    let classifier = AssetClassifier::from_patterns(["**/*.glb"], None).unwrap();
    let stages = StagePipeline::default();
    let ctx = TraversalContext {
      root: &root,
      resolver: Resolver::new(&root, &aliases, &extensions),
      classifier: &classifier,
      stages: &stages,
    };
    let entries: Vec<PathBuf> = entries.iter().map(|entry| root.join(entry)).collect();
    let graph = resolve(&entries, &ctx).unwrap();
    let chunks = split(&graph, &OutputLayout::default()).unwrap();
    (root, chunks, dir)
  }

  fn ids(root: &Path, chunk: &Chunk) -> Vec<String> {
    chunk.modules.iter().map(|path| module_id(root, path)).collect()
  }

  #[test]
  fn single_entry_collapses_to_one_chunk() {
    let (root, chunks, _dir) = build(
      &[
        ("main.js", "import './scene.js';\nimport url from './model.glb';\n"),
        ("scene.js", "import url from './model.glb';\n"),
        ("model.glb", "glTF"),
      ],
      &["main.js"],
    );
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].file_name, "main.js");
    assert_eq!(chunks[0].kind, ChunkKind::Entry);
    assert_eq!(ids(&root, &chunks[0]), vec!["scene.js", "main.js"]);
    assert!(chunks[0].imports.is_empty());
  }

  #[test]
  fn hoists_modules_shared_between_entries() {
    let (root, chunks, _dir) = build(
      &[
        ("app.js", "import './shared.js';\nimport './only-app.js';\n"),
        ("viewer.js", "import './shared.js';\n"),
        ("shared.js", "import './deep.js';\n"),
        ("deep.js", ""),
        ("only-app.js", ""),
      ],
      &["app.js", "viewer.js"],
    );

    let files: Vec<&str> = chunks.iter().map(|chunk| chunk.file_name.as_str()).collect();
    assert_eq!(files, vec!["main.js", "chunks/viewer.js", "chunks/deep.js"]);
    assert_eq!(ids(&root, &chunks[0]), vec!["only-app.js", "app.js"]);
    assert_eq!(ids(&root, &chunks[1]), vec!["viewer.js"]);
    assert_eq!(ids(&root, &chunks[2]), vec!["deep.js", "shared.js"]);
    assert_eq!(chunks[0].imports, vec!["chunks/deep.js".to_string()]);
    assert_eq!(chunks[1].imports, vec!["chunks/deep.js".to_string()]);
  }

  #[test]
  fn every_module_lands_in_exactly_one_chunk() {
    let (_root, chunks, _dir) = build(
      &[
        ("a.js", "import './ab.js';\nimport './abc.js';\n"),
        ("b.js", "import './ab.js';\nimport './abc.js';\n"),
        ("c.js", "import './abc.js';\n"),
        ("ab.js", ""),
        ("abc.js", ""),
      ],
      &["a.js", "b.js", "c.js"],
    );
    let mut seen = BTreeSet::new();
    for chunk in &chunks {
      for module in &chunk.modules {
        assert!(seen.insert(module.clone()), "{} duplicated", module.display());
      }
    }
    assert_eq!(seen.len(), 5);
    let shared = chunks
      .iter()
      .filter(|chunk| chunk.kind == ChunkKind::Shared)
      .count();
    assert_eq!(shared, 2);
  }

  #[test]
  fn cyclic_modules_appear_once() {
    let (root, chunks, _dir) = build(
      &[
        ("main.js", "import './a.js';\n"),
        ("a.js", "import './b.js';\n"),
        ("b.js", "import './a.js';\n"),
      ],
      &["main.js"],
    );
    assert_eq!(chunks.len(), 1);
    assert_eq!(ids(&root, &chunks[0]), vec!["b.js", "a.js", "main.js"]);
  }

  #[test]
  fn entries_imported_by_other_entries_keep_their_chunk() {
    let (root, chunks, _dir) = build(
      &[("main.js", "import './tools.js';\n"), ("tools.js", "")],
      &["main.js", "tools.js"],
    );
    assert_eq!(chunks.len(), 2);
    assert_eq!(ids(&root, &chunks[1]), vec!["tools.js"]);
    assert_eq!(chunks[0].imports, vec!["chunks/tools.js".to_string()]);
  }

  #[test]
  fn imported_entries_load_after_the_shared_chunks_they_need() {
    let (root, chunks, _dir) = build(
      &[
        ("main.js", "import './tools.js';\nimport './util.js';\n"),
        ("tools.js", "import './util.js';\nimport './gizmo.js';\n"),
        ("gizmo.js", ""),
        ("util.js", ""),
      ],
      &["main.js", "gizmo.js", "tools.js"],
    );
    let files: Vec<&str> = chunks.iter().map(|chunk| chunk.file_name.as_str()).collect();
    assert_eq!(
      files,
      vec!["main.js", "chunks/gizmo.js", "chunks/tools.js", "chunks/util.js"]
    );
    assert_eq!(ids(&root, &chunks[3]), vec!["util.js"]);
    assert_eq!(
      chunks[0].imports,
      vec![
        "chunks/util.js".to_string(),
        "chunks/gizmo.js".to_string(),
        "chunks/tools.js".to_string(),
      ]
    );
    assert_eq!(
      chunks[2].imports,
      vec!["chunks/util.js".to_string(), "chunks/gizmo.js".to_string()]
    );
  }
}
