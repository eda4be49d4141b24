//! Deterministic execution order over the script subgraph.

use std::path::PathBuf;

use super::ModuleGraph;

/// Dependency-first order of every script reachable from the graph entries.
///
/// Entries are visited in declaration order and dependencies in source order, so a module always
/// follows the modules it imports. Inside a cycle the module discovered first runs last, which is
/// the order JavaScript engines use for cyclic ES modules.
pub fn execution_order(graph: &ModuleGraph) -> Vec<PathBuf> {
  let nodes = graph.nodes();
  let mut visited = vec![false; nodes.len()];
  let mut order = Vec::new();

  for entry in graph.entries() {
    let Some(start) = graph.index_of(entry) else {
      continue;
    };
    if visited[start] {
      continue;
    }

    visited[start] = true;
    let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
    while let Some((index, cursor)) = stack.pop() {
      let children = graph.script_dependency_indices(index);
      match children.get(cursor) {
        Some(&child) => {
          stack.push((index, cursor + 1));
          if !visited[child] {
            visited[child] = true;
            stack.push((child, 0));
          }
        }
        None => order.push(nodes[index].path.clone()),
      }
    }
  }

  order
}
