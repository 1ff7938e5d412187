//! The include dependency graph.
//!
//! Nodes live in an arena addressed by stable [`NodeIndex`] values, with a
//! `path -> index` map for lookups; edges are index vectors. Traversal state
//! (visited / on-stack flags, the emitted order) lives in a per-sort scratch
//! structure rather than on the nodes, so the graph itself is immutable
//! during sorts and queries.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{BuildError, Result};
use crate::fsutil::{self, FileKind, normalize_path};
use crate::includes::{self, IncludeDirective};


/// Upper bound on graph size.
pub const MAX_SOURCE_FILES: usize = 1024;
/// Upper bound on resolved includes per file.
pub const MAX_INCLUDES_PER_FILE: usize = 256;
/// Upper bound on include search paths.
pub const MAX_SEARCH_PATHS: usize = 64;

/// Stable handle to a node in the graph's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeIndex(u32);

impl NodeIndex {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One discovered source file.
#[derive(Debug)]
pub struct SourceNode {
    path: PathBuf,
    kind: FileKind,
    includes: Vec<NodeIndex>,
}

impl SourceNode {
    /// Absolute, normalized path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_header(&self) -> bool {
        self.kind.is_header()
    }

    /// Resolved direct includes. Unresolvable includes (system headers)
    /// were dropped at resolution time and never become edges.
    pub fn includes(&self) -> &[NodeIndex] {
        &self.includes
    }
}

/// Directed graph of source files and their `#include` edges.
///
/// Node iteration order is insertion order, which makes scans and sorts
/// deterministic. Insertion is idempotent on the normalized path.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: Vec<SourceNode>,
    index: HashMap<PathBuf, NodeIndex>,
    search_paths: Vec<PathBuf>,
}

/// Per-traversal scratch: flag vectors keyed by node index.
struct Traversal {
    visited: Vec<bool>,
    on_stack: Vec<bool>,
    order: Vec<NodeIndex>,
}

impl Traversal {
    fn new(node_count: usize) -> Self {
        Self {
            visited: vec![false; node_count],
            on_stack: vec![false; node_count],
            order: Vec::with_capacity(node_count),
        }
    }
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: NodeIndex) -> &SourceNode {
        &self.nodes[index.index()]
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &SourceNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeIndex(i as u32), n))
    }

    /// Looks up a node by path (normalized before comparison).
    pub fn find(&self, path: &Path) -> Option<NodeIndex> {
        self.index.get(&normalize_path(path)).copied()
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Appends a directory consulted for angle-bracket includes and for
    /// quoted includes not found next to the referring file.
    pub fn add_search_path(&mut self, dir: impl AsRef<Path>) -> Result<()> {
        if self.search_paths.len() >= MAX_SEARCH_PATHS {
            return Err(BuildError::TooManySearchPaths {
                limit: MAX_SEARCH_PATHS,
            });
        }
        self.search_paths.push(normalize_path(dir));
        Ok(())
    }

    /// Adds a source file and, recursively, everything it includes.
    ///
    /// Idempotent: adding a path that is already in the graph succeeds
    /// without changing anything. Unresolvable includes are dropped (the
    /// compiler will diagnose missing user headers; system headers are
    /// intentionally untracked). Errors from recursively added includes are
    /// ignored for the same reason.
    pub fn add_file(&mut self, path: impl AsRef<Path>) -> Result<NodeIndex> {
        let path = normalize_path(path);

        if let Some(&existing) = self.index.get(&path) {
            return Ok(existing);
        }

        if !fsutil::is_regular_file(&path) {
            return Err(BuildError::FileNotFound(path));
        }
        let Some(kind) = fsutil::classify(&path) else {
            return Err(BuildError::NotASourceFile(path));
        };
        if self.nodes.len() >= MAX_SOURCE_FILES {
            return Err(BuildError::TooManyFiles {
                limit: MAX_SOURCE_FILES,
            });
        }

        let directives = includes::scan_file(&path)?;
        let resolved: Vec<PathBuf> = directives
            .iter()
            .filter_map(|d| self.resolve(d, &path))
            .collect();
        if resolved.len() > MAX_INCLUDES_PER_FILE {
            return Err(BuildError::TooManyIncludes {
                path,
                limit: MAX_INCLUDES_PER_FILE,
            });
        }

        let node_index = NodeIndex(self.nodes.len() as u32);
        self.nodes.push(SourceNode {
            path: path.clone(),
            kind,
            includes: Vec::new(),
        });
        self.index.insert(path, node_index);

        for include in &resolved {
            let _ = self.add_file(include);
        }

        // Edges materialize after the recursive adds so they can point at
        // real indices. Includes whose recursive add failed stay edgeless.
        let edges: Vec<NodeIndex> = resolved
            .iter()
            .filter_map(|p| self.index.get(p).copied())
            .collect();
        self.nodes[node_index.index()].includes = edges;

        Ok(node_index)
    }

    fn resolve(&self, directive: &IncludeDirective, referrer: &Path) -> Option<PathBuf> {
        includes::resolve_include(directive, referrer, &self.search_paths)
    }

    /// Recursively scans a directory and adds every source file found.
    ///
    /// Per-file problems (unreadable files, non-source extensions that
    /// slipped through) are skipped; over-limit conditions abort the scan.
    pub fn scan_directory(&mut self, dir: &Path, extra_exclusions: &[String]) -> Result<()> {
        let mut found = Vec::new();
        fsutil::scan_source_files(dir, extra_exclusions, &mut found)?;

        for file in found {
            match self.add_file(&file) {
                Ok(_) => {}
                Err(
                    err @ (BuildError::TooManyFiles { .. } | BuildError::TooManyIncludes { .. }),
                ) => return Err(err),
                Err(_) => {}
            }
        }
        Ok(())
    }

    /// Produces a build order: every file appears after all of its includes.
    ///
    /// Depth-first post-order, run in two passes: first all headers, then
    /// all translation units, with roots taken in insertion order. The
    /// result is stable and lists headers before the translation units that
    /// include them.
    pub fn topological_sort(&self) -> Result<Vec<NodeIndex>> {
        let mut traversal = Traversal::new(self.nodes.len());

        for headers_pass in [true, false] {
            for (index, node) in self.nodes() {
                if node.is_header() != headers_pass || traversal.visited[index.index()] {
                    continue;
                }
                if let Err((from, to)) = self.dfs(index, &mut traversal) {
                    return Err(BuildError::CircularDependency {
                        from: self.node(from).path.clone(),
                        to: self.node(to).path.clone(),
                    });
                }
            }
        }

        Ok(traversal.order)
    }

    /// Reports the first back-edge found, as an `includer -> includee` pair.
    pub fn find_cycle(&self) -> Option<(PathBuf, PathBuf)> {
        let mut traversal = Traversal::new(self.nodes.len());

        for (index, _) in self.nodes() {
            if traversal.visited[index.index()] {
                continue;
            }
            if let Err((from, to)) = self.dfs(index, &mut traversal) {
                return Some((self.node(from).path.clone(), self.node(to).path.clone()));
            }
        }
        None
    }

    /// Iterative DFS with an explicit work stack, so the 1024-file bound can
    /// never overflow the thread stack. On a back-edge returns the witness
    /// pair `(current, on_stack_successor)`.
    fn dfs(
        &self,
        start: NodeIndex,
        traversal: &mut Traversal,
    ) -> std::result::Result<(), (NodeIndex, NodeIndex)> {
        let mut stack: Vec<(NodeIndex, usize)> = vec![(start, 0)];
        traversal.visited[start.index()] = true;
        traversal.on_stack[start.index()] = true;

        while let Some((current, edge_pos)) = stack.pop() {
            let edges = self.node(current).includes();
            if edge_pos < edges.len() {
                let dep = edges[edge_pos];
                stack.push((current, edge_pos + 1));

                if traversal.on_stack[dep.index()] {
                    return Err((current, dep));
                }
                if !traversal.visited[dep.index()] {
                    traversal.visited[dep.index()] = true;
                    traversal.on_stack[dep.index()] = true;
                    stack.push((dep, 0));
                }
            } else {
                traversal.on_stack[current.index()] = false;
                traversal.order.push(current);
            }
        }

        Ok(())
    }

    /// Every node reachable from `start` through include edges, each exactly
    /// once; `start` itself is excluded.
    pub fn transitive_dependencies(&self, start: NodeIndex) -> Vec<NodeIndex> {
        let mut visited = vec![false; self.nodes.len()];
        visited[start.index()] = true;

        let mut out = Vec::new();
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            for &dep in self.node(current).includes() {
                if !visited[dep.index()] {
                    visited[dep.index()] = true;
                    out.push(dep);
                    stack.push(dep);
                }
            }
        }
        out
    }

    /// Finds the translation unit holding the program entry point.
    ///
    /// Textual heuristic: the first non-header whose text contains
    /// `int main` or `void main`. Occurrences in comments or strings match
    /// too; that imprecision is accepted.
    pub fn find_main(&self) -> Option<NodeIndex> {
        self.nodes()
            .find(|(_, node)| !node.is_header() && has_main_heuristic(&node.path))
            .map(|(index, _)| index)
    }

    /// Translation units that do not satisfy the `main` heuristic.
    pub fn library_sources(&self) -> Vec<NodeIndex> {
        self.nodes()
            .filter(|(_, node)| !node.is_header() && !has_main_heuristic(&node.path))
            .map(|(index, _)| index)
            .collect()
    }
}

fn has_main_heuristic(path: &Path) -> bool {
    let Ok(bytes) = fs::read(path) else {
        return false;
    };
    let text = String::from_utf8_lossy(&bytes);
    text.lines()
        .any(|line| line.contains("int main") || line.contains("void main"))
}
