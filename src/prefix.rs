//! Prefix optimizer
//!
//! Compresses a target set of variations into the smallest set of
//! move-sequence prefixes that reproduces exactly that set against a
//! reference tree.
//!
//! # Algorithm
//!
//! 1. Build a trie over the reference tree's whole variation universe
//!    (not just the target) and mark target lines.
//! 2. **Coverage**: bottom-up, a leaf is covered iff it is a target line;
//!    an inner node is covered iff all of its children are.
//! 3. **Emit**: pre-order from the root's children; the first covered
//!    node on a path is emitted and its subtree is skipped.
//! 4. **Verify**: the emitted prefixes are expanded again and compared
//!    with the target. Any difference is a
//!    [`CurateError::CoverageInvariantViolation`].
//!
//! Emitted prefixes never over-cover (coverage requires every line below
//! to be in the target) and are never nested (emission stops at the
//! first covered ancestor).
//!
//! Author: Moroya Sakamoto

use std::collections::HashSet;

use tracing::debug;

use crate::error::{CurateError, Result};
use crate::filter::{add_variations, FilterEntry};
use crate::tree::{Move, VariationTree};
use crate::variation::{variation_keys, variations, VariationPath};

/// How an emitted prefix is interpreted against the reference tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expansion {
    /// The prefix stands for every reference variation that starts with it
    /// (remove semantics).
    Subtree,
    /// The prefix stands for the single line that replaying it creates
    /// (add semantics).
    Replay,
}

#[derive(Debug, Clone)]
struct TrieNode {
    mv: Option<Move>,
    parent: Option<usize>,
    children: Vec<usize>,
    in_target: bool,
}

/// Move-keyed prefix tree; children keep insertion order.
#[derive(Debug, Clone)]
pub struct PrefixTrie {
    nodes: Vec<TrieNode>,
}

impl Default for PrefixTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl PrefixTrie {
    pub fn new() -> Self {
        Self {
            nodes: vec![TrieNode {
                mv: None,
                parent: None,
                children: Vec::new(),
                in_target: false,
            }],
        }
    }

    /// Insert a path, returns the index of its last node.
    pub fn insert(&mut self, path: &VariationPath) -> usize {
        let mut cur = 0;
        for mv in path.moves() {
            cur = match self.child(cur, mv) {
                Some(next) => next,
                None => {
                    let idx = self.nodes.len();
                    self.nodes.push(TrieNode {
                        mv: Some(mv.clone()),
                        parent: Some(cur),
                        children: Vec::new(),
                        in_target: false,
                    });
                    self.nodes[cur].children.push(idx);
                    idx
                }
            };
        }
        cur
    }

    /// Mark an existing leaf as a target line. False if `path` is not a
    /// leaf of the trie.
    pub fn mark(&mut self, path: &VariationPath) -> bool {
        match self.find(path) {
            Some(idx) if idx != 0 && self.nodes[idx].children.is_empty() => {
                self.nodes[idx].in_target = true;
                true
            }
            _ => false,
        }
    }

    /// Number of trie nodes, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    fn child(&self, idx: usize, mv: &Move) -> Option<usize> {
        self.nodes[idx]
            .children
            .iter()
            .copied()
            .find(|&c| self.nodes[c].mv.as_ref() == Some(mv))
    }

    fn find(&self, path: &VariationPath) -> Option<usize> {
        path.moves()
            .iter()
            .try_fold(0, |cur, mv| self.child(cur, mv))
    }

    fn path_of(&self, idx: usize) -> VariationPath {
        let mut moves = Vec::new();
        let mut cur = Some(idx);
        while let Some(i) = cur {
            if let Some(mv) = &self.nodes[i].mv {
                moves.push(mv.clone());
            }
            cur = self.nodes[i].parent;
        }
        moves.reverse();
        VariationPath::new(moves)
    }

    /// Fully-covered flag per node, computed with an explicit post-order.
    fn coverage(&self, expansion: Expansion) -> Vec<bool> {
        // Reversed pre-order visits every child before its parent.
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![0];
        while let Some(idx) = stack.pop() {
            order.push(idx);
            stack.extend(self.nodes[idx].children.iter().copied());
        }

        let mut covered = vec![false; self.nodes.len()];
        for &idx in order.iter().rev() {
            let node = &self.nodes[idx];
            covered[idx] = match expansion {
                Expansion::Replay => node.in_target,
                Expansion::Subtree if node.children.is_empty() => node.in_target,
                Expansion::Subtree => node.children.iter().all(|&c| covered[c]),
            };
        }
        covered
    }

    /// Pre-order walk emitting the first covered node on each path.
    fn emit(&self, covered: &[bool]) -> Vec<VariationPath> {
        let mut prefixes = Vec::new();
        let mut stack: Vec<usize> = self.nodes[0].children.iter().rev().copied().collect();
        while let Some(idx) = stack.pop() {
            if covered[idx] {
                prefixes.push(self.path_of(idx));
            } else {
                stack.extend(self.nodes[idx].children.iter().rev());
            }
        }
        prefixes
    }
}

// ── Public API ─────────────────────────────────────────────────────────

/// Minimal prefixes whose subtrees in `reference` are exactly `target`.
pub fn optimize(target: &[VariationPath], reference: &VariationTree) -> Result<Vec<VariationPath>> {
    optimize_with(target, reference, Expansion::Subtree)
}

/// Minimal add entries that create exactly `target` when replayed onto
/// `reference`.
pub fn optimize_additions(
    target: &[VariationPath],
    reference: &VariationTree,
) -> Result<Vec<VariationPath>> {
    optimize_with(target, reference, Expansion::Replay)
}

/// Run the optimizer under an explicit expansion mode.
pub fn optimize_with(
    target: &[VariationPath],
    reference: &VariationTree,
    expansion: Expansion,
) -> Result<Vec<VariationPath>> {
    if target.is_empty() {
        return Ok(Vec::new());
    }

    let mut trie = PrefixTrie::new();
    for variation in variations(reference) {
        trie.insert(&variation);
    }

    let mut missing = Vec::new();
    for line in target {
        match expansion {
            Expansion::Subtree => {
                if !trie.mark(line) {
                    missing.push(line.canonical());
                }
            }
            Expansion::Replay => {
                let idx = trie.insert(line);
                trie.nodes[idx].in_target = true;
            }
        }
    }
    if !missing.is_empty() {
        return Err(CurateError::CoverageInvariantViolation {
            missing,
            unexpected: Vec::new(),
        });
    }

    let covered = trie.coverage(expansion);
    let prefixes = trie.emit(&covered);
    verify(&prefixes, target, reference, expansion)?;

    debug!(
        ?expansion,
        target = target.len(),
        prefixes = prefixes.len(),
        trie_nodes = trie.len(),
        "optimized variation set"
    );
    Ok(prefixes)
}

/// Every reference variation starting with one of `prefixes`, walk order.
pub fn expand(prefixes: &[VariationPath], reference: &VariationTree) -> Vec<VariationPath> {
    let mut seen = HashSet::new();
    variations(reference)
        .filter(|v| prefixes.iter().any(|p| v.starts_with(p)))
        .filter(|v| seen.insert(v.canonical()))
        .collect()
}

fn verify(
    prefixes: &[VariationPath],
    target: &[VariationPath],
    reference: &VariationTree,
    expansion: Expansion,
) -> Result<()> {
    let want: HashSet<String> = target.iter().map(VariationPath::canonical).collect();
    let got: HashSet<String> = match expansion {
        Expansion::Subtree => expand(prefixes, reference)
            .iter()
            .map(VariationPath::canonical)
            .collect(),
        Expansion::Replay => {
            let before = variation_keys(reference);
            let entries: Vec<FilterEntry> =
                prefixes.iter().cloned().map(FilterEntry::new).collect();
            let after = add_variations(reference, &entries).tree;
            variation_keys(&after)
                .into_iter()
                .filter(|v| !before.contains(v) || want.contains(v))
                .collect()
        }
    };

    if got == want {
        return Ok(());
    }
    let mut missing: Vec<String> = want.difference(&got).cloned().collect();
    let mut unexpected: Vec<String> = got.difference(&want).cloned().collect();
    missing.sort();
    unexpected.sort();
    Err(CurateError::CoverageInvariantViolation {
        missing,
        unexpected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> VariationPath {
        VariationPath::parse(s).unwrap()
    }

    fn paths(lines: &[&str]) -> Vec<VariationPath> {
        lines.iter().map(|l| path(l)).collect()
    }

    fn tree_of(lines: &[&str]) -> VariationTree {
        let entries: Vec<FilterEntry> = paths(lines).into_iter().map(FilterEntry::new).collect();
        add_variations(&VariationTree::new(), &entries).tree
    }

    fn strings(prefixes: &[VariationPath]) -> Vec<String> {
        prefixes.iter().map(|p| p.to_string()).collect()
    }

    const OPEN_AND_SICILIAN: [&str; 3] = ["1.e4 e5 2.Nf3", "1.e4 e5 2.Bc4", "1.e4 c5"];

    #[test]
    fn test_full_coverage_collapses_to_first_move() {
        let tree = tree_of(&OPEN_AND_SICILIAN);
        let result = optimize(&paths(&OPEN_AND_SICILIAN), &tree).unwrap();
        assert_eq!(strings(&result), vec!["1.e4"]);
    }

    #[test]
    fn test_partial_coverage_does_not_over_cover() {
        let tree = tree_of(&OPEN_AND_SICILIAN);
        let result = optimize(&paths(&["1.e4 e5 2.Nf3", "1.e4 e5 2.Bc4"]), &tree).unwrap();
        assert_eq!(strings(&result), vec!["1.e4 e5"]);
    }

    #[test]
    fn test_single_line_stays_whole() {
        let tree = tree_of(&OPEN_AND_SICILIAN);
        let result = optimize(&paths(&["1.e4 e5 2.Bc4"]), &tree).unwrap();
        assert_eq!(strings(&result), vec!["1.e4 e5 2.Bc4"]);
    }

    #[test]
    fn test_single_child_chain_collapses_upward() {
        let tree = tree_of(&["1.e4 c5 2.Nf3 d6 3.d4", "1.d4 d5"]);
        let result = optimize(&paths(&["1.e4 c5 2.Nf3 d6 3.d4"]), &tree).unwrap();
        assert_eq!(strings(&result), vec!["1.e4"]);
    }

    #[test]
    fn test_every_root_line_gives_first_moves() {
        let tree = tree_of(&["1.e4 e5", "1.d4 d5", "1.c4"]);
        let result = optimize(&paths(&["1.e4 e5", "1.d4 d5", "1.c4"]), &tree).unwrap();
        assert_eq!(strings(&result), vec!["1.e4", "1.d4", "1.c4"]);
    }

    #[test]
    fn test_output_follows_tree_order() {
        let tree = tree_of(&["1.e4 e5", "1.e4 c5", "1.d4 d5", "1.d4 Nf6"]);
        let result = optimize(&paths(&["1.d4 Nf6", "1.e4 c5"]), &tree).unwrap();
        assert_eq!(strings(&result), vec!["1.e4 c5", "1.d4 Nf6"]);
    }

    #[test]
    fn test_empty_target() {
        let tree = tree_of(&OPEN_AND_SICILIAN);
        assert!(optimize(&[], &tree).unwrap().is_empty());
    }

    #[test]
    fn test_target_outside_universe_is_violation() {
        let tree = tree_of(&OPEN_AND_SICILIAN);
        let err = optimize(&paths(&["1.d4 d5"]), &tree).unwrap_err();
        match err {
            CurateError::CoverageInvariantViolation { missing, .. } => {
                assert_eq!(missing, vec!["1.d4 d5"]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_inner_node_target_is_violation() {
        let tree = tree_of(&OPEN_AND_SICILIAN);
        assert!(optimize(&paths(&["1.e4 e5"]), &tree).is_err());
    }

    #[test]
    fn test_expand_matches_target() {
        let tree = tree_of(&OPEN_AND_SICILIAN);
        let target = paths(&["1.e4 e5 2.Nf3", "1.e4 e5 2.Bc4"]);
        let prefixes = optimize(&target, &tree).unwrap();
        assert_eq!(expand(&prefixes, &tree), target);
    }

    #[test]
    fn test_verify_rejects_over_coverage() {
        let tree = tree_of(&OPEN_AND_SICILIAN);
        let err = verify(
            &paths(&["1.e4"]),
            &paths(&["1.e4 c5"]),
            &tree,
            Expansion::Subtree,
        )
        .unwrap_err();
        match err {
            CurateError::CoverageInvariantViolation { missing, unexpected } => {
                assert!(missing.is_empty());
                assert_eq!(unexpected, vec!["1.e4 e5 2.Bc4", "1.e4 e5 2.Nf3"]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_additions_emit_each_new_line() {
        let tree = tree_of(&["1.e4 e5 2.Nf3"]);
        let target = paths(&["1.d4 d5 2.c4", "1.d4 Nf6"]);
        let result = optimize_additions(&target, &tree).unwrap();
        assert_eq!(strings(&result), vec!["1.d4 d5 2.c4", "1.d4 Nf6"]);
    }

    #[test]
    fn test_additions_extending_existing_leaf() {
        let tree = tree_of(&["1.e4 e5", "1.d4"]);
        let result = optimize_additions(&paths(&["1.d4 d5"]), &tree).unwrap();
        assert_eq!(strings(&result), vec!["1.d4 d5"]);
    }

    #[test]
    fn test_additions_nested_targets_are_violation() {
        let tree = tree_of(&["1.e4 e5"]);
        let err = optimize_additions(&paths(&["1.d4", "1.d4 d5"]), &tree).unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn test_trie_insert_shares_prefixes() {
        let mut trie = PrefixTrie::new();
        assert!(trie.is_empty());
        trie.insert(&path("1.e4 e5 2.Nf3"));
        trie.insert(&path("1.e4 e5 2.Bc4"));
        assert_eq!(trie.len(), 5);
        assert!(trie.mark(&path("1.e4 e5 2.Bc4")));
        assert!(!trie.mark(&path("1.e4 e5")));
        assert!(!trie.mark(&path("1.d4")));
    }

    #[test]
    fn test_coverage_flags() {
        let mut trie = PrefixTrie::new();
        for line in OPEN_AND_SICILIAN {
            trie.insert(&path(line));
        }
        trie.mark(&path("1.e4 e5 2.Nf3"));
        trie.mark(&path("1.e4 e5 2.Bc4"));
        let covered = trie.coverage(Expansion::Subtree);
        // root, e4, e5, Nf3, Bc4, c5
        assert_eq!(covered, vec![false, false, true, true, true, false]);
    }
}
