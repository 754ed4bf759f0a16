//! Variation filter and constructor
//!
//! Result variations = (all − removed) ∪ added, computed as two
//! sequential tree transforms followed by an optional depth trim:
//!
//! 1. **Remove**: each entry is replayed from the root; a full match
//!    detaches that node with its subtree. Partial matches are recorded
//!    as [`Unmatched`] and otherwise ignored.
//! 2. **Add**: each entry is replayed from the pruned root, descending
//!    into existing children and appending new nodes where the line
//!    leaves the tree. New nodes start without comments or NAGs.
//! 3. **Trim**: nodes deeper than `max_depth` plies are pruned.
//!
//! Every transform returns a new tree; the input is never touched.
//!
//! Author: Moroya Sakamoto

use tracing::{debug, warn};

use crate::error::{CurateError, Result};
use crate::tree::{NodeId, Resolution, VariationTree};
use crate::variation::VariationPath;

/// One remove or add instruction
#[derive(Debug, Clone, PartialEq)]
pub struct FilterEntry {
    pub sequence: VariationPath,
    pub reason: Option<String>,
    /// Remove: only prune nodes deeper than this. Add: replay at most this many plies.
    pub depth: Option<usize>,
}

impl FilterEntry {
    pub fn new(sequence: VariationPath) -> Self {
        Self {
            sequence,
            reason: None,
            depth: None,
        }
    }

    pub fn parse(sequence: &str) -> Result<Self> {
        VariationPath::parse(sequence).map(Self::new)
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(String::from(reason));
        self
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = Some(depth);
        self
    }
}

/// What to do with remove entries that do not resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnmatchedPolicy {
    /// Record and continue
    #[default]
    Warn,
    /// Fail the filter call on the first unmatched entry
    Strict,
}

/// A remove entry that did not fully resolve
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unmatched {
    pub sequence: String,
    pub reason: Option<String>,
    /// Plies that did match before replay stopped
    pub matched: usize,
    pub total: usize,
}

impl From<&Unmatched> for CurateError {
    fn from(u: &Unmatched) -> Self {
        CurateError::UnresolvedFilterEntry {
            sequence: u.sequence.clone(),
            matched: u.matched,
            total: u.total,
        }
    }
}

/// Full instruction set for one filter call
#[derive(Debug, Clone, Default)]
pub struct Instructions {
    pub remove: Vec<FilterEntry>,
    pub add: Vec<FilterEntry>,
    pub max_depth: Option<usize>,
    pub policy: UnmatchedPolicy,
}

impl Instructions {
    pub fn removing(entries: Vec<FilterEntry>) -> Self {
        Self {
            remove: entries,
            ..Self::default()
        }
    }

    pub fn adding(entries: Vec<FilterEntry>) -> Self {
        Self {
            add: entries,
            ..Self::default()
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }
}

/// Result of the remove transform
#[derive(Debug, Clone)]
pub struct Removal {
    pub tree: VariationTree,
    pub unmatched: Vec<Unmatched>,
    /// Nodes detached, subtrees included
    pub detached: usize,
}

/// Result of the add transform
#[derive(Debug, Clone)]
pub struct Addition {
    pub tree: VariationTree,
    /// Nodes created
    pub created: usize,
}

/// Result of a full filter call
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub tree: VariationTree,
    pub unmatched: Vec<Unmatched>,
    pub detached: usize,
    pub created: usize,
}

// ── Transforms ─────────────────────────────────────────────────────────

/// Detach every subtree named by `entries`.
///
/// All entries are resolved against the input tree before anything is
/// detached, so nested entries (`1.e4` and `1.e4 e5`) both count as
/// matched regardless of order.
pub fn remove_variations(tree: &VariationTree, entries: &[FilterEntry]) -> Removal {
    let mut roots: Vec<NodeId> = Vec::new();
    let mut unmatched = Vec::new();

    for entry in entries {
        let plies = entry.sequence.len();
        match tree.resolve(entry.sequence.moves()) {
            Resolution::Full(id) => match entry.depth {
                Some(depth) if depth >= plies => {
                    roots.extend(nodes_at_depth(tree, id, plies, depth + 1));
                }
                _ if id == tree.root_id() => roots.extend_from_slice(tree.children(id)),
                _ => roots.push(id),
            },
            Resolution::Partial { matched, .. } => {
                warn!(
                    sequence = %entry.sequence,
                    matched,
                    total = plies,
                    "remove entry does not resolve, skipping"
                );
                unmatched.push(Unmatched {
                    sequence: entry.sequence.canonical(),
                    reason: entry.reason.clone(),
                    matched,
                    total: plies,
                });
            }
        }
    }

    let mut result = tree.clone();
    let before = result.node_count();
    result.remove_subtrees(&roots);
    let detached = before - result.node_count();
    debug!(entries = entries.len(), detached, "removal applied");

    Removal {
        tree: result,
        unmatched,
        detached,
    }
}

/// Replay every entry, creating missing nodes as last children.
pub fn add_variations(tree: &VariationTree, entries: &[FilterEntry]) -> Addition {
    let mut result = tree.clone();
    let mut created = 0;

    for entry in entries {
        let plies = entry
            .depth
            .map_or(entry.sequence.len(), |d| d.min(entry.sequence.len()));
        let mut cur = result.root_id();
        for mv in &entry.sequence.moves()[..plies] {
            let (next, fresh) = result.ensure_child(cur, mv);
            if fresh {
                created += 1;
            }
            cur = next;
        }
    }
    debug!(entries = entries.len(), created, "addition applied");

    Addition {
        tree: result,
        created,
    }
}

/// Prune every node deeper than `max_depth` plies.
pub fn trim_depth(tree: &VariationTree, max_depth: usize) -> VariationTree {
    let mut result = tree.clone();
    let cut = nodes_at_depth(tree, tree.root_id(), 0, max_depth + 1);
    result.remove_subtrees(&cut);
    result
}

/// Drop variations shorter than `min_depth` plies.
///
/// Only the part of a short line that no longer-surviving line shares is
/// removed; the walk repeats until every remaining leaf is deep enough.
pub fn prune_short(tree: &VariationTree, min_depth: usize) -> VariationTree {
    let mut result = tree.clone();
    loop {
        let root = result.root_id();
        let mut cut = Vec::new();
        for node in result.nodes() {
            if node.id == root || !node.is_leaf() || result.depth_of(node.id) >= min_depth {
                continue;
            }
            let mut top = node.id;
            while let Some(parent) = result.parent_of(top) {
                if parent == root || result.children(parent).len() != 1 {
                    break;
                }
                top = parent;
            }
            cut.push(top);
        }
        if cut.is_empty() {
            return result;
        }
        result.remove_subtrees(&cut);
    }
}

/// Remove, then add, then trim.
pub fn filter(tree: &VariationTree, instructions: &Instructions) -> Result<FilterOutcome> {
    let removal = remove_variations(tree, &instructions.remove);
    if instructions.policy == UnmatchedPolicy::Strict {
        if let Some(first) = removal.unmatched.first() {
            return Err(first.into());
        }
    }

    let addition = add_variations(&removal.tree, &instructions.add);
    let tree = match instructions.max_depth {
        Some(max_depth) => trim_depth(&addition.tree, max_depth),
        None => addition.tree,
    };

    Ok(FilterOutcome {
        tree,
        unmatched: removal.unmatched,
        detached: removal.detached,
        created: addition.created,
    })
}

/// Descendants of `start` (at ply `start_depth`) that sit exactly at `target`.
fn nodes_at_depth(
    tree: &VariationTree,
    start: NodeId,
    start_depth: usize,
    target: usize,
) -> Vec<NodeId> {
    let mut found = Vec::new();
    let mut stack = vec![(start, start_depth)];
    while let Some((id, depth)) = stack.pop() {
        if depth == target {
            found.push(id);
            continue;
        }
        for &child in tree.children(id) {
            stack.push((child, depth + 1));
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Move;
    use crate::variation::variations;

    fn tree_of(lines: &[&str]) -> VariationTree {
        add_variations(&VariationTree::new(), &entries(lines)).tree
    }

    fn entries(lines: &[&str]) -> Vec<FilterEntry> {
        lines.iter().map(|l| FilterEntry::parse(l).unwrap()).collect()
    }

    fn lines(tree: &VariationTree) -> Vec<String> {
        variations(tree).map(|v| v.to_string()).collect()
    }

    fn node_at(tree: &VariationTree, line: &str) -> NodeId {
        match tree.resolve(VariationPath::parse(line).unwrap().moves()) {
            Resolution::Full(id) => id,
            other => panic!("{line} did not resolve: {other:?}"),
        }
    }

    fn ruy_and_sicilian() -> VariationTree {
        tree_of(&[
            "1.e4 e5 2.Nf3 Nc6 3.Bb5",
            "1.e4 e5 2.Nf3 Nc6 3.Bc4",
            "1.e4 e5 2.Bc4",
            "1.e4 c5 2.Nf3",
            "1.d4 d5",
        ])
    }

    #[test]
    fn test_remove_detaches_subtree() {
        let tree = ruy_and_sicilian();
        let removal = remove_variations(&tree, &entries(&["1.e4 e5 2.Nf3"]));
        assert!(removal.unmatched.is_empty());
        assert_eq!(removal.detached, 4);
        assert_eq!(lines(&removal.tree), vec!["1.e4 e5 2.Bc4", "1.e4 c5 2.Nf3", "1.d4 d5"]);
    }

    #[test]
    fn test_remove_does_not_mutate_input() {
        let tree = ruy_and_sicilian();
        let hash = tree.subtree_hash(0);
        let _ = remove_variations(&tree, &entries(&["1.e4"]));
        assert_eq!(tree.subtree_hash(0), hash);
        assert_eq!(lines(&tree).len(), 5);
    }

    #[test]
    fn test_remove_partial_match_is_recorded_not_fatal() {
        let tree = ruy_and_sicilian();
        let removal = remove_variations(
            &tree,
            &[FilterEntry::parse("1.e4 e5 2.Nc3").unwrap().with_reason("Vienna")],
        );
        assert_eq!(removal.detached, 0);
        assert_eq!(
            removal.unmatched,
            vec![Unmatched {
                sequence: String::from("1.e4 e5 2.Nc3"),
                reason: Some(String::from("Vienna")),
                matched: 2,
                total: 3,
            }]
        );
    }

    #[test]
    fn test_remove_nested_entries_both_match() {
        let tree = ruy_and_sicilian();
        let removal = remove_variations(&tree, &entries(&["1.e4 e5 2.Nf3", "1.e4"]));
        assert!(removal.unmatched.is_empty());
        assert_eq!(lines(&removal.tree), vec!["1.d4 d5"]);
    }

    #[test]
    fn test_remove_with_depth_keeps_shallow_part() {
        let tree = ruy_and_sicilian();
        let entry = FilterEntry::parse("1.e4 e5").unwrap().with_depth(3);
        let removal = remove_variations(&tree, &[entry]);
        assert_eq!(
            lines(&removal.tree),
            vec!["1.e4 e5 2.Nf3", "1.e4 e5 2.Bc4", "1.e4 c5 2.Nf3", "1.d4 d5"]
        );
    }

    #[test]
    fn test_remove_with_depth_shallower_than_prefix_removes_all() {
        let tree = ruy_and_sicilian();
        let entry = FilterEntry::parse("1.e4 e5").unwrap().with_depth(1);
        let removal = remove_variations(&tree, &[entry]);
        assert_eq!(lines(&removal.tree), vec!["1.e4 c5 2.Nf3", "1.d4 d5"]);
    }

    #[test]
    fn test_add_reuses_existing_nodes_and_annotations() {
        let mut tree = ruy_and_sicilian();
        let e5 = node_at(&tree, "1.e4 e5");
        tree.get_node_mut(e5).unwrap().comment = Some(String::from("Open Game"));

        let addition = add_variations(&tree, &entries(&["1.e4 e5 2.Nc3 Nf6"]));
        assert_eq!(addition.created, 2);
        let e5_after = node_at(&addition.tree, "1.e4 e5");
        assert_eq!(e5_after, e5);
        assert_eq!(
            addition.tree.get_node(e5_after).unwrap().comment.as_deref(),
            Some("Open Game")
        );
        let nc3 = node_at(&addition.tree, "1.e4 e5 2.Nc3");
        assert_eq!(addition.tree.children(e5).last(), Some(&nc3));
    }

    #[test]
    fn test_add_appends_after_existing_siblings() {
        let tree = ruy_and_sicilian();
        let addition = add_variations(&tree, &entries(&["1.c4"]));
        assert_eq!(lines(&addition.tree).last().map(String::as_str), Some("1.c4"));
        assert_eq!(lines(&addition.tree)[0], "1.e4 e5 2.Nf3 Nc6 3.Bb5");
    }

    #[test]
    fn test_add_existing_line_creates_nothing() {
        let tree = ruy_and_sicilian();
        let addition = add_variations(&tree, &entries(&["1.e4 c5"]));
        assert_eq!(addition.created, 0);
        assert_eq!(addition.tree.subtree_hash(0), tree.subtree_hash(0));
    }

    #[test]
    fn test_add_with_depth_replays_prefix_only() {
        let entry = FilterEntry::parse("1.e4 e5 2.Nf3 Nc6").unwrap().with_depth(2);
        let addition = add_variations(&VariationTree::new(), &[entry]);
        assert_eq!(lines(&addition.tree), vec!["1.e4 e5"]);
    }

    #[test]
    fn test_reconstructed_nodes_start_empty() {
        let mut tree = ruy_and_sicilian();
        let c5 = node_at(&tree, "1.e4 c5");
        tree.get_node_mut(c5).unwrap().comment = Some(String::from("Sicilian"));
        tree.get_node_mut(c5).unwrap().nags.insert(1);

        let outcome = filter(
            &tree,
            &Instructions {
                remove: entries(&["1.e4 c5"]),
                add: entries(&["1.e4 c5 2.Nf3"]),
                ..Instructions::default()
            },
        )
        .unwrap();
        let rebuilt = node_at(&outcome.tree, "1.e4 c5");
        let node = outcome.tree.get_node(rebuilt).unwrap();
        assert!(node.comment.is_none());
        assert!(node.nags.is_empty());
        assert!(lines(&outcome.tree).contains(&String::from("1.e4 c5 2.Nf3")));
    }

    #[test]
    fn test_filter_union_semantics() {
        let tree = ruy_and_sicilian();
        let outcome = filter(
            &tree,
            &Instructions {
                remove: entries(&["1.e4"]),
                add: entries(&["1.e4 e5 2.Bc4", "1.c4 e5"]),
                ..Instructions::default()
            },
        )
        .unwrap();
        assert_eq!(lines(&outcome.tree), vec!["1.d4 d5", "1.e4 e5 2.Bc4", "1.c4 e5"]);
        assert_eq!(outcome.created, 5);
    }

    #[test]
    fn test_filter_strict_policy_fails_on_unmatched() {
        let tree = ruy_and_sicilian();
        let instructions = Instructions {
            remove: entries(&["1.f4"]),
            policy: UnmatchedPolicy::Strict,
            ..Instructions::default()
        };
        let err = filter(&tree, &instructions).unwrap_err();
        assert!(matches!(
            err,
            CurateError::UnresolvedFilterEntry { matched: 0, total: 1, .. }
        ));
    }

    #[test]
    fn test_filter_warn_policy_reports_unmatched() {
        let tree = ruy_and_sicilian();
        let outcome = filter(&tree, &Instructions::removing(entries(&["1.f4"]))).unwrap();
        assert_eq!(outcome.unmatched.len(), 1);
        assert_eq!(lines(&outcome.tree).len(), 5);
    }

    #[test]
    fn test_trim_depth_boundary_keeps_comments() {
        let mut tree = ruy_and_sicilian();
        let nf3 = node_at(&tree, "1.e4 e5 2.Nf3");
        tree.get_node_mut(nf3).unwrap().comment = Some(String::from("main"));

        let trimmed = trim_depth(&tree, 3);
        assert_eq!(
            lines(&trimmed),
            vec!["1.e4 e5 2.Nf3", "1.e4 e5 2.Bc4", "1.e4 c5 2.Nf3", "1.d4 d5"]
        );
        assert_eq!(trimmed.get_node(nf3).unwrap().comment.as_deref(), Some("main"));
    }

    #[test]
    fn test_trim_depth_long_annotated_lines() {
        let cycle = ["Nf3", "Nf6", "Ng1", "Ng8"];
        let long: Vec<&str> = (0..25).map(|i| cycle[i % 4]).collect();
        let mut branch: Vec<&str> = long[..18].to_vec();
        branch.extend(["e4", "e5", "d4", "d5", "c4"]);
        let mut tree = tree_of(&[long.join(" ").as_str(), branch.join(" ").as_str()]);
        let ids: Vec<NodeId> = tree.nodes().iter().map(|n| n.id).collect();
        for id in ids {
            let depth = tree.depth_of(id);
            tree.get_node_mut(id).unwrap().comment = Some(format!("ply {depth}"));
        }

        let trimmed = trim_depth(&tree, 20);
        let lengths: Vec<usize> = variations(&trimmed).map(|v| v.len()).collect();
        assert_eq!(lengths, vec![20, 20]);
        assert_eq!(trimmed.node_count(), 21 + 2);
        for node in trimmed.nodes() {
            let depth = trimmed.depth_of(node.id);
            assert!(depth <= 20);
            assert_eq!(node.comment, Some(format!("ply {depth}")));
        }
    }

    #[test]
    fn test_trim_depth_zero_empties_tree() {
        assert!(trim_depth(&ruy_and_sicilian(), 0).is_empty());
    }

    #[test]
    fn test_filter_applies_depth_after_add() {
        let outcome = filter(
            &VariationTree::new(),
            &Instructions::adding(entries(&["1.e4 e5 2.Nf3 Nc6"])).with_max_depth(2),
        )
        .unwrap();
        assert_eq!(lines(&outcome.tree), vec!["1.e4 e5"]);
    }

    #[test]
    fn test_remove_empty_sequence_clears_tree() {
        let tree = ruy_and_sicilian();
        let removal = remove_variations(&tree, &[FilterEntry::new(VariationPath::default())]);
        assert!(removal.tree.is_empty());
        assert!(removal.unmatched.is_empty());
    }

    #[test]
    fn test_prune_short_removes_only_exclusive_part() {
        let tree = ruy_and_sicilian();
        let pruned = prune_short(&tree, 4);
        assert_eq!(
            lines(&pruned),
            vec!["1.e4 e5 2.Nf3 Nc6 3.Bb5", "1.e4 e5 2.Nf3 Nc6 3.Bc4"]
        );
    }

    #[test]
    fn test_prune_short_zero_keeps_everything() {
        let tree = ruy_and_sicilian();
        assert_eq!(prune_short(&tree, 0).subtree_hash(0), tree.subtree_hash(0));
    }

    #[test]
    fn test_duplicate_move_resolution_uses_first_child() {
        let mut tree = VariationTree::new();
        let a = tree.add_move(0, Move::parse("e4").unwrap());
        tree.add_move(0, Move::parse("e4").unwrap());
        let removal = remove_variations(&tree, &entries(&["1.e4"]));
        assert!(removal.tree.get_node(a).is_none());
        assert_eq!(removal.tree.node_count(), 2);
    }
}
