//! Variation extraction
//!
//! A variation is one root-to-leaf path. Enumeration is depth-first with
//! children visited in stored order, so two walks over the same tree
//! always produce the same sequence.
//!
//! Author: Moroya Sakamoto

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{CurateError, Result};
use crate::tree::{Move, NodeId, VariationTree};

/// Ordered move sequence from the start position.
///
/// Renders canonically as `1.e4 e5 2.Nf3`; that string is the identity
/// used for set operations and trie keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VariationPath {
    moves: Vec<Move>,
}

impl VariationPath {
    pub fn new(moves: Vec<Move>) -> Self {
        Self { moves }
    }

    /// Parse `"1.e4 e5 2.Nf3"`, `"1. e4 e5"` or bare `"e4 e5 Nf3"`.
    /// Move numbers are dropped, glyphs are stripped.
    pub fn parse(sequence: &str) -> Result<Self> {
        let mut moves = Vec::new();
        for token in sequence.split(|c: char| c == '.' || c.is_whitespace()) {
            if token.is_empty() || token.bytes().all(|b| b.is_ascii_digit()) {
                continue;
            }
            let mv = Move::parse(token).map_err(|_| {
                CurateError::parse(0, format!("invalid move `{token}` in sequence `{sequence}`"))
            })?;
            moves.push(mv);
        }
        Ok(Self { moves })
    }

    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    /// Length in plies
    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// True when `prefix` is a (not necessarily strict) prefix of `self`.
    pub fn starts_with(&self, prefix: &VariationPath) -> bool {
        self.moves.starts_with(&prefix.moves)
    }

    /// The first `plies` moves.
    pub fn truncated(&self, plies: usize) -> Self {
        Self {
            moves: self.moves[..plies.min(self.moves.len())].to_vec(),
        }
    }

    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for VariationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, mv) in self.moves.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            if i % 2 == 0 {
                write!(f, "{}.", i / 2 + 1)?;
            }
            write!(f, "{mv}")?;
        }
        Ok(())
    }
}

impl FromStr for VariationPath {
    type Err = CurateError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// ── Extraction ─────────────────────────────────────────────────────────

/// Depth-first iterator over every variation of a tree.
///
/// The moves of the current path are kept alongside the stack, so each
/// node is visited once.
pub struct Variations<'a> {
    tree: &'a VariationTree,
    /// Pending nodes with their ply depth
    stack: Vec<(NodeId, usize)>,
    path: Vec<Move>,
}

impl Iterator for Variations<'_> {
    type Item = VariationPath;

    fn next(&mut self) -> Option<VariationPath> {
        while let Some((id, depth)) = self.stack.pop() {
            let Some(node) = self.tree.get_node(id) else {
                continue;
            };
            self.path.truncate(depth.saturating_sub(1));
            if let Some(mv) = &node.mv {
                self.path.push(mv.clone());
            }
            if node.children.is_empty() {
                if id != self.tree.root_id() {
                    return Some(VariationPath::new(self.path.clone()));
                }
            } else {
                self.stack
                    .extend(node.children.iter().rev().map(|&c| (c, depth + 1)));
            }
        }
        None
    }
}

/// Enumerate all variations of `tree`. Each call starts a fresh walk.
pub fn variations(tree: &VariationTree) -> Variations<'_> {
    Variations {
        tree,
        stack: vec![(tree.root_id(), 0)],
        path: Vec::new(),
    }
}

/// Variations in walk order with duplicates (same canonical string) dropped.
pub fn distinct_variations(tree: &VariationTree) -> Vec<VariationPath> {
    let mut seen = HashSet::new();
    variations(tree)
        .filter(|v| seen.insert(v.canonical()))
        .collect()
}

/// Canonical strings of every variation, for membership tests.
pub fn variation_keys(tree: &VariationTree) -> HashSet<String> {
    variations(tree).map(|v| v.canonical()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> VariationPath {
        VariationPath::parse(s).unwrap()
    }

    fn tree_of(lines: &[&str]) -> VariationTree {
        let mut tree = VariationTree::new();
        for line in lines {
            let mut cur = tree.root_id();
            for mv in path(line).moves() {
                cur = tree.ensure_child(cur, mv).0;
            }
        }
        tree
    }

    #[test]
    fn test_parse_numbered_and_bare() {
        assert_eq!(path("1.e4 e5 2.Nf3"), path("e4 e5 Nf3"));
        assert_eq!(path("1. e4 e5 2. Nf3"), path("e4 e5 Nf3"));
        assert_eq!(path("1.e4 e5 2.Nf3 Nc6 10.O-O").len(), 5);
    }

    #[test]
    fn test_parse_black_continuation() {
        assert_eq!(path("1...e5").moves()[0].as_str(), "e5");
    }

    #[test]
    fn test_parse_rejects_bad_token() {
        let err = VariationPath::parse("1.e4 zz").unwrap_err();
        assert!(err.to_string().contains("zz"));
    }

    #[test]
    fn test_canonical_rendering() {
        assert_eq!(path("e4 e5 Nf3").to_string(), "1.e4 e5 2.Nf3");
        assert_eq!(path("e4").to_string(), "1.e4");
        assert_eq!(path("e4!? e5").to_string(), "1.e4 e5");
        assert_eq!(VariationPath::default().to_string(), "");
    }

    #[test]
    fn test_starts_with_and_truncate() {
        let p = path("1.e4 e5 2.Nf3");
        assert!(p.starts_with(&path("1.e4 e5")));
        assert!(p.starts_with(&p));
        assert!(!p.starts_with(&path("1.e4 c5")));
        assert_eq!(p.truncated(2), path("1.e4 e5"));
        assert_eq!(p.truncated(10), p);
    }

    #[test]
    fn test_variations_depth_first_in_child_order() {
        let tree = tree_of(&["1.e4 e5 2.Nf3", "1.e4 e5 2.Bc4", "1.e4 c5", "1.d4"]);
        let got: Vec<String> = variations(&tree).map(|v| v.to_string()).collect();
        assert_eq!(
            got,
            vec!["1.e4 e5 2.Nf3", "1.e4 e5 2.Bc4", "1.e4 c5", "1.d4"]
        );
    }

    #[test]
    fn test_variations_agree_with_parent_walk() {
        let mut tree = tree_of(&[
            "1.e4 e5 2.Nf3 Nc6 3.Bb5 a6",
            "1.e4 e5 2.Nf3 Nf6",
            "1.e4 c5 2.Nf3 d6 3.d4",
            "1.e4 c5 2.c3",
            "1.d4 d5 2.c4",
        ]);
        if let crate::tree::Resolution::Full(id) = tree.resolve(path("1.e4 e5 2.Nf3 Nf6").moves()) {
            tree.remove_subtree(id);
        }
        let leaves: Vec<VariationPath> = tree
            .nodes()
            .iter()
            .filter(|n| n.is_leaf() && n.id != tree.root_id())
            .map(|n| VariationPath::new(tree.path_to(n.id)))
            .collect();
        let walked: Vec<VariationPath> = variations(&tree).collect();
        assert_eq!(walked.len(), leaves.len());
        assert!(walked.iter().all(|v| leaves.contains(v)));
        assert_eq!(walked[0].to_string(), "1.e4 e5 2.Nf3 Nc6 3.Bb5 a6");
        assert_eq!(walked.last().unwrap().to_string(), "1.d4 d5 2.c4");
    }

    #[test]
    fn test_variations_restartable() {
        let tree = tree_of(&["1.e4 e5", "1.d4 d5"]);
        let first: Vec<_> = variations(&tree).collect();
        let second: Vec<_> = variations(&tree).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_tree_has_no_variations() {
        assert_eq!(variations(&VariationTree::new()).count(), 0);
    }

    #[test]
    fn test_duplicate_siblings_deduplicated() {
        let mut tree = VariationTree::new();
        let e4 = Move::parse("e4").unwrap();
        tree.add_move(0, e4.clone());
        tree.add_move(0, e4);
        assert_eq!(variations(&tree).count(), 2);
        assert_eq!(distinct_variations(&tree).len(), 1);
        assert_eq!(variation_keys(&tree).len(), 1);
    }
}
