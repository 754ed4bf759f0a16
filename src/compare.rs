//! Two-phase tree comparator
//!
//! Turns "transform baseline into target" into a minimal declarative
//! remove/add instruction set:
//!
//! - **Phase 1 (remove)**: lines of the baseline absent from the target
//!   are compressed against the baseline.
//! - **Phase 2 (add)**: the removal is applied, and the target lines still
//!   missing from that reduced tree are compressed against it. The
//!   reduced tree is the reference because that is the tree the add
//!   entries will be replayed onto.
//!
//! Author: Moroya Sakamoto

use std::collections::HashSet;

use tracing::{debug, info};

use crate::error::{CurateError, Result};
use crate::filter::{filter, remove_variations, trim_depth, FilterEntry, Instructions};
use crate::prefix::{optimize, optimize_additions};
use crate::tree::{Game, VariationTree};
use crate::variation::{distinct_variations, variation_keys, VariationPath};

/// Variation counts of one comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiffStats {
    pub baseline_variations: usize,
    pub target_variations: usize,
    /// Baseline lines absent from the target
    pub to_remove: usize,
    /// Target lines absent from the reduced baseline
    pub to_add: usize,
}

/// Remove/add prefixes turning one tree into another
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TreeDiff {
    pub remove: Vec<VariationPath>,
    pub add: Vec<VariationPath>,
    pub stats: DiffStats,
}

impl TreeDiff {
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.add.is_empty()
    }

    /// The diff as filter instructions, ready to apply to the baseline.
    pub fn instructions(&self) -> Instructions {
        Instructions {
            remove: self.remove.iter().cloned().map(FilterEntry::new).collect(),
            add: self.add.iter().cloned().map(FilterEntry::new).collect(),
            ..Instructions::default()
        }
    }

    /// Apply the diff to `baseline`.
    pub fn apply(&self, baseline: &VariationTree) -> Result<VariationTree> {
        filter(baseline, &self.instructions()).map(|outcome| outcome.tree)
    }
}

/// Compute the minimal diff from `baseline` to `target`.
pub fn diff_trees(baseline: &VariationTree, target: &VariationTree) -> Result<TreeDiff> {
    // Phase 1
    let v1 = distinct_variations(baseline);
    let v2 = distinct_variations(target);
    let v2_keys: HashSet<String> = v2.iter().map(VariationPath::canonical).collect();

    let to_remove: Vec<VariationPath> = v1
        .iter()
        .filter(|v| !v2_keys.contains(&v.canonical()))
        .cloned()
        .collect();
    let remove = optimize(&to_remove, baseline)?;

    // Phase 2
    let entries: Vec<FilterEntry> = remove.iter().cloned().map(FilterEntry::new).collect();
    let intermediate = remove_variations(baseline, &entries).tree;
    let v1_prime = variation_keys(&intermediate);
    let to_add: Vec<VariationPath> = v2
        .iter()
        .filter(|v| !v1_prime.contains(&v.canonical()))
        .cloned()
        .collect();
    let add = optimize_additions(&to_add, &intermediate)?;

    let stats = DiffStats {
        baseline_variations: v1.len(),
        target_variations: v2.len(),
        to_remove: to_remove.len(),
        to_add: to_add.len(),
    };
    debug!(
        remove = remove.len(),
        add = add.len(),
        ?stats,
        "diff computed"
    );
    Ok(TreeDiff { remove, add, stats })
}

// ── Game-level comparison ──────────────────────────────────────────────

/// Comparison of one game pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameComparison {
    /// 1-based index in the baseline source
    pub baseline_index: usize,
    /// 1-based index in the target source
    pub target_index: usize,
    pub baseline_name: String,
    pub target_name: String,
    pub diff: TreeDiff,
}

impl GameComparison {
    pub fn has_differences(&self) -> bool {
        !self.diff.is_empty()
    }
}

/// Which game pairs to compare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    /// 1 vs 1, 2 vs 2, ... keeping only pairs that differ
    #[default]
    Positional,
    /// One explicit pair of 1-based indices, kept even if identical
    Pair { baseline: usize, target: usize },
}

/// Name shown for a game: its `White` header or `Game N`.
pub fn game_name(game: &Game, index: usize) -> String {
    game.header("White")
        .map_or_else(|| format!("Game {index}"), String::from)
}

/// Compare two games, depth-trimming both first when `max_depth` is set.
pub fn compare_game_pair(
    baseline: &Game,
    target: &Game,
    baseline_index: usize,
    target_index: usize,
    max_depth: Option<usize>,
) -> Result<GameComparison> {
    let (b, t) = match max_depth {
        Some(depth) => (
            trim_depth(&baseline.tree, depth),
            trim_depth(&target.tree, depth),
        ),
        None => (baseline.tree.clone(), target.tree.clone()),
    };
    let diff = diff_trees(&b, &t)?;
    Ok(GameComparison {
        baseline_index,
        target_index,
        baseline_name: game_name(baseline, baseline_index),
        target_name: game_name(target, target_index),
        diff,
    })
}

/// Compare two game lists according to `selection`.
pub fn compare_games(
    baseline: &[Game],
    target: &[Game],
    selection: Selection,
    max_depth: Option<usize>,
) -> Result<Vec<GameComparison>> {
    match selection {
        Selection::Pair {
            baseline: bi,
            target: ti,
        } => {
            let b = pick(baseline, bi)?;
            let t = pick(target, ti)?;
            Ok(vec![compare_game_pair(b, t, bi, ti, max_depth)?])
        }
        Selection::Positional => {
            let mut results = Vec::new();
            for (i, (b, t)) in baseline.iter().zip(target).enumerate() {
                let comparison = compare_game_pair(b, t, i + 1, i + 1, max_depth)?;
                if comparison.has_differences() {
                    results.push(comparison);
                }
            }
            info!(
                compared = baseline.len().min(target.len()),
                differing = results.len(),
                "game lists compared"
            );
            Ok(results)
        }
    }
}

fn pick(games: &[Game], index: usize) -> Result<&Game> {
    index
        .checked_sub(1)
        .and_then(|i| games.get(i))
        .ok_or(CurateError::GameIndexOutOfRange {
            index,
            available: games.len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::add_variations;
    use crate::variation::variations;

    fn tree_of(lines: &[&str]) -> VariationTree {
        let entries: Vec<FilterEntry> = lines.iter().map(|l| FilterEntry::parse(l).unwrap()).collect();
        add_variations(&VariationTree::new(), &entries).tree
    }

    fn key_set(tree: &VariationTree) -> HashSet<String> {
        variations(tree).map(|v| v.to_string()).collect()
    }

    fn strings(paths: &[VariationPath]) -> Vec<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    const FIVE_E4: [&str; 5] = [
        "1.e4 e5 2.Nf3 Nc6",
        "1.e4 e5 2.Nf3 Nf6",
        "1.e4 e5 2.Bc4",
        "1.e4 c5 2.Nf3",
        "1.e4 c5 2.c3",
    ];

    #[test]
    fn test_identical_trees_have_empty_diff() {
        let t = tree_of(&FIVE_E4);
        let diff = diff_trees(&t, &t.clone()).unwrap();
        assert!(diff.is_empty());
        assert_eq!(diff.stats.baseline_variations, 5);
        assert_eq!(diff.stats.target_variations, 5);
    }

    #[test]
    fn test_keep_two_add_unrelated_line() {
        let g1 = tree_of(&FIVE_E4);
        let g2 = tree_of(&["1.e4 e5 2.Nf3 Nc6", "1.e4 c5 2.Nf3", "1.d4 d5 2.c4"]);
        let diff = diff_trees(&g1, &g2).unwrap();

        assert!(!strings(&diff.remove).contains(&String::from("1.e4")));
        assert_eq!(
            strings(&diff.remove),
            vec!["1.e4 e5 2.Nf3 Nf6", "1.e4 e5 2.Bc4", "1.e4 c5 2.c3"]
        );
        assert_eq!(strings(&diff.add), vec!["1.d4 d5 2.c4"]);
        assert_eq!(
            diff.stats,
            DiffStats {
                baseline_variations: 5,
                target_variations: 3,
                to_remove: 3,
                to_add: 1,
            }
        );
        assert_eq!(key_set(&diff.apply(&g1).unwrap()), key_set(&g2));
    }

    #[test]
    fn test_whole_branch_removed_uses_common_prefix() {
        let g1 = tree_of(&FIVE_E4);
        let g2 = tree_of(&["1.e4 c5 2.Nf3", "1.e4 c5 2.c3"]);
        let diff = diff_trees(&g1, &g2).unwrap();
        assert_eq!(strings(&diff.remove), vec!["1.e4 e5"]);
        assert!(diff.add.is_empty());
    }

    #[test]
    fn test_extension_of_leaf_is_remove_then_add() {
        let g1 = tree_of(&["1.e4 e5", "1.d4 d5"]);
        let g2 = tree_of(&["1.e4 e5 2.Nf3", "1.d4 d5"]);
        let diff = diff_trees(&g1, &g2).unwrap();
        assert_eq!(strings(&diff.remove), vec!["1.e4"]);
        assert_eq!(strings(&diff.add), vec!["1.e4 e5 2.Nf3"]);
        assert_eq!(key_set(&diff.apply(&g1).unwrap()), key_set(&g2));
    }

    #[test]
    fn test_diff_into_empty_tree() {
        let g1 = tree_of(&FIVE_E4);
        let diff = diff_trees(&g1, &VariationTree::new()).unwrap();
        assert_eq!(strings(&diff.remove), vec!["1.e4"]);
        assert!(diff.apply(&g1).unwrap().is_empty());
    }

    #[test]
    fn test_diff_from_empty_tree() {
        let g2 = tree_of(&["1.e4 e5", "1.c4"]);
        let diff = diff_trees(&VariationTree::new(), &g2).unwrap();
        assert!(diff.remove.is_empty());
        assert_eq!(strings(&diff.add), vec!["1.e4 e5", "1.c4"]);
    }

    fn game(white: Option<&str>, lines: &[&str]) -> Game {
        let mut g = Game::with_tree(tree_of(lines));
        if let Some(w) = white {
            g.set_header("White", w);
        }
        g
    }

    #[test]
    fn test_compare_games_positional_keeps_differing_pairs() {
        let a = vec![game(Some("Open"), &["1.e4 e5"]), game(None, &["1.d4 d5"])];
        let b = vec![game(Some("Open"), &["1.e4 e5"]), game(None, &["1.d4 Nf6"])];
        let results = compare_games(&a, &b, Selection::Positional, None).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].baseline_index, 2);
        assert_eq!(results[0].baseline_name, "Game 2");
    }

    #[test]
    fn test_compare_games_pair_kept_even_if_equal() {
        let a = vec![game(Some("Open"), &["1.e4 e5"])];
        let results =
            compare_games(&a, &a, Selection::Pair { baseline: 1, target: 1 }, None).unwrap();
        assert_eq!(results.len(), 1);
        assert!(!results[0].has_differences());
        assert_eq!(results[0].target_name, "Open");
    }

    #[test]
    fn test_compare_games_pair_out_of_range() {
        let a = vec![game(None, &["1.e4 e5"])];
        let err =
            compare_games(&a, &a, Selection::Pair { baseline: 1, target: 3 }, None).unwrap_err();
        assert!(matches!(
            err,
            CurateError::GameIndexOutOfRange { index: 3, available: 1 }
        ));
        assert!(compare_games(&a, &a, Selection::Pair { baseline: 0, target: 1 }, None).is_err());
    }

    #[test]
    fn test_compare_trims_before_diffing() {
        let a = vec![game(None, &["1.e4 e5 2.Nf3 Nc6"])];
        let b = vec![game(None, &["1.e4 e5 2.Nf3 Nf6"])];
        let results = compare_games(&a, &b, Selection::Positional, Some(3)).unwrap();
        assert!(results.is_empty());
    }
}
