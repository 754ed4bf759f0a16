//! Tree statistics
//!
//! Author: Moroya Sakamoto

use crate::compare::game_name;
use crate::tree::{Game, VariationTree};
use crate::variation::{variations, VariationPath};

/// Number of root-to-leaf variations. An empty tree has none.
pub fn count_variations(tree: &VariationTree) -> usize {
    variations(tree).count()
}

/// Leaf depths in plies, walk order.
fn leaf_depths(tree: &VariationTree) -> Vec<usize> {
    let root = tree.root_id();
    let mut depths = Vec::new();
    let mut stack = vec![(root, 0usize)];
    while let Some((id, depth)) = stack.pop() {
        let children = tree.children(id);
        if children.is_empty() {
            if id != root {
                depths.push(depth);
            }
        } else {
            stack.extend(children.iter().rev().map(|&c| (c, depth + 1)));
        }
    }
    depths
}

/// Mean variation length in plies, 0.0 for an empty tree.
pub fn average_depth(tree: &VariationTree) -> f64 {
    let depths = leaf_depths(tree);
    if depths.is_empty() {
        return 0.0;
    }
    depths.iter().sum::<usize>() as f64 / depths.len() as f64
}

/// Longest variation in plies.
pub fn max_depth(tree: &VariationTree) -> usize {
    leaf_depths(tree).into_iter().max().unwrap_or(0)
}

/// First `limit` plies of the mainline.
pub fn opening_moves(tree: &VariationTree, limit: usize) -> VariationPath {
    let mut moves = Vec::new();
    let mut cur = tree.root_id();
    while moves.len() < limit {
        let Some(&main) = tree.children(cur).first() else {
            break;
        };
        if let Some(mv) = tree.get_node(main).and_then(|n| n.mv.clone()) {
            moves.push(mv);
        }
        cur = main;
    }
    VariationPath::new(moves)
}

/// Every variation with its length in plies.
pub fn list_variations(tree: &VariationTree) -> Vec<(VariationPath, usize)> {
    variations(tree)
        .map(|v| {
            let len = v.len();
            (v, len)
        })
        .collect()
}

/// Statistics of one game
#[derive(Debug, Clone, PartialEq)]
pub struct GameSummary {
    /// 1-based index in its source
    pub index: usize,
    pub name: String,
    pub eco: Option<String>,
    pub annotator: Option<String>,
    pub variations: usize,
    pub average_depth: f64,
    pub max_depth: usize,
}

impl GameSummary {
    pub fn of(game: &Game, index: usize) -> Self {
        Self {
            index,
            name: game_name(game, index),
            eco: game.header("ECO").map(String::from),
            annotator: game.header("Annotator").map(String::from),
            variations: count_variations(&game.tree),
            average_depth: average_depth(&game.tree),
            max_depth: max_depth(&game.tree),
        }
    }
}

/// Statistics of a game collection
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CollectionSummary {
    pub games: Vec<GameSummary>,
    pub total_variations: usize,
    /// Mean of the per-game averages
    pub average_depth: f64,
    pub max_depth: usize,
}

impl CollectionSummary {
    pub fn of(games: &[Game]) -> Self {
        let games: Vec<GameSummary> = games
            .iter()
            .enumerate()
            .map(|(i, g)| GameSummary::of(g, i + 1))
            .collect();
        let total_variations = games.iter().map(|g| g.variations).sum();
        let max_depth = games.iter().map(|g| g.max_depth).max().unwrap_or(0);
        let average_depth = if games.is_empty() {
            0.0
        } else {
            games.iter().map(|g| g.average_depth).sum::<f64>() / games.len() as f64
        };
        Self {
            games,
            total_variations,
            average_depth,
            max_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pgn::read_games;

    fn game(text: &str) -> Game {
        read_games(text).unwrap().remove(0)
    }

    #[test]
    fn test_counts_and_depths() {
        let g = game("1. e4 e5 (1... c5) 2. Nf3 Nc6 3. Bb5 *");
        assert_eq!(count_variations(&g.tree), 2);
        assert_eq!(max_depth(&g.tree), 5);
        assert!((average_depth(&g.tree) - 3.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_tree_stats() {
        let tree = VariationTree::new();
        assert_eq!(count_variations(&tree), 0);
        assert_eq!(max_depth(&tree), 0);
        assert_eq!(average_depth(&tree), 0.0);
        assert!(opening_moves(&tree, 5).is_empty());
    }

    #[test]
    fn test_opening_moves_follow_mainline() {
        let g = game("1. d4 (1. e4 e5) d5 2. c4 e6 3. Nc3 *");
        assert_eq!(opening_moves(&g.tree, 4).to_string(), "1.d4 d5 2.c4 e6");
        assert_eq!(opening_moves(&g.tree, 50).len(), 5);
    }

    #[test]
    fn test_list_variations_with_lengths() {
        let g = game("1. e4 e5 (1... c5 2. Nf3) *");
        let listed: Vec<(String, usize)> = list_variations(&g.tree)
            .into_iter()
            .map(|(v, n)| (v.to_string(), n))
            .collect();
        assert_eq!(
            listed,
            vec![(String::from("1.e4 e5"), 2), (String::from("1.e4 c5 2.Nf3"), 3)]
        );
    }

    #[test]
    fn test_summaries() {
        let games = read_games(
            "[White \"Open\"]\n[ECO \"C20\"]\n1. e4 e5 *\n\n[Black \"x\"]\n1. d4 d5 2. c4 (2. Nf3) *",
        )
        .unwrap();
        let summary = CollectionSummary::of(&games);
        assert_eq!(summary.games.len(), 2);
        assert_eq!(summary.games[0].name, "Open");
        assert_eq!(summary.games[0].eco.as_deref(), Some("C20"));
        assert_eq!(summary.games[1].name, "Game 2");
        assert_eq!(summary.total_variations, 3);
        assert_eq!(summary.max_depth, 3);
        assert!((summary.average_depth - 2.5).abs() < 1e-9);
    }
}
