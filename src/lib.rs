//! pgn-curator — repertoire curation for chess opening trees
//!
//! Cut large annotated opening files down to the lines a player actually
//! needs, and express the difference between two trees as a minimal set of
//! declarative remove/add instructions.
//!
//! - Union filter semantics: result = (all − removed) ∪ added
//! - Prefix-trie compression of variation sets against a reference tree
//! - Two-phase tree comparison producing replayable instructions
//! - TOML-driven batch builds over multi-game PGN sources
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`tree`] | Arena move tree with O(1) node lookup, games and headers |
//! | [`variation`] | Root-to-leaf path extraction and canonical rendering |
//! | [`filter`] | Remove/add transforms, depth trim, short-line pruning |
//! | [`prefix`] | Minimal covering prefix sets with self-verification |
//! | [`compare`] | Two-phase diff of trees and game lists |
//! | [`pgn`] | Structural PGN reader and writer |
//! | [`config`] | TOML configuration schema, validation, range shorthand |
//! | [`curate`] | Config-driven builder with per-game reports |
//! | [`generate`] | Replication and starter config rendering |
//! | [`inspect`] | Variation counts and depth statistics |
//! | [`error`] | Error type shared by every module |
//!
//! # Quick Start
//!
//! ```
//! use pgn_curator::{diff_trees, read_games};
//!
//! let baseline = read_games("1. e4 e5 (1... c5) *")?;
//! let target = read_games("1. e4 e5 *")?;
//!
//! // One prefix is enough to drop the Sicilian
//! let diff = diff_trees(&baseline[0].tree, &target[0].tree)?;
//! assert_eq!(diff.remove[0].to_string(), "1.e4 c5");
//! assert!(diff.add.is_empty());
//! # Ok::<(), pgn_curator::CurateError>(())
//! ```
//!
//! Author: Moroya Sakamoto

pub mod compare;
pub mod config;
pub mod curate;
pub mod error;
pub mod filter;
pub mod generate;
pub mod inspect;
pub mod pgn;
pub mod prefix;
pub mod tree;
pub mod variation;

pub use compare::{compare_games, diff_trees, DiffStats, GameComparison, Selection, TreeDiff};
pub use config::{Action, Color, Config, GameConfig, Settings};
pub use curate::{BuildReport, Curator, GameOutcome};
pub use error::{CurateError, Result};
pub use filter::{filter, FilterEntry, FilterOutcome, Instructions, Unmatched, UnmatchedPolicy};
pub use pgn::{read_games, write_games};
pub use prefix::{optimize, optimize_additions};
pub use tree::{Game, Move, Node, NodeId, VariationTree};
pub use variation::{variations, VariationPath};
