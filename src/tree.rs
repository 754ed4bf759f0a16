//! Variation tree model
//!
//! Flat arena storage for one game's move tree. Each node is one ply
//! carrying a move token, an optional comment, and a set of numeric
//! annotation glyphs. Children are ordered (the first child is the
//! mainline); the parent link is a plain id used only for navigation.
//!
//! Author: Moroya Sakamoto

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::error::{CurateError, Result};

/// Unique node identifier, stable for the lifetime of a tree
pub type NodeId = u32;

/// Numeric annotation glyph (`$1` = `!`, `$2` = `?`, ...)
pub type Nag = u8;

/// Seven-tag roster, in PGN export order.
pub const SEVEN_TAG_ROSTER: [&str; 7] =
    ["Event", "Site", "Date", "Round", "White", "Black", "Result"];

// ── Move token ─────────────────────────────────────────────────────────

/// One validated move in SAN form, annotation glyphs stripped.
///
/// Only the token shape is checked; legality belongs to whoever produced
/// the game. Equality is plain string equality, which is what every path
/// comparison in the crate relies on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Move(String);

impl Move {
    /// Parse a token, discarding any trailing `!`/`?` glyph.
    pub fn parse(token: &str) -> Result<Self> {
        Self::parse_annotated(token).map(|(mv, _)| mv)
    }

    /// Parse a token and return its trailing glyph as a NAG.
    pub fn parse_annotated(token: &str) -> Result<(Self, Option<Nag>)> {
        let body = token.trim_end_matches(['!', '?']);
        let glyph = &token[body.len()..];
        let nag = match glyph {
            "" => None,
            "!" => Some(1),
            "?" => Some(2),
            "!!" => Some(3),
            "??" => Some(4),
            "!?" => Some(5),
            "?!" => Some(6),
            other => {
                return Err(CurateError::parse(
                    0,
                    format!("unknown annotation glyph `{other}` in `{token}`"),
                ))
            }
        };

        let san = if body.starts_with("0-0") {
            body.replace('0', "O")
        } else {
            body.to_string()
        };
        if !is_san_shape(&san) {
            return Err(CurateError::parse(0, format!("malformed move `{token}`")));
        }
        Ok((Self(san), nag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Move {
    type Err = CurateError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn is_san_shape(san: &str) -> bool {
    let body = san
        .strip_suffix('+')
        .or_else(|| san.strip_suffix('#'))
        .unwrap_or(san);
    if matches!(body, "O-O" | "O-O-O") {
        return true;
    }

    let is_file = |c: u8| (b'a'..=b'h').contains(&c);
    let is_rank = |c: u8| (b'1'..=b'8').contains(&c);
    let bytes = body.as_bytes();

    match bytes.first() {
        Some(b'K' | b'Q' | b'R' | b'B' | b'N') => {
            let rest = &bytes[1..];
            if rest.len() < 2 {
                return false;
            }
            let (disamb, dest) = rest.split_at(rest.len() - 2);
            if !(is_file(dest[0]) && is_rank(dest[1])) {
                return false;
            }
            let disamb = disamb.strip_suffix(b"x").unwrap_or(disamb);
            match disamb {
                [] => true,
                [c] => is_file(*c) || is_rank(*c),
                [f, r] => is_file(*f) && is_rank(*r),
                _ => false,
            }
        }
        Some(&c) if is_file(c) => {
            let (main, promotion) = match bytes.iter().position(|&b| b == b'=') {
                Some(i) => (&bytes[..i], Some(&bytes[i + 1..])),
                None => (bytes, None),
            };
            if let Some(piece) = promotion {
                if !matches!(piece, [b'Q' | b'R' | b'B' | b'N']) {
                    return false;
                }
            }
            match main {
                [f, r] => is_file(*f) && is_rank(*r),
                [f, b'x', tf, tr] => is_file(*f) && is_file(*tf) && is_rank(*tr),
                _ => false,
            }
        }
        _ => false,
    }
}

// ── Nodes ──────────────────────────────────────────────────────────────

/// One ply in the tree. The root is the only node without a move.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Unique identifier within the tree
    pub id: NodeId,
    /// Move played to reach this node
    pub mv: Option<Move>,
    /// Parent node, `None` for the root
    pub parent: Option<NodeId>,
    /// Child node IDs, mainline first
    pub children: Vec<NodeId>,
    /// Comment following the move
    pub comment: Option<String>,
    /// Numeric annotation glyphs
    pub nags: BTreeSet<Nag>,
}

impl Node {
    fn new(id: NodeId, mv: Option<Move>, parent: Option<NodeId>) -> Self {
        Self {
            id,
            mv,
            parent,
            children: Vec::new(),
            comment: None,
            nags: BTreeSet::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Outcome of replaying a move sequence from the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Every move matched; the node reached by the last one.
    Full(NodeId),
    /// Replay stopped early at `deepest` after `matched` moves.
    Partial { deepest: NodeId, matched: usize },
}

// ── Tree ───────────────────────────────────────────────────────────────

/// Variation tree — flat storage of nodes with O(1) ID lookup via HashMap index
#[derive(Debug, Clone)]
pub struct VariationTree {
    nodes: Vec<Node>,
    /// Maps NodeId → index in `nodes` Vec for O(1) lookup
    index: HashMap<NodeId, usize>,
    root_id: NodeId,
    next_id: NodeId,
}

impl Default for VariationTree {
    fn default() -> Self {
        Self::new()
    }
}

impl VariationTree {
    pub fn new() -> Self {
        let mut index = HashMap::new();
        index.insert(0, 0);
        Self {
            nodes: vec![Node::new(0, None, None)],
            index,
            root_id: 0,
            next_id: 1,
        }
    }

    /// Append a move as the last child of `parent_id`, returns its ID.
    pub fn add_move(&mut self, parent_id: NodeId, mv: Move) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        let idx = self.nodes.len();
        self.nodes.push(Node::new(id, Some(mv), Some(parent_id)));
        self.index.insert(id, idx);
        if let Some(parent) = self.get_node_mut(parent_id) {
            parent.children.push(id);
        }
        id
    }

    /// Descend into the child playing `mv`, creating it if absent.
    /// The flag is true when a node was created.
    pub fn ensure_child(&mut self, parent_id: NodeId, mv: &Move) -> (NodeId, bool) {
        match self.child_with_move(parent_id, mv) {
            Some(id) => (id, false),
            None => (self.add_move(parent_id, mv.clone()), true),
        }
    }

    /// First child of `parent_id` whose move equals `mv`.
    pub fn child_with_move(&self, parent_id: NodeId, mv: &Move) -> Option<NodeId> {
        self.children(parent_id)
            .iter()
            .copied()
            .find(|&c| self.get_node(c).and_then(|n| n.mv.as_ref()) == Some(mv))
    }

    /// Get node by ID — O(1) via HashMap index
    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.index.get(&id).map(|&idx| &self.nodes[idx])
    }

    /// Get mutable node by ID — O(1) via HashMap index
    pub fn get_node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.index.get(&id).map(|&idx| &mut self.nodes[idx])
    }

    pub fn root_id(&self) -> NodeId {
        self.root_id
    }

    /// Total node count, root included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.get_node(id).and_then(|n| n.parent)
    }

    /// Children of a node, empty for unknown IDs
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get_node(id).map_or(&[], |n| n.children.as_slice())
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.children(id).is_empty()
    }

    /// True when the root has no moves at all.
    pub fn is_empty(&self) -> bool {
        self.is_leaf(self.root_id)
    }

    /// Ply depth of a node (root = 0)
    pub fn depth_of(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut cur = self.parent_of(id);
        while let Some(p) = cur {
            depth += 1;
            cur = self.parent_of(p);
        }
        depth
    }

    /// Moves from the root down to `id`.
    pub fn path_to(&self, id: NodeId) -> Vec<Move> {
        let mut moves = Vec::new();
        let mut cur = self.get_node(id);
        while let Some(node) = cur {
            if let Some(mv) = &node.mv {
                moves.push(mv.clone());
            }
            cur = node.parent.and_then(|p| self.get_node(p));
        }
        moves.reverse();
        moves
    }

    /// Replay `moves` from the root, following the first matching child.
    pub fn resolve(&self, moves: &[Move]) -> Resolution {
        let mut cur = self.root_id;
        for (matched, mv) in moves.iter().enumerate() {
            match self.child_with_move(cur, mv) {
                Some(next) => cur = next,
                None => return Resolution::Partial { deepest: cur, matched },
            }
        }
        Resolution::Full(cur)
    }

    /// Detach a node and all its descendants. Removing the root is a no-op.
    pub fn remove_subtree(&mut self, id: NodeId) {
        self.remove_subtrees(&[id]);
    }

    /// Detach several subtrees with a single index rebuild.
    pub fn remove_subtrees(&mut self, ids: &[NodeId]) {
        let mut to_remove: HashSet<NodeId> = HashSet::new();
        for &id in ids {
            if id == self.root_id || to_remove.contains(&id) {
                continue;
            }
            if let Some(parent_id) = self.parent_of(id) {
                if let Some(parent) = self.get_node_mut(parent_id) {
                    parent.children.retain(|&c| c != id);
                }
            }
            to_remove.extend(self.collect_subtree(id));
        }
        if to_remove.is_empty() {
            return;
        }

        self.nodes.retain(|n| !to_remove.contains(&n.id));
        self.index.clear();
        for (idx, node) in self.nodes.iter().enumerate() {
            self.index.insert(node.id, idx);
        }
    }

    /// IDs of `id` and every descendant, pre-order.
    pub fn collect_subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            if let Some(node) = self.get_node(cur) {
                result.push(cur);
                stack.extend(node.children.iter().rev());
            }
        }
        result
    }

    /// Drop every comment and NAG.
    pub fn strip_annotations(&mut self) {
        for node in &mut self.nodes {
            node.comment = None;
            node.nags.clear();
        }
    }

    /// Structural hash of a subtree (FNV-1a) over moves, comments and NAGs.
    pub fn subtree_hash(&self, id: NodeId) -> u64 {
        let mut h: u64 = 0xcbf29ce484222325;
        for node_id in self.collect_subtree(id) {
            let Some(node) = self.get_node(node_id) else { continue };
            let mv = node.mv.as_ref().map_or("", Move::as_str);
            fnv(&mut h, mv.as_bytes());
            fnv(&mut h, &[0xfe, node.children.len() as u8]);
            if let Some(comment) = &node.comment {
                fnv(&mut h, comment.as_bytes());
            }
            fnv(&mut h, &[0xff]);
            for &nag in &node.nags {
                fnv(&mut h, &[nag]);
            }
        }
        h
    }
}

fn fnv(h: &mut u64, bytes: &[u8]) {
    for &b in bytes {
        *h ^= b as u64;
        *h = h.wrapping_mul(0x100000001b3);
    }
}

// ── Game ───────────────────────────────────────────────────────────────

/// One game: ordered headers plus its variation tree.
#[derive(Debug, Clone, Default)]
pub struct Game {
    headers: Vec<(String, String)>,
    pub tree: VariationTree,
}

impl Game {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tree(tree: VariationTree) -> Self {
        Self {
            headers: Vec::new(),
            tree,
        }
    }

    /// Same headers as `self`, different tree.
    pub fn derive(&self, tree: VariationTree) -> Self {
        Self {
            headers: self.headers.clone(),
            tree,
        }
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set a header, keeping its position if it already exists.
    pub fn set_header(&mut self, key: &str, value: &str) {
        match self.headers.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = String::from(value),
            None => self.headers.push((String::from(key), String::from(value))),
        }
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn retain_headers(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.headers.retain(|(k, _)| keep(k));
    }
}
