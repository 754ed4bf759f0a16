//! PGN reader and writer
//!
//! Structural only: tag pairs, movetext, `{}`/`;` comments, `$n` NAGs,
//! `!`/`?` glyphs and nested `( ... )` variations. Move tokens are checked
//! for SAN shape; legality is never evaluated.
//!
//! Sibling lines that repeat an existing move are merged into that node,
//! so every path in a parsed tree is unique.
//!
//! Author: Moroya Sakamoto

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{CurateError, Result};
use crate::tree::{Game, Move, Nag, NodeId, VariationTree};

/// Output line width for movetext
const LINE_WIDTH: usize = 80;

const RESULTS: [&str; 4] = ["1-0", "0-1", "1/2-1/2", "*"];

// ── Lexer ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Tag(String, String),
    Comment(String),
    Open,
    Close,
    Nag(Nag),
    Number,
    Move(Move, Option<Nag>),
    Result(String),
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0, line: 1 }
    }

    fn bytes(&self) -> &'a [u8] {
        self.src.as_bytes()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes().get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
        }
        Some(b)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.bump();
        }
    }

    fn at_line_start(&self) -> bool {
        self.pos == 0 || self.bytes()[self.pos - 1] == b'\n'
    }

    /// Consume up to (not including) the next newline.
    fn take_line(&mut self) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(|b| b != b'\n') {
            self.pos += 1;
        }
        &self.src[start..self.pos]
    }

    fn next_token(&mut self) -> Result<Option<(usize, Token)>> {
        loop {
            self.skip_whitespace();
            let Some(b) = self.peek() else {
                return Ok(None);
            };
            let line = self.line;
            let token = match b {
                b'%' if self.at_line_start() => {
                    self.take_line();
                    continue;
                }
                b';' => {
                    self.pos += 1;
                    Token::Comment(self.take_line().trim().to_string())
                }
                b'{' => {
                    self.pos += 1;
                    let start = self.pos;
                    while self.peek().is_some_and(|b| b != b'}') {
                        self.bump();
                    }
                    if self.peek().is_none() {
                        return Err(CurateError::parse(line, "unterminated `{` comment"));
                    }
                    let text = self.src[start..self.pos].trim().to_string();
                    self.pos += 1;
                    Token::Comment(text)
                }
                b'[' => self.tag(line)?,
                b'(' => {
                    self.pos += 1;
                    Token::Open
                }
                b')' => {
                    self.pos += 1;
                    Token::Close
                }
                b'$' => {
                    self.pos += 1;
                    let digits = self.word();
                    let nag = digits
                        .parse::<Nag>()
                        .map_err(|_| CurateError::parse(line, format!("invalid NAG `${digits}`")))?;
                    Token::Nag(nag)
                }
                _ => {
                    let word = self.word();
                    if word.is_empty() {
                        return Err(CurateError::parse(
                            line,
                            format!("unexpected character `{}`", b as char),
                        ));
                    }
                    classify(word, line)?
                }
            };
            return Ok(Some((line, token)));
        }
    }

    fn word(&mut self) -> &'a str {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| !b.is_ascii_whitespace() && !b"(){}[];$".contains(&b))
        {
            self.pos += 1;
        }
        &self.src[start..self.pos]
    }

    /// `[Name "value"]` with `\"` and `\\` escapes.
    fn tag(&mut self, line: usize) -> Result<Token> {
        self.pos += 1;
        self.skip_whitespace();
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            self.pos += 1;
        }
        let name = self.src[start..self.pos].to_string();
        if name.is_empty() {
            return Err(CurateError::parse(line, "tag without a name"));
        }
        self.skip_whitespace();
        if self.bump() != Some(b'"') {
            return Err(CurateError::parse(line, format!("tag `{name}` has no quoted value")));
        }

        let mut value = String::new();
        let mut seg = self.pos;
        loop {
            match self.peek() {
                None | Some(b'\n') => {
                    return Err(CurateError::parse(line, format!("unterminated value for tag `{name}`")));
                }
                Some(b'"') => break,
                Some(b'\\') => {
                    value.push_str(&self.src[seg..self.pos]);
                    self.pos += 1;
                    seg = self.pos;
                    if self.peek().is_some_and(|b| b == b'"' || b == b'\\') {
                        self.pos += 1;
                    }
                }
                Some(_) => self.pos += 1,
            }
        }
        value.push_str(&self.src[seg..self.pos]);
        self.pos += 1;

        self.skip_whitespace();
        if self.bump() != Some(b']') {
            return Err(CurateError::parse(line, format!("tag `{name}` is not closed")));
        }
        Ok(Token::Tag(name, value))
    }
}

fn classify(word: &str, line: usize) -> Result<Token> {
    if RESULTS.contains(&word) {
        return Ok(Token::Result(word.to_string()));
    }
    let digits = word.bytes().take_while(u8::is_ascii_digit).count();
    let rest = if digits > 0 && word[digits..].starts_with('.') {
        word[digits..].trim_start_matches('.')
    } else if digits == word.len() || word.bytes().all(|b| b == b'.') {
        ""
    } else {
        word
    };
    if rest.is_empty() {
        return Ok(Token::Number);
    }
    let (mv, nag) = Move::parse_annotated(rest).map_err(|e| match e {
        CurateError::Parse { message, .. } => CurateError::Parse { line, message },
        other => other,
    })?;
    Ok(Token::Move(mv, nag))
}

// ── Reader ─────────────────────────────────────────────────────────────

/// Accumulates one game while tokens arrive.
struct GameBuilder {
    game: Game,
    cur: NodeId,
    stack: Vec<NodeId>,
    movetext: bool,
    /// Comment read right after `(`, waiting for the variation's first move
    pending: Option<String>,
    after_open: bool,
}

impl GameBuilder {
    fn new() -> Self {
        let game = Game::new();
        let cur = game.tree.root_id();
        Self {
            game,
            cur,
            stack: Vec::new(),
            movetext: false,
            pending: None,
            after_open: false,
        }
    }

    fn is_blank(&self) -> bool {
        !self.movetext && self.game.headers().is_empty()
    }

    fn push(&mut self, line: usize, token: Token) -> Result<()> {
        let tree = &mut self.game.tree;
        let root = tree.root_id();
        match token {
            Token::Move(mv, nag) => {
                let (id, _) = tree.ensure_child(self.cur, &mv);
                if let (Some(nag), Some(node)) = (nag, tree.get_node_mut(id)) {
                    node.nags.insert(nag);
                }
                if let Some(text) = self.pending.take() {
                    append_comment(tree, id, text);
                }
                self.cur = id;
                self.movetext = true;
                self.after_open = false;
            }
            Token::Comment(text) => {
                self.movetext = true;
                if text.is_empty() {
                    return Ok(());
                }
                if self.after_open {
                    match &mut self.pending {
                        Some(existing) => {
                            existing.push(' ');
                            existing.push_str(&text);
                        }
                        None => self.pending = Some(text),
                    }
                } else {
                    append_comment(tree, self.cur, text);
                }
            }
            Token::Nag(nag) => {
                if self.cur == root {
                    return Err(CurateError::parse(line, format!("NAG ${nag} before the first move")));
                }
                if let Some(node) = tree.get_node_mut(self.cur) {
                    node.nags.insert(nag);
                }
            }
            Token::Open => {
                let parent = tree
                    .parent_of(self.cur)
                    .ok_or_else(|| CurateError::parse(line, "variation opened before any move"))?;
                self.stack.push(self.cur);
                self.cur = parent;
                self.after_open = true;
            }
            Token::Close => {
                self.cur = self
                    .stack
                    .pop()
                    .ok_or_else(|| CurateError::parse(line, "unmatched `)`"))?;
                self.after_open = false;
                // A variation holding only a comment annotates the move it follows.
                if let Some(text) = self.pending.take() {
                    append_comment(tree, self.cur, text);
                }
            }
            Token::Number => {}
            Token::Tag(..) | Token::Result(_) => {
                unreachable!("tags and results are handled by read_games")
            }
        }
        Ok(())
    }

    fn finish(self, line: usize, result: Option<&str>) -> Result<Game> {
        if !self.stack.is_empty() {
            return Err(CurateError::parse(
                line,
                format!("{} variation(s) left open", self.stack.len()),
            ));
        }
        let mut game = self.game;
        if let Some(result) = result {
            if game.header("Result").is_none() {
                game.set_header("Result", result);
            }
        }
        Ok(game)
    }
}

fn append_comment(tree: &mut VariationTree, id: NodeId, text: String) {
    if let Some(node) = tree.get_node_mut(id) {
        match &mut node.comment {
            Some(existing) => {
                existing.push(' ');
                existing.push_str(&text);
            }
            None => node.comment = Some(text),
        }
    }
}

/// Parse every game in a PGN document.
pub fn read_games(text: &str) -> Result<Vec<Game>> {
    let mut lexer = Lexer::new(text);
    let mut games = Vec::new();
    let mut builder = GameBuilder::new();

    while let Some((line, token)) = lexer.next_token()? {
        match token {
            Token::Tag(name, value) => {
                if builder.movetext {
                    let done = std::mem::replace(&mut builder, GameBuilder::new());
                    games.push(done.finish(line, None)?);
                }
                builder.game.set_header(&name, &value);
            }
            Token::Result(result) => {
                if !builder.stack.is_empty() {
                    return Err(CurateError::parse(line, "game result inside a variation"));
                }
                let done = std::mem::replace(&mut builder, GameBuilder::new());
                games.push(done.finish(line, Some(&result))?);
            }
            other => builder.push(line, other)?,
        }
    }
    if !builder.is_blank() {
        games.push(builder.finish(lexer.line, None)?);
    }
    debug!(games = games.len(), "pgn parsed");
    Ok(games)
}

/// Read and parse a PGN file. Non-UTF-8 bytes are replaced, not rejected.
pub fn load(path: &Path) -> Result<Vec<Game>> {
    let bytes = fs::read(path)?;
    read_games(&String::from_utf8_lossy(&bytes))
}

// ── Writer ─────────────────────────────────────────────────────────────

/// Movetext tokens with `(`/`)` glued to their neighbours.
#[derive(Default)]
struct Movetext {
    tokens: Vec<String>,
    glue: bool,
}

impl Movetext {
    fn push(&mut self, token: String) {
        match self.tokens.last_mut() {
            Some(last) if self.glue => last.push_str(&token),
            _ => self.tokens.push(token),
        }
        self.glue = false;
    }

    fn open(&mut self) {
        self.tokens.push(String::from("("));
        self.glue = true;
    }

    fn close(&mut self) {
        match self.tokens.last_mut() {
            Some(last) => last.push(')'),
            None => self.tokens.push(String::from(")")),
        }
    }
}

fn write_move(game: &Game, id: NodeId, ply: usize, numbered: bool, out: &mut Movetext) {
    let Some(node) = game.tree.get_node(id) else {
        return;
    };
    if ply % 2 == 0 {
        out.push(format!("{}.", ply / 2 + 1));
    } else if numbered {
        out.push(format!("{}...", ply / 2 + 1));
    }
    if let Some(mv) = &node.mv {
        out.push(mv.to_string());
    }
    for nag in &node.nags {
        out.push(format!("${nag}"));
    }
    if let Some(comment) = &node.comment {
        out.push(format!("{{{}}}", comment.replace('}', "")));
    }
}

/// Mainline first, alternatives in parentheses after the main move.
fn write_line(game: &Game, parent: NodeId, ply: usize, numbered: bool, out: &mut Movetext) {
    let tree = &game.tree;
    let children = tree.children(parent);
    let Some((&main, alternatives)) = children.split_first() else {
        return;
    };

    write_move(game, main, ply, numbered, out);
    for &alt in alternatives {
        out.open();
        write_move(game, alt, ply, true, out);
        write_line(game, alt, ply + 1, has_comment(game, alt), out);
        out.close();
    }
    let renumber = !alternatives.is_empty() || has_comment(game, main);
    write_line(game, main, ply + 1, renumber, out);
}

fn has_comment(game: &Game, id: NodeId) -> bool {
    game.tree.get_node(id).is_some_and(|n| n.comment.is_some())
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Render one game: tag pairs, blank line, wrapped movetext ending in the result.
pub fn write_game(game: &Game) -> String {
    let mut out = String::new();
    for (key, value) in game.headers() {
        out.push_str(&format!("[{key} \"{}\"]\n", escape(value)));
    }
    if !game.headers().is_empty() {
        out.push('\n');
    }

    let mut movetext = Movetext::default();
    let root = game.tree.root_id();
    if let Some(comment) = game.tree.get_node(root).and_then(|n| n.comment.as_ref()) {
        movetext.push(format!("{{{}}}", comment.replace('}', "")));
    }
    write_line(game, root, 0, true, &mut movetext);
    movetext.push(game.header("Result").unwrap_or("*").to_string());

    let mut width = 0;
    for token in &movetext.tokens {
        if width > 0 && width + 1 + token.len() > LINE_WIDTH {
            out.push('\n');
            width = 0;
        } else if width > 0 {
            out.push(' ');
            width += 1;
        }
        out.push_str(token);
        width += token.len();
    }
    out.push('\n');
    out
}

/// Render games separated by blank lines.
pub fn write_games(games: &[Game]) -> String {
    let mut out = String::new();
    for game in games {
        out.push_str(&write_game(game));
        out.push('\n');
    }
    out
}
