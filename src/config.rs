//! Curation configuration (TOML)
//!
//! One file describes a source PGN, an output prefix, and one block per
//! repertoire color. Each color block selects games either in detail
//! (`[[configs.games]]`) or with a range shorthand (`skip`/`include`),
//! and may mix both: detailed entries override the shorthand for their
//! index.
//!
//! ```toml
//! name = "Club repertoire"
//! source = "openings.pgn"
//! output = "club"
//!
//! [[configs]]
//! color = "white"
//! skip = "3,5-7"
//!
//! [[configs.games]]
//! index = 1
//! action = "include"
//! remove_variations = [{ moves = "1.e4 e5 2.Bc4" }]
//! ```
//!
//! Author: Moroya Sakamoto

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{CurateError, Result};
use crate::filter::{FilterEntry, Instructions};
use crate::variation::VariationPath;

// ── Color ──────────────────────────────────────────────────────────────

/// Repertoire side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::White => "white",
            Self::Black => "black",
        }
    }

    /// Ply limit for a repertoire `depth` full moves deep. White gets one
    /// extra ply so its repertoire ends on its own move.
    pub fn max_depth(self, depth: usize) -> usize {
        match self {
            Self::White => 2 * depth + 1,
            Self::Black => 2 * depth,
        }
    }

    /// Header naming the repertoire owner's side.
    pub fn name_header(self) -> &'static str {
        match self {
            Self::White => "White",
            Self::Black => "Black",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Color {
    type Err = CurateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "white" | "w" => Ok(Self::White),
            "black" | "b" => Ok(Self::Black),
            other => Err(CurateError::config(format!(
                "unknown color `{other}` (expected white or black)"
            ))),
        }
    }
}

// ── Schema ─────────────────────────────────────────────────────────────

/// Top-level configuration document.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub name: String,
    pub version: Option<String>,
    pub created: Option<String>,
    pub description: Option<String>,
    /// Source PGN, relative to the working directory
    pub source: PathBuf,
    /// Output file prefix; files are `{output}_{color}_{depth}.pgn`
    pub output: String,
    pub configs: Vec<ColorConfig>,
}

/// Per-color block (`[[configs]]`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColorConfig {
    pub color: Color,
    #[serde(default)]
    pub settings: Settings,
    /// Detailed per-game selection
    pub games: Option<Vec<GameConfig>>,
    /// Range shorthand: these games are skipped, all others included
    pub skip: Option<String>,
    /// Range shorthand: only these games are included
    pub include: Option<String>,
}

/// Per-color settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Settings {
    /// Drop variations shorter than this many plies
    pub min_depth: usize,
    pub preserve_comments: bool,
    pub preserve_headers: bool,
    /// Stamp a `Curator` header on the first game of each output file
    pub add_curation_comment: bool,
    pub remove_empty_games: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            min_depth: 0,
            preserve_comments: true,
            preserve_headers: true,
            add_curation_comment: true,
            remove_empty_games: false,
        }
    }
}

/// What the builder does with one source game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    #[default]
    Include,
    Skip,
    /// Emit the headers with an empty move tree
    SkipKeepHeaders,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Include => "include",
            Self::Skip => "skip",
            Self::SkipKeepHeaders => "skip_keep_headers",
        }
    }
}

/// One move-sequence filter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariationFilter {
    pub moves: String,
    pub reason: Option<String>,
    pub depth: Option<usize>,
}

impl VariationFilter {
    pub fn new(moves: impl Into<String>) -> Self {
        Self {
            moves: moves.into(),
            reason: None,
            depth: None,
        }
    }

    pub fn to_entry(&self) -> Result<FilterEntry> {
        let mut entry = FilterEntry::new(VariationPath::parse(&self.moves)?);
        entry.reason = self.reason.clone();
        entry.depth = self.depth;
        Ok(entry)
    }
}

/// Detailed configuration of one source game (`[[configs.games]]`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GameConfig {
    /// 1-based index in the source
    pub index: usize,
    #[serde(default)]
    pub action: Action,
    pub name: Option<String>,
    pub remove_variations: Option<Vec<VariationFilter>>,
    pub add_variations: Option<Vec<VariationFilter>>,
    /// Legacy spelling of `remove_variations`
    pub skip_variations: Option<Vec<VariationFilter>>,
    /// Legacy spelling of `add_variations`
    pub keep_variations: Option<Vec<VariationFilter>>,
    /// Ply limit overriding the color's computed depth
    pub max_depth: Option<usize>,
    /// Overrides `settings.min_depth`
    pub min_depth: Option<usize>,
}

impl GameConfig {
    pub fn new(index: usize, action: Action) -> Self {
        Self {
            index,
            action,
            name: None,
            remove_variations: None,
            add_variations: None,
            skip_variations: None,
            keep_variations: None,
            max_depth: None,
            min_depth: None,
        }
    }

    fn uses_legacy(&self) -> bool {
        self.skip_variations.is_some() || self.keep_variations.is_some()
    }

    fn uses_current(&self) -> bool {
        self.remove_variations.is_some() || self.add_variations.is_some()
    }

    /// All filters of the game, current and legacy.
    fn filters(&self) -> impl Iterator<Item = &VariationFilter> {
        [
            &self.remove_variations,
            &self.add_variations,
            &self.skip_variations,
            &self.keep_variations,
        ]
        .into_iter()
        .flatten()
        .flatten()
    }

    /// Remove/add instructions for this game, legacy filters mapped onto
    /// current ones. Mixing the two styles is an error for this game.
    pub fn instructions(&self) -> Result<Instructions> {
        if self.uses_legacy() && self.uses_current() {
            return Err(CurateError::ConflictingInstruction { index: self.index });
        }
        let (remove, add) = if self.uses_legacy() {
            (&self.skip_variations, &self.keep_variations)
        } else {
            (&self.remove_variations, &self.add_variations)
        };
        let entries = |filters: &Option<Vec<VariationFilter>>| -> Result<Vec<FilterEntry>> {
            filters
                .iter()
                .flatten()
                .map(VariationFilter::to_entry)
                .collect()
        };
        Ok(Instructions {
            remove: entries(remove)?,
            add: entries(add)?,
            ..Instructions::default()
        })
    }

    pub fn filter_counts(&self) -> (usize, usize) {
        let len = |f: &Option<Vec<VariationFilter>>| f.as_ref().map_or(0, Vec::len);
        (
            len(&self.remove_variations) + len(&self.skip_variations),
            len(&self.add_variations) + len(&self.keep_variations),
        )
    }
}

// ── Range shorthand ────────────────────────────────────────────────────

/// Parse `"1,3,5-10,20"` into a set of indices. Ranges are inclusive.
pub fn parse_range(ranges: &str) -> Result<BTreeSet<usize>> {
    let mut result = BTreeSet::new();
    for part in ranges.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let number = |s: &str| {
            s.trim()
                .parse::<usize>()
                .map_err(|_| CurateError::config(format!("invalid number `{}` in range `{ranges}`", s.trim())))
        };
        match part.split_once('-') {
            Some((start, end)) => {
                let (start, end) = (number(start)?, number(end)?);
                if start > end {
                    return Err(CurateError::config(format!(
                        "invalid range {start}-{end}: start must not exceed end"
                    )));
                }
                result.extend(start..=end);
            }
            None => {
                result.insert(number(part)?);
            }
        }
    }
    Ok(result)
}

// ── Loading and validation ─────────────────────────────────────────────

impl Config {
    /// Parse and validate a TOML document. File-system checks are left to
    /// [`Config::load`].
    pub fn parse(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| CurateError::config(e.to_string().trim_end()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file, then check that the source
    /// exists and the output directory is present.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let with_path = |e: CurateError| match e {
            CurateError::Config { message, .. } => CurateError::Config {
                path: Some(path.to_path_buf()),
                message,
            },
            other => other,
        };

        let config = Self::parse(&text).map_err(with_path)?;
        if !config.source.is_file() {
            return Err(with_path(CurateError::config(format!(
                "source file not found: {}",
                config.source.display()
            ))));
        }
        if let Some(dir) = Path::new(&config.output).parent() {
            if !dir.as_os_str().is_empty() && !dir.is_dir() {
                return Err(with_path(CurateError::config(format!(
                    "output directory does not exist: {}",
                    dir.display()
                ))));
            }
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.extension().and_then(|e| e.to_str()) != Some("pgn") {
            return Err(CurateError::config(format!(
                "source must be a .pgn file: {}",
                self.source.display()
            )));
        }
        if self.output.trim().is_empty() {
            return Err(CurateError::config("output prefix is empty"));
        }
        if self.configs.is_empty() {
            return Err(CurateError::config("at least one [[configs]] block is required"));
        }
        let mut colors = HashSet::new();
        for color_config in &self.configs {
            if !colors.insert(color_config.color) {
                return Err(CurateError::config(format!(
                    "duplicate configuration for {}",
                    color_config.color
                )));
            }
            color_config.validate()?;
        }
        Ok(())
    }

    pub fn color(&self, color: Color) -> Option<&ColorConfig> {
        self.configs.iter().find(|c| c.color == color)
    }
}

impl ColorConfig {
    fn validate(&self) -> Result<()> {
        let color = self.color;
        if self.games.is_none() && self.skip.is_none() && self.include.is_none() {
            return Err(CurateError::config(format!(
                "{color}: one of `games`, `skip` or `include` is required"
            )));
        }
        if self.skip.is_some() && self.include.is_some() {
            return Err(CurateError::config(format!(
                "{color}: `skip` and `include` cannot both be set"
            )));
        }
        for (key, range) in [("skip", &self.skip), ("include", &self.include)] {
            if let Some(range) = range {
                parse_range(range).map_err(|e| {
                    CurateError::config(format!("{color}: invalid `{key}`: {}", message_of(&e)))
                })?;
            }
        }

        let mut seen = HashSet::new();
        for game in self.games.iter().flatten() {
            let index = game.index;
            if index == 0 {
                return Err(CurateError::config(format!("{color}: game index must be >= 1")));
            }
            if !seen.insert(index) {
                return Err(CurateError::config(format!(
                    "{color}: game {index} is configured twice"
                )));
            }
            if game.max_depth == Some(0) {
                return Err(CurateError::config(format!(
                    "{color}: game {index}: max_depth must be >= 1"
                )));
            }
            for filter in game.filters() {
                if filter.moves.trim().is_empty() {
                    return Err(CurateError::config(format!(
                        "{color}: game {index}: move sequence cannot be empty"
                    )));
                }
                VariationPath::parse(&filter.moves).map_err(|e| {
                    CurateError::config(format!("{color}: game {index}: {}", message_of(&e)))
                })?;
            }
        }
        Ok(())
    }

    /// Per-game plan for a source of `total` games, ordered by index.
    ///
    /// Without shorthand the detailed list is returned as written. With
    /// shorthand every source game gets an entry; detailed entries win.
    pub fn plan(&self, total: usize) -> Result<Vec<GameConfig>> {
        let detailed = self.games.clone().unwrap_or_default();
        let (listed, listed_means_skip) = match (&self.skip, &self.include) {
            (Some(skip), _) => (parse_range(skip)?, true),
            (None, Some(include)) => (parse_range(include)?, false),
            (None, None) => return Ok(detailed),
        };

        Ok((1..=total)
            .map(|index| {
                detailed
                    .iter()
                    .find(|g| g.index == index)
                    .cloned()
                    .unwrap_or_else(|| {
                        let action = if listed.contains(&index) == listed_means_skip {
                            Action::Skip
                        } else {
                            Action::Include
                        };
                        GameConfig::new(index, action)
                    })
            })
            .collect())
    }

    /// Games that mix legacy and current filter styles.
    pub fn conflicting_games(&self) -> Vec<usize> {
        self.games
            .iter()
            .flatten()
            .filter(|g| g.uses_legacy() && g.uses_current())
            .map(|g| g.index)
            .collect()
    }
}

fn message_of(e: &CurateError) -> String {
    match e {
        CurateError::Config { message, .. } | CurateError::Parse { message, .. } => message.clone(),
        other => other.to_string(),
    }
}
