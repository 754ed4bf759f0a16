//! Repertoire builder
//!
//! Applies a [`Config`] to a multi-game source: for every color block each
//! planned game is filtered, depth-limited and written to
//! `{output}_{color}_{depth}.pgn` (or one file per game when split).
//!
//! A game that fails (bad filter, conflicting styles, index past the end
//! of the source) is reported and skipped; its siblings and the other
//! color are still built.
//!
//! Author: Moroya Sakamoto

use std::fs;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::config::{Action, Color, ColorConfig, Config, GameConfig, Settings};
use crate::error::Result;
use crate::filter::{filter, prune_short, Unmatched};
use crate::inspect::{average_depth, count_variations};
use crate::pgn;
use crate::tree::{Game, VariationTree, SEVEN_TAG_ROSTER};

/// Default repertoire depth in full moves
pub const DEFAULT_DEPTH: usize = 10;

/// Value of the `Curator` header stamped on output files
pub fn curator_tag() -> String {
    format!("pgn-curator v{}", env!("CARGO_PKG_VERSION"))
}

/// What happened to one planned game
#[derive(Debug, Clone, PartialEq)]
pub enum GameOutcome {
    /// Filtered and written; remove entries that did not resolve are listed
    Included { unmatched: Vec<Unmatched> },
    /// Headers written with an empty move tree
    HeadersOnly,
    Skipped,
    /// Dropped by `remove_empty_games`
    Empty,
    /// Index past the end of the source
    OutOfRange,
    /// Processing error, message kept for the report
    Failed(String),
}

/// Per-game line of a build report
#[derive(Debug, Clone, PartialEq)]
pub struct GameReport {
    /// 1-based source index
    pub index: usize,
    pub name: String,
    /// Variations in the source game
    pub before: usize,
    /// Variations written
    pub after: usize,
    pub outcome: GameOutcome,
}

/// Result of building one color
#[derive(Debug, Clone, PartialEq)]
pub struct ColorReport {
    pub color: Color,
    pub games: Vec<GameReport>,
    pub output_games: usize,
    pub output_variations: usize,
    pub average_depth: f64,
    /// Files written (or that would be written on a dry run)
    pub files: Vec<PathBuf>,
    pub bytes: usize,
    /// Set when the color could not be built or written
    pub error: Option<String>,
}

impl ColorReport {
    fn failed(color: Color, error: String) -> Self {
        Self {
            color,
            games: Vec::new(),
            output_games: 0,
            output_variations: 0,
            average_depth: 0.0,
            files: Vec::new(),
            bytes: 0,
            error: Some(error),
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &GameReport> {
        self.games
            .iter()
            .filter(|g| matches!(g.outcome, GameOutcome::Failed(_) | GameOutcome::OutOfRange))
    }
}

/// Result of a full build
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BuildReport {
    pub input_games: usize,
    pub input_variations: usize,
    pub input_average_depth: f64,
    pub input_bytes: usize,
    pub colors: Vec<ColorReport>,
    pub dry_run: bool,
}

impl BuildReport {
    pub fn output_games(&self) -> usize {
        self.colors.iter().map(|c| c.output_games).sum()
    }

    pub fn output_variations(&self) -> usize {
        self.colors.iter().map(|c| c.output_variations).sum()
    }

    pub fn output_bytes(&self) -> usize {
        self.colors.iter().map(|c| c.bytes).sum()
    }

    /// True when no game or color failed
    pub fn is_clean(&self) -> bool {
        self.colors
            .iter()
            .all(|c| c.error.is_none() && c.failures().next().is_none())
    }
}

/// Configured build of one [`Config`].
pub struct Curator<'a> {
    config: &'a Config,
    depth: usize,
    dry_run: bool,
    split: bool,
    output: Option<String>,
}

impl<'a> Curator<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            depth: DEFAULT_DEPTH,
            dry_run: false,
            split: false,
            output: None,
        }
    }

    /// Repertoire depth in full moves
    pub fn depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    /// Plan file names without writing anything
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// One file per game
    pub fn split(mut self, split: bool) -> Self {
        self.split = split;
        self
    }

    /// Override the config's output prefix
    pub fn output(mut self, prefix: impl Into<String>) -> Self {
        self.output = Some(prefix.into());
        self
    }

    fn prefix(&self) -> &str {
        self.output.as_deref().unwrap_or(&self.config.output)
    }

    /// Read the source file and build every color.
    pub fn run(&self) -> Result<BuildReport> {
        let text = fs::read(&self.config.source)?;
        let games = pgn::read_games(&String::from_utf8_lossy(&text))?;
        info!(
            source = %self.config.source.display(),
            games = games.len(),
            "source loaded"
        );
        let mut report = self.build(&games)?;
        report.input_bytes = text.len();
        Ok(report)
    }

    /// Build every color from already parsed source games.
    pub fn build(&self, source: &[Game]) -> Result<BuildReport> {
        let input_variations = source.iter().map(|g| count_variations(&g.tree)).sum();
        let input_average_depth = mean(source.iter().map(|g| average_depth(&g.tree)));

        let mut colors = Vec::with_capacity(self.config.configs.len());
        for color_config in &self.config.configs {
            let color = color_config.color;
            match self.build_color(color_config, source) {
                Ok(report) => colors.push(report),
                Err(e) => {
                    warn!(%color, error = %e, "color build failed, continuing");
                    colors.push(ColorReport::failed(color, e.to_string()));
                }
            }
        }
        Ok(BuildReport {
            input_games: source.len(),
            input_variations,
            input_average_depth,
            input_bytes: 0,
            colors,
            dry_run: self.dry_run,
        })
    }

    fn build_color(&self, color_config: &ColorConfig, source: &[Game]) -> Result<ColorReport> {
        let color = color_config.color;
        let settings = &color_config.settings;
        let mut reports = Vec::new();
        let mut output: Vec<(usize, Game)> = Vec::new();

        for plan in color_config.plan(source.len())? {
            let index = plan.index;
            let Some(game) = index.checked_sub(1).and_then(|i| source.get(i)) else {
                warn!(%color, index, available = source.len(), "game index out of range, skipping");
                reports.push(GameReport {
                    index,
                    name: plan.name.clone().unwrap_or_else(|| format!("Game {index}")),
                    before: 0,
                    after: 0,
                    outcome: GameOutcome::OutOfRange,
                });
                continue;
            };

            let name = plan
                .name
                .clone()
                .or_else(|| game.header(color.name_header()).map(String::from))
                .unwrap_or_else(|| format!("Game {index}"));
            let before = count_variations(&game.tree);
            let mut report = GameReport {
                index,
                name,
                before,
                after: 0,
                outcome: GameOutcome::Skipped,
            };

            match curate_game(game, &plan, color, self.depth, settings) {
                Ok(None) => debug!(%color, index, "skipped"),
                Ok(Some((curated, unmatched))) => {
                    let after = count_variations(&curated.tree);
                    if plan.action == Action::SkipKeepHeaders {
                        report.outcome = GameOutcome::HeadersOnly;
                        output.push((index, curated));
                    } else if after == 0 && settings.remove_empty_games {
                        report.outcome = GameOutcome::Empty;
                        info!(%color, index, "no variations left, removed");
                    } else {
                        info!(%color, index, before, after, unmatched = unmatched.len(), "game curated");
                        report.after = after;
                        report.outcome = GameOutcome::Included { unmatched };
                        output.push((index, curated));
                    }
                }
                Err(e) => {
                    warn!(%color, index, error = %e, "game failed, skipping");
                    report.outcome = GameOutcome::Failed(e.to_string());
                }
            }
            reports.push(report);
        }

        let output_variations = output.iter().map(|(_, g)| count_variations(&g.tree)).sum();
        let average = mean(output.iter().map(|(_, g)| average_depth(&g.tree)));
        let (files, bytes, error) = match self.write(color, settings, output.clone()) {
            Ok((files, bytes)) => (files, bytes, None),
            Err(e) => {
                warn!(%color, error = %e, "output not written");
                (Vec::new(), 0, Some(e.to_string()))
            }
        };

        Ok(ColorReport {
            color,
            games: reports,
            output_games: output.len(),
            output_variations,
            average_depth: average,
            files,
            bytes,
            error,
        })
    }

    fn write(
        &self,
        color: Color,
        settings: &Settings,
        games: Vec<(usize, Game)>,
    ) -> Result<(Vec<PathBuf>, usize)> {
        let base = format!("{}_{}_{}", self.prefix(), color, self.depth);
        let batches: Vec<(PathBuf, Vec<Game>)> = if self.split {
            games
                .into_iter()
                .map(|(index, game)| (PathBuf::from(format!("{base}_{index}.pgn")), vec![game]))
                .collect()
        } else {
            vec![(
                PathBuf::from(format!("{base}.pgn")),
                games.into_iter().map(|(_, g)| g).collect(),
            )]
        };

        let mut files = Vec::new();
        let mut bytes = 0;
        for (path, mut batch) in batches {
            if settings.add_curation_comment {
                if let Some(first) = batch.first_mut() {
                    if first.header("Curator").is_none() {
                        first.set_header("Curator", &curator_tag());
                    }
                }
            }
            let text = pgn::write_games(&batch);
            if self.dry_run {
                info!(path = %path.display(), games = batch.len(), "dry run, not writing");
            } else {
                fs::write(&path, &text)?;
                info!(path = %path.display(), games = batch.len(), "written");
            }
            bytes += text.len();
            files.push(path);
        }
        Ok((files, bytes))
    }
}

/// Curate one source game. `Ok(None)` means the game is skipped.
///
/// Order: remove, add, depth trim, short-line pruning, then annotation
/// and header policy.
pub fn curate_game(
    source: &Game,
    plan: &GameConfig,
    color: Color,
    depth: usize,
    settings: &Settings,
) -> Result<Option<(Game, Vec<Unmatched>)>> {
    let (tree, unmatched) = match plan.action {
        Action::Skip => return Ok(None),
        Action::SkipKeepHeaders => (VariationTree::new(), Vec::new()),
        Action::Include => {
            let mut instructions = plan.instructions()?;
            instructions.max_depth = Some(plan.max_depth.unwrap_or_else(|| color.max_depth(depth)));
            let outcome = filter(&source.tree, &instructions)?;

            let min_depth = plan.min_depth.unwrap_or(settings.min_depth);
            let mut tree = if min_depth > 0 {
                prune_short(&outcome.tree, min_depth)
            } else {
                outcome.tree
            };
            if !settings.preserve_comments {
                tree.strip_annotations();
            }
            (tree, outcome.unmatched)
        }
    };

    let mut game = source.derive(tree);
    if !settings.preserve_headers {
        game.retain_headers(|k| SEVEN_TAG_ROSTER.contains(&k));
    }
    Ok(Some((game, unmatched)))
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}
