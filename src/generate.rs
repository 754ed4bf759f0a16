//! Config generation
//!
//! Renders TOML that [`crate::config::Config::parse`] accepts: a
//! replication config from comparator output, and a starter config that
//! includes every game of a source file. Output is hand-formatted so each
//! game block can carry its diff statistics as comments.
//!
//! Author: Moroya Sakamoto

use std::fmt::Write as _;
use std::path::Path;

use crate::compare::GameComparison;
use crate::config::Color;
use crate::inspect::count_variations;
use crate::tree::Game;
use crate::variation::VariationPath;

fn quote(s: &str) -> String {
    toml::Value::String(s.to_owned()).to_string()
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map_or_else(|| String::from("source"), |s| s.to_string_lossy().into_owned())
}

fn preamble(out: &mut String, name: &str, description: &str, source: &Path, output: &str) {
    let _ = writeln!(out, "# {name}");
    let _ = writeln!(out, "# {description}");
    out.push('\n');
    let _ = writeln!(out, "name = {}", quote(name));
    let _ = writeln!(out, "description = {}", quote(description));
    let _ = writeln!(out, "source = {}", quote(&source.display().to_string()));
    let _ = writeln!(out, "output = {}", quote(output));
}

fn color_block(out: &mut String, color: Color, has_games: bool) {
    out.push('\n');
    out.push_str("[[configs]]\n");
    let _ = writeln!(out, "color = {}", quote(color.as_str()));
    if !has_games {
        out.push_str("games = []\n");
    }
    out.push_str("\n[configs.settings]\n");
    out.push_str("preserve_comments = true\n");
    out.push_str("add_curation_comment = true\n");
}

fn filter_list(out: &mut String, key: &str, paths: &[VariationPath]) {
    if paths.is_empty() {
        return;
    }
    let _ = writeln!(out, "{key} = [");
    for path in paths {
        let _ = writeln!(out, "  {{ moves = {} }},", quote(&path.to_string()));
    }
    out.push_str("]\n");
}

/// Config that reproduces the comparator's target from its baseline.
pub fn replication_config(
    comparisons: &[GameComparison],
    baseline: &Path,
    color: Color,
) -> String {
    let mut out = String::new();
    let name = format!("Replication config: {} -> target", stem(baseline));
    let output = format!("{}_replicated", stem(baseline));
    preamble(
        &mut out,
        &name,
        "Auto-generated from pgnc compare, edit as needed",
        baseline,
        &output,
    );
    color_block(&mut out, color, !comparisons.is_empty());

    for c in comparisons {
        let stats = &c.diff.stats;
        out.push('\n');
        let _ = writeln!(out, "# Game [{}]: {}", c.baseline_index, c.baseline_name);
        let _ = writeln!(
            out,
            "# Variations: {} -> {}",
            stats.baseline_variations, stats.target_variations
        );
        if !c.diff.remove.is_empty() {
            let _ = writeln!(out, "# Removed: {} ({} lines)", c.diff.remove.len(), stats.to_remove);
        }
        if !c.diff.add.is_empty() {
            let _ = writeln!(out, "# Added: {} ({} lines)", c.diff.add.len(), stats.to_add);
        }
        out.push_str("[[configs.games]]\n");
        let _ = writeln!(out, "index = {}", c.baseline_index);
        out.push_str("action = \"include\"\n");
        let _ = writeln!(out, "name = {}", quote(&c.baseline_name));
        filter_list(&mut out, "remove_variations", &c.diff.remove);
        filter_list(&mut out, "add_variations", &c.diff.add);
    }
    out
}

/// Config including every game of `games` unchanged.
pub fn starter_config(games: &[Game], source: &Path, color: Color) -> String {
    let mut out = String::new();
    let file_name = source
        .file_name()
        .map_or_else(|| stem(source), |s| s.to_string_lossy().into_owned());
    preamble(
        &mut out,
        &format!("Repertoire from {file_name}"),
        "Auto-generated starter config, edit as needed",
        source,
        &format!("{}_curated", stem(source)),
    );
    color_block(&mut out, color, !games.is_empty());

    for (i, game) in games.iter().enumerate() {
        let index = i + 1;
        let white = game
            .header("White")
            .map_or_else(|| format!("Game {index}"), String::from);
        out.push('\n');
        out.push_str("[[configs.games]]\n");
        let _ = writeln!(out, "index = {index}");
        out.push_str("action = \"include\"\n");
        let _ = writeln!(
            out,
            "name = {}",
            quote(&format!("{white} ({} variations)", count_variations(&game.tree)))
        );
    }
    out
}
