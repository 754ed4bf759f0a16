use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pgn_curator::compare::{compare_games, Selection};
use pgn_curator::config::{Color, Config};
use pgn_curator::curate::{BuildReport, Curator, GameOutcome, DEFAULT_DEPTH};
use pgn_curator::generate::{replication_config, starter_config};
use pgn_curator::inspect::{list_variations, opening_moves, CollectionSummary, GameSummary};
use pgn_curator::pgn;

/// Config-driven chess opening repertoire curation
///
/// Turn large PGN opening files into focused repertoires using declarative
/// TOML configs, and derive such configs by comparing two PGN files.
///
/// QUICK START:
///
///   pgnc init openings.pgn -o club.toml
///   # edit club.toml: skip games, remove or add lines
///   pgnc build club.toml --stats
#[derive(Parser)]
#[command(name = "pgnc")]
#[command(version, about)]
#[command(propagate_version = true)]
struct Cli {
    /// Show progress logs (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build curated PGN files from a config
    Build(BuildArgs),
    /// Validate a config file
    Validate {
        config: PathBuf,
    },
    /// Show structure and statistics of a PGN file
    Inspect {
        pgn: PathBuf,
        /// Details for one game (1-based)
        #[arg(long)]
        game: Option<usize>,
        /// List every variation of the selected game
        #[arg(long, requires = "game")]
        list_variations: bool,
    },
    /// Generate a starter config including every game
    Init {
        pgn: PathBuf,
        /// Config path [default: <pgn stem>_config.toml]
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, default_value = "white")]
        color: Color,
    },
    /// Compare two PGN files and derive a replication config
    Compare(CompareArgs),
}

#[derive(Args)]
struct BuildArgs {
    config: PathBuf,
    /// Preview without writing files
    #[arg(short = 'n', long)]
    dry_run: bool,
    /// Only report errors
    #[arg(short, long, conflicts_with = "stats")]
    quiet: bool,
    /// Print per-color and per-game statistics
    #[arg(long)]
    stats: bool,
    /// Override the output prefix from the config
    #[arg(short, long)]
    output: Option<String>,
    /// Repertoire depth in full moves
    #[arg(long, default_value_t = DEFAULT_DEPTH)]
    depth: usize,
    /// Write one file per game
    #[arg(long)]
    split: bool,
}

#[derive(Args)]
struct CompareArgs {
    /// Baseline PGN (the config source)
    baseline: PathBuf,
    /// Target PGN to reproduce
    target: PathBuf,
    /// Trim both sides to this color's repertoire depth before comparing
    #[arg(long)]
    color: Option<Color>,
    /// Repertoire depth in full moves, used with --color
    #[arg(long, default_value_t = DEFAULT_DEPTH)]
    depth: usize,
    /// Baseline game index (1-based), requires --game2
    #[arg(long, requires = "game2")]
    game1: Option<usize>,
    /// Target game index (1-based), requires --game1
    #[arg(long, requires = "game1")]
    game2: Option<usize>,
    /// Write a replication config here
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Build(args) => build(&args),
        Commands::Validate { config } => validate(&config),
        Commands::Inspect {
            pgn,
            game,
            list_variations,
        } => inspect(&pgn, game, list_variations),
        Commands::Init { pgn, output, color } => init(&pgn, output, color),
        Commands::Compare(args) => compare(&args),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_games(path: &Path) -> Result<Vec<pgn_curator::Game>> {
    pgn::load(path).with_context(|| format!("failed to read {}", path.display()))
}

// ── build ──────────────────────────────────────────────────────────────

fn build(args: &BuildArgs) -> Result<()> {
    let config = Config::load(&args.config)?;
    let mut curator = Curator::new(&config)
        .depth(args.depth)
        .dry_run(args.dry_run)
        .split(args.split);
    if let Some(prefix) = &args.output {
        curator = curator.output(prefix.clone());
    }

    if !args.quiet {
        println!("Config: {}", args.config.display());
        println!("Source: {}", config.source.display());
        if args.dry_run {
            println!("[DRY RUN]");
        }
    }

    let report = curator
        .run()
        .with_context(|| format!("build of {} failed", args.config.display()))?;

    for color in &report.colors {
        if let Some(error) = &color.error {
            eprintln!("error: {} repertoire not written: {error}", color.color);
        }
        for failed in color.failures() {
            eprintln!(
                "warning: {} game [{}] {}: {}",
                color.color,
                failed.index,
                failed.name,
                describe(&failed.outcome)
            );
        }
    }
    if args.stats {
        print_stats(&report);
    }
    if !args.quiet {
        let verb = if report.dry_run { "Would write" } else { "Wrote" };
        for color in &report.colors {
            for file in &color.files {
                println!("{verb} {}", file.display());
            }
        }
        println!(
            "{} game(s), {} variation(s)",
            report.output_games(),
            report.output_variations()
        );
    }
    Ok(())
}

fn describe(outcome: &GameOutcome) -> String {
    match outcome {
        GameOutcome::Included { unmatched } if unmatched.is_empty() => String::from("included"),
        GameOutcome::Included { unmatched } => {
            format!("included, {} unmatched remove filter(s)", unmatched.len())
        }
        GameOutcome::HeadersOnly => String::from("headers only"),
        GameOutcome::Skipped => String::from("skipped"),
        GameOutcome::Empty => String::from("removed (empty)"),
        GameOutcome::OutOfRange => String::from("index out of range"),
        GameOutcome::Failed(message) => format!("failed: {message}"),
    }
}

fn format_bytes(bytes: usize) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{size:.1}{unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1}TB")
}

fn print_stats(report: &BuildReport) {
    println!();
    println!("Input");
    println!("  {:<20} {:>10}", "Games", report.input_games);
    println!("  {:<20} {:>10}", "Variations", report.input_variations);
    println!("  {:<20} {:>10.1}", "Avg depth (plies)", report.input_average_depth);
    println!("  {:<20} {:>10}", "File size", format_bytes(report.input_bytes));

    for color in &report.colors {
        println!();
        println!("{} repertoire", color.color.as_str().to_uppercase());
        println!("  {:<20} {:>10}", "Games", color.output_games);
        println!("  {:<20} {:>10}", "Variations", color.output_variations);
        println!("  {:<20} {:>10.1}", "Avg depth (plies)", color.average_depth);
        println!("  {:<20} {:>10}", "Output size", format_bytes(color.bytes));
        println!("  {:<20} {:>10}", "Output files", color.files.len());
        println!();
        println!("  {:<6} {:<28} {:>7} {:>7}  {}", "Game", "Name", "Before", "After", "Outcome");
        for game in &color.games {
            println!(
                "  {:<6} {:<28} {:>7} {:>7}  {}",
                format!("[{}]", game.index),
                game.name,
                game.before,
                game.after,
                describe(&game.outcome)
            );
        }
    }

    println!();
    println!("Total");
    println!("  {:<20} {:>10}", "Games", report.output_games());
    println!("  {:<20} {:>10}", "Variations", report.output_variations());
    println!("  {:<20} {:>10}", "Size", format_bytes(report.output_bytes()));
}

// ── validate ───────────────────────────────────────────────────────────

fn validate(path: &Path) -> Result<()> {
    let config = Config::load(path).context("validation failed")?;
    println!("Config valid: {}", path.display());
    println!("  source: {}", config.source.display());
    println!("  output prefix: {}", config.output);
    println!("  {} color configuration(s)", config.configs.len());
    for color in &config.configs {
        println!();
        println!("  [{}]", color.color.as_str().to_uppercase());
        if let Some(skip) = &color.skip {
            println!("    skip shorthand: {skip}");
        }
        if let Some(include) = &color.include {
            println!("    include shorthand: {include}");
        }
        let games = color.games.as_deref().unwrap_or_default();
        if !games.is_empty() {
            println!("    {} game(s) with detailed config", games.len());
        }
        let (remove, add) = games.iter().fold((0, 0), |(r, a), g| {
            let (gr, ga) = g.filter_counts();
            (r + gr, a + ga)
        });
        if remove > 0 {
            println!("    {remove} remove filter(s)");
        }
        if add > 0 {
            println!("    {add} add filter(s)");
        }
        for index in color.conflicting_games() {
            println!("    warning: game {index} mixes legacy and current filters and will fail");
        }
    }
    Ok(())
}

// ── inspect ────────────────────────────────────────────────────────────

fn inspect(path: &Path, game: Option<usize>, list: bool) -> Result<()> {
    let games = load_games(path)?;
    println!("File: {}", path.display());
    if games.is_empty() {
        println!("No games found");
        return Ok(());
    }

    if let Some(index) = game {
        let Some(selected) = index.checked_sub(1).and_then(|i| games.get(i)) else {
            bail!(
                "game index {index} out of range (file has {} games, indices 1-{})",
                games.len(),
                games.len()
            );
        };
        let summary = GameSummary::of(selected, index);
        println!("Game [{index}]: {}", summary.name);
        println!("ECO: {}", summary.eco.as_deref().unwrap_or("?"));
        println!();
        println!("Headers:");
        for (key, value) in selected.headers() {
            println!("  {key}: {value}");
        }
        println!();
        println!("Variations: {}", summary.variations);
        println!("Average depth: {:.1} plies", summary.average_depth);
        println!("Max depth: {} plies", summary.max_depth);
        let opening = opening_moves(&selected.tree, 5);
        if !opening.is_empty() {
            println!("Opening moves: {opening}");
        }
        if list {
            println!();
            for (i, (line, depth)) in list_variations(&selected.tree).iter().enumerate() {
                println!("  {}. {line} (depth: {depth})", i + 1);
            }
        }
        return Ok(());
    }

    let summary = CollectionSummary::of(&games);
    for game in &summary.games {
        println!();
        println!("  [{}] {}", game.index, game.name);
        println!("      Variations: {}", game.variations);
        println!(
            "      Avg depth: {:.1} plies, max depth: {} plies",
            game.average_depth, game.max_depth
        );
        println!("      ECO: {}", game.eco.as_deref().unwrap_or("?"));
        if let Some(annotator) = &game.annotator {
            println!("      Annotator: {annotator}");
        }
    }
    println!();
    println!(
        "Total: {} game(s), {} variations",
        summary.games.len(),
        summary.total_variations
    );
    println!(
        "Average: {:.0} variations per game, {:.1} plies depth",
        summary.total_variations as f64 / summary.games.len() as f64,
        summary.average_depth
    );
    println!("Max depth: {} plies", summary.max_depth);
    Ok(())
}

// ── init ───────────────────────────────────────────────────────────────

fn init(path: &Path, output: Option<PathBuf>, color: Color) -> Result<()> {
    let games = load_games(path)?;
    let output = output.unwrap_or_else(|| {
        let stem = path
            .file_stem()
            .map_or_else(|| String::from("source"), |s| s.to_string_lossy().into_owned());
        PathBuf::from(format!("{stem}_config.toml"))
    });
    fs::write(&output, starter_config(&games, path, color))
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("Generated starter config: {}", output.display());
    println!("Then run: pgnc build {}", output.display());
    Ok(())
}

// ── compare ────────────────────────────────────────────────────────────

fn compare(args: &CompareArgs) -> Result<()> {
    let baseline = load_games(&args.baseline)?;
    let target = load_games(&args.target)?;
    let selection = match (args.game1, args.game2) {
        (Some(baseline), Some(target)) => Selection::Pair { baseline, target },
        (None, None) => Selection::Positional,
        _ => bail!("--game1 and --game2 must be given together"),
    };
    let max_depth = args.color.map(|c| c.max_depth(args.depth));

    let comparisons = compare_games(&baseline, &target, selection, max_depth)?;
    if comparisons.is_empty() {
        println!("No differences found");
    }
    for c in &comparisons {
        let stats = &c.diff.stats;
        println!(
            "Game [{}] {} vs [{}] {}: {} -> {} variations",
            c.baseline_index,
            c.baseline_name,
            c.target_index,
            c.target_name,
            stats.baseline_variations,
            stats.target_variations
        );
        for line in &c.diff.remove {
            println!("  - {line}");
        }
        for line in &c.diff.add {
            println!("  + {line}");
        }
    }

    if let Some(output) = &args.output {
        let color = args.color.unwrap_or(Color::White);
        fs::write(output, replication_config(&comparisons, &args.baseline, color))
            .with_context(|| format!("failed to write {}", output.display()))?;
        println!("Replication config written to {}", output.display());
    }
    Ok(())
}
