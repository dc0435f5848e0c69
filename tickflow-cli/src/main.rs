//! Tickflow CLI: replay, compare, config and weights commands.
//!
//! Commands:
//! - `replay`: run a recorded tick CSV through one configuration
//! - `compare`: run the same tape through several configurations in parallel
//! - `config`: print the resolved configuration and its fingerprint
//! - `weights show | set | reset`: manage the regression weights file
//!
//! Logging goes to stderr through `tracing`; `RUST_LOG` controls the filter
//! (default `info`) and `--json` switches to JSON lines.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tickflow_core::{EngineConfig, StrategyMode, WeightsProvider};
use tickflow_runner::export::export_comparison_csv;
use tickflow_runner::{
    compare, load_ticks_csv, ranked, run_replay, run_replay_recorded, save_artifacts, Candidate,
    ParamsStore, RecordOptions, ReplaySummary, DEFAULT_TICK_BUFFER,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tickflow", about = "Tickflow CLI: tick-driven position engine")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a tick CSV through one configuration.
    Replay {
        /// Tick CSV: timestamp,price,volume,<features...>
        #[arg(long)]
        ticks: PathBuf,

        /// TOML config file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Weights JSON, read in regression mode.
        #[arg(long, default_value = "weights.json")]
        weights: PathBuf,

        /// Write summary.json, trades.csv, ticks.csv and events.csv here.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Tick rows buffered before each write to ticks.csv.
        #[arg(long, default_value_t = DEFAULT_TICK_BUFFER)]
        tick_buffer: usize,
    },
    /// Replay one tick CSV through several configurations.
    Compare {
        #[arg(long)]
        ticks: PathBuf,

        /// Config files to compare (repeat the flag).
        #[arg(long = "config", required = true)]
        configs: Vec<PathBuf>,

        #[arg(long, default_value = "weights.json")]
        weights: PathBuf,

        /// Write the comparison table as CSV.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the resolved configuration and its fingerprint.
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Regression weights management.
    Weights {
        #[command(subcommand)]
        action: WeightsAction,
    },
}

#[derive(Subcommand)]
enum WeightsAction {
    /// Show the stored version and weights.
    Show {
        #[arg(long, default_value = "weights.json")]
        store: PathBuf,
    },
    /// Store a new weight set, e.g. `weights set calib rsi=0.1 adx=-0.05`.
    Set {
        version: String,

        /// name=value pairs.
        #[arg(required = true, value_parser = parse_weight)]
        weights: Vec<(String, f64)>,

        /// Keep the version exactly as given (no timestamp suffix).
        #[arg(long, default_value_t = false)]
        no_timestamp: bool,

        #[arg(long, default_value = "weights.json")]
        store: PathBuf,
    },
    /// Reset to the unversioned, empty state.
    Reset {
        #[arg(long, default_value = "weights.json")]
        store: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    match cli.command {
        Commands::Replay {
            ticks,
            config,
            weights,
            output_dir,
            tick_buffer,
        } => run_replay_cmd(&ticks, config.as_deref(), &weights, output_dir, tick_buffer),
        Commands::Compare {
            ticks,
            configs,
            weights,
            output,
        } => run_compare_cmd(&ticks, &configs, &weights, output.as_deref()),
        Commands::Config { config } => run_config_cmd(config.as_deref()),
        Commands::Weights { action } => match action {
            WeightsAction::Show { store } => run_weights_show(&store),
            WeightsAction::Set {
                version,
                weights,
                no_timestamp,
                store,
            } => run_weights_set(&store, &version, weights, !no_timestamp),
            WeightsAction::Reset { store } => run_weights_reset(&store),
        },
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    tracing::debug!(path = ?path, "loading config");
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

/// Open the weights store only when some config needs it.
fn weights_for(needed: bool, path: &Path) -> Option<ParamsStore> {
    needed.then(|| ParamsStore::open(path))
}

fn run_replay_cmd(
    ticks: &Path,
    config: Option<&Path>,
    weights: &Path,
    output_dir: Option<PathBuf>,
    tick_buffer: usize,
) -> Result<()> {
    let config = load_config(config)?;
    let stream = load_ticks_csv(ticks)
        .with_context(|| format!("failed to load ticks from {}", ticks.display()))?;
    let store = weights_for(config.mode == StrategyMode::RegressionBased, weights);
    let provider = store.as_ref().map(|s| s as &dyn WeightsProvider);

    let summary = match &output_dir {
        Some(dir) => {
            let record = RecordOptions {
                dir: dir.clone(),
                tick_buffer,
            };
            let summary = run_replay_recorded(&config, provider, &stream, &record)?;
            save_artifacts(&summary, dir)?;
            summary
        }
        None => run_replay(&config, provider, &stream)?,
    };

    print_summary(&summary);
    if let Some(dir) = output_dir {
        println!("  artifacts:   {}", dir.display());
    }
    Ok(())
}

fn print_summary(summary: &ReplaySummary) {
    println!("=== Replay ({}) ===", summary.mode);
    println!("  fingerprint: {}", summary.config_fingerprint);
    if let Some(version) = &summary.params_version {
        println!("  weights:     {version}");
    }
    println!("  ticks:       {}", summary.ticks);
    println!("  entries:     {}", summary.entries);
    println!("  adds:        {}", summary.adds);
    println!("  exits:       {}", summary.exits());
    for (reason, count) in &summary.exits_by_reason {
        println!("    {:<14} {count}", reason.as_str());
    }
    println!(
        "  wins/losses: {}/{}{}",
        summary.wins,
        summary.losses,
        summary
            .win_rate()
            .map(|r| format!(" ({:.1}%)", r * 100.0))
            .unwrap_or_default()
    );
    println!("  realized:    {:.4}", summary.realized_pnl);
    if summary.sink_errors > 0 {
        println!("  sink errors: {}", summary.sink_errors);
    }
}

fn run_compare_cmd(
    ticks: &Path,
    configs: &[PathBuf],
    weights: &Path,
    output: Option<&Path>,
) -> Result<()> {
    let mut candidates = Vec::with_capacity(configs.len());
    for path in configs {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        candidates.push(Candidate::new(name, load_config(Some(path))?));
    }
    let stream = load_ticks_csv(ticks)
        .with_context(|| format!("failed to load ticks from {}", ticks.display()))?;

    let needs_weights = candidates
        .iter()
        .any(|c| c.config.mode == StrategyMode::RegressionBased);
    let store = weights_for(needs_weights, weights);
    let provider = store.as_ref().map(|s| s as &dyn WeightsProvider);

    let entries = compare(&candidates, provider, &stream)?;

    println!(
        "{:<20} {:<17} {:>8} {:>8} {:>6} {:>12}",
        "name", "mode", "entries", "exits", "wins", "realized"
    );
    for entry in ranked(&entries) {
        let s = &entry.summary;
        println!(
            "{:<20} {:<17} {:>8} {:>8} {:>6} {:>12.4}",
            entry.name,
            s.mode.as_str(),
            s.entries,
            s.exits(),
            s.wins,
            s.realized_pnl
        );
    }

    if let Some(path) = output {
        std::fs::write(path, export_comparison_csv(&entries)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Saved comparison to {}", path.display());
    }
    Ok(())
}

fn run_config_cmd(config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    print!("{}", config.to_toml_string()?);
    println!("# fingerprint = \"{}\"", config.fingerprint()?);
    Ok(())
}

fn run_weights_show(store: &Path) -> Result<()> {
    let store = ParamsStore::open(store);
    let json = serde_json::to_string_pretty(store.current())
        .context("failed to serialize weights")?;
    println!("{json}");
    Ok(())
}

fn run_weights_set(
    store: &Path,
    version: &str,
    weights: Vec<(String, f64)>,
    auto_timestamp: bool,
) -> Result<()> {
    let weights: BTreeMap<String, f64> = weights.into_iter().collect();
    let mut store = ParamsStore::open(store);
    let (count, version) = {
        let saved = store.update(version, weights, auto_timestamp)?;
        (saved.weights.len(), saved.version.clone())
    };
    println!(
        "Saved {count} weights as version {version} to {}",
        store.path().display()
    );
    Ok(())
}

fn run_weights_reset(store: &Path) -> Result<()> {
    let mut store = ParamsStore::open(store);
    store.reset()?;
    println!("Reset {} to unversioned", store.path().display());
    Ok(())
}

fn parse_weight(raw: &str) -> Result<(String, f64)> {
    let Some((name, value)) = raw.split_once('=') else {
        bail!("expected name=value, got '{raw}'");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("empty weight name in '{raw}'");
    }
    let value: f64 = value
        .trim()
        .parse()
        .with_context(|| format!("invalid weight value in '{raw}'"))?;
    if !value.is_finite() {
        bail!("weight '{name}' must be finite");
    }
    Ok((name.to_string(), value))
}
