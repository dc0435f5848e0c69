//! Replay artifacts: summary JSON and CSV trade tables.
//!
//! A replay directory ends up holding:
//! - `summary.json`: the full `ReplaySummary`
//! - `trades.csv`: one row per closed trade
//! - `ticks.csv` / `events.csv`: written live by the CSV sinks when the
//!   replay was recorded

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::compare::CompareEntry;
use crate::replay::{CompletedTrade, ReplaySummary};

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_summary_json(summary: &ReplaySummary) -> Result<String> {
    serde_json::to_string_pretty(summary).context("failed to serialize ReplaySummary to JSON")
}

pub fn import_summary_json(json: &str) -> Result<ReplaySummary> {
    serde_json::from_str(json).context("failed to deserialize ReplaySummary from JSON")
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Columns: direction, entry_time, entry_price, exit_time, exit_price, size,
/// realized_pnl, reason, ticks_held, max_favorable, max_adverse
pub fn export_trades_csv(trades: &[CompletedTrade]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "direction",
        "entry_time",
        "entry_price",
        "exit_time",
        "exit_price",
        "size",
        "realized_pnl",
        "reason",
        "ticks_held",
        "max_favorable",
        "max_adverse",
    ])?;

    for t in trades {
        let p = &t.position;
        wtr.write_record([
            p.direction.as_str(),
            &p.entry_time.to_string(),
            &format!("{:.6}", p.entry_price),
            &t.exit_time.to_string(),
            &format!("{:.6}", p.exit_price),
            &p.size.to_string(),
            &format!("{:.6}", p.realized_pnl),
            p.reason.as_str(),
            &p.ticks_held.to_string(),
            &format!("{:.6}", p.max_favorable),
            &format!("{:.6}", p.max_adverse),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// One row per compared configuration, in the given order.
pub fn export_comparison_csv(entries: &[CompareEntry]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "name",
        "mode",
        "fingerprint",
        "ticks",
        "entries",
        "exits",
        "adds",
        "wins",
        "losses",
        "realized_pnl",
    ])?;
    for e in entries {
        let s = &e.summary;
        wtr.write_record([
            e.name.as_str(),
            s.mode.as_str(),
            &s.config_fingerprint,
            &s.ticks.to_string(),
            &s.entries.to_string(),
            &s.exits().to_string(),
            &s.adds.to_string(),
            &s.wins.to_string(),
            &s.losses.to_string(),
            &format!("{:.6}", s.realized_pnl),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Write `summary.json` and `trades.csv` into `output_dir`, creating it if
/// needed. Returns the directory.
pub fn save_artifacts(summary: &ReplaySummary, output_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;

    let summary_path = output_dir.join("summary.json");
    std::fs::write(&summary_path, export_summary_json(summary)?)
        .with_context(|| format!("failed to write {}", summary_path.display()))?;

    let trades_path = output_dir.join("trades.csv");
    std::fs::write(&trades_path, export_trades_csv(&summary.trades)?)
        .with_context(|| format!("failed to write {}", trades_path.display()))?;

    tracing::info!(dir = %output_dir.display(), trades = summary.trades.len(), "artifacts saved");
    Ok(output_dir.to_path_buf())
}
