//! Replay driver: feeds a recorded tick stream through one processor.
//!
//! The driver owns the end-of-stream contract. It advances a `ManualClock` to
//! each tick's timestamp so the duration exit is reproducible, and when the
//! stream ends it force-closes any open position at the last tick's price.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tickflow_core::{
    ClosedPosition, ConfigError, EngineConfig, ExitReason, ManualClock, SinkError, StrategyMode,
    TickAction, TickProcessor, WeightsProvider,
};

use crate::data_loader::TickRow;
use crate::sinks::{CsvTickRecorder, CsvTradeLogger, DEFAULT_TICK_BUFFER};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("failed to create {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Where the CSV sinks write during a replay.
#[derive(Debug, Clone)]
pub struct RecordOptions {
    pub dir: PathBuf,
    pub tick_buffer: usize,
}

impl RecordOptions {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            tick_buffer: DEFAULT_TICK_BUFFER,
        }
    }

    pub fn ticks_path(&self) -> PathBuf {
        self.dir.join("ticks.csv")
    }

    pub fn events_path(&self) -> PathBuf {
        self.dir.join("events.csv")
    }
}

/// A closed position with the time it was closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedTrade {
    pub exit_time: NaiveDateTime,
    #[serde(flatten)]
    pub position: ClosedPosition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplaySummary {
    pub mode: StrategyMode,
    pub config_fingerprint: String,
    /// Weights version, regression mode only.
    pub params_version: Option<String>,
    pub ticks: u64,
    pub entries: u64,
    pub adds: u64,
    pub exits_by_reason: BTreeMap<ExitReason, u64>,
    /// Sum of per-unit realized PnL over all closed trades.
    pub realized_pnl: f64,
    pub wins: u64,
    pub losses: u64,
    pub sink_errors: u64,
    pub trades: Vec<CompletedTrade>,
}

impl ReplaySummary {
    fn empty(config: &EngineConfig, fingerprint: String, params_version: Option<String>) -> Self {
        Self {
            mode: config.mode,
            config_fingerprint: fingerprint,
            params_version,
            ticks: 0,
            entries: 0,
            adds: 0,
            exits_by_reason: BTreeMap::new(),
            realized_pnl: 0.0,
            wins: 0,
            losses: 0,
            sink_errors: 0,
            trades: Vec::new(),
        }
    }

    pub fn exits(&self) -> u64 {
        self.exits_by_reason.values().sum()
    }

    pub fn win_rate(&self) -> Option<f64> {
        let closed = self.trades.len();
        (closed > 0).then(|| self.wins as f64 / closed as f64)
    }

    fn record_close(&mut self, exit_time: NaiveDateTime, closed: ClosedPosition) {
        *self.exits_by_reason.entry(closed.reason).or_insert(0) += 1;
        self.realized_pnl += closed.realized_pnl;
        if closed.realized_pnl > 0.0 {
            self.wins += 1;
        } else if closed.realized_pnl < 0.0 {
            self.losses += 1;
        }
        self.trades.push(CompletedTrade {
            exit_time,
            position: closed,
        });
    }
}

/// Replay `stream` through a fresh processor with no file output.
pub fn run_replay(
    config: &EngineConfig,
    weights: Option<&dyn WeightsProvider>,
    stream: &[TickRow],
) -> Result<ReplaySummary, ReplayError> {
    replay_inner(config, weights, stream, None)
}

/// Replay `stream`, writing `ticks.csv` and `events.csv` under `record.dir`.
pub fn run_replay_recorded(
    config: &EngineConfig,
    weights: Option<&dyn WeightsProvider>,
    stream: &[TickRow],
    record: &RecordOptions,
) -> Result<ReplaySummary, ReplayError> {
    replay_inner(config, weights, stream, Some(record))
}

fn replay_inner(
    config: &EngineConfig,
    weights: Option<&dyn WeightsProvider>,
    stream: &[TickRow],
    record: Option<&RecordOptions>,
) -> Result<ReplaySummary, ReplayError> {
    config.validate()?;
    let fingerprint = config.fingerprint()?;
    let params_version = match config.mode {
        StrategyMode::RegressionBased => Some(
            weights
                .map(|w| w.version())
                .unwrap_or_else(|| tickflow_core::weights::UNVERSIONED.to_string()),
        ),
        StrategyMode::RuleBased => None,
    };
    let mut summary = ReplaySummary::empty(config, fingerprint, params_version);

    let Some((first, _)) = stream.first() else {
        tracing::warn!("empty tick stream, nothing to replay");
        return Ok(summary);
    };

    let clock = ManualClock::new(first.timestamp);
    let mut processor = TickProcessor::new(config, weights).with_clock(Arc::new(clock.clone()));
    if let Some(record) = record {
        fs::create_dir_all(&record.dir).map_err(|source| ReplayError::Io {
            path: record.dir.clone(),
            source,
        })?;
        processor = processor
            .with_tick_sink(Box::new(CsvTickRecorder::create(
                &record.ticks_path(),
                record.tick_buffer,
            )?))
            .with_trade_sink(Box::new(CsvTradeLogger::create(&record.events_path())?));
    }

    tracing::info!(
        mode = %config.mode,
        strategy = processor.strategy_name(),
        ticks = stream.len(),
        "replay started"
    );

    for (tick, features) in stream {
        clock.set(tick.timestamp);
        let outcome = processor.on_tick(tick, features);
        if let TickAction::Exited(closed) = outcome.action {
            summary.record_close(tick.timestamp, closed);
        }
    }

    if let Some((last, _)) = stream.last() {
        if let Some(closed) = processor.force_close(last.price, last.timestamp) {
            summary.record_close(last.timestamp, closed);
        }
    }
    processor.flush();

    let stats = processor.stats();
    summary.ticks = stats.ticks;
    summary.entries = stats.entries;
    summary.adds = stats.adds;
    summary.sink_errors = stats.sink_errors;

    tracing::info!(
        ticks = summary.ticks,
        entries = summary.entries,
        exits = summary.exits(),
        realized_pnl = summary.realized_pnl,
        "replay finished"
    );
    Ok(summary)
}
