//! Side-by-side replay of one stream under several configurations.
//!
//! Each configuration gets its own processor on a rayon worker; a single
//! processor still sees the ticks strictly in order.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tickflow_core::{EngineConfig, WeightsProvider};

use crate::data_loader::TickRow;
use crate::replay::{run_replay, ReplayError, ReplaySummary};

/// A labelled configuration to compare.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub name: String,
    pub config: EngineConfig,
}

impl Candidate {
    pub fn new(name: impl Into<String>, config: EngineConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareEntry {
    pub name: String,
    pub summary: ReplaySummary,
}

/// Replay `stream` once per candidate, in parallel. Results keep the
/// candidates' order; the first failure aborts the comparison.
pub fn compare(
    candidates: &[Candidate],
    weights: Option<&dyn WeightsProvider>,
    stream: &[TickRow],
) -> Result<Vec<CompareEntry>, ReplayError> {
    tracing::info!(
        candidates = candidates.len(),
        ticks = stream.len(),
        "comparing configurations"
    );
    candidates
        .par_iter()
        .map(|c| {
            run_replay(&c.config, weights, stream).map(|summary| CompareEntry {
                name: c.name.clone(),
                summary,
            })
        })
        .collect()
}

/// Entries ordered by realized PnL, best first.
pub fn ranked(entries: &[CompareEntry]) -> Vec<&CompareEntry> {
    let mut sorted: Vec<&CompareEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| b.summary.realized_pnl.total_cmp(&a.summary.realized_pnl));
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use tickflow_core::domain::keys;
    use tickflow_core::strategy::StrategyMode;
    use tickflow_core::{Features, Tick};

    fn stream() -> Vec<TickRow> {
        let t0 = NaiveDate::from_ymd_opt(2025, 11, 14)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        (0..40)
            .map(|i| {
                let price = 100.0 + i as f64 * 0.5;
                let features = Features::new()
                    .with(keys::ADX, 30.0)
                    .with(keys::ATR, 1.0)
                    .with(keys::MACD, 2.0)
                    .with(keys::MACD_SIGNAL, 1.0)
                    .with(keys::RSI, 66.0)
                    .with(keys::EMA5, price + 1.0)
                    .with(keys::EMA20, price - 1.0)
                    .with(keys::VWAP, price - 2.0)
                    .with(keys::MOMENTUM, 4.0)
                    .with_flag(keys::IS_READY, true);
                (Tick::new(t0 + Duration::seconds(i), price, 1.0), features)
            })
            .collect()
    }

    #[test]
    fn keeps_candidate_order_and_matches_sequential_runs() {
        let stream = stream();
        let candidates = vec![
            Candidate::new("rules", EngineConfig::default()),
            Candidate::new(
                "regression",
                EngineConfig {
                    mode: StrategyMode::RegressionBased,
                    ..EngineConfig::default()
                },
            ),
        ];
        let entries = compare(&candidates, None, &stream).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "rules");
        assert_eq!(entries[1].name, "regression");
        for (entry, candidate) in entries.iter().zip(&candidates) {
            let sequential = run_replay(&candidate.config, None, &stream).unwrap();
            assert_eq!(entry.summary, sequential);
        }
    }

    #[test]
    fn invalid_candidate_fails_comparison() {
        let mut bad = EngineConfig::default();
        bad.risk.max_ticks = 0;
        let candidates = vec![
            Candidate::new("ok", EngineConfig::default()),
            Candidate::new("bad", bad),
        ];
        assert!(compare(&candidates, None, &stream()).is_err());
    }

    #[test]
    fn ranking_is_best_first() {
        let stream = stream();
        let candidates = vec![
            Candidate::new("a", EngineConfig::default()),
            Candidate::new(
                "b",
                EngineConfig {
                    mode: StrategyMode::RegressionBased,
                    ..EngineConfig::default()
                },
            ),
        ];
        let entries = compare(&candidates, None, &stream).unwrap();
        let ranked = ranked(&entries);
        assert!(ranked[0].summary.realized_pnl >= ranked[1].summary.realized_pnl);
    }
}
