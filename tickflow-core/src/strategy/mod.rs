//! Decision strategies.
//!
//! A strategy turns one tick plus its feature vector into a `DecisionResult`:
//! bias, entry/exit scores, the enter/exit opinion and the direction it would
//! trade. The result is a separate record; the tick and features are never
//! mutated. The processor only branches on `StrategyMode` to decide whether
//! score exits apply.

mod factory;
mod regression;
mod rule_based;

pub use factory::build_strategy;
pub use regression::{RegressionStrategy, DEFAULT_WEIGHTS};
pub use rule_based::{RuleBasedStrategy, RuleThresholds, TrackerSignals, CONSOLIDATION_VETO};

use crate::domain::{Direction, Features, Tick};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Directional market lean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

impl Bias {
    pub fn as_str(self) -> &'static str {
        match self {
            Bias::Bullish => "bullish",
            Bias::Bearish => "bearish",
            Bias::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Bias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which strategy variant drives decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyMode {
    #[default]
    RuleBased,
    RegressionBased,
}

impl StrategyMode {
    /// Short tag written on tick records and trade events.
    pub fn tag(self) -> &'static str {
        match self {
            StrategyMode::RuleBased => "v3",
            StrategyMode::RegressionBased => "v4",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyMode::RuleBased => "rule_based",
            StrategyMode::RegressionBased => "regression_based",
        }
    }
}

impl fmt::Display for StrategyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Market bias setting: detect per tick, or pin to a fixed label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketBias {
    #[default]
    Auto,
    Bullish,
    Bearish,
    Neutral,
}

impl MarketBias {
    pub fn fixed(self) -> Option<Bias> {
        match self {
            MarketBias::Auto => None,
            MarketBias::Bullish => Some(Bias::Bullish),
            MarketBias::Bearish => Some(Bias::Bearish),
            MarketBias::Neutral => Some(Bias::Neutral),
        }
    }
}

/// Entry/exit thresholds shared by both strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    pub entry_threshold: f64,
    pub exit_threshold: f64,
    pub bias_prob_threshold: f64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            entry_threshold: 0.0,
            exit_threshold: 0.0,
            bias_prob_threshold: 0.55,
        }
    }
}

/// Everything a strategy concluded about one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    pub mode: StrategyMode,
    pub bias: Bias,
    /// Regression mode only.
    pub bias_prob: Option<f64>,
    pub entry_score: f64,
    pub exit_score: f64,
    pub should_enter: bool,
    pub should_exit: bool,
    /// Direction to open if the processor decides to enter.
    pub direction: Direction,
    /// Rule mode: momentum after the fallback chain.
    pub momentum: Option<f64>,
    /// Rule mode: direction score after the fallback chain.
    pub direction_score: Option<i32>,
    /// Regression mode: version of the weights in use.
    pub params_version: Option<String>,
}

pub trait DecisionStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn mode(&self) -> StrategyMode;

    fn evaluate(&self, tick: &Tick, features: &Features) -> DecisionResult;

    /// Feed the tick into any history the strategy keeps. Called once per
    /// tick, after `evaluate`.
    fn observe(&mut self, _tick: &Tick) {}
}

/// Rule-based direction heuristic: a signed direction score agreeing with the
/// bias wins, otherwise the sign of momentum decides.
pub fn rule_direction(bias: Bias, direction_score: i32, momentum: f64) -> Direction {
    match bias {
        Bias::Bullish if direction_score > 0 => Direction::Long,
        Bias::Bearish if direction_score < 0 => Direction::Short,
        _ if momentum > 0.0 => Direction::Long,
        _ => Direction::Short,
    }
}
