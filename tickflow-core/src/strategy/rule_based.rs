//! Rule-based strategy.
//!
//! Integer entry scoring from indicator rules plus momentum/direction hints
//! from a `PatternSource`. A consolidating market (weak ADX and a flat MACD)
//! short-circuits to `CONSOLIDATION_VETO`, which never enters.

use crate::domain::{keys, Features, Tick};
use crate::pattern::{PatternSource, PatternTracker};
use serde::{Deserialize, Serialize};

use super::{
    rule_direction, Bias, DecisionConfig, DecisionResult, DecisionStrategy, MarketBias,
    StrategyMode,
};

/// Entry score meaning "never enter".
pub const CONSOLIDATION_VETO: i32 = -99;

const MACD_DEAD_ZONE: f64 = 0.3;
const MACD_HIST_STRONG: f64 = 0.8;
const RSI_BIAS_HIGH: f64 = 65.0;
const RSI_BIAS_LOW: f64 = 35.0;
const RSI_5M_CONFIRM: f64 = 55.0;
const ADX_TRENDING: f64 = 20.0;
const MIN_VOLUME: f64 = 5.0;
const TRACKER_PROB_HIGH: f64 = 0.65;
const TRACKER_PROB_LOW: f64 = 0.35;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleThresholds {
    pub adx_consolidation: f64,
    pub momentum_abs_min: f64,
    pub bull_score_min: i32,
    pub bear_score_max: i32,
    pub neutral_score_abs: i32,
    pub rsi_overbought: f64,
    pub rsi_bullish_min: f64,
    pub rsi_bearish_max: f64,
    pub atr_high: f64,
    pub atr_low: f64,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            adx_consolidation: 20.0,
            momentum_abs_min: 3.0,
            bull_score_min: 3,
            bear_score_max: -2,
            neutral_score_abs: 3,
            rsi_overbought: 70.0,
            rsi_bullish_min: 55.0,
            rsi_bearish_max: 45.0,
            atr_high: 20.0,
            atr_low: 5.0,
        }
    }
}

/// Momentum and direction score after the fallback chain.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrackerSignals {
    pub momentum: f64,
    pub direction_score: i32,
}

/// Indicator values read once per tick with neutral defaults applied.
struct Inputs {
    price: f64,
    volume: f64,
    macd: f64,
    signal: f64,
    hist: f64,
    rsi: f64,
    ema5: f64,
    ema20: f64,
    vwap: f64,
    adx: f64,
    atr: f64,
}

impl Inputs {
    fn read(tick: &Tick, features: &Features) -> Self {
        let macd = features.value_or_default(keys::MACD);
        let signal = features.value_or_default(keys::MACD_SIGNAL);
        Self {
            price: tick.price,
            volume: tick.volume,
            macd,
            signal,
            hist: features.get(keys::MACD_HIST).unwrap_or(macd - signal),
            rsi: features.value_or_default(keys::RSI),
            ema5: features.value_or_default(keys::EMA5),
            ema20: features.value_or_default(keys::EMA20),
            vwap: features.value_or_default(keys::VWAP),
            adx: features.value_or_default(keys::ADX),
            atr: features.value_or_default(keys::ATR),
        }
    }
}

pub struct RuleBasedStrategy {
    thresholds: RuleThresholds,
    decision: DecisionConfig,
    market_bias: MarketBias,
    patterns: Box<dyn PatternSource>,
}

impl RuleBasedStrategy {
    /// Automatic bias and a `PatternTracker` with the default window.
    pub fn new(thresholds: RuleThresholds, decision: DecisionConfig) -> Self {
        Self {
            thresholds,
            decision,
            market_bias: MarketBias::Auto,
            patterns: Box::new(PatternTracker::default()),
        }
    }

    pub fn with_market_bias(mut self, market_bias: MarketBias) -> Self {
        self.market_bias = market_bias;
        self
    }

    pub fn with_pattern_source(mut self, patterns: Box<dyn PatternSource>) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn thresholds(&self) -> &RuleThresholds {
        &self.thresholds
    }

    pub fn pattern_source(&self) -> &dyn PatternSource {
        self.patterns.as_ref()
    }

    pub fn detect_bias(&self, tick: &Tick, features: &Features) -> Bias {
        let x = Inputs::read(tick, features);
        if x.adx < self.thresholds.adx_consolidation {
            return Bias::Neutral;
        }

        let mut score = 0;
        score += if x.ema5 > x.ema20 { 1 } else { -1 };
        score += if x.macd > x.signal { 1 } else { -1 };
        if x.hist > MACD_DEAD_ZONE {
            score += 1;
        } else if x.hist < -MACD_DEAD_ZONE {
            score -= 1;
        }
        if x.rsi > RSI_BIAS_HIGH {
            score += 1;
        } else if x.rsi < RSI_BIAS_LOW {
            score -= 1;
        }

        match score {
            s if s > 0 => Bias::Bullish,
            s if s < 0 => Bias::Bearish,
            _ => Bias::Neutral,
        }
    }

    /// Momentum and direction score, each fallback stage used only when the
    /// previous one produced nothing: tracker status, legacy pattern
    /// capabilities, the tick's `momentum` feature, then the sign of momentum.
    pub fn tracker_signals(&self, features: &Features) -> TrackerSignals {
        let mut momentum = 0.0;
        let mut direction_score = 0;

        if let Some(status) = self.patterns.status() {
            momentum = status.momentum;
            if momentum > 0.0 {
                direction_score += 1;
            } else if momentum < 0.0 {
                direction_score -= 1;
            }
            match status.bias_prob {
                Some(p) if p >= TRACKER_PROB_HIGH => direction_score += 1,
                Some(p) if p <= TRACKER_PROB_LOW => direction_score -= 1,
                _ => {}
            }
        } else {
            if self.patterns.three_up() == Some(true) {
                direction_score += 1;
            }
            if self.patterns.sharp_drop_rebound() == Some(true) {
                direction_score += 1;
            }
            if let Some(m) = self.patterns.momentum_hint() {
                momentum = m;
            }
            if let Some(d) = self.patterns.direction_hint() {
                direction_score = d;
            }
        }

        if momentum == 0.0 || !momentum.is_finite() {
            momentum = features.get(keys::MOMENTUM).unwrap_or(0.0);
        }
        if direction_score == 0 && momentum.abs() >= self.thresholds.momentum_abs_min {
            direction_score = if momentum > 0.0 { 1 } else { -1 };
        }

        TrackerSignals {
            momentum,
            direction_score,
        }
    }

    pub fn entry_strength_score(
        &self,
        tick: &Tick,
        features: &Features,
        signals: TrackerSignals,
    ) -> i32 {
        let t = &self.thresholds;
        let x = Inputs::read(tick, features);

        if x.adx < t.adx_consolidation && (x.macd - x.signal).abs() < MACD_DEAD_ZONE {
            return CONSOLIDATION_VETO;
        }

        let mut score = 0;
        if x.macd > x.signal && x.hist > MACD_HIST_STRONG {
            score += 1;
        }
        if x.price > x.vwap && x.ema5 > x.ema20 && x.rsi > t.rsi_bullish_min {
            score += 1;
        }
        if features.flag(keys::IS_READY_5M) == Some(true)
            && features.flag(keys::IS_READY_15M) == Some(true)
            && features.value_or_default(keys::RSI_5M) > RSI_5M_CONFIRM
            && features.value_or_default(keys::EMA_15M) > features.value_or_default(keys::EMA_5M)
        {
            score += 1;
        }
        if x.price > x.vwap && x.volume >= MIN_VOLUME {
            score += 1;
        }
        if x.adx > ADX_TRENDING && x.atr >= t.atr_high {
            score += 1;
        } else if x.atr <= t.atr_low {
            score -= 1;
        }
        if signals.momentum.abs() >= t.momentum_abs_min {
            score += 1;
        }
        score + signals.direction_score
    }

    /// Higher means more urgent to exit.
    pub fn score_exit(&self, tick: &Tick, features: &Features, signals: TrackerSignals) -> f64 {
        let t = &self.thresholds;
        let x = Inputs::read(tick, features);

        let mut score = 0.0;
        if x.atr >= t.atr_high {
            score += 1.0;
        }
        if x.adx < t.adx_consolidation {
            score += 0.5;
        }
        if x.ema5 < x.ema20 {
            score += 1.0;
        }
        if x.rsi >= t.rsi_overbought {
            score += 1.0;
        }
        if x.rsi <= t.rsi_bearish_max {
            score += 0.5;
        }
        if x.macd < x.signal || x.hist < 0.0 {
            score += 1.0;
        }
        if x.price < x.vwap {
            score += 0.5;
        }
        if signals.momentum.abs() < t.momentum_abs_min {
            score += 0.5;
        }
        if signals.direction_score < 0 {
            score += 0.5;
        }
        score
    }

    /// `is_ready` when supplied, otherwise both timeframe readiness flags.
    pub fn is_ready(features: &Features) -> bool {
        features.flag(keys::IS_READY).unwrap_or_else(|| {
            features.flag(keys::IS_READY_5M).unwrap_or(false)
                && features.flag(keys::IS_READY_15M).unwrap_or(false)
        })
    }

    pub fn should_enter(
        &self,
        tick: &Tick,
        features: &Features,
        bias: Bias,
        entry_score: i32,
        signals: TrackerSignals,
    ) -> bool {
        let t = &self.thresholds;
        if entry_score == CONSOLIDATION_VETO
            || signals.momentum.is_nan()
            || signals.momentum.abs() < t.momentum_abs_min
            || signals.direction_score == 0
            || !Self::is_ready(features)
        {
            return false;
        }

        let x = Inputs::read(tick, features);
        match bias {
            Bias::Bullish => {
                entry_score >= t.bull_score_min
                    && x.price > x.vwap
                    && x.ema5 > x.ema20
                    && x.rsi < t.rsi_overbought
            }
            Bias::Bearish => entry_score <= t.bear_score_max && x.ema5 < x.ema20,
            Bias::Neutral => entry_score.abs() >= t.neutral_score_abs,
        }
    }
}

impl DecisionStrategy for RuleBasedStrategy {
    fn name(&self) -> &str {
        "rule_based"
    }

    fn mode(&self) -> StrategyMode {
        StrategyMode::RuleBased
    }

    fn evaluate(&self, tick: &Tick, features: &Features) -> DecisionResult {
        let bias = self
            .market_bias
            .fixed()
            .unwrap_or_else(|| self.detect_bias(tick, features));
        let signals = self.tracker_signals(features);
        let entry_score = self.entry_strength_score(tick, features, signals);
        let exit_score = self.score_exit(tick, features, signals);

        DecisionResult {
            mode: StrategyMode::RuleBased,
            bias,
            bias_prob: None,
            entry_score: f64::from(entry_score),
            exit_score,
            should_enter: self.should_enter(tick, features, bias, entry_score, signals),
            should_exit: exit_score >= self.decision.exit_threshold,
            direction: rule_direction(bias, signals.direction_score, signals.momentum),
            momentum: Some(signals.momentum),
            direction_score: Some(signals.direction_score),
            params_version: None,
        }
    }

    fn observe(&mut self, tick: &Tick) {
        self.patterns.observe(tick.price, tick.volume);
    }
}
