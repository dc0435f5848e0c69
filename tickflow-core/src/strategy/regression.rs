//! Regression-based strategy.
//!
//! Linear scores from a versioned weight vector. The exit score applies the
//! same weights to a mirrored feature set in which trend-favouring readings
//! are negated or inverted, so it rises as conditions turn against a trade.

use crate::domain::{keys, Direction, Features, Tick};
use crate::weights::WeightsProvider;
use std::collections::BTreeMap;

use super::{
    rule_direction, Bias, DecisionConfig, DecisionResult, DecisionStrategy, StrategyMode,
};

/// Built-in coefficients used for any feature the supplied weights omit.
pub const DEFAULT_WEIGHTS: &[(&str, f64)] = &[
    (keys::RSI, 0.15),
    (keys::MACD, 0.20),
    (keys::MACD_SIGNAL, -0.10),
    (keys::KD_K, 0.10),
    (keys::KD_D, -0.05),
    (keys::ATR, -0.05),
    (keys::ADX, 0.10),
    (keys::VWAP, 0.10),
    (keys::EMA5, 0.10),
    (keys::EMA20, 0.10),
    (keys::BBAND_POS, 0.05),
    (keys::VOLUME, 0.05),
];

const BLEND_LINEAR: f64 = 0.4;
const BLEND_MACD_GAP: f64 = 0.3;
const BLEND_SLOPE: f64 = 0.2;
const BLEND_ADX: f64 = 0.1;
const ADX_PIVOT: f64 = 20.0;
const SQUASH_SCALE: f64 = 10.0;

pub struct RegressionStrategy {
    decision: DecisionConfig,
    weights: BTreeMap<String, f64>,
    version: String,
}

impl RegressionStrategy {
    /// Built-in weights only, version `unversioned`.
    pub fn new(decision: DecisionConfig) -> Self {
        Self {
            decision,
            weights: BTreeMap::new(),
            version: crate::weights::UNVERSIONED.to_string(),
        }
    }

    /// Snapshot the provider's weights and version.
    pub fn with_weights(mut self, provider: &dyn WeightsProvider) -> Self {
        self.weights = provider.weights();
        self.version = provider.version();
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Supplied coefficient, else the built-in one, else zero.
    pub fn weight(&self, name: &str) -> f64 {
        if let Some(&w) = self.weights.get(name) {
            return w;
        }
        DEFAULT_WEIGHTS
            .iter()
            .find(|(key, _)| *key == name)
            .map_or(0.0, |(_, w)| *w)
    }

    pub fn linear_score(&self, features: &Features) -> f64 {
        features
            .values()
            .map(|(name, value)| self.weight(name) * value)
            .sum()
    }

    fn linear_score_of(&self, values: &[(&str, f64)]) -> f64 {
        values
            .iter()
            .map(|(name, value)| self.weight(name) * value)
            .sum()
    }

    /// Bias label and probability in [0, 1].
    pub fn detect_bias(&self, features: &Features) -> (Bias, f64) {
        let gap = features.value_or_default(keys::MACD)
            - features.value_or_default(keys::MACD_SIGNAL);
        let slope =
            features.value_or_default(keys::EMA5) - features.value_or_default(keys::EMA20);
        let adx = features.value_or_default(keys::ADX);

        let raw = BLEND_LINEAR * self.linear_score(features)
            + BLEND_MACD_GAP * gap
            + BLEND_SLOPE * slope
            + BLEND_ADX * (adx - ADX_PIVOT);
        let prob = (0.5 + raw / (raw.abs() + SQUASH_SCALE)).clamp(0.0, 1.0);

        let confident = prob >= self.decision.bias_prob_threshold;
        let bias = if confident && (gap >= 0.0 || slope >= 0.0) {
            Bias::Bullish
        } else if confident {
            Bias::Bearish
        } else {
            Bias::Neutral
        };
        (bias, prob)
    }

    /// Entry and exit scores.
    pub fn score(&self, features: &Features) -> (f64, f64) {
        let f = |name: &str| features.value_or_default(name);
        let mirrored = [
            (keys::RSI, 100.0 - f(keys::RSI)),
            (keys::MACD, -f(keys::MACD)),
            (keys::MACD_SIGNAL, f(keys::MACD_SIGNAL)),
            (keys::KD_K, 100.0 - f(keys::KD_K)),
            (keys::KD_D, f(keys::KD_D)),
            (keys::ATR, f(keys::ATR)),
            (keys::ADX, 40.0 - f(keys::ADX)),
            (keys::VWAP, -f(keys::VWAP)),
            (keys::EMA5, -f(keys::EMA5)),
            (keys::EMA20, -f(keys::EMA20)),
            (keys::BBAND_POS, 1.0 - f(keys::BBAND_POS)),
            (keys::VOLUME, -f(keys::VOLUME)),
        ];
        (self.linear_score(features), self.linear_score_of(&mirrored))
    }

    pub fn should_enter(&self, bias_prob: f64, entry_score: f64) -> bool {
        bias_prob >= self.decision.bias_prob_threshold
            && entry_score >= self.decision.entry_threshold
    }

    pub fn should_exit(&self, exit_score: f64) -> bool {
        exit_score >= self.decision.exit_threshold
    }

    /// A confident directional bias picks the side; otherwise the rule
    /// heuristic on the tick's momentum decides.
    fn choose_direction(
        &self,
        bias: Bias,
        bias_prob: f64,
        entry_score: f64,
        features: &Features,
    ) -> Direction {
        if self.should_enter(bias_prob, entry_score) {
            match bias {
                Bias::Bullish => return Direction::Long,
                Bias::Bearish => return Direction::Short,
                Bias::Neutral => {}
            }
        }
        let momentum = features.get(keys::MOMENTUM).unwrap_or(0.0);
        rule_direction(bias, 0, momentum)
    }
}

impl DecisionStrategy for RegressionStrategy {
    fn name(&self) -> &str {
        "regression_based"
    }

    fn mode(&self) -> StrategyMode {
        StrategyMode::RegressionBased
    }

    fn evaluate(&self, _tick: &Tick, features: &Features) -> DecisionResult {
        let (bias, bias_prob) = self.detect_bias(features);
        let (entry_score, exit_score) = self.score(features);
        DecisionResult {
            mode: StrategyMode::RegressionBased,
            bias,
            bias_prob: Some(bias_prob),
            entry_score,
            exit_score,
            should_enter: self.should_enter(bias_prob, entry_score),
            should_exit: self.should_exit(exit_score),
            direction: self.choose_direction(bias, bias_prob, entry_score, features),
            momentum: None,
            direction_score: None,
            params_version: Some(self.version.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weights::Weights;
    use chrono::NaiveDate;

    fn tick() -> Tick {
        let ts = NaiveDate::from_ymd_opt(2025, 11, 14)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        Tick::new(ts, 100.0, 1.0)
    }

    fn zero_weights() -> Weights {
        Weights::new(
            "zero",
            DEFAULT_WEIGHTS.iter().map(|(k, _)| (k.to_string(), 0.0)).collect(),
        )
    }

    #[test]
    fn zero_weights_and_no_features_are_neutral() {
        let s = RegressionStrategy::new(DecisionConfig::default()).with_weights(&zero_weights());
        let d = s.evaluate(&tick(), &Features::new());
        assert_eq!(d.entry_score, 0.0);
        assert_eq!(d.exit_score, 0.0);
        assert_eq!(d.bias_prob, Some(0.5));
        assert_eq!(d.bias, Bias::Neutral);
        assert_eq!(d.params_version.as_deref(), Some("zero"));
    }

    #[test]
    fn missing_weights_fall_back_to_defaults() {
        let partial = Weights::new("partial", [("rsi".to_string(), 1.0)].into_iter().collect());
        let s = RegressionStrategy::new(DecisionConfig::default()).with_weights(&partial);
        assert_eq!(s.weight(keys::RSI), 1.0);
        assert_eq!(s.weight(keys::MACD), 0.20);
        assert_eq!(s.weight("bband_width"), 0.0);
    }

    #[test]
    fn linear_score_skips_nulls() {
        let s = RegressionStrategy::new(DecisionConfig::default());
        let f = Features::new()
            .with(keys::RSI, 60.0)
            .with(keys::MACD, f64::NAN)
            .with("bband_width", 3.0);
        assert!((s.linear_score(&f) - 9.0).abs() < 1e-12);
    }

    #[test]
    fn strong_uptrend_is_bullish() {
        let s = RegressionStrategy::new(DecisionConfig::default());
        let f = Features::new()
            .with(keys::MACD, 2.0)
            .with(keys::MACD_SIGNAL, 1.0)
            .with(keys::EMA5, 105.0)
            .with(keys::EMA20, 100.0)
            .with(keys::ADX, 35.0);
        let (bias, prob) = s.detect_bias(&f);
        assert_eq!(bias, Bias::Bullish);
        assert!(prob > 0.9 && prob <= 1.0);
        let d = s.evaluate(&tick(), &f);
        assert!(d.should_enter);
        assert_eq!(d.direction, Direction::Long);
    }

    #[test]
    fn downtrend_with_confident_prob_is_bearish() {
        let s = RegressionStrategy::new(DecisionConfig::default()).with_weights(&zero_weights());
        // raw = 0.3 * -1 + 0.2 * -2 + 0.1 * 30 = 2.3
        let f = Features::new()
            .with(keys::MACD, -1.0)
            .with(keys::MACD_SIGNAL, 0.0)
            .with(keys::EMA5, 98.0)
            .with(keys::EMA20, 100.0)
            .with(keys::ADX, 50.0);
        let (bias, prob) = s.detect_bias(&f);
        assert_eq!(bias, Bias::Bearish);
        assert!((prob - (0.5 + 2.3 / 12.3)).abs() < 1e-12);
        assert_eq!(s.evaluate(&tick(), &f).direction, Direction::Short);
    }

    #[test]
    fn exit_score_uses_mirrored_features() {
        let only_rsi = Weights::new(
            "rsi",
            DEFAULT_WEIGHTS
                .iter()
                .map(|(k, _)| (k.to_string(), if *k == keys::RSI { 1.0 } else { 0.0 }))
                .collect(),
        );
        let s = RegressionStrategy::new(DecisionConfig::default()).with_weights(&only_rsi);
        let (entry, exit) = s.score(&Features::new().with(keys::RSI, 80.0));
        assert_eq!(entry, 80.0);
        assert_eq!(exit, 20.0);
    }

    #[test]
    fn inconclusive_bias_uses_momentum_direction() {
        let decision = DecisionConfig {
            bias_prob_threshold: 1.0,
            ..DecisionConfig::default()
        };
        let s = RegressionStrategy::new(decision).with_weights(&zero_weights());
        let f = Features::new().with(keys::MOMENTUM, 2.0);
        let d = s.evaluate(&tick(), &f);
        assert_eq!(d.bias, Bias::Neutral);
        assert!(!d.should_enter);
        assert_eq!(d.direction, Direction::Long);
    }

    #[test]
    fn thresholds() {
        let s = RegressionStrategy::new(DecisionConfig {
            entry_threshold: 1.0,
            exit_threshold: 2.0,
            bias_prob_threshold: 0.6,
        });
        assert!(s.should_enter(0.6, 1.0));
        assert!(!s.should_enter(0.59, 5.0));
        assert!(!s.should_enter(0.9, 0.99));
        assert!(s.should_exit(2.0));
        assert!(!s.should_exit(1.99));
    }
}
