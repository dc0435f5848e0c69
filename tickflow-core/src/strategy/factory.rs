//! Strategy construction from configuration.

use crate::config::EngineConfig;
use crate::pattern::PatternTracker;
use crate::weights::WeightsProvider;

use super::{DecisionStrategy, RegressionStrategy, RuleBasedStrategy, StrategyMode};

/// Build the strategy selected by `config.mode`.
///
/// `weights` is only read in regression mode; without it the built-in
/// coefficients are used under the `unversioned` tag.
pub fn build_strategy(
    config: &EngineConfig,
    weights: Option<&dyn WeightsProvider>,
) -> Box<dyn DecisionStrategy> {
    match config.mode {
        StrategyMode::RuleBased => Box::new(
            RuleBasedStrategy::new(config.rules.clone(), config.decision.clone())
                .with_market_bias(config.market_bias)
                .with_pattern_source(Box::new(PatternTracker::new(config.tracker.window))),
        ),
        StrategyMode::RegressionBased => {
            let strategy = RegressionStrategy::new(config.decision.clone());
            match weights {
                Some(provider) => Box::new(strategy.with_weights(provider)),
                None => Box::new(strategy),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weights::Weights;
    use std::collections::BTreeMap;

    #[test]
    fn builds_selected_mode() {
        let config = EngineConfig::default();
        let s = build_strategy(&config, None);
        assert_eq!(s.mode(), StrategyMode::RuleBased);
        assert_eq!(s.name(), "rule_based");

        let config = EngineConfig {
            mode: StrategyMode::RegressionBased,
            ..EngineConfig::default()
        };
        let w = Weights::new("2025-01", BTreeMap::new());
        let s = build_strategy(&config, Some(&w));
        assert_eq!(s.mode(), StrategyMode::RegressionBased);
    }
}
