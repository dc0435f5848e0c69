//! Engine configuration.
//!
//! Loaded from TOML. Every section and key is optional and falls back to the
//! defaults below. A processor reads the config once at construction; to
//! change it, build a new processor.

use crate::risk::{RiskConfig, MAX_MINUTES_LIMIT};
use crate::strategy::{MarketBias, StrategyMode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub use crate::strategy::{DecisionConfig, RuleThresholds};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to encode config: {0}")]
    Encode(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Pattern tracker window length (ticks).
    pub window: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            window: crate::pattern::DEFAULT_WINDOW,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub mode: StrategyMode,
    pub market_bias: MarketBias,
    pub risk: RiskConfig,
    pub decision: DecisionConfig,
    pub rules: RuleThresholds,
    pub tracker: TrackerConfig,
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Like [`EngineConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let finite = [
            ("risk.stoploss_atr_mult", self.risk.stoploss_atr_mult),
            ("risk.takeprofit_atr_mult", self.risk.takeprofit_atr_mult),
            ("decision.entry_threshold", self.decision.entry_threshold),
            ("decision.exit_threshold", self.decision.exit_threshold),
            ("rules.adx_consolidation", self.rules.adx_consolidation),
            ("rules.momentum_abs_min", self.rules.momentum_abs_min),
        ];
        for (name, value) in finite {
            if !value.is_finite() {
                return Err(ConfigError::Invalid(format!("{name} must be finite")));
            }
        }
        if self.risk.stoploss_atr_mult < 0.0 || self.risk.takeprofit_atr_mult < 0.0 {
            return Err(ConfigError::Invalid(
                "ATR multiples must be non-negative".into(),
            ));
        }
        if self.risk.max_ticks == 0 {
            return Err(ConfigError::Invalid("risk.max_ticks must be > 0".into()));
        }
        if self.risk.max_minutes <= 0 {
            return Err(ConfigError::Invalid("risk.max_minutes must be > 0".into()));
        }
        if self.risk.max_minutes > MAX_MINUTES_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "risk.max_minutes must be <= {MAX_MINUTES_LIMIT}"
            )));
        }
        if !(0.0..=1.0).contains(&self.decision.bias_prob_threshold) {
            return Err(ConfigError::Invalid(
                "decision.bias_prob_threshold must be within [0, 1]".into(),
            ));
        }
        if self.tracker.window < 2 {
            return Err(ConfigError::Invalid("tracker.window must be >= 2".into()));
        }
        Ok(())
    }

    /// Risk limits with the score-exit threshold taken from `decision`.
    pub fn risk_config(&self) -> RiskConfig {
        RiskConfig {
            exit_score_threshold: self.decision.exit_threshold,
            ..self.risk.clone()
        }
    }

    /// BLAKE3 hash of the canonical JSON form. Identical configs hash
    /// identically regardless of key order or omitted defaults in the source.
    pub fn fingerprint(&self) -> Result<String, ConfigError> {
        let canonical =
            serde_json::to_value(self).map_err(|e| ConfigError::Encode(e.to_string()))?;
        Ok(blake3::hash(canonical.to_string().as_bytes())
            .to_hex()
            .to_string())
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Encode(e.to_string()))
    }
}
