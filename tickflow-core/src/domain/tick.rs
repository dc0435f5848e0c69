//! Market tick and the per-tick feature vector.
//!
//! A `Tick` is the raw market event (time, last price, volume). Everything
//! computed about the market at that instant (indicator values and readiness
//! flags) travels beside it in `Features`, supplied by the external feature
//! provider. Neither is mutated by the engine: strategy output lives in a
//! separate `DecisionResult`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Well-known feature names consumed by the decision strategies.
pub mod keys {
    pub const RSI: &str = "rsi";
    pub const MACD: &str = "macd";
    pub const MACD_SIGNAL: &str = "macd_signal";
    pub const MACD_HIST: &str = "macd_hist";
    pub const KD_K: &str = "kd_k";
    pub const KD_D: &str = "kd_d";
    pub const EMA5: &str = "ema5";
    pub const EMA20: &str = "ema20";
    pub const ATR: &str = "atr";
    pub const ADX: &str = "adx";
    pub const VWAP: &str = "vwap";
    pub const BBAND_POS: &str = "bband_pos";
    pub const BBAND_WIDTH: &str = "bband_width";
    pub const VOLUME: &str = "volume";
    pub const VOL_ROC: &str = "vol_roc";
    pub const MOMENTUM: &str = "momentum";
    pub const RSI_5M: &str = "rsi_5m";
    pub const EMA_5M: &str = "ema_5m";
    pub const RSI_15M: &str = "rsi_15m";
    pub const EMA_15M: &str = "ema_15m";
    pub const IS_READY: &str = "is_ready";
    pub const IS_READY_5M: &str = "is_ready_5m";
    pub const IS_READY_15M: &str = "is_ready_15m";
    pub const HOLD: &str = "hold";

    /// Features that are always boolean flags.
    pub const FLAGS: [&str; 4] = [IS_READY, IS_READY_5M, IS_READY_15M, HOLD];
}

/// One market event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub timestamp: NaiveDateTime,
    /// Last trade price.
    pub price: f64,
    pub volume: f64,
}

impl Tick {
    pub fn new(timestamp: NaiveDateTime, price: f64, volume: f64) -> Self {
        Self {
            timestamp,
            price,
            volume,
        }
    }
}

/// Neutral value substituted for a missing or null feature.
///
/// Oscillators centre on their midpoint, ADX sits at the trend/no-trend
/// boundary, Bollinger position at the band centre; everything else is zero.
pub fn neutral_default(name: &str) -> f64 {
    match name {
        keys::RSI | keys::RSI_5M | keys::RSI_15M | keys::KD_K | keys::KD_D => 50.0,
        keys::ADX => 20.0,
        keys::BBAND_POS => 0.5,
        _ => 0.0,
    }
}

/// Named numeric and boolean features for a single tick.
///
/// `BTreeMap` keeps iteration order deterministic so linear scores sum in the
/// same order on every run. A NaN value is treated as null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Features {
    values: BTreeMap<String, f64>,
    flags: BTreeMap<String, bool>,
}

impl Features {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    pub fn insert_flag(&mut self, name: impl Into<String>, flag: bool) {
        self.flags.insert(name.into(), flag);
    }

    /// Builder form of [`Features::insert`].
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.insert(name, value);
        self
    }

    /// Builder form of [`Features::insert_flag`].
    pub fn with_flag(mut self, name: impl Into<String>, flag: bool) -> Self {
        self.insert_flag(name, flag);
        self
    }

    /// Numeric feature value, `None` if absent or null (NaN).
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied().filter(|v| !v.is_nan())
    }

    /// Numeric feature value with the documented neutral default applied.
    pub fn value_or_default(&self, name: &str) -> f64 {
        self.get(name).unwrap_or_else(|| neutral_default(name))
    }

    pub fn flag(&self, name: &str) -> Option<bool> {
        self.flags.get(name).copied()
    }

    /// All present, non-null numeric features in name order.
    pub fn values(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values
            .iter()
            .filter(|(_, v)| !v.is_nan())
            .map(|(k, v)| (k.as_str(), *v))
    }

    pub fn flags(&self) -> impl Iterator<Item = (&str, bool)> {
        self.flags.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len() + self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.flags.is_empty()
    }
}
