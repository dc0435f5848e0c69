//! Short-horizon price pattern tracking.
//!
//! `PatternTracker` keeps the last N prices and volumes and derives momentum,
//! an up-move fraction and a volatility score from the whole window on every
//! query. The rule-based strategy consumes it through the `PatternSource`
//! trait, whose optional capabilities default to "not provided" so the
//! strategy's fallback chain never has to probe for methods at runtime.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const DEFAULT_WINDOW: usize = 20;

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Aggregate view of a tracker's window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerStatus {
    pub momentum: f64,
    /// Fraction of up moves, used as an auxiliary bullish probability.
    pub bias_prob: Option<f64>,
    pub exit_score: f64,
    pub last_price: Option<f64>,
    pub count: usize,
    pub avg_volume: f64,
}

/// Source of momentum and direction hints for the rule-based strategy.
///
/// Only `name` and `observe` are required. Every other method is an optional
/// capability; `None` means "this source does not provide it" and the caller
/// moves on to its next fallback.
pub trait PatternSource: Send + Sync {
    fn name(&self) -> &str;

    /// Feed one tick's price and volume.
    fn observe(&mut self, price: f64, volume: f64);

    fn status(&self) -> Option<TrackerStatus> {
        None
    }

    /// Three consecutive up moves ending at the latest sample.
    fn three_up(&self) -> Option<bool> {
        None
    }

    /// A sharp drop immediately followed by a rebound.
    fn sharp_drop_rebound(&self) -> Option<bool> {
        None
    }

    fn momentum_hint(&self) -> Option<f64> {
        None
    }

    fn direction_hint(&self) -> Option<i32> {
        None
    }
}

/// Bounded sliding window of recent prices and volumes.
#[derive(Debug, Clone)]
pub struct PatternTracker {
    capacity: usize,
    prices: VecDeque<f64>,
    volumes: VecDeque<f64>,
}

impl Default for PatternTracker {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl PatternTracker {
    /// A capacity below 2 is raised to 2; every derived value needs two samples.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            capacity,
            prices: VecDeque::with_capacity(capacity),
            volumes: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Non-finite prices are dropped; a non-finite volume is recorded as 0.
    pub fn push(&mut self, price: f64, volume: f64) {
        if !price.is_finite() {
            tracing::debug!(price, "ignoring non-finite price");
            return;
        }
        let volume = if volume.is_finite() { volume } else { 0.0 };
        if self.prices.len() == self.capacity {
            self.prices.pop_front();
            self.volumes.pop_front();
        }
        self.prices.push_back(price);
        self.volumes.push_back(volume);
    }

    /// `last / first - 1` over the window.
    pub fn momentum(&self) -> f64 {
        match (self.prices.front(), self.prices.back()) {
            (Some(&first), Some(&last)) if self.prices.len() >= 2 && first != 0.0 => {
                round_to(last / first - 1.0, 3)
            }
            _ => 0.0,
        }
    }

    pub fn up_move_fraction(&self) -> f64 {
        if self.prices.len() < 2 {
            return 0.5;
        }
        let ups = self
            .prices
            .iter()
            .zip(self.prices.iter().skip(1))
            .filter(|(prev, next)| next > prev)
            .count();
        round_to(ups as f64 / (self.prices.len() - 1) as f64, 3)
    }

    /// Mean absolute step divided by the last price.
    pub fn volatility_exit_score(&self) -> f64 {
        if self.prices.len() < 2 {
            return 0.0;
        }
        let steps = self.prices.len() - 1;
        let total: f64 = self
            .prices
            .iter()
            .zip(self.prices.iter().skip(1))
            .map(|(prev, next)| (next - prev).abs())
            .sum();
        let base = match self.prices.back() {
            Some(&last) if last != 0.0 => last,
            _ => 1.0,
        };
        round_to(total / steps as f64 / base, 3)
    }

    pub fn average_volume(&self) -> f64 {
        if self.volumes.is_empty() {
            return 0.0;
        }
        round_to(
            self.volumes.iter().sum::<f64>() / self.volumes.len() as f64,
            2,
        )
    }

    pub fn sample_count(&self) -> usize {
        self.prices.len()
    }

    pub fn last_price(&self) -> Option<f64> {
        self.prices.back().copied()
    }

    pub fn snapshot(&self) -> TrackerStatus {
        TrackerStatus {
            momentum: self.momentum(),
            bias_prob: Some(self.up_move_fraction()),
            exit_score: self.volatility_exit_score(),
            last_price: self.last_price(),
            count: self.sample_count(),
            avg_volume: self.average_volume(),
        }
    }
}

impl PatternSource for PatternTracker {
    fn name(&self) -> &str {
        "pattern_tracker"
    }

    fn observe(&mut self, price: f64, volume: f64) {
        self.push(price, volume);
    }

    fn status(&self) -> Option<TrackerStatus> {
        Some(self.snapshot())
    }
}

/// Pattern source that provides nothing; the strategy then relies on the
/// tick's own `momentum` feature.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPatternSource;

impl PatternSource for NullPatternSource {
    fn name(&self) -> &str {
        "none"
    }

    fn observe(&mut self, _price: f64, _volume: f64) {}
}
