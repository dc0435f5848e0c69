//! Risk exits.
//!
//! Each predicate is independent and only ever true for an open position.
//! Priority between them is the processor's concern; `ExitFlags::first_reason`
//! encodes that order for callers that want it.

use crate::domain::{ExitReason, PositionState};
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Largest `max_minutes` that still fits a `chrono::Duration`.
pub const MAX_MINUTES_LIMIT: i64 = i64::MAX / 60_000;

/// Risk limits for one processor instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub stoploss_atr_mult: f64,
    pub takeprofit_atr_mult: f64,
    pub max_ticks: u64,
    pub max_minutes: i64,
    /// Score-exit threshold (regression mode). Populated from
    /// `decision.exit_threshold` when the engine config is resolved.
    #[serde(skip)]
    pub exit_score_threshold: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            stoploss_atr_mult: 2.0,
            takeprofit_atr_mult: 3.0,
            max_ticks: 50,
            max_minutes: 30,
            exit_score_threshold: 0.0,
        }
    }
}

/// Value of every exit predicate for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitFlags {
    pub stoploss: bool,
    pub takeprofit: bool,
    pub exit_score: bool,
    pub tick_count: bool,
    pub duration: bool,
}

impl ExitFlags {
    /// Winning exit reason: stoploss, takeprofit, score, then tick/time limit.
    pub fn first_reason(&self) -> Option<ExitReason> {
        if self.stoploss {
            Some(ExitReason::Stoploss)
        } else if self.takeprofit {
            Some(ExitReason::Takeprofit)
        } else if self.exit_score {
            Some(ExitReason::ExitScore)
        } else if self.tick_count || self.duration {
            Some(ExitReason::TimeOrTick)
        } else {
            None
        }
    }

    pub fn any(&self) -> bool {
        self.first_reason().is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RiskPolicy {
    config: RiskConfig,
}

impl RiskPolicy {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn should_stoploss(&self, state: &PositionState, price: f64, atr: f64) -> bool {
        state.is_open() && state.unrealized_pnl(price) <= -(self.config.stoploss_atr_mult * atr)
    }

    pub fn should_takeprofit(&self, state: &PositionState, price: f64, atr: f64) -> bool {
        state.is_open() && state.unrealized_pnl(price) >= self.config.takeprofit_atr_mult * atr
    }

    /// `None` means the active strategy does not produce score exits.
    pub fn should_exit_by_score(&self, state: &PositionState, exit_score: Option<f64>) -> bool {
        match exit_score {
            Some(score) => state.is_open() && score >= self.config.exit_score_threshold,
            None => false,
        }
    }

    pub fn should_exit_by_tick_count(&self, state: &PositionState) -> bool {
        state
            .ticks_since_entry()
            .is_some_and(|ticks| ticks >= self.config.max_ticks)
    }

    /// A limit too large for a `Duration` never expires.
    pub fn should_exit_by_duration(&self, state: &PositionState, now: NaiveDateTime) -> bool {
        let Some(limit) = Duration::try_minutes(self.config.max_minutes) else {
            return false;
        };
        state
            .time_since_entry(now)
            .is_some_and(|elapsed| elapsed >= limit)
    }

    pub fn evaluate(
        &self,
        state: &PositionState,
        price: f64,
        atr: f64,
        exit_score: Option<f64>,
        now: NaiveDateTime,
    ) -> ExitFlags {
        ExitFlags {
            stoploss: self.should_stoploss(state, price, atr),
            takeprofit: self.should_takeprofit(state, price, atr),
            exit_score: self.should_exit_by_score(state, exit_score),
            tick_count: self.should_exit_by_tick_count(state),
            duration: self.should_exit_by_duration(state, now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Direction;
    use chrono::NaiveDate;

    fn ts(minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 11, 14)
            .unwrap()
            .and_hms_opt(10, minute, 0)
            .unwrap()
    }

    fn open_long(price: f64) -> PositionState {
        let mut state = PositionState::new();
        state.enter(Direction::Long, price, ts(0)).unwrap();
        state
    }

    #[test]
    fn flat_never_triggers() {
        let policy = RiskPolicy::default();
        let flat = PositionState::new();
        let flags = policy.evaluate(&flat, 0.0, 100.0, Some(100.0), ts(59));
        assert_eq!(flags, ExitFlags::default());
        assert!(flags.first_reason().is_none());
    }

    #[test]
    fn stoploss_boundary() {
        let policy = RiskPolicy::default();
        let state = open_long(100.0);
        assert!(policy.should_stoploss(&state, 90.0, 5.0));
        assert!(policy.should_stoploss(&state, 89.0, 5.0));
        assert!(!policy.should_stoploss(&state, 91.0, 5.0));
    }

    #[test]
    fn takeprofit_for_short() {
        let policy = RiskPolicy::default();
        let mut state = PositionState::new();
        state.enter(Direction::Short, 100.0, ts(0)).unwrap();
        assert!(policy.should_takeprofit(&state, 85.0, 5.0));
        assert!(!policy.should_takeprofit(&state, 86.0, 5.0));
    }

    #[test]
    fn zero_atr_makes_any_loss_a_stoploss() {
        let policy = RiskPolicy::default();
        let state = open_long(100.0);
        assert!(policy.should_stoploss(&state, 99.99, 0.0));
        assert!(policy.should_takeprofit(&state, 100.0, 0.0));
    }

    #[test]
    fn score_exit_needs_a_score() {
        let policy = RiskPolicy::new(RiskConfig {
            exit_score_threshold: 1.5,
            ..RiskConfig::default()
        });
        let state = open_long(100.0);
        assert!(!policy.should_exit_by_score(&state, None));
        assert!(!policy.should_exit_by_score(&state, Some(1.4)));
        assert!(policy.should_exit_by_score(&state, Some(1.5)));
    }

    #[test]
    fn tick_count_limit() {
        let policy = RiskPolicy::new(RiskConfig {
            max_ticks: 3,
            ..RiskConfig::default()
        });
        let mut state = open_long(100.0);
        for _ in 0..2 {
            state.update_unrealized(100.0);
        }
        assert!(!policy.should_exit_by_tick_count(&state));
        state.update_unrealized(100.0);
        assert!(policy.should_exit_by_tick_count(&state));
    }

    #[test]
    fn duration_limit() {
        let policy = RiskPolicy::default();
        let state = open_long(100.0);
        assert!(!policy.should_exit_by_duration(&state, ts(29)));
        assert!(policy.should_exit_by_duration(&state, ts(30)));
        assert!(policy.should_exit_by_duration(&state, ts(31)));
    }

    #[test]
    fn oversized_duration_limit_never_expires() {
        let policy = RiskPolicy::new(RiskConfig {
            max_minutes: i64::MAX,
            ..RiskConfig::default()
        });
        let state = open_long(100.0);
        assert!(!policy.should_exit_by_duration(&state, ts(59)));

        let at_limit = RiskPolicy::new(RiskConfig {
            max_minutes: MAX_MINUTES_LIMIT,
            ..RiskConfig::default()
        });
        assert!(!at_limit.should_exit_by_duration(&state, ts(59)));
    }

    #[test]
    fn first_reason_priority() {
        let all = ExitFlags {
            stoploss: true,
            takeprofit: true,
            exit_score: true,
            tick_count: true,
            duration: true,
        };
        assert_eq!(all.first_reason(), Some(ExitReason::Stoploss));

        let no_sl = ExitFlags {
            stoploss: false,
            ..all
        };
        assert_eq!(no_sl.first_reason(), Some(ExitReason::Takeprofit));

        let only_time = ExitFlags {
            duration: true,
            ..ExitFlags::default()
        };
        assert_eq!(only_time.first_reason(), Some(ExitReason::TimeOrTick));
    }
}
