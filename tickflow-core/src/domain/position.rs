//! Position lifecycle state.
//!
//! `PositionState` is the single authoritative record of whether the engine
//! holds a position. Open-only fields live inside `OpenPosition`, so they
//! exist exactly when the state is open. Invalid transitions (`enter` while
//! open, `exit`/`add` while flat) are rejected with a `PositionError` and
//! leave the state untouched.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }

    /// PnL per unit when moving from `entry` to `price` in this direction.
    pub fn pnl(self, entry: f64, price: f64) -> f64 {
        match self {
            Direction::Long => price - entry,
            Direction::Short => entry - price,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Stoploss,
    Takeprofit,
    ExitScore,
    TimeOrTick,
    HoldFalse,
    /// End of the tick stream with a position still open.
    ForceClose,
}

impl ExitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::Stoploss => "stoploss",
            ExitReason::Takeprofit => "takeprofit",
            ExitReason::ExitScore => "exit_score",
            ExitReason::TimeOrTick => "time_or_tick",
            ExitReason::HoldFalse => "hold_false",
            ExitReason::ForceClose => "force_close",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Flat,
    Open,
}

/// Rejected state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("position already open ({0})")]
    AlreadyOpen(Direction),
    #[error("no open position")]
    NotOpen,
}

/// Fields that only exist while a position is open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub direction: Direction,
    pub entry_price: f64,
    pub entry_time: NaiveDateTime,
    /// Units held; starts at 1 and grows by pyramiding.
    pub size: u32,
    /// Best unrealized PnL seen so far (never decreases, starts at 0).
    pub max_favorable: f64,
    /// Worst unrealized PnL seen so far (never increases, starts at 0).
    pub max_adverse: f64,
    pub ticks_since_entry: u64,
}

impl OpenPosition {
    pub fn pnl_at(&self, price: f64) -> f64 {
        self.direction.pnl(self.entry_price, price)
    }
}

/// Outcome of a successful `exit`, forwarded to the trade sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedPosition {
    pub direction: Direction,
    pub entry_price: f64,
    pub entry_time: NaiveDateTime,
    pub exit_price: f64,
    pub size: u32,
    /// Realized PnL per unit.
    pub realized_pnl: f64,
    pub reason: ExitReason,
    pub ticks_held: u64,
    pub max_favorable: f64,
    pub max_adverse: f64,
}

/// Serializable view of the position for sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub status: PositionStatus,
    pub direction: Option<Direction>,
    pub entry_price: Option<f64>,
    pub entry_time: Option<NaiveDateTime>,
    pub size: u32,
    pub unrealized_pnl: f64,
    pub max_favorable: f64,
    pub max_adverse: f64,
    pub ticks_since_entry: u64,
}

/// The engine's position: flat, or exactly one open position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionState {
    open: Option<OpenPosition>,
}

impl PositionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> PositionStatus {
        if self.open.is_some() {
            PositionStatus::Open
        } else {
            PositionStatus::Flat
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn is_flat(&self) -> bool {
        self.open.is_none()
    }

    pub fn open_position(&self) -> Option<&OpenPosition> {
        self.open.as_ref()
    }

    /// Open a new position of size 1. Rejected unless flat.
    pub fn enter(
        &mut self,
        direction: Direction,
        price: f64,
        timestamp: NaiveDateTime,
    ) -> Result<(), PositionError> {
        if let Some(open) = &self.open {
            return Err(PositionError::AlreadyOpen(open.direction));
        }
        self.open = Some(OpenPosition {
            direction,
            entry_price: price,
            entry_time: timestamp,
            size: 1,
            max_favorable: 0.0,
            max_adverse: 0.0,
            ticks_since_entry: 0,
        });
        Ok(())
    }

    /// Close the open position at `price`, returning to flat.
    pub fn exit(&mut self, price: f64, reason: ExitReason) -> Result<ClosedPosition, PositionError> {
        let open = self.open.take().ok_or(PositionError::NotOpen)?;
        Ok(ClosedPosition {
            direction: open.direction,
            entry_price: open.entry_price,
            entry_time: open.entry_time,
            exit_price: price,
            size: open.size,
            realized_pnl: open.pnl_at(price),
            reason,
            ticks_held: open.ticks_since_entry,
            max_favorable: open.max_favorable,
            max_adverse: open.max_adverse,
        })
    }

    /// Mark the open position to `price`: refresh the excursion extrema and
    /// count one tick. Call at most once per tick. Returns the unrealized PnL,
    /// or `None` when flat.
    pub fn update_unrealized(&mut self, price: f64) -> Option<f64> {
        let open = self.open.as_mut()?;
        let pnl = open.pnl_at(price);
        open.max_favorable = open.max_favorable.max(pnl);
        open.max_adverse = open.max_adverse.min(pnl);
        open.ticks_since_entry += 1;
        Some(pnl)
    }

    /// Unrealized PnL per unit at `price`; 0 when flat.
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.open.as_ref().map_or(0.0, |open| open.pnl_at(price))
    }

    /// Pyramid one more unit onto the open position. Returns the new size.
    pub fn add(&mut self) -> Result<u32, PositionError> {
        let open = self.open.as_mut().ok_or(PositionError::NotOpen)?;
        open.size += 1;
        Ok(open.size)
    }

    pub fn direction(&self) -> Option<Direction> {
        self.open.as_ref().map(|o| o.direction)
    }

    pub fn entry_price(&self) -> Option<f64> {
        self.open.as_ref().map(|o| o.entry_price)
    }

    pub fn entry_time(&self) -> Option<NaiveDateTime> {
        self.open.as_ref().map(|o| o.entry_time)
    }

    pub fn size(&self) -> u32 {
        self.open.as_ref().map_or(0, |o| o.size)
    }

    pub fn ticks_since_entry(&self) -> Option<u64> {
        self.open.as_ref().map(|o| o.ticks_since_entry)
    }

    /// Elapsed time between entry and `now`.
    pub fn time_since_entry(&self, now: NaiveDateTime) -> Option<Duration> {
        self.open.as_ref().map(|o| now - o.entry_time)
    }

    pub fn snapshot(&self, price: f64) -> PositionSnapshot {
        match &self.open {
            Some(open) => PositionSnapshot {
                status: PositionStatus::Open,
                direction: Some(open.direction),
                entry_price: Some(open.entry_price),
                entry_time: Some(open.entry_time),
                size: open.size,
                unrealized_pnl: open.pnl_at(price),
                max_favorable: open.max_favorable,
                max_adverse: open.max_adverse,
                ticks_since_entry: open.ticks_since_entry,
            },
            None => PositionSnapshot {
                status: PositionStatus::Flat,
                direction: None,
                entry_price: None,
                entry_time: None,
                size: 0,
                unrealized_pnl: 0.0,
                max_favorable: 0.0,
                max_adverse: 0.0,
                ticks_since_entry: 0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 11, 14)
            .unwrap()
            .and_hms_opt(9, minute, 0)
            .unwrap()
    }

    #[test]
    fn starts_flat() {
        let state = PositionState::new();
        assert_eq!(state.status(), PositionStatus::Flat);
        assert!(state.direction().is_none());
        assert!(state.entry_price().is_none());
        assert!(state.entry_time().is_none());
        assert_eq!(state.size(), 0);
    }

    #[test]
    fn enter_sets_open_fields() {
        let mut state = PositionState::new();
        state.enter(Direction::Long, 100.0, ts(0)).unwrap();
        let open = state.open_position().unwrap();
        assert_eq!(open.direction, Direction::Long);
        assert_eq!(open.entry_price, 100.0);
        assert_eq!(open.entry_time, ts(0));
        assert_eq!(open.size, 1);
        assert_eq!(open.ticks_since_entry, 0);
        assert_eq!(open.max_favorable, 0.0);
        assert_eq!(open.max_adverse, 0.0);
    }

    #[test]
    fn enter_while_open_is_rejected_and_state_unchanged() {
        let mut state = PositionState::new();
        state.enter(Direction::Short, 50.0, ts(0)).unwrap();
        let before = state.clone();
        let err = state.enter(Direction::Long, 60.0, ts(1)).unwrap_err();
        assert_eq!(err, PositionError::AlreadyOpen(Direction::Short));
        assert_eq!(state, before);
    }

    #[test]
    fn exit_computes_signed_pnl() {
        let mut long = PositionState::new();
        long.enter(Direction::Long, 100.0, ts(0)).unwrap();
        let closed = long.exit(104.0, ExitReason::Takeprofit).unwrap();
        assert_eq!(closed.realized_pnl, 4.0);
        assert_eq!(closed.reason, ExitReason::Takeprofit);

        let mut short = PositionState::new();
        short.enter(Direction::Short, 100.0, ts(0)).unwrap();
        let closed = short.exit(104.0, ExitReason::Stoploss).unwrap();
        assert_eq!(closed.realized_pnl, -4.0);
    }

    #[test]
    fn second_exit_has_no_effect() {
        let mut state = PositionState::new();
        state.enter(Direction::Long, 100.0, ts(0)).unwrap();
        assert!(state.exit(101.0, ExitReason::ForceClose).is_ok());
        assert_eq!(state.exit(102.0, ExitReason::ForceClose), Err(PositionError::NotOpen));
        assert!(state.is_flat());
    }

    #[test]
    fn round_trip_at_same_price_is_zero() {
        let mut state = PositionState::new();
        state.enter(Direction::Short, 123.5, ts(0)).unwrap();
        let closed = state.exit(123.5, ExitReason::ForceClose).unwrap();
        assert_eq!(closed.realized_pnl, 0.0);
        assert_eq!(state, PositionState::new());
    }

    #[test]
    fn update_unrealized_tracks_extrema_and_counts_ticks() {
        let mut state = PositionState::new();
        state.enter(Direction::Long, 100.0, ts(0)).unwrap();
        assert_eq!(state.update_unrealized(103.0), Some(3.0));
        assert_eq!(state.update_unrealized(98.0), Some(-2.0));
        assert_eq!(state.update_unrealized(101.0), Some(1.0));
        let open = state.open_position().unwrap();
        assert_eq!(open.max_favorable, 3.0);
        assert_eq!(open.max_adverse, -2.0);
        assert_eq!(open.ticks_since_entry, 3);
    }

    #[test]
    fn update_unrealized_when_flat_is_noop() {
        let mut state = PositionState::new();
        assert_eq!(state.update_unrealized(100.0), None);
        assert_eq!(state, PositionState::new());
        assert_eq!(state.unrealized_pnl(100.0), 0.0);
    }

    #[test]
    fn add_keeps_counters() {
        let mut state = PositionState::new();
        assert_eq!(state.add(), Err(PositionError::NotOpen));
        state.enter(Direction::Long, 100.0, ts(0)).unwrap();
        state.update_unrealized(105.0);
        assert_eq!(state.add(), Ok(2));
        let open = state.open_position().unwrap();
        assert_eq!(open.size, 2);
        assert_eq!(open.ticks_since_entry, 1);
        assert_eq!(open.max_favorable, 5.0);
        assert_eq!(open.direction, Direction::Long);
    }

    #[test]
    fn time_since_entry() {
        let mut state = PositionState::new();
        assert!(state.time_since_entry(ts(5)).is_none());
        state.enter(Direction::Long, 1.0, ts(0)).unwrap();
        assert_eq!(state.time_since_entry(ts(5)), Some(Duration::minutes(5)));
    }

    #[test]
    fn snapshot_flat_has_no_entry_fields() {
        let snap = PositionState::new().snapshot(100.0);
        assert_eq!(snap.status, PositionStatus::Flat);
        assert!(snap.direction.is_none());
        assert!(snap.entry_price.is_none());
        assert!(snap.entry_time.is_none());
    }

    #[test]
    fn exit_reason_tags() {
        assert_eq!(ExitReason::Stoploss.as_str(), "stoploss");
        assert_eq!(ExitReason::TimeOrTick.to_string(), "time_or_tick");
        let json = serde_json::to_string(&ExitReason::HoldFalse).unwrap();
        assert_eq!(json, "\"hold_false\"");
    }
}
