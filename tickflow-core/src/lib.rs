//! Tickflow Core: tick-driven position management.
//!
//! This crate holds the decision and state-machine subsystem:
//! - Domain types (ticks, feature vectors, position lifecycle)
//! - Risk exits with a fixed priority
//! - Bounded price pattern tracking
//! - Rule-based and regression-based decision strategies behind one trait
//! - The per-tick processor that ties them together and reports to sinks
//!
//! Feature computation, storage and data loading live outside this crate.

pub mod clock;
pub mod config;
pub mod domain;
pub mod pattern;
pub mod processor;
pub mod risk;
pub mod sink;
pub mod strategy;
pub mod weights;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, EngineConfig};
pub use domain::{
    ClosedPosition, Direction, ExitReason, Features, PositionError, PositionState, Tick,
};
pub use processor::{TickAction, TickOutcome, TickProcessor};
pub use risk::{ExitFlags, RiskConfig, RiskPolicy};
pub use sink::{SinkError, TickRecord, TickSink, TradeEvent, TradeEventKind, TradeSink};
pub use strategy::{Bias, DecisionResult, DecisionStrategy, StrategyMode};
pub use weights::{Weights, WeightsProvider};
