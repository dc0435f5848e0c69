//! Output sinks for tick records and trade events.
//!
//! The processor hands every tick and every transition to these traits and
//! never touches files itself. Sink errors are reported back to the
//! processor, which logs them and carries on.

use crate::domain::{ExitReason, Features, PositionSnapshot, Tick};
use crate::risk::ExitFlags;
use crate::strategy::DecisionResult;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink io error: {0}")]
    Io(#[from] io::Error),
    /// Encoder or writer failure (CSV, JSON), kept as the error source.
    #[error("sink backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// One processed tick with everything the engine concluded about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickRecord {
    pub tick: Tick,
    pub features: Features,
    pub decision: DecisionResult,
    /// Position after the unrealized update, before any transition.
    pub position: PositionSnapshot,
    /// Exit predicates, present only while a position is open.
    pub exit_flags: Option<ExitFlags>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeEventKind {
    Enter,
    Exit(ExitReason),
    Add,
}

impl TradeEventKind {
    /// Event label written to trade logs.
    pub fn label(&self) -> &'static str {
        match self {
            TradeEventKind::Enter => "ENTER",
            TradeEventKind::Add => "ADD",
            TradeEventKind::Exit(reason) => match reason {
                ExitReason::Stoploss => "STOPLOSS",
                ExitReason::Takeprofit => "TAKEPROFIT",
                ExitReason::ExitScore => "EXIT_SCORE",
                ExitReason::TimeOrTick => "TIME_EXIT",
                ExitReason::ForceClose => "FORCE_EXIT",
                ExitReason::HoldFalse => "EXIT",
            },
        }
    }

    pub fn exit_reason(&self) -> Option<ExitReason> {
        match self {
            TradeEventKind::Exit(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// A position transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub kind: TradeEventKind,
    pub timestamp: NaiveDateTime,
    pub price: f64,
    /// Position after ENTER/ADD, before EXIT.
    pub position: PositionSnapshot,
    /// Absent for a forced close, which happens outside a tick.
    pub decision: Option<DecisionResult>,
    pub realized_pnl: Option<f64>,
    pub exit_flags: Option<ExitFlags>,
}

pub trait TradeSink: Send {
    fn log(&mut self, event: &TradeEvent) -> Result<(), SinkError>;

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

pub trait TickSink: Send {
    fn record(&mut self, record: &TickRecord) -> Result<(), SinkError>;

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TradeSink for NullSink {
    fn log(&mut self, _event: &TradeEvent) -> Result<(), SinkError> {
        Ok(())
    }
}

impl TickSink for NullSink {
    fn record(&mut self, _record: &TickRecord) -> Result<(), SinkError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Captured {
    events: Vec<TradeEvent>,
    ticks: Vec<TickRecord>,
}

/// Keeps everything in memory. Clones share storage, so one handle can be
/// boxed into a processor while another is read afterwards.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    inner: Arc<Mutex<Captured>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TradeEvent> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .events
            .clone()
    }

    pub fn ticks(&self) -> Vec<TickRecord> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .ticks
            .clone()
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.kind.label()).collect()
    }
}

impl TradeSink for MemorySink {
    fn log(&mut self, event: &TradeEvent) -> Result<(), SinkError> {
        let mut captured = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        captured.events.push(event.clone());
        Ok(())
    }
}

impl TickSink for MemorySink {
    fn record(&mut self, record: &TickRecord) -> Result<(), SinkError> {
        let mut captured = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        captured.ticks.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels() {
        assert_eq!(TradeEventKind::Enter.label(), "ENTER");
        assert_eq!(TradeEventKind::Add.label(), "ADD");
        assert_eq!(
            TradeEventKind::Exit(ExitReason::Stoploss).label(),
            "STOPLOSS"
        );
        assert_eq!(
            TradeEventKind::Exit(ExitReason::TimeOrTick).label(),
            "TIME_EXIT"
        );
        assert_eq!(TradeEventKind::Exit(ExitReason::HoldFalse).label(), "EXIT");
        assert_eq!(
            TradeEventKind::Exit(ExitReason::ExitScore).exit_reason(),
            Some(ExitReason::ExitScore)
        );
        assert_eq!(TradeEventKind::Enter.exit_reason(), None);
    }
}
