//! Domain types for tickflow

pub mod position;
pub mod tick;

pub use position::{
    ClosedPosition, Direction, ExitReason, OpenPosition, PositionError, PositionSnapshot,
    PositionState, PositionStatus,
};
pub use tick::{keys, neutral_default, Features, Tick};
