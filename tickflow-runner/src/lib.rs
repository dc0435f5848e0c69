//! Tickflow Runner: drives the core engine over recorded data.
//!
//! This crate builds on `tickflow-core` to provide:
//! - Tick stream loading from CSV
//! - CSV trade logger and buffered tick recorder
//! - JSON-file weights store
//! - Replay driver with end-of-stream force close
//! - Parallel multi-config comparison
//! - Artifact export (summary JSON, trade CSV)

pub mod compare;
pub mod data_loader;
pub mod export;
pub mod params_store;
pub mod replay;
pub mod sinks;

pub use compare::{compare, ranked, Candidate, CompareEntry};
pub use data_loader::{load_ticks_csv, read_ticks, LoadError, TickRow};
pub use export::save_artifacts;
pub use params_store::{ParamsStore, WeightsError};
pub use replay::{
    run_replay, run_replay_recorded, CompletedTrade, RecordOptions, ReplayError, ReplaySummary,
};
pub use sinks::{CsvTickRecorder, CsvTradeLogger, DEFAULT_TICK_BUFFER};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn replay_summary_is_send_sync() {
        assert_send::<ReplaySummary>();
        assert_sync::<ReplaySummary>();
    }

    #[test]
    fn params_store_is_send_sync() {
        assert_send::<ParamsStore>();
        assert_sync::<ParamsStore>();
    }

    #[test]
    fn candidate_is_send_sync() {
        assert_send::<Candidate>();
        assert_sync::<Candidate>();
    }

    #[test]
    fn csv_sinks_are_send() {
        assert_send::<CsvTickRecorder>();
        assert_send::<CsvTradeLogger>();
    }
}
