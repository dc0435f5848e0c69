//! Per-tick orchestration.
//!
//! `TickProcessor` owns the position and drives one fixed sequence per tick:
//!
//! 1. Mark the open position to the tick price.
//! 2. Ask the strategy for a decision, then let it observe the tick.
//! 3. Record the tick.
//! 4. Flat: enter if the strategy says so, and stop there for this tick.
//! 5. Open: exit on the first of stoploss, takeprofit, score exit (regression
//!    mode only), tick/time limit, `hold = false`; otherwise pyramid when the
//!    trade is well in profit and the bias is confident.
//!
//! Ticks are processed strictly one at a time. Sink failures are logged and
//! never interrupt processing. The processor has no terminal state: whoever
//! feeds it must call [`TickProcessor::force_close`] when the stream ends.

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::domain::{keys, ClosedPosition, Direction, ExitReason, Features, PositionState, Tick};
use crate::risk::{ExitFlags, RiskConfig, RiskPolicy};
use crate::sink::{NullSink, TickRecord, TickSink, TradeEvent, TradeEventKind, TradeSink};
use crate::strategy::{build_strategy, DecisionResult, DecisionStrategy, StrategyMode};
use crate::weights::WeightsProvider;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Unrealized profit must exceed this many ATRs before adding.
const PYRAMID_ATR_MULT: f64 = 2.0;
/// Bias probability must exceed this before adding.
const PYRAMID_MIN_BIAS_PROB: f64 = 0.7;

/// What the processor did with one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickAction {
    Idle,
    Entered(Direction),
    Exited(ClosedPosition),
    Added { size: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub decision: DecisionResult,
    pub action: TickAction,
}

/// Running counters for one processor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessorStats {
    pub ticks: u64,
    pub entries: u64,
    pub exits: u64,
    pub adds: u64,
    pub sink_errors: u64,
}

pub struct TickProcessor {
    strategy: Box<dyn DecisionStrategy>,
    risk: RiskPolicy,
    position: PositionState,
    clock: Arc<dyn Clock>,
    trade_sink: Box<dyn TradeSink>,
    tick_sink: Box<dyn TickSink>,
    stats: ProcessorStats,
}

impl TickProcessor {
    /// Build from configuration. `weights` is snapshotted now and only used in
    /// regression mode.
    pub fn new(config: &EngineConfig, weights: Option<&dyn WeightsProvider>) -> Self {
        Self::from_parts(build_strategy(config, weights), config.risk_config())
    }

    pub fn from_parts(strategy: Box<dyn DecisionStrategy>, risk: RiskConfig) -> Self {
        Self {
            strategy,
            risk: RiskPolicy::new(risk),
            position: PositionState::new(),
            clock: Arc::new(SystemClock),
            trade_sink: Box::new(NullSink),
            tick_sink: Box::new(NullSink),
            stats: ProcessorStats::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_trade_sink(mut self, sink: Box<dyn TradeSink>) -> Self {
        self.trade_sink = sink;
        self
    }

    pub fn with_tick_sink(mut self, sink: Box<dyn TickSink>) -> Self {
        self.tick_sink = sink;
        self
    }

    pub fn position(&self) -> &PositionState {
        &self.position
    }

    pub fn stats(&self) -> &ProcessorStats {
        &self.stats
    }

    pub fn mode(&self) -> StrategyMode {
        self.strategy.mode()
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    pub fn risk_policy(&self) -> &RiskPolicy {
        &self.risk
    }

    pub fn on_tick(&mut self, tick: &Tick, features: &Features) -> TickOutcome {
        self.stats.ticks += 1;
        let price = tick.price;

        self.position.update_unrealized(price);

        let decision = self.strategy.evaluate(tick, features);
        self.strategy.observe(tick);

        let atr = features.value_or_default(keys::ATR);
        let now = self.clock.now();
        let exit_flags = self.position.is_open().then(|| {
            self.risk
                .evaluate(&self.position, price, atr, score_exit_input(&decision), now)
        });

        tracing::debug!(
            timestamp = %tick.timestamp,
            price,
            mode = decision.mode.tag(),
            bias = %decision.bias,
            entry_score = decision.entry_score,
            exit_score = decision.exit_score,
            "tick"
        );

        let record = TickRecord {
            tick: tick.clone(),
            features: features.clone(),
            decision: decision.clone(),
            position: self.position.snapshot(price),
            exit_flags,
        };
        if let Err(e) = self.tick_sink.record(&record) {
            self.stats.sink_errors += 1;
            tracing::warn!(error = %e, "tick sink failed");
        }

        let action = match exit_flags {
            None => self.try_enter(tick, &decision, now),
            Some(flags) => self.manage_open(tick, features, &decision, flags, atr),
        };
        TickOutcome { decision, action }
    }

    fn try_enter(
        &mut self,
        tick: &Tick,
        decision: &DecisionResult,
        now: NaiveDateTime,
    ) -> TickAction {
        if !decision.should_enter {
            return TickAction::Idle;
        }
        if let Err(e) = self.position.enter(decision.direction, tick.price, now) {
            tracing::warn!(error = %e, "entry rejected");
            return TickAction::Idle;
        }
        self.stats.entries += 1;
        tracing::info!(
            direction = %decision.direction,
            price = tick.price,
            bias = %decision.bias,
            entry_score = decision.entry_score,
            "ENTER"
        );
        self.emit(TradeEvent {
            kind: TradeEventKind::Enter,
            timestamp: tick.timestamp,
            price: tick.price,
            position: self.position.snapshot(tick.price),
            decision: Some(decision.clone()),
            realized_pnl: None,
            exit_flags: None,
        });
        TickAction::Entered(decision.direction)
    }

    fn manage_open(
        &mut self,
        tick: &Tick,
        features: &Features,
        decision: &DecisionResult,
        flags: ExitFlags,
        atr: f64,
    ) -> TickAction {
        let price = tick.price;
        let hold = features.flag(keys::HOLD).unwrap_or(true);
        let reason = flags
            .first_reason()
            .or(if hold { None } else { Some(ExitReason::HoldFalse) });

        if let Some(reason) = reason {
            return match self.close(price, tick.timestamp, reason, Some(decision), Some(flags)) {
                Some(closed) => TickAction::Exited(closed),
                None => TickAction::Idle,
            };
        }

        let unrealized = self.position.unrealized_pnl(price);
        let bias_prob = decision.bias_prob.unwrap_or(0.0);
        if unrealized > PYRAMID_ATR_MULT * atr && bias_prob > PYRAMID_MIN_BIAS_PROB {
            match self.position.add() {
                Ok(size) => {
                    self.stats.adds += 1;
                    tracing::info!(size, price, unrealized, bias_prob, "ADD");
                    self.emit(TradeEvent {
                        kind: TradeEventKind::Add,
                        timestamp: tick.timestamp,
                        price,
                        position: self.position.snapshot(price),
                        decision: Some(decision.clone()),
                        realized_pnl: None,
                        exit_flags: Some(flags),
                    });
                    return TickAction::Added { size };
                }
                Err(e) => tracing::warn!(error = %e, "add rejected"),
            }
        }
        TickAction::Idle
    }

    /// Close any open position at `price` with reason `force_close`. Call
    /// with the last known price when the tick stream ends.
    pub fn force_close(
        &mut self,
        price: f64,
        timestamp: NaiveDateTime,
    ) -> Option<ClosedPosition> {
        if self.position.is_flat() {
            return None;
        }
        self.close(price, timestamp, ExitReason::ForceClose, None, None)
    }

    fn close(
        &mut self,
        price: f64,
        timestamp: NaiveDateTime,
        reason: ExitReason,
        decision: Option<&DecisionResult>,
        flags: Option<ExitFlags>,
    ) -> Option<ClosedPosition> {
        let snapshot = self.position.snapshot(price);
        let closed = match self.position.exit(price, reason) {
            Ok(closed) => closed,
            Err(e) => {
                tracing::warn!(error = %e, %reason, "exit rejected");
                return None;
            }
        };
        self.stats.exits += 1;
        tracing::info!(
            direction = %closed.direction,
            price,
            %reason,
            pnl = closed.realized_pnl,
            ticks_held = closed.ticks_held,
            "EXIT"
        );
        self.emit(TradeEvent {
            kind: TradeEventKind::Exit(reason),
            timestamp,
            price,
            position: snapshot,
            decision: decision.cloned(),
            realized_pnl: Some(closed.realized_pnl),
            exit_flags: flags,
        });
        Some(closed)
    }

    fn emit(&mut self, event: TradeEvent) {
        if let Err(e) = self.trade_sink.log(&event) {
            self.stats.sink_errors += 1;
            tracing::warn!(error = %e, event = event.kind.label(), "trade sink failed");
        }
    }

    /// Flush both sinks. Failures are logged, not returned.
    pub fn flush(&mut self) {
        if let Err(e) = self.tick_sink.flush() {
            self.stats.sink_errors += 1;
            tracing::warn!(error = %e, "tick sink flush failed");
        }
        if let Err(e) = self.trade_sink.flush() {
            self.stats.sink_errors += 1;
            tracing::warn!(error = %e, "trade sink flush failed");
        }
    }
}

/// Score exits only apply in regression mode.
fn score_exit_input(decision: &DecisionResult) -> Option<f64> {
    match decision.mode {
        StrategyMode::RegressionBased => Some(decision.exit_score),
        StrategyMode::RuleBased => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::sink::{MemorySink, SinkError};
    use crate::strategy::Bias;
    use chrono::{Duration, NaiveDate};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 11, 14)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    /// Strategy with a scripted opinion.
    struct Scripted {
        mode: StrategyMode,
        enter: bool,
        direction: Direction,
        bias_prob: Option<f64>,
        exit_score: f64,
    }

    impl Scripted {
        fn enter_long() -> Self {
            Self {
                mode: StrategyMode::RuleBased,
                enter: true,
                direction: Direction::Long,
                bias_prob: None,
                exit_score: 0.0,
            }
        }
    }

    impl DecisionStrategy for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }
        fn mode(&self) -> StrategyMode {
            self.mode
        }
        fn evaluate(&self, _tick: &Tick, _features: &Features) -> DecisionResult {
            DecisionResult {
                mode: self.mode,
                bias: Bias::Bullish,
                bias_prob: self.bias_prob,
                entry_score: 1.0,
                exit_score: self.exit_score,
                should_enter: self.enter,
                should_exit: false,
                direction: self.direction,
                momentum: None,
                direction_score: None,
                params_version: None,
            }
        }
    }

    struct FailingSink;

    impl TickSink for FailingSink {
        fn record(&mut self, _record: &TickRecord) -> Result<(), SinkError> {
            Err(SinkError::Backend("disk full".into()))
        }
    }

    impl TradeSink for FailingSink {
        fn log(&mut self, _event: &TradeEvent) -> Result<(), SinkError> {
            Err(SinkError::Backend("disk full".into()))
        }
    }

    fn processor(strategy: Scripted, clock: &ManualClock, sink: &MemorySink) -> TickProcessor {
        TickProcessor::from_parts(Box::new(strategy), RiskConfig::default())
            .with_clock(Arc::new(clock.clone()))
            .with_trade_sink(Box::new(sink.clone()))
            .with_tick_sink(Box::new(sink.clone()))
    }

    fn tick(minute: i64, price: f64) -> Tick {
        Tick::new(t0() + Duration::minutes(minute), price, 1.0)
    }

    fn atr(value: f64) -> Features {
        Features::new().with(keys::ATR, value)
    }

    #[test]
    fn enters_and_skips_exit_on_entry_tick() {
        let clock = ManualClock::new(t0());
        let sink = MemorySink::new();
        let mut p = processor(Scripted::enter_long(), &clock, &sink);

        // atr 0 would make every predicate fire if exits were checked
        let out = p.on_tick(&tick(0, 100.0), &atr(0.0));
        assert_eq!(out.action, TickAction::Entered(Direction::Long));
        assert!(p.position().is_open());
        assert_eq!(sink.labels(), vec!["ENTER"]);
        let ticks = sink.ticks();
        assert_eq!(ticks.len(), 1);
        assert!(ticks[0].exit_flags.is_none());
    }

    #[test]
    fn entry_uses_clock_time() {
        let clock = ManualClock::new(t0() + Duration::seconds(7));
        let sink = MemorySink::new();
        let mut p = processor(Scripted::enter_long(), &clock, &sink);
        p.on_tick(&tick(0, 100.0), &atr(1.0));
        assert_eq!(p.position().entry_time(), Some(t0() + Duration::seconds(7)));
    }

    #[test]
    fn stoploss_beats_takeprofit() {
        let clock = ManualClock::new(t0());
        let sink = MemorySink::new();
        let mut p = processor(Scripted::enter_long(), &clock, &sink);
        p.on_tick(&tick(0, 100.0), &atr(5.0));

        // atr 0: pnl 0 is both <= -0 and >= 0
        let out = p.on_tick(&tick(1, 100.0), &atr(0.0));
        match out.action {
            TickAction::Exited(closed) => assert_eq!(closed.reason, ExitReason::Stoploss),
            other => panic!("expected exit, got {other:?}"),
        }
        assert_eq!(sink.labels(), vec!["ENTER", "STOPLOSS"]);
        let events = sink.events();
        let flags = events[1].exit_flags.unwrap();
        assert!(flags.stoploss && flags.takeprofit);
    }

    #[test]
    fn exit_event_carries_pre_exit_snapshot() {
        let clock = ManualClock::new(t0());
        let sink = MemorySink::new();
        let mut p = processor(Scripted::enter_long(), &clock, &sink);
        p.on_tick(&tick(0, 100.0), &atr(1.0));
        p.on_tick(&tick(1, 104.0), &atr(1.0));

        let events = sink.events();
        let exit = &events[1];
        assert_eq!(exit.kind, TradeEventKind::Exit(ExitReason::Takeprofit));
        assert_eq!(exit.position.entry_price, Some(100.0));
        assert_eq!(exit.position.unrealized_pnl, 4.0);
        assert_eq!(exit.realized_pnl, Some(4.0));
        assert!(p.position().is_flat());
    }

    #[test]
    fn score_exit_only_in_regression_mode() {
        let clock = ManualClock::new(t0());
        let sink = MemorySink::new();
        let rule = Scripted {
            exit_score: 10.0,
            ..Scripted::enter_long()
        };
        let mut p = processor(rule, &clock, &sink);
        p.on_tick(&tick(0, 100.0), &atr(5.0));
        assert_eq!(p.on_tick(&tick(0, 100.0), &atr(5.0)).action, TickAction::Idle);

        let sink = MemorySink::new();
        let regression = Scripted {
            mode: StrategyMode::RegressionBased,
            exit_score: 10.0,
            ..Scripted::enter_long()
        };
        let mut p = processor(regression, &clock, &sink);
        p.on_tick(&tick(0, 100.0), &atr(5.0));
        p.on_tick(&tick(0, 100.0), &atr(5.0));
        assert_eq!(sink.labels(), vec!["ENTER", "EXIT_SCORE"]);
    }

    #[test]
    fn duration_exit_follows_injected_clock() {
        let clock = ManualClock::new(t0());
        let sink = MemorySink::new();
        let mut p = processor(Scripted::enter_long(), &clock, &sink);
        p.on_tick(&tick(0, 100.0), &atr(5.0));

        clock.advance(Duration::minutes(29));
        assert_eq!(p.on_tick(&tick(29, 100.0), &atr(5.0)).action, TickAction::Idle);
        clock.advance(Duration::minutes(2));
        let out = p.on_tick(&tick(31, 100.0), &atr(5.0));
        match out.action {
            TickAction::Exited(closed) => assert_eq!(closed.reason, ExitReason::TimeOrTick),
            other => panic!("expected exit, got {other:?}"),
        }
        assert_eq!(sink.labels(), vec!["ENTER", "TIME_EXIT"]);
    }

    #[test]
    fn tick_limit_exit() {
        let clock = ManualClock::new(t0());
        let sink = MemorySink::new();
        let mut p = TickProcessor::from_parts(
            Box::new(Scripted::enter_long()),
            RiskConfig {
                max_ticks: 2,
                ..RiskConfig::default()
            },
        )
        .with_clock(Arc::new(clock.clone()))
        .with_trade_sink(Box::new(sink.clone()));
        p.on_tick(&tick(0, 100.0), &atr(5.0));
        assert_eq!(p.on_tick(&tick(0, 100.0), &atr(5.0)).action, TickAction::Idle);
        assert!(matches!(
            p.on_tick(&tick(0, 100.0), &atr(5.0)).action,
            TickAction::Exited(_)
        ));
    }

    #[test]
    fn hold_false_exits_last() {
        let clock = ManualClock::new(t0());
        let sink = MemorySink::new();
        let mut p = processor(Scripted::enter_long(), &clock, &sink);
        p.on_tick(&tick(0, 100.0), &atr(5.0));
        let out = p.on_tick(&tick(1, 101.0), &atr(5.0).with_flag(keys::HOLD, false));
        match out.action {
            TickAction::Exited(closed) => assert_eq!(closed.reason, ExitReason::HoldFalse),
            other => panic!("expected exit, got {other:?}"),
        }
        assert_eq!(sink.labels(), vec!["ENTER", "EXIT"]);
    }

    #[test]
    fn pyramids_when_confident_and_in_profit() {
        let clock = ManualClock::new(t0());
        let sink = MemorySink::new();
        let strategy = Scripted {
            bias_prob: Some(0.8),
            ..Scripted::enter_long()
        };
        let mut p = processor(strategy, &clock, &sink);
        p.on_tick(&tick(0, 100.0), &atr(1.0));
        // 2.5 is past 2 ATR but short of the 3 ATR takeprofit
        let out = p.on_tick(&tick(1, 102.5), &atr(1.0));
        assert_eq!(out.action, TickAction::Added { size: 2 });
        assert_eq!(p.position().size(), 2);
        assert_eq!(sink.labels(), vec!["ENTER", "ADD"]);
    }

    #[test]
    fn no_pyramid_without_probability() {
        let clock = ManualClock::new(t0());
        let sink = MemorySink::new();
        let mut p = processor(Scripted::enter_long(), &clock, &sink);
        p.on_tick(&tick(0, 100.0), &atr(1.0));
        assert_eq!(p.on_tick(&tick(1, 102.5), &atr(1.0)).action, TickAction::Idle);
    }

    #[test]
    fn force_close_emits_force_exit() {
        let clock = ManualClock::new(t0());
        let sink = MemorySink::new();
        let mut p = processor(Scripted::enter_long(), &clock, &sink);
        assert!(p.force_close(100.0, t0()).is_none());
        p.on_tick(&tick(0, 100.0), &atr(5.0));
        let closed = p.force_close(99.0, t0()).unwrap();
        assert_eq!(closed.reason, ExitReason::ForceClose);
        assert_eq!(closed.realized_pnl, -1.0);
        assert_eq!(sink.labels(), vec!["ENTER", "FORCE_EXIT"]);
        assert!(p.force_close(99.0, t0()).is_none());
    }

    #[test]
    fn sink_failures_do_not_interrupt() {
        let clock = ManualClock::new(t0());
        let strategy = Box::new(Scripted::enter_long());
        let mut p = TickProcessor::from_parts(strategy, RiskConfig::default())
            .with_clock(Arc::new(clock))
            .with_trade_sink(Box::new(FailingSink))
            .with_tick_sink(Box::new(FailingSink));
        p.on_tick(&tick(0, 100.0), &atr(5.0));
        assert!(p.position().is_open());
        p.on_tick(&tick(1, 80.0), &atr(5.0));
        assert!(p.position().is_flat());
        assert_eq!(p.stats().sink_errors, 4);
        assert_eq!(p.stats().entries, 1);
        assert_eq!(p.stats().exits, 1);
    }

    #[test]
    fn tick_record_sees_marked_position() {
        let clock = ManualClock::new(t0());
        let sink = MemorySink::new();
        let mut p = processor(Scripted::enter_long(), &clock, &sink);
        p.on_tick(&tick(0, 100.0), &atr(5.0));
        p.on_tick(&tick(1, 102.0), &atr(5.0));
        let ticks = sink.ticks();
        assert_eq!(ticks[1].position.ticks_since_entry, 1);
        assert_eq!(ticks[1].position.max_favorable, 2.0);
        assert!(ticks[1].exit_flags.is_some());
    }
}
