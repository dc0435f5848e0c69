//! CSV-backed trade and tick sinks.
//!
//! - `CsvTradeLogger` writes one row per ENTER / ADD / EXIT event and flushes
//!   after each, since trade events are rare.
//! - `CsvTickRecorder` buffers one row per processed tick and writes them out
//!   when the buffer reaches capacity, on `flush()`, and on drop.
//!
//! Both write their header at construction.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use tickflow_core::domain::{keys, PositionSnapshot, PositionStatus};
use tickflow_core::{DecisionResult, SinkError, TickRecord, TickSink, TradeEvent, TradeSink};

/// Default number of tick rows held before a write.
pub const DEFAULT_TICK_BUFFER: usize = 100;

/// Feature columns copied into tick rows, in order.
pub const TICK_FEATURE_COLUMNS: [&str; 14] = [
    keys::RSI,
    keys::MACD,
    keys::MACD_SIGNAL,
    keys::KD_K,
    keys::KD_D,
    keys::ATR,
    keys::ADX,
    keys::VWAP,
    keys::EMA5,
    keys::EMA20,
    keys::BBAND_POS,
    keys::BBAND_WIDTH,
    keys::VOL_ROC,
    keys::MOMENTUM,
];

pub const TRADE_COLUMNS: [&str; 17] = [
    "timestamp",
    "event",
    "price",
    "direction",
    "size",
    "mode",
    "params_version",
    "bias",
    "bias_prob",
    "entry_score",
    "exit_score",
    "realized_pnl",
    "unrealized_pnl",
    "max_favorable",
    "max_adverse",
    "ticks_since_entry",
    "reason",
];

fn csv_err(e: csv::Error) -> SinkError {
    SinkError::Backend(Box::new(e))
}

fn num(value: f64) -> String {
    format!("{value:.6}")
}

fn opt_num(value: Option<f64>) -> String {
    value.map(num).unwrap_or_default()
}

fn tick_header() -> Vec<String> {
    let mut header: Vec<String> = [
        "timestamp",
        "price",
        "volume",
        "bias",
        "bias_prob",
        "entry_score",
        "exit_score",
        "mode",
        "params_version",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    header.extend(TICK_FEATURE_COLUMNS.iter().map(|s| s.to_string()));
    header.extend(
        [
            "direction_score",
            "position",
            "direction",
            "size",
            "unrealized_pnl",
            "max_favorable",
            "max_adverse",
            "ticks_since_entry",
            "exit_flagged",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    header
}

fn decision_cells(decision: Option<&DecisionResult>) -> [String; 6] {
    match decision {
        Some(d) => [
            d.mode.tag().to_string(),
            d.params_version.clone().unwrap_or_default(),
            d.bias.as_str().to_string(),
            opt_num(d.bias_prob),
            num(d.entry_score),
            num(d.exit_score),
        ],
        None => Default::default(),
    }
}

fn position_cells(position: &PositionSnapshot) -> Vec<String> {
    let status = match position.status {
        PositionStatus::Open => "open",
        PositionStatus::Flat => "flat",
    };
    vec![
        status.to_string(),
        position
            .direction
            .map(|d| d.as_str().to_string())
            .unwrap_or_default(),
        position.size.to_string(),
        num(position.unrealized_pnl),
        num(position.max_favorable),
        num(position.max_adverse),
        position.ticks_since_entry.to_string(),
    ]
}

// ─── Trade logger ───────────────────────────────────────────────────

pub struct CsvTradeLogger<W: Write = File> {
    writer: csv::Writer<W>,
}

impl CsvTradeLogger<File> {
    /// Create (or truncate) `path` and write the header.
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        let file = File::create(path)?;
        Self::from_writer(file)
    }
}

impl<W: Write> CsvTradeLogger<W> {
    pub fn from_writer(inner: W) -> Result<Self, SinkError> {
        let mut writer = csv::Writer::from_writer(inner);
        writer.write_record(TRADE_COLUMNS).map_err(csv_err)?;
        writer.flush()?;
        Ok(Self { writer })
    }

    pub fn into_inner(self) -> Result<W, SinkError> {
        self.writer
            .into_inner()
            .map_err(|e| SinkError::Io(e.into_error()))
    }

    fn row(event: &TradeEvent) -> Vec<String> {
        let [mode, params_version, bias, bias_prob, entry_score, exit_score] =
            decision_cells(event.decision.as_ref());
        let p = &event.position;
        vec![
            event.timestamp.to_string(),
            event.kind.label().to_string(),
            num(event.price),
            p.direction.map(|d| d.as_str().to_string()).unwrap_or_default(),
            p.size.to_string(),
            mode,
            params_version,
            bias,
            bias_prob,
            entry_score,
            exit_score,
            opt_num(event.realized_pnl),
            num(p.unrealized_pnl),
            num(p.max_favorable),
            num(p.max_adverse),
            p.ticks_since_entry.to_string(),
            event
                .kind
                .exit_reason()
                .map(|r| r.as_str().to_string())
                .unwrap_or_default(),
        ]
    }
}

impl<W: Write + Send> TradeSink for CsvTradeLogger<W> {
    fn log(&mut self, event: &TradeEvent) -> Result<(), SinkError> {
        self.writer.write_record(Self::row(event)).map_err(csv_err)?;
        self.writer.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

// ─── Tick recorder ──────────────────────────────────────────────────

pub struct CsvTickRecorder<W: Write = File> {
    writer: csv::Writer<W>,
    buffer: Vec<Vec<String>>,
    capacity: usize,
}

impl CsvTickRecorder<File> {
    /// Create (or truncate) `path` and write the header.
    pub fn create(path: &Path, capacity: usize) -> Result<Self, SinkError> {
        let file = File::create(path)?;
        Self::from_writer(file, capacity)
    }
}

impl<W: Write> CsvTickRecorder<W> {
    /// A capacity of 0 is treated as 1 (write every row).
    pub fn from_writer(inner: W, capacity: usize) -> Result<Self, SinkError> {
        let mut writer = csv::Writer::from_writer(inner);
        writer.write_record(tick_header()).map_err(csv_err)?;
        writer.flush()?;
        let capacity = capacity.max(1);
        Ok(Self {
            writer,
            buffer: Vec::with_capacity(capacity),
            capacity,
        })
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn write_buffer(&mut self) -> Result<(), SinkError> {
        for row in self.buffer.drain(..) {
            self.writer.write_record(&row).map_err(csv_err)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    fn row(record: &TickRecord) -> Vec<String> {
        let d = &record.decision;
        let mut row = vec![
            record.tick.timestamp.to_string(),
            num(record.tick.price),
            num(record.tick.volume),
            d.bias.as_str().to_string(),
            opt_num(d.bias_prob),
            num(d.entry_score),
            num(d.exit_score),
            d.mode.tag().to_string(),
            d.params_version.clone().unwrap_or_default(),
        ];
        row.extend(
            TICK_FEATURE_COLUMNS
                .iter()
                .map(|name| opt_num(record.features.get(name))),
        );
        row.push(d.direction_score.map(|s| s.to_string()).unwrap_or_default());
        row.extend(position_cells(&record.position));
        row.push(
            record
                .exit_flags
                .map(|f| f.any().to_string())
                .unwrap_or_default(),
        );
        row
    }
}

impl<W: Write + Send> TickSink for CsvTickRecorder<W> {
    fn record(&mut self, record: &TickRecord) -> Result<(), SinkError> {
        self.buffer.push(Self::row(record));
        if self.buffer.len() >= self.capacity {
            self.write_buffer()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.write_buffer()
    }
}

impl<W: Write> Drop for CsvTickRecorder<W> {
    fn drop(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        if let Err(e) = self.write_buffer() {
            tracing::warn!(error = %e, "tick recorder flush on drop failed");
        }
    }
}
