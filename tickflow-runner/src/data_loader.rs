//! Tick stream loading from CSV.
//!
//! Expected layout: `timestamp,price,volume,<feature columns...>`.
//! - `timestamp` is `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DDTHH:MM:SS`, with
//!   optional fractional seconds
//! - `price` and `volume` must be finite; `volume` is optional and defaults to 0
//! - feature cells holding `true`/`false` become boolean flags, numbers become
//!   values, and empty cells are null (the feature is simply absent)
//! - the known flag columns (`is_ready`, `hold`, ...) also accept `1`/`0`

use chrono::NaiveDateTime;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tickflow_core::domain::keys;
use tickflow_core::{Features, Tick};

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("missing required column '{0}'")]
    MissingColumn(&'static str),

    #[error("row {row}: invalid timestamp '{value}'")]
    BadTimestamp { row: usize, value: String },

    #[error("row {row}: invalid value '{value}' in column '{column}'")]
    BadValue {
        row: usize,
        column: String,
        value: String,
    },
}

/// One row of a tick stream.
pub type TickRow = (Tick, Features);

/// Load a tick stream from a CSV file.
pub fn load_ticks_csv(path: &Path) -> Result<Vec<TickRow>, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let rows = read_ticks(file)?;
    tracing::info!(path = %path.display(), rows = rows.len(), "loaded tick stream");
    Ok(rows)
}

/// Parse a tick stream from any reader.
pub fn read_ticks<R: Read>(reader: R) -> Result<Vec<TickRow>, LoadError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = rdr.headers()?.clone();

    let column = |name: &'static str| headers.iter().position(|h| h == name);
    let ts_col = column("timestamp").ok_or(LoadError::MissingColumn("timestamp"))?;
    let price_col = column("price").ok_or(LoadError::MissingColumn("price"))?;
    let volume_col = column("volume");

    let mut rows = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record?;
        // header is row 1
        let row = i + 2;

        let raw_ts = record.get(ts_col).unwrap_or_default();
        let timestamp = parse_timestamp(raw_ts).ok_or_else(|| LoadError::BadTimestamp {
            row,
            value: raw_ts.to_string(),
        })?;
        let price = parse_number(record.get(price_col).unwrap_or_default(), row, "price")?
            .ok_or_else(|| LoadError::BadValue {
                row,
                column: "price".into(),
                value: String::new(),
            })?;
        let volume = match volume_col {
            Some(col) => parse_number(record.get(col).unwrap_or_default(), row, "volume")?
                .unwrap_or(0.0),
            None => 0.0,
        };

        let mut features = Features::new();
        for (col, name) in headers.iter().enumerate() {
            if col == ts_col || col == price_col || Some(col) == volume_col {
                continue;
            }
            let cell = record.get(col).unwrap_or_default();
            let parsed = if keys::FLAGS.iter().any(|flag| *flag == name) {
                parse_flag_cell(cell)
            } else {
                parse_cell(cell)
            };
            match parsed {
                Cell::Null => {}
                Cell::Flag(flag) => features.insert_flag(name, flag),
                Cell::Value(value) => features.insert(name, value),
                Cell::Invalid => {
                    return Err(LoadError::BadValue {
                        row,
                        column: name.to_string(),
                        value: cell.to_string(),
                    })
                }
            }
        }
        rows.push((Tick::new(timestamp, price, volume), features));
    }
    Ok(rows)
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

fn parse_number(raw: &str, row: usize, column: &str) -> Result<Option<f64>, LoadError> {
    if raw.is_empty() {
        return Ok(None);
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        _ => Err(LoadError::BadValue {
            row,
            column: column.to_string(),
            value: raw.to_string(),
        }),
    }
}

enum Cell {
    Null,
    Flag(bool),
    Value(f64),
    Invalid,
}

fn parse_cell(raw: &str) -> Cell {
    if raw.is_empty() {
        return Cell::Null;
    }
    if raw.eq_ignore_ascii_case("true") {
        return Cell::Flag(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Cell::Flag(false);
    }
    match raw.parse::<f64>() {
        Ok(v) => Cell::Value(v),
        Err(_) => Cell::Invalid,
    }
}

fn parse_flag_cell(raw: &str) -> Cell {
    match raw {
        "1" => Cell::Flag(true),
        "0" => Cell::Flag(false),
        _ => match parse_cell(raw) {
            Cell::Value(_) => Cell::Invalid,
            other => other,
        },
    }
}
