//! JSON-file store for versioned regression weights.
//!
//! File shape: `{"version": "...", "weights": {"rsi": 0.1, ...}}`. A missing
//! or unreadable file is not an error: the store falls back to the
//! `unversioned` state with no weights and logs a warning.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use thiserror::Error;
use tickflow_core::{Weights, WeightsProvider};

#[derive(Debug, Error)]
pub enum WeightsError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to encode weights: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct ParamsStore {
    path: PathBuf,
    current: Weights,
}

impl ParamsStore {
    /// Open the store at `path`, loading whatever is there.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = read_weights(&path);
        Self { path, current }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> &Weights {
        &self.current
    }

    /// Re-read the file, replacing the in-memory snapshot.
    pub fn reload(&mut self) {
        self.current = read_weights(&self.path);
    }

    pub fn has_weights(&self) -> bool {
        !self.current.weights.is_empty()
    }

    /// Replace the weights and persist them. With `auto_timestamp` the version
    /// gets a `-YYYYMMDD-HHMMSS` suffix.
    pub fn update(
        &mut self,
        version: &str,
        weights: BTreeMap<String, f64>,
        auto_timestamp: bool,
    ) -> Result<&Weights, WeightsError> {
        let version = if auto_timestamp {
            format!("{version}-{}", Local::now().format("%Y%m%d-%H%M%S"))
        } else {
            version.to_string()
        };
        self.current = Weights::new(version, weights);
        self.save()?;
        tracing::info!(
            version = %self.current.version,
            count = self.current.weights.len(),
            "weights updated"
        );
        Ok(&self.current)
    }

    /// Back to `unversioned` with no weights, persisted.
    pub fn reset(&mut self) -> Result<(), WeightsError> {
        self.current = Weights::unversioned();
        self.save()
    }

    pub fn save(&self) -> Result<(), WeightsError> {
        let io_err = |source| WeightsError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(&self.current)?;
        fs::write(&self.path, json).map_err(io_err)
    }
}

impl WeightsProvider for ParamsStore {
    fn version(&self) -> String {
        self.current.version.clone()
    }

    fn weights(&self) -> BTreeMap<String, f64> {
        self.current.weights.clone()
    }
}

fn read_weights(path: &Path) -> Weights {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "weights file unavailable, using unversioned");
            return Weights::unversioned();
        }
    };
    match serde_json::from_str::<Weights>(&content) {
        Ok(weights) => weights,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "weights file corrupt, using unversioned");
            Weights::unversioned()
        }
    }
}
