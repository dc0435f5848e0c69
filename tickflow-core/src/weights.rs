//! Versioned regression weights contract.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version reported when no calibrated weights exist.
pub const UNVERSIONED: &str = "unversioned";

/// Read-only access to a weight snapshot. Consulted once, when the
/// regression strategy is built.
pub trait WeightsProvider: Send + Sync {
    fn version(&self) -> String;
    fn weights(&self) -> BTreeMap<String, f64>;
}

/// In-memory weight snapshot; also the on-disk JSON shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub version: String,
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
}

impl Weights {
    pub fn new(version: impl Into<String>, weights: BTreeMap<String, f64>) -> Self {
        Self {
            version: version.into(),
            weights,
        }
    }

    pub fn unversioned() -> Self {
        Self::new(UNVERSIONED, BTreeMap::new())
    }

    pub fn is_unversioned(&self) -> bool {
        self.version == UNVERSIONED
    }
}

impl Default for Weights {
    fn default() -> Self {
        Self::unversioned()
    }
}

impl WeightsProvider for Weights {
    fn version(&self) -> String {
        self.version.clone()
    }

    fn weights(&self) -> BTreeMap<String, f64> {
        self.weights.clone()
    }
}
