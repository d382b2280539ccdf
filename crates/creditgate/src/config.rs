//! Gate configuration.
//!
//! Loaded from TOML. Every section is optional and falls back to the
//! defaults below.
//!
//! ```toml
//! usage_fee = "0.001"
//!
//! [store]
//! path = "creditgate.db"
//! busy_timeout_ms = 5000
//!
//! [ledger]
//! recent_limit = 50
//!
//! [operations]
//! cloud_ops = 10
//! risk_mechanics = 100
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use creditgate_core::{Credits, Decimal, OperationTag};
use serde::{Deserialize, Serialize};

use crate::error::{GateError, Result};

/// Default tariff, in credits per invocation.
const DEFAULT_TARIFF: &[(&str, Credits)] = &[
    ("cloud_ops", 10),
    ("cyber_shield", 10),
    ("research_hpqai", 10),
    ("oil_singularity", 50),
    ("thermo_innovation", 50),
    ("semiconductor_yield", 50),
    ("risk_mechanics", 100),
    ("venture_viability", 100),
    ("cognitive_psych", 100),
    ("product_strategy", 100),
];

/// Top-level gate configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GateConfig {
    /// Secondary fee recorded on every ledger entry.
    pub usage_fee: Decimal,
    pub store: StoreConfig,
    pub ledger: LedgerConfig,
    /// Fixed price of each billable operation.
    pub operations: PriceList,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            usage_fee: Decimal::new(1, 3),
            store: StoreConfig::default(),
            ledger: LedgerConfig::default(),
            operations: PriceList::default(),
        }
    }
}

impl GateConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: GateConfig =
            toml::from_str(contents).map_err(|e| GateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, or the defaults if `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_toml_str(&std::fs::read_to_string(path)?),
            None => Ok(Self::default()),
        }
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.usage_fee.is_sign_negative() {
            return Err(GateError::Config(format!(
                "usage_fee must not be negative, got {}",
                self.usage_fee
            )));
        }
        if self.ledger.recent_limit == 0 {
            return Err(GateError::Config("ledger.recent_limit must be positive".into()));
        }
        self.operations.validate()
    }
}

/// Storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// SQLite database file.
    pub path: PathBuf,
    /// How long a writer waits for a competing lock before the gate
    /// reports the backend unavailable.
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("creditgate.db"),
            busy_timeout_ms: 5_000,
        }
    }
}

impl StoreConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Ledger read settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    /// Default number of entries returned by recent-entry views.
    pub recent_limit: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { recent_limit: 50 }
    }
}

/// Mapping from operation tag to its fixed price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceList(BTreeMap<OperationTag, Credits>);

impl PriceList {
    /// An empty price list. Nothing can be charged against it.
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Add or replace a price.
    pub fn with(mut self, operation: OperationTag, price: Credits) -> Self {
        self.0.insert(operation, price);
        self
    }

    /// The price of a known operation.
    pub fn price(&self, operation: &OperationTag) -> Option<Credits> {
        self.0.get(operation).copied()
    }

    /// Resolve an untrusted operation name to its tag and price.
    pub fn lookup(&self, operation: &str) -> Option<(OperationTag, Credits)> {
        let tag = OperationTag::from_str(operation).ok()?;
        let price = self.price(&tag)?;
        Some((tag, price))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OperationTag, Credits)> {
        self.0.iter().map(|(tag, price)| (tag, *price))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every listed operation must cost at least one credit.
    pub fn validate(&self) -> Result<()> {
        match self.0.iter().find(|(_, price)| **price == 0) {
            Some((tag, _)) => Err(GateError::Config(format!(
                "operation {tag} has a zero price"
            ))),
            None => Ok(()),
        }
    }
}

impl Default for PriceList {
    fn default() -> Self {
        DEFAULT_TARIFF
            .iter()
            .filter_map(|(tag, price)| OperationTag::new(*tag).ok().map(|tag| (tag, *price)))
            .collect()
    }
}

impl FromIterator<(OperationTag, Credits)> for PriceList {
    fn from_iter<I: IntoIterator<Item = (OperationTag, Credits)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
