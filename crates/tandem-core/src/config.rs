//! Engine configuration that downstream crates can serialize/deserialize.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The two execution backends a node can be materialized on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Backend {
    /// The in-memory table engine.
    InMemory,
    /// The embedded relational engine (SQLite).
    Relational,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::InMemory => write!(f, "in-memory"),
            Backend::Relational => write!(f, "relational"),
        }
    }
}

/// Process-wide offloading strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OffloadStrategy {
    /// Always use the relational engine.
    Always,
    /// Always use the in-memory engine.
    Never,
    /// Delegate to the cost model.
    Best,
}

impl FromStr for OffloadStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ALWAYS" => Ok(OffloadStrategy::Always),
            "NEVER" => Ok(OffloadStrategy::Never),
            "BEST" => Ok(OffloadStrategy::Best),
            other => Err(Error::Config(format!(
                "unsupported offload strategy '{}' (expected ALWAYS, NEVER or BEST)",
                other
            ))),
        }
    }
}

impl fmt::Display for OffloadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OffloadStrategy::Always => write!(f, "ALWAYS"),
            OffloadStrategy::Never => write!(f, "NEVER"),
            OffloadStrategy::Best => write!(f, "BEST"),
        }
    }
}

/// Per-byte weights of the default cost model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostWeights {
    /// Bulk loading an in-memory table into SQLite.
    pub load_per_byte: f64,
    /// Reading a SQLite table back into memory.
    pub read_per_byte: f64,
    /// Scanning inputs inside SQLite.
    pub sql_scan_per_byte: f64,
    /// Scanning inputs in memory.
    pub mem_scan_per_byte: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            load_per_byte: 1.0,
            read_per_byte: 1.0,
            sql_scan_per_byte: 0.5,
            mem_scan_per_byte: 0.25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Memory available to cached in-memory results (bytes). A relational
    /// result whose estimated footprint exceeds what is left is never read back.
    pub mem_cap_bytes: usize,

    /// Offload strategy; `None` is a configuration error at compute time.
    pub strategy: Option<OffloadStrategy>,

    /// SQLite database file. `None` creates a fresh temp file that is
    /// deleted when the session closes.
    pub database_path: Option<String>,

    /// Create every relational ancestor as its own table before the node
    /// (`true`), or inline unmaterialized ancestors as CTEs (`false`).
    pub materialize_intermediates: bool,

    pub cost_weights: CostWeights,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mem_cap_bytes: 512 * 1024 * 1024, // 512 MiB default
            strategy: Some(OffloadStrategy::Best),
            database_path: None,
            materialize_intermediates: true,
            cost_weights: CostWeights::default(),
        }
    }
}

impl EngineConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `TANDEM_MEM_CAP_BYTES`: memory cap in bytes
    /// - `TANDEM_STRATEGY`: ALWAYS, NEVER or BEST
    /// - `TANDEM_DATABASE_FILE`: SQLite database path
    /// - `TANDEM_MATERIALIZE_INTERMEDIATES`: true/false
    pub fn from_env() -> Result<Self, Error> {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("TANDEM_MEM_CAP_BYTES") {
            cfg.mem_cap_bytes = s
                .parse::<usize>()
                .map_err(|e| Error::Config(format!("TANDEM_MEM_CAP_BYTES: {e}")))?;
        }

        if let Ok(s) = std::env::var("TANDEM_STRATEGY") {
            cfg.strategy = Some(s.parse()?);
        }

        if let Ok(s) = std::env::var("TANDEM_DATABASE_FILE") {
            cfg.database_path = Some(s);
        }

        if let Ok(s) = std::env::var("TANDEM_MATERIALIZE_INTERMEDIATES") {
            cfg.materialize_intermediates = s
                .parse::<bool>()
                .map_err(|e| Error::Config(format!("TANDEM_MATERIALIZE_INTERMEDIATES: {e}")))?;
        }

        Ok(cfg)
    }

    /// Parse a JSON document; missing keys keep their defaults.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn with_strategy(mut self, strategy: OffloadStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_mem_cap(mut self, bytes: usize) -> Self {
        self.mem_cap_bytes = bytes;
        self
    }

    pub fn with_database_path(mut self, path: impl Into<String>) -> Self {
        self.database_path = Some(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parsing_is_case_insensitive() {
        assert_eq!("best".parse::<OffloadStrategy>().unwrap(), OffloadStrategy::Best);
        assert_eq!(" Never ".parse::<OffloadStrategy>().unwrap(), OffloadStrategy::Never);
        assert!(matches!(
            "sometimes".parse::<OffloadStrategy>(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_json_config_fills_defaults() {
        let cfg = EngineConfig::from_json(r#"{"strategy": "ALWAYS", "mem_cap_bytes": 4096}"#)
            .unwrap();
        assert_eq!(cfg.strategy, Some(OffloadStrategy::Always));
        assert_eq!(cfg.mem_cap_bytes, 4096);
        assert!(cfg.materialize_intermediates);
        assert_eq!(cfg.cost_weights, CostWeights::default());

        let unset = EngineConfig::from_json(r#"{"strategy": null}"#).unwrap();
        assert_eq!(unset.strategy, None);
        assert!(matches!(
            EngineConfig::from_json(r#"{"strategy": "SOMETIMES"}"#),
            Err(Error::Config(_))
        ));
    }
}
