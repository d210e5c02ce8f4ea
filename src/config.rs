//! Engine settings read from a JSON file and overridden by environment.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::runs::DEFAULT_RUN_RETENTION;
use crate::solver::{DEFAULT_TIME_LIMIT, SolverConfig, StrategyKind};

pub const CONFIG_ENV: &str = "CARE_ROUTE_CONFIG";
pub const HTTP_ADDR_ENV: &str = "CARE_ROUTE_HTTP_ADDR";
pub const DB_ENV: &str = "CARE_ROUTE_DB";
pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub strategy: StrategyKind,
    pub time_limit_secs: u64,
    pub node_limit: Option<u64>,
    pub db_path: Option<PathBuf>,
    pub http_addr: String,
    /// Finished runs kept for status queries.
    pub run_retention: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Exact,
            time_limit_secs: DEFAULT_TIME_LIMIT.as_secs(),
            node_limit: None,
            db_path: None,
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
            run_retention: DEFAULT_RUN_RETENTION,
        }
    }
}

impl EngineConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Loads the file named by `CARE_ROUTE_CONFIG`, if any, then applies
    /// the other `CARE_ROUTE_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let lookup = |key: &str| std::env::var(key).ok();
        let mut config = match lookup(CONFIG_ENV) {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup(HTTP_ADDR_ENV) {
            self.http_addr = addr;
        }
        if let Some(path) = lookup(DB_ENV) {
            self.db_path = Some(PathBuf::from(path));
        }
        if let Some(strategy) = lookup("CARE_ROUTE_STRATEGY") {
            self.strategy = strategy.parse().map_err(|message| ConfigError::InvalidValue {
                key: "CARE_ROUTE_STRATEGY".to_string(),
                message,
            })?;
        }
        if let Some(secs) = lookup("CARE_ROUTE_TIME_LIMIT_SECS") {
            self.time_limit_secs = secs.trim().parse().map_err(|err: std::num::ParseIntError| {
                ConfigError::InvalidValue {
                    key: "CARE_ROUTE_TIME_LIMIT_SECS".to_string(),
                    message: err.to_string(),
                }
            })?;
        }
        Ok(())
    }

    pub fn solver_config(&self) -> SolverConfig {
        let config = SolverConfig::default().with_time_limit(Duration::from_secs(self.time_limit_secs));
        match self.node_limit {
            Some(limit) => config.with_node_limit(limit),
            None => config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"strategy":"heuristic"}"#).unwrap();
        assert_eq!(config.strategy, StrategyKind::Heuristic);
        assert_eq!(config.time_limit_secs, 60);
        assert_eq!(config.http_addr, DEFAULT_HTTP_ADDR);
        assert_eq!(config.run_retention, DEFAULT_RUN_RETENTION);
    }

    #[test]
    fn overrides_replace_file_values() {
        let vars: HashMap<&str, &str> = [
            (HTTP_ADDR_ENV, "127.0.0.1:8080"),
            (DB_ENV, "/tmp/routes.db"),
            ("CARE_ROUTE_TIME_LIMIT_SECS", "5"),
        ]
        .into_iter()
        .collect();
        let mut config = EngineConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.http_addr, "127.0.0.1:8080");
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/routes.db")));
        assert_eq!(config.solver_config().time_limit, Duration::from_secs(5));
    }

    #[test]
    fn bad_strategy_is_reported() {
        let mut config = EngineConfig::default();
        let err = config
            .apply_overrides(|key| (key == "CARE_ROUTE_STRATEGY").then(|| "annealing".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("CARE_ROUTE_STRATEGY"));
    }
}
