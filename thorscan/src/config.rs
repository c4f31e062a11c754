// Copyright (c) Thorscan Contributors
// SPDX-License-Identifier: Apache-2.0

//! Scanner configuration
//!
//! Loaded from a YAML file with `${ENV_VAR}` substitution. Every tunable
//! has a serde default so a minimal file only needs the node URLs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub node: NodeConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub prices: PricesConfig,
    #[serde(default = "default_cursor_file")]
    pub cursor_file: PathBuf,
}

fn default_cursor_file() -> PathBuf {
    PathBuf::from("scanner-cursor.json")
}

impl Config {
    /// Load configuration from a YAML file with environment variable
    /// substitution
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {:?}", path))?;
        let contents = substitute_env_vars(&contents);
        let config: Config =
            serde_yaml::from_str(&contents).context("Failed to parse config YAML")?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Consensus JSON-RPC endpoint (status, block results)
    pub rpc_url: String,
    /// REST API endpoint (decoded block transactions)
    pub api_url: String,
    /// Polling interval, defaulting to the chain block time
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: f64,
}

fn default_poll_interval_secs() -> f64 {
    6.0
}

impl NodeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Explicit starting height; absent means resume from the cursor file
    /// or the node's reported tip
    #[serde(default)]
    pub start_block: Option<u64>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_allow_jumps")]
    pub allow_jumps: bool,
    /// Offline tooling only
    #[serde(default)]
    pub one_block_per_run: bool,
    #[serde(default = "default_aggressive_lag_factor")]
    pub aggressive_lag_factor: f64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_allow_jumps() -> bool {
    true
}

fn default_aggressive_lag_factor() -> f64 {
    1.1
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            start_block: None,
            max_attempts: default_max_attempts(),
            allow_jumps: default_allow_jumps(),
            one_block_per_run: false,
            aggressive_lag_factor: default_aggressive_lag_factor(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Event-document expiration horizon
    #[serde(default = "default_ttl_days")]
    pub ttl_days: u64,
}

fn default_ttl_days() -> u64 {
    3
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl_days: default_ttl_days(),
        }
    }
}

/// Static pool price table for USD volume estimates
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricesConfig {
    #[serde(default)]
    pub usd_per_rune: f64,
    /// Pool name to USD per asset
    #[serde(default)]
    pub pools: HashMap<String, f64>,
}

/// Substitute environment variables in the format ${VAR_NAME}; unset
/// variables keep their placeholder
fn substitute_env_vars(content: &str) -> String {
    use regex::Regex;

    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
    let mut result = content.to_string();

    for cap in re.captures_iter(content) {
        let full_match = &cap[0];
        let var_name = &cap[1];

        if let Ok(var_value) = std::env::var(var_name) {
            result = result.replace(full_match, &var_value);
        } else {
            tracing::warn!(
                "Environment variable {} not found, keeping placeholder",
                var_name
            );
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let yaml = r#"
node:
  rpc_url: http://localhost:27147
  api_url: http://localhost:1317
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.node.poll_interval_secs, 6.0);
        assert_eq!(config.scanner.max_attempts, 5);
        assert!(config.scanner.allow_jumps);
        assert!(!config.scanner.one_block_per_run);
        assert_eq!(config.scanner.start_block, None);
        assert_eq!(config.store.ttl_days, 3);
        assert_eq!(config.cursor_file, PathBuf::from("scanner-cursor.json"));
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
node:
  rpc_url: http://localhost:27147
  api_url: http://localhost:1317
  poll_interval_secs: 5.5
scanner:
  start_block: 1000
  max_attempts: 3
  allow_jumps: false
  aggressive_lag_factor: 1.5
store:
  ttl_days: 7
prices:
  usd_per_rune: 4.2
  pools:
    BTC.BTC: 60000.0
cursor_file: /tmp/cursor.json
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.scanner.start_block, Some(1000));
        assert_eq!(config.scanner.max_attempts, 3);
        assert!(!config.scanner.allow_jumps);
        assert_eq!(config.store.ttl_days, 7);
        assert_eq!(config.prices.usd_per_rune, 4.2);
        assert_eq!(config.prices.pools["BTC.BTC"], 60000.0);
        assert_eq!(
            config.node.poll_interval(),
            Duration::from_secs_f64(5.5)
        );
    }

    #[test]
    fn test_substitute_env_vars_basic() {
        std::env::set_var("THORSCAN_TEST_RPC", "http://node:27147");

        let input = "rpc_url: ${THORSCAN_TEST_RPC}";
        assert_eq!(
            substitute_env_vars(input),
            "rpc_url: http://node:27147"
        );

        std::env::remove_var("THORSCAN_TEST_RPC");
    }

    #[test]
    fn test_substitute_env_vars_missing_keeps_placeholder() {
        std::env::remove_var("THORSCAN_TEST_MISSING");
        let input = "value: ${THORSCAN_TEST_MISSING}";
        assert_eq!(substitute_env_vars(input), input);
    }

    #[test]
    fn test_substitute_env_vars_multiple_occurrences() {
        std::env::set_var("THORSCAN_TEST_REPEATED", "x");
        let input = "a: ${THORSCAN_TEST_REPEATED}\nb: ${THORSCAN_TEST_REPEATED}";
        assert_eq!(substitute_env_vars(input), "a: x\nb: x");
        std::env::remove_var("THORSCAN_TEST_REPEATED");
    }
}
