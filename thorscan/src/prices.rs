// Copyright (c) Thorscan Contributors
// SPDX-License-Identifier: Apache-2.0

//! Pool price table used for USD volume estimates

use crate::types::{is_rune, thor_to_float};
use std::collections::HashMap;

/// Snapshot of pool prices: USD per RUNE plus USD-per-asset for each pool
#[derive(Debug, Clone, Default)]
pub struct PoolPrices {
    pub usd_per_rune: f64,
    /// Pool name (e.g. `BTC.BTC` or `ETH.USDC-0X...`) to USD per asset
    pub pools: HashMap<String, f64>,
}

impl PoolPrices {
    pub fn new(usd_per_rune: f64) -> Self {
        Self {
            usd_per_rune,
            pools: HashMap::new(),
        }
    }

    pub fn with_pool(mut self, name: &str, usd_per_asset: f64) -> Self {
        self.pools.insert(name.to_uppercase(), usd_per_asset);
        self
    }

    /// Resolve a pool by asset query: exact match first, then a match on
    /// the `CHAIN.TICKER` part ignoring any contract-address suffix.
    pub fn resolve_pool(&self, query: &str) -> Option<String> {
        let query = query.trim().to_uppercase();
        if query.is_empty() {
            return None;
        }
        if self.pools.contains_key(&query) {
            return Some(query);
        }
        let query_base = query.split('-').next().unwrap_or(&query);
        self.pools
            .keys()
            .find(|name| name.split('-').next().unwrap_or(name) == query_base)
            .cloned()
    }

    pub fn usd_per_asset(&self, asset: &str) -> Option<f64> {
        if is_rune(asset) {
            return Some(self.usd_per_rune);
        }
        let pool = self.resolve_pool(asset)?;
        self.pools.get(&pool).copied()
    }

    /// USD value of `amount` base units of `asset`, zero when unknown
    pub fn volume_usd(&self, amount: u64, asset: &str) -> f64 {
        self.usd_per_asset(asset)
            .map(|price| thor_to_float(amount) * price)
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PoolPrices {
        PoolPrices::new(5.0)
            .with_pool("BTC.BTC", 60_000.0)
            .with_pool("ETH.USDC-0XA0B86991C6218B36C1D19D4A2E9EB0CE3606EB48", 1.0)
    }

    #[test]
    fn test_exact_and_fuzzy_resolution() {
        let p = table();
        assert_eq!(p.resolve_pool("BTC.BTC"), Some("BTC.BTC".to_string()));
        assert_eq!(p.resolve_pool("btc.btc"), Some("BTC.BTC".to_string()));
        assert_eq!(
            p.resolve_pool("ETH.USDC"),
            Some("ETH.USDC-0XA0B86991C6218B36C1D19D4A2E9EB0CE3606EB48".to_string())
        );
        assert_eq!(p.resolve_pool("DOGE.DOGE"), None);
        assert_eq!(p.resolve_pool(""), None);
    }

    #[test]
    fn test_volume_usd() {
        let p = table();
        // 1 RUNE at 5 USD
        assert!((p.volume_usd(100_000_000, "THOR.RUNE") - 5.0).abs() < 1e-9);
        // 0.5 BTC at 60k USD
        assert!((p.volume_usd(50_000_000, "BTC.BTC") - 30_000.0).abs() < 1e-6);
        // unknown asset contributes zero
        assert_eq!(p.volume_usd(100, "DOGE.DOGE"), 0.0);
    }
}
