// Copyright (c) Thorscan Contributors
// SPDX-License-Identifier: Apache-2.0

//! Base types shared across the scanner core

use serde::{Deserialize, Serialize};
use std::fmt;

/// Native RUNE asset symbol
pub const NATIVE_RUNE: &str = "THOR.RUNE";

/// All-zero transaction hash used by the chain for internal transfers
pub const ZERO_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Base units per 1.0 of any THORChain asset (8 decimals)
pub const THOR_DIVIDER: f64 = 100_000_000.0;

/// Convert base units to a float amount
pub fn thor_to_float(amount: u64) -> f64 {
    amount as f64 / THOR_DIVIDER
}

/// Whether an asset symbol denotes native RUNE
pub fn is_rune(asset: &str) -> bool {
    let a = asset.trim().to_uppercase();
    a == NATIVE_RUNE || a == "RUNE" || a == "R"
}

/// One coin leg: amount in base units plus asset symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub amount: u64,
    pub asset: String,
}

impl Coin {
    pub fn new(amount: u64, asset: impl Into<String>) -> Self {
        Self {
            amount,
            asset: asset.into(),
        }
    }

    pub fn amount_float(&self) -> f64 {
        thor_to_float(self.amount)
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.asset)
    }
}
