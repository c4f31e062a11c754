// Copyright (c) Thorscan Contributors
// SPDX-License-Identifier: Apache-2.0

//! THORChain native block scanner and swap/event correlation engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌─────────────────┐
//! │ NodeRpcClient│──▶│ BlockScanner │──▶│  SwapExtractor  │──▶ SwapAction
//! │ (RPC + REST) │   │ (height      │   │  (correlation)  │
//! └──────────────┘   │  cursor)     │   └────────┬────────┘
//!                    └──────────────┘            │
//!                                        ┌───────▼────────┐
//!                                        │   EventStore   │
//!                                        │ (TTL documents)│
//!                                        └────────────────┘
//! ```
//!
//! The scanner pulls blocks strictly in height order and hands each decoded
//! block to the extractor exactly once. The extractor accumulates partial
//! event fragments per inbound transaction id in the event store and emits a
//! finished `SwapAction` the first time a transaction becomes complete.

pub mod actions;
pub mod alert;
pub mod block;
pub mod config;
pub mod decode;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod height_time;
pub mod memo;
pub mod prices;
pub mod rpc;
pub mod store;
pub mod swap;
pub mod types;

pub use actions::SwapAction;
pub use block::result::BlockResult;
pub use block::scanner::{BlockScanner, BlockSink, ScannerOptions};
pub use error::{ScanError, ScanResult};
pub use store::{EventStore, MemoryEventStore};
pub use swap::extractor::SwapExtractor;
