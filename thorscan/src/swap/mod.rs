// Copyright (c) Thorscan Contributors
// SPDX-License-Identifier: Apache-2.0

//! Swap state model, intent detection, and the correlation engine

pub mod extractor;
pub mod props;
pub mod start_detector;
