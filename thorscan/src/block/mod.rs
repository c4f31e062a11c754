// Copyright (c) Thorscan Contributors
// SPDX-License-Identifier: Apache-2.0

//! Block fetching: result model, height cursor, and the scanner itself

pub mod cursor;
pub mod result;
pub mod scanner;
