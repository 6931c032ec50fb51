// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pruefwerk: Core types, configuration and error definitions shared across
// all crates.

pub mod config;
pub mod error;
pub mod human_errors;
pub mod stats;
pub mod types;

pub use config::InspectorConfig;
pub use error::{InspectError, ParseFailure};
pub use stats::DetectionStats;
pub use types::*;
