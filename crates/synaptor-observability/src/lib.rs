// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # synaptor-observability
//!
//! Logging initialization shared by the synaptor binaries, with per-crate
//! debug flag support.
//!
//! ## Features
//! - `file-logging`: per-run log folders with rotation

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod config;
pub mod init;

pub use cli::*;
pub use config::*;
pub use init::*;

/// Known synaptor crate names for debug flags
pub const KNOWN_CRATES: &[&str] = &[
    "synaptor",
    "synaptor-config",
    "synaptor-npu-neural",
    "synaptor-npu-runtime",
    "synaptor-npu-burst-engine",
    "synaptor-npu-plasticity",
];

/// Target used by per-synapse delivery tracing
pub const DELIVERY_TRACE_TARGET: &str = "synaptor-npu-trace";
