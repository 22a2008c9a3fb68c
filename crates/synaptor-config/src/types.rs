// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! Fixed sections map to typed structs. `[[layer]]` and `[[connection]]`
//! entries stay as raw tables and are read through [`ParamGroup`](crate::ParamGroup).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SynaptorConfig {
    pub system: SystemConfig,
    pub column: ColumnConfig,
    pub timescale: TimeScaleConfig,
    #[serde(rename = "layer")]
    pub layers: Vec<toml::Table>,
    #[serde(rename = "connection")]
    pub connections: Vec<toml::Table>,
}

/// Process-level settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Worker threads for delivery, 0 = one per core
    pub num_threads: usize,
    /// Fixed number of scratch partitions per delivery call
    pub partitions: usize,
    /// "cpu", "gpu" or "auto"
    pub backend: String,
    pub log_level: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            num_threads: 0,
            partitions: 8,
            backend: "cpu".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Column geometry and run settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ColumnConfig {
    pub name: String,
    /// Neurons per axis at scale 0
    pub nx: usize,
    pub ny: usize,
    pub nbatch: usize,
    pub dt: f64,
    pub start_time: f64,
    pub stop_time: f64,
    pub checkpoint_dir: Option<PathBuf>,
    pub timestep_info_file: Option<PathBuf>,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            name: "column".to_string(),
            nx: 32,
            ny: 32,
            nbatch: 1,
            dt: 1.0,
            start_time: 0.0,
            stop_time: 10.0,
            checkpoint_dir: None,
            timestep_info_file: None,
        }
    }
}

/// Which timestep controller to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeScaleControllerKind {
    /// Fixed `dt`
    #[default]
    None,
    Adaptive,
    /// Adaptive with a knee on ceiling growth
    Jic,
}

/// Adaptive timestep settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeScaleConfig {
    pub kind: TimeScaleControllerKind,
    /// Layer whose restricted activity energy drives the controller
    pub energy_layer: Option<String>,
    pub base_max: f64,
    pub base_min: f64,
    pub tau_factor: f64,
    pub growth_factor: f64,
    pub reset_thresh: f64,
    pub knee_thresh: f64,
    pub knee_slope: f64,
}

impl Default for TimeScaleConfig {
    fn default() -> Self {
        Self {
            kind: TimeScaleControllerKind::None,
            energy_layer: None,
            base_max: 1.0,
            base_min: 1.0,
            tau_factor: 1.0,
            growth_factor: 1.0,
            reset_thresh: 0.0,
            knee_thresh: 1.0,
            knee_slope: 1.0,
        }
    }
}
