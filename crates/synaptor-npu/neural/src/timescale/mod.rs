// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Adaptive Timescale Controller
//!
//! Turns a per-batch-element error (energy) signal into the next timestep.
//!
//! Per element and per update, with `E_0` the previous error and `E_dt` the new one:
//! - `E_dt == E_0`: unchanged
//! - `dE = (E_0 - E_dt) / timeScale`; if `dE < resetThresh`, `E_0 <= 0` or `E_dt <= 0`,
//!   reset to `(baseMin, baseMax)`
//! - otherwise `timeScale = tauFactor * E_0 / dE`; hitting the ceiling clamps to it and
//!   raises the ceiling by `1 + growthFactor`
//! - the knee variant damps ceiling growth above `kneeThresh` by `kneeSlope`
//!
//! The stored and returned timestep always lie in `[baseMin, timeScaleMax]`.

mod controller;

pub use controller::AdaptiveTimeScaleController;

#[cfg(feature = "std")]
use serde::{Deserialize, Serialize};

use crate::types::{NpuError, Result};

/// Base parameters shared by both controller kinds.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
pub struct TimeScaleParams {
    pub base_max: f64,
    pub base_min: f64,
    pub tau_factor: f64,
    pub growth_factor: f64,
    pub reset_thresh: f64,
}

impl Default for TimeScaleParams {
    fn default() -> Self {
        Self {
            base_max: 1.0,
            base_min: 1.0,
            tau_factor: 1.0,
            growth_factor: 1.0,
            reset_thresh: 0.0,
        }
    }
}

impl TimeScaleParams {
    pub fn validate(&self, component: &str) -> Result<()> {
        if !(self.base_min > 0.0) {
            return Err(NpuError::configuration(component, "baseMin must be positive"));
        }
        if self.base_min > self.base_max {
            return Err(NpuError::configuration(
                component,
                format!(
                    "baseMin ({}) must not exceed baseMax ({})",
                    self.base_min, self.base_max
                ),
            ));
        }
        if !(self.tau_factor > 0.0) {
            return Err(NpuError::configuration(component, "tauFactor must be positive"));
        }
        if self.growth_factor < 0.0 {
            return Err(NpuError::configuration(component, "growthFactor must not be negative"));
        }
        Ok(())
    }
}

/// Knee of the just-in-case controller.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
pub struct KneeParams {
    pub knee_thresh: f64,
    pub knee_slope: f64,
}

impl Default for KneeParams {
    fn default() -> Self {
        Self {
            knee_thresh: 1.0,
            knee_slope: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeScaleKind {
    Adaptive,
    /// Adaptive control plus a knee that damps ceiling growth.
    Knee(KneeParams),
}

/// Per-batch-element controller state. Checkpointed as a unit.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
pub struct TimeScaleInfo {
    pub time_scale: Vec<f64>,
    pub time_scale_max: Vec<f64>,
    pub time_scale_true: Vec<f64>,
}

impl TimeScaleInfo {
    pub fn new(batch_width: usize, params: &TimeScaleParams) -> Self {
        Self {
            time_scale: vec![params.base_min; batch_width],
            time_scale_max: vec![params.base_max; batch_width],
            time_scale_true: vec![-1.0; batch_width],
        }
    }

    pub fn batch_width(&self) -> usize {
        self.time_scale.len()
    }
}
