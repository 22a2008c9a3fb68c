// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # Delivery Backend Abstraction
//!
//! The CPU backend is always present. Accelerated delivery is an optional
//! plug-in behind [`AcceleratedDelivery`]; a connection that asks for it is
//! routed there only when the column runs with an accelerator attached.

mod cpu;

pub use cpu::{partition_range, CpuBackend};

use synaptor_npu_neural::{NpuError, Result, Weights};
use synaptor_npu_runtime::ActivityCube;
use tracing::info;

/// One connection's delivery handed to an accelerator.
pub struct AcceleratedRequest<'a> {
    /// Connection name
    pub connection: &'a str,
    /// Presynaptic snapshot at the arbor's delay
    pub cube: ActivityCube<'a>,
    /// Presynaptic-perspective weights
    pub weights: &'a Weights,
    pub arbor: usize,
    pub dt_factor: f32,
    /// Postsynaptic restricted channel, all batch elements
    pub channel: &'a mut [f32],
}

/// Accelerated delivery plug-in.
///
/// Implementations must produce the same channel contents as the CPU
/// presynaptic path within floating-point tolerance.
pub trait AcceleratedDelivery: Send + Sync {
    fn backend_name(&self) -> &str;

    /// Accumulate one arbor into `request.channel`.
    fn deliver(&self, request: AcceleratedRequest<'_>) -> Result<()>;
}

/// Backend type for construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendType {
    #[default]
    Cpu,

    /// Accelerated delivery through an attached [`AcceleratedDelivery`]
    Gpu,

    /// Gpu when an accelerator is attached, Cpu otherwise
    Auto,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::Cpu => write!(f, "cpu"),
            BackendType::Gpu => write!(f, "gpu"),
            BackendType::Auto => write!(f, "auto"),
        }
    }
}

impl std::str::FromStr for BackendType {
    type Err = NpuError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "cpu" => Ok(BackendType::Cpu),
            "gpu" | "accelerated" => Ok(BackendType::Gpu),
            "auto" => Ok(BackendType::Auto),
            _ => Err(NpuError::InvalidBackend(s.to_string())),
        }
    }
}

/// Backend selection decision with rationale
#[derive(Debug, Clone, PartialEq)]
pub struct BackendDecision {
    pub backend_type: BackendType,
    pub reason: String,
}

/// Resolve the requested backend against what is attached.
///
/// # Errors
/// `BackendUnavailable` when `Gpu` is requested without an accelerator.
pub fn select_backend(requested: BackendType, accelerator_attached: bool) -> Result<BackendDecision> {
    let decision = match requested {
        BackendType::Cpu => BackendDecision {
            backend_type: BackendType::Cpu,
            reason: "CPU requested via configuration".to_string(),
        },
        BackendType::Gpu if accelerator_attached => BackendDecision {
            backend_type: BackendType::Gpu,
            reason: "Accelerated delivery requested and attached".to_string(),
        },
        BackendType::Gpu => {
            return Err(NpuError::BackendUnavailable(
                "gpu backend requested but no accelerator is attached".to_string(),
            ))
        }
        BackendType::Auto if accelerator_attached => BackendDecision {
            backend_type: BackendType::Gpu,
            reason: "Accelerator attached, auto-selected".to_string(),
        },
        BackendType::Auto => BackendDecision {
            backend_type: BackendType::Cpu,
            reason: "No accelerator attached, auto-selected CPU".to_string(),
        },
    };
    info!(backend = %decision.backend_type, reason = %decision.reason, "delivery backend selected");
    Ok(decision)
}
