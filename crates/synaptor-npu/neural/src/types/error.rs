// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for synaptic delivery and weight handling

/// Errors raised while configuring or running delivery.
///
/// Configuration-time variants name the offending component so the driver can
/// report them before the collective exit.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NpuError {
    #[error("{component}: configuration error: {message}")]
    Configuration { component: String, message: String },

    #[error("{component}: dimension mismatch: {message}")]
    DimensionMismatch { component: String, message: String },

    #[error("{component}: required dependency \"{dependency}\" does not exist")]
    MissingDependency {
        component: String,
        dependency: String,
    },

    #[error("initialization made no progress; pending components: {}", pending.join(", "))]
    DependencyCycle { pending: Vec<String> },

    #[error("{component}: {message}")]
    Unsupported { component: String, message: String },

    #[error("Invalid backend: {0}")]
    InvalidBackend(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Index {index} out of bounds (size {size}) in {context}")]
    OutOfBounds {
        index: usize,
        size: usize,
        context: String,
    },

    #[error("Array size mismatch: expected {expected}, got {actual}")]
    ArraySizeMismatch { expected: usize, actual: usize },

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl NpuError {
    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        NpuError::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn dimension_mismatch(component: impl Into<String>, message: impl Into<String>) -> Self {
        NpuError::DimensionMismatch {
            component: component.into(),
            message: message.into(),
        }
    }

    /// True for errors detected while wiring the network, before any delivery.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            NpuError::Configuration { .. }
                | NpuError::DimensionMismatch { .. }
                | NpuError::MissingDependency { .. }
                | NpuError::DependencyCycle { .. }
                | NpuError::Unsupported { .. }
        )
    }
}

pub type Result<T> = core::result::Result<T, NpuError>;
pub type Error = NpuError;
