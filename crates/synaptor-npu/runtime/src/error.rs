// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for runtime operations

use core::fmt;

use synaptor_npu_neural::NpuError;

/// Runtime errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// A delay beyond the publication history was requested
    DelayOutOfRange {
        /// Layer name
        layer: String,
        /// Requested delay in timesteps
        delay: usize,
        /// Number of stored levels
        levels: usize,
    },

    /// Buffer length does not match the layer geometry
    SizeMismatch {
        /// Expected element count
        expected: usize,
        /// Provided element count
        actual: usize,
    },

    /// Shape change requested after buffers were allocated
    AlreadyAllocated(String),

    /// Buffers used before allocation
    NotAllocated(String),

    /// Channel not allocated on this layer
    MissingChannel {
        /// Layer name
        layer: String,
        /// Channel name
        channel: String,
    },

    /// Invalid parameters provided
    InvalidParameters(String),

    /// Checkpoint read/write failure
    Checkpoint(String),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::DelayOutOfRange { layer, delay, levels } => write!(
                f,
                "{}: delay {} exceeds publication history of {} levels",
                layer, delay, levels
            ),
            RuntimeError::SizeMismatch { expected, actual } => {
                write!(f, "Size mismatch: expected {}, got {}", expected, actual)
            }
            RuntimeError::AlreadyAllocated(layer) => {
                write!(f, "{}: buffers already allocated", layer)
            }
            RuntimeError::NotAllocated(layer) => write!(f, "{}: buffers not allocated", layer),
            RuntimeError::MissingChannel { layer, channel } => {
                write!(f, "{}: channel {} is not allocated", layer, channel)
            }
            RuntimeError::InvalidParameters(msg) => write!(f, "Invalid parameters: {}", msg),
            RuntimeError::Checkpoint(msg) => write!(f, "Checkpoint error: {}", msg),
        }
    }
}

impl std::error::Error for RuntimeError {}

impl From<RuntimeError> for NpuError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Checkpoint(msg) => NpuError::Checkpoint(msg),
            RuntimeError::SizeMismatch { expected, actual } => {
                NpuError::ArraySizeMismatch { expected, actual }
            }
            other => NpuError::Runtime(other.to_string()),
        }
    }
}

/// Result type for runtime operations
pub type Result<T> = core::result::Result<T, RuntimeError>;
