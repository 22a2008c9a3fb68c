// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # Synaptor Neural Core
//!
//! The pure, data-oriented part of synaptic delivery:
//! - **Types**: layer locations, index arithmetic, error type
//! - **Geometry**: per-presynaptic-neuron patch shapes clipped against the postsynaptic layer
//! - **Weights**: per-arbor weight buffers with a patch-to-data lookup table
//! - **Synapse**: row kernels applied by the delivery engine (convolve, max/sum pooling)
//! - **Timescale**: the adaptive timestep controller and its knee variant
//!
//! Nothing in this crate owns threads or layer activity; the burst engine drives it.

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod geometry;
pub mod synapse;
pub mod timescale;
pub mod types;
pub mod weights;

pub use geometry::{Patch, PatchGeometry, ScaleRelation};
pub use synapse::AccumulateType;
pub use timescale::{
    AdaptiveTimeScaleController, KneeParams, TimeScaleInfo, TimeScaleKind, TimeScaleParams,
};
pub use types::{Error, Halo, InitStatus, LayerLoc, NpuError, Result};
pub use weights::{fill_transposed, transpose_weights, Weights};
