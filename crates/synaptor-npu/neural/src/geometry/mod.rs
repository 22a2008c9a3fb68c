// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Patch geometry: where each presynaptic neuron's weights land in the postsynaptic layer.

mod patch;
mod scale;

pub use patch::{Patch, PatchGeometry};
pub use scale::ScaleRelation;
