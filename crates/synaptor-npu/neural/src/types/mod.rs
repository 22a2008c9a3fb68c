// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Core type definitions shared by every synaptor crate.

pub mod error;
pub mod init_status;
pub mod layer_loc;

pub use error::{Error, NpuError, Result};
pub use init_status::InitStatus;
pub use layer_loc::{feature_index, k_index, kx_pos, ky_pos, Halo, LayerLoc};
