// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! # Synaptor Burst Engine
//!
//! Synaptic delivery for layered networks with patch-structured weights.
//!
//! ## Delivery paths
//! - **Presynaptic**: scatter each active presynaptic neuron's patch into
//!   per-partition scratch buffers, merged in partition order
//! - **Postsynaptic**: gather each postsynaptic neuron's input through the
//!   transposed weights, no scratch needed
//! - **Pooling**: max, sum or average over the patch window, with winner
//!   tracking that transpose pooling routes gradients back through
//! - **Accelerated**: handed to an attached [`AcceleratedDelivery`]
//!
//! Results do not depend on the thread count: the partition count is fixed
//! and merges run in a fixed order.
//!
//! ## Weight sharing
//! Clone connections share another connection's weights, transposes hold a
//! derived copy that is rebuilt whenever its source changes, and copies are
//! refreshed by a [`CopyUpdater`](synaptor_npu_plasticity::CopyUpdater).

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod abort;
pub mod backend;
pub mod column;
pub mod connection;
pub mod delivery;
pub mod init_scheduler;
pub mod weight_arena;

pub use abort::abort_collective;
pub use backend::{
    select_backend, AcceleratedDelivery, AcceleratedRequest, BackendDecision, BackendType,
    CpuBackend,
};
pub use column::{Column, ColumnSettings, LayerSpec, LayerUpdate};
pub use connection::{ConnectionKind, ConnectionSpec, WeightInit};
pub use delivery::{DeliveryStats, DeliveryStrategy, Perspective};
pub use weight_arena::{WeightArena, WeightHandle};
