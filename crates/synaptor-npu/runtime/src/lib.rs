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

//! # Synaptor Runtime
//!
//! The state the delivery engine reads from and writes into:
//! - **Layers**: activity in extended space, accumulation channels in restricted space
//! - **Publisher**: circular history of published activity, read back per delay
//! - **Communicator**: process-group rank, size and barrier
//! - **Checkpointer**: named, serializable state entries
//!
//! ## Usage
//!
//! ```rust
//! use synaptor_npu_runtime::{ChannelId, LayerBuffer};
//! use synaptor_npu_neural::LayerLoc;
//!
//! let mut layer = LayerBuffer::new("Retina", LayerLoc::new(8, 8, 1, 1), 0, 0);
//! layer.require_margin(2, 2).unwrap();
//! layer.require_channel(ChannelId::Excitatory).unwrap();
//! layer.allocate().unwrap();
//! assert_eq!(layer.loc().nx_ext(), 12);
//! ```

#![warn(missing_docs)]

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod channel;
pub mod checkpoint;
pub mod communicator;
pub mod error;
pub mod layer;
pub mod publisher;

pub use channel::ChannelId;
pub use checkpoint::{CheckpointEntry, Checkpointer};
pub use communicator::{Communicator, LocalCommunicator};
pub use error::{Result, RuntimeError};
pub use layer::LayerBuffer;
pub use publisher::{ActivityCube, Publisher, PublisherState, SparseEntry};
