// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # synaptor
//!
//! Synaptic delivery and weight-patch engine for layered networks. A column
//! owns layers and the connections between them; each step it delivers
//! presynaptic activity through patch-shaped weights (or pooling
//! footprints) into postsynaptic channels, updates layers, runs weight
//! updaters and adapts the timestep.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use synaptor::prelude::*;
//!
//! let mut column = Column::new(ColumnSettings::new("demo", 16, 16, 1))?;
//! column.add_layer(LayerSpec::new("Input", 1))?;
//! column.add_layer(LayerSpec::new("Output", 4).with_update(LayerUpdate::Linear))?;
//! column.add_connection(ConnectionSpec::hyper("InputToOutput", "Input", "Output").with_patch(5, 5))?;
//! column.initialize()?;
//! column.advance_time()?;
//! # Ok::<(), synaptor::neural::NpuError>(())
//! ```
//!
//! ## Feature Flags
//! - **`plasticity`** (default): re-export the weight updaters
//! - **`file-logging`**: per-run log folders for `run_column`

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export foundation
pub use synaptor_config as config;
pub use synaptor_observability as observability;

// Re-export the NPU subsystem
pub use synaptor_npu_burst_engine as burst_engine;
pub use synaptor_npu_neural as neural;
pub use synaptor_npu_runtime as runtime;

#[cfg(feature = "plasticity")]
pub use synaptor_npu_plasticity as plasticity;

/// Prelude - commonly used types and traits
pub mod prelude {
    pub use crate::burst_engine::{
        Column, ColumnSettings, ConnectionKind, ConnectionSpec, DeliveryStrategy, LayerSpec,
        LayerUpdate, Perspective, WeightInit,
    };
    pub use crate::neural::{AccumulateType, LayerLoc, NpuError, PatchGeometry, TimeScaleKind, TimeScaleParams};
    pub use crate::runtime::{ChannelId, Communicator, LocalCommunicator};

    #[cfg(feature = "plasticity")]
    pub use crate::plasticity::{CopyUpdater, HebbianUpdater};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_facade_imports() {
        use crate::prelude::*;
        let spec = LayerSpec::new("Input", 2);
        assert_eq!(spec.nf, 2);
        assert_eq!(ChannelId::Excitatory, ChannelId::default());
    }
}
