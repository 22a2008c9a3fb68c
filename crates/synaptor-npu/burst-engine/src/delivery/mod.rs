// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # Synaptic Delivery
//!
//! Moves presynaptic activity into postsynaptic accumulation channels.
//!
//! Two perspectives compute the same sums:
//! - **presynaptic**: every active presynaptic neuron scatters `a * w` over its
//!   clipped patch. Work is split into a fixed number of partitions, each with
//!   a private scratch channel, merged afterwards in partition order.
//! - **postsynaptic**: every postsynaptic neuron gathers `sum(a * w)` through the
//!   transposed weights. Writes are disjoint so no scratch is needed.
//!
//! Both are deterministic for any thread count. Pooling variants replace the
//! kernel with max or sum; transpose pooling routes values back through the
//! winners recorded by a forward max-pooling connection.

pub mod pooling;
pub mod postsynaptic;
pub mod presynaptic;
pub mod scratch;
pub mod transpose_pooling;

pub use scratch::ScratchBuffers;

use std::sync::OnceLock;

use synaptor_npu_neural::{AccumulateType, NpuError, Result};
use synaptor_npu_runtime::{ActivityCube, SparseEntry};

/// Which side of the connection drives the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Perspective {
    #[default]
    Presynaptic,
    Postsynaptic,
}

/// Delivery path chosen once per connection at setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStrategy {
    PresynapticConvolve,
    PostsynapticConvolve,
    Pooling {
        accumulate: AccumulateType,
        perspective: Perspective,
    },
    TransposePooling {
        accumulate: AccumulateType,
    },
    /// Handed to the attached accelerator
    Accelerated,
}

impl DeliveryStrategy {
    /// Pick the path for a weighted connection.
    ///
    /// `accelerated` is true when the connection asked for accelerated
    /// delivery and the column has an accelerator.
    pub fn for_weights(post_perspective: bool, accelerated: bool) -> Self {
        if accelerated {
            DeliveryStrategy::Accelerated
        } else if post_perspective {
            DeliveryStrategy::PostsynapticConvolve
        } else {
            DeliveryStrategy::PresynapticConvolve
        }
    }

    pub fn for_pooling(component: &str, accumulate: AccumulateType, post_perspective: bool) -> Result<Self> {
        if !accumulate.is_pooling() {
            return Err(NpuError::configuration(
                component,
                format!("pooling connections need a pooling accumulate type, got {}", accumulate),
            ));
        }
        let perspective = if post_perspective {
            Perspective::Postsynaptic
        } else {
            Perspective::Presynaptic
        };
        Ok(DeliveryStrategy::Pooling {
            accumulate,
            perspective,
        })
    }

    pub fn for_transpose_pooling(
        component: &str,
        accumulate: AccumulateType,
        post_perspective: bool,
    ) -> Result<Self> {
        if post_perspective {
            return Err(NpuError::Unsupported {
                component: component.to_string(),
                message: "transpose pooling from the postsynaptic perspective is not implemented"
                    .to_string(),
            });
        }
        Ok(DeliveryStrategy::TransposePooling { accumulate })
    }

    /// Whether the presynaptic scratch partitions are used.
    pub fn uses_scratch(self) -> bool {
        matches!(
            self,
            DeliveryStrategy::PresynapticConvolve
                | DeliveryStrategy::TransposePooling { .. }
                | DeliveryStrategy::Pooling {
                    perspective: Perspective::Presynaptic,
                    ..
                }
        )
    }

    /// Whether a forward max-pooling winner buffer is kept.
    pub fn records_winners(self) -> bool {
        matches!(
            self,
            DeliveryStrategy::Pooling {
                accumulate: AccumulateType::MaxPooling,
                ..
            }
        )
    }
}

/// Counters and timings of one delivery call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryStats {
    /// Presynaptic neurons visited, summed over batch elements and arbors
    pub active: usize,
    /// Scratch partitions that received input
    pub partitions_touched: usize,
    /// Time spent accumulating (μs)
    pub accumulate_us: f64,
    /// Time spent merging partitions (μs)
    pub merge_us: f64,
}

impl DeliveryStats {
    pub fn absorb(&mut self, other: &DeliveryStats) {
        self.active += other.active;
        self.partitions_touched += other.partitions_touched;
        self.accumulate_us += other.accumulate_us;
        self.merge_us += other.merge_us;
    }
}

/// Runtime-gated delivery tracing.
/// Enable with:
/// - SYNAPTOR_NPU_TRACE_DELIVERY=1
///   Optional filter:
/// - SYNAPTOR_NPU_TRACE_CONN=<connection name>
pub(crate) struct DeliveryTraceCfg {
    enabled: bool,
    conn_filter: Option<String>,
}

fn delivery_trace_cfg() -> &'static DeliveryTraceCfg {
    static CFG: OnceLock<DeliveryTraceCfg> = OnceLock::new();
    CFG.get_or_init(|| {
        let enabled = std::env::var("SYNAPTOR_NPU_TRACE_DELIVERY")
            .ok()
            .as_deref()
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let conn_filter = std::env::var("SYNAPTOR_NPU_TRACE_CONN").ok();
        DeliveryTraceCfg {
            enabled,
            conn_filter,
        }
    })
}

pub(crate) fn trace_enabled(connection: &str) -> bool {
    let cfg = delivery_trace_cfg();
    cfg.enabled
        && cfg
            .conn_filter
            .as_deref()
            .map_or(true, |filter| filter == connection)
}

/// Scale applied to presynaptic activity before accumulation.
///
/// Rate-coded layers delivering into rate-to-spike-count connections scale by
/// `dt`; everything else by 1.
pub fn dt_factor(convert_rate_to_spike_count: bool, pre_spiking: bool, dt: f64) -> f32 {
    if convert_rate_to_spike_count && !pre_spiking {
        dt as f32
    } else {
        1.0
    }
}

/// Presynaptic neurons to visit for one batch element.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ActiveSource<'a> {
    /// Every extended neuron, zeros skipped
    Dense(&'a [f32]),
    /// Published active list
    Sparse(&'a [SparseEntry]),
    /// Every extended neuron with the same value
    Uniform { len: usize, value: f32 },
}

impl<'a> ActiveSource<'a> {
    pub(crate) fn from_cube(cube: &ActivityCube<'a>, b: usize) -> Self {
        match cube.active_list(b) {
            Some(list) => ActiveSource::Sparse(list),
            None => ActiveSource::Dense(cube.batch_data(b)),
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        match self {
            ActiveSource::Dense(data) => data.len(),
            ActiveSource::Sparse(list) => list.len(),
            ActiveSource::Uniform { len, .. } => *len,
        }
    }

    /// (extended index, activity) of the `idx`-th entry.
    #[inline]
    pub(crate) fn get(&self, idx: usize) -> (usize, f32) {
        match self {
            ActiveSource::Dense(data) => (idx, data[idx]),
            ActiveSource::Sparse(list) => (list[idx].index, list[idx].value),
            ActiveSource::Uniform { value, .. } => (idx, *value),
        }
    }
}

/// Microseconds since `start`.
#[inline]
pub(crate) fn elapsed_us(start: std::time::Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1e6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dt_factor() {
        assert_eq!(dt_factor(true, false, 0.5), 0.5);
        assert_eq!(dt_factor(true, true, 0.5), 1.0);
        assert_eq!(dt_factor(false, false, 0.5), 1.0);
    }

    #[test]
    fn test_transpose_pooling_post_perspective_rejected() {
        let err = DeliveryStrategy::for_transpose_pooling("T", AccumulateType::MaxPooling, true)
            .unwrap_err();
        assert!(matches!(err, NpuError::Unsupported { .. }));
    }

    #[test]
    fn test_pooling_requires_pooling_accumulate() {
        assert!(DeliveryStrategy::for_pooling("P", AccumulateType::Convolve, false).is_err());
        let s = DeliveryStrategy::for_pooling("P", AccumulateType::MaxPooling, false).unwrap();
        assert!(s.uses_scratch());
        assert!(s.records_winners());
        let s = DeliveryStrategy::for_pooling("P", AccumulateType::SumPooling, true).unwrap();
        assert!(!s.uses_scratch());
    }

    #[test]
    fn test_active_source_sparse() {
        let list = [SparseEntry { index: 7, value: 2.0 }];
        let source = ActiveSource::Sparse(&list);
        assert_eq!(source.len(), 1);
        assert_eq!(source.get(0), (7, 2.0));
    }
}
