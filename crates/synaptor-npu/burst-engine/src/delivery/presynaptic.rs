// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Presynaptic-perspective convolution.
//!
//! The active range of each batch element is cut into contiguous partitions.
//! A partition scatters `a * dt_factor * w` row by row into its own scratch
//! channel; the scratch channels are then summed into the real channel in
//! partition order.

use std::time::Instant;

use rayon::prelude::*;
use synaptor_npu_neural::synapse::convolve_row;
use synaptor_npu_neural::{Patch, Weights};
use synaptor_npu_runtime::ActivityCube;

use super::{elapsed_us, ActiveSource, DeliveryStats, ScratchBuffers};
use crate::backend::{partition_range, CpuBackend};

/// Scatter one clipped patch into `values`.
#[inline]
fn convolve_patch(values: &mut [f32], weights: &Weights, arbor: usize, k: usize, patch: &Patch, a: f32) {
    let geometry = weights.geometry();
    let post = geometry.post_loc();
    let post_stride_y = post.nx * post.nf;
    let weight_stride_y = geometry.patch_stride_y();
    let run = patch.nx * geometry.nfp();
    let start = geometry.gsyn_patch_start(k);
    let w = weights.get_data_from_patch_index(arbor, k);
    for y in 0..patch.ny {
        let v0 = start + y * post_stride_y;
        let w0 = patch.offset + y * weight_stride_y;
        convolve_row(&mut values[v0..v0 + run], a, &w[w0..w0 + run]);
    }
}

/// Accumulate `source` into scratch and merge the result into every slice of `targets`.
fn scatter_and_merge(
    backend: &CpuBackend,
    scratch: &mut ScratchBuffers,
    source: ActiveSource<'_>,
    weights: &Weights,
    arbor: usize,
    dt_factor: f32,
    targets: &mut [&mut [f32]],
) -> DeliveryStats {
    let parts = scratch.num_partitions();
    let len = source.len();
    backend.install(|| {
        let start = Instant::now();
        scratch
            .partitions_mut()
            .par_iter_mut()
            .enumerate()
            .for_each(|(p, part)| {
                for idx in partition_range(len, parts, p) {
                    let (k, a) = source.get(idx);
                    if a == 0.0 {
                        continue;
                    }
                    let patch = weights.get_patch(k);
                    if patch.is_empty() {
                        continue;
                    }
                    part.touched = true;
                    convolve_patch(&mut part.values, weights, arbor, k, patch, a * dt_factor);
                }
            });
        let accumulate_us = elapsed_us(start);

        let start = Instant::now();
        let partitions_touched = scratch.num_touched();
        for target in targets.iter_mut() {
            scratch.merge_sum(target);
        }
        scratch.reset();
        DeliveryStats {
            active: len,
            partitions_touched,
            accumulate_us,
            merge_us: elapsed_us(start),
        }
    })
}

/// Deliver one arbor for every batch element of `cube` into `channel`.
pub fn deliver_convolve(
    backend: &CpuBackend,
    scratch: &mut ScratchBuffers,
    cube: &ActivityCube<'_>,
    weights: &Weights,
    arbor: usize,
    dt_factor: f32,
    channel: &mut [f32],
) -> DeliveryStats {
    let n_post = weights.geometry().post_loc().num_restricted();
    let mut stats = DeliveryStats::default();
    for (b, out) in channel.chunks_mut(n_post).enumerate().take(cube.loc.nbatch) {
        let source = ActiveSource::from_cube(cube, b);
        let batch_stats = scatter_and_merge(backend, scratch, source, weights, arbor, dt_factor, &mut [out]);
        stats.absorb(&batch_stats);
    }
    stats
}

/// Deliver every weight as if every presynaptic neuron had activity 1.
///
/// Every arbor contributes and every batch element receives the same input.
pub fn deliver_unit_input(
    backend: &CpuBackend,
    scratch: &mut ScratchBuffers,
    weights: &Weights,
    dt_factor: f32,
    channel: &mut [f32],
) -> DeliveryStats {
    let n_post = weights.geometry().post_loc().num_restricted();
    let source = ActiveSource::Uniform {
        len: weights.geometry().num_patches(),
        value: 1.0,
    };
    let mut targets: Vec<&mut [f32]> = channel.chunks_mut(n_post).collect();
    let mut stats = DeliveryStats::default();
    for arbor in 0..weights.num_arbors() {
        let arbor_stats = scatter_and_merge(backend, scratch, source, weights, arbor, dt_factor, &mut targets);
        stats.absorb(&arbor_stats);
    }
    stats
}
