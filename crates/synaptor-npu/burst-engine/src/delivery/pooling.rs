// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Forward pooling.
//!
//! Patches connect feature `f` only to feature `f`, so every kernel walks a
//! patch row with stride `nfp` starting at the presynaptic feature. Max pooling
//! records the global extended index of the winning presynaptic neuron per
//! postsynaptic restricted neuron; transpose pooling reads it back.

use std::time::Instant;

use rayon::prelude::*;
use synaptor_npu_neural::synapse::{accumulate_max_pooling, accumulate_sum_pooling};
use synaptor_npu_neural::types::{feature_index, k_index};
use synaptor_npu_neural::{AccumulateType, LayerLoc, PatchGeometry};
use synaptor_npu_runtime::ActivityCube;

use super::postsynaptic::valid_run;
use super::{elapsed_us, ActiveSource, DeliveryStats, ScratchBuffers};
use crate::backend::{partition_range, CpuBackend};

/// Per-element weight of a sum or average pool.
pub fn pooling_weight(accumulate: AccumulateType, geometry: &PatchGeometry) -> f32 {
    match accumulate {
        AccumulateType::AvgPooling => 1.0 / geometry.effective_footprint(),
        _ => 1.0,
    }
}

/// Presynaptic perspective. `post_index` holds one slot per postsynaptic
/// restricted neuron per batch element and is only written for max pooling.
#[allow(clippy::too_many_arguments)]
pub fn deliver_presynaptic(
    backend: &CpuBackend,
    scratch: &mut ScratchBuffers,
    cube: &ActivityCube<'_>,
    geometry: &PatchGeometry,
    accumulate: AccumulateType,
    channel: &mut [f32],
    post_index: &mut [i64],
) -> DeliveryStats {
    let pre = cube.loc;
    let post = geometry.post_loc();
    let n_post = post.num_restricted();
    let post_stride_y = post.nx * post.nf;
    let nfp = geometry.nfp();
    let weight = pooling_weight(accumulate, geometry);
    let is_max = accumulate == AccumulateType::MaxPooling;
    let parts = scratch.num_partitions();
    let mut stats = DeliveryStats::default();

    backend.install(|| {
        for b in 0..pre.nbatch {
            let source = ActiveSource::from_cube(cube, b);
            let len = source.len();
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
                        let patch = geometry.patch(k);
                        if patch.is_empty() {
                            continue;
                        }
                        part.touched = true;
                        let first = geometry.gsyn_patch_start(k) + feature_index(k, pre.nf);
                        let run = (patch.nx - 1) * nfp + 1;
                        let winner = pre.global_extended_index(k) as i64;
                        for y in 0..patch.ny {
                            let v0 = first + y * post_stride_y;
                            let values = &mut part.values[v0..v0 + run];
                            if is_max {
                                let gate = &mut part.winners[v0..v0 + run];
                                accumulate_max_pooling(values, Some(gate), nfp, a, winner);
                            } else {
                                accumulate_sum_pooling(values, nfp, a, weight);
                            }
                        }
                    }
                });
            stats.accumulate_us += elapsed_us(start);

            let start = Instant::now();
            let out = &mut channel[b * n_post..(b + 1) * n_post];
            stats.partitions_touched += scratch.num_touched();
            if is_max {
                scratch.merge_max_value(out, &mut post_index[b * n_post..(b + 1) * n_post]);
            } else {
                scratch.merge_sum(out);
            }
            scratch.reset();
            stats.merge_us += elapsed_us(start);
            stats.active += len;
        }
    });
    stats
}

/// Visit every nonzero presynaptic neuron of feature `f` in the window that
/// starts at `start`, in ascending extended index.
#[inline]
fn for_each_source(
    pre: &LayerLoc,
    activity: &[f32],
    start: (isize, isize),
    f: usize,
    nxp: usize,
    nyp: usize,
    mut each: impl FnMut(usize, f32),
) {
    let ex0 = start.0 + pre.halo.lt as isize;
    let ey0 = start.1 + pre.halo.up as isize;
    let (dx0, dx1) = valid_run(ex0, nxp, pre.nx_ext());
    let (dy0, dy1) = valid_run(ey0, nyp, pre.ny_ext());
    for dy in dy0..dy1 {
        let ey = (ey0 + dy as isize) as usize;
        for dx in dx0..dx1 {
            let ex = (ex0 + dx as isize) as usize;
            let k_pre = k_index(ex, ey, f, pre.nx_ext(), pre.ny_ext(), pre.nf);
            let a = activity[k_pre];
            if a != 0.0 {
                each(k_pre, a);
            }
        }
    }
}

/// Postsynaptic perspective through the transposed pooling geometry.
///
/// Presynaptic neurons are visited in ascending extended index with the
/// channel value competing first, which reproduces the presynaptic result.
/// `weight` is [`pooling_weight`] of the forward geometry.
#[allow(clippy::too_many_arguments)]
pub fn deliver_postsynaptic(
    backend: &CpuBackend,
    cube: &ActivityCube<'_>,
    transposed: &PatchGeometry,
    accumulate: AccumulateType,
    weight: f32,
    channel: &mut [f32],
    post_index: &mut [i64],
) -> DeliveryStats {
    let pre = cube.loc;
    let post = *transposed.pre_loc();
    let n_post = post.num_restricted();
    let (nxp, nyp) = (transposed.nxp(), transposed.nyp());
    let window = |k_res: usize| {
        let k_ext = post.extended_index(k_res);
        (transposed.nominal_start(k_ext), feature_index(k_res, post.nf))
    };
    let start = Instant::now();
    let mut active = 0;

    backend.install(|| {
        for b in 0..pre.nbatch {
            let activity = cube.batch_data(b);
            active += cube.num_active(b);
            let out = &mut channel[b * n_post..(b + 1) * n_post];
            if accumulate == AccumulateType::MaxPooling {
                let gates = &mut post_index[b * n_post..(b + 1) * n_post];
                out.par_iter_mut()
                    .zip(gates.par_iter_mut())
                    .enumerate()
                    .for_each(|(k_res, (g, gate))| {
                        let (origin, f) = window(k_res);
                        for_each_source(&pre, activity, origin, f, nxp, nyp, |k_pre, a| {
                            if a > *g {
                                *g = a;
                                *gate = pre.global_extended_index(k_pre) as i64;
                            }
                        });
                    });
            } else {
                out.par_iter_mut().enumerate().for_each(|(k_res, g)| {
                    let (origin, f) = window(k_res);
                    for_each_source(&pre, activity, origin, f, nxp, nyp, |_, a| {
                        *g += a * weight;
                    });
                });
            }
        }
    });

    DeliveryStats {
        active,
        partitions_touched: 0,
        accumulate_us: elapsed_us(start),
        merge_us: 0.0,
    }
}
