// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Transpose pooling: send values back along a forward pooling connection.
//!
//! The presynaptic layer here is the forward connection's postsynaptic layer.
//! Max pooling routes each value to the forward winner only; sum and average
//! pooling spread it feature-wise over the transposed patch with weight 1.

use std::time::Instant;

use rayon::prelude::*;
use synaptor_npu_neural::synapse::accumulate_sum_pooling;
use synaptor_npu_neural::types::feature_index;
use synaptor_npu_neural::{AccumulateType, PatchGeometry};
use synaptor_npu_runtime::ActivityCube;

use super::{elapsed_us, ActiveSource, DeliveryStats, ScratchBuffers};
use crate::backend::{partition_range, CpuBackend};

/// Deliver one arbor.
///
/// `geometry` is the transpose of the forward pooling geometry, `winners` the
/// forward connection's winner buffer (one slot per forward postsynaptic
/// restricted neuron per batch element).
#[allow(clippy::too_many_arguments)]
pub fn deliver(
    backend: &CpuBackend,
    scratch: &mut ScratchBuffers,
    cube: &ActivityCube<'_>,
    geometry: &PatchGeometry,
    accumulate: AccumulateType,
    winners: &[i64],
    channel: &mut [f32],
) -> DeliveryStats {
    let pre = cube.loc;
    let post = *geometry.post_loc();
    let n_pre = pre.num_restricted();
    let n_post = post.num_restricted();
    let post_stride_y = post.nx * post.nf;
    let nfp = geometry.nfp();
    let is_max = accumulate == AccumulateType::MaxPooling;
    let parts = scratch.num_partitions();
    let mut stats = DeliveryStats::default();

    backend.install(|| {
        for b in 0..pre.nbatch {
            let source = ActiveSource::from_cube(cube, b);
            let len = source.len();
            // Only max pooling records winners.
            let batch_winners: &[i64] = if is_max { &winners[b * n_pre..(b + 1) * n_pre] } else { &[] };
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
                        if is_max {
                            // Halo neurons are skipped. Across processes this drops halo
                            // values that are interior on a neighbour; single-process only.
                            let Some(k_res) = pre.restricted_index(k) else {
                                continue;
                            };
                            let winner = batch_winners[k_res];
                            if winner < 0 {
                                continue;
                            }
                            let Some(target) = post.local_restricted_from_global_extended(winner as usize)
                            else {
                                continue;
                            };
                            part.touched = true;
                            let v = &mut part.values[target];
                            if a.abs() > v.abs() {
                                *v = a;
                            }
                        } else {
                            let patch = geometry.patch(k);
                            if patch.is_empty() {
                                continue;
                            }
                            part.touched = true;
                            let first = geometry.gsyn_patch_start(k) + feature_index(k, pre.nf);
                            let run = (patch.nx - 1) * nfp + 1;
                            for y in 0..patch.ny {
                                let v0 = first + y * post_stride_y;
                                accumulate_sum_pooling(&mut part.values[v0..v0 + run], nfp, a, 1.0);
                            }
                        }
                    }
                });
            stats.accumulate_us += elapsed_us(start);

            let start = Instant::now();
            let out = &mut channel[b * n_post..(b + 1) * n_post];
            stats.partitions_touched += scratch.num_touched();
            if is_max {
                scratch.merge_max_magnitude(out);
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
