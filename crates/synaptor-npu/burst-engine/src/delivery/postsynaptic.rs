// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Postsynaptic-perspective convolution.
//!
//! Each postsynaptic restricted neuron gathers through its transposed patch.
//! The patch is laid out `[dy][dx][f_pre]` from the nominal start, so for one
//! `dy` the valid `dx` range is a single contiguous run in both the weights and
//! the presynaptic extended activity.

use std::time::Instant;

use rayon::prelude::*;
use synaptor_npu_neural::synapse::dot_row;
use synaptor_npu_neural::types::k_index;
use synaptor_npu_neural::{LayerLoc, Weights};
use synaptor_npu_runtime::ActivityCube;

use super::{elapsed_us, DeliveryStats};
use crate::backend::CpuBackend;

/// Clip `[start, start + len)` against `[0, n)`; returns the valid offsets into the run.
#[inline]
pub(crate) fn valid_run(start: isize, len: usize, n: usize) -> (usize, usize) {
    let lo = (-start).clamp(0, len as isize) as usize;
    let hi = (n as isize - start).clamp(0, len as isize) as usize;
    (lo, hi.max(lo))
}

/// Gather `sum(a * w)` for one postsynaptic neuron.
#[inline]
fn gather(pre: &LayerLoc, activity: &[f32], data: &[f32], start: (isize, isize), nxp: usize, nyp: usize) -> f32 {
    let nf = pre.nf;
    let ex0 = start.0 + pre.halo.lt as isize;
    let ey0 = start.1 + pre.halo.up as isize;
    let (dx0, dx1) = valid_run(ex0, nxp, pre.nx_ext());
    let (dy0, dy1) = valid_run(ey0, nyp, pre.ny_ext());
    if dx0 == dx1 {
        return 0.0;
    }
    let run = (dx1 - dx0) * nf;
    let mut sum = 0.0;
    for dy in dy0..dy1 {
        let ey = (ey0 + dy as isize) as usize;
        let ex = (ex0 + dx0 as isize) as usize;
        let a0 = k_index(ex, ey, 0, pre.nx_ext(), pre.ny_ext(), nf);
        let w0 = (dy * nxp + dx0) * nf;
        sum += dot_row(&activity[a0..a0 + run], &data[w0..w0 + run]);
    }
    sum
}

/// Deliver one arbor through postsynaptic-perspective weights.
///
/// `post_weights` is the transpose of the connection's weights: its
/// presynaptic side is this connection's postsynaptic layer.
pub fn deliver_convolve(
    backend: &CpuBackend,
    cube: &ActivityCube<'_>,
    post_weights: &Weights,
    arbor: usize,
    dt_factor: f32,
    channel: &mut [f32],
) -> DeliveryStats {
    let bwd = post_weights.geometry();
    let post = *bwd.pre_loc();
    let pre = cube.loc;
    let (nxp, nyp) = (bwd.nxp(), bwd.nyp());
    let n_post = post.num_restricted();
    let start = Instant::now();
    let mut active = 0;

    backend.install(|| {
        for (b, out) in channel.chunks_mut(n_post).enumerate().take(pre.nbatch) {
            let activity = cube.batch_data(b);
            active += cube.num_active(b);
            out.par_iter_mut().enumerate().for_each(|(k_res, g)| {
                let k_ext = post.extended_index(k_res);
                let data = post_weights.get_data_from_patch_index(arbor, k_ext);
                let sum = gather(&pre, activity, data, bwd.nominal_start(k_ext), nxp, nyp);
                *g += dt_factor * sum;
            });
        }
    });

    DeliveryStats {
        active,
        partitions_touched: 0,
        accumulate_us: elapsed_us(start),
        merge_us: 0.0,
    }
}
