// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Hebbian weight update.
//!
//! For every active presynaptic neuron and every postsynaptic neuron in its
//! clipped patch, `dW = rate * pre * post` is added to the data patch the
//! presynaptic neuron maps to. Shared data patches sum the contributions of
//! every neuron that maps to them.

use rayon::prelude::*;
use synaptor_npu_neural::{NpuError, Result, Weights};
use synaptor_npu_runtime::ActivityCube;
use tracing::trace;

#[derive(Debug, Clone)]
pub struct HebbianUpdater {
    name: String,
    rate: f32,
    last_update_time: f64,
}

impl HebbianUpdater {
    pub fn new(name: &str, rate: f32) -> Self {
        Self {
            name: name.to_string(),
            rate,
            last_update_time: 0.0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    pub fn last_update_time(&self) -> f64 {
        self.last_update_time
    }

    /// Apply one update.
    ///
    /// `pre[arbor]` is the presynaptic snapshot at that arbor's delay and
    /// `post` the postsynaptic extended activity of every batch element.
    /// Returns whether any weight changed; if so the timestamp becomes `sim_time`.
    pub fn update_state(
        &mut self,
        sim_time: f64,
        pre: &[ActivityCube<'_>],
        post: &[f32],
        weights: &mut Weights,
    ) -> Result<bool> {
        if pre.len() != weights.num_arbors() {
            return Err(NpuError::ArraySizeMismatch {
                expected: weights.num_arbors(),
                actual: pre.len(),
            });
        }
        let mut changed = false;
        for (arbor, cube) in pre.iter().enumerate() {
            let dw = self.arbor_increment(cube, post, weights, arbor)?;
            if dw.iter().any(|&d| d != 0.0) {
                for (w, d) in weights.arbor_data_mut(arbor).iter_mut().zip(&dw) {
                    *w += d;
                }
                changed = true;
            }
        }
        if changed {
            weights.set_timestamp(sim_time);
            self.last_update_time = sim_time;
            trace!(updater = %self.name, sim_time, "hebbian update applied");
        }
        Ok(changed)
    }

    fn arbor_increment(
        &self,
        cube: &ActivityCube<'_>,
        post: &[f32],
        weights: &Weights,
        arbor: usize,
    ) -> Result<Vec<f32>> {
        let geometry = weights.geometry();
        let post_loc = geometry.post_loc();
        let nbatch = cube.loc.nbatch;
        let n_post = post_loc.num_extended();
        if post.len() != n_post * nbatch {
            return Err(NpuError::ArraySizeMismatch {
                expected: n_post * nbatch,
                actual: post.len(),
            });
        }
        let post_stride_y = post_loc.nx_ext() * post_loc.nf;
        let weight_stride_y = geometry.patch_stride_y();
        let volume = geometry.patch_volume();
        let len = weights.arbor_data(arbor).len();
        let rate = self.rate;

        // One increment per batch element, summed in batch order.
        let per_batch: Vec<Vec<f32>> = (0..nbatch)
            .into_par_iter()
            .map(|b| {
                let mut dw = vec![0.0f32; len];
                let post_b = &post[b * n_post..(b + 1) * n_post];
                let entries: Box<dyn Iterator<Item = (usize, f32)>> = match cube.active_list(b) {
                    Some(list) => Box::new(list.iter().map(|e| (e.index, e.value))),
                    None => Box::new(cube.batch_data(b).iter().copied().enumerate()),
                };
                for (k, a) in entries {
                    if a == 0.0 {
                        continue;
                    }
                    let patch = geometry.patch(k);
                    if patch.is_empty() {
                        continue;
                    }
                    let run = patch.nx * geometry.nfp();
                    let base = weights.data_index(k) * volume + patch.offset;
                    let p0 = geometry.a_post_offset(k);
                    for y in 0..patch.ny {
                        let post_row = &post_b[p0 + y * post_stride_y..p0 + y * post_stride_y + run];
                        let d0 = base + y * weight_stride_y;
                        for (d, p) in dw[d0..d0 + run].iter_mut().zip(post_row) {
                            *d += rate * a * p;
                        }
                    }
                }
                dw
            })
            .collect();

        let mut total = vec![0.0f32; len];
        for dw in per_batch {
            for (t, d) in total.iter_mut().zip(dw) {
                *t += d;
            }
        }
        Ok(total)
    }
}
