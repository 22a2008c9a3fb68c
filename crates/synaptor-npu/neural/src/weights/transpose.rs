// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Postsynaptic-indexed weights built by transposing presynaptic weights.
//!
//! The result has one data patch per postsynaptic extended neuron; each patch
//! lists, for every presynaptic neuron in the transposed footprint, the weight
//! that neuron's patch assigns to this postsynaptic neuron (zero when the
//! presynaptic neuron is outside the extended buffer or does not reach it).

use std::sync::Arc;

use crate::geometry::PatchGeometry;
use crate::types::{feature_index, k_index, kx_pos, ky_pos, NpuError, Result};
use crate::weights::Weights;

/// Build postsynaptic-perspective weights for `pre_weights`.
///
/// `post_geometry` must be `pre_weights.geometry().transposed(..)` or an
/// equivalent geometry with the layers swapped.
pub fn transpose_weights(pre_weights: &Weights, post_geometry: Arc<PatchGeometry>) -> Result<Weights> {
    let fwd = pre_weights.geometry();
    if !post_geometry.pre_loc().same_extent(fwd.post_loc())
        || !post_geometry.post_loc().same_extent(fwd.pre_loc())
    {
        return Err(NpuError::dimension_mismatch(
            pre_weights.name(),
            "transposed geometry does not swap the connection's layers",
        ));
    }
    let name = format!("{}_post", pre_weights.name());
    let mut post_weights = Weights::new(&name, post_geometry, pre_weights.num_arbors(), false)?;
    fill_transposed(pre_weights, &mut post_weights);
    Ok(post_weights)
}

/// Overwrite `post_weights` with the transpose of `pre_weights` and carry the timestamp over.
pub fn fill_transposed(pre_weights: &Weights, post_weights: &mut Weights) {
    let fwd = Arc::clone(pre_weights.geometry());
    let bwd = Arc::clone(post_weights.geometry());
    let pre = *fwd.pre_loc();
    let post_ext = *bwd.pre_loc();
    let (nxp, nyp, nfp) = (fwd.nxp(), fwd.nyp(), fwd.nfp());
    let (nxp_t, nyp_t, nfp_t) = (bwd.nxp(), bwd.nyp(), bwd.nfp());
    let (pre_nx_ext, pre_ny_ext) = (pre.nx_ext() as isize, pre.ny_ext() as isize);

    for arbor in 0..pre_weights.num_arbors() {
        for k_post in 0..bwd.num_patches() {
            let rx_post = kx_pos(k_post, post_ext.nx_ext(), post_ext.ny_ext(), post_ext.nf) as isize
                - post_ext.halo.lt as isize;
            let ry_post = ky_pos(k_post, post_ext.nx_ext(), post_ext.ny_ext(), post_ext.nf) as isize
                - post_ext.halo.up as isize;
            let f_post = feature_index(k_post, post_ext.nf);
            let (start_x, start_y) = bwd.nominal_start(k_post);
            let data_index = post_weights.data_index(k_post);
            let block = post_weights.get_data_mut(arbor, data_index);

            for dy in 0..nyp_t {
                let ey = start_y + dy as isize + pre.halo.up as isize;
                for dx in 0..nxp_t {
                    let ex = start_x + dx as isize + pre.halo.lt as isize;
                    for f_pre in 0..nfp_t {
                        let slot = dy * nxp_t * nfp_t + dx * nfp_t + f_pre;
                        block[slot] = 0.0;
                        if ex < 0 || ey < 0 || ex >= pre_nx_ext || ey >= pre_ny_ext {
                            continue;
                        }
                        let k_pre = k_index(
                            ex as usize,
                            ey as usize,
                            f_pre,
                            pre.nx_ext(),
                            pre.ny_ext(),
                            pre.nf,
                        );
                        let (sx, sy) = fwd.nominal_start(k_pre);
                        let px = rx_post - sx;
                        let py = ry_post - sy;
                        if px < 0 || py < 0 || px >= nxp as isize || py >= nyp as isize {
                            continue;
                        }
                        let w = pre_weights.get_data_from_patch_index(arbor, k_pre)
                            [py as usize * nxp * nfp + px as usize * nfp + f_post];
                        block[slot] = w;
                    }
                }
            }
        }
    }
    post_weights.set_timestamp(pre_weights.timestamp());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ScaleRelation;
    use crate::types::{Halo, LayerLoc};

    #[test]
    fn test_transpose_places_weight_at_mirrored_offset() {
        let pre = LayerLoc::new(5, 5, 1, 1).with_halo(Halo::uniform(1));
        let post = LayerLoc::new(5, 5, 1, 1);
        let fwd = Arc::new(
            PatchGeometry::new(
                "c",
                pre,
                post,
                3,
                3,
                1,
                ScaleRelation::OneToOne,
                ScaleRelation::OneToOne,
            )
            .unwrap(),
        );
        let mut w = Weights::new("c", Arc::clone(&fwd), 1, true).unwrap();
        // weight to the post neuron one to the right of the presynaptic neuron
        w.get_data_mut(0, 0)[1 * 3 + 2] = 7.0;
        w.set_timestamp(3.0);

        let bwd = Arc::new(fwd.transposed("c_T").unwrap());
        let t = transpose_weights(&w, bwd).unwrap();
        // post restricted (2,2) sits at extended (2,2) of the unpadded post layer
        let k_post = k_index(2, 2, 0, 5, 5, 1);
        let block = t.get_data_from_patch_index(0, k_post);
        // source is the presynaptic neuron one to the left: column 0 of the transposed patch
        assert_eq!(block[1 * 3 + 0], 7.0);
        assert_eq!(block.iter().filter(|&&v| v != 0.0).count(), 1);
        assert_eq!(t.timestamp(), 3.0);
    }
}
