// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Clipped patch shapes per presynaptic extended position.
//!
//! A nominal patch is `nxp x nyp x nfp` weights. Patches whose footprint runs
//! past the postsynaptic restricted region are shrunk: `offset` skips the
//! clipped leading rows/columns inside the nominal patch and `nx`/`ny` count
//! only the valid part. Every presynaptic feature at one (x, y) shares a patch.

use crate::geometry::ScaleRelation;
use crate::types::{feature_index, k_index, kx_pos, ky_pos, LayerLoc, NpuError, Result};

/// Clipped patch descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Patch {
    pub nx: usize,
    pub ny: usize,
    /// Element offset of the first valid weight inside the nominal patch.
    pub offset: usize,
}

impl Patch {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nx == 0 || self.ny == 0
    }
}

/// Clip a nominal run `[start, start + len)` against `[0, n)`.
/// Returns (first valid coordinate, offset into the run, valid length).
fn clip_run(start: isize, len: usize, n: usize) -> (usize, usize, usize) {
    let lo = start.max(0);
    let hi = (start + len as isize).min(n as isize);
    if hi <= lo {
        return (0, 0, 0);
    }
    (lo as usize, (lo - start) as usize, (hi - lo) as usize)
}

#[derive(Debug, Clone)]
pub struct PatchGeometry {
    name: String,
    pre: LayerLoc,
    post: LayerLoc,
    nxp: usize,
    nyp: usize,
    nfp: usize,
    x_relation: ScaleRelation,
    y_relation: ScaleRelation,
    /// Indexed by presynaptic extended (x, y), i.e. `k_pre_ext / nf_pre`.
    patches: Vec<Patch>,
    gsyn_patch_start: Vec<usize>,
    a_post_offset: Vec<usize>,
    nominal_start: Vec<(isize, isize)>,
}

impl PatchGeometry {
    /// Build the geometry for a connection.
    ///
    /// # Errors
    /// Fails when the patch feature count differs from the postsynaptic feature
    /// count or a patch size violates the density-ratio constraint.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        pre: LayerLoc,
        post: LayerLoc,
        nxp: usize,
        nyp: usize,
        nfp: usize,
        x_relation: ScaleRelation,
        y_relation: ScaleRelation,
    ) -> Result<Self> {
        if nfp != post.nf {
            return Err(NpuError::dimension_mismatch(
                name,
                format!(
                    "patch feature count {} does not match postsynaptic feature count {}",
                    nfp, post.nf
                ),
            ));
        }
        x_relation.check_patch_size(nxp, "x", name)?;
        y_relation.check_patch_size(nyp, "y", name)?;

        let nx_pre_ext = pre.nx_ext();
        let ny_pre_ext = pre.ny_ext();
        let count = nx_pre_ext * ny_pre_ext;

        let mut geometry = Self {
            name: name.to_string(),
            pre,
            post,
            nxp,
            nyp,
            nfp,
            x_relation,
            y_relation,
            patches: Vec::with_capacity(count),
            gsyn_patch_start: Vec::with_capacity(count),
            a_post_offset: Vec::with_capacity(count),
            nominal_start: Vec::with_capacity(count),
        };

        let x_runs: Vec<(isize, (usize, usize, usize))> = (0..nx_pre_ext)
            .map(|x| {
                let start = x_relation.patch_start(x as isize - pre.halo.lt as isize, nxp);
                (start, clip_run(start, nxp, post.nx))
            })
            .collect();

        for y in 0..ny_pre_ext {
            let start_y = y_relation.patch_start(y as isize - pre.halo.up as isize, nyp);
            let (first_y, offset_y, len_y) = clip_run(start_y, nyp, post.ny);
            for &(start_x, (first_x, offset_x, len_x)) in &x_runs {
                geometry.nominal_start.push((start_x, start_y));
                if len_x == 0 || len_y == 0 {
                    geometry.patches.push(Patch::default());
                    geometry.gsyn_patch_start.push(0);
                    geometry.a_post_offset.push(0);
                } else {
                    geometry.patches.push(Patch {
                        nx: len_x,
                        ny: len_y,
                        offset: offset_y * nxp * nfp + offset_x * nfp,
                    });
                    geometry
                        .gsyn_patch_start
                        .push(k_index(first_x, first_y, 0, post.nx, post.ny, post.nf));
                    geometry.a_post_offset.push(k_index(
                        first_x + post.halo.lt,
                        first_y + post.halo.up,
                        0,
                        post.nx_ext(),
                        post.ny_ext(),
                        post.nf,
                    ));
                }
            }
        }
        Ok(geometry)
    }

    /// Geometry of the transposed connection: presynaptic and postsynaptic
    /// layers swapped, dependent patch sizes, one feature per original presynaptic feature.
    pub fn transposed(&self, name: &str) -> Result<Self> {
        Self::new(
            name,
            self.post,
            self.pre,
            self.x_relation.dependent_patch_size(self.nxp),
            self.y_relation.dependent_patch_size(self.nyp),
            self.pre.nf,
            self.x_relation.transposed(),
            self.y_relation.transposed(),
        )
    }

    #[inline]
    fn xy_index(&self, k_pre_ext: usize) -> usize {
        k_pre_ext / self.pre.nf
    }

    #[inline]
    pub fn patch(&self, k_pre_ext: usize) -> &Patch {
        &self.patches[self.xy_index(k_pre_ext)]
    }

    /// Restricted postsynaptic index of the clipped patch's first neuron.
    #[inline]
    pub fn gsyn_patch_start(&self, k_pre_ext: usize) -> usize {
        self.gsyn_patch_start[self.xy_index(k_pre_ext)]
    }

    /// Extended postsynaptic index of the clipped patch's first neuron.
    #[inline]
    pub fn a_post_offset(&self, k_pre_ext: usize) -> usize {
        self.a_post_offset[self.xy_index(k_pre_ext)]
    }

    /// Postsynaptic restricted coordinates of the nominal patch corner.
    #[inline]
    pub fn nominal_start(&self, k_pre_ext: usize) -> (isize, isize) {
        self.nominal_start[self.xy_index(k_pre_ext)]
    }

    /// Index of the shared data patch for `k_pre_ext` when weights are shift invariant.
    pub fn unit_cell_index(&self, k_pre_ext: usize) -> usize {
        let nx_ext = self.pre.nx_ext();
        let ny_ext = self.pre.ny_ext();
        let cell_x = self.x_relation.unit_cell();
        let cell_y = self.y_relation.unit_cell();
        let rx = kx_pos(k_pre_ext, nx_ext, ny_ext, self.pre.nf) as isize - self.pre.halo.lt as isize;
        let ry = ky_pos(k_pre_ext, nx_ext, ny_ext, self.pre.nf) as isize - self.pre.halo.up as isize;
        let kf = feature_index(k_pre_ext, self.pre.nf);
        k_index(
            rx.rem_euclid(cell_x as isize) as usize,
            ry.rem_euclid(cell_y as isize) as usize,
            kf,
            cell_x,
            cell_y,
            self.pre.nf,
        )
    }

    pub fn num_unit_cell_patches(&self) -> usize {
        self.x_relation.unit_cell() * self.y_relation.unit_cell() * self.pre.nf
    }

    /// One patch per presynaptic extended neuron.
    #[inline]
    pub fn num_patches(&self) -> usize {
        self.pre.num_extended()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pre_loc(&self) -> &LayerLoc {
        &self.pre
    }

    pub fn post_loc(&self) -> &LayerLoc {
        &self.post
    }

    pub fn nxp(&self) -> usize {
        self.nxp
    }

    pub fn nyp(&self) -> usize {
        self.nyp
    }

    pub fn nfp(&self) -> usize {
        self.nfp
    }

    #[inline]
    pub fn patch_stride_x(&self) -> usize {
        self.nfp
    }

    #[inline]
    pub fn patch_stride_y(&self) -> usize {
        self.nxp * self.nfp
    }

    #[inline]
    pub fn patch_volume(&self) -> usize {
        self.nxp * self.nyp * self.nfp
    }

    pub fn x_relation(&self) -> ScaleRelation {
        self.x_relation
    }

    pub fn y_relation(&self) -> ScaleRelation {
        self.y_relation
    }

    /// Nominal footprint used by average pooling: `nxp * 2^dx * nyp * 2^dy`.
    pub fn effective_footprint(&self) -> f32 {
        self.nxp as f32 * self.x_relation.scale_factor() * self.nyp as f32 * self.y_relation.scale_factor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Halo;

    fn create_test_geometry(pre_margin: usize, nxp: usize) -> PatchGeometry {
        let pre = LayerLoc::new(8, 8, 1, 1).with_halo(Halo::uniform(pre_margin));
        let post = LayerLoc::new(8, 8, 2, 1);
        PatchGeometry::new(
            "test",
            pre,
            post,
            nxp,
            nxp,
            2,
            ScaleRelation::OneToOne,
            ScaleRelation::OneToOne,
        )
        .unwrap()
    }

    #[test]
    fn test_interior_patch_is_full() {
        let g = create_test_geometry(2, 5);
        let pre = *g.pre_loc();
        let k = k_index(5, 5, 0, pre.nx_ext(), pre.ny_ext(), 1);
        let p = g.patch(k);
        assert_eq!((p.nx, p.ny, p.offset), (5, 5, 0));
        // restricted (3,3) -> patch starts at post (1,1)
        assert_eq!(g.gsyn_patch_start(k), k_index(1, 1, 0, 8, 8, 2));
    }

    #[test]
    fn test_edge_patch_is_clipped() {
        let g = create_test_geometry(2, 5);
        let pre = *g.pre_loc();
        // extended (0, 4) is restricted (-2, 2): nominal x-run [-4, 1)
        let k = k_index(0, 4, 0, pre.nx_ext(), pre.ny_ext(), 1);
        let p = g.patch(k);
        assert_eq!(p.nx, 1);
        assert_eq!(p.ny, 5);
        assert_eq!(p.offset, 4 * 2);
        assert_eq!(g.gsyn_patch_start(k), 0);
    }

    #[test]
    fn test_feature_mismatch_is_fatal() {
        let pre = LayerLoc::new(4, 4, 1, 1);
        let post = LayerLoc::new(4, 4, 3, 1);
        let err = PatchGeometry::new(
            "bad",
            pre,
            post,
            3,
            3,
            2,
            ScaleRelation::OneToOne,
            ScaleRelation::OneToOne,
        )
        .unwrap_err();
        assert!(matches!(err, NpuError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_unit_cells_for_many_to_one() {
        let pre = LayerLoc::new(8, 8, 1, 1).with_halo(Halo::uniform(2));
        let post = LayerLoc::new(4, 4, 1, 1);
        let g = PatchGeometry::new(
            "pool",
            pre,
            post,
            3,
            3,
            1,
            ScaleRelation::ManyToOne(2),
            ScaleRelation::ManyToOne(2),
        )
        .unwrap();
        assert_eq!(g.num_unit_cell_patches(), 4);
        let a = k_index(2, 2, 0, 12, 12, 1);
        let b = k_index(4, 2, 0, 12, 12, 1);
        let c = k_index(3, 2, 0, 12, 12, 1);
        assert_eq!(g.unit_cell_index(a), g.unit_cell_index(b));
        assert_ne!(g.unit_cell_index(a), g.unit_cell_index(c));
    }

    #[test]
    fn test_transposed_geometry_sizes() {
        let pre = LayerLoc::new(8, 8, 1, 1).with_halo(Halo::uniform(2));
        let post = LayerLoc::new(4, 4, 1, 1).with_halo(Halo::uniform(1));
        let g = PatchGeometry::new(
            "fwd",
            pre,
            post,
            3,
            3,
            1,
            ScaleRelation::ManyToOne(2),
            ScaleRelation::ManyToOne(2),
        )
        .unwrap();
        let t = g.transposed("fwd_T").unwrap();
        assert_eq!(t.nxp(), 6);
        assert_eq!(t.x_relation(), ScaleRelation::OneToMany(2));
        assert_eq!(t.num_patches(), 36);
        // interior transposed patches are not clipped
        let k = k_index(2, 2, 0, 6, 6, 1);
        assert_eq!(t.nominal_start(k), (0, 0));
        assert_eq!((t.patch(k).nx, t.patch(k).ny), (6, 6));
    }
}
