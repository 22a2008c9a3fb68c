// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Weight store: one contiguous buffer per arbor, addressed through a
//! patch-to-data lookup table.
//!
//! With shared (shift-invariant) weights, every presynaptic position with the
//! same alignment inside the unit cell resolves to one data patch. Without
//! sharing each presynaptic extended neuron owns its own data patch.

mod transpose;

pub use transpose::{fill_transposed, transpose_weights};

use std::sync::Arc;

use crate::geometry::{Patch, PatchGeometry};
use crate::types::{NpuError, Result};

#[derive(Debug, Clone)]
pub struct Weights {
    name: String,
    geometry: Arc<PatchGeometry>,
    shared: bool,
    num_arbors: usize,
    num_data_patches: usize,
    patch_to_data: Vec<usize>,
    data: Vec<Vec<f32>>,
    timestamp: f64,
}

impl Weights {
    /// Allocate zeroed weights and build the lookup table.
    pub fn new(name: &str, geometry: Arc<PatchGeometry>, num_arbors: usize, shared: bool) -> Result<Self> {
        if num_arbors == 0 {
            return Err(NpuError::configuration(name, "number of arbors must be at least 1"));
        }
        let num_patches = geometry.num_patches();
        let (num_data_patches, patch_to_data) = if shared {
            let lut = (0..num_patches)
                .map(|k| geometry.unit_cell_index(k))
                .collect();
            (geometry.num_unit_cell_patches(), lut)
        } else {
            (num_patches, (0..num_patches).collect())
        };
        let arbor_len = num_data_patches * geometry.patch_volume();
        Ok(Self {
            name: name.to_string(),
            geometry,
            shared,
            num_arbors,
            num_data_patches,
            patch_to_data,
            data: vec![vec![0.0; arbor_len]; num_arbors],
            timestamp: 0.0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn geometry(&self) -> &Arc<PatchGeometry> {
        &self.geometry
    }

    pub fn shared(&self) -> bool {
        self.shared
    }

    pub fn num_arbors(&self) -> usize {
        self.num_arbors
    }

    pub fn num_data_patches(&self) -> usize {
        self.num_data_patches
    }

    #[inline]
    pub fn patch_volume(&self) -> usize {
        self.geometry.patch_volume()
    }

    #[inline]
    pub fn get_patch(&self, patch_index: usize) -> &Patch {
        self.geometry.patch(patch_index)
    }

    #[inline]
    pub fn data_index(&self, patch_index: usize) -> usize {
        self.patch_to_data[patch_index]
    }

    /// Full nominal data block for a patch, resolved through the lookup table.
    #[inline]
    pub fn get_data_from_patch_index(&self, arbor: usize, patch_index: usize) -> &[f32] {
        self.get_data_from_data_index(arbor, self.patch_to_data[patch_index])
    }

    #[inline]
    pub fn get_data_from_data_index(&self, arbor: usize, data_index: usize) -> &[f32] {
        let volume = self.patch_volume();
        &self.data[arbor][data_index * volume..(data_index + 1) * volume]
    }

    pub fn get_data_mut(&mut self, arbor: usize, data_index: usize) -> &mut [f32] {
        let volume = self.patch_volume();
        &mut self.data[arbor][data_index * volume..(data_index + 1) * volume]
    }

    pub fn arbor_data(&self, arbor: usize) -> &[f32] {
        &self.data[arbor]
    }

    pub fn arbor_data_mut(&mut self, arbor: usize) -> &mut [f32] {
        &mut self.data[arbor]
    }

    pub fn fill(&mut self, value: f32) {
        for arbor in &mut self.data {
            arbor.fill(value);
        }
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: f64) {
        self.timestamp = timestamp;
    }

    /// Same arbor count, data patch count and patch shape.
    pub fn same_shape(&self, other: &Weights) -> bool {
        self.num_arbors == other.num_arbors
            && self.num_data_patches == other.num_data_patches
            && self.geometry.nxp() == other.geometry.nxp()
            && self.geometry.nyp() == other.geometry.nyp()
            && self.geometry.nfp() == other.geometry.nfp()
    }

    /// Copy every arbor's values from `other`. Timestamp is left to the caller.
    pub fn copy_values_from(&mut self, other: &Weights) -> Result<()> {
        if !self.same_shape(other) {
            return Err(NpuError::dimension_mismatch(
                &self.name,
                format!("cannot copy weights from \"{}\": shapes differ", other.name),
            ));
        }
        for (dst, src) in self.data.iter_mut().zip(&other.data) {
            dst.copy_from_slice(src);
        }
        Ok(())
    }

    /// Replace one arbor's values wholesale.
    pub fn set_arbor_values(&mut self, arbor: usize, values: &[f32]) -> Result<()> {
        let dst = self.data.get_mut(arbor).ok_or_else(|| NpuError::OutOfBounds {
            index: arbor,
            size: self.num_arbors,
            context: format!("arbors of {}", self.name),
        })?;
        if dst.len() != values.len() {
            return Err(NpuError::ArraySizeMismatch {
                expected: dst.len(),
                actual: values.len(),
            });
        }
        dst.copy_from_slice(values);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ScaleRelation;
    use crate::types::{k_index, Halo, LayerLoc};

    fn create_test_geometry() -> Arc<PatchGeometry> {
        let pre = LayerLoc::new(6, 6, 1, 1).with_halo(Halo::uniform(1));
        let post = LayerLoc::new(6, 6, 1, 1);
        Arc::new(
            PatchGeometry::new(
                "w",
                pre,
                post,
                3,
                3,
                1,
                ScaleRelation::OneToOne,
                ScaleRelation::OneToOne,
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_shared_weights_use_one_data_patch() {
        let weights = Weights::new("w", create_test_geometry(), 2, true).unwrap();
        assert_eq!(weights.num_data_patches(), 1);
        assert_eq!(weights.arbor_data(1).len(), 9);
        assert_eq!(weights.data_index(0), weights.data_index(30));
    }

    #[test]
    fn test_unshared_lookup_is_identity() {
        let weights = Weights::new("w", create_test_geometry(), 1, false).unwrap();
        assert_eq!(weights.num_data_patches(), 64);
        let k = k_index(3, 2, 0, 8, 8, 1);
        assert_eq!(weights.data_index(k), k);
    }

    #[test]
    fn test_data_block_resolves_through_lut() {
        let mut weights = Weights::new("w", create_test_geometry(), 1, true).unwrap();
        weights.get_data_mut(0, 0).copy_from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        assert_eq!(weights.get_data_from_patch_index(0, 17)[4], 5.0);
    }

    #[test]
    fn test_copy_requires_same_shape() {
        let a = Weights::new("a", create_test_geometry(), 1, true).unwrap();
        let mut b = Weights::new("b", create_test_geometry(), 2, true).unwrap();
        assert!(b.copy_values_from(&a).is_err());
        assert!(Weights::new("z", create_test_geometry(), 0, true).is_err());
    }
}
