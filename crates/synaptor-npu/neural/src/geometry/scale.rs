// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Density relation between a presynaptic and a postsynaptic layer along one axis.
//!
//! Scales are log2 neuron spacings: a layer with scale 1 has half as many
//! neurons per axis as a layer with scale 0.

use crate::types::{NpuError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleRelation {
    /// Same density.
    OneToOne,
    /// Postsynaptic layer is denser by the given power-of-two factor.
    OneToMany(usize),
    /// Presynaptic layer is denser by the given power-of-two factor.
    ManyToOne(usize),
}

impl ScaleRelation {
    pub fn from_scales(pre_scale: i32, post_scale: i32) -> Self {
        let d = post_scale - pre_scale;
        match d {
            0 => ScaleRelation::OneToOne,
            d if d > 0 => ScaleRelation::ManyToOne(1usize << d),
            d => ScaleRelation::OneToMany(1usize << (-d)),
        }
    }

    /// Relation seen from the transposed connection.
    pub fn transposed(self) -> Self {
        match self {
            ScaleRelation::OneToOne => ScaleRelation::OneToOne,
            ScaleRelation::OneToMany(m) => ScaleRelation::ManyToOne(m),
            ScaleRelation::ManyToOne(m) => ScaleRelation::OneToMany(m),
        }
    }

    /// `2^(post_scale - pre_scale)` as a float.
    pub fn scale_factor(self) -> f32 {
        match self {
            ScaleRelation::OneToOne => 1.0,
            ScaleRelation::ManyToOne(m) => m as f32,
            ScaleRelation::OneToMany(m) => 1.0 / m as f32,
        }
    }

    /// Patch size must cover a whole, odd number of unit cells.
    pub fn check_patch_size(self, patch_size: usize, axis: &str, component: &str) -> Result<()> {
        if patch_size == 0 {
            return Err(NpuError::configuration(
                component,
                format!("patch size along {axis} must be positive"),
            ));
        }
        match self {
            ScaleRelation::OneToOne | ScaleRelation::ManyToOne(_) => {
                if patch_size % 2 == 0 {
                    return Err(NpuError::configuration(
                        component,
                        format!("patch size {patch_size} along {axis} must be odd"),
                    ));
                }
            }
            ScaleRelation::OneToMany(m) => {
                if patch_size % m != 0 || (patch_size / m) % 2 == 0 {
                    return Err(NpuError::configuration(
                        component,
                        format!(
                            "patch size {patch_size} along {axis} must be an odd multiple of the density ratio {m}"
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    /// First postsynaptic restricted coordinate covered by the nominal patch of
    /// presynaptic restricted coordinate `i`. May be negative or past the edge.
    #[inline]
    pub fn patch_start(self, i: isize, patch_size: usize) -> isize {
        let p = patch_size as isize;
        match self {
            ScaleRelation::OneToOne => i - (p - 1) / 2,
            ScaleRelation::OneToMany(m) => {
                let m = m as isize;
                i * m - (p - m) / 2
            }
            ScaleRelation::ManyToOne(m) => i.div_euclid(m as isize) - (p - 1) / 2,
        }
    }

    /// Halo the presynaptic layer needs so every neuron whose patch touches the
    /// postsynaptic interior exists in its extended buffer.
    pub fn required_margin(self, patch_size: usize) -> usize {
        match self {
            ScaleRelation::OneToOne => (patch_size - 1) / 2,
            ScaleRelation::OneToMany(m) => (patch_size / m - 1) / 2,
            ScaleRelation::ManyToOne(m) => m * ((patch_size - 1) / 2),
        }
    }

    /// Patch size of the transposed connection: `patch_size * 2^(post - pre)`.
    pub fn dependent_patch_size(self, patch_size: usize) -> usize {
        match self {
            ScaleRelation::OneToOne => patch_size,
            ScaleRelation::ManyToOne(m) => patch_size * m,
            ScaleRelation::OneToMany(m) => patch_size / m,
        }
    }

    /// Number of distinct patch alignments along this axis for shift-invariant weights.
    pub fn unit_cell(self) -> usize {
        match self {
            ScaleRelation::ManyToOne(m) => m,
            _ => 1,
        }
    }
}
