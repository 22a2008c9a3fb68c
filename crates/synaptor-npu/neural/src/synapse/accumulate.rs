// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Row kernels applied by the delivery engine.
//!
//! A *row* is one contiguous run of `patch.nx * nfp` postsynaptic elements.
//! Pure functions; callers choose which kernel to run once per connection.

use core::fmt;
use core::str::FromStr;

use crate::types::NpuError;

/// How presynaptic contributions combine in the postsynaptic channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "std", serde(rename_all = "lowercase"))]
pub enum AccumulateType {
    /// `v += a * w`
    #[default]
    Convolve,
    /// `v = max(v, a)`, recording the winner
    MaxPooling,
    /// `v += a`
    SumPooling,
    /// `v += a / footprint`
    AvgPooling,
}

impl AccumulateType {
    pub fn is_pooling(self) -> bool {
        !matches!(self, AccumulateType::Convolve)
    }
}

impl fmt::Display for AccumulateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccumulateType::Convolve => "convolve",
            AccumulateType::MaxPooling => "maxpooling",
            AccumulateType::SumPooling => "sumpooling",
            AccumulateType::AvgPooling => "avgpooling",
        };
        f.write_str(name)
    }
}

impl FromStr for AccumulateType {
    type Err = NpuError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['_', ' '], "").as_str() {
            "convolve" => Ok(AccumulateType::Convolve),
            "max" | "maxpooling" => Ok(AccumulateType::MaxPooling),
            "sum" | "sumpooling" => Ok(AccumulateType::SumPooling),
            "avg" | "avgpooling" => Ok(AccumulateType::AvgPooling),
            other => Err(NpuError::configuration(
                "accumulate type",
                format!("unrecognized accumulate type \"{other}\""),
            )),
        }
    }
}

/// `v[k] += a * w[k]`
#[inline]
pub fn convolve_row(v: &mut [f32], a: f32, w: &[f32]) {
    debug_assert_eq!(v.len(), w.len());
    for (vk, wk) in v.iter_mut().zip(w) {
        *vk += a * wk;
    }
}

/// `sum(a[k] * w[k])`
#[inline]
pub fn dot_row(a: &[f32], w: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), w.len());
    a.iter().zip(w).map(|(ak, wk)| ak * wk).sum()
}

/// Feature-strided max: every `stride`-th element of `v` takes `a` if strictly larger,
/// and the matching `gate` slot records `winner`.
#[inline]
pub fn accumulate_max_pooling(
    v: &mut [f32],
    gate: Option<&mut [i64]>,
    stride: usize,
    a: f32,
    winner: i64,
) {
    match gate {
        Some(gate) => {
            for k in (0..v.len()).step_by(stride) {
                if a > v[k] {
                    v[k] = a;
                    gate[k] = winner;
                }
            }
        }
        None => {
            for k in (0..v.len()).step_by(stride) {
                if a > v[k] {
                    v[k] = a;
                }
            }
        }
    }
}

/// Feature-strided `v[k] += a * w`.
#[inline]
pub fn accumulate_sum_pooling(v: &mut [f32], stride: usize, a: f32, w: f32) {
    for k in (0..v.len()).step_by(stride) {
        v[k] += a * w;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accumulate_type() {
        assert_eq!("convolve".parse::<AccumulateType>().unwrap(), AccumulateType::Convolve);
        assert_eq!("MAX_POOLING".parse::<AccumulateType>().unwrap(), AccumulateType::MaxPooling);
        assert_eq!("avg".parse::<AccumulateType>().unwrap(), AccumulateType::AvgPooling);
        assert!("stochastic".parse::<AccumulateType>().is_err());
        assert_eq!(AccumulateType::SumPooling.to_string(), "sumpooling");
    }

    #[test]
    fn test_convolve_and_dot() {
        let mut v = [1.0, 1.0, 1.0];
        convolve_row(&mut v, 2.0, &[0.5, 1.0, -1.0]);
        assert_eq!(v, [2.0, 3.0, -1.0]);
        assert_eq!(dot_row(&[1.0, 2.0], &[3.0, 4.0]), 11.0);
    }

    #[test]
    fn test_max_pooling_strides_over_features() {
        let mut v = [0.0, 0.0, 0.5, 0.0];
        let mut gate = [-1i64; 4];
        accumulate_max_pooling(&mut v, Some(&mut gate), 2, 0.25, 9);
        assert_eq!(v, [0.25, 0.0, 0.5, 0.0]);
        assert_eq!(gate, [9, -1, -1, -1]);
    }

    #[test]
    fn test_max_pooling_tie_keeps_first() {
        let mut v = [0.5];
        let mut gate = [3i64];
        accumulate_max_pooling(&mut v, Some(&mut gate), 1, 0.5, 7);
        assert_eq!(gate, [3]);
    }

    #[test]
    fn test_sum_pooling() {
        let mut v = [0.0, 0.0, 0.0];
        accumulate_sum_pooling(&mut v, 2, 3.0, 0.25);
        assert_eq!(v, [0.75, 0.0, 0.75]);
    }
}
