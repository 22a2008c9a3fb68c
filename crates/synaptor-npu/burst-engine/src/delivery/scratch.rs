// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-partition scratch accumulators.
//!
//! Each partition owns a full-size copy of one batch element's postsynaptic
//! channel. Untouched partitions always hold the fill value, so resetting and
//! merging only visit partitions that received input.

use rayon::prelude::*;

/// Elements per parallel merge task.
const MERGE_CHUNK: usize = 4096;

#[derive(Debug, Clone)]
pub struct Partition {
    pub(crate) values: Vec<f32>,
    /// Global extended index of the winning presynaptic neuron, max pooling only
    pub(crate) winners: Vec<i64>,
    pub(crate) touched: bool,
}

#[derive(Debug, Clone)]
pub struct ScratchBuffers {
    partitions: Vec<Partition>,
    fill: f32,
}

impl ScratchBuffers {
    pub fn new(partitions: usize, len: usize, fill: f32, with_winners: bool) -> Self {
        let partition = Partition {
            values: vec![fill; len],
            winners: if with_winners { vec![-1; len] } else { Vec::new() },
            touched: false,
        };
        Self {
            partitions: vec![partition; partitions],
            fill,
        }
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    pub fn len(&self) -> usize {
        self.partitions.first().map_or(0, |p| p.values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Restore the fill value in every partition touched since the last reset.
    pub fn reset(&mut self) {
        let fill = self.fill;
        self.partitions
            .par_iter_mut()
            .filter(|p| p.touched)
            .for_each(|p| {
                p.values.fill(fill);
                p.winners.fill(-1);
                p.touched = false;
            });
    }

    pub(crate) fn partitions_mut(&mut self) -> &mut [Partition] {
        &mut self.partitions
    }

    pub fn num_touched(&self) -> usize {
        self.partitions.iter().filter(|p| p.touched).count()
    }

    fn touched(&self) -> Vec<&Partition> {
        self.partitions.iter().filter(|p| p.touched).collect()
    }

    /// `out += sum of partitions`, partitions added in index order.
    pub fn merge_sum(&self, out: &mut [f32]) {
        let touched = self.touched();
        if touched.is_empty() {
            return;
        }
        out.par_chunks_mut(MERGE_CHUNK)
            .enumerate()
            .for_each(|(c, chunk)| {
                let base = c * MERGE_CHUNK;
                for part in &touched {
                    let src = &part.values[base..base + chunk.len()];
                    for (o, v) in chunk.iter_mut().zip(src) {
                        *o += v;
                    }
                }
            });
    }

    /// Strict value max. The existing `out` value competes first and the
    /// earliest partition wins ties, matching a sequential `a > v` sweep.
    pub fn merge_max_value(&self, out: &mut [f32], winners: &mut [i64]) {
        let touched = self.touched();
        if touched.is_empty() {
            return;
        }
        out.par_chunks_mut(MERGE_CHUNK)
            .zip(winners.par_chunks_mut(MERGE_CHUNK))
            .enumerate()
            .for_each(|(c, (values, gates))| {
                let base = c * MERGE_CHUNK;
                for part in &touched {
                    for i in 0..values.len() {
                        let a = part.values[base + i];
                        if a > values[i] {
                            values[i] = a;
                            gates[i] = part.winners[base + i];
                        }
                    }
                }
            });
    }

    /// Strict magnitude max, same ordering rules as [`merge_max_value`](Self::merge_max_value).
    pub fn merge_max_magnitude(&self, out: &mut [f32]) {
        let touched = self.touched();
        if touched.is_empty() {
            return;
        }
        out.par_chunks_mut(MERGE_CHUNK)
            .enumerate()
            .for_each(|(c, values)| {
                let base = c * MERGE_CHUNK;
                for part in &touched {
                    for (i, v) in values.iter_mut().enumerate() {
                        let a = part.values[base + i];
                        if a.abs() > v.abs() {
                            *v = a;
                        }
                    }
                }
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untouched_partitions_are_skipped() {
        let scratch = ScratchBuffers::new(4, 3, 0.0, false);
        let mut out = vec![1.0, 2.0, 3.0];
        scratch.merge_sum(&mut out);
        assert_eq!(out, vec![1.0, 2.0, 3.0]);
        assert_eq!(scratch.num_touched(), 0);
    }

    #[test]
    fn test_merge_sum_and_reset() {
        let mut scratch = ScratchBuffers::new(2, 2, 0.0, false);
        for (p, part) in scratch.partitions_mut().iter_mut().enumerate() {
            part.values[p] = 1.5;
            part.touched = true;
        }
        let mut out = vec![1.0, 1.0];
        scratch.merge_sum(&mut out);
        assert_eq!(out, vec![2.5, 2.5]);

        scratch.reset();
        assert_eq!(scratch.num_touched(), 0);
        let mut out = vec![0.0, 0.0];
        scratch.merge_sum(&mut out);
        assert_eq!(out, vec![0.0, 0.0]);
    }

    #[test]
    fn test_max_value_ties_keep_earliest() {
        let mut scratch = ScratchBuffers::new(3, 1, f32::NEG_INFINITY, true);
        for (p, part) in scratch.partitions_mut().iter_mut().enumerate() {
            part.values[0] = if p == 0 { 0.5 } else { 2.0 };
            part.winners[0] = p as i64 + 10;
            part.touched = true;
        }
        let mut out = vec![1.0];
        let mut winners = vec![-1];
        scratch.merge_max_value(&mut out, &mut winners);
        assert_eq!(out, vec![2.0]);
        assert_eq!(winners, vec![11]);
    }

    #[test]
    fn test_max_magnitude_keeps_sign() {
        let mut scratch = ScratchBuffers::new(2, 2, 0.0, false);
        let parts = scratch.partitions_mut();
        parts[0].values = vec![-3.0, 1.0];
        parts[0].touched = true;
        parts[1].values = vec![2.0, -1.0];
        parts[1].touched = true;
        let mut out = vec![0.0, 0.0];
        scratch.merge_max_magnitude(&mut out);
        assert_eq!(out, vec![-3.0, 1.0]);
    }
}
