// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Circular publication history.
//!
//! Every step a layer publishes its extended activity. Connections with a
//! delay of `d` read the snapshot published `d` steps earlier through
//! [`Publisher::create_cube`].

use serde::{Deserialize, Serialize};
use synaptor_npu_neural::LayerLoc;

use crate::error::{Result, RuntimeError};

/// One nonzero activity value in a sparse active list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SparseEntry {
    /// Extended index within one batch element
    pub index: usize,
    /// Activity value
    pub value: f32,
}

#[derive(Debug, Clone)]
struct Level {
    data: Vec<f32>,
    active: Vec<Vec<SparseEntry>>,
    time: f64,
}

/// Read-only view of one published snapshot.
#[derive(Debug, Clone, Copy)]
pub struct ActivityCube<'a> {
    /// Geometry of the publishing layer
    pub loc: LayerLoc,
    /// Dense extended activity, all batch elements back to back
    pub data: &'a [f32],
    /// Per-batch sparse active lists when the layer publishes sparsely
    pub active: Option<&'a [Vec<SparseEntry>]>,
    /// Simulation time at which the snapshot was published
    pub time: f64,
}

impl<'a> ActivityCube<'a> {
    /// Dense extended activity of batch element `b`.
    #[inline]
    pub fn batch_data(&self, b: usize) -> &'a [f32] {
        let n = self.loc.num_extended();
        &self.data[b * n..(b + 1) * n]
    }

    /// Sparse active list of batch element `b`, if published sparsely.
    #[inline]
    pub fn active_list(&self, b: usize) -> Option<&'a [SparseEntry]> {
        self.active.map(|lists| lists[b].as_slice())
    }

    /// Number of active neurons in batch element `b` (all extended neurons when dense).
    pub fn num_active(&self, b: usize) -> usize {
        match self.active_list(b) {
            Some(list) => list.len(),
            None => self.loc.num_extended(),
        }
    }
}

/// Serializable copy of a publication history, oldest level first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublisherState {
    /// Dense activity per level
    pub levels: Vec<Vec<f32>>,
    /// Publication time per level
    pub times: Vec<f64>,
}

/// Circular buffer of published activity.
#[derive(Debug, Clone)]
pub struct Publisher {
    name: String,
    loc: LayerLoc,
    sparse: bool,
    head: usize,
    levels: Vec<Level>,
}

impl Publisher {
    /// Allocate `max_delay + 1` zeroed levels.
    pub fn new(name: &str, loc: LayerLoc, max_delay: usize, sparse: bool) -> Self {
        let level = Level {
            data: vec![0.0; loc.num_extended() * loc.nbatch],
            active: vec![Vec::new(); loc.nbatch],
            time: 0.0,
        };
        Self {
            name: name.to_string(),
            loc,
            sparse,
            head: 0,
            levels: vec![level; max_delay + 1],
        }
    }

    /// Number of stored snapshots.
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// Whether sparse active lists are built on publish.
    pub fn is_sparse(&self) -> bool {
        self.sparse
    }

    /// Rotate the history and store a copy of `activity` as the newest level.
    pub fn publish(&mut self, activity: &[f32], time: f64) -> Result<()> {
        let expected = self.loc.num_extended() * self.loc.nbatch;
        if activity.len() != expected {
            return Err(RuntimeError::SizeMismatch {
                expected,
                actual: activity.len(),
            });
        }
        self.head = (self.head + 1) % self.levels.len();
        let level = &mut self.levels[self.head];
        level.data.copy_from_slice(activity);
        level.time = time;
        if self.sparse {
            self.rebuild_active(self.head);
        }
        Ok(())
    }

    fn rebuild_active(&mut self, slot: usize) {
        let n = self.loc.num_extended();
        let level = &mut self.levels[slot];
        for (b, list) in level.active.iter_mut().enumerate() {
            list.clear();
            list.extend(
                level.data[b * n..(b + 1) * n]
                    .iter()
                    .enumerate()
                    .filter(|(_, &v)| v != 0.0)
                    .map(|(index, &value)| SparseEntry { index, value }),
            );
        }
    }

    /// Copy of the whole history, oldest level first.
    pub fn state(&self) -> PublisherState {
        let count = self.levels.len();
        let order = (1..=count).map(|i| (self.head + i) % count);
        let (levels, times) = order
            .map(|slot| (self.levels[slot].data.clone(), self.levels[slot].time))
            .unzip();
        PublisherState { levels, times }
    }

    /// Replace the history with a saved one of the same shape.
    pub fn restore(&mut self, state: &PublisherState) -> Result<()> {
        let count = self.levels.len();
        if state.levels.len() != count || state.times.len() != count {
            return Err(RuntimeError::SizeMismatch {
                expected: count,
                actual: state.levels.len(),
            });
        }
        for (slot, (data, &time)) in state.levels.iter().zip(&state.times).enumerate() {
            let level = &mut self.levels[slot];
            if data.len() != level.data.len() {
                return Err(RuntimeError::SizeMismatch {
                    expected: level.data.len(),
                    actual: data.len(),
                });
            }
            level.data.copy_from_slice(data);
            level.time = time;
        }
        self.head = count - 1;
        if self.sparse {
            for slot in 0..count {
                self.rebuild_active(slot);
            }
        }
        Ok(())
    }

    /// Snapshot published `delay` steps ago (0 = most recent).
    pub fn create_cube(&self, delay: usize) -> Result<ActivityCube<'_>> {
        let levels = self.levels.len();
        if delay >= levels {
            return Err(RuntimeError::DelayOutOfRange {
                layer: self.name.clone(),
                delay,
                levels,
            });
        }
        let level = &self.levels[(self.head + levels - delay) % levels];
        Ok(ActivityCube {
            loc: self.loc,
            data: &level.data,
            active: self.sparse.then_some(level.active.as_slice()),
            time: level.time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_publisher(sparse: bool) -> Publisher {
        Publisher::new("L", LayerLoc::new(2, 1, 1, 1), 2, sparse)
    }

    #[test]
    fn test_delay_reads_history() {
        let mut p = create_test_publisher(false);
        p.publish(&[1.0, 0.0], 1.0).unwrap();
        p.publish(&[2.0, 0.0], 2.0).unwrap();
        p.publish(&[3.0, 0.0], 3.0).unwrap();
        assert_eq!(p.create_cube(0).unwrap().data[0], 3.0);
        assert_eq!(p.create_cube(1).unwrap().data[0], 2.0);
        assert_eq!(p.create_cube(2).unwrap().time, 1.0);
        assert!(p.create_cube(3).is_err());
    }

    #[test]
    fn test_sparse_list_skips_zeros() {
        let mut p = create_test_publisher(true);
        p.publish(&[0.0, 4.0], 1.0).unwrap();
        let cube = p.create_cube(0).unwrap();
        assert_eq!(cube.active_list(0).unwrap(), &[SparseEntry { index: 1, value: 4.0 }]);
        assert_eq!(cube.num_active(0), 1);
    }

    #[test]
    fn test_state_restores_delay_order() {
        let mut p = create_test_publisher(true);
        p.publish(&[1.0, 0.0], 1.0).unwrap();
        p.publish(&[0.0, 2.0], 2.0).unwrap();
        let state = p.state();
        assert_eq!(state.times, vec![0.0, 1.0, 2.0]);

        let mut restored = create_test_publisher(true);
        restored.restore(&state).unwrap();
        for delay in 0..3 {
            let a = p.create_cube(delay).unwrap();
            let b = restored.create_cube(delay).unwrap();
            assert_eq!(a.data, b.data);
            assert_eq!(a.time, b.time);
            assert_eq!(a.active_list(0), b.active_list(0));
        }
    }

    #[test]
    fn test_publish_checks_size() {
        let mut p = create_test_publisher(false);
        assert!(p.publish(&[1.0], 0.0).is_err());
    }
}
