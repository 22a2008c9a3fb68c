// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Process-group abstraction.
//!
//! Only the single-process implementation lives here; multi-process
//! communicators plug in through the same trait.

/// Rank, size and collective synchronization of the process group.
pub trait Communicator: Send + Sync {
    /// Rank of this process
    fn rank(&self) -> usize;

    /// Number of processes in the group
    fn size(&self) -> usize;

    /// Block until every process reaches the barrier
    fn barrier(&self);

    /// Element-wise sum across the group, in place
    fn all_reduce_sum(&self, values: &mut [f64]);

    /// Whether this process reports group-wide messages
    fn is_root(&self) -> bool {
        self.rank() == 0
    }
}

/// Single-process communicator.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalCommunicator;

impl LocalCommunicator {
    /// Create the single-process communicator
    pub fn new() -> Self {
        Self
    }
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) {}

    fn all_reduce_sum(&self, _values: &mut [f64]) {}
}
