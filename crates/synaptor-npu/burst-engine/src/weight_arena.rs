// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Weight Arena
//!
//! Owns every weight store in a column. Connections hold [`WeightHandle`]s:
//! clones share their original's handle, transposes hold a derived entry that
//! is rebuilt from its source whenever the source changed.
//!
//! Owned entries carry a version that every mutable borrow bumps. A derived
//! entry remembers the source version it was built from and is stale when
//! that differs (or when its source is itself stale). Reads go through
//! [`WeightArena::get`], which refuses stale entries; call
//! [`WeightArena::refresh_all`] after mutating weights.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use synaptor_npu_neural::{fill_transposed, transpose_weights, NpuError, Result, Weights};
use tracing::debug;

static NEXT_ARENA_ID: AtomicU32 = AtomicU32::new(0);

/// Index of a weight store inside one arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WeightHandle {
    arena: u32,
    index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Owned,
    Transposed { source: usize, source_version: u64 },
}

#[derive(Debug)]
struct Entry {
    weights: Weights,
    origin: Origin,
    version: u64,
}

#[derive(Debug)]
pub struct WeightArena {
    id: u32,
    entries: Vec<Entry>,
    /// source index -> derived transpose index
    transposes: AHashMap<usize, usize>,
}

impl Default for WeightArena {
    fn default() -> Self {
        Self::new()
    }
}

impl WeightArena {
    pub fn new() -> Self {
        Self {
            id: NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed),
            entries: Vec::new(),
            transposes: AHashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn index(&self, handle: WeightHandle) -> Result<usize> {
        if handle.arena != self.id || handle.index >= self.entries.len() {
            return Err(NpuError::Runtime(format!(
                "weight handle {:?} does not belong to this arena",
                handle
            )));
        }
        Ok(handle.index)
    }

    fn handle(&self, index: usize) -> WeightHandle {
        WeightHandle {
            arena: self.id,
            index,
        }
    }

    /// Add a store the arena owns outright.
    pub fn insert(&mut self, weights: Weights) -> WeightHandle {
        self.entries.push(Entry {
            weights,
            origin: Origin::Owned,
            version: 0,
        });
        self.handle(self.entries.len() - 1)
    }

    /// Postsynaptic-perspective copy of `source`, created on first request and
    /// shared by every later request for the same source.
    pub fn derive_transposed(&mut self, source: WeightHandle, name: &str) -> Result<WeightHandle> {
        let src = self.index(source)?;
        if let Some(&existing) = self.transposes.get(&src) {
            return Ok(self.handle(existing));
        }
        self.refresh_index(src);
        let entry = &self.entries[src];
        let geometry = Arc::new(entry.weights.geometry().transposed(name)?);
        let weights = transpose_weights(&entry.weights, geometry)?;
        let source_version = entry.version;
        debug!(
            source = %entry.weights.name(),
            derived = %weights.name(),
            "derived transposed weights"
        );
        self.entries.push(Entry {
            weights,
            origin: Origin::Transposed {
                source: src,
                source_version,
            },
            version: 0,
        });
        let index = self.entries.len() - 1;
        self.transposes.insert(src, index);
        Ok(self.handle(index))
    }

    pub fn is_owned(&self, handle: WeightHandle) -> Result<bool> {
        let i = self.index(handle)?;
        Ok(self.entries[i].origin == Origin::Owned)
    }

    pub fn version(&self, handle: WeightHandle) -> Result<u64> {
        let i = self.index(handle)?;
        Ok(self.entries[i].version)
    }

    fn is_stale(&self, i: usize) -> bool {
        match self.entries[i].origin {
            Origin::Owned => false,
            Origin::Transposed {
                source,
                source_version,
            } => self.entries[source].version != source_version || self.is_stale(source),
        }
    }

    /// Read access. Fails for derived entries whose source changed since the last refresh.
    pub fn get(&self, handle: WeightHandle) -> Result<&Weights> {
        let i = self.index(handle)?;
        if self.is_stale(i) {
            return Err(NpuError::Runtime(format!(
                "weights \"{}\" are stale; refresh before reading",
                self.entries[i].weights.name()
            )));
        }
        Ok(&self.entries[i].weights)
    }

    /// Write access to an owned store. Derived entries are read-only.
    pub fn get_mut(&mut self, handle: WeightHandle) -> Result<&mut Weights> {
        let i = self.index(handle)?;
        let entry = &mut self.entries[i];
        if entry.origin != Origin::Owned {
            return Err(NpuError::Runtime(format!(
                "weights \"{}\" are derived and cannot be written",
                entry.weights.name()
            )));
        }
        entry.version += 1;
        Ok(&mut entry.weights)
    }

    /// Read `source` and write the owned `target` at the same time.
    pub fn source_and_target(
        &mut self,
        source: WeightHandle,
        target: WeightHandle,
    ) -> Result<(&Weights, &mut Weights)> {
        let s = self.index(source)?;
        let t = self.index(target)?;
        if s == t {
            return Err(NpuError::Runtime("source and target weights are the same store".into()));
        }
        self.refresh_index(s);
        // Validates that the target is owned and bumps its version.
        self.get_mut(target)?;
        if s < t {
            let (head, tail) = self.entries.split_at_mut(t);
            Ok((&head[s].weights, &mut tail[0].weights))
        } else {
            let (head, tail) = self.entries.split_at_mut(s);
            Ok((&tail[0].weights, &mut head[t].weights))
        }
    }

    /// Rebuild `handle` and its sources if stale. Returns whether anything was rebuilt.
    pub fn refresh(&mut self, handle: WeightHandle) -> Result<bool> {
        let i = self.index(handle)?;
        Ok(self.refresh_index(i))
    }

    fn refresh_index(&mut self, i: usize) -> bool {
        let Origin::Transposed {
            source,
            source_version,
        } = self.entries[i].origin
        else {
            return false;
        };
        let mut rebuilt = self.refresh_index(source);
        let current = self.entries[source].version;
        if current != source_version {
            // Derived entries are always created after their source.
            let (head, tail) = self.entries.split_at_mut(i);
            let src = &head[source];
            let dst = &mut tail[0];
            fill_transposed(&src.weights, &mut dst.weights);
            dst.origin = Origin::Transposed {
                source,
                source_version: current,
            };
            dst.version += 1;
            rebuilt = true;
        }
        rebuilt
    }

    /// Bring every derived entry up to date. Returns how many were rebuilt.
    pub fn refresh_all(&mut self) -> usize {
        let mut rebuilt = 0;
        for i in 0..self.entries.len() {
            let before = self.entries[i].version;
            self.refresh_index(i);
            if self.entries[i].version != before {
                rebuilt += 1;
            }
        }
        rebuilt
    }
}
