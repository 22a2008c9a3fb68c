// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # CPU Backend
//!
//! A dedicated rayon pool plus a fixed partition count. Presynaptic work is
//! split into `partitions` contiguous chunks, one private scratch buffer per
//! chunk, regardless of how many threads the pool has. The partition layout
//! therefore never depends on the thread count, which keeps summation order
//! and max tie-breaking identical for 1 or N threads.

use std::ops::Range;

use synaptor_npu_neural::{NpuError, Result};
use tracing::debug;

pub struct CpuBackend {
    name: String,
    pool: rayon::ThreadPool,
    partitions: usize,
}

impl CpuBackend {
    /// `num_threads == 0` lets rayon pick one thread per core.
    pub fn new(num_threads: usize, partitions: usize) -> Result<Self> {
        if partitions == 0 {
            return Err(NpuError::configuration(
                "CpuBackend",
                "number of delivery partitions must be at least 1",
            ));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("synaptor-delivery-{}", i))
            .build()
            .map_err(|e| NpuError::Runtime(format!("failed to build delivery thread pool: {}", e)))?;
        let threads = pool.current_num_threads();
        debug!(threads, partitions, "CPU delivery backend ready");
        Ok(Self {
            name: format!("CPU ({} threads, {} partitions)", threads, partitions),
            pool,
            partitions,
        })
    }

    pub fn backend_name(&self) -> &str {
        &self.name
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn partitions(&self) -> usize {
        self.partitions
    }

    /// Run `op` inside this backend's pool.
    pub fn install<R, F>(&self, op: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }
}

/// Items `[start, end)` handled by partition `p` when `len` items are split
/// into `parts` contiguous chunks. Earlier partitions take the remainder.
pub fn partition_range(len: usize, parts: usize, p: usize) -> Range<usize> {
    let base = len / parts;
    let extra = len % parts;
    let start = p * base + p.min(extra);
    let size = base + usize::from(p < extra);
    start..start + size
}
