// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Shared helpers for burst engine integration tests.

#![allow(dead_code)]

use synaptor_npu_burst_engine::{Column, ColumnSettings};

pub fn create_test_column(nx: usize, ny: usize, nbatch: usize, threads: usize) -> Column {
    Column::new(ColumnSettings::new("test", nx, ny, nbatch).with_threads(threads, 8)).unwrap()
}

/// Deterministic values in `[lo, hi)`.
pub fn pseudo_random(n: usize, seed: u64, lo: f32, hi: f32) -> Vec<f32> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..n)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let unit = (state >> 40) as f32 / (1u64 << 24) as f32;
            lo + (hi - lo) * unit
        })
        .collect()
}

/// Like [`pseudo_random`] with roughly a third of the entries zeroed.
pub fn sparse_random(n: usize, seed: u64) -> Vec<f32> {
    pseudo_random(n, seed, -1.0, 1.0)
        .into_iter()
        .enumerate()
        .map(|(i, v)| if i % 3 == 1 { 0.0 } else { v })
        .collect()
}

pub fn assert_close(actual: &[f32], expected: &[f32], tol: f32) {
    assert_eq!(actual.len(), expected.len());
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        let scale = 1.0 + a.abs().max(e.abs());
        assert!((a - e).abs() <= tol * scale, "index {i}: {a} vs {e}");
    }
}

/// Overwrite every arbor of a connection's weights with deterministic values.
pub fn randomize_weights(column: &mut Column, connection: &str, seed: u64) {
    let weights = column.weights_mut(connection).unwrap();
    for arbor in 0..weights.num_arbors() {
        let len = weights.arbor_data(arbor).len();
        let values = pseudo_random(len, seed + arbor as u64, -1.0, 1.0);
        weights.arbor_data_mut(arbor).copy_from_slice(&values);
    }
}

/// Set the same kind of input on every batch element, then publish it.
pub fn set_input(column: &mut Column, layer: &str, seed: u64, sparse: bool) {
    let n = column.layer(layer).unwrap().loc().num_restricted();
    let nbatch = column.settings().nbatch;
    for b in 0..nbatch {
        let seed = seed + 97 * b as u64;
        let values = if sparse {
            sparse_random(n, seed)
        } else {
            pseudo_random(n, seed, 0.05, 1.0)
        };
        column.set_layer_activity(layer, b, &values).unwrap();
    }
    column.republish().unwrap();
}
