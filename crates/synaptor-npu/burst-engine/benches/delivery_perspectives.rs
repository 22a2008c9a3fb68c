// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Presynaptic scatter vs postsynaptic gather
//!
//! Same connection delivered both ways over a range of patch sizes. Sparse
//! input favors the presynaptic path, dense input and large patches the
//! postsynaptic one.

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use synaptor_npu_burst_engine::{Column, ColumnSettings, ConnectionKind, ConnectionSpec, LayerSpec};

fn build_column(nxp: usize, density: usize) -> Column {
    let mut column = Column::new(ColumnSettings::new("bench", 64, 64, 1).with_threads(0, 8)).unwrap();
    column.add_layer(LayerSpec::new("Input", 4).with_sparse(true)).unwrap();
    column.add_layer(LayerSpec::new("ViaPre", 8)).unwrap();
    column.add_layer(LayerSpec::new("ViaPost", 8)).unwrap();
    column
        .add_connection(ConnectionSpec::hyper("InputToViaPre", "Input", "ViaPre").with_patch(nxp, nxp))
        .unwrap();
    column
        .add_connection(
            ConnectionSpec::derived("InputToViaPost", ConnectionKind::Clone, "Input", "ViaPost", "InputToViaPre")
                .with_post_perspective(true),
        )
        .unwrap();
    column.initialize().unwrap();
    let n = column.layer("Input").unwrap().loc().num_restricted();
    let input: Vec<f32> = (0..n)
        .map(|k| if k % density == 0 { 1.0 + (k % 7) as f32 * 0.1 } else { 0.0 })
        .collect();
    column.set_layer_activity("Input", 0, &input).unwrap();
    column.republish().unwrap();
    column
}

fn bench_perspectives(c: &mut Criterion) {
    let mut group = c.benchmark_group("delivery_perspectives");
    group.measurement_time(Duration::from_secs(5));
    for nxp in [3usize, 7, 11] {
        for density in [1usize, 20] {
            let mut column = build_column(nxp, density);
            let label = format!("nxp{nxp}_every{density}");
            group.bench_with_input(BenchmarkId::new("advance_both", &label), &label, |b, _| {
                b.iter(|| {
                    column.advance_time().unwrap();
                    black_box(column.delivery_stats("InputToViaPre").unwrap().accumulate_us);
                })
            });
            let pre = column.delivery_stats("InputToViaPre").unwrap().clone();
            let post = column.delivery_stats("InputToViaPost").unwrap().clone();
            println!(
                "{label}: presynaptic {:.1}us (+{:.1}us merge), postsynaptic {:.1}us",
                pre.accumulate_us, pre.merge_us, post.accumulate_us
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_perspectives);
criterion_main!(benches);
