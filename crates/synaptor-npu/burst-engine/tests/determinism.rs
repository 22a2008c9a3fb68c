// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Delivery results must not depend on the number of worker threads.

mod common;

use std::sync::Arc;

use common::{create_test_column, pseudo_random, randomize_weights, set_input};
use synaptor_npu_burst_engine::delivery::{pooling, postsynaptic, presynaptic, ScratchBuffers};
use synaptor_npu_burst_engine::{
    Column, ConnectionKind, ConnectionSpec, CpuBackend, LayerSpec, LayerUpdate,
};
use synaptor_npu_neural::{
    transpose_weights, AccumulateType, Halo, LayerLoc, PatchGeometry, ScaleRelation, Weights,
};
use synaptor_npu_runtime::{ActivityCube, ChannelId};

fn build_network(threads: usize) -> Column {
    let mut column = create_test_column(16, 16, 2, threads);
    column.add_layer(LayerSpec::new("Retina", 2).with_sparse(true)).unwrap();
    column
        .add_layer(LayerSpec::new("V1", 4).with_update(LayerUpdate::Linear))
        .unwrap();
    column
        .add_layer(LayerSpec::new("Pool", 4).with_scale(1, 1).with_update(LayerUpdate::Linear))
        .unwrap();
    column
        .add_layer(LayerSpec::new("Recon", 2).with_update(LayerUpdate::Linear))
        .unwrap();
    column
        .add_connection(
            ConnectionSpec::hyper("RetinaToV1", "Retina", "V1")
                .with_patch(7, 7)
                .with_shared_weights(false),
        )
        .unwrap();
    column
        .add_connection(
            ConnectionSpec::pooling("V1ToPool", "V1", "Pool", AccumulateType::MaxPooling).with_patch(3, 3),
        )
        .unwrap();
    column
        .add_connection(ConnectionSpec::derived(
            "V1ToRecon",
            ConnectionKind::Transpose,
            "V1",
            "Recon",
            "RetinaToV1",
        ))
        .unwrap();
    column
        .add_connection(
            ConnectionSpec::hyper("ReconToV1", "Recon", "V1")
                .with_patch(3, 3)
                .with_channel(ChannelId::Inhibitory),
        )
        .unwrap();
    column.initialize().unwrap();
    randomize_weights(&mut column, "RetinaToV1", 5);
    randomize_weights(&mut column, "ReconToV1", 9);
    column
}

fn run(threads: usize) -> Vec<Vec<f32>> {
    let mut column = build_network(threads);
    let mut trace = Vec::new();
    for step in 0..3 {
        set_input(&mut column, "Retina", 40 + step, true);
        column.advance_time().unwrap();
        for layer in ["V1", "Pool", "Recon"] {
            trace.push(column.layer_activity(layer).unwrap().to_vec());
        }
        trace.push(column.post_index("V1ToPool").unwrap().iter().map(|&i| i as f32).collect());
    }
    trace
}

#[test]
fn test_results_are_bitwise_identical_across_thread_counts() {
    let single = run(1);
    let multi = run(4);
    assert_eq!(single.len(), multi.len());
    for (a, b) in single.iter().zip(&multi) {
        let a_bits: Vec<u32> = a.iter().map(|v| v.to_bits()).collect();
        let b_bits: Vec<u32> = b.iter().map(|v| v.to_bits()).collect();
        assert_eq!(a_bits, b_bits);
    }
}

#[test]
fn test_zero_activity_delivers_nothing() {
    let mut column = build_network(2);
    column.advance_time().unwrap();
    assert!(column
        .channel("V1", ChannelId::Excitatory)
        .unwrap()
        .iter()
        .all(|&v| v == 0.0));
    let stats = column.delivery_stats("RetinaToV1").unwrap();
    assert_eq!(stats.active, 0);
    assert_eq!(stats.partitions_touched, 0);
}

fn zero_cube<'a>(loc: &LayerLoc, data: &'a [f32]) -> ActivityCube<'a> {
    assert!(data.iter().all(|&a| a == 0.0));
    ActivityCube {
        loc: *loc,
        data,
        active: None,
        time: 0.0,
    }
}

fn prefilled_channel(post: &LayerLoc) -> Vec<f32> {
    pseudo_random(post.num_restricted() * post.nbatch, 11, 0.25, 2.0)
}

fn assert_bit_identical(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len());
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert_eq!(a.to_bits(), e.to_bits(), "index {i}: {a} vs {e}");
    }
}

fn convolution_fixture() -> (LayerLoc, LayerLoc, Weights) {
    let pre = LayerLoc::new(6, 6, 2, 2).with_halo(Halo::uniform(1));
    let post = LayerLoc::new(6, 6, 3, 2);
    let geometry = PatchGeometry::new(
        "PreToPost",
        pre,
        post,
        3,
        3,
        3,
        ScaleRelation::OneToOne,
        ScaleRelation::OneToOne,
    )
    .unwrap();
    let mut weights = Weights::new("PreToPost", Arc::new(geometry), 1, true).unwrap();
    let n = weights.arbor_data(0).len();
    weights.set_arbor_values(0, &pseudo_random(n, 5, -1.0, 1.0)).unwrap();
    (pre, post, weights)
}

#[test]
fn test_zero_activity_leaves_channel_untouched_presynaptic() {
    let (pre, post, weights) = convolution_fixture();
    let backend = CpuBackend::new(4, 8).unwrap();
    let mut scratch = ScratchBuffers::new(8, post.num_restricted(), 0.0, false);
    let data = vec![0.0; pre.num_extended() * pre.nbatch];
    let cube = zero_cube(&pre, &data);
    let before = prefilled_channel(&post);
    let mut channel = before.clone();

    let stats = presynaptic::deliver_convolve(&backend, &mut scratch, &cube, &weights, 0, 1.0, &mut channel);
    assert_bit_identical(&channel, &before);
    assert_eq!(stats.partitions_touched, 0);
}

#[test]
fn test_zero_activity_leaves_channel_untouched_postsynaptic() {
    let (pre, post, weights) = convolution_fixture();
    let transposed = weights.geometry().transposed("PostToPre").unwrap();
    let post_weights = transpose_weights(&weights, Arc::new(transposed)).unwrap();
    let backend = CpuBackend::new(4, 8).unwrap();
    let data = vec![0.0; pre.num_extended() * pre.nbatch];
    let cube = zero_cube(&pre, &data);
    let before = prefilled_channel(&post);
    let mut channel = before.clone();

    postsynaptic::deliver_convolve(&backend, &cube, &post_weights, 0, 1.0, &mut channel);
    assert_bit_identical(&channel, &before);
}

#[test]
fn test_zero_activity_leaves_channel_untouched_sum_pooling() {
    let pre = LayerLoc::new(6, 6, 2, 2).with_halo(Halo::uniform(1));
    let post = LayerLoc::new(6, 6, 2, 2);
    let geometry = PatchGeometry::new(
        "PreToPool",
        pre,
        post,
        3,
        3,
        2,
        ScaleRelation::OneToOne,
        ScaleRelation::OneToOne,
    )
    .unwrap();
    let backend = CpuBackend::new(4, 8).unwrap();
    let data = vec![0.0; pre.num_extended() * pre.nbatch];
    let cube = zero_cube(&pre, &data);
    let before = prefilled_channel(&post);

    let mut scratch = ScratchBuffers::new(8, post.num_restricted(), 0.0, false);
    let mut channel = before.clone();
    pooling::deliver_presynaptic(
        &backend,
        &mut scratch,
        &cube,
        &geometry,
        AccumulateType::SumPooling,
        &mut channel,
        &mut [],
    );
    assert_bit_identical(&channel, &before);

    let transposed = geometry.transposed("PoolToPre").unwrap();
    let mut channel = before.clone();
    pooling::deliver_postsynaptic(
        &backend,
        &cube,
        &transposed,
        AccumulateType::SumPooling,
        1.0,
        &mut channel,
        &mut [],
    );
    assert_bit_identical(&channel, &before);
}
