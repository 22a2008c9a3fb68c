// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! A run interrupted by a checkpoint must continue exactly like an
//! uninterrupted one.

mod common;

use common::{create_test_column, randomize_weights, set_input};
use synaptor_npu_burst_engine::{Column, ConnectionKind, ConnectionSpec, LayerSpec, LayerUpdate};
use synaptor_npu_neural::{AccumulateType, TimeScaleKind, TimeScaleParams};
use synaptor_npu_runtime::ChannelId;

const LAYERS: [&str; 4] = ["Input", "Hidden", "Pooled", "Recon"];

fn build() -> Column {
    let mut column = create_test_column(8, 8, 2, 2);
    column.add_layer(LayerSpec::new("Input", 1)).unwrap();
    column
        .add_layer(LayerSpec::new("Hidden", 2).with_update(LayerUpdate::Linear))
        .unwrap();
    column
        .add_layer(LayerSpec::new("Pooled", 2).with_scale(1, 1).with_update(LayerUpdate::Linear))
        .unwrap();
    column
        .add_layer(LayerSpec::new("Recon", 1).with_update(LayerUpdate::Linear))
        .unwrap();
    column
        .add_connection(
            ConnectionSpec::hyper("InputToHidden", "Input", "Hidden")
                .with_patch(3, 3)
                .with_delays(vec![0, 2])
                .with_plasticity(0.001),
        )
        .unwrap();
    column
        .add_connection(ConnectionSpec::pooling(
            "HiddenToPooled",
            "Hidden",
            "Pooled",
            AccumulateType::MaxPooling,
        ))
        .unwrap();
    column
        .add_connection(
            ConnectionSpec::derived("HiddenToRecon", ConnectionKind::Transpose, "Hidden", "Recon", "InputToHidden")
                .with_channel(ChannelId::Excitatory),
        )
        .unwrap();
    column
        .add_connection(ConnectionSpec::derived(
            "InputToHiddenCopy",
            ConnectionKind::Copy,
            "Input",
            "Hidden",
            "InputToHidden",
        ))
        .unwrap();
    let params = TimeScaleParams {
        base_max: 1.0,
        base_min: 0.25,
        tau_factor: 0.1,
        growth_factor: 0.5,
        reset_thresh: -1.0,
    };
    column.set_timescale(params, TimeScaleKind::Adaptive, "Recon").unwrap();
    column.initialize().unwrap();
    randomize_weights(&mut column, "InputToHidden", 23);
    set_input(&mut column, "Input", 31, false);
    column
}

fn snapshot(column: &mut Column) -> Vec<Vec<f32>> {
    let mut out: Vec<Vec<f32>> = LAYERS
        .iter()
        .map(|l| column.layer_activity(l).unwrap().to_vec())
        .collect();
    out.push(column.weights("InputToHidden").unwrap().arbor_data(1).to_vec());
    out.push(column.weights("HiddenToRecon").unwrap().arbor_data(0).to_vec());
    out.push(column.weights("InputToHiddenCopy").unwrap().arbor_data(0).to_vec());
    out.push(column.post_index("HiddenToPooled").unwrap().iter().map(|&i| i as f32).collect());
    out
}

#[test]
fn test_restart_matches_continuous_run() {
    let mut continuous = build();
    for _ in 0..6 {
        continuous.advance_time().unwrap();
    }

    let dir = tempfile::tempdir().unwrap();
    let mut first = build();
    for _ in 0..3 {
        first.advance_time().unwrap();
    }
    first.write_checkpoint(dir.path()).unwrap();

    let mut resumed = build();
    resumed.read_checkpoint(dir.path()).unwrap();
    assert_eq!(resumed.step(), 3);
    assert_eq!(resumed.sim_time(), first.sim_time());
    for _ in 0..3 {
        resumed.advance_time().unwrap();
    }

    assert_eq!(resumed.sim_time(), continuous.sim_time());
    assert_eq!(resumed.timesteps(), continuous.timesteps());
    assert_eq!(resumed.timescale_info(), continuous.timescale_info());
    assert_eq!(snapshot(&mut resumed), snapshot(&mut continuous));
    assert_eq!(
        resumed.copy_updater("InputToHiddenCopy").unwrap().last_update_time(),
        continuous.copy_updater("InputToHiddenCopy").unwrap().last_update_time()
    );
}

#[test]
fn test_checkpoint_requires_allocation() {
    let column = create_test_column(4, 4, 1, 1);
    let dir = tempfile::tempdir().unwrap();
    assert!(column.write_checkpoint(dir.path()).is_err());
}
