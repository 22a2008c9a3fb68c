// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! End to end: TOML file -> column -> run -> checkpoint -> restart.

use std::fs;

use synaptor::config::{load_config, validate_config};
use synaptor::prelude::*;
use tempfile::TempDir;

fn write_config(dir: &TempDir, stop_time: f64) -> std::path::PathBuf {
    let checkpoint = dir.path().join("checkpoint");
    let info = dir.path().join("timesteps.txt");
    let text = format!(
        r#"
[system]
num_threads = 2
partitions = 4

[column]
name = "e2e"
nx = 8
ny = 8
nbatch = 1
dt = 1.0
start_time = 0.0
stop_time = {stop_time}
checkpoint_dir = "{checkpoint}"
timestep_info_file = "{info}"

[timescale]
kind = "adaptive"
energy_layer = "Output"
base_max = 4.0
base_min = 1.0
tau_factor = 0.5
growth_factor = 1.0

[[layer]]
name = "Input"
nf = 1
initial_value = 0.5

[[layer]]
name = "Output"
nf = 2
update = "linear"

[[connection]]
name = "InputToOutput"
kind = "hyper"
pre = "Input"
post = "Output"
nxp = 3
nyp = 3
weight_init = "constant"
weight_value = 0.1

[[connection]]
name = "InputToOutputClone"
kind = "clone"
pre = "Input"
post = "Output"
original = "InputToOutput"
"#,
        checkpoint = checkpoint.display(),
        info = info.display(),
    );
    let path = dir.path().join("synaptor.toml");
    fs::write(&path, text).unwrap();
    path
}

#[test]
fn test_run_from_config_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, 5.0);
    let config = load_config(Some(&path), None).unwrap();
    validate_config(&config).unwrap();

    let mut column = Column::from_config(&config).unwrap();
    column.initialize().unwrap();
    assert_eq!(column.init_order(), vec!["InputToOutput", "InputToOutputClone"]);
    column.run().unwrap();

    assert_eq!(column.step(), 5);
    assert!((column.sim_time() - 5.0).abs() < 1e-9);
    assert_eq!(column.timesteps().len(), 1);
    let info = fs::read_to_string(dir.path().join("timesteps.txt")).unwrap();
    assert_eq!(info.matches("sim_time = ").count(), 5);
    assert!(info.contains("batch = 0, timeScale = "));
    assert!(dir.path().join("checkpoint").exists());
}

#[test]
fn test_restart_continues_from_checkpoint() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, 3.0);
    let config = load_config(Some(&path), None).unwrap();

    let mut first = Column::from_config(&config).unwrap();
    first.initialize().unwrap();
    first.run().unwrap();

    let mut resumed = Column::from_config(&config).unwrap();
    resumed.initialize().unwrap();
    resumed.read_checkpoint(&dir.path().join("checkpoint")).unwrap();
    assert_eq!(resumed.step(), 3);
    assert_eq!(resumed.layer_activity("Output").unwrap(), first.layer_activity("Output").unwrap());
    assert_eq!(resumed.timescale_info(), first.timescale_info());
}

#[test]
fn test_invalid_timescale_rejected() {
    let config = synaptor::config::load_config_str(
        r#"
[timescale]
kind = "jic"
energy_layer = "Output"
knee_slope = 2.0
"#,
    )
    .unwrap();
    let err = validate_config(&config).unwrap_err();
    assert!(err.to_string().contains("knee_slope"));
}
