// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use synaptor_config::{load_config_str, validate_config, TimeScaleControllerKind};

const COLUMN_TOML: &str = r#"
[system]
partitions = 4

[column]
name = "Column"
nx = 8
ny = 8
nbatch = 2
stop_time = 5.0

[timescale]
kind = "jic"
energy_layer = "Output"
base_max = 2.0
base_min = 1.0
tau_factor = 0.03
growth_factor = 2.0
knee_thresh = 12.0
knee_slope = 0.1

[[layer]]
name = "Input"
x_scale = 0
nf = 2

[[layer]]
name = "Output"
x_scale = -1
nf = 3

[[connection]]
name = "InputToOutput"
kind = "hyper"
pre = "Input"
post = "Output"
nxp = 3
nyp = 3
channel = "excitatory"
"#;

#[test]
fn column_file_parses_and_validates() {
    let config = load_config_str(COLUMN_TOML).unwrap();
    validate_config(&config).unwrap();

    assert_eq!(config.column.nbatch, 2);
    assert_eq!(config.timescale.kind, TimeScaleControllerKind::Jic);
    assert_eq!(config.timescale.knee_thresh, 12.0);

    let layers = config.layer_groups().unwrap();
    assert_eq!(layers.len(), 2);
    assert_eq!(layers[1].name(), "Output");
}

#[test]
fn connection_parameters_read_once() {
    let config = load_config_str(COLUMN_TOML).unwrap();
    let mut groups = config.connection_groups().unwrap();
    let mut conn = groups.remove(0);

    assert_eq!(conn.require::<String>("pre").unwrap(), "Input");
    assert_eq!(conn.require::<String>("post").unwrap(), "Output");
    assert_eq!(conn.read::<usize>("nxp", 1, true).unwrap(), 3);
    assert_eq!(conn.read::<f32>("strength", 1.0, false).unwrap(), 1.0);

    let unread = conn.finish();
    assert_eq!(unread, vec!["channel", "kind", "nyp"]);
}
