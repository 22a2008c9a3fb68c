// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Controller scenarios: reset on invalid energy, knee damping, bounds.

use synaptor_npu_neural::*;

fn params(base_max: f64, growth_factor: f64) -> TimeScaleParams {
    TimeScaleParams {
        base_max,
        base_min: 0.5,
        tau_factor: 100.0,
        growth_factor,
        reset_thresh: 0.0,
    }
}

#[test]
fn test_negative_energy_resets_regardless_of_prior_state() {
    let mut c =
        AdaptiveTimeScaleController::new("reset", 1, params(4.0, 1.0), TimeScaleKind::Adaptive)
            .unwrap();
    // drive the ceiling up first
    c.calc_timesteps(&[2.0]).unwrap();
    c.calc_timesteps(&[1.5]).unwrap();
    c.calc_timesteps(&[1.0]).unwrap();
    assert_eq!(c.info().time_scale[0], 8.0);
    assert_eq!(c.info().time_scale_max[0], 16.0);

    let dt = c.calc_timesteps(&[-0.5]).unwrap();
    assert_eq!(dt, vec![0.5]);
    assert_eq!(c.info().time_scale[0], 0.5);
    assert_eq!(c.info().time_scale_max[0], 4.0);
}

#[test]
fn test_knee_damps_ceiling_from_12_towards_20() {
    let knee = KneeParams {
        knee_thresh: 10.0,
        knee_slope: 0.1,
    };
    let mut c =
        AdaptiveTimeScaleController::new("jic", 1, params(12.0, 2.0 / 3.0), TimeScaleKind::Knee(knee))
            .unwrap();
    c.calc_timesteps(&[1.0]).unwrap();
    assert_eq!(c.info().time_scale_max[0], 12.0);

    let dt = c.calc_timesteps(&[0.5]).unwrap();
    assert!((c.info().time_scale_max[0] - 12.8).abs() < 1e-9);
    assert!(dt[0] <= c.info().time_scale_max[0]);
}

#[test]
fn test_knee_below_threshold_is_invisible() {
    let knee = KneeParams {
        knee_thresh: 100.0,
        knee_slope: 0.1,
    };
    let mut plain =
        AdaptiveTimeScaleController::new("a", 1, params(2.0, 1.0), TimeScaleKind::Adaptive).unwrap();
    let mut jic =
        AdaptiveTimeScaleController::new("b", 1, params(2.0, 1.0), TimeScaleKind::Knee(knee)).unwrap();
    for e in [1.0, 0.8, 0.6, 0.5, 0.45] {
        assert_eq!(plain.calc_timesteps(&[e]).unwrap(), jic.calc_timesteps(&[e]).unwrap());
    }
    assert_eq!(plain.info(), jic.info());
}

#[test]
fn test_bounds_hold_for_every_update() {
    let knee = KneeParams {
        knee_thresh: 3.0,
        knee_slope: 0.5,
    };
    let mut c =
        AdaptiveTimeScaleController::new("bounds", 3, params(1.0, 0.5), TimeScaleKind::Knee(knee))
            .unwrap();
    let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
    for _ in 0..500 {
        let mut errors = [0.0f64; 3];
        for e in &mut errors {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            *e = ((seed >> 33) as f64 / (1u64 << 31) as f64) * 2.0 - 0.2;
        }
        let dt = c.calc_timesteps(&errors).unwrap();
        for b in 0..3 {
            let info = c.info();
            assert!(info.time_scale[b] >= 0.5);
            assert!(info.time_scale[b] <= info.time_scale_max[b]);
            assert_eq!(dt[b], info.time_scale[b]);
        }
    }
}

#[test]
fn test_batch_elements_are_independent() {
    let mut c =
        AdaptiveTimeScaleController::new("batch", 2, params(4.0, 1.0), TimeScaleKind::Adaptive)
            .unwrap();
    c.calc_timesteps(&[1.0, 1.0]).unwrap();
    let dt = c.calc_timesteps(&[0.5, -1.0]).unwrap();
    assert_eq!(dt[0], 4.0);
    assert_eq!(dt[1], 0.5);
}
