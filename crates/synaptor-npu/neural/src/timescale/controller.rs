// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;

use tracing::debug;

use super::{TimeScaleInfo, TimeScaleKind, TimeScaleParams};
use crate::types::{NpuError, Result};

#[derive(Debug, Clone)]
pub struct AdaptiveTimeScaleController {
    name: String,
    params: TimeScaleParams,
    kind: TimeScaleKind,
    info: TimeScaleInfo,
    old_info: TimeScaleInfo,
}

impl AdaptiveTimeScaleController {
    pub fn new(
        name: &str,
        batch_width: usize,
        params: TimeScaleParams,
        kind: TimeScaleKind,
    ) -> Result<Self> {
        params.validate(name)?;
        if let TimeScaleKind::Knee(knee) = kind {
            if !(knee.knee_slope > 0.0 && knee.knee_slope <= 1.0) {
                return Err(NpuError::configuration(
                    name,
                    format!("kneeSlope {} must be in (0, 1]", knee.knee_slope),
                ));
            }
        }
        if batch_width == 0 {
            return Err(NpuError::configuration(name, "batch width must be at least 1"));
        }
        let info = TimeScaleInfo::new(batch_width, &params);
        Ok(Self {
            name: name.to_string(),
            params,
            kind,
            old_info: info.clone(),
            info,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &TimeScaleParams {
        &self.params
    }

    pub fn kind(&self) -> TimeScaleKind {
        self.kind
    }

    pub fn info(&self) -> &TimeScaleInfo {
        &self.info
    }

    pub fn batch_width(&self) -> usize {
        self.info.batch_width()
    }

    /// Advance every batch element with this step's raw error values and
    /// return the next timestep per element.
    pub fn calc_timesteps(&mut self, raw_errors: &[f64]) -> Result<Vec<f64>> {
        if raw_errors.len() != self.batch_width() {
            return Err(NpuError::ArraySizeMismatch {
                expected: self.batch_width(),
                actual: raw_errors.len(),
            });
        }
        self.old_info = self.info.clone();
        self.info.time_scale_true.copy_from_slice(raw_errors);

        for b in 0..self.batch_width() {
            self.update_element(b);
        }
        Ok(self.info.time_scale.clone())
    }

    fn update_element(&mut self, b: usize) {
        let p = self.params;
        let e_dt = self.info.time_scale_true[b];
        let e_0 = self.old_info.time_scale_true[b];
        if e_dt == e_0 {
            return;
        }

        let time_scale = self.info.time_scale[b];
        let de_dt_scaled = (e_0 - e_dt) / time_scale;
        if de_dt_scaled < p.reset_thresh || e_0 <= 0.0 || e_dt <= 0.0 {
            self.info.time_scale[b] = p.base_min;
            self.info.time_scale_max[b] = p.base_max;
            debug!(
                controller = %self.name,
                batch = b,
                e_0,
                e_dt,
                "timescale reset"
            );
            return;
        }

        let old_max = self.old_info.time_scale_max[b];
        let mut max = self.info.time_scale_max[b];
        let mut next = p.tau_factor * e_0 / de_dt_scaled;
        if next >= max {
            next = max;
            max *= 1.0 + p.growth_factor;
        }
        if let TimeScaleKind::Knee(knee) = self.kind {
            if max > knee.knee_thresh {
                max = old_max + (max - old_max) * knee.knee_slope;
            }
        }
        self.info.time_scale_max[b] = max;
        self.info.time_scale[b] = next.min(max).max(p.base_min);
    }

    /// Replace the state, e.g. from a checkpoint.
    pub fn restore(&mut self, info: TimeScaleInfo) -> Result<()> {
        if info.batch_width() != self.batch_width()
            || info.time_scale_max.len() != self.batch_width()
            || info.time_scale_true.len() != self.batch_width()
        {
            return Err(NpuError::Checkpoint(format!(
                "{}: checkpointed batch width {} does not match {}",
                self.name,
                info.batch_width(),
                self.batch_width()
            )));
        }
        self.old_info = info.clone();
        self.info = info;
        Ok(())
    }

    pub fn write_timestep_info(&self, time: f64, out: &mut impl Write) -> std::io::Result<()> {
        writeln!(out, "sim_time = {time}")?;
        for b in 0..self.batch_width() {
            writeln!(
                out,
                "\tbatch = {}, timeScale = {:.10}, timeScaleMax = {:.10}, timeScaleTrue = {:.10}",
                b, self.info.time_scale[b], self.info.time_scale_max[b], self.info.time_scale_true[b]
            )?;
        }
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timescale::KneeParams;

    fn create_test_controller(kind: TimeScaleKind) -> AdaptiveTimeScaleController {
        let params = TimeScaleParams {
            base_max: 12.0,
            base_min: 1.0,
            tau_factor: 100.0,
            growth_factor: 1.0,
            reset_thresh: 0.0,
        };
        AdaptiveTimeScaleController::new("ts", 2, params, kind).unwrap()
    }

    #[test]
    fn test_initial_state() {
        let c = create_test_controller(TimeScaleKind::Adaptive);
        assert_eq!(c.info().time_scale, vec![1.0, 1.0]);
        assert_eq!(c.info().time_scale_max, vec![12.0, 12.0]);
        assert_eq!(c.info().time_scale_true, vec![-1.0, -1.0]);
    }

    #[test]
    fn test_growth_clamps_to_ceiling() {
        let mut c = create_test_controller(TimeScaleKind::Adaptive);
        c.calc_timesteps(&[1.0, 1.0]).unwrap();
        let dt = c.calc_timesteps(&[0.5, 0.5]).unwrap();
        assert_eq!(dt, vec![12.0, 12.0]);
        assert_eq!(c.info().time_scale_max, vec![24.0, 24.0]);
    }

    #[test]
    fn test_knee_damps_growth() {
        let knee = KneeParams {
            knee_thresh: 10.0,
            knee_slope: 0.1,
        };
        let mut c = create_test_controller(TimeScaleKind::Knee(knee));
        c.calc_timesteps(&[1.0, 1.0]).unwrap();
        let dt = c.calc_timesteps(&[0.5, 0.5]).unwrap();
        assert!((c.info().time_scale_max[0] - 13.2).abs() < 1e-12);
        assert_eq!(dt[0], 12.0);
    }

    #[test]
    fn test_reset_restores_ceiling_without_knee() {
        let knee = KneeParams {
            knee_thresh: 10.0,
            knee_slope: 0.1,
        };
        let mut c = create_test_controller(TimeScaleKind::Knee(knee));
        c.calc_timesteps(&[1.0, 1.0]).unwrap();
        c.calc_timesteps(&[0.5, 0.5]).unwrap();
        assert!((c.info().time_scale_max[0] - 13.2).abs() < 1e-12);

        // rising error resets; base_max is above the knee but stays undamped
        let dt = c.calc_timesteps(&[2.0, 0.5]).unwrap();
        assert_eq!(dt[0], 1.0);
        assert_eq!(c.info().time_scale_max[0], 12.0);
        assert!((c.info().time_scale_max[1] - 13.2).abs() < 1e-12);

        // growth after the reset is damped against the restored ceiling
        let dt = c.calc_timesteps(&[1.0, 0.5]).unwrap();
        assert_eq!(dt[0], 12.0);
        assert!((c.info().time_scale_max[0] - 13.2).abs() < 1e-12);
    }

    #[test]
    fn test_timestep_clamped_to_base_min() {
        let params = TimeScaleParams {
            base_max: 12.0,
            base_min: 1.0,
            tau_factor: 0.01,
            growth_factor: 1.0,
            reset_thresh: 0.0,
        };
        let knee = KneeParams {
            knee_thresh: 10.0,
            knee_slope: 0.1,
        };
        let mut c = AdaptiveTimeScaleController::new("ts", 1, params, TimeScaleKind::Knee(knee)).unwrap();
        c.calc_timesteps(&[1.0]).unwrap();
        let dt = c.calc_timesteps(&[0.5]).unwrap();
        assert_eq!(dt, vec![1.0]);
        assert_eq!(c.info().time_scale_max, vec![12.0]);
    }

    #[test]
    fn test_unchanged_error_is_steady() {
        let mut c = create_test_controller(TimeScaleKind::Adaptive);
        c.calc_timesteps(&[1.0, 1.0]).unwrap();
        c.calc_timesteps(&[0.5, 0.5]).unwrap();
        let before = c.info().clone();
        c.calc_timesteps(&[0.5, 0.5]).unwrap();
        assert_eq!(c.info().time_scale, before.time_scale);
        assert_eq!(c.info().time_scale_max, before.time_scale_max);
    }

    #[test]
    fn test_rejects_wrong_batch_width() {
        let mut c = create_test_controller(TimeScaleKind::Adaptive);
        assert!(c.calc_timesteps(&[1.0]).is_err());
    }

    #[test]
    fn test_invalid_params() {
        let params = TimeScaleParams {
            base_min: 2.0,
            base_max: 1.0,
            ..Default::default()
        };
        assert!(AdaptiveTimeScaleController::new("ts", 1, params, TimeScaleKind::Adaptive).is_err());
        let knee = KneeParams {
            knee_thresh: 1.0,
            knee_slope: 0.0,
        };
        assert!(AdaptiveTimeScaleController::new(
            "ts",
            1,
            TimeScaleParams::default(),
            TimeScaleKind::Knee(knee)
        )
        .is_err());
    }

    #[test]
    fn test_write_timestep_info() {
        let c = create_test_controller(TimeScaleKind::Adaptive);
        let mut out = Vec::new();
        c.write_timestep_info(2.5, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("sim_time = 2.5\n"));
        assert!(text.contains("batch = 1, timeScale = 1.0000000000"));
    }
}
