// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Layer descriptions.

use core::str::FromStr;

use synaptor_config::{ConfigError, ConfigResult, ParamGroup};
use synaptor_npu_neural::{NpuError, Result};

/// How a layer computes its activity each step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LayerUpdate {
    /// Activity is set from outside and otherwise held
    #[default]
    Input,
    /// Activity = excitatory - inhibitory - inhibitory B
    Linear,
}

impl FromStr for LayerUpdate {
    type Err = NpuError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "input" | "constant" => Ok(LayerUpdate::Input),
            "linear" | "ann" => Ok(LayerUpdate::Linear),
            other => Err(NpuError::configuration(
                "layer update",
                format!("unrecognized layer update \"{other}\""),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayerSpec {
    pub name: String,
    /// log2 of the neuron spacing relative to the column grid
    pub x_scale: i32,
    pub y_scale: i32,
    pub nf: usize,
    pub sparse: bool,
    pub spiking: bool,
    pub update: LayerUpdate,
    pub initial_value: f32,
}

impl LayerSpec {
    pub fn new(name: &str, nf: usize) -> Self {
        Self {
            name: name.to_string(),
            x_scale: 0,
            y_scale: 0,
            nf,
            sparse: false,
            spiking: false,
            update: LayerUpdate::Input,
            initial_value: 0.0,
        }
    }

    pub fn with_scale(mut self, x_scale: i32, y_scale: i32) -> Self {
        self.x_scale = x_scale;
        self.y_scale = y_scale;
        self
    }

    pub fn with_sparse(mut self, sparse: bool) -> Self {
        self.sparse = sparse;
        self
    }

    pub fn with_spiking(mut self, spiking: bool) -> Self {
        self.spiking = spiking;
        self
    }

    pub fn with_update(mut self, update: LayerUpdate) -> Self {
        self.update = update;
        self
    }

    pub fn with_initial_value(mut self, value: f32) -> Self {
        self.initial_value = value;
        self
    }

    /// Neurons along one axis for a column grid of `n`.
    fn scaled(&self, n: usize, scale: i32, axis: &str) -> Result<usize> {
        if scale >= 0 {
            let step = 1usize.checked_shl(scale as u32).unwrap_or(0);
            if step == 0 || n % step != 0 {
                return Err(NpuError::configuration(
                    &self.name,
                    format!("column size {n} along {axis} is not divisible by 2^{scale}"),
                ));
            }
            Ok(n / step)
        } else {
            n.checked_shl(scale.unsigned_abs())
                .filter(|&v| v >> scale.unsigned_abs() == n)
                .ok_or_else(|| NpuError::configuration(&self.name, format!("{axis} scale {scale} overflows")))
        }
    }

    /// Layer size for a column grid of `nx` by `ny`.
    pub fn extent(&self, nx: usize, ny: usize) -> Result<(usize, usize)> {
        if self.nf == 0 {
            return Err(NpuError::configuration(&self.name, "feature count must be at least 1"));
        }
        Ok((self.scaled(nx, self.x_scale, "x")?, self.scaled(ny, self.y_scale, "y")?))
    }

    pub fn from_group(group: &mut ParamGroup) -> ConfigResult<Self> {
        let name = group.name().to_string();
        let x_scale = group.read("x_scale", 0, false)?;
        let mut spec = Self::new(&name, group.read("nf", 1, true)?).with_scale(x_scale, group.read("y_scale", x_scale, false)?);
        spec.sparse = group.read("sparse", false, false)?;
        spec.spiking = group.read("spiking", false, false)?;
        spec.update = group
            .read::<String>("update", "input".to_string(), false)?
            .parse()
            .map_err(|e: NpuError| ConfigError::InvalidValue {
                group: name.clone(),
                key: "update".to_string(),
                reason: e.to_string(),
            })?;
        spec.initial_value = group.read("initial_value", 0.0, false)?;
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_scales_by_powers_of_two() {
        let spec = LayerSpec::new("L", 2).with_scale(1, -1);
        assert_eq!(spec.extent(8, 4).unwrap(), (4, 8));
        assert!(LayerSpec::new("L", 1).with_scale(2, 0).extent(6, 4).is_err());
        assert!(LayerSpec::new("L", 0).extent(4, 4).is_err());
    }

    #[test]
    fn test_from_group() {
        let table = synaptor_config::toml::from_str(
            r#"
            name = "Retina"
            nf = 3
            x_scale = 1
            update = "linear"
            sparse = true
            "#,
        )
        .unwrap();
        let mut group = ParamGroup::new("layer", table).unwrap();
        let spec = LayerSpec::from_group(&mut group).unwrap();
        assert_eq!(spec.nf, 3);
        assert_eq!((spec.x_scale, spec.y_scale), (1, 1));
        assert_eq!(spec.update, LayerUpdate::Linear);
        assert!(spec.sparse);
        assert!(group.finish().is_empty());
    }
}
