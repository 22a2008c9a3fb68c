// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Column run settings and construction from a configuration file.

use std::path::PathBuf;

use synaptor_config::{ConfigError, SynaptorConfig, TimeScaleControllerKind};
use synaptor_npu_neural::{KneeParams, NpuError, Result, TimeScaleKind, TimeScaleParams};
use tracing::info;

use super::{Column, LayerSpec};
use crate::backend::BackendType;
use crate::connection::ConnectionSpec;

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSettings {
    pub name: String,
    /// Neurons per axis at scale 0
    pub nx: usize,
    pub ny: usize,
    pub nbatch: usize,
    pub dt: f64,
    pub start_time: f64,
    pub stop_time: f64,
    /// 0 = one delivery thread per core
    pub num_threads: usize,
    pub partitions: usize,
    pub backend: BackendType,
    pub checkpoint_dir: Option<PathBuf>,
    pub timestep_info_file: Option<PathBuf>,
}

impl Default for ColumnSettings {
    fn default() -> Self {
        Self {
            name: "column".to_string(),
            nx: 32,
            ny: 32,
            nbatch: 1,
            dt: 1.0,
            start_time: 0.0,
            stop_time: 10.0,
            num_threads: 0,
            partitions: 8,
            backend: BackendType::Cpu,
            checkpoint_dir: None,
            timestep_info_file: None,
        }
    }
}

impl ColumnSettings {
    pub fn new(name: &str, nx: usize, ny: usize, nbatch: usize) -> Self {
        Self {
            name: name.to_string(),
            nx,
            ny,
            nbatch,
            ..Self::default()
        }
    }

    pub fn with_threads(mut self, num_threads: usize, partitions: usize) -> Self {
        self.num_threads = num_threads;
        self.partitions = partitions;
        self
    }

    pub fn with_times(mut self, dt: f64, start_time: f64, stop_time: f64) -> Self {
        self.dt = dt;
        self.start_time = start_time;
        self.stop_time = stop_time;
        self
    }

    pub fn from_config(config: &SynaptorConfig) -> Result<Self> {
        let column = &config.column;
        Ok(Self {
            name: column.name.clone(),
            nx: column.nx,
            ny: column.ny,
            nbatch: column.nbatch,
            dt: column.dt,
            start_time: column.start_time,
            stop_time: column.stop_time,
            num_threads: config.system.num_threads,
            partitions: config.system.partitions,
            backend: config.system.backend.parse()?,
            checkpoint_dir: column.checkpoint_dir.clone(),
            timestep_info_file: column.timestep_info_file.clone(),
        })
    }
}

pub(crate) fn config_error(err: ConfigError) -> NpuError {
    NpuError::configuration("config", err.to_string())
}

/// Controller parameters from `[timescale]`, or `None` when disabled.
pub fn timescale_from_config(config: &SynaptorConfig) -> Option<(TimeScaleParams, TimeScaleKind)> {
    let ts = &config.timescale;
    let params = TimeScaleParams {
        base_max: ts.base_max,
        base_min: ts.base_min,
        tau_factor: ts.tau_factor,
        growth_factor: ts.growth_factor,
        reset_thresh: ts.reset_thresh,
    };
    match ts.kind {
        TimeScaleControllerKind::None => None,
        TimeScaleControllerKind::Adaptive => Some((params, TimeScaleKind::Adaptive)),
        TimeScaleControllerKind::Jic => Some((
            params,
            TimeScaleKind::Knee(KneeParams {
                knee_thresh: ts.knee_thresh,
                knee_slope: ts.knee_slope,
            }),
        )),
    }
}

impl Column {
    /// Build an uninitialized column from a loaded configuration.
    ///
    /// Every `[[layer]]` and `[[connection]]` table is read once; keys that
    /// nothing read are reported as warnings.
    pub fn from_config(config: &SynaptorConfig) -> Result<Self> {
        let mut column = Column::new(ColumnSettings::from_config(config)?)?;
        for mut group in config.layer_groups().map_err(config_error)? {
            let spec = LayerSpec::from_group(&mut group).map_err(config_error)?;
            group.finish();
            column.add_layer(spec)?;
        }
        for mut group in config.connection_groups().map_err(config_error)? {
            let spec = ConnectionSpec::from_group(&mut group).map_err(config_error)?;
            group.finish();
            column.add_connection(spec)?;
        }
        if let Some((params, kind)) = timescale_from_config(config) {
            let layer = config
                .timescale
                .energy_layer
                .as_deref()
                .ok_or_else(|| NpuError::configuration("timescale", "energy_layer is not set"))?;
            column.set_timescale(params, kind, layer)?;
        }
        info!(
            column = %column.settings().name,
            layers = column.num_layers(),
            connections = column.num_connections(),
            "column built from configuration"
        );
        Ok(column)
    }
}
