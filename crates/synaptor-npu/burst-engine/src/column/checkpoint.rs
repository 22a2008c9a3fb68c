// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Column checkpoint entries.
//!
//! | entry                      | contents                                   |
//! |----------------------------|--------------------------------------------|
//! | `<column>_clock`           | simulation time and step count             |
//! | `<controller>_timescaleinfo` | controller state, broadcast on restore   |
//! | `<connection>_W`           | owned weights and their timestamp          |
//! | `<connection>_postIndex`   | forward max-pooling winners                |
//! | `<connection>_lastUpdateTime` | copy updater state                      |
//! | `<layer>_A`                | extended activity                          |
//! | `<layer>_Delays`           | publication history                        |
//!
//! Clones and transposes own nothing and write nothing.

use std::path::Path;

use serde::{Deserialize, Serialize};
use synaptor_npu_neural::{NpuError, Result, TimeScaleInfo};
use synaptor_npu_runtime::{Checkpointer, PublisherState};
use tracing::info;

use super::{Column, Phase, Updater};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Clock {
    sim_time: f64,
    step: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WeightsEntry {
    timestamp: f64,
    arbors: Vec<Vec<f32>>,
}

fn check_len(entry: &str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(NpuError::Checkpoint(format!(
            "{entry}: expected {expected} values, found {actual}"
        )));
    }
    Ok(())
}

impl Column {
    fn clock_entry(&self) -> String {
        format!("{}_clock", self.settings.name)
    }

    /// Register every persistent value and write them under `dir`.
    pub fn write_checkpoint(&self, dir: &Path) -> Result<()> {
        self.ensure_phase(Phase::Allocated, "write a checkpoint")?;
        let mut cp = Checkpointer::new();
        let clock = Clock {
            sim_time: self.sim_time,
            step: self.step,
        };
        cp.register_entry(&self.clock_entry(), &clock, true, false)?;
        if let Some(ts) = &self.timescale {
            let entry = format!("{}_timescaleinfo", ts.controller.name());
            cp.register_entry(&entry, ts.controller.info(), true, false)?;
        }
        for conn in &self.connections {
            if conn.spec.kind.owns_weights() {
                let weights = self.arena.get(conn.weights_handle()?)?;
                let entry = WeightsEntry {
                    timestamp: weights.timestamp(),
                    arbors: (0..weights.num_arbors()).map(|a| weights.arbor_data(a).to_vec()).collect(),
                };
                cp.register_entry(&format!("{}_W", conn.name()), &entry, false, false)?;
            }
            if conn.strategy.records_winners() {
                cp.register_entry(&format!("{}_postIndex", conn.name()), &conn.post_index, false, false)?;
            }
        }
        for updater in &self.updaters {
            if let Updater::Copy { updater, .. } = updater {
                updater.register_checkpoint(&mut cp)?;
            }
        }
        for layer in &self.layers {
            cp.register_entry(&format!("{}_A", layer.name()), &layer.activity(), false, false)?;
            cp.register_entry(&format!("{}_Delays", layer.name()), &layer.publisher_state()?, false, false)?;
        }
        self.communicator.barrier();
        cp.save(dir)?;
        info!(dir = %dir.display(), step = self.step, time = self.sim_time, "column checkpoint written");
        Ok(())
    }

    /// Restore state written by [`write_checkpoint`](Self::write_checkpoint)
    /// into a column built with the same configuration.
    pub fn read_checkpoint(&mut self, dir: &Path) -> Result<()> {
        self.ensure_phase(Phase::Allocated, "read a checkpoint")?;
        let cp = Checkpointer::load(dir)?;
        let clock: Clock = cp.read_entry(&self.clock_entry())?;
        self.sim_time = clock.sim_time;
        self.step = clock.step;
        if let Some(ts) = self.timescale.as_mut() {
            let entry = format!("{}_timescaleinfo", ts.controller.name());
            let info: TimeScaleInfo = cp.read_entry(&entry)?;
            ts.controller.restore(info)?;
            self.timesteps = ts.controller.info().time_scale.clone();
        }
        for conn in &mut self.connections {
            if conn.spec.kind.owns_weights() {
                let name = format!("{}_W", conn.name());
                let entry: WeightsEntry = cp.read_entry(&name)?;
                let weights = self.arena.get_mut(conn.weights_handle()?)?;
                check_len(&name, weights.num_arbors(), entry.arbors.len())?;
                for (a, values) in entry.arbors.iter().enumerate() {
                    weights.set_arbor_values(a, values)?;
                }
                weights.set_timestamp(entry.timestamp);
            }
            if conn.strategy.records_winners() {
                let name = format!("{}_postIndex", conn.name());
                let winners: Vec<i64> = cp.read_entry(&name)?;
                check_len(&name, conn.post_index.len(), winners.len())?;
                conn.post_index = winners;
            }
        }
        for updater in &mut self.updaters {
            if let Updater::Copy { updater, .. } = updater {
                updater.read_checkpoint(&cp)?;
            }
        }
        for layer in &mut self.layers {
            let name = format!("{}_A", layer.name());
            let activity: Vec<f32> = cp.read_entry(&name)?;
            check_len(&name, layer.activity().len(), activity.len())?;
            layer.activity_mut().copy_from_slice(&activity);
            let state: PublisherState = cp.read_entry(&format!("{}_Delays", layer.name()))?;
            layer.restore_publisher_state(&state)?;
        }
        let refreshed = self.arena.refresh_all();
        info!(dir = %dir.display(), step = self.step, refreshed, "column checkpoint restored");
        Ok(())
    }
}
