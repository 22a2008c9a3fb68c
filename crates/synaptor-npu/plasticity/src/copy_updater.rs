// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Lazy one-way synchronization of a copied weight store.

use synaptor_npu_neural::{InitStatus, NpuError, Result, Weights};
use synaptor_npu_runtime::Checkpointer;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CopyUpdater {
    name: String,
    original: String,
    plasticity: bool,
    last_update_time: f64,
    communicated: bool,
}

impl CopyUpdater {
    /// `name` is the copy connection, `original` the connection it copies.
    pub fn new(name: &str, original: &str) -> Self {
        Self {
            name: name.to_string(),
            original: original.to_string(),
            plasticity: false,
            last_update_time: 0.0,
            communicated: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    /// Inherited from the original's updater.
    pub fn plasticity(&self) -> bool {
        self.plasticity
    }

    pub fn last_update_time(&self) -> f64 {
        self.last_update_time
    }

    pub fn is_communicated(&self) -> bool {
        self.communicated
    }

    /// Wait for the original connection, then inherit its plasticity flag.
    pub fn communicate(&mut self, original_ready: bool, original_plastic: bool) -> InitStatus {
        if !original_ready {
            debug!(updater = %self.name, original = %self.original, "waiting for original connection");
            return InitStatus::Postponed;
        }
        self.plasticity = original_plastic;
        self.communicated = true;
        InitStatus::Done
    }

    /// Copy when the original is newer than the copy. Returns whether a copy happened.
    pub fn update_state(&mut self, sim_time: f64, original: &Weights, copy: &mut Weights) -> Result<bool> {
        if original.timestamp() <= copy.timestamp() {
            return Ok(false);
        }
        copy.copy_values_from(original)?;
        copy.set_timestamp(sim_time);
        self.last_update_time = sim_time;
        debug!(
            updater = %self.name,
            original = %self.original,
            sim_time,
            "copied updated weights"
        );
        Ok(true)
    }

    pub fn checkpoint_entry(&self) -> String {
        format!("{}_lastUpdateTime", self.name)
    }

    pub fn register_checkpoint(&self, checkpointer: &mut Checkpointer) -> Result<()> {
        checkpointer.register_entry(&self.checkpoint_entry(), &self.last_update_time, true, false)?;
        Ok(())
    }

    pub fn read_checkpoint(&mut self, checkpointer: &Checkpointer) -> Result<()> {
        self.last_update_time = checkpointer
            .read_entry(&self.checkpoint_entry())
            .map_err(NpuError::from)?;
        Ok(())
    }
}
