// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use std::time::Instant;

use synaptor_npu_neural::{NpuError, Result};
use synaptor_npu_runtime::ChannelId;
use tracing::trace;

use super::{Column, Connection, Phase};
use crate::backend::AcceleratedRequest;
use crate::delivery::{
    elapsed_us, pooling, postsynaptic, presynaptic, trace_enabled, transpose_pooling, DeliveryStats,
    DeliveryStrategy, Perspective, ScratchBuffers,
};

/// Tracing target of per-connection delivery logs.
pub const DELIVERY_TRACE_TARGET: &str = "synaptor-npu-trace";

fn missing_scratch(conn: &Connection) -> NpuError {
    NpuError::Runtime(format!("{}: scratch buffers not allocated", conn.name()))
}

fn missing_geometry(conn: &Connection) -> NpuError {
    NpuError::Runtime(format!("{}: geometry not allocated", conn.name()))
}

impl Column {
    /// Deliver every connection into its postsynaptic channel.
    ///
    /// Derived weights are refreshed first. Channels are not cleared here.
    pub fn deliver(&mut self) -> Result<()> {
        self.ensure_phase(Phase::Allocated, "deliver")?;
        let refreshed = self.arena.refresh_all();
        if refreshed > 0 {
            trace!(target: DELIVERY_TRACE_TARGET, refreshed, "derived weights rebuilt");
        }
        for c in 0..self.connections.len() {
            self.deliver_connection(c)?;
        }
        Ok(())
    }

    fn deliver_connection(&mut self, c: usize) -> Result<()> {
        let channel_id = self.connections[c].spec.channel;
        if channel_id == ChannelId::NoUpdate {
            return Ok(());
        }
        let post = self.connections[c].post;
        let mut channel = self.layers[post].take_channel(channel_id)?;
        let mut scratch = self.connections[c].scratch.take();
        let mut post_index = std::mem::take(&mut self.connections[c].post_index);

        let result = self.run_delivery(c, scratch.as_mut(), &mut post_index, &mut channel);

        let conn = &mut self.connections[c];
        conn.scratch = scratch;
        conn.post_index = post_index;
        self.layers[post].restore_channel(channel_id, channel)?;
        let stats = result?;
        if trace_enabled(conn.name()) {
            trace!(
                target: DELIVERY_TRACE_TARGET,
                connection = %conn.name(),
                strategy = ?conn.strategy,
                active = stats.active,
                partitions = stats.partitions_touched,
                accumulate_us = stats.accumulate_us,
                merge_us = stats.merge_us,
                "delivered"
            );
        }
        conn.last_stats = stats;
        Ok(())
    }

    fn run_delivery(
        &self,
        c: usize,
        mut scratch: Option<&mut ScratchBuffers>,
        post_index: &mut [i64],
        channel: &mut [f32],
    ) -> Result<DeliveryStats> {
        let conn = &self.connections[c];
        let pre = &self.layers[conn.pre];
        let geometry = || conn.geometry.as_deref().ok_or_else(|| missing_geometry(conn));
        if conn.strategy.records_winners() {
            post_index.fill(-1);
        }
        let mut stats = DeliveryStats::default();
        for (arbor, &delay) in conn.delays.iter().enumerate() {
            let cube = pre.create_cube(delay)?;
            let arbor_stats = match conn.strategy {
                DeliveryStrategy::PresynapticConvolve => {
                    let weights = self.arena.get(conn.weights_handle()?)?;
                    let scratch = scratch.as_deref_mut().ok_or_else(|| missing_scratch(conn))?;
                    presynaptic::deliver_convolve(&self.backend, scratch, &cube, weights, arbor, conn.dt_factor, channel)
                }
                DeliveryStrategy::PostsynapticConvolve => {
                    let handle = conn.post_weights.ok_or_else(|| missing_geometry(conn))?;
                    let weights = self.arena.get(handle)?;
                    postsynaptic::deliver_convolve(&self.backend, &cube, weights, arbor, conn.dt_factor, channel)
                }
                DeliveryStrategy::Pooling {
                    accumulate,
                    perspective: Perspective::Presynaptic,
                } => {
                    let scratch = scratch.as_deref_mut().ok_or_else(|| missing_scratch(conn))?;
                    pooling::deliver_presynaptic(&self.backend, scratch, &cube, geometry()?, accumulate, channel, post_index)
                }
                DeliveryStrategy::Pooling {
                    accumulate,
                    perspective: Perspective::Postsynaptic,
                } => {
                    let transposed = conn.post_geometry.as_deref().ok_or_else(|| missing_geometry(conn))?;
                    pooling::deliver_postsynaptic(
                        &self.backend,
                        &cube,
                        transposed,
                        accumulate,
                        conn.pool_weight,
                        channel,
                        post_index,
                    )
                }
                DeliveryStrategy::TransposePooling { accumulate } => {
                    let winners = conn
                        .original
                        .map(|o| self.connections[o].post_index.as_slice())
                        .unwrap_or_default();
                    let scratch = scratch.as_deref_mut().ok_or_else(|| missing_scratch(conn))?;
                    transpose_pooling::deliver(&self.backend, scratch, &cube, geometry()?, accumulate, winners, channel)
                }
                DeliveryStrategy::Accelerated => {
                    let accelerator = self.accelerator.as_ref().ok_or_else(|| {
                        NpuError::BackendUnavailable(format!("{}: no accelerator attached", conn.name()))
                    })?;
                    let start = Instant::now();
                    accelerator.deliver(AcceleratedRequest {
                        connection: conn.name(),
                        cube,
                        weights: self.arena.get(conn.weights_handle()?)?,
                        arbor,
                        dt_factor: conn.dt_factor,
                        channel: &mut *channel,
                    })?;
                    DeliveryStats {
                        active: (0..cube.loc.nbatch).map(|b| cube.num_active(b)).sum(),
                        accumulate_us: elapsed_us(start),
                        ..DeliveryStats::default()
                    }
                }
            };
            stats.absorb(&arbor_stats);
        }
        Ok(stats)
    }

    /// Total input each postsynaptic neuron would receive if every
    /// presynaptic neuron had activity 1, summed over arbors.
    ///
    /// Returns one restricted buffer covering every batch element.
    pub fn deliver_unit_input(&mut self, connection: &str) -> Result<Vec<f32>> {
        self.ensure_phase(Phase::Allocated, "deliver unit input")?;
        let c = self.connection_slot(connection)?;
        let handle = self.connections[c].weights_handle()?;
        self.arena.refresh(handle)?;
        let conn = &self.connections[c];
        let weights = self.arena.get(handle)?;
        let post_loc = *weights.geometry().post_loc();
        let mut out = vec![0.0; post_loc.num_restricted() * post_loc.nbatch];
        let mut scratch = ScratchBuffers::new(self.backend.partitions(), post_loc.num_restricted(), 0.0, false);
        let stats = presynaptic::deliver_unit_input(&self.backend, &mut scratch, weights, conn.dt_factor, &mut out);
        trace!(target: DELIVERY_TRACE_TARGET, connection, active = stats.active, "unit input delivered");
        Ok(out)
    }
}
