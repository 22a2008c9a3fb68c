// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Column
//!
//! Owns the layers, connections, weight arena, delivery backend and
//! optional timestep controller of one simulated column.
//!
//! ## Lifecycle
//! 1. Describe: [`Column::add_layer`], [`Column::add_connection`], [`Column::set_timescale`]
//! 2. [`Column::communicate_init_info`]: resolve names, negotiate margins, delays
//!    and channels. Components whose dependencies are not ready postpone.
//! 3. [`Column::allocate`]: freeze layer shapes, build geometries and weights
//! 4. [`Column::advance_time`] per step, or [`Column::run`] until `stop_time`
//!
//! Each step clears the channels, delivers every connection, updates layer
//! activity, publishes it, applies weight updates and finally feeds the
//! timestep controller.

mod checkpoint;
mod deliver;
mod layer_spec;
mod settings;
mod setup;

pub use layer_spec::{LayerSpec, LayerUpdate};
pub use settings::{timescale_from_config, ColumnSettings};

use std::fs::File;
use std::io::BufWriter;
use std::sync::Arc;

use ahash::AHashMap;
use synaptor_npu_neural::{
    AccumulateType, AdaptiveTimeScaleController, LayerLoc, NpuError, PatchGeometry, Result,
    ScaleRelation, TimeScaleInfo, TimeScaleKind, TimeScaleParams, Weights,
};
use synaptor_npu_plasticity::{CopyUpdater, HebbianUpdater};
use synaptor_npu_runtime::{ChannelId, Communicator, LayerBuffer, LocalCommunicator};
use tracing::{debug, info};

use crate::backend::{AcceleratedDelivery, BackendDecision, CpuBackend};
use crate::connection::{ConnectionKind, ConnectionSpec};
use crate::delivery::{DeliveryStats, DeliveryStrategy, ScratchBuffers};
use crate::weight_arena::{WeightArena, WeightHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Building,
    Communicated,
    Allocated,
}

/// Per-connection state negotiated during setup.
pub(crate) struct Connection {
    pub(crate) spec: ConnectionSpec,
    pub(crate) communicated: bool,
    pub(crate) pre: usize,
    pub(crate) post: usize,
    pub(crate) original: Option<usize>,
    pub(crate) nxp: usize,
    pub(crate) nyp: usize,
    pub(crate) nfp: usize,
    pub(crate) x_relation: ScaleRelation,
    pub(crate) y_relation: ScaleRelation,
    pub(crate) delays: Vec<usize>,
    pub(crate) accumulate: AccumulateType,
    pub(crate) plastic: bool,
    pub(crate) strategy: DeliveryStrategy,
    pub(crate) dt_factor: f32,
    pub(crate) geometry: Option<Arc<PatchGeometry>>,
    /// Transposed pooling geometry for postsynaptic-perspective pooling
    pub(crate) post_geometry: Option<Arc<PatchGeometry>>,
    pub(crate) pre_weights: Option<WeightHandle>,
    /// Derived transpose used by postsynaptic-perspective convolution
    pub(crate) post_weights: Option<WeightHandle>,
    pub(crate) pool_weight: f32,
    pub(crate) scratch: Option<ScratchBuffers>,
    /// Forward max-pooling winners, global extended presynaptic index or -1
    pub(crate) post_index: Vec<i64>,
    pub(crate) last_stats: DeliveryStats,
}

impl Connection {
    fn new(spec: ConnectionSpec) -> Self {
        Self {
            spec,
            communicated: false,
            pre: 0,
            post: 0,
            original: None,
            nxp: 0,
            nyp: 0,
            nfp: 0,
            x_relation: ScaleRelation::OneToOne,
            y_relation: ScaleRelation::OneToOne,
            delays: Vec::new(),
            accumulate: AccumulateType::Convolve,
            plastic: false,
            strategy: DeliveryStrategy::PresynapticConvolve,
            dt_factor: 1.0,
            geometry: None,
            post_geometry: None,
            pre_weights: None,
            post_weights: None,
            pool_weight: 1.0,
            scratch: None,
            post_index: Vec::new(),
            last_stats: DeliveryStats::default(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.spec.name
    }

    pub(crate) fn weights_handle(&self) -> Result<WeightHandle> {
        self.pre_weights.ok_or_else(|| NpuError::Unsupported {
            component: self.spec.name.clone(),
            message: format!("{} connections carry no weights", self.spec.kind),
        })
    }
}

/// Weight updater attached to one connection.
pub(crate) enum Updater {
    Copy { connection: usize, updater: CopyUpdater },
    Hebbian { connection: usize, updater: HebbianUpdater },
}

impl Updater {
    fn name(&self) -> String {
        match self {
            Updater::Copy { updater, .. } => format!("{}:copy_updater", updater.name()),
            Updater::Hebbian { updater, .. } => format!("{}:hebbian_updater", updater.name()),
        }
    }
}

pub(crate) struct TimeScaleDriver {
    pub(crate) controller: AdaptiveTimeScaleController,
    pub(crate) layer_name: String,
    pub(crate) layer: usize,
}

pub struct Column {
    settings: ColumnSettings,
    phase: Phase,
    layer_specs: Vec<LayerSpec>,
    layers: Vec<LayerBuffer>,
    layer_index: AHashMap<String, usize>,
    connections: Vec<Connection>,
    connection_index: AHashMap<String, usize>,
    updaters: Vec<Updater>,
    /// Connection indices in the order they finished communicating
    init_order: Vec<usize>,
    arena: WeightArena,
    backend: CpuBackend,
    decision: Option<BackendDecision>,
    accelerator: Option<Arc<dyn AcceleratedDelivery>>,
    communicator: Arc<dyn Communicator>,
    timescale: Option<TimeScaleDriver>,
    timesteps: Vec<f64>,
    timestep_info: Option<BufWriter<File>>,
    sim_time: f64,
    step: u64,
}

impl Column {
    pub fn new(settings: ColumnSettings) -> Result<Self> {
        if settings.nbatch == 0 || settings.nx == 0 || settings.ny == 0 {
            return Err(NpuError::configuration(
                &settings.name,
                "nx, ny and nbatch must be at least 1",
            ));
        }
        if !(settings.dt > 0.0) {
            return Err(NpuError::configuration(&settings.name, "dt must be positive"));
        }
        let backend = CpuBackend::new(settings.num_threads, settings.partitions)?;
        info!(
            column = %settings.name,
            nx = settings.nx,
            ny = settings.ny,
            nbatch = settings.nbatch,
            threads = backend.num_threads(),
            partitions = backend.partitions(),
            "column created"
        );
        Ok(Self {
            timesteps: vec![settings.dt; settings.nbatch],
            sim_time: settings.start_time,
            settings,
            phase: Phase::Building,
            layer_specs: Vec::new(),
            layers: Vec::new(),
            layer_index: AHashMap::new(),
            connections: Vec::new(),
            connection_index: AHashMap::new(),
            updaters: Vec::new(),
            init_order: Vec::new(),
            arena: WeightArena::new(),
            backend,
            decision: None,
            accelerator: None,
            communicator: Arc::new(LocalCommunicator::new()),
            timescale: None,
            timestep_info: None,
            step: 0,
        })
    }

    /// Replace the single-process communicator.
    pub fn with_communicator(mut self, communicator: Arc<dyn Communicator>) -> Self {
        self.communicator = communicator;
        self
    }

    fn ensure_phase(&self, phase: Phase, action: &str) -> Result<()> {
        if self.phase != phase {
            return Err(NpuError::Runtime(format!(
                "{}: cannot {} in phase {:?}",
                self.settings.name, action, self.phase
            )));
        }
        Ok(())
    }

    /// Attach an accelerated delivery implementation. Must happen before
    /// [`communicate_init_info`](Self::communicate_init_info).
    pub fn attach_accelerator(&mut self, accelerator: Arc<dyn AcceleratedDelivery>) -> Result<()> {
        self.ensure_phase(Phase::Building, "attach an accelerator")?;
        info!(backend = accelerator.backend_name(), "accelerator attached");
        self.accelerator = Some(accelerator);
        Ok(())
    }

    pub fn add_layer(&mut self, spec: LayerSpec) -> Result<()> {
        self.ensure_phase(Phase::Building, "add a layer")?;
        if self.layer_index.contains_key(&spec.name) {
            return Err(NpuError::configuration(&spec.name, "duplicate layer name"));
        }
        let (nx, ny) = spec.extent(self.settings.nx, self.settings.ny)?;
        let loc = LayerLoc::new(nx, ny, spec.nf, self.settings.nbatch);
        let mut buffer = LayerBuffer::new(&spec.name, loc, spec.x_scale, spec.y_scale)
            .with_sparse(spec.sparse)
            .with_spiking(spec.spiking);
        if spec.update == LayerUpdate::Linear {
            buffer.require_channel(ChannelId::Inhibitory)?;
        }
        debug!(layer = %spec.name, nx, ny, nf = spec.nf, "layer added");
        self.layer_index.insert(spec.name.clone(), self.layers.len());
        self.layers.push(buffer);
        self.layer_specs.push(spec);
        Ok(())
    }

    pub fn add_connection(&mut self, spec: ConnectionSpec) -> Result<()> {
        self.ensure_phase(Phase::Building, "add a connection")?;
        if self.connection_index.contains_key(&spec.name) {
            return Err(NpuError::configuration(&spec.name, "duplicate connection name"));
        }
        if spec.kind.needs_original() && spec.original.is_none() {
            return Err(NpuError::configuration(
                &spec.name,
                format!("{} connections need an original connection", spec.kind),
            ));
        }
        let index = self.connections.len();
        match spec.kind {
            ConnectionKind::Copy => {
                let original = spec.original.as_deref().unwrap_or_default();
                self.updaters.push(Updater::Copy {
                    connection: index,
                    updater: CopyUpdater::new(&spec.name, original),
                });
            }
            ConnectionKind::Hyper if spec.plasticity => {
                self.updaters.push(Updater::Hebbian {
                    connection: index,
                    updater: HebbianUpdater::new(&spec.name, spec.hebbian_rate),
                });
            }
            _ => {}
        }
        debug!(connection = %spec.name, kind = %spec.kind, pre = %spec.pre, post = %spec.post, "connection added");
        self.connection_index.insert(spec.name.clone(), index);
        self.connections.push(Connection::new(spec));
        Ok(())
    }

    /// Drive the timestep from the energy of `energy_layer`'s activity.
    pub fn set_timescale(&mut self, params: TimeScaleParams, kind: TimeScaleKind, energy_layer: &str) -> Result<()> {
        self.ensure_phase(Phase::Building, "set the timescale controller")?;
        let name = format!("{}_timescale", self.settings.name);
        let controller = AdaptiveTimeScaleController::new(&name, self.settings.nbatch, params, kind)?;
        self.timesteps = controller.info().time_scale.clone();
        self.timescale = Some(TimeScaleDriver {
            controller,
            layer_name: energy_layer.to_string(),
            layer: 0,
        });
        Ok(())
    }

    /// Communicate and allocate in one call.
    pub fn initialize(&mut self) -> Result<()> {
        self.communicate_init_info()?;
        self.allocate()
    }

    pub fn settings(&self) -> &ColumnSettings {
        &self.settings
    }

    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    /// Current timestep per batch element; `dt` unless a controller runs.
    pub fn timesteps(&self) -> &[f64] {
        &self.timesteps
    }

    pub fn timescale_info(&self) -> Option<&TimeScaleInfo> {
        self.timescale.as_ref().map(|ts| ts.controller.info())
    }

    pub fn backend_decision(&self) -> Option<&BackendDecision> {
        self.decision.as_ref()
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn num_connections(&self) -> usize {
        self.connections.len()
    }

    /// Connection names in the order they finished communicating.
    pub fn init_order(&self) -> Vec<&str> {
        self.init_order
            .iter()
            .map(|&c| self.connections[c].name())
            .collect()
    }

    fn layer_slot(&self, name: &str) -> Result<usize> {
        self.layer_index.get(name).copied().ok_or_else(|| NpuError::OutOfBounds {
            index: 0,
            size: self.layers.len(),
            context: format!("no layer named \"{name}\""),
        })
    }

    fn connection_slot(&self, name: &str) -> Result<usize> {
        self.connection_index.get(name).copied().ok_or_else(|| NpuError::OutOfBounds {
            index: 0,
            size: self.connections.len(),
            context: format!("no connection named \"{name}\""),
        })
    }

    pub fn layer(&self, name: &str) -> Result<&LayerBuffer> {
        Ok(&self.layers[self.layer_slot(name)?])
    }

    pub fn layer_activity(&self, name: &str) -> Result<&[f32]> {
        Ok(self.layer(name)?.activity())
    }

    /// Set the interior activity of one batch element of a layer.
    pub fn set_layer_activity(&mut self, name: &str, batch: usize, values: &[f32]) -> Result<()> {
        let slot = self.layer_slot(name)?;
        self.layers[slot].set_restricted_activity(batch, values)?;
        Ok(())
    }

    /// Republish every layer's current activity as the newest level.
    ///
    /// Used after setting input activity by hand so delay 0 sees it.
    pub fn republish(&mut self) -> Result<()> {
        for layer in &mut self.layers {
            layer.publish(self.sim_time)?;
        }
        Ok(())
    }

    pub fn channel(&self, layer: &str, channel: ChannelId) -> Result<&[f32]> {
        Ok(self.layer(layer)?.channel(channel)?)
    }

    /// Presynaptic-perspective weights of a connection, refreshed if derived.
    pub fn weights(&mut self, connection: &str) -> Result<&Weights> {
        let handle = self.connections[self.connection_slot(connection)?].weights_handle()?;
        self.arena.refresh(handle)?;
        self.arena.get(handle)
    }

    /// Transposed weights used by postsynaptic-perspective delivery.
    pub fn post_weights(&mut self, connection: &str) -> Result<&Weights> {
        let conn = &self.connections[self.connection_slot(connection)?];
        let handle = conn.post_weights.ok_or_else(|| NpuError::Unsupported {
            component: conn.spec.name.clone(),
            message: "connection does not deliver from the postsynaptic perspective".to_string(),
        })?;
        self.arena.refresh(handle)?;
        self.arena.get(handle)
    }

    /// Mutable weights. Fails for connections whose weights are derived.
    pub fn weights_mut(&mut self, connection: &str) -> Result<&mut Weights> {
        let handle = self.connections[self.connection_slot(connection)?].weights_handle()?;
        self.arena.get_mut(handle)
    }

    /// Forward max-pooling winners of the last delivery.
    pub fn post_index(&self, connection: &str) -> Result<&[i64]> {
        Ok(&self.connections[self.connection_slot(connection)?].post_index)
    }

    pub fn delivery_stats(&self, connection: &str) -> Result<&DeliveryStats> {
        Ok(&self.connections[self.connection_slot(connection)?].last_stats)
    }

    pub fn delivery_strategy(&self, connection: &str) -> Result<DeliveryStrategy> {
        Ok(self.connections[self.connection_slot(connection)?].strategy)
    }

    pub fn copy_updater(&self, connection: &str) -> Option<&CopyUpdater> {
        self.updaters.iter().find_map(|u| match u {
            Updater::Copy { updater, .. } if updater.name() == connection => Some(updater),
            _ => None,
        })
    }

    fn update_layers(&mut self) -> Result<()> {
        for (spec, layer) in self.layer_specs.iter().zip(self.layers.iter_mut()) {
            if spec.update != LayerUpdate::Linear {
                continue;
            }
            let loc = *layer.loc();
            let n_res = loc.num_restricted();
            let mut v = vec![0.0f32; n_res * loc.nbatch];
            for (channel, sign) in [
                (ChannelId::Excitatory, 1.0f32),
                (ChannelId::Inhibitory, -1.0),
                (ChannelId::InhibitoryB, -1.0),
            ] {
                if let Ok(buf) = layer.channel(channel) {
                    for (vi, g) in v.iter_mut().zip(buf) {
                        *vi += sign * g;
                    }
                }
            }
            for (b, values) in v.chunks(n_res).enumerate() {
                layer.set_restricted_activity(b, values)?;
            }
        }
        Ok(())
    }

    fn update_weights(&mut self) -> Result<()> {
        for updater in &mut self.updaters {
            match updater {
                Updater::Hebbian { connection, updater } => {
                    let conn = &self.connections[*connection];
                    let pre = &self.layers[conn.pre];
                    let cubes = conn
                        .delays
                        .iter()
                        .map(|&d| pre.create_cube(d))
                        .collect::<core::result::Result<Vec<_>, _>>()?;
                    let post = self.layers[conn.post].activity();
                    let weights = self.arena.get_mut(conn.weights_handle()?)?;
                    updater.update_state(self.sim_time, &cubes, post, weights)?;
                }
                Updater::Copy { connection, updater } => {
                    let conn = &self.connections[*connection];
                    let original = conn
                        .original
                        .map(|o| &self.connections[o])
                        .ok_or_else(|| NpuError::MissingDependency {
                            component: conn.spec.name.clone(),
                            dependency: updater.original().to_string(),
                        })?;
                    let source = original.weights_handle()?;
                    self.arena.refresh(source)?;
                    let (src, dst) = self.arena.source_and_target(source, conn.weights_handle()?)?;
                    updater.update_state(self.sim_time, src, dst)?;
                }
            }
        }
        Ok(())
    }

    fn update_timescale(&mut self) -> Result<()> {
        let Some(ts) = self.timescale.as_mut() else {
            return Ok(());
        };
        let layer = &self.layers[ts.layer];
        let loc = *layer.loc();
        let n_ext = loc.num_extended();
        let energies: Vec<f64> = layer
            .activity()
            .chunks(n_ext)
            .map(|batch| {
                0.5 * (0..loc.num_restricted())
                    .map(|k| {
                        let a = batch[loc.extended_index(k)] as f64;
                        a * a
                    })
                    .sum::<f64>()
            })
            .collect();
        self.timesteps = ts.controller.calc_timesteps(&energies)?;
        if let Some(out) = self.timestep_info.as_mut() {
            ts.controller
                .write_timestep_info(self.sim_time, out)
                .map_err(|e| NpuError::Runtime(format!("timestep info: {e}")))?;
        }
        Ok(())
    }

    /// One simulation step.
    pub fn advance_time(&mut self) -> Result<()> {
        self.ensure_phase(Phase::Allocated, "advance time")?;
        for layer in &mut self.layers {
            layer.clear_channels();
        }
        self.deliver()?;
        self.update_layers()?;
        self.step += 1;
        self.sim_time = self.settings.start_time + self.step as f64 * self.settings.dt;
        for layer in &mut self.layers {
            layer.publish(self.sim_time)?;
        }
        self.update_weights()?;
        self.update_timescale()?;
        debug!(step = self.step, time = self.sim_time, "step complete");
        Ok(())
    }

    /// Advance until `stop_time`, then write a checkpoint if a directory is set.
    pub fn run(&mut self) -> Result<()> {
        let stop = self.settings.stop_time;
        while self.sim_time + 0.5 * self.settings.dt < stop {
            self.advance_time()?;
        }
        if let Some(dir) = self.settings.checkpoint_dir.clone() {
            self.write_checkpoint(&dir)?;
        }
        info!(steps = self.step, time = self.sim_time, "run finished");
        Ok(())
    }

    pub fn communicator(&self) -> &Arc<dyn Communicator> {
        &self.communicator
    }
}
