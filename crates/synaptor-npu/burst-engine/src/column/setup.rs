// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Communicate and allocate phases.

use std::fs::File;
use std::io::BufWriter;
use std::sync::Arc;

use synaptor_npu_neural::{AccumulateType, InitStatus, LayerLoc, NpuError, PatchGeometry, Result, ScaleRelation, Weights};
use tracing::{debug, error, info, warn};

use super::{Column, Phase, Updater};
use crate::backend::{select_backend, BackendType};
use crate::connection::ConnectionKind;
use crate::delivery::pooling::pooling_weight;
use crate::delivery::{dt_factor, DeliveryStrategy, Perspective, ScratchBuffers};
use crate::init_scheduler;
use crate::weight_arena::WeightHandle;

/// Geometry and weights of one connection once allocated.
struct Allocation {
    geometry: Arc<PatchGeometry>,
    weights: Option<WeightHandle>,
}

fn check_locs(component: &str, geometry: &PatchGeometry, pre: &LayerLoc, post: &LayerLoc) -> Result<()> {
    if geometry.pre_loc() != pre || geometry.post_loc() != post {
        return Err(NpuError::dimension_mismatch(
            component,
            "layer geometry differs from the geometry of the original connection",
        ));
    }
    Ok(())
}

impl Column {
    fn resolve_layer(&self, component: &str, layer: &str) -> Result<usize> {
        self.layer_index
            .get(layer)
            .copied()
            .ok_or_else(|| NpuError::MissingDependency {
                component: component.to_string(),
                dependency: layer.to_string(),
            })
    }

    /// Resolve names and negotiate layer shapes.
    ///
    /// Components run in rounds; one that needs an uncommunicated original
    /// postpones. A round in which every pending component postpones is a
    /// dependency cycle.
    pub fn communicate_init_info(&mut self) -> Result<()> {
        self.ensure_phase(Phase::Building, "communicate")?;
        let decision = select_backend(self.settings.backend, self.accelerator.is_some())?;
        info!(backend = %decision.backend_type, reason = %decision.reason, "delivery backend selected");
        self.decision = Some(decision);

        if let Some(ts) = &self.timescale {
            let layer = self.resolve_layer(ts.controller.name(), &ts.layer_name)?;
            if let Some(ts) = self.timescale.as_mut() {
                ts.layer = layer;
            }
        }

        let n = self.connections.len();
        let names: Vec<String> = self
            .connections
            .iter()
            .map(|c| c.spec.name.clone())
            .chain(self.updaters.iter().map(Updater::name))
            .collect();
        let order = init_scheduler::run_to_completion(&names, |i| {
            if i < n {
                InitStatus::from(self.communicate_connection(i))
            } else {
                self.communicate_updater(i - n)
            }
        })
        .inspect_err(|err| error!(error = %err, "communicate phase failed"))?;
        self.init_order = order.into_iter().filter(|&i| i < n).collect();
        self.phase = Phase::Communicated;
        info!(
            layers = self.layers.len(),
            connections = n,
            updaters = self.updaters.len(),
            "communicate phase complete"
        );
        Ok(())
    }

    fn communicate_connection(&mut self, c: usize) -> Result<InitStatus> {
        let spec = self.connections[c].spec.clone();
        let name = spec.name.as_str();
        let pre = self.resolve_layer(name, &spec.pre)?;
        let post = self.resolve_layer(name, &spec.post)?;
        let (pre_loc, post_loc) = (*self.layers[pre].loc(), *self.layers[post].loc());
        let x_relation = ScaleRelation::from_scales(self.layers[pre].x_scale(), self.layers[post].x_scale());
        let y_relation = ScaleRelation::from_scales(self.layers[pre].y_scale(), self.layers[post].y_scale());

        let mut original = None;
        let (nxp, nyp, delays, accumulate, plastic) = match spec.original.as_deref() {
            Some(orig_name) if spec.kind.needs_original() => {
                let o = self
                    .connection_index
                    .get(orig_name)
                    .copied()
                    .ok_or_else(|| NpuError::MissingDependency {
                        component: name.to_string(),
                        dependency: orig_name.to_string(),
                    })?;
                if o == c {
                    return Err(NpuError::configuration(name, "a connection cannot be its own original"));
                }
                let orig = &self.connections[o];
                if !orig.communicated {
                    debug!(connection = name, original = orig_name, "original not communicated yet, postponing");
                    return Ok(InitStatus::Postponed);
                }
                let compatible = match spec.kind {
                    ConnectionKind::TransposePooling => orig.spec.kind == ConnectionKind::Pooling,
                    _ => orig.spec.kind.has_weights(),
                };
                if !compatible {
                    return Err(NpuError::configuration(
                        name,
                        format!("{} connection cannot use {} connection \"{}\" as original", spec.kind, orig.spec.kind, orig_name),
                    ));
                }
                let transposing = matches!(spec.kind, ConnectionKind::Transpose | ConnectionKind::TransposePooling);
                let (want_x, want_y, nxp, nyp) = if transposing {
                    (
                        orig.x_relation.transposed(),
                        orig.y_relation.transposed(),
                        orig.x_relation.dependent_patch_size(orig.nxp),
                        orig.y_relation.dependent_patch_size(orig.nyp),
                    )
                } else {
                    (orig.x_relation, orig.y_relation, orig.nxp, orig.nyp)
                };
                if (x_relation, y_relation) != (want_x, want_y) {
                    return Err(NpuError::dimension_mismatch(
                        name,
                        format!("layer scales are inconsistent with original \"{orig_name}\""),
                    ));
                }
                let (same_pre, same_post) = if transposing {
                    (self.layers[orig.post].loc(), self.layers[orig.pre].loc())
                } else {
                    (self.layers[orig.pre].loc(), self.layers[orig.post].loc())
                };
                if !pre_loc.same_extent(same_pre) || !post_loc.same_extent(same_post) {
                    return Err(NpuError::dimension_mismatch(
                        name,
                        format!("layer sizes are inconsistent with original \"{orig_name}\""),
                    ));
                }
                let delays = spec.delays.clone().unwrap_or_else(|| orig.delays.clone());
                if delays.len() != orig.delays.len() {
                    return Err(NpuError::dimension_mismatch(
                        name,
                        format!("{} arbors but original \"{}\" has {}", delays.len(), orig_name, orig.delays.len()),
                    ));
                }
                let accumulate = if spec.kind == ConnectionKind::TransposePooling {
                    orig.accumulate
                } else {
                    AccumulateType::Convolve
                };
                original = Some(o);
                (nxp, nyp, delays, accumulate, false)
            }
            _ => {
                x_relation.check_patch_size(spec.nxp, "x", name)?;
                y_relation.check_patch_size(spec.nyp, "y", name)?;
                if spec.kind == ConnectionKind::Hyper && spec.accumulate != AccumulateType::Convolve {
                    return Err(NpuError::configuration(
                        name,
                        format!("weighted connections convolve, got accumulate type {}", spec.accumulate),
                    ));
                }
                let delays = spec.delays.clone().unwrap_or_else(|| vec![0]);
                (spec.nxp, spec.nyp, delays, spec.accumulate, spec.plasticity)
            }
        };
        if delays.is_empty() {
            return Err(NpuError::configuration(name, "at least one delay is required"));
        }

        let nfp = spec.nfp.unwrap_or(post_loc.nf);
        if nfp != post_loc.nf {
            return Err(NpuError::dimension_mismatch(
                name,
                format!("nfp {} must equal the postsynaptic feature count {}", nfp, post_loc.nf),
            ));
        }
        let pooling = matches!(spec.kind, ConnectionKind::Pooling | ConnectionKind::TransposePooling);
        if pooling && pre_loc.nf != post_loc.nf {
            return Err(NpuError::dimension_mismatch(
                name,
                format!("pooling needs equal feature counts, got {} and {}", pre_loc.nf, post_loc.nf),
            ));
        }

        let strategy = match spec.kind {
            ConnectionKind::Pooling => DeliveryStrategy::for_pooling(name, accumulate, spec.post_perspective)?,
            ConnectionKind::TransposePooling => {
                DeliveryStrategy::for_transpose_pooling(name, accumulate, spec.post_perspective)?
            }
            _ => {
                let gpu = self.decision.as_ref().map(|d| d.backend_type) == Some(BackendType::Gpu);
                if spec.receive_gpu && !gpu {
                    warn!(connection = name, "accelerated delivery requested on a CPU column, delivering on the CPU");
                }
                DeliveryStrategy::for_weights(spec.post_perspective, spec.receive_gpu && gpu)
            }
        };

        let max_delay = delays.iter().copied().max().unwrap_or(0);
        let pre_layer = &mut self.layers[pre];
        pre_layer.require_margin(x_relation.required_margin(nxp), y_relation.required_margin(nyp))?;
        pre_layer.require_delay(max_delay)?;
        let spiking = pre_layer.is_spiking();
        self.layers[post].require_channel(spec.channel)?;

        let conn = &mut self.connections[c];
        conn.pre = pre;
        conn.post = post;
        conn.original = original;
        conn.nxp = nxp;
        conn.nyp = nyp;
        conn.nfp = nfp;
        conn.x_relation = x_relation;
        conn.y_relation = y_relation;
        conn.delays = delays;
        conn.accumulate = accumulate;
        conn.plastic = plastic;
        conn.strategy = strategy;
        conn.dt_factor = dt_factor(spec.convert_rate_to_spike_count, spiking, self.settings.dt);
        conn.communicated = true;
        debug!(connection = name, nxp, nyp, ?strategy, "connection communicated");
        Ok(InitStatus::Done)
    }

    fn communicate_updater(&mut self, u: usize) -> InitStatus {
        match &mut self.updaters[u] {
            Updater::Hebbian { connection, .. } => {
                if self.connections[*connection].communicated {
                    InitStatus::Done
                } else {
                    InitStatus::Postponed
                }
            }
            Updater::Copy { connection, updater } => {
                let conn = &self.connections[*connection];
                let Some(orig) = conn.original.map(|o| &self.connections[o]) else {
                    return InitStatus::Postponed;
                };
                let status = updater.communicate(conn.communicated && orig.communicated, orig.plastic);
                if status == InitStatus::Done {
                    let plastic = updater.plasticity();
                    self.connections[*connection].plastic = plastic;
                }
                status
            }
        }
    }

    /// Pairs of layers whose halos must agree because one connection reuses
    /// another's geometry.
    fn margin_links(&self) -> Vec<(usize, usize)> {
        let mut links = Vec::new();
        for conn in &self.connections {
            let Some(orig) = conn.original.map(|o| &self.connections[o]) else {
                continue;
            };
            match conn.spec.kind {
                ConnectionKind::Clone | ConnectionKind::Copy => {
                    links.push((conn.pre, orig.pre));
                    links.push((conn.post, orig.post));
                }
                ConnectionKind::Transpose | ConnectionKind::TransposePooling => {
                    links.push((conn.pre, orig.post));
                    links.push((conn.post, orig.pre));
                }
                _ => {}
            }
        }
        links.retain(|(a, b)| a != b);
        links
    }

    fn synchronize_margins(&mut self) -> Result<()> {
        let links = self.margin_links();
        loop {
            let mut changed = false;
            for &(a, b) in &links {
                let (ha, hb) = (self.layers[a].loc().halo, self.layers[b].loc().halo);
                let x = ha.lt.max(ha.rt).max(hb.lt).max(hb.rt);
                let y = ha.dn.max(ha.up).max(hb.dn).max(hb.up);
                for l in [a, b] {
                    let before = self.layers[l].loc().halo;
                    if self.layers[l].require_margin(x, y)? != before {
                        changed = true;
                    }
                }
            }
            if !changed {
                return Ok(());
            }
        }
    }

    /// Freeze layer shapes and build every geometry and weight set.
    pub fn allocate(&mut self) -> Result<()> {
        self.ensure_phase(Phase::Communicated, "allocate")?;
        self.synchronize_margins()?;
        for layer in &mut self.layers {
            layer.allocate()?;
        }
        for (spec, layer) in self.layer_specs.iter().zip(self.layers.iter_mut()) {
            if spec.initial_value != 0.0 {
                let values = vec![spec.initial_value; layer.loc().num_restricted()];
                for b in 0..layer.loc().nbatch {
                    layer.set_restricted_activity(b, &values)?;
                }
            }
        }
        let order = self.init_order.clone();
        for c in order {
            self.allocate_connection(c)?;
        }
        for layer in &mut self.layers {
            layer.publish(self.settings.start_time)?;
        }
        if let Some(path) = &self.settings.timestep_info_file {
            let file = File::create(path)
                .map_err(|e| NpuError::Runtime(format!("{}: {}", path.display(), e)))?;
            self.timestep_info = Some(BufWriter::new(file));
        }
        self.sim_time = self.settings.start_time;
        self.phase = Phase::Allocated;
        info!(weight_sets = self.arena.len(), "allocate phase complete");
        Ok(())
    }

    fn allocate_connection(&mut self, c: usize) -> Result<()> {
        let conn = &self.connections[c];
        let spec = conn.spec.clone();
        let name = spec.name.as_str();
        let pre_loc = *self.layers[conn.pre].loc();
        let post_loc = *self.layers[conn.post].loc();
        let (nxp, nyp, nfp, xr, yr, arbors) = (conn.nxp, conn.nyp, conn.nfp, conn.x_relation, conn.y_relation, conn.delays.len());
        let (orig_weights, orig_geometry) = match conn.original {
            Some(o) => (self.connections[o].pre_weights, self.connections[o].geometry.clone()),
            None => (None, None),
        };
        let missing = || NpuError::MissingDependency {
            component: name.to_string(),
            dependency: spec.original.clone().unwrap_or_default(),
        };

        let allocation = match spec.kind {
            ConnectionKind::Hyper => {
                let geometry = Arc::new(PatchGeometry::new(name, pre_loc, post_loc, nxp, nyp, nfp, xr, yr)?);
                let mut weights = Weights::new(name, geometry.clone(), arbors, spec.shared_weights)?;
                spec.weight_init.apply(&mut weights);
                weights.set_timestamp(self.settings.start_time);
                Allocation {
                    geometry,
                    weights: Some(self.arena.insert(weights)),
                }
            }
            ConnectionKind::Copy => {
                let source = orig_weights.ok_or_else(missing)?;
                self.arena.refresh(source)?;
                let original = self.arena.get(source)?;
                let geometry = Arc::new(PatchGeometry::new(name, pre_loc, post_loc, nxp, nyp, nfp, xr, yr)?);
                let mut weights = Weights::new(name, geometry.clone(), arbors, original.shared())?;
                weights.copy_values_from(original)?;
                weights.set_timestamp(original.timestamp());
                Allocation {
                    geometry,
                    weights: Some(self.arena.insert(weights)),
                }
            }
            ConnectionKind::Clone => {
                let source = orig_weights.ok_or_else(missing)?;
                let geometry = self.arena.get(source)?.geometry().clone();
                check_locs(name, &geometry, &pre_loc, &post_loc)?;
                Allocation {
                    geometry,
                    weights: Some(source),
                }
            }
            ConnectionKind::Transpose => {
                let source = orig_weights.ok_or_else(missing)?;
                let handle = self.arena.derive_transposed(source, name)?;
                let geometry = self.arena.get(handle)?.geometry().clone();
                check_locs(name, &geometry, &pre_loc, &post_loc)?;
                Allocation {
                    geometry,
                    weights: Some(handle),
                }
            }
            ConnectionKind::Pooling => Allocation {
                geometry: Arc::new(PatchGeometry::new(name, pre_loc, post_loc, nxp, nyp, nfp, xr, yr)?),
                weights: None,
            },
            ConnectionKind::TransposePooling => {
                let forward = orig_geometry.ok_or_else(missing)?;
                let geometry = Arc::new(forward.transposed(name)?);
                check_locs(name, &geometry, &pre_loc, &post_loc)?;
                Allocation {
                    geometry,
                    weights: None,
                }
            }
        };

        let post_name = format!("{name}_post");
        let post_weights = match (spec.post_perspective, allocation.weights) {
            (true, Some(handle)) => Some(self.arena.derive_transposed(handle, &post_name)?),
            _ => None,
        };
        let post_geometry = match self.connections[c].strategy {
            DeliveryStrategy::Pooling {
                perspective: Perspective::Postsynaptic,
                ..
            } => Some(Arc::new(allocation.geometry.transposed(&post_name)?)),
            _ => None,
        };
        let nbatch = self.settings.nbatch;
        let partitions = self.backend.partitions();
        let conn = &mut self.connections[c];
        conn.pool_weight = pooling_weight(conn.accumulate, &allocation.geometry);
        conn.scratch = conn.strategy.uses_scratch().then(|| {
            let forward_max = matches!(conn.strategy, DeliveryStrategy::Pooling { accumulate: AccumulateType::MaxPooling, .. });
            let fill = if forward_max { f32::NEG_INFINITY } else { 0.0 };
            ScratchBuffers::new(partitions, post_loc.num_restricted(), fill, forward_max)
        });
        if conn.strategy.records_winners() {
            conn.post_index = vec![-1; post_loc.num_restricted() * nbatch];
        }
        conn.geometry = Some(allocation.geometry);
        conn.post_geometry = post_geometry;
        conn.pre_weights = allocation.weights;
        conn.post_weights = post_weights;
        debug!(connection = name, kind = %spec.kind, "connection allocated");
        Ok(())
    }
}
