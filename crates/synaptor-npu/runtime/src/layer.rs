// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Layer state buffers.
//!
//! Shape is negotiated first (margins, delays, channels) and frozen by
//! [`LayerBuffer::allocate`]. Margins can only be raised.

use synaptor_npu_neural::{Halo, LayerLoc};
use tracing::debug;

use crate::channel::ChannelId;
use crate::error::{Result, RuntimeError};
use crate::publisher::{ActivityCube, Publisher, PublisherState};

/// Activity and accumulation buffers for one layer on this process.
#[derive(Debug, Clone)]
pub struct LayerBuffer {
    name: String,
    loc: LayerLoc,
    x_scale: i32,
    y_scale: i32,
    sparse: bool,
    spiking: bool,
    max_delay: usize,
    num_channels: usize,
    allocated: bool,
    activity: Vec<f32>,
    channels: Vec<Vec<f32>>,
    publisher: Option<Publisher>,
}

impl LayerBuffer {
    /// New unallocated layer. The halo of `loc` is the starting margin.
    pub fn new(name: &str, loc: LayerLoc, x_scale: i32, y_scale: i32) -> Self {
        Self {
            name: name.to_string(),
            loc,
            x_scale,
            y_scale,
            sparse: false,
            spiking: false,
            max_delay: 0,
            num_channels: 0,
            allocated: false,
            activity: Vec::new(),
            channels: Vec::new(),
            publisher: None,
        }
    }

    /// Publish sparse active lists alongside dense activity.
    pub fn with_sparse(mut self, sparse: bool) -> Self {
        self.sparse = sparse;
        self
    }

    /// Mark activity as spike events rather than rates.
    pub fn with_spiking(mut self, spiking: bool) -> Self {
        self.spiking = spiking;
        self
    }

    /// Layer name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current geometry, including the negotiated halo
    pub fn loc(&self) -> &LayerLoc {
        &self.loc
    }

    /// log2 neuron spacing along x
    pub fn x_scale(&self) -> i32 {
        self.x_scale
    }

    /// log2 neuron spacing along y
    pub fn y_scale(&self) -> i32 {
        self.y_scale
    }

    /// Whether sparse active lists are published
    pub fn is_sparse(&self) -> bool {
        self.sparse
    }

    /// Whether activity is spike events
    pub fn is_spiking(&self) -> bool {
        self.spiking
    }

    /// Whether buffers are allocated
    pub fn is_allocated(&self) -> bool {
        self.allocated
    }

    fn ensure_unallocated(&self) -> Result<()> {
        if self.allocated {
            return Err(RuntimeError::AlreadyAllocated(self.name.clone()));
        }
        Ok(())
    }

    /// Raise the halo to at least the given margins. Returns the resulting halo.
    pub fn require_margin(&mut self, x_margin: usize, y_margin: usize) -> Result<Halo> {
        if self.loc.halo.lt >= x_margin
            && self.loc.halo.rt >= x_margin
            && self.loc.halo.dn >= y_margin
            && self.loc.halo.up >= y_margin
        {
            return Ok(self.loc.halo);
        }
        self.ensure_unallocated()?;
        self.loc.halo.raise_to(x_margin, y_margin);
        debug!(layer = %self.name, halo = ?self.loc.halo, "margin raised");
        Ok(self.loc.halo)
    }

    /// Keep at least `delay` past publications available.
    pub fn require_delay(&mut self, delay: usize) -> Result<()> {
        if delay > self.max_delay {
            self.ensure_unallocated()?;
            self.max_delay = delay;
        }
        Ok(())
    }

    /// Make sure the channel buffer exists after allocation.
    pub fn require_channel(&mut self, channel: ChannelId) -> Result<()> {
        if let Some(index) = channel.index() {
            if index >= self.num_channels {
                self.ensure_unallocated()?;
                self.num_channels = index + 1;
            }
        }
        Ok(())
    }

    /// Freeze the shape and allocate every buffer.
    pub fn allocate(&mut self) -> Result<()> {
        self.ensure_unallocated()?;
        let n_ext = self.loc.num_extended() * self.loc.nbatch;
        let n_res = self.loc.num_restricted() * self.loc.nbatch;
        self.activity = vec![0.0; n_ext];
        self.channels = vec![vec![0.0; n_res]; self.num_channels];
        self.publisher = Some(Publisher::new(
            &self.name,
            self.loc,
            self.max_delay,
            self.sparse,
        ));
        self.allocated = true;
        debug!(
            layer = %self.name,
            extended = n_ext,
            restricted = n_res,
            channels = self.num_channels,
            levels = self.max_delay + 1,
            "layer allocated"
        );
        Ok(())
    }

    /// Extended activity of every batch element.
    pub fn activity(&self) -> &[f32] {
        &self.activity
    }

    /// Mutable extended activity of every batch element.
    pub fn activity_mut(&mut self) -> &mut [f32] {
        &mut self.activity
    }

    /// Write interior activity for one batch element; the halo is zeroed.
    pub fn set_restricted_activity(&mut self, batch: usize, values: &[f32]) -> Result<()> {
        if !self.allocated {
            return Err(RuntimeError::NotAllocated(self.name.clone()));
        }
        let n_res = self.loc.num_restricted();
        if values.len() != n_res || batch >= self.loc.nbatch {
            return Err(RuntimeError::SizeMismatch {
                expected: n_res,
                actual: values.len(),
            });
        }
        let n_ext = self.loc.num_extended();
        let dst = &mut self.activity[batch * n_ext..(batch + 1) * n_ext];
        dst.fill(0.0);
        for (k, &v) in values.iter().enumerate() {
            dst[self.loc.extended_index(k)] = v;
        }
        Ok(())
    }

    /// Push the current activity into the publication history.
    pub fn publish(&mut self, time: f64) -> Result<()> {
        let publisher = self
            .publisher
            .as_mut()
            .ok_or_else(|| RuntimeError::NotAllocated(self.name.clone()))?;
        publisher.publish(&self.activity, time)
    }

    /// Snapshot published `delay` steps ago.
    pub fn create_cube(&self, delay: usize) -> Result<ActivityCube<'_>> {
        self.publisher
            .as_ref()
            .ok_or_else(|| RuntimeError::NotAllocated(self.name.clone()))?
            .create_cube(delay)
    }

    /// Copy of the publication history.
    pub fn publisher_state(&self) -> Result<PublisherState> {
        self.publisher
            .as_ref()
            .map(Publisher::state)
            .ok_or_else(|| RuntimeError::NotAllocated(self.name.clone()))
    }

    /// Restore a saved publication history.
    pub fn restore_publisher_state(&mut self, state: &PublisherState) -> Result<()> {
        self.publisher
            .as_mut()
            .ok_or_else(|| RuntimeError::NotAllocated(self.name.clone()))?
            .restore(state)
    }

    /// Number of extended neurons per batch element.
    pub fn num_extended(&self) -> usize {
        self.loc.num_extended()
    }

    fn channel_slot(&self, channel: ChannelId) -> Result<usize> {
        channel
            .index()
            .filter(|&i| i < self.channels.len())
            .ok_or_else(|| RuntimeError::MissingChannel {
                layer: self.name.clone(),
                channel: channel.to_string(),
            })
    }

    /// Restricted accumulation buffer, all batch elements.
    pub fn channel(&self, channel: ChannelId) -> Result<&[f32]> {
        let slot = self.channel_slot(channel)?;
        Ok(&self.channels[slot])
    }

    /// Mutable restricted accumulation buffer, all batch elements.
    pub fn channel_mut(&mut self, channel: ChannelId) -> Result<&mut [f32]> {
        let slot = self.channel_slot(channel)?;
        Ok(&mut self.channels[slot])
    }

    /// Move a channel buffer out so it can be written while this layer is also read.
    /// Must be returned with [`restore_channel`](Self::restore_channel).
    pub fn take_channel(&mut self, channel: ChannelId) -> Result<Vec<f32>> {
        let slot = self.channel_slot(channel)?;
        Ok(std::mem::take(&mut self.channels[slot]))
    }

    /// Put back a buffer obtained from [`take_channel`](Self::take_channel).
    pub fn restore_channel(&mut self, channel: ChannelId, buffer: Vec<f32>) -> Result<()> {
        let slot = self.channel_slot(channel)?;
        let expected = self.loc.num_restricted() * self.loc.nbatch;
        if buffer.len() != expected {
            return Err(RuntimeError::SizeMismatch {
                expected,
                actual: buffer.len(),
            });
        }
        self.channels[slot] = buffer;
        Ok(())
    }

    /// Zero every channel.
    pub fn clear_channels(&mut self) {
        for channel in &mut self.channels {
            channel.fill(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_margin_only_grows_before_allocation() {
        let mut layer = LayerBuffer::new("L", LayerLoc::new(4, 4, 1, 1), 0, 0);
        layer.require_margin(2, 1).unwrap();
        layer.require_margin(1, 1).unwrap();
        assert_eq!(layer.loc().halo, Halo::new(2, 1));
        layer.allocate().unwrap();
        assert!(layer.require_margin(1, 1).is_ok());
        assert!(layer.require_margin(3, 1).is_err());
    }

    #[test]
    fn test_restricted_activity_lands_in_interior() {
        let mut layer = LayerBuffer::new("L", LayerLoc::new(2, 2, 1, 1), 0, 0);
        layer.require_margin(1, 1).unwrap();
        layer.allocate().unwrap();
        layer.set_restricted_activity(0, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let a = layer.activity();
        assert_eq!(a[5], 1.0);
        assert_eq!(a[10], 4.0);
        assert_eq!(a.iter().sum::<f32>(), 10.0);
    }

    #[test]
    fn test_take_and_restore_channel() {
        let mut layer = LayerBuffer::new("L", LayerLoc::new(2, 2, 1, 2), 0, 0);
        layer.require_channel(ChannelId::Inhibitory).unwrap();
        layer.allocate().unwrap();
        let mut buf = layer.take_channel(ChannelId::Inhibitory).unwrap();
        assert_eq!(buf.len(), 8);
        buf[0] = 1.0;
        layer.restore_channel(ChannelId::Inhibitory, buf).unwrap();
        assert_eq!(layer.channel(ChannelId::Inhibitory).unwrap()[0], 1.0);
        assert!(layer.channel(ChannelId::Gap).is_err());
    }
}
