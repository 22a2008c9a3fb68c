// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Connection descriptions.
//!
//! A [`ConnectionSpec`] is what the column is told; layer and original
//! connection names are resolved during the column's communicate phase.

use core::fmt;
use core::str::FromStr;

use synaptor_config::{ConfigError, ConfigResult, ParamGroup};
use synaptor_npu_neural::{AccumulateType, NpuError, Weights};
use synaptor_npu_runtime::ChannelId;

/// What a connection does with its weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    /// Owns a weight store
    Hyper,
    /// Max, sum or average pooling with implied weights
    Pooling,
    /// Sends values back along a pooling connection
    TransposePooling,
    /// Shares the original's weights
    Clone,
    /// Reads the transpose of the original's weights
    Transpose,
    /// Owns a copy of the original's weights, refreshed when the original changes
    Copy,
}

impl ConnectionKind {
    /// Kinds that resolve an `original` connection during setup.
    pub fn needs_original(self) -> bool {
        matches!(
            self,
            ConnectionKind::TransposePooling
                | ConnectionKind::Clone
                | ConnectionKind::Transpose
                | ConnectionKind::Copy
        )
    }

    /// Kinds whose deliveries read a weight store.
    pub fn has_weights(self) -> bool {
        matches!(
            self,
            ConnectionKind::Hyper | ConnectionKind::Clone | ConnectionKind::Transpose | ConnectionKind::Copy
        )
    }

    /// Kinds that own their weight store and checkpoint it.
    pub fn owns_weights(self) -> bool {
        matches!(self, ConnectionKind::Hyper | ConnectionKind::Copy)
    }
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionKind::Hyper => "hyper",
            ConnectionKind::Pooling => "pooling",
            ConnectionKind::TransposePooling => "transpose_pooling",
            ConnectionKind::Clone => "clone",
            ConnectionKind::Transpose => "transpose",
            ConnectionKind::Copy => "copy",
        };
        f.write_str(name)
    }
}

impl FromStr for ConnectionKind {
    type Err = NpuError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', ' '], "_").as_str() {
            "hyper" | "hyperconn" => Ok(ConnectionKind::Hyper),
            "pooling" | "poolingconn" => Ok(ConnectionKind::Pooling),
            "transpose_pooling" | "transposepoolingconn" => Ok(ConnectionKind::TransposePooling),
            "clone" | "cloneconn" => Ok(ConnectionKind::Clone),
            "transpose" | "transposeconn" => Ok(ConnectionKind::Transpose),
            "copy" | "copyconn" => Ok(ConnectionKind::Copy),
            other => Err(NpuError::configuration(
                "connection kind",
                format!("unrecognized connection kind \"{other}\""),
            )),
        }
    }
}

/// Initial values of an owned weight store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WeightInit {
    Constant { value: f32 },
    /// `strength * exp(-d^2 / (2 sigma^2))`, `d` measured from the patch center
    Gaussian { strength: f32, sigma: f32 },
}

impl Default for WeightInit {
    fn default() -> Self {
        WeightInit::Constant { value: 1.0 }
    }
}

impl WeightInit {
    pub fn apply(&self, weights: &mut Weights) {
        match *self {
            WeightInit::Constant { value } => weights.fill(value),
            WeightInit::Gaussian { strength, sigma } => {
                let geometry = weights.geometry().clone();
                let (nxp, nyp, nfp) = (geometry.nxp(), geometry.nyp(), geometry.nfp());
                let cx = (nxp as f32 - 1.0) / 2.0;
                let cy = (nyp as f32 - 1.0) / 2.0;
                let two_sigma_sq = 2.0 * sigma * sigma;
                let mut kernel = Vec::with_capacity(geometry.patch_volume());
                for y in 0..nyp {
                    for x in 0..nxp {
                        let d_sq = (x as f32 - cx).powi(2) + (y as f32 - cy).powi(2);
                        let w = strength * (-d_sq / two_sigma_sq).exp();
                        kernel.extend(std::iter::repeat(w).take(nfp));
                    }
                }
                for arbor in 0..weights.num_arbors() {
                    for data_index in 0..weights.num_data_patches() {
                        weights.get_data_mut(arbor, data_index).copy_from_slice(&kernel);
                    }
                }
            }
        }
    }
}

/// Everything needed to build one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSpec {
    pub name: String,
    pub kind: ConnectionKind,
    pub pre: String,
    pub post: String,
    pub channel: ChannelId,
    pub nxp: usize,
    pub nyp: usize,
    /// Defaults to the postsynaptic feature count
    pub nfp: Option<usize>,
    /// One arbor per delay, in timesteps. `None` inherits the original's delays.
    pub delays: Option<Vec<usize>>,
    pub shared_weights: bool,
    pub plasticity: bool,
    pub hebbian_rate: f32,
    pub accumulate: AccumulateType,
    pub post_perspective: bool,
    pub receive_gpu: bool,
    pub convert_rate_to_spike_count: bool,
    pub original: Option<String>,
    pub weight_init: WeightInit,
}

impl ConnectionSpec {
    fn base(name: &str, kind: ConnectionKind, pre: &str, post: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            pre: pre.to_string(),
            post: post.to_string(),
            channel: ChannelId::Excitatory,
            nxp: 1,
            nyp: 1,
            nfp: None,
            delays: None,
            shared_weights: true,
            plasticity: false,
            hebbian_rate: 0.0,
            accumulate: AccumulateType::Convolve,
            post_perspective: false,
            receive_gpu: false,
            convert_rate_to_spike_count: false,
            original: None,
            weight_init: WeightInit::default(),
        }
    }

    pub fn hyper(name: &str, pre: &str, post: &str) -> Self {
        Self::base(name, ConnectionKind::Hyper, pre, post)
    }

    pub fn pooling(name: &str, pre: &str, post: &str, accumulate: AccumulateType) -> Self {
        Self {
            accumulate,
            ..Self::base(name, ConnectionKind::Pooling, pre, post)
        }
    }

    /// Connection sharing, transposing or copying `original`.
    pub fn derived(name: &str, kind: ConnectionKind, pre: &str, post: &str, original: &str) -> Self {
        Self {
            original: Some(original.to_string()),
            ..Self::base(name, kind, pre, post)
        }
    }

    pub fn with_patch(mut self, nxp: usize, nyp: usize) -> Self {
        self.nxp = nxp;
        self.nyp = nyp;
        self
    }

    pub fn with_nfp(mut self, nfp: usize) -> Self {
        self.nfp = Some(nfp);
        self
    }

    pub fn with_channel(mut self, channel: ChannelId) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_delays(mut self, delays: Vec<usize>) -> Self {
        self.delays = Some(delays);
        self
    }

    pub fn with_shared_weights(mut self, shared: bool) -> Self {
        self.shared_weights = shared;
        self
    }

    pub fn with_plasticity(mut self, rate: f32) -> Self {
        self.plasticity = true;
        self.hebbian_rate = rate;
        self
    }

    pub fn with_post_perspective(mut self, post_perspective: bool) -> Self {
        self.post_perspective = post_perspective;
        self
    }

    pub fn with_receive_gpu(mut self, receive_gpu: bool) -> Self {
        self.receive_gpu = receive_gpu;
        self
    }

    pub fn with_convert_rate_to_spike_count(mut self, convert: bool) -> Self {
        self.convert_rate_to_spike_count = convert;
        self
    }

    pub fn with_weight_init(mut self, init: WeightInit) -> Self {
        self.weight_init = init;
        self
    }

    /// Read a `[[connection]]` group. Each key is read once; the caller
    /// reports unread keys.
    pub fn from_group(group: &mut ParamGroup) -> ConfigResult<Self> {
        let name = group.name().to_string();
        let invalid = |key: &str, reason: String| ConfigError::InvalidValue {
            group: name.clone(),
            key: key.to_string(),
            reason,
        };

        let kind: ConnectionKind = group
            .require::<String>("kind")?
            .parse()
            .map_err(|e: NpuError| invalid("kind", e.to_string()))?;
        let pre = group.require::<String>("pre")?;
        let post = group.require::<String>("post")?;
        let mut spec = Self::base(&name, kind, &pre, &post);

        spec.channel = group
            .read::<String>("channel", "excitatory".to_string(), false)?
            .parse()
            .map_err(|e: synaptor_npu_runtime::RuntimeError| invalid("channel", e.to_string()))?;
        spec.delays = group.read_optional::<Vec<usize>>("delays")?;
        spec.convert_rate_to_spike_count = group.read("convert_rate_to_spike_count", false, false)?;
        spec.post_perspective = group.read("post_perspective", false, false)?;
        spec.receive_gpu = group.read("receive_gpu", false, false)?;

        if kind.needs_original() {
            spec.original = Some(group.require::<String>("original")?);
        } else {
            spec.nxp = group.read("nxp", 1, true)?;
            spec.nyp = group.read("nyp", spec.nxp, true)?;
            spec.nfp = group.read_optional("nfp")?;
        }

        match kind {
            ConnectionKind::Hyper => {
                spec.shared_weights = group.read("shared_weights", true, true)?;
                spec.plasticity = group.read("plasticity", false, false)?;
                if spec.plasticity {
                    spec.hebbian_rate = group.read("hebbian_rate", 0.01, true)?;
                }
                spec.weight_init = match group
                    .read::<String>("weight_init", "constant".to_string(), true)?
                    .as_str()
                {
                    "constant" => WeightInit::Constant {
                        value: group.read("weight_value", 1.0, true)?,
                    },
                    "gaussian" => WeightInit::Gaussian {
                        strength: group.read("strength", 1.0, true)?,
                        sigma: group.read("sigma", 1.0, true)?,
                    },
                    other => {
                        return Err(invalid(
                            "weight_init",
                            format!("expected \"constant\" or \"gaussian\", found \"{other}\""),
                        ))
                    }
                };
            }
            ConnectionKind::Pooling => {
                spec.accumulate = group
                    .read::<String>("accumulate", "maxpooling".to_string(), true)?
                    .parse()
                    .map_err(|e: NpuError| invalid("accumulate", e.to_string()))?;
            }
            ConnectionKind::Copy => {
                spec.plasticity = group.read("plasticity", false, false)?;
            }
            _ => {}
        }
        Ok(spec)
    }
}
