// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Postsynaptic accumulation channels.

use core::fmt;
use core::str::FromStr;

use crate::error::RuntimeError;

/// Named accumulation buffer on a postsynaptic layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelId {
    /// Excitatory input (channel 0)
    #[default]
    Excitatory,
    /// Inhibitory input (channel 1)
    Inhibitory,
    /// Second inhibitory input (channel 2)
    InhibitoryB,
    /// Gap-junction input (channel 3)
    Gap,
    /// Delivery is skipped entirely
    NoUpdate,
}

impl ChannelId {
    /// Buffer slot, or `None` for [`ChannelId::NoUpdate`].
    pub fn index(self) -> Option<usize> {
        match self {
            ChannelId::Excitatory => Some(0),
            ChannelId::Inhibitory => Some(1),
            ChannelId::InhibitoryB => Some(2),
            ChannelId::Gap => Some(3),
            ChannelId::NoUpdate => None,
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelId::Excitatory => "excitatory",
            ChannelId::Inhibitory => "inhibitory",
            ChannelId::InhibitoryB => "inhibitory_b",
            ChannelId::Gap => "gap",
            ChannelId::NoUpdate => "no_update",
        };
        f.write_str(name)
    }
}

impl FromStr for ChannelId {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "excitatory" | "exc" | "0" => Ok(ChannelId::Excitatory),
            "inhibitory" | "inh" | "1" => Ok(ChannelId::Inhibitory),
            "inhibitory_b" | "inhb" | "2" => Ok(ChannelId::InhibitoryB),
            "gap" | "3" => Ok(ChannelId::Gap),
            "no_update" | "none" | "-1" => Ok(ChannelId::NoUpdate),
            other => Err(RuntimeError::InvalidParameters(format!(
                "unrecognized channel \"{}\"",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_codes() {
        assert_eq!("-1".parse::<ChannelId>().unwrap(), ChannelId::NoUpdate);
        assert_eq!("INH".parse::<ChannelId>().unwrap().index(), Some(1));
        assert_eq!(ChannelId::NoUpdate.index(), None);
        assert!("bogus".parse::<ChannelId>().is_err());
    }
}
