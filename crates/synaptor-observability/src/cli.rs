// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-crate debug flags
//!
//! `--debug-synaptor-npu-burst-engine` and friends on the command line, or
//! `SYNAPTOR_DEBUG=<crate>[,<crate>]` in the environment.

use std::collections::BTreeSet;
use std::env;

use crate::{DELIVERY_TRACE_TARGET, KNOWN_CRATES};

/// Crates with debug logging switched on
///
/// # Example
/// ```rust
/// use synaptor_observability::CrateDebugFlags;
///
/// let flags = CrateDebugFlags::from_args(vec!["--debug-synaptor-config".to_string()]);
/// assert!(flags.is_enabled("synaptor-config"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct CrateDebugFlags {
    pub enabled_crates: BTreeSet<String>,
}

impl CrateDebugFlags {
    /// Collect `--debug-{crate}` and `--debug-all` from an argument list.
    pub fn from_args<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut flags = CrateDebugFlags::default();
        for arg in args {
            if arg == "--debug-all" {
                flags.enable_all();
            } else if let Some(crate_name) = arg.strip_prefix("--debug-") {
                flags.enabled_crates.insert(crate_name.to_string());
            }
        }
        flags
    }

    /// Merge a `SYNAPTOR_DEBUG` style list: `all` or comma-separated crate names.
    pub fn merge_env_value(&mut self, value: &str) {
        if value.trim() == "all" {
            self.enable_all();
            return;
        }
        for crate_name in value.split(',') {
            let crate_name = crate_name.trim();
            if !crate_name.is_empty() {
                self.enabled_crates.insert(crate_name.to_string());
            }
        }
    }

    fn enable_all(&mut self) {
        for crate_name in KNOWN_CRATES {
            self.enabled_crates.insert(crate_name.to_string());
        }
    }

    pub fn is_enabled(&self, crate_name: &str) -> bool {
        self.enabled_crates.contains(crate_name)
    }

    pub fn any_enabled(&self) -> bool {
        !self.enabled_crates.is_empty()
    }

    /// `DEBUG` for flagged crates, `INFO` otherwise.
    pub fn log_level(&self, crate_name: &str) -> tracing::Level {
        if self.is_enabled(crate_name) {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// `EnvFilter` directive string.
    ///
    /// Tracing targets are module paths, so crate names are written with
    /// underscores. The delivery trace target keeps its own name.
    pub fn to_filter_string(&self, default_level: &str) -> String {
        let mut filters: Vec<String> = self
            .enabled_crates
            .iter()
            .map(|name| {
                if name == DELIVERY_TRACE_TARGET {
                    format!("{}=trace", name)
                } else {
                    format!("{}=debug", name.replace('-', "_"))
                }
            })
            .collect();
        filters.push(default_level.to_string());
        filters.join(",")
    }
}

/// Debug flags from the process arguments and `SYNAPTOR_DEBUG`.
pub fn parse_debug_flags() -> CrateDebugFlags {
    let mut flags = CrateDebugFlags::from_args(env::args());
    if let Ok(value) = env::var("SYNAPTOR_DEBUG") {
        flags.merge_env_value(&value);
    }
    flags
}

/// Help text for debug flags
pub fn debug_flags_help() -> String {
    format!(
        r#"Debug Flags:
  --debug-all                    Enable debug logging for all crates
  --debug-{{crate-name}}          Enable debug logging for one crate
  --debug-{trace}    Per-synapse delivery tracing

Available crates:
  {crates}

Environment Variable:
  SYNAPTOR_DEBUG={{crate-name}}[,{{crate-name}}]
  SYNAPTOR_DEBUG=all
"#,
        trace = DELIVERY_TRACE_TARGET,
        crates = KNOWN_CRATES.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_crate_flag() {
        let flags = CrateDebugFlags::from_args(vec!["--debug-synaptor-config".to_string()]);
        assert!(flags.is_enabled("synaptor-config"));
        assert!(!flags.is_enabled("synaptor-npu-neural"));
    }

    #[test]
    fn test_debug_all() {
        let flags = CrateDebugFlags::from_args(vec!["--debug-all".to_string()]);
        for crate_name in KNOWN_CRATES {
            assert!(flags.is_enabled(crate_name), "{} should be enabled", crate_name);
        }
    }

    #[test]
    fn test_env_value_merge() {
        let mut flags = CrateDebugFlags::default();
        flags.merge_env_value(" synaptor-npu-runtime, ,synaptor-config");
        assert!(flags.is_enabled("synaptor-npu-runtime"));
        assert!(flags.is_enabled("synaptor-config"));
        assert_eq!(flags.enabled_crates.len(), 2);
    }

    #[test]
    fn test_filter_string() {
        let flags = CrateDebugFlags::from_args(vec![
            "--debug-synaptor-npu-burst-engine".to_string(),
            "--debug-synaptor-npu-trace".to_string(),
        ]);
        let filter = flags.to_filter_string("warn");
        assert!(filter.contains("synaptor_npu_burst_engine=debug"));
        assert!(filter.contains("synaptor-npu-trace=trace"));
        assert!(filter.ends_with(",warn"));
    }

    #[test]
    fn test_log_level() {
        let flags = CrateDebugFlags::from_args(vec!["--debug-synaptor-config".to_string()]);
        assert_eq!(flags.log_level("synaptor-config"), tracing::Level::DEBUG);
        assert_eq!(flags.log_level("synaptor"), tracing::Level::INFO);
    }
}
