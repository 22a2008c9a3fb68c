// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! Structural checks only. Per-layer and per-connection parameters are
//! checked by the components that read them.

use crate::{ConfigError, ConfigResult, SynaptorConfig, TimeScaleControllerKind};

/// Validation errors that can occur during config validation
#[derive(Debug, Clone)]
pub enum ConfigValidationError {
    MissingRequired { field: String },
    InvalidValue { field: String, reason: String },
    DuplicateName { kind: String, name: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRequired { field } => {
                write!(f, "Missing required configuration: {}", field)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
            Self::DuplicateName { kind, name } => {
                write!(f, "Duplicate {} name: {}", kind, name)
            }
        }
    }
}

/// Validate the complete configuration
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every problem found
pub fn validate_config(config: &SynaptorConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    validate_system(config, &mut errors);
    validate_column(config, &mut errors);
    validate_timescale(config, &mut errors);
    validate_groups("layer", &config.layers, &mut errors);
    validate_groups("connection", &config.connections, &mut errors);

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }

    Ok(())
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigValidationError {
    ConfigValidationError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn validate_system(config: &SynaptorConfig, errors: &mut Vec<ConfigValidationError>) {
    if config.system.partitions == 0 {
        errors.push(invalid("system.partitions", "must be at least 1"));
    }
    if !matches!(config.system.backend.as_str(), "cpu" | "gpu" | "auto") {
        errors.push(invalid(
            "system.backend",
            format!("'{}' is not one of cpu, gpu, auto", config.system.backend),
        ));
    }
    let level = config.system.log_level.to_lowercase();
    if !matches!(
        level.as_str(),
        "trace" | "debug" | "info" | "warn" | "error" | "off"
    ) {
        errors.push(invalid(
            "system.log_level",
            format!("unknown level '{}'", config.system.log_level),
        ));
    }
}

fn validate_column(config: &SynaptorConfig, errors: &mut Vec<ConfigValidationError>) {
    let column = &config.column;
    if column.name.is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "column.name".to_string(),
        });
    }
    if column.nx == 0 || column.ny == 0 {
        errors.push(invalid("column.nx/ny", "must be positive"));
    }
    if column.nbatch == 0 {
        errors.push(invalid("column.nbatch", "must be at least 1"));
    }
    if !(column.dt > 0.0) {
        errors.push(invalid("column.dt", "must be positive"));
    }
    if column.stop_time < column.start_time {
        errors.push(invalid("column.stop_time", "precedes start_time"));
    }
}

fn validate_timescale(config: &SynaptorConfig, errors: &mut Vec<ConfigValidationError>) {
    let ts = &config.timescale;
    if ts.kind == TimeScaleControllerKind::None {
        return;
    }
    if ts.energy_layer.as_deref().map_or(true, str::is_empty) {
        errors.push(ConfigValidationError::MissingRequired {
            field: "timescale.energy_layer".to_string(),
        });
    }
    if ts.base_min > ts.base_max {
        errors.push(invalid("timescale.base_min", "exceeds base_max"));
    }
    if !(ts.tau_factor > 0.0) {
        errors.push(invalid("timescale.tau_factor", "must be positive"));
    }
    if ts.growth_factor < 0.0 {
        errors.push(invalid("timescale.growth_factor", "must not be negative"));
    }
    if ts.kind == TimeScaleControllerKind::Jic && !(ts.knee_slope > 0.0 && ts.knee_slope <= 1.0) {
        errors.push(invalid("timescale.knee_slope", "must lie in (0, 1]"));
    }
}

fn validate_groups(kind: &str, tables: &[toml::Table], errors: &mut Vec<ConfigValidationError>) {
    let mut seen = std::collections::BTreeSet::new();
    for (i, table) in tables.iter().enumerate() {
        match table.get("name").and_then(|v| v.as_str()) {
            Some(name) => {
                if !seen.insert(name.to_string()) {
                    errors.push(ConfigValidationError::DuplicateName {
                        kind: kind.to_string(),
                        name: name.to_string(),
                    });
                }
            }
            None => errors.push(ConfigValidationError::MissingRequired {
                field: format!("{}[{}].name", kind, i),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_config_str;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&SynaptorConfig::default()).is_ok());
    }

    #[test]
    fn test_errors_are_collected() {
        let mut config = SynaptorConfig::default();
        config.system.partitions = 0;
        config.system.backend = "tpu".to_string();
        config.column.dt = 0.0;

        let message = validate_config(&config).unwrap_err().to_string();
        assert!(message.contains("system.partitions"));
        assert!(message.contains("system.backend"));
        assert!(message.contains("column.dt"));
    }

    #[test]
    fn test_knee_slope_range() {
        let mut config = SynaptorConfig::default();
        config.timescale.kind = TimeScaleControllerKind::Jic;
        config.timescale.energy_layer = Some("Output".to_string());
        config.timescale.knee_slope = 1.5;
        assert!(validate_config(&config).is_err());

        config.timescale.kind = TimeScaleControllerKind::Adaptive;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_controller_needs_energy_layer() {
        let mut config = SynaptorConfig::default();
        config.timescale.kind = TimeScaleControllerKind::Adaptive;
        let message = validate_config(&config).unwrap_err().to_string();
        assert!(message.contains("timescale.energy_layer"));
    }

    #[test]
    fn test_duplicate_and_unnamed_groups() {
        let config = load_config_str(
            r#"
            [[layer]]
            name = "V1"
            [[layer]]
            name = "V1"
            [[connection]]
            pre = "V1"
            "#,
        )
        .unwrap();
        let message = validate_config(&config).unwrap_err().to_string();
        assert!(message.contains("Duplicate layer name: V1"));
        assert!(message.contains("connection[0].name"));
    }
}
