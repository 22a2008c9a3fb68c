// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Synaptor Configuration
//!
//! Type-safe configuration for a synaptor column:
//! - TOML file parsing (`synaptor.toml`)
//! - Environment variable overrides (`SYNAPTOR_*`)
//! - CLI argument overrides
//! - Parameter groups for `[[layer]]` and `[[connection]]` entries, read once each
//!
//! ## Usage
//!
//! ```rust,no_run
//! use synaptor_config::{load_config, validate_config};
//!
//! let config = load_config(None, None).expect("Failed to load config");
//! validate_config(&config).expect("Invalid config");
//! println!("threads: {}", config.system.num_threads);
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod loader;
pub mod params;
pub mod types;
pub mod validation;

pub use loader::{
    apply_cli_overrides, apply_environment_overrides, find_config_file, load_config,
    load_config_str,
};
pub use params::{ParamGroup, ParamValue};
pub use types::*;
pub use validation::{validate_config, ConfigValidationError};

/// Re-export for convenience
pub use toml;

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found. Searched: {0}")]
    FileNotFound(String),

    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax: {0}")]
    ParseError(String),

    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Missing required configuration: {group}.{key}")]
    MissingRequired { group: String, key: String },

    #[error("Invalid configuration value for {group}.{key}: {reason}")]
    InvalidValue {
        group: String,
        key: String,
        reason: String,
    },
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
