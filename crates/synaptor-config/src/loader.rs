// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! Precedence, lowest first:
//! 1. TOML file
//! 2. Environment variables
//! 3. CLI arguments

use crate::{ConfigError, ConfigResult, SynaptorConfig};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "synaptor.toml";

/// Find the configuration file
///
/// Search order:
/// 1. `SYNAPTOR_CONFIG_PATH` environment variable
/// 2. `./synaptor.toml`
/// 3. Up to 5 parent directories
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var("SYNAPTOR_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by SYNAPTOR_CONFIG_PATH not found: {}",
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));
        let mut current = cwd.as_path();
        for _ in 0..5 {
            match current.parent() {
                Some(parent) => {
                    search_paths.push(parent.join(CONFIG_FILE_NAME));
                    current = parent;
                }
                None => break,
            }
        }
    }

    if let Some(found) = search_paths.iter().find(|p| p.exists()) {
        return Ok(found.clone());
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "'{}' not found in any of these locations:\n{}\n\nSet SYNAPTOR_CONFIG_PATH to specify a custom location.",
        CONFIG_FILE_NAME, search_list
    )))
}

/// Load configuration from a TOML file and apply overrides
///
/// * `config_path` - Path to the file. If `None`, [`find_config_file`] is used.
/// * `cli_args` - Optional CLI argument overrides
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<SynaptorConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config = load_config_str(&content)?;

    apply_environment_overrides(&mut config);
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli);
    }

    tracing::debug!(path = %config_file.display(), "loaded configuration");
    Ok(config)
}

/// Parse configuration from a TOML string. No overrides are applied.
pub fn load_config_str(content: &str) -> ConfigResult<SynaptorConfig> {
    Ok(toml::from_str(content)?)
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `SYNAPTOR_NUM_THREADS` -> `system.num_threads`
/// - `SYNAPTOR_PARTITIONS` -> `system.partitions`
/// - `SYNAPTOR_LOG_LEVEL` -> `system.log_level`
/// - `SYNAPTOR_BACKEND` -> `system.backend`
/// - `SYNAPTOR_NBATCH` -> `column.nbatch`
pub fn apply_environment_overrides(config: &mut SynaptorConfig) {
    if let Ok(value) = env::var("SYNAPTOR_NUM_THREADS") {
        if let Ok(threads) = value.parse::<usize>() {
            config.system.num_threads = threads;
        }
    }
    if let Ok(value) = env::var("SYNAPTOR_PARTITIONS") {
        if let Ok(partitions) = value.parse::<usize>() {
            config.system.partitions = partitions;
        }
    }
    if let Ok(value) = env::var("SYNAPTOR_LOG_LEVEL") {
        config.system.log_level = value;
    }
    if let Ok(value) = env::var("SYNAPTOR_BACKEND") {
        config.system.backend = value.to_lowercase();
    }
    if let Ok(value) = env::var("SYNAPTOR_NBATCH") {
        if let Ok(nbatch) = value.parse::<usize>() {
            config.column.nbatch = nbatch;
        }
    }
}

/// Apply CLI argument overrides to configuration
///
/// Recognized keys: `num_threads`, `partitions`, `log_level`, `backend`,
/// `nbatch`, `stop_time`, `checkpoint_dir`.
pub fn apply_cli_overrides(config: &mut SynaptorConfig, cli_args: &HashMap<String, String>) {
    if let Some(value) = cli_args.get("num_threads") {
        if let Ok(threads) = value.parse::<usize>() {
            config.system.num_threads = threads;
        }
    }
    if let Some(value) = cli_args.get("partitions") {
        if let Ok(partitions) = value.parse::<usize>() {
            config.system.partitions = partitions;
        }
    }
    if let Some(value) = cli_args.get("log_level") {
        config.system.log_level = value.clone();
    }
    if let Some(value) = cli_args.get("backend") {
        config.system.backend = value.to_lowercase();
    }
    if let Some(value) = cli_args.get("nbatch") {
        if let Ok(nbatch) = value.parse::<usize>() {
            config.column.nbatch = nbatch;
        }
    }
    if let Some(value) = cli_args.get("stop_time") {
        if let Ok(stop) = value.parse::<f64>() {
            config.column.stop_time = stop;
        }
    }
    if let Some(value) = cli_args.get("checkpoint_dir") {
        config.column.checkpoint_dir = Some(PathBuf::from(value));
    }
}
