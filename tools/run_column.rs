// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Build a column from a TOML config and step it to `column.stop_time`.
//!
//! ```text
//! run_column [--config <path>] [--restart <checkpoint-dir>] [--set key=value]... [--debug-<crate>]...
//! ```

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use synaptor::burst_engine::{abort_collective, Column};
use synaptor::config::{load_config, validate_config};
use synaptor::observability::{debug_flags_help, init_logging, parse_debug_flags, LoggingConfig};
use synaptor::runtime::LocalCommunicator;
use tracing::info;

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    restart: Option<PathBuf>,
    overrides: HashMap<String, String>,
}

fn usage_and_exit() -> ! {
    eprintln!(
        "Usage: run_column [--config <path>] [--restart <dir>] [--set key=value]...\n\n\
         Override keys: num_threads, partitions, log_level, backend, nbatch, stop_time, checkpoint_dir\n\n{}",
        debug_flags_help()
    );
    process::exit(2);
}

fn parse_args() -> Args {
    let mut parsed = Args::default();
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let v = args.next().unwrap_or_else(|| usage_and_exit());
                parsed.config = Some(PathBuf::from(v));
            }
            "--restart" => {
                let v = args.next().unwrap_or_else(|| usage_and_exit());
                parsed.restart = Some(PathBuf::from(v));
            }
            "--set" => {
                let v = args.next().unwrap_or_else(|| usage_and_exit());
                let Some((key, value)) = v.split_once('=') else {
                    eprintln!("Expected key=value, got: {v}");
                    usage_and_exit();
                };
                parsed.overrides.insert(key.trim().to_string(), value.trim().to_string());
            }
            "-h" | "--help" => usage_and_exit(),
            // handled by parse_debug_flags
            other if other.starts_with("--debug-") => {}
            other => {
                eprintln!("Unknown argument: {other}");
                usage_and_exit();
            }
        }
    }
    parsed
}

fn main() -> Result<()> {
    let args = parse_args();
    let config = load_config(args.config.as_deref(), Some(&args.overrides)).context("loading configuration")?;
    validate_config(&config).context("validating configuration")?;

    let flags = parse_debug_flags();
    let _guard = init_logging(&flags, &LoggingConfig::with_level(&config.system.log_level))?;
    info!(
        column = %config.column.name,
        layers = config.layers.len(),
        connections = config.connections.len(),
        "configuration loaded"
    );

    let mut column = match Column::from_config(&config) {
        Ok(column) => column,
        Err(err) => abort_collective(&LocalCommunicator::new(), &err),
    };
    if let Err(err) = column.initialize() {
        abort_collective(column.communicator().as_ref(), &err);
    }
    if let Some(dir) = &args.restart {
        if let Err(err) = column.read_checkpoint(dir) {
            abort_collective(column.communicator().as_ref(), &err);
        }
    }
    if let Err(err) = column.run() {
        abort_collective(column.communicator().as_ref(), &err);
    }
    Ok(())
}
