// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # Synaptor Plasticity
//!
//! Weight updaters run once per timestep after delivery:
//! - [`CopyUpdater`]: one-way, at-most-once-per-change propagation from an
//!   original weight store into a copy
//! - [`HebbianUpdater`]: `dW = rate * pre * post` through the patch geometry
//!
//! Updaters are the only writers of owned weights during a run, and every
//! write advances the store's timestamp so dependents can tell it changed.

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod copy_updater;
pub mod hebbian;

pub use copy_updater::CopyUpdater;
pub use hebbian::HebbianUpdater;
