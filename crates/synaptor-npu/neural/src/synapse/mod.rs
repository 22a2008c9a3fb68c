// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! Synaptic accumulation semantics and the row kernels that implement them.

pub mod accumulate;

pub use accumulate::{
    accumulate_max_pooling, accumulate_sum_pooling, convolve_row, dot_row, AccumulateType,
};
