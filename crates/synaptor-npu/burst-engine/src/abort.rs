// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Fatal error handling.

use synaptor_npu_neural::NpuError;
use synaptor_npu_runtime::Communicator;
use tracing::error;

/// Log `err`, wait for the rest of the process group and exit with status 1.
///
/// Every process calls this on a fatal configuration or runtime error so the
/// group stops together instead of hanging in a later collective.
pub fn abort_collective(communicator: &dyn Communicator, err: &NpuError) -> ! {
    error!(
        rank = communicator.rank(),
        size = communicator.size(),
        configuration = err.is_configuration_error(),
        error = %err,
        "fatal error, aborting"
    );
    communicator.barrier();
    std::process::exit(1)
}
