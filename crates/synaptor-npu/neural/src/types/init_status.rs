// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::types::NpuError;

/// Outcome of one initialization attempt by a component.
///
/// `Postponed` means a named dependency has not finished its own pass yet;
/// the driver retries the component on the next pass.
#[derive(Debug, Clone, PartialEq)]
pub enum InitStatus {
    Done,
    Postponed,
    Failed(NpuError),
}

impl InitStatus {
    pub fn is_done(&self) -> bool {
        matches!(self, InitStatus::Done)
    }

    pub fn is_postponed(&self) -> bool {
        matches!(self, InitStatus::Postponed)
    }
}

impl From<NpuError> for InitStatus {
    fn from(err: NpuError) -> Self {
        InitStatus::Failed(err)
    }
}

impl From<Result<InitStatus, NpuError>> for InitStatus {
    fn from(result: Result<InitStatus, NpuError>) -> Self {
        result.unwrap_or_else(InitStatus::Failed)
    }
}
