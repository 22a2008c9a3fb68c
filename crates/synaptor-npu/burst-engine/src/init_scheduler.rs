// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Repeated-pass initialization.
//!
//! Components that depend on others report [`InitStatus::Postponed`] until the
//! dependency is ready. Passes repeat over the still-pending components; a
//! pass that completes nothing means the remaining ones wait on each other.

use synaptor_npu_neural::{InitStatus, NpuError, Result};
use tracing::{debug, trace};

/// Run `try_init` over `names` until every component reports done.
///
/// Returns component indices in completion order.
///
/// # Errors
/// The first [`InitStatus::Failed`] error, or [`NpuError::DependencyCycle`]
/// naming the pending components when a pass makes no progress.
pub fn run_to_completion<F>(names: &[String], mut try_init: F) -> Result<Vec<usize>>
where
    F: FnMut(usize) -> InitStatus,
{
    let mut pending: Vec<usize> = (0..names.len()).collect();
    let mut order = Vec::with_capacity(names.len());
    let mut pass = 0;

    while !pending.is_empty() {
        pass += 1;
        let mut postponed = Vec::new();
        for &i in &pending {
            match try_init(i) {
                InitStatus::Done => {
                    trace!(component = %names[i], pass, "initialized");
                    order.push(i);
                }
                InitStatus::Postponed => {
                    trace!(component = %names[i], pass, "postponed");
                    postponed.push(i);
                }
                InitStatus::Failed(err) => return Err(err),
            }
        }
        if postponed.len() == pending.len() {
            return Err(NpuError::DependencyCycle {
                pending: postponed.iter().map(|&i| names[i].clone()).collect(),
            });
        }
        debug!(pass, remaining = postponed.len(), "initialization pass complete");
        pending = postponed;
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: &[&str]) -> Vec<String> {
        n.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_dependents_wait_for_dependencies() {
        // 0 depends on 2, 1 depends on 0
        let deps = [Some(2), Some(0), None];
        let mut done = [false; 3];
        let order = run_to_completion(&names(&["A", "B", "C"]), |i| match deps[i] {
            Some(d) if !done[d] => InitStatus::Postponed,
            _ => {
                done[i] = true;
                InitStatus::Done
            }
        })
        .unwrap();
        assert_eq!(order, vec![2, 0, 1]);
    }

    #[test]
    fn test_cycle_reports_pending() {
        let err = run_to_completion(&names(&["A", "B", "C"]), |i| {
            if i == 2 {
                InitStatus::Done
            } else {
                InitStatus::Postponed
            }
        })
        .unwrap_err();
        assert_eq!(
            err,
            NpuError::DependencyCycle {
                pending: names(&["A", "B"])
            }
        );
    }

    #[test]
    fn test_failure_stops_immediately() {
        let err = run_to_completion(&names(&["A"]), |_| {
            InitStatus::Failed(NpuError::configuration("A", "bad"))
        })
        .unwrap_err();
        assert!(err.is_configuration_error());
    }
}
