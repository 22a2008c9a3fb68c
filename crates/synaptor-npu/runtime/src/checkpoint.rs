// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Named checkpoint entries.
//!
//! Components register their persistent state under unique names; the
//! registry is written as one JSON document per checkpoint directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, RuntimeError};

/// File written inside each checkpoint directory.
pub const CHECKPOINT_FILE: &str = "checkpoint.json";

/// One registered value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    /// Serialized value
    pub value: serde_json::Value,
    /// Root reads the value and broadcasts it on restore
    pub broadcast: bool,
    /// Value never changes after setup and is not rewritten
    pub constant: bool,
}

/// Registry of checkpoint entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Checkpointer {
    entries: BTreeMap<String, CheckpointEntry>,
}

impl Checkpointer {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `name`, replacing a non-constant previous value.
    pub fn register_entry<T: Serialize>(
        &mut self,
        name: &str,
        value: &T,
        broadcast: bool,
        constant: bool,
    ) -> Result<()> {
        if let Some(existing) = self.entries.get(name) {
            if existing.constant {
                return Ok(());
            }
        }
        let value = serde_json::to_value(value)
            .map_err(|e| RuntimeError::Checkpoint(format!("{}: {}", name, e)))?;
        self.entries.insert(
            name.to_string(),
            CheckpointEntry {
                value,
                broadcast,
                constant,
            },
        );
        Ok(())
    }

    /// Deserialize the entry stored under `name`.
    pub fn read_entry<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| RuntimeError::Checkpoint(format!("missing entry \"{}\"", name)))?;
        serde_json::from_value(entry.value.clone())
            .map_err(|e| RuntimeError::Checkpoint(format!("{}: {}", name, e)))
    }

    /// Whether `name` has been registered
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Write the registry into `dir`, creating it if needed.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .map_err(|e| RuntimeError::Checkpoint(format!("{}: {}", dir.display(), e)))?;
        let path = dir.join(CHECKPOINT_FILE);
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| RuntimeError::Checkpoint(e.to_string()))?;
        fs::write(&path, text)
            .map_err(|e| RuntimeError::Checkpoint(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), entries = self.entries.len(), "checkpoint written");
        Ok(())
    }

    /// Read a registry previously written with [`save`](Self::save).
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CHECKPOINT_FILE);
        let text = fs::read_to_string(&path)
            .map_err(|e| RuntimeError::Checkpoint(format!("{}: {}", path.display(), e)))?;
        let registry: Self = serde_json::from_str(&text)
            .map_err(|e| RuntimeError::Checkpoint(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), entries = registry.entries.len(), "checkpoint read");
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_read() {
        let mut cp = Checkpointer::new();
        cp.register_entry("conn_lastUpdateTime", &5.0f64, true, false).unwrap();
        assert_eq!(cp.read_entry::<f64>("conn_lastUpdateTime").unwrap(), 5.0);
        assert!(cp.read_entry::<f64>("missing").is_err());
    }

    #[test]
    fn test_constant_entries_are_not_rewritten() {
        let mut cp = Checkpointer::new();
        cp.register_entry("dims", &vec![1, 2], false, true).unwrap();
        cp.register_entry("dims", &vec![3, 4], false, true).unwrap();
        assert_eq!(cp.read_entry::<Vec<i32>>("dims").unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut cp = Checkpointer::new();
        cp.register_entry("a", &[1.5f32, 2.5], false, false).unwrap();
        cp.save(dir.path()).unwrap();
        let loaded = Checkpointer::load(dir.path()).unwrap();
        assert_eq!(loaded.read_entry::<Vec<f32>>("a").unwrap(), vec![1.5, 2.5]);
        assert_eq!(loaded.names().collect::<Vec<_>>(), vec!["a"]);
    }
}
