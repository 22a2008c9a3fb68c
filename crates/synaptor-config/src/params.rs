// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Parameter groups
//!
//! A group is one `[[layer]]` or `[[connection]]` table. Every tunable is read
//! exactly once during setup with a typed lookup that takes a default and a
//! "warn if absent" flag. Keys that were never read are reported afterwards,
//! which catches misspelled parameters.

use std::collections::BTreeSet;
use std::fmt::Debug;

use tracing::warn;

use crate::{ConfigError, ConfigResult, SynaptorConfig};

/// Conversion from a TOML value into a parameter type.
pub trait ParamValue: Sized + Debug {
    fn from_toml(value: &toml::Value) -> Option<Self>;
    fn type_name() -> &'static str;
}

impl ParamValue for bool {
    fn from_toml(value: &toml::Value) -> Option<Self> {
        value.as_bool()
    }
    fn type_name() -> &'static str {
        "boolean"
    }
}

impl ParamValue for i64 {
    fn from_toml(value: &toml::Value) -> Option<Self> {
        value.as_integer()
    }
    fn type_name() -> &'static str {
        "integer"
    }
}

impl ParamValue for i32 {
    fn from_toml(value: &toml::Value) -> Option<Self> {
        value.as_integer().and_then(|v| i32::try_from(v).ok())
    }
    fn type_name() -> &'static str {
        "32-bit integer"
    }
}

impl ParamValue for usize {
    fn from_toml(value: &toml::Value) -> Option<Self> {
        value.as_integer().and_then(|v| usize::try_from(v).ok())
    }
    fn type_name() -> &'static str {
        "non-negative integer"
    }
}

impl ParamValue for f64 {
    fn from_toml(value: &toml::Value) -> Option<Self> {
        value
            .as_float()
            .or_else(|| value.as_integer().map(|v| v as f64))
    }
    fn type_name() -> &'static str {
        "number"
    }
}

impl ParamValue for f32 {
    fn from_toml(value: &toml::Value) -> Option<Self> {
        f64::from_toml(value).map(|v| v as f32)
    }
    fn type_name() -> &'static str {
        "number"
    }
}

impl ParamValue for String {
    fn from_toml(value: &toml::Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
    fn type_name() -> &'static str {
        "string"
    }
}

impl<T: ParamValue> ParamValue for Vec<T> {
    fn from_toml(value: &toml::Value) -> Option<Self> {
        value.as_array()?.iter().map(T::from_toml).collect()
    }
    fn type_name() -> &'static str {
        "array"
    }
}

/// One named parameter table.
#[derive(Debug, Clone)]
pub struct ParamGroup {
    kind: String,
    name: String,
    table: toml::Table,
    read: BTreeSet<String>,
}

impl ParamGroup {
    /// Wrap a table. The table must carry a string `name`.
    pub fn new(kind: &str, table: toml::Table) -> ConfigResult<Self> {
        let name = table
            .get("name")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| ConfigError::MissingRequired {
                group: kind.to_string(),
                key: "name".to_string(),
            })?;
        let mut read = BTreeSet::new();
        read.insert("name".to_string());
        Ok(Self {
            kind: kind.to_string(),
            name,
            table,
            read,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn contains(&self, key: &str) -> bool {
        self.table.contains_key(key)
    }

    fn mark_read(&mut self, key: &str) {
        if !self.read.insert(key.to_string()) {
            warn!(group = %self.name, key, "parameter read more than once");
        }
    }

    fn convert<T: ParamValue>(&self, key: &str, value: &toml::Value) -> ConfigResult<T> {
        T::from_toml(value).ok_or_else(|| ConfigError::InvalidValue {
            group: self.name.clone(),
            key: key.to_string(),
            reason: format!("expected {}, found {}", T::type_name(), value.type_str()),
        })
    }

    /// Typed lookup with a default.
    pub fn read<T: ParamValue>(&mut self, key: &str, default: T, warn_if_absent: bool) -> ConfigResult<T> {
        self.mark_read(key);
        match self.table.get(key) {
            Some(value) => self.convert(key, value),
            None => {
                if warn_if_absent {
                    warn!(
                        group = %self.name,
                        key,
                        default = ?default,
                        "parameter not set, using default"
                    );
                }
                Ok(default)
            }
        }
    }

    /// Typed lookup without a default.
    pub fn read_optional<T: ParamValue>(&mut self, key: &str) -> ConfigResult<Option<T>> {
        self.mark_read(key);
        self.table
            .get(key)
            .map(|value| self.convert(key, value))
            .transpose()
    }

    /// Typed lookup of a key that must be present.
    pub fn require<T: ParamValue>(&mut self, key: &str) -> ConfigResult<T> {
        self.read_optional(key)?
            .ok_or_else(|| ConfigError::MissingRequired {
                group: self.name.clone(),
                key: key.to_string(),
            })
    }

    /// Keys present in the table that no lookup touched.
    pub fn unread_keys(&self) -> Vec<String> {
        self.table
            .keys()
            .filter(|k| !self.read.contains(k.as_str()))
            .cloned()
            .collect()
    }

    /// End of setup for this group: report unread keys.
    pub fn finish(self) -> Vec<String> {
        let unread = self.unread_keys();
        for key in &unread {
            warn!(group = %self.name, kind = %self.kind, key = %key, "parameter was never read");
        }
        unread
    }
}

impl SynaptorConfig {
    /// One group per `[[layer]]` table, in file order.
    pub fn layer_groups(&self) -> ConfigResult<Vec<ParamGroup>> {
        self.layers
            .iter()
            .map(|t| ParamGroup::new("layer", t.clone()))
            .collect()
    }

    /// One group per `[[connection]]` table, in file order.
    pub fn connection_groups(&self) -> ConfigResult<Vec<ParamGroup>> {
        self.connections
            .iter()
            .map(|t| ParamGroup::new("connection", t.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_group() -> ParamGroup {
        let table: toml::Table = toml::from_str(
            r#"
            name = "V1ToV2"
            nxp = 5
            strength = 2
            delays = [0, 2]
            typo_key = true
            "#,
        )
        .unwrap();
        ParamGroup::new("connection", table).unwrap()
    }

    #[test]
    fn test_typed_reads() {
        let mut g = create_test_group();
        assert_eq!(g.name(), "V1ToV2");
        assert_eq!(g.read::<usize>("nxp", 1, true).unwrap(), 5);
        assert_eq!(g.read::<f64>("strength", 1.0, false).unwrap(), 2.0);
        assert_eq!(g.read::<Vec<usize>>("delays", vec![0], false).unwrap(), vec![0, 2]);
        assert_eq!(g.read::<usize>("nyp", 3, false).unwrap(), 3);
    }

    #[test]
    fn test_wrong_type_is_an_error() {
        let mut g = create_test_group();
        let err = g.read::<String>("nxp", String::new(), false).unwrap_err();
        assert!(err.to_string().contains("V1ToV2.nxp"));
    }

    #[test]
    fn test_require_and_unread() {
        let mut g = create_test_group();
        assert!(g.require::<String>("pre").is_err());
        g.read::<usize>("nxp", 1, false).unwrap();
        let mut unread = g.unread_keys();
        unread.sort();
        assert_eq!(unread, vec!["delays", "strength", "typo_key"]);
    }

    #[test]
    fn test_group_requires_name() {
        let table: toml::Table = toml::from_str("nxp = 3").unwrap();
        assert!(ParamGroup::new("layer", table).is_err());
    }
}
