use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use crate::core::{PartitionError, Result};

/// Where partition data lands physically: one primary filegroup plus an
/// optional set of additional filegroups boundaries may be mapped onto.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionFilegroupStrategy {
    primary_filegroup: String,
    additional_filegroups: Vec<String>,
}

impl PartitionFilegroupStrategy {
    /// # Errors
    /// Fails when the primary filegroup name is empty.
    pub fn new(primary_filegroup: impl Into<String>) -> Result<Self> {
        let primary_filegroup = primary_filegroup.into();
        if primary_filegroup.trim().is_empty() {
            return Err(PartitionError::Validation(
                "primary filegroup must not be empty".into(),
            ));
        }
        Ok(Self {
            primary_filegroup,
            additional_filegroups: Vec::new(),
        })
    }

    pub fn primary_filegroup(&self) -> &str {
        &self.primary_filegroup
    }

    pub fn additional_filegroups(&self) -> &[String] {
        &self.additional_filegroups
    }

    /// Adds a filegroup if not already known; returns whether it was added.
    pub fn add_filegroup(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if name == self.primary_filegroup || self.additional_filegroups.contains(&name) {
            return false;
        }
        self.additional_filegroups.push(name);
        true
    }

    pub fn knows(&self, name: &str) -> bool {
        self.primary_filegroup == name || self.additional_filegroups.iter().any(|f| f == name)
    }
}

/// Boundary-key to filegroup assignments. At most one mapping per key;
/// unmapped keys resolve to the strategy's primary filegroup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionFilegroupMappings {
    by_boundary_key: BTreeMap<String, String>,
}

impl PartitionFilegroupMappings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert: a second assignment for the same key replaces the first.
    pub fn assign(&mut self, boundary_key: impl Into<String>, filegroup: impl Into<String>) {
        self.by_boundary_key
            .insert(boundary_key.into(), filegroup.into());
    }

    pub fn remove(&mut self, boundary_key: &str) -> Option<String> {
        self.by_boundary_key.remove(boundary_key)
    }

    pub fn get(&self, boundary_key: &str) -> Option<&str> {
        self.by_boundary_key.get(boundary_key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_boundary_key
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.by_boundary_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_filegroup_dedupes() {
        let mut strategy = PartitionFilegroupStrategy::new("PRIMARY").unwrap();
        assert!(strategy.add_filegroup("FG_ARCHIVE"));
        assert!(!strategy.add_filegroup("FG_ARCHIVE"));
        assert!(!strategy.add_filegroup("PRIMARY"));
        assert_eq!(strategy.additional_filegroups().len(), 1);
    }

    #[test]
    fn test_mapping_upsert() {
        let mut mappings = PartitionFilegroupMappings::new();
        mappings.assign("2024-01-01", "FG_A");
        mappings.assign("2024-01-01", "FG_B");
        assert_eq!(mappings.get("2024-01-01"), Some("FG_B"));
        assert_eq!(mappings.get("2024-02-01"), None);
    }
}
