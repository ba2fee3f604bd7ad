use std::cmp::Ordering;
use serde::{Deserialize, Serialize};
use crate::core::{PartitionError, PartitionValue, PartitionValueKind, Result};

/// One partition boundary: a typed value plus the ordinal sort key it is
/// addressed by in operator requests and filegroup mappings.
///
/// Ordering is by value first, sort key as the tie-breaker, so a stored
/// boundary list sorted with [`PartitionBoundary::compare`] is exactly the
/// partition order the database sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionBoundary {
    sort_key: String,
    value: PartitionValue,
}

impl PartitionBoundary {
    /// # Errors
    /// Fails when the sort key is empty.
    pub fn new(sort_key: impl Into<String>, value: PartitionValue) -> Result<Self> {
        let sort_key = sort_key.into();
        if sort_key.trim().is_empty() {
            return Err(PartitionError::Validation(
                "boundary sort key must not be empty".into(),
            ));
        }
        Ok(Self { sort_key, value })
    }

    /// Boundary keyed by the value's own invariant text.
    pub fn from_value(value: PartitionValue) -> Self {
        Self {
            sort_key: value.invariant_text(),
            value,
        }
    }

    pub fn sort_key(&self) -> &str {
        &self.sort_key
    }

    pub fn value(&self) -> &PartitionValue {
        &self.value
    }

    pub fn compare(&self, other: &PartitionBoundary) -> Ordering {
        self.value
            .compare(&other.value)
            .then_with(|| self.sort_key.cmp(&other.sort_key))
    }
}

/// The column a table is partitioned on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionColumn {
    pub name: String,
    pub value_kind: PartitionValueKind,
    pub is_nullable: bool,
}

impl PartitionColumn {
    /// # Errors
    /// Fails when the column name is empty.
    pub fn new(
        name: impl Into<String>,
        value_kind: PartitionValueKind,
        is_nullable: bool,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PartitionError::Validation(
                "partition column name must not be empty".into(),
            ));
        }
        Ok(Self {
            name,
            value_kind,
            is_nullable,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_by_value_then_key() {
        let a = PartitionBoundary::new("b1", PartitionValue::Int32(10)).unwrap();
        let b = PartitionBoundary::new("b2", PartitionValue::Int32(20)).unwrap();
        assert_eq!(a.compare(&b), Ordering::Less);

        // Same value, ordinal key breaks the tie.
        let c = PartitionBoundary::new("alpha", PartitionValue::Int32(10)).unwrap();
        let d = PartitionBoundary::new("beta", PartitionValue::Int32(10)).unwrap();
        assert_eq!(c.compare(&d), Ordering::Less);
    }

    #[test]
    fn test_empty_sort_key_rejected() {
        assert!(PartitionBoundary::new("  ", PartitionValue::Int32(1)).is_err());
    }

    #[test]
    fn test_from_value_uses_invariant_text() {
        let b = PartitionBoundary::from_value(PartitionValue::Int64(500));
        assert_eq!(b.sort_key(), "500");
    }
}
