// ============================================================================
// PartitionConfiguration aggregate
// ============================================================================
//
// One configuration per (data source, schema, table). Holds the ordered
// boundary list, filegroup placement and safety policy for that table, and
// guards every mutation so the stored scheme can never drift out of the
// strictly-ascending order the database's partition function requires.
//
// Expected business-rule violations come back as Err values with operator
// display text; only programmer errors (cross-kind value comparison) panic.
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::config::filegroup::{PartitionFilegroupMappings, PartitionFilegroupStrategy};
use crate::config::safety::{PartitionRetentionPolicy, PartitionSafetyRule, TargetTableDescriptor};
use crate::config::storage::{validate_identifier, PartitionStorageSettings};
use crate::core::{PartitionBoundary, PartitionColumn, PartitionError, PartitionValue, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionConfiguration {
    id: Uuid,
    data_source_id: Uuid,
    schema: String,
    table: String,
    function_name: String,
    scheme_name: String,
    column: PartitionColumn,
    filegroup_strategy: PartitionFilegroupStrategy,
    storage_settings: PartitionStorageSettings,
    /// RANGE RIGHT: a boundary value belongs to the partition above it.
    is_range_right: bool,
    /// Always kept strictly ascending in storage order.
    boundaries: Vec<PartitionBoundary>,
    filegroup_mappings: PartitionFilegroupMappings,
    safety_rule: Option<PartitionSafetyRule>,
    retention_policy: Option<PartitionRetentionPolicy>,
    /// Set after the first successful execution; freezes structural fields.
    is_committed: bool,
    target_table: Option<TargetTableDescriptor>,
    last_execution_task_id: Option<Uuid>,
    is_deleted: bool,
    created_at_utc: DateTime<Utc>,
    updated_at_utc: DateTime<Utc>,
    updated_by: String,
}

impl PartitionConfiguration {
    /// Creates a configuration with an initial boundary set.
    ///
    /// # Errors
    /// Fails on malformed identifiers, an empty boundary list, boundaries of
    /// the wrong kind, or a boundary set that is not strictly ascending.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        data_source_id: Uuid,
        schema: impl Into<String>,
        table: impl Into<String>,
        function_name: impl Into<String>,
        scheme_name: impl Into<String>,
        column: PartitionColumn,
        filegroup_strategy: PartitionFilegroupStrategy,
        storage_settings: PartitionStorageSettings,
        is_range_right: bool,
        initial_boundaries: Vec<PartitionValue>,
        created_by: impl Into<String>,
    ) -> Result<Self> {
        let schema = schema.into();
        let table = table.into();
        let function_name = function_name.into();
        let scheme_name = scheme_name.into();
        validate_identifier("schema", &schema)?;
        validate_identifier("table", &table)?;
        validate_identifier("partition function", &function_name)?;
        validate_identifier("partition scheme", &scheme_name)?;

        let now = Utc::now();
        let mut config = Self {
            id: Uuid::new_v4(),
            data_source_id,
            schema,
            table,
            function_name,
            scheme_name,
            column,
            filegroup_strategy,
            storage_settings,
            is_range_right,
            boundaries: Vec::new(),
            filegroup_mappings: PartitionFilegroupMappings::new(),
            safety_rule: None,
            retention_policy: None,
            is_committed: false,
            target_table: None,
            last_execution_task_id: None,
            is_deleted: false,
            created_at_utc: now,
            updated_at_utc: now,
            updated_by: created_by.into(),
        };
        config.install_boundaries(initial_boundaries)?;
        Ok(config)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn data_source_id(&self) -> Uuid {
        self.data_source_id
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn qualified_table(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub fn scheme_name(&self) -> &str {
        &self.scheme_name
    }

    pub fn column(&self) -> &PartitionColumn {
        &self.column
    }

    pub fn filegroup_strategy(&self) -> &PartitionFilegroupStrategy {
        &self.filegroup_strategy
    }

    pub fn storage_settings(&self) -> &PartitionStorageSettings {
        &self.storage_settings
    }

    pub fn is_range_right(&self) -> bool {
        self.is_range_right
    }

    pub fn boundaries(&self) -> &[PartitionBoundary] {
        &self.boundaries
    }

    pub fn filegroup_mappings(&self) -> &PartitionFilegroupMappings {
        &self.filegroup_mappings
    }

    pub fn safety_rule(&self) -> Option<&PartitionSafetyRule> {
        self.safety_rule.as_ref()
    }

    pub fn retention_policy(&self) -> Option<PartitionRetentionPolicy> {
        self.retention_policy
    }

    pub fn is_committed(&self) -> bool {
        self.is_committed
    }

    pub fn target_table(&self) -> Option<&TargetTableDescriptor> {
        self.target_table.as_ref()
    }

    pub fn last_execution_task_id(&self) -> Option<Uuid> {
        self.last_execution_task_id
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    pub fn updated_at_utc(&self) -> DateTime<Utc> {
        self.updated_at_utc
    }

    pub fn max_boundary(&self) -> Option<&PartitionBoundary> {
        self.boundaries.last()
    }

    pub fn min_boundary(&self) -> Option<&PartitionBoundary> {
        self.boundaries.first()
    }

    /// Finds a boundary by its sort key.
    ///
    /// # Errors
    /// Fails with the operator-facing lookup message when no boundary has
    /// that key.
    pub fn find_boundary(&self, sort_key: &str) -> Result<&PartitionBoundary> {
        self.boundaries
            .iter()
            .find(|b| b.sort_key() == sort_key)
            .ok_or_else(|| PartitionError::Validation(format!("未找到分区边界 {}", sort_key)))
    }

    pub fn has_boundary(&self, sort_key: &str) -> bool {
        self.boundaries.iter().any(|b| b.sort_key() == sort_key)
    }

    // ------------------------------------------------------------------
    // Boundary operations
    // ------------------------------------------------------------------

    /// Adds one boundary at the growing end of the range.
    ///
    /// Incremental adds must extend the range in the direction the function
    /// grows: strictly greater than the current maximum for RANGE RIGHT,
    /// strictly less than the current minimum for RANGE LEFT. Use
    /// [`Self::replace_boundaries`] to rewrite the set wholesale.
    ///
    /// # Errors
    /// Fails on kind mismatch, duplicate sort key, or a value inside the
    /// existing range.
    pub fn try_add_boundary(&mut self, boundary: PartitionBoundary) -> Result<()> {
        self.check_kind(boundary.value())?;

        if self.has_boundary(boundary.sort_key()) {
            return Err(PartitionError::Invariant(format!(
                "boundary sort key '{}' already exists",
                boundary.sort_key()
            )));
        }

        if self.is_range_right {
            if let Some(max) = self.max_boundary() {
                if boundary.value().compare(max.value()) != Ordering::Greater {
                    return Err(PartitionError::Validation(format!(
                        "boundary value {} must be greater than current max {}",
                        boundary.value(),
                        max.value()
                    )));
                }
            }
        } else if let Some(min) = self.min_boundary() {
            if boundary.value().compare(min.value()) != Ordering::Less {
                return Err(PartitionError::Validation(format!(
                    "boundary value {} must be less than current min {}",
                    boundary.value(),
                    min.value()
                )));
            }
        }

        // Insert then re-sort so the stored order stays correct even if the
        // guard above is ever loosened.
        self.boundaries.push(boundary);
        self.boundaries.sort_by(|a, b| a.compare(b));
        self.touch();
        Ok(())
    }

    /// Removes the boundary addressed by `sort_key`.
    ///
    /// # Errors
    /// Fails when the key is unknown or when removal would leave the
    /// configuration without any boundary.
    pub fn try_remove_boundary(&mut self, sort_key: &str) -> Result<PartitionBoundary> {
        let index = self
            .boundaries
            .iter()
            .position(|b| b.sort_key() == sort_key)
            .ok_or_else(|| PartitionError::Validation("未找到指定的分区边界。".into()))?;
        if self.boundaries.len() == 1 {
            return Err(PartitionError::Invariant(
                "at least one boundary must remain; cannot remove the last one".into(),
            ));
        }
        let removed = self.boundaries.remove(index);
        self.filegroup_mappings.remove(sort_key);
        self.touch();
        Ok(removed)
    }

    /// Replaces the whole boundary set.
    ///
    /// Values are deduplicated on their invariant text, sorted, and the
    /// resulting sequence re-validated for strict ascent; the incremental
    /// extend-the-range rule does not apply here.
    ///
    /// # Errors
    /// Fails on an empty list or wrong-kind values.
    pub fn replace_boundaries(&mut self, values: Vec<PartitionValue>) -> Result<()> {
        self.install_boundaries(values)?;
        self.touch();
        Ok(())
    }

    fn install_boundaries(&mut self, values: Vec<PartitionValue>) -> Result<()> {
        if values.is_empty() {
            return Err(PartitionError::Validation(
                "at least one partition boundary is required".into(),
            ));
        }
        for value in &values {
            self.check_kind(value)?;
        }

        let mut seen_keys = BTreeSet::new();
        let mut boundaries: Vec<PartitionBoundary> = Vec::with_capacity(values.len());
        for value in values {
            let boundary = PartitionBoundary::from_value(value);
            // Duplicates-after-formatting collapse to one boundary.
            if seen_keys.insert(boundary.sort_key().to_string()) {
                boundaries.push(boundary);
            }
        }
        boundaries.sort_by(|a, b| a.compare(b));

        // sort + dedupe already guarantee strict ascent; verify anyway since
        // this list is what the partition function will be built from.
        for pair in boundaries.windows(2) {
            if pair[0].value().compare(pair[1].value()) != Ordering::Less {
                return Err(PartitionError::Invariant(format!(
                    "boundaries must be strictly ascending: {} is not below {}",
                    pair[0].value(),
                    pair[1].value()
                )));
            }
        }

        let retained: Vec<String> = boundaries.iter().map(|b| b.sort_key().to_string()).collect();
        let mut mappings = PartitionFilegroupMappings::new();
        for (key, filegroup) in self.filegroup_mappings.iter() {
            if retained.iter().any(|k| k == key) {
                mappings.assign(key, filegroup);
            }
        }

        self.boundaries = boundaries;
        self.filegroup_mappings = mappings;
        Ok(())
    }

    fn check_kind(&self, value: &PartitionValue) -> Result<()> {
        if value.kind() != self.column.value_kind {
            return Err(PartitionError::Validation(format!(
                "boundary value kind {} does not match partition column kind {}",
                value.kind(),
                self.column.value_kind
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Filegroup operations
    // ------------------------------------------------------------------

    /// Assigns (upserts) a filegroup for a boundary key and registers the
    /// filegroup with the strategy.
    ///
    /// # Errors
    /// Fails when the boundary key is unknown or the name is empty.
    pub fn try_assign_filegroup(
        &mut self,
        boundary_key: &str,
        filegroup: impl Into<String>,
    ) -> Result<()> {
        let filegroup = filegroup.into();
        if filegroup.trim().is_empty() {
            return Err(PartitionError::Validation(
                "filegroup name must not be empty".into(),
            ));
        }
        self.find_boundary(boundary_key)?;
        self.filegroup_strategy.add_filegroup(filegroup.clone());
        self.filegroup_mappings.assign(boundary_key, filegroup);
        self.touch();
        Ok(())
    }

    /// Filegroup a boundary's partition lands on; unmapped keys fall back to
    /// the strategy's primary filegroup.
    pub fn resolve_filegroup(&self, boundary_key: &str) -> &str {
        self.filegroup_mappings
            .get(boundary_key)
            .unwrap_or_else(|| self.filegroup_strategy.primary_filegroup())
    }

    // ------------------------------------------------------------------
    // Policy & lifecycle
    // ------------------------------------------------------------------

    pub fn update_safety_rule(&mut self, rule: PartitionSafetyRule) {
        self.safety_rule = Some(rule);
        self.touch();
    }

    pub fn clear_safety_rule(&mut self) {
        self.safety_rule = None;
        self.touch();
    }

    pub fn set_retention_policy(&mut self, policy: Option<PartitionRetentionPolicy>) {
        self.retention_policy = policy;
        self.touch();
    }

    /// Changes the storage settings. Frozen once committed.
    pub fn update_storage_settings(&mut self, settings: PartitionStorageSettings) -> Result<()> {
        self.ensure_not_committed("storage settings")?;
        self.storage_settings = settings;
        self.touch();
        Ok(())
    }

    /// Changes the switch / backup target table. Frozen once committed.
    pub fn update_target_table(&mut self, target: Option<TargetTableDescriptor>) -> Result<()> {
        self.ensure_not_committed("target table")?;
        self.target_table = target;
        self.touch();
        Ok(())
    }

    /// Changes the partition column. Frozen once committed.
    pub fn update_column(&mut self, column: PartitionColumn) -> Result<()> {
        self.ensure_not_committed("partition column")?;
        if column.value_kind != self.column.value_kind && !self.boundaries.is_empty() {
            return Err(PartitionError::Invariant(
                "cannot change the column kind while boundaries exist".into(),
            ));
        }
        self.column = column;
        self.touch();
        Ok(())
    }

    /// Marks the scheme as applied to the live table. Afterwards the table
    /// wiring / storage / column fields are read-only and boundary operations
    /// are the only sanctioned way to evolve the scheme.
    pub fn mark_committed(&mut self, by: impl Into<String>) {
        self.is_committed = true;
        self.updated_by = by.into();
        self.updated_at_utc = Utc::now();
    }

    pub fn record_execution_task(&mut self, task_id: Uuid) {
        self.last_execution_task_id = Some(task_id);
        self.touch();
    }

    /// Configurations are never hard-deleted.
    pub fn soft_delete(&mut self, by: impl Into<String>) {
        self.is_deleted = true;
        self.updated_by = by.into();
        self.updated_at_utc = Utc::now();
    }

    pub fn set_updated_by(&mut self, by: impl Into<String>) {
        self.updated_by = by.into();
    }

    /// Point-in-time JSON of the whole aggregate, stored on tasks for
    /// failure forensics.
    pub fn snapshot_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    fn ensure_not_committed(&self, field: &str) -> Result<()> {
        if self.is_committed {
            return Err(PartitionError::Invariant(format!(
                "configuration is committed; {} is read-only",
                field
            )));
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at_utc = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PartitionValueKind;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> PartitionValue {
        PartitionValue::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    fn date_config() -> PartitionConfiguration {
        PartitionConfiguration::new(
            Uuid::new_v4(),
            "dbo",
            "orders",
            "pf_orders",
            "ps_orders",
            PartitionColumn::new("order_date", PartitionValueKind::Date, false).unwrap(),
            PartitionFilegroupStrategy::new("PRIMARY").unwrap(),
            PartitionStorageSettings::UsePrimaryFilegroup,
            true,
            vec![date(2024, 1, 1)],
            "tester",
        )
        .unwrap()
    }

    fn int_config(range_right: bool, values: Vec<i32>) -> PartitionConfiguration {
        PartitionConfiguration::new(
            Uuid::new_v4(),
            "dbo",
            "events",
            "pf_events",
            "ps_events",
            PartitionColumn::new("bucket", PartitionValueKind::Int32, false).unwrap(),
            PartitionFilegroupStrategy::new("PRIMARY").unwrap(),
            PartitionStorageSettings::UsePrimaryFilegroup,
            range_right,
            values.into_iter().map(PartitionValue::Int32).collect(),
            "tester",
        )
        .unwrap()
    }

    #[test]
    fn test_add_beyond_max_succeeds_range_right() {
        let mut config = date_config();
        config
            .try_add_boundary(PartitionBoundary::from_value(date(2024, 1, 5)))
            .unwrap();
        let keys: Vec<&str> = config.boundaries().iter().map(|b| b.sort_key()).collect();
        assert_eq!(keys, vec!["2024-01-01", "2024-01-05"]);
    }

    #[test]
    fn test_add_below_max_fails_range_right() {
        let mut config = int_config(true, vec![10]);
        let err = config
            .try_add_boundary(PartitionBoundary::from_value(PartitionValue::Int32(8)))
            .unwrap_err();
        assert!(err.to_string().contains("must be greater than current max"));
    }

    #[test]
    fn test_add_equal_to_max_fails() {
        let mut config = int_config(true, vec![10]);
        assert!(config
            .try_add_boundary(PartitionBoundary::from_value(PartitionValue::Int32(10)))
            .is_err());
    }

    #[test]
    fn test_range_left_grows_downward() {
        let mut config = int_config(false, vec![100]);
        config
            .try_add_boundary(PartitionBoundary::from_value(PartitionValue::Int32(50)))
            .unwrap();
        let err = config
            .try_add_boundary(PartitionBoundary::from_value(PartitionValue::Int32(75)))
            .unwrap_err();
        assert!(err.to_string().contains("must be less than current min"));
    }

    #[test]
    fn test_duplicate_sort_key_rejected() {
        let mut config = int_config(true, vec![10]);
        let dup = PartitionBoundary::new("10", PartitionValue::Int32(20)).unwrap();
        assert!(config.try_add_boundary(dup).is_err());
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let mut config = int_config(true, vec![10]);
        assert!(config
            .try_add_boundary(PartitionBoundary::from_value(PartitionValue::Int64(99)))
            .is_err());
    }

    #[test]
    fn test_cannot_remove_last_boundary() {
        let mut config = int_config(true, vec![10]);
        assert!(config.try_remove_boundary("10").is_err());
    }

    #[test]
    fn test_remove_drops_mapping() {
        let mut config = int_config(true, vec![10, 20]);
        config.try_assign_filegroup("20", "FG_HOT").unwrap();
        config.try_remove_boundary("20").unwrap();
        assert_eq!(config.resolve_filegroup("20"), "PRIMARY");
        assert_eq!(config.boundaries().len(), 1);
    }

    #[test]
    fn test_remove_unknown_boundary_message() {
        let mut config = int_config(true, vec![10, 20]);
        let err = config.try_remove_boundary("30").unwrap_err();
        assert_eq!(err.to_string(), "未找到指定的分区边界。");
    }

    #[test]
    fn test_replace_sorts_and_dedupes() {
        let mut config = int_config(true, vec![10]);
        config
            .replace_boundaries(vec![
                PartitionValue::Int32(30),
                PartitionValue::Int32(10),
                PartitionValue::Int32(30),
                PartitionValue::Int32(20),
            ])
            .unwrap();
        let keys: Vec<&str> = config.boundaries().iter().map(|b| b.sort_key()).collect();
        assert_eq!(keys, vec!["10", "20", "30"]);
    }

    #[test]
    fn test_replace_allows_values_inside_old_range() {
        // Replace-all is exempt from the extend-the-range rule.
        let mut config = int_config(true, vec![10, 100]);
        config
            .replace_boundaries(vec![PartitionValue::Int32(50)])
            .unwrap();
        assert_eq!(config.boundaries().len(), 1);
    }

    #[test]
    fn test_replace_empty_fails() {
        let mut config = int_config(true, vec![10]);
        assert!(config.replace_boundaries(vec![]).is_err());
    }

    #[test]
    fn test_resolve_filegroup_falls_back_to_primary() {
        let mut config = date_config();
        config
            .try_add_boundary(PartitionBoundary::from_value(date(2024, 1, 5)))
            .unwrap();
        config.try_assign_filegroup("2024-01-05", "FG_ARCHIVE").unwrap();
        assert_eq!(config.resolve_filegroup("2024-01-05"), "FG_ARCHIVE");
        assert_eq!(config.resolve_filegroup("2024-01-01"), "PRIMARY");
    }

    #[test]
    fn test_assign_filegroup_unknown_boundary() {
        let mut config = date_config();
        let err = config.try_assign_filegroup("2030-01-01", "FG_X").unwrap_err();
        assert!(err.to_string().contains("未找到分区边界 2030-01-01"));
    }

    #[test]
    fn test_committed_freezes_structure_but_not_boundaries() {
        let mut config = date_config();
        config.mark_committed("tester");
        assert!(config
            .update_storage_settings(PartitionStorageSettings::UsePrimaryFilegroup)
            .is_err());
        assert!(config.update_target_table(None).is_err());
        // Boundary operations stay available after commit.
        assert!(config
            .try_add_boundary(PartitionBoundary::from_value(date(2024, 2, 1)))
            .is_ok());
    }

    #[test]
    fn test_bad_identifiers_rejected_at_construction() {
        let result = PartitionConfiguration::new(
            Uuid::new_v4(),
            "dbo",
            "bad table",
            "pf",
            "ps",
            PartitionColumn::new("c", PartitionValueKind::Int32, false).unwrap(),
            PartitionFilegroupStrategy::new("PRIMARY").unwrap(),
            PartitionStorageSettings::UsePrimaryFilegroup,
            true,
            vec![PartitionValue::Int32(1)],
            "tester",
        );
        assert!(result.is_err());
    }
}
