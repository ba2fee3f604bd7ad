use serde::{Deserialize, Serialize};

/// Lock mode an operation is allowed to take while running against the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockMode {
    Shared,
    SchemaModification,
    Exclusive,
}

/// Operator-set guard rails evaluated before a structural change runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSafetyRule {
    /// Merge / switch only while the affected partition holds no rows.
    pub requires_empty_partition: bool,
    pub allowed_lock_modes: Vec<LockMode>,
    /// Free-text hint like "weeknights 01:00-05:00"; advisory, surfaced as a
    /// risk note rather than enforced.
    pub execution_window_hint: Option<String>,
    pub additional_warnings: Vec<String>,
}

impl PartitionSafetyRule {
    pub fn allows_lock(&self, mode: LockMode) -> bool {
        self.allowed_lock_modes.is_empty() || self.allowed_lock_modes.contains(&mode)
    }
}

/// How long partition data is kept before it becomes eligible for archival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionRetentionPolicy {
    pub keep_partitions: u32,
}

/// Switch / backup destination for this table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetTableDescriptor {
    pub schema: String,
    pub table: String,
    pub database: Option<String>,
}
