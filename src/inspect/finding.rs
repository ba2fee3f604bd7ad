use serde::{Deserialize, Serialize};

/// Everything a proposed SWITCH needs to know about where data moves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchContext {
    pub source_boundary_key: String,
    pub target_schema: String,
    pub target_table: String,
    pub source_database: Option<String>,
    pub target_database: Option<String>,
    pub create_staging_table: bool,
}

/// A finding that must be resolved before the switch may run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingIssue {
    pub code: String,
    pub message: String,
    pub recommendation: Option<String>,
}

/// A finding worth telling the operator about; does not stop execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionWarning {
    pub code: String,
    pub message: String,
    pub recommendation: Option<String>,
}

/// A remediation the system can run on the operator's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoFixStep {
    pub code: String,
    pub description: String,
    pub recommendation: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FixCategory {
    CreateTargetTable,
    SyncPartitionObjects,
    SyncIndexes,
    SyncConstraints,
    RefreshStatistics,
    CleanupResidualData,
    Other,
}

/// One category of the remediation plan with its concrete commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixPlanGroup {
    pub category: FixCategory,
    pub step_codes: Vec<String>,
    pub commands: Vec<String>,
    pub impact_scope: String,
    pub prerequisite: Option<String>,
    pub needs_exclusive_lock: bool,
}

/// Point-in-time look at one side of the switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub schema: String,
    pub table: String,
    pub exists: bool,
    pub row_count: u64,
    pub columns: Vec<String>,
}

/// Full result of a switch-readiness inspection. Read-only: producing this
/// never changes anything on the data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchInspection {
    pub can_switch: bool,
    pub blocking_issues: Vec<BlockingIssue>,
    pub warnings: Vec<InspectionWarning>,
    pub auto_fix_steps: Vec<AutoFixStep>,
    pub source_snapshot: TableSnapshot,
    pub target_snapshot: TableSnapshot,
    pub plan: Vec<FixPlanGroup>,
}

impl SwitchInspection {
    pub fn blocking_summary(&self) -> String {
        self.blocking_issues
            .iter()
            .map(|issue| issue.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Outcome of running one selected auto-fix step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoFixStepResult {
    pub code: String,
    pub succeeded: bool,
    pub message: String,
    pub script: String,
    pub elapsed_ms: u64,
}

/// Outcome of an auto-fix run over the selected step codes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoFixOutcome {
    pub all_succeeded: bool,
    pub steps: Vec<AutoFixStepResult>,
    pub log: String,
}
