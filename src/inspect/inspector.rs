// ============================================================================
// Switch-readiness inspection
// ============================================================================
//
// Read-only analysis of a proposed SWITCH. Walks a fixed check list against
// the live source/target structure, collecting blocking issues (must be
// resolved), warnings (operator information) and auto-fix steps the system
// can execute. Blocking issues with an auto-fix stay blocking until the fix
// has actually run.
// ============================================================================

use std::sync::Arc;
use uuid::Uuid;

use crate::config::{LockMode, PartitionConfiguration};
use crate::core::Result;
use crate::inspect::finding::{
    AutoFixStep, BlockingIssue, FixCategory, FixPlanGroup, InspectionWarning, SwitchContext,
    SwitchInspection, TableSnapshot,
};
use crate::repository::{TableFacts, TableMetadataReader};

pub struct SwitchInspector {
    metadata: Arc<dyn TableMetadataReader>,
}

struct InspectionBuilder {
    blocking: Vec<BlockingIssue>,
    warnings: Vec<InspectionWarning>,
    fixes: Vec<(FixCategory, AutoFixStep, String, bool, Option<String>)>,
}

impl InspectionBuilder {
    fn new() -> Self {
        Self {
            blocking: Vec::new(),
            warnings: Vec::new(),
            fixes: Vec::new(),
        }
    }

    fn block(&mut self, code: &str, message: String, recommendation: Option<&str>) {
        self.blocking.push(BlockingIssue {
            code: code.to_string(),
            message,
            recommendation: recommendation.map(str::to_string),
        });
    }

    fn warn(&mut self, code: &str, message: String, recommendation: Option<&str>) {
        self.warnings.push(InspectionWarning {
            code: code.to_string(),
            message,
            recommendation: recommendation.map(str::to_string),
        });
    }

    fn fix(
        &mut self,
        category: FixCategory,
        code: &str,
        description: String,
        command: String,
        needs_exclusive_lock: bool,
        prerequisite: Option<&str>,
    ) {
        self.fixes.push((
            category,
            AutoFixStep {
                code: code.to_string(),
                description,
                recommendation: None,
            },
            command,
            needs_exclusive_lock,
            prerequisite.map(str::to_string),
        ));
    }
}

impl SwitchInspector {
    pub fn new(metadata: Arc<dyn TableMetadataReader>) -> Self {
        Self { metadata }
    }

    pub async fn inspect(
        &self,
        data_source_id: Uuid,
        config: &PartitionConfiguration,
        context: &SwitchContext,
    ) -> Result<SwitchInspection> {
        let source = self
            .metadata
            .table_facts(
                data_source_id,
                context.source_database.as_deref(),
                config.schema(),
                config.table(),
            )
            .await?;
        let target = self
            .metadata
            .table_facts(
                data_source_id,
                context.target_database.as_deref(),
                &context.target_schema,
                &context.target_table,
            )
            .await?;

        let mut b = InspectionBuilder::new();

        self.check_boundary(config, context, data_source_id, &mut b).await?;
        self.check_source(config, &source, &mut b);
        self.check_target(config, context, &source, &target, &mut b);
        self.check_policy(config, context, &mut b);

        let plan = build_plan(&b.fixes);
        let auto_fix_steps = b.fixes.iter().map(|(_, step, ..)| step.clone()).collect();

        Ok(SwitchInspection {
            can_switch: b.blocking.is_empty(),
            blocking_issues: b.blocking,
            warnings: b.warnings,
            auto_fix_steps,
            source_snapshot: snapshot(config.schema(), config.table(), &source),
            target_snapshot: snapshot(&context.target_schema, &context.target_table, &target),
            plan,
        })
    }

    async fn check_boundary(
        &self,
        config: &PartitionConfiguration,
        context: &SwitchContext,
        data_source_id: Uuid,
        b: &mut InspectionBuilder,
    ) -> Result<()> {
        if !config.has_boundary(&context.source_boundary_key) {
            b.block(
                "BOUNDARY_NOT_FOUND",
                format!("未找到分区边界 {}", context.source_boundary_key),
                Some("verify the boundary key against the configuration"),
            );
            return Ok(());
        }

        if let Some(rule) = config.safety_rule() {
            if rule.requires_empty_partition {
                let rows = self
                    .metadata
                    .partition_row_count(
                        data_source_id,
                        config.schema(),
                        config.table(),
                        &context.source_boundary_key,
                    )
                    .await?;
                if rows > 0 {
                    b.block(
                        "SOURCE_PARTITION_NOT_EMPTY",
                        format!(
                            "safety rule requires an empty partition but {} holds {} rows",
                            context.source_boundary_key, rows
                        ),
                        Some("archive or move the rows before switching"),
                    );
                }
            }
        }
        Ok(())
    }

    fn check_source(
        &self,
        config: &PartitionConfiguration,
        source: &TableFacts,
        b: &mut InspectionBuilder,
    ) {
        if !source.exists {
            b.block(
                "SOURCE_MISSING",
                format!("source table {} does not exist", config.qualified_table()),
                None,
            );
            return;
        }
        if !source.has_clustered_index {
            b.block(
                "MISSING_CLUSTERED_INDEX",
                format!(
                    "source table {} has no clustered index; SWITCH requires one",
                    config.qualified_table()
                ),
                Some("create a clustered index aligned with the partition scheme"),
            );
        }
        if !source.is_partitioned {
            b.block(
                "SOURCE_NOT_PARTITIONED",
                format!("source table {} is not partitioned", config.qualified_table()),
                None,
            );
        }
    }

    fn check_target(
        &self,
        config: &PartitionConfiguration,
        context: &SwitchContext,
        source: &TableFacts,
        target: &TableFacts,
        b: &mut InspectionBuilder,
    ) {
        let target_name = format!("{}.{}", context.target_schema, context.target_table);

        if !target.exists {
            b.block(
                "TARGET_MISSING",
                format!("target table {} does not exist", target_name),
                Some("create the target with the same structure as the source"),
            );
            if context.create_staging_table {
                b.fix(
                    FixCategory::CreateTargetTable,
                    "CREATE_TARGET_TABLE",
                    format!("create staging table {} mirroring the source structure", target_name),
                    format!(
                        "SELECT * INTO [{}].[{}] FROM [{}].[{}] WHERE 1 = 0;",
                        context.target_schema,
                        context.target_table,
                        config.schema(),
                        config.table()
                    ),
                    false,
                    None,
                );
            }
            return;
        }

        let source_columns: Vec<&str> = source.columns.iter().map(|c| c.name.as_str()).collect();
        let mismatched = source.columns.len() != target.columns.len()
            || source.columns.iter().zip(&target.columns).any(|(s, t)| {
                s.name != t.name || s.data_type != t.data_type || s.is_nullable != t.is_nullable
            });
        if mismatched {
            b.block(
                "COLUMN_MISMATCH",
                format!(
                    "target table {} does not match the source column layout ({} columns expected)",
                    target_name,
                    source_columns.len()
                ),
                Some("rebuild the target with identical columns, types and nullability"),
            );
        }

        if !target.foreign_keys.is_empty() {
            b.block(
                "FOREIGN_KEY_CROSSES_BOUNDARY",
                format!(
                    "foreign keys cross the switch boundary on {}: {}",
                    target_name,
                    target.foreign_keys.join(", ")
                ),
                Some("drop or disable the foreign keys before switching"),
            );
        }

        if target.row_count > 0 {
            b.block(
                "TARGET_NOT_EMPTY",
                format!("target table {} holds {} rows", target_name, target.row_count),
                Some("switch targets must be empty"),
            );
            b.fix(
                FixCategory::CleanupResidualData,
                "CLEANUP_RESIDUAL_DATA",
                format!("truncate residual rows in {}", target_name),
                format!(
                    "TRUNCATE TABLE [{}].[{}];",
                    context.target_schema, context.target_table
                ),
                true,
                Some("confirm the rows are disposable"),
            );
            if let Some(rule) = config.safety_rule() {
                if !rule.allows_lock(LockMode::Exclusive) {
                    b.warn(
                        "LOCK_MODE_RESTRICTED",
                        format!(
                            "cleaning up {} takes an exclusive lock, which the safety rule does not allow",
                            target_name
                        ),
                        Some("extend the allowed lock modes or clean the target manually"),
                    );
                }
            }
        }

        if source.is_partitioned && target.is_partitioned
            && source.partition_scheme != target.partition_scheme
        {
            b.fix(
                FixCategory::SyncPartitionObjects,
                "SYNC_PARTITION_OBJECTS",
                format!(
                    "rebuild {} on partition scheme {}",
                    target_name,
                    config.scheme_name()
                ),
                format!(
                    "-- rebuild [{}].[{}] on [{}]",
                    context.target_schema,
                    context.target_table,
                    config.scheme_name()
                ),
                true,
                None,
            );
        }

        let missing_indexes: Vec<&String> = source
            .nonclustered_indexes
            .iter()
            .filter(|ix| !target.nonclustered_indexes.contains(ix))
            .collect();
        if !missing_indexes.is_empty() {
            for index in &missing_indexes {
                b.fix(
                    FixCategory::SyncIndexes,
                    &format!("SYNC_INDEX_{}", index.to_uppercase()),
                    format!("recreate index {} on {}", index, target_name),
                    format!(
                        "-- CREATE INDEX [{}] ON [{}].[{}]",
                        index, context.target_schema, context.target_table
                    ),
                    false,
                    None,
                );
            }
            b.warn(
                "INDEXES_OUT_OF_SYNC",
                format!(
                    "{} nonclustered index(es) missing on {}",
                    missing_indexes.len(),
                    target_name
                ),
                None,
            );
        }

        let missing_constraints: Vec<&String> = source
            .check_constraints
            .iter()
            .filter(|c| !target.check_constraints.contains(c))
            .collect();
        for constraint in missing_constraints {
            b.fix(
                FixCategory::SyncConstraints,
                &format!("SYNC_CONSTRAINT_{}", constraint.to_uppercase()),
                format!("recreate check constraint {} on {}", constraint, target_name),
                format!(
                    "-- ALTER TABLE [{}].[{}] ADD CONSTRAINT [{}]",
                    context.target_schema, context.target_table, constraint
                ),
                false,
                None,
            );
        }

        if target.stale_statistics {
            b.warn(
                "STALE_STATISTICS",
                format!("statistics on {} are stale", target_name),
                Some("refresh statistics after the switch"),
            );
            b.fix(
                FixCategory::RefreshStatistics,
                "REFRESH_STATISTICS",
                format!("update statistics on {}", target_name),
                format!(
                    "UPDATE STATISTICS [{}].[{}];",
                    context.target_schema, context.target_table
                ),
                false,
                None,
            );
        }
    }

    fn check_policy(
        &self,
        config: &PartitionConfiguration,
        context: &SwitchContext,
        b: &mut InspectionBuilder,
    ) {
        if !context.create_staging_table {
            b.warn(
                "NO_STAGING_TABLE",
                "switching directly into the target without a staging table".into(),
                Some("consider a staging table for reversibility"),
            );
        }
        if let Some(rule) = config.safety_rule() {
            if let Some(hint) = &rule.execution_window_hint {
                b.warn(
                    "EXECUTION_WINDOW",
                    format!("preferred execution window: {}", hint),
                    None,
                );
            }
            for extra in &rule.additional_warnings {
                b.warn("SAFETY_RULE", extra.clone(), None);
            }
        }
    }
}

fn snapshot(schema: &str, table: &str, facts: &TableFacts) -> TableSnapshot {
    TableSnapshot {
        schema: schema.to_string(),
        table: table.to_string(),
        exists: facts.exists,
        row_count: facts.row_count,
        columns: facts.columns.iter().map(|c| c.name.clone()).collect(),
    }
}

type FixTuple = (FixCategory, AutoFixStep, String, bool, Option<String>);

fn build_plan(fixes: &[FixTuple]) -> Vec<FixPlanGroup> {
    // Category order mirrors the order the fixes should run in.
    const ORDER: [FixCategory; 7] = [
        FixCategory::CreateTargetTable,
        FixCategory::SyncPartitionObjects,
        FixCategory::SyncIndexes,
        FixCategory::SyncConstraints,
        FixCategory::RefreshStatistics,
        FixCategory::CleanupResidualData,
        FixCategory::Other,
    ];

    let mut plan = Vec::new();
    for category in ORDER {
        let members: Vec<&FixTuple> = fixes.iter().filter(|f| f.0 == category).collect();
        if members.is_empty() {
            continue;
        }
        plan.push(FixPlanGroup {
            category,
            step_codes: members.iter().map(|f| f.1.code.clone()).collect(),
            commands: members.iter().map(|f| f.2.clone()).collect(),
            impact_scope: impact_scope(category).to_string(),
            prerequisite: members.iter().find_map(|f| f.4.clone()),
            needs_exclusive_lock: members.iter().any(|f| f.3),
        });
    }
    plan
}

fn impact_scope(category: FixCategory) -> &'static str {
    match category {
        FixCategory::CreateTargetTable => "creates a new empty table; no data touched",
        FixCategory::SyncPartitionObjects => "rebuilds the target heap/index placement",
        FixCategory::SyncIndexes => "builds indexes on the target; read load on source metadata",
        FixCategory::SyncConstraints => "adds constraints; target rows re-validated",
        FixCategory::RefreshStatistics => "statistics only; no structural change",
        FixCategory::CleanupResidualData => "deletes target rows irreversibly",
        FixCategory::Other => "see step descriptions",
    }
}
