// ============================================================================
// DDL script generation
// ============================================================================

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::PartitionConfiguration;
use crate::core::{PartitionBoundary, Result};
use crate::inspect::SwitchContext;

/// Generated DDL text plus a deterministic content fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedScript {
    pub text: String,
    pub hash: Uuid,
}

impl GeneratedScript {
    pub fn new(text: String) -> Self {
        // uuid v5 over the script text: stable across processes, cheap to
        // compare when re-reviewing a stored command.
        let hash = Uuid::new_v5(&Uuid::NAMESPACE_OID, text.as_bytes());
        Self { text, hash }
    }
}

/// Produces the DDL for split / merge / switch operations. Implemented per
/// target platform; the exact SQL text is not part of this crate's contract.
#[async_trait]
pub trait ScriptGenerator: Send + Sync {
    async fn split_script(
        &self,
        config: &PartitionConfiguration,
        boundary: &PartitionBoundary,
        filegroup: &str,
    ) -> Result<GeneratedScript>;

    async fn merge_script(
        &self,
        config: &PartitionConfiguration,
        boundary: &PartitionBoundary,
    ) -> Result<GeneratedScript>;

    async fn switch_script(
        &self,
        config: &PartitionConfiguration,
        context: &SwitchContext,
    ) -> Result<GeneratedScript>;
}

/// Plain T-SQL generator used as the default wiring and in tests.
#[derive(Debug, Default)]
pub struct TsqlScriptGenerator;

#[async_trait]
impl ScriptGenerator for TsqlScriptGenerator {
    async fn split_script(
        &self,
        config: &PartitionConfiguration,
        boundary: &PartitionBoundary,
        filegroup: &str,
    ) -> Result<GeneratedScript> {
        let text = format!(
            "ALTER PARTITION SCHEME [{scheme}] NEXT USED [{filegroup}];\n\
             ALTER PARTITION FUNCTION [{function}]() SPLIT RANGE ({literal});",
            scheme = config.scheme_name(),
            function = config.function_name(),
            filegroup = filegroup,
            literal = boundary.value().to_sql_literal(),
        );
        Ok(GeneratedScript::new(text))
    }

    async fn merge_script(
        &self,
        config: &PartitionConfiguration,
        boundary: &PartitionBoundary,
    ) -> Result<GeneratedScript> {
        let text = format!(
            "ALTER PARTITION FUNCTION [{function}]() MERGE RANGE ({literal});",
            function = config.function_name(),
            literal = boundary.value().to_sql_literal(),
        );
        Ok(GeneratedScript::new(text))
    }

    async fn switch_script(
        &self,
        config: &PartitionConfiguration,
        context: &SwitchContext,
    ) -> Result<GeneratedScript> {
        let boundary = config.find_boundary(&context.source_boundary_key)?;
        let partition_number = config
            .boundaries()
            .iter()
            .position(|b| b.sort_key() == boundary.sort_key())
            .map(|i| i + 1)
            .unwrap_or(1);
        let text = format!(
            "ALTER TABLE [{schema}].[{table}] SWITCH PARTITION {partition} \
             TO [{target_schema}].[{target_table}];",
            schema = config.schema(),
            table = config.table(),
            partition = partition_number,
            target_schema = context.target_schema,
            target_table = context.target_table,
        );
        Ok(GeneratedScript::new(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        let a = GeneratedScript::new("ALTER TABLE t".into());
        let b = GeneratedScript::new("ALTER TABLE t".into());
        let c = GeneratedScript::new("ALTER TABLE u".into());
        assert_eq!(a.hash, b.hash);
        assert_ne!(a.hash, c.hash);
    }
}
