// ============================================================================
// Execution permission gate
// ============================================================================

use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::{PartitionError, Result};
use crate::repository::PermissionReader;

/// Grants DDL execution needs on the target object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequiredGrant {
    Alter,
    Control,
    ViewDefinition,
}

impl RequiredGrant {
    pub const ALL: [RequiredGrant; 3] = [
        RequiredGrant::Alter,
        RequiredGrant::Control,
        RequiredGrant::ViewDefinition,
    ];
}

impl fmt::Display for RequiredGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alter => write!(f, "ALTER"),
            Self::Control => write!(f, "CONTROL"),
            Self::ViewDefinition => write!(f, "VIEW DEFINITION"),
        }
    }
}

/// Read-only check of required grants; execution must not proceed while any
/// grant is missing.
pub struct PermissionGate {
    reader: Arc<dyn PermissionReader>,
}

impl PermissionGate {
    pub fn new(reader: Arc<dyn PermissionReader>) -> Self {
        Self { reader }
    }

    /// Lists grants absent on the target object.
    pub async fn missing_grants(
        &self,
        data_source_id: Uuid,
        schema: &str,
        table: &str,
    ) -> Result<Vec<RequiredGrant>> {
        let held = self
            .reader
            .granted_permissions(data_source_id, schema, table)
            .await?;
        Ok(RequiredGrant::ALL
            .iter()
            .copied()
            .filter(|grant| !held.contains(grant))
            .collect())
    }

    /// # Errors
    /// Fails with `PermissionDenied` naming every missing grant.
    pub async fn ensure_can_execute(
        &self,
        data_source_id: Uuid,
        schema: &str,
        table: &str,
    ) -> Result<()> {
        let missing = self.missing_grants(data_source_id, schema, table).await?;
        if missing.is_empty() {
            Ok(())
        } else {
            let names: Vec<String> = missing.iter().map(|g| g.to_string()).collect();
            Err(PartitionError::PermissionDenied(names.join(", ")))
        }
    }
}
