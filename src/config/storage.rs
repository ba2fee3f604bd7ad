use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use crate::core::{PartitionError, Result};

lazy_static! {
    // SQL identifiers: letter or underscore first, then word characters.
    static ref IDENTIFIER_RE: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,127}$").unwrap();
    // Data file names: conservative, no path separators or quotes.
    static ref FILE_NAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_\-\.]{1,200}$").unwrap();
}

/// Physical storage choice for partitions created by this configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode")]
pub enum PartitionStorageSettings {
    /// Everything stays on the primary filegroup.
    UsePrimaryFilegroup,
    /// New partitions get a dedicated filegroup backed by a single data file.
    DedicatedFilegroupSingleFile {
        filegroup: String,
        directory: String,
        file_name: String,
        initial_size_mb: u32,
        growth_mb: u32,
    },
}

impl PartitionStorageSettings {
    /// Build the dedicated-filegroup variant, validating every field.
    ///
    /// # Errors
    /// Fails on malformed identifiers / file names or zero sizes.
    pub fn dedicated(
        filegroup: impl Into<String>,
        directory: impl Into<String>,
        file_name: impl Into<String>,
        initial_size_mb: u32,
        growth_mb: u32,
    ) -> Result<Self> {
        let filegroup = filegroup.into();
        let directory = directory.into();
        let file_name = file_name.into();

        if !IDENTIFIER_RE.is_match(&filegroup) {
            return Err(PartitionError::Validation(format!(
                "'{}' is not a valid filegroup identifier",
                filegroup
            )));
        }
        if directory.trim().is_empty() {
            return Err(PartitionError::Validation(
                "data file directory must not be empty".into(),
            ));
        }
        if !FILE_NAME_RE.is_match(&file_name) {
            return Err(PartitionError::Validation(format!(
                "'{}' is not a valid data file name",
                file_name
            )));
        }
        if initial_size_mb == 0 || growth_mb == 0 {
            return Err(PartitionError::Validation(
                "initial size and growth must be at least 1 MB".into(),
            ));
        }
        Ok(Self::DedicatedFilegroupSingleFile {
            filegroup,
            directory,
            file_name,
            initial_size_mb,
            growth_mb,
        })
    }

    pub fn uses_dedicated_filegroup(&self) -> bool {
        matches!(self, Self::DedicatedFilegroupSingleFile { .. })
    }
}

/// Validates a bare SQL identifier (schema, table, function, scheme names).
pub fn validate_identifier(kind: &str, name: &str) -> Result<()> {
    if IDENTIFIER_RE.is_match(name) {
        Ok(())
    } else {
        Err(PartitionError::Validation(format!(
            "'{}' is not a valid {} identifier",
            name, kind
        )))
    }
}
