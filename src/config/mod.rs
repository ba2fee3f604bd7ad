// ============================================================================
// Partition configuration aggregate and its value objects
// ============================================================================

mod configuration;
mod filegroup;
mod safety;
mod service;
mod storage;

pub use configuration::PartitionConfiguration;
pub use service::{ConfigurationService, CreateConfigurationRequest};
pub use filegroup::{PartitionFilegroupMappings, PartitionFilegroupStrategy};
pub use safety::{
    LockMode, PartitionRetentionPolicy, PartitionSafetyRule, TargetTableDescriptor,
};
pub use storage::{validate_identifier, PartitionStorageSettings};
