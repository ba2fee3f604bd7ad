// ============================================================================
// Core domain primitives: error type, partition values, boundaries
// ============================================================================

mod boundary;
mod error;
mod value;

pub use boundary::{PartitionBoundary, PartitionColumn};
pub use error::{PartitionError, Result};
pub use value::{PartitionValue, PartitionValueKind};
