// ============================================================================
// Switch inspection and auto-fix planning
// ============================================================================

mod autofix;
mod finding;
mod inspector;

pub use autofix::AutoFixExecutor;
pub use finding::{
    AutoFixOutcome, AutoFixStep, AutoFixStepResult, BlockingIssue, FixCategory, FixPlanGroup,
    InspectionWarning, SwitchContext, SwitchInspection, TableSnapshot,
};
pub use inspector::SwitchInspector;
