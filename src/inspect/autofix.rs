use log::{info, warn};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::core::Result;
use crate::inspect::finding::{AutoFixOutcome, AutoFixStepResult, FixPlanGroup};
use crate::repository::DdlExecutor;

/// Runs a selected subset of an inspection's auto-fix steps, in the order
/// the caller gives them, and reports per-step outcomes.
pub struct AutoFixExecutor {
    executor: Arc<dyn DdlExecutor>,
}

impl AutoFixExecutor {
    pub fn new(executor: Arc<dyn DdlExecutor>) -> Self {
        Self { executor }
    }

    /// Unknown step codes fail their step without aborting the run; a step
    /// whose DDL fails is reported and the run continues, so the combined
    /// flag reflects every selected step.
    pub async fn run(
        &self,
        data_source_id: Uuid,
        database: Option<&str>,
        plan: &[FixPlanGroup],
        selected_codes: &[String],
    ) -> Result<AutoFixOutcome> {
        let mut steps = Vec::with_capacity(selected_codes.len());
        let mut log = String::new();

        for code in selected_codes {
            let started = Instant::now();
            let result = match find_command(plan, code) {
                Some(command) => {
                    match self
                        .executor
                        .execute_script(data_source_id, database, &command)
                        .await
                    {
                        Ok(message) => {
                            info!("auto-fix step {} succeeded", code);
                            AutoFixStepResult {
                                code: code.clone(),
                                succeeded: true,
                                message,
                                script: command,
                                elapsed_ms: started.elapsed().as_millis() as u64,
                            }
                        }
                        Err(err) => {
                            warn!("auto-fix step {} failed: {}", code, err);
                            AutoFixStepResult {
                                code: code.clone(),
                                succeeded: false,
                                message: err.display_message(),
                                script: command,
                                elapsed_ms: started.elapsed().as_millis() as u64,
                            }
                        }
                    }
                }
                None => AutoFixStepResult {
                    code: code.clone(),
                    succeeded: false,
                    message: format!("step '{}' is not part of the remediation plan", code),
                    script: String::new(),
                    elapsed_ms: 0,
                },
            };
            let _ = writeln!(
                log,
                "[{}] {} ({} ms): {}",
                if result.succeeded { "ok" } else { "fail" },
                result.code,
                result.elapsed_ms,
                result.message
            );
            steps.push(result);
        }

        Ok(AutoFixOutcome {
            all_succeeded: !steps.is_empty() && steps.iter().all(|s| s.succeeded),
            steps,
            log,
        })
    }
}

fn find_command(plan: &[FixPlanGroup], code: &str) -> Option<String> {
    for group in plan {
        if let Some(index) = group.step_codes.iter().position(|c| c == code) {
            return group.commands.get(index).cloned();
        }
    }
    None
}
