use crate::error::CliError;
use engine_runtime::controller::RunSummary;
use planner::plan::{LoadPlan, redact_credentials};

pub fn print_summary(summary: &RunSummary) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}

/// Prints `plan` as JSON. Credentials never reach stdout.
pub fn print_plan(plan: &LoadPlan) -> Result<(), CliError> {
    let redacted = LoadPlan {
        statements: plan
            .statements
            .iter()
            .map(|sql| redact_credentials(sql))
            .collect(),
        cleanup: plan.cleanup.clone(),
    };
    println!("{}", serde_json::to_string_pretty(&redacted)?);
    Ok(())
}
