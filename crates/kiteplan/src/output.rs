//! Plan rendering for stdout

use crate::cli::OutputFormat;
use kiteplan_plan::{Plan, StepAttrs};

/// Render the plan in the requested format
pub fn render(plan: &Plan, format: OutputFormat) -> miette::Result<String> {
    match format {
        OutputFormat::Text => Ok(render_text(plan)),
        OutputFormat::Json => serde_json::to_string_pretty(plan)
            .map_err(|e| miette::miette!("Failed to serialize plan as JSON: {e}")),
        OutputFormat::Yaml => serde_yaml::to_string(plan)
            .map_err(|e| miette::miette!("Failed to serialize plan as YAML: {e}")),
    }
}

fn render_text(plan: &Plan) -> String {
    let mut out = String::new();
    for group in &plan.groups {
        out.push_str(&format!(
            "--- {} ({} steps)\n",
            group.label,
            group.steps.len()
        ));
        for step in &group.steps {
            out.push_str(&format!("    {}\n", describe(step)));
        }
    }
    out
}

fn describe(step: &StepAttrs) -> String {
    let mut line = step.label.clone();
    if let Some(command) = &step.command {
        line.push_str(&format!(": {command}"));
    }
    line.push_str(&format!(" [{}]", step.queue));
    if let Some(parallelism) = step.parallelism {
        line.push_str(&format!(" x{parallelism}"));
    }
    if step.soft_fail {
        line.push_str(" (soft fail)");
    }
    line
}
