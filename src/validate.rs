//! `ekb validate`: check an editing plan file.

use std::path::Path;

use anyhow::{Context, Result};
use editkb_core::models::ValidationReport;
use serde_json::Value;

use crate::repository::KnowledgeRepository;

/// Validate the plan at `path` and print the report.
///
/// Returns the report so the caller can pick the exit status; an invalid
/// plan is not an `Err`.
pub async fn run_validate(
    repo: &KnowledgeRepository,
    path: &Path,
    json: bool,
) -> Result<ValidationReport> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read plan: {}", path.display()))?;
    let plan: Value = serde_json::from_str(&text)
        .with_context(|| format!("Plan is not valid JSON: {}", path.display()))?;

    let report = repo.validate(&plan).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(path, &report);
    }
    Ok(report)
}

fn print_report(path: &Path, report: &ValidationReport) {
    let verdict = if report.is_valid { "valid" } else { "INVALID" };
    println!(
        "{}: {} ({} error{}, {} warning{})",
        path.display(),
        verdict,
        report.error_count(),
        plural(report.error_count()),
        report.warning_count(),
        plural(report.warning_count()),
    );
    for issue in &report.issues {
        println!(
            "  {:<7} {:<28} {:<24} {}",
            issue.severity, issue.code, issue.path, issue.message
        );
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}
