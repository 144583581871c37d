use std::path::Path;

use jsonschema::JSONSchema;
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;

use crate::artifacts::CardsArtifact;
use crate::errors::VerifyError;
use crate::model::VerificationReport;

/// The parts of a run's `report.json` that re-verification compares.
#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
pub struct RecordedReport {
    pub artifact_version: String,
    pub run_id: String,
    pub params_hash: String,
    pub best_effort: bool,
    pub verification: RecordedVerification,
}

#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
pub struct RecordedVerification {
    pub passed: bool,
    pub checks: Vec<RecordedCheck>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
pub struct RecordedCheck {
    pub name: String,
    pub passed: bool,
    #[serde(default)]
    pub skipped: bool,
    pub violations: u64,
}

/// Read a run report, rejecting documents that do not match its schema.
pub fn load_recorded_report(path: &Path) -> Result<RecordedReport, VerifyError> {
    let contents = std::fs::read_to_string(path)?;
    let document: Value = serde_json::from_str(&contents)?;

    let schema = serde_json::to_value(schema_for!(RecordedReport))?;
    let compiled = JSONSchema::compile(&schema)
        .map_err(|err| VerifyError::InvalidReport(vec![err.to_string()]))?;
    if let Err(errors) = compiled.validate(&document) {
        let messages: Vec<String> = errors
            .map(|error| {
                let path = error.instance_path.to_string();
                if path.is_empty() {
                    error.to_string()
                } else {
                    format!("{path}: {error}")
                }
            })
            .collect();
        return Err(VerifyError::InvalidReport(messages));
    }
    Ok(serde_json::from_value(document)?)
}

/// Differences between a recorded report and a fresh verification of its cards.
pub fn deviations(
    recorded: &RecordedReport,
    artifact: &CardsArtifact,
    report: &VerificationReport,
) -> Vec<String> {
    let mut found = Vec::new();
    let meta = &artifact.run_meta;
    if recorded.run_id != meta.run_id {
        found.push(format!(
            "run_id {} does not match the cards ({})",
            recorded.run_id, meta.run_id
        ));
    }
    if recorded.params_hash != meta.params_hash {
        found.push("params_hash does not match the cards".to_string());
    }
    if recorded.best_effort != meta.best_effort {
        found.push(format!(
            "best_effort recorded as {} but the cards say {}",
            recorded.best_effort, meta.best_effort
        ));
    }
    if recorded.verification.passed != report.passed {
        found.push(format!(
            "verdict recorded as {} but recomputed as {}",
            verdict(recorded.verification.passed),
            verdict(report.passed)
        ));
    }
    for check in &recorded.verification.checks {
        match report.check(&check.name) {
            None => found.push(format!("check {} is not recomputed", check.name)),
            Some(fresh) if fresh.passed != check.passed || fresh.skipped != check.skipped => {
                found.push(format!(
                    "check {}: recorded {}, recomputed {}",
                    check.name,
                    verdict(check.passed),
                    verdict(fresh.passed)
                ));
            }
            Some(fresh) if fresh.violations != check.violations => found.push(format!(
                "check {}: {} violation(s) recorded, {} recomputed",
                check.name, check.violations, fresh.violations
            )),
            Some(_) => {}
        }
    }
    found
}

fn verdict(passed: bool) -> &'static str {
    if passed { "pass" } else { "fail" }
}
