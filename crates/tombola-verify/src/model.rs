use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tombola_core::Uniformity;

/// Outcome of one verification check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    /// The check does not apply to this run (inactive scope).
    #[serde(default)]
    pub skipped: bool,
    pub violations: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// First offending cards or lines, for the report.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
}

impl CheckResult {
    pub fn skipped(name: &str, detail: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            skipped: true,
            violations: 0,
            detail: Some(detail.to_string()),
            examples: Vec::new(),
        }
    }
}

/// Pearson chi-square against the uniform expectation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChiSquare {
    pub stat: f64,
    pub df: u64,
    /// Wilson–Hilferty approximation of the upper tail.
    pub p_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniformityStats {
    pub mode: Uniformity,
    pub target_min: u64,
    pub target_max: u64,
    pub observed_min: u64,
    pub observed_max: u64,
    pub max_minus_min: u64,
    pub chi2: ChiSquare,
}

/// Machine-readable verification result (`report.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub passed: bool,
    pub checks: Vec<CheckResult>,
    /// Placements per number `1..=R`.
    pub frequencies: BTreeMap<u32, u64>,
    /// Placements per grid position `"(row,col)"`, then per number.
    pub position_frequencies: BTreeMap<String, BTreeMap<u32, u64>>,
    pub uniformity: UniformityStats,
}

impl VerificationReport {
    pub fn check(&self, name: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|check| check.name == name)
    }

    pub fn failed_checks(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter(|check| !check.passed)
            .map(|check| check.name.clone())
            .collect()
    }

    /// Append a check and fold it into the overall verdict.
    pub fn push_check(&mut self, check: CheckResult) {
        self.passed &= check.passed;
        self.checks.push(check);
    }
}
