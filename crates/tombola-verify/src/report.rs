use tombola_core::Parameters;

use crate::model::VerificationReport;

/// Run facts shown above the verification results.
#[derive(Debug, Clone, Default)]
pub struct ReportContext {
    pub run_id: String,
    pub params_hash: String,
    pub seed: u64,
    pub engine: String,
    pub best_effort: bool,
    /// Construction counters, in display order.
    pub build_metrics: Vec<(String, u64)>,
    /// Unresolved constraints reported by the builder.
    pub build_violations: Vec<String>,
}

/// Render a deterministic markdown report.
pub fn render_report(
    params: &Parameters,
    report: &VerificationReport,
    context: &ReportContext,
    max_examples: usize,
) -> String {
    let mut lines = Vec::new();

    lines.push("# Tombola Verification Report".to_string());
    lines.push(String::new());
    lines.push("## Run summary".to_string());
    lines.push(format!("- run_id: {}", context.run_id));
    lines.push(format!("- params_hash: {}", context.params_hash));
    lines.push(format!("- seed: {} ({})", context.seed, context.engine));
    lines.push(format!(
        "- grid: T={} cards of {}x{}, numbers 1..={}",
        params.cards, params.rows, params.cols, params.range
    ));
    let scopes: Vec<&str> = params.unique_scope.iter().map(|scope| scope.as_str()).collect();
    lines.push(format!(
        "- unique_scope: {}",
        if scopes.is_empty() { "-".to_string() } else { scopes.join(", ") }
    ));
    lines.push(format!("- best_effort: {}", context.best_effort));
    lines.push(format!(
        "- verdict: {}",
        if report.passed { "PASS" } else { "FAIL" }
    ));
    lines.push(String::new());

    lines.push("## Checks".to_string());
    lines.push("| check | result | violations | detail |".to_string());
    lines.push("| --- | --- | --- | --- |".to_string());
    for check in &report.checks {
        let result = if check.skipped {
            "skipped"
        } else if check.passed {
            "pass"
        } else {
            "fail"
        };
        lines.push(format!(
            "| {} | {} | {} | {} |",
            check.name,
            result,
            check.violations,
            check.detail.as_deref().unwrap_or("-")
        ));
    }
    lines.push(String::new());

    let stats = &report.uniformity;
    lines.push("## Uniformity".to_string());
    lines.push(format!("- mode: {}", stats.mode.as_str()));
    lines.push(format!("- target: {}..={}", stats.target_min, stats.target_max));
    lines.push(format!(
        "- observed: {}..={} (max-min {})",
        stats.observed_min, stats.observed_max, stats.max_minus_min
    ));
    lines.push(format!(
        "- chi2: {:.6} (df {}, p {:.6})",
        stats.chi2.stat, stats.chi2.df, stats.chi2.p_value
    ));
    lines.push(String::new());

    if !context.build_metrics.is_empty() {
        lines.push("## Construction".to_string());
        for (name, value) in &context.build_metrics {
            lines.push(format!("- {name}: {value}"));
        }
        lines.push(String::new());
    }

    let failing: Vec<_> = report
        .checks
        .iter()
        .filter(|check| !check.passed && !check.examples.is_empty())
        .collect();
    if !failing.is_empty() || !context.build_violations.is_empty() {
        lines.push("## Violations".to_string());
        for check in failing {
            for example in check.examples.iter().take(max_examples) {
                lines.push(format!("- {}: {}", check.name, example));
            }
        }
        for violation in context.build_violations.iter().take(max_examples) {
            lines.push(format!("- build: {violation}"));
        }
        lines.push(String::new());
    }

    lines.push("## Recommendations".to_string());
    lines.extend(recommendations(report, context));
    lines.join("\n")
}

fn recommendations(report: &VerificationReport, context: &ReportContext) -> Vec<String> {
    let mut lines = Vec::new();
    let failed = |name: &str| report.check(name).is_some_and(|check| !check.passed);

    if failed("row_set_uniqueness") || failed("col_set_uniqueness") {
        lines.push("- increase R or swap_iterations to leave more room for unique sets.".to_string());
    }
    if failed("uniformity") {
        lines.push("- use near uniformity or choose T so that T*m*n is a multiple of R.".to_string());
    }
    if failed("min_distance") {
        lines.push("- raise R or lower min_distance so every card can keep its numbers apart.".to_string());
    }
    if failed("no_identical_cards") {
        lines.push("- raise R or lower T; there are too few distinct cards to avoid repeats.".to_string());
    }
    if failed("artifact_integrity") {
        lines.push("- the card file was modified after it was written; regenerate it.".to_string());
    }
    if context.best_effort {
        lines.push("- best-effort output: rerun with a larger budget before publishing.".to_string());
    }
    if lines.is_empty() {
        lines.push("- all checks passed; keep params_hash and seed with the published cards.".to_string());
    }
    lines
}
