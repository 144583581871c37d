mod config;
mod output;
mod registry;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use config::{ConfigError, ParamArgs, resolve_parameters};
use output::{
    OutputError, RunReport, ensure_writable, write_bytes_atomic, write_json_atomic,
    write_summary_csv,
};
use registry::{ColorMode, RunContext, init_logging, start_run};
use serde::Serialize;
use thiserror::Error;
use tombola_build::{BuildEngine, BuildError, BuildMetrics, BuildOutcome, Feasibility};
use tombola_core::{Error as CoreError, Parameters, params_hash, parameters_json_schema};
use tombola_verify::{
    CardsArtifact, ReportContext, RunMeta, VerificationReport, Verifier, VerifyError, deviations,
    load_recorded_report, render_report, verify_artifacts,
};
use uuid::Uuid;

/// Examples listed per failing check in report.md.
const REPORT_EXAMPLES: usize = 10;

#[derive(Debug, Error)]
enum CliError {
    #[error("registry error: {0}")]
    Registry(#[from] registry::RegistryError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("core error: {0}")]
    Core(#[from] CoreError),
    #[error("{0}")]
    Build(#[from] BuildError),
    #[error("{0}")]
    Verify(#[from] VerifyError),
    #[error("output error: {0}")]
    Output(#[from] OutputError),
    #[error("best-effort card set with {violations} unresolved violation(s)")]
    BestEffort { violations: usize },
    #[error("strict verification failed: {}", .0.join("; "))]
    Strict(Vec<String>),
    #[error("{0}")]
    Usage(String),
}

impl CliError {
    /// 2 parameters, 3 construction, 4 verification, 5 I/O.
    fn exit_code(&self) -> u8 {
        match self {
            CliError::Config(ConfigError::Io { .. }) => 5,
            CliError::Config(_) | CliError::Usage(_) => 2,
            CliError::Core(CoreError::InvalidParameters(_)) => 2,
            CliError::Core(_) => 5,
            CliError::Build(
                BuildError::Infeasible(_)
                | BuildError::InvalidParameters(_)
                | BuildError::UnknownEngine(_),
            ) => 2,
            CliError::Build(_) | CliError::BestEffort { .. } => 3,
            CliError::Verify(VerifyError::Failed { .. } | VerifyError::InvalidReport(_))
            | CliError::Strict(_) => 4,
            CliError::Verify(VerifyError::Core(CoreError::InvalidParameters(_))) => 2,
            CliError::Verify(_) | CliError::Registry(_) | CliError::Output(_) => 5,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "tombola", version, about = "Tombola card set builder")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build, verify and write a card set.
    Run(RunArgs),
    /// Check feasibility of the resolved parameters without building.
    Check(CheckArgs),
    /// Re-verify a cards.json artifact.
    Verify(VerifyArgs),
    /// Print the JSON Schema of the parameter file.
    Schema,
}

#[derive(Args, Debug, Clone)]
struct LogArgs {
    /// Console log level (RUST_LOG overrides).
    #[arg(long, env = "TOMBOLA_LOG_LEVEL", default_value = "info")]
    log_level: String,
    #[arg(long, env = "TOMBOLA_COLORS", value_enum, default_value_t = ColorMode::Auto)]
    colors: ColorMode,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    params: ParamArgs,
    #[command(flatten)]
    log: LogArgs,
    /// Output directory for runs.
    #[arg(long, default_value = "runs")]
    run_dir: PathBuf,
    /// Extra copy of cards.json.
    #[arg(long, value_name = "FILE")]
    out_cards: Option<PathBuf>,
    /// Extra copy of report.json.
    #[arg(long, value_name = "FILE")]
    out_report: Option<PathBuf>,
    /// Also write summary.csv with frequency tables.
    #[arg(long, default_value_t = false)]
    summary_csv: bool,
    /// Overwrite existing --out-* files.
    #[arg(long, default_value_t = false)]
    force: bool,
    /// Resolve parameters and check feasibility, then exit.
    #[arg(long, default_value_t = false)]
    dry_run: bool,
    /// Accept best-effort card sets; verification failures still exit 4.
    #[arg(long, env = "TOMBOLA_BEST_EFFORT_ZERO", default_value_t = false)]
    best_effort_zero: bool,
}

#[derive(Args, Debug)]
struct CheckArgs {
    #[command(flatten)]
    params: ParamArgs,
    #[command(flatten)]
    log: LogArgs,
}

#[derive(Args, Debug)]
struct VerifyArgs {
    /// cards.json to verify.
    #[arg(long, value_name = "FILE", required_unless_present = "report_only")]
    cards: Option<PathBuf>,
    /// report.json of the run, compared against the recomputed checks.
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,
    /// Fail on any report deviation or best-effort card set.
    #[arg(long, default_value_t = false)]
    strict: bool,
    /// Only validate --report against its schema.
    #[arg(long, default_value_t = false, requires = "report", conflicts_with = "cards")]
    report_only: bool,
    /// Parameters JSON overriding the ones recorded in the artifact.
    #[arg(long, value_name = "FILE")]
    params: Option<PathBuf>,
    /// Write the verification report JSON here.
    #[arg(long, value_name = "FILE")]
    report_out: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    force: bool,
    #[command(flatten)]
    log: LogArgs,
}

/// `--dry-run` and `check` output.
#[derive(Debug, Serialize)]
struct ResolvedParameters<'a> {
    params: &'a Parameters,
    params_hash: String,
    feasibility: &'a Feasibility,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run(args) => run_build(args),
        Command::Check(args) => run_check(args),
        Command::Verify(args) => run_verify(args),
        Command::Schema => print_schema(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(event = "run_failed", error = %err);
            eprintln!("error: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

fn run_build(args: RunArgs) -> Result<(), CliError> {
    let params = resolve_parameters(&args.params, std::env::vars())?;
    let params_hash = params_hash(&params)?;
    let engine = BuildEngine::new(params.clone());

    if args.dry_run {
        init_logging(None, &args.log.log_level, args.log.colors)?;
        let feasibility = engine.check()?;
        print_resolved(&params, &feasibility)?;
        return Ok(());
    }

    for path in [&args.out_cards, &args.out_report].into_iter().flatten() {
        ensure_writable(path, args.force)?;
    }

    let run_id = Uuid::new_v4().to_string();
    let run_ctx = RunContext {
        run_id: run_id.clone(),
        started_at: chrono::Utc::now(),
        run_dir: args.run_dir.clone(),
        params: params.clone(),
        params_hash: params_hash.clone(),
    };
    let paths = start_run(&run_ctx)?;
    init_logging(Some(&paths.logs_path), &args.log.log_level, args.log.colors)?;

    tracing::info!(
        event = "run_started",
        run_id = %run_id,
        params_hash = %params_hash,
        run_root = %paths.root.display()
    );
    let timer = Instant::now();

    let outcome = engine.run()?;
    let report = Verifier::new(&params).verify(&outcome.cards);
    tracing::info!(
        event = "verification_finished",
        passed = report.passed,
        failed_checks = ?report.failed_checks()
    );

    let run_meta = RunMeta {
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: run_ctx.started_at.to_rfc3339(),
        run_id: run_id.clone(),
        params_hash: params_hash.clone(),
        seed: params.seed.value,
        rng_engine: params.seed.engine.clone(),
        hash_algorithm: "sha256".to_string(),
        parallelism: params.parallelism,
        best_effort: outcome.best_effort,
        params: params.clone(),
        git_commit: paths.git.commit.clone(),
    };
    let artifact = CardsArtifact::new(run_meta, &outcome.cards)?;
    let run_report = RunReport::new(&run_id, &params_hash, &outcome, &report);
    let markdown = render_report(
        &params,
        &report,
        &report_context(&run_id, &params_hash, &params, &outcome),
        REPORT_EXAMPLES,
    );

    write_json_atomic(&paths.cards_path, &artifact, false)?;
    write_json_atomic(&paths.report_json_path, &run_report, false)?;
    write_bytes_atomic(&paths.report_md_path, markdown.as_bytes(), false)?;
    if args.summary_csv {
        write_summary_csv(&paths.summary_csv_path, &report, false)?;
    }
    if let Some(path) = &args.out_cards {
        write_json_atomic(path, &artifact, args.force)?;
    }
    if let Some(path) = &args.out_report {
        write_json_atomic(path, &run_report, args.force)?;
    }
    tracing::info!(event = "artifacts_written", path = %paths.root.display());

    tracing::info!(
        event = "run_finished",
        best_effort = outcome.best_effort,
        passed = report.passed,
        duration_ms = timer.elapsed().as_millis() as u64
    );
    println!("{}", paths.root.display());

    finish_status(&outcome, &report, args.best_effort_zero)
}

/// Best-effort output exits 3 unless accepted; a failed verification always exits 4.
fn finish_status(
    outcome: &BuildOutcome,
    report: &VerificationReport,
    best_effort_zero: bool,
) -> Result<(), CliError> {
    if outcome.best_effort {
        if !best_effort_zero {
            return Err(CliError::BestEffort {
                violations: outcome.violations.len(),
            });
        }
        tracing::warn!(
            event = "best_effort_accepted",
            violations = outcome.violations.len()
        );
    }
    if !report.passed {
        return Err(VerifyError::Failed {
            checks: report.failed_checks(),
        }
        .into());
    }
    Ok(())
}

fn run_check(args: CheckArgs) -> Result<(), CliError> {
    init_logging(None, &args.log.log_level, args.log.colors)?;
    let params = resolve_parameters(&args.params, std::env::vars())?;
    let feasibility = BuildEngine::new(params.clone()).check()?;
    print_resolved(&params, &feasibility)
}

fn run_verify(args: VerifyArgs) -> Result<(), CliError> {
    init_logging(None, &args.log.log_level, args.log.colors)?;
    let (cards_path, report_path) = match (&args.cards, &args.report) {
        (_, Some(report)) if args.report_only => {
            let recorded = load_recorded_report(report)?;
            tracing::info!(
                event = "report_validated",
                run_id = %recorded.run_id,
                passed = recorded.verification.passed
            );
            println!("{}: valid report for run {}", report.display(), recorded.run_id);
            return Ok(());
        }
        (Some(cards), report) => (cards, report.as_deref()),
        (None, _) => return Err(CliError::Usage("--cards is required".to_string())),
    };
    if let Some(path) = &args.report_out {
        ensure_writable(path, args.force)?;
    }

    let params = args
        .params
        .as_deref()
        .map(load_params)
        .transpose()?;
    let (artifact, report) = verify_artifacts(cards_path, params.as_ref())?;
    let params = params.unwrap_or_else(|| artifact.run_meta.params.clone());
    tracing::info!(
        event = "verification_finished",
        cards = artifact.cards.len(),
        passed = report.passed
    );
    let found = match report_path {
        Some(path) => deviations(&load_recorded_report(path)?, &artifact, &report),
        None => Vec::new(),
    };
    for detail in &found {
        tracing::warn!(event = "report_deviation", detail = %detail);
    }

    if let Some(path) = &args.report_out {
        write_json_atomic(path, &report, args.force)?;
    }
    let context = ReportContext {
        run_id: artifact.run_meta.run_id.clone(),
        params_hash: artifact.run_meta.params_hash.clone(),
        seed: params.seed.value,
        engine: params.seed.engine.clone(),
        best_effort: artifact.run_meta.best_effort,
        ..ReportContext::default()
    };
    println!("{}", render_report(&params, &report, &context, REPORT_EXAMPLES));

    verify_status(&report, found, artifact.run_meta.best_effort, args.strict)
}

/// Failed checks exit 4; under `--strict` so do deviations and best-effort sets.
fn verify_status(
    report: &VerificationReport,
    mut found: Vec<String>,
    best_effort: bool,
    strict: bool,
) -> Result<(), CliError> {
    if !report.passed {
        return Err(VerifyError::Failed {
            checks: report.failed_checks(),
        }
        .into());
    }
    if strict {
        if best_effort {
            found.push("card set was built best-effort".to_string());
        }
        if !found.is_empty() {
            return Err(CliError::Strict(found));
        }
    }
    Ok(())
}

fn print_schema() -> Result<(), CliError> {
    let schema = serde_json::to_string_pretty(&parameters_json_schema())
        .map_err(|err| CliError::Core(CoreError::Json(err)))?;
    println!("{schema}");
    Ok(())
}

fn load_params(path: &Path) -> Result<Parameters, CliError> {
    let contents = std::fs::read_to_string(path).map_err(VerifyError::from)?;
    let params: Parameters = serde_json::from_str(&contents).map_err(VerifyError::from)?;
    Ok(params)
}

fn print_resolved(params: &Parameters, feasibility: &Feasibility) -> Result<(), CliError> {
    let resolved = ResolvedParameters {
        params,
        params_hash: params_hash(params)?,
        feasibility,
    };
    let text = serde_json::to_string_pretty(&resolved)
        .map_err(|err| CliError::Core(CoreError::Json(err)))?;
    println!("{text}");
    Ok(())
}

fn report_context(
    run_id: &str,
    params_hash: &str,
    params: &Parameters,
    outcome: &BuildOutcome,
) -> ReportContext {
    ReportContext {
        run_id: run_id.to_string(),
        params_hash: params_hash.to_string(),
        seed: params.seed.value,
        engine: params.seed.engine.clone(),
        best_effort: outcome.best_effort,
        build_metrics: metric_rows(&outcome.metrics),
        build_violations: outcome
            .violations
            .iter()
            .map(|violation| match violation.card_index {
                Some(index) => format!("{} (card {index}): {}", violation.class, violation.detail),
                None => format!("{}: {}", violation.class, violation.detail),
            })
            .collect(),
    }
}

fn metric_rows(metrics: &BuildMetrics) -> Vec<(String, u64)> {
    [
        ("swap_attempts", metrics.swap_attempts),
        ("swaps_applied", metrics.swaps_applied),
        ("collisions_resolved", metrics.collisions_resolved),
        ("stalls", metrics.stalls),
        ("cards_rebuilt", metrics.cards_rebuilt),
        ("elapsed_ms", metrics.elapsed_ms),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_string(), value))
    .collect()
}
