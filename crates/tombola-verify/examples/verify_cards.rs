use std::env;
use std::path::PathBuf;

use tombola_core::Parameters;
use tombola_verify::{ReportContext, render_report, verify_artifacts};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);
    let mut cards_path: Option<PathBuf> = None;
    let mut params_path: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--params" => params_path = args.next().map(PathBuf::from),
            _ => {
                if cards_path.is_none() {
                    cards_path = Some(PathBuf::from(arg));
                } else {
                    return Err("unexpected argument".into());
                }
            }
        }
    }

    let cards_path = cards_path.ok_or("missing cards.json path")?;
    let params: Option<Parameters> = match params_path {
        Some(path) => Some(serde_json::from_str(&std::fs::read_to_string(path)?)?),
        None => None,
    };

    let (artifact, report) = verify_artifacts(&cards_path, params.as_ref())?;
    let context = ReportContext {
        run_id: artifact.run_meta.run_id.clone(),
        params_hash: artifact.run_meta.params_hash.clone(),
        seed: artifact.run_meta.seed,
        engine: artifact.run_meta.rng_engine.clone(),
        best_effort: artifact.run_meta.best_effort,
        ..ReportContext::default()
    };
    println!(
        "{}",
        render_report(&artifact.run_meta.params, &report, &context, 10)
    );
    if !report.passed {
        return Err(format!("failed checks: {}", report.failed_checks().join(", ")).into());
    }
    Ok(())
}
