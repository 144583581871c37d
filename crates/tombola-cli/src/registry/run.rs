use std::fs::{OpenOptions, create_dir_all};
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tombola_core::Parameters;

use super::{RegistryError, RegistryResult};

/// Metadata captured at run start.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub run_dir: PathBuf,
    pub params: Parameters,
    pub params_hash: String,
}

/// JSON config written to each run directory.
#[derive(Debug, Serialize)]
pub struct RunConfig<'a> {
    pub run_id: &'a str,
    pub started_at: String,
    pub app_version: &'static str,
    pub params_hash: &'a str,
    pub params: &'a Parameters,
    pub git: &'a GitInfo,
}

/// Git metadata for reproducibility.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GitInfo {
    pub commit: Option<String>,
    pub dirty: Option<bool>,
}

/// Paths for run artifacts.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub root: PathBuf,
    pub logs_path: PathBuf,
    pub cards_path: PathBuf,
    pub report_json_path: PathBuf,
    pub report_md_path: PathBuf,
    pub summary_csv_path: PathBuf,
    pub git: GitInfo,
}

pub fn start_run(ctx: &RunContext) -> RegistryResult<RunPaths> {
    let timestamp = ctx.started_at.format("%Y-%m-%dT%H-%M-%SZ").to_string();
    let root = ctx.run_dir.join(format!("{timestamp}__run_{}", ctx.run_id));

    create_dir_all(&root)?;

    let git = collect_git_info();
    let config = RunConfig {
        run_id: &ctx.run_id,
        started_at: ctx.started_at.to_rfc3339(),
        app_version: env!("CARGO_PKG_VERSION"),
        params_hash: &ctx.params_hash,
        params: &ctx.params,
        git: &git,
    };
    write_json(&root.join("config.json"), &config)?;

    let logs_path = root.join("logs.ndjson");
    OpenOptions::new().create(true).append(true).open(&logs_path)?;

    Ok(RunPaths {
        logs_path,
        cards_path: root.join("cards.json"),
        report_json_path: root.join("report.json"),
        report_md_path: root.join("report.md"),
        summary_csv_path: root.join("summary.csv"),
        root,
        git,
    })
}

pub fn collect_git_info() -> GitInfo {
    let commit = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
            } else {
                None
            }
        })
        .filter(|value| !value.is_empty());

    let dirty = Command::new("git")
        .args(["status", "--porcelain"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| !output.stdout.is_empty());

    GitInfo { commit, dirty }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> RegistryResult<()> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)?;
    serde_json::to_writer_pretty(file, value).map_err(RegistryError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_directory_holds_config() {
        let run_dir = std::env::temp_dir().join(format!("tombola_runs_{}", uuid::Uuid::new_v4()));
        let params = Parameters::new(6, 3, 1, 2);
        let ctx = RunContext {
            run_id: "abc".to_string(),
            started_at: Utc::now(),
            run_dir: run_dir.clone(),
            params: params.clone(),
            params_hash: "sha256:00".to_string(),
        };

        let paths = start_run(&ctx).expect("start run");
        assert!(paths.root.starts_with(&run_dir));
        assert!(
            paths
                .root
                .file_name()
                .map(|name| name.to_string_lossy().ends_with("__run_abc"))
                .unwrap_or(false)
        );
        assert!(paths.logs_path.exists());

        let config: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(paths.root.join("config.json")).expect("read config"),
        )
        .expect("parse config");
        assert_eq!(config["params_hash"], "sha256:00");
        assert_eq!(config["params"]["R"], 6);
    }
}
