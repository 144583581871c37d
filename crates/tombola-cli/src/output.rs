use std::collections::BTreeMap;
use std::fs::{OpenOptions, create_dir_all};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tombola_build::{BuildMetrics, BuildOutcome, BuildViolation, Feasibility};
use tombola_core::ARTIFACT_VERSION;
use tombola_verify::VerificationReport;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("refusing to overwrite existing file without --force: {}", .0.display())]
    Exists(PathBuf),
    #[error("invalid output path: {}", .0.display())]
    InvalidPath(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

pub type OutputResult<T> = std::result::Result<T, OutputError>;

/// Construction side of `report.json`.
#[derive(Debug, Serialize)]
pub struct BuildSummary<'a> {
    pub metrics: &'a BuildMetrics,
    pub frequencies: &'a BTreeMap<u32, u64>,
    pub feasibility: &'a Feasibility,
    pub violations: &'a [BuildViolation],
}

/// Contents of `report.json`.
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub artifact_version: &'static str,
    pub run_id: &'a str,
    pub params_hash: &'a str,
    pub best_effort: bool,
    pub build: BuildSummary<'a>,
    pub verification: &'a VerificationReport,
}

impl<'a> RunReport<'a> {
    pub fn new(
        run_id: &'a str,
        params_hash: &'a str,
        outcome: &'a BuildOutcome,
        verification: &'a VerificationReport,
    ) -> Self {
        Self {
            artifact_version: ARTIFACT_VERSION,
            run_id,
            params_hash,
            best_effort: outcome.best_effort,
            build: BuildSummary {
                metrics: &outcome.metrics,
                frequencies: &outcome.frequencies,
                feasibility: &outcome.feasibility,
                violations: &outcome.violations,
            },
            verification,
        }
    }
}

/// Fail early when an explicit output path would be clobbered.
pub fn ensure_writable(path: &Path, force: bool) -> OutputResult<()> {
    if path.exists() && !force {
        return Err(OutputError::Exists(path.to_path_buf()));
    }
    Ok(())
}

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T, force: bool) -> OutputResult<()> {
    let mut data = serde_json::to_vec_pretty(value)?;
    data.push(b'\n');
    write_bytes_atomic(path, &data, force)
}

/// Write through a sibling temp file and rename into place.
pub fn write_bytes_atomic(path: &Path, data: &[u8], force: bool) -> OutputResult<()> {
    ensure_writable(path, force)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        create_dir_all(parent)?;
    }

    let tmp_path = temp_path(path)?;
    let mut file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(&tmp_path)?;
    file.write_all(data)?;
    file.sync_all()?;

    std::fs::rename(&tmp_path, path)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        sync_dir(parent)?;
    }

    Ok(())
}

/// Per-number totals, then per-position counts.
pub fn write_summary_csv(path: &Path, report: &VerificationReport, force: bool) -> OutputResult<()> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());

    writer.write_record(["number", "total"])?;
    for (number, total) in &report.frequencies {
        writer.write_record([number.to_string(), total.to_string()])?;
    }

    if !report.position_frequencies.is_empty() {
        writer.write_record(["position", "number", "count"])?;
        for (position, counts) in &report.position_frequencies {
            for (number, count) in counts {
                writer.write_record([position.clone(), number.to_string(), count.to_string()])?;
            }
        }
    }

    let data = writer
        .into_inner()
        .map_err(|err| OutputError::Io(err.into_error()))?;
    write_bytes_atomic(path, &data, force)
}

fn temp_path(path: &Path) -> OutputResult<PathBuf> {
    let file_name = path
        .file_name()
        .ok_or_else(|| OutputError::InvalidPath(path.to_path_buf()))?;
    let tmp_name = format!("{}.tmp", file_name.to_string_lossy());
    Ok(path.with_file_name(tmp_name))
}

fn sync_dir(path: &Path) -> io::Result<()> {
    let dir = OpenOptions::new().read(true).open(path)?;
    dir.sync_all()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tombola_core::{Card, Parameters};
    use tombola_verify::Verifier;

    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tombola_output_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    #[test]
    fn existing_files_need_force() {
        let path = temp_dir().join("cards.json");
        write_bytes_atomic(&path, b"first", false).expect("first write");

        let err = write_bytes_atomic(&path, b"second", false).expect_err("no force");
        assert!(matches!(err, OutputError::Exists(_)));
        assert_eq!(fs::read(&path).expect("read"), b"first");

        write_bytes_atomic(&path, b"second", true).expect("forced write");
        assert_eq!(fs::read(&path).expect("read"), b"second");
        assert!(!path.with_file_name("cards.json.tmp").exists());
    }

    #[test]
    fn summary_csv_lists_numbers_then_positions() {
        let params = Parameters::new(2, 1, 1, 2);
        let card = Card::from_matrix(vec![vec![2, 1]]).expect("card");
        let report = Verifier::new(&params).verify(&[card]);

        let path = temp_dir().join("nested").join("summary.csv");
        write_summary_csv(&path, &report, false).expect("write csv");
        let contents = fs::read_to_string(&path).expect("read csv");
        assert_eq!(
            contents,
            "number,total\n1,1\n2,1\nposition,number,count\n\"(0,0)\",2,1\n\"(0,1)\",1,1\n"
        );
    }
}
