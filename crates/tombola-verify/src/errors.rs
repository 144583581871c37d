use thiserror::Error;

/// Errors emitted while loading or re-verifying card artifacts.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("invalid artifact: {0}")]
    InvalidArtifact(String),
    #[error("invalid report: {}", .0.join("; "))]
    InvalidReport(Vec<String>),
    #[error("verification failed: {}", .checks.join(", "))]
    Failed { checks: Vec<String> },
    #[error(transparent)]
    Core(#[from] tombola_core::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
