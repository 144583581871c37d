//! Independent verification of finished card sets.
//!
//! Everything is recomputed from raw card contents; nothing accumulated
//! during construction is trusted.

pub mod artifacts;
pub mod errors;
pub mod model;
pub mod recorded;
pub mod report;
pub mod stats;
pub mod verifier;

pub use artifacts::{
    CardEntry, CardId, CardsArtifact, RunMeta, load_cards_artifact, verify_artifacts,
};
pub use errors::VerifyError;
pub use model::{CheckResult, ChiSquare, UniformityStats, VerificationReport};
pub use recorded::{RecordedReport, deviations, load_recorded_report};
pub use report::{ReportContext, render_report};
pub use verifier::Verifier;
