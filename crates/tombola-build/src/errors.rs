use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::BuildMetrics;

/// Static bound checked before any construction work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bound {
    /// `R >= m * n`, otherwise a card cannot avoid repeats.
    DuplicateAvoidance,
    /// `P mod R == 0` under strict uniformity.
    StrictUniformity,
    /// `T * m <= C(R, n)` when row-sets must be unique.
    RowSetCapacity,
    /// `T * n <= C(R, m)` when column-sets must be unique.
    ColSetCapacity,
    /// `1 + (m * n - 1) * min_distance <= R`, the tightest spaced card.
    MinDistance,
}

/// One violated bound with the smallest parameter change that satisfies it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundViolation {
    pub bound: Bound,
    pub message: String,
    pub suggestion: String,
    /// Smallest `R` that satisfies this bound on its own, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_range: Option<u64>,
}

/// Parameters that admit no solution. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfeasibleParameters {
    pub violations: Vec<BoundViolation>,
}

impl fmt::Display for InfeasibleParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self
            .violations
            .iter()
            .map(|violation| format!("{} ({})", violation.message, violation.suggestion))
            .collect();
        write!(f, "infeasible parameters: {}", messages.join("; "))
    }
}

impl std::error::Error for InfeasibleParameters {}

/// Constraint family an unresolved violation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintClass {
    SetCollision,
    FrequencyDrift,
    DuplicateInCard,
    IdenticalCard,
    MinDistance,
}

impl fmt::Display for ConstraintClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConstraintClass::SetCollision => "set collision",
            ConstraintClass::FrequencyDrift => "frequency drift",
            ConstraintClass::DuplicateInCard => "duplicate in card",
            ConstraintClass::IdenticalCard => "identical card",
            ConstraintClass::MinDistance => "min distance",
        };
        f.write_str(label)
    }
}

/// Why a repair or build budget ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionReason {
    /// The run-wide `swap_iterations` counter reached its limit.
    SwapBudget,
    /// The run-wide `build_timeout` elapsed.
    Timeout,
    /// A single stall used up its share of the swap budget.
    StallShare,
    /// A card was rebuilt `max_card_rebuilds` times without success.
    RebuildLimit,
}

impl fmt::Display for ExhaustionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExhaustionReason::SwapBudget => "swap budget exhausted",
            ExhaustionReason::Timeout => "build timeout elapsed",
            ExhaustionReason::StallShare => "stall budget share spent",
            ExhaustionReason::RebuildLimit => "card rebuild limit reached",
        };
        f.write_str(label)
    }
}

/// A stall SwapRepair could not unblock within its budget share.
///
/// Handled by the construction loop (rebuild, best-effort or failure); it is
/// never returned from [`crate::BuildEngine::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructionStalled {
    pub card_index: usize,
    pub cell: usize,
    pub collisions: usize,
    /// Constraint still open when the repair gave up, if any.
    pub class: Option<ConstraintClass>,
    pub reason: ExhaustionReason,
}

/// Errors emitted by the construction engine.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    InvalidParameters(#[from] tombola_core::Error),
    #[error("{0}")]
    Infeasible(InfeasibleParameters),
    #[error("unknown rng engine '{0}'")]
    UnknownEngine(String),
    #[error(
        "construction failed at card {card_index} ({}): {reason}; {cards_completed} card(s) completed",
        class_label(.class)
    )]
    ConstructionFailed {
        class: Option<ConstraintClass>,
        card_index: usize,
        cards_completed: usize,
        reason: ExhaustionReason,
        metrics: Box<BuildMetrics>,
    },
    #[error("shared build state lock poisoned")]
    LockPoisoned,
    #[error("worker pool error: {0}")]
    WorkerPool(String),
}

fn class_label(class: &Option<ConstraintClass>) -> String {
    class
        .map(|class| class.to_string())
        .unwrap_or_else(|| "no open constraint".to_string())
}
