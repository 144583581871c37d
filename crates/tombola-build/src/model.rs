use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tombola_core::{Card, SetScope};

use crate::errors::ConstraintClass;
use crate::feasibility::Feasibility;

/// Counters accumulated over one run.
///
/// Only `swap_attempts` and the elapsed time feed back into decisions, through
/// the shared budget.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildMetrics {
    pub swap_attempts: u64,
    pub swaps_applied: u64,
    pub collisions_resolved: u64,
    pub stalls: u64,
    pub cards_rebuilt: u64,
    pub elapsed_ms: u64,
}

/// Constraint left unmet in a best-effort card set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildViolation {
    pub class: ConstraintClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<SetScope>,
    pub detail: String,
}

/// Everything a finished construction run hands to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildOutcome {
    pub cards: Vec<Card>,
    /// Actual placements per number, `1..=R`.
    pub frequencies: BTreeMap<u32, u64>,
    pub metrics: BuildMetrics,
    pub best_effort: bool,
    #[serde(default)]
    pub violations: Vec<BuildViolation>,
    pub feasibility: Feasibility,
    pub engine: String,
    pub seed: u64,
}

impl BuildOutcome {
    /// Whether the caller should treat the run as degraded.
    pub fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }

    pub fn violation_count(&self, class: ConstraintClass) -> usize {
        self.violations
            .iter()
            .filter(|violation| violation.class == class)
            .count()
    }
}

/// Per-number placement counts over a card set.
pub fn count_frequencies(range: u32, cards: &[Card]) -> BTreeMap<u32, u64> {
    let mut counts: BTreeMap<u32, u64> = (1..=range).map(|value| (value, 0)).collect();
    for value in cards.iter().flat_map(|card| card.cells().iter().copied()) {
        *counts.entry(value).or_default() += 1;
    }
    counts
}
