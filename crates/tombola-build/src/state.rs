use tombola_core::{Card, Parameters, SetScope};

use crate::budget::Budget;
use crate::errors::ConstraintClass;
use crate::index::UniquenessIndex;
use crate::ledger::FrequencyLedger;
use crate::model::{BuildMetrics, BuildViolation};
use crate::random::RandomSource;

/// Mutable state shared by the constructor and the repair loop during one run.
pub struct BuildState {
    pub params: Parameters,
    pub ledger: FrequencyLedger,
    pub index: UniquenessIndex,
    /// Finished cards, committed to `index`, in output order.
    pub cards: Vec<Card>,
    pub rng: RandomSource,
    pub budget: Budget,
    pub metrics: BuildMetrics,
    pub violations: Vec<BuildViolation>,
}

impl BuildState {
    pub fn new(params: Parameters, ledger: FrequencyLedger, rng: RandomSource) -> Self {
        let index = UniquenessIndex::new(&params.unique_scope);
        let budget = Budget::new(params.swap_iterations, params.build_timeout());
        Self {
            params,
            ledger,
            index,
            cards: Vec::new(),
            rng,
            budget,
            metrics: BuildMetrics::default(),
            violations: Vec::new(),
        }
    }

    pub fn rows(&self) -> usize {
        self.params.rows as usize
    }

    pub fn cols(&self) -> usize {
        self.params.cols as usize
    }

    /// Cards still to build, the one in progress included.
    pub fn cards_left(&self) -> u64 {
        u64::from(self.params.cards).saturating_sub(self.cards.len() as u64)
    }

    pub fn record_violation(
        &mut self,
        class: ConstraintClass,
        card_index: Option<usize>,
        scope: Option<SetScope>,
        detail: String,
    ) {
        self.violations.push(BuildViolation {
            class,
            card_index,
            scope,
            detail,
        });
    }
}
