use tombola_core::Parameters;
use tracing::{debug, info, warn};

use crate::constructor::CardConstructor;
use crate::errors::{BuildError, ConstraintClass, ExhaustionReason};
use crate::feasibility::{Feasibility, check_feasibility};
use crate::index::UniquenessIndex;
use crate::ledger::FrequencyAllocator;
use crate::model::{BuildOutcome, count_frequencies};
use crate::parallel::build_concurrently;
use crate::random::{RUN_STREAM, RandomSource, derivation_for};
use crate::state::BuildState;

/// Entry point for building a card set from resolved parameters.
#[derive(Debug, Clone)]
pub struct BuildEngine {
    params: Parameters,
}

impl BuildEngine {
    pub fn new(params: Parameters) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// Structural validation followed by the static feasibility bounds.
    pub fn check(&self) -> Result<Feasibility, BuildError> {
        self.params.validate()?;
        let feasibility = check_feasibility(&self.params).map_err(BuildError::Infeasible)?;
        if let Some(shortfall) = feasibility.card_shortfall() {
            warn!(
                cards = self.params.cards,
                distinct_cards = feasibility.card_capacity.available,
                shortfall,
                "more cards requested than distinct cards exist"
            );
        }
        Ok(feasibility)
    }

    pub fn run(&self) -> Result<BuildOutcome, BuildError> {
        let feasibility = self.check()?;
        let seed = &self.params.seed;
        let derivation = derivation_for(seed.mode);
        let mut rng = RandomSource::derived(derivation, seed.value, RUN_STREAM, 0, &seed.engine)?;
        let engine = rng.engine().to_string();
        let ledger = FrequencyAllocator::allocate(&self.params, &feasibility, &mut rng);
        let mut state = BuildState::new(self.params.clone(), ledger, rng);

        info!(
            range = self.params.range,
            cards = self.params.cards,
            rows = self.params.rows,
            cols = self.params.cols,
            uniformity = self.params.uniformity.as_str(),
            engine = %engine,
            seed = seed.value,
            seed_mode = derivation.id(),
            parallelism = self.params.parallelism,
            "construction started"
        );

        if self.params.parallelism > 1 {
            build_concurrently(&mut state)?;
        }
        build_remaining(&mut state)?;
        tag_final_violations(&mut state);

        state.metrics.elapsed_ms = state.budget.elapsed().as_millis() as u64;
        let best_effort = !state.violations.is_empty();
        info!(
            cards = state.cards.len(),
            swap_attempts = state.metrics.swap_attempts,
            swaps_applied = state.metrics.swaps_applied,
            stalls = state.metrics.stalls,
            cards_rebuilt = state.metrics.cards_rebuilt,
            violations = state.violations.len(),
            best_effort,
            duration_ms = state.metrics.elapsed_ms,
            "construction finished"
        );

        Ok(BuildOutcome {
            frequencies: count_frequencies(self.params.range, &state.cards),
            cards: state.cards,
            metrics: state.metrics,
            best_effort,
            violations: state.violations,
            feasibility,
            engine,
            seed: seed.value,
        })
    }
}

/// Build cards one at a time until `T` are finished.
fn build_remaining(state: &mut BuildState) -> Result<(), BuildError> {
    let total = state.params.cards as usize;
    let allow_best_effort = state.params.allow_best_effort;
    let max_rebuilds = state.params.max_card_rebuilds;

    while state.cards.len() < total {
        let card_index = state.cards.len();
        if state.budget.timed_out() && !allow_best_effort {
            return Err(failure(state, None, card_index, ExhaustionReason::Timeout));
        }

        let repair_enabled = !(allow_best_effort && state.budget.exhausted().is_some());
        let mut constructor =
            CardConstructor::new(card_index, state.rows(), state.cols(), repair_enabled);
        let mut rebuilds = 0_u32;

        while let Err(stalled) = constructor.run(state) {
            if stalled.reason == ExhaustionReason::StallShare
                && rebuilds < max_rebuilds
                && state.budget.exhausted().is_none()
            {
                rebuilds += 1;
                state.metrics.cards_rebuilt += 1;
                warn!(
                    card_index,
                    rebuild = rebuilds,
                    cell = stalled.cell,
                    collisions = stalled.collisions,
                    "rebuilding card"
                );
                constructor.teardown(state);
                continue;
            }

            let reason = match stalled.reason {
                ExhaustionReason::StallShare => ExhaustionReason::RebuildLimit,
                other => other,
            };
            if !allow_best_effort {
                return Err(failure(state, stalled.class, card_index, reason));
            }
            warn!(
                card_index,
                reason = %reason,
                "continuing without repair"
            );
            constructor.resume_without_repair();
        }

        state.cards.push(constructor.into_card());
        debug!(card_index, rebuilds, "card finished");
    }

    Ok(())
}

fn failure(
    state: &mut BuildState,
    class: Option<ConstraintClass>,
    card_index: usize,
    reason: ExhaustionReason,
) -> BuildError {
    state.metrics.elapsed_ms = state.budget.elapsed().as_millis() as u64;
    warn!(
        card_index,
        cards_completed = state.cards.len(),
        reason = %reason,
        "construction failed"
    );
    BuildError::ConstructionFailed {
        class,
        card_index,
        cards_completed: state.cards.len(),
        reason,
        metrics: Box::new(state.metrics.clone()),
    }
}

/// Tag every constraint the finished set still breaks.
///
/// Recomputed from the cards, since later repairs may have fixed collisions
/// an earlier card was committed with.
fn tag_final_violations(state: &mut BuildState) {
    let mut index = UniquenessIndex::new(&state.params.unique_scope);
    let mut found = Vec::new();
    for (card_index, card) in state.cards.iter().enumerate() {
        for collision in index.commit(card) {
            found.push((
                ConstraintClass::SetCollision,
                Some(card_index),
                Some(collision.scope),
                format!("line {} repeats {:?}", collision.line, collision.key),
            ));
        }
        if let Some(twin) = state.cards[..card_index].iter().position(|other| other == card) {
            found.push((
                ConstraintClass::IdenticalCard,
                Some(card_index),
                None,
                format!("identical to card {twin}"),
            ));
        }
    }
    for (class, card_index, scope, detail) in found {
        state.record_violation(class, card_index, scope, detail);
    }

    let counts = count_frequencies(state.params.range, &state.cards);
    for (value, count) in counts {
        let target = state.ledger.target(value);
        if count != target {
            state.record_violation(
                ConstraintClass::FrequencyDrift,
                None,
                None,
                format!("number {value} placed {count} times, target {target}"),
            );
        }
    }

    let min_distance = state.params.min_distance;
    let crowded: Vec<(usize, usize)> = state
        .cards
        .iter()
        .enumerate()
        .map(|(index, card)| (index, card.close_pairs(min_distance).len()))
        .filter(|(_, pairs)| *pairs > 0)
        .collect();
    for (index, pairs) in crowded {
        state.record_violation(
            ConstraintClass::MinDistance,
            Some(index),
            None,
            format!("{pairs} pair(s) closer than {min_distance}"),
        );
    }

    let duplicates: Vec<(usize, Vec<u32>)> = state
        .cards
        .iter()
        .enumerate()
        .map(|(index, card)| (index, card.duplicate_values()))
        .filter(|(_, values)| !values.is_empty())
        .collect();
    for (index, values) in duplicates {
        state.record_violation(
            ConstraintClass::DuplicateInCard,
            Some(index),
            None,
            format!("values {values:?} repeat within the card"),
        );
    }
}
