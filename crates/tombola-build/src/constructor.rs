use tombola_core::{Card, SetScope, keeps_distance};
use tracing::{debug, warn};

use crate::errors::{ConstraintClass, ConstructionStalled, ExhaustionReason};
use crate::repair::{SwapRepair, Violation};
use crate::state::BuildState;

/// Where one card is in its construction.
///
/// `Filling -> Stalled -> Repairing -> Filling -> ... -> Filled`, or `Failed`
/// when a repair runs out of budget. A complete card that repeats a committed
/// set or an earlier card goes back to `Repairing` on its last cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardPhase {
    /// Next cell to fill; equal to the cell count once the grid is full.
    Filling { cell: usize },
    Stalled { cell: usize },
    Repairing { cell: usize },
    Filled,
    Failed { cell: usize, reason: ExhaustionReason },
}

impl CardPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, CardPhase::Filled | CardPhase::Failed { .. })
    }
}

/// Fills one card cell by cell in row-major order.
#[derive(Debug, Clone)]
pub struct CardConstructor {
    card_index: usize,
    card: Card,
    phase: CardPhase,
    repair_enabled: bool,
}

impl CardConstructor {
    pub fn new(card_index: usize, rows: usize, cols: usize, repair_enabled: bool) -> Self {
        Self {
            card_index,
            card: Card::empty(rows, cols),
            phase: CardPhase::Filling { cell: 0 },
            repair_enabled,
        }
    }

    pub fn phase(&self) -> CardPhase {
        self.phase
    }

    pub fn card(&self) -> &Card {
        &self.card
    }

    pub fn card_index(&self) -> usize {
        self.card_index
    }

    /// Advance until the card is filled and committed, or a repair gives up.
    pub fn run(&mut self, state: &mut BuildState) -> Result<(), ConstructionStalled> {
        while !self.phase.is_terminal() {
            self.step(state);
        }
        let CardPhase::Failed { cell, reason } = self.phase else {
            return Ok(());
        };
        let open = SwapRepair::violations(
            &state.index,
            &state.cards,
            &self.card,
            cell + 1,
            state.params.min_distance,
        );
        let collisions = open
            .iter()
            .filter(|violation| matches!(violation, Violation::Line(..)))
            .count();
        let spaced = !open
            .iter()
            .any(|violation| matches!(violation, Violation::Spacing(..)));
        let class = if collisions > 0 {
            Some(ConstraintClass::SetCollision)
        } else if !spaced {
            Some(ConstraintClass::MinDistance)
        } else if open.is_empty() {
            None
        } else {
            Some(ConstraintClass::IdenticalCard)
        };
        Err(ConstructionStalled {
            card_index: self.card_index,
            cell,
            collisions,
            class,
            reason,
        })
    }

    /// Perform exactly one transition.
    pub fn step(&mut self, state: &mut BuildState) {
        let phase = self.phase;
        self.phase = match phase {
            CardPhase::Filling { cell } if cell == self.card.len() => self.commit(state),
            CardPhase::Filling { cell } => {
                let candidates = self.candidates(state, cell);
                let weights: Vec<u64> = candidates
                    .iter()
                    .map(|value| state.ledger.remaining(*value))
                    .collect();
                match state.rng.pick_weighted(&weights) {
                    Some(choice) => {
                        self.place(state, cell, candidates[choice]);
                        CardPhase::Filling { cell: cell + 1 }
                    }
                    None => CardPhase::Stalled { cell },
                }
            }
            CardPhase::Stalled { cell } => self.place_fallback(state, cell),
            CardPhase::Repairing { cell } => {
                match SwapRepair::resolve(state, &mut self.card, cell + 1) {
                    Ok(()) => CardPhase::Filling { cell: cell + 1 },
                    Err(reason) => CardPhase::Failed { cell, reason },
                }
            }
            terminal => terminal,
        };
    }

    /// Hand every placed value back to the ledger and start the card over.
    pub fn teardown(&mut self, state: &mut BuildState) {
        for cell in 0..self.card.len() {
            let value = self.card.cell(cell);
            if value != 0 {
                state.ledger.give_back(value);
                state.ledger.give_back_position(value, cell);
                self.card.set_cell(cell, 0);
            }
        }
        self.phase = CardPhase::Filling { cell: 0 };
    }

    /// Continue past a failed repair, keeping the unresolved collision.
    pub fn resume_without_repair(&mut self) {
        self.repair_enabled = false;
        if let CardPhase::Failed { cell, .. } = self.phase {
            self.phase = CardPhase::Filling { cell: cell + 1 };
        }
    }

    pub fn into_card(self) -> Card {
        self.card
    }

    fn candidates(&self, state: &BuildState, cell: usize) -> Vec<u32> {
        let filled = &self.card.cells()[..cell];
        let legal = state
            .ledger
            .legal_numbers(filled, self.card.len() - cell, state.cards_left());
        let min_distance = state.params.min_distance;
        let valid: Vec<u32> = legal
            .into_iter()
            .filter(|value| keeps_distance(filled, *value, min_distance))
            .filter(|value| self.line_collisions(state, cell, *value) == 0)
            .collect();

        if state.ledger.has_positions() {
            let preferred: Vec<u32> = valid
                .iter()
                .copied()
                .filter(|value| state.ledger.position_remaining(*value, cell).unwrap_or(0) > 0)
                .collect();
            if !preferred.is_empty() {
                return preferred;
            }
        }
        valid
    }

    /// Committed sets the row and column completed by `value` at `cell` would repeat.
    fn line_collisions(&self, state: &BuildState, cell: usize, value: u32) -> usize {
        let (row, col) = self.card.position(cell);
        let mut collisions = 0;
        if col + 1 == self.card.cols() && state.index.is_active(SetScope::RowSets) {
            let mut line = self.card.row_values(row).to_vec();
            line[col] = value;
            if state.index.contains(SetScope::RowSets, &line) {
                collisions += 1;
            }
        }
        if row + 1 == self.card.rows() && state.index.is_active(SetScope::ColSets) {
            let mut line = self.card.col_values(col);
            line[row] = value;
            if state.index.contains(SetScope::ColSets, &line) {
                collisions += 1;
            }
        }
        collisions
    }

    fn place(&mut self, state: &mut BuildState, cell: usize, value: u32) {
        state.ledger.take(value);
        state.ledger.take_position(value, cell);
        self.card.set_cell(cell, value);
    }

    /// Place the legal value with the fewest collisions and spacing conflicts,
    /// then hand over to repair.
    fn place_fallback(&mut self, state: &mut BuildState, cell: usize) -> CardPhase {
        state.metrics.stalls += 1;
        let filled = &self.card.cells()[..cell];
        let legal = state
            .ledger
            .legal_numbers(filled, self.card.len() - cell, state.cards_left());
        let scored: Vec<(u32, usize)> = legal
            .into_iter()
            .map(|value| {
                let too_close = filled
                    .iter()
                    .filter(|other| !keeps_distance(&[**other], value, state.params.min_distance))
                    .count();
                (value, self.line_collisions(state, cell, value) + too_close)
            })
            .collect();
        let Some(fewest) = scored.iter().map(|(_, collisions)| *collisions).min() else {
            return CardPhase::Failed {
                cell,
                reason: ExhaustionReason::StallShare,
            };
        };
        let pool: Vec<u32> = scored
            .iter()
            .filter(|(_, collisions)| *collisions == fewest)
            .map(|(value, _)| *value)
            .collect();
        let weights: Vec<u64> = pool.iter().map(|value| state.ledger.remaining(*value)).collect();
        let Some(choice) = state.rng.pick_weighted(&weights) else {
            return CardPhase::Failed {
                cell,
                reason: ExhaustionReason::StallShare,
            };
        };
        self.place(state, cell, pool[choice]);

        if self.repair_enabled {
            warn!(
                card_index = self.card_index,
                cell,
                collisions = fewest,
                "card stalled, repairing"
            );
            CardPhase::Repairing { cell }
        } else {
            CardPhase::Filling { cell: cell + 1 }
        }
    }

    fn commit(&mut self, state: &mut BuildState) -> CardPhase {
        let last = self.card.len() - 1;
        let twin = state.cards.iter().position(|card| *card == self.card);

        if self.repair_enabled {
            if let Some(twin) = twin {
                debug!(card_index = self.card_index, twin, "identical card, repairing");
                return CardPhase::Repairing { cell: last };
            }
            return match state.index.try_commit(&self.card) {
                Ok(()) => {
                    debug!(card_index = self.card_index, "card committed");
                    CardPhase::Filled
                }
                Err(_) => CardPhase::Repairing { cell: last },
            };
        }

        if let Some(twin) = twin {
            warn!(card_index = self.card_index, twin, "identical card left unresolved");
        }
        for collision in state.index.commit(&self.card) {
            warn!(
                card_index = self.card_index,
                scope = collision.scope.as_str(),
                line = collision.line,
                "set collision left unresolved"
            );
        }
        CardPhase::Filled
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use tombola_core::{Parameters, set_key};

    use super::*;
    use crate::feasibility::check_feasibility;
    use crate::ledger::FrequencyAllocator;
    use crate::random::RandomSource;

    fn state_for(params: Parameters, seed: u64) -> BuildState {
        let feasibility = check_feasibility(&params).expect("feasible");
        let mut rng = RandomSource::new(seed, "chacha20").expect("engine");
        let ledger = FrequencyAllocator::allocate(&params, &feasibility, &mut rng);
        BuildState::new(params, ledger, rng)
    }

    #[test]
    fn fills_a_permutation_card() {
        let mut state = state_for(Parameters::new(3, 1, 1, 3), 5);
        let mut constructor = CardConstructor::new(0, 1, 3, true);
        constructor.run(&mut state).expect("card built");
        assert_eq!(constructor.phase(), CardPhase::Filled);

        let mut values = constructor.into_card().cells().to_vec();
        values.sort_unstable();
        assert_eq!(values, vec![1, 2, 3]);
        assert_eq!(state.ledger.remaining_total(), 0);
        assert!(state.index.contains(SetScope::RowSets, &[3, 1, 2]));
    }

    #[test]
    fn steps_through_filling_phases() {
        let mut state = state_for(Parameters::new(4, 1, 2, 2), 1);
        let mut constructor = CardConstructor::new(0, 2, 2, true);
        constructor.step(&mut state);
        assert_eq!(constructor.phase(), CardPhase::Filling { cell: 1 });
        for _ in 0..3 {
            constructor.step(&mut state);
        }
        assert_eq!(constructor.phase(), CardPhase::Filling { cell: 4 });
        constructor.step(&mut state);
        assert_eq!(constructor.phase(), CardPhase::Filled);
    }

    #[test]
    fn stall_places_fallback_and_repairs() {
        // Only 1 and 2 have quota left and {1, 2} is already committed,
        // so the last cell must stall.
        let mut params = Parameters::new(4, 2, 1, 2);
        params.unique_scope = BTreeSet::from([SetScope::RowSets]);
        let mut state = state_for(params, 2);
        state.ledger = crate::ledger::FrequencyLedger::from_targets(vec![1, 1, 0, 0]);
        state.index.insert(SetScope::RowSets, set_key([1, 2]));

        let mut constructor = CardConstructor::new(0, 1, 2, true);
        constructor.step(&mut state);
        constructor.step(&mut state);
        assert!(matches!(constructor.phase(), CardPhase::Stalled { cell: 1 }));
        constructor.step(&mut state);
        assert!(matches!(constructor.phase(), CardPhase::Repairing { cell: 1 }));
        assert_eq!(state.metrics.stalls, 1);
    }

    #[test]
    fn identical_card_is_reworked_before_commit() {
        let mut params = Parameters::new(4, 2, 1, 2);
        params.unique_scope = BTreeSet::new();
        let mut state = state_for(params, 4);
        state.ledger = crate::ledger::FrequencyLedger::from_targets(vec![2, 2, 0, 0]);
        state.ledger.take(1);
        state.ledger.take(2);
        state.cards.push(Card::from_matrix(vec![vec![1, 2]]).expect("card"));

        let mut constructor = CardConstructor::new(1, 1, 2, true);
        constructor.run(&mut state).expect("card built");
        assert_eq!(constructor.phase(), CardPhase::Filled);
        assert_eq!(constructor.card().cells(), &[2, 1]);
        assert_eq!(state.ledger.remaining_total(), 0);
    }

    #[test]
    fn spaced_cards_skip_close_candidates() {
        let mut params = Parameters::new(12, 4, 1, 3);
        params.min_distance = 3;
        params.unique_scope = BTreeSet::new();
        for seed in 0..20 {
            let mut state = state_for(params.clone(), seed);
            let mut constructor = CardConstructor::new(0, 1, 3, true);
            constructor.run(&mut state).expect("card built");
            assert!(
                constructor.card().close_pairs(3).is_empty(),
                "seed {seed}: {:?}",
                constructor.card().cells()
            );
        }
    }

    #[test]
    fn teardown_restores_the_ledger() {
        let mut state = state_for(Parameters::new(6, 2, 1, 3), 8);
        let before = state.ledger.remaining_total();
        let mut constructor = CardConstructor::new(0, 1, 3, true);
        constructor.step(&mut state);
        constructor.step(&mut state);
        constructor.teardown(&mut state);
        assert_eq!(state.ledger.remaining_total(), before);
        assert_eq!(constructor.phase(), CardPhase::Filling { cell: 0 });
        assert!(constructor.card().cells().iter().all(|value| *value == 0));
    }

    #[test]
    fn commit_without_repair_keeps_the_collision() {
        let mut state = state_for(Parameters::new(4, 2, 1, 2), 3);
        state.ledger = crate::ledger::FrequencyLedger::from_targets(vec![1, 1, 0, 0]);
        state.index.insert(SetScope::RowSets, set_key([1, 2]));

        let mut constructor = CardConstructor::new(1, 1, 2, false);
        constructor.run(&mut state).expect("no repair to fail");
        assert_eq!(constructor.phase(), CardPhase::Filled);
        assert_eq!(state.metrics.stalls, 1);
        assert_eq!(state.index.count(SetScope::RowSets, &set_key([1, 2])), 2);
    }
}
