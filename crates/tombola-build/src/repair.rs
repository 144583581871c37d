use tombola_core::{Card, SetScope, keeps_distance};
use tracing::debug;

use crate::errors::ExhaustionReason;
use crate::index::UniquenessIndex;
use crate::ledger::FrequencyLedger;
use crate::state::BuildState;

/// A move applied to the card set, kept so it can be undone.
#[derive(Debug, Clone, Copy)]
enum Move {
    /// Exchange two cells of the card being built.
    Intra { a: usize, b: usize },
    /// Exchange a cell of the current card with a cell of a finished card.
    Cross { a: usize, card: usize, cell: usize },
    /// Return one placement to the ledger and take a different number.
    Substitute { a: usize, old: u32, new: u32 },
}

/// An open constraint on the card being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// A complete line whose set is committed already.
    Line(SetScope, usize),
    /// Two placed cells closer than `min_distance`.
    Spacing(usize, usize),
    /// The complete card equals the finished card at this index.
    Twin(usize),
}

/// Randomized local search over placed cells.
///
/// Works on the complete lines of the card being built: a line whose set is
/// already committed counts as one violation, and so does a pair of cells
/// closer than `min_distance` or a complete card identical to a finished one. Every attempt costs one unit of the run-wide
/// swap budget.
pub struct SwapRepair;

impl SwapRepair {
    /// Open constraints on `card` with its first `filled` cells placed.
    pub fn violations(
        index: &UniquenessIndex,
        cards: &[Card],
        card: &Card,
        filled: usize,
        min_distance: u32,
    ) -> Vec<Violation> {
        let rows = card.rows();
        let cols = card.cols();
        let mut found = Vec::new();
        if index.is_active(SetScope::RowSets) {
            for row in 0..rows {
                if (row + 1) * cols <= filled && index.count(SetScope::RowSets, &card.row_set(row)) > 0 {
                    found.push(Violation::Line(SetScope::RowSets, row));
                }
            }
        }
        if index.is_active(SetScope::ColSets) {
            for col in 0..cols {
                if (rows - 1) * cols + col < filled
                    && index.count(SetScope::ColSets, &card.col_set(col)) > 0
                {
                    found.push(Violation::Line(SetScope::ColSets, col));
                }
            }
        }
        found.extend(
            card.close_pairs(min_distance)
                .into_iter()
                .filter(|(_, b)| *b < filled)
                .map(|(a, b)| Violation::Spacing(a, b)),
        );
        if filled == card.len()
            && let Some(twin) = cards.iter().position(|other| other == card)
        {
            found.push(Violation::Twin(twin));
        }
        found
    }

    fn open(state: &BuildState, card: &Card, filled: usize) -> Vec<Violation> {
        Self::violations(&state.index, &state.cards, card, filled, state.params.min_distance)
    }

    /// Search until no violation is left or the stall's budget share runs out.
    pub fn resolve(
        state: &mut BuildState,
        card: &mut Card,
        filled: usize,
    ) -> Result<(), ExhaustionReason> {
        let mut current = Self::open(state, card, filled).len();
        let share = state.budget.stall_share();
        let mut spent = 0_u64;

        while current > 0 {
            if let Some(reason) = state.budget.exhausted() {
                return Err(reason);
            }
            if spent >= share {
                return Err(ExhaustionReason::StallShare);
            }
            state.budget.consume();
            state.metrics.swap_attempts += 1;
            spent += 1;

            let Some(applied) = Self::propose(state, card, filled) else {
                continue;
            };
            let after = Self::open(state, card, filled).len();
            if after < current || (after == current && state.rng.coin()) {
                state.metrics.swaps_applied += 1;
                state.metrics.collisions_resolved += current.saturating_sub(after) as u64;
                current = after;
            } else {
                Self::revert(state, card, applied);
            }
        }

        debug!(attempts = spent, "stall resolved");
        Ok(())
    }

    /// Sample and apply one move touching a violating line; `None` when the
    /// sample is not applicable.
    fn propose(state: &mut BuildState, card: &mut Card, filled: usize) -> Option<Move> {
        let lines = Self::open(state, card, filled);
        if lines.is_empty() {
            return None;
        }
        let cells = match lines[state.rng.next_uniform_in(0, lines.len())] {
            Violation::Line(scope, line) => line_cells(card, scope, line),
            Violation::Spacing(a, b) => vec![a, b],
            Violation::Twin(_) => (0..filled).collect(),
        };
        let a = cells[state.rng.next_uniform_in(0, cells.len())];

        match state.rng.next_uniform_in(0, 3) {
            0 => Self::swap_within(state, card, filled, a),
            1 if !state.cards.is_empty() => Self::swap_across(state, card, filled, a),
            _ => Self::substitute(state, card, filled, a),
        }
    }

    fn swap_within(state: &mut BuildState, card: &mut Card, filled: usize, a: usize) -> Option<Move> {
        let b = state.rng.next_uniform_in(0, filled);
        if b == a {
            return None;
        }
        exchange(&mut state.ledger, card, a, b);
        Some(Move::Intra { a, b })
    }

    fn swap_across(state: &mut BuildState, card: &mut Card, filled: usize, a: usize) -> Option<Move> {
        let other = state.rng.next_uniform_in(0, state.cards.len());
        let cell = state.rng.next_uniform_in(0, state.cards[other].len());
        let ours = card.cell(a);
        let theirs = state.cards[other].cell(cell);
        if ours == theirs || card.contains(theirs) || state.cards[other].contains(ours) {
            return None;
        }

        let mut values = card.cells()[..filled].to_vec();
        values[a] = theirs;
        if !completable(state, &values, card.len() - filled) {
            return None;
        }
        let rest: Vec<u32> = state.cards[other]
            .cells()
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != cell)
            .map(|(_, value)| *value)
            .collect();
        if !keeps_distance(&rest, ours, state.params.min_distance) {
            return None;
        }

        // The finished card must stay collision-free and distinct after the exchange.
        state.index.retract(&state.cards[other]);
        state.cards[other].set_cell(cell, ours);
        let changed = &state.cards[other];
        let repeated = state
            .cards
            .iter()
            .enumerate()
            .any(|(index, finished)| index != other && finished == changed);
        if repeated || !state.index.collisions(changed).is_empty() {
            state.cards[other].set_cell(cell, theirs);
            state.index.commit(&state.cards[other]);
            return None;
        }
        state.index.commit(&state.cards[other]);
        card.set_cell(a, theirs);
        relocate(&mut state.ledger, ours, a, cell);
        relocate(&mut state.ledger, theirs, cell, a);
        Some(Move::Cross { a, card: other, cell })
    }

    fn substitute(state: &mut BuildState, card: &mut Card, filled: usize, a: usize) -> Option<Move> {
        let old = card.cell(a);
        let pool: Vec<u32> = (1..=state.ledger.range())
            .filter(|value| state.ledger.remaining(*value) > 0 && !card.contains(*value))
            .collect();
        if pool.is_empty() {
            return None;
        }
        let new = pool[state.rng.next_uniform_in(0, pool.len())];

        state.ledger.give_back(old);
        state.ledger.take(new);
        let mut values = card.cells()[..filled].to_vec();
        values[a] = new;
        if !completable(state, &values, card.len() - filled) {
            state.ledger.give_back(new);
            state.ledger.take(old);
            return None;
        }
        card.set_cell(a, new);
        state.ledger.give_back_position(old, a);
        state.ledger.take_position(new, a);
        Some(Move::Substitute { a, old, new })
    }

    fn revert(state: &mut BuildState, card: &mut Card, applied: Move) {
        match applied {
            Move::Intra { a, b } => exchange(&mut state.ledger, card, a, b),
            Move::Cross { a, card: other, cell } => {
                let theirs = card.cell(a);
                let ours = state.cards[other].cell(cell);
                state.index.retract(&state.cards[other]);
                state.cards[other].set_cell(cell, theirs);
                state.index.commit(&state.cards[other]);
                card.set_cell(a, ours);
                relocate(&mut state.ledger, ours, cell, a);
                relocate(&mut state.ledger, theirs, a, cell);
            }
            Move::Substitute { a, old, new } => {
                card.set_cell(a, old);
                state.ledger.give_back(new);
                state.ledger.take(old);
                state.ledger.give_back_position(new, a);
                state.ledger.take_position(old, a);
            }
        }
    }
}

/// Whether a card holding `values` can still be finished without making a
/// per-number total unreachable for the cards after it.
fn completable(state: &BuildState, values: &[u32], cells_left: usize) -> bool {
    let cards_left = state.cards_left();
    values
        .iter()
        .all(|value| state.ledger.remaining(*value) < cards_left)
        && state.ledger.forced_numbers(values, cards_left).len() <= cells_left
}

fn line_cells(card: &Card, scope: SetScope, line: usize) -> Vec<usize> {
    let cols = card.cols();
    match scope {
        SetScope::RowSets => (line * cols..(line + 1) * cols).collect(),
        SetScope::ColSets => (0..card.rows()).map(|row| row * cols + line).collect(),
    }
}

fn exchange(ledger: &mut FrequencyLedger, card: &mut Card, a: usize, b: usize) {
    let (first, second) = (card.cell(a), card.cell(b));
    card.set_cell(a, second);
    card.set_cell(b, first);
    relocate(ledger, first, a, b);
    relocate(ledger, second, b, a);
}

fn relocate(ledger: &mut FrequencyLedger, value: u32, from: usize, to: usize) {
    ledger.give_back_position(value, from);
    ledger.take_position(value, to);
}
