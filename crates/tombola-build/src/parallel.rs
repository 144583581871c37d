use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Instant;

use rayon::prelude::*;
use tombola_core::{Card, Parameters, keeps_distance};
use tracing::{debug, info};

use crate::errors::BuildError;
use crate::index::UniquenessIndex;
use crate::ledger::FrequencyLedger;
use crate::random::{CARD_STREAM, HashedSeed, RandomSource};
use crate::state::BuildState;

/// Shuffles a worker tries before handing its card back.
const ARRANGE_ATTEMPTS: usize = 16;

/// Everything workers contend for, behind one lock.
struct SharedState {
    ledger: FrequencyLedger,
    index: UniquenessIndex,
    /// Cards whose numbers have been taken from the ledger.
    reserved: u64,
    built: HashSet<Card>,
}

enum WorkerOutcome {
    Built { card_index: usize, card: Card },
    /// Numbers reserved but never arranged into a collision-free card.
    Deferred { numbers: Vec<u32> },
    /// The deadline passed or the ledger ran dry before reserving.
    Skipped,
}

/// Build as many cards as possible on a rayon pool.
///
/// Workers reserve a card's numbers from the shared ledger, arrange them with
/// their own stream and claim the card's sets with an atomic try-commit.
/// Deferred numbers go back to the ledger; the sequential loop finishes the
/// remaining cards.
pub fn build_concurrently(state: &mut BuildState) -> Result<(), BuildError> {
    let params = state.params.clone();
    let deadline = state.budget.deadline();
    let shared = Mutex::new(SharedState {
        ledger: std::mem::take(&mut state.ledger),
        index: std::mem::take(&mut state.index),
        reserved: 0,
        built: HashSet::new(),
    });

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(params.parallelism)
        .build()
        .map_err(|err| BuildError::WorkerPool(err.to_string()))?;
    let results: Vec<Result<WorkerOutcome, BuildError>> = pool.install(|| {
        (0..params.cards as usize)
            .into_par_iter()
            .map(|card_index| build_one(&params, &shared, deadline, card_index))
            .collect()
    });

    let shared = shared.into_inner().map_err(|_| BuildError::LockPoisoned)?;
    state.ledger = shared.ledger;
    state.index = shared.index;

    let mut built = Vec::new();
    let mut handed_back = 0_u64;
    for result in results {
        match result? {
            WorkerOutcome::Built { card_index, card } => built.push((card_index, card)),
            WorkerOutcome::Deferred { numbers } => {
                for value in numbers {
                    state.ledger.give_back(value);
                }
                handed_back += 1;
            }
            WorkerOutcome::Skipped => handed_back += 1,
        }
    }
    built.sort_by_key(|(card_index, _)| *card_index);
    state.cards.extend(built.into_iter().map(|(_, card)| card));
    state.metrics.cards_rebuilt += handed_back;

    info!(
        workers = params.parallelism,
        built = state.cards.len(),
        handed_back,
        "parallel phase finished"
    );
    Ok(())
}

fn build_one(
    params: &Parameters,
    shared: &Mutex<SharedState>,
    deadline: Option<Instant>,
    card_index: usize,
) -> Result<WorkerOutcome, BuildError> {
    let mut rng = RandomSource::derived(
        &HashedSeed,
        params.seed.value,
        CARD_STREAM,
        card_index as u64,
        &params.seed.engine,
    )?;
    let rows = params.rows as usize;
    let cols = params.cols as usize;

    let numbers = {
        let mut guard = shared.lock().map_err(|_| BuildError::LockPoisoned)?;
        if past(deadline) {
            return Ok(WorkerOutcome::Skipped);
        }
        let cards_left = u64::from(params.cards).saturating_sub(guard.reserved);
        let Some(numbers) = guard.ledger.reserve_card(&mut rng, rows * cols, cards_left) else {
            return Ok(WorkerOutcome::Skipped);
        };
        guard.reserved += 1;
        numbers
    };

    let spaced = numbers
        .iter()
        .enumerate()
        .all(|(index, value)| keeps_distance(&numbers[..index], *value, params.min_distance));
    if !spaced {
        debug!(card_index, "reserved numbers too close, deferring card");
        return Ok(WorkerOutcome::Deferred { numbers });
    }

    let mut arrangement = numbers.clone();
    for _ in 0..ARRANGE_ATTEMPTS {
        if past(deadline) {
            break;
        }
        rng.shuffle(&mut arrangement);
        let card = Card::from_cells(rows, cols, arrangement.clone())?;
        let mut guard = shared.lock().map_err(|_| BuildError::LockPoisoned)?;
        if guard.built.contains(&card) {
            continue;
        }
        if guard.index.try_commit(&card).is_ok() {
            guard.built.insert(card.clone());
            return Ok(WorkerOutcome::Built { card_index, card });
        }
    }

    debug!(card_index, "arrangement kept colliding, deferring card");
    Ok(WorkerOutcome::Deferred { numbers })
}

fn past(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| Instant::now() >= deadline)
}
