use std::collections::BTreeMap;

use tombola_core::{Parameters, Uniformity};

use crate::feasibility::Feasibility;
use crate::random::RandomSource;

/// Per-position split of every number's quota, `quota[(value - 1) * cells + position]`.
#[derive(Debug, Clone, Default)]
struct PositionQuota {
    cells: usize,
    quota: Vec<u64>,
}

/// Remaining allowed uses per number.
///
/// `remaining_total() == total() - placed()` holds after every operation.
#[derive(Debug, Clone, Default)]
pub struct FrequencyLedger {
    targets: Vec<u64>,
    remaining: Vec<u64>,
    placed: u64,
    total: u64,
    positions: Option<PositionQuota>,
}

impl FrequencyLedger {
    /// Ledger with explicit per-number targets, `targets[value - 1]`.
    pub fn from_targets(targets: Vec<u64>) -> Self {
        let total = targets.iter().sum();
        Self {
            remaining: targets.clone(),
            targets,
            placed: 0,
            total,
            positions: None,
        }
    }

    pub fn range(&self) -> u32 {
        self.targets.len() as u32
    }

    pub fn target(&self, value: u32) -> u64 {
        self.slot(value).map(|slot| self.targets[slot]).unwrap_or(0)
    }

    pub fn remaining(&self, value: u32) -> u64 {
        self.slot(value).map(|slot| self.remaining[slot]).unwrap_or(0)
    }

    pub fn remaining_total(&self) -> u64 {
        self.remaining.iter().sum()
    }

    pub fn placed(&self) -> u64 {
        self.placed
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn has_positions(&self) -> bool {
        self.positions.is_some()
    }

    /// Consume one use of `value`; `false` when its quota is spent.
    pub fn take(&mut self, value: u32) -> bool {
        let Some(slot) = self.slot(value) else {
            return false;
        };
        if self.remaining[slot] == 0 {
            return false;
        }
        self.remaining[slot] -= 1;
        self.placed += 1;
        true
    }

    /// Return one use of `value` to the pool.
    pub fn give_back(&mut self, value: u32) {
        if let Some(slot) = self.slot(value)
            && self.remaining[slot] < self.targets[slot]
        {
            self.remaining[slot] += 1;
            self.placed -= 1;
        }
    }

    pub fn position_remaining(&self, value: u32, position: usize) -> Option<u64> {
        let positions = self.positions.as_ref()?;
        let slot = self.slot(value)?;
        positions.quota.get(slot * positions.cells + position).copied()
    }

    /// Advisory: saturates at zero instead of refusing.
    pub fn take_position(&mut self, value: u32, position: usize) {
        if let Some(index) = self.position_index(value, position)
            && let Some(positions) = self.positions.as_mut()
        {
            positions.quota[index] = positions.quota[index].saturating_sub(1);
        }
    }

    pub fn give_back_position(&mut self, value: u32, position: usize) {
        if let Some(index) = self.position_index(value, position)
            && let Some(positions) = self.positions.as_mut()
        {
            positions.quota[index] += 1;
        }
    }

    /// Numbers that must appear in the current card: their remaining quota
    /// equals the number of cards still to build, this one included.
    pub fn forced_numbers(&self, in_card: &[u32], cards_left: u64) -> Vec<u32> {
        self.values()
            .filter(|value| self.remaining(*value) >= cards_left && !in_card.contains(value))
            .collect()
    }

    /// Values the current card may take next without making a per-number
    /// total unreachable.
    ///
    /// When the unplaced forced numbers fill every empty cell, only they are legal.
    pub fn legal_numbers(&self, in_card: &[u32], cells_left: usize, cards_left: u64) -> Vec<u32> {
        let forced = self.forced_numbers(in_card, cards_left);
        if !forced.is_empty() && forced.len() >= cells_left {
            return forced;
        }
        self.values()
            .filter(|value| self.remaining(*value) > 0 && !in_card.contains(value))
            .collect()
    }

    /// Take `cells` distinct numbers for one whole card, weighted by remaining quota.
    ///
    /// Returns the numbers in draw order; `None` (with the ledger unchanged)
    /// when the pool runs dry.
    pub fn reserve_card(
        &mut self,
        rng: &mut RandomSource,
        cells: usize,
        cards_left: u64,
    ) -> Option<Vec<u32>> {
        let mut picked: Vec<u32> = Vec::with_capacity(cells);
        while picked.len() < cells {
            let pool = self.legal_numbers(&picked, cells - picked.len(), cards_left);
            let weights: Vec<u64> = pool.iter().map(|value| self.remaining(*value)).collect();
            let Some(choice) = rng.pick_weighted(&weights) else {
                for value in &picked {
                    self.give_back(*value);
                }
                return None;
            };
            let value = pool[choice];
            self.take(value);
            picked.push(value);
        }
        Some(picked)
    }

    /// Placements per number so far.
    pub fn counts(&self) -> BTreeMap<u32, u64> {
        self.values()
            .map(|value| (value, self.target(value) - self.remaining(value)))
            .collect()
    }

    fn values(&self) -> impl Iterator<Item = u32> + '_ {
        1..=self.range()
    }

    fn slot(&self, value: u32) -> Option<usize> {
        let slot = (value as usize).checked_sub(1)?;
        (slot < self.targets.len()).then_some(slot)
    }

    fn position_index(&self, value: u32, position: usize) -> Option<usize> {
        let positions = self.positions.as_ref()?;
        let slot = self.slot(value)?;
        (position < positions.cells).then_some(slot * positions.cells + position)
    }
}

/// Builds the global target multiset for a feasible run.
pub struct FrequencyAllocator;

impl FrequencyAllocator {
    /// Strict: every number gets `P / R`. Near: `P mod R` numbers, chosen by a
    /// shuffle of `1..=R`, get one extra use.
    pub fn allocate(
        params: &Parameters,
        feasibility: &Feasibility,
        rng: &mut RandomSource,
    ) -> FrequencyLedger {
        let range = params.range as usize;
        let mut targets = vec![feasibility.base_frequency; range];
        if params.uniformity == Uniformity::Near && feasibility.extra_numbers > 0 {
            let mut order: Vec<usize> = (0..range).collect();
            rng.shuffle(&mut order);
            for slot in order.into_iter().take(feasibility.extra_numbers as usize) {
                targets[slot] += 1;
            }
        }

        let mut ledger = FrequencyLedger::from_targets(targets);
        if params.position_balance {
            ledger.positions = Some(split_positions(&ledger.targets, params.cells_per_card(), rng));
        }
        ledger
    }
}

/// Lay every number's copies out consecutively over a cyclic walk of the
/// positions, starting at a random cursor in a shuffled number order.
///
/// Each number lands on every position `floor(q / cells)` or `ceil(q / cells)`
/// times, and each position receives exactly `T` placements in total.
fn split_positions(targets: &[u64], cells: usize, rng: &mut RandomSource) -> PositionQuota {
    let mut quota = vec![0_u64; targets.len() * cells];
    let mut order: Vec<usize> = (0..targets.len()).collect();
    rng.shuffle(&mut order);
    let mut cursor = rng.next_uniform_in(0, cells);

    for slot in order {
        let copies = targets[slot];
        let full_rounds = copies / cells as u64;
        let extra = (copies % cells as u64) as usize;
        for position in 0..cells {
            quota[slot * cells + position] += full_rounds;
        }
        for step in 0..extra {
            quota[slot * cells + (cursor + step) % cells] += 1;
        }
        cursor = (cursor + extra) % cells;
    }

    PositionQuota { cells, quota }
}
