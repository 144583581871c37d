use std::collections::HashMap;

use tombola_core::{Card, SetKey, SetScope, set_key};

/// A committed line set that already existed when a card tried to claim it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCollision {
    pub scope: SetScope,
    /// Row or column index inside the card.
    pub line: usize,
    pub key: SetKey,
}

/// Row-sets and column-sets committed by finished cards.
///
/// Entries carry a multiplicity so a best-effort card that committed a
/// duplicate can later be retracted without dropping the first owner's claim.
/// Inactive scopes accept every card and store nothing.
#[derive(Debug, Clone, Default)]
pub struct UniquenessIndex {
    rows: HashMap<SetKey, u32>,
    cols: HashMap<SetKey, u32>,
    rows_active: bool,
    cols_active: bool,
}

impl UniquenessIndex {
    pub fn new<'a>(scopes: impl IntoIterator<Item = &'a SetScope>) -> Self {
        let mut index = Self::default();
        for scope in scopes {
            match scope {
                SetScope::RowSets => index.rows_active = true,
                SetScope::ColSets => index.cols_active = true,
            }
        }
        index
    }

    pub fn is_active(&self, scope: SetScope) -> bool {
        match scope {
            SetScope::RowSets => self.rows_active,
            SetScope::ColSets => self.cols_active,
        }
    }

    pub fn active_scopes(&self) -> Vec<SetScope> {
        [SetScope::RowSets, SetScope::ColSets]
            .into_iter()
            .filter(|scope| self.is_active(*scope))
            .collect()
    }

    /// Membership for an unsorted line; always `false` for an inactive scope.
    pub fn contains(&self, scope: SetScope, values: &[u32]) -> bool {
        self.count(scope, &set_key(values.iter().copied())) > 0
    }

    pub fn count(&self, scope: SetScope, key: &SetKey) -> u32 {
        if !self.is_active(scope) {
            return 0;
        }
        self.map(scope).get(key).copied().unwrap_or(0)
    }

    pub fn insert(&mut self, scope: SetScope, key: SetKey) {
        if self.is_active(scope) {
            *self.map_mut(scope).entry(key).or_default() += 1;
        }
    }

    pub fn remove(&mut self, scope: SetScope, key: &SetKey) {
        if !self.is_active(scope) {
            return;
        }
        let map = self.map_mut(scope);
        if let Some(count) = map.get_mut(key) {
            *count -= 1;
            if *count == 0 {
                map.remove(key);
            }
        }
    }

    /// Distinct keys stored for a scope.
    pub fn len(&self, scope: SetScope) -> usize {
        if self.is_active(scope) { self.map(scope).len() } else { 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.cols.is_empty()
    }

    /// Lines of `card` whose set is already committed, or repeated within the card itself.
    pub fn collisions(&self, card: &Card) -> Vec<SetCollision> {
        let mut found = Vec::new();
        for scope in self.active_scopes() {
            let mut seen: Vec<SetKey> = Vec::new();
            for (line, key) in card.sets(scope).into_iter().enumerate() {
                if self.count(scope, &key) > 0 || seen.contains(&key) {
                    found.push(SetCollision {
                        scope,
                        line,
                        key: key.clone(),
                    });
                }
                seen.push(key);
            }
        }
        found
    }

    /// Commit every active set of `card`, or nothing when any of them collides.
    pub fn try_commit(&mut self, card: &Card) -> Result<(), Vec<SetCollision>> {
        let collisions = self.collisions(card);
        if !collisions.is_empty() {
            return Err(collisions);
        }
        self.commit(card);
        Ok(())
    }

    /// Commit unconditionally, returning the collisions the card introduces.
    pub fn commit(&mut self, card: &Card) -> Vec<SetCollision> {
        let collisions = self.collisions(card);
        for scope in self.active_scopes() {
            for key in card.sets(scope) {
                self.insert(scope, key);
            }
        }
        collisions
    }

    /// Undo a previous [`commit`](Self::commit) of the same card content.
    pub fn retract(&mut self, card: &Card) {
        for scope in self.active_scopes() {
            for key in card.sets(scope) {
                self.remove(scope, &key);
            }
        }
    }

    fn map(&self, scope: SetScope) -> &HashMap<SetKey, u32> {
        match scope {
            SetScope::RowSets => &self.rows,
            SetScope::ColSets => &self.cols,
        }
    }

    fn map_mut(&mut self, scope: SetScope) -> &mut HashMap<SetKey, u32> {
        match scope {
            SetScope::RowSets => &mut self.rows,
            SetScope::ColSets => &mut self.cols,
        }
    }
}
