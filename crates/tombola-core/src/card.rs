use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::params::SetScope;

/// Canonical representation of a row-set or column-set: the values sorted ascending.
pub type SetKey = Box<[u32]>;

/// Build a canonical set key from any collection of values.
pub fn set_key(values: impl IntoIterator<Item = u32>) -> SetKey {
    let mut values: Vec<u32> = values.into_iter().collect();
    values.sort_unstable();
    values.into_boxed_slice()
}

/// Whether `value` stays at least `min_distance` away from every placed value.
///
/// Empty cells (`0`) are ignored; a `min_distance` of 0 or 1 always passes.
pub fn keeps_distance(placed: &[u32], value: u32, min_distance: u32) -> bool {
    min_distance <= 1
        || placed
            .iter()
            .all(|other| *other == 0 || other.abs_diff(value) >= min_distance)
}

/// An `m x n` grid of numbers stored row-major.
///
/// A value of `0` marks an empty cell while the card is being filled; finished
/// cards only hold values in `1..=R`. Serialized as a nested matrix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<u32>>", into = "Vec<Vec<u32>>")]
pub struct Card {
    rows: usize,
    cols: usize,
    cells: Vec<u32>,
}

impl Card {
    /// An empty card of the given shape.
    pub fn empty(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![0; rows * cols],
        }
    }

    pub fn from_cells(rows: usize, cols: usize, cells: Vec<u32>) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(Error::InvalidCard("card must have at least one cell".to_string()));
        }
        if cells.len() != rows * cols {
            return Err(Error::InvalidCard(format!(
                "expected {} cells for a {rows}x{cols} card, found {}",
                rows * cols,
                cells.len()
            )));
        }
        Ok(Self { rows, cols, cells })
    }

    pub fn from_matrix(matrix: Vec<Vec<u32>>) -> Result<Self> {
        let rows = matrix.len();
        let cols = matrix.first().map(Vec::len).unwrap_or(0);
        if matrix.iter().any(|row| row.len() != cols) {
            return Err(Error::InvalidCard("ragged matrix".to_string()));
        }
        Self::from_cells(rows, cols, matrix.into_iter().flatten().collect())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &[u32] {
        &self.cells
    }

    pub fn cell(&self, index: usize) -> u32 {
        self.cells[index]
    }

    pub fn set_cell(&mut self, index: usize, value: u32) {
        self.cells[index] = value;
    }

    pub fn get(&self, row: usize, col: usize) -> u32 {
        self.cells[row * self.cols + col]
    }

    /// Row and column of a row-major cell index.
    pub fn position(&self, index: usize) -> (usize, usize) {
        (index / self.cols, index % self.cols)
    }

    pub fn contains(&self, value: u32) -> bool {
        self.cells.contains(&value)
    }

    pub fn row_values(&self, row: usize) -> &[u32] {
        &self.cells[row * self.cols..(row + 1) * self.cols]
    }

    pub fn col_values(&self, col: usize) -> Vec<u32> {
        (0..self.rows).map(|row| self.get(row, col)).collect()
    }

    pub fn row_set(&self, row: usize) -> SetKey {
        set_key(self.row_values(row).iter().copied())
    }

    pub fn col_set(&self, col: usize) -> SetKey {
        set_key(self.col_values(col))
    }

    pub fn row_sets(&self) -> Vec<SetKey> {
        (0..self.rows).map(|row| self.row_set(row)).collect()
    }

    pub fn col_sets(&self) -> Vec<SetKey> {
        (0..self.cols).map(|col| self.col_set(col)).collect()
    }

    /// All line sets of one scope, in line order.
    pub fn sets(&self, scope: SetScope) -> Vec<SetKey> {
        match scope {
            SetScope::RowSets => self.row_sets(),
            SetScope::ColSets => self.col_sets(),
        }
    }

    /// Values that occur more than once in the grid, ascending.
    pub fn duplicate_values(&self) -> Vec<u32> {
        let mut sorted = self.cells.clone();
        sorted.sort_unstable();
        let mut duplicates: Vec<u32> = sorted
            .windows(2)
            .filter(|pair| pair[0] == pair[1])
            .map(|pair| pair[0])
            .collect();
        duplicates.dedup();
        duplicates
    }

    /// Cell pairs `(a, b)`, `a < b`, whose values are closer than `min_distance`.
    pub fn close_pairs(&self, min_distance: u32) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        if min_distance <= 1 {
            return pairs;
        }
        for a in 0..self.cells.len() {
            for b in a + 1..self.cells.len() {
                let (first, second) = (self.cells[a], self.cells[b]);
                if first != 0 && second != 0 && first.abs_diff(second) < min_distance {
                    pairs.push((a, b));
                }
            }
        }
        pairs
    }

    pub fn to_matrix(&self) -> Vec<Vec<u32>> {
        self.cells
            .chunks(self.cols)
            .map(|row| row.to_vec())
            .collect()
    }
}

impl TryFrom<Vec<Vec<u32>>> for Card {
    type Error = Error;

    fn try_from(matrix: Vec<Vec<u32>>) -> Result<Self> {
        Card::from_matrix(matrix)
    }
}

impl From<Card> for Vec<Vec<u32>> {
    fn from(card: Card) -> Self {
        card.to_matrix()
    }
}
