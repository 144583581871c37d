use serde::{Deserialize, Serialize};
use tombola_core::{Parameters, SetScope, Uniformity};

use crate::errors::{Bound, BoundViolation, InfeasibleParameters};

/// Capacity of one uniqueness scope against its demand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityMargin {
    /// Line sets the run must produce (`T * m` rows or `T * n` columns).
    pub required: u64,
    /// Distinct line sets available, saturated at `u64::MAX`.
    pub available: u64,
    pub margin: u64,
}

/// Confirmed-feasible parameters with the values derived from them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feasibility {
    /// `P = T * m * n`.
    pub total_placements: u64,
    /// `floor(P / R)`.
    pub base_frequency: u64,
    /// `P mod R`: how many numbers get one extra use under near uniformity.
    pub extra_numbers: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_capacity: Option<CapacityMargin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub col_capacity: Option<CapacityMargin>,
    /// Distinct ordered cards against `T`. A shortfall only forces identical
    /// cards, so it is reported but never rejected.
    #[serde(default)]
    pub card_capacity: CapacityMargin,
}

impl Feasibility {
    /// Cards that must repeat an earlier card, if any.
    pub fn card_shortfall(&self) -> Option<u64> {
        let capacity = &self.card_capacity;
        (capacity.available < capacity.required).then(|| capacity.required - capacity.available)
    }
}

/// Check every static bound; all violations are reported together.
pub fn check_feasibility(params: &Parameters) -> Result<Feasibility, InfeasibleParameters> {
    let range = u64::from(params.range);
    let cards = u64::from(params.cards);
    let rows = u64::from(params.rows);
    let cols = u64::from(params.cols);
    let total = params.total_placements();
    let cells = rows * cols;

    let mut violations = Vec::new();

    if range < cells {
        violations.push(BoundViolation {
            bound: Bound::DuplicateAvoidance,
            message: format!("R={range} is smaller than m*n={cells}"),
            suggestion: format!("increase R to at least {cells}"),
            required_range: Some(cells),
        });
    }

    if params.uniformity == Uniformity::Strict && total % range != 0 {
        let cards_step = range / gcd(range, cells);
        let next_cards = cards.div_ceil(cards_step) * cards_step;
        let divisor = smallest_divisor_at_least(total, range.max(cells));
        let range_hint = divisor
            .map(|value| format!(", or use R={value}"))
            .unwrap_or_default();
        violations.push(BoundViolation {
            bound: Bound::StrictUniformity,
            message: format!("P={total} is not a multiple of R={range}"),
            suggestion: format!(
                "switch uniformity to near, or use T={next_cards}{range_hint}"
            ),
            required_range: divisor,
        });
    }

    if params.spacing_active() && cells > 1 {
        let gap = u64::from(params.min_distance);
        let needed = (cells - 1).saturating_mul(gap).saturating_add(1);
        if range < needed {
            let widest = (range.saturating_sub(1) / (cells - 1)).max(1);
            violations.push(BoundViolation {
                bound: Bound::MinDistance,
                message: format!(
                    "{cells} numbers {gap} apart need R >= {needed}, got R={range}"
                ),
                suggestion: format!(
                    "increase R to at least {needed}, or lower min_distance to {widest}"
                ),
                required_range: Some(needed),
            });
        }
    }

    let row_capacity = if params.scope_active(SetScope::RowSets) {
        let margin = capacity(range, cols, cards * rows);
        if margin.available < margin.required {
            let needed = minimal_range_for(cols, margin.required);
            violations.push(BoundViolation {
                bound: Bound::RowSetCapacity,
                message: format!(
                    "T*m={} exceeds C(R,n)=C({range},{cols})={}",
                    margin.required, margin.available
                ),
                suggestion: format!("increase R to at least {needed}"),
                required_range: Some(needed),
            });
        }
        Some(margin)
    } else {
        None
    };

    let col_capacity = if params.scope_active(SetScope::ColSets) {
        let margin = capacity(range, rows, cards * cols);
        if margin.available < margin.required {
            let needed = minimal_range_for(rows, margin.required);
            violations.push(BoundViolation {
                bound: Bound::ColSetCapacity,
                message: format!(
                    "T*n={} exceeds C(R,m)=C({range},{rows})={}",
                    margin.required, margin.available
                ),
                suggestion: format!("increase R to at least {needed}"),
                required_range: Some(needed),
            });
        }
        Some(margin)
    } else {
        None
    };

    if !violations.is_empty() {
        return Err(InfeasibleParameters { violations });
    }

    let available = arrangements(range, cells);
    Ok(Feasibility {
        total_placements: total,
        base_frequency: total / range,
        extra_numbers: total % range,
        row_capacity,
        col_capacity,
        card_capacity: CapacityMargin {
            required: cards,
            available,
            margin: available.saturating_sub(cards),
        },
    })
}

fn capacity(range: u64, line_len: u64, required: u64) -> CapacityMargin {
    let available = binomial(range, line_len);
    CapacityMargin {
        required,
        available,
        margin: available.saturating_sub(required),
    }
}

/// `C(n, k)`, 0 when `k > n`, saturated at `u64::MAX`.
pub fn binomial(n: u64, k: u64) -> u64 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut value: u128 = 1;
    for i in 1..=k {
        // C(n-k+i, i) grows with i, so the first overflow is final.
        value = value * u128::from(n - k + i) / u128::from(i);
        if value > u128::from(u64::MAX) {
            return u64::MAX;
        }
    }
    value as u64
}

/// `n! / (n - k)!`: ordered fillings of `k` cells from `n` numbers, saturated at `u64::MAX`.
pub fn arrangements(n: u64, k: u64) -> u64 {
    if k > n {
        return 0;
    }
    let mut value: u128 = 1;
    for factor in (n - k + 1)..=n {
        value *= u128::from(factor);
        if value > u128::from(u64::MAX) {
            return u64::MAX;
        }
    }
    value as u64
}

/// Smallest `R` with `C(R, k) >= required`.
fn minimal_range_for(k: u64, required: u64) -> u64 {
    let mut lo = k;
    let mut hi = k.saturating_add(required).max(k + 1);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if binomial(mid, k) >= required {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    lo
}

fn smallest_divisor_at_least(total: u64, floor: u64) -> Option<u64> {
    const SEARCH_LIMIT: u64 = 1_000_000;
    let upper = total.min(floor.saturating_add(SEARCH_LIMIT));
    (floor.max(1)..=upper).find(|candidate| total % candidate == 0)
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[test]
    fn binomial_matches_known_values() {
        assert_eq!(binomial(75, 4), 1_215_450);
        assert_eq!(binomial(5, 5), 1);
        assert_eq!(binomial(3, 4), 0);
        assert_eq!(binomial(10, 0), 1);
        assert_eq!(binomial(1000, 500), u64::MAX);
    }

    #[test]
    fn strict_uniformity_requires_divisible_total() {
        let params = Parameters::new(9, 1, 1, 3);
        let err = check_feasibility(&params).expect_err("P=3 is not a multiple of 9");
        assert_eq!(err.violations.len(), 1);
        assert_eq!(err.violations[0].bound, Bound::StrictUniformity);
        assert!(err.violations[0].suggestion.contains("near"));
        assert!(err.violations[0].suggestion.contains("T=3"));
    }

    #[test]
    fn permutation_card_is_feasible() {
        let params = Parameters::new(3, 1, 1, 3);
        let feasibility = check_feasibility(&params).expect("feasible");
        assert_eq!(feasibility.total_placements, 3);
        assert_eq!(feasibility.base_frequency, 1);
        assert_eq!(feasibility.extra_numbers, 0);
        let rows = feasibility.row_capacity.expect("row scope active");
        assert_eq!(rows.required, 1);
        assert_eq!(rows.available, 1);
    }

    #[test]
    fn row_capacity_rejects_single_possible_row_set() {
        let params = Parameters::new(5, 2, 1, 5);
        let err = check_feasibility(&params).expect_err("only one 5-subset of 1..=5");
        let violation = err
            .violations
            .iter()
            .find(|violation| violation.bound == Bound::RowSetCapacity)
            .expect("row capacity violation");
        assert_eq!(violation.required_range, Some(6));
    }

    #[test]
    fn column_capacity_is_checked_when_active() {
        let mut params = Parameters::new(4, 4, 2, 2);
        params.unique_scope = BTreeSet::from([SetScope::ColSets]);
        // C(4,2) = 6 column sets, but 8 are needed.
        let err = check_feasibility(&params).expect_err("column capacity");
        assert_eq!(err.violations[0].bound, Bound::ColSetCapacity);
        assert_eq!(err.violations[0].required_range, Some(5));
    }

    #[test]
    fn duplicate_bound_reports_minimal_range() {
        let mut params = Parameters::new(5, 1, 2, 3);
        params.uniformity = Uniformity::Near;
        params.unique_scope.clear();
        let err = check_feasibility(&params).expect_err("R < m*n");
        assert_eq!(err.violations[0].bound, Bound::DuplicateAvoidance);
        assert_eq!(err.violations[0].required_range, Some(6));
    }

    #[test]
    fn spacing_needs_a_wide_enough_range() {
        let mut params = Parameters::new(20, 1, 1, 5);
        params.uniformity = Uniformity::Near;
        params.min_distance = 5;
        let err = check_feasibility(&params).expect_err("5 numbers 5 apart need R >= 21");
        assert_eq!(err.violations[0].bound, Bound::MinDistance);
        assert_eq!(err.violations[0].required_range, Some(21));
        assert!(err.violations[0].suggestion.contains("min_distance to 4"));

        params.range = 21;
        assert!(check_feasibility(&params).is_ok());
    }

    #[test]
    fn arrangements_count_ordered_cards() {
        assert_eq!(arrangements(8, 2), 56);
        assert_eq!(arrangements(3, 1), 3);
        assert_eq!(arrangements(2, 3), 0);
        assert_eq!(arrangements(75, 12), u64::MAX);
    }

    #[test]
    fn identical_card_shortfall_is_reported_not_rejected() {
        let mut params = Parameters::new(2, 16, 1, 1);
        params.unique_scope.clear();
        let feasibility = check_feasibility(&params).expect("still feasible");
        assert_eq!(feasibility.card_capacity.available, 2);
        assert_eq!(feasibility.card_shortfall(), Some(14));

        let roomy = check_feasibility(&Parameters::new(75, 150, 3, 4)).expect("feasible");
        assert_eq!(roomy.card_shortfall(), None);
    }

    #[test]
    fn large_example_is_comfortably_feasible() {
        let params = Parameters::new(75, 150, 3, 4);
        let feasibility = check_feasibility(&params).expect("feasible");
        assert_eq!(feasibility.total_placements, 1800);
        assert_eq!(feasibility.base_frequency, 24);
        let rows = feasibility.row_capacity.expect("rows");
        assert_eq!(rows.required, 450);
        assert_eq!(rows.margin, 1_215_450 - 450);
    }
}
