use std::collections::{BTreeMap, HashMap};

use tombola_core::{Card, Parameters, SetKey, SetScope, Uniformity};

use crate::model::{CheckResult, UniformityStats, VerificationReport};
use crate::stats::chi_square;

/// Offending items listed per check.
const MAX_EXAMPLES: usize = 10;

/// From-scratch re-check of every active constraint over a finished card set.
///
/// Running it twice on the same cards yields the same report.
#[derive(Debug, Clone)]
pub struct Verifier {
    params: Parameters,
}

impl Verifier {
    pub fn new(params: &Parameters) -> Self {
        Self {
            params: params.clone(),
        }
    }

    pub fn verify(&self, cards: &[Card]) -> VerificationReport {
        let frequencies = self.frequencies(cards);
        let (uniformity_check, uniformity) = self.check_uniformity(&frequencies);

        let checks = vec![
            self.check_card_count(cards),
            self.check_shape(cards),
            check_no_duplicates(cards),
            self.check_set_uniqueness(cards, SetScope::RowSets),
            self.check_set_uniqueness(cards, SetScope::ColSets),
            uniformity_check,
            check_no_identical_cards(cards),
            self.check_min_distance(cards),
        ];

        VerificationReport {
            passed: checks.iter().all(|check| check.passed),
            checks,
            frequencies,
            position_frequencies: position_frequencies(cards),
            uniformity,
        }
    }

    fn frequencies(&self, cards: &[Card]) -> BTreeMap<u32, u64> {
        let mut counts: BTreeMap<u32, u64> = (1..=self.params.range).map(|value| (value, 0)).collect();
        for value in cards.iter().flat_map(|card| card.cells().iter().copied()) {
            if let Some(count) = counts.get_mut(&value) {
                *count += 1;
            }
        }
        counts
    }

    fn check_card_count(&self, cards: &[Card]) -> CheckResult {
        let expected = self.params.cards as usize;
        let found = cards.len();
        CheckResult {
            name: "card_count".to_string(),
            passed: found == expected,
            skipped: false,
            violations: found.abs_diff(expected) as u64,
            detail: Some(format!("expected {expected}, found {found}")),
            examples: Vec::new(),
        }
    }

    fn check_shape(&self, cards: &[Card]) -> CheckResult {
        let rows = self.params.rows as usize;
        let cols = self.params.cols as usize;
        let range = self.params.range;
        let mut examples = Vec::new();
        let mut violations = 0_u64;

        for (index, card) in cards.iter().enumerate() {
            let problem = if card.rows() != rows || card.cols() != cols {
                Some(format!("card {index}: shape {}x{}", card.rows(), card.cols()))
            } else {
                card.cells()
                    .iter()
                    .find(|value| **value == 0 || **value > range)
                    .map(|value| format!("card {index}: value {value} outside 1..={range}"))
            };
            if let Some(problem) = problem {
                violations += 1;
                push_example(&mut examples, problem);
            }
        }

        CheckResult {
            name: "shape".to_string(),
            passed: violations == 0,
            skipped: false,
            violations,
            detail: Some(format!("{rows}x{cols} grids with values in 1..={range}")),
            examples,
        }
    }

    fn check_set_uniqueness(&self, cards: &[Card], scope: SetScope) -> CheckResult {
        let name = format!("{}_uniqueness", scope_name(scope));
        if !self.params.scope_active(scope) {
            return CheckResult::skipped(&name, "scope not active");
        }

        let line = match scope {
            SetScope::RowSets => "row",
            SetScope::ColSets => "col",
        };
        let mut seen: HashMap<SetKey, (usize, usize)> = HashMap::new();
        let mut examples = Vec::new();
        let mut violations = 0_u64;
        let mut lines = 0_u64;

        for (card_index, card) in cards.iter().enumerate() {
            for (line_index, key) in card.sets(scope).into_iter().enumerate() {
                lines += 1;
                if let Some((first_card, first_line)) = seen.get(&key) {
                    violations += 1;
                    push_example(
                        &mut examples,
                        format!(
                            "card {card_index} {line} {line_index} repeats card {first_card} {line} {first_line}"
                        ),
                    );
                } else {
                    seen.insert(key, (card_index, line_index));
                }
            }
        }

        CheckResult {
            name,
            passed: violations == 0,
            skipped: false,
            violations,
            detail: Some(format!("{lines} sets checked, {} distinct", seen.len())),
            examples,
        }
    }

    fn check_min_distance(&self, cards: &[Card]) -> CheckResult {
        let min_distance = self.params.min_distance;
        if !self.params.spacing_active() {
            return CheckResult::skipped("min_distance", "no spacing required");
        }

        let mut examples = Vec::new();
        let mut violations = 0_u64;
        for (index, card) in cards.iter().enumerate() {
            let pairs = card.close_pairs(min_distance);
            if let Some((a, b)) = pairs.first() {
                violations += 1;
                push_example(
                    &mut examples,
                    format!(
                        "card {index}: {} and {} are closer than {min_distance}",
                        card.cell(*a),
                        card.cell(*b)
                    ),
                );
            }
        }
        CheckResult {
            name: "min_distance".to_string(),
            passed: violations == 0,
            skipped: false,
            violations,
            detail: Some(format!("numbers on a card at least {min_distance} apart")),
            examples,
        }
    }

    fn check_uniformity(&self, frequencies: &BTreeMap<u32, u64>) -> (CheckResult, UniformityStats) {
        let range = u64::from(self.params.range);
        let total = self.params.total_placements();
        let base = total.checked_div(range).unwrap_or(0);
        let divisible = total.checked_rem(range) == Some(0);
        let (target_min, target_max) = if divisible { (base, base) } else { (base, base + 1) };

        let counts: Vec<u64> = frequencies.values().copied().collect();
        let observed_min = counts.iter().copied().min().unwrap_or(0);
        let observed_max = counts.iter().copied().max().unwrap_or(0);
        let observed_total: u64 = counts.iter().sum();
        let expected = if range == 0 {
            0.0
        } else {
            observed_total as f64 / range as f64
        };
        let chi2 = chi_square(&counts, expected);

        let mut examples = Vec::new();
        let mut violations = 0_u64;
        for (value, count) in frequencies {
            if *count < target_min || *count > target_max {
                violations += 1;
                push_example(
                    &mut examples,
                    format!("number {value}: {count} (target {target_min}..={target_max})"),
                );
            }
        }

        let (passed, detail) = match self.params.uniformity {
            _ if range == 0 => (false, "R=0 leaves no numbers to place".to_string()),
            Uniformity::Strict if !divisible => (
                false,
                format!("strict mode needs P={total} divisible by R={range}"),
            ),
            Uniformity::Strict => (
                violations == 0,
                format!("every number exactly {base} times"),
            ),
            Uniformity::Near => (
                violations == 0,
                format!("every number {target_min} or {target_max} times"),
            ),
        };

        let check = CheckResult {
            name: "uniformity".to_string(),
            passed,
            skipped: false,
            violations,
            detail: Some(detail),
            examples,
        };
        let stats = UniformityStats {
            mode: self.params.uniformity,
            target_min,
            target_max,
            observed_min,
            observed_max,
            max_minus_min: observed_max - observed_min,
            chi2,
        };
        (check, stats)
    }
}

fn check_no_duplicates(cards: &[Card]) -> CheckResult {
    let mut examples = Vec::new();
    let mut violations = 0_u64;
    for (index, card) in cards.iter().enumerate() {
        let duplicates = card.duplicate_values();
        if !duplicates.is_empty() {
            violations += 1;
            push_example(&mut examples, format!("card {index}: {duplicates:?} repeated"));
        }
    }
    CheckResult {
        name: "no_duplicates_within_cards".to_string(),
        passed: violations == 0,
        skipped: false,
        violations,
        detail: None,
        examples,
    }
}

fn check_no_identical_cards(cards: &[Card]) -> CheckResult {
    let mut first_seen: HashMap<&Card, usize> = HashMap::new();
    let mut examples = Vec::new();
    let mut violations = 0_u64;
    for (index, card) in cards.iter().enumerate() {
        match first_seen.get(card) {
            Some(first) => {
                violations += 1;
                push_example(&mut examples, format!("card {index} equals card {first}"));
            }
            None => {
                first_seen.insert(card, index);
            }
        }
    }
    CheckResult {
        name: "no_identical_cards".to_string(),
        passed: violations == 0,
        skipped: false,
        violations,
        detail: None,
        examples,
    }
}

fn position_frequencies(cards: &[Card]) -> BTreeMap<String, BTreeMap<u32, u64>> {
    let mut positions: BTreeMap<String, BTreeMap<u32, u64>> = BTreeMap::new();
    for card in cards {
        for (index, value) in card.cells().iter().enumerate() {
            let (row, col) = card.position(index);
            *positions
                .entry(format!("({row},{col})"))
                .or_default()
                .entry(*value)
                .or_default() += 1;
        }
    }
    positions
}

fn scope_name(scope: SetScope) -> &'static str {
    match scope {
        SetScope::RowSets => "row_set",
        SetScope::ColSets => "col_set",
    }
}

fn push_example(examples: &mut Vec<String>, example: String) {
    if examples.len() < MAX_EXAMPLES {
        examples.push(example);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn card(matrix: Vec<Vec<u32>>) -> Card {
        Card::from_matrix(matrix).expect("card")
    }

    #[test]
    fn accepts_a_valid_permutation() {
        let params = Parameters::new(3, 1, 1, 3);
        let report = Verifier::new(&params).verify(&[card(vec![vec![2, 3, 1]])]);
        assert!(report.passed);
        assert_eq!(report.checks.len(), 8);
        assert!(report.check("min_distance").expect("spacing").skipped);
        assert_eq!(report.uniformity.max_minus_min, 0);
        assert_eq!(report.position_frequencies["(0,0)"][&2], 1);
    }

    #[test]
    fn detects_repeated_row_sets_across_cards() {
        let params = Parameters::new(4, 2, 1, 2);
        let cards = [card(vec![vec![1, 2]]), card(vec![vec![2, 1]])];
        let report = Verifier::new(&params).verify(&cards);
        assert!(!report.passed);
        let rows = report.check("row_set_uniqueness").expect("row check");
        assert_eq!(rows.violations, 1);
        assert_eq!(rows.examples[0], "card 1 row 0 repeats card 0 row 0");
        // 1 and 2 used twice, 3 and 4 never.
        assert!(!report.check("uniformity").expect("uniformity").passed);
        assert!(report.check("no_identical_cards").expect("identical").passed);
    }

    #[test]
    fn flags_identical_cards_when_no_scope_is_active() {
        let mut params = Parameters::new(3, 2, 1, 3);
        params.unique_scope = BTreeSet::new();
        let cards = [card(vec![vec![1, 2, 3]]), card(vec![vec![1, 2, 3]])];
        let report = Verifier::new(&params).verify(&cards);
        assert!(report.check("row_set_uniqueness").expect("row check").skipped);
        let identical = report.check("no_identical_cards").expect("identical");
        assert!(!identical.passed);
        assert_eq!(identical.violations, 1);
        assert!(report.check("uniformity").expect("uniformity").passed);
    }

    #[test]
    fn shape_and_duplicate_checks_catch_bad_cards() {
        let params = Parameters::new(5, 2, 1, 3);
        let cards = [card(vec![vec![1, 1, 2]]), card(vec![vec![3, 4, 9]])];
        let report = Verifier::new(&params).verify(&cards);
        assert_eq!(report.check("shape").expect("shape").violations, 1);
        assert_eq!(
            report
                .check("no_duplicates_within_cards")
                .expect("duplicates")
                .violations,
            1
        );
        assert!(!report.passed);
    }

    #[test]
    fn near_mode_allows_a_spread_of_one() {
        let mut params = Parameters::new(4, 1, 1, 3);
        params.uniformity = Uniformity::Near;
        let report = Verifier::new(&params).verify(&[card(vec![vec![4, 1, 3]])]);
        assert!(report.passed, "{:?}", report.checks);
        assert_eq!(report.uniformity.target_min, 0);
        assert_eq!(report.uniformity.target_max, 1);
        assert_eq!(report.uniformity.max_minus_min, 1);
    }

    #[test]
    fn min_distance_flags_crowded_cards() {
        let mut params = Parameters::new(12, 2, 1, 3);
        params.unique_scope = BTreeSet::new();
        params.uniformity = Uniformity::Near;
        params.min_distance = 3;
        let cards = [card(vec![vec![1, 5, 9]]), card(vec![vec![2, 3, 12]])];
        let report = Verifier::new(&params).verify(&cards);

        let spacing = report.check("min_distance").expect("spacing");
        assert!(!spacing.passed);
        assert_eq!(spacing.violations, 1);
        assert_eq!(spacing.examples[0], "card 1: 2 and 3 are closer than 3");
        assert!(!report.passed);
    }

    #[test]
    fn zero_range_fails_instead_of_dividing() {
        let params = Parameters::new(0, 1, 1, 1);
        let report = Verifier::new(&params).verify(&[card(vec![vec![1]])]);
        assert!(!report.passed);
        let uniformity = report.check("uniformity").expect("uniformity");
        assert!(!uniformity.passed);
        assert_eq!(uniformity.detail.as_deref(), Some("R=0 leaves no numbers to place"));
    }

    #[test]
    fn verification_is_idempotent() {
        let params = Parameters::new(4, 2, 1, 2);
        let cards = [card(vec![vec![1, 2]]), card(vec![vec![3, 4]])];
        let verifier = Verifier::new(&params);
        assert_eq!(verifier.verify(&cards), verifier.verify(&cards));
    }
}
