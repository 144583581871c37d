use std::collections::BTreeSet;

use tombola_build::{BuildEngine, BuildError, ConstraintClass, ExhaustionReason};
use tombola_core::{Parameters, SeedMode, SetScope, Uniformity};
use tombola_verify::Verifier;

fn params(range: u32, cards: u32, rows: u32, cols: u32, seed: u64) -> Parameters {
    let mut params = Parameters::new(range, cards, rows, cols);
    params.seed.value = seed;
    params
}

#[test]
fn single_threaded_runs_are_reproducible() {
    let params = params(75, 150, 3, 4, 7);
    let first = BuildEngine::new(params.clone()).run().expect("first run");
    let second = BuildEngine::new(params).run().expect("second run");

    assert_eq!(first.cards, second.cards);
    assert_eq!(first.metrics.swap_attempts, second.metrics.swap_attempts);
    assert_eq!(
        serde_json::to_string(&first.cards).expect("serialize"),
        serde_json::to_string(&second.cards).expect("serialize")
    );
}

#[test]
fn seeds_and_engines_change_the_card_set() {
    let base = BuildEngine::new(params(75, 150, 3, 4, 1)).run().expect("seed 1");
    let reseeded = BuildEngine::new(params(75, 150, 3, 4, 2)).run().expect("seed 2");
    assert_ne!(base.cards, reseeded.cards);

    let mut chacha8 = params(75, 150, 3, 4, 1);
    chacha8.seed.engine = "chacha8".to_string();
    let other_engine = BuildEngine::new(chacha8).run().expect("chacha8");
    assert_eq!(other_engine.engine, "chacha8");
    assert_ne!(base.cards, other_engine.cards);
}

#[test]
fn large_strict_run_passes_verification() {
    let params = params(75, 150, 3, 4, 2024);
    let outcome = BuildEngine::new(params.clone()).run().expect("build");

    assert_eq!(outcome.cards.len(), 150);
    assert!(!outcome.best_effort);
    assert!(outcome.frequencies.values().all(|count| *count == 24));

    let report = Verifier::new(&params).verify(&outcome.cards);
    assert!(report.passed, "verification failed: {:?}", report.checks);
    assert_eq!(report.uniformity.max_minus_min, 0);
    let rows = report.check("row_set_uniqueness").expect("row check");
    assert!(rows.passed);
    assert_eq!(rows.violations, 0);
    assert!(report.check("col_set_uniqueness").expect("col check").skipped);
}

#[test]
fn near_uniformity_keeps_spread_within_one() {
    let mut params = params(10, 7, 2, 3, 5);
    params.uniformity = Uniformity::Near;
    let outcome = BuildEngine::new(params.clone()).run().expect("build");

    let counts: Vec<u64> = outcome.frequencies.values().copied().collect();
    assert_eq!(counts.iter().sum::<u64>(), 42);
    assert_eq!(counts.iter().filter(|count| **count == 5).count(), 2);
    assert_eq!(counts.iter().filter(|count| **count == 4).count(), 8);

    let report = Verifier::new(&params).verify(&outcome.cards);
    assert!(report.passed, "verification failed: {:?}", report.checks);
}

#[test]
fn both_scopes_are_enforced() {
    let mut params = params(20, 10, 3, 3, 11);
    params.uniformity = Uniformity::Near;
    params.unique_scope = BTreeSet::from([SetScope::RowSets, SetScope::ColSets]);
    let outcome = BuildEngine::new(params.clone()).run().expect("build");

    let mut cols: Vec<_> = outcome.cards.iter().flat_map(|card| card.col_sets()).collect();
    cols.sort();
    cols.dedup();
    assert_eq!(cols.len(), 30);

    let report = Verifier::new(&params).verify(&outcome.cards);
    assert!(report.passed, "verification failed: {:?}", report.checks);
    assert!(!report.check("col_set_uniqueness").expect("col check").skipped);
}

#[test]
fn hashed_seed_mode_is_reproducible() {
    let mut params = params(30, 12, 2, 4, 314);
    params.seed.mode = SeedMode::Hashed;
    params.uniformity = Uniformity::Near;
    let first = BuildEngine::new(params.clone()).run().expect("first run");
    let second = BuildEngine::new(params).run().expect("second run");
    assert_eq!(first.cards, second.cards);
}

#[test]
fn position_balance_keeps_global_targets() {
    let mut params = params(12, 6, 2, 3, 8);
    params.position_balance = true;
    let outcome = BuildEngine::new(params.clone()).run().expect("build");

    assert!(outcome.frequencies.values().all(|count| *count == 3));
    let report = Verifier::new(&params).verify(&outcome.cards);
    assert!(report.passed, "verification failed: {:?}", report.checks);
}

#[test]
fn tight_row_capacity_still_balances_frequencies() {
    // All 20 triples of 1..=6 must be used, each number exactly 10 times.
    for seed in 0..=2 {
        let params = params(6, 20, 1, 3, seed);
        let outcome = BuildEngine::new(params.clone()).run().expect("build");

        assert_eq!(outcome.cards.len(), 20);
        assert!(!outcome.best_effort, "seed {seed}: {:?}", outcome.violations);
        assert!(outcome.frequencies.values().all(|count| *count == 10));

        let report = Verifier::new(&params).verify(&outcome.cards);
        assert!(report.passed, "seed {seed}: {:?}", report.checks);
    }
}

#[test]
fn tight_capacity_with_both_scopes_builds_cleanly() {
    for seed in 0..=2 {
        let mut params = params(8, 6, 2, 2, seed);
        params.unique_scope = BTreeSet::from([SetScope::RowSets, SetScope::ColSets]);
        let outcome = BuildEngine::new(params.clone()).run().expect("build");

        assert!(!outcome.best_effort, "seed {seed}: {:?}", outcome.violations);
        assert!(outcome.frequencies.values().all(|count| *count == 3));
        let report = Verifier::new(&params).verify(&outcome.cards);
        assert!(report.passed, "seed {seed}: {:?}", report.checks);
    }
}

/// Two numbers for three single-cell cards: some card must repeat.
fn unavoidable_repeat(seed: u64) -> Parameters {
    let mut params = params(2, 3, 1, 1, seed);
    params.uniformity = Uniformity::Near;
    params.unique_scope = BTreeSet::new();
    params
}

#[test]
fn exhausted_swap_budget_fails_construction() {
    let mut params = unavoidable_repeat(21);
    params.swap_iterations = 0;
    let err = BuildEngine::new(params).run().expect_err("no swap budget");
    match err {
        BuildError::ConstructionFailed {
            class,
            reason,
            cards_completed,
            metrics,
            ..
        } => {
            assert_eq!(class, Some(ConstraintClass::IdenticalCard));
            assert_eq!(reason, ExhaustionReason::SwapBudget);
            assert!(cards_completed < 3);
            assert_eq!(metrics.swap_attempts, 0);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn exhausted_swap_budget_flags_best_effort() {
    let mut params = unavoidable_repeat(21);
    params.swap_iterations = 0;
    params.allow_best_effort = true;
    let outcome = BuildEngine::new(params.clone())
        .run()
        .expect("best effort always yields cards");

    assert_eq!(outcome.cards.len(), 3);
    assert!(outcome.best_effort);
    assert_eq!(outcome.metrics.swap_attempts, 0);
    assert!(outcome.violation_count(ConstraintClass::IdenticalCard) >= 1);
    let listed = outcome
        .violations
        .iter()
        .find(|violation| violation.class == ConstraintClass::IdenticalCard)
        .expect("identical card listed");
    assert!(listed.card_index.is_some());
    assert!(listed.detail.starts_with("identical to card"));
}

#[test]
fn unscoped_pigeonhole_fails_on_identical_cards() {
    // Seven single-cell cards over three numbers.
    let mut params = params(3, 7, 1, 1, 9);
    params.uniformity = Uniformity::Near;
    params.unique_scope = BTreeSet::new();
    params.swap_iterations = 4_000;

    match BuildEngine::new(params.clone()).run() {
        Err(BuildError::ConstructionFailed { class, reason, .. }) => {
            assert_eq!(class, Some(ConstraintClass::IdenticalCard));
            assert!(matches!(
                reason,
                ExhaustionReason::SwapBudget | ExhaustionReason::RebuildLimit
            ));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(outcome) => panic!("pigeonhole run succeeded: {:?}", outcome.cards),
    }

    params.allow_best_effort = true;
    let outcome = BuildEngine::new(params.clone()).run().expect("best effort");
    assert!(outcome.best_effort);
    assert!(outcome.violation_count(ConstraintClass::IdenticalCard) >= 4);

    let report = Verifier::new(&params).verify(&outcome.cards);
    assert!(!report.passed);
    assert!(!report.check("no_identical_cards").expect("identity check").passed);
}

#[test]
fn identical_cards_are_repaired_when_alternatives_exist() {
    // 56 ordered pairs of distinct numbers for ten cards.
    for seed in 0..200 {
        let mut params = params(8, 10, 2, 1, seed);
        params.uniformity = Uniformity::Near;
        params.unique_scope = BTreeSet::new();
        let outcome = BuildEngine::new(params.clone())
            .run()
            .unwrap_or_else(|err| panic!("seed {seed}: {err}"));

        assert!(!outcome.best_effort, "seed {seed}: {:?}", outcome.violations);
        let report = Verifier::new(&params).verify(&outcome.cards);
        assert!(report.passed, "seed {seed}: {:?}", report.checks);
        if seed == 72 {
            assert!(outcome.metrics.swap_attempts > 0);
        }
    }
}

#[test]
fn min_distance_keeps_card_numbers_apart() {
    for seed in 0..3 {
        let mut params = params(90, 4, 3, 5, seed);
        params.uniformity = Uniformity::Near;
        params.min_distance = 2;
        let outcome = BuildEngine::new(params.clone()).run().expect("build");

        assert!(!outcome.best_effort, "seed {seed}");
        for card in &outcome.cards {
            assert!(card.close_pairs(2).is_empty(), "seed {seed}: {card:?}");
        }
        let report = Verifier::new(&params).verify(&outcome.cards);
        let spacing = report.check("min_distance").expect("spacing check");
        assert!(!spacing.skipped);
        assert!(report.passed, "seed {seed}: {:?}", report.failed_checks());
    }
}

#[test]
fn multi_worker_mode_satisfies_constraints() {
    let mut params = params(75, 150, 3, 4, 77);
    params.parallelism = 4;
    let outcome = BuildEngine::new(params.clone()).run().expect("build");

    assert_eq!(outcome.cards.len(), 150);
    let report = Verifier::new(&params).verify(&outcome.cards);
    assert!(report.passed, "verification failed: {:?}", report.checks);
}
