//! Constrained construction engine for tombola card sets.
//!
//! Feasibility is checked up front, a frequency ledger fixes how often each
//! number is used, and cards are filled cell by cell against a shared
//! uniqueness index, with a budgeted swap search to get past stalls.

pub mod budget;
pub mod constructor;
pub mod engine;
pub mod errors;
pub mod feasibility;
pub mod index;
pub mod ledger;
pub mod model;
pub mod parallel;
pub mod random;
pub mod repair;
pub mod state;

pub use constructor::{CardConstructor, CardPhase};
pub use engine::BuildEngine;
pub use errors::{
    Bound, BoundViolation, BuildError, ConstraintClass, ConstructionStalled, ExhaustionReason,
    InfeasibleParameters,
};
pub use feasibility::{CapacityMargin, Feasibility, binomial, check_feasibility};
pub use index::{SetCollision, UniquenessIndex};
pub use ledger::{FrequencyAllocator, FrequencyLedger};
pub use model::{BuildMetrics, BuildOutcome, BuildViolation, count_frequencies};
pub use random::{DirectSeed, HashedSeed, RandomSource, SeedDerivation, derivation_for};
pub use repair::SwapRepair;
