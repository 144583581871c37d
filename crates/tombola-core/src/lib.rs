//! Core contracts shared across the tombola crates.
//!
//! This crate defines the run parameters, the card grid type, canonical
//! set keys, and the hashing helpers that bind artifacts to their inputs.

pub mod card;
pub mod error;
pub mod hash;
pub mod params;
pub mod schema;

pub use card::{Card, SetKey, keeps_distance, set_key};
pub use error::{Error, Result};
pub use hash::{canonical_json, cards_hash, matrix_hash, params_hash};
pub use params::{
    CardIdMode, ENGINES, Parameters, SeedConfig, SeedMode, SetScope, Uniformity,
};
pub use schema::parameters_json_schema;

/// Current contract version for `cards.json` and `report.json` artifacts.
pub const ARTIFACT_VERSION: &str = "0.1";
