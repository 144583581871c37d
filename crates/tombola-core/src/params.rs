use std::collections::BTreeSet;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Pseudo-random engines a run may request.
pub const ENGINES: &[&str] = &["chacha8", "chacha12", "chacha20"];

/// Which line sets must never repeat across the whole card set.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum SetScope {
    RowSets,
    ColSets,
}

impl SetScope {
    pub fn as_str(self) -> &'static str {
        match self {
            SetScope::RowSets => "row_sets",
            SetScope::ColSets => "col_sets",
        }
    }
}

/// Global fairness mode for number frequencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Uniformity {
    /// Every number appears exactly `P / R` times.
    #[default]
    Strict,
    /// Frequencies differ by at most one.
    Near,
}

impl Uniformity {
    pub fn as_str(self) -> &'static str {
        match self {
            Uniformity::Strict => "strict",
            Uniformity::Near => "near",
        }
    }
}

/// How the run seed is turned into the run's random stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SeedMode {
    /// The seed value feeds the engine directly.
    #[default]
    Direct,
    /// The seed value is passed through a one-way hash first.
    Hashed,
}

/// How card identifiers in `cards.json` are assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CardIdMode {
    /// `card_number_start`, `card_number_start + 1`, ... in output order.
    #[default]
    Sequential,
    /// Name-based UUIDs derived from the parameter hash and the card position.
    Uuid,
}

impl CardIdMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CardIdMode::Sequential => "sequential",
            CardIdMode::Uuid => "uuid",
        }
    }
}

/// Seed value, engine identifier and derivation mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SeedConfig {
    #[serde(default)]
    pub value: u64,
    #[serde(default = "default_engine")]
    pub engine: String,
    #[serde(default)]
    pub mode: SeedMode,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            value: 0,
            engine: default_engine(),
            mode: SeedMode::Direct,
        }
    }
}

/// Resolved parameters for one construction run.
///
/// Serialized keys follow the configuration file format (`R`, `T`, `m`, `n`).
/// The value is immutable for the duration of a run and is hashed with
/// [`crate::params_hash`] to bind artifacts to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Parameters {
    /// Upper bound of the number range `1..=R`.
    #[serde(rename = "R")]
    pub range: u32,
    /// Number of cards to build.
    #[serde(rename = "T")]
    pub cards: u32,
    /// Rows per card.
    #[serde(rename = "m")]
    pub rows: u32,
    /// Columns per card.
    #[serde(rename = "n")]
    pub cols: u32,
    #[serde(default = "default_unique_scope")]
    pub unique_scope: BTreeSet<SetScope>,
    #[serde(default)]
    pub uniformity: Uniformity,
    /// Spread each number evenly across grid positions (advisory).
    #[serde(default)]
    pub position_balance: bool,
    /// Smallest gap between any two numbers on one card; 0 and 1 impose nothing.
    #[serde(default)]
    pub min_distance: u32,
    #[serde(default)]
    pub seed: SeedConfig,
    /// Shared budget of swap attempts for the whole run.
    #[serde(default = "default_swap_iterations")]
    pub swap_iterations: u64,
    /// Wall-clock budget for the whole run, in seconds.
    #[serde(default = "default_build_timeout_sec")]
    pub build_timeout_sec: u64,
    /// Emit a flagged card set instead of failing when the budget runs out.
    #[serde(default)]
    pub allow_best_effort: bool,
    /// Worker count; 1 keeps construction single-threaded and reproducible.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// How many times a single card may be torn down and rebuilt.
    #[serde(default = "default_max_card_rebuilds")]
    pub max_card_rebuilds: u32,
    #[serde(default)]
    pub card_id_mode: CardIdMode,
    /// First card number under sequential ids.
    #[serde(default = "default_card_number_start")]
    pub card_number_start: u64,
}

impl Parameters {
    /// Parameters with every optional field at its default.
    pub fn new(range: u32, cards: u32, rows: u32, cols: u32) -> Self {
        Self {
            range,
            cards,
            rows,
            cols,
            unique_scope: default_unique_scope(),
            uniformity: Uniformity::default(),
            position_balance: false,
            min_distance: 0,
            seed: SeedConfig::default(),
            swap_iterations: default_swap_iterations(),
            build_timeout_sec: default_build_timeout_sec(),
            allow_best_effort: false,
            parallelism: default_parallelism(),
            max_card_rebuilds: default_max_card_rebuilds(),
            card_id_mode: CardIdMode::default(),
            card_number_start: default_card_number_start(),
        }
    }

    /// Total number of placements `P = T * m * n`.
    pub fn total_placements(&self) -> u64 {
        u64::from(self.cards)
            .saturating_mul(u64::from(self.rows))
            .saturating_mul(u64::from(self.cols))
    }

    pub fn cells_per_card(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    pub fn scope_active(&self, scope: SetScope) -> bool {
        self.unique_scope.contains(&scope)
    }

    /// Whether cards must keep their numbers `min_distance` apart.
    pub fn spacing_active(&self) -> bool {
        self.min_distance > 1
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_sec)
    }

    /// Structural validation; feasibility is checked separately.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("R", self.range),
            ("T", self.cards),
            ("m", self.rows),
            ("n", self.cols),
        ] {
            if value == 0 {
                return Err(Error::InvalidParameters(format!("{name} must be >= 1")));
            }
        }

        let placements = u64::from(self.cards)
            .checked_mul(u64::from(self.rows))
            .and_then(|value| value.checked_mul(u64::from(self.cols)));
        if placements.is_none() {
            return Err(Error::InvalidParameters(
                "T * m * n overflows a 64-bit count".to_string(),
            ));
        }

        if self.parallelism == 0 {
            return Err(Error::InvalidParameters(
                "parallelism must be >= 1".to_string(),
            ));
        }

        if self
            .card_number_start
            .checked_add(u64::from(self.cards))
            .is_none()
        {
            return Err(Error::InvalidParameters(
                "card_number_start + T overflows a 64-bit id".to_string(),
            ));
        }

        if !ENGINES.contains(&self.seed.engine.as_str()) {
            return Err(Error::InvalidParameters(format!(
                "unknown rng engine '{}' (expected one of: {})",
                self.seed.engine,
                ENGINES.join(", ")
            )));
        }

        Ok(())
    }
}

fn default_engine() -> String {
    "chacha20".to_string()
}

fn default_unique_scope() -> BTreeSet<SetScope> {
    BTreeSet::from([SetScope::RowSets])
}

fn default_swap_iterations() -> u64 {
    200_000
}

fn default_build_timeout_sec() -> u64 {
    60
}

fn default_parallelism() -> usize {
    1
}

fn default_max_card_rebuilds() -> u32 {
    32
}

fn default_card_number_start() -> u64 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let params: Parameters =
            serde_json::from_str(r#"{"R": 75, "T": 150, "m": 3, "n": 4}"#).expect("parse");
        assert_eq!(params, Parameters::new(75, 150, 3, 4));
        assert!(params.scope_active(SetScope::RowSets));
        assert!(!params.scope_active(SetScope::ColSets));
        assert_eq!(params.total_placements(), 1800);
    }

    #[test]
    fn unique_scope_is_deduplicated() {
        let params: Parameters = serde_json::from_str(
            r#"{"R": 9, "T": 1, "m": 1, "n": 3, "unique_scope": ["col_sets", "row_sets", "col_sets"]}"#,
        )
        .expect("parse");
        let scopes: Vec<_> = params.unique_scope.iter().copied().collect();
        assert_eq!(scopes, vec![SetScope::RowSets, SetScope::ColSets]);
    }

    #[test]
    fn card_numbering_and_spacing_default_off() {
        let params: Parameters = serde_json::from_str(
            r#"{"R": 90, "T": 3, "m": 3, "n": 5, "card_id_mode": "uuid", "min_distance": 2}"#,
        )
        .expect("parse");
        assert_eq!(params.card_id_mode, CardIdMode::Uuid);
        assert_eq!(params.card_number_start, 1);
        assert!(params.spacing_active());
        assert!(!Parameters::new(90, 3, 3, 5).spacing_active());
    }

    #[test]
    fn validate_rejects_zero_dimensions_and_unknown_engine() {
        let mut params = Parameters::new(9, 0, 1, 3);
        assert!(params.validate().is_err());

        params.cards = 1;
        assert!(params.validate().is_ok());

        params.seed.engine = "mt19937".to_string();
        let err = params.validate().expect_err("unknown engine");
        assert!(err.to_string().contains("mt19937"));
    }
}
