use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tombola_core::{
    ARTIFACT_VERSION, Card, CardIdMode, Parameters, cards_hash, matrix_hash, params_hash,
};
use uuid::Uuid;

use crate::errors::VerifyError;
use crate::model::{CheckResult, VerificationReport};
use crate::verifier::Verifier;

/// Provenance recorded alongside the cards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    pub app_version: String,
    pub timestamp: String,
    pub run_id: String,
    pub params_hash: String,
    pub seed: u64,
    pub rng_engine: String,
    pub hash_algorithm: String,
    pub parallelism: usize,
    pub best_effort: bool,
    pub params: Parameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_commit: Option<String>,
}

/// Printed card number, or a UUID derived from the run's params hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CardId {
    Number(u64),
    Uuid(Uuid),
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardId::Number(number) => write!(f, "{number}"),
            CardId::Uuid(uuid) => write!(f, "{uuid}"),
        }
    }
}

impl CardId {
    /// Id of the card at `index`. UUIDs are name-based, so reruns agree.
    pub fn assign(params: &Parameters, params_hash: &str, index: usize) -> Self {
        match params.card_id_mode {
            CardIdMode::Sequential => {
                CardId::Number(params.card_number_start.saturating_add(index as u64))
            }
            CardIdMode::Uuid => CardId::Uuid(Uuid::new_v5(
                &Uuid::NAMESPACE_OID,
                format!("{params_hash}/{index}").as_bytes(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardEntry {
    pub id: CardId,
    pub matrix: Card,
    pub matrix_hash: String,
}

/// Contents of `cards.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardsArtifact {
    pub artifact_version: String,
    pub run_meta: RunMeta,
    pub cards: Vec<CardEntry>,
    pub cards_hash: String,
}

impl CardsArtifact {
    /// Wrap finished cards, hashing each matrix and the ordered list.
    pub fn new(run_meta: RunMeta, cards: &[Card]) -> Result<Self, VerifyError> {
        let entries = cards
            .iter()
            .enumerate()
            .map(|(index, card)| {
                Ok(CardEntry {
                    id: CardId::assign(&run_meta.params, &run_meta.params_hash, index),
                    matrix: card.clone(),
                    matrix_hash: matrix_hash(card)?,
                })
            })
            .collect::<Result<Vec<_>, VerifyError>>()?;
        Ok(Self {
            artifact_version: ARTIFACT_VERSION.to_string(),
            run_meta,
            cards: entries,
            cards_hash: cards_hash(cards)?,
        })
    }

    pub fn card_matrices(&self) -> Vec<Card> {
        self.cards.iter().map(|entry| entry.matrix.clone()).collect()
    }

    /// Recompute every stored hash; mismatches are listed, not fatal.
    pub fn integrity(&self, params: &Parameters) -> Result<CheckResult, VerifyError> {
        let mut examples = Vec::new();
        for (index, entry) in self.cards.iter().enumerate() {
            if matrix_hash(&entry.matrix)? != entry.matrix_hash {
                examples.push(format!("card {}: matrix_hash mismatch", entry.id));
            }
            let expected =
                CardId::assign(&self.run_meta.params, &self.run_meta.params_hash, index);
            if entry.id != expected {
                examples.push(format!("card {index}: id {} (expected {expected})", entry.id));
            }
        }
        if cards_hash(&self.card_matrices())? != self.cards_hash {
            examples.push("cards_hash mismatch".to_string());
        }
        if params_hash(params)? != self.run_meta.params_hash {
            examples.push("params_hash does not match the parameters".to_string());
        }
        Ok(CheckResult {
            name: "artifact_integrity".to_string(),
            passed: examples.is_empty(),
            skipped: false,
            violations: examples.len() as u64,
            detail: Some(format!("{} card hashes checked", self.cards.len())),
            examples,
        })
    }
}

pub fn load_cards_artifact(path: &Path) -> Result<CardsArtifact, VerifyError> {
    let contents = std::fs::read_to_string(path)?;
    let artifact: CardsArtifact = serde_json::from_str(&contents)?;
    if artifact.artifact_version != ARTIFACT_VERSION {
        return Err(VerifyError::InvalidArtifact(format!(
            "unsupported artifact_version '{}' (expected {ARTIFACT_VERSION})",
            artifact.artifact_version
        )));
    }
    Ok(artifact)
}

/// Re-verify a serialized card set.
///
/// `params` overrides the parameters recorded in the artifact.
pub fn verify_artifacts(
    cards_path: &Path,
    params: Option<&Parameters>,
) -> Result<(CardsArtifact, VerificationReport), VerifyError> {
    let artifact = load_cards_artifact(cards_path)?;
    let params = params.unwrap_or(&artifact.run_meta.params);
    params.validate()?;

    let mut report = Verifier::new(params).verify(&artifact.card_matrices());
    report.push_check(artifact.integrity(params)?);
    Ok((artifact, report))
}
