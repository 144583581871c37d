use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::card::Card;
use crate::error::Result;
use crate::params::Parameters;

/// Serialize a JSON value with sorted object keys and compact separators.
pub fn canonical_json(value: &Value) -> String {
    sort_keys(value).to_string()
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                if let Some(inner) = map.get(key) {
                    sorted.insert(key.clone(), sort_keys(inner));
                }
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

fn sha256_tagged(payload: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(payload)))
}

fn sha256_of<T: Serialize>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value)?;
    Ok(sha256_tagged(canonical_json(&value).as_bytes()))
}

/// Hash of the parameter contract, `sha256:<hex>`.
pub fn params_hash(params: &Parameters) -> Result<String> {
    sha256_of(params)
}

/// Hash of a single card's matrix.
pub fn matrix_hash(card: &Card) -> Result<String> {
    sha256_of(&card.to_matrix())
}

/// Hash over the ordered list of card hashes.
pub fn cards_hash(cards: &[Card]) -> Result<String> {
    let hashes = cards.iter().map(matrix_hash).collect::<Result<Vec<_>>>()?;
    sha256_of(&hashes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_json_sorts_nested_keys() {
        let value: Value = serde_json::from_str(r#"{"b": {"z": 1, "a": [2, {"y": 0, "x": 1}]}, "a": true}"#)
            .expect("parse");
        assert_eq!(
            canonical_json(&value),
            r#"{"a":true,"b":{"a":[2,{"x":1,"y":0}],"z":1}}"#
        );
    }

    #[test]
    fn params_hash_is_stable_and_sensitive() {
        let params = Parameters::new(75, 150, 3, 4);
        let first = params_hash(&params).expect("hash");
        let second = params_hash(&params.clone()).expect("hash");
        assert_eq!(first, second);
        assert!(first.starts_with("sha256:"));
        assert_eq!(first.len(), "sha256:".len() + 64);

        let mut other = params.clone();
        other.seed.value = 1;
        assert_ne!(first, params_hash(&other).expect("hash"));
    }

    #[test]
    fn matrix_hash_covers_cell_order() {
        let a = Card::from_matrix(vec![vec![1, 2, 3]]).expect("card");
        let b = Card::from_matrix(vec![vec![3, 2, 1]]).expect("card");
        assert_ne!(matrix_hash(&a).expect("hash"), matrix_hash(&b).expect("hash"));
        let expected = sha256_tagged(b"[[1,2,3]]");
        assert_eq!(matrix_hash(&a).expect("hash"), expected);
    }
}
