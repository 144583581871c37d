use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Args};
use jsonschema::JSONSchema;
use serde_json::{Map, Value};
use thiserror::Error;
use tombola_core::{Parameters, parameters_json_schema};

/// Prefix for environment overrides (`TOMBOLA_R`, `TOMBOLA_SEED_VALUE`, ...).
pub const ENV_PREFIX: &str = "TOMBOLA_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid json config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid toml config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid yaml config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unsupported config format '{0}' (expected .json, .yaml or .toml)")]
    UnsupportedFormat(String),
    #[error("config file must contain a top-level table")]
    NotATable,
    #[error("invalid value for {key}: {message}")]
    Env { key: String, message: String },
    #[error("parameter schema error: {0}")]
    Schema(String),
    #[error("parameters rejected by schema: {}", .0.join("; "))]
    SchemaViolations(Vec<String>),
}

/// Parameter flags shared by `run` and `check`.
#[derive(Args, Debug, Clone, Default)]
pub struct ParamArgs {
    /// Config file (.json, .yaml/.yml or .toml).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Numbers are drawn from 1..=R.
    #[arg(long = "R", value_name = "R")]
    pub range: Option<u32>,
    /// Number of cards.
    #[arg(long = "T", value_name = "T")]
    pub cards: Option<u32>,
    /// Rows per card.
    #[arg(long = "m", value_name = "M")]
    pub rows: Option<u32>,
    /// Columns per card.
    #[arg(long = "n", value_name = "N")]
    pub cols: Option<u32>,
    /// Unique line scopes: row_sets, col_sets, or none.
    #[arg(long, value_delimiter = ',', value_name = "SCOPE")]
    pub unique_scope: Option<Vec<String>>,
    /// strict | near
    #[arg(long)]
    pub uniformity: Option<String>,
    /// Balance values across cell positions; `--position-balance false` turns it off.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", action = ArgAction::Set)]
    pub position_balance: Option<bool>,
    #[arg(long)]
    pub seed: Option<u64>,
    /// chacha8 | chacha12 | chacha20
    #[arg(long)]
    pub engine: Option<String>,
    /// direct | hashed
    #[arg(long)]
    pub seed_mode: Option<String>,
    #[arg(long)]
    pub swap_iterations: Option<u64>,
    #[arg(long)]
    pub build_timeout_sec: Option<u64>,
    #[arg(long, num_args = 0..=1, default_missing_value = "true", action = ArgAction::Set)]
    pub allow_best_effort: Option<bool>,
    #[arg(long)]
    pub parallelism: Option<usize>,
    #[arg(long)]
    pub max_card_rebuilds: Option<u32>,
    /// Numbers on one card must differ by at least this much (0 or 1 disables).
    #[arg(long)]
    pub min_distance: Option<u32>,
    /// sequential | uuid
    #[arg(long)]
    pub card_id_mode: Option<String>,
    /// First id in sequential mode.
    #[arg(long)]
    pub card_number_start: Option<u64>,
}

impl ParamArgs {
    /// Explicitly given flags as `(path, value)` overrides.
    fn overrides(&self) -> Vec<(&'static [&'static str], Value)> {
        let mut entries = Vec::new();
        let mut push = |path: &'static [&'static str], value: Value| entries.push((path, value));
        if let Some(value) = self.range {
            push(&["R"], Value::from(value));
        }
        if let Some(value) = self.cards {
            push(&["T"], Value::from(value));
        }
        if let Some(value) = self.rows {
            push(&["m"], Value::from(value));
        }
        if let Some(value) = self.cols {
            push(&["n"], Value::from(value));
        }
        if let Some(scopes) = &self.unique_scope {
            push(&["unique_scope"], scope_list(scopes.iter().map(String::as_str)));
        }
        if let Some(value) = &self.uniformity {
            push(&["uniformity"], Value::from(value.as_str()));
        }
        if let Some(value) = self.position_balance {
            push(&["position_balance"], Value::Bool(value));
        }
        if let Some(value) = self.seed {
            push(&["seed", "value"], Value::from(value));
        }
        if let Some(value) = &self.engine {
            push(&["seed", "engine"], Value::from(value.as_str()));
        }
        if let Some(value) = &self.seed_mode {
            push(&["seed", "mode"], Value::from(value.as_str()));
        }
        if let Some(value) = self.swap_iterations {
            push(&["swap_iterations"], Value::from(value));
        }
        if let Some(value) = self.build_timeout_sec {
            push(&["build_timeout_sec"], Value::from(value));
        }
        if let Some(value) = self.allow_best_effort {
            push(&["allow_best_effort"], Value::Bool(value));
        }
        if let Some(value) = self.parallelism {
            push(&["parallelism"], Value::from(value));
        }
        if let Some(value) = self.max_card_rebuilds {
            push(&["max_card_rebuilds"], Value::from(value));
        }
        if let Some(value) = self.min_distance {
            push(&["min_distance"], Value::from(value));
        }
        if let Some(value) = &self.card_id_mode {
            push(&["card_id_mode"], Value::from(value.as_str()));
        }
        if let Some(value) = self.card_number_start {
            push(&["card_number_start"], Value::from(value));
        }
        entries
    }
}

#[derive(Debug, Clone, Copy)]
enum EnvKind {
    Integer,
    Bool,
    Text,
    List,
}

const ENV_KEYS: &[(&str, &[&str], EnvKind)] = &[
    ("R", &["R"], EnvKind::Integer),
    ("T", &["T"], EnvKind::Integer),
    ("M", &["m"], EnvKind::Integer),
    ("N", &["n"], EnvKind::Integer),
    ("UNIQUE_SCOPE", &["unique_scope"], EnvKind::List),
    ("UNIFORMITY", &["uniformity"], EnvKind::Text),
    ("POSITION_BALANCE", &["position_balance"], EnvKind::Bool),
    ("SEED_VALUE", &["seed", "value"], EnvKind::Integer),
    ("SEED_ENGINE", &["seed", "engine"], EnvKind::Text),
    ("SEED_MODE", &["seed", "mode"], EnvKind::Text),
    ("SWAP_ITERATIONS", &["swap_iterations"], EnvKind::Integer),
    ("BUILD_TIMEOUT_SEC", &["build_timeout_sec"], EnvKind::Integer),
    ("ALLOW_BEST_EFFORT", &["allow_best_effort"], EnvKind::Bool),
    ("PARALLELISM", &["parallelism"], EnvKind::Integer),
    ("MAX_CARD_REBUILDS", &["max_card_rebuilds"], EnvKind::Integer),
    ("MIN_DISTANCE", &["min_distance"], EnvKind::Integer),
    ("CARD_ID_MODE", &["card_id_mode"], EnvKind::Text),
    ("CARD_NUMBER_START", &["card_number_start"], EnvKind::Integer),
];

fn env_overrides(
    vars: impl IntoIterator<Item = (String, String)>,
) -> Result<Vec<(&'static [&'static str], Value)>, ConfigError> {
    let vars: HashMap<String, String> = vars
        .into_iter()
        .filter(|(key, _)| key.starts_with(ENV_PREFIX))
        .collect();

    let mut entries = Vec::new();
    for (suffix, path, kind) in ENV_KEYS {
        let key = format!("{ENV_PREFIX}{suffix}");
        let Some(raw) = vars.get(&key) else {
            continue;
        };
        let raw = raw.trim();
        let value = match kind {
            EnvKind::Integer => raw.parse::<u64>().map(Value::from).map_err(|err| {
                ConfigError::Env {
                    key: key.clone(),
                    message: err.to_string(),
                }
            })?,
            EnvKind::Bool => Value::Bool(parse_bool(raw).ok_or_else(|| ConfigError::Env {
                key: key.clone(),
                message: format!("expected a boolean, got '{raw}'"),
            })?),
            EnvKind::Text => Value::from(raw),
            EnvKind::List => scope_list(raw.split(',')),
        };
        entries.push((*path, value));
    }
    Ok(entries)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// `none` (or an empty list) disables set uniqueness.
fn scope_list<'a>(items: impl Iterator<Item = &'a str>) -> Value {
    let items: Vec<Value> = items
        .map(str::trim)
        .filter(|item| !item.is_empty() && *item != "none")
        .map(Value::from)
        .collect();
    Value::Array(items)
}

fn read_config_file(path: &Path) -> Result<Value, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let value: Value = match extension.as_str() {
        "json" => serde_json::from_str(&contents)?,
        "yaml" | "yml" => serde_yaml::from_str(&contents)?,
        "toml" => toml::from_str(&contents)?,
        other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
    };
    if !value.is_object() {
        return Err(ConfigError::NotATable);
    }
    Ok(value)
}

fn set_path(target: &mut Value, path: &[&str], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut cursor = target;
    for part in parents {
        if !cursor.is_object() {
            *cursor = Value::Object(Map::new());
        }
        let Value::Object(map) = cursor else {
            return;
        };
        cursor = map
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if !cursor.is_object() {
        *cursor = Value::Object(Map::new());
    }
    if let Value::Object(map) = cursor {
        map.insert(last.to_string(), value);
    }
}

/// Check a merged config document against the Parameters JSON Schema.
pub fn validate_against_schema(document: &Value) -> Result<(), ConfigError> {
    let schema = serde_json::to_value(parameters_json_schema())?;
    let compiled =
        JSONSchema::compile(&schema).map_err(|err| ConfigError::Schema(err.to_string()))?;

    if let Err(errors) = compiled.validate(document) {
        let messages: Vec<String> = errors
            .map(|error| {
                let path = error.instance_path.to_string();
                if path.is_empty() {
                    error.to_string()
                } else {
                    format!("{path}: {error}")
                }
            })
            .collect();
        return Err(ConfigError::SchemaViolations(messages));
    }
    Ok(())
}

/// Resolve parameters with precedence CLI > environment > config file > defaults.
pub fn resolve_parameters(
    args: &ParamArgs,
    env: impl IntoIterator<Item = (String, String)>,
) -> Result<Parameters, ConfigError> {
    let mut document = match &args.config {
        Some(path) => read_config_file(path)?,
        None => Value::Object(Map::new()),
    };

    for (path, value) in env_overrides(env)? {
        set_path(&mut document, path, value);
    }
    for (path, value) in args.overrides() {
        set_path(&mut document, path, value);
    }

    validate_against_schema(&document)?;
    Ok(serde_json::from_value(document)?)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::fs;

    use clap::Parser;
    use tombola_core::{CardIdMode, SeedMode, SetScope, Uniformity};

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("tombola_config_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join(name);
        fs::write(&path, contents).expect("write config");
        path
    }

    #[test]
    fn flags_alone_resolve_with_defaults() {
        let args = ParamArgs {
            range: Some(75),
            cards: Some(150),
            rows: Some(3),
            cols: Some(4),
            ..ParamArgs::default()
        };
        let params = resolve_parameters(&args, Vec::new()).expect("params");
        assert_eq!(params, Parameters::new(75, 150, 3, 4));
    }

    #[test]
    fn cli_beats_env_beats_file() {
        let path = temp_file(
            "params.toml",
            "R = 90\nT = 10\nm = 3\nn = 5\nuniformity = \"near\"\n\n[seed]\nvalue = 1\nengine = \"chacha8\"\n",
        );
        let args = ParamArgs {
            config: Some(path),
            cards: Some(12),
            ..ParamArgs::default()
        };
        let vars = env(&[
            ("TOMBOLA_T", "11"),
            ("TOMBOLA_SEED_VALUE", "7"),
            ("TOMBOLA_SEED_MODE", "hashed"),
            ("TOMBOLA_UNIQUE_SCOPE", "row_sets,col_sets"),
            ("OTHER_T", "99"),
        ]);

        let params = resolve_parameters(&args, vars).expect("params");
        assert_eq!(params.range, 90);
        assert_eq!(params.cards, 12);
        assert_eq!(params.uniformity, Uniformity::Near);
        assert_eq!(params.seed.value, 7);
        assert_eq!(params.seed.engine, "chacha8");
        assert_eq!(params.seed.mode, SeedMode::Hashed);
        assert_eq!(
            params.unique_scope,
            BTreeSet::from([SetScope::RowSets, SetScope::ColSets])
        );
    }

    #[test]
    fn json_config_and_none_scope() {
        let path = temp_file("params.json", r#"{"R": 10, "T": 2, "m": 1, "n": 5}"#);
        let args = ParamArgs {
            config: Some(path),
            unique_scope: Some(vec!["none".to_string()]),
            ..ParamArgs::default()
        };
        let params = resolve_parameters(&args, Vec::new()).expect("params");
        assert!(params.unique_scope.is_empty());
    }

    #[test]
    fn missing_dimensions_are_schema_violations() {
        let args = ParamArgs {
            range: Some(10),
            ..ParamArgs::default()
        };
        let err = resolve_parameters(&args, Vec::new()).expect_err("missing T, m, n");
        assert!(matches!(err, ConfigError::SchemaViolations(_)));
    }

    #[test]
    fn unknown_uniformity_is_rejected() {
        let args = ParamArgs {
            range: Some(10),
            cards: Some(2),
            rows: Some(1),
            cols: Some(5),
            uniformity: Some("exact".to_string()),
            ..ParamArgs::default()
        };
        let err = resolve_parameters(&args, Vec::new()).expect_err("bad uniformity");
        assert!(matches!(err, ConfigError::SchemaViolations(_)));
    }

    #[test]
    fn malformed_env_values_name_the_variable() {
        let args = ParamArgs::default();
        let err = resolve_parameters(&args, env(&[("TOMBOLA_R", "many")])).expect_err("bad R");
        match err {
            ConfigError::Env { key, .. } => assert_eq!(key, "TOMBOLA_R"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn yaml_config_is_read() {
        let path = temp_file(
            "params.yml",
            "R: 10\nT: 2\nm: 1\nn: 5\nunique_scope: [col_sets]\nseed:\n  value: 42\n",
        );
        let args = ParamArgs {
            config: Some(path),
            ..ParamArgs::default()
        };
        let params = resolve_parameters(&args, Vec::new()).expect("params");
        assert_eq!(params.range, 10);
        assert_eq!(params.seed.value, 42);
        assert_eq!(params.unique_scope, BTreeSet::from([SetScope::ColSets]));
    }

    #[test]
    fn unknown_extensions_are_rejected() {
        let path = temp_file("params.ini", "R=10\n");
        let args = ParamArgs {
            config: Some(path),
            ..ParamArgs::default()
        };
        let err = resolve_parameters(&args, Vec::new()).expect_err("ini");
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }

    #[test]
    fn boolean_flags_can_switch_file_values_off() {
        let path = temp_file(
            "params.json",
            r#"{"R": 12, "T": 6, "m": 2, "n": 3, "position_balance": true, "allow_best_effort": true}"#,
        );
        let args = ParamArgs {
            config: Some(path.clone()),
            position_balance: Some(false),
            ..ParamArgs::default()
        };
        let params = resolve_parameters(&args, Vec::new()).expect("params");
        assert!(!params.position_balance);
        assert!(params.allow_best_effort);

        let cli = ParamParser::try_parse_from([
            "tombola",
            "--config",
            path.to_str().expect("utf-8 path"),
            "--allow-best-effort=false",
            "--position-balance",
        ])
        .expect("parse flags");
        assert_eq!(cli.params.allow_best_effort, Some(false));
        assert_eq!(cli.params.position_balance, Some(true));
        let params = resolve_parameters(&cli.params, Vec::new()).expect("params");
        assert!(!params.allow_best_effort);
        assert!(params.position_balance);
    }

    #[test]
    fn card_ids_and_spacing_come_from_env_and_flags() {
        let path = temp_file(
            "params.yaml",
            "R: 90\nT: 6\nm: 3\nn: 5\nmin_distance: 3\ncard_id_mode: uuid\n",
        );
        let args = ParamArgs {
            config: Some(path),
            min_distance: Some(2),
            ..ParamArgs::default()
        };
        let vars = env(&[
            ("TOMBOLA_CARD_ID_MODE", "sequential"),
            ("TOMBOLA_CARD_NUMBER_START", "500"),
            ("TOMBOLA_MIN_DISTANCE", "4"),
        ]);
        let params = resolve_parameters(&args, vars).expect("params");
        assert_eq!(params.min_distance, 2);
        assert_eq!(params.card_id_mode, CardIdMode::Sequential);
        assert_eq!(params.card_number_start, 500);

        let args = ParamArgs {
            card_id_mode: Some("random".to_string()),
            ..args
        };
        let err = resolve_parameters(&args, Vec::new()).expect_err("bad id mode");
        assert!(matches!(err, ConfigError::SchemaViolations(_)));
    }

    #[derive(Parser)]
    struct ParamParser {
        #[command(flatten)]
        params: ParamArgs,
    }
}
