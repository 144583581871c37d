use schemars::schema::RootSchema;
use schemars::schema_for;

use crate::params::Parameters;

/// Emit the JSON Schema for resolved run parameters.
pub fn parameters_json_schema() -> RootSchema {
    schema_for!(Parameters)
}
