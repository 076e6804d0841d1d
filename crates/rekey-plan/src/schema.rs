use schemars::schema::RootSchema;
use schemars::schema_for;

use crate::model::Manifest;

/// Emit the JSON Schema for manifest files.
pub fn manifest_json_schema() -> RootSchema {
    schema_for!(Manifest)
}
