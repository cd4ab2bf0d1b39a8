//! JSON Schema of the `--output json` document

use crate::report::RunReport;

/// Generate JSON Schema for [`RunReport`].
///
/// # Errors
///
/// Returns the serialization error if the schema cannot be rendered.
pub fn generate_schema() -> Result<String, serde_json::Error> {
    let schema = schemars::schema_for!(RunReport);
    serde_json::to_string_pretty(&schema)
}
