//! Schema-validation boundary.
//!
//! Wraps the JSON Schema implementation behind a synchronous
//! `validate(doc, schema)` call returning either success or the collected
//! error messages. Used for project files, template files, and converted
//! requirements alike.

use crate::error::{Error, Result};
use serde_json::Value;

/// Outcome of one structural validation.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub success: bool,
    pub errors: Vec<String>,
}

impl ValidationOutcome {
    /// Joined, human-readable error description.
    pub fn description(&self) -> String {
        self.errors
            .iter()
            .map(|e| format!("Schema validation error: \"{}\"", e))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Validate `document` against `schema`, collecting every error.
///
/// A schema that itself fails to compile is a fatal error; documents are
/// user input, schemas are configuration.
pub fn validate(document: &Value, schema: &Value) -> Result<ValidationOutcome> {
    let validator =
        jsonschema::validator_for(schema).map_err(|e| Error::SchemaCompile(e.to_string()))?;

    let errors: Vec<String> = validator
        .iter_errors(document)
        .map(|e| format!("{}: {}", e.instance_path, e))
        .collect();

    Ok(ValidationOutcome {
        success: errors.is_empty(),
        errors,
    })
}
