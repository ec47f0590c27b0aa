//! Structured error types: fatal run errors and accumulated validation failures.
//!
//! The two classes are deliberately disjoint. An [`Error`] aborts the whole
//! run. A [`ValidationFailure`] is collected into the run's failure list and
//! processing continues; the serialized failure list is the program's output.

use serde::Serialize;
use std::path::PathBuf;

/// Failure codes for accumulated (non-fatal) validation failures.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// A document failed structural validation against its JSON schema.
    SchemaValidationFailed,
    /// A requirement document has fewer than two links.
    TooFewLinks,
    /// A template or artifact link path is too short to be meaningful.
    LinkTooShort,
    /// The template referenced by a requirement is not in the resolved set.
    TemplateNotFound,
    /// A conversion rule's path query produced no value for a field.
    FieldConversionFailed,
    /// A converted requirement failed verification against its template schema.
    VerificationFailed,
    /// A semantic validation rule matched zero rows for an artifact.
    RuleFailed,
}

/// One accumulated validation failure, tied to the file it concerns.
///
/// Serialized as the program's result payload, so the field names are part
/// of the output contract.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationFailure {
    pub success: bool,
    pub error_code: FailureKind,
    pub error_description: String,
    pub file_path: String,
}

impl ValidationFailure {
    pub fn new(code: FailureKind, description: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            success: false,
            error_code: code,
            error_description: description.into(),
            file_path: path.into(),
        }
    }

    // Convenience constructors

    pub fn schema_invalid(details: &str, path: &str) -> Self {
        Self::new(FailureKind::SchemaValidationFailed, details, path)
    }

    pub fn too_few_links(path: &str) -> Self {
        Self::new(
            FailureKind::TooFewLinks,
            "Document must have at least two links, first must be template",
            path,
        )
    }

    pub fn link_too_short(path: &str) -> Self {
        Self::new(
            FailureKind::LinkTooShort,
            "Requirements template path must be greater than zero",
            path,
        )
    }

    pub fn template_not_found(template_path: &str, path: &str) -> Self {
        Self::new(
            FailureKind::TemplateNotFound,
            format!("Requirement template path not found: {}", template_path),
            path,
        )
    }

    pub fn conversion_failed(field: &str, reason: &str, path: &str) -> Self {
        Self::new(
            FailureKind::FieldConversionFailed,
            format!(
                "Requirements field not meeting criteria for field: '{}', error: {}",
                field, reason
            ),
            path,
        )
    }

    pub fn verification_failed(details: &str, path: &str) -> Self {
        Self::new(FailureKind::VerificationFailed, details, path)
    }

    pub fn rule_failed(rule_name: &str, artifact_id: &str) -> Self {
        Self::new(FailureKind::RuleFailed, rule_name, artifact_id)
    }
}

/// Fatal errors that abort the entire run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no version in project file: {}", .0.display())]
    MissingVersion(PathBuf),

    #[error("project version not supported: {0}")]
    UnsupportedVersion(String),

    #[error("project file failed structural validation: {0}")]
    ProjectInvalid(String),

    #[error("requirements project must contain either templates and/or requirements")]
    EmptyProject,

    #[error("template path must be greater than zero: '{0}'")]
    TemplatePathTooShort(String),

    #[error("requirements template already exists for given path: {0}")]
    DuplicateTemplatePath(String),

    #[error("base template doesn't exist for template with id: {0}")]
    BaseTemplateNotFound(String),

    #[error("template base loop detected between: '{from}' and '{destination}'")]
    TemplateBaseCycle { from: String, destination: String },

    #[error("cannot insert to the database: {0}")]
    TemplateInsert(String),

    #[error("stored template cannot be found by id: {0}")]
    TemplateLookup(String),

    #[error("stored artifact cannot be found by id: {0}")]
    ArtifactLookup(String),

    #[error("unknown parameter in template validation query: {0}")]
    UnknownRuleParameter(String),

    #[error("invalid schema: {0}")]
    SchemaCompile(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Db(#[from] rusqlite::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] refinery::Error),

    #[error("task join failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result type for run-fatal operations.
pub type Result<T> = std::result::Result<T, Error>;
