//! Core data shapes flowing between pipeline stages and the store.

use crate::markdown::{DocNode, LinkInfo};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A requirement document after parsing and link extraction.
///
/// `template_path` and `artefact_id_path` are the destinations of the first
/// two links in document order; everything after them is a trace-link
/// candidate. Either may be absent when the document is degraded (fewer
/// than two links) — such a requirement keeps flowing for failure
/// reporting but skips the stages that need a binding.
#[derive(Debug, Clone)]
pub struct ParsedRequirement {
    pub requirement_path: String,
    pub document_tree: DocNode,
    pub template_path: Option<String>,
    pub artefact_id_path: Option<String>,
    pub effective_links: Vec<LinkInfo>,
}

/// A requirement bound to its template and converted to field values.
#[derive(Debug, Clone)]
pub struct ProcessedRequirement {
    pub requirement_path: String,
    pub artefact_id_path: String,
    /// Arena index of the bound template.
    pub template_idx: usize,
    pub converted: ConvertedRequirement,
    pub effective_links: Vec<LinkInfo>,
    pub verification_succeeded: bool,
}

/// The converted form of a requirement: artefact type/id plus one entry per
/// successfully converted field.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct ConvertedRequirement(pub Map<String, Value>);

impl ConvertedRequirement {
    pub fn new(artefact_type: &str, artefact_id: &str) -> Self {
        let mut map = Map::new();
        map.insert(
            "artefactType".to_string(),
            Value::String(artefact_type.to_string()),
        );
        map.insert(
            "artefactId".to_string(),
            Value::String(artefact_id.to_string()),
        );
        Self(map)
    }

    pub fn set_field(&mut self, field: &str, value: Value) {
        self.0.insert(field.trim().to_string(), value);
    }

    pub fn artefact_type(&self) -> String {
        self.0
            .get("artefactType")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

/// A persisted template row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateRow {
    pub id: i64,
    pub template_id: String,
    pub base_id: Option<i64>,
    pub is_abstract: bool,
}

/// A persisted artifact row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRow {
    pub id: i64,
    pub template_id: i64,
    pub artifact_id: String,
}

/// A persisted trace-link row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRow {
    pub id: i64,
    pub source_artifact_id: i64,
    pub destination_artifact_id: i64,
    pub field_name: Option<String>,
}

/// An artifact row staged for insertion (no surrogate id yet).
#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub template_id: i64,
    pub artifact_id: String,
}

/// A link row staged for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLink {
    pub source_artifact_id: i64,
    pub destination_artifact_id: i64,
    pub field_name: Option<String>,
}
