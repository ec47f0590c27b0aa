//! Template documents, resolved models, and inheritance-aware rule merging.
//!
//! Raw template documents come from JSON files. The build engine
//! ([`builder`]) resolves their single-parent `base` references into a
//! [`TemplateArena`]: base links are indices into a stable vector rather
//! than live references, so there are no ownership cycles and traversal can
//! assume acyclicity once the build-time cycle check has passed.

pub mod builder;
pub mod cache;

pub use builder::{TemplateSet, build_templates, check_for_loop_in_base_chain};
pub use cache::TemplateCache;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// A template document as authored in a project's JSON files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTemplate {
    /// Logical, globally-unique template key.
    pub id: String,
    /// Logical reference to another template's `id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_abstract: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_rules: Option<VerificationRules>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversion_rules: Option<Vec<ConversionRule>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_rules: Option<Vec<ValidationRule>>,
}

impl RawTemplate {
    /// The trimmed base id, when the template declares a usable one.
    pub fn base_id(&self) -> Option<&str> {
        match self.base.as_deref().map(str::trim) {
            Some(base) if !base.is_empty() => Some(base),
            _ => None,
        }
    }
}

/// How one field is extracted from a requirement's document tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRule {
    pub field: String,
    pub path: String,
}

/// Structural verification declarations, merged into a JSON schema.
///
/// `properties` preserves file order; merge order is observable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRules {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub rule_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<IndexMap<String, Value>>,
}

/// A named semantic rule evaluated against the persisted store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRule {
    pub name: String,
    pub query: RuleQuery,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleQuery {
    pub tables: Vec<TableRef>,
    #[serde(rename = "where")]
    pub where_clause: WhereClause,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRef {
    pub alias: String,
    pub table: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhereClause {
    pub clause: String,
    pub parameters: Vec<String>,
}

/// A resolved template: its raw document plus the arena index of its base.
#[derive(Debug, Clone)]
pub struct TemplateModel {
    pub raw: RawTemplate,
    pub base: Option<usize>,
}

/// Stable storage for resolved templates.
///
/// Indices handed out by [`TemplateArena::push`] stay valid for the arena's
/// lifetime; base chains are acyclic by construction (the build engine
/// rejects cyclic inputs before any model is pushed).
#[derive(Debug, Default)]
pub struct TemplateArena {
    models: Vec<TemplateModel>,
}

impl TemplateArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, model: TemplateModel) -> usize {
        self.models.push(model);
        self.models.len() - 1
    }

    pub fn get(&self, idx: usize) -> &TemplateModel {
        &self.models[idx]
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Effective conversion rules: inherited rules not overridden locally
    /// (base order), then local rules (local order). Unique by trimmed field.
    pub fn effective_conversion_rules(&self, idx: usize) -> Vec<ConversionRule> {
        let model = self.get(idx);
        let local = model.raw.conversion_rules.clone().unwrap_or_default();
        match model.base {
            None => local,
            Some(base_idx) => merge_by_key(
                self.effective_conversion_rules(base_idx),
                local,
                |rule| rule.field.trim().to_string(),
            ),
        }
    }

    /// Effective required-field list, merged with the same precedence as
    /// conversion rules.
    pub fn effective_required(&self, idx: usize) -> Vec<String> {
        let model = self.get(idx);
        let local = model
            .raw
            .verification_rules
            .as_ref()
            .and_then(|v| v.required.clone())
            .unwrap_or_default();
        match model.base {
            None => local,
            Some(base_idx) => merge_by_key(self.effective_required(base_idx), local, |field| {
                field.trim().to_string()
            }),
        }
    }

    /// Verification target type: local value, else nearest ancestor's, else
    /// the default "object".
    pub fn verification_type(&self, idx: usize) -> String {
        let model = self.get(idx);
        if let Some(rule_type) = model
            .raw
            .verification_rules
            .as_ref()
            .and_then(|v| v.rule_type.clone())
        {
            return rule_type;
        }
        match model.base {
            Some(base_idx) => self.verification_type(base_idx),
            None => "object".to_string(),
        }
    }

    /// Effective verification properties as ordered `(field, schema)` pairs.
    pub fn effective_verification_properties(&self, idx: usize) -> Vec<(String, Value)> {
        let model = self.get(idx);
        let local: Vec<(String, Value)> = model
            .raw
            .verification_rules
            .as_ref()
            .and_then(|v| v.properties.as_ref())
            .map(|props| {
                props
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();
        match model.base {
            None => local,
            Some(base_idx) => merge_by_key(
                self.effective_verification_properties(base_idx),
                local,
                |(field, _)| field.trim().to_string(),
            ),
        }
    }

    /// The full effective verification schema for a template, ready to hand
    /// to the schema-validation boundary.
    pub fn effective_verification_schema(&self, idx: usize) -> Value {
        let mut properties = serde_json::Map::new();
        for (field, schema) in self.effective_verification_properties(idx) {
            properties.insert(field, schema);
        }
        serde_json::json!({
            "type": self.verification_type(idx),
            "required": self.effective_required(idx),
            "properties": properties,
        })
    }
}

/// Merge base and local rule lists: base entries whose key is re-declared
/// locally are dropped; local entries follow, in their own order.
fn merge_by_key<T, F>(base: Vec<T>, local: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> String,
{
    let local_keys: HashSet<String> = local.iter().map(&key).collect();
    let mut merged: Vec<T> = base
        .into_iter()
        .filter(|rule| !local_keys.contains(&key(rule)))
        .collect();
    merged.extend(local);
    merged
}
