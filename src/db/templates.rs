//! Template persistence: base-before-child ordering and idempotent
//! insert-or-lookup.

use super::Database;
use crate::error::{Error, Result};
use crate::template::{TemplateArena, TemplateSet};
use rusqlite::{OptionalExtension, params};
use std::collections::HashMap;
use tracing::{debug, info};

impl Database {
    /// Store one template row when absent, or return the existing row's
    /// surrogate id, keyed by logical `TemplateId`.
    fn store_template_row(
        &self,
        template_id: &str,
        is_abstract: bool,
        base_id: Option<i64>,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            let existing: Option<i64> = conn
                .query_row(
                    "SELECT Id FROM ArtifactTemplates WHERE TemplateId = ?1",
                    params![template_id],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(id) = existing {
                return Ok(id);
            }

            conn.execute(
                "INSERT INTO ArtifactTemplates (TemplateId, BaseId, IsAbstract) VALUES (?1, ?2, ?3)",
                params![template_id, base_id, is_abstract],
            )?;
            let id = conn.last_insert_rowid();
            if id <= 0 {
                return Err(Error::TemplateInsert(template_id.to_string()));
            }
            Ok(id)
        })
    }

    /// Select all persisted templates as `(surrogate id, logical id)` pairs.
    pub fn all_templates(&self) -> Result<Vec<(i64, String)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT Id, TemplateId FROM ArtifactTemplates")?;
            let pairs = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<Vec<(i64, String)>>>()?;
            Ok(pairs)
        })
    }
}

/// The insertion order for one template: itself, then its ancestors up to
/// the root. Callers process it in reverse so the root goes first.
fn build_insert_order(arena: &TemplateArena, idx: usize) -> Vec<usize> {
    let mut order = vec![idx];
    let mut current = idx;
    while let Some(base_idx) = arena.get(current).base {
        order.push(base_idx);
        current = base_idx;
    }
    order
}

/// Persist every resolved template.
///
/// Per template the base chain is written root-first, each row referencing
/// the surrogate id assigned to its base, so the `BaseId` foreign key is
/// always valid at insert time. Writes are strictly serialized across
/// templates: later templates may depend on ids assigned to earlier ones.
pub fn store_templates(db: &Database, set: &TemplateSet) -> Result<()> {
    for idx in set.indices() {
        let order = build_insert_order(&set.arena, idx);

        let mut base_id: Option<i64> = None;
        for &chain_idx in order.iter().rev() {
            let model = set.arena.get(chain_idx);
            let id = db.store_template_row(
                &model.raw.id,
                model.raw.is_abstract.unwrap_or(false),
                base_id,
            )?;
            debug!(template = %model.raw.id, surrogate = id, "Template row resolved");
            base_id = Some(id);
        }
    }

    info!(templates = set.len(), "All templates stored");
    Ok(())
}

/// Map every resolved template's arena index to its surrogate id.
///
/// Fatal when a template that was just stored cannot be found again.
pub fn template_id_map(db: &Database, set: &TemplateSet) -> Result<HashMap<usize, i64>> {
    let pairs = db.all_templates()?;

    let mut map = HashMap::new();
    for idx in set.indices() {
        let logical_id = set.arena.get(idx).raw.id.trim();
        let surrogate = pairs
            .iter()
            .find(|(_, template_id)| template_id.trim() == logical_id)
            .map(|(id, _)| *id)
            .ok_or_else(|| Error::TemplateLookup(logical_id.to_string()))?;
        map.insert(idx, surrogate);
    }
    Ok(map)
}
