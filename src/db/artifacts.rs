//! Artifact and trace-link persistence.

use super::Database;
use crate::error::Result;
use crate::types::{ArtifactRow, LinkRow, NewArtifact, NewLink, TemplateRow};
use rusqlite::params;
use serde_json::json;
use tracing::info;

impl Database {
    /// Bulk-insert converted requirements as artifact rows.
    pub fn store_artifacts(&self, artifacts: &[NewArtifact]) -> Result<()> {
        if artifacts.is_empty() {
            return Ok(());
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            for artifact in artifacts {
                tx.execute(
                    "INSERT INTO Artifacts (TemplateId, ArtifactId) VALUES (?1, ?2)",
                    params![artifact.template_id, artifact.artifact_id],
                )?;
            }
            tx.commit()?;
            Ok(())
        })?;

        info!(artifacts = artifacts.len(), "All requirements stored");
        Ok(())
    }

    /// Select all persisted artifacts as `(surrogate id, logical id)` pairs.
    pub fn all_artifacts(&self) -> Result<Vec<(i64, String)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT Id, ArtifactId FROM Artifacts")?;
            let pairs = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<Vec<(i64, String)>>>()?;
            Ok(pairs)
        })
    }

    /// Bulk-insert resolved trace links. No-op for an empty set.
    pub fn store_links(&self, links: &[NewLink]) -> Result<()> {
        if links.is_empty() {
            return Ok(());
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            for link in links {
                tx.execute(
                    "INSERT INTO ArtifactLinks (SourceArtifactId, DestinationArtifactId, FieldName)
                     VALUES (?1, ?2, ?3)",
                    params![
                        link.source_artifact_id,
                        link.destination_artifact_id,
                        link.field_name
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })?;

        info!(links = links.len(), "All requirement links stored");
        Ok(())
    }

    /// Load the entire store content, one JSON array per table. Used by the
    /// `--show-database` option.
    pub fn dump_all(&self) -> Result<serde_json::Value> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT Id, TemplateId, BaseId, IsAbstract FROM ArtifactTemplates")?;
            let templates = stmt
                .query_map([], |row| {
                    Ok(TemplateRow {
                        id: row.get(0)?,
                        template_id: row.get(1)?,
                        base_id: row.get(2)?,
                        is_abstract: row.get(3)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut stmt = conn.prepare("SELECT Id, TemplateId, ArtifactId FROM Artifacts")?;
            let artifacts = stmt
                .query_map([], |row| {
                    Ok(ArtifactRow {
                        id: row.get(0)?,
                        template_id: row.get(1)?,
                        artifact_id: row.get(2)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut stmt = conn.prepare(
                "SELECT Id, SourceArtifactId, DestinationArtifactId, FieldName FROM ArtifactLinks",
            )?;
            let links = stmt
                .query_map([], |row| {
                    Ok(LinkRow {
                        id: row.get(0)?,
                        source_artifact_id: row.get(1)?,
                        destination_artifact_id: row.get(2)?,
                        field_name: row.get(3)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(json!({
                "ArtifactTemplates": templates,
                "Artifacts": artifacts,
                "ArtifactLinks": links,
            }))
        })
    }
}
