//! Semantic rule validation: parameterized "must exist" queries against the
//! persisted relational model.

use super::Database;
use crate::error::{Error, Result};
use crate::template::RuleQuery;
use tracing::debug;

/// The only tables a validation rule may query.
const KNOWN_TABLES: [&str; 3] = ["ArtifactLinks", "Artifacts", "ArtifactTemplates"];

/// A rule query is executed only when well-formed: every alias/table pair
/// valid and drawn from the known tables, a non-empty where clause, and at
/// least one parameter. Ill-formed rules trivially pass.
pub fn check_query_structure(query: &RuleQuery) -> bool {
    let table_ok = |t: &crate::template::TableRef| {
        !t.alias.is_empty()
            && !t.table.is_empty()
            && t.alias
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
            && KNOWN_TABLES.contains(&t.table.as_str())
    };

    !query.tables.is_empty()
        && query.tables.iter().all(table_ok)
        && query.where_clause.clause.len() > 1
        && !query.where_clause.parameters.is_empty()
}

/// Substitute `@`-parameters from the fixed binding map. `@artifactId` is
/// the only recognized binding; any other `@`-parameter is a fatal internal
/// error. Plain parameters pass through as literals.
pub fn bind_parameters(parameters: &[String], artifact_id: &str) -> Result<Vec<String>> {
    parameters
        .iter()
        .map(|p| {
            if let Some(stripped) = p.strip_prefix('@') {
                match stripped {
                    "artifactId" => Ok(artifact_id.to_string()),
                    _ => Err(Error::UnknownRuleParameter(p.clone())),
                }
            } else {
                Ok(p.clone())
            }
        })
        .collect()
}

impl Database {
    /// Count rows matching a validation rule for the given artifact.
    ///
    /// Returns `None` when the rule is ill-formed (treated as satisfied by
    /// the caller, not as an error).
    pub fn count_rule_matches(&self, query: &RuleQuery, artifact_id: &str) -> Result<Option<i64>> {
        if !check_query_structure(query) {
            debug!(artifact = %artifact_id, "Ill-formed validation rule query, treating as satisfied");
            return Ok(None);
        }

        let bound = bind_parameters(&query.where_clause.parameters, artifact_id)?;

        let from = query
            .tables
            .iter()
            .map(|t| format!("{} AS {}", t.table, t.alias))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            from, query.where_clause.clause
        );

        let count = self.with_conn(|conn| {
            Ok(conn.query_row(&sql, rusqlite::params_from_iter(bound.iter()), |row| {
                row.get::<_, i64>(0)
            })?)
        })?;

        Ok(Some(count))
    }
}
