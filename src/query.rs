//! Path-query boundary.
//!
//! Conversion rules address values inside a document tree (or any JSON
//! value) with JSONPath expressions. The evaluator itself is a black box;
//! this module is the only place that knows which crate implements it.

use serde_json::Value;
use serde_json_path::JsonPath;

/// Error raised when a path expression cannot be parsed.
#[derive(Debug, thiserror::Error)]
#[error("path query failed: {0}")]
pub struct QueryError(String);

/// Evaluate `path_expr` against `document`, returning every match in
/// document order (possibly none).
pub fn query<'a>(document: &'a Value, path_expr: &str) -> Result<Vec<&'a Value>, QueryError> {
    let path = JsonPath::parse(path_expr).map_err(|e| QueryError(e.to_string()))?;
    Ok(path.query(document).all())
}

/// Evaluate `path_expr` and return the first match, cloned out of the
/// document. `Ok(None)` means the query matched nothing.
pub fn query_first(document: &Value, path_expr: &str) -> Result<Option<Value>, QueryError> {
    Ok(query(document, path_expr)?.first().map(|v| (*v).clone()))
}
