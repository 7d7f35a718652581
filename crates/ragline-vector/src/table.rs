//! LanceDB connection and column helpers shared by the read-side adapters.
use anyhow::Result;
use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, Float32Array, RecordBatch, StringArray};
use lancedb::{connect, Connection, Table};
use tracing::warn;

use ragline_core::error::BackendError;
use ragline_core::types::Filters;

pub async fn open_db(uri: &str) -> Result<Connection> {
    Ok(connect(uri).execute().await?)
}

pub async fn open_table(conn: &Connection, name: &str) -> Result<Table> {
    Ok(conn.open_table(name).execute().await?)
}

pub(crate) fn unavailable(context: &str, e: impl std::fmt::Display) -> BackendError {
    BackendError::Unavailable(format!("{context}: {e}"))
}

pub(crate) fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, BackendError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| BackendError::Malformed(format!("column '{name}' missing or not utf8")))
}

pub(crate) fn opt_str(col: &StringArray, row: usize) -> Option<String> {
    if col.is_null(row) {
        return None;
    }
    Some(col.value(row).to_string()).filter(|s| !s.is_empty())
}

pub(crate) fn distance_col(batch: &RecordBatch) -> Option<&Float32Array> {
    batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>())
}

pub(crate) fn vector_at(batch: &RecordBatch, row: usize) -> Option<Vec<f32>> {
    let col = batch.column_by_name("vector")?.as_any().downcast_ref::<FixedSizeListArray>()?;
    if col.is_null(row) {
        return None;
    }
    let values = col.value(row);
    Some(values.as_primitive_opt::<Float32Type>()?.values().to_vec())
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Escapes LIKE wildcards so they match literally under `ESCAPE '\'`.
fn escape_like(value: &str) -> String {
    value.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// SQL predicate for the supported metadata filters. `category` matches the
/// value itself and everything below it (`/a` matches `/a` and `/a/b`).
pub(crate) fn filter_predicate(filters: &Filters) -> Option<String> {
    let mut clauses = Vec::new();
    for (key, value) in filters {
        match key.as_str() {
            "category" => {
                let value = if value.starts_with('/') { value.clone() } else { format!("/{value}") };
                let prefix = format!("{}/%", escape_like(value.trim_end_matches('/')));
                clauses.push(format!("(category = {} OR category LIKE {} ESCAPE '\\')", quote(&value), quote(&prefix)));
            }
            other => warn!(filter = other, "semantic index ignores unsupported filter"),
        }
    }
    if clauses.is_empty() { None } else { Some(clauses.join(" AND ")) }
}

pub(crate) fn id_predicate(id: &str) -> String {
    format!("id = {}", quote(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates_escape_quotes() {
        assert_eq!(id_predicate("it's"), "id = 'it''s'");
        let mut filters = Filters::new();
        filters.insert("category".into(), "/db/".into());
        filters.insert("lang".into(), "en".into());
        assert_eq!(
            filter_predicate(&filters).as_deref(),
            Some("(category = '/db/' OR category LIKE '/db/%' ESCAPE '\\')")
        );
        assert_eq!(filter_predicate(&Filters::new()), None);
    }

    #[test]
    fn like_wildcards_in_categories_match_literally() {
        let mut filters = Filters::new();
        filters.insert("category".into(), "/web_dev/100%".into());
        assert_eq!(
            filter_predicate(&filters).as_deref(),
            Some("(category = '/web_dev/100%' OR category LIKE '/web\\_dev/100\\%/%' ESCAPE '\\')")
        );
    }

    #[test]
    fn categories_without_a_leading_slash_are_rooted() {
        let mut filters = Filters::new();
        filters.insert("category".into(), "db".into());
        assert_eq!(filter_predicate(&filters).as_deref(), Some("(category = '/db' OR category LIKE '/db/%' ESCAPE '\\')"));
    }
}
