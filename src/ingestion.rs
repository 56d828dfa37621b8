//! Ingestion: turns a loosely typed input object into
//! persisted Project + BomItems. Validates each component row against the
//! canonical shape, falls back to one LLM normalization pass over rows that
//! fail, then synthesizes a last-resort fallback row for anything still
//! invalid so nothing is silently dropped.

use crate::clients::llm::LlmClient;
use crate::errors::ServiceError;
use crate::repositories::store::Store;
use serde::Deserialize;
use serde_json::Value;
use tracing::{instrument, warn};
use uuid::Uuid;

/// The canonical component shape row validation targets first.
#[derive(Debug, Deserialize)]
struct CanonicalRow {
    qty: i32,
    description: String,
    package: String,
    #[serde(default)]
    possible_mpn: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

pub struct IngestResult {
    pub project_id: String,
    pub truncated: bool,
    pub warnings: Vec<String>,
}

pub struct Ingestion<'a> {
    store: &'a Store,
    llm: &'a LlmClient,
    max_items: usize,
}

impl<'a> Ingestion<'a> {
    pub fn new(store: &'a Store, llm: &'a LlmClient, max_items: usize) -> Self {
        Self { store, llm, max_items: max_items.max(1) }
    }

    #[instrument(skip(self, input))]
    pub async fn ingest(&self, input: Value) -> Result<IngestResult, ServiceError> {
        let project_name = input.get("project_name").and_then(Value::as_str).map(String::from);
        let project_description =
            input.get("project_description").and_then(Value::as_str).map(String::from);

        let raw_components = input
            .get("components")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut warnings = Vec::new();

        // Each slot keeps its original index so a mixed BOM round-trips in
        // the same row order it was submitted in, even though invalid rows
        // are resolved out of band through one batched LLM call.
        let mut rows: Vec<Option<CanonicalRow>> = Vec::with_capacity(raw_components.len());
        let mut invalid_indices = Vec::new();
        let mut invalid_rows = Vec::new();
        for (idx, row) in raw_components.iter().enumerate() {
            match serde_json::from_value::<CanonicalRow>(row.clone()) {
                Ok(canonical) => rows.push(Some(canonical)),
                Err(_) => {
                    rows.push(None);
                    invalid_indices.push(idx);
                    invalid_rows.push(row.clone());
                }
            }
        }

        if !invalid_rows.is_empty() {
            match self.normalize_invalid_rows(&invalid_rows).await {
                Ok(reformatted) => {
                    for (i, slot) in invalid_indices.iter().enumerate() {
                        let resolved = match reformatted.get(i) {
                            Some(row) => match serde_json::from_value::<CanonicalRow>(row.clone()) {
                                Ok(canonical) => canonical,
                                Err(_) => fallback_row(row),
                            },
                            // The LLM returned fewer rows than it was given; fall
                            // back on the original for whatever is missing.
                            None => fallback_row(&invalid_rows[i]),
                        };
                        rows[*slot] = Some(resolved);
                    }
                }
                Err(e) => {
                    warnings.push(format!("LLM normalization unavailable, using fallback rows: {e}"));
                    for (slot, row) in invalid_indices.iter().zip(invalid_rows.iter()) {
                        rows[*slot] = Some(fallback_row(row));
                    }
                }
            }
        }

        let mut rows: Vec<CanonicalRow> = rows.into_iter().flatten().collect();

        let original_total = rows.len();
        let truncated = original_total > self.max_items;
        if truncated {
            warnings.push(format!("BOM truncated from {} to {}", original_total, self.max_items));
            rows.truncate(self.max_items);
        }

        let items = rows
            .into_iter()
            .map(|r| (r.qty, r.description, r.package, r.possible_mpn.or(r.notes)))
            .collect();

        let project_id = Uuid::new_v4().to_string();
        self.store
            .create_project_with_items(project_id.clone(), project_name, project_description, items)
            .await?;

        Ok(IngestResult { project_id, truncated, warnings })
    }

    async fn normalize_invalid_rows(&self, invalid: &[Value]) -> Result<Vec<Value>, crate::errors::LlmError> {
        let raw = Value::Array(invalid.to_vec());
        self.llm.normalize_bom_rows(&raw).await
    }
}

/// A row still invalid after the LLM pass (or when the LLM is unavailable):
/// synthesize a fallback that preserves the original data for inspection.
fn fallback_row(original: &Value) -> CanonicalRow {
    let description = if original.is_object() {
        format!("Original Data (validation failed): {original}")
    } else {
        format!("Invalid component data (not a dictionary): {original}")
    };
    CanonicalRow { qty: 1, description, package: "unknown".to_string(), possible_mpn: None, notes: None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::llm::LlmClient;
    use crate::repositories::store::Store;
    use sea_orm::{ConnectionTrait, Database, Schema};
    use std::time::Duration;

    async fn test_store() -> Store {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let schema = Schema::new(sea_orm::DatabaseBackend::Sqlite);
        for stmt in [
            schema.create_table_from_entity(crate::entities::project::Entity),
            schema.create_table_from_entity(crate::entities::bom_item::Entity),
            schema.create_table_from_entity(crate::entities::component::Entity),
            schema.create_table_from_entity(crate::entities::bom_item_match::Entity),
            schema.create_table_from_entity(crate::entities::potential_bom_match::Entity),
            schema.create_table_from_entity(crate::entities::cache_entry::Entity),
        ] {
            db.execute(db.get_database_backend().build(&stmt)).await.unwrap();
        }
        Store::new(std::sync::Arc::new(db))
    }

    #[tokio::test]
    async fn mixed_valid_and_invalid_rows_preserve_original_order() {
        let store = test_store().await;
        // Unreachable endpoint: normalization fails and every invalid row
        // falls back in place rather than reordering around the valid ones.
        let llm = LlmClient::new("http://localhost:1".into(), "test".into(), Duration::from_millis(50));
        let ingestion = Ingestion::new(&store, &llm, 500);

        let input = serde_json::json!({
            "components": [
                {"not": "canonical"},
                {"qty": 2, "description": "10k resistor", "package": "0805"},
            ]
        });

        let result = ingestion.ingest(input).await.unwrap();
        let items = store.get_bom_items(&result.project_id).await.unwrap();
        assert_eq!(items.len(), 2);
        assert!(items[0].description.contains("validation failed"));
        assert_eq!(items[1].description, "10k resistor");
    }

    #[tokio::test]
    async fn truncation_warning_reports_original_and_capped_totals() {
        let store = test_store().await;
        let llm = LlmClient::new("http://localhost:1".into(), "test".into(), Duration::from_millis(50));
        let ingestion = Ingestion::new(&store, &llm, 2);

        let components: Vec<_> = (0..3)
            .map(|i| serde_json::json!({"qty": 1, "description": format!("part {i}"), "package": "0805"}))
            .collect();
        let input = serde_json::json!({ "components": components });

        let result = ingestion.ingest(input).await.unwrap();
        assert!(result.truncated);
        assert!(result.warnings.iter().any(|w| w == "BOM truncated from 3 to 2"));
    }

    #[test]
    fn fallback_row_for_object_uses_validation_failed_prefix() {
        let row = fallback_row(&serde_json::json!({"name": "10k"}));
        assert!(row.description.starts_with("Original Data (validation failed):"));
        assert_eq!(row.qty, 1);
        assert_eq!(row.package, "unknown");
    }

    #[test]
    fn fallback_row_for_non_object_uses_not_a_dictionary_prefix() {
        let row = fallback_row(&serde_json::json!("just a string"));
        assert!(row.description.starts_with("Invalid component data (not a dictionary):"));
    }

    #[test]
    fn canonical_row_requires_qty_description_package() {
        let ok = serde_json::from_value::<CanonicalRow>(
            serde_json::json!({"qty": 2, "description": "resistor", "package": "0805"}),
        );
        assert!(ok.is_ok());

        let missing_package = serde_json::from_value::<CanonicalRow>(
            serde_json::json!({"qty": 2, "description": "resistor"}),
        );
        assert!(missing_package.is_err());
    }
}
