use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use rust_decimal::prelude::ToPrimitive;
use sea_orm::EntityTrait;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::entities::{bom_item, component, potential_bom_match, project::ProjectStatus};
use crate::errors::AppError;
use crate::handlers::AppState;
use crate::ingestion::Ingestion;

pub fn project_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_project))
        .route("/queue/length", get(queue_length))
        .route("/:id", get(get_project).delete(cancel_project))
}

#[derive(Serialize)]
struct BomComponent {
    qty: i32,
    description: String,
    package: String,
    possible_mpn: Option<String>,
    notes: Option<String>,
}

impl From<&bom_item::Model> for BomComponent {
    fn from(item: &bom_item::Model) -> Self {
        Self {
            qty: item.quantity,
            description: item.description.clone(),
            package: item.package.clone(),
            possible_mpn: item.notes.clone(),
            notes: item.notes.clone(),
        }
    }
}

#[derive(Serialize)]
struct MatchedComponent {
    qty: i32,
    description: String,
    possible_mpn: Option<String>,
    package: String,
    notes: Option<String>,
    distributor_part_number: Option<String>,
    manufacturer_part_number: Option<String>,
    manufacturer_name: Option<String>,
    distributor_description: Option<String>,
    datasheet_url: Option<String>,
    price: Option<f64>,
    availability: Option<String>,
    match_status: Option<String>,
    potential_matches: Option<Vec<PotentialMatch>>,
}

#[derive(Serialize)]
struct PotentialMatch {
    rank: i32,
    manufacturer_part_number: String,
    reason: Option<String>,
    selection_state: String,
    distributor_part_number: Option<String>,
    manufacturer_name: Option<String>,
    distributor_description: Option<String>,
    datasheet_url: Option<String>,
    price: Option<f64>,
    availability: Option<String>,
}

fn decimal_to_f64(price: Option<rust_decimal::Decimal>) -> Option<f64> {
    price.and_then(|p| p.to_f64())
}

fn potential_match_view(p: &potential_bom_match::Model, component: Option<&component::Model>) -> PotentialMatch {
    PotentialMatch {
        rank: p.rank,
        manufacturer_part_number: p.manufacturer_part_number.clone(),
        reason: p.reason.clone(),
        selection_state: p.selection_state.clone(),
        distributor_part_number: component.map(|c| c.distributor_part_number.clone()),
        manufacturer_name: component.and_then(|c| c.manufacturer_name.clone()),
        distributor_description: component.and_then(|c| c.description.clone()),
        datasheet_url: component.and_then(|c| c.datasheet_url.clone()),
        price: component.and_then(|c| decimal_to_f64(c.price)),
        availability: component.and_then(|c| c.availability.clone()),
    }
}

async fn create_project(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let ingestion = Ingestion::new(&state.store, &state.llm, state.config.bom_max_items);
    let result = ingestion.ingest(body).await?;

    let _ = state
        .events
        .send(crate::events::Event::ProjectQueued { project_id: result.project_id.clone() })
        .await;

    let truncation_info = result
        .warnings
        .iter()
        .find(|w| w.starts_with("BOM truncated"))
        .cloned();
    let processing_warnings: Vec<&String> =
        result.warnings.iter().filter(|w| !w.starts_with("BOM truncated")).collect();

    Ok(Json(json!({
        "project_id": result.project_id,
        "truncation_info": truncation_info,
        "processing_warnings": if processing_warnings.is_empty() { None } else { Some(processing_warnings) },
    })))
}

async fn queue_length(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let queue_length = state.store.count_queued_projects().await?;
    Ok(Json(json!({ "queue_length": queue_length })))
}

async fn cancel_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    match state.store.update_project_status(&id, ProjectStatus::Cancelled, None, None).await {
        Ok(_) => {
            let _ = state.events.send(crate::events::Event::ProjectCancelled { project_id: id }).await;
            Ok(Json(json!({ "status": "cancelled" })))
        }
        Err(e) => Err(e.into()),
    }
}

async fn get_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let project = state.store.get_project(&id).await?.ok_or(AppError::NotFound)?;
    let status = ProjectStatus::parse(&project.status)
        .ok_or_else(|| AppError::Internal(format!("project {id} has unrecognized status")))?;

    let body = match status {
        ProjectStatus::Queued => {
            let (position, total_in_queue) = state.store.get_queue_info(&id).await?;
            let items = state.store.get_bom_items(&id).await?;
            let components: Vec<BomComponent> = items.iter().map(BomComponent::from).collect();
            json!({
                "status": "queued",
                "position": position,
                "total_in_queue": total_in_queue,
                "bom": {
                    "components": components,
                    "project_description": project.description,
                    "project_name": project.name,
                },
            })
        }
        ProjectStatus::Processing => {
            let rows = state.store.get_finished_project_data(&id).await?;
            let components: Vec<MatchedComponent> = rows
                .into_iter()
                .map(|row| matched_component_view(&row.bom_item, row.bom_item_match.as_ref(), row.component.as_ref(), None))
                .collect();
            json!({ "status": "processing", "bom": { "components": components } })
        }
        ProjectStatus::Finished => {
            let rows = state.store.get_finished_project_data(&id).await?;
            let mut components = Vec::with_capacity(rows.len());
            for row in rows {
                let potential = backfill_potential_matches(&state, row.bom_item.id).await;
                components.push(matched_component_view(
                    &row.bom_item,
                    row.bom_item_match.as_ref(),
                    row.component.as_ref(),
                    Some(potential),
                ));
            }
            json!({
                "status": "finished",
                "bom": { "components": components },
                "results": {
                    "start_time": project.start_time,
                    "end_time": project.end_time,
                    "status": project.status,
                },
            })
        }
        ProjectStatus::Error => {
            let items = state.store.get_bom_items(&id).await?;
            let components: Vec<BomComponent> = items.iter().map(BomComponent::from).collect();
            json!({ "status": "error", "bom": { "components": components } })
        }
        ProjectStatus::Cancelled => return Err(AppError::NotFound),
    };

    Ok(Json(body))
}

fn matched_component_view(
    item: &bom_item::Model,
    bom_item_match: Option<&crate::entities::bom_item_match::Model>,
    component: Option<&component::Model>,
    potential_matches: Option<Vec<PotentialMatch>>,
) -> MatchedComponent {
    MatchedComponent {
        qty: item.quantity,
        description: item.description.clone(),
        possible_mpn: item.notes.clone(),
        package: item.package.clone(),
        notes: item.notes.clone(),
        distributor_part_number: component.map(|c| c.distributor_part_number.clone()),
        manufacturer_part_number: component.map(|c| c.manufacturer_part_number.clone()),
        manufacturer_name: component.and_then(|c| c.manufacturer_name.clone()),
        distributor_description: component.and_then(|c| c.description.clone()),
        datasheet_url: component.and_then(|c| c.datasheet_url.clone()),
        price: component.and_then(|c| decimal_to_f64(c.price)),
        availability: component.and_then(|c| c.availability.clone()),
        match_status: bom_item_match.map(|m| m.match_status.clone()),
        potential_matches,
    }
}

/// Opportunistic enrichment only: never blocks or fails the read. Any
/// distributor or store error is logged and the affected potential match
/// is returned without distributor fields.
async fn backfill_potential_matches(state: &AppState, bom_item_id: i32) -> Vec<PotentialMatch> {
    let potentials = match state.store.get_potential_matches_for_bom_item(bom_item_id).await {
        Ok(rows) => rows,
        Err(e) => {
            warn!(error = %e, bom_item_id, "failed to load potential matches");
            return Vec::new();
        }
    };

    let mut views = Vec::with_capacity(potentials.len());
    for potential in potentials {
        if let Some(component_id) = potential.component_id {
            let linked = component::Entity::find_by_id(component_id).one(state.store.db()).await.ok().flatten();
            views.push(potential_match_view(&potential, linked.as_ref()));
            continue;
        }

        if let Ok(Some(existing)) = state.store.get_component_by_mpn(&potential.manufacturer_part_number).await {
            let _ = state.store.link_potential_match_component(potential.id, existing.id).await;
            views.push(potential_match_view(&potential, Some(&existing)));
            continue;
        }

        let enriched = match state.distributor.search_by_mpn(&potential.manufacturer_part_number).await {
            Ok(Some(part)) => {
                let component = state
                    .store
                    .get_or_create_component(
                        &part.distributor_part_number,
                        &part.manufacturer_part_number,
                        part.manufacturer_name,
                        part.description,
                        part.datasheet_url,
                        None,
                        part.price,
                        part.availability,
                    )
                    .await
                    .ok();
                if let Some(ref c) = component {
                    let _ = state.store.link_potential_match_component(potential.id, c.id).await;
                }
                component
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, mpn = %potential.manufacturer_part_number, "backfill lookup failed");
                None
            }
        };

        views.push(potential_match_view(&potential, enriched.as_ref()));
    }
    views
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DistributorCache;
    use crate::clients::distributor::DistributorClient;
    use crate::clients::llm::LlmClient;
    use crate::config::AppConfig;
    use crate::entities::bom_item_match::status;
    use crate::repositories::store::Store;
    use sea_orm::{Database, Schema};
    use std::time::Duration;

    async fn test_state() -> (Arc<AppState>, Store) {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let schema = Schema::new(sea_orm::DatabaseBackend::Sqlite);
        use sea_orm::ConnectionTrait;
        for stmt in [
            schema.create_table_from_entity(crate::entities::project::Entity),
            schema.create_table_from_entity(crate::entities::bom_item::Entity),
            schema.create_table_from_entity(crate::entities::component::Entity),
            schema.create_table_from_entity(crate::entities::bom_item_match::Entity),
            schema.create_table_from_entity(potential_bom_match::Entity),
            schema.create_table_from_entity(crate::entities::cache_entry::Entity),
        ] {
            db.execute(db.get_database_backend().build(&stmt)).await.unwrap();
        }
        let db = std::sync::Arc::new(db);
        let store = Store::new(db);

        let config = Arc::new(AppConfig {
            database_url: "sqlite::memory:".into(),
            host: "0.0.0.0".into(),
            port: 8080,
            environment: "test".into(),
            log_level: "info".into(),
            log_json: false,
            auto_migrate: false,
            distributor_api_key: "test".into(),
            distributor_api_base_url: "http://localhost:1".into(),
            llm_api_key: "test".into(),
            llm_api_base_url: "http://localhost:1".into(),
            worker_pool_width: 1,
            cache_max_age_secs: 86_400,
            distributor_request_delay_ms: 0,
            distributor_retry_delay_ms: 0,
            distributor_max_retries: 0,
            distributor_timeout_secs: 1,
            queue_poll_interval_ms: 1000,
            queue_error_backoff_secs: 60,
            bom_max_items: 500,
            db_max_connections: 1,
            db_min_connections: 1,
            db_acquire_timeout_secs: 5,
        });

        let cache = DistributorCache::new(store.clone(), config.cache_max_age_secs);
        let distributor = DistributorClient::new(
            config.distributor_api_base_url.clone(),
            config.distributor_api_key.clone(),
            cache,
            Duration::from_millis(0),
            Duration::from_millis(0),
            0,
            Duration::from_secs(1),
        );
        let llm = LlmClient::new(config.llm_api_base_url.clone(), config.llm_api_key.clone(), Duration::from_secs(1));
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        tokio::spawn(crate::events::process_events(rx));
        let events = crate::events::EventSender::new(tx);

        let state = Arc::new(AppState::new(config, store.clone(), distributor, llm, events));
        (state, store)
    }

    #[tokio::test]
    async fn queued_project_reports_position_and_components() {
        let (state, store) = test_state().await;
        store
            .create_project_with_items(
                "p1".into(),
                Some("board".into()),
                None,
                vec![(1, "10k resistor".into(), "0805".into(), Some("RC0805FR".into()))],
            )
            .await
            .unwrap();

        let response = get_project(State(state), Path("p1".into())).await.unwrap();
        let body = response_json(response).await;
        assert_eq!(body["status"], "queued");
        assert_eq!(body["position"], 1);
        assert_eq!(body["total_in_queue"], 1);
        assert_eq!(body["bom"]["components"][0]["qty"], 1);
        assert_eq!(body["bom"]["components"][0]["possible_mpn"], "RC0805FR");
    }

    #[tokio::test]
    async fn unknown_project_is_not_found() {
        let (state, _store) = test_state().await;
        let err = match get_project(State(state), Path("missing".into())).await {
            Err(e) => e,
            Ok(_) => panic!("expected error"),
        };
        assert!(matches!(err, AppError::NotFound));
    }

    #[tokio::test]
    async fn cancelled_project_reads_as_not_found() {
        let (state, store) = test_state().await;
        store.create_project("p1".into(), None, None).await.unwrap();
        store
            .update_project_status("p1", ProjectStatus::Cancelled, None, None)
            .await
            .unwrap();

        let err = match get_project(State(state), Path("p1".into())).await {
            Err(e) => e,
            Ok(_) => panic!("expected error"),
        };
        assert!(matches!(err, AppError::NotFound));
    }

    #[tokio::test]
    async fn cancel_project_transitions_a_queued_project() {
        let (state, store) = test_state().await;
        store.create_project("p1".into(), None, None).await.unwrap();

        let response = cancel_project(State(state), Path("p1".into())).await.unwrap();
        let body = response_json(response).await;
        assert_eq!(body["status"], "cancelled");

        let project = store.get_project("p1").await.unwrap().unwrap();
        assert_eq!(project.status, "cancelled");
    }

    #[tokio::test]
    async fn finished_project_includes_matched_component_fields() {
        let (state, store) = test_state().await;
        store
            .create_project_with_items("p1".into(), None, None, vec![(2, "cap".into(), "0603".into(), None)])
            .await
            .unwrap();
        let items = store.get_bom_items("p1").await.unwrap();
        let component = store
            .get_or_create_component("490-1234", "GRM188R71H104KA93D", None, Some("100nF cap".into()), None, None, None, None)
            .await
            .unwrap();
        store
            .create_bom_item_match(store.db(), items[0].id, Some(component.id), status::MATCHED)
            .await
            .unwrap();
        store
            .update_project_status("p1", ProjectStatus::Processing, Some(chrono::Utc::now()), None)
            .await
            .unwrap();
        store
            .update_project_status("p1", ProjectStatus::Finished, None, Some(chrono::Utc::now()))
            .await
            .unwrap();

        let response = get_project(State(state), Path("p1".into())).await.unwrap();
        let body = response_json(response).await;
        assert_eq!(body["status"], "finished");
        let comp = &body["bom"]["components"][0];
        assert_eq!(comp["match_status"], "matched");
        assert_eq!(comp["manufacturer_part_number"], "GRM188R71H104KA93D");
        assert!(comp["potential_matches"].is_array());
    }

    #[tokio::test]
    async fn error_project_omits_match_fields() {
        let (state, store) = test_state().await;
        store
            .create_project_with_items("p1".into(), None, None, vec![(1, "unknown part".into(), "".into(), None)])
            .await
            .unwrap();
        store
            .update_project_status("p1", ProjectStatus::Processing, Some(chrono::Utc::now()), None)
            .await
            .unwrap();
        store
            .update_project_status("p1", ProjectStatus::Error, None, Some(chrono::Utc::now()))
            .await
            .unwrap();

        let response = get_project(State(state), Path("p1".into())).await.unwrap();
        let body = response_json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["bom"]["components"][0]["description"], "unknown part");
    }

    #[tokio::test]
    async fn queue_length_counts_only_queued_projects() {
        let (state, store) = test_state().await;
        store.create_project("p1".into(), None, None).await.unwrap();
        store.create_project("p2".into(), None, None).await.unwrap();
        store
            .update_project_status("p2", ProjectStatus::Processing, Some(chrono::Utc::now()), None)
            .await
            .unwrap();

        let response = queue_length(State(state)).await.unwrap();
        let body = response_json(response).await;
        assert_eq!(body["queue_length"], 1);
    }

    async fn response_json(response: impl IntoResponse) -> Value {
        use axum::body::to_bytes;
        let response = response.into_response();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}
