//! ProjectWorker: per-project orchestrator. Fans one
//! MatchPipeline task out per BomItem across a bounded pool, waits for all
//! of them, then finalizes the project to `finished` regardless of
//! per-item outcomes. Only a fatal setup failure promotes the project to
//! `error`.

use crate::clients::distributor::DistributorClient;
use crate::clients::llm::{BomContextRow, LlmClient};
use crate::entities::bom_item_match::status;
use crate::entities::project::ProjectStatus;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::pipeline::MatchPipeline;
use crate::repositories::store::Store;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, instrument};

pub struct ProjectWorker {
    store: Store,
    distributor: DistributorClient,
    llm: LlmClient,
    pool_width: usize,
    events: EventSender,
}

impl ProjectWorker {
    pub fn new(
        store: Store,
        distributor: DistributorClient,
        llm: LlmClient,
        pool_width: usize,
        events: EventSender,
    ) -> Self {
        Self { store, distributor, llm, pool_width: pool_width.max(1), events }
    }

    /// Runs every BomItem of `project_id` through the pipeline, then
    /// finalizes the project. Setup failures (project missing, BomItems
    /// unloadable) are reported to the caller so the QueueRunner can mark
    /// the project `error`; per-item failures never reach this far.
    ///
    /// Each task gets its own `Store` handle and runs on its own spawned
    /// task so a panic in one item's processing is isolated rather than
    /// aborting the whole project — the `JoinError` from a panicked task
    /// is itself folded into `worker_uncaught_exception`.
    #[instrument(skip(self))]
    pub async fn run(&self, project_id: &str) -> Result<(), ServiceError> {
        let project = self.store.get_project(project_id).await?.ok_or(ServiceError::NotFound)?;
        let items = self.store.get_bom_items(project_id).await?;

        let bom_snapshot = Arc::new(
            items
                .iter()
                .map(|item| BomContextRow {
                    description: item.description.clone(),
                    package: item.package.clone(),
                    possible_mpn: item.notes.clone(),
                })
                .collect::<Vec<_>>(),
        );
        let project_description = Arc::new(project.description.clone().unwrap_or_default());
        let semaphore = Arc::new(Semaphore::new(self.pool_width));

        let mut handles = Vec::with_capacity(items.len());
        for item in items.iter().cloned() {
            let store = self.store.clone();
            let distributor = self.distributor.clone();
            let llm = self.llm.clone();
            let bom_snapshot = Arc::clone(&bom_snapshot);
            let project_description = Arc::clone(&project_description);
            let semaphore = Arc::clone(&semaphore);
            let bom_item_id = item.id;

            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                let pipeline = MatchPipeline::new(&store, &distributor, &llm);
                let outcome = pipeline.run(&item, &project_description, &bom_snapshot).await;
                outcome.status
            });
            handles.push((bom_item_id, handle));
        }

        for (bom_item_id, handle) in handles {
            match handle.await {
                Ok(status) => {
                    info!(bom_item_id, status, "item processed");
                    let _ = self
                        .events
                        .send(Event::BomItemMatched { bom_item_id, match_status: status.to_string() })
                        .await;
                }
                Err(join_err) => {
                    error!(bom_item_id, error = %join_err, "pipeline task panicked, recording worker_uncaught_exception");
                    // The task never reached its own save point; best-effort record the
                    // uncaught-exception status so the item still has exactly one match.
                    let _ = self
                        .store
                        .create_bom_item_match(self.store.db(), bom_item_id, None, status::WORKER_UNCAUGHT_EXCEPTION)
                        .await;
                }
            }
        }

        self.store
            .update_project_status(project_id, ProjectStatus::Finished, None, Some(Utc::now()))
            .await?;
        let _ = self.events.send(Event::ProjectFinished { project_id: project_id.to_string() }).await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DistributorCache;
    use sea_orm::{Database, Schema};
    use std::time::Duration;

    async fn test_worker() -> (ProjectWorker, Store) {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let schema = Schema::new(sea_orm::DatabaseBackend::Sqlite);
        use sea_orm::ConnectionTrait;
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
        let store = Store::new(Arc::new(db));
        let cache = DistributorCache::new(store.clone(), 86_400);
        let distributor = DistributorClient::new(
            "http://localhost:1".into(),
            "test".into(),
            cache,
            Duration::from_millis(0),
            Duration::from_millis(0),
            0,
            Duration::from_secs(1),
        );
        let llm = LlmClient::new("http://localhost:1".into(), "test".into(), Duration::from_secs(1));
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        tokio::spawn(crate::events::process_events(rx));
        let events = EventSender::new(tx);
        (ProjectWorker::new(store.clone(), distributor, llm, 2, events), store)
    }

    #[tokio::test]
    async fn run_finalizes_an_empty_project_to_finished() {
        let (worker, store) = test_worker().await;
        store.create_project("p1".into(), None, None).await.unwrap();
        store
            .update_project_status("p1", ProjectStatus::Processing, Some(Utc::now()), None)
            .await
            .unwrap();

        worker.run("p1").await.unwrap();

        let project = store.get_project("p1").await.unwrap().unwrap();
        assert_eq!(project.status, ProjectStatus::Finished.as_str());
        assert!(project.end_time.is_some());
    }

    #[tokio::test]
    async fn run_reports_missing_project_as_not_found() {
        let (worker, _store) = test_worker().await;
        let err = worker.run("missing").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound));
    }
}
