//! QueueRunner: the single-consumer poll loop. Claims the
//! oldest queued project, hands it to a ProjectWorker, and loops. Exactly
//! one instance of this is assumed to run against a given Store; racing
//! claims across multiple runners is explicitly out of scope.

use crate::entities::project::ProjectStatus;
use crate::events::{Event, EventSender};
use crate::repositories::store::Store;
use crate::worker::ProjectWorker;
use chrono::Utc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

pub struct QueueRunner {
    store: Store,
    worker: ProjectWorker,
    poll_interval: Duration,
    error_backoff: Duration,
    events: EventSender,
}

impl QueueRunner {
    pub fn new(
        store: Store,
        worker: ProjectWorker,
        poll_interval: Duration,
        error_backoff: Duration,
        events: EventSender,
    ) -> Self {
        Self { store, worker, poll_interval, error_backoff, events }
    }

    /// Runs forever. Intended to be spawned as a background task by `main`.
    pub async fn run_forever(&self) -> ! {
        loop {
            if let Err(e) = self.tick().await {
                error!(error = %e, "queue runner iteration failed, backing off");
                tokio::time::sleep(self.error_backoff).await;
            }
        }
    }

    #[instrument(skip(self))]
    async fn tick(&self) -> Result<(), crate::errors::ServiceError> {
        let Some(project) = self.store.find_next_queued().await? else {
            tokio::time::sleep(self.poll_interval).await;
            return Ok(());
        };

        info!(project_id = %project.id, "claiming queued project");
        self.store
            .update_project_status(&project.id, ProjectStatus::Processing, Some(Utc::now()), None)
            .await?;
        let _ = self
            .events
            .send(Event::ProjectProcessingStarted { project_id: project.id.clone() })
            .await;

        if let Err(e) = self.worker.run(&project.id).await {
            warn!(project_id = %project.id, error = %e, "project worker reported a fatal setup failure");
            self.store
                .update_project_status(&project.id, ProjectStatus::Error, None, Some(Utc::now()))
                .await?;
            let _ = self
                .events
                .send(Event::ProjectErrored { project_id: project.id.clone(), reason: e.to_string() })
                .await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DistributorCache;
    use crate::clients::distributor::DistributorClient;
    use crate::clients::llm::LlmClient;
    use sea_orm::{Database, Schema};
    use std::time::Duration as StdDuration;

    async fn test_runner() -> (QueueRunner, Store) {
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
        let store = Store::new(std::sync::Arc::new(db));
        let cache = DistributorCache::new(store.clone(), 86_400);
        let distributor = DistributorClient::new(
            "http://localhost:1".into(),
            "test".into(),
            cache,
            StdDuration::from_millis(0),
            StdDuration::from_millis(0),
            0,
            StdDuration::from_secs(1),
        );
        let llm = LlmClient::new("http://localhost:1".into(), "test".into(), StdDuration::from_secs(1));
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        tokio::spawn(crate::events::process_events(rx));
        let events = crate::events::EventSender::new(tx);
        let worker = ProjectWorker::new(store.clone(), distributor, llm, 2, events.clone());
        let runner =
            QueueRunner::new(store.clone(), worker, Duration::from_millis(5), Duration::from_millis(5), events);
        (runner, store)
    }

    #[tokio::test]
    async fn tick_is_a_noop_when_the_queue_is_empty() {
        let (runner, _store) = test_runner().await;
        runner.tick().await.unwrap();
    }

    #[tokio::test]
    async fn tick_claims_and_finishes_an_empty_project() {
        let (runner, store) = test_runner().await;
        store.create_project("p1".into(), None, None).await.unwrap();

        runner.tick().await.unwrap();

        let project = store.get_project("p1").await.unwrap().unwrap();
        assert_eq!(project.status, ProjectStatus::Finished.as_str());
    }

    #[tokio::test]
    async fn tick_claims_the_oldest_queued_project_first() {
        let (runner, store) = test_runner().await;
        store.create_project("older".into(), None, None).await.unwrap();
        tokio::time::sleep(StdDuration::from_millis(2)).await;
        store.create_project("newer".into(), None, None).await.unwrap();

        runner.tick().await.unwrap();

        let older = store.get_project("older").await.unwrap().unwrap();
        let newer = store.get_project("newer").await.unwrap().unwrap();
        assert_eq!(older.status, ProjectStatus::Finished.as_str());
        assert_eq!(newer.status, ProjectStatus::Queued.as_str());
    }
}
