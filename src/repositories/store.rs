//! The Store: durable relational state for projects, line
//! items, components, matches, potential matches and the distributor cache.
//! Every invariant — status transitions, one terminal match per
//! run, unique (bom_item_id, rank) — is enforced here, not at call sites.

use crate::entities::bom_item::{self, Entity as BomItem};
use crate::entities::bom_item_match::{self, Entity as BomItemMatch};
use crate::entities::cache_entry::{self, Entity as CacheEntry};
use crate::entities::component::{self, Entity as Component};
use crate::entities::potential_bom_match::{self, Entity as PotentialBomMatch};
use crate::entities::project::{self, Entity as Project, ProjectStatus};
use crate::errors::ServiceError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::instrument;

#[derive(Clone)]
pub struct Store {
    db: Arc<DatabaseConnection>,
}

/// One row of the join produced by `get_finished_project_data`.
pub struct BomItemRow {
    pub bom_item: bom_item::Model,
    pub bom_item_match: Option<bom_item_match::Model>,
    pub component: Option<component::Model>,
}

impl Store {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    #[instrument(skip(self))]
    pub async fn create_project(
        &self,
        id: String,
        name: Option<String>,
        description: Option<String>,
    ) -> Result<project::Model, ServiceError> {
        let model = project::ActiveModel {
            id: Set(id),
            name: Set(name),
            description: Set(description),
            status: Set(ProjectStatus::Queued.as_str().to_string()),
            created_at: Set(Utc::now()),
            start_time: Set(None),
            end_time: Set(None),
        };
        Ok(model.insert(self.db.as_ref()).await?)
    }

    #[instrument(skip(self))]
    pub async fn create_bom_item(
        &self,
        project_id: String,
        quantity: i32,
        description: String,
        package: String,
        notes: Option<String>,
    ) -> Result<bom_item::Model, ServiceError> {
        let model = bom_item::ActiveModel {
            id: sea_orm::NotSet,
            project_id: Set(project_id),
            quantity: Set(quantity),
            description: Set(description),
            package: Set(package),
            notes: Set(notes),
            created_at: Set(Utc::now()),
        };
        Ok(model.insert(self.db.as_ref()).await?)
    }

    /// Persists a project and its BomItems in one transaction so ingestion
    /// never leaves a project with a partial line-item list.
    pub async fn create_project_with_items(
        &self,
        id: String,
        name: Option<String>,
        description: Option<String>,
        items: Vec<(i32, String, String, Option<String>)>,
    ) -> Result<project::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let project_model = project::ActiveModel {
            id: Set(id),
            name: Set(name),
            description: Set(description),
            status: Set(ProjectStatus::Queued.as_str().to_string()),
            created_at: Set(Utc::now()),
            start_time: Set(None),
            end_time: Set(None),
        }
        .insert(&txn)
        .await?;

        for (quantity, description, package, notes) in items {
            bom_item::ActiveModel {
                id: sea_orm::NotSet,
                project_id: Set(project_model.id.clone()),
                quantity: Set(quantity),
                description: Set(description),
                package: Set(package),
                notes: Set(notes),
                created_at: Set(Utc::now()),
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await?;
        Ok(project_model)
    }

    pub async fn get_project(&self, id: &str) -> Result<Option<project::Model>, ServiceError> {
        Ok(Project::find_by_id(id.to_string()).one(self.db.as_ref()).await?)
    }

    /// BomItems for a project, in insertion (= creation) order (the
    /// ordering guarantee).
    pub async fn get_bom_items(&self, project_id: &str) -> Result<Vec<bom_item::Model>, ServiceError> {
        Ok(BomItem::find()
            .filter(bom_item::Column::ProjectId.eq(project_id.to_string()))
            .order_by_asc(bom_item::Column::Id)
            .all(self.db.as_ref())
            .await?)
    }

    /// `(position, total)` where position is 1-based rank among all `queued`
    /// rows by creation time; `(0, 0)` if the project is absent or not queued.
    pub async fn get_queue_info(&self, project_id: &str) -> Result<(i64, i64), ServiceError> {
        let project = match self.get_project(project_id).await? {
            Some(p) if p.status == ProjectStatus::Queued.as_str() => p,
            _ => return Ok((0, 0)),
        };

        let total = Project::find()
            .filter(project::Column::Status.eq(ProjectStatus::Queued.as_str()))
            .count(self.db.as_ref())
            .await?;

        let ahead = Project::find()
            .filter(project::Column::Status.eq(ProjectStatus::Queued.as_str()))
            .filter(project::Column::CreatedAt.lt(project.created_at))
            .count(self.db.as_ref())
            .await?;

        Ok((ahead as i64 + 1, total as i64))
    }

    pub async fn count_queued_projects(&self) -> Result<i64, ServiceError> {
        let total = Project::find()
            .filter(project::Column::Status.eq(ProjectStatus::Queued.as_str()))
            .count(self.db.as_ref())
            .await?;
        Ok(total as i64)
    }

    /// Oldest `queued` project by creation time, or `None` if the queue is empty.
    pub async fn find_next_queued(&self) -> Result<Option<project::Model>, ServiceError> {
        Ok(Project::find()
            .filter(project::Column::Status.eq(ProjectStatus::Queued.as_str()))
            .order_by_asc(project::Column::CreatedAt)
            .one(self.db.as_ref())
            .await?)
    }

    /// Validates the transition against `ProjectStatus::can_transition_to`
    /// before writing. Rejects anything not in that table.
    #[instrument(skip(self))]
    pub async fn update_project_status(
        &self,
        id: &str,
        new_status: ProjectStatus,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<project::Model, ServiceError> {
        let project = self
            .get_project(id)
            .await?
            .ok_or(ServiceError::NotFound)?;

        let current = ProjectStatus::parse(&project.status).ok_or_else(|| {
            ServiceError::ExternalService(format!("project {id} has unrecognized status {}", project.status))
        })?;

        if !current.can_transition_to(new_status) {
            return Err(ServiceError::IllegalTransition {
                from: current.as_str().to_string(),
                to: new_status.as_str().to_string(),
            });
        }

        let mut active: project::ActiveModel = project.into();
        active.status = Set(new_status.as_str().to_string());
        if let Some(start) = start_time {
            active.start_time = Set(Some(start));
        }
        if let Some(end) = end_time {
            active.end_time = Set(Some(end));
        }
        Ok(active.update(self.db.as_ref()).await?)
    }

    /// Idempotent: distributor part number wins, MPN is the fallback lookup.
    /// Safe under concurrent callers via unique-constraint retry.
    #[instrument(skip(self))]
    pub async fn get_or_create_component(
        &self,
        distributor_part_number: &str,
        manufacturer_part_number: &str,
        manufacturer_name: Option<String>,
        description: Option<String>,
        datasheet_url: Option<String>,
        package: Option<String>,
        price: Option<Decimal>,
        availability: Option<String>,
    ) -> Result<component::Model, ServiceError> {
        if let Some(existing) = Component::find()
            .filter(component::Column::DistributorPartNumber.eq(distributor_part_number.to_string()))
            .one(self.db.as_ref())
            .await?
        {
            return Ok(self
                .update_component(existing, manufacturer_name, description, datasheet_url, package, price, availability)
                .await?);
        }

        if let Some(existing) = self.get_component_by_mpn(manufacturer_part_number).await? {
            return Ok(existing);
        }

        let model = component::ActiveModel {
            id: sea_orm::NotSet,
            distributor_part_number: Set(distributor_part_number.to_string()),
            manufacturer_part_number: Set(manufacturer_part_number.to_string()),
            manufacturer_name: Set(manufacturer_name),
            description: Set(description),
            datasheet_url: Set(datasheet_url),
            package: Set(package),
            price: Set(price),
            availability: Set(availability),
            last_updated: Set(Utc::now()),
        };

        match model.insert(self.db.as_ref()).await {
            Ok(created) => Ok(created),
            // A concurrent caller won the race on the unique distributor_part_number
            // constraint; re-query rather than propagate.
            Err(DbErr::Exec(_)) | Err(DbErr::Query(_)) => Component::find()
                .filter(component::Column::DistributorPartNumber.eq(distributor_part_number.to_string()))
                .one(self.db.as_ref())
                .await?
                .ok_or(ServiceError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_component(
        &self,
        existing: component::Model,
        manufacturer_name: Option<String>,
        description: Option<String>,
        datasheet_url: Option<String>,
        package: Option<String>,
        price: Option<Decimal>,
        availability: Option<String>,
    ) -> Result<component::Model, ServiceError> {
        let mut active: component::ActiveModel = existing.into();
        active.manufacturer_name = Set(manufacturer_name);
        active.description = Set(description);
        active.datasheet_url = Set(datasheet_url);
        active.package = Set(package);
        active.price = Set(price);
        active.availability = Set(availability);
        active.last_updated = Set(Utc::now());
        Ok(active.update(self.db.as_ref()).await?)
    }

    pub async fn get_component_by_mpn(&self, mpn: &str) -> Result<Option<component::Model>, ServiceError> {
        Ok(Component::find()
            .filter(component::Column::ManufacturerPartNumber.eq(mpn.to_string()))
            .one(self.db.as_ref())
            .await?)
    }

    /// Does not commit by itself when called with a `DatabaseTransaction` —
    /// callers that want batching control the transaction boundary.
    pub async fn create_bom_item_match<C: ConnectionTrait>(
        &self,
        conn: &C,
        bom_item_id: i32,
        component_id: Option<i32>,
        status: &str,
    ) -> Result<bom_item_match::Model, ServiceError> {
        let model = bom_item_match::ActiveModel {
            id: sea_orm::NotSet,
            bom_item_id: Set(bom_item_id),
            component_id: Set(component_id),
            match_status: Set(status.to_string()),
            matched_at: Set(Utc::now()),
        };
        Ok(model.insert(conn).await?)
    }

    /// Deletes any existing matches for this item in one transaction, so a
    /// re-run never leaves a partial half-state.
    pub async fn clear_matches_for_item(&self, bom_item_id: i32) -> Result<(), ServiceError> {
        BomItemMatch::delete_many()
            .filter(bom_item_match::Column::BomItemId.eq(bom_item_id))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    pub async fn create_potential_match(
        &self,
        bom_item_id: i32,
        rank: i32,
        manufacturer_part_number: &str,
        reason: Option<String>,
        component_id: Option<i32>,
    ) -> Result<potential_bom_match::Model, ServiceError> {
        let model = potential_bom_match::ActiveModel {
            id: sea_orm::NotSet,
            bom_item_id: Set(bom_item_id),
            rank: Set(rank),
            manufacturer_part_number: Set(manufacturer_part_number.to_string()),
            reason: Set(reason),
            selection_state: Set(potential_bom_match::selection_state::PROPOSED.to_string()),
            component_id: Set(component_id),
        };
        Ok(model.insert(self.db.as_ref()).await?)
    }

    pub async fn link_potential_match_component(
        &self,
        potential_match_id: i32,
        component_id: i32,
    ) -> Result<(), ServiceError> {
        if let Some(existing) = PotentialBomMatch::find_by_id(potential_match_id)
            .one(self.db.as_ref())
            .await?
        {
            let mut active: potential_bom_match::ActiveModel = existing.into();
            active.component_id = Set(Some(component_id));
            active.update(self.db.as_ref()).await?;
        }
        Ok(())
    }

    /// Moves a potential match out of `proposed` once the pipeline has
    /// reached a verdict on it. Only overwrites `component_id` when one is
    /// given, so rejecting the runners-up doesn't erase anything already
    /// attached to them by a separate enrichment pass.
    pub async fn set_potential_match_state(
        &self,
        potential_match_id: i32,
        state: &str,
        component_id: Option<i32>,
    ) -> Result<(), ServiceError> {
        if let Some(existing) = PotentialBomMatch::find_by_id(potential_match_id)
            .one(self.db.as_ref())
            .await?
        {
            let mut active: potential_bom_match::ActiveModel = existing.into();
            active.selection_state = Set(state.to_string());
            if component_id.is_some() {
                active.component_id = Set(component_id);
            }
            active.update(self.db.as_ref()).await?;
        }
        Ok(())
    }

    /// Deletes any potential matches recorded for this item in a prior run,
    /// so a re-run's ranking doesn't collide with the unique `(bom_item_id,
    /// rank)` index.
    pub async fn clear_potential_matches_for_item(&self, bom_item_id: i32) -> Result<(), ServiceError> {
        PotentialBomMatch::delete_many()
            .filter(potential_bom_match::Column::BomItemId.eq(bom_item_id))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    pub async fn get_potential_matches_for_bom_item(
        &self,
        bom_item_id: i32,
    ) -> Result<Vec<potential_bom_match::Model>, ServiceError> {
        Ok(PotentialBomMatch::find()
            .filter(potential_bom_match::Column::BomItemId.eq(bom_item_id))
            .order_by_asc(potential_bom_match::Column::Rank)
            .all(self.db.as_ref())
            .await?)
    }

    pub async fn get_bom_item_match(&self, bom_item_id: i32) -> Result<Option<bom_item_match::Model>, ServiceError> {
        Ok(BomItemMatch::find()
            .filter(bom_item_match::Column::BomItemId.eq(bom_item_id))
            .order_by_desc(bom_item_match::Column::MatchedAt)
            .one(self.db.as_ref())
            .await?)
    }

    /// `(BomItem, BomItemMatch?, Component?)` via outer join, preserving
    /// BomItem insertion order.
    pub async fn get_finished_project_data(&self, project_id: &str) -> Result<Vec<BomItemRow>, ServiceError> {
        let items = self.get_bom_items(project_id).await?;
        let mut rows = Vec::with_capacity(items.len());
        for item in items {
            let bom_item_match = self.get_bom_item_match(item.id).await?;
            let component = match &bom_item_match {
                Some(m) => match m.component_id {
                    Some(cid) => Component::find_by_id(cid).one(self.db.as_ref()).await?,
                    None => None,
                },
                None => None,
            };
            rows.push(BomItemRow {
                bom_item: item,
                bom_item_match,
                component,
            });
        }
        Ok(rows)
    }

    // -- DistributorCache --

    /// Returns the freshest cached payload younger than `max_age_secs`, or
    /// `None`. Callers must treat lookup failures as a cache miss, never a
    /// hard error — this method already does so internally and only
    /// propagates genuinely unexpected database errors.
    pub async fn cache_get(
        &self,
        search_term: &str,
        search_type: &str,
        max_age_secs: i64,
    ) -> Result<Option<String>, ServiceError> {
        let cutoff = Utc::now() - chrono::Duration::seconds(max_age_secs);
        let entry = CacheEntry::find()
            .filter(cache_entry::Column::SearchTerm.eq(search_term.to_string()))
            .filter(cache_entry::Column::SearchType.eq(search_type.to_string()))
            .filter(cache_entry::Column::CachedAt.gte(cutoff))
            .order_by_desc(cache_entry::Column::CachedAt)
            .one(self.db.as_ref())
            .await?;
        Ok(entry.map(|e| e.response_data))
    }

    /// Upserts on `(search_term, search_type)` so the newest write always
    /// wins: a second put for the same key must not fail the unique index
    /// and leave the older, now-unrefreshable row in place.
    pub async fn cache_put(
        &self,
        search_term: &str,
        search_type: &str,
        response_data: String,
    ) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        CacheEntry::delete_many()
            .filter(cache_entry::Column::SearchTerm.eq(search_term.to_string()))
            .filter(cache_entry::Column::SearchType.eq(search_type.to_string()))
            .exec(&txn)
            .await?;
        cache_entry::ActiveModel {
            id: sea_orm::NotSet,
            search_term: Set(search_term.to_string()),
            search_type: Set(search_type.to_string()),
            response_data: Set(response_data),
            cached_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{Database, Schema};
    use sea_orm_migration::prelude::*;

    async fn test_store() -> Store {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let schema = Schema::new(sea_orm::DatabaseBackend::Sqlite);
        for stmt in [
            schema.create_table_from_entity(Project),
            schema.create_table_from_entity(BomItem),
        ] {
            db.execute(db.get_database_backend().build(&stmt)).await.unwrap();
        }
        db.execute(db.get_database_backend().build(&schema.create_table_from_entity(Component)))
            .await
            .unwrap();
        db.execute(db.get_database_backend().build(&schema.create_table_from_entity(BomItemMatch)))
            .await
            .unwrap();
        db.execute(db.get_database_backend().build(&schema.create_table_from_entity(PotentialBomMatch)))
            .await
            .unwrap();
        db.execute(db.get_database_backend().build(&schema.create_table_from_entity(CacheEntry)))
            .await
            .unwrap();
        Store::new(Arc::new(db))
    }

    #[tokio::test]
    async fn queue_info_is_zero_for_unknown_project() {
        let store = test_store().await;
        assert_eq!(store.get_queue_info("nope").await.unwrap(), (0, 0));
    }

    #[tokio::test]
    async fn queue_info_reflects_creation_order() {
        let store = test_store().await;
        store.create_project("a".into(), None, None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        store.create_project("b".into(), None, None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        store.create_project("c".into(), None, None).await.unwrap();

        assert_eq!(store.get_queue_info("a").await.unwrap(), (1, 3));
        assert_eq!(store.get_queue_info("b").await.unwrap(), (2, 3));
        assert_eq!(store.get_queue_info("c").await.unwrap(), (3, 3));
    }

    #[tokio::test]
    async fn illegal_status_transition_is_rejected() {
        let store = test_store().await;
        store.create_project("p1".into(), None, None).await.unwrap();
        let err = store
            .update_project_status("p1", ProjectStatus::Finished, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn legal_status_transition_updates_timestamps() {
        let store = test_store().await;
        store.create_project("p1".into(), None, None).await.unwrap();
        let now = Utc::now();
        let updated = store
            .update_project_status("p1", ProjectStatus::Processing, Some(now), None)
            .await
            .unwrap();
        assert_eq!(updated.status, "processing");
        assert!(updated.start_time.is_some());
    }

    #[tokio::test]
    async fn bom_items_are_returned_in_creation_order() {
        let store = test_store().await;
        store.create_project("p1".into(), None, None).await.unwrap();
        store
            .create_bom_item("p1".into(), 1, "first".into(), "0805".into(), None)
            .await
            .unwrap();
        store
            .create_bom_item("p1".into(), 2, "second".into(), "0805".into(), None)
            .await
            .unwrap();
        let items = store.get_bom_items("p1").await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].description, "first");
        assert_eq!(items[1].description, "second");
    }

    #[tokio::test]
    async fn get_or_create_component_is_idempotent_on_distributor_pn() {
        let store = test_store().await;
        let first = store
            .get_or_create_component("DPN-1", "MPN-1", None, None, None, None, None, None)
            .await
            .unwrap();
        let second = store
            .get_or_create_component("DPN-1", "MPN-1", None, None, None, None, None, None)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn cache_put_then_get_round_trips_within_the_age_window() {
        let store = test_store().await;
        store
            .cache_put("10k resistor", cache_entry::search_type::KEYWORD, "{\"parts\":[]}".into())
            .await
            .unwrap();
        let hit = store
            .cache_get("10k resistor", cache_entry::search_type::KEYWORD, 86_400)
            .await
            .unwrap();
        assert_eq!(hit, Some("{\"parts\":[]}".to_string()));
    }

    #[tokio::test]
    async fn cache_get_misses_outside_the_age_window() {
        let store = test_store().await;
        store
            .cache_put("10k resistor", cache_entry::search_type::KEYWORD, "{}".into())
            .await
            .unwrap();
        let hit = store
            .cache_get("10k resistor", cache_entry::search_type::KEYWORD, -1)
            .await
            .unwrap();
        assert_eq!(hit, None);
    }

    #[tokio::test]
    async fn cache_put_on_an_existing_key_overwrites_rather_than_conflicts() {
        let store = test_store().await;
        store
            .cache_put("10k resistor", cache_entry::search_type::KEYWORD, "{\"v\":1}".into())
            .await
            .unwrap();
        store
            .cache_put("10k resistor", cache_entry::search_type::KEYWORD, "{\"v\":2}".into())
            .await
            .unwrap();

        let hit = store
            .cache_get("10k resistor", cache_entry::search_type::KEYWORD, 86_400)
            .await
            .unwrap();
        assert_eq!(hit, Some("{\"v\":2}".to_string()));

        let count = CacheEntry::find().count(store.db()).await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn potential_match_ranking_survives_a_re_run_and_selection() {
        let store = test_store().await;
        store
            .create_project_with_items(
                "p1".into(),
                None,
                None,
                vec![(1, "10k resistor".into(), "0805".into(), None)],
            )
            .await
            .unwrap();
        let item = store.get_bom_items("p1").await.unwrap().into_iter().next().unwrap();

        store.create_potential_match(item.id, 1, "MPN-A", None, None).await.unwrap();
        store.create_potential_match(item.id, 2, "MPN-B", None, None).await.unwrap();

        store
            .set_potential_match_state(
                store.get_potential_matches_for_bom_item(item.id).await.unwrap()[0].id,
                potential_bom_match::selection_state::SELECTED,
                Some(7),
            )
            .await
            .unwrap();

        let ranked = store.get_potential_matches_for_bom_item(item.id).await.unwrap();
        assert_eq!(ranked[0].selection_state, potential_bom_match::selection_state::SELECTED);
        assert_eq!(ranked[0].component_id, Some(7));
        assert_eq!(ranked[1].selection_state, potential_bom_match::selection_state::PROPOSED);

        // A re-run clears the prior ranking rather than colliding on rank.
        store.clear_potential_matches_for_item(item.id).await.unwrap();
        store.create_potential_match(item.id, 1, "MPN-C", None, None).await.unwrap();
        let after_rerun = store.get_potential_matches_for_bom_item(item.id).await.unwrap();
        assert_eq!(after_rerun.len(), 1);
        assert_eq!(after_rerun[0].manufacturer_part_number, "MPN-C");
    }
}
