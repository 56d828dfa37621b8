//! DistributorCache: a read-through cache over distributor
//! responses, keyed by `(search_term, search_type)` with an age bound.
//! Backed by the Store's `mouser_api_cache` table, not an in-process map —
//! this process and any sibling QueueRunner share one cache.

use crate::entities::cache_entry::search_type;
use crate::repositories::store::Store;
use tracing::warn;

#[derive(Clone)]
pub struct DistributorCache {
    store: Store,
    max_age_secs: i64,
}

impl DistributorCache {
    pub fn new(store: Store, max_age_secs: i64) -> Self {
        Self { store, max_age_secs }
    }

    /// Never fails the caller: any lookup error is logged and treated as a
    /// miss.
    pub async fn get_keyword(&self, term: &str) -> Option<String> {
        self.get(term, search_type::KEYWORD).await
    }

    pub async fn get_mpn(&self, term: &str) -> Option<String> {
        self.get(term, search_type::MPN).await
    }

    async fn get(&self, term: &str, kind: &str) -> Option<String> {
        match self.store.cache_get(term, kind, self.max_age_secs).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(term, kind, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    pub async fn put_keyword(&self, term: &str, payload: String) {
        self.put(term, search_type::KEYWORD, payload).await
    }

    pub async fn put_mpn(&self, term: &str, payload: String) {
        self.put(term, search_type::MPN, payload).await
    }

    /// Never fails the caller: write failures are logged and swallowed.
    async fn put(&self, term: &str, kind: &str, payload: String) {
        if let Err(e) = self.store.cache_put(term, kind, payload).await {
            warn!(term, kind, error = %e, "cache write failed, continuing without caching");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::Database;
    use std::sync::Arc;

    async fn test_cache() -> DistributorCache {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let schema = sea_orm::Schema::new(sea_orm::DatabaseBackend::Sqlite);
        use sea_orm::ConnectionTrait;
        db.execute(
            db.get_database_backend()
                .build(&schema.create_table_from_entity(crate::entities::cache_entry::Entity)),
        )
        .await
        .unwrap();
        DistributorCache::new(Store::new(Arc::new(db)), 86_400)
    }

    #[tokio::test]
    async fn miss_on_empty_cache() {
        let cache = test_cache().await;
        assert_eq!(cache.get_keyword("10k resistor").await, None);
    }

    #[tokio::test]
    async fn hit_after_put() {
        let cache = test_cache().await;
        cache.put_keyword("10k resistor", "{}".into()).await;
        assert_eq!(cache.get_keyword("10k resistor").await, Some("{}".into()));
    }

    #[tokio::test]
    async fn keyword_and_mpn_do_not_collide() {
        let cache = test_cache().await;
        cache.put_keyword("RC0805", "keyword-payload".into()).await;
        assert_eq!(cache.get_mpn("RC0805").await, None);
    }
}
