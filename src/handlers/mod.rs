pub mod health;
pub mod projects;

use std::sync::Arc;

use crate::cache::DistributorCache;
use crate::clients::distributor::DistributorClient;
use crate::clients::llm::LlmClient;
use crate::config::AppConfig;
use crate::events::EventSender;
use crate::repositories::store::Store;

/// Shared application state handed to every axum handler. Everything here
/// is cheap to clone (`Store`/`DistributorClient`/`LlmClient` are thin
/// wrappers around an `Arc`-backed connection pool or HTTP client), and the
/// same collaborators are handed to the `QueueRunner` background task.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Store,
    pub distributor: DistributorClient,
    pub llm: LlmClient,
    pub events: EventSender,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        store: Store,
        distributor: DistributorClient,
        llm: LlmClient,
        events: EventSender,
    ) -> Self {
        Self { config, store, distributor, llm, events }
    }

    /// Builds the `DistributorCache`/`DistributorClient` pair from config,
    /// sharing one `Store` handle with the rest of the application.
    pub fn build_distributor_client(config: &AppConfig, store: Store) -> DistributorClient {
        let cache = DistributorCache::new(store, config.cache_max_age_secs);
        DistributorClient::new(
            config.distributor_api_base_url.clone(),
            config.distributor_api_key.clone(),
            cache,
            std::time::Duration::from_millis(config.distributor_request_delay_ms),
            std::time::Duration::from_millis(config.distributor_retry_delay_ms),
            config.distributor_max_retries,
            std::time::Duration::from_secs(config.distributor_timeout_secs),
        )
    }
}
