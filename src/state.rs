use std::sync::Arc;

use sqlx::PgPool;

use crate::cache::QueryCache;
use crate::config::Config;
use crate::reputation::PgReputation;
use crate::repository::{PgPrivateStore, PgSegmentRepository};
use crate::service::SegmentService;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub segments: Arc<SegmentService>,
    pub global_salt: String,
}

impl AppState {
    pub fn new(segments: Arc<SegmentService>, global_salt: impl Into<String>) -> Self {
        Self {
            segments,
            global_salt: global_salt.into(),
        }
    }

    /// Wires the Postgres-backed collaborators around one shared cache.
    pub fn from_pools(config: &Config, pool: PgPool, private_pool: PgPool) -> Self {
        let cache = QueryCache::new(config.cache_max_capacity);
        let reputation = PgReputation::new(pool.clone(), cache.clone(), config.reputation_ttl());

        let segments = SegmentService::new(
            Arc::new(PgSegmentRepository::new(pool)),
            Arc::new(PgPrivateStore::new(private_pool)),
            Arc::new(reputation),
            cache,
            config.selection_settings(),
        );

        Self::new(Arc::new(segments), config.global_salt.clone())
    }
}
