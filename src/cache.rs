//! In-process query cache shared by every request.
//!
//! Values are stored type-erased so one cache can hold segment lists, group
//! lists, IP hash lists and reputation scores side by side. Each entry
//! carries its own TTL; `None` keeps it until it is invalidated or evicted.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::future::Cache;
use moka::Expiry;
use tracing::{debug, error, warn};

use crate::error::{AppError, AppResult};
use crate::models::Service;

#[derive(Clone)]
struct CachedValue {
    value: Arc<dyn Any + Send + Sync>,
    ttl: Option<Duration>,
}

struct PerEntryTtl;

impl Expiry<String, CachedValue> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &CachedValue, _created_at: Instant) -> Option<Duration> {
        value.ttl
    }
}

#[derive(Clone)]
pub struct QueryCache {
    inner: Cache<String, CachedValue>,
}

impl QueryCache {
    pub fn new(max_capacity: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .support_invalidation_closures()
            .build();
        Self { inner }
    }

    /// Returns the cached value for `key`, or runs `compute` and caches its
    /// result. Concurrent callers for the same key share one computation.
    /// Errors from `compute` are returned and nothing is cached.
    pub async fn get_or_compute<T, F, Fut>(&self, key: &str, ttl: Option<Duration>, compute: F) -> AppResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut computed = false;
        let entry = self
            .inner
            .try_get_with(key.to_string(), async {
                computed = true;
                let value = compute().await?;
                Ok::<_, AppError>(CachedValue {
                    value: Arc::new(value),
                    ttl,
                })
            })
            .await
            .map_err(|e| AppError::Cache(e.to_string()))?;

        debug!("Cache {} for {}", if computed { "miss" } else { "hit" }, key);

        match entry.value.downcast_ref::<T>() {
            Some(value) => Ok(value.clone()),
            None => {
                // Same key reused for a different type; drop the stale entry.
                warn!("Cache entry {} holds an unexpected type, discarding", key);
                self.inner.invalidate(key).await;
                Err(AppError::Cache(format!("type mismatch for {}", key)))
            }
        }
    }

    pub async fn invalidate(&self, key: &str) {
        self.inner.invalidate(key).await;
    }

    pub fn invalidate_prefix(&self, prefix: &str) {
        let prefix = prefix.to_string();
        if let Err(e) = self.inner.invalidate_entries_if(move |key, _| key.starts_with(&prefix)) {
            error!("Failed to register cache invalidation: {}", e);
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }
}

pub fn skip_segments_key(video_id: &str, service: Service) -> String {
    format!("segments.v5.{}.videoID.{}", service, video_id)
}

pub fn skip_segments_hash_key(hash_prefix: &str, service: Service) -> String {
    let prefix: String = hash_prefix.chars().take(4).collect();
    if prefix.len() != 4 {
        warn!("Skip segment hash-prefix key is not length 4! {}", prefix);
    }
    format!("segments.v5.{}.{}", service, prefix)
}

pub fn skip_segment_groups_key(video_id: &str, cid: &str, service: Service) -> String {
    format!("{}{}", skip_segment_groups_prefix(video_id, service), cid)
}

/// Prefix shared by the group entries of every sub-part of a video.
pub fn skip_segment_groups_prefix(video_id: &str, service: Service) -> String {
    format!("segments.groups.v4.{}.videoID.{}.", service, video_id)
}

pub fn shadow_hidden_ip_key(video_id: &str, time_submitted: i64, service: Service) -> String {
    format!("{}{}", shadow_hidden_ip_prefix(video_id, service), time_submitted)
}

pub fn shadow_hidden_ip_prefix(video_id: &str, service: Service) -> String {
    format!("segments.v1.{}.videoID.{}.shadow.", service, video_id)
}

pub fn video_labels_key(video_id: &str, service: Service) -> String {
    format!("labels.v1.{}.videoID.{}", service, video_id)
}

pub fn reputation_key(user_id: &str) -> String {
    format!("reputation.v1.user.{}", user_id)
}

pub fn sha_hash_key(single_iteration: &str) -> String {
    if single_iteration.len() != 64 {
        warn!("sha.hash key is not length 64! {}", single_iteration);
    }
    format!("sha.hash.{}", single_iteration)
}
