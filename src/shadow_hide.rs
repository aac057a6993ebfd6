//! Decides which stored segments a particular requester may see.
//!
//! Shadow-hidden segments stay visible to whoever submitted them (matched by
//! hashed IP) and nobody else. Any trouble looking up submitter IPs hides the
//! segment.

use std::collections::HashMap;
use std::time::Duration;

use futures::future::join_all;
use tracing::error;

use crate::cache::{shadow_hidden_ip_key, QueryCache};
use crate::error::AppError;
use crate::models::{DbSegment, HiddenType, Service, Visibility};
use crate::repository::ShadowHideStore;

#[derive(Debug, Default)]
pub struct FilteredSegments {
    pub segments: Vec<DbSegment>,
    /// A shadow-hidden segment was let through for this requester, so the
    /// result must not be shared through the group cache.
    pub shadow_hidden_included: bool,
}

fn too_untrustworthy(segment: &DbSegment) -> bool {
    segment.hidden != HiddenType::Show || segment.votes < -1
}

fn needs_ip_check(segment: &DbSegment) -> bool {
    !segment.required && !too_untrustworthy(segment) && segment.shadow_hidden == Visibility::ShadowHidden
}

pub struct ShadowHideFilter<'a> {
    store: &'a dyn ShadowHideStore,
    cache: &'a QueryCache,
    timeout: Duration,
    public_overloaded: bool,
}

impl<'a> ShadowHideFilter<'a> {
    pub fn new(store: &'a dyn ShadowHideStore, cache: &'a QueryCache, timeout: Duration) -> Self {
        Self {
            store,
            cache,
            timeout,
            public_overloaded: false,
        }
    }

    /// Marks the public database as overloaded, which fails every
    /// shadow-hidden segment closed like an overloaded private store.
    pub fn public_overloaded(mut self, overloaded: bool) -> Self {
        self.public_overloaded = overloaded;
        self
    }

    async fn submitter_ips(&self, video_id: &str, time_submitted: i64, service: Service) -> Option<Vec<String>> {
        let key = shadow_hidden_ip_key(video_id, time_submitted, service);
        let lookup = self.cache.get_or_compute(&key, None, || {
            self.store.submitter_ip_hashes(video_id, time_submitted, service)
        });

        let result = match tokio::time::timeout(self.timeout, lookup).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(self.timeout.as_millis() as u64)),
        };

        match result {
            Ok(ips) => Some(ips),
            Err(e) => {
                error!("skipSegments: Error while trying to find IP for {} at {}: {}", video_id, time_submitted, e);
                None
            }
        }
    }

    /// Keeps required segments, drops hidden or heavily downvoted ones, and
    /// resolves shadow-hidden ones against `requester_ip`. One IP lookup is
    /// made per distinct submission time.
    pub async fn filter(
        &self,
        video_id: &str,
        service: Service,
        segments: Vec<DbSegment>,
        requester_ip: Option<&str>,
    ) -> FilteredSegments {
        let mut times: Vec<i64> = segments
            .iter()
            .filter(|segment| needs_ip_check(segment))
            .map(|segment| segment.time_submitted)
            .collect();
        times.sort_unstable();
        times.dedup();

        let mut submitter_ips: HashMap<i64, Vec<String>> = HashMap::new();
        if !times.is_empty() && requester_ip.is_some() {
            if self.public_overloaded || self.store.is_overloaded() {
                error!("High load, not handling shadowhide for {}", video_id);
            } else {
                let lookups = times
                    .iter()
                    .map(|time| self.submitter_ips(video_id, *time, service));
                for (time, ips) in times.iter().zip(join_all(lookups).await) {
                    if let Some(ips) = ips {
                        submitter_ips.insert(*time, ips);
                    }
                }
            }
        }

        let mut shadow_hidden_included = false;
        let segments = segments
            .into_iter()
            .filter(|segment| {
                if segment.required {
                    return true;
                }
                if too_untrustworthy(segment) {
                    return false;
                }
                if segment.shadow_hidden == Visibility::Visible {
                    return true;
                }

                let visible = match (requester_ip, submitter_ips.get(&segment.time_submitted)) {
                    (Some(ip), Some(ips)) => ips.iter().any(|submitter| submitter == ip),
                    _ => false,
                };
                shadow_hidden_included |= visible;
                visible
            })
            .collect();

        FilteredSegments {
            segments,
            shadow_hidden_included,
        }
    }
}
