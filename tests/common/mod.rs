#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use sponsorblock_segments::cache::QueryCache;
use sponsorblock_segments::config::SelectionSettings;
use sponsorblock_segments::error::{AppError, AppResult};
use sponsorblock_segments::hashing::{get_hash, DEFAULT_HASH_TIMES};
use sponsorblock_segments::models::{ActionType, Category, DbSegment, HiddenType, Service, VideoName};
use sponsorblock_segments::repository::{SegmentRepository, ShadowHideStore};
use sponsorblock_segments::reputation::ReputationLookup;
use sponsorblock_segments::service::SegmentService;

pub const SALT: &str = "test-salt";

/// What `hashed_ip` produces for a requester address.
pub fn ip_hash(ip: &str) -> String {
    get_hash(&format!("{}{}", ip, SALT), DEFAULT_HASH_TIMES)
}

pub fn user_hash(user_id: &str) -> String {
    get_hash(user_id, DEFAULT_HASH_TIMES)
}

pub fn segment(video_id: &str, uuid: &str, start: f64, end: f64, votes: i32) -> DbSegment {
    DbSegment {
        video_id: video_id.to_string(),
        cid: String::new(),
        start_time: start,
        end_time: end,
        votes,
        uuid: uuid.to_string(),
        user_id: format!("user-{}", uuid),
        category: Category::Sponsor,
        action_type: ActionType::Skip,
        video_duration: 600.0,
        hashed_video_id: get_hash(video_id, 1),
        time_submitted: 1,
        ..Default::default()
    }
}

pub fn with_action(mut segment: DbSegment, category: Category, action_type: ActionType) -> DbSegment {
    segment.category = category;
    segment.action_type = action_type;
    segment
}

#[derive(Default)]
pub struct FakeRepository {
    pub segments: Mutex<Vec<DbSegment>>,
    pub vips: Vec<String>,
    pub fetches: AtomicUsize,
    pub overloaded: AtomicBool,
    pub fail_ping: bool,
}

impl FakeRepository {
    pub fn new(segments: Vec<DbSegment>) -> Self {
        Self {
            segments: Mutex::new(segments),
            ..Default::default()
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SegmentRepository for FakeRepository {
    async fn fetch_segments(&self, name: &VideoName, _service: Service) -> AppResult<Vec<DbSegment>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let mut segments: Vec<DbSegment> = self
            .segments
            .lock()
            .unwrap()
            .iter()
            .filter(|segment| match name {
                VideoName::ByID(id) => &segment.video_id == id,
                VideoName::ByHashPrefix(prefix) => segment.hashed_video_id.starts_with(prefix.as_str()),
            })
            .cloned()
            .collect();
        segments.sort_by(|a, b| {
            a.start_time
                .total_cmp(&b.start_time)
                .then(a.end_time.total_cmp(&b.end_time))
        });
        Ok(segments)
    }

    async fn hide_segments_by_uuid(&self, uuids: &[String], hidden: HiddenType) -> AppResult<u64> {
        let mut updated = 0;
        for segment in self.segments.lock().unwrap().iter_mut() {
            if uuids.contains(&segment.uuid) {
                segment.hidden = hidden;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn update_votes(&self, votes: &[(String, i32)]) -> AppResult<u64> {
        let mut updated = 0;
        for segment in self.segments.lock().unwrap().iter_mut() {
            if let Some((_, value)) = votes.iter().find(|(uuid, _)| uuid == &segment.uuid) {
                segment.votes = *value;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn lock_segments(&self, uuids: &[String], locked: bool) -> AppResult<u64> {
        let mut updated = 0;
        for segment in self.segments.lock().unwrap().iter_mut() {
            if uuids.contains(&segment.uuid) {
                segment.locked = locked;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn is_user_vip(&self, hashed_user_id: &str) -> AppResult<bool> {
        Ok(self.vips.iter().any(|vip| vip == hashed_user_id))
    }

    async fn ping(&self) -> AppResult<()> {
        if self.fail_ping {
            return Err(AppError::internal("connection refused"));
        }
        Ok(())
    }

    fn is_overloaded(&self) -> bool {
        self.overloaded.load(Ordering::SeqCst)
    }
}

/// Submitter IP hashes keyed by submission time.
#[derive(Default)]
pub struct FakeShadowStore {
    pub ips: HashMap<i64, Vec<String>>,
    pub lookups: AtomicUsize,
}

#[async_trait]
impl ShadowHideStore for FakeShadowStore {
    async fn submitter_ip_hashes(&self, _video_id: &str, time_submitted: i64, _service: Service) -> AppResult<Vec<String>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.ips.get(&time_submitted).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct FakeReputation {
    pub scores: HashMap<String, f64>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl ReputationLookup for FakeReputation {
    async fn reputation(&self, user_id: &str) -> AppResult<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.scores.get(user_id).copied().unwrap_or(0.0))
    }
}

pub struct Harness {
    pub repository: Arc<FakeRepository>,
    pub shadow_store: Arc<FakeShadowStore>,
    pub reputation: Arc<FakeReputation>,
    pub service: Arc<SegmentService>,
}

impl Harness {
    pub fn new(repository: FakeRepository) -> Self {
        Self::with_parts(repository, FakeShadowStore::default(), FakeReputation::default())
    }

    pub fn with_parts(repository: FakeRepository, shadow_store: FakeShadowStore, reputation: FakeReputation) -> Self {
        let repository = Arc::new(repository);
        let shadow_store = Arc::new(shadow_store);
        let reputation = Arc::new(reputation);

        let service = SegmentService::new(
            repository.clone(),
            shadow_store.clone(),
            reputation.clone(),
            QueryCache::new(1_000),
            SelectionSettings::default(),
        );

        Self {
            repository,
            shadow_store,
            reputation,
            service: Arc::new(service),
        }
    }
}
