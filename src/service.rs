//! Request-level pipeline: fetch, filter, group, choose, assemble.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error, info};

use crate::cache::{
    shadow_hidden_ip_prefix, skip_segment_groups_key, skip_segment_groups_prefix, skip_segments_hash_key,
    skip_segments_key, video_labels_key, QueryCache,
};
use crate::config::SelectionSettings;
use crate::error::{AppError, AppResult};
use crate::grouping::{build_segment_groups, OverlappingSegmentGroup};
use crate::hashing::{get_hash, hash_cached, hashed_ip};
use crate::models::{ActionType, Category, DbSegment, HiddenType, Service, VideoName};
use crate::reputation::ReputationLookup;
use crate::repository::{SegmentRepository, ShadowHideStore};
use crate::selection::{choose_label, choose_segments};
use crate::shadow_hide::ShadowHideFilter;
use crate::structs::{Segment, VideoLabel, VideoLabels, VideoSegments};

/// What a client asked for. Category and action type lists filter the
/// output only; every stored segment takes part in selection.
#[derive(Debug, Clone)]
pub struct SkipSegmentsQuery {
    pub categories: Vec<Category>,
    pub action_types: Vec<ActionType>,
    /// Full UUIDs or UUID prefixes that must be returned regardless of
    /// votes, hiding or caching.
    pub required_segments: Vec<String>,
    pub service: Service,
}

impl Default for SkipSegmentsQuery {
    fn default() -> Self {
        Self {
            categories: Category::DEFAULTS.to_vec(),
            action_types: ActionType::DEFAULTS.to_vec(),
            required_segments: Vec::new(),
            service: Service::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RequesterContext {
    pub hashed_ip: Option<String>,
}

fn is_required(uuid: &str, required_segments: &[String]) -> bool {
    required_segments
        .iter()
        .any(|search| !search.is_empty() && uuid.starts_with(search.as_str()))
}

pub struct SegmentService {
    repository: Arc<dyn SegmentRepository>,
    shadow_store: Arc<dyn ShadowHideStore>,
    reputation: Arc<dyn ReputationLookup>,
    cache: QueryCache,
    settings: SelectionSettings,
}

impl SegmentService {
    pub fn new(
        repository: Arc<dyn SegmentRepository>,
        shadow_store: Arc<dyn ShadowHideStore>,
        reputation: Arc<dyn ReputationLookup>,
        cache: QueryCache,
        settings: SelectionSettings,
    ) -> Self {
        Self {
            repository,
            shadow_store,
            reputation,
            cache,
            settings,
        }
    }

    pub fn repository(&self) -> &dyn SegmentRepository {
        self.repository.as_ref()
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// The winning segments for one video, across all its sub-parts unless
    /// `sub_part` narrows it down. Empty when nothing qualifies.
    pub async fn select_segments(
        &self,
        video_id: &str,
        sub_part: Option<&str>,
        query: &SkipSegmentsQuery,
        requester: &RequesterContext,
    ) -> AppResult<Vec<Segment>> {
        let name = VideoName::ByID(video_id.to_string());
        let segments = self.fetch_segments(&name, query.service).await?;

        let videos = self.assemble(segments, sub_part, query, requester).await;
        Ok(videos
            .into_iter()
            .find(|video| video.video_id == video_id)
            .map(|video| video.segments)
            .unwrap_or_default())
    }

    /// Every video whose hashed ID starts with `hash_prefix`, each with its
    /// winning segments. Videos left without segments are omitted.
    pub async fn segments_by_hash(
        &self,
        hash_prefix: &str,
        query: &SkipSegmentsQuery,
        requester: &RequesterContext,
    ) -> AppResult<Vec<VideoSegments>> {
        let name = VideoName::ByHashPrefix(hash_prefix.to_lowercase());
        let segments = self.fetch_segments(&name, query.service).await?;

        Ok(self.assemble(segments, None, query, requester).await)
    }

    /// The full-video label of one video, empty when it has none.
    pub async fn video_labels(&self, video_id: &str, service: Service) -> AppResult<Vec<VideoLabel>> {
        self.cache
            .get_or_compute(&video_labels_key(video_id, service), None, || async {
                let name = VideoName::ByID(video_id.to_string());
                let segments = self.fetch_segments(&name, service).await?;
                Ok::<_, AppError>(choose_label(segments).iter().map(VideoLabel::from).collect::<Vec<_>>())
            })
            .await
    }

    /// Labels of every video whose hashed ID starts with `hash_prefix`.
    /// Videos without a label are omitted.
    pub async fn video_labels_by_hash(&self, hash_prefix: &str, service: Service) -> AppResult<Vec<VideoLabels>> {
        let name = VideoName::ByHashPrefix(hash_prefix.to_lowercase());
        let segments = self.fetch_segments(&name, service).await?;

        let mut per_video: BTreeMap<String, Vec<DbSegment>> = BTreeMap::new();
        for segment in segments {
            per_video.entry(segment.video_id.clone()).or_default().push(segment);
        }

        Ok(per_video
            .into_iter()
            .filter_map(|(video_id, segments)| {
                let hash = segments
                    .first()
                    .map(|segment| segment.hashed_video_id.clone())
                    .unwrap_or_default();
                choose_label(segments).map(|label| VideoLabels {
                    video_id,
                    hash,
                    segments: vec![VideoLabel::from(&label)],
                })
            })
            .collect())
    }

    async fn fetch_segments(&self, name: &VideoName, service: Service) -> AppResult<Vec<DbSegment>> {
        match name {
            VideoName::ByID(video_id) => {
                self.cache
                    .get_or_compute(&skip_segments_key(video_id, service), None, || {
                        self.repository.fetch_segments(name, service)
                    })
                    .await
            }
            VideoName::ByHashPrefix(prefix) if prefix.len() >= 4 => {
                // Cache on the first four characters; longer prefixes are
                // narrowed down here.
                let short = VideoName::ByHashPrefix(prefix.chars().take(4).collect());
                let segments: Vec<DbSegment> = self
                    .cache
                    .get_or_compute(&skip_segments_hash_key(prefix, service), None, || {
                        self.repository.fetch_segments(&short, service)
                    })
                    .await?;

                Ok(segments
                    .into_iter()
                    .filter(|segment| segment.hashed_video_id.starts_with(prefix.as_str()))
                    .collect())
            }
            VideoName::ByHashPrefix(_) => self.repository.fetch_segments(name, service).await,
        }
    }

    async fn assemble(
        &self,
        segments: Vec<DbSegment>,
        sub_part: Option<&str>,
        query: &SkipSegmentsQuery,
        requester: &RequesterContext,
    ) -> Vec<VideoSegments> {
        // Old clients ask for the highlight category without the poi action
        // and expect highlights as skips.
        let force_poi_as_skip =
            !query.action_types.contains(&ActionType::Poi) && query.categories.contains(&Category::PoiHighlight);
        let mut action_types = query.action_types.clone();
        if force_poi_as_skip {
            action_types.push(ActionType::Poi);
        }

        let mut per_sub_part: BTreeMap<(String, String), Vec<DbSegment>> = BTreeMap::new();
        for mut segment in segments {
            if sub_part.is_some_and(|cid| segment.cid != cid) {
                continue;
            }
            segment.required = is_required(&segment.uuid, &query.required_segments);
            per_sub_part
                .entry((segment.video_id.clone(), segment.cid.clone()))
                .or_default()
                .push(segment);
        }

        let can_use_cache = query.required_segments.is_empty();
        let chosen = join_all(per_sub_part.into_iter().map(|((video_id, cid), segments)| async move {
            let chosen = self
                .prepare_sub_part(&video_id, &cid, query.service, segments, requester, can_use_cache)
                .await;
            (video_id, chosen)
        }))
        .await;

        let mut videos: BTreeMap<String, VideoSegments> = BTreeMap::new();
        for (video_id, chosen) in chosen {
            let output: Vec<Segment> = chosen
                .iter()
                .filter(|segment| {
                    query.categories.contains(&segment.category) && action_types.contains(&segment.action_type)
                })
                .map(|segment| {
                    let mut output = Segment::from(segment);
                    if force_poi_as_skip && output.action_type == ActionType::Poi {
                        output.action_type = ActionType::Skip;
                    }
                    output
                })
                .collect();

            if output.is_empty() {
                continue;
            }

            let hash = chosen
                .first()
                .map(|segment| segment.hashed_video_id.clone())
                .unwrap_or_default();
            videos
                .entry(video_id.clone())
                .or_insert_with(|| VideoSegments {
                    video_id,
                    hash,
                    segments: Vec::new(),
                })
                .segments
                .extend(output);
        }

        let mut videos: Vec<VideoSegments> = videos.into_values().collect();
        for video in videos.iter_mut() {
            video
                .segments
                .sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        }
        videos
    }

    async fn prepare_sub_part(
        &self,
        video_id: &str,
        cid: &str,
        service: Service,
        segments: Vec<DbSegment>,
        requester: &RequesterContext,
        can_use_cache: bool,
    ) -> Vec<DbSegment> {
        let filter = ShadowHideFilter::new(self.shadow_store.as_ref(), &self.cache, self.settings.shadow_hide_timeout)
            .public_overloaded(self.repository.is_overloaded());
        let filtered = filter
            .filter(video_id, service, segments, requester.hashed_ip.as_deref())
            .await;

        let use_cache =
            can_use_cache && !filtered.shadow_hidden_included && self.settings.use_cache_for_segment_groups;
        let groups = self
            .segment_groups(video_id, cid, service, filtered.segments, use_cache)
            .await;

        choose_segments(groups, &mut rand::thread_rng())
    }

    async fn segment_groups(
        &self,
        video_id: &str,
        cid: &str,
        service: Service,
        segments: Vec<DbSegment>,
        use_cache: bool,
    ) -> Vec<OverlappingSegmentGroup> {
        let lookup = if self.repository.is_overloaded() {
            None
        } else {
            Some(self.reputation.as_ref())
        };
        let build = |segments: Vec<DbSegment>| {
            build_segment_groups(
                segments,
                lookup,
                self.settings.reputation_concurrency,
                &self.settings.overlap_thresholds,
            )
        };

        if !use_cache {
            return build(segments).await;
        }

        let key = skip_segment_groups_key(video_id, cid, service);
        let cached = self
            .cache
            .get_or_compute(&key, self.settings.segment_groups_ttl, || async {
                Ok::<_, AppError>(build(segments.clone()).await)
            })
            .await;

        match cached {
            Ok(groups) => groups,
            Err(e) => {
                error!("Falling back to uncached segment groups for {}: {}", key, e);
                build(segments).await
            }
        }
    }

    /// Drops every cached entry derived from one video's segments.
    pub async fn clear_segment_cache(&self, video_id: &str, service: Service) {
        debug!("Clearing segment cache for {} ({})", video_id, service);
        self.cache.invalidate(&skip_segments_key(video_id, service)).await;
        self.cache.invalidate(&video_labels_key(video_id, service)).await;
        self.cache
            .invalidate(&skip_segments_hash_key(&get_hash(video_id, 1), service))
            .await;
        self.cache.invalidate_prefix(&skip_segment_groups_prefix(video_id, service));
        self.cache.invalidate_prefix(&shadow_hidden_ip_prefix(video_id, service));
    }

    /// Called whenever segments of `video_id` are added or change state.
    pub async fn segments_changed(&self, video_id: &str) {
        for service in Service::ALL {
            self.clear_segment_cache(video_id, service).await;
        }
    }

    pub async fn hide_segments(&self, uuids: &[String], video_id: &str, hidden: HiddenType) -> AppResult<u64> {
        let updated = self.repository.hide_segments_by_uuid(uuids, hidden).await?;
        info!("Hid {} segments of {} as {:?}", updated, video_id, hidden);
        self.segments_changed(video_id).await;
        Ok(updated)
    }

    pub async fn update_votes(&self, video_id: &str, votes: &[(String, i32)]) -> AppResult<u64> {
        let updated = self.repository.update_votes(votes).await?;
        self.segments_changed(video_id).await;
        Ok(updated)
    }

    pub async fn lock_segments(&self, uuids: &[String], video_id: &str, locked: bool) -> AppResult<u64> {
        let updated = self.repository.lock_segments(uuids, locked).await?;
        info!("Set locked = {} on {} segments of {}", locked, updated, video_id);
        self.segments_changed(video_id).await;
        Ok(updated)
    }

    pub async fn hashed_ip(&self, ip: &str, salt: &str) -> AppResult<String> {
        hashed_ip(&self.cache, ip, salt).await
    }

    pub async fn hashed_user_id(&self, user_id: &str) -> AppResult<String> {
        hash_cached(&self.cache, user_id).await
    }

    pub async fn is_user_vip(&self, hashed_user_id: &str) -> AppResult<bool> {
        self.repository.is_user_vip(hashed_user_id).await
    }
}
