//! Groups submissions that describe the same part of a video.
//!
//! A cheap chronological sweep first builds coarse groups of segments that
//! overlap at all. Each coarse group is then split again so that segments
//! which merely touch (a short intro right before a long sponsor, say) end up
//! in separate groups.

use futures::stream::{self, StreamExt};
use tracing::warn;

use crate::models::{ActionType, DbSegment};
use crate::reputation::ReputationLookup;

/// Minimum overlap fractions for two segments to count as the same claim.
/// Empirically tuned.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlapThresholds {
    /// Same category and same action type (chapters excluded).
    pub same_action: f64,
    /// Same category, different action types.
    pub cross_action: f64,
    /// Two chapters.
    pub chapter: f64,
}

impl Default for OverlapThresholds {
    fn default() -> Self {
        Self {
            same_action: 0.1,
            cross_action: 0.6,
            chapter: 0.8,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OverlappingSegmentGroup {
    pub segments: Vec<DbSegment>,
    pub votes: i32,
    pub reputation: f64,
    pub locked: bool,
    pub required: bool,
}

impl OverlappingSegmentGroup {
    fn starting_with(segment: DbSegment) -> Self {
        Self {
            votes: segment.votes,
            reputation: segment.reputation,
            locked: segment.locked,
            required: segment.required,
            segments: vec![segment],
        }
    }

    fn push(&mut self, segment: DbSegment) {
        self.votes += segment.votes;
        self.reputation += segment.reputation;
        self.locked |= segment.locked;
        self.required |= segment.required;
        self.segments.push(segment);
    }
}

/// Shared time over combined span. Zero-length segments (points of interest,
/// full-video labels) produce zero or NaN, which never passes a threshold.
pub fn overlap_fraction(a: &DbSegment, b: &DbSegment) -> f64 {
    let overlap = a.end_time.min(b.end_time) - a.start_time.max(b.start_time);
    let overall_duration = a.end_time.max(b.end_time) - a.start_time.min(b.start_time);
    overlap / overall_duration
}

fn is_similar(segment: &DbSegment, other: &DbSegment, thresholds: &OverlapThresholds) -> bool {
    let overlap = overlap_fraction(segment, other);
    let same_category = segment.category == other.category;

    (overlap >= thresholds.same_action
        && same_category
        && segment.action_type == other.action_type
        && segment.action_type != ActionType::Chapter)
        || (overlap >= thresholds.cross_action && same_category && segment.action_type != other.action_type)
        || (overlap >= thresholds.chapter
            && segment.action_type == ActionType::Chapter
            && other.action_type == ActionType::Chapter)
}

/// Coarse pass. `segments` must be sorted by start time: once the cursor
/// passes a segment's start, no later segment can reach back into an earlier
/// group.
pub fn group_overlapping(segments: Vec<DbSegment>) -> Vec<OverlappingSegmentGroup> {
    debug_assert!(
        segments.windows(2).all(|w| w[0].start_time <= w[1].start_time),
        "segments must be sorted by start time before grouping"
    );

    let mut groups: Vec<OverlappingSegmentGroup> = Vec::new();
    // Below any start time so the first segment always opens a group
    let mut cursor = f64::NEG_INFINITY;

    for segment in segments {
        if segment.start_time >= cursor || groups.is_empty() {
            groups.push(OverlappingSegmentGroup::default());
        }
        cursor = cursor.max(segment.end_time);

        if let Some(group) = groups.last_mut() {
            // A downvoted duplicate is usually just slightly off; it should
            // not drag the whole group down.
            if segment.votes > 0 {
                group.votes += segment.votes;
            }
            group.reputation += segment.reputation;
            group.locked |= segment.locked;
            group.required |= segment.required;
            group.segments.push(segment);
        }
    }

    groups
}

/// Refinement pass: greedy first-fit of each member into the first sub-group
/// holding any similar segment.
pub fn split_percent_overlap(
    groups: Vec<OverlappingSegmentGroup>,
    thresholds: &OverlapThresholds,
) -> Vec<OverlappingSegmentGroup> {
    groups
        .into_iter()
        .flat_map(|group| {
            let mut result: Vec<OverlappingSegmentGroup> = Vec::new();

            for segment in group.segments {
                let best_group = result.iter_mut().find(|candidate| {
                    candidate
                        .segments
                        .iter()
                        .any(|compare| is_similar(&segment, compare, thresholds))
                });

                match best_group {
                    Some(existing) => existing.push(segment),
                    None => result.push(OverlappingSegmentGroup::starting_with(segment)),
                }
            }

            result
        })
        .collect()
}

/// Required members beat locked members; the rest of the group is dropped.
/// Reputation becomes the mean over the surviving members.
pub fn finalize_groups(groups: &mut [OverlappingSegmentGroup]) {
    for group in groups.iter_mut() {
        if group.required {
            group.segments.retain(|segment| segment.required);
        } else if group.locked {
            group.segments.retain(|segment| segment.locked);
        }

        if !group.segments.is_empty() {
            group.reputation /= group.segments.len() as f64;
        }
    }
}

/// Lowers each stored reputation snapshot to the submitter's live score when
/// that is smaller, so later gains never inflate old submissions. Failed
/// lookups and a live score of exactly zero (not enough history) leave the
/// snapshot untouched.
pub async fn apply_live_reputation(segments: &mut [DbSegment], lookup: &dyn ReputationLookup, concurrency: usize) {
    let live: Vec<Option<f64>> = stream::iter(segments.iter().map(|segment| segment.user_id.clone()))
        .map(|user_id| async move {
            if user_id.is_empty() {
                return None;
            }
            match lookup.reputation(&user_id).await {
                Ok(score) => Some(score),
                Err(e) => {
                    warn!("Reputation lookup failed for {}: {}", user_id, e);
                    None
                }
            }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    for (segment, score) in segments.iter_mut().zip(live) {
        if let Some(score) = score.filter(|score| *score != 0.0) {
            segment.reputation = segment.reputation.min(score);
        }
    }
}

/// Full grouping pipeline for one video sub-part. Reputation lookups are
/// skipped entirely when `lookup` is `None` (the store is overloaded).
pub async fn build_segment_groups(
    mut segments: Vec<DbSegment>,
    lookup: Option<&dyn ReputationLookup>,
    concurrency: usize,
    thresholds: &OverlapThresholds,
) -> Vec<OverlappingSegmentGroup> {
    if let Some(lookup) = lookup {
        apply_live_reputation(&mut segments, lookup, concurrency).await;
    }

    let mut groups = split_percent_overlap(group_overlapping(segments), thresholds);
    finalize_groups(&mut groups);
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, AppResult};
    use crate::models::Category;
    use async_trait::async_trait;
    use std::collections::HashMap;

    fn seg(uuid: &str, start: f64, end: f64, category: Category, action_type: ActionType) -> DbSegment {
        DbSegment {
            video_id: "BV1xx411c7mD".to_string(),
            uuid: uuid.to_string(),
            start_time: start,
            end_time: end,
            category,
            action_type,
            ..Default::default()
        }
    }

    fn uuids(groups: &[OverlappingSegmentGroup]) -> Vec<Vec<String>> {
        groups
            .iter()
            .map(|g| g.segments.iter().map(|s| s.uuid.clone()).collect())
            .collect()
    }

    #[test]
    fn test_coarse_groups_follow_cursor() {
        let segments = vec![
            seg("a", 0.0, 10.0, Category::Sponsor, ActionType::Skip),
            seg("b", 5.0, 30.0, Category::Sponsor, ActionType::Skip),
            seg("c", 20.0, 25.0, Category::Intro, ActionType::Skip),
            seg("d", 30.0, 40.0, Category::Sponsor, ActionType::Skip),
        ];

        let groups = group_overlapping(segments);
        // d starts exactly where the cursor is, so it opens a new group
        assert_eq!(uuids(&groups), vec![vec!["a", "b", "c"], vec!["d"]]);
    }

    #[test]
    fn test_coarse_votes_ignore_negative_members() {
        let mut a = seg("a", 0.0, 10.0, Category::Sponsor, ActionType::Skip);
        a.votes = 4;
        let mut b = seg("b", 1.0, 10.0, Category::Sponsor, ActionType::Skip);
        b.votes = -1;
        b.locked = true;

        let groups = group_overlapping(vec![a, b]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].votes, 4);
        assert!(groups[0].locked);
        assert!(!groups[0].required);
    }

    #[test]
    fn test_first_segment_at_zero_opens_group() {
        let groups = group_overlapping(vec![seg("full", 0.0, 0.0, Category::ExclusiveAccess, ActionType::Full)]);
        assert_eq!(groups.len(), 1);
    }

    #[test]
    fn test_empty_input() {
        assert!(group_overlapping(Vec::new()).is_empty());
    }

    #[test]
    fn test_grouping_is_deterministic() {
        let segments = vec![
            seg("a", 0.0, 10.0, Category::Sponsor, ActionType::Skip),
            seg("b", 2.0, 12.0, Category::Sponsor, ActionType::Mute),
            seg("c", 3.0, 11.0, Category::Sponsor, ActionType::Skip),
            seg("d", 9.0, 60.0, Category::Filler, ActionType::Skip),
        ];
        let thresholds = OverlapThresholds::default();

        let first = split_percent_overlap(group_overlapping(segments.clone()), &thresholds);
        let second = split_percent_overlap(group_overlapping(segments), &thresholds);
        assert_eq!(uuids(&first), uuids(&second));
    }

    #[test]
    fn test_touching_segments_of_different_categories_split() {
        let segments = vec![
            seg("intro", 0.0, 12.0, Category::Intro, ActionType::Skip),
            seg("sponsor", 10.0, 90.0, Category::Sponsor, ActionType::Skip),
        ];
        let groups = split_percent_overlap(group_overlapping(segments), &OverlapThresholds::default());
        assert_eq!(uuids(&groups), vec![vec!["intro"], vec!["sponsor"]]);
    }

    #[test]
    fn test_different_categories_never_merge_even_when_identical() {
        let segments = vec![
            seg("a", 0.0, 30.0, Category::Sponsor, ActionType::Skip),
            seg("b", 0.0, 30.0, Category::Selfpromo, ActionType::Skip),
        ];
        let groups = split_percent_overlap(group_overlapping(segments), &OverlapThresholds::default());
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_same_action_needs_ten_percent() {
        let thresholds = OverlapThresholds::default();
        // 10 of 100 seconds shared
        let a = seg("a", 0.0, 55.0, Category::Sponsor, ActionType::Skip);
        let b = seg("b", 45.0, 100.0, Category::Sponsor, ActionType::Skip);
        assert!((overlap_fraction(&a, &b) - 0.1).abs() < 1e-9);
        assert_eq!(split_percent_overlap(group_overlapping(vec![a, b]), &thresholds).len(), 1);

        let a = seg("a", 0.0, 54.0, Category::Sponsor, ActionType::Skip);
        let b = seg("b", 46.0, 100.0, Category::Sponsor, ActionType::Skip);
        assert_eq!(split_percent_overlap(group_overlapping(vec![a, b]), &thresholds).len(), 2);
    }

    #[test]
    fn test_cross_action_needs_sixty_percent() {
        let thresholds = OverlapThresholds::default();
        let skip = seg("skip", 0.0, 100.0, Category::Sponsor, ActionType::Skip);

        let mute = seg("mute", 20.0, 80.0, Category::Sponsor, ActionType::Mute);
        assert_eq!(
            split_percent_overlap(group_overlapping(vec![skip.clone(), mute]), &thresholds).len(),
            1
        );

        let mute = seg("mute", 50.0, 100.0, Category::Sponsor, ActionType::Mute);
        assert_eq!(split_percent_overlap(group_overlapping(vec![skip, mute]), &thresholds).len(), 2);
    }

    #[test]
    fn test_chapters_need_eighty_percent() {
        let thresholds = OverlapThresholds::default();
        let a = seg("a", 0.0, 100.0, Category::Chapter, ActionType::Chapter);

        let b = seg("b", 10.0, 100.0, Category::Chapter, ActionType::Chapter);
        assert_eq!(split_percent_overlap(group_overlapping(vec![a.clone(), b]), &thresholds).len(), 1);

        let b = seg("b", 30.0, 100.0, Category::Chapter, ActionType::Chapter);
        assert_eq!(split_percent_overlap(group_overlapping(vec![a, b]), &thresholds).len(), 2);
    }

    #[test]
    fn test_points_and_full_video_stay_alone() {
        let segments = vec![
            seg("full-1", 0.0, 0.0, Category::ExclusiveAccess, ActionType::Full),
            seg("full-2", 0.0, 0.0, Category::ExclusiveAccess, ActionType::Full),
            seg("sponsor", 0.0, 60.0, Category::Sponsor, ActionType::Skip),
            seg("poi-1", 30.0, 30.0, Category::PoiHighlight, ActionType::Poi),
            seg("poi-2", 30.0, 30.0, Category::PoiHighlight, ActionType::Poi),
        ];
        let groups = split_percent_overlap(group_overlapping(segments), &OverlapThresholds::default());
        assert_eq!(groups.len(), 5);
        assert!(groups.iter().all(|g| g.segments.len() == 1));
    }

    #[test]
    fn test_chained_similarity_joins_group() {
        let segments = vec![
            seg("a", 0.0, 10.0, Category::Sponsor, ActionType::Skip),
            seg("b", 8.0, 20.0, Category::Sponsor, ActionType::Skip),
            seg("c", 17.0, 30.0, Category::Sponsor, ActionType::Skip),
        ];
        let groups = split_percent_overlap(group_overlapping(segments), &OverlapThresholds::default());
        // c is similar to b only, which is enough
        assert_eq!(uuids(&groups), vec![vec!["a", "b", "c"]]);
    }

    #[test]
    fn test_custom_thresholds_are_honoured() {
        let thresholds = OverlapThresholds {
            same_action: 0.9,
            ..Default::default()
        };
        let segments = vec![
            seg("a", 0.0, 10.0, Category::Sponsor, ActionType::Skip),
            seg("b", 2.0, 10.0, Category::Sponsor, ActionType::Skip),
        ];
        assert_eq!(split_percent_overlap(group_overlapping(segments), &thresholds).len(), 2);
    }

    #[test]
    fn test_required_beats_locked() {
        let mut locked = seg("locked", 0.0, 30.0, Category::Sponsor, ActionType::Skip);
        locked.locked = true;
        locked.reputation = 10.0;
        let mut required = seg("required", 1.0, 30.0, Category::Sponsor, ActionType::Skip);
        required.required = true;
        required.reputation = 2.0;

        let mut groups = split_percent_overlap(group_overlapping(vec![locked, required]), &OverlapThresholds::default());
        finalize_groups(&mut groups);

        assert_eq!(uuids(&groups), vec![vec!["required"]]);
        // Sum over both members, averaged over the single survivor
        assert_eq!(groups[0].reputation, 12.0);
    }

    #[test]
    fn test_locked_filters_unlocked() {
        let mut locked = seg("locked", 0.0, 30.0, Category::Sponsor, ActionType::Skip);
        locked.locked = true;
        let unlocked = seg("unlocked", 1.0, 30.0, Category::Sponsor, ActionType::Skip);

        let mut groups = split_percent_overlap(group_overlapping(vec![locked, unlocked]), &OverlapThresholds::default());
        finalize_groups(&mut groups);
        assert_eq!(uuids(&groups), vec![vec!["locked"]]);
    }

    struct FixedReputation(HashMap<String, f64>);

    #[async_trait]
    impl ReputationLookup for FixedReputation {
        async fn reputation(&self, user_id: &str) -> AppResult<f64> {
            self.0
                .get(user_id)
                .copied()
                .ok_or_else(|| AppError::internal("no such user"))
        }
    }

    #[tokio::test]
    async fn test_live_reputation_only_lowers() {
        let lookup = FixedReputation(HashMap::from([
            ("gained".to_string(), 50.0),
            ("lost".to_string(), -2.0),
        ]));

        let mut gained = seg("a", 0.0, 10.0, Category::Sponsor, ActionType::Skip);
        gained.user_id = "gained".to_string();
        gained.reputation = 3.0;
        let mut lost = seg("b", 20.0, 30.0, Category::Sponsor, ActionType::Skip);
        lost.user_id = "lost".to_string();
        lost.reputation = 3.0;
        let mut unknown = seg("c", 40.0, 50.0, Category::Sponsor, ActionType::Skip);
        unknown.user_id = "missing".to_string();
        unknown.reputation = 1.5;

        let mut segments = vec![gained, lost, unknown];
        apply_live_reputation(&mut segments, &lookup, 2).await;

        assert_eq!(segments[0].reputation, 3.0);
        assert_eq!(segments[1].reputation, -2.0);
        assert_eq!(segments[2].reputation, 1.5);
    }

    #[tokio::test]
    async fn test_zero_live_reputation_keeps_snapshot() {
        let lookup = FixedReputation(HashMap::from([("new".to_string(), 0.0)]));

        let mut boosted = seg("a", 0.0, 10.0, Category::Sponsor, ActionType::Skip);
        boosted.user_id = "new".to_string();
        boosted.reputation = 5.0;
        let mut negative = seg("b", 20.0, 30.0, Category::Sponsor, ActionType::Skip);
        negative.user_id = "new".to_string();
        negative.reputation = -1.0;

        let mut segments = vec![boosted, negative];
        apply_live_reputation(&mut segments, &lookup, 2).await;

        assert_eq!(segments[0].reputation, 5.0);
        assert_eq!(segments[1].reputation, -1.0);
    }

    #[tokio::test]
    async fn test_build_without_lookup_keeps_snapshots() {
        let mut a = seg("a", 0.0, 10.0, Category::Sponsor, ActionType::Skip);
        a.user_id = "someone".to_string();
        a.reputation = 4.0;

        let groups = build_segment_groups(vec![a], None, 4, &OverlapThresholds::default()).await;
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].reputation, 4.0);
    }
}
