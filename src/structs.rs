use std::cmp::Ordering;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{ActionType, Category, DbSegment};

#[derive(Serialize, Deserialize, Clone, Debug, ToSchema)]
pub struct VideoSegments {
    #[serde(rename = "videoID")]
    pub video_id: String,
    pub hash: String,
    pub segments: Vec<Segment>,
}

#[derive(Serialize, Deserialize, Clone, Debug, ToSchema)]
pub struct Segment {
    pub cid: String,
    pub category: Category,
    #[serde(rename = "actionType")]
    pub action_type: ActionType,
    pub segment: Vec<f64>,
    #[serde(rename = "UUID")]
    pub uuid: String,
    #[serde(rename = "videoDuration")]
    pub video_duration: f64,
    pub locked: i32,
    pub votes: i32,
    pub description: String,
}

impl From<&DbSegment> for Segment {
    fn from(segment: &DbSegment) -> Self {
        Segment {
            cid: segment.cid.clone(),
            category: segment.category,
            action_type: segment.action_type,
            segment: vec![segment.start_time, segment.end_time],
            uuid: segment.uuid.clone(),
            video_duration: segment.video_duration,
            locked: segment.locked as i32,
            votes: segment.votes,
            description: segment.description.clone(),
        }
    }
}

impl PartialEq for Segment {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid
    }
}

impl PartialOrd for Segment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.segment[0].partial_cmp(&other.segment[0])
    }
}

/// The full-video label of a video.
#[derive(Serialize, Deserialize, Clone, Debug, ToSchema)]
pub struct VideoLabel {
    pub cid: String,
    pub category: Category,
    #[serde(rename = "UUID")]
    pub uuid: String,
    pub locked: i32,
    pub votes: i32,
    #[serde(rename = "videoDuration")]
    pub video_duration: f64,
}

impl From<&DbSegment> for VideoLabel {
    fn from(segment: &DbSegment) -> Self {
        VideoLabel {
            cid: segment.cid.clone(),
            category: segment.category,
            uuid: segment.uuid.clone(),
            locked: segment.locked as i32,
            votes: segment.votes,
            video_duration: segment.video_duration,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, ToSchema)]
pub struct VideoLabels {
    #[serde(rename = "videoID")]
    pub video_id: String,
    pub hash: String,
    pub segments: Vec<VideoLabel>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct VipResponse {
    #[serde(rename = "hashedUserID")]
    pub hashed_user_id: String,
    pub vip: bool,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub checks: HealthChecks,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthChecks {
    pub database: HealthCheck,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthCheck {
    pub status: String,
    pub message: Option<String>,
    pub response_time_ms: Option<u64>,
}
