use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    #[default]
    Sponsor,
    Selfpromo,
    Interaction,
    Intro,
    Outro,
    Preview,
    MusicOfftopic,
    PoiHighlight,
    Filler,
    ExclusiveAccess,
    Chapter,
}

impl Category {
    /// Categories returned when a client does not ask for specific ones.
    pub const DEFAULTS: [Category; 10] = [
        Category::Sponsor,
        Category::Selfpromo,
        Category::Interaction,
        Category::Intro,
        Category::Outro,
        Category::Preview,
        Category::MusicOfftopic,
        Category::PoiHighlight,
        Category::Filler,
        Category::ExclusiveAccess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Sponsor => "sponsor",
            Category::Selfpromo => "selfpromo",
            Category::Interaction => "interaction",
            Category::Intro => "intro",
            Category::Outro => "outro",
            Category::Preview => "preview",
            Category::MusicOfftopic => "music_offtopic",
            Category::PoiHighlight => "poi_highlight",
            Category::Filler => "filler",
            Category::ExclusiveAccess => "exclusive_access",
            Category::Chapter => "chapter",
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sponsor" => Ok(Category::Sponsor),
            "selfpromo" => Ok(Category::Selfpromo),
            "interaction" => Ok(Category::Interaction),
            "intro" => Ok(Category::Intro),
            "outro" => Ok(Category::Outro),
            "preview" => Ok(Category::Preview),
            "music_offtopic" => Ok(Category::MusicOfftopic),
            "poi_highlight" => Ok(Category::PoiHighlight),
            "filler" => Ok(Category::Filler),
            "exclusive_access" => Ok(Category::ExclusiveAccess),
            "chapter" => Ok(Category::Chapter),
            other => Err(format!("unknown category: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    #[default]
    Skip,
    Mute,
    Full,
    Poi,
    Chapter,
}

impl ActionType {
    /// Action types returned when a client does not ask for specific ones.
    pub const DEFAULTS: [ActionType; 4] = [ActionType::Skip, ActionType::Mute, ActionType::Full, ActionType::Poi];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Skip => "skip",
            ActionType::Mute => "mute",
            ActionType::Full => "full",
            ActionType::Poi => "poi",
            ActionType::Chapter => "chapter",
        }
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skip" => Ok(ActionType::Skip),
            "mute" => Ok(ActionType::Mute),
            "full" => Ok(ActionType::Full),
            "poi" => Ok(ActionType::Poi),
            "chapter" => Ok(ActionType::Chapter),
            other => Err(format!("unknown action type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
pub enum Service {
    #[default]
    YouTube,
    PeerTube,
}

impl Service {
    pub const ALL: [Service; 2] = [Service::YouTube, Service::PeerTube];

    pub fn as_str(&self) -> &'static str {
        match self {
            Service::YouTube => "YouTube",
            Service::PeerTube => "PeerTube",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Service {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Clients are inconsistent about casing here
        match s.to_lowercase().as_str() {
            "youtube" => Ok(Service::YouTube),
            "peertube" => Ok(Service::PeerTube),
            other => Err(format!("unknown service: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HiddenType {
    #[default]
    Show,
    Hidden,
    MismatchHidden,
}

impl HiddenType {
    pub fn as_i32(&self) -> i32 {
        match self {
            HiddenType::Show => 0,
            HiddenType::Hidden => 1,
            HiddenType::MismatchHidden => 2,
        }
    }
}

impl TryFrom<i32> for HiddenType {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(HiddenType::Show),
            1 => Ok(HiddenType::Hidden),
            2 => Ok(HiddenType::MismatchHidden),
            other => Err(format!("unknown hidden value: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Visible,
    ShadowHidden,
}

impl TryFrom<i32> for Visibility {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Visibility::Visible),
            1 => Ok(Visibility::ShadowHidden),
            other => Err(format!("unknown shadowHidden value: {}", other)),
        }
    }
}

// Segments can be fetched either by full video ID, or by prefix of hashed
// video ID. Different clients make different queries. This represents either
// kind of constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoName {
    ByHashPrefix(String),
    ByID(String),
}

#[derive(Debug, FromRow)]
pub struct SponsorTime {
    #[sqlx(rename = "videoID")]
    pub video_id: String,
    pub cid: String,
    #[sqlx(rename = "startTime")]
    pub start_time: f32,
    #[sqlx(rename = "endTime")]
    pub end_time: f32,
    pub votes: i32,
    pub locked: i32,
    #[sqlx(rename = "UUID")]
    pub uuid: String,
    #[sqlx(rename = "userID")]
    pub user_id: String,
    pub category: String,
    #[sqlx(rename = "actionType")]
    pub action_type: String,
    #[sqlx(rename = "videoDuration")]
    pub video_duration: f32,
    pub hidden: i32,
    pub reputation: f32,
    #[sqlx(rename = "shadowHidden")]
    pub shadow_hidden: i32,
    #[sqlx(rename = "hashedVideoID")]
    pub hashed_video_id: String,
    #[sqlx(rename = "timeSubmitted")]
    pub time_submitted: i64,
    pub description: String,
}

/// A stored segment with its enums validated, as consumed by the selection
/// pipeline. `required` is never stored; it is set per request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DbSegment {
    pub video_id: String,
    pub cid: String,
    pub start_time: f64,
    pub end_time: f64,
    pub votes: i32,
    pub locked: bool,
    pub uuid: String,
    pub user_id: String,
    pub category: Category,
    pub action_type: ActionType,
    pub video_duration: f64,
    pub hidden: HiddenType,
    pub reputation: f64,
    pub shadow_hidden: Visibility,
    pub hashed_video_id: String,
    pub time_submitted: i64,
    pub description: String,
    pub required: bool,
}

impl TryFrom<SponsorTime> for DbSegment {
    type Error = String;

    fn try_from(row: SponsorTime) -> Result<Self, Self::Error> {
        Ok(DbSegment {
            category: row.category.parse()?,
            action_type: row.action_type.parse()?,
            hidden: HiddenType::try_from(row.hidden)?,
            shadow_hidden: Visibility::try_from(row.shadow_hidden)?,
            video_id: row.video_id,
            cid: row.cid,
            start_time: row.start_time as f64,
            end_time: row.end_time as f64,
            votes: row.votes,
            locked: row.locked != 0,
            uuid: row.uuid,
            user_id: row.user_id,
            video_duration: row.video_duration as f64,
            reputation: row.reputation as f64,
            hashed_video_id: row.hashed_video_id,
            time_submitted: row.time_submitted,
            description: row.description,
            required: false,
        })
    }
}
