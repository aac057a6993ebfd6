use std::time::Instant;

use actix_web::{web, HttpRequest, HttpResponse};
use lazy_static::lazy_static;
use tracing::{info, warn};
use utoipa::OpenApi;

use crate::error::{AppError, AppResult};
use crate::models::{ActionType, Category, Service};
use crate::params::parse_skip_segments;
use crate::service::RequesterContext;
use crate::state::AppState;
use crate::structs::{
    HealthCheck, HealthChecks, HealthResponse, MessageResponse, Segment, VideoLabel, VideoLabels, VideoSegments,
    VipResponse,
};

// init regexes to match hash/hex, video ID or sub-part ID
lazy_static! {
    static ref HASH_RE: regex::Regex = regex::Regex::new(r"^[0-9a-f]{4,32}$").unwrap();
    static ref ID_RE: regex::Regex = regex::Regex::new(r"^BV[0-9A-Za-z]{10}$").unwrap();
    static ref CID_RE: regex::Regex = regex::Regex::new(r"^[0-9]{1,20}$").unwrap();
}

#[derive(OpenApi)]
#[openapi(
    paths(
        skip_segments_by_id,
        skip_segments_by_hash,
        video_labels_by_id,
        video_labels_by_hash,
        clear_cache,
        is_user_vip,
        health_check
    ),
    components(schemas(
        Segment,
        VideoSegments,
        VideoLabel,
        VideoLabels,
        Category,
        ActionType,
        Service,
        VipResponse,
        MessageResponse,
        HealthResponse,
        HealthChecks,
        HealthCheck
    ))
)]
pub struct ApiDoc;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/api/skipSegments/{prefix}", web::get().to(skip_segments_by_hash))
        .route("/api/skipSegments", web::get().to(skip_segments_by_id))
        .route("/api/videoLabels/{prefix}", web::get().to(video_labels_by_hash))
        .route("/api/videoLabels", web::get().to(video_labels_by_id))
        .route("/api/clearCache", web::post().to(clear_cache))
        .route("/api/isUserVIP", web::get().to(is_user_vip));
}

fn query_pairs(req: &HttpRequest) -> AppResult<Vec<(String, String)>> {
    web::Query::<Vec<(String, String)>>::from_query(req.query_string())
        .map(|query| query.into_inner())
        .map_err(|e| AppError::bad_request(e.to_string()))
}

fn param<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

// Shadow-hidden segments are matched against this; without an address the
// requester simply never sees them.
async fn requester_context(req: &HttpRequest, state: &AppState) -> RequesterContext {
    let ip = req.connection_info().realip_remote_addr().map(|ip| ip.to_string());
    let hashed_ip = match ip {
        Some(ip) => match state.segments.hashed_ip(&ip, &state.global_salt).await {
            Ok(hashed) => Some(hashed),
            Err(e) => {
                warn!("Failed to hash requester IP: {}", e);
                None
            }
        },
        None => None,
    };

    RequesterContext { hashed_ip }
}

#[utoipa::path(
    get,
    path = "/api/skipSegments",
    params(
        ("videoID" = String, Query, description = "Video ID"),
        ("cid" = Option<String>, Query, description = "Sub-part ID"),
        ("categories" = Option<String>, Query, description = "JSON array of categories"),
        ("actionTypes" = Option<String>, Query, description = "JSON array of action types"),
        ("requiredSegments" = Option<String>, Query, description = "JSON array of UUIDs or UUID prefixes"),
        ("service" = Option<String>, Query, description = "Video service")
    ),
    responses(
        (status = 200, description = "Chosen segments", body = [Segment]),
        (status = 400, description = "Invalid parameters"),
        (status = 404, description = "No segments")
    )
)]
pub async fn skip_segments_by_id(req: HttpRequest, state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let pairs = query_pairs(&req)?;

    let video_id = match param(&pairs, "videoID") {
        Some(id) => id,
        None => return Err(AppError::bad_request("videoID not specified")),
    };

    // Check if ID matches ID regex
    if !ID_RE.is_match(video_id) {
        return Err(AppError::bad_request("videoID does not match format requirements"));
    }

    let cid = param(&pairs, "cid").filter(|cid| !cid.is_empty());
    if cid.is_some_and(|cid| !CID_RE.is_match(cid)) {
        return Err(AppError::bad_request("cid does not match format requirements"));
    }

    let query = match parse_skip_segments(&pairs) {
        Ok(query) => query,
        Err(errors) => return Ok(HttpResponse::BadRequest().json(errors)),
    };

    let requester = requester_context(&req, &state).await;
    let segments = state
        .segments
        .select_segments(video_id, cid, &query, &requester)
        .await?;

    if segments.is_empty() {
        return Err(AppError::not_found("Not Found"));
    }

    Ok(HttpResponse::Ok().json(&segments))
}

#[utoipa::path(
    get,
    path = "/api/skipSegments/{prefix}",
    params(
        ("prefix" = String, Path, description = "Leading hex characters of sha256(videoID)"),
        ("categories" = Option<String>, Query, description = "JSON array of categories"),
        ("actionTypes" = Option<String>, Query, description = "JSON array of action types"),
        ("requiredSegments" = Option<String>, Query, description = "JSON array of UUIDs or UUID prefixes"),
        ("service" = Option<String>, Query, description = "Video service")
    ),
    responses(
        (status = 200, description = "Chosen segments per matching video", body = [VideoSegments]),
        (status = 400, description = "Invalid parameters"),
        (status = 404, description = "No matching videos", body = [VideoSegments])
    )
)]
pub async fn skip_segments_by_hash(
    req: HttpRequest,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let hash = path.into_inner().to_lowercase();

    // Check if hash matches hex regex
    if !HASH_RE.is_match(&hash) {
        return Err(AppError::bad_request("Hash prefix does not match format requirements."));
    }

    let pairs = query_pairs(&req)?;
    let query = match parse_skip_segments(&pairs) {
        Ok(query) => query,
        Err(errors) => return Ok(HttpResponse::BadRequest().json(errors)),
    };

    let requester = requester_context(&req, &state).await;
    let videos = state.segments.segments_by_hash(&hash, &query, &requester).await?;

    if videos.is_empty() {
        return Ok(HttpResponse::NotFound().json(&videos));
    }

    Ok(HttpResponse::Ok().json(&videos))
}

fn service_param(pairs: &[(String, String)]) -> Service {
    param(pairs, "service")
        .and_then(|s| s.parse::<Service>().ok())
        .unwrap_or_default()
}

#[utoipa::path(
    get,
    path = "/api/videoLabels",
    params(
        ("videoID" = String, Query, description = "Video ID"),
        ("service" = Option<String>, Query, description = "Video service")
    ),
    responses(
        (status = 200, description = "The video's full-video label", body = [VideoLabel]),
        (status = 400, description = "Missing videoID"),
        (status = 404, description = "No label")
    )
)]
pub async fn video_labels_by_id(req: HttpRequest, state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let pairs = query_pairs(&req)?;
    let video_id = param(&pairs, "videoID")
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::bad_request("videoID not specified"))?;

    let labels = state.segments.video_labels(video_id, service_param(&pairs)).await?;
    if labels.is_empty() {
        return Err(AppError::not_found("Not Found"));
    }

    Ok(HttpResponse::Ok().json(&labels))
}

#[utoipa::path(
    get,
    path = "/api/videoLabels/{prefix}",
    params(
        ("prefix" = String, Path, description = "Leading hex characters of sha256(videoID)"),
        ("service" = Option<String>, Query, description = "Video service")
    ),
    responses(
        (status = 200, description = "Labels per matching video", body = [VideoLabels]),
        (status = 400, description = "Invalid prefix"),
        (status = 404, description = "No labelled videos", body = [VideoLabels])
    )
)]
pub async fn video_labels_by_hash(
    req: HttpRequest,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let hash = path.into_inner().to_lowercase();
    if !HASH_RE.is_match(&hash) {
        return Err(AppError::bad_request("Hash prefix does not match format requirements."));
    }

    let pairs = query_pairs(&req)?;
    let videos = state.segments.video_labels_by_hash(&hash, service_param(&pairs)).await?;
    if videos.is_empty() {
        return Ok(HttpResponse::NotFound().json(&videos));
    }

    Ok(HttpResponse::Ok().json(&videos))
}

#[utoipa::path(
    post,
    path = "/api/clearCache",
    params(
        ("videoID" = String, Query, description = "Video whose cached segments are dropped"),
        ("userID" = String, Query, description = "Private user ID of a VIP"),
        ("service" = Option<String>, Query, description = "Video service")
    ),
    responses(
        (status = 200, description = "Cache cleared", body = MessageResponse),
        (status = 400, description = "Missing fields"),
        (status = 403, description = "Not a VIP", body = MessageResponse)
    )
)]
pub async fn clear_cache(req: HttpRequest, state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let pairs = query_pairs(&req)?;
    let video_id = param(&pairs, "videoID");
    let user_id = param(&pairs, "userID");
    let service = service_param(&pairs);

    let (video_id, user_id) = match (video_id, user_id) {
        (Some(video_id), Some(user_id)) => (video_id, user_id),
        (video_id, _) => {
            let mut invalid = Vec::new();
            if video_id.is_none() {
                invalid.push("videoID");
            }
            if user_id.is_none() {
                invalid.push("userID");
            }
            return Err(AppError::bad_request(format!("No valid {} field(s) provided", invalid.join(", "))));
        }
    };

    // hash the userID as early as possible
    let hashed_user_id = state.segments.hashed_user_id(user_id).await?;

    if !state.segments.is_user_vip(&hashed_user_id).await? {
        warn!("Permission violation: User {} attempted to clear cache for video {}.", hashed_user_id, video_id);
        return Ok(HttpResponse::Forbidden().json(MessageResponse {
            message: "Not a VIP".to_string(),
        }));
    }

    state.segments.clear_segment_cache(video_id, service).await;
    info!("Cache cleared on video {} by {}", video_id, hashed_user_id);

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: format!("Cache cleared on video {}", video_id),
    }))
}

#[utoipa::path(
    get,
    path = "/api/isUserVIP",
    params(("userID" = String, Query, description = "Private user ID")),
    responses(
        (status = 200, description = "VIP status", body = VipResponse),
        (status = 400, description = "Missing userID")
    )
)]
pub async fn is_user_vip(req: HttpRequest, state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let pairs = query_pairs(&req)?;
    let user_id = param(&pairs, "userID").ok_or_else(|| AppError::bad_request("No userID provided"))?;

    let hashed_user_id = state.segments.hashed_user_id(user_id).await?;
    let vip = state.segments.is_user_vip(&hashed_user_id).await?;

    Ok(HttpResponse::Ok().json(VipResponse { hashed_user_id, vip }))
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service healthy", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse)
    )
)]
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let start = Instant::now();
    let database = match state.segments.repository().ping().await {
        Ok(()) => HealthCheck {
            status: "healthy".to_string(),
            message: None,
            response_time_ms: Some(start.elapsed().as_millis() as u64),
        },
        Err(e) => HealthCheck {
            status: "unhealthy".to_string(),
            message: Some(e.to_string()),
            response_time_ms: None,
        },
    };

    let healthy = database.status == "healthy";
    let response = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        checks: HealthChecks { database },
    };

    if healthy {
        HttpResponse::Ok().json(response)
    } else {
        HttpResponse::ServiceUnavailable().json(response)
    }
}
