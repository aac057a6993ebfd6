//! Storage collaborators of the selection pipeline.
//!
//! The public database holds segments and VIP users; the private database
//! holds the IP hashes submissions were made from.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::warn;

use crate::error::AppResult;
use crate::models::{DbSegment, HiddenType, Service, SponsorTime, VideoName};

#[async_trait]
pub trait SegmentRepository: Send + Sync {
    /// All stored segments for a video (or hash prefix), ordered by start
    /// time then end time.
    async fn fetch_segments(&self, name: &VideoName, service: Service) -> AppResult<Vec<DbSegment>>;

    async fn hide_segments_by_uuid(&self, uuids: &[String], hidden: HiddenType) -> AppResult<u64>;

    async fn update_votes(&self, votes: &[(String, i32)]) -> AppResult<u64>;

    async fn lock_segments(&self, uuids: &[String], locked: bool) -> AppResult<u64>;

    async fn is_user_vip(&self, hashed_user_id: &str) -> AppResult<bool>;

    async fn ping(&self) -> AppResult<()>;

    fn is_overloaded(&self) -> bool {
        false
    }
}

#[async_trait]
pub trait ShadowHideStore: Send + Sync {
    async fn submitter_ip_hashes(&self, video_id: &str, time_submitted: i64, service: Service) -> AppResult<Vec<String>>;

    fn is_overloaded(&self) -> bool {
        false
    }
}

// A pool with every connection checked out counts as overloaded.
pub(crate) fn pool_overloaded(pool: &PgPool) -> bool {
    pool.size() >= pool.options().get_max_connections() && pool.num_idle() == 0
}

const SEGMENT_COLUMNS: &str = r#""videoID", "cid", "startTime", "endTime", "votes", "locked", "UUID", "userID", "category", "actionType", "videoDuration", "hidden", "reputation", "shadowHidden", "hashedVideoID", "timeSubmitted", "description""#;

#[derive(Clone)]
pub struct PgSegmentRepository {
    pool: PgPool,
}

impl PgSegmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SegmentRepository for PgSegmentRepository {
    async fn fetch_segments(&self, name: &VideoName, service: Service) -> AppResult<Vec<DbSegment>> {
        let (condition, value) = match name {
            VideoName::ByHashPrefix(hash_prefix) => (r#""hashedVideoID" LIKE $1"#, format!("{}%", hash_prefix)),
            VideoName::ByID(video_id) => (r#""videoID" = $1"#, video_id.clone()),
        };
        let sql = format!(
            r#"SELECT {} FROM "sponsorTimes"
               WHERE {} AND "service" = $2
               ORDER BY "startTime", "endTime""#,
            SEGMENT_COLUMNS, condition
        );

        let rows: Vec<SponsorTime> = sqlx::query_as::<_, SponsorTime>(&sql)
            .bind(value)
            .bind(service.as_str())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let uuid = row.uuid.clone();
                match DbSegment::try_from(row) {
                    Ok(segment) => Some(segment),
                    Err(e) => {
                        warn!("Skipping segment {}: {}", uuid, e);
                        None
                    }
                }
            })
            .collect())
    }

    async fn hide_segments_by_uuid(&self, uuids: &[String], hidden: HiddenType) -> AppResult<u64> {
        if uuids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(r#"UPDATE "sponsorTimes" SET "hidden" = $1 WHERE "UUID" = ANY($2)"#)
            .bind(hidden.as_i32())
            .bind(uuids)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn update_votes(&self, votes: &[(String, i32)]) -> AppResult<u64> {
        if votes.is_empty() {
            return Ok(0);
        }

        let (uuids, counts): (Vec<String>, Vec<i32>) = votes.iter().cloned().unzip();
        let result = sqlx::query(
            r#"UPDATE "sponsorTimes" SET "votes" = f."votes"
               FROM UNNEST($1::TEXT[], $2::INT[]) AS f("UUID", "votes")
               WHERE "sponsorTimes"."UUID" = f."UUID""#,
        )
        .bind(&uuids)
        .bind(&counts)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn lock_segments(&self, uuids: &[String], locked: bool) -> AppResult<u64> {
        if uuids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(r#"UPDATE "sponsorTimes" SET "locked" = $1 WHERE "UUID" = ANY($2)"#)
            .bind(locked as i32)
            .bind(uuids)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn is_user_vip(&self, hashed_user_id: &str) -> AppResult<bool> {
        let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM "vipUsers" WHERE "userID" = $1"#)
            .bind(hashed_user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count > 0)
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn is_overloaded(&self) -> bool {
        pool_overloaded(&self.pool)
    }
}

#[derive(Clone)]
pub struct PgPrivateStore {
    pool: PgPool,
}

impl PgPrivateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ShadowHideStore for PgPrivateStore {
    async fn submitter_ip_hashes(&self, video_id: &str, time_submitted: i64, service: Service) -> AppResult<Vec<String>> {
        let hashes: Vec<String> = sqlx::query_scalar(
            r#"SELECT "hashedIP" FROM "sponsorTimes"
               WHERE "videoID" = $1 AND "timeSubmitted" = $2 AND "service" = $3"#,
        )
        .bind(video_id)
        .bind(time_submitted)
        .bind(service.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(hashes)
    }

    fn is_overloaded(&self) -> bool {
        pool_overloaded(&self.pool)
    }
}
