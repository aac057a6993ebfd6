use std::time::Duration;

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};

use crate::cache::{reputation_key, QueryCache};
use crate::error::{AppError, AppResult};

/// Live trust score of a submitter. Negative for users whose submissions are
/// mostly rejected, zero when there is not enough history.
#[async_trait]
pub trait ReputationLookup: Send + Sync {
    async fn reputation(&self, user_id: &str) -> AppResult<f64>;
}

#[derive(Debug, Default, Clone, FromRow)]
pub struct ReputationMetrics {
    #[sqlx(rename = "totalSubmissions")]
    pub total_submissions: i64,
    #[sqlx(rename = "downvotedSubmissions")]
    pub downvoted_submissions: i64,
    #[sqlx(rename = "upvotedSum")]
    pub upvoted_sum: i64,
    #[sqlx(rename = "lockedSum")]
    pub locked_sum: i64,
}

fn convert_range(value: f64, current_min: f64, current_max: f64, target_min: f64, target_max: f64) -> f64 {
    let current_range = current_max - current_min;
    let target_range = target_max - target_min;
    ((value - current_min) / current_range) * target_range + target_min
}

pub fn calculate_reputation(metrics: &ReputationMetrics) -> f64 {
    if metrics.total_submissions < 5 {
        return 0.0;
    }

    let downvote_ratio = metrics.downvoted_submissions as f64 / metrics.total_submissions as f64;
    if downvote_ratio > 0.3 {
        return convert_range(downvote_ratio.min(0.7), 0.3, 0.7, -0.5, -2.5);
    }

    if metrics.upvoted_sum < 5 {
        return 0.0;
    }

    convert_range((metrics.upvoted_sum as f64).min(150.0), 5.0, 150.0, 0.0, 7.0)
        + convert_range((metrics.locked_sum as f64).min(50.0), 0.0, 50.0, 0.0, 20.0)
}

pub struct PgReputation {
    pool: PgPool,
    cache: QueryCache,
    ttl: Option<Duration>,
}

impl PgReputation {
    pub fn new(pool: PgPool, cache: QueryCache, ttl: Option<Duration>) -> Self {
        Self { pool, cache, ttl }
    }

    async fn fetch_metrics(&self, user_id: &str) -> AppResult<ReputationMetrics> {
        let metrics = sqlx::query_as::<_, ReputationMetrics>(
            r#"SELECT COUNT(*) AS "totalSubmissions",
                  COALESCE(SUM(CASE WHEN "votes" < 0 THEN 1 ELSE 0 END), 0)::BIGINT AS "downvotedSubmissions",
                  COALESCE(SUM(CASE WHEN "votes" > 0 THEN "votes" ELSE 0 END), 0)::BIGINT AS "upvotedSum",
                  COALESCE(SUM("locked"), 0)::BIGINT AS "lockedSum"
               FROM "sponsorTimes" WHERE "userID" = $1"#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(metrics)
    }
}

#[async_trait]
impl ReputationLookup for PgReputation {
    async fn reputation(&self, user_id: &str) -> AppResult<f64> {
        self.cache
            .get_or_compute(&reputation_key(user_id), self.ttl, || async {
                let metrics = self.fetch_metrics(user_id).await?;
                Ok::<_, AppError>(calculate_reputation(&metrics))
            })
            .await
    }
}
