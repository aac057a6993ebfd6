use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::grouping::OverlapThresholds;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub private_database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub workers: usize,
    pub log_level: String,
    pub metrics_namespace: String,
    pub global_salt: String,
    pub use_cache_for_segment_groups: bool,
    pub segment_groups_ttl_seconds: u64,
    pub reputation_ttl_seconds: u64,
    pub cache_max_capacity: u64,
    pub shadow_hide_timeout_ms: u64,
    pub reputation_concurrency: usize,
    pub overlap_thresholds: OverlapThresholds,
}

/// The knobs the selection pipeline reads at request time.
#[derive(Debug, Clone)]
pub struct SelectionSettings {
    pub use_cache_for_segment_groups: bool,
    pub segment_groups_ttl: Option<Duration>,
    pub shadow_hide_timeout: Duration,
    pub reputation_concurrency: usize,
    pub overlap_thresholds: OverlapThresholds,
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self {
            use_cache_for_segment_groups: true,
            segment_groups_ttl: Some(Duration::from_secs(3600)),
            shadow_hide_timeout: Duration::from_millis(150),
            reputation_concurrency: 16,
            overlap_thresholds: OverlapThresholds::default(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: &str) -> Result<T, String> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse::<T>()
        .map_err(|_| format!("{} must be a valid value", key))
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL environment variable must be set".to_string())?;

        let private_database_url = env::var("PRIVATE_DATABASE_URL")
            .unwrap_or_else(|_| database_url.clone());

        let server_host = env::var("SERVER_HOST")
            .unwrap_or_else(|_| "0.0.0.0".to_string());

        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .map_err(|_| "SERVER_PORT must be a valid port number".to_string())?;

        let workers = match env::var("WORKERS") {
            Ok(value) => value
                .parse::<usize>()
                .map_err(|_| "WORKERS must be a valid number".to_string())?,
            Err(_) => num_cpus::get(),
        };

        let log_level = env::var("LOG_LEVEL")
            .unwrap_or_else(|_| "sponsorblock_segments=debug,actix_web=info".to_string());

        let metrics_namespace = env::var("METRICS_NAMESPACE")
            .unwrap_or_else(|_| "api".to_string());

        let global_salt = env::var("GLOBAL_SALT").unwrap_or_default();

        let defaults = OverlapThresholds::default();
        let overlap_thresholds = OverlapThresholds {
            same_action: env_or("OVERLAP_SAME_ACTION", &defaults.same_action.to_string())?,
            cross_action: env_or("OVERLAP_CROSS_ACTION", &defaults.cross_action.to_string())?,
            chapter: env_or("OVERLAP_CHAPTER", &defaults.chapter.to_string())?,
        };

        Ok(Config {
            database_url,
            private_database_url,
            server_host,
            server_port,
            workers,
            log_level,
            metrics_namespace,
            global_salt,
            use_cache_for_segment_groups: env_or("USE_CACHE_FOR_SEGMENT_GROUPS", "true")?,
            segment_groups_ttl_seconds: env_or("SEGMENT_GROUPS_TTL_SECONDS", "3600")?,
            reputation_ttl_seconds: env_or("REPUTATION_TTL_SECONDS", "600")?,
            cache_max_capacity: env_or("CACHE_MAX_CAPACITY", "100000")?,
            shadow_hide_timeout_ms: env_or("SHADOW_HIDE_TIMEOUT_MS", "150")?,
            reputation_concurrency: env_or("REPUTATION_CONCURRENCY", "16")?,
            overlap_thresholds,
        })
    }

    pub fn server_bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn reputation_ttl(&self) -> Option<Duration> {
        ttl_from_secs(self.reputation_ttl_seconds)
    }

    pub fn selection_settings(&self) -> SelectionSettings {
        SelectionSettings {
            use_cache_for_segment_groups: self.use_cache_for_segment_groups,
            segment_groups_ttl: ttl_from_secs(self.segment_groups_ttl_seconds),
            shadow_hide_timeout: Duration::from_millis(self.shadow_hide_timeout_ms),
            reputation_concurrency: self.reputation_concurrency.max(1),
            overlap_thresholds: self.overlap_thresholds.clone(),
        }
    }
}

// 0 means "keep until invalidated"
fn ttl_from_secs(secs: u64) -> Option<Duration> {
    if secs == 0 {
        None
    } else {
        Some(Duration::from_secs(secs))
    }
}
