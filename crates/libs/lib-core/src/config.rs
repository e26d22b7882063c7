//! # Application Configuration
//!
//! Loads every tunable named in §6 of the specification from the environment,
//! validates it once at startup, and exposes it as an immutable [`Config`] passed
//! into every component at construction time (§9: no shared mutable singletons).

use std::env;
use std::sync::OnceLock;
use std::time::Duration;

use lib_utils::{get_env_or, get_env_parse_or};

/// Cache TTL, in seconds, per strategy (§4.2/§6). `cold` and `archive` are not
/// populated here: those strategies never touch the cache.
#[derive(Clone, Debug)]
pub struct CacheTtlConfig {
    pub hot_secs: u64,
    pub warm_secs: u64,
    pub interpolated_secs: u64,
}

/// Interpolation thresholds (§4.4).
#[derive(Clone, Debug)]
pub struct InterpolationConfig {
    pub max_data_points: usize,
    pub max_time_gap_hours: f64,
    pub min_confidence_threshold: f64,
    pub extrapolation_max_change_percent: f64,
}

/// Oracle client tuning (§4.5).
#[derive(Clone, Debug)]
pub struct OracleConfig {
    pub api_key: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub rate_limit_per_second: u32,
    pub batch_size: usize,
    pub request_timeout: Duration,
}

/// Per-queue concurrency and backoff (§4.6).
#[derive(Clone, Debug)]
pub struct QueueLaneConfig {
    pub concurrency: usize,
    pub max_attempts: i32,
    pub base_backoff_ms: u64,
}

#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub price_processing: QueueLaneConfig,
    pub batch_processing: QueueLaneConfig,
}

/// Retention windows, in days (§3/§4.3).
#[derive(Clone, Debug)]
pub struct RetentionConfig {
    pub prices_days: i64,
    pub analytics_days: i64,
    pub cache_stats_days: i64,
    pub archive_threshold_days: i64,
}

/// Cron expressions for the lifecycle manager (§4.7).
#[derive(Clone, Debug)]
pub struct CronConfig {
    pub cache_cleanup: String,
    pub data_archival: String,
    pub cache_warming: String,
    pub cache_warming_enabled: bool,
    pub metrics_collection: String,
    pub metrics_collection_enabled: bool,
    pub db_optimization: String,
    pub daily_historical_fetch: String,
}

/// Top-level, validated application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Namespace prefix for cache keys: `{appName}:price:...` (§4.2).
    pub app_name: String,
    pub database_url: String,
    pub redis_url: String,
    pub bind_address: String,
    pub allowed_origins: Vec<String>,

    pub cache_ttl: CacheTtlConfig,
    pub interpolation: InterpolationConfig,
    pub oracle: OracleConfig,
    pub queue: QueueConfig,
    pub retention: RetentionConfig,
    pub cron: CronConfig,
}

impl Config {
    /// Load configuration from environment variables, applying the documented
    /// defaults for everything but `DATABASE_URL`/`REDIS_URL`/`ALCHEMY_API_KEY`.
    pub fn from_env() -> Result<Self, String> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL must be set in environment".to_string())?;
        let redis_url = env::var("REDIS_URL")
            .map_err(|_| "REDIS_URL must be set in environment".to_string())?;
        let api_key = env::var("ALCHEMY_API_KEY").unwrap_or_default();

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            app_name: get_env_or("APP_NAME", "price-oracle"),
            database_url,
            redis_url,
            bind_address: get_env_or("BIND_ADDRESS", "0.0.0.0:3000"),
            allowed_origins,

            cache_ttl: CacheTtlConfig {
                hot_secs: get_env_parse_or("CACHE_TTL_HOT_SECS", 30),
                warm_secs: get_env_parse_or("CACHE_TTL_WARM_SECS", 3600),
                interpolated_secs: get_env_parse_or("CACHE_TTL_INTERPOLATED_SECS", 900),
            },

            interpolation: InterpolationConfig {
                max_data_points: get_env_parse_or("INTERP_MAX_DATA_POINTS", 10),
                max_time_gap_hours: get_env_parse_or("INTERP_MAX_TIME_GAP_HOURS", 168.0),
                min_confidence_threshold: get_env_parse_or("INTERP_MIN_CONFIDENCE", 0.5),
                extrapolation_max_change_percent: get_env_parse_or(
                    "INTERP_EXTRAPOLATION_MAX_CHANGE_PERCENT",
                    20.0,
                ),
            },

            oracle: OracleConfig {
                api_key,
                max_retries: get_env_parse_or("ORACLE_MAX_RETRIES", 3),
                retry_delay_ms: get_env_parse_or("ORACLE_RETRY_DELAY_MS", 500),
                rate_limit_per_second: get_env_parse_or("ORACLE_RATE_LIMIT_PER_SECOND", 5),
                batch_size: get_env_parse_or("ORACLE_BATCH_SIZE", 10),
                request_timeout: Duration::from_millis(get_env_parse_or(
                    "ORACLE_REQUEST_TIMEOUT_MS",
                    10_000,
                )),
            },

            queue: QueueConfig {
                price_processing: QueueLaneConfig {
                    concurrency: get_env_parse_or("QUEUE_PRICE_CONCURRENCY", 4),
                    max_attempts: get_env_parse_or("QUEUE_PRICE_MAX_ATTEMPTS", 5),
                    base_backoff_ms: get_env_parse_or("QUEUE_PRICE_BASE_BACKOFF_MS", 1000),
                },
                batch_processing: QueueLaneConfig {
                    concurrency: get_env_parse_or("QUEUE_BATCH_CONCURRENCY", 2),
                    max_attempts: get_env_parse_or("QUEUE_BATCH_MAX_ATTEMPTS", 3),
                    base_backoff_ms: get_env_parse_or("QUEUE_BATCH_BASE_BACKOFF_MS", 5000),
                },
            },

            retention: RetentionConfig {
                prices_days: get_env_parse_or("RETENTION_PRICES_DAYS", 365),
                analytics_days: get_env_parse_or("RETENTION_ANALYTICS_DAYS", 90),
                cache_stats_days: get_env_parse_or("RETENTION_CACHE_STATS_DAYS", 30),
                archive_threshold_days: get_env_parse_or("ARCHIVE_THRESHOLD_DAYS", 180),
            },

            cron: CronConfig {
                cache_cleanup: get_env_or("CRON_CACHE_CLEANUP", "0 0 * * * *"),
                data_archival: get_env_or("CRON_DATA_ARCHIVAL", "0 0 3 * * *"),
                cache_warming: get_env_or("CRON_CACHE_WARMING", "0 0 */6 * * *"),
                cache_warming_enabled: get_env_parse_or("CACHE_WARMING_ENABLED", true),
                metrics_collection: get_env_or("CRON_METRICS_COLLECTION", "0 */15 * * * *"),
                metrics_collection_enabled: get_env_parse_or("METRICS_COLLECTION_ENABLED", true),
                db_optimization: get_env_or("CRON_DB_OPTIMIZATION", "0 0 4 * * 0"),
                daily_historical_fetch: get_env_or("CRON_DAILY_HISTORICAL_FETCH", "0 30 2 * * *"),
            },
        })
    }

    /// Validate configuration values against the ranges the specification pins down.
    pub fn validate(&self) -> Result<(), String> {
        if self.database_url.trim().is_empty() {
            return Err("DATABASE_URL must not be empty".to_string());
        }
        if self.redis_url.trim().is_empty() {
            return Err("REDIS_URL must not be empty".to_string());
        }
        if !(0.0..=1.0).contains(&self.interpolation.min_confidence_threshold) {
            return Err("INTERP_MIN_CONFIDENCE must be within [0, 1]".to_string());
        }
        if self.interpolation.max_data_points < 2 {
            return Err("INTERP_MAX_DATA_POINTS must be at least 2".to_string());
        }
        if self.oracle.max_retries == 0 {
            return Err("ORACLE_MAX_RETRIES must be at least 1".to_string());
        }
        if self.queue.price_processing.concurrency == 0
            || self.queue.batch_processing.concurrency == 0
        {
            return Err("queue concurrency must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Global configuration instance, initialized once at startup.
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Initialize the global configuration. Must be called once, before any
/// component that reads [`core_config`].
pub fn init_config(config: Config) -> Result<(), String> {
    CONFIG
        .set(config)
        .map_err(|_| "Config has already been initialized".to_string())
}

/// Access the global configuration.
///
/// # Panics
///
/// Panics if [`init_config`] has not run yet.
pub fn core_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Config must be initialized with init_config() before use")
}
