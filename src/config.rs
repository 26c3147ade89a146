use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::*;

/// Tuning knobs of the cache-consistency layer
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub local_cache_capacity: usize,
    pub record_ttl: Duration,
    pub feed_ttl: Duration,
    pub feed_bucket_millis: i64,
    pub feed_page_size: i64,
    pub invalidation_delay: Duration,
    pub coalesce_window: Duration,
    pub filter_capacity: usize,
    pub filter_false_positive_rate: f64,
    pub login_attempt_limit: u64,
    pub login_attempt_window: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            local_cache_capacity: DEFAULT_LOCAL_CACHE_CAPACITY,
            record_ttl: Duration::from_secs(DEFAULT_RECORD_TTL_SECS),
            feed_ttl: Duration::from_secs(DEFAULT_FEED_TTL_SECS),
            feed_bucket_millis: DEFAULT_FEED_BUCKET_MILLIS,
            feed_page_size: DEFAULT_FEED_PAGE_SIZE,
            invalidation_delay: Duration::from_millis(DEFAULT_INVALIDATION_DELAY_MS),
            coalesce_window: Duration::from_millis(DEFAULT_COALESCE_WINDOW_MS),
            filter_capacity: DEFAULT_FILTER_CAPACITY,
            filter_false_positive_rate: DEFAULT_FILTER_FALSE_POSITIVE_RATE,
            login_attempt_limit: DEFAULT_LOGIN_ATTEMPT_LIMIT,
            login_attempt_window: Duration::from_secs(DEFAULT_LOGIN_ATTEMPT_WINDOW_SECS),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub database_url: String,
    pub redis_url: Option<String>,
    pub allowed_origins: Vec<String>,
    pub environment: String,
    pub credential_pepper: String,
    pub cache: CacheSettings,
}

/// Read `name`, falling back to `default`, and parse it
fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, String> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| format!("Invalid {}", name)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if it exists (development)
        dotenvy::dotenv().ok();

        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let server_port = parse_var("SERVER_PORT", 8080)?;

        let database_url = env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?;
        let redis_url = env::var("REDIS_URL").ok().filter(|url| !url.is_empty());

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let credential_pepper = env::var("CREDENTIAL_PEPPER")
            .map_err(|_| "CREDENTIAL_PEPPER must be set for credential digests")?;

        let cache = CacheSettings {
            local_cache_capacity: parse_var("LOCAL_CACHE_CAPACITY", DEFAULT_LOCAL_CACHE_CAPACITY)?,
            record_ttl: Duration::from_secs(parse_var("RECORD_TTL_SECS", DEFAULT_RECORD_TTL_SECS)?),
            feed_ttl: Duration::from_secs(parse_var("FEED_TTL_SECS", DEFAULT_FEED_TTL_SECS)?),
            feed_bucket_millis: parse_var("FEED_BUCKET_MILLIS", DEFAULT_FEED_BUCKET_MILLIS)?,
            feed_page_size: parse_var("FEED_PAGE_SIZE", DEFAULT_FEED_PAGE_SIZE)?,
            invalidation_delay: Duration::from_millis(parse_var(
                "INVALIDATION_DELAY_MS",
                DEFAULT_INVALIDATION_DELAY_MS,
            )?),
            coalesce_window: Duration::from_millis(parse_var(
                "COALESCE_WINDOW_MS",
                DEFAULT_COALESCE_WINDOW_MS,
            )?),
            filter_capacity: parse_var("FILTER_CAPACITY", DEFAULT_FILTER_CAPACITY)?,
            filter_false_positive_rate: parse_var(
                "FILTER_FALSE_POSITIVE_RATE",
                DEFAULT_FILTER_FALSE_POSITIVE_RATE,
            )?,
            login_attempt_limit: parse_var("LOGIN_ATTEMPT_LIMIT", DEFAULT_LOGIN_ATTEMPT_LIMIT)?,
            login_attempt_window: Duration::from_secs(parse_var(
                "LOGIN_ATTEMPT_WINDOW_SECS",
                DEFAULT_LOGIN_ATTEMPT_WINDOW_SECS,
            )?),
        };

        if cache.feed_bucket_millis <= 0 {
            return Err("FEED_BUCKET_MILLIS must be positive".to_string());
        }
        if cache.feed_page_size <= 0 {
            return Err("FEED_PAGE_SIZE must be positive".to_string());
        }
        if !(cache.filter_false_positive_rate > 0.0 && cache.filter_false_positive_rate < 1.0) {
            return Err("FILTER_FALSE_POSITIVE_RATE must be between 0 and 1".to_string());
        }

        Ok(Config {
            server_host,
            server_port,
            database_url,
            redis_url,
            allowed_origins,
            environment,
            credential_pepper,
            cache,
        })
    }

    /// Get server address as string
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
