//! Configuration types.
//!
//! Everything is read from environment variables. Unset or unparsable
//! values fall back to the defaults below.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Tuning knobs for the execution core (cache, queue, pool, retries, stagger).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a computed result is served from cache.
    pub cache_ttl: Duration,
    /// Maximum cached entries; the oldest is evicted when full.
    pub max_cache_size: usize,
    /// Delay before a queued background run starts. Manual runs wait half.
    pub queue_delay: Duration,
    /// Maximum number of waiting runs.
    pub max_queue_size: usize,
    /// Maximum concurrently executing runs.
    pub max_running_tasks: usize,
    /// Fetch attempts per run (including the first).
    pub fetch_retries: u32,
    /// Pause between fetch attempts.
    pub fetch_retry_delay: Duration,
    /// Per-attempt fetch timeout.
    pub fetch_timeout: Duration,
    /// Offset between tasks sharing one cron expression.
    pub stagger: Duration,
    /// Interval of the expired-entry sweep.
    pub cache_sweep_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(10),
            max_cache_size: 1000,
            queue_delay: Duration::from_secs(10),
            max_queue_size: 10,
            max_running_tasks: 3,
            fetch_retries: 2,
            fetch_retry_delay: Duration::from_secs(2),
            fetch_timeout: Duration::from_secs(60),
            stagger: Duration::from_secs(5 * 60),
            cache_sweep_interval: Duration::from_secs(60),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_ttl: env_millis("CACHE_TTL_MS", defaults.cache_ttl),
            max_cache_size: env_parse("MAX_CACHE_SIZE", defaults.max_cache_size),
            queue_delay: env_millis("QUEUE_DELAY_MS", defaults.queue_delay),
            max_queue_size: env_parse("MAX_QUEUE_SIZE", defaults.max_queue_size),
            max_running_tasks: env_parse("MAX_RUNNING_TASKS", defaults.max_running_tasks).max(1),
            fetch_retries: env_parse("FETCH_RETRIES", defaults.fetch_retries).max(1),
            fetch_retry_delay: env_millis("FETCH_RETRY_DELAY_MS", defaults.fetch_retry_delay),
            fetch_timeout: env_millis("FETCH_TIMEOUT_MS", defaults.fetch_timeout),
            stagger: Duration::from_secs(
                env_parse("STAGGER_MINUTES", defaults.stagger.as_secs() / 60) * 60,
            ),
            cache_sweep_interval: Duration::from_secs(env_parse(
                "CACHE_SWEEP_SECS",
                defaults.cache_sweep_interval.as_secs(),
            )),
        }
    }

    /// Delay applied to a dequeued entry before it runs.
    pub fn queue_delay_for(&self, is_manual: bool) -> Duration {
        if is_manual {
            self.queue_delay / 2
        } else {
            self.queue_delay
        }
    }
}

/// Process-level configuration for the binary.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub ollama_host: String,
    pub ollama_model: String,
    /// Absent means results are only logged.
    pub telegram_token: Option<SecretString>,
    pub api_port: u16,
    /// Directory for rolling log files; console only when unset.
    pub log_dir: Option<PathBuf>,
    pub engine: EngineConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let ollama_host = std::env::var("OLLAMA_HOST")
            .unwrap_or_else(|_| "http://localhost:11434".to_string());
        if !(ollama_host.starts_with("http://") || ollama_host.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                key: "OLLAMA_HOST".to_string(),
                message: format!("expected an http(s) URL, got '{ollama_host}'"),
            });
        }

        Ok(Self {
            db_path: std::env::var("SITE_DIGEST_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/site-digest.db")),
            ollama_host: ollama_host.trim_end_matches('/').to_string(),
            ollama_model: std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3".to_string()),
            telegram_token: std::env::var("TELEGRAM_BOT_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty())
                .map(SecretString::from),
            api_port: env_parse("SITE_DIGEST_API_PORT", 8080),
            log_dir: std::env::var("SITE_DIGEST_LOG_DIR").ok().map(PathBuf::from),
            engine: EngineConfig::from_env(),
        })
    }
}

fn env_parse<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Unparsable value, using default {}", default);
            default
        }),
        Err(_) => default,
    }
}

fn env_millis(key: &str, default: Duration) -> Duration {
    Duration::from_millis(env_parse(key, default.as_millis() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.cache_ttl, Duration::from_secs(10));
        assert_eq!(config.max_cache_size, 1000);
        assert_eq!(config.max_queue_size, 10);
        assert_eq!(config.max_running_tasks, 3);
        assert_eq!(config.fetch_retries, 2);
        assert_eq!(config.fetch_retry_delay, Duration::from_secs(2));
        assert_eq!(config.stagger, Duration::from_secs(300));
    }

    #[test]
    fn manual_entries_wait_half_the_queue_delay() {
        let config = EngineConfig::default();
        assert_eq!(config.queue_delay_for(false), Duration::from_secs(10));
        assert_eq!(config.queue_delay_for(true), Duration::from_secs(5));
    }

    #[test]
    fn unparsable_value_falls_back() {
        assert_eq!(env_parse("SITE_DIGEST_TEST_UNSET_KEY", 7usize), 7);
    }
}
