//! Evaluation configuration from environment variables

use std::env;
use std::time::Duration;

use tracing::info;

use crate::cache::CacheConfig;

pub const DEFAULT_SCORING_URL: &str = "https://stockfish.online/api/s/v2.php";

#[derive(Clone, Debug)]
pub struct EvaluationConfig {
    /// HTTP scoring service endpoint
    pub scoring_url: String,

    /// Search depth sent with every scoring request
    pub scoring_depth: u32,

    /// HTTP timeout for the scoring service
    pub scoring_timeout: Duration,

    /// Path to a local Stockfish binary; takes precedence over the HTTP service
    pub stockfish_path: Option<String>,

    /// Cache TTL, drain interval and batch size
    pub cache: CacheConfig,

    /// Admission limit for the bulk training-data path
    pub max_concurrent_calls: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            scoring_url: DEFAULT_SCORING_URL.to_string(),
            scoring_depth: 15,
            scoring_timeout: Duration::from_secs(30),
            stockfish_path: None,
            cache: CacheConfig::default(),
            max_concurrent_calls: 10,
        }
    }
}

impl EvaluationConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let scoring_url = env::var("SCORING_URL").unwrap_or(defaults.scoring_url);

        let scoring_depth = parse_var("SCORING_DEPTH").unwrap_or(defaults.scoring_depth);

        let scoring_timeout = parse_var("SCORING_TIMEOUT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.scoring_timeout);

        let stockfish_path = env::var("STOCKFISH_PATH").ok().filter(|p| !p.trim().is_empty());

        let cache = CacheConfig {
            ttl: parse_var("EVAL_CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache.ttl),
            drain_interval: parse_var("EVAL_DRAIN_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.cache.drain_interval),
            batch_size: parse_var("EVAL_BATCH_SIZE")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.cache.batch_size),
        };

        let max_concurrent_calls = parse_var("EVAL_MAX_CONCURRENT_CALLS")
            .filter(|n: &usize| *n > 0)
            .unwrap_or(defaults.max_concurrent_calls);

        match &stockfish_path {
            Some(path) => info!(stockfish_path = %path, "Using local Stockfish for evaluations"),
            None => info!(scoring_url = %scoring_url, depth = scoring_depth, "Using HTTP scoring service"),
        }

        Self {
            scoring_url,
            scoring_depth,
            scoring_timeout,
            stockfish_path,
            cache,
            max_concurrent_calls,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
