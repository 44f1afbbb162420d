//! Arena configuration from environment variables

use std::env;
use std::time::Duration;

use tracing::info;

use evaluation::EvaluationConfig;

use crate::error::ArenaError;

pub const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

#[derive(Clone, Debug)]
pub struct ArenaConfig {
    /// Credential for the agent endpoint
    pub openrouter_api_key: String,

    /// Chat-completions base URL
    pub openrouter_base_url: String,

    /// HTTP timeout for one agent call
    pub agent_timeout: Duration,

    pub match_config: MatchConfig,

    pub evaluation: EvaluationConfig,
}

/// Knobs for a single match.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchConfig {
    /// Half-move ceiling
    pub max_half_moves: u32,

    /// Pawns of advantage needed to win on points at the ceiling
    pub points_threshold: f64,

    /// Attempts per turn, including the first
    pub max_attempts: u32,

    /// Linear backoff unit between attempts
    pub backoff: Duration,

    /// Refresh the evaluation after each applied move
    pub evaluate_every_turn: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            max_half_moves: 150,
            points_threshold: 0.5,
            max_attempts: 3,
            backoff: Duration::from_millis(1000),
            evaluate_every_turn: true,
        }
    }
}

impl ArenaConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ArenaError> {
        let openrouter_api_key = env::var("OPENROUTER_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ArenaError::Config("OPENROUTER_API_KEY not set"))?;

        let openrouter_base_url = env::var("OPENROUTER_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_OPENROUTER_BASE_URL.to_string());

        let agent_timeout = env::var("AGENT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(300));

        let defaults = MatchConfig::default();

        let max_half_moves = env::var("MAX_HALF_MOVES")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|n: &u32| *n > 0)
            .unwrap_or(defaults.max_half_moves);

        let points_threshold = env::var("POINTS_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|t: &f64| *t >= 0.0)
            .unwrap_or(defaults.points_threshold);

        let max_attempts = env::var("TURN_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|n: &u32| *n > 0)
            .unwrap_or(defaults.max_attempts);

        let backoff = env::var("TURN_BACKOFF_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.backoff);

        let evaluate_every_turn = env::var("EVALUATE_EVERY_TURN")
            .ok()
            .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no"))
            .unwrap_or(defaults.evaluate_every_turn);

        let match_config = MatchConfig {
            max_half_moves,
            points_threshold,
            max_attempts,
            backoff,
            evaluate_every_turn,
        };
        info!(?match_config, base_url = %openrouter_base_url, "Arena config loaded");

        Ok(Self {
            openrouter_api_key,
            openrouter_base_url,
            agent_timeout,
            match_config,
            evaluation: EvaluationConfig::from_env(),
        })
    }
}
