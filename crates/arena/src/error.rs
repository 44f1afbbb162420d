//! Arena error types

use thiserror::Error;

use arena_core::Side;
use evaluation::EvalError;

/// Why a single turn could not be completed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TurnError {
    /// The agent endpoint could not be reached or answered garbage at the
    /// transport level. Not retried.
    #[error("{side} agent '{agent}' failed: {message}")]
    Transport {
        side: Side,
        agent: String,
        message: String,
    },

    #[error("{side} agent '{agent}' made no legal move in {attempts} attempts: {last_error}")]
    Exhausted {
        side: Side,
        agent: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Turn cancelled")]
    Cancelled,
}

impl TurnError {
    /// The side whose turn failed.
    pub fn side(&self) -> Option<Side> {
        match self {
            TurnError::Transport { side, .. } | TurnError::Exhausted { side, .. } => Some(*side),
            TurnError::Cancelled => None,
        }
    }
}

/// Errors from the agent transport, before any rules are consulted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Agent endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Agent response had no content")]
    EmptyResponse,

    #[error("JSON error: {0}")]
    Json(String),
}

impl From<reqwest::Error> for AgentError {
    fn from(e: reqwest::Error) -> Self {
        AgentError::Http(e.to_string())
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::Json(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum ArenaError {
    #[error("Configuration error: {0}")]
    Config(&'static str),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Cancelled")]
    Cancelled,

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Evaluation(#[from] EvalError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
