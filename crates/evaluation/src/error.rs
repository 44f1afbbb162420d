//! Evaluation error types

use thiserror::Error;

/// Cloneable so one failure can be handed to every waiter of a drain cycle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Configuration error: {0}")]
    Config(&'static str),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Scoring service error: {0}")]
    Service(String),

    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    #[error("Stockfish error: {0}")]
    Stockfish(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Evaluation pipeline is shut down")]
    Shutdown,

    #[error("Evaluation request was dropped before completion")]
    Abandoned,
}

impl From<reqwest::Error> for EvalError {
    fn from(e: reqwest::Error) -> Self {
        EvalError::Http(e.to_string())
    }
}

impl From<serde_json::Error> for EvalError {
    fn from(e: serde_json::Error) -> Self {
        EvalError::Json(e.to_string())
    }
}

impl From<std::io::Error> for EvalError {
    fn from(e: std::io::Error) -> Self {
        EvalError::Io(e.to_string())
    }
}
