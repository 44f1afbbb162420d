//! The move-proposing agent seam and its structured answer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use arena_core::{MoveNotation, Side};

use crate::error::AgentError;

const PLACEHOLDER_MESSAGE: &str = "Sorry, I lost track of the board and could not make a move.";

/// The structured answer an agent is asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveProposal {
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "To")]
    pub to: String,
    #[serde(rename = "ReasonForMove", default)]
    pub reason: String,
    #[serde(rename = "Message", default)]
    pub message: String,
}

impl MoveProposal {
    /// Stand-in for an answer that could not be parsed. The rules engine
    /// rejects it like any other bad move.
    pub fn placeholder() -> Self {
        Self {
            from: String::new(),
            to: String::new(),
            reason: String::new(),
            message: PLACEHOLDER_MESSAGE.to_string(),
        }
    }
}

/// A failed attempt earlier in the same turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// What the agent answered
    pub response: String,
    /// Why it was not played
    pub error: String,
}

/// Everything an agent sees when asked for a move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRequest {
    pub agent: String,
    pub side: Side,
    pub fen: String,
    pub ascii: String,
    pub legal_moves: Vec<MoveNotation>,
    pub history: Vec<Exchange>,
}

impl MoveRequest {
    pub fn last_error(&self) -> Option<&str> {
        self.history.last().map(|e| e.error.as_str())
    }
}

/// Something that answers a `MoveRequest` with raw text, expected to hold a
/// JSON `MoveProposal`.
#[async_trait]
pub trait MoveAgent: Send + Sync {
    async fn propose(&self, request: &MoveRequest) -> Result<String, AgentError>;
}

/// Strip Markdown code fences around a JSON answer.
pub fn sanitize_output(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "").trim().to_string()
}

pub fn parse_proposal(raw: &str) -> Result<MoveProposal, String> {
    let cleaned = sanitize_output(raw);
    serde_json::from_str(&cleaned).map_err(|e| format!("Could not parse move response: {e}"))
}
