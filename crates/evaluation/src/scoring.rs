//! Scoring-service client and the evaluation value type.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use arena_core::Side;

use crate::config::EvaluationConfig;
use crate::error::EvalError;

/// Score assigned to a forced mate, in pawns.
pub const MATE_SCORE: f64 = 100.0;

/// A position evaluation. `score` is in pawns from White's perspective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub score: f64,
    /// Mate in N, positive when White mates.
    pub mate: Option<i32>,
    pub best_move: Option<String>,
}

/// Magnitude of an advantage and who holds it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub evaluation: f64,
    pub favored: Side,
}

impl Evaluation {
    /// Score with forced mates mapped to +/- `MATE_SCORE`.
    pub fn effective_score(&self) -> f64 {
        match self.mate {
            Some(n) if n > 0 => MATE_SCORE,
            Some(n) if n < 0 => -MATE_SCORE,
            _ => self.score,
        }
    }

    /// `None` for a dead-level position.
    pub fn verdict(&self) -> Option<Verdict> {
        let score = self.effective_score();
        if score == 0.0 {
            return None;
        }
        Some(Verdict {
            evaluation: score.abs(),
            favored: if score > 0.0 { Side::White } else { Side::Black },
        })
    }

    /// Side ahead by strictly more than `threshold` pawns.
    pub fn favored_beyond(&self, threshold: f64) -> Option<Side> {
        self.verdict()
            .filter(|v| v.evaluation > threshold)
            .map(|v| v.favored)
    }
}

/// Something that can score a position given as FEN.
#[async_trait]
pub trait PositionEvaluator: Send + Sync {
    async fn evaluate(&self, fen: &str) -> Result<Evaluation, EvalError>;
}

/// Reduce "bestmove e2e4 ponder e7e5" to "e2e4". Empty input yields `None`.
pub fn parse_best_move(raw: &str) -> Option<String> {
    let lower = raw.to_ascii_lowercase();
    let head = match lower.find("ponder") {
        Some(idx) => &raw[..idx],
        None => raw,
    };
    let mv = head
        .split_whitespace()
        .find(|tok| !tok.eq_ignore_ascii_case("bestmove"))?;
    Some(mv.to_string())
}

#[derive(Debug, Deserialize)]
struct ScoringResponse {
    success: bool,
    evaluation: Option<f64>,
    mate: Option<i32>,
    bestmove: Option<String>,
    data: Option<String>,
}

/// Client for the stockfish.online style HTTP service.
pub struct StockfishOnlineClient {
    client: Client,
    base_url: String,
    depth: u32,
}

impl StockfishOnlineClient {
    pub fn new(config: &EvaluationConfig) -> Result<Self, EvalError> {
        let client = Client::builder()
            .user_agent("LlmChessArena/1.0")
            .timeout(config.scoring_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.scoring_url.clone(),
            depth: config.scoring_depth,
        })
    }
}

#[async_trait]
impl PositionEvaluator for StockfishOnlineClient {
    async fn evaluate(&self, fen: &str) -> Result<Evaluation, EvalError> {
        let depth = self.depth.to_string();
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[("fen", fen), ("depth", depth.as_str())])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(EvalError::Service(format!("HTTP {}", resp.status())));
        }

        let body: ScoringResponse = resp.json().await?;
        debug!(fen, success = body.success, "Scoring response");
        into_evaluation(body)
    }
}

fn into_evaluation(body: ScoringResponse) -> Result<Evaluation, EvalError> {
    if !body.success {
        return Err(EvalError::Service(
            body.data.unwrap_or_else(|| "request unsuccessful".to_string()),
        ));
    }
    Ok(Evaluation {
        score: body.evaluation.unwrap_or(0.0),
        mate: body.mate,
        best_move: body.bestmove.as_deref().and_then(parse_best_move),
    })
}
