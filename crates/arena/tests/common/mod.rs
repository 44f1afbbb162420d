//! Fakes for the agent, the rules engine and the scoring service.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arena::agent::{MoveAgent, MoveRequest};
use arena::error::AgentError;
use arena::{MatchConfig, MatchOrchestrator};
use arena_core::board::AppliedMove;
use arena_core::{EndReason, MoveNotation, RulesEngine, Side, TurnOutcome};
use async_trait::async_trait;
use evaluation::{EvalError, Evaluation, EvaluationCache, PositionEvaluator};

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// JSON answer proposing `from` -> `to`.
pub fn answer(from: &str, to: &str) -> Result<String, AgentError> {
    Ok(format!(
        r#"{{"ReasonForMove":"scripted","From":"{from}","To":"{to}","Message":"gl"}}"#
    ))
}

/// Replays a fixed list of answers per agent id, then `fallback` forever.
/// A hanging agent never answers once its script runs out.
#[derive(Default)]
pub struct ScriptedAgent {
    scripts: Mutex<HashMap<String, VecDeque<Result<String, AgentError>>>>,
    fallback: Option<String>,
    hang: bool,
    requests: Mutex<Vec<MoveRequest>>,
}

impl ScriptedAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, agent: &str, answers: Vec<Result<String, AgentError>>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(agent.to_string(), answers.into());
        self
    }

    pub fn with_fallback(mut self, answer: &str) -> Self {
        self.fallback = Some(answer.to_string());
        self
    }

    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn requests(&self) -> Vec<MoveRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls_for(&self, agent: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.agent == agent)
            .count()
    }
}

#[async_trait]
impl MoveAgent for ScriptedAgent {
    async fn propose(&self, request: &MoveRequest) -> Result<String, AgentError> {
        self.requests.lock().unwrap().push(request.clone());
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.agent)
            .and_then(VecDeque::pop_front);
        match (scripted, &self.fallback) {
            (Some(answer), _) => answer,
            (None, _) if self.hang => std::future::pending().await,
            (None, Some(fallback)) => Ok(fallback.clone()),
            (None, None) => Err(AgentError::EmptyResponse),
        }
    }
}

// ---------------------------------------------------------------------------
// Rules engine
// ---------------------------------------------------------------------------

/// Accepts any non-empty move. Optionally ends the game, or runs out of
/// moves, after a fixed number of half-moves.
#[derive(Debug, Clone)]
pub struct ScriptedBoard {
    side: Side,
    half_moves: u32,
    end_after: Option<(u32, Option<Side>, EndReason)>,
    moves_until: Option<u32>,
}

impl ScriptedBoard {
    pub fn new() -> Self {
        Self {
            side: Side::White,
            half_moves: 0,
            end_after: None,
            moves_until: None,
        }
    }

    pub fn ending_after(mut self, half_moves: u32, winner: Option<Side>, reason: EndReason) -> Self {
        self.end_after = Some((half_moves, winner, reason));
        self
    }

    pub fn no_moves_after(mut self, half_moves: u32) -> Self {
        self.moves_until = Some(half_moves);
        self
    }
}

impl RulesEngine for ScriptedBoard {
    fn reset(&mut self) {
        self.side = Side::White;
        self.half_moves = 0;
    }

    fn side_to_move(&self) -> Side {
        self.side
    }

    fn position_notation(&self) -> String {
        let side = match self.side {
            Side::White => "w",
            Side::Black => "b",
        };
        format!("8/8/8/8/8/8/8/K1k5 {side} - - 0 {}", self.half_moves / 2 + 1)
    }

    fn ascii(&self) -> String {
        "scripted".to_string()
    }

    fn legal_moves(&self, side: Side) -> Vec<MoveNotation> {
        if side != self.side || self.moves_until.is_some_and(|n| self.half_moves >= n) {
            return Vec::new();
        }
        vec![MoveNotation::new("a1", "a2")]
    }

    fn apply_move(&mut self, from: &str, to: &str) -> TurnOutcome {
        if from.is_empty() || to.is_empty() {
            return TurnOutcome::Rejected("Empty square".to_string());
        }
        if from == to {
            return TurnOutcome::Rejected(format!("Illegal move {from}{to}"));
        }
        self.half_moves += 1;
        self.side = self.side.opposite();

        let applied = AppliedMove {
            notation: MoveNotation::new(from, to),
            capture: false,
            check: false,
        };
        match self.end_after {
            Some((n, winner, reason)) if self.half_moves >= n => TurnOutcome::AppliedAndGameEnded {
                applied,
                winner,
                reason,
            },
            _ => TurnOutcome::Applied(applied),
        }
    }
}

// ---------------------------------------------------------------------------
// Scoring service
// ---------------------------------------------------------------------------

/// Returns `score` for every position, optionally after a delay. Positions
/// starting with "bad" fail. Tracks call count and peak concurrency.
pub struct CountingEvaluator {
    score: f64,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl CountingEvaluator {
    pub fn new(score: f64) -> Arc<Self> {
        Self::with_delay(score, Duration::ZERO)
    }

    pub fn with_delay(score: f64, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            score,
            delay,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl PositionEvaluator for CountingEvaluator {
    async fn evaluate(&self, fen: &str) -> Result<Evaluation, EvalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(fen.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if fen.starts_with("bad") {
            return Err(EvalError::Service(format!("cannot score {fen}")));
        }
        Ok(Evaluation {
            score: self.score,
            mate: None,
            best_move: Some("e2e4".to_string()),
        })
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Match settings with no backoff so tests don't depend on timing.
pub fn fast_config(max_half_moves: u32) -> MatchConfig {
    MatchConfig {
        max_half_moves,
        backoff: Duration::ZERO,
        ..MatchConfig::default()
    }
}

pub fn orchestrator(
    board: impl RulesEngine + 'static,
    agent: Arc<ScriptedAgent>,
    evaluations: Option<EvaluationCache>,
    config: MatchConfig,
) -> MatchOrchestrator {
    MatchOrchestrator::new(Box::new(board), agent, evaluations, config)
}
