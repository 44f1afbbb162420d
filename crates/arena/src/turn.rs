//! One side's turn: ask the agent, apply through the rules engine, retry on
//! rejection.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use arena_core::board::AppliedMove;
use arena_core::{EndReason, RulesEngine, Side, TurnOutcome};
use evaluation::{Evaluation, EvaluationCache};

use crate::agent::{parse_proposal, sanitize_output, Exchange, MoveAgent, MoveProposal, MoveRequest};
use crate::cancel::CancelToken;
use crate::config::MatchConfig;
use crate::error::TurnError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per turn, including the first
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Delay before the 1-based `attempt`; zero for the first.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        self.backoff * attempt.saturating_sub(1)
    }
}

impl From<&MatchConfig> for RetryPolicy {
    fn from(config: &MatchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: config.backoff,
        }
    }
}

/// A turn that ended with a move on the board.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReport {
    pub side: Side,
    pub agent: String,
    pub proposal: MoveProposal,
    pub applied: AppliedMove,
    /// Set when the move ended the game. Winner is `None` for draws.
    pub game_end: Option<(Option<Side>, EndReason)>,
    pub attempts: u32,
    /// Readable line for logs and transcripts
    pub message: String,
    /// Evaluation of the position after the move, if one was fetched
    pub evaluation: Option<Evaluation>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnResult {
    Played(TurnReport),
    /// The side to move had nothing to play. The agent was not asked.
    NoLegalMoves,
}

pub struct AgentTurnExecutor {
    agent: Arc<dyn MoveAgent>,
    policy: RetryPolicy,
    evaluations: Option<EvaluationCache>,
}

impl AgentTurnExecutor {
    /// `evaluations` is refreshed after every applied move when present.
    pub fn new(
        agent: Arc<dyn MoveAgent>,
        policy: RetryPolicy,
        evaluations: Option<EvaluationCache>,
    ) -> Self {
        Self {
            agent,
            policy,
            evaluations,
        }
    }

    pub async fn execute(
        &self,
        board: &mut dyn RulesEngine,
        side: Side,
        agent_id: &str,
        cancel: &CancelToken,
    ) -> Result<TurnResult, TurnError> {
        let legal_moves = board.legal_moves(side);
        if legal_moves.is_empty() {
            debug!(side = %side, "No legal moves");
            return Ok(TurnResult::NoLegalMoves);
        }

        let mut request = MoveRequest {
            agent: agent_id.to_string(),
            side,
            fen: board.position_notation(),
            ascii: board.ascii(),
            legal_moves,
            history: Vec::new(),
        };

        let mut last_error = String::new();
        for attempt in 1..=self.policy.max_attempts {
            let delay = self.policy.delay_before(attempt);
            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(TurnError::Cancelled),
                }
            }

            let raw = tokio::select! {
                answer = self.agent.propose(&request) => answer,
                _ = cancel.cancelled() => return Err(TurnError::Cancelled),
            };
            let raw = raw.map_err(|e| {
                error!(agent = agent_id, side = %side, error = %e, "Agent call failed");
                TurnError::Transport {
                    side,
                    agent: agent_id.to_string(),
                    message: e.to_string(),
                }
            })?;

            let (proposal, parse_error) = match parse_proposal(&raw) {
                Ok(proposal) => (proposal, None),
                Err(e) => (MoveProposal::placeholder(), Some(e)),
            };

            let (applied, game_end) = match board.apply_move(&proposal.from, &proposal.to) {
                TurnOutcome::Applied(applied) => (applied, None),
                TurnOutcome::AppliedAndGameEnded {
                    applied,
                    winner,
                    reason,
                } => (applied, Some((winner, reason))),
                TurnOutcome::Rejected(reason) => {
                    let error = parse_error.unwrap_or(reason);
                    warn!(agent = agent_id, side = %side, attempt, error = %error, "Move rejected");
                    request.history.push(Exchange {
                        response: sanitize_output(&raw),
                        error: error.clone(),
                    });
                    last_error = error;
                    continue;
                }
            };

            let evaluation = self.refresh_evaluation(board.position_notation(), cancel).await;
            let message = format!("Model: {agent_id}\n\n{}", proposal.message);
            debug!(agent = agent_id, side = %side, mv = %applied.notation, attempt, "Move applied");

            return Ok(TurnResult::Played(TurnReport {
                side,
                agent: agent_id.to_string(),
                proposal,
                applied,
                game_end,
                attempts: attempt,
                message,
                evaluation,
            }));
        }

        warn!(
            agent = agent_id,
            side = %side,
            attempts = self.policy.max_attempts,
            "Retries exhausted"
        );
        Err(TurnError::Exhausted {
            side,
            agent: agent_id.to_string(),
            attempts: self.policy.max_attempts,
            last_error,
        })
    }

    /// Best-effort: a failed or cancelled evaluation is logged and skipped.
    async fn refresh_evaluation(&self, fen: String, cancel: &CancelToken) -> Option<Evaluation> {
        let cache = self.evaluations.as_ref()?;
        tokio::select! {
            result = cache.evaluate(&fen) => match result {
                Ok(evaluation) => Some(evaluation),
                Err(e) => {
                    warn!(fen = %fen, error = %e, "Evaluation refresh failed");
                    None
                }
            },
            _ = cancel.cancelled() => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(1000),
        };
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_before(3), Duration::from_millis(2000));
    }

    #[test]
    fn test_policy_from_match_config() {
        let config = MatchConfig {
            max_attempts: 0,
            ..MatchConfig::default()
        };
        assert_eq!(RetryPolicy::from(&config).max_attempts, 1);
    }
}
