//! Runs a series of matches between two agents and keeps the score.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use arena_core::{AgentStats, GameOptions, MatchResult, MatchTermination, Side};

use crate::cancel::CancelToken;
use crate::error::ArenaError;
use crate::orchestrator::MatchOrchestrator;

/// Sent after every match, in play order.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCompleted {
    /// 0-based match number
    pub index: usize,
    pub total: usize,
    pub result: MatchResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalSummary {
    pub agent_a: AgentStats,
    pub agent_b: AgentStats,
    pub results: Vec<MatchResult>,
    /// True when the run was stopped before every match was played
    pub cancelled: bool,
}

pub struct TournamentRunner {
    orchestrator: MatchOrchestrator,
    events: Option<mpsc::UnboundedSender<MatchCompleted>>,
}

impl TournamentRunner {
    pub fn new(orchestrator: MatchOrchestrator) -> Self {
        Self {
            orchestrator,
            events: None,
        }
    }

    /// Receive a `MatchCompleted` per finished match.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<MatchCompleted> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }

    /// Play `match_count` matches, alternating colours: even-indexed matches
    /// give `agent_a` White.
    pub async fn evaluate(
        &mut self,
        agent_a: &str,
        agent_b: &str,
        match_count: u32,
        cancel: &CancelToken,
    ) -> Result<EvalSummary, ArenaError> {
        if agent_a.trim().is_empty() || agent_b.trim().is_empty() {
            return Err(ArenaError::InvalidArgument(
                "Both agent ids must be non-empty".to_string(),
            ));
        }
        if match_count == 0 {
            return Err(ArenaError::InvalidArgument(
                "Match count must be greater than zero".to_string(),
            ));
        }

        let total = match_count as usize;
        let mut summary = EvalSummary {
            agent_a: AgentStats::new(agent_a),
            agent_b: AgentStats::new(agent_b),
            results: Vec::with_capacity(total),
            cancelled: false,
        };
        info!(agent_a, agent_b, matches = total, "Tournament started");

        for index in 0..total {
            let a_is_white = index % 2 == 0;
            let options = if a_is_white {
                GameOptions::agents(agent_a, agent_b)
            } else {
                GameOptions::agents(agent_b, agent_a)
            };

            let result = match self.orchestrator.play(&options, cancel).await {
                Ok(result) => result,
                Err(ArenaError::Cancelled) => {
                    warn!(played = index, total, "Tournament cancelled");
                    summary.cancelled = true;
                    break;
                }
                Err(e) => return Err(e),
            };

            record_result(&mut summary.agent_a, &mut summary.agent_b, a_is_white, &result);
            info!(
                index,
                outcome = ?result.outcome,
                winner = %result.winning_agent,
                half_moves = result.half_moves,
                "Match recorded"
            );

            if let Some(events) = &self.events {
                let _ = events.send(MatchCompleted {
                    index,
                    total,
                    result: result.clone(),
                });
            }
            summary.results.push(result);
        }

        Ok(summary)
    }
}

/// Exactly one outcome increment per participant. A forfeit is a loss that
/// is also tallied under `failures`. Attribution follows colour, not agent
/// id, so a self-play pairing is still counted per slot.
pub fn record_result(
    agent_a: &mut AgentStats,
    agent_b: &mut AgentStats,
    a_is_white: bool,
    result: &MatchResult,
) {
    let (white, black) = if a_is_white {
        (agent_a, agent_b)
    } else {
        (agent_b, agent_a)
    };

    let Some(winner_side) = result.outcome.winner() else {
        white.draws += 1;
        black.draws += 1;
        return;
    };
    let (winner, loser) = match winner_side {
        Side::White => (white, black),
        Side::Black => (black, white),
    };

    if result.outcome.is_points_win() {
        winner.wins_on_points += 1;
    } else {
        winner.wins += 1;
    }
    loser.losses += 1;
    if result.termination == MatchTermination::Failure {
        loser.failures += 1;
    }
}
