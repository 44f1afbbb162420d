//! Drives one match from the starting position to a classified result.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use arena_core::{
    EndReason, GameOptions, MatchOutcome, MatchResult, MatchTermination, RulesEngine, Side,
};
use evaluation::{Evaluation, EvaluationCache};

use crate::agent::MoveAgent;
use crate::cancel::CancelToken;
use crate::config::MatchConfig;
use crate::error::{ArenaError, TurnError};
use crate::turn::{AgentTurnExecutor, RetryPolicy, TurnReport, TurnResult};

/// Per-match mutable state. Lives only for one `play` call.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchState {
    pub side_to_move: Side,
    pub half_moves: u32,
    pub terminal: bool,
    /// End signal raised by the rules engine: winner (if any) and reason
    pub end: Option<(Option<Side>, EndReason)>,
    pub fen: String,
    pub evaluation: Option<Evaluation>,
    /// Side that failed and the error text
    pub failure: Option<(Side, String)>,
}

impl MatchState {
    fn new(fen: String) -> Self {
        Self {
            side_to_move: Side::White,
            half_moves: 0,
            terminal: false,
            end: None,
            fen,
            evaluation: None,
            failure: None,
        }
    }

    fn record(&mut self, report: TurnReport, fen: String) {
        self.half_moves += 1;
        self.fen = fen;
        if report.game_end.is_some() {
            self.end = report.game_end;
            self.terminal = true;
        }
        if report.evaluation.is_some() {
            self.evaluation = report.evaluation;
        }
    }
}

pub struct MatchOrchestrator {
    board: Box<dyn RulesEngine>,
    agent: Arc<dyn MoveAgent>,
    evaluations: Option<EvaluationCache>,
    config: MatchConfig,
}

impl MatchOrchestrator {
    pub fn new(
        board: Box<dyn RulesEngine>,
        agent: Arc<dyn MoveAgent>,
        evaluations: Option<EvaluationCache>,
        config: MatchConfig,
    ) -> Self {
        Self {
            board,
            agent,
            evaluations,
            config,
        }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Play one match between the agents named in `options`.
    pub async fn play(
        &mut self,
        options: &GameOptions,
        cancel: &CancelToken,
    ) -> Result<MatchResult, ArenaError> {
        options.validate().map_err(ArenaError::InvalidArgument)?;
        let (Some(white), Some(black)) = (options.agent_for(Side::White), options.agent_for(Side::Black))
        else {
            return Err(ArenaError::InvalidArgument(
                "Automated matches need an agent on both sides".to_string(),
            ));
        };

        self.board.reset();
        let mut state = MatchState::new(self.board.position_notation());
        info!(white, black, max_half_moves = self.config.max_half_moves, "Match started");

        let executor = AgentTurnExecutor::new(
            self.agent.clone(),
            RetryPolicy::from(&self.config),
            self.evaluations
                .clone()
                .filter(|_| self.config.evaluate_every_turn),
        );

        let termination = loop {
            if cancel.is_cancelled() {
                return Err(ArenaError::Cancelled);
            }

            let side = state.side_to_move;
            let agent = match side {
                Side::White => white,
                Side::Black => black,
            };

            match executor
                .execute(self.board.as_mut(), side, agent, cancel)
                .await
            {
                Ok(TurnResult::NoLegalMoves) => break MatchTermination::NoLegalMoves,
                Ok(TurnResult::Played(report)) => {
                    state.record(report, self.board.position_notation());
                    if state.terminal {
                        break MatchTermination::Rule;
                    }
                    if state.half_moves >= self.config.max_half_moves {
                        break MatchTermination::Budget;
                    }
                    state.side_to_move = side.opposite();
                }
                Err(TurnError::Cancelled) => return Err(ArenaError::Cancelled),
                Err(e) => {
                    error!(side = %side, agent, error = %e, "Turn failed, match forfeited");
                    state.failure = Some((side, e.to_string()));
                    break MatchTermination::Failure;
                }
            }
        };
        state.terminal = true;

        let outcome = self.classify(termination, &mut state, cancel).await;
        let winning_agent = match outcome.winner() {
            Some(Side::White) => white.to_string(),
            Some(Side::Black) => black.to_string(),
            None => String::new(),
        };

        let result = MatchResult {
            outcome,
            winning_agent,
            white_agent: white.to_string(),
            black_agent: black.to_string(),
            final_fen: state.fen.clone(),
            end_reason: state.end.map(|(_, reason)| reason),
            termination,
            half_moves: state.half_moves,
            final_score: state.evaluation.as_ref().map(Evaluation::effective_score),
            error: state.failure.map(|(_, message)| message),
            finished_at: Utc::now(),
        };

        info!(
            outcome = ?result.outcome,
            termination = ?result.termination,
            reason = result.end_reason_text(),
            half_moves = result.half_moves,
            winner = %result.winning_agent,
            "Match finished"
        );
        Ok(result)
    }

    async fn classify(
        &self,
        termination: MatchTermination,
        state: &mut MatchState,
        cancel: &CancelToken,
    ) -> MatchOutcome {
        match termination {
            MatchTermination::Failure => match &state.failure {
                Some((failed, _)) => MatchOutcome::win_for(failed.opposite()),
                None => MatchOutcome::Draw,
            },
            MatchTermination::Rule => match state.end {
                Some((Some(winner), _)) => MatchOutcome::win_for(winner),
                _ => MatchOutcome::Draw,
            },
            MatchTermination::Budget => {
                if let Some(evaluation) = self.final_evaluation(&state.fen, cancel).await {
                    state.evaluation = Some(evaluation);
                }
                match state
                    .evaluation
                    .as_ref()
                    .and_then(|e| e.favored_beyond(self.config.points_threshold))
                {
                    Some(side) => MatchOutcome::points_win_for(side),
                    None => MatchOutcome::Draw,
                }
            }
            MatchTermination::NoLegalMoves => MatchOutcome::Draw,
        }
    }

    /// Fresh evaluation of the final position. `None` falls back to the last
    /// one seen during play.
    async fn final_evaluation(&self, fen: &str, cancel: &CancelToken) -> Option<Evaluation> {
        let cache = self.evaluations.as_ref()?;
        tokio::select! {
            result = cache.evaluate(fen) => match result {
                Ok(evaluation) => Some(evaluation),
                Err(e) => {
                    warn!(fen, error = %e, "Final evaluation failed, using last known");
                    None
                }
            },
            _ = cancel.cancelled() => None,
        }
    }
}
