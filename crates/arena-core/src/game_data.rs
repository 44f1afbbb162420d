use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::board::{EndReason, Side};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerKind {
    Human,
    Agent(String),
}

impl PlayerKind {
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            PlayerKind::Human => None,
            PlayerKind::Agent(id) => Some(id.as_str()),
        }
    }

    pub fn is_agent(&self) -> bool {
        matches!(self, PlayerKind::Agent(_))
    }
}

/// Per-match player configuration. Fixed for the lifetime of a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOptions {
    pub white: PlayerKind,
    pub black: PlayerKind,
    pub agent_only: bool,
    /// Suppress the conversational side channel.
    pub no_chat: bool,
}

impl GameOptions {
    /// Both sides agent-controlled, no chat. The usual tournament setup.
    pub fn agents(white: &str, black: &str) -> Self {
        Self::new(
            PlayerKind::Agent(white.to_string()),
            PlayerKind::Agent(black.to_string()),
            true,
        )
    }

    pub fn new(white: PlayerKind, black: PlayerKind, no_chat: bool) -> Self {
        let agent_only = matches!(
            (&white, &black),
            (PlayerKind::Agent(w), PlayerKind::Agent(b)) if !w.trim().is_empty() && !b.trim().is_empty()
        );
        Self {
            white,
            black,
            agent_only,
            no_chat,
        }
    }

    pub fn player(&self, side: Side) -> &PlayerKind {
        match side {
            Side::White => &self.white,
            Side::Black => &self.black,
        }
    }

    /// Agent id for `side`, `None` for a human side.
    pub fn agent_for(&self, side: Side) -> Option<&str> {
        self.player(side).agent_id()
    }

    /// At least one side must be an agent, and every agent side needs an id.
    pub fn validate(&self) -> Result<(), String> {
        if !self.white.is_agent() && !self.black.is_agent() {
            return Err("At least one side must be agent-controlled".to_string());
        }
        for side in [Side::White, Side::Black] {
            if let PlayerKind::Agent(id) = self.player(side) {
                if id.trim().is_empty() {
                    return Err(format!("{side} is agent-controlled but has no agent id"));
                }
            }
        }
        if self.white.is_agent() && self.black.is_agent() && !self.agent_only {
            return Err("Both sides are agents but agent_only is not set".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchOutcome {
    Draw,
    WhiteWin,
    BlackWin,
    WhiteWinPoints,
    BlackWinPoints,
}

impl MatchOutcome {
    pub fn win_for(side: Side) -> Self {
        match side {
            Side::White => MatchOutcome::WhiteWin,
            Side::Black => MatchOutcome::BlackWin,
        }
    }

    pub fn points_win_for(side: Side) -> Self {
        match side {
            Side::White => MatchOutcome::WhiteWinPoints,
            Side::Black => MatchOutcome::BlackWinPoints,
        }
    }

    pub fn winner(self) -> Option<Side> {
        match self {
            MatchOutcome::Draw => None,
            MatchOutcome::WhiteWin | MatchOutcome::WhiteWinPoints => Some(Side::White),
            MatchOutcome::BlackWin | MatchOutcome::BlackWinPoints => Some(Side::Black),
        }
    }

    pub fn is_points_win(self) -> bool {
        matches!(self, MatchOutcome::WhiteWinPoints | MatchOutcome::BlackWinPoints)
    }
}

/// How the match loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchTermination {
    /// The rules engine raised an end-of-game signal.
    Rule,
    /// The half-move ceiling was reached.
    Budget,
    /// A side failed: transport error or exhausted retries.
    Failure,
    /// The side to move had no legal moves and nothing was raised.
    NoLegalMoves,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub outcome: MatchOutcome,
    /// Empty for draws.
    pub winning_agent: String,
    pub white_agent: String,
    pub black_agent: String,
    pub final_fen: String,
    pub end_reason: Option<EndReason>,
    pub termination: MatchTermination,
    pub half_moves: u32,
    /// Last evaluation seen, in pawns from White's perspective.
    pub final_score: Option<f64>,
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl MatchResult {
    pub fn end_reason_text(&self) -> &'static str {
        self.end_reason.map(EndReason::as_text).unwrap_or("Unknown")
    }

    /// Side that failed, when the match ended by failure.
    pub fn failed_side(&self) -> Option<Side> {
        match self.termination {
            MatchTermination::Failure => self.outcome.winner().map(Side::opposite),
            _ => None,
        }
    }
}

/// Running tally for one agent across a tournament.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStats {
    pub agent: String,
    pub wins: u32,
    pub wins_on_points: u32,
    pub losses: u32,
    pub draws: u32,
    /// Subset of `losses` forfeited by a transport error or exhausted retries
    pub failures: u32,
}

impl AgentStats {
    pub fn new(agent: &str) -> Self {
        Self {
            agent: agent.to_string(),
            ..Default::default()
        }
    }

    pub fn matches_played(&self) -> u32 {
        self.wins + self.wins_on_points + self.losses + self.draws
    }

    /// Chess scoring: a win of either kind is 1, a draw is 0.5.
    pub fn score(&self) -> f64 {
        f64::from(self.wins + self.wins_on_points) + f64::from(self.draws) * 0.5
    }
}
