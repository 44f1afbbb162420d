//! Board seam and match data model shared by the arena crates.
//!
//! Move legality is delegated to shakmaty behind the `RulesEngine` trait so the
//! orchestrator can be driven by scripted boards in tests.

pub mod board;
pub mod fen;
pub mod game_data;
pub mod transcript;

pub use board::{EndReason, MoveNotation, RulesEngine, RulesError, ShakmatyBoard, Side, TurnOutcome};
pub use game_data::{AgentStats, GameOptions, MatchOutcome, MatchResult, MatchTermination, PlayerKind};
