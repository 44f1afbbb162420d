//! LLM agent chess arena: turn execution with retries, match orchestration,
//! and tournaments between two agents.

pub mod agent;
pub mod cancel;
pub mod clients;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod tournament;
pub mod turn;

pub use agent::{MoveAgent, MoveProposal, MoveRequest};
pub use cancel::{CancelHandle, CancelToken};
pub use config::{ArenaConfig, MatchConfig};
pub use error::{AgentError, ArenaError, TurnError};
pub use orchestrator::{MatchOrchestrator, MatchState};
pub use tournament::{EvalSummary, MatchCompleted, TournamentRunner};
pub use turn::{AgentTurnExecutor, RetryPolicy, TurnReport, TurnResult};
