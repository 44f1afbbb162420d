//! Position evaluation: scoring clients, the TTL cache with its batch drain,
//! and bulk training-data generation.

pub mod cache;
pub mod config;
pub mod error;
pub mod scoring;
pub mod stockfish;
pub mod training;

use std::sync::Arc;

pub use cache::{CacheConfig, CacheStats, EvaluationCache};
pub use config::EvaluationConfig;
pub use error::EvalError;
pub use scoring::{Evaluation, PositionEvaluator, StockfishOnlineClient, Verdict};
pub use training::{TrainingConfig, TrainingDataGenerator};

/// The evaluator `config` asks for: a local engine when `stockfish_path` is
/// set, otherwise the HTTP service.
pub async fn evaluator_from_config(
    config: &EvaluationConfig,
) -> Result<Arc<dyn PositionEvaluator>, EvalError> {
    match &config.stockfish_path {
        Some(path) => Ok(Arc::new(
            stockfish::LocalStockfish::spawn(path, config.scoring_depth).await?,
        )),
        None => Ok(Arc::new(StockfishOnlineClient::new(config)?)),
    }
}
