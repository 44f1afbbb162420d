//! Build fine-tuning data from recorded game transcripts.
//!
//! Reads a JSONL file of `{"prompt": ..., "completion": "1.e4 e5 ..."}` lines,
//! scores sampled positions through the evaluation cache, and writes
//! `train_data.jsonl` and `validation_data.jsonl` into the output directory.
//!
//! Usage: cargo run --release --bin generate-training-data -- <transcripts.jsonl> <out_dir> [--train N] [--validation N] [--positions N]

use std::env;
use std::path::Path;

use evaluation::{EvaluationCache, EvaluationConfig, TrainingConfig, TrainingDataGenerator};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!(
            "Usage: {} <transcripts.jsonl> <out_dir> [--train N] [--validation N] [--positions N]",
            args[0]
        );
        std::process::exit(1);
    }

    let transcripts_path = Path::new(&args[1]);
    let out_dir = Path::new(&args[2]);

    let config = EvaluationConfig::from_env();
    let defaults = TrainingConfig {
        max_concurrent_calls: config.max_concurrent_calls,
        ..TrainingConfig::default()
    };
    let mut training = defaults.clone();

    let mut i = 3;
    while i < args.len() {
        match args[i].as_str() {
            "--train" => {
                training.train_transcripts = args
                    .get(i + 1)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.train_transcripts);
                i += 2;
            }
            "--validation" => {
                training.validation_transcripts = args
                    .get(i + 1)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.validation_transcripts);
                i += 2;
            }
            "--positions" => {
                training.positions_per_transcript = args
                    .get(i + 1)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.positions_per_transcript);
                i += 2;
            }
            _ => i += 1,
        }
    }

    info!(?training, "Generating training data");

    let evaluator = evaluation::evaluator_from_config(&config).await?;
    let cache = EvaluationCache::start(evaluator, config.cache.clone());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let generator = TrainingDataGenerator::new(cache.clone(), training).with_progress(tx);

    let progress = tokio::spawn(async move {
        let mut count = 0u64;
        while let Some(line) = rx.recv().await {
            count += 1;
            info!("{count} {line}");
        }
    });

    let report = generator.generate(transcripts_path, out_dir).await;
    drop(generator);
    let _ = progress.await;
    let report = report?;

    println!("Train:      {} lines -> {}", report.train.lines, report.train_path.display());
    println!(
        "Validation: {} lines -> {}",
        report.validation.lines,
        report.validation_path.display()
    );
    println!(
        "Skipped transcripts: {}, failed positions: {}",
        report.train.skipped_transcripts + report.validation.skipped_transcripts,
        report.train.failed_positions + report.validation.failed_positions
    );

    cache.shutdown().await;
    Ok(())
}
