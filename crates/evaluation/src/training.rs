//! Fine-tuning data generation from recorded game transcripts.
//!
//! Each transcript is replayed, a random sample of its positions is scored
//! through the evaluation cache, and every scored position becomes one chat
//! formatted JSONL line whose assistant answer is the engine's best move.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tracing::{info, warn};

use arena_core::fen::side_to_move;
use arena_core::transcript::{transcript_positions, BoardState};
use arena_core::{MoveNotation, RulesEngine, ShakmatyBoard};

use crate::cache::EvaluationCache;
use crate::error::EvalError;

const SYSTEM_PROMPT: &str = "You are a chess playing AI. Reply in json format.";

pub const TRAIN_FILE: &str = "train_data.jsonl";
pub const VALIDATION_FILE: &str = "validation_data.jsonl";

#[derive(Clone, Debug)]
pub struct TrainingConfig {
    pub train_transcripts: usize,
    pub validation_transcripts: usize,
    pub positions_per_transcript: usize,
    /// Positions processed concurrently per transcript
    pub parallelism: usize,
    /// In-flight best-move lookups across all positions
    pub max_concurrent_calls: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            train_transcripts: 500,
            validation_transcripts: 50,
            positions_per_transcript: 10,
            parallelism: num_cpus::get() * 2,
            max_concurrent_calls: 10,
        }
    }
}

/// One line of the transcripts input file.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptRecord {
    #[serde(default)]
    pub prompt: String,
    /// Numbered move text, e.g. `1.e4 e5 2.Nf3 Nc6`
    pub completion: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FineTuneLine {
    pub messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct BestMoveAnswer<'a> {
    #[serde(rename = "BestMove")]
    best_move: &'a str,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PopulateReport {
    pub lines: usize,
    pub skipped_transcripts: usize,
    pub failed_positions: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerationReport {
    pub train: PopulateReport,
    pub validation: PopulateReport,
    pub train_path: PathBuf,
    pub validation_path: PathBuf,
}

pub struct TrainingDataGenerator {
    cache: EvaluationCache,
    config: TrainingConfig,
    admission: Arc<Semaphore>,
    file_lock: Mutex<()>,
    progress: Option<mpsc::UnboundedSender<String>>,
}

impl TrainingDataGenerator {
    pub fn new(cache: EvaluationCache, config: TrainingConfig) -> Self {
        let admission = Arc::new(Semaphore::new(config.max_concurrent_calls.max(1)));
        Self {
            cache,
            config,
            admission,
            file_lock: Mutex::new(()),
            progress: None,
        }
    }

    /// Send a line of text per generated (or failed) position.
    pub fn with_progress(mut self, progress: mpsc::UnboundedSender<String>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Read `transcripts_path`, shuffle, and write train and validation files
    /// into `out_dir`. Existing output files are truncated.
    pub async fn generate(
        &self,
        transcripts_path: &Path,
        out_dir: &Path,
    ) -> Result<GenerationReport, EvalError> {
        let raw = fs::read_to_string(transcripts_path).await?;
        let mut transcripts = parse_transcripts(&raw);
        transcripts.shuffle(&mut rand::thread_rng());
        info!(
            count = transcripts.len(),
            path = %transcripts_path.display(),
            "Loaded transcripts"
        );

        let train_end = self.config.train_transcripts.min(transcripts.len());
        let validation_end = (train_end + self.config.validation_transcripts).min(transcripts.len());

        fs::create_dir_all(out_dir).await?;
        let train_path = out_dir.join(TRAIN_FILE);
        let validation_path = out_dir.join(VALIDATION_FILE);
        fs::File::create(&train_path).await?;
        fs::File::create(&validation_path).await?;

        let train = self
            .populate(&transcripts[..train_end], &train_path)
            .await?;
        let validation = self
            .populate(&transcripts[train_end..validation_end], &validation_path)
            .await?;

        info!(
            train_lines = train.lines,
            validation_lines = validation.lines,
            "Training data generated"
        );

        Ok(GenerationReport {
            train,
            validation,
            train_path,
            validation_path,
        })
    }

    /// Append one line per sampled position of each transcript to `path`.
    pub async fn populate(
        &self,
        transcripts: &[String],
        path: &Path,
    ) -> Result<PopulateReport, EvalError> {
        let mut report = PopulateReport::default();

        for (index, transcript) in transcripts.iter().enumerate() {
            let states = match transcript_positions(transcript) {
                Ok(states) => states,
                Err(e) => {
                    warn!(transcript = index, error = %e, "Skipping transcript that does not replay");
                    report.skipped_transcripts += 1;
                    continue;
                }
            };

            let sample = sample_positions(&states, self.config.positions_per_transcript);
            info!(transcript = index, positions = sample.len(), "Starting transcript");

            let results: Vec<Result<(), EvalError>> = stream::iter(sample)
                .map(|state| self.process_position(state, path))
                .buffer_unordered(self.config.parallelism.max(1))
                .collect()
                .await;

            for result in results {
                match result {
                    Ok(()) => report.lines += 1,
                    Err(e) => {
                        warn!(transcript = index, error = %e, "Position skipped");
                        self.report(format!("ERROR: {e}"));
                        report.failed_positions += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    async fn process_position(&self, state: BoardState, path: &Path) -> Result<(), EvalError> {
        let board = ShakmatyBoard::from_fen(&state.fen)
            .map_err(|e| EvalError::InvalidPosition(e.to_string()))?;
        let moves = board.legal_moves(side_to_move(&state.fen));

        let evaluation = {
            let _permit = self
                .admission
                .acquire()
                .await
                .map_err(|_| EvalError::Shutdown)?;
            self.cache.evaluate(&state.fen).await?
        };
        let best_move = evaluation
            .best_move
            .ok_or_else(|| EvalError::Service(format!("no best move for {}", state.fen)))?;

        let line = fine_tune_line(&moves, &state.fen, &best_move)?;
        self.append_line(path, &serde_json::to_string(&line)?).await?;

        self.report(format!(
            "Line generated with BestMove:{best_move}, FEN state:{}",
            state.fen
        ));
        Ok(())
    }

    async fn append_line(&self, path: &Path, line: &str) -> Result<(), EvalError> {
        let _guard = self.file_lock.lock().await;
        let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
        file.write_all(format!("{line}\n").as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    fn report(&self, message: String) {
        if let Some(progress) = &self.progress {
            let _ = progress.send(message);
        }
    }
}

/// Completion text of every parseable input line.
pub fn parse_transcripts(raw: &str) -> Vec<String> {
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<TranscriptRecord>(line) {
            Ok(record) => Some(record.completion),
            Err(e) => {
                warn!(error = %e, "Skipping malformed transcript line");
                None
            }
        })
        .collect()
}

/// Up to `n` distinct positions, in random order.
pub fn sample_positions(states: &[BoardState], n: usize) -> Vec<BoardState> {
    let mut rng = rand::thread_rng();
    states.choose_multiple(&mut rng, n).cloned().collect()
}

pub fn training_prompt(moves: &[MoveNotation], fen: &str) -> String {
    let available = moves
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Given the available moves based on the current board state in FEN notation, \
         think carefully about which move would be best, then make that move. \
         Be sure to note your color indicated in the FEN notation before deciding.\n\
         ## Output Json Example\n{{\n  \"BestMove\":\"<-best move->\"\n}}\n\n\
         ## Available Moves\n{available}\n\n\
         ## Board State Fen\n{fen}"
    )
}

pub fn fine_tune_line(
    moves: &[MoveNotation],
    fen: &str,
    best_move: &str,
) -> Result<FineTuneLine, EvalError> {
    let answer = serde_json::to_string(&BestMoveAnswer { best_move })?;
    Ok(FineTuneLine {
        messages: vec![
            ChatMessage {
                role: "system".into(),
                content: SYSTEM_PROMPT.into(),
            },
            ChatMessage {
                role: "user".into(),
                content: training_prompt(moves, fen),
            },
            ChatMessage {
                role: "assistant".into(),
                content: answer,
            },
        ],
    })
}
