//! Stockfish engine wrapper using UCI protocol (async I/O)

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use tracing::{debug, info};

use arena_core::fen::side_to_move;
use arena_core::Side;

use crate::error::EvalError;
use crate::scoring::{Evaluation, PositionEvaluator};

/// Raw result of a search, from the side to move's perspective.
#[derive(Debug, Clone, PartialEq)]
pub struct UciScore {
    /// Centipawn score
    pub cp: Option<i32>,
    /// Mate in N moves (positive = side to move mates)
    pub mate: Option<i32>,
    /// Best move in UCI notation
    pub best_move: String,
}

/// Stockfish engine instance
pub struct StockfishEngine {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl StockfishEngine {
    /// Spawn a new Stockfish process and initialize UCI
    pub async fn new(path: &str) -> Result<Self, EvalError> {
        Self::spawn(Command::new(path)).await
    }

    /// Spawn any UCI-speaking command and initialize it.
    pub async fn spawn(mut command: Command) -> Result<Self, EvalError> {
        let mut process = command
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| EvalError::Stockfish(format!("Failed to spawn Stockfish: {e}")))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| EvalError::Stockfish("Stockfish stdin unavailable".into()))?;
        let stdout = process
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| EvalError::Stockfish("Stockfish stdout unavailable".into()))?;

        let mut engine = Self {
            process,
            stdin,
            stdout,
        };

        // Initialize UCI
        engine.send("uci").await?;
        engine.wait_for("uciok").await?;

        engine.send("setoption name Threads value 1").await?;
        engine.send("setoption name Hash value 256").await?;
        engine.send("isready").await?;
        engine.wait_for("readyok").await?;

        Ok(engine)
    }

    /// Send a command to Stockfish
    async fn send(&mut self, cmd: &str) -> Result<(), EvalError> {
        debug!(cmd, "SF <");
        self.stdin
            .write_all(format!("{cmd}\n").as_bytes())
            .await
            .map_err(|e| EvalError::Stockfish(format!("Failed to write to Stockfish: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| EvalError::Stockfish(format!("Failed to flush stdin: {e}")))?;
        Ok(())
    }

    async fn read_line(&mut self, line: &mut String) -> Result<(), EvalError> {
        line.clear();
        let n = self
            .stdout
            .read_line(line)
            .await
            .map_err(|e| EvalError::Stockfish(format!("Failed to read from Stockfish: {e}")))?;
        if n == 0 {
            return Err(EvalError::Stockfish("Stockfish closed its output".into()));
        }
        Ok(())
    }

    /// Wait for a specific response line
    async fn wait_for(&mut self, expected: &str) -> Result<(), EvalError> {
        let mut line = String::new();
        loop {
            self.read_line(&mut line).await?;
            let trimmed = line.trim();
            debug!(line = trimmed, "SF >");
            if trimmed == expected {
                return Ok(());
            }
        }
    }

    /// Search a position to `depth` and return the last reported score.
    pub async fn search(&mut self, fen: &str, depth: u32) -> Result<UciScore, EvalError> {
        self.send(&format!("position fen {fen}")).await?;
        self.send(&format!("go depth {depth}")).await?;

        let mut result = UciScore {
            cp: None,
            mate: None,
            best_move: String::new(),
        };

        let mut line = String::new();
        loop {
            self.read_line(&mut line).await?;
            let trimmed = line.trim();

            if trimmed.starts_with("info") && trimmed.contains(" pv ") {
                if let Some(cp) = parse_cp(trimmed) {
                    result.cp = Some(cp);
                    result.mate = None;
                }
                if let Some(mate) = parse_mate(trimmed) {
                    result.mate = Some(mate);
                    result.cp = None;
                }
            } else if trimmed.starts_with("bestmove") {
                let parts: Vec<&str> = trimmed.split_whitespace().collect();
                if parts.len() >= 2 && parts[1] != "(none)" {
                    result.best_move = parts[1].to_string();
                }
                break;
            }
        }

        Ok(result)
    }

    /// Send quit command and wait for process to exit
    pub async fn quit(&mut self) {
        let _ = self.send("quit").await;
        let _ = self.process.wait().await;
    }
}

impl Drop for StockfishEngine {
    fn drop(&mut self) {
        // Best-effort synchronous kill in drop
        let _ = self.process.start_kill();
    }
}

/// A local engine process used as a `PositionEvaluator`. Searches are
/// serialized on the process.
pub struct LocalStockfish {
    engine: Mutex<StockfishEngine>,
    depth: u32,
}

impl LocalStockfish {
    pub async fn spawn(path: &str, depth: u32) -> Result<Self, EvalError> {
        let engine = StockfishEngine::new(path).await?;
        info!(path, depth, "Local Stockfish ready");
        Ok(Self::from_engine(engine, depth))
    }

    pub fn from_engine(engine: StockfishEngine, depth: u32) -> Self {
        Self {
            engine: Mutex::new(engine),
            depth,
        }
    }

    pub async fn quit(&self) {
        self.engine.lock().await.quit().await;
    }
}

#[async_trait]
impl PositionEvaluator for LocalStockfish {
    async fn evaluate(&self, fen: &str) -> Result<Evaluation, EvalError> {
        let score = self.engine.lock().await.search(fen, self.depth).await?;
        Ok(to_white_perspective(&score, side_to_move(fen)))
    }
}

/// Convert a side-to-move centipawn score into White-perspective pawns.
pub fn to_white_perspective(score: &UciScore, to_move: Side) -> Evaluation {
    let sign = match to_move {
        Side::White => 1,
        Side::Black => -1,
    };
    Evaluation {
        score: f64::from(score.cp.unwrap_or(0) * sign) / 100.0,
        mate: score.mate.map(|m| m * sign),
        best_move: (!score.best_move.is_empty()).then(|| score.best_move.clone()),
    }
}

/// Parse centipawn score from info line
fn parse_cp(line: &str) -> Option<i32> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    for (i, part) in parts.iter().enumerate() {
        if *part == "cp" && i + 1 < parts.len() {
            return parts[i + 1].parse().ok();
        }
    }
    None
}

/// Parse mate score from info line
fn parse_mate(line: &str) -> Option<i32> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    for (i, part) in parts.iter().enumerate() {
        if *part == "mate" && i + 1 < parts.len() {
            return parts[i + 1].parse().ok();
        }
    }
    None
}
