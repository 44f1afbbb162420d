//! Move-text parsing with a small regex-based tokenizer.
//!
//! Transcripts look like `1.e4 e5 2.Nf3 Nc6` (optionally with PGN headers,
//! comments and variations). They are replayed into one snapshot per half-move.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use shakmaty::san::San;
use shakmaty::{Chess, Position};

use crate::board::{fen_of, render_ascii, RulesError};

static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[[^\]]*\]").unwrap());
static COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{[^}]*\}").unwrap());
static VARIATION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\([^)]*\)").unwrap());
static MOVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[KQRBN]?[a-h]?[1-8]?x?[a-h][1-8](?:=[QRBN])?[+#]?|O-O-O|O-O").unwrap()
});

/// Position after a half-move of a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardState {
    pub fen: String,
    pub ascii: String,
}

/// Extract SAN moves from move text (after removing headers, comments, variations).
pub fn extract_moves(text: &str) -> Vec<String> {
    let no_headers = HEADER_RE.replace_all(text, "");
    let no_comments = COMMENT_RE.replace_all(&no_headers, "");
    let no_variations = VARIATION_RE.replace_all(&no_comments, "");

    MOVE_RE
        .find_iter(&no_variations)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Replay SAN moves from the standard start, one `BoardState` per move.
/// Fails on the first move that doesn't parse or isn't legal.
pub fn replay(moves: &[String]) -> Result<Vec<BoardState>, RulesError> {
    let mut pos = Chess::default();
    let mut states = Vec::with_capacity(moves.len());

    for (index, san_str) in moves.iter().enumerate() {
        let illegal = || RulesError::IllegalMove {
            san: san_str.clone(),
            index,
        };
        let san: San = san_str.parse().map_err(|_| illegal())?;
        let mv = san.to_move(&pos).map_err(|_| illegal())?;
        pos.play_unchecked(mv);
        states.push(BoardState {
            fen: fen_of(&pos),
            ascii: render_ascii(&pos),
        });
    }

    Ok(states)
}

/// `extract_moves` followed by `replay`.
pub fn transcript_positions(text: &str) -> Result<Vec<BoardState>, RulesError> {
    replay(&extract_moves(text))
}
