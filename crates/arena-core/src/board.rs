//! Rules-engine seam.
//!
//! The orchestrator only ever touches the board through `RulesEngine`: apply a
//! move, read the position, list legal moves. End-of-game signals come back in
//! the `TurnOutcome` of the move that caused them.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, File, Position, Rank, Role, Square};
use thiserror::Error;

use crate::fen::normalize_fen;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RulesError {
    #[error("Invalid FEN: {0}")]
    InvalidFen(String),

    #[error("Illegal position: {0}")]
    IllegalPosition(String),

    #[error("Illegal move {san} at half-move {index}")]
    IllegalMove { san: String, index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::White => "White",
            Side::Black => "Black",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Color> for Side {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }
}

/// Why a game ended, as raised by the rules engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    Checkmate,
    Stalemate,
    Resigned,
    Timeout,
    DrawDeclared,
    InsufficientMaterial,
    FiftyMoveRule,
    Repetition,
}

impl EndReason {
    pub fn as_text(self) -> &'static str {
        match self {
            EndReason::Checkmate => "Checkmate",
            EndReason::Stalemate => "Stalemate",
            EndReason::Resigned => "Resigned",
            EndReason::Timeout => "Timeout",
            EndReason::DrawDeclared => "Draw Declared",
            EndReason::InsufficientMaterial => "Insufficient Material",
            EndReason::FiftyMoveRule => "Fifty Move Rule",
            EndReason::Repetition => "Repetition",
        }
    }

    /// Reasons that can carry a winner. The rest are always draws.
    pub fn is_decisive(self) -> bool {
        matches!(self, EndReason::Checkmate | EndReason::Resigned | EndReason::Timeout)
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_text())
    }
}

/// A move as a pair of squares, the shape agents are asked to answer in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveNotation {
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "To")]
    pub to: String,
}

impl MoveNotation {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl fmt::Display for MoveNotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)
    }
}

/// Details of a move that the rules engine accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMove {
    pub notation: MoveNotation,
    pub capture: bool,
    pub check: bool,
}

/// Result of `RulesEngine::apply_move`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Applied(AppliedMove),
    Rejected(String),
    /// The move was played and ended the game. `winner` is `None` for draws.
    AppliedAndGameEnded {
        applied: AppliedMove,
        winner: Option<Side>,
        reason: EndReason,
    },
}

impl TurnOutcome {
    pub fn is_applied(&self) -> bool {
        !matches!(self, TurnOutcome::Rejected(_))
    }
}

/// The board collaborator. Implementations own the full game state.
pub trait RulesEngine: Send {
    /// Back to the starting position with all history cleared.
    fn reset(&mut self);

    fn side_to_move(&self) -> Side;

    /// Current position as FEN.
    fn position_notation(&self) -> String;

    /// Human-readable board, white pieces uppercase, empty squares '.'.
    fn ascii(&self) -> String;

    /// Legal moves for `side`; empty when it is not that side's turn or the
    /// game is over.
    fn legal_moves(&self, side: Side) -> Vec<MoveNotation>;

    fn apply_move(&mut self, from: &str, to: &str) -> TurnOutcome;
}

/// `RulesEngine` backed by shakmaty.
#[derive(Debug, Clone)]
pub struct ShakmatyBoard {
    start: Chess,
    pos: Chess,
    /// Occurrences of each normalized position, for threefold repetition.
    seen: HashMap<String, u32>,
    ended: Option<(Option<Side>, EndReason)>,
}

impl Default for ShakmatyBoard {
    fn default() -> Self {
        Self::from_position(Chess::default())
    }
}

impl ShakmatyBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fen(fen: &str) -> Result<Self, RulesError> {
        let parsed: Fen = fen
            .parse()
            .map_err(|e| RulesError::InvalidFen(format!("{fen}: {e}")))?;
        let pos: Chess = parsed
            .into_position(CastlingMode::Standard)
            .map_err(|e| RulesError::IllegalPosition(e.to_string()))?;
        Ok(Self::from_position(pos))
    }

    fn from_position(pos: Chess) -> Self {
        let mut board = Self {
            start: pos.clone(),
            pos,
            seen: HashMap::new(),
            ended: None,
        };
        board.record_position();
        board
    }

    /// The game-ending signal raised so far, if any.
    pub fn ended(&self) -> Option<(Option<Side>, EndReason)> {
        self.ended
    }

    fn record_position(&mut self) -> u32 {
        let key = normalize_fen(&self.position_notation());
        let count = self.seen.entry(key).or_insert(0);
        *count += 1;
        *count
    }

    /// Resolve a pair of squares to a legal move. A pawn reaching the last
    /// rank without a promotion piece becomes a queen.
    fn resolve(&self, from: &str, to: &str) -> Result<shakmaty::Move, String> {
        let from_sq: Square = from
            .trim()
            .to_ascii_lowercase()
            .parse()
            .map_err(|_| format!("'{from}' is not a square"))?;
        let (to_part, promotion) = split_promotion(to.trim());
        let to_sq: Square = to_part
            .to_ascii_lowercase()
            .parse()
            .map_err(|_| format!("'{to}' is not a square"))?;

        let uci = UciMove::Normal {
            from: from_sq,
            to: to_sq,
            promotion,
        };
        match uci.to_move(&self.pos) {
            Ok(mv) => Ok(mv),
            Err(_) if promotion.is_none() => {
                let queened = UciMove::Normal {
                    from: from_sq,
                    to: to_sq,
                    promotion: Some(Role::Queen),
                };
                queened
                    .to_move(&self.pos)
                    .map_err(|_| format!("{from}-{to} is not a legal move in this position"))
            }
            Err(_) => Err(format!("{from}-{to} is not a legal move in this position")),
        }
    }

    fn detect_end(&self, repetitions: u32) -> Option<(Option<Side>, EndReason)> {
        if self.pos.is_checkmate() {
            // The side to move is mated.
            return Some((Some(Side::from(self.pos.turn()).opposite()), EndReason::Checkmate));
        }
        if self.pos.is_stalemate() {
            return Some((None, EndReason::Stalemate));
        }
        if self.pos.is_insufficient_material() {
            return Some((None, EndReason::InsufficientMaterial));
        }
        if self.pos.halfmoves() >= 100 {
            return Some((None, EndReason::FiftyMoveRule));
        }
        if repetitions >= 3 {
            return Some((None, EndReason::Repetition));
        }
        None
    }
}

impl RulesEngine for ShakmatyBoard {
    fn reset(&mut self) {
        self.pos = self.start.clone();
        self.seen.clear();
        self.ended = None;
        self.record_position();
    }

    fn side_to_move(&self) -> Side {
        self.pos.turn().into()
    }

    fn position_notation(&self) -> String {
        fen_of(&self.pos)
    }

    fn ascii(&self) -> String {
        render_ascii(&self.pos)
    }

    fn legal_moves(&self, side: Side) -> Vec<MoveNotation> {
        if self.ended.is_some() || self.side_to_move() != side {
            return Vec::new();
        }
        self.pos
            .legal_moves()
            .iter()
            .filter_map(|m| match m.to_uci(CastlingMode::Standard) {
                UciMove::Normal { from, to, .. } => {
                    Some(MoveNotation::new(from.to_string(), to.to_string()))
                }
                _ => None,
            })
            .fold(Vec::new(), |mut acc, m| {
                // Under-promotions share squares with the queen promotion.
                if !acc.contains(&m) {
                    acc.push(m);
                }
                acc
            })
    }

    fn apply_move(&mut self, from: &str, to: &str) -> TurnOutcome {
        if let Some((_, reason)) = self.ended {
            return TurnOutcome::Rejected(format!("The game is already over ({reason})"));
        }
        if from.trim().is_empty() || to.trim().is_empty() {
            return TurnOutcome::Rejected("Move is missing a From or To square".to_string());
        }

        let mv = match self.resolve(from, to) {
            Ok(mv) => mv,
            Err(reason) => return TurnOutcome::Rejected(reason),
        };

        let capture = mv.is_capture();
        self.pos.play_unchecked(mv);
        let repetitions = self.record_position();

        let applied = AppliedMove {
            notation: MoveNotation::new(from.trim(), to.trim()),
            capture,
            check: self.pos.is_check(),
        };

        match self.detect_end(repetitions) {
            Some((winner, reason)) => {
                self.ended = Some((winner, reason));
                TurnOutcome::AppliedAndGameEnded {
                    applied,
                    winner,
                    reason,
                }
            }
            None => TurnOutcome::Applied(applied),
        }
    }
}

pub(crate) fn fen_of(pos: &Chess) -> String {
    Fen::from_position(pos, EnPassantMode::Legal).to_string()
}

pub(crate) fn render_ascii(pos: &Chess) -> String {
    let board = pos.board();
    let mut out = String::with_capacity(72);
    for rank in (0..8u32).rev() {
        for file in 0..8u32 {
            let sq = Square::from_coords(File::new(file), Rank::new(rank));
            out.push(board.piece_at(sq).map(|p| p.char()).unwrap_or('.'));
        }
        out.push('\n');
    }
    out
}

/// Accepts "e8", "e8q" and "e8=Q".
fn split_promotion(to: &str) -> (&str, Option<Role>) {
    if to.len() <= 2 {
        return (to, None);
    }
    // Agent text is untrusted; a multi-byte char may straddle the split.
    let (Some(square), Some(rest)) = (to.get(..2), to.get(2..)) else {
        return (to, None);
    };
    let piece = rest.trim_start_matches('=').chars().next();
    let role = piece.and_then(|c| Role::from_char(c.to_ascii_lowercase()));
    (square, role)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play(board: &mut ShakmatyBoard, moves: &[(&str, &str)]) -> TurnOutcome {
        let mut last = TurnOutcome::Rejected("nothing played".into());
        for (from, to) in moves {
            last = board.apply_move(from, to);
            assert!(last.is_applied(), "{from}-{to} rejected: {last:?}");
        }
        last
    }

    #[test]
    fn test_fools_mate_raises_checkmate_for_black() {
        let mut board = ShakmatyBoard::new();
        let last = play(
            &mut board,
            &[("f2", "f3"), ("e7", "e5"), ("g2", "g4"), ("d8", "h4")],
        );
        match last {
            TurnOutcome::AppliedAndGameEnded { winner, reason, applied } => {
                assert_eq!(winner, Some(Side::Black));
                assert_eq!(reason, EndReason::Checkmate);
                assert!(applied.check);
            }
            other => panic!("expected game end, got {other:?}"),
        }
        assert!(board.legal_moves(Side::White).is_empty());
        assert!(!board.apply_move("a2", "a3").is_applied());
    }

    #[test]
    fn test_illegal_and_malformed_moves_are_rejected() {
        let mut board = ShakmatyBoard::new();
        assert!(matches!(board.apply_move("e2", "e5"), TurnOutcome::Rejected(_)));
        assert!(matches!(board.apply_move("z9", "e4"), TurnOutcome::Rejected(_)));
        assert!(matches!(board.apply_move("", ""), TurnOutcome::Rejected(_)));
        // Black pieces can't move on White's turn
        assert!(matches!(board.apply_move("e7", "e5"), TurnOutcome::Rejected(_)));
        assert_eq!(board.side_to_move(), Side::White);
    }

    #[test]
    fn test_non_ascii_squares_are_rejected() {
        let mut board = ShakmatyBoard::new();
        assert!(matches!(board.apply_move("e2", "eé"), TurnOutcome::Rejected(_)));
        assert!(matches!(board.apply_move("e2", "é4"), TurnOutcome::Rejected(_)));
        assert!(matches!(board.apply_move("é2", "e4"), TurnOutcome::Rejected(_)));
        assert!(matches!(board.apply_move("e2", "e4ü"), TurnOutcome::Applied(_)));
        assert_eq!(board.side_to_move(), Side::Black);
    }

    #[test]
    fn test_legal_moves_from_start() {
        let board = ShakmatyBoard::new();
        let moves = board.legal_moves(Side::White);
        assert_eq!(moves.len(), 20);
        assert!(moves.contains(&MoveNotation::new("e2", "e4")));
        assert!(board.legal_moves(Side::Black).is_empty());
    }

    #[test]
    fn test_castling_as_king_two_squares() {
        let mut board =
            ShakmatyBoard::from_fen("r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1").unwrap();
        assert!(board.legal_moves(Side::White).contains(&MoveNotation::new("e1", "g1")));
        assert!(board.apply_move("e1", "g1").is_applied());
        assert!(board.position_notation().starts_with("r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R4RK1 b kq"));
    }

    #[test]
    fn test_promotion_defaults_to_queen() {
        let mut board = ShakmatyBoard::from_fen("8/P6k/8/8/8/8/8/K7 w - - 0 1").unwrap();
        assert!(board.apply_move("a7", "a8").is_applied());
        assert!(board.position_notation().starts_with("Q7/7k/"));

        let mut board = ShakmatyBoard::from_fen("8/P6k/8/8/8/8/8/K7 w - - 0 1").unwrap();
        assert!(board.apply_move("a7", "a8n").is_applied());
        assert!(board.position_notation().starts_with("N7/7k/"));
    }

    #[test]
    fn test_threefold_repetition() {
        let mut board = ShakmatyBoard::new();
        let shuffle = [("g1", "f3"), ("g8", "f6"), ("f3", "g1"), ("f6", "g8")];
        play(&mut board, &shuffle);
        let last = play(&mut board, &shuffle);
        assert!(matches!(
            last,
            TurnOutcome::AppliedAndGameEnded {
                winner: None,
                reason: EndReason::Repetition,
                ..
            }
        ));
    }

    #[test]
    fn test_reset_clears_history() {
        let mut board = ShakmatyBoard::new();
        play(&mut board, &[("e2", "e4")]);
        board.reset();
        assert_eq!(board.position_notation(), crate::fen::START_FEN);
        assert_eq!(board.side_to_move(), Side::White);
        assert!(board.ended().is_none());
    }

    #[test]
    fn test_ascii_board() {
        let board = ShakmatyBoard::new();
        let ascii = board.ascii();
        let rows: Vec<&str> = ascii.lines().collect();
        assert_eq!(rows[0], "rnbqkbnr");
        assert_eq!(rows[4], "........");
        assert_eq!(rows[7], "RNBQKBNR");
    }

    #[test]
    fn test_split_promotion() {
        assert_eq!(split_promotion("e8"), ("e8", None));
        assert_eq!(split_promotion("e8q"), ("e8", Some(Role::Queen)));
        assert_eq!(split_promotion("e8=N"), ("e8", Some(Role::Knight)));
    }
}
