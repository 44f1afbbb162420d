//! Small helpers over FEN strings that don't need a parsed position.

use crate::board::Side;

/// Standard starting position.
pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Strips move counters from FEN, keeping only position + side + castling + ep.
pub fn normalize_fen(fen: &str) -> String {
    fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}

/// Side to move according to the second FEN field. Defaults to White when the
/// field is missing or malformed.
pub fn side_to_move(fen: &str) -> Side {
    match fen.split_whitespace().nth(1) {
        Some("b") => Side::Black,
        _ => Side::White,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_fen() {
        let fen = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1";
        let normalized = normalize_fen(fen);
        assert_eq!(normalized, "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3");
    }

    #[test]
    fn test_side_to_move() {
        assert_eq!(side_to_move(START_FEN), Side::White);
        assert_eq!(side_to_move("8/8/8/8/8/8/8/K1k5 b - - 0 1"), Side::Black);
        assert_eq!(side_to_move("garbage"), Side::White);
    }
}
