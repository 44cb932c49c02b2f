//! Moves and Single-Game Resolution
//!
//! A game is one rock/paper/scissors exchange. Resolution is a pure
//! function of the two moves.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Deserialize};

/// One hand shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Move {
    /// Beats scissors.
    Rock,
    /// Beats rock.
    Paper,
    /// Beats paper.
    Scissors,
}

impl Move {
    /// All moves, in declaration order.
    pub const ALL: [Move; 3] = [Move::Rock, Move::Paper, Move::Scissors];

    /// The move this one defeats.
    #[inline]
    pub fn defeats(self) -> Move {
        match self {
            Move::Rock => Move::Scissors,
            Move::Paper => Move::Rock,
            Move::Scissors => Move::Paper,
        }
    }

    /// Check if this move beats another.
    #[inline]
    pub fn beats(self, other: Move) -> bool {
        self.defeats() == other
    }

    /// Lowercase name, matching the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            Move::Rock => "rock",
            Move::Paper => "paper",
            Move::Scissors => "scissors",
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a move name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown move: {0:?}")]
pub struct ParseMoveError(pub String);

impl FromStr for Move {
    type Err = ParseMoveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rock" | "r" => Ok(Move::Rock),
            "paper" | "p" => Ok(Move::Paper),
            "scissors" | "s" => Ok(Move::Scissors),
            _ => Err(ParseMoveError(s.to_string())),
        }
    }
}

/// Which side of a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// First listed player.
    A,
    /// Second listed player.
    B,
}

impl Side {
    /// The other side.
    pub fn opponent(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

/// Outcome of one game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameOutcome {
    /// Side A won the game.
    SideA,
    /// Side B won the game.
    SideB,
    /// Equal moves.
    Tie,
}

impl GameOutcome {
    /// Winning side, if any.
    pub fn winner(self) -> Option<Side> {
        match self {
            GameOutcome::SideA => Some(Side::A),
            GameOutcome::SideB => Some(Side::B),
            GameOutcome::Tie => None,
        }
    }
}

/// Resolve a single game between side A's and side B's moves.
pub fn resolve_game(move_a: Move, move_b: Move) -> GameOutcome {
    if move_a == move_b {
        GameOutcome::Tie
    } else if move_a.beats(move_b) {
        GameOutcome::SideA
    } else {
        GameOutcome::SideB
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_winning_pairs() {
        assert_eq!(resolve_game(Move::Rock, Move::Scissors), GameOutcome::SideA);
        assert_eq!(resolve_game(Move::Paper, Move::Rock), GameOutcome::SideA);
        assert_eq!(resolve_game(Move::Scissors, Move::Paper), GameOutcome::SideA);
    }

    #[test]
    fn test_equal_moves_tie() {
        for mv in Move::ALL {
            assert_eq!(resolve_game(mv, mv), GameOutcome::Tie);
        }
    }

    #[test]
    fn test_antisymmetric() {
        for a in Move::ALL {
            for b in Move::ALL {
                let forward = resolve_game(a, b);
                let backward = resolve_game(b, a);
                match forward {
                    GameOutcome::Tie => assert_eq!(backward, GameOutcome::Tie),
                    GameOutcome::SideA => assert_eq!(backward, GameOutcome::SideB),
                    GameOutcome::SideB => assert_eq!(backward, GameOutcome::SideA),
                }
            }
        }
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("Rock".parse::<Move>(), Ok(Move::Rock));
        assert_eq!(" s ".parse::<Move>(), Ok(Move::Scissors));
        assert!("lizard".parse::<Move>().is_err());
        assert_eq!(Move::Paper.to_string(), "paper");
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&Move::Scissors).unwrap();
        assert_eq!(json, "\"scissors\"");
        let outcome: GameOutcome = serde_json::from_str("\"side_b\"").unwrap();
        assert_eq!(outcome, GameOutcome::SideB);
    }
}
