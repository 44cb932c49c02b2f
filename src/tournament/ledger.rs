//! Move Ledger
//!
//! Per-match record of hidden (pending) moves, revealed moves, scores
//! and game history. Pure data plus the move-submission rule; scoring
//! lives in the resolver.

use serde::{Serialize, Deserialize};

use crate::tournament::error::TransitionError;
use crate::tournament::moves::{GameOutcome, Move, Side};
use crate::tournament::state::{MatchId, MatchRef, PlayerId};

/// Match lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Accepting moves.
    Active,
    /// Immutable.
    Finished,
}

/// One player's slot in a match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSide {
    /// Player on this side
    pub player_id: PlayerId,
    /// Submitted but not yet revealed
    pub pending_move: Option<Move>,
    /// Move played in the last resolved game
    pub revealed_move: Option<Move>,
    /// Games won so far
    pub games_won: u32,
}

impl MatchSide {
    fn new(player_id: PlayerId) -> Self {
        Self {
            player_id,
            pending_move: None,
            revealed_move: None,
            games_won: 0,
        }
    }
}

/// One resolved game.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    /// 1-based game number within the match
    pub game_number: u32,
    /// Side A's move
    pub move_a: Move,
    /// Side B's move
    pub move_b: Move,
    /// Result
    pub winner: GameOutcome,
}

/// Final result. Winner and loser are always set together.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOutcome {
    /// Advancing player
    pub winner_id: PlayerId,
    /// Eliminated player
    pub loser_id: PlayerId,
    /// Decided by the loser leaving rather than by play
    #[serde(default)]
    pub forfeit: bool,
}

/// The match document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    /// Document id
    pub id: MatchId,
    /// Tournament epoch this match belongs to
    pub epoch: u32,
    /// Round number
    pub round: u32,
    /// First side
    pub side_a: MatchSide,
    /// Second side
    pub side_b: MatchSide,
    /// Lifecycle status
    pub status: MatchStatus,
    /// Set exactly when `status` is finished
    pub outcome: Option<MatchOutcome>,
    /// Resolved games in order
    pub game_history: Vec<GameRecord>,
}

impl Match {
    /// Fresh match: zero scores, no moves, active.
    pub fn new(id: MatchId, epoch: u32, round: u32, side_a: PlayerId, side_b: PlayerId) -> Self {
        Self {
            id,
            epoch,
            round,
            side_a: MatchSide::new(side_a),
            side_b: MatchSide::new(side_b),
            status: MatchStatus::Active,
            outcome: None,
            game_history: Vec::new(),
        }
    }

    /// Materialize the document for a pairing recorded on the tournament.
    pub fn from_ref(pairing: &MatchRef, epoch: u32, round: u32) -> Self {
        Self::new(
            pairing.match_id.clone(),
            epoch,
            round,
            pairing.side_a.clone(),
            pairing.side_b.clone(),
        )
    }

    /// Borrow a side.
    pub fn side(&self, side: Side) -> &MatchSide {
        match side {
            Side::A => &self.side_a,
            Side::B => &self.side_b,
        }
    }

    /// Borrow a side mutably.
    pub fn side_mut(&mut self, side: Side) -> &mut MatchSide {
        match side {
            Side::A => &mut self.side_a,
            Side::B => &mut self.side_b,
        }
    }

    /// Which side a player is on.
    pub fn side_of(&self, player: &PlayerId) -> Option<Side> {
        if &self.side_a.player_id == player {
            Some(Side::A)
        } else if &self.side_b.player_id == player {
            Some(Side::B)
        } else {
            None
        }
    }

    /// Whether the match is over.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.status == MatchStatus::Finished
    }

    /// Both hidden moves, if both have been submitted.
    pub fn pending_pair(&self) -> Option<(Move, Move)> {
        Some((self.side_a.pending_move?, self.side_b.pending_move?))
    }

    /// Number of the game currently being played.
    pub fn current_game(&self) -> u32 {
        self.game_history.len() as u32 + 1
    }

    /// Record a hidden move for `player`.
    ///
    /// Returns the next document; `self` is left untouched.
    pub fn submit_move(&self, player: &PlayerId, mv: Move) -> Result<Match, TransitionError> {
        if self.is_finished() {
            return Err(TransitionError::MatchFinished);
        }
        let side = self.side_of(player).ok_or(TransitionError::NotParticipant)?;
        if self.side(side).pending_move.is_some() {
            return Err(TransitionError::MoveAlreadySubmitted);
        }

        let mut next = self.clone();
        next.side_mut(side).pending_move = Some(mv);
        Ok(next)
    }

    /// Finish the match in favour of `winner`.
    ///
    /// No-op (returns `None`) if already finished.
    pub fn finish(&self, winner: Side, forfeit: bool) -> Option<Match> {
        if self.is_finished() {
            return None;
        }
        let mut next = self.clone();
        next.status = MatchStatus::Finished;
        next.outcome = Some(MatchOutcome {
            winner_id: self.side(winner).player_id.clone(),
            loser_id: self.side(winner.opponent()).player_id.clone(),
            forfeit,
        });
        Some(next)
    }
}
