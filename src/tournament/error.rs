//! State machine errors.

use crate::tournament::state::{TournamentAction, TournamentStatus};

/// Rejection of a requested transition.
///
/// Produced by the pure state machines before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// Tournament status does not permit the action.
    #[error("cannot {action:?} a tournament that is {from:?}")]
    IllegalTransition {
        /// Current status.
        from: TournamentStatus,
        /// Requested action.
        action: TournamentAction,
    },

    /// Host-only action requested by someone else.
    #[error("only the host may do that")]
    NotHost,

    /// Caller is not in the roster or not a side of the match.
    #[error("not a participant")]
    NotParticipant,

    /// Too few players to form a round.
    #[error("need at least {need} players, have {have}")]
    InsufficientPlayers {
        /// Players available.
        have: usize,
        /// Players required.
        need: usize,
    },

    /// Lobby has reached its player cap.
    #[error("tournament is full ({max} players)")]
    TournamentFull {
        /// Player cap.
        max: usize,
    },

    /// Joining after the lobby closed.
    #[error("tournament already started")]
    AlreadyStarted,

    /// Advancing before every match in the round finished.
    #[error("round {round} is not complete")]
    RoundNotComplete {
        /// Current round number.
        round: u32,
    },

    /// Player already has a pending move for this game.
    #[error("move already submitted")]
    MoveAlreadySubmitted,

    /// Match no longer accepts moves.
    #[error("match already finished")]
    MatchFinished,

    /// Match belongs to a round that is not current.
    #[error("match is not part of the current round")]
    StaleMatch,
}
