//! Action Errors
//!
//! What an action entry point reports back to the UI layer. Nothing
//! here is fatal to the tournament: a failed action leaves the shared
//! documents as they were.

use crate::store::StoreError;
use crate::tournament::code::MalformedCode;
use crate::tournament::error::TransitionError;
use crate::tournament::state::{TournamentAction, TournamentStatus};

/// Action failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TournamentError {
    /// Bad input; nothing was written.
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    /// Request clashes with current state; retry with corrected input.
    #[error("conflict: {0}")]
    Conflict(#[from] ConflictError),

    /// Tournament or match no longer exists.
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller may not do this.
    #[error("permission denied: {0}")]
    Permission(#[from] PermissionError),

    /// Store unreachable after retries; nothing was written.
    #[error("store unavailable: {0}")]
    TransientStore(String),

    /// A stored document could not be decoded.
    #[error("corrupt document: {0}")]
    Corrupt(String),
}

/// Rejected input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Empty display name.
    #[error("display name is required")]
    MissingDisplayName,

    /// Code is not 4-16 characters of `[A-Z0-9]`.
    #[error("malformed game code {0:?}")]
    MalformedCode(String),

    /// Too few players to start.
    #[error("need at least {need} players, have {have}")]
    InsufficientPlayers {
        /// Players in the lobby
        have: usize,
        /// Players required
        need: usize,
    },
}

/// Request clashes with the current documents.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConflictError {
    /// Pending move already recorded.
    #[error("move already submitted for this game")]
    MoveAlreadySubmitted,

    /// Lobby closed.
    #[error("tournament already started")]
    AlreadyStarted,

    /// Every generated code was taken.
    #[error("no free game code found")]
    DuplicateCode,

    /// Lobby at capacity.
    #[error("tournament is full ({max} players)")]
    TournamentFull {
        /// Capacity
        max: usize,
    },

    /// Advance requested early.
    #[error("round {round} is not complete")]
    RoundNotComplete {
        /// Current round
        round: u32,
    },

    /// Match no longer accepts moves.
    #[error("match already finished")]
    MatchFinished,

    /// Match belongs to an earlier round or epoch.
    #[error("match is not part of the current round")]
    StaleMatch,

    /// Status forbids the action.
    #[error("cannot {action:?} a tournament that is {from:?}")]
    IllegalTransition {
        /// Current status
        from: TournamentStatus,
        /// Requested action
        action: TournamentAction,
    },

    /// Every conditional write attempt lost a race.
    #[error("too much contention, gave up")]
    Contention,
}

/// Caller lacks the right to act.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermissionError {
    /// Host-only action.
    #[error("only the host may do that")]
    NotHost,

    /// Caller is not on the roster or in the match.
    #[error("not a participant")]
    NotParticipant,

    /// Store access rules rejected the call.
    #[error("store denied access to {0}")]
    AccessDenied(String),
}

impl TournamentError {
    /// Whether the same call may succeed if simply repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TournamentError::TransientStore(_) | TournamentError::Conflict(ConflictError::Contention)
        )
    }

    /// Whether the client should drop its attachment to the tournament.
    ///
    /// A host-only rejection is reported but keeps the attachment; the
    /// caller's view is still valid.
    pub fn detaches_client(&self) -> bool {
        matches!(
            self,
            TournamentError::NotFound(_)
                | TournamentError::Permission(PermissionError::AccessDenied(_))
                | TournamentError::Permission(PermissionError::NotParticipant)
        )
    }
}

impl From<StoreError> for TournamentError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(path) => TournamentError::NotFound(path.to_string()),
            StoreError::PermissionDenied(path) => PermissionError::AccessDenied(path.to_string()).into(),
            StoreError::PreconditionFailed { .. } => ConflictError::Contention.into(),
            StoreError::Unavailable(reason) => TournamentError::TransientStore(reason),
            e @ StoreError::Lagged(_) => TournamentError::TransientStore(e.to_string()),
            StoreError::Serialization(reason) => TournamentError::Corrupt(reason),
        }
    }
}

impl From<TransitionError> for TournamentError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::IllegalTransition { from, action } => {
                ConflictError::IllegalTransition { from, action }.into()
            }
            TransitionError::NotHost => PermissionError::NotHost.into(),
            TransitionError::NotParticipant => PermissionError::NotParticipant.into(),
            TransitionError::InsufficientPlayers { have, need } => {
                ValidationError::InsufficientPlayers { have, need }.into()
            }
            TransitionError::TournamentFull { max } => ConflictError::TournamentFull { max }.into(),
            TransitionError::AlreadyStarted => ConflictError::AlreadyStarted.into(),
            TransitionError::RoundNotComplete { round } => ConflictError::RoundNotComplete { round }.into(),
            TransitionError::MoveAlreadySubmitted => ConflictError::MoveAlreadySubmitted.into(),
            TransitionError::MatchFinished => ConflictError::MatchFinished.into(),
            TransitionError::StaleMatch => ConflictError::StaleMatch.into(),
        }
    }
}

impl From<MalformedCode> for TournamentError {
    fn from(e: MalformedCode) -> Self {
        ValidationError::MalformedCode(e.0).into()
    }
}
