//! Tournament Logic Module
//!
//! The tournament state machine. No I/O: every function here maps the
//! snapshots it is given to the next documents.
//!
//! ## Module Structure
//!
//! - `moves`: Moves and single-game resolution
//! - `ledger`: Match document and move submission
//! - `resolver`: Game scoring and best-of-N completion
//! - `bracket`: Seeded pairing with byes
//! - `round`: Outcome folding, round completion, departures
//! - `controller`: Tournament lifecycle
//! - `reactions`: Snapshot handlers producing intended writes
//! - `events`: Snapshot diffs for the presentation layer
//! - `views`: Read-only derived views

pub mod code;
pub mod error;
pub mod moves;
pub mod state;
pub mod ledger;
pub mod resolver;
pub mod bracket;
pub mod round;
pub mod controller;
pub mod reactions;
pub mod events;
pub mod views;

// Re-export key types
pub use code::GameCode;
pub use error::TransitionError;
pub use moves::{Move, Side, GameOutcome, resolve_game};
pub use state::{Player, PlayerId, PlayerStatus, MatchId, MatchRef, Round, Tournament, TournamentStatus, TournamentAction};
pub use ledger::{Match, MatchStatus, MatchSide, MatchOutcome, GameRecord};
pub use resolver::WINS_TO_CLINCH;
pub use round::ForfeitPolicy;
pub use events::TournamentEvent;
pub use reactions::{Intent, Reaction};
