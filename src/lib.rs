//! # RPS Bracket
//!
//! Single-elimination Rock-Paper-Scissors tournaments run by clients that
//! only share a replicated document store.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        RPS BRACKET                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── rng.rs      - Seeded Xorshift128+ PRNG                  │
//! │  └── hash.rs     - Domain-separated SHA-256                  │
//! │                                                              │
//! │  tournament/     - State machines (pure, no I/O)             │
//! │  ├── ledger.rs   - Match document and move submission        │
//! │  ├── resolver.rs - Game scoring, best-of-five completion     │
//! │  ├── bracket.rs  - Seeded pairing with byes                  │
//! │  ├── round.rs    - Outcome folding, round completion         │
//! │  ├── controller.rs - Tournament lifecycle                    │
//! │  └── reactions.rs  - Snapshot handlers -> intended writes    │
//! │                                                              │
//! │  store/          - Replicated document store interface       │
//! │  ├── memory.rs   - In-process store                          │
//! │  └── retry.rs    - Transient failure retries                 │
//! │                                                              │
//! │  client/         - Participant runtime                       │
//! │  └── session.rs  - Actions, views, reaction loop             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Convergence
//!
//! There is no referee. Every client runs the same transitions on the
//! snapshots it observes and writes with revision preconditions:
//! - Transitions derive the whole next document from the current one
//! - Applying a transition twice is a no-op (pending moves are cleared
//!   when a game is scored, folded pairings carry their winner)
//! - Bracket seeds depend only on shared document fields, so racing
//!   writers compute identical pairings
//! - No HashMap (BTreeMap for sorted iteration)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod tournament;
pub mod store;
pub mod client;

// Re-export commonly used types
pub use crate::core::rng::DeterministicRng;
pub use crate::tournament::{GameCode, Match, Move, PlayerId, Tournament, TournamentEvent, TournamentStatus};
pub use crate::store::{DocumentStore, MemoryStore, RetryingStore};
pub use crate::client::{ClientConfig, StaticIdentity, TournamentClient, TournamentError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
