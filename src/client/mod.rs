//! Client Module
//!
//! What a participant's process runs: identity, configuration, the
//! action entry points and the snapshot reaction loop.

pub mod config;
pub mod error;
pub mod identity;
pub mod session;

pub use config::ClientConfig;
pub use error::{ConflictError, PermissionError, TournamentError, ValidationError};
pub use identity::{IdentityProvider, StaticIdentity};
pub use session::TournamentClient;
