//! Core deterministic primitives.
//!
//! Seeded randomness and domain-separated hashing. Anything two clients
//! must compute identically from the same snapshot is built on these.

pub mod rng;
pub mod hash;

// Re-export core types
pub use rng::{DeterministicRng, derive_bracket_seed};
pub use hash::{StateHasher, DigestBytes};
