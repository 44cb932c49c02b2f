//! Bracket Generator
//!
//! Pairs the eligible players for one round: unbiased shuffle, a
//! uniformly chosen bye when the count is odd, then sequential pairing.
//! Pure and seedable; the seed is derived from shared tournament state
//! so every client generates the same bracket.

use crate::core::rng::{derive_bracket_seed, DeterministicRng};
use crate::tournament::error::TransitionError;
use crate::tournament::ledger::Match;
use crate::tournament::state::{MatchId, MatchRef, PlayerId, Round};

/// A generated round: the record for the tournament document plus one
/// match document per pairing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundPlan {
    /// Round record
    pub round: Round,
    /// Match documents to create
    pub matches: Vec<Match>,
}

/// Seed for a round, derived from the tournament salt, code, round
/// number and the sorted set of eligible players.
pub fn round_seed(salt: u64, code: &str, round_number: u32, eligible: &[PlayerId]) -> u64 {
    let mut ids: Vec<&str> = eligible.iter().map(PlayerId::as_str).collect();
    ids.sort_unstable();
    derive_bracket_seed(salt, code, round_number, &ids)
}

/// Generate one round.
///
/// Fails with `InsufficientPlayers` for fewer than two players; a lone
/// remaining player is a champion, not a round.
pub fn generate_round(
    eligible: &[PlayerId],
    epoch: u32,
    round_number: u32,
    rng: &mut DeterministicRng,
) -> Result<RoundPlan, TransitionError> {
    if eligible.len() < 2 {
        return Err(TransitionError::InsufficientPlayers {
            have: eligible.len(),
            need: 2,
        });
    }

    // Sort first so the result depends only on the set and the seed
    let mut order: Vec<PlayerId> = eligible.to_vec();
    order.sort();
    order.dedup();
    rng.shuffle(&mut order);

    let mut bye_players = Vec::new();
    if order.len() % 2 == 1 {
        let idx = rng.next_int(order.len() as u32) as usize;
        bye_players.push(order.remove(idx));
    }

    let refs: Vec<MatchRef> = order
        .chunks_exact(2)
        .enumerate()
        .map(|(index, pair)| MatchRef {
            match_id: MatchId::new(epoch, round_number, index),
            side_a: pair[0].clone(),
            side_b: pair[1].clone(),
            winner: None,
        })
        .collect();

    let matches = refs
        .iter()
        .map(|r| Match::from_ref(r, epoch, round_number))
        .collect();

    Ok(RoundPlan {
        round: Round {
            round_number,
            matches: refs,
            bye_players,
        },
        matches,
    })
}
