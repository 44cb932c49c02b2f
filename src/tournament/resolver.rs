//! Match Resolver
//!
//! Turns two hidden moves into a scored game and decides when the match
//! is over. Scoring, revealing and clearing the pending slots happen in
//! one derived document, so a second resolver that observes the same
//! snapshot either loses the conditional write or finds nothing pending.

use tracing::debug;

use crate::tournament::ledger::{GameRecord, Match, MatchOutcome, MatchStatus};
use crate::tournament::moves::{resolve_game, GameOutcome, Move};

/// Games a side must win to take the match.
pub const WINS_TO_CLINCH: u32 = 3;

/// What a single resolution step did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameResolution {
    /// Game that was scored
    pub game_number: u32,
    /// Side A's move
    pub move_a: Move,
    /// Side B's move
    pub move_b: Move,
    /// Result of the game
    pub outcome: GameOutcome,
    /// Set when this game decided the match
    pub match_outcome: Option<MatchOutcome>,
}

/// Resolve the pending game, if there is one.
///
/// Returns `None` when the match is finished or either pending slot is
/// empty; that makes re-application of an already resolved snapshot a
/// no-op.
pub fn resolve_pending(current: &Match) -> Option<(Match, GameResolution)> {
    if current.status == MatchStatus::Finished {
        return None;
    }
    let (move_a, move_b) = current.pending_pair()?;

    let outcome = resolve_game(move_a, move_b);
    let game_number = current.current_game();

    let mut next = current.clone();
    if let Some(side) = outcome.winner() {
        next.side_mut(side).games_won += 1;
    }

    next.side_a.revealed_move = Some(move_a);
    next.side_b.revealed_move = Some(move_b);
    next.side_a.pending_move = None;
    next.side_b.pending_move = None;
    next.game_history.push(GameRecord {
        game_number,
        move_a,
        move_b,
        winner: outcome,
    });

    let clinched = outcome
        .winner()
        .filter(|side| next.side(*side).games_won >= WINS_TO_CLINCH);

    let match_outcome = match clinched {
        Some(side) => {
            next = next.finish(side, false)?;
            next.outcome.clone()
        }
        None => None,
    };

    debug!(
        "match {} game {}: {} vs {} -> {:?}{}",
        current.id,
        game_number,
        move_a,
        move_b,
        outcome,
        if match_outcome.is_some() { " (match over)" } else { "" }
    );

    Some((
        next,
        GameResolution {
            game_number,
            move_a,
            move_b,
            outcome,
            match_outcome,
        },
    ))
}
