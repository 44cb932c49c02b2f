//! Snapshot Reactions
//!
//! Pure handlers from (old snapshot, new snapshot) to intended writes.
//! Any client may run them; every intent is written with a revision
//! precondition by the caller, and every intent derived from an already
//! handled snapshot is either empty or identical to the one that won.

use std::collections::BTreeMap;

use crate::tournament::controller::check_finished;
use crate::tournament::events::{diff_match, diff_tournament, TournamentEvent};
use crate::tournament::ledger::Match;
use crate::tournament::resolver::resolve_pending;
use crate::tournament::round::fold_outcomes;
use crate::tournament::state::{MatchId, Tournament, TournamentStatus};

/// A write a client should attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum Intent {
    /// Replace the match document with its resolved successor.
    ResolveGame(Match),
    /// Create a match document recorded on the tournament but missing
    /// from the store.
    CreateMatch(Match),
    /// Replace the tournament document.
    UpdateTournament(Tournament),
}

/// Writes to attempt plus events to publish.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Reaction {
    /// Intended writes, in order
    pub intents: Vec<Intent>,
    /// Events observed
    pub events: Vec<TournamentEvent>,
}

/// React to a new match snapshot.
pub fn on_match_snapshot(old: Option<&Match>, new: &Match) -> Reaction {
    let intents = resolve_pending(new)
        .map(|(next, _)| vec![Intent::ResolveGame(next)])
        .unwrap_or_default();

    Reaction {
        intents,
        events: diff_match(old, new),
    }
}

/// React to a new tournament snapshot (or to a match change, with the
/// tournament unchanged: pass the same document as `old` and `new`).
pub fn on_tournament_snapshot(
    old: Option<&Tournament>,
    new: &Tournament,
    matches: &BTreeMap<MatchId, Match>,
) -> Reaction {
    Reaction {
        intents: reconcile(new, matches),
        events: diff_tournament(old, Some(new)),
    }
}

/// Writes that bring the shared state in line with what is observable.
///
/// - pairings of the current round with no match document get one;
/// - finished matches not yet reflected in the roster are folded;
/// - a folded round with at most one contender finishes the tournament.
pub fn reconcile(tournament: &Tournament, matches: &BTreeMap<MatchId, Match>) -> Vec<Intent> {
    if tournament.status != TournamentStatus::Running {
        return Vec::new();
    }
    let Some(round) = tournament.current_round() else {
        return Vec::new();
    };

    let mut intents: Vec<Intent> = round
        .matches
        .iter()
        .filter(|pairing| pairing.winner.is_none() && !matches.contains_key(&pairing.match_id))
        .map(|pairing| Intent::CreateMatch(Match::from_ref(pairing, tournament.epoch, round.round_number)))
        .collect();

    let mut next = tournament.clone();
    let folded = fold_outcomes(
        &mut next,
        matches.values().filter(|m| m.epoch == tournament.epoch),
    );

    if let Some(finished) = check_finished(&next) {
        intents.push(Intent::UpdateTournament(finished));
    } else if folded {
        intents.push(Intent::UpdateTournament(next));
    }

    intents
}
