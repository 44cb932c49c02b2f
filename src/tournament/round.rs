//! Round/Elimination Controller
//!
//! Folds finished matches back into the roster and answers whether the
//! current round is complete. Folding is guarded by the `winner` field
//! on the round's pairing, so applying the same outcome twice is a no-op.

use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::tournament::bracket::RoundPlan;
use crate::tournament::error::TransitionError;
use crate::tournament::ledger::Match;
use crate::tournament::moves::Side;
use crate::tournament::state::{
    MatchId, PlayerId, PlayerStatus, Round, Tournament, TournamentStatus,
};

/// What happens to a match when one of its players leaves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum ForfeitPolicy {
    /// Leave the match untouched; the round waits (or the host ends it).
    #[default]
    Stall,
    /// Award the match to the remaining opponent.
    AutoForfeit,
}

/// Fold one finished match into the roster.
///
/// Winner: `advanced_this_round` set, status active, one more win.
/// Loser: eliminated, one more loss. Players who already left the
/// roster are skipped. Returns `true` if anything changed.
pub fn fold_outcome(tournament: &mut Tournament, finished: &Match) -> bool {
    let Some(outcome) = finished.outcome.as_ref() else {
        return false;
    };
    if finished.epoch != tournament.epoch || finished.round != tournament.current_round {
        return false;
    }

    let Some(round) = tournament.current_round_mut() else {
        return false;
    };
    let Some(pairing) = round.matches.iter_mut().find(|m| m.match_id == finished.id) else {
        return false;
    };
    if pairing.winner.is_some() {
        return false;
    }
    pairing.winner = Some(outcome.winner_id.clone());

    if let Some(winner) = tournament.player_mut(&outcome.winner_id) {
        winner.advanced_this_round = true;
        winner.status = PlayerStatus::Active;
        winner.win_count += 1;
    }
    if let Some(loser) = tournament.player_mut(&outcome.loser_id) {
        loser.advanced_this_round = false;
        loser.status = PlayerStatus::Eliminated;
        loser.loss_count += 1;
    }

    debug!(
        "folded {}: {} advances, {} eliminated",
        finished.id,
        outcome.winner_id.short(),
        outcome.loser_id.short()
    );
    true
}

/// Fold every finished match in `matches` that belongs to the current round.
pub fn fold_outcomes<'a, I>(tournament: &mut Tournament, matches: I) -> bool
where
    I: IntoIterator<Item = &'a Match>,
{
    let mut changed = false;
    for m in matches {
        changed |= fold_outcome(tournament, m);
    }
    changed
}

/// A round is complete when every match created for it is finished.
///
/// A pairing already folded on the tournament document counts as
/// finished even if its match document is not in `matches`.
pub fn is_round_complete(round: &Round, matches: &BTreeMap<MatchId, Match>) -> bool {
    round.matches.iter().all(|pairing| {
        pairing.winner.is_some()
            || matches
                .get(&pairing.match_id)
                .map(Match::is_finished)
                .unwrap_or(false)
    })
}

/// Host may advance: running and the current round is complete.
pub fn ready_to_advance(tournament: &Tournament, matches: &BTreeMap<MatchId, Match>) -> bool {
    tournament.status == TournamentStatus::Running
        && tournament
            .current_round()
            .map(|r| is_round_complete(r, matches))
            .unwrap_or(false)
}

/// Players eligible for the next round: those who advanced in this one.
pub fn eligible_for_next_round(tournament: &Tournament) -> Vec<PlayerId> {
    tournament.advanced_players()
}

/// Record a freshly generated round on the tournament.
///
/// Every paired player becomes active with the advance flag cleared;
/// bye players are marked `bye` and count as already advanced.
pub fn install_round(tournament: &mut Tournament, plan: &RoundPlan) {
    for player in tournament.players.iter_mut() {
        player.advanced_this_round = false;
    }

    let round = &plan.round;
    for pairing in &round.matches {
        for id in [&pairing.side_a, &pairing.side_b] {
            if let Some(player) = tournament.player_mut(id) {
                player.status = PlayerStatus::Active;
            }
        }
    }
    for id in &round.bye_players {
        if let Some(player) = tournament.player_mut(id) {
            player.status = PlayerStatus::Bye;
            player.advanced_this_round = true;
        }
    }

    tournament.current_round = round.round_number;
    tournament.bracket.retain(|r| r.round_number != round.round_number);
    tournament.bracket.push(round.clone());
}

/// Result of a player leaving.
#[derive(Clone, Debug, PartialEq)]
pub struct Departure {
    /// Next tournament document; `None` when the roster is now empty
    pub tournament: Option<Tournament>,
    /// Forfeited match document to write, under `AutoForfeit`
    pub forfeited: Option<Match>,
}

/// Remove a player from the roster.
///
/// The host role passes to the earliest-joined remaining player. With
/// `AutoForfeit`, an unfinished current-round match is awarded to the
/// opponent.
pub fn depart(
    tournament: &Tournament,
    current_match: Option<&Match>,
    leaving: &PlayerId,
    policy: ForfeitPolicy,
) -> Result<Departure, TransitionError> {
    if !tournament.contains(leaving) {
        return Err(TransitionError::NotParticipant);
    }

    let mut next = tournament.clone();
    next.players.retain(|p| &p.id != leaving);

    if next.players.is_empty() {
        return Ok(Departure { tournament: None, forfeited: None });
    }
    if next.is_host(leaving) {
        next.host_id = next.players[0].id.clone();
        debug!("host passes to {}", next.host_id.short());
    }

    let forfeited = match (policy, tournament.status, current_match) {
        (ForfeitPolicy::AutoForfeit, TournamentStatus::Running, Some(m))
            if m.epoch == tournament.epoch && m.round == tournament.current_round =>
        {
            m.side_of(leaving).and_then(|side: Side| m.finish(side.opponent(), true))
        }
        _ => None,
    };

    Ok(Departure {
        tournament: Some(next),
        forfeited,
    })
}
