//! Tournament Controller
//!
//! Lifecycle over `lobby -> running -> finished`, plus the host reset
//! back to the lobby. Every function derives the next document from the
//! snapshot it is given and never mutates its input.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::core::rng::DeterministicRng;
use crate::tournament::bracket::{generate_round, round_seed, RoundPlan};
use crate::tournament::error::TransitionError;
use crate::tournament::ledger::Match;
use crate::tournament::round::{eligible_for_next_round, fold_outcomes, install_round, is_round_complete};
use crate::tournament::state::{
    MatchId, Player, PlayerId, PlayerStatus, Tournament, TournamentAction, TournamentStatus,
};

/// Result of a host advance.
#[derive(Clone, Debug, PartialEq)]
pub enum Advance {
    /// A new round was generated.
    NextRound(Tournament, RoundPlan),
    /// At most one player remained; the tournament is over.
    Finished(Tournament),
}

fn require_host(tournament: &Tournament, by: &PlayerId) -> Result<(), TransitionError> {
    if tournament.is_host(by) {
        Ok(())
    } else {
        Err(TransitionError::NotHost)
    }
}

fn plan_round(tournament: &Tournament, eligible: &[PlayerId], round_number: u32) -> Result<RoundPlan, TransitionError> {
    let seed = round_seed(tournament.salt, tournament.code.as_str(), round_number, eligible);
    debug!(
        "round {} seed {} over {} players",
        round_number,
        hex::encode(seed.to_le_bytes()),
        eligible.len()
    );
    let mut rng = DeterministicRng::new(seed);
    generate_round(eligible, tournament.epoch, round_number, &mut rng)
}

/// The champion, derived from statuses alone: the only player still
/// in contention, or nobody.
pub fn champion_of(tournament: &Tournament) -> Option<PlayerId> {
    match tournament.contenders().as_slice() {
        [only] => Some(only.id.clone()),
        _ => None,
    }
}

fn finish_in_place(tournament: &mut Tournament, action: TournamentAction) -> Result<(), TransitionError> {
    tournament.status = tournament.status.apply(action)?;
    tournament.champion = champion_of(tournament);
    info!(
        "tournament {} finished, champion: {}",
        tournament.code,
        tournament.champion.as_ref().map(PlayerId::short).unwrap_or("none")
    );
    Ok(())
}

/// Add a player to the lobby.
///
/// Returns `Ok(None)` when the player is already registered.
pub fn join(
    tournament: &Tournament,
    player: &PlayerId,
    display_name: &str,
    max_players: usize,
) -> Result<Option<Tournament>, TransitionError> {
    if tournament.contains(player) {
        return Ok(None);
    }
    if tournament.status != TournamentStatus::Lobby {
        return Err(TransitionError::AlreadyStarted);
    }
    if tournament.players.len() >= max_players {
        return Err(TransitionError::TournamentFull { max: max_players });
    }

    let mut next = tournament.clone();
    next.players.push(Player::new(player.clone(), display_name));
    Ok(Some(next))
}

/// Host starts round 1 with every joined player.
pub fn start(
    tournament: &Tournament,
    by: &PlayerId,
    min_players: usize,
) -> Result<(Tournament, RoundPlan), TransitionError> {
    require_host(tournament, by)?;
    let status = tournament.status.apply(TournamentAction::Start)?;

    let need = min_players.max(2);
    let eligible: Vec<PlayerId> = tournament
        .players
        .iter()
        .filter(|p| p.status == PlayerStatus::Joined)
        .map(|p| p.id.clone())
        .collect();
    if eligible.len() < need {
        return Err(TransitionError::InsufficientPlayers { have: eligible.len(), need });
    }

    let plan = plan_round(tournament, &eligible, 1)?;
    let mut next = tournament.clone();
    next.status = status;
    next.champion = None;
    install_round(&mut next, &plan);

    info!(
        "tournament {} started: {} players, {} matches, {} byes",
        next.code,
        eligible.len(),
        plan.round.matches.len(),
        plan.round.bye_players.len()
    );
    Ok((next, plan))
}

/// Host moves past a completed round.
///
/// Any finished matches not yet reflected in the roster are folded
/// first, so the result does not depend on which document the caller
/// happened to observe last.
pub fn advance(
    tournament: &Tournament,
    matches: &BTreeMap<MatchId, Match>,
    by: &PlayerId,
) -> Result<Advance, TransitionError> {
    require_host(tournament, by)?;
    tournament.status.apply(TournamentAction::Advance)?;

    let round_number = tournament.current_round;
    let round = tournament
        .current_round()
        .ok_or(TransitionError::RoundNotComplete { round: round_number })?;
    if !is_round_complete(round, matches) {
        return Err(TransitionError::RoundNotComplete { round: round_number });
    }

    let mut next = tournament.clone();
    fold_outcomes(&mut next, matches.values());
    if !next.current_round().map(|r| r.is_folded()).unwrap_or(false) {
        return Err(TransitionError::RoundNotComplete { round: round_number });
    }

    let eligible = eligible_for_next_round(&next);
    if eligible.len() <= 1 {
        finish_in_place(&mut next, TournamentAction::Finish)?;
        return Ok(Advance::Finished(next));
    }

    let plan = plan_round(&next, &eligible, round_number + 1)?;
    install_round(&mut next, &plan);
    info!(
        "tournament {} round {}: {} matches, {} byes",
        next.code,
        next.current_round,
        plan.round.matches.len(),
        plan.round.bye_players.len()
    );
    Ok(Advance::NextRound(next, plan))
}

/// Automatic finish, safe for any client to apply.
///
/// Fires once the current round is fully folded and at most one player
/// is still in contention. Returns `None` when nothing changes, which
/// includes an already finished tournament.
pub fn check_finished(tournament: &Tournament) -> Option<Tournament> {
    if tournament.status != TournamentStatus::Running {
        return None;
    }
    let folded = tournament.current_round().map(|r| r.is_folded()).unwrap_or(false);
    if !folded || tournament.contenders().len() > 1 {
        return None;
    }

    let mut next = tournament.clone();
    finish_in_place(&mut next, TournamentAction::Finish).ok()?;
    Some(next)
}

/// Host stops the tournament early.
pub fn end(tournament: &Tournament, by: &PlayerId) -> Result<Tournament, TransitionError> {
    require_host(tournament, by)?;
    let mut next = tournament.clone();
    if tournament.status == TournamentStatus::Finished {
        next.status = tournament.status.apply(TournamentAction::End)?;
        return Ok(next);
    }
    finish_in_place(&mut next, TournamentAction::End)?;
    Ok(next)
}

/// Host discards the bracket and reopens the lobby.
///
/// Every player returns to `joined` with zeroed counters. The epoch is
/// bumped so old match documents can never be mistaken for new ones.
pub fn reset(tournament: &Tournament, by: &PlayerId, salt: u64) -> Result<Tournament, TransitionError> {
    require_host(tournament, by)?;
    let mut next = tournament.clone();
    next.status = tournament.status.apply(TournamentAction::Reset)?;
    next.epoch += 1;
    next.current_round = 0;
    next.bracket.clear();
    next.champion = None;
    next.salt = salt;
    for player in next.players.iter_mut() {
        player.reset();
    }
    info!("tournament {} reset to lobby (epoch {})", next.code, next.epoch);
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::tournament::code::GameCode;
    use crate::tournament::moves::{Move, Side};
    use crate::tournament::resolver::resolve_pending;
    use crate::tournament::round::fold_outcome;

    fn host() -> PlayerId {
        PlayerId::new("p0")
    }

    fn lobby(n: usize) -> Tournament {
        let code = GameCode::parse("CTRL01").unwrap();
        let mut t = Tournament::new(code, host(), "P0", 42, Utc::now());
        for i in 1..n {
            t = join(&t, &PlayerId::new(format!("p{}", i)), &format!("P{}", i), 64)
                .unwrap()
                .unwrap();
        }
        t
    }

    /// Play a match to completion with side A sweeping.
    fn sweep(m: &Match) -> Match {
        let mut m = m.clone();
        let a = m.side_a.player_id.clone();
        let b = m.side_b.player_id.clone();
        while !m.is_finished() {
            m = m.submit_move(&a, Move::Rock).unwrap();
            m = m.submit_move(&b, Move::Scissors).unwrap();
            m = resolve_pending(&m).unwrap().0;
        }
        m
    }

    fn docs(plan: &RoundPlan) -> BTreeMap<MatchId, Match> {
        plan.matches.iter().map(|m| (m.id.clone(), sweep(m))).collect()
    }

    #[test]
    fn test_join_rules() {
        let t = lobby(2);
        assert_eq!(join(&t, &PlayerId::new("p1"), "again", 64), Ok(None));
        assert_eq!(
            join(&t, &PlayerId::new("p9"), "late", 2),
            Err(TransitionError::TournamentFull { max: 2 })
        );

        let (running, _) = start(&t, &host(), 2).unwrap();
        assert_eq!(
            join(&running, &PlayerId::new("p9"), "late", 64),
            Err(TransitionError::AlreadyStarted)
        );
    }

    #[test]
    fn test_start_requires_host_and_players() {
        assert_eq!(
            start(&lobby(1), &host(), 2).unwrap_err(),
            TransitionError::InsufficientPlayers { have: 1, need: 2 }
        );
        assert_eq!(start(&lobby(3), &PlayerId::new("p1"), 2).unwrap_err(), TransitionError::NotHost);

        let (t, plan) = start(&lobby(3), &host(), 2).unwrap();
        assert_eq!(t.status, TournamentStatus::Running);
        assert_eq!(t.current_round, 1);
        assert_eq!(plan.round.matches.len(), 1);
        assert_eq!(plan.round.bye_players.len(), 1);

        assert!(matches!(
            start(&t, &host(), 2),
            Err(TransitionError::IllegalTransition { .. })
        ));
    }

    #[test]
    fn test_concurrent_starts_agree() {
        let t = lobby(6);
        let (a, plan_a) = start(&t, &host(), 2).unwrap();
        let (b, plan_b) = start(&t, &host(), 2).unwrap();
        assert_eq!(plan_a, plan_b);
        assert_eq!(a, b);
    }

    #[test]
    fn test_three_player_tournament() {
        let (t, plan) = start(&lobby(3), &host(), 2).unwrap();
        let round1 = docs(&plan);

        let t = match advance(&t, &round1, &host()).unwrap() {
            Advance::NextRound(t, plan) => {
                assert_eq!(t.current_round, 2);
                assert_eq!(plan.round.matches.len(), 1);
                assert!(plan.round.bye_players.is_empty());
                let round2 = docs(&plan);
                match advance(&t, &round2, &host()).unwrap() {
                    Advance::Finished(t) => t,
                    other => panic!("expected finish, got {:?}", other),
                }
            }
            other => panic!("expected round 2, got {:?}", other),
        };

        assert_eq!(t.status, TournamentStatus::Finished);
        let champion = t.champion.clone().unwrap();
        assert_eq!(t.player(&champion).unwrap().status, PlayerStatus::Active);
        assert_eq!(t.contenders().len(), 1);
    }

    #[test]
    fn test_advance_before_round_complete() {
        let (t, plan) = start(&lobby(4), &host(), 2).unwrap();
        let mut partial: BTreeMap<MatchId, Match> =
            plan.matches.iter().map(|m| (m.id.clone(), m.clone())).collect();
        let first = &plan.matches[0];
        partial.insert(first.id.clone(), sweep(first));

        assert_eq!(
            advance(&t, &partial, &host()).unwrap_err(),
            TransitionError::RoundNotComplete { round: 1 }
        );
    }

    #[test]
    fn test_check_finished_is_idempotent() {
        let (mut t, plan) = start(&lobby(2), &host(), 2).unwrap();
        assert!(check_finished(&t).is_none());

        let done = sweep(&plan.matches[0]);
        fold_outcome(&mut t, &done);

        let finished = check_finished(&t).unwrap();
        assert_eq!(finished.status, TournamentStatus::Finished);
        assert_eq!(finished.champion, Some(done.side_a.player_id.clone()));

        // A second observer writing the same thing changes nothing
        assert!(check_finished(&finished).is_none());
    }

    #[test]
    fn test_zero_contenders_means_no_champion() {
        let (mut t, plan) = start(&lobby(2), &host(), 2).unwrap();
        let done = plan.matches[0].finish(Side::A, true).unwrap();
        fold_outcome(&mut t, &done);
        // Winner walked away afterwards
        t.players.retain(|p| p.id != done.side_a.player_id);

        let finished = check_finished(&t).unwrap();
        assert!(finished.champion.is_none());
    }

    #[test]
    fn test_end_and_reset() {
        let (t, plan) = start(&lobby(4), &host(), 2).unwrap();
        assert_eq!(end(&t, &PlayerId::new("p2")).unwrap_err(), TransitionError::NotHost);

        let ended = end(&t, &host()).unwrap();
        assert_eq!(ended.status, TournamentStatus::Finished);
        assert!(ended.champion.is_none());
        assert_eq!(end(&ended, &host()).unwrap().status, TournamentStatus::Finished);

        let mut played = t.clone();
        fold_outcome(&mut played, &sweep(&plan.matches[0]));
        let fresh = reset(&played, &host(), 77).unwrap();

        assert_eq!(fresh.status, TournamentStatus::Lobby);
        assert!(fresh.bracket.is_empty());
        assert_eq!(fresh.current_round, 0);
        assert_eq!(fresh.epoch, t.epoch + 1);
        assert_eq!(fresh.salt, 77);
        assert!(fresh.players.iter().all(|p| {
            p.status == PlayerStatus::Joined && p.win_count == 0 && p.loss_count == 0 && !p.advanced_this_round
        }));

        assert!(matches!(
            reset(&fresh, &host(), 1),
            Err(TransitionError::IllegalTransition { .. })
        ));
    }
}
