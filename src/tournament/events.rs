//! Tournament Events
//!
//! Notifications derived by diffing two snapshots of the same document.
//! Clients publish these to the presentation layer; they carry no
//! authority and are never written to the store.

use serde::{Serialize, Deserialize};

use crate::tournament::ledger::Match;
use crate::tournament::moves::{GameOutcome, Move};
use crate::tournament::state::{MatchId, PlayerId, Tournament, TournamentStatus};

/// Something observable happened.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TournamentEvent {
    /// A player registered in the lobby.
    PlayerJoined {
        player_id: PlayerId,
        display_name: String,
    },

    /// A player left the roster.
    PlayerLeft {
        player_id: PlayerId,
    },

    /// Host role moved to another player.
    HostChanged {
        host_id: PlayerId,
    },

    /// Lobby closed and round 1 began.
    TournamentStarted {
        players: usize,
    },

    /// A round's pairings were created.
    RoundStarted {
        round: u32,
        matches: usize,
        byes: Vec<PlayerId>,
    },

    /// One game inside a match was scored.
    GameResolved {
        match_id: MatchId,
        game_number: u32,
        move_a: Move,
        move_b: Move,
        outcome: GameOutcome,
    },

    /// A match reached its result.
    MatchFinished {
        match_id: MatchId,
        winner_id: PlayerId,
        loser_id: PlayerId,
        forfeit: bool,
    },

    /// Every match of the round has been folded into the roster.
    RoundCompleted {
        round: u32,
    },

    /// Terminal state reached.
    TournamentFinished {
        champion: Option<PlayerId>,
    },

    /// Host reopened the lobby.
    TournamentReset {
        epoch: u32,
    },

    /// Tournament document no longer exists.
    TournamentClosed,
}

/// Events between two snapshots of the tournament document.
///
/// The first observation (`old == None`) produces no events; a client
/// attaching late should not replay history.
pub fn diff_tournament(old: Option<&Tournament>, new: Option<&Tournament>) -> Vec<TournamentEvent> {
    let (old, new) = match (old, new) {
        (Some(old), Some(new)) => (old, new),
        (Some(_), None) => return vec![TournamentEvent::TournamentClosed],
        _ => return Vec::new(),
    };

    let mut events = Vec::new();

    for player in &new.players {
        if !old.contains(&player.id) {
            events.push(TournamentEvent::PlayerJoined {
                player_id: player.id.clone(),
                display_name: player.display_name.clone(),
            });
        }
    }
    for player in &old.players {
        if !new.contains(&player.id) {
            events.push(TournamentEvent::PlayerLeft { player_id: player.id.clone() });
        }
    }
    if old.host_id != new.host_id {
        events.push(TournamentEvent::HostChanged { host_id: new.host_id.clone() });
    }

    if new.epoch > old.epoch {
        events.push(TournamentEvent::TournamentReset { epoch: new.epoch });
        return events;
    }

    // Round completion of the round `old` was watching
    let completed_now = new
        .bracket
        .iter()
        .find(|r| r.round_number == old.current_round)
        .map(|r| r.is_folded())
        .unwrap_or(false);
    let completed_before = old.current_round().map(|r| r.is_folded()).unwrap_or(false);
    if old.current_round > 0 && completed_now && !completed_before {
        events.push(TournamentEvent::RoundCompleted { round: old.current_round });
    }

    if old.status == TournamentStatus::Lobby && new.status == TournamentStatus::Running {
        events.push(TournamentEvent::TournamentStarted { players: new.players.len() });
    }
    if new.current_round != old.current_round {
        if let Some(round) = new.current_round() {
            events.push(TournamentEvent::RoundStarted {
                round: round.round_number,
                matches: round.matches.len(),
                byes: round.bye_players.clone(),
            });
        }
    }
    if old.status != TournamentStatus::Finished && new.status == TournamentStatus::Finished {
        events.push(TournamentEvent::TournamentFinished { champion: new.champion.clone() });
    }

    events
}

/// Events between two snapshots of a match document.
pub fn diff_match(old: Option<&Match>, new: &Match) -> Vec<TournamentEvent> {
    let Some(old) = old else {
        return Vec::new();
    };

    let mut events: Vec<TournamentEvent> = new
        .game_history
        .iter()
        .skip(old.game_history.len())
        .map(|game| TournamentEvent::GameResolved {
            match_id: new.id.clone(),
            game_number: game.game_number,
            move_a: game.move_a,
            move_b: game.move_b,
            outcome: game.winner,
        })
        .collect();

    if !old.is_finished() {
        if let Some(outcome) = new.outcome.as_ref() {
            events.push(TournamentEvent::MatchFinished {
                match_id: new.id.clone(),
                winner_id: outcome.winner_id.clone(),
                loser_id: outcome.loser_id.clone(),
                forfeit: outcome.forfeit,
            });
        }
    }

    events
}
