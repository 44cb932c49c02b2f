//! Read-Only Views
//!
//! Derived, serializable views for the presentation layer. Computed
//! from the latest tournament and match snapshots; never written back.

use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

use crate::tournament::ledger::{GameRecord, Match, MatchStatus};
use crate::tournament::moves::{Move, Side};
use crate::tournament::state::{MatchId, PlayerId, PlayerStatus, Tournament, TournamentStatus};

/// A participant's current match, from their point of view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchView {
    /// Match document id
    pub match_id: MatchId,
    /// Round number
    pub round: u32,
    /// Viewer's side
    pub side: Side,
    /// Opponent id
    pub opponent_id: PlayerId,
    /// Opponent display name
    pub opponent_name: String,
    /// Viewer's games won
    pub games_won: u32,
    /// Opponent's games won
    pub opponent_games_won: u32,
    /// Viewer has a hidden move waiting
    pub move_submitted: bool,
    /// Opponent has a hidden move waiting (the move itself stays hidden)
    pub opponent_move_submitted: bool,
    /// Moves revealed in the last game: (viewer, opponent)
    pub last_revealed: Option<(Move, Move)>,
    /// Match status
    pub status: MatchStatus,
    /// Winner once finished
    pub winner_id: Option<PlayerId>,
    /// Games played so far
    pub history: Vec<GameRecord>,
}

/// Viewer's current match, if they have one in the current round.
pub fn current_match_for(
    tournament: &Tournament,
    matches: &BTreeMap<MatchId, Match>,
    participant: &PlayerId,
) -> Option<MatchView> {
    let pairing = tournament.current_round()?.match_for(participant)?;
    let m = matches.get(&pairing.match_id)?;
    let side = m.side_of(participant)?;
    let mine = m.side(side);
    let theirs = m.side(side.opponent());

    Some(MatchView {
        match_id: m.id.clone(),
        round: m.round,
        side,
        opponent_id: theirs.player_id.clone(),
        opponent_name: tournament.display_name(&theirs.player_id).to_string(),
        games_won: mine.games_won,
        opponent_games_won: theirs.games_won,
        move_submitted: mine.pending_move.is_some(),
        opponent_move_submitted: theirs.pending_move.is_some(),
        last_revealed: mine.revealed_move.zip(theirs.revealed_move),
        status: m.status,
        winner_id: m.outcome.as_ref().map(|o| o.winner_id.clone()),
        history: m.game_history.clone(),
    })
}

/// One row of the scoreboard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreboardEntry {
    /// Player id
    pub player_id: PlayerId,
    /// Display name
    pub display_name: String,
    /// Standing
    pub status: PlayerStatus,
    /// Matches won
    pub win_count: u32,
    /// Matches lost
    pub loss_count: u32,
    /// Hosts the tournament
    pub is_host: bool,
    /// Won the tournament
    pub is_champion: bool,
}

/// Roster ordered champion first, then contenders, then eliminated;
/// ties broken by wins and then join order.
pub fn scoreboard(tournament: &Tournament) -> Vec<ScoreboardEntry> {
    let mut rows: Vec<(usize, ScoreboardEntry)> = tournament
        .players
        .iter()
        .enumerate()
        .map(|(joined, p)| {
            (
                joined,
                ScoreboardEntry {
                    player_id: p.id.clone(),
                    display_name: p.display_name.clone(),
                    status: p.status,
                    win_count: p.win_count,
                    loss_count: p.loss_count,
                    is_host: tournament.is_host(&p.id),
                    is_champion: tournament.champion.as_ref() == Some(&p.id),
                },
            )
        })
        .collect();

    rows.sort_by_key(|(joined, row)| {
        let standing = match (row.is_champion, row.status) {
            (true, _) => 0,
            (false, PlayerStatus::Eliminated) => 2,
            _ => 1,
        };
        (standing, std::cmp::Reverse(row.win_count), *joined)
    });

    rows.into_iter().map(|(_, row)| row).collect()
}

/// One pairing in the bracket view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketMatch {
    /// Match document id
    pub match_id: MatchId,
    /// Side A name
    pub side_a: String,
    /// Side B name
    pub side_b: String,
    /// Side A games won (0 if the document is not yet visible)
    pub games_a: u32,
    /// Side B games won
    pub games_b: u32,
    /// Finished as far as this client can tell
    pub finished: bool,
    /// Winner name once known
    pub winner: Option<String>,
}

/// One round in the bracket view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketRound {
    /// Round number
    pub round_number: u32,
    /// Pairings
    pub matches: Vec<BracketMatch>,
    /// Names of bye players
    pub byes: Vec<String>,
}

/// Whole bracket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketView {
    /// Lifecycle status
    pub status: TournamentStatus,
    /// Rounds in order
    pub rounds: Vec<BracketRound>,
    /// Champion name once finished
    pub champion: Option<String>,
}

/// Render the bracket, merging folded winners with live match documents.
pub fn bracket_view(tournament: &Tournament, matches: &BTreeMap<MatchId, Match>) -> BracketView {
    let name = |id: &PlayerId| tournament.display_name(id).to_string();

    let rounds = tournament
        .bracket
        .iter()
        .map(|round| BracketRound {
            round_number: round.round_number,
            matches: round
                .matches
                .iter()
                .map(|pairing| {
                    let doc = matches.get(&pairing.match_id);
                    let winner = pairing
                        .winner
                        .clone()
                        .or_else(|| doc.and_then(|m| m.outcome.as_ref()).map(|o| o.winner_id.clone()));
                    BracketMatch {
                        match_id: pairing.match_id.clone(),
                        side_a: name(&pairing.side_a),
                        side_b: name(&pairing.side_b),
                        games_a: doc.map(|m| m.side_a.games_won).unwrap_or(0),
                        games_b: doc.map(|m| m.side_b.games_won).unwrap_or(0),
                        finished: winner.is_some(),
                        winner: winner.as_ref().map(name),
                    }
                })
                .collect(),
            byes: round.bye_players.iter().map(name).collect(),
        })
        .collect();

    BracketView {
        status: tournament.status,
        rounds,
        champion: tournament.champion.as_ref().map(name),
    }
}
