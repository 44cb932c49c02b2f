//! Tournament Data Model
//!
//! Documents as they live in the shared store. These are materialized
//! views: every client re-derives them from the latest snapshot and
//! never treats an in-process copy as authoritative.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::tournament::code::GameCode;
use crate::tournament::error::TransitionError;

// =============================================================================
// IDS
// =============================================================================

/// Opaque, stable participant identifier from the identity provider.
///
/// Implements Ord so rosters and seeds can be sorted deterministically.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    /// Wrap an identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random identifier (for tests and simulations).
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow as `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log lines.
    pub fn short(&self) -> &str {
        let end = self.0.char_indices().nth(8).map(|(i, _)| i).unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Match document identifier, unique within a tournament.
///
/// Encodes the reset epoch so matches from a discarded bracket never
/// collide with the new one.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(pub String);

impl MatchId {
    /// Build the id of the `index`-th pairing of a round.
    pub fn new(epoch: u32, round: u32, index: usize) -> Self {
        Self(format!("e{}-r{}-m{}", epoch, round, index))
    }

    /// Borrow as `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// PLAYER
// =============================================================================

/// Player standing within the tournament.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum PlayerStatus {
    /// In the lobby, not yet paired.
    #[default]
    Joined,
    /// Still in contention.
    Active,
    /// Advanced past the current round without playing.
    Bye,
    /// Lost a match.
    Eliminated,
}

impl PlayerStatus {
    /// Whether the player is still in contention once a round is folded.
    #[inline]
    pub fn is_contending(self) -> bool {
        matches!(self, PlayerStatus::Active | PlayerStatus::Bye)
    }
}

/// A registered participant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Player {
    /// Participant identifier
    pub id: PlayerId,

    /// Name shown to other players
    pub display_name: String,

    /// Standing in the tournament
    pub status: PlayerStatus,

    /// Matches won
    pub win_count: u32,

    /// Matches lost
    pub loss_count: u32,

    /// Won (or was given a bye in) the current round
    pub advanced_this_round: bool,
}

impl Player {
    /// Create a freshly joined player.
    pub fn new(id: PlayerId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            status: PlayerStatus::Joined,
            win_count: 0,
            loss_count: 0,
            advanced_this_round: false,
        }
    }

    /// Back to the freshly joined state.
    pub fn reset(&mut self) {
        self.status = PlayerStatus::Joined;
        self.win_count = 0;
        self.loss_count = 0;
        self.advanced_this_round = false;
    }
}

// =============================================================================
// ROUND
// =============================================================================

/// A pairing as recorded on the tournament document.
///
/// `winner` is filled in when the match outcome has been folded into
/// the roster; it is the guard that makes folding idempotent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRef {
    /// Match document id
    pub match_id: MatchId,
    /// First player
    pub side_a: PlayerId,
    /// Second player
    pub side_b: PlayerId,
    /// Folded winner
    #[serde(default)]
    pub winner: Option<PlayerId>,
}

impl MatchRef {
    /// Check if a player is on either side.
    pub fn involves(&self, player: &PlayerId) -> bool {
        &self.side_a == player || &self.side_b == player
    }

    /// The other side, if `player` is in this pairing.
    pub fn opponent_of(&self, player: &PlayerId) -> Option<&PlayerId> {
        if &self.side_a == player {
            Some(&self.side_b)
        } else if &self.side_b == player {
            Some(&self.side_a)
        } else {
            None
        }
    }
}

/// One round of the bracket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    /// 1-based round number
    pub round_number: u32,
    /// Pairings created for the round
    pub matches: Vec<MatchRef>,
    /// Players advanced without playing
    pub bye_players: Vec<PlayerId>,
}

impl Round {
    /// Find the pairing a player is in.
    pub fn match_for(&self, player: &PlayerId) -> Option<&MatchRef> {
        self.matches.iter().find(|m| m.involves(player))
    }

    /// Check if a player has the bye.
    pub fn has_bye(&self, player: &PlayerId) -> bool {
        self.bye_players.contains(player)
    }

    /// Every pairing has a folded winner.
    pub fn is_folded(&self) -> bool {
        self.matches.iter().all(|m| m.winner.is_some())
    }
}

// =============================================================================
// TOURNAMENT STATUS
// =============================================================================

/// Tournament lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum TournamentStatus {
    /// Accepting players.
    #[default]
    Lobby,
    /// Rounds in progress.
    Running,
    /// Terminal until reset.
    Finished,
}

/// Requests that move a tournament between statuses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentAction {
    /// Host starts round 1.
    Start,
    /// Host starts the next round.
    Advance,
    /// Automatic finish once at most one player remains.
    Finish,
    /// Host stops the tournament early.
    End,
    /// Host discards the bracket and reopens the lobby.
    Reset,
}

impl TournamentStatus {
    /// Transition table.
    ///
    /// `Finish` and `End` are idempotent on an already finished tournament.
    pub fn apply(self, action: TournamentAction) -> Result<TournamentStatus, TransitionError> {
        use TournamentAction as A;
        use TournamentStatus as S;

        match (self, action) {
            (S::Lobby, A::Start) => Ok(S::Running),
            (S::Running, A::Advance) => Ok(S::Running),
            (S::Running | S::Finished, A::Finish) => Ok(S::Finished),
            (S::Running | S::Finished, A::End) => Ok(S::Finished),
            (S::Running | S::Finished, A::Reset) => Ok(S::Lobby),
            (from, action) => Err(TransitionError::IllegalTransition { from, action }),
        }
    }
}

// =============================================================================
// TOURNAMENT
// =============================================================================

/// The tournament document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tournament {
    /// Game code (document key)
    pub code: GameCode,

    /// Participant allowed to start, advance, reset and end
    pub host_id: PlayerId,

    /// Lifecycle status
    pub status: TournamentStatus,

    /// Incremented on every reset
    pub epoch: u32,

    /// 0 in the lobby, otherwise the round being played
    pub current_round: u32,

    /// Roster in join order
    pub players: Vec<Player>,

    /// Rounds in order
    pub bracket: Vec<Round>,

    /// Winner once finished
    pub champion: Option<PlayerId>,

    /// Shared randomness for bracket seeds
    pub salt: u64,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Last write time
    pub updated_at: DateTime<Utc>,
}

impl Tournament {
    /// Open a lobby with the host as its first player.
    pub fn new(
        code: GameCode,
        host_id: PlayerId,
        host_name: impl Into<String>,
        salt: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            code,
            players: vec![Player::new(host_id.clone(), host_name)],
            host_id,
            status: TournamentStatus::Lobby,
            epoch: 0,
            current_round: 0,
            bracket: Vec::new(),
            champion: None,
            salt,
            created_at: now,
            updated_at: now,
        }
    }

    /// Look up a player.
    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| &p.id == id)
    }

    /// Look up a player mutably.
    pub fn player_mut(&mut self, id: &PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| &p.id == id)
    }

    /// Check roster membership.
    pub fn contains(&self, id: &PlayerId) -> bool {
        self.player(id).is_some()
    }

    /// Check if `id` is the host.
    pub fn is_host(&self, id: &PlayerId) -> bool {
        &self.host_id == id
    }

    /// Display name, falling back to the id for departed players.
    pub fn display_name<'a>(&'a self, id: &'a PlayerId) -> &'a str {
        self.player(id)
            .map(|p| p.display_name.as_str())
            .unwrap_or_else(|| id.as_str())
    }

    /// The round being played.
    pub fn current_round(&self) -> Option<&Round> {
        self.bracket.iter().find(|r| r.round_number == self.current_round)
    }

    /// The round being played, mutably.
    pub fn current_round_mut(&mut self) -> Option<&mut Round> {
        let current = self.current_round;
        self.bracket.iter_mut().find(|r| r.round_number == current)
    }

    /// Players still in contention.
    pub fn contenders(&self) -> Vec<&Player> {
        self.players.iter().filter(|p| p.status.is_contending()).collect()
    }

    /// Players flagged as advanced in the current round.
    pub fn advanced_players(&self) -> Vec<PlayerId> {
        self.players
            .iter()
            .filter(|p| p.advanced_this_round)
            .map(|p| p.id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TournamentAction as A;
    use TournamentStatus as S;

    #[test]
    fn test_transition_table_exhaustive() {
        let expected = [
            (S::Lobby, A::Start, Some(S::Running)),
            (S::Lobby, A::Advance, None),
            (S::Lobby, A::Finish, None),
            (S::Lobby, A::End, None),
            (S::Lobby, A::Reset, None),
            (S::Running, A::Start, None),
            (S::Running, A::Advance, Some(S::Running)),
            (S::Running, A::Finish, Some(S::Finished)),
            (S::Running, A::End, Some(S::Finished)),
            (S::Running, A::Reset, Some(S::Lobby)),
            (S::Finished, A::Start, None),
            (S::Finished, A::Advance, None),
            (S::Finished, A::Finish, Some(S::Finished)),
            (S::Finished, A::End, Some(S::Finished)),
            (S::Finished, A::Reset, Some(S::Lobby)),
        ];

        for (from, action, to) in expected {
            assert_eq!(from.apply(action).ok(), to, "{:?} --{:?}-->", from, action);
        }
    }

    #[test]
    fn test_illegal_transition_reports_state() {
        let err = S::Lobby.apply(A::Advance).unwrap_err();
        assert_eq!(
            err,
            TransitionError::IllegalTransition { from: S::Lobby, action: A::Advance }
        );
    }

    #[test]
    fn test_match_id_format() {
        assert_eq!(MatchId::new(2, 3, 0).as_str(), "e2-r3-m0");
    }

    #[test]
    fn test_new_tournament_has_host_in_roster() {
        let code = GameCode::parse("ABCDEF").unwrap();
        let host = PlayerId::new("host");
        let t = Tournament::new(code, host.clone(), "Hana", 1, Utc::now());

        assert!(t.is_host(&host));
        assert_eq!(t.players.len(), 1);
        assert_eq!(t.player(&host).unwrap().status, PlayerStatus::Joined);
        assert_eq!(t.status, S::Lobby);
        assert!(t.current_round().is_none());
    }

    #[test]
    fn test_tournament_json_shape() {
        let code = GameCode::parse("ABCDEF").unwrap();
        let t = Tournament::new(code, PlayerId::new("h"), "Hana", 1, Utc::now());
        let value = serde_json::to_value(&t).unwrap();

        assert_eq!(value["status"], "lobby");
        assert_eq!(value["code"], "ABCDEF");
        assert_eq!(value["players"][0]["status"], "joined");

        let back: Tournament = serde_json::from_value(value).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_short_id() {
        assert_eq!(PlayerId::new("0123456789").short(), "01234567");
        assert_eq!(PlayerId::new("abc").short(), "abc");
    }
}
