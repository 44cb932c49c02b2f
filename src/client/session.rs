//! Tournament Client
//!
//! One participant's handle on one tournament. Actions read the latest
//! documents, derive the next state with the pure state machines, and
//! write it back with a revision precondition, retrying when another
//! client got there first. The reaction loop (`run`) watches the
//! tournament and its matches and performs the shared upkeep any client
//! may do: resolving games, creating missing match documents, folding
//! outcomes and finishing the tournament.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::client::config::ClientConfig;
use crate::client::error::{ConflictError, PermissionError, TournamentError, ValidationError};
use crate::client::identity::IdentityProvider;
use crate::store::{
    DocumentStore, Layout, Precondition, RetryingStore, Revision, Snapshot, StoreError,
};
use crate::tournament::code::GameCode;
use crate::tournament::controller::{self, Advance};
use crate::tournament::error::TransitionError;
use crate::tournament::events::{diff_tournament, TournamentEvent};
use crate::tournament::ledger::Match;
use crate::tournament::moves::Move;
use crate::tournament::reactions::{on_match_snapshot, on_tournament_snapshot, reconcile, Intent};
use crate::tournament::resolver::resolve_pending;
use crate::tournament::round::{depart, ready_to_advance};
use crate::tournament::state::{MatchId, PlayerId, Tournament, TournamentStatus};
use crate::tournament::views::{self, BracketView, MatchView, ScoreboardEntry};

/// Event channel capacity.
const EVENT_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// CACHE
// =============================================================================

#[derive(Clone, Debug)]
struct Versioned<T> {
    revision: Revision,
    doc: T,
}

/// Latest observed documents of the attached tournament.
#[derive(Clone, Debug)]
struct Attachment {
    code: GameCode,
    tournament: Option<Versioned<Tournament>>,
    matches: BTreeMap<MatchId, Versioned<Match>>,
}

impl Attachment {
    fn new(code: GameCode) -> Self {
        Self {
            code,
            tournament: None,
            matches: BTreeMap::new(),
        }
    }

    fn match_docs(&self) -> BTreeMap<MatchId, Match> {
        self.matches
            .iter()
            .map(|(id, m)| (id.clone(), m.doc.clone()))
            .collect()
    }
}

fn decode<T: DeserializeOwned>(snapshot: &Snapshot) -> Result<Option<T>, TournamentError> {
    Ok(snapshot.decode()?)
}

fn intent_label(intent: &Intent) -> String {
    match intent {
        Intent::ResolveGame(m) => format!("resolve {}", m.id),
        Intent::CreateMatch(m) => format!("create {}", m.id),
        Intent::UpdateTournament(t) => format!("update {}", t.code),
    }
}

fn validate_display_name(name: &str) -> Result<&str, TournamentError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::MissingDisplayName.into());
    }
    Ok(name)
}

// =============================================================================
// CLIENT
// =============================================================================

/// A participant's connection to the tournament documents.
pub struct TournamentClient<S> {
    store: RetryingStore<Arc<S>>,
    me: PlayerId,
    config: ClientConfig,
    layout: Layout,
    attachment: RwLock<Option<Attachment>>,
    events: broadcast::Sender<TournamentEvent>,
}

impl<S: DocumentStore + 'static> TournamentClient<S> {
    /// Wait for the participant identity and build a detached client.
    pub async fn connect(
        store: Arc<S>,
        identity: &dyn IdentityProvider,
        config: ClientConfig,
    ) -> Result<Self, TournamentError> {
        let me = identity.ready().await.ok_or_else(|| {
            TournamentError::Permission(PermissionError::AccessDenied("no participant identity".to_string()))
        })?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        debug!("client {} connected", me.short());

        Ok(Self {
            store: RetryingStore::new(store, config.retry_attempts, config.retry_backoff),
            layout: config.layout(),
            me,
            config,
            attachment: RwLock::new(None),
            events,
        })
    }

    /// This client's participant id.
    pub fn participant_id(&self) -> &PlayerId {
        &self.me
    }

    /// Receive events derived from observed snapshots.
    pub fn subscribe_events(&self) -> broadcast::Receiver<TournamentEvent> {
        self.events.subscribe()
    }

    /// Code of the attached tournament.
    pub async fn attached_code(&self) -> Result<GameCode, TournamentError> {
        self.attachment
            .read()
            .await
            .as_ref()
            .map(|a| a.code.clone())
            .ok_or_else(|| TournamentError::NotFound("no tournament attached".to_string()))
    }

    /// Drop the attachment and its cached documents.
    pub async fn detach(&self) {
        if let Some(previous) = self.attachment.write().await.take() {
            info!("{} detached from {}", self.me.short(), previous.code);
        }
    }

    // =========================================================================
    // STORE ACCESS
    // =========================================================================

    async fn read_tournament(&self, code: &GameCode) -> Result<Versioned<Tournament>, TournamentError> {
        let snapshot = self.store.get(&self.layout.tournament(code)).await?;
        let doc = decode(&snapshot)?
            .ok_or_else(|| TournamentError::NotFound(format!("tournament {}", code)))?;
        Ok(Versioned { revision: snapshot.revision, doc })
    }

    async fn read_match(&self, code: &GameCode, id: &MatchId) -> Result<Option<Versioned<Match>>, TournamentError> {
        let snapshot = self.store.get(&self.layout.match_doc(code, id)).await?;
        Ok(decode(&snapshot)?.map(|doc| Versioned { revision: snapshot.revision, doc }))
    }

    /// Match documents of the tournament's current round that exist.
    async fn read_round_matches(&self, tournament: &Tournament) -> Result<BTreeMap<MatchId, Match>, TournamentError> {
        let mut matches = BTreeMap::new();
        if let Some(round) = tournament.current_round() {
            for pairing in &round.matches {
                if let Some(m) = self.read_match(&tournament.code, &pairing.match_id).await? {
                    matches.insert(pairing.match_id.clone(), m.doc);
                }
            }
        }
        Ok(matches)
    }

    async fn put_tournament(&self, tournament: &Tournament, precondition: Precondition) -> Result<Revision, StoreError> {
        let document = serde_json::to_value(tournament)?;
        self.store
            .set(&self.layout.tournament(&tournament.code), document, precondition)
            .await
    }

    async fn put_match(&self, code: &GameCode, m: &Match, precondition: Precondition) -> Result<Revision, StoreError> {
        let document = serde_json::to_value(m)?;
        self.store.set(&self.layout.match_doc(code, &m.id), document, precondition).await
    }

    /// Read, derive, conditionally write; repeat while another writer
    /// wins the race. Returns the documents before and after, or `None`
    /// if `derive` found nothing to change.
    async fn mutate_tournament<F>(
        &self,
        code: &GameCode,
        mut derive: F,
    ) -> Result<Option<(Tournament, Tournament)>, TournamentError>
    where
        F: FnMut(&Tournament, &BTreeMap<MatchId, Match>) -> Result<Option<Tournament>, TournamentError>,
    {
        for attempt in 1..=self.config.write_attempts {
            let current = self.read_tournament(code).await?;
            let matches = self.read_round_matches(&current.doc).await?;
            let Some(mut next) = derive(&current.doc, &matches)? else {
                return Ok(None);
            };
            next.updated_at = Utc::now();

            match self.put_tournament(&next, Precondition::Revision(current.revision)).await {
                Ok(revision) => {
                    debug!("tournament {} written at revision {}", code, revision);
                    return Ok(Some((current.doc, next)));
                }
                Err(StoreError::PreconditionFailed { .. }) => {
                    debug!("tournament {} changed underneath (attempt {}), retrying", code, attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ConflictError::Contention.into())
    }

    /// Create any missing match document of the current round.
    async fn ensure_matches(&self, tournament: &Tournament) -> Result<(), TournamentError> {
        let Some(round) = tournament.current_round() else {
            return Ok(());
        };
        for pairing in round.matches.iter().filter(|p| p.winner.is_none()) {
            let m = Match::from_ref(pairing, tournament.epoch, round.round_number);
            match self.put_match(&tournament.code, &m, Precondition::Absent).await {
                Ok(_) => debug!("created {}", m.id),
                Err(StoreError::PreconditionFailed { .. }) => debug!("{} already exists", m.id),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Detach if an action found the tournament gone or was refused
    /// access to it.
    async fn settle<T>(&self, result: Result<T, TournamentError>) -> Result<T, TournamentError> {
        if let Err(e) = &result {
            if e.detaches_client() {
                warn!("{} detaching: {}", self.me.short(), e);
                self.detach().await;
            }
        }
        result
    }

    // =========================================================================
    // LOBBY
    // =========================================================================

    /// Open a new lobby with this participant as host. Returns its code.
    #[instrument(skip(self))]
    pub async fn create_tournament(&self, display_name: &str) -> Result<GameCode, TournamentError> {
        let display_name = validate_display_name(display_name)?;

        for attempt in 1..=self.config.max_code_attempts {
            let (code, salt) = {
                let mut rng = rand::thread_rng();
                (GameCode::generate(&mut rng, self.config.code_length), rand::Rng::gen::<u64>(&mut rng))
            };
            let tournament = Tournament::new(code.clone(), self.me.clone(), display_name, salt, Utc::now());

            match self.put_tournament(&tournament, Precondition::Absent).await {
                Ok(revision) => {
                    info!("{} opened tournament {}", self.me.short(), code);
                    let mut attachment = Attachment::new(code.clone());
                    attachment.tournament = Some(Versioned { revision, doc: tournament });
                    *self.attachment.write().await = Some(attachment);
                    return Ok(code);
                }
                Err(StoreError::PreconditionFailed { .. }) => {
                    warn!("game code {} taken (attempt {})", code, attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ConflictError::DuplicateCode.into())
    }

    /// Register in a lobby and attach to it. Rejoining is a no-op.
    #[instrument(skip(self))]
    pub async fn join_tournament(&self, code: &str, display_name: &str) -> Result<(), TournamentError> {
        let display_name = validate_display_name(display_name)?;
        let code = GameCode::parse(code)?;
        let me = self.me.clone();
        let max_players = self.config.max_players;

        let joined = self
            .mutate_tournament(&code, |t, _| Ok(controller::join(t, &me, display_name, max_players)?))
            .await?;
        if joined.is_some() {
            info!("{} joined {}", self.me.short(), code);
        }
        self.attach(code.as_str()).await
    }

    /// Attach to an existing tournament and load its current documents.
    #[instrument(skip(self))]
    pub async fn attach(&self, code: &str) -> Result<(), TournamentError> {
        let code = GameCode::parse(code)?;
        let tournament = self.read_tournament(&code).await?;

        let mut attachment = Attachment::new(code.clone());
        for round in &tournament.doc.bracket {
            for pairing in &round.matches {
                if let Some(m) = self.read_match(&code, &pairing.match_id).await? {
                    attachment.matches.insert(pairing.match_id.clone(), m);
                }
            }
        }
        attachment.tournament = Some(tournament);

        *self.attachment.write().await = Some(attachment);
        debug!("{} attached to {}", self.me.short(), code);
        Ok(())
    }

    // =========================================================================
    // ACTIONS
    // =========================================================================

    /// Record a move for the current game of a match.
    #[instrument(skip(self))]
    pub async fn submit_move(&self, match_id: &MatchId, mv: Move) -> Result<(), TournamentError> {
        let result = self.submit_move_inner(match_id, mv).await;
        self.settle(result).await
    }

    async fn submit_move_inner(&self, match_id: &MatchId, mv: Move) -> Result<(), TournamentError> {
        let code = self.attached_code().await?;

        for attempt in 1..=self.config.write_attempts {
            let tournament = self.read_tournament(&code).await?.doc;
            let Some(current) = self.read_match(&code, match_id).await? else {
                let scheduled = tournament
                    .current_round()
                    .is_some_and(|r| r.matches.iter().any(|p| &p.match_id == match_id));
                if !scheduled {
                    return Err(TransitionError::StaleMatch.into());
                }
                // Paired but not yet written
                self.ensure_matches(&tournament).await?;
                continue;
            };
            if current.doc.epoch != tournament.epoch || current.doc.round != tournament.current_round {
                return Err(TransitionError::StaleMatch.into());
            }

            let next = current.doc.submit_move(&self.me, mv)?;
            match self.put_match(&code, &next, Precondition::Revision(current.revision)).await {
                Ok(revision) => {
                    debug!("{} played game {} of {}", self.me.short(), next.current_game(), match_id);
                    // Resolve right away if the opponent already moved
                    if let Some((resolved, _)) = resolve_pending(&next) {
                        match self.put_match(&code, &resolved, Precondition::Revision(revision)).await {
                            Ok(_) | Err(StoreError::PreconditionFailed { .. }) => {}
                            Err(e) => warn!("resolving {} after move failed: {}", match_id, e),
                        }
                    }
                    return Ok(());
                }
                Err(StoreError::PreconditionFailed { .. }) => {
                    debug!("{} changed underneath (attempt {}), retrying", match_id, attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ConflictError::Contention.into())
    }

    /// Close the lobby and pair round 1. Host only.
    #[instrument(skip(self))]
    pub async fn start_tournament(&self) -> Result<(), TournamentError> {
        let result = self.start_tournament_inner().await;
        self.settle(result).await
    }

    async fn start_tournament_inner(&self) -> Result<(), TournamentError> {
        let code = self.attached_code().await?;
        let me = self.me.clone();
        let min_players = self.config.min_players;

        let written = self
            .mutate_tournament(&code, |t, _| Ok(Some(controller::start(t, &me, min_players)?.0)))
            .await?;
        if let Some((_, next)) = written {
            self.ensure_matches(&next).await?;
        }
        Ok(())
    }

    /// Fold the finished round and pair the next one, or finish the
    /// tournament if one contender is left. Host only.
    #[instrument(skip(self))]
    pub async fn advance_round(&self) -> Result<TournamentStatus, TournamentError> {
        let result = self.advance_round_inner().await;
        self.settle(result).await
    }

    async fn advance_round_inner(&self) -> Result<TournamentStatus, TournamentError> {
        let code = self.attached_code().await?;
        let me = self.me.clone();

        let written = self
            .mutate_tournament(&code, |t, matches| {
                let next = match controller::advance(t, matches, &me)? {
                    Advance::NextRound(next, _) => next,
                    Advance::Finished(next) => next,
                };
                Ok(Some(next))
            })
            .await?;

        match written {
            Some((_, next)) => {
                self.ensure_matches(&next).await?;
                Ok(next.status)
            }
            None => Ok(self.read_tournament(&code).await?.doc.status),
        }
    }

    /// Discard the bracket and reopen the lobby. Host only.
    #[instrument(skip(self))]
    pub async fn reset_to_lobby(&self) -> Result<(), TournamentError> {
        let result = self.reset_to_lobby_inner().await;
        self.settle(result).await
    }

    async fn reset_to_lobby_inner(&self) -> Result<(), TournamentError> {
        let code = self.attached_code().await?;
        let me = self.me.clone();
        let salt: u64 = rand::random();

        let written = self
            .mutate_tournament(&code, |t, _| Ok(Some(controller::reset(t, &me, salt)?)))
            .await?;

        // Old-epoch matches are unreachable now; removing them is tidy-up
        if let Some((before, _)) = written {
            for pairing in before.bracket.iter().flat_map(|r| r.matches.iter()) {
                let path = self.layout.match_doc(&code, &pairing.match_id);
                if let Err(e) = self.store.delete(&path, Precondition::None).await {
                    warn!("could not remove {}: {}", path, e);
                }
            }
        }
        Ok(())
    }

    /// Finish the tournament now, crowning the sole contender if any.
    /// Host only.
    #[instrument(skip(self))]
    pub async fn end_tournament(&self) -> Result<(), TournamentError> {
        let result = self.end_tournament_inner().await;
        self.settle(result).await
    }

    async fn end_tournament_inner(&self) -> Result<(), TournamentError> {
        let code = self.attached_code().await?;
        let me = self.me.clone();
        self.mutate_tournament(&code, |t, _| Ok(Some(controller::end(t, &me)?)))
            .await?;
        Ok(())
    }

    /// Leave the roster and detach. The last player out deletes the
    /// tournament.
    #[instrument(skip(self))]
    pub async fn leave_tournament(&self) -> Result<(), TournamentError> {
        let result = self.leave_tournament_inner().await;
        self.settle(result).await
    }

    async fn leave_tournament_inner(&self) -> Result<(), TournamentError> {
        let code = self.attached_code().await?;

        for attempt in 1..=self.config.write_attempts {
            let current = self.read_tournament(&code).await?;
            let pairing = current
                .doc
                .current_round()
                .and_then(|r| r.match_for(&self.me))
                .cloned();
            let current_match = match pairing {
                Some(p) => self.read_match(&code, &p.match_id).await?,
                None => None,
            };

            let departure = depart(
                &current.doc,
                current_match.as_ref().map(|m| &m.doc),
                &self.me,
                self.config.forfeit_policy,
            )?;
            // Forfeit before the roster write; a retry finds the match finished
            if let (Some(forfeited), Some(basis)) = (&departure.forfeited, &current_match) {
                match self.put_match(&code, forfeited, Precondition::Revision(basis.revision)).await {
                    Ok(_) => info!("{} forfeited {}", self.me.short(), forfeited.id),
                    Err(StoreError::PreconditionFailed { .. }) => {
                        debug!("{} changed underneath (attempt {}), retrying", forfeited.id, attempt);
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            let precondition = Precondition::Revision(current.revision);
            let closing = departure.tournament.is_none();

            let written = match departure.tournament {
                Some(mut next) => {
                    next.updated_at = Utc::now();
                    self.put_tournament(&next, precondition).await.map(|_| ())
                }
                None => {
                    self.store
                        .delete(&self.layout.tournament(&code), precondition)
                        .await
                }
            };
            match written {
                Ok(()) => {}
                Err(StoreError::PreconditionFailed { .. }) => {
                    debug!("tournament {} changed underneath (attempt {}), retrying", code, attempt);
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            if closing {
                for pairing in current.doc.bracket.iter().flat_map(|r| r.matches.iter()) {
                    let path = self.layout.match_doc(&code, &pairing.match_id);
                    if let Err(e) = self.store.delete(&path, Precondition::None).await {
                        warn!("could not remove {}: {}", path, e);
                    }
                }
                info!("tournament {} closed", code);
            }

            info!("{} left {}", self.me.short(), code);
            self.detach().await;
            return Ok(());
        }
        Err(ConflictError::Contention.into())
    }

    // =========================================================================
    // VIEWS
    // =========================================================================

    /// Latest observed tournament document.
    pub async fn tournament(&self) -> Option<Tournament> {
        self.attachment
            .read()
            .await
            .as_ref()
            .and_then(|a| a.tournament.as_ref())
            .map(|t| t.doc.clone())
    }

    /// Lifecycle status of the attached tournament.
    pub async fn tournament_status(&self) -> Option<TournamentStatus> {
        self.tournament().await.map(|t| t.status)
    }

    /// This participant's current match.
    pub async fn current_match(&self) -> Option<MatchView> {
        self.current_match_for(&self.me).await
    }

    /// A participant's current match.
    pub async fn current_match_for(&self, participant: &PlayerId) -> Option<MatchView> {
        let guard = self.attachment.read().await;
        let attachment = guard.as_ref()?;
        let tournament = &attachment.tournament.as_ref()?.doc;
        views::current_match_for(tournament, &attachment.match_docs(), participant)
    }

    /// Standings.
    pub async fn scoreboard(&self) -> Vec<ScoreboardEntry> {
        self.tournament()
            .await
            .map(|t| views::scoreboard(&t))
            .unwrap_or_default()
    }

    /// Whether every match of the current round has finished and the
    /// host may advance.
    pub async fn ready_to_advance(&self) -> bool {
        let guard = self.attachment.read().await;
        let Some(attachment) = guard.as_ref() else {
            return false;
        };
        match &attachment.tournament {
            Some(t) => ready_to_advance(&t.doc, &attachment.match_docs()),
            None => false,
        }
    }

    /// Bracket with live scores.
    pub async fn bracket_view(&self) -> Option<BracketView> {
        let guard = self.attachment.read().await;
        let attachment = guard.as_ref()?;
        let tournament = &attachment.tournament.as_ref()?.doc;
        Some(views::bracket_view(tournament, &attachment.match_docs()))
    }

    // =========================================================================
    // REACTION LOOP
    // =========================================================================

    /// Watch the attached tournament until shutdown, detachment, or the
    /// tournament disappears.
    ///
    /// Lost races and transient store failures are logged and left to
    /// the next snapshot. Errors that detach the client end the loop.
    #[instrument(skip(self, shutdown), fields(player = %self.me.short()))]
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), TournamentError> {
        let code = self.attached_code().await?;
        let mut tournament_feed = self.store.subscribe(&self.layout.tournament(&code)).await?;
        let mut match_feed = self
            .store
            .subscribe_query(&self.layout.matches(&code), Arc::new(|_: &Snapshot| true))
            .await?;
        info!("watching tournament {}", code);

        loop {
            let step = tokio::select! {
                next = tournament_feed.next() => match next {
                    Some(Ok(snapshot)) => self.observe_tournament(snapshot).await,
                    Some(Err(e)) => self.recover(&code, e).await,
                    None => return Ok(()),
                },
                next = match_feed.next() => match next {
                    Some(Ok(snapshot)) => self.observe_match(snapshot).await,
                    Some(Err(e)) => self.recover(&code, e).await,
                    None => return Ok(()),
                },
                _ = shutdown.recv() => {
                    debug!("shutdown signal received");
                    return Ok(());
                }
            };

            if let Err(e) = step {
                if e.detaches_client() {
                    warn!("leaving tournament {}: {}", code, e);
                    self.detach().await;
                    return Err(e);
                }
                warn!("reaction failed: {}", e);
            }
        }
    }

    /// Re-read the attached tournament and its matches, reacting as if
    /// their snapshots had just arrived.
    pub async fn refresh(&self) -> Result<(), TournamentError> {
        let code = self.attached_code().await?;
        let snapshot = self.store.get(&self.layout.tournament(&code)).await?;
        let tournament: Option<Tournament> = decode(&snapshot)?;
        self.observe_tournament(snapshot).await?;

        if let Some(tournament) = tournament {
            for pairing in tournament.bracket.iter().flat_map(|r| r.matches.iter()) {
                let snapshot = self.store.get(&self.layout.match_doc(&code, &pairing.match_id)).await?;
                if snapshot.exists() {
                    self.observe_match(snapshot).await?;
                }
            }
        }
        Ok(())
    }

    async fn recover(&self, code: &GameCode, error: StoreError) -> Result<(), TournamentError> {
        match error {
            StoreError::Lagged(skipped) => {
                warn!("missed {} snapshots of {}, re-reading", skipped, code);
                self.refresh().await
            }
            other => Err(other.into()),
        }
    }

    async fn observe_tournament(&self, snapshot: Snapshot) -> Result<(), TournamentError> {
        #[cfg(feature = "debug-tracing")]
        tracing::trace!(revision = snapshot.revision, document = ?snapshot.data, "tournament snapshot");

        let next: Option<Tournament> = decode(&snapshot)?;
        let (old, view) = {
            let mut guard = self.attachment.write().await;
            let Some(attachment) = guard.as_mut() else {
                return Ok(());
            };
            if let Some(cached) = &attachment.tournament {
                if snapshot.exists() && snapshot.revision < cached.revision {
                    return Ok(());
                }
            }
            let old = attachment.tournament.as_ref().map(|t| t.doc.clone());
            match &next {
                Some(doc) => {
                    attachment.matches.retain(|_, m| m.doc.epoch >= doc.epoch);
                    attachment.tournament = Some(Versioned { revision: snapshot.revision, doc: doc.clone() });
                }
                None => attachment.tournament = None,
            }
            (old, attachment.clone())
        };

        let Some(next) = next else {
            self.publish(diff_tournament(old.as_ref(), None));
            return Err(TournamentError::NotFound(format!("tournament {}", view.code)));
        };

        let reaction = on_tournament_snapshot(old.as_ref(), &next, &view.match_docs());
        self.publish(reaction.events);
        self.apply(&view, reaction.intents).await
    }

    async fn observe_match(&self, snapshot: Snapshot) -> Result<(), TournamentError> {
        #[cfg(feature = "debug-tracing")]
        tracing::trace!(revision = snapshot.revision, document = ?snapshot.data, "match snapshot");

        let id = MatchId(snapshot.path.leaf().to_string());
        let next: Option<Match> = decode(&snapshot)?;
        let (old, view) = {
            let mut guard = self.attachment.write().await;
            let Some(attachment) = guard.as_mut() else {
                return Ok(());
            };
            if let Some(cached) = attachment.matches.get(&id) {
                if snapshot.exists() && snapshot.revision < cached.revision {
                    return Ok(());
                }
            }
            let Some(doc) = &next else {
                attachment.matches.remove(&id);
                return Ok(());
            };
            if let Some(t) = &attachment.tournament {
                if doc.epoch < t.doc.epoch {
                    return Ok(());
                }
            }
            let old = attachment
                .matches
                .insert(id, Versioned { revision: snapshot.revision, doc: doc.clone() })
                .map(|m| m.doc);
            (old, attachment.clone())
        };
        let Some(next) = next else {
            return Ok(());
        };

        let reaction = on_match_snapshot(old.as_ref(), &next);
        self.publish(reaction.events);

        let mut intents = reaction.intents;
        if let Some(t) = &view.tournament {
            intents.extend(reconcile(&t.doc, &view.match_docs()));
        }
        self.apply(&view, intents).await
    }

    /// Write intents with preconditions taken from the snapshots they
    /// were derived from.
    async fn apply(&self, basis: &Attachment, intents: Vec<Intent>) -> Result<(), TournamentError> {
        for intent in intents {
            let label = intent_label(&intent);
            let result = match intent {
                Intent::ResolveGame(m) => match basis.matches.get(&m.id) {
                    Some(seen) => self.put_match(&basis.code, &m, Precondition::Revision(seen.revision)).await,
                    None => continue,
                },
                Intent::CreateMatch(m) => self.put_match(&basis.code, &m, Precondition::Absent).await,
                Intent::UpdateTournament(mut t) => match &basis.tournament {
                    Some(seen) => {
                        t.updated_at = Utc::now();
                        self.put_tournament(&t, Precondition::Revision(seen.revision)).await
                    }
                    None => continue,
                },
            };

            match result {
                Ok(revision) => debug!("{} applied at revision {}", label, revision),
                Err(StoreError::PreconditionFailed { .. }) => debug!("{} lost the race", label),
                Err(e) if e.is_transient() => warn!("{} failed: {}; waiting for next snapshot", label, e),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn publish(&self, events: Vec<TournamentEvent>) {
        for event in events {
            debug!("event: {:?}", event);
            // No receivers is fine
            let _ = self.events.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use crate::client::identity::StaticIdentity;
    use crate::store::{DocumentPath, MemoryStore, Predicate, Subscription};
    use crate::tournament::ledger::MatchStatus;
    use crate::tournament::round::ForfeitPolicy;
    use crate::tournament::state::PlayerStatus;

    async fn client(store: &Arc<MemoryStore>, id: &str, config: ClientConfig) -> TournamentClient<MemoryStore> {
        let identity = StaticIdentity::new(PlayerId::new(id));
        TournamentClient::connect(store.clone(), &identity, config).await.unwrap()
    }

    async fn lobby_of_two(config: ClientConfig) -> (Arc<MemoryStore>, TournamentClient<MemoryStore>, TournamentClient<MemoryStore>, GameCode) {
        let store = MemoryStore::shared();
        let alice = client(&store, "alice", config.clone()).await;
        let bob = client(&store, "bob", config).await;
        let code = alice.create_tournament("Alice").await.unwrap();
        bob.join_tournament(code.as_str(), "Bob").await.unwrap();
        (store, alice, bob, code)
    }

    /// Play one game, `winner` throwing Rock against Scissors.
    async fn play_game(winner: &TournamentClient<MemoryStore>, loser: &TournamentClient<MemoryStore>, id: &MatchId) {
        winner.submit_move(id, Move::Rock).await.unwrap();
        loser.submit_move(id, Move::Scissors).await.unwrap();
    }

    async fn only_match(client: &TournamentClient<MemoryStore>, code: &GameCode) -> Match {
        let t = client.read_tournament(code).await.unwrap().doc;
        let id = t.current_round().unwrap().matches[0].match_id.clone();
        client.read_match(code, &id).await.unwrap().unwrap().doc
    }

    #[tokio::test]
    async fn test_create_and_join() {
        let (_store, alice, bob, code) = lobby_of_two(ClientConfig::default()).await;

        assert_eq!(code.as_str().len(), 6);
        bob.refresh().await.unwrap();
        let t = bob.tournament().await.unwrap();
        assert_eq!(t.status, TournamentStatus::Lobby);
        assert!(t.is_host(alice.participant_id()));
        assert_eq!(t.players.len(), 2);

        // Rejoining changes nothing
        bob.join_tournament(code.as_str(), "Bob").await.unwrap();
        bob.refresh().await.unwrap();
        assert_eq!(bob.tournament().await.unwrap().players.len(), 2);
    }

    #[tokio::test]
    async fn test_join_validation() {
        let store = MemoryStore::shared();
        let carol = client(&store, "carol", ClientConfig::default()).await;

        assert_eq!(
            carol.join_tournament("ZZZZZZ", "").await,
            Err(TournamentError::Validation(ValidationError::MissingDisplayName))
        );
        assert!(matches!(
            carol.join_tournament("no!", "Carol").await,
            Err(TournamentError::Validation(ValidationError::MalformedCode(_)))
        ));
        assert!(matches!(
            carol.join_tournament("ZZZZZZ", "Carol").await,
            Err(TournamentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_lobby_capacity() {
        let config = ClientConfig { max_players: 2, ..ClientConfig::default() };
        let (store, _alice, _bob, code) = lobby_of_two(config.clone()).await;
        let carol = client(&store, "carol", config).await;

        assert_eq!(
            carol.join_tournament(code.as_str(), "Carol").await,
            Err(TournamentError::Conflict(ConflictError::TournamentFull { max: 2 }))
        );
    }

    #[tokio::test]
    async fn test_start_rules() {
        let store = MemoryStore::shared();
        let alice = client(&store, "alice", ClientConfig::default()).await;
        let code = alice.create_tournament("Alice").await.unwrap();

        assert_eq!(
            alice.start_tournament().await,
            Err(TournamentError::Validation(ValidationError::InsufficientPlayers { have: 1, need: 2 }))
        );

        let bob = client(&store, "bob", ClientConfig::default()).await;
        bob.join_tournament(code.as_str(), "Bob").await.unwrap();
        assert_eq!(
            bob.start_tournament().await,
            Err(TournamentError::Permission(PermissionError::NotHost))
        );

        alice.start_tournament().await.unwrap();
        let m = only_match(&alice, &code).await;
        assert_eq!(m.status, MatchStatus::Active);

        let dave = client(&store, "dave", ClientConfig::default()).await;
        assert_eq!(
            dave.join_tournament(code.as_str(), "Dave").await,
            Err(TournamentError::Conflict(ConflictError::AlreadyStarted))
        );
    }

    #[tokio::test]
    async fn test_two_player_tournament_to_champion() {
        let (_store, alice, bob, code) = lobby_of_two(ClientConfig::default()).await;
        alice.start_tournament().await.unwrap();
        let id = only_match(&alice, &code).await.id;

        play_game(&alice, &bob, &id).await;
        assert_eq!(
            bob.submit_move(&id, Move::Paper).await.and(bob.submit_move(&id, Move::Paper).await),
            Err(TournamentError::Conflict(ConflictError::MoveAlreadySubmitted))
        );
        alice.submit_move(&id, Move::Paper).await.unwrap(); // tie
        play_game(&alice, &bob, &id).await;
        play_game(&alice, &bob, &id).await;

        let m = only_match(&alice, &code).await;
        assert!(m.is_finished());
        assert_eq!(m.game_history.len(), 4);
        assert_eq!(&m.outcome.as_ref().unwrap().winner_id, alice.participant_id());

        assert_eq!(
            bob.submit_move(&id, Move::Rock).await,
            Err(TournamentError::Conflict(ConflictError::MatchFinished))
        );
        assert_eq!(
            bob.advance_round().await,
            Err(TournamentError::Permission(PermissionError::NotHost))
        );

        assert_eq!(alice.advance_round().await, Ok(TournamentStatus::Finished));
        alice.refresh().await.unwrap();
        let t = alice.tournament().await.unwrap();
        assert_eq!(t.champion.as_ref(), Some(alice.participant_id()));
        assert_eq!(alice.scoreboard().await[0].player_id, PlayerId::new("alice"));
    }

    #[tokio::test]
    async fn test_reset_clears_bracket_and_matches() {
        let (store, alice, _bob, code) = lobby_of_two(ClientConfig::default()).await;
        alice.start_tournament().await.unwrap();
        alice.end_tournament().await.unwrap();

        alice.reset_to_lobby().await.unwrap();
        alice.refresh().await.unwrap();

        let t = alice.tournament().await.unwrap();
        assert_eq!(t.status, TournamentStatus::Lobby);
        assert_eq!(t.epoch, 1);
        assert!(t.bracket.is_empty());
        assert!(t.players.iter().all(|p| p.status == PlayerStatus::Joined && p.win_count == 0));
        assert!(store.paths_under(&alice.layout.matches(&code)).await.is_empty());
    }

    #[tokio::test]
    async fn test_host_leaving_passes_host() {
        let (_store, alice, bob, _code) = lobby_of_two(ClientConfig::default()).await;

        alice.leave_tournament().await.unwrap();
        assert!(alice.attached_code().await.is_err());

        bob.refresh().await.unwrap();
        let t = bob.tournament().await.unwrap();
        assert!(t.is_host(bob.participant_id()));
        assert_eq!(t.players.len(), 1);
    }

    #[tokio::test]
    async fn test_last_player_out_deletes_tournament() {
        let (store, alice, bob, code) = lobby_of_two(ClientConfig::default()).await;
        alice.start_tournament().await.unwrap();

        alice.leave_tournament().await.unwrap();
        bob.leave_tournament().await.unwrap();

        let layout = ClientConfig::default().layout();
        assert!(store.paths_under(&layout.tournament(&code)).await.is_empty());
    }

    #[tokio::test]
    async fn test_leaving_forfeits_under_auto_forfeit() {
        let config = ClientConfig { forfeit_policy: ForfeitPolicy::AutoForfeit, ..ClientConfig::default() };
        let (_store, alice, bob, code) = lobby_of_two(config).await;
        alice.start_tournament().await.unwrap();

        bob.leave_tournament().await.unwrap();
        let m = only_match(&alice, &code).await;
        let outcome = m.outcome.unwrap();
        assert!(outcome.forfeit);
        assert_eq!(&outcome.winner_id, alice.participant_id());

        assert_eq!(alice.advance_round().await, Ok(TournamentStatus::Finished));
    }

    #[tokio::test]
    async fn test_leaving_stalls_by_default() {
        let (_store, alice, bob, code) = lobby_of_two(ClientConfig::default()).await;
        alice.start_tournament().await.unwrap();

        bob.leave_tournament().await.unwrap();
        assert!(!only_match(&alice, &code).await.is_finished());
        assert_eq!(
            alice.advance_round().await,
            Err(TournamentError::Conflict(ConflictError::RoundNotComplete { round: 1 }))
        );
    }

    #[tokio::test]
    async fn test_run_loop_detaches_when_tournament_deleted() {
        let (store, alice, _bob, code) = lobby_of_two(ClientConfig::default()).await;
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        store
            .delete(&alice.layout.tournament(&code), Precondition::None)
            .await
            .unwrap();

        let result = alice.run(shutdown_rx).await;
        assert!(matches!(result, Err(TournamentError::NotFound(_))));
        assert!(alice.attached_code().await.is_err());
    }

    #[tokio::test]
    async fn test_access_denied_detaches() {
        let (store, alice, _bob, _code) = lobby_of_two(ClientConfig::default()).await;
        store.deny(DocumentPath::new("rps")).await;

        let err = alice.start_tournament().await.unwrap_err();
        assert!(matches!(err, TournamentError::Permission(PermissionError::AccessDenied(_))));
        assert!(alice.attached_code().await.is_err());
    }

    #[tokio::test]
    async fn test_action_on_deleted_tournament_detaches() {
        let (store, alice, _bob, code) = lobby_of_two(ClientConfig::default()).await;
        store
            .delete(&alice.layout.tournament(&code), Precondition::None)
            .await
            .unwrap();

        assert!(matches!(alice.start_tournament().await, Err(TournamentError::NotFound(_))));
        assert!(alice.attached_code().await.is_err());
    }

    #[tokio::test]
    async fn test_not_host_stays_attached() {
        let (_store, _alice, bob, code) = lobby_of_two(ClientConfig::default()).await;

        assert_eq!(
            bob.start_tournament().await,
            Err(TournamentError::Permission(PermissionError::NotHost))
        );
        assert_eq!(bob.attached_code().await, Ok(code));
    }

    #[tokio::test]
    async fn test_move_recreates_missing_match_document() {
        let (store, alice, bob, code) = lobby_of_two(ClientConfig::default()).await;
        alice.start_tournament().await.unwrap();
        let id = only_match(&alice, &code).await.id;
        store
            .delete(&alice.layout.match_doc(&code, &id), Precondition::None)
            .await
            .unwrap();

        bob.submit_move(&id, Move::Paper).await.unwrap();
        let m = only_match(&alice, &code).await;
        assert_eq!(m.side_of(bob.participant_id()).map(|s| m.side(s).pending_move), Some(Some(Move::Paper)));
        assert!(bob.attached_code().await.is_ok());
    }

    /// Slips one move by `mover` into a match just before the first
    /// write to that match goes through.
    struct MoveInTheGap {
        inner: Arc<MemoryStore>,
        matches: DocumentPath,
        mover: PlayerId,
        armed: AtomicBool,
    }

    #[async_trait]
    impl DocumentStore for MoveInTheGap {
        async fn get(&self, path: &DocumentPath) -> Result<Snapshot, StoreError> {
            self.inner.get(path).await
        }

        async fn set(
            &self,
            path: &DocumentPath,
            document: Value,
            precondition: Precondition,
        ) -> Result<Revision, StoreError> {
            if path.starts_with(&self.matches) && self.armed.swap(false, Ordering::SeqCst) {
                let current = self.inner.get(path).await?;
                let m: Match = current.decode()?.unwrap();
                let next = m.submit_move(&self.mover, Move::Rock).unwrap();
                self.inner
                    .set(path, serde_json::to_value(&next)?, Precondition::Revision(current.revision))
                    .await?;
            }
            self.inner.set(path, document, precondition).await
        }

        async fn update(
            &self,
            path: &DocumentPath,
            fields: Map<String, Value>,
            precondition: Precondition,
        ) -> Result<Revision, StoreError> {
            self.inner.update(path, fields, precondition).await
        }

        async fn delete(&self, path: &DocumentPath, precondition: Precondition) -> Result<(), StoreError> {
            self.inner.delete(path, precondition).await
        }

        async fn subscribe(&self, path: &DocumentPath) -> Result<Subscription, StoreError> {
            self.inner.subscribe(path).await
        }

        async fn subscribe_query(
            &self,
            collection: &DocumentPath,
            predicate: Predicate,
        ) -> Result<Subscription, StoreError> {
            self.inner.subscribe_query(collection, predicate).await
        }
    }

    #[tokio::test]
    async fn test_forfeit_survives_a_racing_move() {
        let config = ClientConfig { forfeit_policy: ForfeitPolicy::AutoForfeit, ..ClientConfig::default() };
        let store = MemoryStore::shared();
        let alice = client(&store, "alice", config.clone()).await;
        let code = alice.create_tournament("Alice").await.unwrap();

        let gap = Arc::new(MoveInTheGap {
            inner: store.clone(),
            matches: config.layout().matches(&code),
            mover: PlayerId::new("alice"),
            armed: AtomicBool::new(true),
        });
        let bob = TournamentClient::connect(gap.clone(), &StaticIdentity::new(PlayerId::new("bob")), config)
            .await
            .unwrap();
        bob.join_tournament(code.as_str(), "Bob").await.unwrap();
        alice.start_tournament().await.unwrap();

        bob.leave_tournament().await.unwrap();
        assert!(!gap.armed.load(Ordering::SeqCst));

        let m = only_match(&alice, &code).await;
        assert_eq!(m.status, MatchStatus::Finished);
        let outcome = m.outcome.unwrap();
        assert!(outcome.forfeit);
        assert_eq!(&outcome.winner_id, alice.participant_id());

        let t = alice.read_tournament(&code).await.unwrap().doc;
        assert_eq!(t.players.len(), 1);
        assert_eq!(alice.advance_round().await, Ok(TournamentStatus::Finished));
    }
}
