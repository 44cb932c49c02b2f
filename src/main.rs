//! RPS Bracket Demo
//!
//! Runs a whole tournament between simulated players sharing an
//! in-memory store. Each player is a separate client with its own
//! reaction loop; they only interact through the documents.
//!
//! Usage: `rps-bracket [PLAYERS]` (default 5).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use rand::seq::SliceRandom;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rps_bracket::{
    ClientConfig, MemoryStore, Move, PlayerId, StaticIdentity, TournamentClient, TournamentError,
    TournamentStatus, VERSION,
    tournament::{ledger::MatchStatus, TournamentEvent},
};

type Client = TournamentClient<MemoryStore>;

/// How often simulated players look at their views.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Give up on the demo after this long.
const DEMO_TIMEOUT: Duration = Duration::from_secs(60);

const NAMES: [&str; 8] = ["Ada", "Brin", "Cato", "Dara", "Eno", "Fay", "Gus", "Hale"];

fn random_move() -> Move {
    *Move::ALL
        .choose(&mut rand::thread_rng())
        .unwrap_or(&Move::Rock)
}

fn display_name(index: usize) -> String {
    match NAMES.get(index) {
        Some(name) => name.to_string(),
        None => format!("Player{}", index + 1),
    }
}

/// Submit a move whenever the current game is waiting on us; as host,
/// advance whenever the round is complete.
async fn play(client: Arc<Client>, host: bool) -> Result<(), TournamentError> {
    loop {
        match client.tournament_status().await {
            None | Some(TournamentStatus::Finished) => return Ok(()),
            Some(TournamentStatus::Lobby) => {}
            Some(TournamentStatus::Running) => {
                if let Some(view) = client.current_match().await {
                    if view.status == MatchStatus::Active && !view.move_submitted {
                        match client.submit_move(&view.match_id, random_move()).await {
                            // A stale view may lag behind our own last move
                            Ok(()) | Err(TournamentError::Conflict(_)) => {}
                            Err(e) => return Err(e),
                        }
                    }
                }
                if host && client.ready_to_advance().await {
                    match client.advance_round().await {
                        Ok(status) => info!("host advanced, tournament is {:?}", status),
                        Err(TournamentError::Conflict(e)) => warn!("advance rejected: {}", e),
                        Err(e) => return Err(e),
                    }
                }
            }
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn log_events(client: &Client) -> JoinHandle<()> {
    let mut events = client.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                TournamentEvent::RoundStarted { round, matches, byes } => {
                    info!("round {}: {} matches, {} byes", round, matches, byes.len());
                }
                TournamentEvent::MatchFinished { match_id, winner_id, loser_id, .. } => {
                    info!("{}: {} beat {}", match_id, winner_id.short(), loser_id.short());
                }
                TournamentEvent::TournamentFinished { champion } => {
                    info!("finished, champion: {:?}", champion.as_ref().map(PlayerId::short));
                    break;
                }
                _ => {}
            }
        }
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let players: usize = match std::env::args().nth(1) {
        Some(arg) => arg.parse().context("PLAYERS must be a number")?,
        None => 5,
    };
    if players < 2 {
        bail!("need at least 2 players");
    }

    info!("RPS Bracket v{}", VERSION);
    info!("=== {} player tournament ===", players);

    let store = MemoryStore::shared();
    let config = ClientConfig::from_env();

    let mut clients = Vec::with_capacity(players);
    for _ in 0..players {
        let identity = StaticIdentity::random();
        clients.push(Arc::new(Client::connect(store.clone(), &identity, config.clone()).await?));
    }

    let code = clients[0].create_tournament(&display_name(0)).await?;
    info!("lobby open: {}", code);
    for (i, client) in clients.iter().enumerate().skip(1) {
        client.join_tournament(code.as_str(), &display_name(i)).await?;
    }

    let (shutdown_tx, _) = broadcast::channel(1);
    let mut loops = Vec::new();
    for client in &clients {
        let client = client.clone();
        let shutdown = shutdown_tx.subscribe();
        loops.push(tokio::spawn(async move { client.run(shutdown).await }));
    }
    let logger = log_events(&clients[0]);

    clients[0].start_tournament().await?;

    let players_done = clients
        .iter()
        .enumerate()
        .map(|(i, client)| tokio::spawn(play(client.clone(), i == 0)))
        .collect::<Vec<_>>();

    let finished = tokio::time::timeout(DEMO_TIMEOUT, async {
        for handle in players_done {
            handle.await??;
        }
        Ok::<_, anyhow::Error>(())
    })
    .await;

    let _ = shutdown_tx.send(());
    for handle in loops {
        if let Err(e) = handle.await? {
            warn!("reaction loop ended with: {}", e);
        }
    }
    logger.abort();

    match finished {
        Ok(result) => result?,
        Err(_) => bail!("tournament did not finish within {:?}", DEMO_TIMEOUT),
    }

    info!("=== Final Standings ===");
    for (place, row) in clients[0].scoreboard().await.iter().enumerate() {
        info!(
            "#{} {} ({}) {:?} - {}W {}L{}",
            place + 1,
            row.display_name,
            row.player_id.short(),
            row.status,
            row.win_count,
            row.loss_count,
            if row.is_champion { " CHAMPION" } else { "" }
        );
    }

    if let Some(bracket) = clients[0].bracket_view().await {
        for round in &bracket.rounds {
            info!("--- round {} ---", round.round_number);
            for m in &round.matches {
                info!(
                    "{} {} - {} {} -> {}",
                    m.side_a,
                    m.games_a,
                    m.games_b,
                    m.side_b,
                    m.winner.as_deref().unwrap_or("?")
                );
            }
            for bye in &round.byes {
                info!("{} (bye)", bye);
            }
        }
    }

    Ok(())
}
