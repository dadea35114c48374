//! Two scripted bots play one wagered match against the in-memory
//! settlement service.
//!
//! ```text
//! RUST_LOG=debug cargo run -p duel
//! ```

use std::sync::Arc;
use std::time::Duration;

use stakegrid::prelude::*;
use stakegrid::protocol::{Cell, MatchView};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const ALICE: PlayerId = PlayerId(1);
const BOB: PlayerId = PlayerId(2);

// ---------------------------------------------------------------------------
// Bot
// ---------------------------------------------------------------------------

/// Plays until its room's session closes (or fails).
async fn bot(
    lobby: Arc<Lobby<MemorySettlement>>,
    player: PlayerId,
    seat: Seat,
    mut events: UnboundedReceiver<ServerEvent>,
) -> Result<(), StakegridError> {
    while let Some(event) = events.recv().await {
        match event {
            ServerEvent::RoomReady { room } if room.host == player => {
                info!(%player, room_id = %room.room_id, "opponent seated, starting");
                lobby
                    .handle(player, ClientRequest::StartMatch { room_id: room.room_id })
                    .await?;
            }
            ServerEvent::SignatureRequested {
                room_id,
                role,
                payload,
            } => {
                info!(%player, %role, "signing open request");
                let signature = MemorySettlement::sign(player, &payload);
                lobby
                    .handle(
                        player,
                        ClientRequest::SubmitSignature {
                            room_id,
                            role,
                            signature,
                        },
                    )
                    .await?;
            }
            ServerEvent::MatchStarted {
                session_id,
                countdown_ms,
                ..
            } => info!(%player, %session_id, countdown_ms, "session open"),
            ServerEvent::MatchTick { room_id, state } => {
                let Some(heading) = steer(&state, seat) else {
                    continue;
                };
                // The room may already be winding down after the last tick.
                if let Err(e) = lobby
                    .handle(player, ClientRequest::Direction { room_id, heading })
                    .await
                {
                    debug!(%player, error = %e, "direction dropped");
                }
            }
            ServerEvent::MatchEnded {
                outcome, scores, ..
            } => info!(%player, ?outcome, ?scores, "match over"),
            ServerEvent::SessionClosed { allocation, .. } => {
                info!(%player, payout = %allocation.amount_for(player), "settled");
                break;
            }
            ServerEvent::Error { code, message } => {
                warn!(%player, %code, %message, "error");
                if matches!(code, ErrorCode::SessionOpenFailed | ErrorCode::SessionCloseFailed) {
                    break;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Greedy: the non-reversing heading whose next cell is free and closest
/// to any food.
fn steer(view: &MatchView, seat: Seat) -> Option<Heading> {
    let me = &view.actors[seat.index()];
    let head = *me.body.first()?;
    let occupied = |cell: Cell| view.actors.iter().any(|a| a.alive && a.body.contains(&cell));

    [Heading::Up, Heading::Down, Heading::Left, Heading::Right]
        .into_iter()
        .filter(|h| *h != me.heading.opposite())
        .map(|h| (h, step(head, h, view.width, view.height)))
        .filter(|(_, cell)| !occupied(*cell))
        .min_by_key(|(_, cell)| {
            view.food
                .iter()
                .map(|food| distance(*cell, *food, view.width, view.height))
                .min()
                .unwrap_or(0)
        })
        .map(|(h, _)| h)
}

fn step(cell: Cell, heading: Heading, width: u16, height: u16) -> Cell {
    let (dx, dy) = heading.delta();
    let x = (i32::from(cell.x) + dx).rem_euclid(i32::from(width));
    let y = (i32::from(cell.y) + dy).rem_euclid(i32::from(height));
    Cell::new(x as u16, y as u16)
}

fn distance(a: Cell, b: Cell, width: u16, height: u16) -> u16 {
    let wrap = |p: u16, q: u16, size: u16| {
        let d = p.abs_diff(q);
        d.min(size - d)
    };
    wrap(a.x, b.x, width) + wrap(a.y, b.y, height)
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = RoomConfig {
        countdown: Duration::from_secs(1),
        result_grace: Duration::from_millis(500),
        tick: TickConfig::with_period(Duration::from_millis(50)),
        ..RoomConfig::default()
    };
    let service = Arc::new(MemorySettlement::new());
    let lobby = Arc::new(Lobby::new(config, Arc::clone(&service)));

    let (alice_tx, alice_rx) = mpsc::unbounded_channel();
    let (bob_tx, bob_rx) = mpsc::unbounded_channel();
    lobby.connect(ALICE, alice_tx).await;
    lobby.connect(BOB, bob_tx).await;

    let stake: Amount = "0.5".parse()?;
    lobby.handle(ALICE, ClientRequest::CreateRoom { stake }).await?;
    let room_id = lobby
        .registry()
        .list_available()
        .await
        .first()
        .map(|room| room.room_id)
        .ok_or("room was not listed")?;

    let alice = tokio::spawn(bot(Arc::clone(&lobby), ALICE, Seat::First, alice_rx));
    let bob = tokio::spawn(bot(Arc::clone(&lobby), BOB, Seat::Second, bob_rx));
    lobby.handle(BOB, ClientRequest::JoinRoom { room_id, stake }).await?;

    alice.await??;
    bob.await??;

    lobby.shutdown().await;
    for session in service.sessions() {
        if let Some(allocation) = service.closed_allocation(&session) {
            for entry in &allocation.entries {
                info!(%session, player = %entry.player, amount = %entry.amount, "final allocation");
            }
        }
    }
    Ok(())
}
