//! Room registry: creates rooms, routes requests to them, and enforces
//! one live room per player.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use stakegrid_protocol::{Amount, Heading, PlayerId, Role, RoomId, RoomSnapshot, RoomState, Signature};
use stakegrid_settlement::{SettlementService, UnsettledSession};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::room::spawn_room;
use crate::{PlayerSender, RoomConfig, RoomError, RoomHandle};

/// Shared table of live rooms. Room actors remove themselves when they
/// retire and release their participants when they finish.
#[derive(Default)]
pub(crate) struct Directory {
    rooms: HashMap<RoomId, RoomHandle>,
    /// A player holds at most one entry here.
    player_rooms: HashMap<PlayerId, RoomId>,
    unsettled: Vec<UnsettledSession>,
}

impl Directory {
    /// Drops every player index entry that points at `room_id`.
    pub(crate) fn release_players(&mut self, room_id: RoomId) {
        self.player_rooms.retain(|_, room| *room != room_id);
    }

    /// Removes a retired room. Safe to call for a room already removed.
    pub(crate) fn remove_room(&mut self, room_id: RoomId, unsettled: Option<UnsettledSession>) {
        self.rooms.remove(&room_id);
        self.release_players(room_id);
        if let Some(session) = unsettled {
            self.unsettled.push(session);
        }
    }
}

/// Entry point for room operations from the lobby.
///
/// The registry never holds its table lock across a call into a room, so
/// a room that is finishing can always release its players.
pub struct RoomRegistry<S: SettlementService> {
    config: Arc<RoomConfig>,
    service: Arc<S>,
    directory: Arc<RwLock<Directory>>,
    next_room_id: AtomicU64,
}

impl<S: SettlementService> RoomRegistry<S> {
    pub fn new(config: RoomConfig, service: Arc<S>) -> Self {
        Self {
            config: Arc::new(config.validated()),
            service,
            directory: Arc::new(RwLock::new(Directory::default())),
            next_room_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    pub fn service(&self) -> &Arc<S> {
        &self.service
    }

    /// Opens a room with `host` seated, in `waiting`.
    pub async fn create_room(
        &self,
        host: PlayerId,
        stake: Amount,
        sender: PlayerSender,
    ) -> Result<RoomSnapshot, RoomError> {
        if !self.config.is_allowed(stake) {
            return Err(RoomError::InvalidStake(stake));
        }

        let mut directory = self.directory.write().await;
        if let Some(current) = directory.player_rooms.get(&host) {
            return Err(RoomError::AlreadyInRoom(host, *current));
        }

        let room_id = RoomId(self.next_room_id.fetch_add(1, Ordering::Relaxed));
        let handle = spawn_room(
            room_id,
            host,
            stake,
            sender,
            Arc::clone(&self.config),
            Arc::clone(&self.service),
            Arc::clone(&self.directory),
        );
        let snapshot = handle.snapshot();
        directory.rooms.insert(room_id, handle);
        directory.player_rooms.insert(host, room_id);

        info!(%room_id, %host, %stake, "room created");
        Ok(snapshot)
    }

    /// Seats `guest` in a waiting room whose stake equals `stake`.
    ///
    /// On any failure the room stays as it was.
    pub async fn join_room(
        &self,
        room_id: RoomId,
        guest: PlayerId,
        stake: Amount,
        sender: PlayerSender,
    ) -> Result<RoomSnapshot, RoomError> {
        let handle = {
            let mut directory = self.directory.write().await;
            if let Some(current) = directory.player_rooms.get(&guest) {
                return Err(RoomError::AlreadyInRoom(guest, *current));
            }
            let handle = directory
                .rooms
                .get(&room_id)
                .cloned()
                .ok_or(RoomError::NotFound(room_id))?;
            // Reserve the seat in the index so a concurrent request from
            // the same player sees it.
            directory.player_rooms.insert(guest, room_id);
            handle
        };

        let result = handle.join(guest, stake, sender).await;
        if let Err(e) = &result {
            debug!(%room_id, %guest, error = %e, "join refused");
            let mut directory = self.directory.write().await;
            if directory.player_rooms.get(&guest) == Some(&room_id) {
                directory.player_rooms.remove(&guest);
            }
        }
        result
    }

    /// Rooms still waiting for a guest, oldest first.
    pub async fn list_available(&self) -> Vec<RoomSnapshot> {
        let directory = self.directory.read().await;
        let mut rooms: Vec<RoomSnapshot> = directory
            .rooms
            .values()
            .map(RoomHandle::snapshot)
            .filter(|room| room.state == RoomState::Waiting)
            .collect();
        rooms.sort_by_key(|room| room.room_id);
        rooms
    }

    pub async fn start_match(&self, room_id: RoomId, player: PlayerId) -> Result<(), RoomError> {
        self.handle(room_id).await?.start(player).await
    }

    pub async fn submit_signature(
        &self,
        room_id: RoomId,
        player: PlayerId,
        role: Role,
        signature: Signature,
    ) -> Result<(), RoomError> {
        self.handle(room_id)
            .await?
            .submit_signature(player, role, signature)
            .await
    }

    /// Queues a heading. Never waits on the room; outside of play the
    /// room ignores it.
    pub async fn queue_direction(
        &self,
        room_id: RoomId,
        player: PlayerId,
        heading: Heading,
    ) -> Result<(), RoomError> {
        let handle = self.handle(room_id).await?;
        if handle.snapshot().role_of(player).is_none() {
            return Err(RoomError::NotInRoom(player, room_id));
        }
        handle.direction(player, heading)
    }

    /// Removes `player` from `room_id`. What that means for the match
    /// depends on the room's state; see the room actor.
    pub async fn leave(&self, room_id: RoomId, player: PlayerId) -> Result<(), RoomError> {
        let handle = self.handle(room_id).await?;
        handle.leave(player).await?;

        let mut directory = self.directory.write().await;
        if directory.player_rooms.get(&player) == Some(&room_id) {
            directory.player_rooms.remove(&player);
        }
        Ok(())
    }

    /// Leaves whatever room `player` is in. Used on disconnect.
    pub async fn leave_current(&self, player: PlayerId) -> Option<RoomId> {
        let room_id = self.player_room(player).await?;
        if let Err(e) = self.leave(room_id, player).await {
            debug!(%room_id, %player, error = %e, "leave on disconnect failed");
        }
        Some(room_id)
    }

    /// Removes the room from the table and tells its actor to wind down.
    /// Unknown or already retired rooms are ignored.
    pub async fn retire(&self, room_id: RoomId) {
        let handle = {
            let mut directory = self.directory.write().await;
            let handle = directory.rooms.remove(&room_id);
            directory.release_players(room_id);
            handle
        };
        if let Some(handle) = handle {
            info!(%room_id, "retiring room");
            let _ = handle.shutdown().await;
        }
    }

    pub async fn room_info(&self, room_id: RoomId) -> Result<RoomSnapshot, RoomError> {
        Ok(self.handle(room_id).await?.snapshot())
    }

    pub async fn room_count(&self) -> usize {
        self.directory.read().await.rooms.len()
    }

    pub async fn player_room(&self, player: PlayerId) -> Option<RoomId> {
        self.directory.read().await.player_rooms.get(&player).copied()
    }

    /// Sessions whose close failed after every retry. They need manual
    /// reconciliation against the settlement network.
    pub async fn unsettled(&self) -> Vec<UnsettledSession> {
        self.directory.read().await.unsettled.clone()
    }

    /// Winds down every room and waits for each actor to exit.
    pub async fn shutdown(&self) {
        let handles: Vec<RoomHandle> = {
            let mut directory = self.directory.write().await;
            directory.player_rooms.clear();
            directory.rooms.drain().map(|(_, handle)| handle).collect()
        };
        info!(rooms = handles.len(), "shutting down rooms");

        for handle in &handles {
            if handle.shutdown().await.is_err() {
                debug!(room_id = %handle.room_id(), "room already stopped");
            }
        }
        for handle in &handles {
            handle.closed().await;
        }

        let unsettled = self.directory.read().await.unsettled.len();
        if unsettled > 0 {
            warn!(unsettled, "shutdown left sessions needing reconciliation");
        }
    }

    async fn handle(&self, room_id: RoomId) -> Result<RoomHandle, RoomError> {
        self.directory
            .read()
            .await
            .rooms
            .get(&room_id)
            .cloned()
            .ok_or(RoomError::NotFound(room_id))
    }
}
