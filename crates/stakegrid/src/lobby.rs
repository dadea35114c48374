//! The lobby: connected players and request dispatch.
//!
//! A transport owns the sockets. For each participant it calls
//! [`Lobby::connect`] with the channel that participant's events should
//! go to, feeds every decoded [`ClientRequest`] to [`Lobby::handle`], and
//! calls [`Lobby::disconnect`] when the connection drops.

use std::collections::HashMap;
use std::sync::Arc;

use stakegrid_protocol::{ClientRequest, Codec, JsonCodec, PlayerId, ServerEvent};
use stakegrid_room::{PlayerSender, RoomConfig, RoomRegistry};
use stakegrid_settlement::SettlementService;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::StakegridError;

/// Routes requests from connected players to the room registry.
pub struct Lobby<S: SettlementService, C: Codec = JsonCodec> {
    registry: RoomRegistry<S>,
    players: RwLock<HashMap<PlayerId, PlayerSender>>,
    codec: C,
}

impl<S: SettlementService> Lobby<S, JsonCodec> {
    /// Creates a lobby that decodes requests as JSON.
    pub fn new(config: RoomConfig, service: Arc<S>) -> Self {
        Self::with_codec(config, service, JsonCodec)
    }
}

impl<S: SettlementService, C: Codec> Lobby<S, C> {
    pub fn with_codec(config: RoomConfig, service: Arc<S>, codec: C) -> Self {
        Self {
            registry: RoomRegistry::new(config, service),
            players: RwLock::new(HashMap::new()),
            codec,
        }
    }

    pub fn registry(&self) -> &RoomRegistry<S> {
        &self.registry
    }

    /// Registers `player`'s event channel. A second connect replaces the
    /// channel for new requests; rooms keep the one they were joined with.
    pub async fn connect(&self, player: PlayerId, sender: PlayerSender) {
        let replaced = self.players.write().await.insert(player, sender).is_some();
        info!(%player, replaced, "player connected");
    }

    /// Drops `player`'s channel and leaves any room they are in, which
    /// forfeits a running match.
    pub async fn disconnect(&self, player: PlayerId) {
        self.players.write().await.remove(&player);
        let left = self.registry.leave_current(player).await;
        info!(%player, room_id = ?left, "player disconnected");
    }

    pub async fn is_connected(&self, player: PlayerId) -> bool {
        self.players.read().await.contains_key(&player)
    }

    /// Handles one request. On failure the player also receives an
    /// [`ServerEvent::Error`] with the error's code.
    pub async fn handle(
        &self,
        player: PlayerId,
        request: ClientRequest,
    ) -> Result<(), StakegridError> {
        let sender = self.sender(player).await?;
        let result = self.dispatch(player, &sender, request).await;
        if let Err(e) = &result {
            debug!(%player, error = %e, "request failed");
            let _ = sender.send(error_event(e));
        }
        result
    }

    /// Decodes `data` with the lobby's codec, then [`handle`](Self::handle)s it.
    pub async fn handle_bytes(&self, player: PlayerId, data: &[u8]) -> Result<(), StakegridError> {
        let request = match self.codec.decode::<ClientRequest>(data) {
            Ok(request) => request,
            Err(e) => {
                let err = StakegridError::from(e);
                if let Ok(sender) = self.sender(player).await {
                    let _ = sender.send(error_event(&err));
                }
                return Err(err);
            }
        };
        self.handle(player, request).await
    }

    /// Encodes an event with the lobby's codec, for transports.
    pub fn encode(&self, event: &ServerEvent) -> Result<Vec<u8>, StakegridError> {
        Ok(self.codec.encode(event)?)
    }

    /// Winds down every room and forgets every player.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
        self.players.write().await.clear();
    }

    async fn dispatch(
        &self,
        player: PlayerId,
        sender: &PlayerSender,
        request: ClientRequest,
    ) -> Result<(), StakegridError> {
        match request {
            ClientRequest::CreateRoom { stake } => {
                self.registry
                    .create_room(player, stake, sender.clone())
                    .await?;
            }
            ClientRequest::JoinRoom { room_id, stake } => {
                self.registry
                    .join_room(room_id, player, stake, sender.clone())
                    .await?;
            }
            ClientRequest::ListRooms => {
                let rooms = self.registry.list_available().await;
                let _ = sender.send(ServerEvent::RoomList { rooms });
            }
            ClientRequest::StartMatch { room_id } => {
                self.registry.start_match(room_id, player).await?;
            }
            ClientRequest::Direction { room_id, heading } => {
                self.registry
                    .queue_direction(room_id, player, heading)
                    .await?;
            }
            ClientRequest::SubmitSignature {
                room_id,
                role,
                signature,
            } => {
                self.registry
                    .submit_signature(room_id, player, role, signature)
                    .await?;
            }
            ClientRequest::LeaveRoom { room_id } => {
                self.registry.leave(room_id, player).await?;
            }
        }
        Ok(())
    }

    async fn sender(&self, player: PlayerId) -> Result<PlayerSender, StakegridError> {
        self.players
            .read()
            .await
            .get(&player)
            .cloned()
            .ok_or(StakegridError::NotConnected(player))
    }
}

fn error_event(error: &StakegridError) -> ServerEvent {
    ServerEvent::Error {
        code: error.code(),
        message: error.to_string(),
    }
}
