//! Room actor: an isolated Tokio task that owns one wagered match.
//!
//! The actor owns the room's lifecycle state, its settlement
//! [`Coordinator`], and, once the session is open, the [`MatchRunner`].
//! Everything that touches them runs inside this task, so a room's
//! commands, ticks, and deadlines are handled strictly one at a time.
//!
//! The run loop selects over five sources:
//!
//! ```text
//! commands ─┐
//! tick ─────┤
//! signature deadline ─┼─▶ handle one, publish snapshot, repeat
//! countdown deadline ─┤
//! retire deadline ───┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use stakegrid_protocol::{
    Allocation, Amount, Heading, Outcome, PlayerId, Recipient, Role, RoomId, RoomSnapshot,
    RoomState, ServerEvent, SessionPhase, Signature,
};
use stakegrid_settlement::{
    Coordinator, OpenParams, SettlementError, SettlementService, SignatureStep, allocate,
};
use stakegrid_tick::TickInfo;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{RwLock, mpsc, oneshot, watch};
use tokio::time::{self, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::registry::Directory;
use crate::scheduler::{self, MatchRunner};
use crate::{RoomConfig, RoomError};

/// Channel for delivering events to one participant.
pub type PlayerSender = mpsc::UnboundedSender<ServerEvent>;

type Reply<T> = oneshot::Sender<Result<T, RoomError>>;

/// Commands sent to a room actor through its channel.
pub(crate) enum RoomCommand {
    Join {
        guest: PlayerId,
        stake: Amount,
        sender: PlayerSender,
        reply: Reply<RoomSnapshot>,
    },
    Start {
        player: PlayerId,
        reply: Reply<()>,
    },
    Signature {
        player: PlayerId,
        role: Role,
        signature: Signature,
        reply: Reply<()>,
    },
    /// Fire-and-forget; the registry has already checked membership.
    Direction { player: PlayerId, heading: Heading },
    Leave {
        player: PlayerId,
        reply: Reply<()>,
    },
    Shutdown,
}

/// Handle to a running room actor.
///
/// Cheap to clone. The latest [`RoomSnapshot`] is readable without a
/// round trip to the actor, so listing rooms never waits on a busy room.
#[derive(Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    sender: mpsc::Sender<RoomCommand>,
    snapshot: watch::Receiver<RoomSnapshot>,
}

impl RoomHandle {
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// The room as of its last state change.
    pub fn snapshot(&self) -> RoomSnapshot {
        self.snapshot.borrow().clone()
    }

    pub async fn join(
        &self,
        guest: PlayerId,
        stake: Amount,
        sender: PlayerSender,
    ) -> Result<RoomSnapshot, RoomError> {
        self.request(|reply| RoomCommand::Join {
            guest,
            stake,
            sender,
            reply,
        })
        .await
    }

    pub async fn start(&self, player: PlayerId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Start { player, reply }).await
    }

    pub async fn submit_signature(
        &self,
        player: PlayerId,
        role: Role,
        signature: Signature,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Signature {
            player,
            role,
            signature,
            reply,
        })
        .await
    }

    /// Queues a heading without waiting. When the room's channel is full
    /// the input is dropped; the next tick only uses the latest heading.
    pub fn direction(&self, player: PlayerId, heading: Heading) -> Result<(), RoomError> {
        match self.sender.try_send(RoomCommand::Direction { player, heading }) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                trace!(room_id = %self.room_id, %player, "room busy, direction dropped");
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(RoomError::Unavailable(self.room_id)),
        }
    }

    pub async fn leave(&self, player: PlayerId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Leave { player, reply }).await
    }

    /// Tells the room to wind down. Does not wait for it.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Shutdown)
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))
    }

    /// Resolves once the actor task has exited.
    pub async fn closed(&self) {
        self.sender.closed().await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))?
    }
}

/// Pending timers. Each is a `sleep_until` branch in the run loop.
#[derive(Default)]
struct Deadlines {
    signature: Option<Instant>,
    countdown: Option<Instant>,
    retire: Option<Instant>,
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor<S: SettlementService> {
    room_id: RoomId,
    host: PlayerId,
    guest: Option<PlayerId>,
    stake: Amount,
    created_at_ms: u64,
    state: RoomState,
    config: Arc<RoomConfig>,
    service: Arc<S>,
    senders: HashMap<PlayerId, PlayerSender>,
    coordinator: Option<Coordinator<S>>,
    runner: Option<MatchRunner>,
    deadlines: Deadlines,
    retiring: bool,
    receiver: mpsc::Receiver<RoomCommand>,
    snapshot: watch::Sender<RoomSnapshot>,
    directory: Arc<RwLock<Directory>>,
}

impl<S: SettlementService> RoomActor<S> {
    async fn run(mut self) {
        info!(room_id = %self.room_id, host = %self.host, stake = %self.stake, "room opened");

        while !self.retiring {
            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle(cmd).await,
                    None => {
                        debug!(room_id = %self.room_id, "all handles dropped");
                        self.shutdown().await;
                    }
                },
                info = scheduler::next_tick(self.runner.as_mut()) => self.on_tick(info).await,
                () = deadline(self.deadlines.signature) => self.on_signature_timeout().await,
                () = deadline(self.deadlines.countdown) => self.on_countdown_end(),
                () = deadline(self.deadlines.retire) => self.retiring = true,
            }
        }

        self.retire().await;
    }

    async fn handle(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join {
                guest,
                stake,
                sender,
                reply,
            } => {
                let result = self.handle_join(guest, stake, sender);
                let _ = reply.send(result);
            }
            RoomCommand::Start { player, reply } => {
                let result = self.handle_start(player).await;
                let _ = reply.send(result);
            }
            RoomCommand::Signature {
                player,
                role,
                signature,
                reply,
            } => {
                let result = self.handle_signature(player, role, signature).await;
                let _ = reply.send(result);
            }
            RoomCommand::Direction { player, heading } => self.handle_direction(player, heading),
            RoomCommand::Leave { player, reply } => {
                let result = self.handle_leave(player).await;
                let _ = reply.send(result);
            }
            RoomCommand::Shutdown => self.shutdown().await,
        }
    }

    // -----------------------------------------------------------------------
    // Matchmaking
    // -----------------------------------------------------------------------

    fn handle_join(
        &mut self,
        guest: PlayerId,
        stake: Amount,
        sender: PlayerSender,
    ) -> Result<RoomSnapshot, RoomError> {
        if guest == self.host {
            return Err(RoomError::AlreadyInRoom(guest, self.room_id));
        }
        if self.guest.is_some() || !self.state.is_joinable() {
            return Err(RoomError::RoomFull(self.room_id));
        }
        if stake != self.stake {
            return Err(RoomError::StakeMismatch {
                expected: self.stake,
                offered: stake,
            });
        }

        self.guest = Some(guest);
        self.senders.insert(guest, sender);
        info!(room_id = %self.room_id, %guest, "guest joined");
        self.transition(RoomState::Ready);

        let room = self.snapshot_now();
        self.dispatch(Recipient::All, ServerEvent::RoomReady { room: room.clone() });
        Ok(room)
    }

    // -----------------------------------------------------------------------
    // Settlement handshake
    // -----------------------------------------------------------------------

    async fn handle_start(&mut self, player: PlayerId) -> Result<(), RoomError> {
        if player != self.host {
            return Err(RoomError::NotAuthorized {
                player,
                room_id: self.room_id,
            });
        }
        let guest = match self.guest {
            Some(guest) if self.state == RoomState::Ready && self.coordinator.is_none() => guest,
            _ => return Err(RoomError::NotReady(self.room_id)),
        };

        let mut coordinator = Coordinator::new(
            Arc::clone(&self.service),
            self.config.settlement,
            OpenParams {
                room_id: self.room_id,
                host: self.host,
                guest,
                stake: self.stake,
            },
        );
        // A failed start leaves no coordinator behind, so the host may retry.
        let payload = coordinator.start().await?;
        self.coordinator = Some(coordinator);

        self.arm_signature_deadline();
        self.publish();
        self.dispatch(
            Recipient::Player(guest),
            ServerEvent::SignatureRequested {
                room_id: self.room_id,
                role: Role::Guest,
                payload,
            },
        );
        self.broadcast_update();
        Ok(())
    }

    async fn handle_signature(
        &mut self,
        player: PlayerId,
        role: Role,
        signature: Signature,
    ) -> Result<(), RoomError> {
        if self.role_of(player) != Some(role) {
            return Err(RoomError::NotAuthorized {
                player,
                room_id: self.room_id,
            });
        }
        let coordinator = self
            .coordinator
            .as_mut()
            .ok_or(RoomError::NotReady(self.room_id))?;

        match coordinator.submit_signature(role, signature).await {
            Ok(SignatureStep::AwaitHost(payload)) => {
                self.arm_signature_deadline();
                self.publish();
                self.dispatch(
                    Recipient::Player(self.host),
                    ServerEvent::SignatureRequested {
                        room_id: self.room_id,
                        role: Role::Host,
                        payload,
                    },
                );
                self.broadcast_update();
                Ok(())
            }
            Ok(SignatureStep::Opened(session_id)) => {
                self.on_session_open(session_id.to_string());
                Ok(())
            }
            Err(e @ SettlementError::SessionOpenFailed(_)) => {
                // The signature itself was accepted; the failure belongs
                // to the room and is reported to both participants.
                self.deadlines.signature = None;
                self.report(&e);
                self.finish(Duration::ZERO).await;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn on_session_open(&mut self, session_id: String) {
        self.deadlines.signature = None;
        self.deadlines.countdown = Some(Instant::now() + self.config.countdown);
        self.runner = Some(MatchRunner::new(
            self.config.game,
            self.config.tick,
            self.match_seed(),
        ));
        self.publish();
        self.dispatch(
            Recipient::All,
            ServerEvent::MatchStarted {
                room_id: self.room_id,
                session_id,
                countdown_ms: self.config.countdown.as_millis() as u64,
            },
        );
    }

    async fn on_signature_timeout(&mut self) {
        self.deadlines.signature = None;
        let Some(error) = self.coordinator.as_mut().and_then(|c| c.expire()) else {
            return;
        };
        self.report(&error);
        self.finish(Duration::ZERO).await;
    }

    fn arm_signature_deadline(&mut self) {
        self.deadlines.signature =
            Some(Instant::now() + self.config.settlement.signature_timeout);
    }

    // -----------------------------------------------------------------------
    // Match
    // -----------------------------------------------------------------------

    fn on_countdown_end(&mut self) {
        self.deadlines.countdown = None;
        let Some(runner) = self.runner.as_mut() else {
            return;
        };
        runner.start();
        self.transition(RoomState::Playing);
        self.broadcast_update();
    }

    fn handle_direction(&mut self, player: PlayerId, heading: Heading) {
        let Some(role) = self.role_of(player) else {
            return;
        };
        match (self.state, self.runner.as_mut()) {
            (RoomState::Playing, Some(runner)) => runner.queue(role.seat(), heading),
            _ => trace!(room_id = %self.room_id, %player, "direction ignored outside play"),
        }
    }

    async fn on_tick(&mut self, info: TickInfo) {
        let Some(runner) = self.runner.as_mut() else {
            return;
        };
        let outcome = runner.step();
        let state = runner.view();
        let scores = runner.scores();
        trace!(room_id = %self.room_id, tick = info.tick, skipped = info.skipped, "tick");

        self.dispatch(
            Recipient::All,
            ServerEvent::MatchTick {
                room_id: self.room_id,
                state,
            },
        );
        if outcome.is_terminal() {
            self.conclude(outcome, scores).await;
        }
    }

    /// Termination path shared by a decided tick, a disconnect during
    /// play, and a disconnect during the countdown.
    async fn conclude(&mut self, outcome: Outcome, scores: [u32; 2]) {
        self.deadlines.countdown = None;
        if let Some(runner) = &self.runner {
            let stats = runner.stats();
            debug!(
                room_id = %self.room_id,
                ticks = stats.total_ticks,
                overruns = stats.total_overruns,
                max_tick_us = stats.max_tick_time.as_micros() as u64,
                "match clock stopped"
            );
        }
        self.transition(RoomState::Closing);
        self.broadcast_update();
        info!(room_id = %self.room_id, ?outcome, ?scores, "match ended");
        self.dispatch(
            Recipient::All,
            ServerEvent::MatchEnded {
                room_id: self.room_id,
                outcome,
                scores,
            },
        );

        self.settle(outcome).await;
        self.finish(self.config.result_grace).await;
    }

    /// Closes the session with the allocation for `outcome`. A no-op
    /// unless the session is active.
    async fn settle(&mut self, outcome: Outcome) {
        let Some(coordinator) = self.coordinator.as_mut() else {
            return;
        };
        let params = *coordinator.params();
        let result = match allocate(outcome, params.host, params.guest, params.stake) {
            Ok(allocation) => coordinator.close(allocation).await,
            Err(e) => Err(e),
        };
        self.publish();

        match result {
            Ok(Some(allocation)) => self.announce_close(allocation),
            Ok(None) => {}
            Err(e) => self.report(&e),
        }
    }

    fn announce_close(&self, allocation: Allocation) {
        self.dispatch(
            Recipient::All,
            ServerEvent::SessionClosed {
                room_id: self.room_id,
                allocation,
            },
        );
    }

    // -----------------------------------------------------------------------
    // Departure and teardown
    // -----------------------------------------------------------------------

    async fn handle_leave(&mut self, player: PlayerId) -> Result<(), RoomError> {
        let role = self
            .role_of(player)
            .ok_or(RoomError::NotInRoom(player, self.room_id))?;
        if self.senders.remove(&player).is_none() {
            // Already left; the room has moved on without them.
            return Ok(());
        }
        info!(room_id = %self.room_id, %player, %role, state = %self.state, "participant left");

        match self.state {
            RoomState::Waiting => self.finish(Duration::ZERO).await,
            RoomState::Ready if self.phase() == SessionPhase::Active => {
                // Opened but never played: the one who stayed takes the pot.
                self.runner = None;
                self.conclude(Outcome::Winner(role.seat().other()), [0, 0])
                    .await;
            }
            RoomState::Ready => {
                self.deadlines.signature = None;
                if let Some(coordinator) = self.coordinator.as_mut() {
                    coordinator.abort();
                }
                self.finish(Duration::ZERO).await;
            }
            RoomState::Playing => {
                if let Some(runner) = self.runner.as_mut() {
                    let outcome = runner.forfeit(role.seat());
                    let scores = runner.scores();
                    self.conclude(outcome, scores).await;
                }
            }
            RoomState::Closing | RoomState::Finished => {}
        }
        Ok(())
    }

    /// Winds the room down at retirement or process teardown.
    ///
    /// A pending handshake is aborted. An open session whose match never
    /// produced a result is closed with each stake returned.
    async fn shutdown(&mut self) {
        if self.state == RoomState::Finished {
            self.retiring = true;
            return;
        }
        info!(room_id = %self.room_id, state = %self.state, "room shutting down");
        self.deadlines = Deadlines::default();
        if let Some(coordinator) = self.coordinator.as_mut() {
            coordinator.abort();
        }
        if self.phase() == SessionPhase::Active {
            self.transition(RoomState::Closing);
            self.broadcast_update();
            self.settle(Outcome::Tie).await;
        }
        self.finish(Duration::ZERO).await;
    }

    /// Moves to `finished`, frees both participants to join other rooms,
    /// and schedules retirement after `grace`.
    async fn finish(&mut self, grace: Duration) {
        self.transition(RoomState::Finished);
        self.directory.write().await.release_players(self.room_id);
        self.broadcast_update();

        if grace.is_zero() {
            self.retiring = true;
        } else {
            self.deadlines.retire = Some(Instant::now() + grace);
        }
    }

    async fn retire(&mut self) {
        let unsettled = self.coordinator.as_ref().and_then(|c| c.unsettled());
        if unsettled.is_some() {
            warn!(room_id = %self.room_id, "retiring with an unsettled session");
        }
        self.directory.write().await.remove_room(self.room_id, unsettled);
        info!(room_id = %self.room_id, "room retired");
    }

    // -----------------------------------------------------------------------
    // State and dispatch
    // -----------------------------------------------------------------------

    fn transition(&mut self, target: RoomState) {
        if !self.state.can_advance_to(target) {
            if self.state != target {
                error!(room_id = %self.room_id, from = %self.state, to = %target, "refused backward transition");
            }
            return;
        }
        debug!(room_id = %self.room_id, from = %self.state, to = %target, "room state changed");
        self.state = target;
        self.publish();
    }

    fn phase(&self) -> SessionPhase {
        self.coordinator
            .as_ref()
            .map(|c| c.phase())
            .unwrap_or_default()
    }

    fn role_of(&self, player: PlayerId) -> Option<Role> {
        if player == self.host {
            Some(Role::Host)
        } else if Some(player) == self.guest {
            Some(Role::Guest)
        } else {
            None
        }
    }

    fn match_seed(&self) -> Option<u64> {
        self.config.seed.map(|seed| seed.wrapping_add(self.room_id.0))
    }

    fn snapshot_now(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.room_id,
            host: self.host,
            guest: self.guest,
            stake: self.stake,
            state: self.state,
            session: self.phase(),
            created_at_ms: self.created_at_ms,
        }
    }

    fn publish(&self) {
        self.snapshot.send_replace(self.snapshot_now());
    }

    fn broadcast_update(&self) {
        self.dispatch(
            Recipient::All,
            ServerEvent::RoomUpdated {
                room: self.snapshot_now(),
            },
        );
    }

    fn report(&self, error: &SettlementError) {
        self.dispatch(
            Recipient::All,
            ServerEvent::Error {
                code: error.code(),
                message: error.to_string(),
            },
        );
    }

    /// Delivers an event. Participants whose receiver is gone are skipped.
    fn dispatch(&self, recipient: Recipient, event: ServerEvent) {
        match recipient {
            Recipient::All => {
                for sender in self.senders.values() {
                    let _ = sender.send(event.clone());
                }
            }
            Recipient::Player(player) => {
                if let Some(sender) = self.senders.get(&player) {
                    let _ = sender.send(event);
                }
            }
        }
    }
}

async fn deadline(at: Option<Instant>) {
    match at {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Spawns a room in `waiting` with `host` seated, sends the host
/// `room-created`, and returns a handle to it.
pub(crate) fn spawn_room<S: SettlementService>(
    room_id: RoomId,
    host: PlayerId,
    stake: Amount,
    sender: PlayerSender,
    config: Arc<RoomConfig>,
    service: Arc<S>,
    directory: Arc<RwLock<Directory>>,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(config.channel_size);
    let initial = RoomSnapshot {
        room_id,
        host,
        guest: None,
        stake,
        state: RoomState::Waiting,
        session: SessionPhase::None,
        created_at_ms: unix_millis(),
    };
    let (snapshot_tx, snapshot_rx) = watch::channel(initial.clone());

    let _ = sender.send(ServerEvent::RoomCreated {
        room: initial.clone(),
    });
    let mut senders = HashMap::new();
    senders.insert(host, sender);

    let actor = RoomActor {
        room_id,
        host,
        guest: None,
        stake,
        created_at_ms: initial.created_at_ms,
        state: RoomState::Waiting,
        config,
        service,
        senders,
        coordinator: None,
        runner: None,
        deadlines: Deadlines::default(),
        retiring: false,
        receiver: rx,
        snapshot: snapshot_tx,
        directory,
    };

    tokio::spawn(actor.run());

    RoomHandle {
        room_id,
        sender: tx,
        snapshot: snapshot_rx,
    }
}
