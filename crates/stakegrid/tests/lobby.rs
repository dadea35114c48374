//! End-to-end lobby tests: requests in, events out.

use std::sync::Arc;
use std::time::Duration;

use stakegrid::prelude::*;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::timeout;

const ALICE: PlayerId = PlayerId(1);
const BOB: PlayerId = PlayerId(2);

fn stake() -> Amount {
    "0.1".parse().unwrap()
}

fn lobby() -> (Lobby<MemorySettlement>, Arc<MemorySettlement>) {
    let service = Arc::new(MemorySettlement::new());
    let config = RoomConfig {
        seed: Some(7),
        ..RoomConfig::default()
    };
    (Lobby::new(config, Arc::clone(&service)), service)
}

async fn connect(lobby: &Lobby<MemorySettlement>, player: PlayerId) -> UnboundedReceiver<ServerEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    lobby.connect(player, tx).await;
    rx
}

async fn next(rx: &mut UnboundedReceiver<ServerEvent>) -> ServerEvent {
    timeout(Duration::from_secs(600), rx.recv())
        .await
        .expect("timed out")
        .expect("channel closed")
}

async fn wait_for(
    rx: &mut UnboundedReceiver<ServerEvent>,
    mut pred: impl FnMut(&ServerEvent) -> bool,
) -> ServerEvent {
    loop {
        let event = next(rx).await;
        if pred(&event) {
            return event;
        }
    }
}

async fn create(lobby: &Lobby<MemorySettlement>, rx: &mut UnboundedReceiver<ServerEvent>) -> RoomId {
    lobby
        .handle(ALICE, ClientRequest::CreateRoom { stake: stake() })
        .await
        .unwrap();
    match next(rx).await {
        ServerEvent::RoomCreated { room } => room.room_id,
        other => panic!("expected RoomCreated, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_list_rooms_replies_to_requester() {
    let (lobby, _service) = lobby();
    let mut alice = connect(&lobby, ALICE).await;
    let mut bob = connect(&lobby, BOB).await;
    let room_id = create(&lobby, &mut alice).await;

    lobby.handle(BOB, ClientRequest::ListRooms).await.unwrap();

    match next(&mut bob).await {
        ServerEvent::RoomList { rooms } => {
            assert_eq!(rooms.len(), 1);
            assert_eq!(rooms[0].room_id, room_id);
            assert_eq!(rooms[0].stake, stake());
        }
        other => panic!("expected RoomList, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_request_sends_error_event() {
    let (lobby, _service) = lobby();
    let mut alice = connect(&lobby, ALICE).await;
    let mut bob = connect(&lobby, BOB).await;
    let room_id = create(&lobby, &mut alice).await;

    let err = lobby
        .handle(
            BOB,
            ClientRequest::JoinRoom {
                room_id,
                stake: "1".parse().unwrap(),
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::StakeMismatch);
    match next(&mut bob).await {
        ServerEvent::Error { code, message } => {
            assert_eq!(code, ErrorCode::StakeMismatch);
            assert!(message.contains("stake mismatch"));
        }
        other => panic!("expected Error, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_request_from_unknown_player_is_not_connected() {
    let (lobby, _service) = lobby();

    let err = lobby
        .handle(PlayerId(99), ClientRequest::ListRooms)
        .await
        .unwrap_err();

    assert!(matches!(err, StakegridError::NotConnected(PlayerId(99))));
}

#[tokio::test(start_paused = true)]
async fn test_handle_bytes_rejects_malformed_json() {
    let (lobby, _service) = lobby();
    let mut alice = connect(&lobby, ALICE).await;

    let err = lobby.handle_bytes(ALICE, b"{not json").await.unwrap_err();

    assert!(matches!(err, StakegridError::Protocol(_)));
    assert!(matches!(
        next(&mut alice).await,
        ServerEvent::Error {
            code: ErrorCode::BadRequest,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_handle_bytes_dispatches_decoded_request() {
    let (lobby, _service) = lobby();
    let mut alice = connect(&lobby, ALICE).await;
    let bytes = serde_json::to_vec(&ClientRequest::CreateRoom { stake: stake() }).unwrap();

    lobby.handle_bytes(ALICE, &bytes).await.unwrap();

    assert!(matches!(next(&mut alice).await, ServerEvent::RoomCreated { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_encode_produces_tagged_json() {
    let (lobby, _service) = lobby();

    let bytes = lobby.encode(&ServerEvent::RoomList { rooms: vec![] }).unwrap();

    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["type"], "RoomList");
}

#[tokio::test(start_paused = true)]
async fn test_full_match_through_lobby_settles_tie() {
    let (lobby, service) = lobby();
    let mut alice = connect(&lobby, ALICE).await;
    let mut bob = connect(&lobby, BOB).await;
    let room_id = create(&lobby, &mut alice).await;

    lobby
        .handle(BOB, ClientRequest::JoinRoom { room_id, stake: stake() })
        .await
        .unwrap();
    lobby
        .handle(ALICE, ClientRequest::StartMatch { room_id })
        .await
        .unwrap();

    for (player, role, rx) in [(BOB, Role::Guest, &mut bob), (ALICE, Role::Host, &mut alice)] {
        let event = wait_for(rx, |e| matches!(e, ServerEvent::SignatureRequested { .. })).await;
        let ServerEvent::SignatureRequested { payload, .. } = event else {
            unreachable!()
        };
        lobby
            .handle(
                player,
                ClientRequest::SubmitSignature {
                    room_id,
                    role,
                    signature: MemorySettlement::sign(player, &payload),
                },
            )
            .await
            .unwrap();
    }

    let ended = wait_for(&mut bob, |e| matches!(e, ServerEvent::MatchEnded { .. })).await;
    assert!(matches!(
        ended,
        ServerEvent::MatchEnded {
            outcome: Outcome::Tie,
            ..
        }
    ));
    let closed = wait_for(&mut alice, |e| matches!(e, ServerEvent::SessionClosed { .. })).await;
    let ServerEvent::SessionClosed { allocation, .. } = closed else {
        unreachable!()
    };
    assert_eq!(allocation.amount_for(ALICE), stake());
    assert_eq!(allocation.amount_for(BOB), stake());
    assert_eq!(service.close_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_during_play_forfeits() {
    let (lobby, _service) = lobby();
    let mut alice = connect(&lobby, ALICE).await;
    let mut bob = connect(&lobby, BOB).await;
    let room_id = create(&lobby, &mut alice).await;
    lobby
        .handle(BOB, ClientRequest::JoinRoom { room_id, stake: stake() })
        .await
        .unwrap();
    lobby
        .handle(ALICE, ClientRequest::StartMatch { room_id })
        .await
        .unwrap();
    for (player, role, rx) in [(BOB, Role::Guest, &mut bob), (ALICE, Role::Host, &mut alice)] {
        let event = wait_for(rx, |e| matches!(e, ServerEvent::SignatureRequested { .. })).await;
        let ServerEvent::SignatureRequested { payload, .. } = event else {
            unreachable!()
        };
        lobby
            .handle(
                player,
                ClientRequest::SubmitSignature {
                    room_id,
                    role,
                    signature: MemorySettlement::sign(player, &payload),
                },
            )
            .await
            .unwrap();
    }
    wait_for(&mut bob, |e| matches!(e, ServerEvent::MatchTick { .. })).await;

    lobby.disconnect(ALICE).await;

    let ended = wait_for(&mut bob, |e| matches!(e, ServerEvent::MatchEnded { .. })).await;
    assert!(matches!(
        ended,
        ServerEvent::MatchEnded {
            outcome: Outcome::Winner(Seat::Second),
            ..
        }
    ));
    assert!(!lobby.is_connected(ALICE).await);
    assert_eq!(lobby.registry().player_room(ALICE).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_forgets_players_and_rooms() {
    let (lobby, _service) = lobby();
    let mut alice = connect(&lobby, ALICE).await;
    create(&lobby, &mut alice).await;

    lobby.shutdown().await;

    assert!(!lobby.is_connected(ALICE).await);
    assert_eq!(lobby.registry().room_count().await, 0);
}
