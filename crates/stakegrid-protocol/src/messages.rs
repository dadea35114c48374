//! Requests participants send and events the core pushes back.
//!
//! Both enums are internally tagged (`#[serde(tag = "type")]`), so a
//! request looks like `{ "type": "JoinRoom", "room_id": 3, "stake": 100000 }`
//! on a JSON transport.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    Allocation, Amount, CanonicalRequest, Heading, MatchView, Outcome, Role,
    RoomId, RoomSnapshot, Signature,
};

/// A request from a participant. The sender's identity comes from the
/// transport, never from the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientRequest {
    /// Open a new room as host with the given stake.
    CreateRoom { stake: Amount },

    /// Take the guest seat of a waiting room. `stake` must equal the host's.
    JoinRoom { room_id: RoomId, stake: Amount },

    /// List rooms still waiting for a guest.
    ListRooms,

    /// Host only: begin the settlement handshake.
    StartMatch { room_id: RoomId },

    /// Queue the sender's next heading.
    Direction { room_id: RoomId, heading: Heading },

    /// Signature over the payload from the last `SignatureRequested`.
    SubmitSignature {
        room_id: RoomId,
        role: Role,
        signature: Signature,
    },

    /// Leave (or forfeit) the room.
    LeaveRoom { room_id: RoomId },
}

/// An event pushed to a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Sent to the host after a successful create.
    RoomCreated { room: RoomSnapshot },

    /// Sent to both participants when the guest seat is filled.
    RoomReady { room: RoomSnapshot },

    /// Any other lifecycle change.
    RoomUpdated { room: RoomSnapshot },

    /// Reply to `ListRooms`.
    RoomList { rooms: Vec<RoomSnapshot> },

    /// Asks one participant to sign `payload` as `role`.
    SignatureRequested {
        room_id: RoomId,
        role: Role,
        payload: CanonicalRequest,
    },

    /// The settlement session is open; the clock starts after `countdown_ms`.
    MatchStarted {
        room_id: RoomId,
        session_id: String,
        countdown_ms: u64,
    },

    /// State after one simulation tick.
    MatchTick { room_id: RoomId, state: MatchView },

    /// Final result. `scores` is indexed host first.
    MatchEnded {
        room_id: RoomId,
        outcome: Outcome,
        scores: [u32; 2],
    },

    /// The session closed with this allocation.
    SessionClosed {
        room_id: RoomId,
        allocation: Allocation,
    },

    /// Something went wrong.
    Error { code: ErrorCode, message: String },
}

/// Machine-readable error kinds carried by [`ServerEvent::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    InvalidStake,
    RoomNotFound,
    RoomFull,
    StakeMismatch,
    NotAuthorized,
    RoomNotReady,
    SignatureInvalid,
    SignatureTimeout,
    SessionOpenFailed,
    SessionCloseFailed,
    UnknownActor,
    AlreadyInRoom,
    UnexpectedSignature,
    Unavailable,
    BadRequest,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PlayerId, RoomState, SessionPhase};

    #[test]
    fn test_client_request_is_internally_tagged() {
        let req = ClientRequest::JoinRoom {
            room_id: RoomId(3),
            stake: Amount::from_micros(100_000),
        };
        let json: serde_json::Value = serde_json::to_value(&req).unwrap();

        assert_eq!(json["type"], "JoinRoom");
        assert_eq!(json["room_id"], 3);
        assert_eq!(json["stake"], 100_000);
    }

    #[test]
    fn test_submit_signature_json_shape() {
        let req = ClientRequest::SubmitSignature {
            room_id: RoomId(1),
            role: Role::Guest,
            signature: Signature::new("ab12"),
        };
        let json: serde_json::Value = serde_json::to_value(&req).unwrap();

        assert_eq!(json["type"], "SubmitSignature");
        assert_eq!(json["role"], "Guest");
        assert_eq!(json["signature"], "ab12");
    }

    #[test]
    fn test_room_ready_carries_snapshot() {
        let event = ServerEvent::RoomReady {
            room: RoomSnapshot {
                room_id: RoomId(5),
                host: PlayerId(1),
                guest: Some(PlayerId(2)),
                stake: Amount::from_micros(100_000),
                state: RoomState::Ready,
                session: SessionPhase::None,
                created_at_ms: 1_700_000_000_000,
            },
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "RoomReady");
        assert_eq!(json["room"]["guest"], 2);
        assert_eq!(json["room"]["state"], "Ready");
    }

    #[test]
    fn test_match_ended_outcome_shape() {
        let event = ServerEvent::MatchEnded {
            room_id: RoomId(1),
            outcome: Outcome::Winner(crate::Seat::Second),
            scores: [2, 4],
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();

        assert_eq!(json["outcome"]["Winner"], "Second");
        assert_eq!(json["scores"][1], 4);
    }

    #[test]
    fn test_error_code_display_matches_wire_name() {
        assert_eq!(ErrorCode::SignatureTimeout.to_string(), "SignatureTimeout");
    }
}
