//! Error types for the room layer.

use stakegrid_protocol::{Amount, ErrorCode, PlayerId, RoomId};
use stakegrid_settlement::SettlementError;

/// Errors that can occur during room operations.
///
/// Validation errors leave the room untouched.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The stake is not one of the configured stakes.
    #[error("stake {0} is not allowed")]
    InvalidStake(Amount),

    /// The room does not exist (or was already retired).
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// The room already has a guest.
    #[error("room {0} is full")]
    RoomFull(RoomId),

    /// The guest offered a different stake than the host.
    #[error("stake mismatch: room stake is {expected}, offered {offered}")]
    StakeMismatch { expected: Amount, offered: Amount },

    /// The player may not perform this operation.
    #[error("player {player} is not authorized for this operation in room {room_id}")]
    NotAuthorized { player: PlayerId, room_id: RoomId },

    /// The room is not in a state that allows this operation.
    #[error("room {0} is not ready for this operation")]
    NotReady(RoomId),

    /// The player is not a participant of this room.
    #[error("player {0} is not in room {1}")]
    NotInRoom(PlayerId, RoomId),

    /// The player already holds a seat in a live room.
    #[error("player {0} is already in room {1}")]
    AlreadyInRoom(PlayerId, RoomId),

    /// A settlement handshake or close step failed.
    #[error(transparent)]
    Settlement(#[from] SettlementError),

    /// The room's command channel is closed.
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),
}

impl RoomError {
    /// The wire error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidStake(_) => ErrorCode::InvalidStake,
            Self::NotFound(_) => ErrorCode::RoomNotFound,
            Self::RoomFull(_) => ErrorCode::RoomFull,
            Self::StakeMismatch { .. } => ErrorCode::StakeMismatch,
            Self::NotAuthorized { .. } => ErrorCode::NotAuthorized,
            Self::NotReady(_) => ErrorCode::RoomNotReady,
            Self::NotInRoom(..) => ErrorCode::UnknownActor,
            Self::AlreadyInRoom(..) => ErrorCode::AlreadyInRoom,
            Self::Settlement(e) => e.code(),
            Self::Unavailable(_) => ErrorCode::Unavailable,
        }
    }
}
