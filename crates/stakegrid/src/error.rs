//! Unified error type for Stakegrid.

use stakegrid_protocol::{ErrorCode, PlayerId, ProtocolError};
use stakegrid_room::RoomError;
use stakegrid_settlement::SettlementError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `stakegrid` crate, you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant lets `?` convert sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum StakegridError {
    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A settlement handshake or close error.
    #[error(transparent)]
    Settlement(#[from] SettlementError),

    /// A room-level error (full, not found, not ready, ...).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The player has no open connection with the lobby.
    #[error("player {0} is not connected")]
    NotConnected(PlayerId),
}

impl StakegridError {
    /// The wire error code sent with [`ServerEvent::Error`].
    ///
    /// [`ServerEvent::Error`]: stakegrid_protocol::ServerEvent::Error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Protocol(_) | Self::NotConnected(_) => ErrorCode::BadRequest,
            Self::Settlement(e) => e.code(),
            Self::Room(e) => e.code(),
        }
    }
}
