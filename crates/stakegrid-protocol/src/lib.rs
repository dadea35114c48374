//! Wire-level vocabulary for Stakegrid.
//!
//! This crate defines everything the core and a transport have to agree
//! on, without choosing a transport:
//!
//! - **Types** ([`PlayerId`], [`RoomId`], [`Amount`], [`Heading`],
//!   [`RoomSnapshot`], [`MatchView`], …): the values that appear in
//!   requests and events.
//! - **Messages** ([`ClientRequest`], [`ServerEvent`], [`ErrorCode`]):
//!   what participants send and what the core pushes back.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how a transport may turn
//!   messages into bytes.
//!
//! ```text
//! Client Transport (bytes) → Protocol (ClientRequest) → Lobby / Rooms
//! ```

mod codec;
mod error;
mod messages;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use messages::{ClientRequest, ErrorCode, ServerEvent};
pub use types::{
    ActorView, Allocation, AllocationEntry, Amount, CanonicalRequest, Cell,
    Heading, MatchView, Outcome, PlayerId, Recipient, Role, RoomId,
    RoomSnapshot, RoomState, Seat, SessionPhase, Signature,
};
