//! # Stakegrid
//!
//! Wagered two-player snake matches on a toroidal grid, with each match's
//! stake held in an off-chain settlement session.
//!
//! Two participants commit the same stake, open a settlement session with
//! both their signatures, and play a server-authoritative match. When it
//! ends the session is closed with an allocation derived from the result:
//! the winner takes the pot, a tie returns each stake.
//!
//! The crate ties the layers together behind a [`Lobby`]:
//! protocol → lobby → room registry → room actor (simulation, tick clock,
//! settlement coordinator).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stakegrid::prelude::*;
//!
//! # async fn run() -> Result<(), StakegridError> {
//! let lobby = Lobby::new(RoomConfig::default(), Arc::new(MemorySettlement::new()));
//! let (tx, mut events) = tokio::sync::mpsc::unbounded_channel();
//! lobby.connect(PlayerId(1), tx).await;
//! lobby
//!     .handle(PlayerId(1), ClientRequest::CreateRoom { stake: "0.1".parse()? })
//!     .await?;
//! let created = events.recv().await;
//! # Ok(())
//! # }
//! ```

mod error;
mod lobby;

pub use error::StakegridError;
pub use lobby::Lobby;

pub use stakegrid_protocol as protocol;
pub use stakegrid_room as room;
pub use stakegrid_settlement as settlement;
pub use stakegrid_sim as sim;
pub use stakegrid_tick as tick;

pub mod prelude {
    pub use crate::{Lobby, StakegridError};
    pub use stakegrid_protocol::{
        Allocation, Amount, ClientRequest, ErrorCode, Heading, Outcome, PlayerId, Role, RoomId, Seat,
        RoomSnapshot, RoomState, ServerEvent, SessionPhase, Signature,
    };
    pub use stakegrid_room::{PlayerSender, RoomConfig};
    pub use stakegrid_settlement::{MemorySettlement, SettlementConfig, SettlementService};
    pub use stakegrid_sim::MatchConfig;
    pub use stakegrid_tick::TickConfig;
}
