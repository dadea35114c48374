//! Room lifecycle for Stakegrid.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns one
//! wagered match from the moment a host opens it until it is retired:
//! matchmaking, the settlement handshake, the countdown, the ticking
//! simulation, and the final close.
//!
//! # Key types
//!
//! - [`RoomRegistry`]: creates rooms, routes requests, keeps each player
//!   in at most one live room
//! - [`RoomHandle`]: sends commands to a running room actor
//! - [`RoomConfig`]: stakes, countdown, and the match/tick/settlement
//!   settings every room uses
//!
//! ```text
//! waiting ─join─▶ ready ─session open + countdown─▶ playing ─result/forfeit─▶ closing ─▶ finished
//!    │              │                                                                   ▲
//!    └─leave────────┴─signature timeout / open failure / leave before open──────────────┘
//! ```

mod config;
mod error;
mod registry;
mod room;
mod scheduler;

pub use config::{DEFAULT_STAKES, RoomConfig};
pub use error::RoomError;
pub use registry::RoomRegistry;
pub use room::{PlayerSender, RoomHandle};
