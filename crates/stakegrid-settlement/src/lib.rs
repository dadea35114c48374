//! Settlement sessions for Stakegrid rooms.
//!
//! A room's stake is held in an off-chain value-transfer session that both
//! participants open with their signatures and the operator closes with a
//! final allocation. This crate owns the rules around that session; the
//! signing and the settlement network live behind [`SettlementService`].
//!
//! - [`SettlementSession`] is the pure phase machine: which signature is
//!   due next, at-most-once activation and close.
//! - [`Coordinator`] drives one session against a service, with call
//!   timeouts and close retries.
//! - [`allocate`] turns a match outcome into a split of the pot.
//! - [`MemorySettlement`] is an in-process service for development and
//!   tests.
//!
//! ```text
//! None ─start─▶ AwaitingGuestSignature ─guest─▶ AwaitingHostSignature ─host─▶ Active
//!   │                   │                              │                       │
//!   └───────abort───────┴────────────abort─────────────┘                    close
//!                         ▼                                                    ▼
//!                      Aborted                        Closed ◀── AwaitingCloseSignatures
//! ```

mod allocation;
mod config;
mod coordinator;
mod error;
mod memory;
mod service;
mod session;

pub use allocation::{allocate, forfeit, pot};
pub use config::SettlementConfig;
pub use coordinator::{Coordinator, SignatureStep, UnsettledSession};
pub use error::{ServiceError, SettlementError};
pub use memory::{MemorySettlement, SettlementFaults};
pub use service::{Endorsement, OpenParams, SessionId, SettlementService, Signer};
pub use session::SettlementSession;
