//! Error types for the settlement layer.

use std::time::Duration;

use stakegrid_protocol::{ErrorCode, Role, SessionPhase};

/// A failure reported by (or while talking to) the settlement service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// The service understood the call and refused it.
    #[error("settlement service rejected the call: {0}")]
    Rejected(String),

    /// The service could not be reached or failed internally.
    #[error("settlement service unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete within the configured bound.
    #[error("settlement call {operation} timed out after {after:?}")]
    TimedOut {
        operation: &'static str,
        after: Duration,
    },
}

/// Errors produced while driving a settlement session.
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    /// The signature does not verify against the pending request.
    #[error("{0} signature does not verify against the pending request")]
    SignatureInvalid(Role),

    /// The requested signature did not arrive in time.
    #[error("{0} signature not received in time")]
    SignatureTimeout(Role),

    /// A signature arrived from the wrong role or out of order.
    #[error("unexpected {got} signature (expected {expected:?})")]
    UnexpectedSignature { expected: Option<Role>, got: Role },

    /// The operation is not allowed in the session's current phase.
    #[error("operation not allowed while session is {0}")]
    WrongPhase(SessionPhase),

    /// The service refused to open the session; the room will not play.
    #[error("session open failed: {0}")]
    SessionOpenFailed(#[source] ServiceError),

    /// Every close attempt failed; the session needs reconciliation.
    #[error("session close failed after {attempts} attempts: {last}")]
    SessionCloseFailed {
        attempts: u32,
        #[source]
        last: ServiceError,
    },

    /// No valid allocation exists for the given outcome.
    #[error("invalid allocation: {0}")]
    InvalidAllocation(String),

    /// Any other service failure. The session phase is unchanged.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl SettlementError {
    /// The wire error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::SignatureInvalid(_) => ErrorCode::SignatureInvalid,
            Self::SignatureTimeout(_) => ErrorCode::SignatureTimeout,
            Self::UnexpectedSignature { .. } => ErrorCode::UnexpectedSignature,
            Self::WrongPhase(_) => ErrorCode::RoomNotReady,
            Self::SessionOpenFailed(_) => ErrorCode::SessionOpenFailed,
            Self::SessionCloseFailed { .. } | Self::InvalidAllocation(_) => {
                ErrorCode::SessionCloseFailed
            }
            Self::Service(_) => ErrorCode::Unavailable,
        }
    }
}
