//! The settlement service capability.
//!
//! Stakegrid never signs, verifies, or submits anything itself. All of
//! that is done by a [`SettlementService`]: in production a client of
//! the settlement network, in development and tests
//! [`MemorySettlement`](crate::MemorySettlement).

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use stakegrid_protocol::{Allocation, Amount, CanonicalRequest, PlayerId, RoomId, Signature};

use crate::ServiceError;

/// Identifier the service assigns to an opened session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything the service needs to build an open request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenParams {
    pub room_id: RoomId,
    pub host: PlayerId,
    pub guest: PlayerId,
    /// Each participant's stake; the pot is twice this.
    pub stake: Amount,
}

/// Who produced a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Signer {
    Participant(PlayerId),
    /// The service-held identity that countersigns close requests.
    Operator,
}

/// A signature together with its signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endorsement {
    pub signer: Signer,
    pub signature: Signature,
}

/// Signing, verification, and submission of settlement sessions.
///
/// Every call may be slow or fail. The caller bounds each one with a
/// timeout and owns the "already opened / already closed" truth; the
/// service is never asked to be idempotent.
///
/// Methods return `impl Future + Send` so a room task generic over the
/// service can still be spawned onto the multi-threaded runtime.
/// Implementations may simply write `async fn`.
pub trait SettlementService: Send + Sync + 'static {
    /// Builds the canonical open request naming both participants, their
    /// weights, and the initial stake allocation.
    fn build_open_request(
        &self,
        params: &OpenParams,
    ) -> impl Future<Output = Result<CanonicalRequest, ServiceError>> + Send;

    /// Checks `signature` over `request` against `signer`'s key.
    fn verify_signature(
        &self,
        request: &CanonicalRequest,
        signer: PlayerId,
        signature: &Signature,
    ) -> impl Future<Output = Result<bool, ServiceError>> + Send;

    /// Submits a fully signed open request.
    fn open_session(
        &self,
        request: &CanonicalRequest,
        endorsements: &[Endorsement],
    ) -> impl Future<Output = Result<SessionId, ServiceError>> + Send;

    /// Builds the canonical close request for `allocation`.
    fn build_close_request(
        &self,
        session_id: &SessionId,
        allocation: &Allocation,
    ) -> impl Future<Output = Result<CanonicalRequest, ServiceError>> + Send;

    /// Countersigns `request` with the operator key.
    fn sign_as_operator(
        &self,
        request: &CanonicalRequest,
    ) -> impl Future<Output = Result<Signature, ServiceError>> + Send;

    /// Submits a signed close request.
    fn close_session(
        &self,
        session_id: &SessionId,
        request: &CanonicalRequest,
        endorsements: &[Endorsement],
    ) -> impl Future<Output = Result<(), ServiceError>> + Send;
}
