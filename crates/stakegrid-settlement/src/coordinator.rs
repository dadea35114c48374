//! Drives one room's settlement session against a [`SettlementService`].
//!
//! The coordinator is owned by the room task, so every call on it is
//! already serialized. It wraps each service call in the configured
//! timeout and records results in the [`SettlementSession`].

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use stakegrid_protocol::{Allocation, CanonicalRequest, PlayerId, Role, RoomId, SessionPhase, Signature};
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::{
    Endorsement, OpenParams, ServiceError, SessionId, SettlementConfig, SettlementError,
    SettlementService, SettlementSession, Signer,
};

/// Result of an accepted handshake signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureStep {
    /// The guest signed; the host must now sign the same request.
    AwaitHost(CanonicalRequest),
    /// The host signed and the service opened the session.
    Opened(SessionId),
}

/// A session whose close failed permanently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnsettledSession {
    pub room_id: RoomId,
    pub session_id: Option<SessionId>,
    pub allocation: Option<Allocation>,
    pub close_request: Option<CanonicalRequest>,
}

/// Settlement handshake and close for one room.
pub struct Coordinator<S> {
    service: Arc<S>,
    config: SettlementConfig,
    params: OpenParams,
    session: SettlementSession,
}

impl<S: SettlementService> Coordinator<S> {
    pub fn new(service: Arc<S>, config: SettlementConfig, params: OpenParams) -> Self {
        Self {
            service,
            config: config.validated(),
            params,
            session: SettlementSession::new(),
        }
    }

    pub fn params(&self) -> &OpenParams {
        &self.params
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    pub fn session(&self) -> &SettlementSession {
        &self.session
    }

    pub fn phase(&self) -> SessionPhase {
        self.session.phase()
    }

    /// The participant holding `role`.
    pub fn participant(&self, role: Role) -> PlayerId {
        match role {
            Role::Host => self.params.host,
            Role::Guest => self.params.guest,
        }
    }

    /// Builds and stores the open request. The caller forwards it to the
    /// guest.
    pub async fn start(&mut self) -> Result<CanonicalRequest, SettlementError> {
        if self.session.phase() != SessionPhase::None {
            return Err(SettlementError::WrongPhase(self.session.phase()));
        }
        let request = self
            .call(
                "build_open_request",
                self.service.build_open_request(&self.params),
            )
            .await?;
        self.session.begin_open(request.clone())?;
        info!(
            room_id = %self.params.room_id,
            stake = %self.params.stake,
            "settlement handshake started"
        );
        Ok(request)
    }

    /// Verifies and stores a handshake signature.
    ///
    /// Order is fixed: guest, then host. A wrong-order or invalid
    /// signature leaves the phase unchanged. The host's signature opens
    /// the session; if the service refuses, the session is aborted.
    pub async fn submit_signature(
        &mut self,
        role: Role,
        signature: Signature,
    ) -> Result<SignatureStep, SettlementError> {
        self.session.check_signer(role)?;
        let request = self
            .session
            .request()
            .cloned()
            .ok_or(SettlementError::WrongPhase(self.session.phase()))?;
        let signer = self.participant(role);

        let valid = self
            .call(
                "verify_signature",
                self.service.verify_signature(&request, signer, &signature),
            )
            .await?;
        if !valid {
            warn!(room_id = %self.params.room_id, %role, "signature rejected");
            return Err(SettlementError::SignatureInvalid(role));
        }
        self.session.accept_signature(role, signature)?;
        debug!(room_id = %self.params.room_id, %role, "signature accepted");

        if role == Role::Guest {
            return Ok(SignatureStep::AwaitHost(request));
        }

        let endorsements: Vec<Endorsement> = self
            .session
            .signatures()
            .map(|(role, signature)| Endorsement {
                signer: Signer::Participant(self.participant(role)),
                signature: signature.clone(),
            })
            .collect();

        match self
            .call("open_session", self.service.open_session(&request, &endorsements))
            .await
        {
            Ok(session_id) => {
                self.session.activate(session_id.clone())?;
                info!(room_id = %self.params.room_id, %session_id, "settlement session open");
                Ok(SignatureStep::Opened(session_id))
            }
            Err(e) => {
                self.session.abort();
                error!(room_id = %self.params.room_id, error = %e, "settlement session failed to open");
                Err(SettlementError::SessionOpenFailed(e))
            }
        }
    }

    /// Aborts a handshake whose signature deadline passed. Returns the
    /// timeout error to report, or `None` if nothing was pending.
    pub fn expire(&mut self) -> Option<SettlementError> {
        let role = self.session.expected_signer()?;
        self.session.abort();
        warn!(room_id = %self.params.room_id, %role, "signature wait timed out, session aborted");
        Some(SettlementError::SignatureTimeout(role))
    }

    /// Aborts a session that never opened. See [`SettlementSession::abort`].
    pub fn abort(&mut self) -> bool {
        let aborted = self.session.abort();
        if aborted {
            info!(room_id = %self.params.room_id, "settlement session aborted");
        }
        aborted
    }

    /// Closes the session with `allocation`.
    ///
    /// Returns `Ok(None)` without calling the service unless the session
    /// is `Active`, so repeated triggers are harmless. Failed attempts
    /// are retried with exponential backoff, reusing the close request
    /// and operator signature already obtained. When every attempt fails
    /// the session is flagged for reconciliation.
    pub async fn close(
        &mut self,
        allocation: Allocation,
    ) -> Result<Option<Allocation>, SettlementError> {
        if !self.session.can_close() {
            debug!(room_id = %self.params.room_id, phase = ?self.session.phase(), "close skipped");
            return Ok(None);
        }
        let session_id = self
            .session
            .session_id()
            .cloned()
            .ok_or(SettlementError::WrongPhase(self.session.phase()))?;
        self.session.begin_close(allocation.clone())?;

        let attempts = self.config.close_attempts;
        let mut operator = None;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_close(&session_id, &allocation, &mut operator).await {
                Ok(()) => {
                    self.session.finish_close()?;
                    info!(room_id = %self.params.room_id, %session_id, attempt, "settlement session closed");
                    return Ok(Some(allocation));
                }
                Err(e) if attempt < attempts => {
                    let delay = self.config.backoff_for(attempt - 1);
                    warn!(
                        room_id = %self.params.room_id,
                        attempt,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "close attempt failed"
                    );
                    time::sleep(delay).await;
                }
                Err(e) => {
                    self.session.mark_unreconciled();
                    error!(
                        room_id = %self.params.room_id,
                        %session_id,
                        attempts,
                        error = %e,
                        "close failed permanently, session needs reconciliation"
                    );
                    return Err(SettlementError::SessionCloseFailed { attempts, last: e });
                }
            }
        }
    }

    /// Details of this session if it needs reconciliation.
    pub fn unsettled(&self) -> Option<UnsettledSession> {
        if !self.session.needs_reconciliation() {
            return None;
        }
        Some(UnsettledSession {
            room_id: self.params.room_id,
            session_id: self.session.session_id().cloned(),
            allocation: self.session.allocation().cloned(),
            close_request: self.session.request().cloned(),
        })
    }

    async fn try_close(
        &mut self,
        session_id: &SessionId,
        allocation: &Allocation,
        operator: &mut Option<Signature>,
    ) -> Result<(), ServiceError> {
        let request = match self.session.request() {
            Some(request) => request.clone(),
            None => {
                let request = self
                    .call(
                        "build_close_request",
                        self.service.build_close_request(session_id, allocation),
                    )
                    .await?;
                self.session.set_close_request(request.clone());
                request
            }
        };

        let signature = match operator.clone() {
            Some(signature) => signature,
            None => {
                let signature = self
                    .call("sign_as_operator", self.service.sign_as_operator(&request))
                    .await?;
                *operator = Some(signature.clone());
                signature
            }
        };

        let endorsements = [Endorsement {
            signer: Signer::Operator,
            signature,
        }];
        self.call(
            "close_session",
            self.service.close_session(session_id, &request, &endorsements),
        )
        .await
    }

    /// Runs one service call under `call_timeout`.
    async fn call<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T, ServiceError>>,
    ) -> Result<T, ServiceError> {
        match time::timeout(self.config.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(room_id = %self.params.room_id, operation, "settlement call timed out");
                Err(ServiceError::TimedOut {
                    operation,
                    after: self.config.call_timeout,
                })
            }
        }
    }
}
