//! The settlement session phase machine.
//!
//! Pure bookkeeping, no I/O: [`Coordinator`](crate::Coordinator) calls
//! the service and then records the result here. Every transition checks
//! the current phase, so a session becomes `Active` at most once and
//! `Closed` at most once whatever order triggers arrive in.

use std::collections::BTreeMap;

use stakegrid_protocol::{Allocation, CanonicalRequest, Role, SessionPhase, Signature};

use crate::{SessionId, SettlementError};

/// State of the settlement session bound to one room.
#[derive(Debug, Clone, Default)]
pub struct SettlementSession {
    phase: SessionPhase,
    /// The open request while handshaking, the close request while
    /// closing. Never edited after the service produced it.
    request: Option<CanonicalRequest>,
    signatures: BTreeMap<Role, Signature>,
    session_id: Option<SessionId>,
    allocation: Option<Allocation>,
    needs_reconciliation: bool,
}

impl SettlementSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// The request currently awaiting signatures or submission.
    pub fn request(&self) -> Option<&CanonicalRequest> {
        self.request.as_ref()
    }

    pub fn signature(&self, role: Role) -> Option<&Signature> {
        self.signatures.get(&role)
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// The allocation being closed with, or closed with.
    pub fn allocation(&self) -> Option<&Allocation> {
        self.allocation.as_ref()
    }

    /// `true` if closing failed permanently and an operator has to settle
    /// the session by hand.
    pub fn needs_reconciliation(&self) -> bool {
        self.needs_reconciliation
    }

    /// The role whose signature is due next. Guest signs before host.
    pub fn expected_signer(&self) -> Option<Role> {
        match self.phase {
            SessionPhase::AwaitingGuestSignature => Some(Role::Guest),
            SessionPhase::AwaitingHostSignature => Some(Role::Host),
            _ => None,
        }
    }

    /// `none → awaiting-guest-signature`, storing the open request.
    pub fn begin_open(&mut self, request: CanonicalRequest) -> Result<(), SettlementError> {
        if self.phase != SessionPhase::None {
            return Err(SettlementError::WrongPhase(self.phase));
        }
        self.request = Some(request);
        self.phase = SessionPhase::AwaitingGuestSignature;
        Ok(())
    }

    /// Rejects `role` unless its signature is the one due next.
    pub fn check_signer(&self, role: Role) -> Result<(), SettlementError> {
        let expected = self.expected_signer();
        if expected == Some(role) {
            Ok(())
        } else {
            Err(SettlementError::UnexpectedSignature {
                expected,
                got: role,
            })
        }
    }

    /// Stores a verified signature.
    ///
    /// A guest signature moves the session to `awaiting-host-signature`.
    /// A host signature is stored without a phase change; the session
    /// stays there until [`activate`](Self::activate) or
    /// [`abort`](Self::abort).
    pub fn accept_signature(&mut self, role: Role, signature: Signature) -> Result<(), SettlementError> {
        self.check_signer(role)?;
        self.signatures.insert(role, signature);
        if role == Role::Guest {
            self.phase = SessionPhase::AwaitingHostSignature;
        }
        Ok(())
    }

    /// Both signatures in submission order, guest first.
    pub fn signatures(&self) -> impl Iterator<Item = (Role, &Signature)> {
        [Role::Guest, Role::Host]
            .into_iter()
            .filter_map(move |role| self.signatures.get(&role).map(|sig| (role, sig)))
    }

    /// `awaiting-host-signature → active` once the service opened the
    /// session.
    pub fn activate(&mut self, session_id: SessionId) -> Result<(), SettlementError> {
        let both_signed =
            self.signatures.contains_key(&Role::Guest) && self.signatures.contains_key(&Role::Host);
        if self.phase != SessionPhase::AwaitingHostSignature || !both_signed {
            return Err(SettlementError::WrongPhase(self.phase));
        }
        self.session_id = Some(session_id);
        self.phase = SessionPhase::Active;
        Ok(())
    }

    /// Abandons a session that never opened. Returns `false` (and does
    /// nothing) once the session is active or settled.
    pub fn abort(&mut self) -> bool {
        match self.phase {
            SessionPhase::None
            | SessionPhase::AwaitingGuestSignature
            | SessionPhase::AwaitingHostSignature => {
                self.phase = SessionPhase::Aborted;
                self.request = None;
                true
            }
            _ => false,
        }
    }

    /// `true` if a close may start: the session is active and no close
    /// has been attempted.
    pub fn can_close(&self) -> bool {
        self.phase == SessionPhase::Active
    }

    /// `active → awaiting-close-signatures`.
    pub fn begin_close(&mut self, allocation: Allocation) -> Result<(), SettlementError> {
        if !self.can_close() {
            return Err(SettlementError::WrongPhase(self.phase));
        }
        self.allocation = Some(allocation);
        self.request = None;
        self.phase = SessionPhase::AwaitingCloseSignatures;
        Ok(())
    }

    /// Records the close request once the service built it.
    pub fn set_close_request(&mut self, request: CanonicalRequest) {
        if self.phase == SessionPhase::AwaitingCloseSignatures {
            self.request = Some(request);
        }
    }

    /// `awaiting-close-signatures → closed`.
    pub fn finish_close(&mut self) -> Result<(), SettlementError> {
        if self.phase != SessionPhase::AwaitingCloseSignatures {
            return Err(SettlementError::WrongPhase(self.phase));
        }
        self.phase = SessionPhase::Closed;
        Ok(())
    }

    /// Flags a close that can no longer complete automatically. The phase
    /// stays `awaiting-close-signatures`.
    pub fn mark_unreconciled(&mut self) {
        self.needs_reconciliation = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stakegrid_protocol::{AllocationEntry, Amount, PlayerId};

    fn opened() -> SettlementSession {
        let mut session = SettlementSession::new();
        session.begin_open(CanonicalRequest::new("open")).unwrap();
        session.accept_signature(Role::Guest, Signature::new("g")).unwrap();
        session.accept_signature(Role::Host, Signature::new("h")).unwrap();
        session.activate(SessionId::new("s-1")).unwrap();
        session
    }

    fn allocation() -> Allocation {
        Allocation {
            entries: vec![AllocationEntry {
                player: PlayerId(1),
                amount: Amount::from_micros(200_000),
            }],
        }
    }

    #[test]
    fn test_begin_open_awaits_guest() {
        let mut session = SettlementSession::new();

        session.begin_open(CanonicalRequest::new("open")).unwrap();

        assert_eq!(session.phase(), SessionPhase::AwaitingGuestSignature);
        assert_eq!(session.expected_signer(), Some(Role::Guest));
        assert_eq!(session.request().map(|r| r.as_str()), Some("open"));
    }

    #[test]
    fn test_begin_open_twice_is_rejected() {
        let mut session = SettlementSession::new();
        session.begin_open(CanonicalRequest::new("open")).unwrap();

        let err = session.begin_open(CanonicalRequest::new("again")).unwrap_err();

        assert!(matches!(err, SettlementError::WrongPhase(SessionPhase::AwaitingGuestSignature)));
        assert_eq!(session.request().map(|r| r.as_str()), Some("open"));
    }

    #[test]
    fn test_host_before_guest_is_unexpected() {
        let mut session = SettlementSession::new();
        session.begin_open(CanonicalRequest::new("open")).unwrap();

        let err = session
            .accept_signature(Role::Host, Signature::new("h"))
            .unwrap_err();

        assert!(matches!(
            err,
            SettlementError::UnexpectedSignature {
                expected: Some(Role::Guest),
                got: Role::Host
            }
        ));
        assert_eq!(session.phase(), SessionPhase::AwaitingGuestSignature);
    }

    #[test]
    fn test_guest_signature_twice_is_unexpected() {
        let mut session = SettlementSession::new();
        session.begin_open(CanonicalRequest::new("open")).unwrap();
        session.accept_signature(Role::Guest, Signature::new("g")).unwrap();

        assert!(session.accept_signature(Role::Guest, Signature::new("g")).is_err());
        assert_eq!(session.phase(), SessionPhase::AwaitingHostSignature);
    }

    #[test]
    fn test_signatures_are_listed_guest_first() {
        let session = opened();
        let roles: Vec<Role> = session.signatures().map(|(role, _)| role).collect();
        assert_eq!(roles, vec![Role::Guest, Role::Host]);
    }

    #[test]
    fn test_activate_requires_both_signatures() {
        let mut session = SettlementSession::new();
        session.begin_open(CanonicalRequest::new("open")).unwrap();
        session.accept_signature(Role::Guest, Signature::new("g")).unwrap();

        assert!(session.activate(SessionId::new("s-1")).is_err());
        assert_eq!(session.phase(), SessionPhase::AwaitingHostSignature);
    }

    #[test]
    fn test_activate_at_most_once() {
        let mut session = opened();

        assert!(session.activate(SessionId::new("s-2")).is_err());
        assert_eq!(session.session_id(), Some(&SessionId::new("s-1")));
    }

    #[test]
    fn test_abort_during_handshake() {
        let mut session = SettlementSession::new();
        session.begin_open(CanonicalRequest::new("open")).unwrap();

        assert!(session.abort());
        assert_eq!(session.phase(), SessionPhase::Aborted);
        assert!(session.request().is_none());
        assert!(!session.abort());
    }

    #[test]
    fn test_abort_active_session_is_refused() {
        let mut session = opened();

        assert!(!session.abort());
        assert_eq!(session.phase(), SessionPhase::Active);
    }

    #[test]
    fn test_close_at_most_once() {
        let mut session = opened();

        session.begin_close(allocation()).unwrap();
        session.set_close_request(CanonicalRequest::new("close"));
        session.finish_close().unwrap();

        assert_eq!(session.phase(), SessionPhase::Closed);
        assert!(!session.can_close());
        assert!(session.begin_close(allocation()).is_err());
        assert!(session.finish_close().is_err());
        assert_eq!(session.allocation(), Some(&allocation()));
    }

    #[test]
    fn test_close_before_active_is_refused() {
        let mut session = SettlementSession::new();
        assert!(session.begin_close(allocation()).is_err());
        assert_eq!(session.phase(), SessionPhase::None);
    }

    #[test]
    fn test_mark_unreconciled_keeps_phase() {
        let mut session = opened();
        session.begin_close(allocation()).unwrap();

        session.mark_unreconciled();

        assert!(session.needs_reconciliation());
        assert_eq!(session.phase(), SessionPhase::AwaitingCloseSignatures);
    }
}
