//! In-process settlement service.
//!
//! [`MemorySettlement`] behaves like a real settlement backend from the
//! coordinator's point of view: it issues canonical JSON requests, checks
//! signatures, and keeps a ledger of opened and closed sessions. Its
//! "signatures" are hex SHA-256 digests over a per-signer key and the
//! request body. They only prove that the caller used
//! [`MemorySettlement::sign`]; none of this is cryptography.
//!
//! Faults can be injected at runtime to exercise the coordinator's
//! failure paths (see [`SettlementFaults`]).

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use stakegrid_protocol::{
    Allocation, AllocationEntry, Amount, CanonicalRequest, PlayerId, Role, RoomId, Signature,
};
use tracing::debug;

use crate::{Endorsement, OpenParams, ServiceError, SessionId, SettlementService, Signer, pot};

const DOMAIN: &[u8] = b"STAKEGRID_MEMORY_SETTLEMENT_V1";
const OPERATOR_KEY: &str = "operator";

/// Failures the in-memory service injects on purpose.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettlementFaults {
    /// Refuse every `open_session`.
    pub fail_open: bool,
    /// Refuse this many `close_session` calls, then recover.
    pub failing_closes: u32,
    /// Added to every verify, open, and close call.
    pub latency: Duration,
}

#[derive(Serialize, Deserialize)]
struct OpenDocument {
    kind: String,
    nonce: u64,
    room_id: RoomId,
    stake: Amount,
    participants: Vec<Participant>,
    allocation: Vec<AllocationEntry>,
}

#[derive(Serialize, Deserialize)]
struct Participant {
    player: PlayerId,
    role: Role,
    /// Share of the voting weight, in percent.
    weight: u32,
}

#[derive(Serialize, Deserialize)]
struct CloseDocument {
    kind: String,
    session_id: SessionId,
    allocation: Vec<AllocationEntry>,
}

struct LedgerEntry {
    stake: Amount,
    closed: Option<Allocation>,
}

#[derive(Default)]
struct Ledger {
    next_nonce: u64,
    next_session: u64,
    /// Open requests handed out and not yet used.
    issued: HashSet<String>,
    sessions: BTreeMap<SessionId, LedgerEntry>,
    open_calls: u32,
    close_calls: u32,
    faults: SettlementFaults,
}

/// A complete settlement service kept in memory.
#[derive(Default)]
pub struct MemorySettlement {
    ledger: Mutex<Ledger>,
}

impl MemorySettlement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: SettlementFaults) -> Self {
        let service = Self::new();
        service.set_faults(faults);
        service
    }

    /// Signs `request` the way `player`'s wallet would for this service.
    pub fn sign(player: PlayerId, request: &CanonicalRequest) -> Signature {
        digest(&format!("participant:{}", player.0), request)
    }

    pub fn set_faults(&self, faults: SettlementFaults) {
        self.ledger().faults = faults;
    }

    pub fn fail_open(&self, fail: bool) {
        self.ledger().faults.fail_open = fail;
    }

    pub fn fail_next_closes(&self, count: u32) {
        self.ledger().faults.failing_closes = count;
    }

    pub fn set_latency(&self, latency: Duration) {
        self.ledger().faults.latency = latency;
    }

    /// Every session ever opened, in id order.
    pub fn sessions(&self) -> Vec<SessionId> {
        self.ledger().sessions.keys().cloned().collect()
    }

    /// The allocation a session was closed with.
    pub fn closed_allocation(&self, session_id: &SessionId) -> Option<Allocation> {
        self.ledger()
            .sessions
            .get(session_id)
            .and_then(|entry| entry.closed.clone())
    }

    pub fn open_calls(&self) -> u32 {
        self.ledger().open_calls
    }

    pub fn close_calls(&self) -> u32 {
        self.ledger().close_calls
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn delay(&self) {
        let latency = self.ledger().faults.latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

fn digest(key: &str, request: &CanonicalRequest) -> Signature {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN);
    hasher.update(key.as_bytes());
    hasher.update([0u8]);
    hasher.update(request.as_bytes());
    Signature::new(hex::encode(hasher.finalize()))
}

fn rejected(message: impl Into<String>) -> ServiceError {
    ServiceError::Rejected(message.into())
}

fn to_request<T: Serialize>(document: &T) -> Result<CanonicalRequest, ServiceError> {
    serde_json::to_string(document)
        .map(CanonicalRequest::new)
        .map_err(|e| ServiceError::Unavailable(format!("encode request: {e}")))
}

fn endorsed(endorsements: &[Endorsement], signer: Signer, expected: &Signature) -> bool {
    endorsements
        .iter()
        .any(|e| e.signer == signer && &e.signature == expected)
}

impl SettlementService for MemorySettlement {
    async fn build_open_request(&self, params: &OpenParams) -> Result<CanonicalRequest, ServiceError> {
        let mut ledger = self.ledger();
        ledger.next_nonce += 1;
        let document = OpenDocument {
            kind: "open".into(),
            nonce: ledger.next_nonce,
            room_id: params.room_id,
            stake: params.stake,
            participants: vec![
                Participant {
                    player: params.host,
                    role: Role::Host,
                    weight: 50,
                },
                Participant {
                    player: params.guest,
                    role: Role::Guest,
                    weight: 50,
                },
            ],
            allocation: vec![
                AllocationEntry {
                    player: params.host,
                    amount: params.stake,
                },
                AllocationEntry {
                    player: params.guest,
                    amount: params.stake,
                },
            ],
        };
        let request = to_request(&document)?;
        ledger.issued.insert(request.as_str().to_owned());
        Ok(request)
    }

    async fn verify_signature(
        &self,
        request: &CanonicalRequest,
        signer: PlayerId,
        signature: &Signature,
    ) -> Result<bool, ServiceError> {
        self.delay().await;
        Ok(Self::sign(signer, request) == *signature)
    }

    async fn open_session(
        &self,
        request: &CanonicalRequest,
        endorsements: &[Endorsement],
    ) -> Result<SessionId, ServiceError> {
        self.delay().await;
        let mut ledger = self.ledger();
        ledger.open_calls += 1;
        if ledger.faults.fail_open {
            return Err(ServiceError::Unavailable("injected open failure".into()));
        }

        let document: OpenDocument = serde_json::from_str(request.as_str())
            .map_err(|e| rejected(format!("malformed open request: {e}")))?;
        if document.kind != "open" || !ledger.issued.contains(request.as_str()) {
            return Err(rejected("open request was not issued by this service"));
        }
        for participant in &document.participants {
            let expected = Self::sign(participant.player, request);
            if !endorsed(endorsements, Signer::Participant(participant.player), &expected) {
                return Err(rejected(format!(
                    "missing {} signature from {}",
                    participant.role, participant.player
                )));
            }
        }

        ledger.issued.remove(request.as_str());
        ledger.next_session += 1;
        let session_id = SessionId::new(format!("mem-{}", ledger.next_session));
        ledger.sessions.insert(
            session_id.clone(),
            LedgerEntry {
                stake: document.stake,
                closed: None,
            },
        );
        debug!(%session_id, room_id = %document.room_id, "memory session opened");
        Ok(session_id)
    }

    async fn build_close_request(
        &self,
        session_id: &SessionId,
        allocation: &Allocation,
    ) -> Result<CanonicalRequest, ServiceError> {
        let ledger = self.ledger();
        let entry = ledger
            .sessions
            .get(session_id)
            .ok_or_else(|| rejected(format!("unknown session {session_id}")))?;
        if allocation.total() != pot(entry.stake) {
            return Err(rejected("allocation does not sum to the pot"));
        }
        to_request(&CloseDocument {
            kind: "close".into(),
            session_id: session_id.clone(),
            allocation: allocation.entries.clone(),
        })
    }

    async fn sign_as_operator(&self, request: &CanonicalRequest) -> Result<Signature, ServiceError> {
        Ok(digest(OPERATOR_KEY, request))
    }

    async fn close_session(
        &self,
        session_id: &SessionId,
        request: &CanonicalRequest,
        endorsements: &[Endorsement],
    ) -> Result<(), ServiceError> {
        self.delay().await;
        let mut ledger = self.ledger();
        ledger.close_calls += 1;
        if ledger.faults.failing_closes > 0 {
            ledger.faults.failing_closes -= 1;
            return Err(ServiceError::Unavailable("injected close failure".into()));
        }

        let document: CloseDocument = serde_json::from_str(request.as_str())
            .map_err(|e| rejected(format!("malformed close request: {e}")))?;
        if document.kind != "close" || document.session_id != *session_id {
            return Err(rejected("close request does not match session"));
        }
        if !endorsed(endorsements, Signer::Operator, &digest(OPERATOR_KEY, request)) {
            return Err(rejected("missing operator signature"));
        }

        let entry = ledger
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| rejected(format!("unknown session {session_id}")))?;
        if entry.closed.is_some() {
            return Err(rejected(format!("session {session_id} already closed")));
        }
        entry.closed = Some(Allocation {
            entries: document.allocation,
        });
        debug!(%session_id, "memory session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> OpenParams {
        OpenParams {
            room_id: RoomId(1),
            host: PlayerId(1),
            guest: PlayerId(2),
            stake: Amount::from_micros(100_000),
        }
    }

    fn both_signed(request: &CanonicalRequest) -> Vec<Endorsement> {
        [PlayerId(2), PlayerId(1)]
            .into_iter()
            .map(|player| Endorsement {
                signer: Signer::Participant(player),
                signature: MemorySettlement::sign(player, request),
            })
            .collect()
    }

    #[test]
    fn test_sign_is_per_player() {
        let request = CanonicalRequest::new("body");
        assert_ne!(
            MemorySettlement::sign(PlayerId(1), &request),
            MemorySettlement::sign(PlayerId(2), &request)
        );
        assert_eq!(MemorySettlement::sign(PlayerId(1), &request).as_str().len(), 64);
    }

    #[tokio::test]
    async fn test_open_request_names_both_participants() {
        let service = MemorySettlement::new();

        let request = service.build_open_request(&params()).await.unwrap();

        let json: serde_json::Value = serde_json::from_str(request.as_str()).unwrap();
        assert_eq!(json["kind"], "open");
        assert_eq!(json["participants"][0]["player"], 1);
        assert_eq!(json["participants"][1]["role"], "Guest");
        assert_eq!(json["allocation"][1]["amount"], 100_000);
    }

    #[tokio::test]
    async fn test_verify_signature() {
        let service = MemorySettlement::new();
        let request = service.build_open_request(&params()).await.unwrap();

        let good = MemorySettlement::sign(PlayerId(2), &request);
        assert!(service.verify_signature(&request, PlayerId(2), &good).await.unwrap());
        assert!(!service.verify_signature(&request, PlayerId(1), &good).await.unwrap());
        assert!(
            !service
                .verify_signature(&request, PlayerId(2), &Signature::new("00"))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_open_session_requires_both_signatures() {
        let service = MemorySettlement::new();
        let request = service.build_open_request(&params()).await.unwrap();
        let mut endorsements = both_signed(&request);
        endorsements.pop();

        let err = service.open_session(&request, &endorsements).await.unwrap_err();

        assert!(matches!(err, ServiceError::Rejected(_)));
        assert!(service.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_open_session_rejects_unissued_request() {
        let service = MemorySettlement::new();
        let request = CanonicalRequest::new(
            r#"{"kind":"open","nonce":9,"room_id":1,"stake":1,"participants":[],"allocation":[]}"#,
        );

        assert!(service.open_session(&request, &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_open_then_close_records_allocation() {
        let service = MemorySettlement::new();
        let request = service.build_open_request(&params()).await.unwrap();
        let session_id = service
            .open_session(&request, &both_signed(&request))
            .await
            .unwrap();
        let allocation = crate::allocate(
            stakegrid_protocol::Outcome::Tie,
            PlayerId(1),
            PlayerId(2),
            params().stake,
        )
        .unwrap();

        let close = service.build_close_request(&session_id, &allocation).await.unwrap();
        let operator = service.sign_as_operator(&close).await.unwrap();
        service
            .close_session(
                &session_id,
                &close,
                &[Endorsement {
                    signer: Signer::Operator,
                    signature: operator,
                }],
            )
            .await
            .unwrap();

        assert_eq!(service.closed_allocation(&session_id), Some(allocation));
        assert_eq!(service.open_calls(), 1);
        assert_eq!(service.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_close_without_operator_signature_is_rejected() {
        let service = MemorySettlement::new();
        let request = service.build_open_request(&params()).await.unwrap();
        let session_id = service
            .open_session(&request, &both_signed(&request))
            .await
            .unwrap();
        let allocation = crate::forfeit(Role::Host, PlayerId(1), PlayerId(2), params().stake)
            .unwrap();
        let close = service.build_close_request(&session_id, &allocation).await.unwrap();

        let err = service.close_session(&session_id, &close, &[]).await.unwrap_err();

        assert!(matches!(err, ServiceError::Rejected(_)));
        assert_eq!(service.closed_allocation(&session_id), None);
    }

    #[tokio::test]
    async fn test_close_request_rejects_unbalanced_allocation() {
        let service = MemorySettlement::new();
        let request = service.build_open_request(&params()).await.unwrap();
        let session_id = service
            .open_session(&request, &both_signed(&request))
            .await
            .unwrap();
        let allocation = Allocation {
            entries: vec![AllocationEntry {
                player: PlayerId(1),
                amount: Amount::from_micros(1),
            }],
        };

        assert!(service.build_close_request(&session_id, &allocation).await.is_err());
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let service = MemorySettlement::with_faults(SettlementFaults {
            fail_open: true,
            ..Default::default()
        });
        let request = service.build_open_request(&params()).await.unwrap();

        let err = service
            .open_session(&request, &both_signed(&request))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Unavailable(_)));
        assert_eq!(service.open_calls(), 1);
    }
}
