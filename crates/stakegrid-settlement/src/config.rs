//! Settlement timing configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Timeouts and retry policy for one room's settlement session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// How long a participant has to return a requested signature.
    pub signature_timeout: Duration,

    /// Upper bound on any single settlement service call.
    pub call_timeout: Duration,

    /// Attempts made to close a session before it is flagged for
    /// manual reconciliation.
    pub close_attempts: u32,

    /// Delay before the first close retry; doubled on each further retry.
    pub close_backoff: Duration,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            signature_timeout: Duration::from_secs(60),
            call_timeout: Duration::from_secs(10),
            close_attempts: 3,
            close_backoff: Duration::from_millis(250),
        }
    }
}

impl SettlementConfig {
    /// Clamp out-of-range values.
    ///
    /// Zero timeouts would expire every handshake immediately and zero
    /// attempts would never try to close, so each is raised to a floor.
    pub fn validated(mut self) -> Self {
        if self.signature_timeout.is_zero() {
            warn!("signature_timeout is zero, using 1s");
            self.signature_timeout = Duration::from_secs(1);
        }
        if self.call_timeout.is_zero() {
            warn!("call_timeout is zero, using 1s");
            self.call_timeout = Duration::from_secs(1);
        }
        if self.close_attempts == 0 {
            warn!("close_attempts is zero, using 1");
            self.close_attempts = 1;
        }
        self
    }

    /// Delay before retry number `retry` (0-based): `close_backoff × 2^retry`.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.close_backoff.saturating_mul(factor)
    }
}
