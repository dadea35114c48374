//! Room configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use stakegrid_protocol::Amount;
use stakegrid_settlement::SettlementConfig;
use stakegrid_sim::MatchConfig;
use stakegrid_tick::TickConfig;
use tracing::warn;

/// Stakes offered when none are configured: 0.01, 0.1, 0.5, 1, and 5.
pub const DEFAULT_STAKES: [Amount; 5] = [
    Amount::from_micros(10_000),
    Amount::from_micros(100_000),
    Amount::from_micros(500_000),
    Amount::from_micros(1_000_000),
    Amount::from_micros(5_000_000),
];

/// Configuration shared by every room a registry creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomConfig {
    /// The stakes a host may open a room with.
    pub allowed_stakes: Vec<Amount>,

    /// Gap between the session opening and the first tick.
    pub countdown: Duration,

    /// How long a finished room lingers before it is retired, so both
    /// participants receive the result and settlement events.
    pub result_grace: Duration,

    /// Capacity of each room's command channel.
    pub channel_size: usize,

    /// Base seed for match randomness. Each room mixes in its id.
    /// `None` seeds every match from the OS.
    pub seed: Option<u64>,

    /// Board and food settings.
    pub game: MatchConfig,

    /// Match clock.
    pub tick: TickConfig,

    /// Signature and settlement call timing.
    pub settlement: SettlementConfig,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            allowed_stakes: DEFAULT_STAKES.to_vec(),
            countdown: Duration::from_secs(3),
            result_grace: Duration::from_secs(5),
            channel_size: 64,
            seed: None,
            game: MatchConfig::default(),
            tick: TickConfig::default(),
            settlement: SettlementConfig::default(),
        }
    }
}

impl RoomConfig {
    /// Clamp out-of-range values. Called by
    /// [`RoomRegistry::new`](crate::RoomRegistry::new).
    pub fn validated(mut self) -> Self {
        self.allowed_stakes.retain(|stake| *stake > Amount::ZERO);
        self.allowed_stakes.sort();
        self.allowed_stakes.dedup();
        if self.allowed_stakes.is_empty() {
            warn!("no valid stakes configured, using defaults");
            self.allowed_stakes = DEFAULT_STAKES.to_vec();
        }
        if self.channel_size == 0 {
            warn!("channel_size is zero, using 1");
            self.channel_size = 1;
        }
        self.game = self.game.validated();
        self.tick = self.tick.validated();
        self.settlement = self.settlement.validated();
        self
    }

    /// Returns `true` if a room may be opened with `stake`.
    pub fn is_allowed(&self, stake: Amount) -> bool {
        self.allowed_stakes.contains(&stake)
    }
}
