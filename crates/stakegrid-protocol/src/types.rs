//! Core value types shared by requests, events, and the room layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a participant.
///
/// Newtype over `u64` so a `PlayerId` can never be passed where a
/// `RoomId` is expected. `#[serde(transparent)]` keeps it a plain number
/// on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// A unique identifier for a room (one wagered match).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Amount
// ---------------------------------------------------------------------------

/// A monetary amount in micro-units (six decimals: `1.0 == 1_000_000`).
///
/// Money is never a float. Stakes, pots, and allocation entries are all
/// `Amount`s, and arithmetic on them is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    /// Micro-units in one whole unit.
    pub const MICROS_PER_UNIT: u64 = 1_000_000;

    /// Zero.
    pub const ZERO: Amount = Amount(0);

    /// Creates an amount from raw micro-units.
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// The raw micro-unit value.
    pub const fn micros(self) -> u64 {
        self.0
    }

    /// Checked addition. `None` on overflow.
    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / Self::MICROS_PER_UNIT;
        let frac = self.0 % Self::MICROS_PER_UNIT;
        if frac == 0 {
            return write!(f, "{whole}");
        }
        let digits = format!("{frac:06}");
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl FromStr for Amount {
    type Err = ProtocolError;

    /// Parses a non-negative decimal with at most six fractional digits
    /// (`"0.1"`, `"5"`, `"0.000001"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::InvalidMessage(format!("invalid amount: {s:?}"));

        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() || frac.len() > 6 {
            return Err(invalid());
        }
        if !whole.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let whole: u64 = whole.parse().map_err(|_| invalid())?;
        let frac_micros: u64 = if frac.is_empty() {
            0
        } else {
            format!("{frac:0<6}").parse().map_err(|_| invalid())?
        };

        whole
            .checked_mul(Self::MICROS_PER_UNIT)
            .and_then(|w| w.checked_add(frac_micros))
            .map(Amount)
            .ok_or_else(invalid)
    }
}

// ---------------------------------------------------------------------------
// Grid vocabulary
// ---------------------------------------------------------------------------

/// A cell on the grid. `x` grows to the right, `y` grows downward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub x: u16,
    pub y: u16,
}

impl Cell {
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// The direction an actor moves in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Heading {
    Up,
    Down,
    Left,
    Right,
}

impl Heading {
    /// Unit vector `(dx, dy)` for this heading.
    pub const fn delta(self) -> (i32, i32) {
        match self {
            Self::Up => (0, -1),
            Self::Down => (0, 1),
            Self::Left => (-1, 0),
            Self::Right => (1, 0),
        }
    }

    /// The heading pointing the other way.
    pub const fn opposite(self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

/// One of the two actor slots in a match.
///
/// The host always plays `First`, the guest `Second`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Seat {
    First,
    Second,
}

impl Seat {
    /// Both seats, in order.
    pub const ALL: [Seat; 2] = [Seat::First, Seat::Second];

    /// Index into two-element arrays.
    pub const fn index(self) -> usize {
        match self {
            Self::First => 0,
            Self::Second => 1,
        }
    }

    pub const fn other(self) -> Self {
        match self {
            Self::First => Self::Second,
            Self::Second => Self::First,
        }
    }
}

/// A participant's role in a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Host,
    Guest,
}

impl Role {
    /// The actor seat this role controls.
    pub const fn seat(self) -> Seat {
        match self {
            Self::Host => Seat::First,
            Self::Guest => Seat::Second,
        }
    }

    /// The role that controls `seat`.
    pub const fn for_seat(seat: Seat) -> Self {
        match seat {
            Seat::First => Self::Host,
            Seat::Second => Self::Guest,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Guest => write!(f, "guest"),
        }
    }
}

/// Result of a simulation tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Outcome {
    /// Both actors alive; the match goes on.
    #[default]
    Ongoing,
    /// Exactly one actor survived.
    Winner(Seat),
    /// Both actors died in the same tick.
    Tie,
}

impl Outcome {
    /// `true` once the match has a result.
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Ongoing)
    }
}

/// Broadcastable view of one actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorView {
    /// Occupied cells, head first.
    pub body: Vec<Cell>,
    pub heading: Heading,
    pub alive: bool,
    pub score: u32,
}

/// Broadcastable view of a match, sent with every tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchView {
    pub width: u16,
    pub height: u16,
    /// Indexed by [`Seat::index`].
    pub actors: [ActorView; 2],
    pub food: Vec<Cell>,
    pub tick: u64,
    pub outcome: Outcome,
}

// ---------------------------------------------------------------------------
// Room and session lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle state of a room.
///
/// Strictly ordered and one-directional:
///
/// ```text
/// Waiting → Ready → Playing → Closing → Finished
/// ```
///
/// A room may skip forward (a handshake that times out goes straight from
/// `Ready` to `Finished`) but never moves backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RoomState {
    /// Host is in, no guest yet.
    Waiting,
    /// Guest joined with a matching stake; the settlement handshake runs here.
    Ready,
    /// Simulation clock running.
    Playing,
    /// Match has a result; the settlement session is being closed.
    Closing,
    /// Terminal. The room is retired shortly after.
    Finished,
}

impl RoomState {
    /// Returns `true` if a guest may still join.
    pub fn is_joinable(&self) -> bool {
        matches!(self, Self::Waiting)
    }

    /// Returns `true` if moving to `target` keeps the sequence monotonic.
    pub fn can_advance_to(self, target: Self) -> bool {
        target > self
    }
}

impl fmt::Display for RoomState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Waiting => "waiting",
            Self::Ready => "ready",
            Self::Playing => "playing",
            Self::Closing => "closing",
            Self::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// Phase of the settlement session bound to a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SessionPhase {
    #[default]
    None,
    AwaitingGuestSignature,
    AwaitingHostSignature,
    Active,
    AwaitingCloseSignatures,
    Closed,
    Aborted,
}

impl SessionPhase {
    /// `true` while open-session signatures are being collected.
    pub fn is_handshaking(&self) -> bool {
        matches!(
            self,
            Self::AwaitingGuestSignature | Self::AwaitingHostSignature
        )
    }

    /// `true` once nothing more can happen to the session.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Closed | Self::Aborted)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::AwaitingGuestSignature => "awaiting-guest-signature",
            Self::AwaitingHostSignature => "awaiting-host-signature",
            Self::Active => "active",
            Self::AwaitingCloseSignatures => "awaiting-close-signatures",
            Self::Closed => "closed",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Broadcastable view of a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub host: PlayerId,
    pub guest: Option<PlayerId>,
    pub stake: Amount,
    pub state: RoomState,
    pub session: SessionPhase,
    /// Unix epoch milliseconds.
    pub created_at_ms: u64,
}

impl RoomSnapshot {
    /// The role `player` holds in this room, if any.
    pub fn role_of(&self, player: PlayerId) -> Option<Role> {
        if player == self.host {
            Some(Role::Host)
        } else if Some(player) == self.guest {
            Some(Role::Guest)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Settlement payloads
// ---------------------------------------------------------------------------

/// A request document produced by the settlement service.
///
/// Opaque to the core: it is stored and forwarded byte-for-byte, never
/// edited, because signatures are computed over its exact contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalRequest(String);

impl CanonicalRequest {
    pub fn new(body: impl Into<String>) -> Self {
        Self(body.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

/// A signature over a [`CanonicalRequest`], in whatever encoding the
/// settlement service uses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One participant's share of a closed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationEntry {
    pub player: PlayerId,
    pub amount: Amount,
}

/// Final distribution of a room's pot, host entry first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub entries: Vec<AllocationEntry>,
}

impl Allocation {
    /// Sum of all entries. `None` on overflow.
    pub fn total(&self) -> Option<Amount> {
        self.entries
            .iter()
            .try_fold(Amount::ZERO, |acc, e| acc.checked_add(e.amount))
    }

    /// Amount allocated to `player` (zero if absent).
    pub fn amount_for(&self, player: PlayerId) -> Amount {
        self.entries
            .iter()
            .filter(|e| e.player == player)
            .fold(Amount::ZERO, |acc, e| {
                acc.checked_add(e.amount).unwrap_or(acc)
            })
    }
}

// ---------------------------------------------------------------------------
// Recipient
// ---------------------------------------------------------------------------

/// Who inside a room should receive an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// Both participants currently seated.
    All,
    /// One participant.
    Player(PlayerId),
}

// =========================================================================
// Tests
// =========================================================================
