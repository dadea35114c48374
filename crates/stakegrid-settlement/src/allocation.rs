//! Splitting a room's pot.

use stakegrid_protocol::{Allocation, AllocationEntry, Amount, Outcome, PlayerId, Role, Seat};

use crate::SettlementError;

/// Both stakes combined. `None` on overflow.
pub fn pot(stake: Amount) -> Option<Amount> {
    stake.checked_add(stake)
}

/// The allocation for a finished match.
///
/// A sole survivor takes the whole pot; a tie hands each participant
/// their own stake back. Entries are host first and always sum to the
/// pot. The host plays [`Seat::First`].
pub fn allocate(
    outcome: Outcome,
    host: PlayerId,
    guest: PlayerId,
    stake: Amount,
) -> Result<Allocation, SettlementError> {
    let pot = pot(stake)
        .ok_or_else(|| SettlementError::InvalidAllocation(format!("pot overflows for stake {stake}")))?;

    let (host_amount, guest_amount) = match outcome {
        Outcome::Ongoing => {
            return Err(SettlementError::InvalidAllocation(
                "match has no result".into(),
            ));
        }
        Outcome::Tie => (stake, stake),
        Outcome::Winner(Seat::First) => (pot, Amount::ZERO),
        Outcome::Winner(Seat::Second) => (Amount::ZERO, pot),
    };

    Ok(Allocation {
        entries: vec![
            AllocationEntry {
                player: host,
                amount: host_amount,
            },
            AllocationEntry {
                player: guest,
                amount: guest_amount,
            },
        ],
    })
}

/// The whole pot to `remaining`, used when the other participant leaves
/// before or during play.
pub fn forfeit(
    remaining: Role,
    host: PlayerId,
    guest: PlayerId,
    stake: Amount,
) -> Result<Allocation, SettlementError> {
    allocate(Outcome::Winner(remaining.seat()), host, guest, stake)
}
