//! Board configuration.

use serde::{Deserialize, Serialize};
use stakegrid_protocol::{Cell, Heading};
use tracing::warn;

// ---------------------------------------------------------------------------
// GridSize
// ---------------------------------------------------------------------------

/// Dimensions of the toroidal board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSize {
    pub width: u16,
    pub height: u16,
}

impl GridSize {
    pub const fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    /// Returns `true` if `cell` lies on the board.
    pub fn contains(&self, cell: Cell) -> bool {
        cell.x < self.width && cell.y < self.height
    }

    /// The cell one step from `cell` along `heading`, wrapping at every edge.
    pub fn step(&self, cell: Cell, heading: Heading) -> Cell {
        let (dx, dy) = heading.delta();
        Cell {
            x: wrap(cell.x, dx, self.width),
            y: wrap(cell.y, dy, self.height),
        }
    }

    /// Every cell, row by row.
    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        (0..self.height).flat_map(move |y| (0..self.width).map(move |x| Cell { x, y }))
    }

    /// Total number of cells.
    pub fn area(&self) -> usize {
        usize::from(self.width) * usize::from(self.height)
    }
}

fn wrap(value: u16, delta: i32, size: u16) -> u16 {
    let size = i32::from(size);
    // rem_euclid keeps the result in 0..size, so the cast cannot truncate.
    (i32::from(value) + delta).rem_euclid(size) as u16
}

// ---------------------------------------------------------------------------
// MatchConfig
// ---------------------------------------------------------------------------

/// Configuration for one match.
///
/// Grid size, food count, and tick period (see the room layer) are
/// deployment parameters, not constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Board dimensions.
    pub grid: GridSize,

    /// Food cells kept on the board after every tick.
    pub min_food: usize,

    /// Body length of each actor at spawn.
    pub initial_length: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            grid: GridSize::new(20, 20),
            min_food: 3,
            initial_length: 3,
        }
    }
}

impl MatchConfig {
    /// Smallest supported board edge.
    pub const MIN_EDGE: u16 = 4;

    /// Clamp out-of-range values so the opening layout is always legal.
    ///
    /// Called by [`MatchState::new`](crate::MatchState::new). Rules:
    /// - each grid edge is at least [`Self::MIN_EDGE`];
    /// - `initial_length` is in `1..=width / 4`, so the two spawn bodies
    ///   never overlap.
    pub fn validated(mut self) -> Self {
        if self.grid.width < Self::MIN_EDGE || self.grid.height < Self::MIN_EDGE {
            warn!(
                width = self.grid.width,
                height = self.grid.height,
                min = Self::MIN_EDGE,
                "grid too small, clamping"
            );
            self.grid.width = self.grid.width.max(Self::MIN_EDGE);
            self.grid.height = self.grid.height.max(Self::MIN_EDGE);
        }

        let max_length = usize::from(self.grid.width / 4);
        if self.initial_length == 0 || self.initial_length > max_length {
            let clamped = self.initial_length.clamp(1, max_length);
            warn!(
                requested = self.initial_length,
                clamped, "initial_length out of range for grid width, clamping"
            );
            self.initial_length = clamped;
        }
        self
    }
}
