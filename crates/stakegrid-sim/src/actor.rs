//! One participant's entity on the board.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use stakegrid_protocol::{ActorView, Cell, Heading};

/// A snake: its occupied cells (head first), where it is going, and
/// whether it is still in the game.
///
/// `body` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub body: VecDeque<Cell>,
    pub heading: Heading,
    /// Heading applied at the start of the next tick. A single slot:
    /// later inputs overwrite earlier ones.
    pub queued: Heading,
    pub alive: bool,
    pub score: u32,
}

impl Actor {
    /// Creates a live actor. `body` is head first and must not be empty.
    pub fn new(body: impl IntoIterator<Item = Cell>, heading: Heading) -> Self {
        let body: VecDeque<Cell> = body.into_iter().collect();
        debug_assert!(!body.is_empty(), "actor body must not be empty");
        Self {
            body,
            heading,
            queued: heading,
            alive: true,
            score: 0,
        }
    }

    pub fn head(&self) -> Cell {
        self.body[0]
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Returns `true` if any body cell is `cell`.
    pub fn occupies(&self, cell: Cell) -> bool {
        self.body.contains(&cell)
    }

    pub fn view(&self) -> ActorView {
        ActorView {
            body: self.body.iter().copied().collect(),
            heading: self.heading,
            alive: self.alive,
            score: self.score,
        }
    }
}
