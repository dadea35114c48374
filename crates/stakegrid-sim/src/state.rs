//! Match state and the operations the room layer performs on it between
//! ticks.

use std::collections::BTreeSet;

use rand::Rng;
use serde::{Deserialize, Serialize};
use stakegrid_protocol::{Cell, Heading, MatchView, Outcome, Seat};

use crate::{Actor, GridSize, MatchConfig};

/// The full simulation state of one match.
///
/// Food is a `BTreeSet` so iteration order, and therefore a seeded
/// replay, is identical on every platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchState {
    pub config: MatchConfig,
    /// Indexed by [`Seat::index`].
    pub actors: [Actor; 2],
    pub food: BTreeSet<Cell>,
    pub tick: u64,
    pub outcome: Outcome,
}

impl MatchState {
    /// Builds the opening layout.
    ///
    /// The first actor spawns a quarter of the way in from the left edge
    /// heading right, the second mirrored from the right edge heading
    /// left, both on the middle row with bodies trailing behind them.
    pub fn new<R: Rng + ?Sized>(config: MatchConfig, rng: &mut R) -> Self {
        let config = config.validated();
        let grid = config.grid;
        let row = grid.height / 2;
        let first_x = grid.width / 4;
        let second_x = grid.width - grid.width / 4;

        let first = spawn(grid, Cell::new(first_x, row), Heading::Right, config.initial_length);
        let second = spawn(grid, Cell::new(second_x, row), Heading::Left, config.initial_length);

        let mut state = Self {
            config,
            actors: [first, second],
            food: BTreeSet::new(),
            tick: 0,
            outcome: Outcome::Ongoing,
        };
        state.resupply_food(rng);
        state
    }

    pub fn grid(&self) -> GridSize {
        self.config.grid
    }

    pub fn actor(&self, seat: Seat) -> &Actor {
        &self.actors[seat.index()]
    }

    /// Overwrites the seat's pending heading. Reversal is allowed; dead
    /// actors ignore input.
    pub fn queue_heading(&mut self, seat: Seat, heading: Heading) {
        let actor = &mut self.actors[seat.index()];
        if actor.alive {
            actor.queued = heading;
        }
    }

    /// Kills `seat` outside of a tick (the participant left mid-match)
    /// and returns the resulting outcome.
    ///
    /// No-op once the match already has a result.
    pub fn forfeit(&mut self, seat: Seat) -> Outcome {
        if self.outcome.is_terminal() {
            return self.outcome;
        }
        self.actors[seat.index()].alive = false;
        self.outcome = decide(&self.actors);
        self.outcome
    }

    /// Scores, indexed by seat.
    pub fn scores(&self) -> [u32; 2] {
        [self.actors[0].score, self.actors[1].score]
    }

    /// Returns `true` if `cell` is covered by either body.
    pub fn is_occupied(&self, cell: Cell) -> bool {
        self.actors.iter().any(|a| a.occupies(cell))
    }

    pub fn view(&self) -> MatchView {
        MatchView {
            width: self.config.grid.width,
            height: self.config.grid.height,
            actors: [self.actors[0].view(), self.actors[1].view()],
            food: self.food.iter().copied().collect(),
            tick: self.tick,
            outcome: self.outcome,
        }
    }

    /// Tops food up to `min_food`, each new cell drawn uniformly from
    /// cells holding neither a body nor food. Stops early if the board
    /// is full.
    pub(crate) fn resupply_food<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let needed = self.config.min_food.saturating_sub(self.food.len());
        if needed == 0 {
            return;
        }

        let mut free: Vec<Cell> = self
            .config
            .grid
            .cells()
            .filter(|c| !self.food.contains(c) && !self.is_occupied(*c))
            .collect();

        for _ in 0..needed {
            if free.is_empty() {
                break;
            }
            let index = rng.random_range(0..free.len());
            self.food.insert(free.swap_remove(index));
        }
    }
}

/// Terminal determination from the alive flags alone. Scores never
/// break ties.
pub(crate) fn decide(actors: &[Actor; 2]) -> Outcome {
    match (actors[0].alive, actors[1].alive) {
        (true, true) => Outcome::Ongoing,
        (true, false) => Outcome::Winner(Seat::First),
        (false, true) => Outcome::Winner(Seat::Second),
        (false, false) => Outcome::Tie,
    }
}

fn spawn(grid: GridSize, head: Cell, heading: Heading, length: usize) -> Actor {
    let behind = heading.opposite();
    let body = std::iter::successors(Some(head), |cell| Some(grid.step(*cell, behind))).take(length);
    Actor::new(body, heading)
}
