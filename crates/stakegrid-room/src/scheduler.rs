//! Match scheduling: one clock, one simulation, one RNG per playing room.

use rand::SeedableRng;
use rand::rngs::StdRng;
use stakegrid_protocol::{Heading, MatchView, Outcome, Seat};
use stakegrid_sim::{MatchConfig, MatchState, advance};
use stakegrid_tick::{TickConfig, TickInfo, TickScheduler, TickStats};
use tracing::trace;

/// Drives one match. Owned by the room actor.
///
/// Direction input lands in a single slot per seat; only the latest
/// heading since the previous tick is applied.
pub(crate) struct MatchRunner {
    state: MatchState,
    rng: StdRng,
    clock: TickScheduler,
    inputs: [Option<Heading>; 2],
}

impl MatchRunner {
    /// Builds the opening layout. The clock stays stopped until
    /// [`start`](Self::start).
    pub(crate) fn new(game: MatchConfig, tick: TickConfig, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let state = MatchState::new(game, &mut rng);
        Self {
            state,
            rng,
            clock: TickScheduler::new(tick),
            inputs: [None, None],
        }
    }

    pub(crate) fn start(&mut self) {
        self.clock.start();
    }

    pub(crate) fn queue(&mut self, seat: Seat, heading: Heading) {
        self.inputs[seat.index()] = Some(heading);
    }

    /// Waits for this match's next tick. Pends forever while the clock
    /// is stopped.
    pub(crate) async fn next_tick(&mut self) -> TickInfo {
        self.clock.wait_for_tick().await
    }

    /// Applies pending input and advances one tick. Stops the clock once
    /// the match has a result.
    pub(crate) fn step(&mut self) -> Outcome {
        for seat in Seat::ALL {
            if let Some(heading) = self.inputs[seat.index()].take() {
                self.state.queue_heading(seat, heading);
            }
        }
        let outcome = advance(&mut self.state, &mut self.rng);
        self.clock.record_tick_end();
        trace!(tick = self.state.tick, ?outcome, "match advanced");
        if outcome.is_terminal() {
            self.clock.stop();
        }
        outcome
    }

    /// Kills `seat` outside of a tick and stops the clock.
    pub(crate) fn forfeit(&mut self, seat: Seat) -> Outcome {
        let outcome = self.state.forfeit(seat);
        self.clock.stop();
        outcome
    }

    pub(crate) fn view(&self) -> MatchView {
        self.state.view()
    }

    pub(crate) fn scores(&self) -> [u32; 2] {
        self.state.scores()
    }

    pub(crate) fn stats(&self) -> &TickStats {
        self.clock.stats()
    }
}

/// The next tick of `runner`, or never if there is no match yet.
pub(crate) async fn next_tick(runner: Option<&mut MatchRunner>) -> TickInfo {
    match runner {
        Some(runner) => runner.next_tick().await,
        None => std::future::pending().await,
    }
}
