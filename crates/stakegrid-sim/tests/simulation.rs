//! Whole-match checks for the simulation engine: random play over many
//! seeds must keep every structural guarantee.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stakegrid_protocol::{Heading, Outcome, Seat};
use stakegrid_sim::{GridSize, MatchConfig, MatchState, advance};

const HEADINGS: [Heading; 4] = [Heading::Up, Heading::Down, Heading::Left, Heading::Right];

fn assert_invariants(state: &MatchState) {
    let grid = state.grid();
    for actor in &state.actors {
        assert!(actor.body.iter().all(|c| grid.contains(*c)), "cell out of bounds");
        if actor.alive {
            let unique: HashSet<_> = actor.body.iter().collect();
            assert_eq!(unique.len(), actor.len(), "live actor repeats a cell");
        }
    }
    for food in &state.food {
        assert!(grid.contains(*food));
    }
}

/// Plays one match with random inputs until it ends or `max_ticks` pass.
fn play(seed: u64, config: MatchConfig, max_ticks: u64) -> MatchState {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut state = MatchState::new(config, &mut rng);
    assert_invariants(&state);

    for _ in 0..max_ticks {
        for seat in Seat::ALL {
            if rng.random_bool(0.3) {
                let heading = HEADINGS[rng.random_range(0..HEADINGS.len())];
                state.queue_heading(seat, heading);
            }
        }

        let lengths = [state.actors[0].len(), state.actors[1].len()];
        let scores = state.scores();
        let outcome = advance(&mut state, &mut rng);
        assert_invariants(&state);

        for seat in Seat::ALL {
            let i = seat.index();
            let grew = state.actors[i].len() - lengths[i];
            let scored = state.actors[i].score - scores[i];
            assert!(grew <= 1, "grew by more than one cell");
            assert_eq!(grew as u32, scored, "growth and score must move together");
        }

        if outcome.is_terminal() {
            return state;
        }
        let covered = state.actors[0].len() + state.actors[1].len() + state.food.len();
        if covered < state.grid().area() {
            assert!(state.food.len() >= state.config.min_food, "food below minimum");
        }
    }
    state
}

#[test]
fn test_random_play_preserves_invariants() {
    for seed in 0..50 {
        play(seed, MatchConfig::default(), 2_000);
    }
}

#[test]
fn test_random_play_on_wide_board() {
    let config = MatchConfig {
        grid: GridSize::new(40, 30),
        min_food: 5,
        initial_length: 3,
    };
    for seed in 0..20 {
        play(seed, config, 2_000);
    }
}

#[test]
fn test_same_seed_replays_identically() {
    let a = play(1234, MatchConfig::default(), 500);
    let b = play(1234, MatchConfig::default(), 500);
    assert_eq!(a, b);
}

#[test]
fn test_untouched_opening_ends_in_head_on_tie() {
    // The default layout puts the heads ten cells apart on one row, facing
    // each other, so with no input they meet on tick five.
    let mut rng = StdRng::seed_from_u64(99);
    let mut state = MatchState::new(MatchConfig::default(), &mut rng);

    let mut outcome = Outcome::Ongoing;
    while !outcome.is_terminal() {
        outcome = advance(&mut state, &mut rng);
    }

    assert_eq!(outcome, Outcome::Tie);
    assert_eq!(state.tick, 5);
}
