//! The per-tick transition function.

use rand::Rng;
use stakegrid_protocol::{Cell, Outcome};

use crate::MatchState;
use crate::state::decide;

/// Advances the match by one tick and returns the resulting outcome.
///
/// Both actors move simultaneously: every step below is computed from the
/// state at the start of the tick, never from the other actor's
/// half-applied move.
///
/// 1. Queued headings become current (reversal allowed).
/// 2. New heads are one cell along the heading, wrapped toroidally.
/// 3. A head on food eats it and grows (tail kept); otherwise the tail
///    cell is dropped.
/// 4. Self-collision: the new head hits its own post-growth body.
/// 5. Cross-collision: the new head hits any cell of the other's
///    post-growth body, new head included. Head-to-head kills both.
/// 6. Food is resupplied to the configured minimum.
/// 7. Outcome: both dead is a tie, one dead is a win for the other.
///
/// Once the match has a result this is a no-op that returns it.
pub fn advance<R: Rng + ?Sized>(state: &mut MatchState, rng: &mut R) -> Outcome {
    if state.outcome.is_terminal() {
        return state.outcome;
    }
    state.tick += 1;
    let grid = state.config.grid;

    let mut heads: [Option<Cell>; 2] = [None, None];
    for (actor, head) in state.actors.iter_mut().zip(heads.iter_mut()) {
        if actor.alive {
            actor.heading = actor.queued;
            *head = Some(grid.step(actor.head(), actor.heading));
        }
    }

    // Decided against the food present at the start of the tick, so two
    // heads landing on the same food both count it.
    let ate = heads.map(|head| head.is_some_and(|cell| state.food.contains(&cell)));

    for ((actor, head), ate) in state.actors.iter_mut().zip(heads).zip(ate) {
        let Some(head) = head else { continue };
        actor.body.push_front(head);
        if ate {
            actor.score += 1;
        } else {
            actor.body.pop_back();
        }
    }
    for (head, ate) in heads.iter().zip(ate) {
        if let (Some(cell), true) = (head, ate) {
            state.food.remove(cell);
        }
    }

    let mut killed = [false, false];
    for (index, head) in heads.iter().enumerate() {
        let Some(head) = head else { continue };
        let own = &state.actors[index];
        let other = &state.actors[1 - index];
        let hit_self = own.body.iter().skip(1).any(|c| c == head);
        let hit_other = other.occupies(*head);
        killed[index] = hit_self || hit_other;
    }
    for (actor, killed) in state.actors.iter_mut().zip(killed) {
        if killed {
            actor.alive = false;
        }
    }

    state.resupply_food(rng);

    state.outcome = decide(&state.actors);
    state.outcome
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use stakegrid_protocol::{Heading, Seat};

    use super::*;
    use crate::{Actor, GridSize, MatchConfig};

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn cells(coords: &[(u16, u16)]) -> Vec<Cell> {
        coords.iter().map(|&(x, y)| Cell::new(x, y)).collect()
    }

    /// A 10×10 board with no food top-up, so tests control food exactly.
    fn board(first: Actor, second: Actor, food: &[(u16, u16)]) -> MatchState {
        MatchState {
            config: MatchConfig {
                grid: GridSize::new(10, 10),
                min_food: 0,
                initial_length: 3,
            },
            actors: [first, second],
            food: cells(food).into_iter().collect::<BTreeSet<_>>(),
            tick: 0,
            outcome: Outcome::Ongoing,
        }
    }

    /// An actor parked far away from the action, moving harmlessly.
    fn bystander() -> Actor {
        Actor::new(cells(&[(5, 8), (4, 8), (3, 8)]), Heading::Right)
    }

    #[test]
    fn test_advance_moves_head_and_keeps_length() {
        let mut state = board(
            Actor::new(cells(&[(3, 2), (2, 2), (1, 2)]), Heading::Right),
            bystander(),
            &[],
        );

        let outcome = advance(&mut state, &mut rng());

        assert_eq!(outcome, Outcome::Ongoing);
        assert_eq!(state.tick, 1);
        let first = state.actor(Seat::First);
        assert_eq!(first.body.iter().copied().collect::<Vec<_>>(), cells(&[(4, 2), (3, 2), (2, 2)]));
    }

    #[test]
    fn test_advance_wraps_from_last_column_to_first() {
        let mut state = board(
            Actor::new(cells(&[(9, 2), (8, 2), (7, 2)]), Heading::Right),
            bystander(),
            &[],
        );

        advance(&mut state, &mut rng());

        assert_eq!(state.actor(Seat::First).head(), Cell::new(0, 2));
        assert!(state.actor(Seat::First).alive);
    }

    #[test]
    fn test_advance_eating_grows_by_one_and_scores_one() {
        let mut state = board(
            Actor::new(cells(&[(3, 2), (2, 2), (1, 2)]), Heading::Right),
            bystander(),
            &[(4, 2)],
        );

        advance(&mut state, &mut rng());

        let first = state.actor(Seat::First);
        assert_eq!(first.score, 1);
        assert_eq!(first.len(), 4);
        assert_eq!(first.body.back().copied(), Some(Cell::new(1, 2)));
        assert!(state.food.is_empty());
    }

    #[test]
    fn test_advance_applies_queued_heading() {
        let mut state = board(
            Actor::new(cells(&[(3, 2), (2, 2), (1, 2)]), Heading::Right),
            bystander(),
            &[],
        );
        state.queue_heading(Seat::First, Heading::Down);

        advance(&mut state, &mut rng());

        let first = state.actor(Seat::First);
        assert_eq!(first.heading, Heading::Down);
        assert_eq!(first.head(), Cell::new(3, 3));
    }

    #[test]
    fn test_advance_reversal_causes_self_collision() {
        let mut state = board(
            Actor::new(cells(&[(3, 2), (2, 2), (1, 2)]), Heading::Right),
            bystander(),
            &[],
        );
        state.queue_heading(Seat::First, Heading::Left);

        let outcome = advance(&mut state, &mut rng());

        assert!(!state.actor(Seat::First).alive);
        assert_eq!(outcome, Outcome::Winner(Seat::Second));
    }

    #[test]
    fn test_advance_following_own_tail_is_safe() {
        // 2×2 loop: the head steps into the cell the tail leaves this tick.
        let mut state = board(
            Actor::new(cells(&[(1, 1), (1, 0), (0, 0), (0, 1)]), Heading::Left),
            bystander(),
            &[],
        );

        let outcome = advance(&mut state, &mut rng());

        assert_eq!(outcome, Outcome::Ongoing);
        assert_eq!(state.actor(Seat::First).head(), Cell::new(0, 1));
    }

    #[test]
    fn test_advance_growth_into_own_tail_is_fatal() {
        // Same loop, but food on the tail cell means the tail stays put.
        let mut state = board(
            Actor::new(cells(&[(1, 1), (1, 0), (0, 0), (0, 1)]), Heading::Left),
            bystander(),
            &[(0, 1)],
        );

        let outcome = advance(&mut state, &mut rng());

        assert!(!state.actor(Seat::First).alive);
        assert_eq!(outcome, Outcome::Winner(Seat::Second));
    }

    #[test]
    fn test_advance_cross_collision_into_body_kills_mover_only() {
        // First moves down into the second's body segment.
        let mut state = board(
            Actor::new(cells(&[(4, 1), (4, 0), (4, 9)]), Heading::Down),
            Actor::new(cells(&[(6, 2), (5, 2), (4, 2), (3, 2)]), Heading::Right),
            &[],
        );

        let outcome = advance(&mut state, &mut rng());

        assert!(!state.actor(Seat::First).alive);
        assert!(state.actor(Seat::Second).alive);
        assert_eq!(outcome, Outcome::Winner(Seat::Second));
    }

    #[test]
    fn test_advance_cross_collision_uses_post_move_body() {
        // First steps into the cell the second's tail vacates: safe.
        let mut state = board(
            Actor::new(cells(&[(2, 1), (2, 0), (2, 9)]), Heading::Down),
            Actor::new(cells(&[(4, 2), (3, 2), (2, 2)]), Heading::Right),
            &[],
        );

        let outcome = advance(&mut state, &mut rng());

        assert_eq!(outcome, Outcome::Ongoing);
        assert_eq!(state.actor(Seat::First).head(), Cell::new(2, 2));
    }

    #[test]
    fn test_advance_head_to_head_same_cell_is_tie() {
        let mut state = board(
            Actor::new(cells(&[(3, 5), (2, 5), (1, 5)]), Heading::Right),
            Actor::new(cells(&[(5, 5), (6, 5), (7, 5)]), Heading::Left),
            &[],
        );

        let outcome = advance(&mut state, &mut rng());

        assert_eq!(state.actor(Seat::First).head(), Cell::new(4, 5));
        assert_eq!(state.actor(Seat::Second).head(), Cell::new(4, 5));
        assert!(!state.actor(Seat::First).alive);
        assert!(!state.actor(Seat::Second).alive);
        assert_eq!(outcome, Outcome::Tie);
    }

    #[test]
    fn test_advance_heads_passing_through_each_other_is_tie() {
        let mut state = board(
            Actor::new(cells(&[(4, 5), (3, 5), (2, 5)]), Heading::Right),
            Actor::new(cells(&[(5, 5), (6, 5), (7, 5)]), Heading::Left),
            &[],
        );

        let outcome = advance(&mut state, &mut rng());

        assert_eq!(outcome, Outcome::Tie);
    }

    #[test]
    fn test_advance_double_kill_ignores_scores() {
        let mut first = Actor::new(cells(&[(3, 5), (2, 5), (1, 5)]), Heading::Right);
        first.score = 9;
        let second = Actor::new(cells(&[(5, 5), (6, 5), (7, 5)]), Heading::Left);
        let mut state = board(first, second, &[]);

        let outcome = advance(&mut state, &mut rng());

        assert_eq!(outcome, Outcome::Tie);
    }

    #[test]
    fn test_advance_both_heads_on_same_food_both_score() {
        let mut state = board(
            Actor::new(cells(&[(3, 5), (2, 5), (1, 5)]), Heading::Right),
            Actor::new(cells(&[(5, 5), (6, 5), (7, 5)]), Heading::Left),
            &[(4, 5)],
        );

        let outcome = advance(&mut state, &mut rng());

        assert_eq!(outcome, Outcome::Tie);
        assert_eq!(state.scores(), [1, 1]);
        assert!(state.food.is_empty());
    }

    #[test]
    fn test_advance_resupplies_food_to_minimum() {
        let mut state = board(
            Actor::new(cells(&[(3, 2), (2, 2), (1, 2)]), Heading::Right),
            bystander(),
            &[(4, 2)],
        );
        state.config.min_food = 4;

        advance(&mut state, &mut rng());

        assert_eq!(state.food.len(), 4);
        assert!(state.food.iter().all(|c| !state.is_occupied(*c)));
    }

    #[test]
    fn test_advance_after_result_is_noop() {
        let mut state = board(
            Actor::new(cells(&[(3, 5), (2, 5), (1, 5)]), Heading::Right),
            Actor::new(cells(&[(5, 5), (6, 5), (7, 5)]), Heading::Left),
            &[],
        );
        advance(&mut state, &mut rng());
        let frozen = state.clone();

        let outcome = advance(&mut state, &mut rng());

        assert_eq!(outcome, Outcome::Tie);
        assert_eq!(state, frozen);
    }
}
