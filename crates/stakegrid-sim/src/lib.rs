//! Simulation engine for Stakegrid matches.
//!
//! A match is two actors (snakes) on a toroidal grid with a minimum
//! number of food cells. [`advance`] moves the match forward exactly one
//! tick; it performs no I/O and never fails. Randomness (food placement)
//! is injected by the caller, so a seeded RNG replays a match exactly.
//!
//! # Key types
//!
//! - [`MatchState`]: the full simulation state of one match
//! - [`Actor`]: one participant's body, heading, and score
//! - [`MatchConfig`] / [`GridSize`]: board dimensions and food count
//! - [`advance`]: the per-tick transition function

mod actor;
mod config;
mod engine;
mod state;

pub use actor::Actor;
pub use config::{GridSize, MatchConfig};
pub use engine::advance;
pub use state::MatchState;
