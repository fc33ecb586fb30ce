//! Computer-controlled combatant decision engine.
//! This file wires the controller, the two search strategies, and the
//! pathfinding primitives together.

mod controller;
mod pathfinding;
mod primary;
mod secondary;
mod targets;

#[cfg(test)]
mod test_support;

pub use controller::{AiController, DEFAULT_THINK_BUDGET, FRAME_PERIOD};
pub use pathfinding::{PathOptions, astar_path, los_path, reachable_tiles, travel_along};
pub use primary::CombatSearch;
pub use secondary::{MovementSearch, retreat_destination};
pub use targets::true_valid_moves;
