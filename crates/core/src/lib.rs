pub mod ai;
pub mod rules;
pub mod state;
pub mod types;

pub use ai::{
    AiController, CombatSearch, DEFAULT_THINK_BUDGET, FRAME_PERIOD, MovementSearch, PathOptions,
    astar_path, los_path, reachable_tiles, retreat_destination, travel_along, true_valid_moves,
};
pub use rules::{CommandSink, GuardError, RecordedCommands, Rules, SimpleRules, UtilityOverride};
pub use state::{CostCell, CostGrid, Item, ItemKind, RegionKind, TriggerRegion, Unit, World};
pub use types::*;
