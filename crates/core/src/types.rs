use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    pub struct UnitId;
    pub struct ItemId;
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Pos {
    pub y: i32,
    pub x: i32,
}

/// Player and Other fight on one side, Enemy and Enemy2 on the other.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Team {
    Player,
    Other,
    Enemy,
    Enemy2,
}

impl Team {
    pub fn allied_with(self, other: Team) -> bool {
        self.alliance() == other.alliance()
    }

    fn alliance(self) -> u8 {
        match self {
            Team::Player | Team::Other => 0,
            Team::Enemy | Team::Enemy2 => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AiAction {
    None,
    Attack,
    Support,
    Interact,
    MoveTo,
    MoveAwayFrom,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionGoal {
    Starting,
    At(Pos),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AiTarget {
    None,
    Enemy,
    Ally,
    Unit,
    Position(PositionGoal),
    Event(String),
}

/// View-range policy for a behaviour. Negative sentinels in the persisted
/// form encode movement-budget-relative radii instead of literal tile counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum ViewRange {
    /// -1: zero movement, act only from the current tile.
    Guard,
    /// -2: one movement step plus maximum item range.
    SingleMove,
    /// -3: two movement steps plus maximum item range.
    DoubleMove,
    /// -4: unlimited, but the cheap tiers are scanned first.
    Unlimited,
    /// A literal taxicab radius.
    Within(u32),
}

impl From<i32> for ViewRange {
    fn from(raw: i32) -> Self {
        match raw {
            -1 => ViewRange::Guard,
            -2 => ViewRange::SingleMove,
            -3 => ViewRange::DoubleMove,
            -4 => ViewRange::Unlimited,
            r if r >= 0 => ViewRange::Within(r as u32),
            // Unknown sentinels resolve to the most conservative radius.
            _ => ViewRange::Guard,
        }
    }
}

impl From<ViewRange> for i32 {
    fn from(view: ViewRange) -> i32 {
        match view {
            ViewRange::Guard => -1,
            ViewRange::SingleMove => -2,
            ViewRange::DoubleMove => -3,
            ViewRange::Unlimited => -4,
            ViewRange::Within(r) => r as i32,
        }
    }
}

/// Predicate narrowing a candidate unit list. Absence means no filter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetSpec {
    Tag(String),
    Class(String),
    Name(String),
    Faction(String),
    Party(String),
    Id(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Behaviour {
    pub action: AiAction,
    pub target: AiTarget,
    pub view_range: ViewRange,
    #[serde(default)]
    pub target_spec: Option<TargetSpec>,
}

impl Behaviour {
    pub fn new(action: AiAction, target: AiTarget, view_range: ViewRange) -> Self {
        Self { action, target, view_range, target_spec: None }
    }

    pub fn with_spec(mut self, spec: TargetSpec) -> Self {
        self.target_spec = Some(spec);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AiProfile {
    pub priority: i32,
    pub offense_bias: f32,
    pub behaviours: Vec<Behaviour>,
}

/// Global "attack anyway" policy switches, read by the combat search when a
/// candidate has no expected hit or no expected damage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiFlags {
    pub attack_on_zero_hit: bool,
    pub attack_on_zero_damage: bool,
}

/// The outcome of one completed think cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Decision {
    pub destination: Option<Pos>,
    pub target: Option<Pos>,
    pub item: Option<ItemId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AiCommand {
    Move { unit: UnitId, destination: Pos, path: Vec<Pos> },
    Combat { unit: UnitId, target: Pos, item: ItemId },
    Wait { unit: UnitId },
}
