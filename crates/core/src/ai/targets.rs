//! Target candidate collection and affiliation predicates.
//! This module exists to keep unit filtering, view-range banding, and
//! blocking rules shared between the combat and movement searches.
//! It does not own search control flow or utility scoring.

use std::collections::BTreeSet;

use tracing::warn;

use super::pathfinding::{manhattan, reachable_tiles};
use crate::rules::Rules;
use crate::state::{RegionKind, Unit, World};
use crate::types::*;

pub(super) fn is_enemy(a: &Unit, b: &Unit) -> bool {
    a.id != b.id && !a.team.allied_with(b.team)
}

pub(super) fn is_ally(a: &Unit, b: &Unit) -> bool {
    a.id != b.id && a.team.allied_with(b.team)
}

pub(super) fn matches_spec(unit: &Unit, spec: &TargetSpec) -> bool {
    match spec {
        TargetSpec::Tag(tag) => unit.tags.iter().any(|t| t == tag),
        TargetSpec::Class(klass) => unit.klass == *klass,
        TargetSpec::Name(name) => unit.name == *name,
        TargetSpec::Faction(faction) => unit.faction == *faction,
        TargetSpec::Party(party) => unit.party == *party,
        TargetSpec::Id(nid) => unit.nid == *nid,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Affiliation {
    Enemy,
    Ally,
    Any,
}

/// How a behaviour's target kind reads the live unit list, if it does.
pub(super) fn affiliation_for(target: &AiTarget) -> Option<Affiliation> {
    match target {
        AiTarget::Enemy => Some(Affiliation::Enemy),
        AiTarget::Ally => Some(Affiliation::Ally),
        AiTarget::Unit => Some(Affiliation::Any),
        AiTarget::None | AiTarget::Position(_) | AiTarget::Event(_) => None,
    }
}

/// Positions of live units matching the affiliation and optional spec
/// filter, sorted (y, x) so enumeration order is deterministic.
pub(super) fn unit_positions(
    world: &World,
    me: &Unit,
    affiliation: Affiliation,
    spec: Option<&TargetSpec>,
) -> Vec<Pos> {
    let mut positions: Vec<Pos> = world
        .units
        .values()
        .filter(|other| match affiliation {
            Affiliation::Enemy => is_enemy(me, other),
            Affiliation::Ally => is_ally(me, other),
            Affiliation::Any => other.id != me.id,
        })
        .filter(|other| spec.is_none_or(|s| matches_spec(other, s)))
        .filter_map(|other| other.pos)
        .collect();
    positions.sort();
    positions
}

/// The farthest this unit could possibly strike with anything it carries.
pub(super) fn potential_max_range(world: &World, rules: &dyn Rules, unit: &Unit) -> u32 {
    unit.items
        .iter()
        .filter_map(|id| world.item(*id))
        .filter(|item| !item.no_ai && rules.is_usable(world, unit, item))
        .map(|item| rules.range_of(world, unit, item).1)
        .max()
        .unwrap_or(0)
}

/// Taxicab distance from `from` to the nearest enemy of `unit`, clamped to
/// at least 1. Defaults high when no enemy is on the board.
pub(super) fn distance_to_closest_enemy(world: &World, unit: &Unit, from: Pos) -> u32 {
    world
        .units
        .values()
        .filter(|other| is_enemy(unit, other))
        .filter_map(|other| other.pos)
        .map(|pos| manhattan(from, pos))
        .min()
        .unwrap_or(100)
        .max(1)
}

/// All positions of event regions whose sub-identifier matches and whose
/// guard holds for this unit. A guard that fails to evaluate is logged and
/// treated as false, never propagated.
pub(super) fn region_positions(
    world: &World,
    rules: &dyn Rules,
    unit: &Unit,
    wanted_sub_id: &str,
) -> Vec<Pos> {
    let mut positions = Vec::new();
    for region in &world.regions {
        if region.kind != RegionKind::Event || region.sub_id != wanted_sub_id {
            continue;
        }
        let active = match rules.evaluate_guard(world, region, unit) {
            Ok(active) => active,
            Err(err) => {
                warn!(unit = %unit.nid, sub_id = %region.sub_id, ?err, "region guard failed to evaluate");
                false
            }
        };
        if active {
            positions.extend(region.positions.iter().copied());
        }
    }
    positions.sort();
    positions.dedup();
    positions
}

/// Maximum candidate distance for a view-range policy, or `None` for
/// unlimited. `Guard` still sees out to its own item range for threat
/// filtering; the movement search separately refuses to roam in guard mode.
pub(super) fn view_band_limit(view: ViewRange, movement: u32, max_item_range: u32) -> Option<u32> {
    match view {
        ViewRange::Guard => Some(max_item_range),
        ViewRange::SingleMove => Some(movement + max_item_range),
        ViewRange::DoubleMove => Some(2 * movement + max_item_range),
        ViewRange::Unlimited => None,
        ViewRange::Within(radius) => Some(radius),
    }
}

pub(super) fn occupied_by_other(world: &World, me: &Unit, pos: Pos) -> bool {
    world.unit_at(pos).is_some_and(|other| other.id != me.id)
}

/// Traversal rule while measuring movement: allies may always be passed
/// through, enemies only with the pass-through capability. Nobody blocks
/// the unit's own tile.
pub(super) fn move_passable<'w>(world: &'w World, me: &'w Unit) -> impl Fn(Pos) -> bool + 'w {
    move |pos| match world.unit_at(pos) {
        None => true,
        Some(other) if other.id == me.id => true,
        Some(other) => is_ally(me, other) || me.pass_through,
    }
}

/// Traversal rule for point-to-point pathing. Enemies always block; allies
/// block only in ally-blocking mode.
pub(super) fn path_passable<'w>(
    world: &'w World,
    me: &'w Unit,
    ally_block: bool,
) -> impl Fn(Pos) -> bool + 'w {
    move |pos| match world.unit_at(pos) {
        None => true,
        Some(other) if other.id == me.id => true,
        Some(other) => {
            if is_ally(me, other) {
                !ally_block
            } else {
                me.pass_through
            }
        }
    }
}

/// Tiles the unit can legally end movement on this turn: the reachable set
/// under its budget minus tiles occupied by anyone else.
pub fn true_valid_moves(world: &World, rules: &dyn Rules, unit: &Unit) -> BTreeSet<Pos> {
    let (Some(pos), Some(grid)) = (unit.pos, world.grid_for(unit)) else {
        return BTreeSet::new();
    };
    let budget = rules.movement_points(world, unit);
    let can_pass = move_passable(world, unit);
    reachable_tiles(grid, pos, budget, &can_pass)
        .into_iter()
        .filter(|tile| !occupied_by_other(world, unit, *tile))
        .collect()
}
