//! Shared fixtures for the `ai` submodule test suites.
//! This module exists to avoid repeating world, unit, and item setup across
//! many tests. It does not own production decision logic.

use crate::state::{Item, Unit, World};
use crate::types::*;

pub(super) fn open_world(width: usize, height: usize) -> World {
    World::new(width, height)
}

pub(super) fn add_unit(world: &mut World, nid: &str, team: Team, pos: Pos) -> UnitId {
    world.add_unit(Unit::new(nid, team, pos))
}

pub(super) fn arm_with_sword(world: &mut World, unit: UnitId) -> ItemId {
    let sword = world.add_item(Item::weapon("iron sword", 6, 90, 1, 1));
    world.give_item(unit, sword);
    sword
}

pub(super) fn arm_with_staff(world: &mut World, unit: UnitId, heal: i32) -> ItemId {
    let staff = world.add_item(Item::support("heal staff", heal, 1, 1));
    world.give_item(unit, staff);
    staff
}

pub(super) fn install_profile(
    world: &mut World,
    unit: UnitId,
    profile_id: &str,
    behaviours: Vec<Behaviour>,
) {
    world.profiles.insert(
        profile_id.to_string(),
        AiProfile { priority: 10, offense_bias: 2.0, behaviours },
    );
    world.units[unit].ai = profile_id.to_string();
}
