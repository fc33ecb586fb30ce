//! Oracle traits the decision engine consumes and reference implementations.
//! This module exists so combat math, item capabilities, and command side
//! effects stay outside the search code behind narrow contracts.
//! It does not own candidate enumeration or scoring policy.

use crate::state::{Item, ItemKind, TriggerRegion, Unit, World};
use crate::types::*;

/// A guard expression that could not be evaluated. Callers catch this and
/// treat the region as inactive; it never propagates out of the AI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardError {
    Malformed(String),
    UnknownIdentifier(String),
}

/// Range, combat-outcome, movement, and trigger oracles. Implemented by the
/// host game; `SimpleRules` is a stat-backed reference implementation.
pub trait Rules {
    fn is_usable(&self, world: &World, unit: &Unit, item: &Item) -> bool;

    /// Inclusive (min, max) taxicab range band of the item in this unit's hands.
    fn range_of(&self, world: &World, unit: &Unit, item: &Item) -> (u32, u32);

    fn movement_points(&self, world: &World, unit: &Unit) -> u32;

    fn expected_damage(&self, world: &World, attacker: &Unit, defender: &Unit, item: &Item)
    -> f32;

    /// Hit probability in [0, 1].
    fn expected_hit(&self, world: &World, attacker: &Unit, defender: &Unit, item: &Item) -> f32;

    /// Critical probability in [0, 1].
    fn expected_crit(&self, world: &World, attacker: &Unit, defender: &Unit, item: &Item) -> f32;

    fn expected_heal(&self, world: &World, healer: &Unit, target: &Unit, item: &Item) -> f32;

    /// Whether the defender could strike back at an attacker standing on
    /// `attacker_pos`.
    fn can_counter(&self, world: &World, attacker: &Unit, attacker_pos: Pos, defender: &Unit)
    -> bool;

    fn evaluate_guard(
        &self,
        world: &World,
        region: &TriggerRegion,
        unit: &Unit,
    ) -> Result<bool, GuardError>;
}

/// Stat-backed rules so the engine is exercisable without a host game.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimpleRules;

impl Rules for SimpleRules {
    fn is_usable(&self, _world: &World, unit: &Unit, item: &Item) -> bool {
        unit.items.contains(&item.id)
    }

    fn range_of(&self, _world: &World, _unit: &Unit, item: &Item) -> (u32, u32) {
        (item.min_range, item.max_range)
    }

    fn movement_points(&self, _world: &World, unit: &Unit) -> u32 {
        unit.movement
    }

    fn expected_damage(
        &self,
        _world: &World,
        _attacker: &Unit,
        defender: &Unit,
        item: &Item,
    ) -> f32 {
        (item.might - defender.defense).max(0) as f32
    }

    fn expected_hit(&self, _world: &World, _attacker: &Unit, defender: &Unit, item: &Item) -> f32 {
        ((item.hit - defender.avoid).clamp(0, 100) as f32) / 100.0
    }

    fn expected_crit(&self, _world: &World, _attacker: &Unit, _defender: &Unit, item: &Item) -> f32 {
        (item.crit.clamp(0, 100) as f32) / 100.0
    }

    fn expected_heal(&self, _world: &World, _healer: &Unit, _target: &Unit, item: &Item) -> f32 {
        item.heal.max(0) as f32
    }

    fn can_counter(
        &self,
        world: &World,
        _attacker: &Unit,
        attacker_pos: Pos,
        defender: &Unit,
    ) -> bool {
        let Some(weapon) = defender.equipped.and_then(|id| world.item(id)) else {
            return false;
        };
        if weapon.kind != ItemKind::Weapon {
            return false;
        }
        let Some(defender_pos) = defender.pos else {
            return false;
        };
        let (min, max) = self.range_of(world, defender, weapon);
        let distance =
            attacker_pos.y.abs_diff(defender_pos.y) + attacker_pos.x.abs_diff(defender_pos.x);
        distance >= min && distance <= max
    }

    fn evaluate_guard(
        &self,
        _world: &World,
        region: &TriggerRegion,
        unit: &Unit,
    ) -> Result<bool, GuardError> {
        let Some(guard) = region.guard.as_deref() else {
            return Ok(true);
        };
        let mut parts = guard.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some("true"), None, _) => Ok(true),
            (Some("false"), None, _) => Ok(false),
            (Some("hp_below"), Some(pct), None) => {
                let pct: i32 = pct
                    .parse()
                    .map_err(|_| GuardError::Malformed(guard.to_string()))?;
                Ok(unit.hp * 100 < unit.max_hp * pct)
            }
            (Some("tagged"), Some(tag), None) => Ok(unit.tags.iter().any(|t| t == tag)),
            (Some(other), _, _) => Err(GuardError::UnknownIdentifier(other.to_string())),
            (None, _, _) => Err(GuardError::Malformed(guard.to_string())),
        }
    }
}

/// Receives the concrete commands a completed decision translates into.
pub trait CommandSink {
    fn issue_move(&mut self, unit: UnitId, destination: Pos, path: Vec<Pos>);
    fn issue_combat(&mut self, unit: UnitId, target: Pos, item: ItemId);
    fn issue_wait(&mut self, unit: UnitId);
}

/// Sink that records commands in order, for tests and the CLI harness.
#[derive(Debug, Default)]
pub struct RecordedCommands {
    pub commands: Vec<AiCommand>,
}

impl CommandSink for RecordedCommands {
    fn issue_move(&mut self, unit: UnitId, destination: Pos, path: Vec<Pos>) {
        self.commands.push(AiCommand::Move { unit, destination, path });
    }

    fn issue_combat(&mut self, unit: UnitId, target: Pos, item: ItemId) {
        self.commands.push(AiCommand::Combat { unit, target, item });
    }

    fn issue_wait(&mut self, unit: UnitId) {
        self.commands.push(AiCommand::Wait { unit });
    }
}

/// Caller-supplied utility hook. When present it fully replaces the default
/// combat formula; the search sums it across splash targets, with enemies
/// contributing positively and allies negatively.
pub trait UtilityOverride {
    fn score(
        &self,
        world: &World,
        rules: &dyn Rules,
        unit: &Unit,
        item: &Item,
        destination: Pos,
        target: &Unit,
    ) -> f32;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RegionKind;

    fn region(guard: Option<&str>) -> TriggerRegion {
        TriggerRegion {
            kind: RegionKind::Event,
            sub_id: "lever".to_string(),
            guard: guard.map(str::to_string),
            positions: vec![Pos { y: 1, x: 1 }],
        }
    }

    #[test]
    fn guard_evaluator_handles_simple_predicates() {
        let world = World::new(4, 4);
        let mut unit = Unit::new("u", Team::Enemy, Pos { y: 0, x: 0 });
        unit.hp = 5;
        unit.max_hp = 20;
        unit.tags.push("Boss".to_string());
        let rules = SimpleRules;

        assert_eq!(rules.evaluate_guard(&world, &region(None), &unit), Ok(true));
        assert_eq!(rules.evaluate_guard(&world, &region(Some("true")), &unit), Ok(true));
        assert_eq!(rules.evaluate_guard(&world, &region(Some("false")), &unit), Ok(false));
        assert_eq!(rules.evaluate_guard(&world, &region(Some("hp_below 50")), &unit), Ok(true));
        assert_eq!(rules.evaluate_guard(&world, &region(Some("hp_below 10")), &unit), Ok(false));
        assert_eq!(rules.evaluate_guard(&world, &region(Some("tagged Boss")), &unit), Ok(true));
    }

    #[test]
    fn malformed_guards_are_errors_not_panics() {
        let world = World::new(4, 4);
        let unit = Unit::new("u", Team::Enemy, Pos { y: 0, x: 0 });
        let rules = SimpleRules;

        assert!(rules.evaluate_guard(&world, &region(Some("hp_below forty")), &unit).is_err());
        assert!(rules.evaluate_guard(&world, &region(Some("summon demons")), &unit).is_err());
    }

    #[test]
    fn counter_requires_an_equipped_weapon_in_range() {
        let mut world = World::new(8, 8);
        let attacker = world.add_unit(Unit::new("atk", Team::Enemy, Pos { y: 4, x: 2 }));
        let defender = world.add_unit(Unit::new("def", Team::Player, Pos { y: 4, x: 4 }));
        let rules = SimpleRules;

        let atk = world.units[attacker].clone();
        let def = world.units[defender].clone();
        assert!(!rules.can_counter(&world, &atk, Pos { y: 4, x: 3 }, &def));

        let sword = world.add_item(Item::weapon("sword", 4, 90, 1, 1));
        world.give_item(defender, sword);
        let def = world.units[defender].clone();
        assert!(rules.can_counter(&world, &atk, Pos { y: 4, x: 3 }, &def));
        assert!(!rules.can_counter(&world, &atk, Pos { y: 4, x: 2 }, &def));
    }
}
