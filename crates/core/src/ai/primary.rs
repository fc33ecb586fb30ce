//! Combat action search: enumerates item x target x destination triples.
//! This module exists to keep offensive/support candidate scoring separate
//! from the controller's state machine.
//! It does not own pathfinding or command emission.

use std::collections::BTreeSet;

use tracing::trace;

use super::pathfinding::manhattan;
use super::targets::{self, Affiliation};
use crate::rules::{Rules, UtilityOverride};
use crate::state::{Item, ItemKind, Unit, World};
use crate::types::*;

/// Resumable enumeration of every (usable item, reachable destination,
/// valid target) triple for one Attack or Support behaviour. All range and
/// targeting predicates are evaluated against hypothetical destinations;
/// the real unit is never moved or re-equipped during the search.
pub struct CombatSearch {
    unit: UnitId,
    action: AiAction,
    target_spec: Option<TargetSpec>,
    offense_bias: f32,
    orig_pos: Pos,
    items: Vec<ItemId>,
    valid_moves: Vec<Pos>,
    all_target_positions: Vec<Pos>,
    valid_targets: Vec<Pos>,
    possible_moves: Vec<Pos>,
    item_index: usize,
    target_index: usize,
    move_index: usize,
    best_target: Option<Pos>,
    best_position: Option<Pos>,
    best_item: Option<ItemId>,
    max_score: f32,
}

impl CombatSearch {
    pub fn new(
        world: &World,
        rules: &dyn Rules,
        unit_id: UnitId,
        valid_moves: BTreeSet<Pos>,
        behaviour: &Behaviour,
        offense_bias: f32,
    ) -> Self {
        let mut search = Self {
            unit: unit_id,
            action: behaviour.action,
            target_spec: behaviour.target_spec.clone(),
            offense_bias: offense_bias.max(0.0),
            orig_pos: Pos { y: 0, x: 0 },
            items: Vec::new(),
            valid_moves: valid_moves.into_iter().collect(),
            all_target_positions: Vec::new(),
            valid_targets: Vec::new(),
            possible_moves: Vec::new(),
            item_index: 0,
            target_index: 0,
            move_index: 0,
            best_target: None,
            best_position: None,
            best_item: None,
            max_score: 0.0,
        };

        let Some(unit) = world.units.get(unit_id) else {
            return search;
        };
        let Some(pos) = unit.pos else {
            return search;
        };
        search.orig_pos = pos;

        search.items = unit
            .items
            .iter()
            .copied()
            .filter(|id| {
                world.item(*id).is_some_and(|item| {
                    !item.no_ai
                        && rules.is_usable(world, unit, item)
                        && match behaviour.action {
                            AiAction::Attack => item.kind == ItemKind::Weapon,
                            AiAction::Support => {
                                matches!(item.kind, ItemKind::Support | ItemKind::Usable)
                            }
                            _ => false,
                        }
                })
            })
            .collect();

        let affiliation = targets::affiliation_for(&behaviour.target).unwrap_or(
            match behaviour.action {
                AiAction::Support => Affiliation::Ally,
                _ => Affiliation::Enemy,
            },
        );
        search.all_target_positions =
            targets::unit_positions(world, unit, affiliation, search.target_spec.as_ref());

        if !search.items.is_empty() {
            search.refresh_targets(world, rules);
            search.refresh_moves(world, rules);
        }
        search
    }

    /// Advances the enumeration by one increment. Returns true once every
    /// triple has been considered; the winner (if any) is in `best`.
    pub fn advance(
        &mut self,
        world: &World,
        rules: &dyn Rules,
        utility_override: Option<&dyn UtilityOverride>,
    ) -> bool {
        let Some(unit) = world.units.get(self.unit) else {
            self.item_index = self.items.len();
            return true;
        };

        if self.item_index >= self.items.len() {
            return true;
        }

        if self.target_index >= self.valid_targets.len() {
            self.item_index += 1;
            self.target_index = 0;
            self.move_index = 0;
            if self.item_index < self.items.len() {
                self.refresh_targets(world, rules);
                self.refresh_moves(world, rules);
            }
            return false;
        }

        if self.move_index >= self.possible_moves.len() {
            self.target_index += 1;
            self.move_index = 0;
            if self.target_index < self.valid_targets.len() {
                self.refresh_moves(world, rules);
            }
            return false;
        }

        let destination = self.possible_moves[self.move_index];
        let target_pos = self.valid_targets[self.target_index];
        self.move_index += 1;

        let item_id = self.items[self.item_index];
        let Some(item) = world.item(item_id) else {
            return false;
        };

        let score =
            self.score_candidate(world, rules, utility_override, unit, item, destination, target_pos);
        trace!(
            unit = %unit.nid,
            item = %item.name,
            ?destination,
            ?target_pos,
            score,
            "combat candidate"
        );
        if score > self.max_score {
            self.max_score = score;
            self.best_target = Some(target_pos);
            self.best_position = Some(destination);
            self.best_item = Some(item_id);
        }
        false
    }

    /// `(target, destination, item)` of the winning candidate; target `None`
    /// means no viable action was found.
    pub fn best(&self) -> (Option<Pos>, Option<Pos>, Option<ItemId>) {
        (self.best_target, self.best_position, self.best_item)
    }

    pub fn best_score(&self) -> f32 {
        self.max_score
    }

    /// Targets attackable or supportable by the current item from at least
    /// one reachable destination. Zero-minimum-range items also target the
    /// unit itself on every reachable tile.
    fn refresh_targets(&mut self, world: &World, rules: &dyn Rules) {
        self.valid_targets.clear();
        let Some(unit) = world.units.get(self.unit) else {
            return;
        };
        let Some(item) = world.item(self.items[self.item_index]) else {
            return;
        };
        let (min, max) = rules.range_of(world, unit, item);

        for &target_pos in &self.all_target_positions {
            let affine = match item.kind {
                ItemKind::Weapon => {
                    world.unit_at(target_pos).is_some_and(|other| targets::is_enemy(unit, other))
                }
                ItemKind::Support | ItemKind::Usable => {
                    world.unit_at(target_pos).is_some_and(|other| targets::is_ally(unit, other))
                }
            };
            if !affine {
                continue;
            }
            let in_reach = self.valid_moves.iter().any(|&mv| {
                let d = manhattan(mv, target_pos);
                d >= min && d <= max
            });
            if in_reach {
                self.valid_targets.push(target_pos);
            }
        }

        if min == 0 {
            self.valid_targets.extend(self.valid_moves.iter().copied());
        }
        self.valid_targets.sort();
        self.valid_targets.dedup();
    }

    /// Reachable destinations from which the current target is in range of
    /// the current item.
    fn refresh_moves(&mut self, world: &World, rules: &dyn Rules) {
        self.possible_moves.clear();
        if self.target_index >= self.valid_targets.len() {
            return;
        }
        let Some(unit) = world.units.get(self.unit) else {
            return;
        };
        let Some(item) = world.item(self.items[self.item_index]) else {
            return;
        };
        let (min, max) = rules.range_of(world, unit, item);
        let target_pos = self.valid_targets[self.target_index];
        self.possible_moves = self
            .valid_moves
            .iter()
            .copied()
            .filter(|&mv| {
                let d = manhattan(mv, target_pos);
                d >= min && d <= max
            })
            .collect();
    }

    fn score_candidate(
        &self,
        world: &World,
        rules: &dyn Rules,
        utility_override: Option<&dyn UtilityOverride>,
        unit: &Unit,
        item: &Item,
        destination: Pos,
        target_pos: Pos,
    ) -> f32 {
        if let Some(hook) = utility_override {
            return self.override_score(world, rules, hook, unit, item, destination, target_pos);
        }
        match item.kind {
            ItemKind::Weapon => {
                self.weapon_score(world, rules, unit, item, destination, target_pos)
            }
            ItemKind::Support | ItemKind::Usable => {
                self.heal_score(world, rules, unit, item, destination, target_pos)
            }
        }
    }

    /// Host-provided hook: replaces the default formula entirely and is
    /// summed across everyone the item touches; enemies add utility, allies
    /// subtract it.
    fn override_score(
        &self,
        world: &World,
        rules: &dyn Rules,
        hook: &dyn UtilityOverride,
        unit: &Unit,
        item: &Item,
        destination: Pos,
        target_pos: Pos,
    ) -> f32 {
        let mut total = 0.0;
        if let Some(defender) = world.unit_at(target_pos) {
            let sign = if targets::is_enemy(unit, defender) { 1.0 } else { -1.0 };
            total += sign * hook.score(world, rules, unit, item, destination, defender);
        } else if target_pos == destination {
            // Zero-range self target: the unit itself, an ally.
            total -= hook.score(world, rules, unit, item, destination, unit);
        }
        for splashed in splash_victims(world, item, target_pos) {
            let sign = if targets::is_enemy(unit, splashed) { 1.0 } else { -1.0 };
            total += sign * hook.score(world, rules, unit, item, destination, splashed);
        }
        total
    }

    fn weapon_score(
        &self,
        world: &World,
        rules: &dyn Rules,
        unit: &Unit,
        item: &Item,
        destination: Pos,
        target_pos: Pos,
    ) -> f32 {
        let Some(defender) = world.unit_at(target_pos) else {
            return 0.0;
        };
        if !targets::is_enemy(unit, defender) {
            return 0.0;
        }

        let mut offense = 0.0f32;
        let mut status = 0.0f32;
        let mut defense = 1.0f32;

        let raw_damage = rules.expected_damage(world, unit, defender, item);
        let accuracy = rules.expected_hit(world, unit, defender, item).clamp(0.0, 1.0);
        let crit = rules.expected_crit(world, unit, defender, item).clamp(0.0, 1.0);
        let lethality = (raw_damage / defender.max_hp.max(1) as f32).clamp(0.0, 1.0);

        offense += if lethality * accuracy >= 1.0 { 3.0 } else { lethality * accuracy };
        offense += lethality * crit * accuracy;
        if item.inflicts_status.is_some() {
            status += accuracy;
        }

        // Counter-attack risk, discounted by the chance the target is
        // already dead before it swings.
        let first_strike = if lethality >= 1.0 { accuracy } else { 0.0 };
        if rules.can_counter(world, unit, destination, defender)
            && let Some(counter_weapon) = defender.equipped.and_then(|id| world.item(id))
        {
            let counter_frac = (rules.expected_damage(world, defender, unit, counter_weapon)
                / unit.max_hp.max(1) as f32)
                .clamp(0.0, 1.0);
            let counter_acc =
                rules.expected_hit(world, defender, unit, counter_weapon).clamp(0.0, 1.0);
            defense -= counter_frac * counter_acc * (1.0 - first_strike);
        }

        for splashed in splash_victims(world, item, target_pos) {
            if splashed.id == defender.id {
                continue;
            }
            let splash_damage = rules.expected_damage(world, unit, splashed, item);
            let splash_acc = rules.expected_hit(world, unit, splashed, item).clamp(0.0, 1.0);
            let splash_leth =
                (splash_damage / splashed.max_hp.max(1) as f32).clamp(0.0, 1.0);
            if targets::is_enemy(unit, splashed) {
                offense +=
                    if splash_leth * splash_acc >= 1.0 { 3.0 } else { splash_leth * splash_acc };
                if item.inflicts_status.is_some() {
                    status += splash_acc;
                }
            } else {
                offense -= splash_leth * splash_acc;
                if item.inflicts_status.is_some() {
                    status -= splash_acc;
                }
            }
        }

        if offense <= 0.0 && status <= 0.0 {
            let permitted = (accuracy <= 0.0 && world.flags.attack_on_zero_hit)
                || (raw_damage <= 0.0 && world.flags.attack_on_zero_damage);
            if !permitted {
                return 0.0;
            }
        }

        let max_distance = rules.movement_points(world, unit) as f32;
        let distance_term = if max_distance > 0.0 {
            (max_distance - manhattan(destination, self.orig_pos) as f32) / max_distance
        } else {
            1.0
        };

        let offense_weight = self.offense_bias / (self.offense_bias + 1.0);
        let defense_weight = 1.0 - offense_weight;
        offense * offense_weight
            + status * 0.2
            + defense * defense_weight
            + distance_term * 0.01
    }

    /// Helpful-item utility: how much of the target's missing health the
    /// item restores, plus a nudge to stay away from enemies while doing it.
    fn heal_score(
        &self,
        world: &World,
        rules: &dyn Rules,
        unit: &Unit,
        item: &Item,
        destination: Pos,
        target_pos: Pos,
    ) -> f32 {
        // A zero-range self target is either the unit's own current tile
        // (occupied by itself) or a hypothetical destination (empty).
        let patient = match world.unit_at(target_pos) {
            Some(other) if other.id == unit.id => unit,
            Some(other) if targets::is_ally(unit, other) => other,
            Some(_) => return 0.0,
            None if target_pos == destination => unit,
            None => return 0.0,
        };

        let max_hp = patient.max_hp.max(1) as f32;
        let missing = (patient.max_hp - patient.hp).max(0) as f32;
        let help = (missing / max_hp).clamp(0.0, 1.0);
        if help <= 0.0 {
            return 0.0;
        }
        let heal = rules.expected_heal(world, unit, patient, item).min(missing).max(0.0) / max_hp;
        let keep_away =
            (targets::distance_to_closest_enemy(world, unit, destination) as f32).ln() / 4.0;

        let score = help * 0.4 + heal * 0.4 + keep_away * 0.1;
        // Consumables are a last resort relative to dedicated support items.
        if item.kind == ItemKind::Usable { score / 2.0 } else { score }
    }
}

fn splash_victims<'w>(world: &'w World, item: &Item, target_pos: Pos) -> Vec<&'w Unit> {
    if item.splash_radius == 0 {
        return Vec::new();
    }
    world
        .units
        .values()
        .filter(|other| {
            other
                .pos
                .is_some_and(|p| p != target_pos && manhattan(p, target_pos) <= item.splash_radius)
        })
        .collect()
}
