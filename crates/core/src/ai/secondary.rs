//! Movement-only search: where to walk when no combat action exists.
//! This module exists to keep destination scanning, view-range banding, and
//! the retreat heuristic out of the controller.
//! It does not own combat scoring or command emission.

use std::collections::{BTreeSet, VecDeque};

use tracing::trace;

use super::pathfinding::{PathOptions, astar_path, manhattan, travel_along};
use super::targets::{self, Affiliation};
use crate::rules::Rules;
use crate::state::{ItemKind, Unit, World};
use crate::types::*;

/// Resumable scan over movement destinations for one Interact or MoveTo
/// behaviour. Each `advance` call paths to one candidate; when every banded
/// candidate has been scanned an unlimited-view behaviour widens once to the
/// whole board before giving up.
pub struct MovementSearch {
    unit: UnitId,
    action: AiAction,
    view: ViewRange,
    /// Region candidates must be stood on exactly; everything else may
    /// settle for an adjacent tile.
    adjacent_ok: bool,
    all_targets: Vec<Pos>,
    available: VecDeque<Pos>,
    scanned: BTreeSet<Pos>,
    widened: bool,
    best_score: f32,
    best_target: Option<Pos>,
    best_path: Option<Vec<Pos>>,
    result: Option<Pos>,
    done: bool,
}

impl MovementSearch {
    pub fn new(
        world: &World,
        rules: &dyn Rules,
        unit_id: UnitId,
        behaviour: &Behaviour,
    ) -> Self {
        let mut search = Self {
            unit: unit_id,
            action: behaviour.action,
            view: behaviour.view_range,
            adjacent_ok: !matches!(behaviour.target, AiTarget::Event(_)),
            all_targets: Vec::new(),
            available: VecDeque::new(),
            scanned: BTreeSet::new(),
            widened: false,
            best_score: 0.0,
            best_target: None,
            best_path: None,
            result: None,
            done: false,
        };

        let Some(unit) = world.units.get(unit_id) else {
            search.done = true;
            return search;
        };
        let Some(pos) = unit.pos else {
            search.done = true;
            return search;
        };

        search.all_targets = match &behaviour.target {
            AiTarget::Event(sub_id) => targets::region_positions(world, rules, unit, sub_id),
            AiTarget::Position(PositionGoal::Starting) => unit.spawn_pos.into_iter().collect(),
            AiTarget::Position(PositionGoal::At(goal)) => vec![*goal],
            AiTarget::Enemy | AiTarget::Ally | AiTarget::Unit => {
                let affiliation = targets::affiliation_for(&behaviour.target)
                    .unwrap_or(Affiliation::Enemy);
                targets::unit_positions(world, unit, affiliation, behaviour.target_spec.as_ref())
            }
            AiTarget::None => Vec::new(),
        };

        // A guarding unit never roams, whatever the behaviour says.
        if behaviour.view_range == ViewRange::Guard {
            search.done = true;
            return search;
        }

        let movement = rules.movement_points(world, unit);
        let reach = targets::potential_max_range(world, rules, unit);
        // Unlimited view still scans the double-move band first and only
        // widens to the whole board when that band comes up empty.
        let band = targets::view_band_limit(behaviour.view_range, movement, reach)
            .unwrap_or(2 * movement + reach);
        search.available = search
            .all_targets
            .iter()
            .copied()
            .filter(|&candidate| manhattan(pos, candidate) <= band)
            .collect();
        search
    }

    /// Paths to and scores one candidate. Returns true once the search has
    /// settled on a result (which may be `None`).
    pub fn advance(&mut self, world: &World, rules: &dyn Rules) -> bool {
        if self.done {
            return true;
        }
        let Some(unit) = world.units.get(self.unit) else {
            self.done = true;
            return true;
        };
        let (Some(pos), Some(grid)) = (unit.pos, world.grid_for(unit)) else {
            self.done = true;
            return true;
        };

        let Some(candidate) = self.available.pop_front() else {
            if self.best_path.is_none() && self.view == ViewRange::Unlimited && !self.widened {
                self.widen();
                return self.done;
            }
            if let Some(path) = self.best_path.take() {
                let budget = rules.movement_points(world, unit);
                let can_stop = |p: Pos| !targets::occupied_by_other(world, unit, p);
                self.result = Some(travel_along(grid, pos, &path, budget, &can_stop));
            }
            self.done = true;
            return true;
        };

        self.scanned.insert(candidate);
        let opts = PathOptions { adjacent_ok: self.adjacent_ok, limit: None };
        let can_pass = targets::path_passable(world, unit, false);
        if let Some(path) = astar_path(grid, pos, candidate, opts, &can_pass) {
            let score = self.score(world, rules, unit, candidate, &path);
            trace!(unit = %unit.nid, ?candidate, score, "movement candidate");
            if score > self.best_score {
                self.best_score = score;
                self.best_target = Some(candidate);
                self.best_path = Some(path);
            }
        }
        false
    }

    /// The destination tile to move to, once the search is done. `None`
    /// means this behaviour produced nothing.
    pub fn result(&self) -> Option<Pos> {
        self.result
    }

    /// The candidate the chosen destination walks toward.
    pub fn best_target(&self) -> Option<Pos> {
        self.best_target
    }

    fn widen(&mut self) {
        self.widened = true;
        self.available = self
            .all_targets
            .iter()
            .copied()
            .filter(|candidate| !self.scanned.contains(candidate))
            .collect();
    }

    /// Nearer candidates score higher on a log scale; attack-motivated moves
    /// additionally favour targets the unit could actually hurt.
    fn score(
        &self,
        world: &World,
        rules: &dyn Rules,
        unit: &Unit,
        candidate: Pos,
        path: &[Pos],
    ) -> f32 {
        let length = path.len().max(1) as f32;
        let mut total = 60.0 * (1.0 - length.ln() / 4.0).max(0.0);

        if self.action == AiAction::Attack
            && let Some(defender) = world.unit_at(candidate)
            && targets::is_enemy(unit, defender)
        {
            let mut damage = 0.0f32;
            let mut status = 0.0f32;
            for item in unit.items.iter().filter_map(|id| world.item(*id)) {
                if item.kind != ItemKind::Weapon
                    || item.no_ai
                    || !rules.is_usable(world, unit, item)
                {
                    continue;
                }
                let fraction = (rules.expected_damage(world, unit, defender, item)
                    / defender.max_hp.max(1) as f32)
                    .clamp(0.0, 1.0);
                let accuracy = rules.expected_hit(world, unit, defender, item).clamp(0.0, 1.0);
                damage = damage.max(fraction * accuracy);
                if item.inflicts_status.is_some() {
                    status = status.max(accuracy);
                }
            }
            if damage <= 0.0 && status <= 0.0 {
                return 0.0;
            }
            let weakness = 1.0 - defender.hp.max(0) as f32 / defender.max_hp.max(1) as f32;
            total += 15.0 * damage + 15.0 * weakness + 10.0 * status;
        }

        total / 100.0
    }
}

/// Destination for a MoveAwayFrom behaviour: the legal stopping tile whose
/// direction from the unit best opposes the centroid of the visible threats.
/// `None` when no threat is in view, so the behaviour list can move on.
pub fn retreat_destination(
    world: &World,
    rules: &dyn Rules,
    unit: &Unit,
    behaviour: &Behaviour,
) -> Option<Pos> {
    let pos = unit.pos?;
    let affiliation =
        targets::affiliation_for(&behaviour.target).unwrap_or(Affiliation::Enemy);
    let movement = rules.movement_points(world, unit);
    let reach = targets::potential_max_range(world, rules, unit);
    let band = targets::view_band_limit(behaviour.view_range, movement, reach);

    let threats: Vec<Pos> =
        targets::unit_positions(world, unit, affiliation, behaviour.target_spec.as_ref())
            .into_iter()
            .filter(|&threat| band.is_none_or(|limit| manhattan(pos, threat) <= limit))
            .collect();
    if threats.is_empty() {
        return None;
    }

    let centroid_y = threats.iter().map(|t| t.y as f32).sum::<f32>() / threats.len() as f32;
    let centroid_x = threats.iter().map(|t| t.x as f32).sum::<f32>() / threats.len() as f32;
    let away = normalize(pos.y as f32 - centroid_y, pos.x as f32 - centroid_x);

    let mut best = pos;
    let mut best_dot = f32::NEG_INFINITY;
    for tile in targets::true_valid_moves(world, rules, unit) {
        let step = normalize((tile.y - pos.y) as f32, (tile.x - pos.x) as f32);
        let dot = step.0 * away.0 + step.1 * away.1;
        if dot > best_dot {
            best_dot = dot;
            best = tile;
        }
    }
    Some(best)
}

fn normalize(y: f32, x: f32) -> (f32, f32) {
    let magnitude = (y * y + x * x).sqrt();
    if magnitude == 0.0 { (0.0, 0.0) } else { (y / magnitude, x / magnitude) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::test_support::*;
    use crate::rules::SimpleRules;
    use crate::state::{RegionKind, TriggerRegion};

    fn run_to_completion(search: &mut MovementSearch, world: &World) -> Option<Pos> {
        let rules = SimpleRules;
        let mut guard = 0;
        while !search.advance(world, &rules) {
            guard += 1;
            assert!(guard < 10_000, "movement search must terminate");
        }
        search.result()
    }

    #[test]
    fn move_to_position_walks_its_full_budget_toward_the_goal() {
        let mut world = open_world(12, 12);
        let me = add_unit(&mut world, "me", Team::Enemy, Pos { y: 1, x: 1 });

        let behaviour = Behaviour::new(
            AiAction::MoveTo,
            AiTarget::Position(PositionGoal::At(Pos { y: 1, x: 10 })),
            ViewRange::Unlimited,
        );
        let mut search = MovementSearch::new(&world, &SimpleRules, me, &behaviour);
        let result = run_to_completion(&mut search, &world);

        assert_eq!(result, Some(Pos { y: 1, x: 5 }), "four movement points spent straight east");
        assert_eq!(search.best_target(), Some(Pos { y: 1, x: 10 }));
    }

    #[test]
    fn occupied_position_goal_stops_adjacent() {
        let mut world = open_world(12, 12);
        let me = add_unit(&mut world, "me", Team::Enemy, Pos { y: 5, x: 1 });
        // Someone is squatting on the rally point.
        add_unit(&mut world, "squatter", Team::Player, Pos { y: 5, x: 5 });

        let behaviour = Behaviour::new(
            AiAction::MoveTo,
            AiTarget::Position(PositionGoal::At(Pos { y: 5, x: 5 })),
            ViewRange::Unlimited,
        );
        let mut search = MovementSearch::new(&world, &SimpleRules, me, &behaviour);
        let result = run_to_completion(&mut search, &world);

        assert_eq!(result, Some(Pos { y: 5, x: 4 }), "adjacent arrival beside the blocked goal");
        assert_eq!(search.best_target(), Some(Pos { y: 5, x: 5 }));
    }

    #[test]
    fn event_candidates_come_only_from_matching_active_regions() {
        let mut world = open_world(10, 10);
        let me = add_unit(&mut world, "me", Team::Enemy, Pos { y: 5, x: 2 });
        world.regions.push(TriggerRegion {
            kind: RegionKind::Event,
            sub_id: "door".to_string(),
            guard: None,
            positions: vec![Pos { y: 5, x: 5 }],
        });
        world.regions.push(TriggerRegion {
            kind: RegionKind::Event,
            sub_id: "door".to_string(),
            guard: Some("false".to_string()),
            positions: vec![Pos { y: 5, x: 3 }],
        });

        let behaviour = Behaviour::new(
            AiAction::Interact,
            AiTarget::Event("door".to_string()),
            ViewRange::Unlimited,
        );
        let mut search = MovementSearch::new(&world, &SimpleRules, me, &behaviour);
        let result = run_to_completion(&mut search, &world);

        assert_eq!(result, Some(Pos { y: 5, x: 5 }), "the guarded-off tile is never considered");
    }

    #[test]
    fn single_move_view_ignores_candidates_beyond_the_band() {
        let mut world = open_world(20, 20);
        let me = add_unit(&mut world, "me", Team::Enemy, Pos { y: 10, x: 2 });
        arm_with_sword(&mut world, me);
        add_unit(&mut world, "far", Team::Player, Pos { y: 10, x: 18 });

        let behaviour =
            Behaviour::new(AiAction::Attack, AiTarget::Enemy, ViewRange::SingleMove);
        let mut search = MovementSearch::new(&world, &SimpleRules, me, &behaviour);
        assert_eq!(run_to_completion(&mut search, &world), None);
    }

    #[test]
    fn unlimited_view_widens_once_when_the_near_band_is_empty() {
        let mut world = open_world(20, 20);
        let me = add_unit(&mut world, "me", Team::Enemy, Pos { y: 10, x: 2 });
        arm_with_sword(&mut world, me);
        // Double-move band is 2 * 4 + 1 = 9 tiles; this enemy sits outside it.
        add_unit(&mut world, "far", Team::Player, Pos { y: 10, x: 18 });

        let behaviour =
            Behaviour::new(AiAction::Attack, AiTarget::Enemy, ViewRange::Unlimited);
        let mut search = MovementSearch::new(&world, &SimpleRules, me, &behaviour);
        let result = run_to_completion(&mut search, &world);

        assert_eq!(result, Some(Pos { y: 10, x: 6 }), "full budget spent toward the far enemy");
        assert_eq!(search.best_target(), Some(Pos { y: 10, x: 18 }));
    }

    #[test]
    fn guard_view_never_produces_a_movement() {
        let mut world = open_world(10, 10);
        let me = add_unit(&mut world, "me", Team::Enemy, Pos { y: 5, x: 5 });
        arm_with_sword(&mut world, me);
        add_unit(&mut world, "near", Team::Player, Pos { y: 5, x: 8 });

        let behaviour = Behaviour::new(AiAction::Attack, AiTarget::Enemy, ViewRange::Guard);
        let mut search = MovementSearch::new(&world, &SimpleRules, me, &behaviour);
        assert_eq!(run_to_completion(&mut search, &world), None);
    }

    #[test]
    fn attack_motivated_movement_prefers_the_target_it_can_hurt() {
        let mut world = open_world(20, 20);
        let me = add_unit(&mut world, "me", Team::Enemy, Pos { y: 10, x: 10 });
        arm_with_sword(&mut world, me);
        let armored = add_unit(&mut world, "armored", Team::Player, Pos { y: 10, x: 17 });
        world.units[armored].defense = 99;
        add_unit(&mut world, "soft", Team::Player, Pos { y: 17, x: 10 });

        let behaviour =
            Behaviour::new(AiAction::Attack, AiTarget::Enemy, ViewRange::Unlimited);
        let mut search = MovementSearch::new(&world, &SimpleRules, me, &behaviour);
        let result = run_to_completion(&mut search, &world);

        assert_eq!(search.best_target(), Some(Pos { y: 17, x: 10 }));
        assert_eq!(result, Some(Pos { y: 14, x: 10 }));
    }

    #[test]
    fn retreat_moves_directly_away_from_the_threat_centroid() {
        let mut world = open_world(12, 12);
        let me = add_unit(&mut world, "me", Team::Enemy, Pos { y: 4, x: 4 });
        add_unit(&mut world, "a", Team::Player, Pos { y: 4, x: 6 });
        add_unit(&mut world, "b", Team::Player, Pos { y: 6, x: 4 });

        let behaviour =
            Behaviour::new(AiAction::MoveAwayFrom, AiTarget::Enemy, ViewRange::Unlimited);
        let me_ref = world.units[me].clone();
        let dest = retreat_destination(&world, &SimpleRules, &me_ref, &behaviour);

        assert_eq!(dest, Some(Pos { y: 2, x: 2 }), "diagonal flight from the (5, 5) centroid");
    }

    #[test]
    fn retreat_without_visible_threats_yields_nothing() {
        let mut world = open_world(30, 30);
        let me = add_unit(&mut world, "me", Team::Enemy, Pos { y: 4, x: 4 });
        arm_with_sword(&mut world, me);
        add_unit(&mut world, "far", Team::Player, Pos { y: 28, x: 28 });

        let behaviour =
            Behaviour::new(AiAction::MoveAwayFrom, AiTarget::Enemy, ViewRange::DoubleMove);
        let me_ref = world.units[me].clone();
        assert_eq!(retreat_destination(&world, &SimpleRules, &me_ref, &behaviour), None);
    }
}
