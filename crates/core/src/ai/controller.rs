//! The per-unit decision state machine.
//! This module exists to walk a profile's behaviour list under a time box,
//! handing each behaviour to the right search and turning the winner into
//! commands. It does not own scoring or pathfinding.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use tracing::debug;

use super::pathfinding::{PathOptions, astar_path};
use super::primary::CombatSearch;
use super::secondary::{MovementSearch, retreat_destination};
use super::targets::{move_passable, true_valid_moves};
use crate::rules::{CommandSink, Rules, UtilityOverride};
use crate::state::World;
use crate::types::*;

/// Nominal display frame at 60fps.
pub const FRAME_PERIOD: Duration = Duration::from_millis(16);

/// Default per-call thinking allowance: half a frame, leaving the other half
/// for the host to render and animate.
pub const DEFAULT_THINK_BUDGET: Duration = Duration::from_millis(8);

enum ThinkState {
    Init,
    Primary(CombatSearch),
    Secondary(MovementSearch),
}

/// Drives one unit through its behaviour list until a decision lands, a
/// slice of search work at a time. Construct once per unit per turn (or call
/// `begin_turn`), call `think` until it reports completion, then `act`.
pub struct AiController {
    unit: UnitId,
    state: ThinkState,
    behaviour: Option<Behaviour>,
    behaviour_idx: usize,
    wrapped: bool,
    decision: Decision,
    did_something: bool,
    decided: bool,
    acted: bool,
    utility_override: Option<Box<dyn UtilityOverride>>,
}

impl AiController {
    pub fn new(unit: UnitId) -> Self {
        Self {
            unit,
            state: ThinkState::Init,
            behaviour: None,
            behaviour_idx: 0,
            wrapped: false,
            decision: Decision::default(),
            did_something: false,
            decided: false,
            acted: false,
            utility_override: None,
        }
    }

    /// Installs a scoring hook that replaces the default combat formula.
    pub fn set_utility_override(&mut self, hook: Box<dyn UtilityOverride>) {
        self.utility_override = Some(hook);
    }

    /// Resets for a fresh turn, keeping any installed override.
    pub fn begin_turn(&mut self) {
        self.state = ThinkState::Init;
        self.behaviour = None;
        self.behaviour_idx = 0;
        self.wrapped = false;
        self.decision = Decision::default();
        self.did_something = false;
        self.decided = false;
        self.acted = false;
    }

    /// Runs search increments until the budget is spent or a decision lands.
    /// Always makes at least one increment of progress, so even a zero
    /// budget cannot stall the turn. Returns true once decided.
    pub fn think(&mut self, world: &World, rules: &dyn Rules, budget: Duration) -> bool {
        if self.decided {
            return true;
        }
        let started = Instant::now();
        loop {
            self.step(world, rules);
            if self.decided {
                return true;
            }
            if started.elapsed() >= budget {
                return false;
            }
        }
    }

    /// Convenience for hosts without a frame loop: thinks to completion.
    pub fn decide(&mut self, world: &World, rules: &dyn Rules) -> Decision {
        while !self.think(world, rules, DEFAULT_THINK_BUDGET) {}
        self.decision.clone()
    }

    pub fn decision(&self) -> &Decision {
        &self.decision
    }

    /// Whether the decided-on behaviour actually does anything. False means
    /// every behaviour came up empty and the unit will simply wait.
    pub fn did_something(&self) -> bool {
        self.did_something
    }

    pub fn is_decided(&self) -> bool {
        self.decided
    }

    pub fn is_turn_complete(&self) -> bool {
        self.acted
    }

    /// Translates the decision into commands: a move when the destination
    /// differs from the current tile, then the combat action if one was
    /// chosen, else a wait. Returns `did_something`.
    pub fn act(&mut self, world: &World, rules: &dyn Rules, sink: &mut dyn CommandSink) -> bool {
        if !self.decided || self.acted {
            return false;
        }
        self.acted = true;
        let Some(unit) = world.units.get(self.unit) else {
            return false;
        };

        let mut moved = false;
        if let Some(destination) = self.decision.destination
            && unit.pos != Some(destination)
            && let Some(pos) = unit.pos
            && let Some(grid) = world.grid_for(unit)
        {
            let can_pass = move_passable(world, unit);
            if let Some(path) = astar_path(grid, pos, destination, PathOptions::default(), &can_pass)
            {
                sink.issue_move(self.unit, destination, path);
                moved = true;
            }
        }

        if let (Some(target), Some(item)) = (self.decision.target, self.decision.item) {
            sink.issue_combat(self.unit, target, item);
        } else if !moved {
            sink.issue_wait(self.unit);
        }
        self.did_something
    }

    /// One state transition: pull the next behaviour, advance the active
    /// search one increment, or settle the final decision.
    fn step(&mut self, world: &World, rules: &dyn Rules) {
        match &mut self.state {
            ThinkState::Init => self.start_next_behaviour(world, rules),
            ThinkState::Primary(search) => {
                if search.advance(world, rules, self.utility_override.as_deref()) {
                    let (target, destination, item) = search.best();
                    if target.is_some() {
                        self.decision = Decision { destination, target, item };
                        self.finish(world, true);
                    } else {
                        // No combat candidate scored; fall back to moving
                        // toward the same behaviour's targets.
                        let behaviour = self
                            .behaviour
                            .clone()
                            .expect("an active search always has a behaviour");
                        self.state = ThinkState::Secondary(MovementSearch::new(
                            world, rules, self.unit, &behaviour,
                        ));
                    }
                }
            }
            ThinkState::Secondary(search) => {
                if search.advance(world, rules) {
                    match search.result() {
                        Some(destination) => {
                            self.decision.destination = Some(destination);
                            self.finish(world, true);
                        }
                        None => self.state = ThinkState::Init,
                    }
                }
            }
        }
    }

    fn start_next_behaviour(&mut self, world: &World, rules: &dyn Rules) {
        let Some(unit) = world.units.get(self.unit) else {
            self.finish(world, false);
            return;
        };
        let Some(pos) = unit.pos else {
            self.finish(world, false);
            return;
        };
        let Some(profile) = world.profile_of(unit) else {
            self.finish(world, false);
            return;
        };

        loop {
            let Some(behaviour) = profile.behaviours.get(self.behaviour_idx).cloned() else {
                // The list restarts from the front once per turn before the
                // unit settles for doing nothing.
                if !self.wrapped {
                    self.wrapped = true;
                    self.behaviour_idx = 0;
                    continue;
                }
                self.finish(world, false);
                return;
            };
            self.behaviour_idx += 1;
            debug!(unit = %unit.nid, ?behaviour.action, ?behaviour.view_range, "behaviour starts");

            match behaviour.action {
                AiAction::None => continue,
                AiAction::Attack | AiAction::Support => {
                    // A guarding unit considers attacks from where it stands
                    // and nowhere else.
                    let valid_moves = if behaviour.view_range == ViewRange::Guard {
                        BTreeSet::from([pos])
                    } else {
                        true_valid_moves(world, rules, unit)
                    };
                    let search = CombatSearch::new(
                        world,
                        rules,
                        self.unit,
                        valid_moves,
                        &behaviour,
                        profile.offense_bias,
                    );
                    self.behaviour = Some(behaviour);
                    self.state = ThinkState::Primary(search);
                    return;
                }
                AiAction::Interact | AiAction::MoveTo => {
                    let search = MovementSearch::new(world, rules, self.unit, &behaviour);
                    self.behaviour = Some(behaviour);
                    self.state = ThinkState::Secondary(search);
                    return;
                }
                AiAction::MoveAwayFrom => {
                    // Retreat is cheap enough to resolve synchronously.
                    match retreat_destination(world, rules, unit, &behaviour) {
                        Some(destination) => {
                            self.decision.destination = Some(destination);
                            self.behaviour = Some(behaviour);
                            self.finish(world, true);
                            return;
                        }
                        None => continue,
                    }
                }
            }
        }
    }

    fn finish(&mut self, world: &World, did_something: bool) {
        self.decided = true;
        self.did_something = did_something;
        self.state = ThinkState::Init;
        if let Some(unit) = world.units.get(self.unit) {
            debug!(
                unit = %unit.nid,
                did_something,
                destination = ?self.decision.destination,
                target = ?self.decision.target,
                "decision settled"
            );
        }
    }
}
