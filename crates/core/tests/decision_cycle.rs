use std::time::Duration;

use core::{
    AiAction, AiController, AiProfile, AiTarget, Behaviour, CostGrid, Item, Pos, PositionGoal,
    RecordedCommands, RegionKind, SimpleRules, Team, TriggerRegion, Unit, UnitId, ViewRange,
    World,
};

fn add_unit(world: &mut World, nid: &str, team: Team, pos: Pos) -> UnitId {
    world.add_unit(Unit::new(nid, team, pos))
}

fn install_profile(world: &mut World, unit: UnitId, id: &str, behaviours: Vec<Behaviour>) {
    world
        .profiles
        .insert(id.to_string(), AiProfile { priority: 10, offense_bias: 2.0, behaviours });
    world.units[unit].ai = id.to_string();
}

fn decide(world: &World, unit: UnitId) -> (AiController, bool) {
    let rules = SimpleRules;
    let mut controller = AiController::new(unit);
    let mut ticks = 0;
    while !controller.think(world, &rules, Duration::ZERO) {
        ticks += 1;
        assert!(ticks < 100_000, "think must settle in bounded ticks");
    }
    let did = controller.did_something();
    (controller, did)
}

#[test]
fn test_scenario_a_lethal_sure_hit_wins_with_distance_tiebreak() {
    let mut world = World::new(12, 12);
    let me = add_unit(&mut world, "me", Team::Enemy, Pos { y: 6, x: 3 });
    let sword = world.add_item(Item::weapon("sword", 25, 100, 1, 1));
    world.give_item(me, sword);
    let foe = add_unit(&mut world, "foe", Team::Player, Pos { y: 6, x: 6 });
    world.units[foe].hp = 12;
    install_profile(
        &mut world,
        me,
        "hunter",
        vec![Behaviour::new(AiAction::Attack, AiTarget::Enemy, ViewRange::DoubleMove)],
    );

    let (controller, did) = decide(&world, me);
    assert!(did);
    let decision = controller.decision();
    assert_eq!(decision.target, Some(Pos { y: 6, x: 6 }));
    assert_eq!(decision.item, Some(sword));
    assert_eq!(
        decision.destination,
        Some(Pos { y: 6, x: 5 }),
        "among the four adjacent tiles the one closest to the start wins"
    );
}

#[test]
fn test_scenario_b_retreat_from_symmetric_threats_is_deterministic() {
    let mut world = World::new(14, 14);
    let me = add_unit(&mut world, "me", Team::Enemy, Pos { y: 7, x: 7 });
    add_unit(&mut world, "north", Team::Player, Pos { y: 5, x: 7 });
    add_unit(&mut world, "south", Team::Player, Pos { y: 9, x: 7 });
    install_profile(
        &mut world,
        me,
        "skittish",
        vec![Behaviour::new(AiAction::MoveAwayFrom, AiTarget::Enemy, ViewRange::Unlimited)],
    );

    // The threat centroid sits on the unit itself, so every direction is
    // equally "away" and the tie must break the same way every run.
    let (first, did) = decide(&world, me);
    assert!(did);
    let expected = first.decision().destination;
    assert!(expected.is_some());
    for _ in 0..5 {
        let (again, _) = decide(&world, me);
        assert_eq!(again.decision().destination, expected);
    }
}

#[test]
fn test_scenario_c_throwing_region_guard_is_contained() {
    let mut world = World::new(10, 10);
    let me = add_unit(&mut world, "me", Team::Enemy, Pos { y: 5, x: 5 });
    world.regions.push(TriggerRegion {
        kind: RegionKind::Event,
        sub_id: "shrine".to_string(),
        guard: Some("divide by zero".to_string()),
        positions: vec![Pos { y: 2, x: 2 }],
    });
    install_profile(
        &mut world,
        me,
        "pilgrim",
        vec![Behaviour::new(
            AiAction::Interact,
            AiTarget::Event("shrine".to_string()),
            ViewRange::Unlimited,
        )],
    );

    let (controller, did) = decide(&world, me);
    assert!(!did, "the only region is guard-broken, so nothing to do");
    assert_eq!(controller.decision().destination, None);
}

#[test]
fn test_scenario_d_unreachable_goal_falls_through_to_next_behaviour() {
    let mut world = World::new(12, 12);
    // Split the map with a full wall at x=6.
    let grid = world.grids.get_mut("foot").expect("foot grid");
    for y in 0..12 {
        grid.set_wall(Pos { y, x: 6 });
    }
    let me = add_unit(&mut world, "me", Team::Enemy, Pos { y: 5, x: 2 });
    install_profile(
        &mut world,
        me,
        "stubborn",
        vec![
            Behaviour::new(
                AiAction::MoveTo,
                AiTarget::Position(PositionGoal::At(Pos { y: 5, x: 10 })),
                ViewRange::Unlimited,
            ),
            Behaviour::new(
                AiAction::MoveTo,
                AiTarget::Position(PositionGoal::At(Pos { y: 9, x: 2 })),
                ViewRange::Unlimited,
            ),
        ],
    );

    let (controller, did) = decide(&world, me);
    assert!(did, "the second goal is on this side of the wall");
    // Non-region goals accept adjacent arrival, so the walk ends one short.
    assert_eq!(controller.decision().destination, Some(Pos { y: 8, x: 2 }));
}

#[test]
fn test_behaviour_exhaustion_settles_in_bounded_ticks() {
    let mut world = World::new(10, 10);
    let me = add_unit(&mut world, "me", Team::Enemy, Pos { y: 5, x: 5 });
    install_profile(
        &mut world,
        me,
        "hollow",
        vec![
            Behaviour::new(AiAction::None, AiTarget::None, ViewRange::Guard),
            Behaviour::new(AiAction::Attack, AiTarget::Enemy, ViewRange::DoubleMove),
            Behaviour::new(AiAction::Support, AiTarget::Ally, ViewRange::DoubleMove),
            Behaviour::new(AiAction::MoveAwayFrom, AiTarget::Enemy, ViewRange::DoubleMove),
        ],
    );

    let (controller, did) = decide(&world, me);
    assert!(!did);

    let rules = SimpleRules;
    let mut controller = controller;
    let mut sink = RecordedCommands::default();
    controller.act(&world, &rules, &mut sink);
    assert_eq!(sink.commands, vec![core::AiCommand::Wait { unit: me }]);
}

#[test]
fn test_completed_decision_leaves_position_and_equipment_untouched() {
    let mut world = World::new(12, 12);
    let me = add_unit(&mut world, "me", Team::Enemy, Pos { y: 6, x: 3 });
    let sword = world.add_item(Item::weapon("sword", 6, 90, 1, 1));
    let lance = world.add_item(Item::weapon("lance", 9, 70, 1, 2));
    world.give_item(me, sword);
    world.give_item(me, lance);
    add_unit(&mut world, "foe", Team::Player, Pos { y: 6, x: 7 });
    install_profile(
        &mut world,
        me,
        "hunter",
        vec![Behaviour::new(AiAction::Attack, AiTarget::Enemy, ViewRange::DoubleMove)],
    );

    let before = world.snapshot_hash();
    let equipped_before = world.units[me].equipped;
    let pos_before = world.units[me].pos;

    let (_, did) = decide(&world, me);
    assert!(did);
    assert_eq!(world.snapshot_hash(), before);
    assert_eq!(world.units[me].equipped, equipped_before);
    assert_eq!(world.units[me].pos, pos_before);
}

#[test]
fn test_identical_snapshots_decide_identically() {
    let mut world = World::new(14, 14);
    let me = add_unit(&mut world, "me", Team::Enemy, Pos { y: 7, x: 3 });
    let sword = world.add_item(Item::weapon("sword", 6, 90, 1, 1));
    world.give_item(me, sword);
    add_unit(&mut world, "near", Team::Player, Pos { y: 7, x: 8 });
    add_unit(&mut world, "hurt", Team::Player, Pos { y: 4, x: 6 });
    world.units.values_mut().find(|u| u.nid == "hurt").expect("hurt exists").hp = 5;
    install_profile(
        &mut world,
        me,
        "hunter",
        vec![Behaviour::new(AiAction::Attack, AiTarget::Enemy, ViewRange::Unlimited)],
    );

    let (first, _) = decide(&world, me);
    let (second, _) = decide(&world, me);
    assert_eq!(first.decision(), second.decision());
}

#[test]
fn test_terrain_costs_shape_the_chosen_destination() {
    let mut world = World::new(10, 10);
    let grid = world.grids.get_mut("foot").expect("foot grid");
    // A band of cost-3 mud across x=4.
    for y in 0..10 {
        grid.set_cost(Pos { y, x: 4 }, 3);
    }
    let me = add_unit(&mut world, "me", Team::Enemy, Pos { y: 5, x: 2 });
    install_profile(
        &mut world,
        me,
        "marcher",
        vec![Behaviour::new(
            AiAction::MoveTo,
            AiTarget::Position(PositionGoal::At(Pos { y: 5, x: 8 })),
            ViewRange::Unlimited,
        )],
    );

    let (controller, did) = decide(&world, me);
    assert!(did);
    // Budget 4: step to x=3 (1), mud at x=4 (3) exhausts the budget.
    assert_eq!(controller.decision().destination, Some(Pos { y: 5, x: 4 }));
}

#[test]
fn test_profiles_round_trip_through_json() {
    let profile = AiProfile {
        priority: 20,
        offense_bias: 1.5,
        behaviours: vec![
            Behaviour::new(AiAction::Attack, AiTarget::Enemy, ViewRange::DoubleMove),
            Behaviour::new(
                AiAction::MoveTo,
                AiTarget::Position(PositionGoal::Starting),
                ViewRange::Unlimited,
            ),
        ],
    };
    let json = serde_json::to_string(&profile).expect("profile serializes");
    let back: AiProfile = serde_json::from_str(&json).expect("profile deserializes");
    assert_eq!(profile, back);

    // Persisted view ranges are raw integers with negative sentinels.
    assert!(json.contains("\"view_range\":-3"));
    assert!(json.contains("\"view_range\":-4"));
}

#[test]
fn test_separate_movement_classes_use_their_own_grids() {
    let mut world = World::new(10, 10);
    let mut fliers = CostGrid::open(10, 10);
    let grid = world.grids.get_mut("foot").expect("foot grid");
    for y in 0..10 {
        grid.set_wall(Pos { y, x: 5 });
    }
    // Fliers ignore the wall line entirely.
    for y in 0..10 {
        fliers.set_cost(Pos { y, x: 5 }, 1);
    }
    world.grids.insert("fly".to_string(), fliers);

    let walker = add_unit(&mut world, "walker", Team::Enemy, Pos { y: 4, x: 3 });
    let flier = add_unit(&mut world, "flier", Team::Enemy, Pos { y: 6, x: 3 });
    world.units[flier].movement_class = "fly".to_string();
    let goal = Behaviour::new(
        AiAction::MoveTo,
        AiTarget::Position(PositionGoal::At(Pos { y: 4, x: 7 })),
        ViewRange::Unlimited,
    );
    install_profile(&mut world, walker, "walk-east", vec![goal.clone()]);
    let goal = Behaviour {
        target: AiTarget::Position(PositionGoal::At(Pos { y: 6, x: 7 })),
        ..goal
    };
    install_profile(&mut world, flier, "fly-east", vec![goal]);

    let (walk, walk_did) = decide(&world, walker);
    assert!(!walk_did, "the wall seals the walker's half of the map");
    assert_eq!(walk.decision().destination, None);

    let (fly, fly_did) = decide(&world, flier);
    assert!(fly_did);
    assert_eq!(fly.decision().destination, Some(Pos { y: 6, x: 6 }), "adjacent to the goal");
}
