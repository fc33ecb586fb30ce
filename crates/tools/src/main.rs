use std::collections::BTreeMap;
use std::fs;

use anyhow::{Context, Result};
use clap::Parser;
use game_core::{
    AiAction, AiCommand, AiController, AiProfile, AiTarget, Behaviour, CostGrid,
    DEFAULT_THINK_BUDGET, Item, ItemId, ItemKind, Pos, RecordedCommands, Rules, SimpleRules,
    Team, Unit, UnitId, ViewRange, World,
};
use rand_chacha::{
    ChaCha8Rng,
    rand_core::{Rng, SeedableRng},
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Seed for the generated skirmish
    #[arg(short, long, default_value_t = 42)]
    seed: u64,
    /// Number of AI turns to simulate
    #[arg(short, long, default_value_t = 5)]
    turns: u32,
    /// Optional JSON file of AI profiles overriding the built-ins
    #[arg(short, long)]
    profiles: Option<String>,
}

const SIZE: usize = 16;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let rules = SimpleRules;
    let mut world = build_skirmish(args.seed);

    if let Some(path) = &args.profiles {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read profiles file: {path}"))?;
        let overrides: BTreeMap<String, AiProfile> =
            serde_json::from_str(&data).with_context(|| "Failed to deserialize profiles JSON")?;
        world.profiles.extend(overrides);
    }

    println!("Skirmish on seed {} for {} turns.", args.seed, args.turns);
    for turn in 1..=args.turns {
        println!("-- turn {turn}");
        for unit_id in thinkers(&world) {
            // A unit may have fallen earlier this same turn.
            if world.units[unit_id].pos.is_none() {
                continue;
            }
            let mut controller = AiController::new(unit_id);
            while !controller.think(&world, &rules, DEFAULT_THINK_BUDGET) {}

            let mut sink = RecordedCommands::default();
            controller.act(&world, &rules, &mut sink);
            for command in &sink.commands {
                describe(&world, command);
                apply(&mut world, &rules, command);
            }
        }
    }

    println!("Snapshot hash: {}", world.snapshot_hash());
    Ok(())
}

/// AI-driven units still on the board, in a stable display order.
fn thinkers(world: &World) -> Vec<UnitId> {
    let mut units: Vec<(String, UnitId)> = world
        .units
        .iter()
        .filter(|(_, u)| matches!(u.team, Team::Enemy | Team::Enemy2))
        .filter(|(_, u)| u.pos.is_some() && !u.ai.is_empty())
        .map(|(id, u)| (u.nid.clone(), id))
        .collect();
    units.sort();
    units.into_iter().map(|(_, id)| id).collect()
}

fn describe(world: &World, command: &AiCommand) {
    match command {
        AiCommand::Move { unit, destination, path } => {
            let nid = &world.units[*unit].nid;
            println!("  {nid} moves to ({}, {}) in {} steps", destination.y, destination.x, path.len());
        }
        AiCommand::Combat { unit, target, item } => {
            let nid = &world.units[*unit].nid;
            let name = world.item(*item).map(|i| i.name.as_str()).unwrap_or("?");
            println!("  {nid} uses {name} on ({}, {})", target.y, target.x);
        }
        AiCommand::Wait { unit } => {
            println!("  {} waits", world.units[*unit].nid);
        }
    }
}

/// Minimal host-side command application: the engine decides, this harness
/// mutates.
fn apply(world: &mut World, rules: &SimpleRules, command: &AiCommand) {
    match command {
        AiCommand::Move { unit, destination, .. } => {
            world.units[*unit].pos = Some(*destination);
        }
        AiCommand::Combat { unit, target, item } => {
            apply_combat(world, rules, *unit, *target, *item);
        }
        AiCommand::Wait { .. } => {}
    }
}

fn apply_combat(
    world: &mut World,
    rules: &SimpleRules,
    attacker_id: UnitId,
    target: Pos,
    item_id: ItemId,
) {
    let Some(attacker) = world.units.get(attacker_id).cloned() else { return };
    let Some(item) = world.item(item_id).cloned() else { return };
    let defender_id = match world.unit_at(target) {
        Some(defender) => defender.id,
        None if attacker.pos == Some(target) => attacker_id,
        None => return,
    };
    let defender = world.units[defender_id].clone();

    match item.kind {
        ItemKind::Weapon => {
            let damage = rules.expected_damage(world, &attacker, &defender, &item).round() as i32;
            let victim = &mut world.units[defender_id];
            victim.hp -= damage;
            if victim.hp <= 0 {
                println!("  {} falls", victim.nid);
                victim.pos = None;
            }
        }
        ItemKind::Support | ItemKind::Usable => {
            let heal = rules.expected_heal(world, &attacker, &defender, &item).round() as i32;
            let patient = &mut world.units[defender_id];
            patient.hp = (patient.hp + heal).min(patient.max_hp);
        }
    }
}

fn build_skirmish(seed: u64) -> World {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut world = World::new(SIZE, SIZE);
    scatter_walls(&mut rng, world.grids.get_mut("foot").expect("foot grid"));

    world.profiles.insert(
        "aggressive".to_string(),
        AiProfile {
            priority: 20,
            offense_bias: 3.0,
            behaviours: vec![Behaviour::new(
                AiAction::Attack,
                AiTarget::Enemy,
                ViewRange::Unlimited,
            )],
        },
    );
    world.profiles.insert(
        "sentinel".to_string(),
        AiProfile {
            priority: 10,
            offense_bias: 1.0,
            behaviours: vec![Behaviour::new(AiAction::Attack, AiTarget::Enemy, ViewRange::Guard)],
        },
    );
    world.profiles.insert(
        "medic".to_string(),
        AiProfile {
            priority: 15,
            offense_bias: 0.5,
            behaviours: vec![
                Behaviour::new(AiAction::Support, AiTarget::Ally, ViewRange::DoubleMove),
                Behaviour::new(AiAction::MoveAwayFrom, AiTarget::Enemy, ViewRange::DoubleMove),
            ],
        },
    );

    for (i, profile) in ["aggressive", "aggressive", "sentinel", "medic"].iter().enumerate() {
        let pos = open_tile(&mut rng, &world, SIZE as i32 / 2, SIZE as i32);
        let id = world.add_unit(Unit::new(&format!("red{i}"), Team::Enemy, pos));
        world.units[id].ai = profile.to_string();
        let sword = world.add_item(Item::weapon("iron sword", 6, 90, 1, 1));
        world.give_item(id, sword);
        if *profile == "medic" {
            let staff = world.add_item(Item::support("heal staff", 10, 1, 1));
            world.give_item(id, staff);
        }
    }
    for i in 0..4 {
        let pos = open_tile(&mut rng, &world, 0, SIZE as i32 / 2);
        let id = world.add_unit(Unit::new(&format!("blue{i}"), Team::Player, pos));
        let sword = world.add_item(Item::weapon("iron sword", 6, 90, 1, 1));
        world.give_item(id, sword);
    }
    world
}

fn scatter_walls(rng: &mut ChaCha8Rng, grid: &mut CostGrid) {
    for y in 0..SIZE as i32 {
        for x in 0..SIZE as i32 {
            if rng.next_u64() % 10 == 0 {
                grid.set_wall(Pos { y, x });
            }
        }
    }
}

/// A free walkable tile with x in [min_x, max_x).
fn open_tile(rng: &mut ChaCha8Rng, world: &World, min_x: i32, max_x: i32) -> Pos {
    let foot = world.grids.get("foot").expect("foot grid");
    loop {
        let pos = Pos {
            y: (rng.next_u64() % SIZE as u64) as i32,
            x: min_x + (rng.next_u64() % (max_x - min_x) as u64) as i32,
        };
        if foot.cell(pos).is_some_and(|c| c.reachable) && world.unit_at(pos).is_none() {
            return pos;
        }
    }
}
