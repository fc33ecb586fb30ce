use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;
use game_core::{
    AiAction, AiController, AiProfile, AiTarget, Behaviour, Item, Pos, PositionGoal,
    RecordedCommands, SimpleRules, Team, Unit, UnitId, ViewRange, World,
};
use rand_chacha::{
    ChaCha8Rng,
    rand_core::{Rng, SeedableRng},
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value_t = 42)]
    seed: u64,
    #[arg(short, long, default_value_t = 200)]
    runs: u64,
}

const SIZE: usize = 14;
const THINK_CALL_LIMIT: u32 = 1_000_000;

fn choose<T: Clone>(rng: &mut ChaCha8Rng, slice: &[T]) -> T {
    let p = rng.next_u64() as usize % slice.len();
    slice[p].clone()
}

fn main() -> Result<()> {
    let args = Args::parse();
    println!("Fuzzing {} random skirmishes from seed {}...", args.runs, args.seed);

    for run in 0..args.runs {
        let run_seed = args.seed.wrapping_add(run);
        check_run(run_seed)
            .map_err(|e| anyhow::anyhow!("run_seed {run_seed}: {e}"))?;
    }

    println!("All {} runs held every invariant.", args.runs);
    Ok(())
}

/// One random skirmish: every AI unit must settle in bounded think calls,
/// leave the world untouched while deciding, and decide on a tile that is
/// on the board and free.
fn check_run(seed: u64) -> Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut world = random_world(&mut rng);
    let rules = SimpleRules;

    let thinkers: Vec<UnitId> = world
        .units
        .iter()
        .filter(|(_, u)| matches!(u.team, Team::Enemy | Team::Enemy2) && !u.ai.is_empty())
        .map(|(id, _)| id)
        .collect();

    for unit_id in thinkers {
        let before = world.snapshot_hash();
        let mut controller = AiController::new(unit_id);
        let mut calls = 0u32;
        while !controller.think(&world, &rules, Duration::ZERO) {
            calls += 1;
            if calls > THINK_CALL_LIMIT {
                bail!("think did not settle within {THINK_CALL_LIMIT} calls");
            }
        }
        if world.snapshot_hash() != before {
            bail!("thinking mutated the world");
        }

        let decision = controller.decision().clone();
        if let Some(destination) = decision.destination {
            let me = &world.units[unit_id];
            let grid = world.grid_for(me).expect("movement grid exists");
            if grid.cell(destination).is_none_or(|c| !c.reachable) {
                bail!("decided on unwalkable destination {destination:?}");
            }
            if world.unit_at(destination).is_some_and(|other| other.id != unit_id) {
                bail!("decided on an occupied destination {destination:?}");
            }
        }

        let mut sink = RecordedCommands::default();
        controller.act(&world, &rules, &mut sink);
        if sink.commands.is_empty() {
            bail!("act emitted no command at all");
        }
        // The harness only applies moves; combat resolution is the host's
        // business and irrelevant to these invariants.
        if let Some(destination) = decision.destination {
            world.units[unit_id].pos = Some(destination);
        }
    }
    Ok(())
}

fn random_world(rng: &mut ChaCha8Rng) -> World {
    let mut world = World::new(SIZE, SIZE);
    let grid = world.grids.get_mut("foot").expect("foot grid");
    for y in 0..SIZE as i32 {
        for x in 0..SIZE as i32 {
            match rng.next_u64() % 12 {
                0 => grid.set_wall(Pos { y, x }),
                1 => grid.set_cost(Pos { y, x }, 2),
                _ => {}
            }
        }
    }

    let views =
        [ViewRange::Guard, ViewRange::SingleMove, ViewRange::DoubleMove, ViewRange::Unlimited];
    let behaviours = |rng: &mut ChaCha8Rng| -> Vec<Behaviour> {
        let mut list = vec![Behaviour::new(
            AiAction::Attack,
            AiTarget::Enemy,
            choose(rng, &views),
        )];
        match rng.next_u64() % 4 {
            0 => list.push(Behaviour::new(AiAction::Support, AiTarget::Ally, choose(rng, &views))),
            1 => list.push(Behaviour::new(
                AiAction::MoveTo,
                AiTarget::Position(PositionGoal::Starting),
                ViewRange::Unlimited,
            )),
            2 => list.push(Behaviour::new(
                AiAction::MoveAwayFrom,
                AiTarget::Enemy,
                choose(rng, &views),
            )),
            _ => {}
        }
        list
    };

    for i in 0..(2 + rng.next_u64() % 3) {
        let profile = format!("profile{i}");
        world.profiles.insert(
            profile.clone(),
            AiProfile {
                priority: 10,
                offense_bias: (rng.next_u64() % 40) as f32 / 10.0,
                behaviours: behaviours(rng),
            },
        );
        let pos = free_tile(rng, &world);
        let id = world.add_unit(Unit::new(&format!("red{i}"), Team::Enemy, pos));
        world.units[id].ai = profile;
        world.units[id].hp = 5 + (rng.next_u64() % 16) as i32;
        let sword = world.add_item(Item::weapon("sword", 4 + (rng.next_u64() % 8) as i32, 85, 1, 1));
        world.give_item(id, sword);
        if rng.next_u64() % 3 == 0 {
            let staff = world.add_item(Item::support("staff", 8, 1, 1));
            world.give_item(id, staff);
        }
    }
    for i in 0..(1 + rng.next_u64() % 4) {
        let pos = free_tile(rng, &world);
        let id = world.add_unit(Unit::new(&format!("blue{i}"), Team::Player, pos));
        world.units[id].hp = 5 + (rng.next_u64() % 16) as i32;
        let sword = world.add_item(Item::weapon("sword", 5, 80, 1, 1));
        world.give_item(id, sword);
    }
    world
}

fn free_tile(rng: &mut ChaCha8Rng, world: &World) -> Pos {
    let foot = world.grids.get("foot").expect("foot grid");
    loop {
        let pos = Pos {
            y: (rng.next_u64() % SIZE as u64) as i32,
            x: (rng.next_u64() % SIZE as u64) as i32,
        };
        if foot.cell(pos).is_some_and(|c| c.reachable) && world.unit_at(pos).is_none() {
            return pos;
        }
    }
}
