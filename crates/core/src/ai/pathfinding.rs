//! Grid reachability and point-to-point pathfinding primitives.
//! This module exists so graph search rules are reusable across both AI
//! search strategies and the continuous-motion caller.
//! It does not own candidate scoring or behaviour selection.

use std::collections::{BTreeMap, BTreeSet};

use crate::state::CostGrid;
use crate::types::Pos;

/// Open-frontier entry for A*. Ordering is (f, h, y, x) so pops are
/// deterministic even between nodes with equal estimates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct OpenNode {
    f: u64,
    h: u32,
    y: i32,
    x: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct CostNode {
    g: u32,
    y: i32,
    x: i32,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PathOptions {
    /// Stopping on a tile adjacent to the goal counts as arrival.
    pub adjacent_ok: bool,
    /// Abort and report no path once the best-case total cost of every open
    /// node exceeds this ceiling.
    pub limit: Option<u32>,
}

/// Uniform-cost expansion from `start`: every tile whose cheapest traversal
/// cost is within `budget`. Occupancy pass-through rules come in through
/// `can_pass`; the returned set includes `start` and tiles that may only be
/// passed through, so callers filter for legal stopping tiles themselves.
pub fn reachable_tiles(
    grid: &CostGrid,
    start: Pos,
    budget: u32,
    can_pass: &dyn Fn(Pos) -> bool,
) -> BTreeSet<Pos> {
    let mut closed = BTreeSet::new();
    if !grid.in_bounds(start) {
        return closed;
    }

    let mut open = BTreeSet::new();
    let mut g_score = BTreeMap::new();
    open.insert(CostNode { g: 0, y: start.y, x: start.x });
    g_score.insert(start, 0u32);

    while let Some(node) = open.pop_first() {
        let pos = Pos { y: node.y, x: node.x };
        if node.g > budget {
            break;
        }
        if !closed.insert(pos) {
            continue;
        }
        for next in neighbors(pos) {
            let Some(cell) = grid.cell(next) else { continue };
            if !cell.reachable || closed.contains(&next) || !can_pass(next) {
                continue;
            }
            let tentative = node.g.saturating_add(cell.cost);
            if tentative < *g_score.get(&next).unwrap_or(&u32::MAX) {
                g_score.insert(next, tentative);
                open.insert(CostNode { g: tentative, y: next.y, x: next.x });
            }
        }
    }

    closed
}

/// Best-first point-to-point search. Returns the step sequence from just
/// after `start` through the arrival tile, or `None` when no path exists
/// under the options. An absent path is a normal result, not an error.
pub fn astar_path(
    grid: &CostGrid,
    start: Pos,
    goal: Pos,
    opts: PathOptions,
    can_pass: &dyn Fn(Pos) -> bool,
) -> Option<Vec<Pos>> {
    search(grid, start, goal, opts, can_pass, false)
}

/// A* variant that reparents a node to its grandparent whenever a straight
/// traversable line exists, producing straighter paths for continuous
/// motion. The grid-turn controller never calls this.
pub fn los_path(
    grid: &CostGrid,
    start: Pos,
    goal: Pos,
    opts: PathOptions,
    can_pass: &dyn Fn(Pos) -> bool,
) -> Option<Vec<Pos>> {
    search(grid, start, goal, opts, can_pass, true)
}

fn search(
    grid: &CostGrid,
    start: Pos,
    goal: Pos,
    opts: PathOptions,
    can_pass: &dyn Fn(Pos) -> bool,
    line_of_sight: bool,
) -> Option<Vec<Pos>> {
    if !grid.in_bounds(start) || !grid.in_bounds(goal) {
        return None;
    }
    if start == goal {
        return Some(vec![]);
    }

    let mut open = BTreeSet::new();
    let mut closed = BTreeSet::new();
    let mut g_score = BTreeMap::new();
    let mut came_from: BTreeMap<Pos, Pos> = BTreeMap::new();

    let h = manhattan(start, goal);
    open.insert(OpenNode { f: f_key(0, h, start, start, goal), h, y: start.y, x: start.x });
    g_score.insert(start, 0u32);

    while let Some(node) = open.pop_first() {
        let pos = Pos { y: node.y, x: node.x };
        if !closed.insert(pos) {
            continue;
        }
        let g = *g_score.get(&pos).expect("open node must have a g-score");
        // The ceiling compares g + plain h; f carries tie-break noise.
        if let Some(limit) = opts.limit
            && g.saturating_add(manhattan(pos, goal)) > limit
        {
            return None;
        }
        if pos == goal || (opts.adjacent_ok && manhattan(pos, goal) == 1) {
            return Some(reconstruct_path(&came_from, start, pos));
        }
        for next in neighbors(pos) {
            let Some(cell) = grid.cell(next) else { continue };
            if !cell.reachable || closed.contains(&next) || !can_pass(next) {
                continue;
            }
            let (parent, tentative) = if line_of_sight
                && let Some(&grandparent) = came_from.get(&pos)
                && line_traversable(grid, grandparent, next)
            {
                (grandparent, g_score[&grandparent].saturating_add(cell.cost))
            } else {
                (pos, g.saturating_add(cell.cost))
            };
            if tentative < *g_score.get(&next).unwrap_or(&u32::MAX) {
                came_from.insert(next, parent);
                g_score.insert(next, tentative);
                let h = manhattan(next, goal);
                open.insert(OpenNode {
                    f: f_key(tentative, h, next, start, goal),
                    h,
                    y: next.y,
                    x: next.x,
                });
            }
        }
    }

    None
}

/// f with the original's directional tie-break: a cross-product term nudges
/// expansion along the straight line from start to goal.
fn f_key(g: u32, h: u32, pos: Pos, start: Pos, goal: Pos) -> u64 {
    let dx1 = i64::from(pos.x - goal.x);
    let dy1 = i64::from(pos.y - goal.y);
    let dx2 = i64::from(start.x - goal.x);
    let dy2 = i64::from(start.y - goal.y);
    let cross = (dx1 * dy2 - dx2 * dy1).unsigned_abs();
    (u64::from(g) + u64::from(h)) * 1000 + cross.min(999)
}

fn reconstruct_path(came_from: &BTreeMap<Pos, Pos>, start: Pos, arrival: Pos) -> Vec<Pos> {
    let mut path = vec![arrival];
    let mut pos = arrival;
    while pos != start {
        pos = *came_from.get(&pos).expect("path must be reconstructible");
        path.push(pos);
    }
    path.reverse();
    path.remove(0);
    path
}

/// Walks `path` from `start`, spending grid costs against `budget`, and
/// returns the furthest affordable tile on which the mover may legally stop.
/// Falls back to `start` when no step is affordable or stoppable.
pub fn travel_along(
    grid: &CostGrid,
    start: Pos,
    path: &[Pos],
    budget: u32,
    can_stop: &dyn Fn(Pos) -> bool,
) -> Pos {
    let mut spent = 0u32;
    let mut reached = 0usize;
    for (idx, step) in path.iter().enumerate() {
        let Some(cell) = grid.cell(*step) else { break };
        spent = spent.saturating_add(cell.cost);
        if spent > budget {
            break;
        }
        reached = idx + 1;
    }
    while reached > 0 {
        let candidate = path[reached - 1];
        if can_stop(candidate) {
            return candidate;
        }
        reached -= 1;
    }
    start
}

/// Whether every tile on the Bresenham line between `a` and `b` is
/// terrain-traversable. Occupancy is deliberately ignored, matching the
/// straight-line skip used by continuous motion.
fn line_traversable(grid: &CostGrid, a: Pos, b: Pos) -> bool {
    bresenham_line(a, b).into_iter().all(|p| grid.cell(p).is_some_and(|c| c.reachable))
}

fn bresenham_line(a: Pos, b: Pos) -> Vec<Pos> {
    let mut points = Vec::new();
    let dx = (b.x - a.x).abs();
    let dy = -(b.y - a.y).abs();
    let sx = if a.x < b.x { 1 } else { -1 };
    let sy = if a.y < b.y { 1 } else { -1 };
    let mut err = dx + dy;
    let mut pos = a;
    loop {
        points.push(pos);
        if pos == b {
            return points;
        }
        let doubled = 2 * err;
        if doubled >= dy {
            err += dy;
            pos.x += sx;
        }
        if doubled <= dx {
            err += dx;
            pos.y += sy;
        }
    }
}

pub(crate) fn neighbors(p: Pos) -> [Pos; 4] {
    [
        Pos { y: p.y - 1, x: p.x },
        Pos { y: p.y, x: p.x + 1 },
        Pos { y: p.y + 1, x: p.x },
        Pos { y: p.y, x: p.x - 1 },
    ]
}

pub(crate) fn manhattan(a: Pos, b: Pos) -> u32 {
    a.x.abs_diff(b.x) + a.y.abs_diff(b.y)
}
