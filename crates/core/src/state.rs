use std::collections::BTreeMap;
use std::hash::Hasher;

use slotmap::SlotMap;
use xxhash_rust::xxh3::Xxh3;

use crate::types::*;

/// One tile of a movement-class cost grid. Rebuilt by the board when terrain
/// or movement tables change; read-only to the AI.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CostCell {
    pub cost: u32,
    pub reachable: bool,
}

#[derive(Clone)]
pub struct CostGrid {
    pub width: usize,
    pub height: usize,
    cells: Vec<CostCell>,
}

impl CostGrid {
    /// An all-floor grid with uniform cost 1.
    pub fn open(width: usize, height: usize) -> Self {
        Self { width, height, cells: vec![CostCell { cost: 1, reachable: true }; width * height] }
    }

    pub fn in_bounds(&self, pos: Pos) -> bool {
        pos.x >= 0
            && pos.y >= 0
            && (pos.x as usize) < self.width
            && (pos.y as usize) < self.height
    }

    pub fn cell(&self, pos: Pos) -> Option<CostCell> {
        if !self.in_bounds(pos) {
            return None;
        }
        Some(self.cells[self.index(pos)])
    }

    pub fn set_cell(&mut self, pos: Pos, cell: CostCell) {
        if !self.in_bounds(pos) {
            return;
        }
        let idx = self.index(pos);
        self.cells[idx] = cell;
    }

    /// Marks a tile impassable for this movement class.
    pub fn set_wall(&mut self, pos: Pos) {
        self.set_cell(pos, CostCell { cost: u32::MAX, reachable: false });
    }

    pub fn set_cost(&mut self, pos: Pos, cost: u32) {
        self.set_cell(pos, CostCell { cost, reachable: true });
    }

    fn index(&self, pos: Pos) -> usize {
        (pos.y as usize) * self.width + (pos.x as usize)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemKind {
    Weapon,
    Support,
    Usable,
}

#[derive(Clone, Debug)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub kind: ItemKind,
    pub min_range: u32,
    pub max_range: u32,
    pub might: i32,
    pub hit: i32,
    pub crit: i32,
    pub heal: i32,
    pub inflicts_status: Option<String>,
    pub splash_radius: u32,
    /// Excluded from AI item enumeration entirely.
    pub no_ai: bool,
}

impl Item {
    pub fn weapon(name: &str, might: i32, hit: i32, min_range: u32, max_range: u32) -> Self {
        Self {
            id: ItemId::default(),
            name: name.to_string(),
            kind: ItemKind::Weapon,
            min_range,
            max_range,
            might,
            hit,
            crit: 0,
            heal: 0,
            inflicts_status: None,
            splash_radius: 0,
            no_ai: false,
        }
    }

    pub fn support(name: &str, heal: i32, min_range: u32, max_range: u32) -> Self {
        Self {
            id: ItemId::default(),
            name: name.to_string(),
            kind: ItemKind::Support,
            min_range,
            max_range,
            might: 0,
            hit: 100,
            crit: 0,
            heal,
            inflicts_status: None,
            splash_radius: 0,
            no_ai: false,
        }
    }

    pub fn usable(name: &str, heal: i32) -> Self {
        Self {
            id: ItemId::default(),
            name: name.to_string(),
            kind: ItemKind::Usable,
            min_range: 0,
            max_range: 0,
            might: 0,
            hit: 100,
            crit: 0,
            heal,
            inflicts_status: None,
            splash_radius: 0,
            no_ai: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Unit {
    pub id: UnitId,
    pub nid: String,
    pub name: String,
    pub klass: String,
    pub tags: Vec<String>,
    pub faction: String,
    pub party: String,
    pub team: Team,
    pub pos: Option<Pos>,
    pub spawn_pos: Option<Pos>,
    pub hp: i32,
    pub max_hp: i32,
    pub defense: i32,
    pub avoid: i32,
    pub movement: u32,
    pub movement_class: String,
    pub items: Vec<ItemId>,
    pub equipped: Option<ItemId>,
    /// May traverse tiles occupied by enemies while moving.
    pub pass_through: bool,
    /// AI profile id; empty means this unit never thinks.
    pub ai: String,
}

impl Unit {
    pub fn new(nid: &str, team: Team, pos: Pos) -> Self {
        Self {
            id: UnitId::default(),
            nid: nid.to_string(),
            name: nid.to_string(),
            klass: String::new(),
            tags: Vec::new(),
            faction: String::new(),
            party: String::new(),
            team,
            pos: Some(pos),
            spawn_pos: Some(pos),
            hp: 20,
            max_hp: 20,
            defense: 0,
            avoid: 0,
            movement: 4,
            movement_class: "foot".to_string(),
            items: Vec::new(),
            equipped: None,
            pass_through: false,
            ai: String::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum RegionKind {
    Normal,
    Status,
    Event,
    Formation,
}

/// A map trigger region the AI may be told to walk into.
#[derive(Clone, Debug)]
pub struct TriggerRegion {
    pub kind: RegionKind,
    pub sub_id: String,
    /// Optional guard expression; evaluation failures are treated as false.
    pub guard: Option<String>,
    pub positions: Vec<Pos>,
}

/// Read-only world handle passed into the controller and both searches.
/// The AI never mutates it; command side effects go through a `CommandSink`.
pub struct World {
    pub grids: BTreeMap<String, CostGrid>,
    pub units: SlotMap<UnitId, Unit>,
    pub items: SlotMap<ItemId, Item>,
    pub profiles: BTreeMap<String, AiProfile>,
    pub regions: Vec<TriggerRegion>,
    pub flags: AiFlags,
}

impl World {
    pub fn new(width: usize, height: usize) -> Self {
        let mut grids = BTreeMap::new();
        grids.insert("foot".to_string(), CostGrid::open(width, height));
        Self {
            grids,
            units: SlotMap::with_key(),
            items: SlotMap::with_key(),
            profiles: BTreeMap::new(),
            regions: Vec::new(),
            flags: AiFlags::default(),
        }
    }

    pub fn add_unit(&mut self, unit: Unit) -> UnitId {
        let id = self.units.insert(unit);
        self.units[id].id = id;
        id
    }

    pub fn add_item(&mut self, item: Item) -> ItemId {
        let id = self.items.insert(item);
        self.items[id].id = id;
        id
    }

    /// Adds the item to the unit's inventory, equipping it if nothing is.
    pub fn give_item(&mut self, unit: UnitId, item: ItemId) {
        let holder = &mut self.units[unit];
        holder.items.push(item);
        if holder.equipped.is_none() {
            holder.equipped = Some(item);
        }
    }

    pub fn grid_for(&self, unit: &Unit) -> Option<&CostGrid> {
        self.grids.get(&unit.movement_class)
    }

    pub fn unit_at(&self, pos: Pos) -> Option<&Unit> {
        self.units.values().find(|u| u.pos == Some(pos))
    }

    pub fn profile_of(&self, unit: &Unit) -> Option<&AiProfile> {
        self.profiles.get(&unit.ai)
    }

    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.get(id)
    }

    /// Stable digest of the mutable unit state the AI could possibly touch.
    /// Used to verify that a completed search leaves no trace on the world.
    pub fn snapshot_hash(&self) -> u64 {
        let mut hasher = Xxh3::new();
        for (id, unit) in &self.units {
            hasher.write_u64(slotmap::Key::data(&id).as_ffi());
            hasher.write(unit.nid.as_bytes());
            hasher.write_u8(unit.team as u8);
            match unit.pos {
                Some(pos) => {
                    hasher.write_u8(1);
                    hasher.write_i32(pos.y);
                    hasher.write_i32(pos.x);
                }
                None => hasher.write_u8(0),
            }
            hasher.write_i32(unit.hp);
            hasher.write_i32(unit.max_hp);
            match unit.equipped {
                Some(item) => {
                    hasher.write_u8(1);
                    hasher.write_u64(slotmap::Key::data(&item).as_ffi());
                }
                None => hasher.write_u8(0),
            }
            hasher.write_usize(unit.items.len());
        }
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_bounds_cells_are_absent() {
        let grid = CostGrid::open(4, 3);
        assert!(grid.cell(Pos { y: 0, x: 0 }).is_some());
        assert!(grid.cell(Pos { y: -1, x: 0 }).is_none());
        assert!(grid.cell(Pos { y: 0, x: 4 }).is_none());
        assert!(grid.cell(Pos { y: 3, x: 0 }).is_none());
    }

    #[test]
    fn snapshot_hash_tracks_unit_position_and_equipment() {
        let mut world = World::new(6, 6);
        let unit = world.add_unit(Unit::new("guard", Team::Enemy, Pos { y: 2, x: 2 }));
        let sword = world.add_item(Item::weapon("sword", 5, 90, 1, 1));
        world.give_item(unit, sword);

        let before = world.snapshot_hash();
        assert_eq!(before, world.snapshot_hash());

        world.units[unit].pos = Some(Pos { y: 2, x: 3 });
        let moved = world.snapshot_hash();
        assert_ne!(before, moved);

        world.units[unit].pos = Some(Pos { y: 2, x: 2 });
        assert_eq!(before, world.snapshot_hash());
    }
}
