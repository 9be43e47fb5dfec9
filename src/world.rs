//! Decoding of the static world: map banks, map headers, layout grids,
//! events and connections.

use crate::config::{Layout, PathfinderConfig};
use crate::error::WorldError;
use crate::memory::{MemoryAccess, Reader};
use crate::pathfinder::Pathfinder;
use log::{debug, trace};
use std::collections::HashMap;

/// Tiles below this index come from the primary tileset
pub const PRIMARY_TILE_COUNT: u16 = 640;

/// Tile behaviour codes the navigation code cares about
pub mod behavior {
    pub const TALL_GRASS: u16 = 0x0202;
    pub const JUMP_RIGHT: u16 = 0x38;
    pub const JUMP_LEFT: u16 = 0x39;
    pub const JUMP_UP: u16 = 0x3A;
    pub const JUMP_DOWN: u16 = 0x3B;
    pub const WARP_DOOR_INDOOR: u16 = 0x60;
    pub const ESCALATOR_DOWN: u16 = 0x61;
    pub const ARROW_WARP_LEFT: u16 = 0x62;
    pub const ARROW_WARP_RIGHT: u16 = 0x63;
    pub const ARROW_WARP_DOWN: u16 = 0x64;
    pub const ARROW_WARP_UP: u16 = 0x65;
    pub const DOOR: u16 = 0x69;
    pub const ESCALATOR_UP: u16 = 0x6B;
    pub const COUNTER: u16 = 0x80;

    /// Ledges crossed in a single two-tile hop
    pub fn is_jump(b: u16) -> bool {
        matches!(b, JUMP_RIGHT | JUMP_LEFT | JUMP_UP | JUMP_DOWN)
    }
}

/// Collision/elevation status of a walkable cell
const WALKABLE_STATUS: [u8; 3] = [0x0C, 0x00, 0x10];

/// Person movement types that never leave their spawn cell
pub fn is_static_movement(movement_type: u8) -> bool {
    matches!(movement_type, 0 | 1 | 7..=10 | 13..=24 | 64..=79)
}

/// One map cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tile {
    /// Upper six bits of the map data word
    pub status: u8,
    /// Behaviour code from the tileset attributes
    pub behavior: u16,
}

impl Tile {
    pub fn walkable() -> Self {
        Tile { status: 0x0C, behavior: 0 }
    }

    pub fn wall() -> Self {
        Tile { status: 0x01, behavior: 0 }
    }

    pub fn with_behavior(behavior: u16) -> Self {
        Tile { status: 0x0C, behavior }
    }

    pub fn is_walkable(&self) -> bool {
        WALKABLE_STATUS.contains(&self.status)
            && self.behavior != behavior::ESCALATOR_DOWN
            && self.behavior != behavior::ESCALATOR_UP
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionKind {
    None,
    Down,
    Up,
    Left,
    Right,
    Dive,
    Emerge,
    Unknown(u32),
}

impl From<u32> for ConnectionKind {
    fn from(value: u32) -> Self {
        match value {
            0 => ConnectionKind::None,
            1 => ConnectionKind::Down,
            2 => ConnectionKind::Up,
            3 => ConnectionKind::Left,
            4 => ConnectionKind::Right,
            5 => ConnectionKind::Dive,
            6 => ConnectionKind::Emerge,
            other => ConnectionKind::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Connection {
    pub kind: ConnectionKind,
    /// Alignment of the neighbour along the shared border
    pub offset: i32,
    pub bank: u8,
    pub map: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WarpEvent {
    pub x: u16,
    pub y: u16,
    pub level: u8,
    /// Index of the paired warp in the destination map
    pub dest_warp: u8,
    pub dest_map: u8,
    pub dest_bank: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PersonEvent {
    /// Local id, as used by `hidesprite` and `applymovement`
    pub local_id: u8,
    pub picture: u8,
    pub x: u16,
    pub y: u16,
    pub level: u8,
    pub movement_type: u8,
    pub movement: u8,
    pub trainer: u8,
    pub view: u16,
    pub script: u32,
    /// Visibility flag, 0 for always visible
    pub flag: u16,
}

impl PersonEvent {
    pub fn is_static(&self) -> bool {
        is_static_movement(self.movement_type)
    }

    pub fn is_visible(&self, flag_set: impl Fn(u16) -> bool) -> bool {
        self.flag == 0 || !flag_set(self.flag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignEvent {
    pub x: u16,
    pub y: u16,
    pub level: u8,
    pub kind: u8,
    pub script: u32,
}

/// Script triggered by stepping on a cell while `var == value`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordEvent {
    pub x: u16,
    pub y: u16,
    pub level: u8,
    pub var: u16,
    pub value: u16,
    pub script: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapScriptKind {
    SetMapTile,
    ValidateLoad1,
    EnterNoMenu,
    ValidateLoad2,
    EnterMenu1,
    Unknown,
    EnterMenu2,
}

impl MapScriptKind {
    fn from_byte(b: u8) -> Self {
        match b {
            1 => MapScriptKind::SetMapTile,
            2 => MapScriptKind::ValidateLoad1,
            3 => MapScriptKind::EnterNoMenu,
            4 => MapScriptKind::ValidateLoad2,
            5 => MapScriptKind::EnterMenu1,
            7 => MapScriptKind::EnterMenu2,
            _ => MapScriptKind::Unknown,
        }
    }

    /// Kinds whose entry points at a (var, value, script) table
    pub fn is_conditional(&self) -> bool {
        matches!(self, MapScriptKind::ValidateLoad1 | MapScriptKind::ValidateLoad2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapScript {
    pub kind: MapScriptKind,
    pub script: u32,
    /// Guard variable for conditional kinds, 0 otherwise
    pub var: u16,
    pub value: u16,
}

/// One decoded map
#[derive(Debug, Clone, PartialEq)]
pub struct Map {
    pub bank: u8,
    pub id: u8,
    pub name: String,
    pub width: usize,
    pub height: usize,
    tiles: Vec<Tile>,
    pub persons: Vec<PersonEvent>,
    pub warps: Vec<WarpEvent>,
    pub coord_events: Vec<CoordEvent>,
    pub signs: Vec<SignEvent>,
    pub connections: Vec<Connection>,
    pub map_scripts: Vec<MapScript>,
}

impl Map {
    /// Synthetic map over a row-major tile grid, no events
    pub fn from_grid(bank: u8, id: u8, width: usize, height: usize, tiles: Vec<Tile>) -> Self {
        let mut tiles = tiles;
        tiles.resize(width * height, Tile::wall());
        Map {
            bank,
            id,
            name: String::new(),
            width,
            height,
            tiles,
            persons: Vec::new(),
            warps: Vec::new(),
            coord_events: Vec::new(),
            signs: Vec::new(),
            connections: Vec::new(),
            map_scripts: Vec::new(),
        }
    }

    /// Parse an ASCII grid: `.` walkable, `#` wall, `>`/`<`/`^`/`v` ledges,
    /// `g` tall grass, `c` counter, `d` door.
    pub fn from_ascii(bank: u8, id: u8, rows: &[&str]) -> Self {
        let height = rows.len();
        let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
        let mut tiles = Vec::with_capacity(width * height);
        for row in rows {
            let mut cells: Vec<Tile> = row
                .chars()
                .map(|c| match c {
                    '.' => Tile::walkable(),
                    '>' => Tile::with_behavior(behavior::JUMP_RIGHT),
                    '<' => Tile::with_behavior(behavior::JUMP_LEFT),
                    '^' => Tile::with_behavior(behavior::JUMP_UP),
                    'v' => Tile::with_behavior(behavior::JUMP_DOWN),
                    'g' => Tile::with_behavior(behavior::TALL_GRASS),
                    'c' => Tile {
                        status: 0x01,
                        behavior: behavior::COUNTER,
                    },
                    'd' => Tile::with_behavior(behavior::DOOR),
                    _ => Tile::wall(),
                })
                .collect();
            cells.resize(width, Tile::wall());
            tiles.extend(cells);
        }
        Map::from_grid(bank, id, width, height, tiles)
    }

    /// Decode the map whose header lives at `header`
    pub fn read<M: MemoryAccess + ?Sized>(
        memory: &M,
        layout: &Layout,
        bank: u8,
        id: u8,
        header: u32,
    ) -> Result<Self, WorldError> {
        let mut r = Reader::new(memory, header);
        let layout_ptr = r.u32()?;
        let events_ptr = r.u32()?;
        let scripts_ptr = r.u32()?;
        let connections_ptr = r.u32()?;
        r.skip(4); // music, layout id
        let label = r.u8()?;

        // Layout header: width, height, border, data, tilesets
        let mut r = Reader::new(memory, layout_ptr);
        let width = r.u32()? as usize;
        let height = r.u32()? as usize;
        r.skip(4);
        let data_ptr = r.u32()?;
        let primary_ptr = r.u32()?;
        let secondary_ptr = r.u32()?;
        // Behaviour table is the last pointer of a tileset header
        let primary_attrs = memory.read_u32(primary_ptr.wrapping_add(20))?;
        let secondary_attrs = memory.read_u32(secondary_ptr.wrapping_add(20))?;

        let raw = memory.buffer_at(data_ptr, 2 * width * height)?;
        let mut attr_cache: HashMap<u16, u16> = HashMap::new();
        let mut tiles = Vec::with_capacity(width * height);
        for cell in raw.chunks_exact(2) {
            let data = u16::from_le_bytes([cell[0], cell[1]]);
            let tile = data & 0x3FF;
            let behavior = match attr_cache.get(&tile) {
                Some(b) => *b,
                None => {
                    let addr = if tile < PRIMARY_TILE_COUNT {
                        primary_attrs.wrapping_add(tile as u32 * 4)
                    } else {
                        secondary_attrs.wrapping_add((tile - PRIMARY_TILE_COUNT) as u32 * 4)
                    };
                    let b = memory.read_u16(addr)?;
                    attr_cache.insert(tile, b);
                    b
                }
            };
            tiles.push(Tile {
                status: (data >> 10) as u8,
                behavior,
            });
        }

        let mut r = Reader::new(memory, events_ptr);
        let person_count = r.u8()? as usize;
        let warp_count = r.u8()? as usize;
        let coord_count = r.u8()? as usize;
        let sign_count = r.u8()? as usize;
        let persons_ptr = r.u32()?;
        let warps_ptr = r.u32()?;
        let coords_ptr = r.u32()?;
        let signs_ptr = r.u32()?;

        let mut persons = Vec::with_capacity(person_count);
        for i in 0..person_count {
            let mut r = Reader::new(memory, persons_ptr.wrapping_add(24 * i as u32));
            let local_id = r.u8()?;
            let picture = r.u8()?;
            r.skip(2);
            let x = r.u16()?;
            let y = r.u16()?;
            let level = r.u8()?;
            let movement_type = r.u8()?;
            let movement = r.u8()?;
            r.skip(1);
            let trainer = r.u8()?;
            r.skip(1);
            let view = r.u16()?;
            let script = r.u32()?;
            let flag = r.u16()?;
            persons.push(PersonEvent {
                local_id,
                picture,
                x,
                y,
                level,
                movement_type,
                movement,
                trainer,
                view,
                script,
                flag,
            });
        }

        let mut warps = Vec::with_capacity(warp_count);
        for i in 0..warp_count {
            let mut r = Reader::new(memory, warps_ptr.wrapping_add(8 * i as u32));
            warps.push(WarpEvent {
                x: r.u16()?,
                y: r.u16()?,
                level: r.u8()?,
                dest_warp: r.u8()?,
                dest_map: r.u8()?,
                dest_bank: r.u8()?,
            });
        }

        let mut coord_events = Vec::with_capacity(coord_count);
        for i in 0..coord_count {
            let mut r = Reader::new(memory, coords_ptr.wrapping_add(16 * i as u32));
            let x = r.u16()?;
            let y = r.u16()?;
            let level = r.u8()?;
            r.skip(1);
            let var = r.u16()?;
            let value = r.u16()?;
            r.skip(2);
            let script = r.u32()?;
            coord_events.push(CoordEvent {
                x,
                y,
                level,
                var,
                value,
                script,
            });
        }

        let mut signs = Vec::with_capacity(sign_count);
        for i in 0..sign_count {
            let mut r = Reader::new(memory, signs_ptr.wrapping_add(12 * i as u32));
            let x = r.u16()?;
            let y = r.u16()?;
            let level = r.u8()?;
            let kind = r.u8()?;
            r.skip(2);
            let script = r.u32()?;
            signs.push(SignEvent {
                x,
                y,
                level,
                kind,
                script,
            });
        }

        let mut connections = Vec::new();
        if connections_ptr != 0 {
            let count = memory.read_u32(connections_ptr)?;
            let list = memory.read_u32(connections_ptr.wrapping_add(4))?;
            for i in 0..count {
                let mut r = Reader::new(memory, list.wrapping_add(12 * i));
                connections.push(Connection {
                    kind: ConnectionKind::from(r.u32()?),
                    offset: r.i32()?,
                    bank: r.u8()?,
                    map: r.u8()?,
                });
            }
        }

        let mut map_scripts = Vec::new();
        if scripts_ptr != 0 {
            let mut addr = scripts_ptr;
            loop {
                let kind = memory.read_u8(addr)?;
                if kind == 0 {
                    break;
                }
                let kind = MapScriptKind::from_byte(kind);
                let entry = memory.read_u32(addr.wrapping_add(1))?;
                let script = if kind.is_conditional() {
                    let mut r = Reader::new(memory, entry);
                    let var = r.u16()?;
                    let value = r.u16()?;
                    MapScript {
                        kind,
                        var,
                        value,
                        script: r.u32()?,
                    }
                } else {
                    MapScript {
                        kind,
                        script: entry,
                        var: 0,
                        value: 0,
                    }
                };
                map_scripts.push(script);
                addr = addr.wrapping_add(5);
            }
        }

        let name = match label.checked_sub(88) {
            Some(idx) => memory
                .read_u32(layout.map_names_table.wrapping_add(idx as u32 * 4))
                .and_then(|ptr| memory.read_string(ptr, crate::text::TERMINATOR, None))
                .unwrap_or_default(),
            None => String::new(),
        };

        trace!(
            "map ({}, {}) {:?}: {}x{}, {} persons, {} warps",
            bank,
            id,
            name,
            width,
            height,
            persons.len(),
            warps.len()
        );

        Ok(Map {
            bank,
            id,
            name,
            width,
            height,
            tiles,
            persons,
            warps,
            coord_events,
            signs,
            connections,
            map_scripts,
        })
    }

    pub fn tile(&self, x: i32, y: i32) -> Option<Tile> {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return None;
        }
        self.tiles.get(y as usize * self.width + x as usize).copied()
    }

    pub fn set_tile(&mut self, x: usize, y: usize, tile: Tile) {
        if x < self.width && y < self.height {
            self.tiles[y * self.width + x] = tile;
        }
    }

    pub fn is_walkable(&self, x: i32, y: i32) -> bool {
        self.tile(x, y).map(|t| t.is_walkable()).unwrap_or(false)
    }

    /// Build a fresh local pathfinder over this map's grid
    pub fn pathfinder(&self, config: &PathfinderConfig) -> Pathfinder {
        Pathfinder::new(self, config.clone())
    }
}

/// All decoded maps, grouped by bank
#[derive(Debug, Clone, Default)]
pub struct World {
    banks: Vec<Vec<Map>>,
}

impl World {
    /// Walk the bank table; a bank's map list ends where the next begins
    pub fn read<M: MemoryAccess + ?Sized>(memory: &M, layout: &Layout) -> Result<Self, WorldError> {
        let table = layout.map_banks_table;
        let mut banks = Vec::new();
        loop {
            let entry = table.wrapping_add(4 * banks.len() as u32);
            let start = memory.read_u32(entry)?;
            let next = memory.read_u32(entry.wrapping_add(4))?;
            if next <= 0x0800_0000 {
                break;
            }
            if next < start {
                return Err(WorldError::BadMapTable { address: entry });
            }
            let bank = banks.len() as u8;
            let mut maps = Vec::new();
            for (id, addr) in (start..next).step_by(4).enumerate() {
                let header = memory.read_u32(addr)?;
                maps.push(Map::read(memory, layout, bank, id as u8, header)?);
            }
            debug!("bank {}: {} maps", bank, maps.len());
            banks.push(maps);
        }
        Ok(World { banks })
    }

    /// Assemble a world from loose maps, placed by their (bank, id)
    pub fn from_maps(maps: Vec<Map>) -> Self {
        let mut banks: Vec<Vec<Option<Map>>> = Vec::new();
        for map in maps {
            let (b, m) = (map.bank as usize, map.id as usize);
            if banks.len() <= b {
                banks.resize_with(b + 1, Vec::new);
            }
            if banks[b].len() <= m {
                banks[b].resize_with(m + 1, || None);
            }
            banks[b][m] = Some(map);
        }
        let banks = banks
            .into_iter()
            .enumerate()
            .map(|(b, maps)| {
                maps.into_iter()
                    .enumerate()
                    .map(|(m, map)| {
                        map.unwrap_or_else(|| Map::from_grid(b as u8, m as u8, 0, 0, Vec::new()))
                    })
                    .collect()
            })
            .collect();
        World { banks }
    }

    pub fn map(&self, bank: u8, id: u8) -> Option<&Map> {
        self.banks.get(bank as usize)?.get(id as usize)
    }

    pub fn bank_count(&self) -> usize {
        self.banks.len()
    }

    pub fn maps(&self) -> impl Iterator<Item = &Map> {
        self.banks.iter().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryImage;
    use test_log::test;

    #[test]
    fn test_walkability_rules() {
        assert!(Tile::walkable().is_walkable());
        assert!(Tile { status: 0x10, behavior: 0 }.is_walkable());
        assert!(!Tile::wall().is_walkable());
        assert!(!Tile::with_behavior(behavior::ESCALATOR_UP).is_walkable());
        assert!(is_static_movement(8));
        assert!(!is_static_movement(2));
    }

    #[test]
    fn test_from_ascii() {
        let map = Map::from_ascii(0, 1, &["..#", ">.g"]);
        assert_eq!((map.width, map.height), (3, 2));
        assert!(map.is_walkable(0, 0));
        assert!(!map.is_walkable(2, 0));
        assert!(!map.is_walkable(3, 0));
        assert_eq!(map.tile(0, 1).unwrap().behavior, behavior::JUMP_RIGHT);
        assert_eq!(map.tile(2, 1).unwrap().behavior, behavior::TALL_GRASS);
    }

    #[test]
    fn test_world_from_maps_places_by_key() {
        let world = World::from_maps(vec![
            Map::from_ascii(1, 2, &["."]),
            Map::from_ascii(0, 0, &[".."]),
        ]);
        assert_eq!(world.bank_count(), 2);
        assert_eq!(world.map(1, 2).unwrap().width, 1);
        assert_eq!(world.map(0, 0).unwrap().width, 2);
        assert_eq!(world.map(1, 0).unwrap().width, 0);
        assert!(world.map(3, 0).is_none());
    }

    #[test]
    fn test_read_map_from_memory() {
        let rom = MemoryImage::ROM;
        let mut mem = MemoryImage::new().with_region(rom, vec![0; 0x400]);
        let header = rom;
        let layout_hdr = rom + 0x40;
        let events = rom + 0x80;
        let tileset = rom + 0xC0;
        let attrs = rom + 0x100;
        let data = rom + 0x140;
        let warps = rom + 0x180;

        mem.write_u32(header, layout_hdr).unwrap();
        mem.write_u32(header + 4, events).unwrap();
        mem.write_u8(header + 0x14, 0).unwrap();

        mem.write_u32(layout_hdr, 2).unwrap();
        mem.write_u32(layout_hdr + 4, 1).unwrap();
        mem.write_u32(layout_hdr + 12, data).unwrap();
        mem.write_u32(layout_hdr + 16, tileset).unwrap();
        mem.write_u32(layout_hdr + 20, tileset).unwrap();
        mem.write_u32(tileset + 20, attrs).unwrap();
        // tile 1 is tall grass
        mem.write_u16(attrs + 4, behavior::TALL_GRASS).unwrap();
        // status 0x0C over tile 0, status 0x01 over tile 1
        mem.write_u16(data, 0x0C << 10).unwrap();
        mem.write_u16(data + 2, (0x01 << 10) | 1).unwrap();

        mem.write_u8(events + 1, 1).unwrap();
        mem.write_u32(events + 8, warps).unwrap();
        mem.write_bytes(warps, &[3, 0, 4, 0, 0, 2, 7, 1]).unwrap();

        let map = Map::read(&mem, &Layout::default(), 1, 7, header).unwrap();
        assert_eq!((map.width, map.height), (2, 1));
        assert!(map.is_walkable(0, 0));
        assert!(!map.is_walkable(1, 0));
        assert_eq!(map.tile(1, 0).unwrap().behavior, behavior::TALL_GRASS);
        assert_eq!(
            map.warps,
            vec![WarpEvent {
                x: 3,
                y: 4,
                level: 0,
                dest_warp: 2,
                dest_map: 7,
                dest_bank: 1
            }]
        );
        assert!(map.connections.is_empty());
        assert!(map.map_scripts.is_empty());
    }
}
