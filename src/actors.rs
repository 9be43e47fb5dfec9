//! Live overworld actors and the occupancy view the pathfinder consults.

use crate::config::Layout;
use crate::error::MemoryError;
use crate::game::GameData;
use crate::memory::{MemoryAccess, Reader};
use crate::world::Map;
use log::trace;
use std::collections::HashSet;

/// Size of one overworld object record
pub const OW_OBJECT_SIZE: u32 = 0x24;

/// Screen-space coordinates are offset by this much
const COORD_BIAS: i32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Down,
    Up,
    Left,
    Right,
}

impl Direction {
    fn from_raw(raw: u16) -> Option<Self> {
        match raw.checked_sub(1)? {
            0 => Some(Direction::Down),
            1 => Some(Direction::Up),
            2 => Some(Direction::Left),
            3 => Some(Direction::Right),
            _ => None,
        }
    }

    pub fn delta(&self) -> (i32, i32) {
        match self {
            Direction::Down => (0, 1),
            Direction::Up => (0, -1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}

/// Player animation state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Static,
    Turning,
    Walking,
    Other(u8),
}

impl From<u8> for PlayerState {
    fn from(raw: u8) -> Self {
        match raw {
            0 => PlayerState::Static,
            1 => PlayerState::Turning,
            2 => PlayerState::Walking,
            other => PlayerState::Other(other),
        }
    }
}

/// One overworld object (player, NPC, item ball...)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwObject {
    pub flags: u8,
    pub picture: u8,
    pub movement_type: u16,
    pub local_id: u8,
    pub map: u8,
    pub bank: u8,
    /// Cell the object is walking towards
    pub dest: (i32, i32),
    /// Cell the object is rendered on
    pub current: (i32, i32),
    pub facing: Option<Direction>,
}

impl OwObject {
    pub fn read<M: MemoryAccess + ?Sized>(memory: &M, address: u32) -> Result<Self, MemoryError> {
        let mut r = Reader::new(memory, address);
        r.skip(1);
        let flags = r.u8()?;
        r.skip(3);
        let picture = r.u8()?;
        let movement_type = r.u16()?;
        let local_id = r.u8()?;
        let map = r.u8()?;
        let bank = r.u8()?;
        r.skip(1 + 2 * 2); // jump state, spawn position
        let dest_x = r.u16()? as i32 - COORD_BIAS;
        let dest_y = r.u16()? as i32 - COORD_BIAS;
        let cur_x = r.u16()? as i32 - COORD_BIAS;
        let cur_y = r.u16()? as i32 - COORD_BIAS;
        r.skip(2 * 2 + 4);
        let facing = Direction::from_raw(r.u16()?);
        Ok(OwObject {
            flags,
            picture,
            movement_type,
            local_id,
            map,
            bank,
            dest: (dest_x, dest_y),
            current: (cur_x, cur_y),
            facing,
        })
    }

    /// Unused slots end the table
    pub fn is_empty(&self) -> bool {
        self.bank == 0 && self.map == 0
    }
}

/// Per-frame snapshot of the overworld object table
#[derive(Debug, Clone, Default)]
pub struct Overworld {
    frame: Option<u64>,
    /// Slot 0 is the player
    pub objects: Vec<OwObject>,
    pub player_state: Option<PlayerState>,
}

impl Overworld {
    pub fn new() -> Self {
        Overworld::default()
    }

    /// Re-decode the table unless it was already read for `frame`.
    /// Returns whether a read happened.
    pub fn refresh<M: MemoryAccess + ?Sized>(
        &mut self,
        frame: u64,
        memory: &M,
        layout: &Layout,
    ) -> Result<bool, MemoryError> {
        if self.frame == Some(frame) {
            return Ok(false);
        }
        let mut objects = Vec::with_capacity(layout.ow_object_count as usize);
        for i in 0..layout.ow_object_count {
            objects.push(OwObject::read(memory, layout.ow_objects.wrapping_add(i * OW_OBJECT_SIZE))?);
        }
        self.objects = objects;
        self.player_state = Some(PlayerState::from(memory.read_u8(layout.player_state)?));
        self.frame = Some(frame);
        trace!("overworld refreshed at frame {}", frame);
        Ok(true)
    }

    pub fn player(&self) -> Option<&OwObject> {
        self.objects.first()
    }

    /// Non-player objects up to the first empty slot
    pub fn npcs(&self) -> impl Iterator<Item = &OwObject> {
        self.objects.iter().skip(1).take_while(|o| !o.is_empty())
    }

    /// Rendered position of the NPC with this local id on (bank, map)
    pub fn position_of(&self, bank: u8, map: u8, local_id: u8) -> Option<(i32, i32)> {
        self.npcs()
            .find(|o| o.bank == bank && o.map == map && o.local_id == local_id)
            .map(|o| o.current)
    }
}

/// Answers whether a cell currently hosts something that blocks walking
pub trait Occupancy {
    fn is_occupied(&self, x: i32, y: i32) -> bool;
}

/// Nothing ever blocks
pub struct NoOccupancy;

impl Occupancy for NoOccupancy {
    fn is_occupied(&self, _x: i32, _y: i32) -> bool {
        false
    }
}

impl<F: Fn(i32, i32) -> bool> Occupancy for F {
    fn is_occupied(&self, x: i32, y: i32) -> bool {
        self(x, y)
    }
}

/// Cells blocked by actors on one map, captured at construction
#[derive(Debug, Clone, Default)]
pub struct ActorOccupancy {
    cells: HashSet<(i32, i32)>,
}

impl ActorOccupancy {
    /// Static visible persons of `map`, every overworld object heading to a
    /// cell of the map, and cells claimed by pending scripted movement
    pub fn build(map: &Map, overworld: &Overworld, game: &dyn GameData, pending: &[(i32, i32)]) -> Self {
        let mut cells = HashSet::new();
        for person in &map.persons {
            let visible = person.is_visible(|flag| game.flag(flag).unwrap_or(false));
            if visible && person.is_static() {
                cells.insert((person.x as i32, person.y as i32));
            }
        }
        for object in overworld.npcs() {
            if object.bank == map.bank && object.map == map.id {
                cells.insert(object.dest);
            }
        }
        cells.extend(pending.iter().copied());
        ActorOccupancy { cells }
    }

    pub fn cells(&self) -> &HashSet<(i32, i32)> {
        &self.cells
    }
}

impl Occupancy for ActorOccupancy {
    fn is_occupied(&self, x: i32, y: i32) -> bool {
        self.cells.contains(&(x, y))
    }
}
