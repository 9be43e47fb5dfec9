//! Read-only game state consulted by the script VM.

use crate::config::Layout;
use crate::memory::{MemoryAccess, Reader};
use crate::world::Map;
use log::debug;

/// Move-name lookup for listings
pub trait MoveNames {
    fn move_name(&self, id: u16) -> Option<String>;
}

/// Live game state the VM may consult. Every query has a best-effort
/// default so a blank implementation is enough for pure decoding.
pub trait GameData {
    /// Address of standard script `index`
    fn std_script(&self, _index: u8) -> Option<u32> {
        None
    }

    /// Number of options in multichoice list `id`
    fn multichoice_len(&self, _id: u8) -> Option<usize> {
        None
    }

    /// Quantity of `item` across all bag pockets
    fn item_count(&self, _item: u16) -> u16 {
        0
    }

    fn money(&self) -> u32 {
        0
    }

    fn party_size(&self) -> u8 {
        1
    }

    /// First party slot whose moveset contains `move_id`
    fn party_move_slot(&self, _move_id: u16) -> Option<u8> {
        None
    }

    /// 0 for male, 1 for female
    fn player_gender(&self) -> u8 {
        0
    }

    fn player_position(&self) -> Option<(u16, u16)> {
        None
    }

    /// Visibility flag of person `local_id` on map (bank, map)
    fn person_flag(&self, _bank: u8, _map: u8, _local_id: u8) -> Option<u16> {
        None
    }

    /// Current value of a game flag, when readable
    fn flag(&self, _id: u16) -> Option<bool> {
        None
    }

    fn move_names(&self) -> Option<&dyn MoveNames> {
        None
    }
}

/// Fallback that knows nothing about the running game
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGameData;

impl GameData for NoGameData {}

/// Canned answers for synthetic scenarios
#[derive(Debug, Clone, Default)]
pub struct StaticGameData {
    pub std_scripts: Vec<u32>,
    pub multichoice_lens: Vec<usize>,
    pub items: Vec<(u16, u16)>,
    pub money: u32,
    pub party_size: u8,
    pub maps: Vec<Map>,
}

impl GameData for StaticGameData {
    fn std_script(&self, index: u8) -> Option<u32> {
        self.std_scripts.get(index as usize).copied()
    }

    fn multichoice_len(&self, id: u8) -> Option<usize> {
        self.multichoice_lens.get(id as usize).copied()
    }

    fn item_count(&self, item: u16) -> u16 {
        self.items
            .iter()
            .find(|(id, _)| *id == item)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }

    fn money(&self) -> u32 {
        self.money
    }

    fn party_size(&self) -> u8 {
        self.party_size
    }

    fn person_flag(&self, bank: u8, map: u8, local_id: u8) -> Option<u16> {
        self.maps
            .iter()
            .find(|m| m.bank == bank && m.id == map)?
            .persons
            .iter()
            .find(|p| p.local_id == local_id)
            .map(|p| p.flag)
    }
}

/// Order of the four encrypted party substructures, by personality % 24
const SUBSTRUCT_ORDER: [&[u8; 4]; 24] = [
    b"GAEM", b"GAME", b"GEAM", b"GEMA", b"GMAE", b"GMEA", b"AGEM", b"AGME", b"AEGM", b"AEMG",
    b"AMGE", b"AMEG", b"EGAM", b"EGMA", b"EAGM", b"EAMG", b"EMGA", b"EMAG", b"MGAE", b"MGEA",
    b"MAGE", b"MAEG", b"MEGA", b"MEAG",
];

const PARTY_MEMBER_SIZE: u32 = 100;

/// [`GameData`] backed by emulator memory and the configured layout
pub struct MemoryGameData<'a, M: MemoryAccess + ?Sized> {
    memory: &'a M,
    layout: Layout,
}

impl<'a, M: MemoryAccess + ?Sized> MemoryGameData<'a, M> {
    pub fn new(memory: &'a M, layout: Layout) -> Self {
        MemoryGameData { memory, layout }
    }

    fn save_block1(&self) -> Option<u32> {
        self.memory
            .read_u32(self.layout.save_block1_ptr)
            .ok()
            .filter(|p| *p != 0)
    }

    fn save_block2(&self) -> Option<u32> {
        self.memory
            .read_u32(self.layout.save_block2_ptr)
            .ok()
            .filter(|p| *p != 0)
    }

    fn encryption_key(&self) -> u32 {
        self.save_block2()
            .and_then(|p| {
                self.memory
                    .read_u32(p.wrapping_add(self.layout.encryption_key_offset))
                    .ok()
            })
            .unwrap_or(0)
    }

    /// The four moves of party member `slot`, decrypted
    fn party_moves(&self, slot: u32) -> Option<[u16; 4]> {
        let base = self.layout.party_data.wrapping_add(slot * PARTY_MEMBER_SIZE);
        let personality = self.memory.read_u32(base).ok()?;
        let trainer_id = self.memory.read_u32(base.wrapping_add(4)).ok()?;
        if personality == 0 && trainer_id == 0 {
            return None;
        }
        let key = personality ^ trainer_id;
        let order = SUBSTRUCT_ORDER[(personality % 24) as usize];
        let index = order.iter().position(|&c| c == b'A')? as u32;
        let attacks = base.wrapping_add(32 + 12 * index);
        let mut r = Reader::new(self.memory, attacks);
        let w0 = r.u32().ok()? ^ key;
        let w1 = r.u32().ok()? ^ key;
        Some([w0 as u16, (w0 >> 16) as u16, w1 as u16, (w1 >> 16) as u16])
    }
}

impl<'a, M: MemoryAccess + ?Sized> GameData for MemoryGameData<'a, M> {
    fn std_script(&self, index: u8) -> Option<u32> {
        if index >= self.layout.std_scripts_count {
            debug!("standard script {} out of range", index);
            return None;
        }
        self.memory
            .read_u32(self.layout.std_scripts_table.wrapping_add(4 * index as u32))
            .ok()
    }

    fn multichoice_len(&self, id: u8) -> Option<usize> {
        if id >= self.layout.multichoice_count {
            return None;
        }
        // Entries are (options pointer, count, padding)
        self.memory
            .read_u8(self.layout.multichoice_table.wrapping_add(8 * id as u32 + 4))
            .ok()
            .map(|n| n as usize)
    }

    fn item_count(&self, item: u16) -> u16 {
        let key = self.encryption_key() as u16;
        for pocket in 0..self.layout.bag_pocket_count {
            let mut r = Reader::new(self.memory, self.layout.bag_pocket_table.wrapping_add(8 * pocket));
            let (items, capacity) = match (r.u32(), r.u32()) {
                (Ok(items), Ok(capacity)) => (items, capacity),
                _ => continue,
            };
            for slot in 0..capacity {
                let mut r = Reader::new(self.memory, items.wrapping_add(4 * slot));
                if let (Ok(id), Ok(quantity)) = (r.u16(), r.u16()) {
                    if id == item {
                        return quantity ^ key;
                    }
                }
            }
        }
        0
    }

    fn money(&self) -> u32 {
        self.save_block1()
            .and_then(|p| self.memory.read_u32(p.wrapping_add(self.layout.money_offset)).ok())
            .map(|m| m ^ self.encryption_key())
            .unwrap_or(0)
    }

    fn party_size(&self) -> u8 {
        self.memory.read_u8(self.layout.party_count).unwrap_or(0)
    }

    fn party_move_slot(&self, move_id: u16) -> Option<u8> {
        (0..self.party_size().min(6) as u32)
            .find(|&slot| {
                self.party_moves(slot)
                    .map(|moves| moves.contains(&move_id))
                    .unwrap_or(false)
            })
            .map(|slot| slot as u8)
    }

    fn player_gender(&self) -> u8 {
        self.save_block2()
            .and_then(|p| self.memory.read_u8(p.wrapping_add(self.layout.player_gender_offset)).ok())
            .unwrap_or(0)
    }

    fn player_position(&self) -> Option<(u16, u16)> {
        let p = self.save_block1()?;
        let mut r = Reader::new(self.memory, p);
        Some((r.u16().ok()?, r.u16().ok()?))
    }

    fn person_flag(&self, bank: u8, map: u8, local_id: u8) -> Option<u16> {
        let table = self.layout.map_banks_table;
        let maps = self.memory.read_u32(table.wrapping_add(4 * bank as u32)).ok()?;
        let header = self.memory.read_u32(maps.wrapping_add(4 * map as u32)).ok()?;
        let events = self.memory.read_u32(header.wrapping_add(4)).ok()?;
        let count = self.memory.read_u8(events).ok()? as u32;
        let persons = self.memory.read_u32(events.wrapping_add(4)).ok()?;
        (0..count)
            .map(|i| persons.wrapping_add(24 * i))
            .find(|&p| self.memory.read_u8(p).ok() == Some(local_id))
            .and_then(|p| self.memory.read_u16(p.wrapping_add(20)).ok())
    }

    fn flag(&self, id: u16) -> Option<bool> {
        let base = self.save_block1()?.wrapping_add(self.layout.flags_offset);
        let byte = self.memory.read_u8(base.wrapping_add(id as u32 >> 3)).ok()?;
        Some(byte & (1 << (id & 7)) != 0)
    }

    fn move_names(&self) -> Option<&dyn MoveNames> {
        if self.layout.move_names == 0 {
            None
        } else {
            Some(self)
        }
    }
}

impl<'a, M: MemoryAccess + ?Sized> MoveNames for MemoryGameData<'a, M> {
    fn move_name(&self, id: u16) -> Option<String> {
        if id as u32 >= self.layout.move_count {
            return None;
        }
        let len = self.layout.move_name_len;
        self.memory
            .read_string(
                self.layout.move_names.wrapping_add(id as u32 * len),
                crate::text::TERMINATOR,
                Some(len as usize),
            )
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryImage;
    use test_log::test;

    fn layout() -> Layout {
        Layout {
            save_block1_ptr: MemoryImage::IWRAM,
            save_block2_ptr: MemoryImage::IWRAM + 4,
            ..Layout::default()
        }
    }

    fn memory() -> MemoryImage {
        let ewram = MemoryImage::EWRAM;
        let mut mem = MemoryImage::new()
            .with_region(MemoryImage::IWRAM, vec![0; 0x10])
            .with_region(ewram, vec![0; 0x40000]);
        // save block 1 at EWRAM+0x1000, block 2 at EWRAM+0x3000
        mem.write_u32(MemoryImage::IWRAM, ewram + 0x1000).unwrap();
        mem.write_u32(MemoryImage::IWRAM + 4, ewram + 0x3000).unwrap();
        mem.write_u32(ewram + 0x3000 + 0xF20, 0x0001_0003).unwrap();
        mem
    }

    #[test]
    fn test_money_is_decrypted() {
        let mut mem = memory();
        mem.write_u32(MemoryImage::EWRAM + 0x1000 + 0x290, 3000 ^ 0x0001_0003).unwrap();
        let data = MemoryGameData::new(&mem, layout());
        assert_eq!(data.money(), 3000);
    }

    #[test]
    fn test_flags_and_position() {
        let mut mem = memory();
        let sb1 = MemoryImage::EWRAM + 0x1000;
        mem.write_u16(sb1, 12).unwrap();
        mem.write_u16(sb1 + 2, 9).unwrap();
        mem.write_u8(sb1 + 0xEE0 + 1, 0b0000_0100).unwrap();
        let data = MemoryGameData::new(&mem, layout());
        assert_eq!(data.player_position(), Some((12, 9)));
        assert_eq!(data.flag(10), Some(true));
        assert_eq!(data.flag(11), Some(false));
    }

    #[test]
    fn test_party_move_slot() {
        let mut mem = memory();
        let layout = Layout {
            party_count: MemoryImage::EWRAM + 0x10,
            party_data: MemoryImage::EWRAM + 0x100,
            ..layout()
        };
        mem.write_u8(layout.party_count, 1).unwrap();
        // personality 0 puts the attacks substructure second
        let base = layout.party_data;
        let key = 0x1234_5678u32;
        mem.write_u32(base + 4, key).unwrap();
        mem.write_u32(base + 32 + 12, (33 | (45 << 16)) ^ key).unwrap();
        mem.write_u32(base + 32 + 16, 0 ^ key).unwrap();
        let data = MemoryGameData::new(&mem, layout);
        assert_eq!(data.party_move_slot(45), Some(0));
        assert_eq!(data.party_move_slot(15), None);
    }

    #[test]
    fn test_defaults_are_best_effort() {
        let data = NoGameData;
        assert_eq!(data.std_script(0), None);
        assert_eq!(data.party_size(), 1);
        assert_eq!(data.item_count(4), 0);
    }
}
