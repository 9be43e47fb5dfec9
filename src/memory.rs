//! Typed reads of the emulated address space.
//!
//! Addresses carry their region in the high byte (0x02 work RAM, 0x03 internal
//! RAM, 0x08 cartridge ROM, ...). The core never learns how regions are backed;
//! it only asks a [`MemoryAccess`] for bytes.

use crate::error::MemoryError;
use crate::text;

/// Primitive field formats understood by [`MemoryAccess::read_typed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    U8,
    U16,
    U32,
    I8,
    I16,
    I32,
    /// Skipped bytes (not returned)
    Pad(usize),
}

impl Field {
    /// Size in bytes of this field
    pub fn size(&self) -> usize {
        match self {
            Field::U8 | Field::I8 => 1,
            Field::U16 | Field::I16 => 2,
            Field::U32 | Field::I32 => 4,
            Field::Pad(n) => *n,
        }
    }
}

/// Total size of a list of fields
pub fn layout_size(fields: &[Field]) -> usize {
    fields.iter().map(Field::size).sum()
}

/// Read access to the emulated process, little-endian
pub trait MemoryAccess {
    /// Borrow `len` bytes starting at `address`
    fn read_bytes(&self, address: u32, len: usize) -> Result<&[u8], MemoryError>;

    fn read_u8(&self, address: u32) -> Result<u8, MemoryError> {
        Ok(self.read_bytes(address, 1)?[0])
    }

    fn read_u16(&self, address: u32) -> Result<u16, MemoryError> {
        let b = self.read_bytes(address, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_u32(&self, address: u32) -> Result<u32, MemoryError> {
        let b = self.read_bytes(address, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_i8(&self, address: u32) -> Result<i8, MemoryError> {
        Ok(self.read_u8(address)? as i8)
    }

    fn read_i16(&self, address: u32) -> Result<i16, MemoryError> {
        Ok(self.read_u16(address)? as i16)
    }

    fn read_i32(&self, address: u32) -> Result<i32, MemoryError> {
        Ok(self.read_u32(address)? as i32)
    }

    /// Decode a packed sequence of primitives. Padding is skipped.
    fn read_typed(&self, address: u32, fields: &[Field]) -> Result<Vec<i64>, MemoryError> {
        let bytes = self.read_bytes(address, layout_size(fields))?;
        let mut values = Vec::with_capacity(fields.len());
        let mut offset = 0;
        for field in fields {
            let b = &bytes[offset..offset + field.size()];
            let value = match field {
                Field::U8 => b[0] as i64,
                Field::I8 => b[0] as i8 as i64,
                Field::U16 => u16::from_le_bytes([b[0], b[1]]) as i64,
                Field::I16 => i16::from_le_bytes([b[0], b[1]]) as i64,
                Field::U32 => u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64,
                Field::I32 => i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64,
                Field::Pad(_) => {
                    offset += field.size();
                    continue;
                }
            };
            values.push(value);
            offset += field.size();
        }
        Ok(values)
    }

    /// Read a game-charset string until `delimiter` or `max_len` bytes
    fn read_string(
        &self,
        address: u32,
        delimiter: u8,
        max_len: Option<usize>,
    ) -> Result<String, MemoryError> {
        let mut raw = Vec::new();
        let limit = max_len.unwrap_or(text::MAX_STRING_LEN);
        let mut addr = address;
        while raw.len() < limit {
            let byte = self.read_u8(addr)?;
            if byte == delimiter {
                break;
            }
            raw.push(byte);
            addr = addr.wrapping_add(1);
        }
        Ok(text::decode(&raw))
    }

    /// Window of bytes for bulk struct decoding
    fn buffer_at(&self, address: u32, len: usize) -> Result<&[u8], MemoryError> {
        self.read_bytes(address, len)
    }
}

/// Sequential field reader over a [`MemoryAccess`]
pub struct Reader<'a, M: MemoryAccess + ?Sized> {
    memory: &'a M,
    address: u32,
}

impl<'a, M: MemoryAccess + ?Sized> Reader<'a, M> {
    pub fn new(memory: &'a M, address: u32) -> Self {
        Reader { memory, address }
    }

    /// Address of the next unread byte
    pub fn position(&self) -> u32 {
        self.address
    }

    pub fn u8(&mut self) -> Result<u8, MemoryError> {
        let v = self.memory.read_u8(self.address)?;
        self.address = self.address.wrapping_add(1);
        Ok(v)
    }

    pub fn u16(&mut self) -> Result<u16, MemoryError> {
        let v = self.memory.read_u16(self.address)?;
        self.address = self.address.wrapping_add(2);
        Ok(v)
    }

    pub fn u32(&mut self) -> Result<u32, MemoryError> {
        let v = self.memory.read_u32(self.address)?;
        self.address = self.address.wrapping_add(4);
        Ok(v)
    }

    pub fn i32(&mut self) -> Result<i32, MemoryError> {
        Ok(self.u32()? as i32)
    }

    pub fn skip(&mut self, n: u32) -> &mut Self {
        self.address = self.address.wrapping_add(n);
        self
    }
}

/// A region-mapped memory snapshot
#[derive(Debug, Default, Clone)]
pub struct MemoryImage {
    /// (base address, bytes), kept sorted by base
    regions: Vec<(u32, Vec<u8>)>,
}

impl MemoryImage {
    pub const EWRAM: u32 = 0x0200_0000;
    pub const IWRAM: u32 = 0x0300_0000;
    pub const ROM: u32 = 0x0800_0000;

    pub fn new() -> Self {
        MemoryImage {
            regions: Vec::new(),
        }
    }

    /// Map `bytes` at `base`, replacing any region with the same base
    pub fn with_region(mut self, base: u32, bytes: Vec<u8>) -> Self {
        self.map_region(base, bytes);
        self
    }

    pub fn map_region(&mut self, base: u32, bytes: Vec<u8>) {
        self.regions.retain(|(b, _)| *b != base);
        self.regions.push((base, bytes));
        self.regions.sort_by_key(|(b, _)| *b);
    }

    /// Overwrite bytes inside an existing region (test and snapshot helper)
    pub fn write_bytes(&mut self, address: u32, data: &[u8]) -> Result<(), MemoryError> {
        let (base, bytes) = self
            .regions
            .iter_mut()
            .rev()
            .find(|(b, _)| *b <= address)
            .ok_or(MemoryError::Unmapped { address })?;
        let start = (address - *base) as usize;
        let end = start + data.len();
        if end > bytes.len() {
            return Err(MemoryError::OutOfBounds {
                address,
                len: data.len(),
            });
        }
        bytes[start..end].copy_from_slice(data);
        Ok(())
    }

    pub fn write_u8(&mut self, address: u32, value: u8) -> Result<(), MemoryError> {
        self.write_bytes(address, &[value])
    }

    pub fn write_u16(&mut self, address: u32, value: u16) -> Result<(), MemoryError> {
        self.write_bytes(address, &value.to_le_bytes())
    }

    pub fn write_u32(&mut self, address: u32, value: u32) -> Result<(), MemoryError> {
        self.write_bytes(address, &value.to_le_bytes())
    }
}

impl MemoryAccess for MemoryImage {
    fn read_bytes(&self, address: u32, len: usize) -> Result<&[u8], MemoryError> {
        let (base, bytes) = self
            .regions
            .iter()
            .rev()
            .find(|(b, _)| *b <= address)
            .ok_or(MemoryError::Unmapped { address })?;
        let start = (address - base) as usize;
        if start >= bytes.len() {
            return Err(MemoryError::Unmapped { address });
        }
        bytes
            .get(start..start + len)
            .ok_or(MemoryError::OutOfBounds { address, len })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn image() -> MemoryImage {
        let mut rom = vec![0u8; 64];
        rom[0..4].copy_from_slice(&0x0803_0201u32.to_le_bytes());
        rom[4] = 0xFF;
        rom[5] = 0xFE;
        MemoryImage::new()
            .with_region(MemoryImage::ROM, rom)
            .with_region(MemoryImage::EWRAM, vec![0u8; 16])
    }

    #[test]
    fn test_typed_reads_are_little_endian() {
        let mem = image();
        assert_eq!(mem.read_u32(0x0800_0000).unwrap(), 0x0803_0201);
        assert_eq!(mem.read_u16(0x0800_0001).unwrap(), 0x0302);
        assert_eq!(mem.read_i8(0x0800_0004).unwrap(), -1);
        let values = mem
            .read_typed(0x0800_0000, &[Field::U8, Field::Pad(1), Field::U16, Field::I16])
            .unwrap();
        assert_eq!(values, vec![0x01, 0x0803, -257]);
    }

    #[test]
    fn test_unmapped_and_out_of_bounds() {
        let mem = image();
        assert_eq!(
            mem.read_u8(0x0100_0000),
            Err(MemoryError::Unmapped {
                address: 0x0100_0000
            })
        );
        assert_eq!(
            mem.read_u32(0x0200_000E),
            Err(MemoryError::OutOfBounds {
                address: 0x0200_000E,
                len: 4
            })
        );
    }

    #[test]
    fn test_write_then_reader() {
        let mut mem = image();
        mem.write_u16(0x0200_0002, 0xBEEF).unwrap();
        let mut r = Reader::new(&mem, 0x0200_0000);
        r.skip(2);
        assert_eq!(r.u16().unwrap(), 0xBEEF);
        assert_eq!(r.position(), 0x0200_0004);
    }

    #[test]
    fn test_reader_wraps_at_top_of_address_space() {
        let mem = image();
        let mut r = Reader::new(&mem, 0xFFFF_FFFE);
        r.skip(4);
        assert_eq!(r.position(), 0x0000_0002);
        let mut r = Reader::new(&mem, 0xFFFF_FFFF);
        assert!(r.u8().is_err());
        assert_eq!(r.position(), 0xFFFF_FFFF);
    }
}
