use crate::error::MemoryError;

/// Size of the full 16-bit address space.
pub const ADDRESS_SPACE: usize = 0x10000;

/// Flat, byte-addressable store. Every access is bounds-checked against the
/// configured capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memory {
    data: Vec<u8>, // 64KB unless configured smaller
}

impl Memory {
    pub fn new() -> Self {
        Memory {
            data: vec![0; ADDRESS_SPACE],
        }
    }

    /// Creates a zeroed store of `capacity` bytes, clamped to the address space.
    pub fn with_capacity(capacity: usize) -> Self {
        Memory {
            data: vec![0; capacity.min(ADDRESS_SPACE)],
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    fn check(&self, address: u16) -> Result<usize, MemoryError> {
        let index = address as usize;
        if index >= self.data.len() {
            return Err(MemoryError::AddressOutOfRange {
                address,
                capacity: self.data.len(),
            });
        }
        Ok(index)
    }

    pub fn read(&self, address: u16) -> Result<u8, MemoryError> {
        let index = self.check(address)?;
        Ok(self.data[index])
    }

    pub fn write(&mut self, address: u16, value: u8) -> Result<(), MemoryError> {
        let index = self.check(address)?;
        self.data[index] = value;
        Ok(())
    }

    // Read a 16-bit value in little-endian format
    pub fn read_u16(&self, address: u16) -> Result<u16, MemoryError> {
        let low = self.read(address)? as u16;
        let high = self.read(address.wrapping_add(1))? as u16;
        Ok((high << 8) | low)
    }

    // Write a 16-bit value in little-endian format
    pub fn write_u16(&mut self, address: u16, value: u16) -> Result<(), MemoryError> {
        self.write(address, (value & 0xFF) as u8)?;
        self.write(address.wrapping_add(1), (value >> 8) as u8)
    }

    /// Copies `data` verbatim starting at `start`. Fails without writing
    /// anything if the image would run past the end of memory.
    pub fn load_image(&mut self, start: u16, data: &[u8]) -> Result<(), MemoryError> {
        let begin = start as usize;
        let end = begin + data.len();
        if end > self.data.len() {
            return Err(MemoryError::ImageTooLarge {
                start,
                len: data.len(),
                capacity: self.data.len(),
            });
        }
        self.data[begin..end].copy_from_slice(data);
        Ok(())
    }

    /// Zeroes every byte.
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Raw view of the whole store.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}
