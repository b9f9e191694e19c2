use crate::error::Fault;

/// Size of the whole 16-bit address space.
pub const ADDRESS_SPACE: usize = 0x1_0000;

/// Something the processor can read bytes from and write bytes to.
pub trait Memory {
    fn read_byte(&mut self, address: u16) -> Result<u8, Fault>;
    fn write_byte(&mut self, address: u16, data: u8) -> Result<(), Fault>;
    /// Number of addressable bytes.
    fn size(&self) -> usize;
    /// Zero everything.
    fn clear(&mut self);
}

/// A flat, zero-initialised array of bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Ram {
    cells: Vec<u8>,
}

impl Default for Ram {
    fn default() -> Self {
        Ram::new(ADDRESS_SPACE)
    }
}

impl Ram {
    pub fn new(size_in_bytes: usize) -> Ram {
        return Ram {
            cells: vec![0; size_in_bytes],
        };
    }

    fn check(&self, address: usize) -> Result<usize, Fault> {
        if address < self.cells.len() {
            Ok(address)
        } else {
            Err(Fault::OutOfBounds {
                address,
                size: self.cells.len(),
            })
        }
    }

    /// Put a copy of `bytes` into memory, the first one landing at `start`.
    pub fn load(&mut self, bytes: &[u8], start: usize) -> Result<(), Fault> {
        if bytes.is_empty() {
            return Ok(());
        }
        let end = self.check(start + bytes.len() - 1)? + 1;
        self.cells[start..end].copy_from_slice(bytes);
        Ok(())
    }

    /// Borrow the bytes in `[from, to)`.
    pub fn get_range(&self, from: usize, to: usize) -> Result<&[u8], Fault> {
        if to > self.cells.len() {
            return Err(Fault::OutOfBounds {
                address: to - 1,
                size: self.cells.len(),
            });
        }
        self.cells.get(from..to).ok_or(Fault::OutOfBounds {
            address: from,
            size: self.cells.len(),
        })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.cells
    }
}

impl Memory for Ram {
    fn read_byte(&mut self, address: u16) -> Result<u8, Fault> {
        let index = self.check(address as usize)?;
        Ok(self.cells[index])
    }
    fn write_byte(&mut self, address: u16, data: u8) -> Result<(), Fault> {
        let index = self.check(address as usize)?;
        self.cells[index] = data;
        Ok(())
    }
    fn size(&self) -> usize {
        self.cells.len()
    }
    fn clear(&mut self) {
        self.cells.fill(0);
    }
}
