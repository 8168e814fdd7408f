use crate::error::CpuError;

/// Number of addressable bytes.
pub const MEMORY_SIZE: usize = 0x100;

/// Flat, zero-initialised byte memory.
pub struct Memory {
    cells: Box<[u8; MEMORY_SIZE]>,
}

impl Memory {
    pub fn new() -> Self {
        Memory {
            cells: Box::new([0; MEMORY_SIZE]),
        }
    }

    pub fn read(&self, addr: usize) -> Result<u8, CpuError> {
        self.cells
            .get(addr)
            .copied()
            .ok_or(CpuError::OutOfBoundsAccess(addr))
    }

    pub fn write(&mut self, addr: usize, val: u8) -> Result<(), CpuError> {
        let cell = self
            .cells
            .get_mut(addr)
            .ok_or(CpuError::OutOfBoundsAccess(addr))?;
        *cell = val;
        Ok(())
    }

    /// Copy a program image into memory starting at address 0.
    pub fn load(&mut self, image: &[u8]) -> Result<(), CpuError> {
        if image.len() > MEMORY_SIZE {
            return Err(CpuError::OutOfBoundsAccess(MEMORY_SIZE));
        }
        self.cells[..image.len()].copy_from_slice(image);
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.cells[..]
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}
