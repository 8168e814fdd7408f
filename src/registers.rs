use crate::error::CpuError;

/// Register holding the stack pointer.
pub const SP: usize = 7;
/// Register holding the interrupt mask (enabled lines).
pub const IM: usize = 5;
/// Register holding the interrupt status (pending lines).
pub const IS: usize = 6;

/// Stack pointer value for an empty stack. Addresses above it are reserved.
pub const STACK_TOP: u8 = 0xF4;

/// General purpose registers, program counter and flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Registers {
    gp: [u8; 8],
    pub pc: u8,
    pub fl: u8,
}

impl Registers {
    pub fn new() -> Self {
        let mut gp = [0; 8];
        gp[SP] = STACK_TOP;
        Registers { gp, pc: 0, fl: 0 }
    }

    /// Resolve an operand byte to a register index.
    pub fn index(operand: u8) -> Result<usize, CpuError> {
        let idx = operand as usize;
        if idx < 8 {
            Ok(idx)
        } else {
            Err(CpuError::InvalidRegister(operand))
        }
    }

    pub fn get(&self, idx: usize) -> u8 {
        self.gp[idx]
    }

    pub fn set(&mut self, idx: usize, val: u8) {
        self.gp[idx] = val;
    }

    /// Value of the register named by an operand byte.
    pub fn read(&self, operand: u8) -> Result<u8, CpuError> {
        Ok(self.gp[Self::index(operand)?])
    }

    pub fn write(&mut self, operand: u8, val: u8) -> Result<(), CpuError> {
        self.gp[Self::index(operand)?] = val;
        Ok(())
    }

    pub fn sp(&self) -> u8 {
        self.gp[SP]
    }

    pub fn set_sp(&mut self, val: u8) {
        self.gp[SP] = val;
    }

    pub fn im(&self) -> u8 {
        self.gp[IM]
    }

    pub fn is(&self) -> u8 {
        self.gp[IS]
    }

    pub fn set_im(&mut self, val: u8) {
        self.gp[IM] = val;
    }

    pub fn set_is(&mut self, val: u8) {
        self.gp[IS] = val;
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.gp.iter().copied()
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}
