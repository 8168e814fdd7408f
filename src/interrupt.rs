//! Interrupt controller.
//!
//! The enable mask lives in R5 (IM) and the pending mask in R6 (IS), one bit per line. At the top
//! of every cycle both are decoded into [`Lines`]; if the controller is in the normal state, the
//! lowest numbered line that is both enabled and pending is delivered. While a handler runs no
//! further line is delivered, though sources may keep raising pending bits. Those raises are
//! latched and survive the register restore performed by `IRET`.

use crate::error::CpuError;
use crate::keyboard::{Key, KeyAction, KeyEvent};
use crate::registers::Registers;

pub const LINE_COUNT: u8 = 8;
/// Line raised once per elapsed timer tick.
pub const TIMER_LINE: u8 = 0;
/// Line raised by key presses.
pub const KEYBOARD_LINE: u8 = 1;

/// First entry of the vector table; line `i` jumps to the address stored at `VECTOR_BASE + i`.
pub const VECTOR_BASE: u8 = 0xF8;
/// Memory-mapped byte receiving the code of the last delivered key.
pub const KEY_ADDR: u8 = 0xF4;

/// Enable and pending state for every line, decoded from IM and IS.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Lines {
    pub enabled: [bool; 8],
    pub pending: [bool; 8],
}

impl Lines {
    pub fn decode(im: u8, is: u8) -> Self {
        let mut lines = Lines::default();
        for i in 0..LINE_COUNT as usize {
            lines.enabled[i] = im & (1 << i) != 0;
            lines.pending[i] = is & (1 << i) != 0;
        }
        lines
    }

    /// Lowest numbered line that is enabled and pending.
    pub fn highest_priority(&self) -> Option<u8> {
        (0..LINE_COUNT).find(|&i| self.enabled[i as usize] && self.pending[i as usize])
    }
}

/// What a drained keyboard event did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Line 1 was raised; `code` must be written to [`KEY_ADDR`].
    Deliver { code: u8 },
    /// The run should stop.
    Stop,
    Ignored,
}

#[derive(Debug, Default)]
pub struct InterruptController {
    servicing: bool,
    /// Lines raised while servicing, restored into IS on return.
    latched: u8,
    shift_held: bool,
}

fn bit(line: u8) -> Result<u8, CpuError> {
    if line < LINE_COUNT {
        Ok(1 << line)
    } else {
        Err(CpuError::InvalidInterruptLine(line))
    }
}

impl InterruptController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_servicing(&self) -> bool {
        self.servicing
    }

    /// Line to deliver this cycle, if any.
    pub fn deliverable(&self, reg: &Registers) -> Option<u8> {
        if self.servicing {
            return None;
        }
        Lines::decode(reg.im(), reg.is()).highest_priority()
    }

    pub fn enable(&self, reg: &mut Registers, line: u8) -> Result<(), CpuError> {
        reg.set_im(reg.im() | bit(line)?);
        Ok(())
    }

    pub fn disable(&self, reg: &mut Registers, line: u8) -> Result<(), CpuError> {
        reg.set_im(reg.im() & !bit(line)?);
        Ok(())
    }

    /// Mark a line pending.
    pub fn raise(&mut self, reg: &mut Registers, line: u8) -> Result<(), CpuError> {
        let bit = bit(line)?;
        reg.set_is(reg.is() | bit);
        if self.servicing {
            self.latched |= bit;
        }
        Ok(())
    }

    /// Clear a line's pending bit.
    pub fn acknowledge(&mut self, reg: &mut Registers, line: u8) -> Result<(), CpuError> {
        let bit = bit(line)?;
        reg.set_is(reg.is() & !bit);
        self.latched &= !bit;
        Ok(())
    }

    /// Raise the timer line after an observed tick. Ignored while disabled or servicing.
    pub fn tick(&mut self, reg: &mut Registers) -> bool {
        let lines = Lines::decode(reg.im(), reg.is());
        if self.servicing || !lines.enabled[TIMER_LINE as usize] {
            return false;
        }
        reg.set_is(reg.is() | 1 << TIMER_LINE);
        true
    }

    /// Apply a keyboard event to the shift state and the keyboard line.
    pub fn key(&mut self, reg: &mut Registers, event: KeyEvent) -> KeyOutcome {
        match (event.key, event.action) {
            (Key::Shift, action) => {
                self.shift_held = action == KeyAction::Press;
                KeyOutcome::Ignored
            }
            (Key::Escape, KeyAction::Press) => KeyOutcome::Stop,
            (Key::Char(ch), KeyAction::Press) => {
                let lines = Lines::decode(reg.im(), reg.is());
                let line = KEYBOARD_LINE as usize;
                if !lines.enabled[line] || lines.pending[line] {
                    return KeyOutcome::Ignored;
                }
                let ch = if self.shift_held || event.shift {
                    ch.to_ascii_uppercase()
                } else {
                    ch
                };
                let bit = 1 << KEYBOARD_LINE;
                reg.set_is(reg.is() | bit);
                if self.servicing {
                    self.latched |= bit;
                }
                KeyOutcome::Deliver {
                    code: (ch as u32 & 0xFF) as u8,
                }
            }
            _ => KeyOutcome::Ignored,
        }
    }

    /// Normal to Servicing. Clears the line's pending bit; the caller saves context and vectors.
    pub fn enter(&mut self, reg: &mut Registers, line: u8) -> Result<(), CpuError> {
        self.acknowledge(reg, line)?;
        self.servicing = true;
        self.latched = 0;
        Ok(())
    }

    /// Servicing to Normal. Call after the saved registers were restored.
    pub fn exit(&mut self, reg: &mut Registers) {
        reg.set_is(reg.is() | self.latched);
        self.latched = 0;
        self.servicing = false;
    }
}
