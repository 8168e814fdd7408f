//! Data movement, stack, branch, subroutine, interrupt and output instructions.

use std::io::Write;

use crate::alu::{FL_EQUAL, FL_GREATER, FL_LESS};
use crate::error::CpuError;
use crate::opcode::{Descriptor, Opcode};
use crate::registers::Registers;
use crate::runtime::Cpu;

impl Cpu {
    /// Execute an instruction that is not handled by the ALU.
    ///
    /// `ControlFlow` instructions leave the PC where execution continues; everything else leaves it
    /// for the execution loop to advance.
    pub(crate) fn execute_control(
        &mut self,
        desc: &Descriptor,
        a: u8,
        b: u8,
    ) -> Result<(), CpuError> {
        match desc.opcode {
            Opcode::NOP => (),
            Opcode::HLT => self.running = false,

            Opcode::LDI => self.reg.write(a, b)?,
            Opcode::LD => {
                let addr = self.reg.read(b)?;
                let val = self.mem.read(addr as usize)?;
                self.reg.write(a, val)?;
            }
            Opcode::ST => {
                let addr = self.reg.read(a)?;
                let val = self.reg.read(b)?;
                self.mem.write(addr as usize, val)?;
            }

            Opcode::PUSH => {
                let val = self.reg.read(a)?;
                self.push(val)?;
            }
            Opcode::POP => {
                // Validate the destination before touching the stack
                let dest = Registers::index(a)?;
                let val = self.pop()?;
                self.reg.set(dest, val);
            }

            Opcode::PRN => {
                let val = self.reg.read(a)?;
                let _ = writeln!(self.out, "{val}");
            }
            Opcode::PRA => {
                let val = self.reg.read(a)?;
                let _ = write!(self.out, "{}", val as char);
                let _ = self.out.flush();
            }

            Opcode::CALL => {
                let target = self.reg.read(a)?;
                let ret = self.next_pc(desc)?;
                self.push(ret)?;
                self.reg.pc = target;
            }
            Opcode::RET => self.reg.pc = self.pop()?,

            Opcode::INT => {
                let line = self.reg.read(a)?;
                self.raise_interrupt(line)?;
                self.advance(desc)?;
            }
            Opcode::IRET => self.return_from_interrupt()?,

            Opcode::JMP => self.reg.pc = self.reg.read(a)?,
            Opcode::JEQ => self.branch(desc, a, |fl| fl == FL_EQUAL)?,
            Opcode::JNE => self.branch(desc, a, |fl| fl != FL_EQUAL)?,
            Opcode::JGT => self.branch(desc, a, |fl| fl == FL_GREATER)?,
            Opcode::JGE => self.branch(desc, a, |fl| fl == FL_GREATER || fl == FL_EQUAL)?,
            Opcode::JLT => self.branch(desc, a, |fl| fl == FL_LESS)?,
            Opcode::JLE => self.branch(desc, a, |fl| fl == FL_LESS || fl == FL_EQUAL)?,

            _ => return Err(CpuError::UnsupportedOperation(desc.mnemonic)),
        }
        Ok(())
    }

    /// Jump to the address in register `a` if `cond` holds for FL, otherwise fall through.
    fn branch(&mut self, desc: &Descriptor, a: u8, cond: fn(u8) -> bool) -> Result<(), CpuError> {
        let target = self.reg.read(a)?;
        if cond(self.reg.fl) {
            self.reg.pc = target;
            Ok(())
        } else {
            self.advance(desc)
        }
    }
}
