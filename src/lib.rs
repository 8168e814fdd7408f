// Decoding
mod opcode;
pub use opcode::{decode, descriptors, Category, Descriptor, Listing, Opcode};

// Machine state
mod memory;
pub use memory::{Memory, MEMORY_SIZE};
mod registers;
pub use registers::{Registers, IM, IS, SP, STACK_TOP};

// Execution
mod alu;
pub use alu::{AluOutput, FL_EQUAL, FL_GREATER, FL_LESS};
mod control;
mod runtime;
pub use runtime::{Cpu, Cycle};

// Interrupts and their sources
mod interrupt;
pub use interrupt::{InterruptController, Lines, KEYBOARD_LINE, KEY_ADDR, TIMER_LINE, VECTOR_BASE};
mod keyboard;
pub use keyboard::{Key, KeyAction, KeyEvent, Keyboard};
mod timer;
pub use timer::{ManualClock, TickSource, WallClock};

// Program files
pub mod loader;
mod span;

#[macro_use]
pub mod output;
mod error;
pub use error::CpuError;

pub mod env;

/// Amount of lines to show as context, each side of focus line (line containing span).
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 4;
