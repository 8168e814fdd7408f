use miette::{miette, Diagnostic, LabeledSpan, Report, Severity};
use thiserror::Error;

use crate::span::Span;

/// Fatal conditions raised while executing a program.
///
/// None of these are recovered from; the execution loop stops and hands the error to its caller.
#[derive(Error, Diagnostic, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CpuError {
    #[error("memory access out of bounds at address {0:#05x}")]
    #[diagnostic(
        code(cpu::out_of_bounds),
        help("memory is 256 bytes; check that the program does not run off its end")
    )]
    OutOfBoundsAccess(usize),

    #[error("stack overflow")]
    #[diagnostic(
        code(cpu::stack_overflow),
        help("the stack pointer reached address 0; look for unbalanced PUSH or runaway recursion")
    )]
    StackOverflow,

    #[error("stack underflow")]
    #[diagnostic(
        code(cpu::stack_underflow),
        help("POP, RET or IRET was executed with an empty stack")
    )]
    StackUnderflow,

    #[error("division by zero")]
    #[diagnostic(code(cpu::div_zero), help("the divisor register of DIV or MOD holds 0"))]
    DivisionByZero,

    #[error("unrecognized opcode {opcode:#010b} at address {address:#04x}")]
    #[diagnostic(
        code(cpu::bad_opcode),
        help("execution may have jumped into data, or the program file has a typo")
    )]
    UnrecognizedOpcode { opcode: u8, address: u8 },

    #[error("unsupported operation {0} for this execution unit")]
    #[diagnostic(code(cpu::unsupported))]
    UnsupportedOperation(&'static str),

    #[error("operand {0} is not a register index")]
    #[diagnostic(code(cpu::bad_register), help("registers are numbered R0 to R7"))]
    InvalidRegister(u8),

    #[error("interrupt line {0} does not exist")]
    #[diagnostic(code(cpu::bad_interrupt), help("interrupt lines are numbered 0 to 7"))]
    InvalidInterruptLine(u8),
}

// Loader errors

pub fn load_invalid_lit(span: Span, src: &str, reason: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "load::bad_lit",
        help = "each line must hold one byte written as up to 8 binary digits, like 10000010",
        labels = vec![LabeledSpan::at(span.as_range(), "incorrect literal")],
        "Encountered an invalid binary literal: {reason}",
    )
    .with_source_code(src.to_owned())
}

pub fn load_too_long(span: Span, src: &str, len: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "load::too_long",
        help = "programs are loaded from address 0 and may hold at most 256 bytes",
        labels = vec![LabeledSpan::at(span.as_range(), "does not fit in memory")],
        "Program is {len} bytes long and cannot fit in memory",
    )
    .with_source_code(src.to_owned())
}
