use std::fmt;

use crate::error::CpuError;

/// Which unit executes an instruction, and who moves the PC afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    /// Data movement, stack and machine control. PC auto-advances.
    DataOrStack,
    /// Register arithmetic and comparison. PC auto-advances.
    Alu,
    /// Handler places the PC itself.
    ControlFlow,
}

/// Every instruction in the set. Discriminants are the encoded opcode bytes.
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    NOP = 0b0000_0000,
    HLT = 0b0000_0001,
    RET = 0b0001_0001,
    IRET = 0b0001_0011,
    PUSH = 0b0100_0101,
    POP = 0b0100_0110,
    PRN = 0b0100_0111,
    PRA = 0b0100_1000,
    CALL = 0b0101_0000,
    INT = 0b0101_0010,
    JMP = 0b0101_0100,
    JEQ = 0b0101_0101,
    JNE = 0b0101_0110,
    JGT = 0b0101_0111,
    JLT = 0b0101_1000,
    JLE = 0b0101_1001,
    JGE = 0b0101_1010,
    INC = 0b0110_0101,
    DEC = 0b0110_0110,
    NOT = 0b0110_1001,
    LDI = 0b1000_0010,
    LD = 0b1000_0011,
    ST = 0b1000_0100,
    ADD = 0b1010_0000,
    SUB = 0b1010_0001,
    MUL = 0b1010_0010,
    DIV = 0b1010_0011,
    MOD = 0b1010_0100,
    CMP = 0b1010_0111,
    AND = 0b1010_1000,
    OR = 0b1010_1010,
    XOR = 0b1010_1011,
    SHL = 0b1010_1100,
    SHR = 0b1010_1101,
}

/// Static facts about one opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Descriptor {
    pub opcode: Opcode,
    pub mnemonic: &'static str,
    /// Bytes following the opcode that belong to this instruction.
    pub operands: u8,
    pub category: Category,
}

impl Descriptor {
    /// Total encoded length, opcode included.
    pub const fn len(&self) -> u8 {
        self.operands + 1
    }

    /// Whether the execution loop moves the PC past this instruction.
    pub const fn auto_advances(&self) -> bool {
        !matches!(self.category, Category::ControlFlow)
    }
}

const fn desc(opcode: Opcode, mnemonic: &'static str, operands: u8, category: Category) -> Descriptor {
    Descriptor {
        opcode,
        mnemonic,
        operands,
        category,
    }
}

#[rustfmt::skip]
const DESCRIPTORS: [Descriptor; 34] = {
    use Category::*;
    use Opcode::*;
    [
        desc(NOP,  "NOP",  0, DataOrStack),
        desc(HLT,  "HLT",  0, DataOrStack),
        desc(RET,  "RET",  0, ControlFlow),
        desc(IRET, "IRET", 0, ControlFlow),
        desc(PUSH, "PUSH", 1, DataOrStack),
        desc(POP,  "POP",  1, DataOrStack),
        desc(PRN,  "PRN",  1, DataOrStack),
        desc(PRA,  "PRA",  1, DataOrStack),
        desc(CALL, "CALL", 1, ControlFlow),
        desc(INT,  "INT",  1, ControlFlow),
        desc(JMP,  "JMP",  1, ControlFlow),
        desc(JEQ,  "JEQ",  1, ControlFlow),
        desc(JNE,  "JNE",  1, ControlFlow),
        desc(JGT,  "JGT",  1, ControlFlow),
        desc(JLT,  "JLT",  1, ControlFlow),
        desc(JLE,  "JLE",  1, ControlFlow),
        desc(JGE,  "JGE",  1, ControlFlow),
        desc(INC,  "INC",  1, Alu),
        desc(DEC,  "DEC",  1, Alu),
        desc(NOT,  "NOT",  1, Alu),
        desc(LDI,  "LDI",  2, DataOrStack),
        desc(LD,   "LD",   2, DataOrStack),
        desc(ST,   "ST",   2, DataOrStack),
        desc(ADD,  "ADD",  2, Alu),
        desc(SUB,  "SUB",  2, Alu),
        desc(MUL,  "MUL",  2, Alu),
        desc(DIV,  "DIV",  2, Alu),
        desc(MOD,  "MOD",  2, Alu),
        desc(CMP,  "CMP",  2, Alu),
        desc(AND,  "AND",  2, Alu),
        desc(OR,   "OR",   2, Alu),
        desc(XOR,  "XOR",  2, Alu),
        desc(SHL,  "SHL",  2, Alu),
        desc(SHR,  "SHR",  2, Alu),
    ]
};

/// Lookup table indexed by opcode byte. Built at compile time.
static DECODE_TABLE: [Option<Descriptor>; 256] = {
    let mut table = [None; 256];
    let mut i = 0;
    while i < DESCRIPTORS.len() {
        let desc = DESCRIPTORS[i];
        table[desc.opcode as u8 as usize] = Some(desc);
        i += 1;
    }
    table
};

/// Decode an opcode byte fetched from `address`.
pub fn decode(byte: u8, address: u8) -> Result<&'static Descriptor, CpuError> {
    DECODE_TABLE[byte as usize]
        .as_ref()
        .ok_or(CpuError::UnrecognizedOpcode {
            opcode: byte,
            address,
        })
}

/// Every descriptor, in opcode order.
pub fn descriptors() -> impl Iterator<Item = &'static Descriptor> {
    DECODE_TABLE.iter().flatten()
}

impl Opcode {
    pub fn mnemonic(self) -> &'static str {
        DECODE_TABLE[self as u8 as usize]
            .as_ref()
            .map_or("???", |desc| desc.mnemonic)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// An instruction together with its operand bytes, for listings.
pub struct Listing<'a> {
    pub desc: &'a Descriptor,
    pub operands: &'a [u8],
}

impl fmt::Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.desc.mnemonic)?;
        for (i, operand) in self.operands.iter().enumerate() {
            let sep = if i == 0 { " " } else { "," };
            // Second operand of LDI is an immediate
            if self.desc.opcode == Opcode::LDI && i == 1 {
                write!(f, "{sep}{operand}")?;
            } else {
                write!(f, "{sep}R{operand}")?;
            }
        }
        Ok(())
    }
}
