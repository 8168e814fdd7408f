use miette::Result;

use crate::error;
use crate::memory::MEMORY_SIZE;
use crate::span::{Idx, Span};

/// Parse a program file into its memory image.
///
/// One byte per line, written in binary. `#` starts a comment; blank lines are skipped.
pub fn parse(src: &str) -> Result<Vec<u8>> {
    let mut image = Vec::new();
    let mut offset = 0;

    for line in src.split_inclusive('\n') {
        let start = offset;
        offset += line.len();

        let code = line.split('#').next().unwrap_or_default();
        let literal = code.trim();
        if literal.is_empty() {
            continue;
        }

        let lead = code.len() - code.trim_start().len();
        let span = Span::new(Idx((start + lead) as u32), literal.len() as u16);

        let byte = parse_byte(literal).map_err(|e| error::load_invalid_lit(span, src, e))?;
        if image.len() == MEMORY_SIZE {
            return Err(error::load_too_long(span, src, count_bytes(src)));
        }
        image.push(byte);
    }
    Ok(image)
}

fn parse_byte(literal: &str) -> Result<u8, &'static str> {
    if !literal.bytes().all(|b| b == b'0' || b == b'1') {
        return Err("expected binary digits");
    }
    if literal.len() > 8 {
        return Err("more than 8 bits");
    }
    u8::from_str_radix(literal, 2).map_err(|_| "expected binary digits")
}

// Total number of byte lines, for the error message
fn count_bytes(src: &str) -> usize {
    src.lines()
        .filter(|line| !line.split('#').next().unwrap_or_default().trim().is_empty())
        .count()
}
