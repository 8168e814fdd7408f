use std::borrow::Cow;
use std::cell::RefCell;
use std::io::{self, Write};
use std::str::Chars;

use colored::{ColoredString, Colorize};

use crate::registers::Registers;

#[macro_export]
macro_rules! dprintln {
    ( $cond:expr ) => {{
        #[allow(unused_imports)]
        use $crate::output::Condition::*;
        $crate::output::Output::Debugger($cond).print_str("\n");
    }};
    ( $cond:expr, $fmt:literal $($tt:tt)* ) => {{
        #[allow(unused_imports)]
        use $crate::output::Condition::*;
        let s = format!(
            concat!($fmt, "\n")
            $($tt)*
        );
        $crate::output::Output::Debugger($cond).print_str(&s);
    }};
    // Trigger type error if missing condition
    ( $fmt:literal $($tt:tt)* ) => {{
        $crate::output::Output::Debugger($fmt);
    }};
}

/// Program output goes to stdout, trace output to stderr.
#[derive(Clone, Copy, Debug)]
pub enum Output {
    Normal,
    Debugger(Condition),
}

/// Whether a trace line survives `--minimal`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Condition {
    Always,
    Sometimes,
}

struct Decolored<'a> {
    chars: Chars<'a>,
}

impl Output {
    thread_local! {
        static IS_LINE_START: RefCell<bool> = const { RefCell::new(true) };
        static IS_MINIMAL: RefCell<bool> = const { RefCell::new(false) };
        static IS_RAW: RefCell<bool> = const { RefCell::new(false) };
    }

    pub fn set_line_start(new_value: bool) -> bool {
        Self::IS_LINE_START.with(|value| value.replace(new_value))
    }
    /// Private. Use [`Output::start_new_line`].
    fn is_line_start() -> bool {
        Self::IS_LINE_START.with(|value| *value.borrow())
    }
    pub fn set_minimal(new_value: bool) -> bool {
        Self::IS_MINIMAL.with(|value| value.replace(new_value))
    }
    pub fn is_minimal() -> bool {
        Self::IS_MINIMAL.with(|value| *value.borrow())
    }
    /// Terminal is in raw mode: line feeds need an explicit carriage return.
    pub fn set_raw(new_value: bool) -> bool {
        Self::IS_RAW.with(|value| value.replace(new_value))
    }
    fn is_raw() -> bool {
        Self::IS_RAW.with(|value| *value.borrow())
    }

    fn set_line_start_from_str(string: &str) {
        let last = Decolored::new(string).last();
        if let Some(ch) = last {
            Output::set_line_start(ch == '\n');
        }
    }

    fn cook(string: &str) -> Cow<'_, str> {
        if Self::is_raw() && string.contains('\n') {
            Cow::Owned(string.replace('\n', "\r\n"))
        } else {
            Cow::Borrowed(string)
        }
    }

    /// Write program output to stdout, returning the error instead of panicking on a closed pipe.
    fn write_stdout(string: &str) -> io::Result<()> {
        let string = Self::cook(string);
        let mut stdout = io::stdout().lock();
        stdout.write_all(string.as_bytes())?;
        stdout.flush()?;
        Self::set_line_start_from_str(&string);
        Ok(())
    }

    pub fn print_str(&self, string: &str) {
        match self {
            Self::Normal => {
                let _ = Self::write_stdout(string);
            }

            Self::Debugger(condition) => match (Self::is_minimal(), *condition) {
                (false, _) => {
                    let string = Self::cook(string);
                    eprint!("{}", ColoredString::from(string.as_ref()).blue());
                    Self::set_line_start_from_str(&string);
                }
                // Always remove color if `--minimal`
                (true, Condition::Always) => {
                    let string = Self::cook(string);
                    eprint_colorless(&string);
                    Self::set_line_start_from_str(&string);
                }
                (true, Condition::Sometimes) => (),
            },
        }
    }

    pub fn start_new_line(&self) {
        if !Self::is_line_start() {
            self.print_str("\n");
        }
    }

    /// One trace line: `TRACE: PC | OP A B | FL | R0 .. R7`.
    pub fn print_trace(&self, reg: &Registers, window: [u8; 3]) {
        self.start_new_line();
        let mut line = format!(
            "TRACE: {:02X} | {:02X} {:02X} {:02X} | {:02X} |",
            reg.pc, window[0], window[1], window[2], reg.fl
        );
        for value in reg.iter() {
            line.push_str(&format!(" {:02X}", value));
        }
        line.push('\n');
        self.print_str(&line);
    }
}

/// Sink for `PRN`/`PRA` writing through [`Output::Normal`].
#[derive(Clone, Copy, Debug, Default)]
pub struct Console;

impl Write for Console {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Output::write_stdout(&String::from_utf8_lossy(buf))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }
}

impl<'a> Decolored<'a> {
    pub fn new(string: &'a str) -> Self {
        Self {
            chars: string.chars(),
        }
    }
}

impl<'a> Iterator for Decolored<'a> {
    type Item = char;
    fn next(&mut self) -> Option<Self::Item> {
        while let Some(ch) = self.chars.next() {
            // Skip everything between '\x1b' and 'm' (inclusive)
            if ch == '\x1b' {
                while self.chars.next().is_some_and(|ch| ch != 'm') {}
                continue;
            }
            return Some(ch);
        }
        None
    }
}

fn eprint_colorless(string: &str) {
    for ch in Decolored::new(string) {
        eprint!("{}", ch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decolored() {
        assert_eq!(Decolored::new("abcdef").collect::<String>(), "abcdef");
        assert_eq!(
            Decolored::new("abc\x1b[0;2mdef\x1b[0m").collect::<String>(),
            "abcdef"
        );
        assert_eq!(Decolored::new("abc\x1b[0xyz").collect::<String>(), "abc");
    }

    #[test]
    fn tracks_line_start() {
        Output::set_minimal(true);
        Output::Debugger(Condition::Always).print_str("partial");
        assert!(!Output::is_line_start());
        Output::Debugger(Condition::Always).print_str("done\n");
        assert!(Output::is_line_start());
    }

    #[test]
    fn raw_mode_adds_carriage_returns() {
        Output::set_raw(true);
        assert_eq!(Output::cook("a\nb\n"), "a\r\nb\r\n");
        Output::set_raw(false);
        assert!(matches!(Output::cook("a\nb"), Cow::Borrowed("a\nb")));
    }
}
