use std::io::Write;
use std::sync::mpsc::{Receiver, TryRecvError};

use crate::alu::{self, AluOutput};
use crate::dprintln;
use crate::error::CpuError;
use crate::interrupt::{InterruptController, KeyOutcome, KEY_ADDR, VECTOR_BASE};
use crate::keyboard::KeyEvent;
use crate::memory::Memory;
use crate::opcode::{self, Category, Descriptor};
use crate::output::{Console, Output};
use crate::registers::{Registers, STACK_TOP};
use crate::timer::{TickSource, Timer, WallClock};

/// What a single cycle did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cycle {
    /// An instruction was fetched and executed.
    Executed(opcode::Opcode),
    /// An interrupt was delivered instead of fetching.
    Interrupted(u8),
    /// The CPU is not running; nothing happened.
    Stopped,
}

/// Complete machine state plus the event sources feeding it.
///
/// All mutation of memory and registers happens on the thread owning this value. The keyboard
/// listener only talks to it through the event channel drained at the top of each cycle.
pub struct Cpu {
    pub(crate) mem: Memory,
    pub(crate) reg: Registers,
    pub(crate) interrupts: InterruptController,
    timer: Timer,
    keys: Option<Receiver<KeyEvent>>,
    pub(crate) out: Box<dyn Write>,
    pub(crate) running: bool,
    trace: bool,
}

impl Cpu {
    pub fn new() -> Self {
        Cpu {
            mem: Memory::new(),
            reg: Registers::new(),
            interrupts: InterruptController::new(),
            timer: Timer::new(Box::new(WallClock::new())),
            keys: None,
            out: Box::new(Console),
            running: true,
            trace: false,
        }
    }

    /// Replace the tick source driving interrupt line 0.
    pub fn set_clock(&mut self, source: Box<dyn TickSource>) {
        self.timer = Timer::new(source);
    }

    /// Replace the sink receiving `PRN` and `PRA` output.
    pub fn set_output(&mut self, out: Box<dyn Write>) {
        self.out = out;
    }

    pub fn attach_keyboard(&mut self, keys: Receiver<KeyEvent>) {
        self.keys = Some(keys);
    }

    pub fn set_trace(&mut self, trace: bool) {
        self.trace = trace;
    }

    /// Copy a program image into memory at address 0.
    pub fn load(&mut self, image: &[u8]) -> Result<(), CpuError> {
        self.mem.load(image)
    }

    pub fn reg(&self, idx: usize) -> u8 {
        self.reg.get(idx)
    }

    pub fn registers(&self) -> &Registers {
        &self.reg
    }

    pub fn pc(&self) -> u8 {
        self.reg.pc
    }

    pub fn fl(&self) -> u8 {
        self.reg.fl
    }

    pub fn memory(&self) -> &Memory {
        &self.mem
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_servicing(&self) -> bool {
        self.interrupts.is_servicing()
    }

    /// Set the enable bit of `line` in IM, as a program does by writing R5.
    pub fn enable_interrupt(&mut self, line: u8) -> Result<(), CpuError> {
        self.interrupts.enable(&mut self.reg, line)
    }

    pub fn disable_interrupt(&mut self, line: u8) -> Result<(), CpuError> {
        self.interrupts.disable(&mut self.reg, line)
    }

    /// Mark `line` pending, as `INT` does.
    pub fn raise_interrupt(&mut self, line: u8) -> Result<(), CpuError> {
        self.interrupts.raise(&mut self.reg, line)
    }

    /// Request a stop, observed at the top of the next cycle.
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Run until halted, stopped or a fatal error.
    pub fn run(&mut self) -> Result<(), CpuError> {
        while self.step()? != Cycle::Stopped {}
        let _ = self.out.flush();
        Ok(())
    }

    /// Execute one cycle.
    pub fn step(&mut self) -> Result<Cycle, CpuError> {
        self.drain_keys()?;
        if !self.running {
            return Ok(Cycle::Stopped);
        }

        let mut deliver = self.interrupts.deliverable(&self.reg);

        if let Some(tick) = self.timer.poll() {
            if self.trace {
                dprintln!(Always, "Timer: {}", tick);
            }
            if self.interrupts.tick(&mut self.reg) {
                deliver = self.interrupts.deliverable(&self.reg);
            }
        }

        if let Some(line) = deliver {
            self.deliver(line)?;
            return Ok(Cycle::Interrupted(line));
        }

        if self.trace {
            self.trace_cycle();
        }

        let pc = self.reg.pc;
        let desc = opcode::decode(self.mem.read(pc as usize)?, pc)?;
        let a = self.operand(desc, 0)?;
        let b = self.operand(desc, 1)?;

        match desc.category {
            Category::Alu => self.execute_alu(desc, a, b)?,
            Category::DataOrStack | Category::ControlFlow => self.execute_control(desc, a, b)?,
        }
        // A halted CPU keeps PC on its `HLT`, which may be the last memory cell
        if desc.auto_advances() && self.running {
            self.advance(desc)?;
        }
        Ok(Cycle::Executed(desc.opcode))
    }

    /// Operand byte `n` of the current instruction; 0 if it has fewer operands.
    fn operand(&self, desc: &Descriptor, n: u8) -> Result<u8, CpuError> {
        if n < desc.operands {
            self.mem.read(self.reg.pc as usize + 1 + n as usize)
        } else {
            Ok(0)
        }
    }

    /// Address of the instruction following the current one.
    pub(crate) fn next_pc(&self, desc: &Descriptor) -> Result<u8, CpuError> {
        let next = self.reg.pc as usize + desc.len() as usize;
        u8::try_from(next).map_err(|_| CpuError::OutOfBoundsAccess(next))
    }

    pub(crate) fn advance(&mut self, desc: &Descriptor) -> Result<(), CpuError> {
        self.reg.pc = self.next_pc(desc)?;
        Ok(())
    }

    fn execute_alu(&mut self, desc: &Descriptor, a: u8, b: u8) -> Result<(), CpuError> {
        let lhs = self.reg.read(a)?;
        // Unary operations never look at their second operand
        let rhs = if desc.operands == 2 {
            self.reg.read(b)?
        } else {
            0
        };
        match alu::execute(desc.opcode, lhs, rhs)? {
            AluOutput::Register(val) => self.reg.write(a, val)?,
            AluOutput::Flags(fl) => self.reg.fl = fl,
        }
        Ok(())
    }

    pub(crate) fn push(&mut self, val: u8) -> Result<(), CpuError> {
        let sp = self.reg.sp();
        if sp == 0 {
            return Err(CpuError::StackOverflow);
        }
        self.reg.set_sp(sp - 1);
        self.mem.write(sp as usize - 1, val)
    }

    pub(crate) fn pop(&mut self) -> Result<u8, CpuError> {
        let sp = self.reg.sp();
        if sp >= STACK_TOP {
            return Err(CpuError::StackUnderflow);
        }
        let val = self.mem.read(sp as usize)?;
        self.reg.set_sp(sp + 1);
        Ok(val)
    }

    /// Save context and jump to the handler of `line`.
    fn deliver(&mut self, line: u8) -> Result<(), CpuError> {
        self.interrupts.enter(&mut self.reg, line)?;
        self.push(self.reg.pc)?;
        self.push(self.reg.fl)?;
        for r in 0..7 {
            self.push(self.reg.get(r))?;
        }
        let vector = VECTOR_BASE as usize + line as usize;
        let target = self.mem.read(vector)?;
        if self.trace {
            dprintln!(Always, "Interrupt {} >> {:02X}", line, target);
        }
        self.reg.pc = target;
        Ok(())
    }

    /// Restore context saved by [`Cpu::deliver`] and leave the handler.
    pub(crate) fn return_from_interrupt(&mut self) -> Result<(), CpuError> {
        for r in (0..7).rev() {
            let val = self.pop()?;
            self.reg.set(r, val);
        }
        self.reg.fl = self.pop()?;
        self.reg.pc = self.pop()?;
        self.interrupts.exit(&mut self.reg);
        Ok(())
    }

    /// Apply keyboard events queued since the last cycle.
    fn drain_keys(&mut self) -> Result<(), CpuError> {
        let Some(keys) = &self.keys else {
            return Ok(());
        };
        let mut events = Vec::new();
        let disconnected = loop {
            match keys.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) => break false,
                Err(TryRecvError::Disconnected) => break true,
            }
        };
        if disconnected {
            self.keys = None;
        }

        for event in events {
            match self.interrupts.key(&mut self.reg, event) {
                KeyOutcome::Deliver { code } => {
                    if self.trace {
                        dprintln!(Always, "KeyboardInterrupt: {} | {}", code as char, code);
                    }
                    self.mem.write(KEY_ADDR as usize, code)?;
                }
                KeyOutcome::Stop => self.running = false,
                KeyOutcome::Ignored => (),
            }
        }
        Ok(())
    }

    fn trace_cycle(&self) {
        let pc = self.reg.pc as usize;
        let byte = |addr: usize| self.mem.read(addr).unwrap_or(0);
        Output::Debugger(crate::output::Condition::Sometimes)
            .print_trace(&self.reg, [byte(pc), byte(pc + 1), byte(pc + 2)]);
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;
    use std::io;
    use std::rc::Rc;
    use std::sync::mpsc;

    use super::*;
    use crate::alu::{FL_EQUAL, FL_GREATER};
    use crate::interrupt::{KEYBOARD_LINE, TIMER_LINE};
    use crate::keyboard::Key;
    use crate::opcode::Opcode;
    use crate::registers::{IM, IS};
    use crate::timer::ManualClock;

    /// Output sink shared with the test.
    #[derive(Clone, Default)]
    pub struct Capture(Rc<RefCell<Vec<u8>>>);

    impl Capture {
        pub fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.borrow()).into_owned()
        }
    }

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// CPU with captured output and a hand-driven clock.
    pub fn cpu_with(program: &[u8]) -> (Cpu, Capture, ManualClock) {
        let mut cpu = Cpu::new();
        let capture = Capture::default();
        let clock = ManualClock::new();
        cpu.set_output(Box::new(capture.clone()));
        cpu.set_clock(Box::new(clock.clone()));
        cpu.load(program).unwrap();
        (cpu, capture, clock)
    }

    const LDI: u8 = Opcode::LDI as u8;
    const ADD: u8 = Opcode::ADD as u8;
    const DIV: u8 = Opcode::DIV as u8;
    const PRN: u8 = Opcode::PRN as u8;
    const PUSH: u8 = Opcode::PUSH as u8;
    const HLT: u8 = Opcode::HLT as u8;
    const JMP: u8 = Opcode::JMP as u8;
    const IRET: u8 = Opcode::IRET as u8;
    const CMP: u8 = Opcode::CMP as u8;
    const NOP: u8 = Opcode::NOP as u8;
    const INT: u8 = Opcode::INT as u8;

    #[test]
    fn adds_and_prints() {
        let (mut cpu, out, _) = cpu_with(&[
            LDI, 0, 8, //
            LDI, 1, 9, //
            ADD, 0, 1, //
            PRN, 0, //
            HLT,
        ]);
        cpu.run().unwrap();
        assert_eq!(out.text(), "17\n");
        assert!(!cpu.is_running());
        assert_eq!(cpu.pc(), 11);
    }

    #[test]
    fn division_by_zero_stops_execution() {
        let (mut cpu, out, _) = cpu_with(&[
            LDI, 0, 5, //
            DIV, 0, 1, //
            PRN, 0, //
            HLT,
        ]);
        assert_eq!(cpu.run(), Err(CpuError::DivisionByZero));
        assert_eq!(out.text(), "");
        assert_eq!(cpu.pc(), 3);
        assert_eq!(cpu.reg(0), 5);
    }

    #[test]
    fn stack_overflow_when_sp_reaches_zero() {
        // Jump to a PUSH loop above the stack so the pushes cannot overwrite it
        let mut program = vec![0; 256];
        program[..5].copy_from_slice(&[LDI, 1, 0xF5, JMP, 1]);
        program[0xF5..0xF9].copy_from_slice(&[PUSH, 0, JMP, 1]);
        let (mut cpu, _, _) = cpu_with(&program);

        let mut pushes = 0;
        let err = loop {
            match cpu.step() {
                Ok(Cycle::Executed(Opcode::PUSH)) => pushes += 1,
                Ok(_) => (),
                Err(e) => break e,
            }
        };
        assert_eq!(err, CpuError::StackOverflow);
        // One push per address from 0xF3 down to 0x00
        assert_eq!(pushes, STACK_TOP as usize);
        assert_eq!(cpu.registers().sp(), 0);
        assert_eq!(cpu.pc(), 0xF5);
    }

    #[test]
    fn stack_round_trip() {
        let (mut cpu, _, _) = cpu_with(&[]);
        let values = [3u8, 0, 255, 17, 42, 128];
        for v in values {
            cpu.push(v).unwrap();
        }
        for v in values.iter().rev() {
            assert_eq!(cpu.pop(), Ok(*v));
        }
        assert_eq!(cpu.registers().sp(), STACK_TOP);
        assert_eq!(cpu.pop(), Err(CpuError::StackUnderflow));
    }

    #[test]
    fn unrecognized_opcode() {
        let (mut cpu, _, _) = cpu_with(&[NOP, 0b1111_1111]);
        assert_eq!(
            cpu.run(),
            Err(CpuError::UnrecognizedOpcode {
                opcode: 0xFF,
                address: 1
            })
        );
    }

    #[test]
    fn running_off_the_end_is_out_of_bounds() {
        let mut program = vec![NOP; 256];
        program[254] = LDI;
        let (mut cpu, _, _) = cpu_with(&program);
        assert_eq!(cpu.run(), Err(CpuError::OutOfBoundsAccess(256)));
    }

    #[test]
    fn host_drives_interrupt_lines() {
        let mut program = vec![0; 256];
        program[..5].copy_from_slice(&[LDI, 2, 3, JMP, 2]);
        program[0x60] = IRET;
        program[VECTOR_BASE as usize + 2] = 0x60;
        let (mut cpu, _, _) = cpu_with(&program);
        cpu.step().unwrap();

        // Pending but masked
        cpu.raise_interrupt(2).unwrap();
        assert_eq!(cpu.step(), Ok(Cycle::Executed(Opcode::JMP)));

        cpu.enable_interrupt(2).unwrap();
        assert_eq!(cpu.step(), Ok(Cycle::Interrupted(2)));
        assert_eq!(cpu.step(), Ok(Cycle::Executed(Opcode::IRET)));
        assert_eq!(cpu.reg(IM), 0b100);

        cpu.disable_interrupt(2).unwrap();
        cpu.raise_interrupt(2).unwrap();
        assert_eq!(cpu.step(), Ok(Cycle::Executed(Opcode::JMP)));
        assert_eq!(cpu.reg(IS), 0b100);

        assert_eq!(cpu.enable_interrupt(8), Err(CpuError::InvalidInterruptLine(8)));
    }

    #[test]
    fn halt_in_last_cell() {
        let mut program = vec![NOP; 256];
        program[255] = HLT;
        let (mut cpu, _, _) = cpu_with(&program);
        assert_eq!(cpu.run(), Ok(()));
        assert!(!cpu.is_running());
        assert_eq!(cpu.pc(), 0xFF);
    }

    /// Main loop spins on `JMP R2`; the handler at 0x20 prints R0 and returns.
    fn timer_program() -> Vec<u8> {
        let mut program = vec![0; 256];
        let main = [
            LDI, 0, 7, // value printed by the handler
            LDI, 2, 9, // loop target
            LDI, IM as u8, 0b1, // enable timer line
            JMP, 2,
        ];
        program[..main.len()].copy_from_slice(&main);
        program[0x20..0x23].copy_from_slice(&[PRN, 0, IRET]);
        program[VECTOR_BASE as usize] = 0x20;
        program
    }

    #[test]
    fn timer_interrupt_once_per_tick() {
        let (mut cpu, out, clock) = cpu_with(&timer_program());
        let mut deliveries = 0;
        for _ in 0..2 {
            for _ in 0..50 {
                if let Cycle::Interrupted(TIMER_LINE) = cpu.step().unwrap() {
                    deliveries += 1;
                }
            }
            clock.advance();
        }
        for _ in 0..50 {
            if let Cycle::Interrupted(TIMER_LINE) = cpu.step().unwrap() {
                deliveries += 1;
            }
        }
        assert_eq!(deliveries, 2);
        assert_eq!(out.text(), "7\n7\n");
        assert!(!cpu.is_servicing());
    }

    #[test]
    fn iret_restores_context() {
        let (mut cpu, _, clock) = cpu_with(&timer_program());
        for _ in 0..4 {
            cpu.step().unwrap();
        }
        cpu.reg.fl = FL_GREATER;
        let before = *cpu.registers();
        assert_eq!(before.pc, 9);

        clock.advance();
        assert_eq!(cpu.step(), Ok(Cycle::Interrupted(0)));
        assert!(cpu.is_servicing());
        assert_eq!(cpu.pc(), 0x20);
        assert_eq!(cpu.registers().sp(), STACK_TOP - 9);

        assert_eq!(cpu.step(), Ok(Cycle::Executed(Opcode::PRN)));
        assert_eq!(cpu.step(), Ok(Cycle::Executed(Opcode::IRET)));
        assert!(!cpu.is_servicing());
        assert_eq!(*cpu.registers(), before);
    }

    #[test]
    fn no_nested_delivery() {
        // Handler for line 0 raises line 1 in software, then returns
        let mut program = vec![0; 256];
        let main = [
            LDI, IM as u8, 0b11, //
            LDI, 3, 0, //
            INT, 3, // raise line 0
            NOP, //
            HLT,
        ];
        program[..main.len()].copy_from_slice(&main);
        program[0x30..0x38].copy_from_slice(&[LDI, 4, 1, INT, 4, NOP, NOP, IRET]);
        program[0x40..0x43].copy_from_slice(&[PRN, 4, IRET]);
        program[VECTOR_BASE as usize] = 0x30;
        program[VECTOR_BASE as usize + 1] = 0x40;
        let (mut cpu, out, _) = cpu_with(&program);

        let mut cycles = Vec::new();
        while cpu.is_running() {
            cycles.push(cpu.step().unwrap());
        }
        assert_eq!(
            cycles,
            vec![
                Cycle::Executed(Opcode::LDI),
                Cycle::Executed(Opcode::LDI),
                Cycle::Executed(Opcode::INT),
                Cycle::Interrupted(0),
                Cycle::Executed(Opcode::LDI),
                Cycle::Executed(Opcode::INT),
                Cycle::Executed(Opcode::NOP),
                Cycle::Executed(Opcode::NOP),
                Cycle::Executed(Opcode::IRET),
                // Line 1 was raised inside the handler and survives IRET
                Cycle::Interrupted(1),
                Cycle::Executed(Opcode::PRN),
                Cycle::Executed(Opcode::IRET),
                Cycle::Executed(Opcode::NOP),
                Cycle::Executed(Opcode::HLT),
            ]
        );
        // R4 restored to its pre-interrupt value before the line 1 handler ran
        assert_eq!(out.text(), "0\n");
    }

    #[test]
    fn keyboard_writes_mapped_byte_once() {
        let mut program = vec![0; 256];
        let main = [
            LDI, IM as u8, 0b10, //
            LDI, 2, 6, //
            JMP, 2,
        ];
        program[..main.len()].copy_from_slice(&main);
        // Handler: load the key code and print it
        program[0x50..0x57].copy_from_slice(&[LDI, 3, KEY_ADDR, 0b1000_0011, 0, 3, PRN]);
        program[0x57..0x59].copy_from_slice(&[0, IRET]);
        program[VECTOR_BASE as usize + KEYBOARD_LINE as usize] = 0x50;
        let (mut cpu, out, _) = cpu_with(&program);
        let (tx, rx) = mpsc::sync_channel(8);
        cpu.attach_keyboard(rx);

        for _ in 0..3 {
            cpu.step().unwrap();
        }
        tx.send(KeyEvent::press(Key::Shift)).unwrap();
        tx.send(KeyEvent::press(Key::Char('a')).with_shift(true)).unwrap();
        tx.send(KeyEvent::release(Key::Char('a')).with_shift(true)).unwrap();
        tx.send(KeyEvent::release(Key::Shift)).unwrap();

        assert_eq!(cpu.step(), Ok(Cycle::Interrupted(KEYBOARD_LINE)));
        assert_eq!(cpu.memory().read(KEY_ADDR as usize), Ok(b'A'));
        for _ in 0..20 {
            cpu.step().unwrap();
        }
        assert_eq!(out.text(), "65\n");
        assert_eq!(cpu.reg(IS), 0);

        tx.send(KeyEvent::press(Key::Escape)).unwrap();
        assert_eq!(cpu.step(), Ok(Cycle::Stopped));
        assert!(!cpu.is_running());
    }

    #[test]
    fn compare_drives_flags() {
        let (mut cpu, _, _) = cpu_with(&[LDI, 0, 4, LDI, 1, 4, CMP, 0, 1, HLT]);
        cpu.run().unwrap();
        assert_eq!(cpu.fl(), FL_EQUAL);
    }
}
