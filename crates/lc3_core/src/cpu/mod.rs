//! Emulation of the LC-3 CPU.

pub mod decode;
pub mod opcode;
pub mod trap;

use lc3_util::Bit;

use crate::bus::image::Image;
use crate::bus::Bus;
use crate::console::Console;

use decode::{DecodeError, Instruction, Source};
use opcode::{Opcode, RegIdx};
use trap::{TrapError, TrapVector};

use thiserror::Error;

use std::cell::RefCell;
use std::fmt;
use std::io;
use std::rc::Rc;

/// Address of the first instruction fetched after reset.
const PC_RESET: u16 = 0x3000;

/// A failure the guest cannot observe. Nothing is retried; the frontend
/// reports the error and gives up on the machine.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("{source} at {pc:#06x}")]
    Decode { pc: u16, source: DecodeError },

    #[error("{source} at {pc:#06x}")]
    Trap { pc: u16, source: TrapError },

    #[error("console failed: {0}")]
    Io(#[from] io::Error),
}

/// Condition code. Tracks the sign of the last value written to a general
/// register, so exactly one flag is set at any time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cond {
    Pos,
    Zero,
    Neg,
}

impl Cond {
    /// The flag as a bitmask matching the branch condition field: p, z and n
    /// from low to high.
    fn mask(self) -> u16 {
        match self {
            Cond::Pos => 0b001,
            Cond::Zero => 0b010,
            Cond::Neg => 0b100,
        }
    }

    fn from_value(val: u16) -> Self {
        if val == 0 {
            Cond::Zero
        } else if val.bit(15) {
            Cond::Neg
        } else {
            Cond::Pos
        }
    }
}

/// Execution state of the machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// Fetching and executing instructions.
    Running,
    /// Inside the body of a trap service routine.
    TrapIo,
    /// Stopped by the HALT trap. Terminal.
    Halted,
}

pub struct Cpu {
    /// General purpose registers r0..r7. r7 doubles as the link register:
    /// JSR, JSRR and TRAP store the address of the following instruction
    /// in it.
    regs: [u16; 8],
    /// The next instruction to fetch. While an instruction executes it
    /// already points at the following one, which is the base address of all
    /// PC-relative operands.
    pub pc: u16,
    cond: Cond,
    state: State,
    pub bus: Bus,
}

impl Cpu {
    pub fn new(console: Rc<RefCell<dyn Console>>) -> Self {
        Self {
            regs: [0x0; 8],
            pc: PC_RESET,
            cond: Cond::Zero,
            state: State::Running,
            bus: Bus::new(console),
        }
    }

    pub fn read_reg(&self, idx: RegIdx) -> u16 {
        self.regs[idx.idx()]
    }

    pub fn set_reg(&mut self, idx: RegIdx, val: u16) {
        self.regs[idx.idx()] = val;
    }

    /// Write 'val' to 'dr' and update the condition code to match.
    fn set_reg_cc(&mut self, dr: RegIdx, val: u16) {
        self.set_reg(dr, val);
        self.cond = Cond::from_value(val);
    }

    pub fn cond(&self) -> Cond {
        self.cond
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn load_image(&mut self, image: &Image) {
        self.bus.load_image(image);
    }

    /// Fetch, decode and execute a single instruction.
    ///
    /// PC is incremented before the instruction executes, so PC-relative
    /// offsets are taken from the address of the following instruction.
    pub fn step(&mut self) -> Result<State, ExecError> {
        let pc = self.pc;
        let word = self.bus.load(pc)?;
        self.pc = pc.wrapping_add(1);

        let op = Opcode::new(word);
        trace!("{pc:#06x}: {op}");

        let ins = Instruction::decode(op).map_err(|source| ExecError::Decode { pc, source })?;
        self.exec(pc, ins)
    }

    /// Run until the guest executes HALT.
    pub fn run(&mut self) -> Result<(), ExecError> {
        while self.state == State::Running {
            self.step()?;
        }
        Ok(())
    }

    fn exec(&mut self, pc: u16, ins: Instruction) -> Result<State, ExecError> {
        match ins {
            Instruction::Add { dr, sr1, src } => self.op_add(dr, sr1, src),
            Instruction::And { dr, sr1, src } => self.op_and(dr, sr1, src),
            Instruction::Not { dr, sr } => self.op_not(dr, sr),
            Instruction::Br { nzp, offset } => self.op_br(nzp, offset),
            Instruction::Jmp { base } => self.op_jmp(base),
            Instruction::Jsr { offset } => self.op_jsr(offset),
            Instruction::Jsrr { base } => self.op_jsrr(base),
            Instruction::Ld { dr, offset } => self.op_ld(dr, offset)?,
            Instruction::Ldi { dr, offset } => self.op_ldi(dr, offset)?,
            Instruction::Ldr { dr, base, offset } => self.op_ldr(dr, base, offset)?,
            Instruction::Lea { dr, offset } => self.op_lea(dr, offset),
            Instruction::St { sr, offset } => self.op_st(sr, offset),
            Instruction::Sti { sr, offset } => self.op_sti(sr, offset)?,
            Instruction::Str { sr, base, offset } => self.op_str(sr, base, offset),
            Instruction::Rti => self.op_rti(),
            Instruction::Trap { vector } => self.op_trap(pc, vector)?,
        }
        Ok(self.state)
    }

    fn read_src(&self, src: Source) -> u16 {
        match src {
            Source::Reg(reg) => self.read_reg(reg),
            Source::Imm(imm) => imm,
        }
    }
}

/// Instruction handlers.
impl Cpu {
    /// ADD - Add a register and the second operand.
    fn op_add(&mut self, dr: RegIdx, sr1: RegIdx, src: Source) {
        let val = self.read_reg(sr1).wrapping_add(self.read_src(src));
        self.set_reg_cc(dr, val);
    }

    /// AND - Bitwise and of a register and the second operand.
    fn op_and(&mut self, dr: RegIdx, sr1: RegIdx, src: Source) {
        let val = self.read_reg(sr1) & self.read_src(src);
        self.set_reg_cc(dr, val);
    }

    /// NOT - Bitwise complement.
    fn op_not(&mut self, dr: RegIdx, sr: RegIdx) {
        let val = !self.read_reg(sr);
        self.set_reg_cc(dr, val);
    }

    /// BR - Branch if any tested flag is set.
    fn op_br(&mut self, nzp: u16, offset: u16) {
        if nzp & self.cond.mask() != 0 {
            self.pc = self.pc.wrapping_add(offset);
        }
    }

    /// JMP - Jump to the address in the base register. RET is JMP with r7.
    fn op_jmp(&mut self, base: RegIdx) {
        self.pc = self.read_reg(base);
    }

    /// JSR - Link in r7, then jump PC-relative.
    fn op_jsr(&mut self, offset: u16) {
        self.set_reg(RegIdx::R7, self.pc);
        self.pc = self.pc.wrapping_add(offset);
    }

    /// JSRR - Link in r7, then jump to the address in the base register.
    fn op_jsrr(&mut self, base: RegIdx) {
        // The target is read before linking so 'JSRR r7' jumps to the old
        // value of r7.
        let target = self.read_reg(base);
        self.set_reg(RegIdx::R7, self.pc);
        self.pc = target;
    }

    /// LD - Load PC-relative.
    fn op_ld(&mut self, dr: RegIdx, offset: u16) -> Result<(), ExecError> {
        let val = self.bus.load(self.pc.wrapping_add(offset))?;
        self.set_reg_cc(dr, val);
        Ok(())
    }

    /// LDI - Load through a PC-relative pointer.
    fn op_ldi(&mut self, dr: RegIdx, offset: u16) -> Result<(), ExecError> {
        let ptr = self.bus.load(self.pc.wrapping_add(offset))?;
        let val = self.bus.load(ptr)?;
        self.set_reg_cc(dr, val);
        Ok(())
    }

    /// LDR - Load base plus offset.
    fn op_ldr(&mut self, dr: RegIdx, base: RegIdx, offset: u16) -> Result<(), ExecError> {
        let val = self.bus.load(self.read_reg(base).wrapping_add(offset))?;
        self.set_reg_cc(dr, val);
        Ok(())
    }

    /// LEA - Load the effective PC-relative address itself. Updates the
    /// flags like the loads do.
    fn op_lea(&mut self, dr: RegIdx, offset: u16) {
        let val = self.pc.wrapping_add(offset);
        self.set_reg_cc(dr, val);
    }

    /// ST - Store PC-relative.
    fn op_st(&mut self, sr: RegIdx, offset: u16) {
        self.bus.store(self.pc.wrapping_add(offset), self.read_reg(sr));
    }

    /// STI - Store through a PC-relative pointer.
    fn op_sti(&mut self, sr: RegIdx, offset: u16) -> Result<(), ExecError> {
        let ptr = self.bus.load(self.pc.wrapping_add(offset))?;
        self.bus.store(ptr, self.read_reg(sr));
        Ok(())
    }

    /// STR - Store base plus offset.
    fn op_str(&mut self, sr: RegIdx, base: RegIdx, offset: u16) {
        self.bus.store(self.read_reg(base).wrapping_add(offset), self.read_reg(sr));
    }

    /// RTI - Return from interrupt. The machine has no supervisor mode, so
    /// this does nothing.
    fn op_rti(&mut self) {}

    /// TRAP - Link in r7 and dispatch to a service routine.
    fn op_trap(&mut self, pc: u16, vector: u8) -> Result<(), ExecError> {
        let vector =
            TrapVector::from_vector(vector).map_err(|source| ExecError::Trap { pc, source })?;
        self.set_reg(RegIdx::R7, self.pc);

        self.state = State::TrapIo;
        self.service(vector)?;
        if self.state == State::TrapIo {
            self.state = State::Running;
        }
        Ok(())
    }
}

/// Trap service routines. Each routine flushes the console before returning
/// so interactive guests stay responsive.
impl Cpu {
    fn service(&mut self, vector: TrapVector) -> io::Result<()> {
        match vector {
            TrapVector::Getc => self.trap_getc(),
            TrapVector::Out => self.trap_out(),
            TrapVector::Puts => self.trap_puts(),
            TrapVector::In => self.trap_in(),
            TrapVector::Putsp => self.trap_putsp(),
            TrapVector::Halt => self.trap_halt(),
        }
    }

    fn trap_getc(&mut self) -> io::Result<()> {
        let console = self.bus.console();
        let byte = console.borrow_mut().read_byte()?;
        self.set_reg_cc(RegIdx::R0, byte.into());
        Ok(())
    }

    fn trap_out(&mut self) -> io::Result<()> {
        let console = self.bus.console();
        let mut console = console.borrow_mut();
        console.write_byte(self.read_reg(RegIdx::R0) as u8)?;
        console.flush()
    }

    fn trap_puts(&mut self) -> io::Result<()> {
        let console = self.bus.console();
        let mut addr = self.read_reg(RegIdx::R0);
        loop {
            let word = self.bus.load(addr)?;
            if word == 0 {
                break;
            }
            console.borrow_mut().write_byte(word as u8)?;
            addr = addr.wrapping_add(1);
        }
        let result = console.borrow_mut().flush();
        result
    }

    fn trap_in(&mut self) -> io::Result<()> {
        let console = self.bus.console();
        let mut console = console.borrow_mut();
        console.write_str("Enter a character: ")?;
        console.flush()?;

        let byte = console.read_byte()?;
        console.write_byte(byte)?;
        console.flush()?;
        drop(console);

        self.set_reg_cc(RegIdx::R0, byte.into());
        Ok(())
    }

    fn trap_putsp(&mut self) -> io::Result<()> {
        let console = self.bus.console();
        let mut addr = self.read_reg(RegIdx::R0);
        loop {
            let word = self.bus.load(addr)?;
            if word == 0 {
                break;
            }
            let mut console = console.borrow_mut();
            console.write_byte(word.bit_range(0, 7) as u8)?;
            let high = word.bit_range(8, 15) as u8;
            if high != 0 {
                console.write_byte(high)?;
            }
            addr = addr.wrapping_add(1);
        }
        let result = console.borrow_mut().flush();
        result
    }

    fn trap_halt(&mut self) -> io::Result<()> {
        let console = self.bus.console();
        let mut console = console.borrow_mut();
        console.write_str("HALT\n")?;
        console.flush()?;

        self.state = State::Halted;
        Ok(())
    }
}

impl fmt::Display for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, reg) in self.regs.iter().enumerate() {
            writeln!(f, "r{i}: {reg:#06x}")?;
        }
        writeln!(f, "pc: {:#06x}", self.pc)?;
        write!(f, "cond: {:?}", self.cond)
    }
}
