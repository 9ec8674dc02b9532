//! Emulation of the LC-3, a 16-bit word-addressed teaching computer.
//!
//! The machine is a single ['Cpu'] value owning its memory ['Bus']. Console
//! I/O goes through the ['Console'] capability, which the frontend implements
//! on a real terminal and tests implement on in-memory buffers. The guest is
//! loaded from one or more object ['Image']s and runs until it executes the
//! HALT trap.

#[macro_use]
extern crate log;

#[cfg(test)]
mod test;

pub mod bus;
pub mod console;
pub mod cpu;

pub use bus::image::{Image, LoaderError};
pub use bus::{Bus, KBDR, KBSR};
pub use console::Console;
pub use cpu::decode::DecodeError;
pub use cpu::trap::TrapError;
pub use cpu::{Cond, Cpu, ExecError, State};
