//! The memory bus of the machine.
//!
//! Memory is a flat array of 65 536 words. Two addresses are keyboard
//! registers: reading the status register runs a non-blocking poll of the
//! console and latches any waiting byte into the data register. Writes have
//! no side effects anywhere.

pub mod image;
pub mod ram;

use lc3_util::BitSet;

use crate::console::Console;
use image::Image;
use ram::{Ram, MEM_WORDS};

use std::cell::RefCell;
use std::io;
use std::rc::Rc;

/// Keyboard status register. Bit 15 is set while a character is waiting.
pub const KBSR: u16 = 0xfe00;

/// Keyboard data register. Holds the byte latched by the last status poll.
pub const KBDR: u16 = 0xfe02;

pub struct Bus {
    ram: Ram,
    console: Rc<RefCell<dyn Console>>,
}

impl Bus {
    pub fn new(console: Rc<RefCell<dyn Console>>) -> Self {
        Self {
            ram: Ram::new(),
            console,
        }
    }

    /// Read the word at 'addr'.
    ///
    /// A read of KBSR polls the console first: if a byte is waiting, KBSR
    /// becomes 0x8000 and the byte is latched into KBDR, otherwise KBSR
    /// becomes 0. Reads of KBDR return the latched byte without polling.
    pub fn load(&mut self, addr: u16) -> io::Result<u16> {
        if addr == KBSR {
            self.poll_keyboard()?;
        }
        Ok(self.ram.load(addr))
    }

    /// Store 'val' at 'addr'. Stores to the keyboard registers are accepted
    /// and kept but have no side effect.
    pub fn store(&mut self, addr: u16, val: u16) {
        self.ram.store(addr, val);
    }

    fn poll_keyboard(&mut self) -> io::Result<()> {
        let mut console = self.console.borrow_mut();
        if console.poll_ready()? {
            let byte = console.read_byte()?;
            self.ram.store(KBSR, 0_u16.set_bit(15, true));
            self.ram.store(KBDR, byte.into());
        } else {
            self.ram.store(KBSR, 0x0);
        }
        Ok(())
    }

    /// Place an object image in memory.
    pub fn load_image(&mut self, image: &Image) {
        let room = MEM_WORDS - image.origin() as usize;
        if image.words().len() > room {
            warn!(
                "image of {} words overruns the top of memory, truncated to {}",
                image.words().len(),
                room,
            );
        }
        self.ram.place(image);
        debug!(
            "placed {} words at {:#06x}",
            image.words().len().min(room),
            image.origin(),
        );
    }

    /// Handle to the console capability.
    pub fn console(&self) -> Rc<RefCell<dyn Console>> {
        self.console.clone()
    }
}
