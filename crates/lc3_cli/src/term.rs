//! Terminal console for the machine.
//!
//! The guest owns the terminal while it runs: raw mode is acquired up front
//! and restored on every exit path, whether the guest halts, the machine
//! fails or the user interrupts with ctrl-c.

use lc3_core::Console;

use std::io::{self, Read, Write};
use std::mem;
use std::sync::OnceLock;

/// Terminal settings to restore on exit. Written once, before the SIGINT
/// handler is installed.
static SAVED: OnceLock<libc::termios> = OnceLock::new();

/// Scoped raw-mode acquisition. Restores the saved settings when dropped.
pub struct RawMode {
    saved: libc::termios,
}

impl RawMode {
    pub fn acquire() -> io::Result<Self> {
        let mut saved = unsafe { mem::zeroed::<libc::termios>() };
        if unsafe { libc::tcgetattr(libc::STDIN_FILENO, &mut saved) } != 0 {
            return Err(io::Error::last_os_error());
        }

        let _ = SAVED.set(saved);

        // Characters must reach the guest immediately and without echo. ISIG
        // is kept so ctrl-c still raises SIGINT, which the handler below
        // turns into a restore-and-exit.
        let mut raw = saved;
        raw.c_lflag &= !(libc::ICANON | libc::ECHO);

        if unsafe { libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &raw) } != 0 {
            return Err(io::Error::last_os_error());
        }
        unsafe {
            libc::signal(libc::SIGINT, restore_and_exit as libc::sighandler_t);
        }

        Ok(Self { saved })
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        unsafe {
            libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &self.saved);
        }
    }
}

extern "C" fn restore_and_exit(_: libc::c_int) {
    if let Some(saved) = SAVED.get() {
        unsafe {
            libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, saved);
        }
    }
    unsafe {
        libc::_exit(130);
    }
}

/// Console on the process stdin and stdout.
pub struct TermConsole {
    stdin: io::Stdin,
    stdout: io::Stdout,
}

impl TermConsole {
    pub fn new() -> Self {
        Self {
            stdin: io::stdin(),
            stdout: io::stdout(),
        }
    }
}

impl Console for TermConsole {
    fn read_byte(&mut self) -> io::Result<u8> {
        let mut byte = [0x0];
        self.stdin.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.stdout.write_all(&[byte])
    }

    fn poll_ready(&mut self) -> io::Result<bool> {
        let mut fd = libc::pollfd {
            fd: libc::STDIN_FILENO,
            events: libc::POLLIN,
            revents: 0,
        };
        match unsafe { libc::poll(&mut fd, 1, 0) } {
            -1 => Err(io::Error::last_os_error()),
            0 => Ok(false),
            _ => Ok(fd.revents & libc::POLLIN != 0),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stdout.flush()
    }
}
