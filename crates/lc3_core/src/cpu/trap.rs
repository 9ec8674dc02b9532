//! Trap vectors and their service routines' error type.
//!
//! The service routines themselves are implemented directly on the host
//! rather than vectored through guest memory, since the machine has no
//! supervisor code to run them.

use thiserror::Error;

use std::fmt;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TrapError {
    #[error("unknown trap vector {0:#04x}")]
    UnknownVector(u8),
}

/// The service routines the machine implements.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrapVector {
    /// Read one character into r0, without echo.
    Getc,
    /// Write the character in r0.
    Out,
    /// Write the zero-terminated string at r0, one character per word.
    Puts,
    /// Prompt for a character, echo it and store it in r0.
    In,
    /// Write the zero-terminated packed string at r0, two characters per
    /// word, low byte first.
    Putsp,
    /// Print the halt message and stop the machine.
    Halt,
}

impl TrapVector {
    pub fn from_vector(vector: u8) -> Result<Self, TrapError> {
        match vector {
            0x20 => Ok(TrapVector::Getc),
            0x21 => Ok(TrapVector::Out),
            0x22 => Ok(TrapVector::Puts),
            0x23 => Ok(TrapVector::In),
            0x24 => Ok(TrapVector::Putsp),
            0x25 => Ok(TrapVector::Halt),
            _ => Err(TrapError::UnknownVector(vector)),
        }
    }
}

impl fmt::Display for TrapVector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match *self {
            TrapVector::Getc => "GETC",
            TrapVector::Out => "OUT",
            TrapVector::Puts => "PUTS",
            TrapVector::In => "IN",
            TrapVector::Putsp => "PUTSP",
            TrapVector::Halt => "HALT",
        })
    }
}

#[test]
fn vector_bounds() {
    assert_eq!(TrapVector::from_vector(0x20), Ok(TrapVector::Getc));
    assert_eq!(TrapVector::from_vector(0x25), Ok(TrapVector::Halt));
    assert_eq!(
        TrapVector::from_vector(0x1f),
        Err(TrapError::UnknownVector(0x1f))
    );
    assert_eq!(
        TrapVector::from_vector(0x26),
        Err(TrapError::UnknownVector(0x26))
    );
}
