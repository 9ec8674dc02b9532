//! Loading of LC-3 object images.
//!
//! An image is big-endian throughout: the first word is the origin, every
//! following word is payload placed at consecutive addresses starting there.

use thiserror::Error;

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("failed to load image: {0}")]
    IoError(#[from] io::Error),

    #[error("invalid image: too short to hold an origin word")]
    ShortHeader,

    #[error("invalid image: payload ends in the middle of a word")]
    OddTail,
}

/// A parsed object image. Placement into memory is done by the bus, which
/// drops any words past the top of memory.
pub struct Image {
    origin: u16,
    words: Vec<u16>,
}

impl Image {
    pub fn from_file(path: &Path) -> Result<Self, LoaderError> {
        let mut file = File::open(path)?;
        let mut bytes = Vec::new();

        file.read_to_end(&mut bytes)?;

        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LoaderError> {
        if bytes.len() < 2 {
            return Err(LoaderError::ShortHeader);
        }

        let (header, payload) = bytes.split_at(2);

        if payload.len() % 2 != 0 {
            return Err(LoaderError::OddTail);
        }

        let origin = u16::from_be_bytes([header[0], header[1]]);
        let words = payload
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();

        Ok(Self { origin, words })
    }

    /// The address the first payload word is placed at.
    pub fn origin(&self) -> u16 {
        self.origin
    }

    pub fn words(&self) -> &[u16] {
        &self.words
    }

    /// Serialize back to the on-disk format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(2 + self.words.len() * 2);
        bytes.extend(self.origin.to_be_bytes());
        for word in &self.words {
            bytes.extend(word.to_be_bytes());
        }
        bytes
    }
}
