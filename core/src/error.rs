//! Error kinds surfaced across crate boundaries.
//!
//! Kept as a plain enum with a hand-written `Display`/`Error` impl: the core never pulls in
//! `anyhow`/`thiserror` itself, those live only in the binary crates that consume it.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmuError {
    BiosNotFound,
    BiosWrongSize { expected: usize, got: usize },
    GameNotFound,
    GameWrongSize { got: usize },
    BadImage,
    UnsupportedSaveStateVersion { found: u32, supported: u32 },
    BackupOutOfBounds { index: usize, len: usize },
    InvalidEepromCommand { opcode: u8 },
}

impl fmt::Display for EmuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmuError::BiosNotFound => write!(f, "BIOS image not found"),
            EmuError::BiosWrongSize { expected, got } => {
                write!(f, "BIOS image has wrong size: expected {} bytes, got {}", expected, got)
            }
            EmuError::GameNotFound => write!(f, "game ROM not found"),
            EmuError::GameWrongSize { got } => write!(f, "game ROM has invalid size: {} bytes", got),
            EmuError::BadImage => write!(f, "archive contained no .gba image"),
            EmuError::UnsupportedSaveStateVersion { found, supported } => write!(
                f,
                "save state version {} unsupported, this build supports version {}",
                found, supported
            ),
            EmuError::BackupOutOfBounds { index, len } => {
                write!(f, "backup read index {} out of bounds for {} byte file", index, len)
            }
            EmuError::InvalidEepromCommand { opcode } => write!(f, "invalid EEPROM command opcode {:#04b}", opcode),
        }
    }
}

impl std::error::Error for EmuError {}

pub type EmuResult<T> = Result<T, EmuError>;
