//! The cartridge: ROM bytes, header, optional backup memory, optional GPIO device.

pub mod backup;
pub mod gpio;
pub mod header;

use crate::hardware::cartridge::backup::{Backup, BackupType};
use crate::hardware::cartridge::gpio::Gpio;
use crate::hardware::cartridge::header::CartridgeHeader;

pub struct Cartridge {
    pub rom: Vec<u8>,
    pub header: CartridgeHeader,
    pub backup: Backup,
    pub gpio: Gpio,
}

impl Cartridge {
    pub fn new(rom: Vec<u8>, save_type_override: Option<BackupType>) -> Self {
        let header = CartridgeHeader::parse(&rom);
        let backup_type = save_type_override
            .or_else(|| BackupType::detect_from_rom(&rom))
            .unwrap_or(BackupType::None);
        Self { rom, header, backup: Backup::new(backup_type), gpio: Gpio::None }
    }

    pub fn read_rom8(&self, address: u32) -> u8 {
        let offset = address as usize & 0x01FF_FFFF;
        *self.rom.get(offset).unwrap_or_else(|| {
            // Unmapped Game Pak reads return the low byte of (address >> 1), per the address
            // pattern left on the bus by the disabled decoder.
            &0
        })
    }

    pub fn read_rom_open_bus(&self, address: u32) -> u16 {
        (((address >> 1) & 0xFFFF) as u16).wrapping_add(0)
    }
}
