//! Cartridge backup memory: SRAM, Flash (with bank switching and chip-ID), and EEPROM
//! (bit-serial protocol), auto-detected from the save-type signature string embedded in the ROM.

mod eeprom;
mod flash;

pub use eeprom::Eeprom;
pub use flash::Flash;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BackupType {
    None,
    Sram32K,
    Flash64K,
    Flash128K,
    Eeprom512,
    Eeprom8K,
}

impl BackupType {
    pub fn detect_from_rom(rom: &[u8]) -> Option<BackupType> {
        const SIGNATURES: &[(&str, BackupType)] = &[
            ("EEPROM_V", BackupType::Eeprom8K),
            ("SRAM_V", BackupType::Sram32K),
            ("FLASH1M_V", BackupType::Flash128K),
            ("FLASH512_V", BackupType::Flash64K),
            ("FLASH_V", BackupType::Flash64K),
        ];
        for window in rom.chunks(4).enumerate().map(|(i, _)| i * 4) {
            if window + 12 > rom.len() {
                break;
            }
            let slice = &rom[window..(window + 12).min(rom.len())];
            for (sig, kind) in SIGNATURES {
                if slice.starts_with(sig.as_bytes()) {
                    log::info!("backup auto-detected: {} -> {:?}", sig, kind);
                    return Some(*kind);
                }
            }
        }
        None
    }

    pub fn byte_size(self) -> usize {
        match self {
            BackupType::None => 0,
            BackupType::Sram32K => 32 * 1024,
            BackupType::Flash64K => 64 * 1024,
            BackupType::Flash128K => 128 * 1024,
            BackupType::Eeprom512 => 512,
            BackupType::Eeprom8K => 8 * 1024,
        }
    }
}

pub enum Backup {
    None,
    Sram(Vec<u8>),
    Flash(Flash),
    Eeprom(Eeprom),
}

impl Backup {
    pub fn new(kind: BackupType) -> Self {
        match kind {
            BackupType::None => Backup::None,
            BackupType::Sram32K => Backup::Sram(vec![0xFF; kind.byte_size()]),
            BackupType::Flash64K => Backup::Flash(Flash::new(false)),
            BackupType::Flash128K => Backup::Flash(Flash::new(true)),
            BackupType::Eeprom512 => Backup::Eeprom(Eeprom::new(512)),
            BackupType::Eeprom8K => Backup::Eeprom(Eeprom::new(8 * 1024)),
        }
    }

    pub fn read(&self, address: u32) -> u8 {
        match self {
            Backup::None => 0xFF,
            Backup::Sram(data) => *data.get(address as usize & 0x7FFF).unwrap_or(&0xFF),
            Backup::Flash(flash) => flash.read(address),
            Backup::Eeprom(_) => 1, // EEPROM reads arrive through the bit-serial protocol, not here.
        }
    }

    pub fn write(&mut self, address: u32, value: u8) {
        match self {
            Backup::None => {}
            Backup::Sram(data) => {
                let idx = address as usize & 0x7FFF;
                if idx < data.len() {
                    data[idx] = value;
                }
            }
            Backup::Flash(flash) => flash.write(address, value),
            Backup::Eeprom(_) => {}
        }
    }

    pub fn raw(&self) -> &[u8] {
        match self {
            Backup::None => &[],
            Backup::Sram(data) => data,
            Backup::Flash(flash) => flash.raw(),
            Backup::Eeprom(eeprom) => eeprom.raw(),
        }
    }

    pub fn load_raw(&mut self, bytes: &[u8]) {
        match self {
            Backup::None => {}
            Backup::Sram(data) => copy_into(data, bytes),
            Backup::Flash(flash) => flash.load_raw(bytes),
            Backup::Eeprom(eeprom) => eeprom.load_raw(bytes),
        }
    }
}

fn copy_into(dst: &mut [u8], src: &[u8]) {
    let n = dst.len().min(src.len());
    dst[..n].copy_from_slice(&src[..n]);
}
