//! The 192-byte cartridge header: entry point, logo, title, game code, maker code, checksum.

#[derive(Debug, Clone)]
pub struct CartridgeHeader {
    pub title: String,
    pub game_code: String,
    pub maker_code: String,
    pub checksum: u8,
    pub checksum_valid: bool,
}

impl CartridgeHeader {
    pub fn parse(rom: &[u8]) -> Self {
        let title = ascii_field(rom, 0xA0, 12);
        let game_code = ascii_field(rom, 0xAC, 4);
        let maker_code = ascii_field(rom, 0xB0, 2);
        let checksum = *rom.get(0xBD).unwrap_or(&0);
        let computed = compute_header_checksum(rom);
        let checksum_valid = computed == checksum;
        if !checksum_valid {
            log::warn!("cartridge header checksum mismatch: stored {:#04x}, computed {:#04x}", checksum, computed);
        }
        log::info!("cartridge: title={:?} code={:?} maker={:?}", title, game_code, maker_code);
        Self { title, game_code, maker_code, checksum, checksum_valid }
    }
}

fn ascii_field(rom: &[u8], offset: usize, len: usize) -> String {
    rom.get(offset..offset + len)
        .unwrap_or(&[])
        .iter()
        .take_while(|&&b| b != 0)
        .map(|&b| b as char)
        .collect()
}

fn compute_header_checksum(rom: &[u8]) -> u8 {
    if rom.len() < 0xBD {
        return 0;
    }
    let mut value: i32 = 0;
    for &byte in &rom[0xA0..0xBD] {
        value = value.wrapping_sub(byte as i32);
    }
    ((value.wrapping_sub(0x19)) & 0xFF) as u8
}
