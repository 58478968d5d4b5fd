//! EEPROM bit-serial protocol: 6-bit command (2-bit opcode + up to 14 address bits), then either
//! a 64-bit write payload or a dummy bit followed by a 64-bit read payload.

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Phase {
    Idle,
    ReceivingCommand,
    ReceivingAddress { opcode: u8 },
    ReceivingWriteData { address: u16 },
    SendingDummy { address: u16 },
    SendingData { address: u16, bit: u8 },
    WriteDone,
}

pub struct Eeprom {
    data: Vec<u8>,
    address_bits: u32,
    phase: Phase,
    shift: u64,
    bit_count: u32,
}

impl Eeprom {
    pub fn new(size: usize) -> Self {
        let address_bits = if size == 512 { 6 } else { 14 };
        Self { data: vec![0xFF; size], address_bits, phase: Phase::Idle, shift: 0, bit_count: 0 }
    }

    pub fn read_bit(&mut self) -> u8 {
        match self.phase {
            Phase::SendingDummy { address } => {
                self.phase = Phase::SendingData { address, bit: 0 };
                0
            }
            Phase::SendingData { address, bit } => {
                let byte_index = address as usize * 8 + (bit / 8) as usize;
                let byte = *self.data.get(byte_index).unwrap_or(&0xFF);
                let out = (byte >> (7 - (bit % 8))) & 1;
                let next_bit = bit + 1;
                self.phase = if next_bit >= 64 { Phase::Idle } else { Phase::SendingData { address, bit: next_bit } };
                out
            }
            Phase::WriteDone => {
                self.phase = Phase::Idle;
                1
            }
            _ => 1,
        }
    }

    pub fn write_bit(&mut self, bit: u8) {
        match self.phase {
            Phase::Idle => {
                self.shift = bit as u64;
                self.bit_count = 1;
                self.phase = Phase::ReceivingCommand;
            }
            Phase::ReceivingCommand => {
                self.shift = (self.shift << 1) | bit as u64;
                self.bit_count += 1;
                if self.bit_count == 2 {
                    let opcode = self.shift as u8 & 0b11;
                    self.shift = 0;
                    self.bit_count = 0;
                    self.phase = Phase::ReceivingAddress { opcode };
                }
            }
            Phase::ReceivingAddress { opcode } => {
                self.shift = (self.shift << 1) | bit as u64;
                self.bit_count += 1;
                if self.bit_count == self.address_bits {
                    let address = self.shift as u16;
                    self.shift = 0;
                    self.bit_count = 0;
                    self.phase = match opcode {
                        0b10 => Phase::ReceivingWriteData { address },
                        0b11 => Phase::SendingDummy { address },
                        _ => Phase::Idle,
                    };
                }
            }
            Phase::ReceivingWriteData { address } => {
                self.shift = (self.shift << 1) | bit as u64;
                self.bit_count += 1;
                if self.bit_count == 64 {
                    let base = address as usize * 8;
                    for i in 0..8 {
                        let byte = (self.shift >> (56 - i * 8)) as u8;
                        if base + i < self.data.len() {
                            self.data[base + i] = byte;
                        }
                    }
                    self.phase = Phase::WriteDone;
                }
            }
            _ => {}
        }
    }

    pub fn raw(&self) -> &[u8] {
        &self.data
    }

    pub fn load_raw(&mut self, bytes: &[u8]) {
        let n = self.data.len().min(bytes.len());
        self.data[..n].copy_from_slice(&bytes[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_bits(eeprom: &mut Eeprom, bits: &[u8]) {
        for &b in bits {
            eeprom.write_bit(b);
        }
    }

    #[test]
    fn write_then_read_round_trips_64_bits() {
        let mut eeprom = Eeprom::new(512);
        let address_bits = [0u8; 6];
        let payload = [1u8; 64];

        write_bits(&mut eeprom, &[1, 0]); // write opcode 10
        write_bits(&mut eeprom, &address_bits);
        write_bits(&mut eeprom, &payload);
        eeprom.read_bit(); // consume the write-done marker

        write_bits(&mut eeprom, &[1, 1]); // read opcode 11
        write_bits(&mut eeprom, &address_bits);
        eeprom.read_bit(); // dummy bit
        let mut out = Vec::new();
        for _ in 0..64 {
            out.push(eeprom.read_bit());
        }
        assert_eq!(out, payload);
    }
}
