//! Real-time clock: a Seiko S-3511-style serial device addressed through the GPIO port's
//! SCK/SIO/CS lines. Commands select a register (date, time, status, ...) and transfer its
//! BCD-encoded bytes bit-serially.

use super::GpioDevice;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Phase {
    Idle,
    Command { bits_left: u8, shift: u8 },
    Transfer { register: u8, byte_index: u8, bit_index: u8, reading: bool },
}

pub struct Rtc {
    selected: bool,
    sck: bool,
    phase: Phase,
    status: u8,
    datetime: [u8; 7], // year, month, day, weekday, hour, minute, second (BCD)
    scratch: Vec<u8>,
}

impl Rtc {
    pub fn new() -> Self {
        Self {
            selected: false,
            sck: true,
            phase: Phase::Idle,
            status: 0,
            datetime: [0; 7],
            scratch: Vec::new(),
        }
    }

    fn register_len(register: u8) -> usize {
        match register {
            0 => 1, // status/reset
            2 => 7, // datetime
            3 => 3, // time only
            _ => 0,
        }
    }

    fn begin_command(&mut self, command: u8) {
        let register = (command >> 4) & 0x7;
        let reading = command & 0x80 != 0;
        self.scratch = match register {
            0 => vec![self.status],
            2 => self.datetime.to_vec(),
            3 => self.datetime[4..7].to_vec(),
            _ => vec![0; Self::register_len(register)],
        };
        self.phase = Phase::Transfer { register, byte_index: 0, bit_index: 0, reading };
    }
}

impl GpioDevice for Rtc {
    fn read_port(&mut self) -> u16 {
        if let Phase::Transfer { byte_index, bit_index, reading: true, .. } = self.phase {
            let byte = *self.scratch.get(byte_index as usize).unwrap_or(&0);
            ((byte >> bit_index) & 1) as u16
        } else {
            0
        }
    }

    fn write_port(&mut self, value: u16, direction: u16) {
        if !self.selected {
            return;
        }
        let sio = value & 0b010 != 0;
        let new_sck = value & 0b001 != 0;
        let sio_is_output = direction & 0b010 != 0;

        if !self.sck && new_sck {
            // Rising edge: latch or shift out one bit.
            match &mut self.phase {
                Phase::Idle if sio_is_output => {
                    self.phase = Phase::Command { bits_left: 8, shift: sio as u8 };
                }
                Phase::Command { bits_left, shift } => {
                    *shift = (*shift << 1) | sio as u8;
                    *bits_left -= 1;
                    if *bits_left == 0 {
                        let command = *shift;
                        self.begin_command(command);
                    }
                }
                Phase::Transfer { byte_index, bit_index, reading, .. } => {
                    if !*reading && sio_is_output {
                        let idx = *byte_index as usize;
                        if idx < self.scratch.len() {
                            let mask = 1u8 << *bit_index;
                            if sio {
                                self.scratch[idx] |= mask;
                            } else {
                                self.scratch[idx] &= !mask;
                            }
                        }
                    }
                    *bit_index += 1;
                    if *bit_index == 8 {
                        *bit_index = 0;
                        *byte_index += 1;
                    }
                }
                _ => {}
            }
        }
        self.sck = new_sck;
    }

    fn select(&mut self, readable: bool) {
        self.selected = readable;
        if !readable {
            self.phase = Phase::Idle;
        }
    }
}

impl Default for Rtc {
    fn default() -> Self {
        Self::new()
    }
}

impl Rtc {
    /// `(status, datetime)`; the bit-serial transfer phase itself resets to idle on restore,
    /// same simplification as the flash/EEPROM command state machines.
    pub fn raw_registers(&self) -> (u8, [u8; 7]) {
        (self.status, self.datetime)
    }

    pub fn restore_raw_registers(&mut self, status: u8, datetime: [u8; 7]) {
        self.status = status;
        self.datetime = datetime;
        self.phase = Phase::Idle;
        self.selected = false;
        self.sck = true;
        self.scratch.clear();
    }
}
