//! Top-level owner: wires a `Bus` to a `Cpu<Bus>` and drives both from a single `run(cycles)`
//! entry point, the crate's real driving loop.

use crate::error::{EmuError, EmuResult};
use crate::hardware::bus::Bus;
use crate::hardware::cartridge::Cartridge;
use crate::hardware::cpu::Cpu;
use crate::hardware::ppu::SCREEN_HEIGHT;
use crate::hardware::ppu::SCREEN_WIDTH;
use crate::joypad::InputKey;
use crate::{EmulatorOptions, BIOS_SIZE};

/// One full 228-scanline frame at 1232 cycles/scanline.
pub const CYCLES_PER_FRAME: u64 = 1232 * 228;

pub struct Emulator {
    pub cpu: Cpu<Bus>,
    options: EmulatorOptions,
}

impl std::fmt::Debug for Emulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emulator").finish_non_exhaustive()
    }
}

impl Emulator {
    /// Builds a fresh core from a cartridge ROM and the options a frontend has already resolved
    /// (BIOS image or skip-BIOS, save-type override, resampler choice). `rom` must be non-empty
    /// and at least big enough to hold the 192-byte header; the bus layer tolerates anything
    /// shorter by treating out-of-range reads as open bus, so this only rejects the empty case.
    pub fn new(rom: Vec<u8>, options: EmulatorOptions) -> EmuResult<Self> {
        if rom.is_empty() {
            return Err(EmuError::GameNotFound);
        }

        let bios = match &options.bios_rom {
            Some(boxed) => boxed.to_vec(),
            None if options.skip_bios => vec![0u8; BIOS_SIZE],
            None => return Err(EmuError::BiosNotFound),
        };
        if let Some(boxed) = &options.bios_rom {
            if boxed.len() != BIOS_SIZE {
                return Err(EmuError::BiosWrongSize { expected: BIOS_SIZE, got: boxed.len() });
            }
        }

        let cartridge = Cartridge::new(rom, options.save_type_override);
        let mut bus = Bus::new(cartridge, bios, options.host_sample_rate);
        bus.power_on();

        let mut cpu = Cpu::new(bus);
        if options.skip_bios {
            cpu.skip_bios();
        }

        Ok(Self { cpu, options })
    }

    pub fn options(&self) -> &EmulatorOptions {
        &self.options
    }

    /// Steps the CPU until at least `cycles` have elapsed. The scheduler advances in whatever
    /// increments each bus access costs, so the final instruction may overshoot the requested
    /// budget slightly, mirroring real hardware's lack of a mid-instruction stopping point.
    pub fn run(&mut self, cycles: u64) {
        let target = self.cpu.cycles.wrapping_add(cycles);
        while self.cpu.cycles < target {
            self.cpu.step();
            self.cpu.cycles = self.cpu.bus.scheduler.now();
        }
    }

    pub fn run_frame(&mut self) {
        self.run(CYCLES_PER_FRAME);
    }

    pub fn frame_buffer(&self) -> &[u16] {
        &self.cpu.bus.ppu.frame_buffer
    }

    pub fn frame_dimensions(&self) -> (usize, usize) {
        (SCREEN_WIDTH, SCREEN_HEIGHT)
    }

    pub fn press_key(&mut self, key: InputKey) {
        self.cpu.bus.joypad.press(key);
    }

    pub fn release_key(&mut self, key: InputKey) {
        self.cpu.bus.joypad.release(key);
    }

    /// Drains every sample pair the APU has mixed since the last call, handing ownership of the
    /// backing buffer to the caller (an audio device's callback, or a test harness).
    pub fn take_audio_samples(&mut self) -> Vec<(f32, f32)> {
        std::mem::take(&mut self.cpu.bus.apu.ring_buffer)
    }

    /// Encodes every mutable subsystem into a versioned, self-describing blob (see
    /// `crate::save_state`).
    pub fn save_state(&self) -> Vec<u8> {
        crate::save_state::save(self)
    }

    /// Restores state previously produced by `save_state`. Rejects blobs with a mismatched magic
    /// or version rather than loading a partial, possibly-corrupt layout.
    pub fn load_state(&mut self, bytes: &[u8]) -> EmuResult<()> {
        crate::save_state::load(self, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EmulatorOptionsBuilder;

    fn test_rom() -> Vec<u8> {
        vec![0u8; 0x200]
    }

    #[test]
    fn rejects_empty_rom() {
        let options = EmulatorOptionsBuilder::new().build();
        assert_eq!(Emulator::new(Vec::new(), options).unwrap_err(), EmuError::GameNotFound);
    }

    #[test]
    fn skip_bios_lands_at_cartridge_entry() {
        let options = EmulatorOptionsBuilder::new().skip_bios(true).build();
        let emu = Emulator::new(test_rom(), options).unwrap();
        assert_eq!(emu.cpu.regs.r[crate::hardware::cpu::registers::PC], 0x0800_0000);
    }

    #[test]
    fn run_advances_cpu_cycles_past_target() {
        let options = EmulatorOptionsBuilder::new().skip_bios(true).build();
        let mut emu = Emulator::new(test_rom(), options).unwrap();
        emu.run(100);
        assert!(emu.cpu.cycles >= 100);
    }
}
