//! GBA emulator core: ARM7TDMI interpreter, scheduler, memory bus, PPU, APU, DMA, timers and
//! interrupt controller. Frontends own the loader, save file, configuration parsing and host
//! device plumbing; this crate exposes `Emulator` plus the seams those concerns seat into, and
//! leaves the boot ROM / save RAM / frontend loop to `test_runner`.

pub mod emulator;
pub mod error;
pub mod hardware;
pub mod joypad;
pub mod save_state;
pub mod scheduler;

pub use crate::emulator::Emulator;
pub use crate::error::{EmuError, EmuResult};
pub use crate::hardware::apu::resampler::ResamplerKind;
pub use crate::hardware::cartridge::backup::BackupType;
pub use crate::joypad::InputKey;

pub const BIOS_SIZE: usize = 16 * 1024;

/// Every runtime-tunable knob the core itself needs to own to behave correctly. Parsing these
/// out of a TOML/INI file on disk is a frontend concern; this struct is the seam.
#[derive(Debug, Clone)]
pub struct EmulatorOptions {
    pub skip_bios: bool,
    pub save_type_override: Option<BackupType>,
    pub resampler: ResamplerKind,
    pub mp2k_hle: bool,
    pub bios_rom: Option<Box<[u8; BIOS_SIZE]>>,
    pub host_sample_rate: u32,
}

#[derive(Debug, Clone)]
pub struct EmulatorOptionsBuilder {
    skip_bios: bool,
    save_type_override: Option<BackupType>,
    resampler: ResamplerKind,
    mp2k_hle: bool,
    bios_rom: Option<Box<[u8; BIOS_SIZE]>>,
    host_sample_rate: u32,
}

impl EmulatorOptionsBuilder {
    pub fn new() -> Self {
        EmulatorOptionsBuilder {
            skip_bios: true,
            save_type_override: None,
            resampler: ResamplerKind::Cubic,
            mp2k_hle: false,
            bios_rom: None,
            host_sample_rate: 48_000,
        }
    }

    pub fn skip_bios(mut self, skip_bios: bool) -> Self {
        self.skip_bios = skip_bios;
        self
    }

    pub fn save_type_override(mut self, save_type_override: Option<BackupType>) -> Self {
        self.save_type_override = save_type_override;
        self
    }

    pub fn resampler(mut self, resampler: ResamplerKind) -> Self {
        self.resampler = resampler;
        self
    }

    pub fn mp2k_hle(mut self, mp2k_hle: bool) -> Self {
        self.mp2k_hle = mp2k_hle;
        self
    }

    pub fn bios_rom(mut self, bios_rom: Option<Box<[u8; BIOS_SIZE]>>) -> Self {
        self.bios_rom = bios_rom;
        self
    }

    pub fn host_sample_rate(mut self, host_sample_rate: u32) -> Self {
        self.host_sample_rate = host_sample_rate;
        self
    }

    pub fn build(self) -> EmulatorOptions {
        EmulatorOptions {
            skip_bios: self.skip_bios,
            save_type_override: self.save_type_override,
            resampler: self.resampler,
            mp2k_hle: self.mp2k_hle,
            bios_rom: self.bios_rom,
            host_sample_rate: self.host_sample_rate,
        }
    }
}

impl Default for EmulatorOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl From<EmulatorOptions> for EmulatorOptionsBuilder {
    fn from(from: EmulatorOptions) -> Self {
        EmulatorOptionsBuilder {
            skip_bios: from.skip_bios,
            save_type_override: from.save_type_override,
            resampler: from.resampler,
            mp2k_hle: from.mp2k_hle,
            bios_rom: from.bios_rom,
            host_sample_rate: from.host_sample_rate,
        }
    }
}

/// Pulls completed stereo sample pairs out of the APU's ring buffer on its own thread; the core
/// only ever pushes into that buffer, never blocks on a consumer.
pub trait AudioDevice {
    fn sample_rate(&self) -> u32;
    fn push_samples(&mut self, samples: &[(f32, f32)]);
}

/// Receives a completed frame at the end of VBLANK. The core hands over a borrowed slice; the
/// host copies or presents it before returning.
pub trait VideoDevice {
    fn draw(&mut self, frame_buffer: &[u16]);
}

/// Polled once per `Joypad` register read; hosts translate their own input state into the ten
/// GBA keys.
pub trait InputDevice {
    fn poll(&mut self, key: InputKey) -> bool;
}
