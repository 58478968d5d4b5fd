//! Headless runner: loads a BIOS/ROM pair, steps a fixed number of frames, then hashes the
//! resulting frame buffer with blake2 and compares it against an expected digest (or just prints
//! it, for recording a new known-good value). This is the practical way to re-run the timing
//! scenarios a real GBA test ROM exercises without a display attached.

mod options;

use std::convert::TryInto;
use std::fs::read;

use anyhow::{bail, Context, Result};
use blake2::{Blake2s, Digest};
use gumdrop::Options;
use image::{ImageBuffer, Rgb};
use log::info;
use oxide_advance_core::emulator::Emulator;
use oxide_advance_core::EmulatorOptionsBuilder;

use crate::options::AppOptions;

fn main() -> Result<()> {
    let options: AppOptions = AppOptions::parse_args_default_or_exit();
    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
    )
    .ok();

    let rom = read(&options.rom).with_context(|| format!("reading ROM at {}", options.rom))?;

    let bios_rom = if options.bios.is_empty() {
        None
    } else {
        let bytes = read(&options.bios).with_context(|| format!("reading BIOS at {}", options.bios))?;
        let boxed: Box<[u8; oxide_advance_core::BIOS_SIZE]> =
            bytes.try_into().map_err(|_| anyhow::anyhow!("BIOS image is not 16 KiB"))?;
        Some(boxed)
    };
    let skip_bios = bios_rom.is_none();

    let emu_options = EmulatorOptionsBuilder::new().skip_bios(skip_bios).bios_rom(bios_rom).build();
    let mut emu = Emulator::new(rom, emu_options).context("constructing emulator")?;

    for frame in 0..options.frames {
        emu.run_frame();
        info!("stepped frame {}", frame);
    }

    let frame_buffer = emu.frame_buffer();
    let mut hasher = Blake2s::new();
    for pixel in frame_buffer {
        hasher.update(pixel.to_le_bytes());
    }
    let digest = format!("{:x}", hasher.finalize());

    if !options.png_out.is_empty() {
        save_png(frame_buffer, &options.png_out)?;
    }

    if options.digest.is_empty() {
        println!("{}", digest);
    } else if digest != options.digest {
        bail!("frame buffer digest mismatch: expected {}, got {}", options.digest, digest);
    } else {
        println!("digest matched: {}", digest);
    }

    Ok(())
}

/// Expands the PPU's packed 15-bit RGB frame buffer to 24-bit RGB for PNG export.
fn save_png(frame_buffer: &[u16], path: &str) -> Result<()> {
    let (width, height) = (240usize, 160usize);
    let mut rgb = vec![0u8; width * height * 3];
    for (i, &px) in frame_buffer.iter().enumerate() {
        let r = ((px & 0x1F) as u32 * 255 / 31) as u8;
        let g = (((px >> 5) & 0x1F) as u32 * 255 / 31) as u8;
        let b = (((px >> 10) & 0x1F) as u32 * 255 / 31) as u8;
        rgb[i * 3] = r;
        rgb[i * 3 + 1] = g;
        rgb[i * 3 + 2] = b;
    }
    let buffer: ImageBuffer<Rgb<u8>, Vec<u8>> =
        ImageBuffer::from_raw(width as u32, height as u32, rgb).context("assembling PNG buffer")?;
    buffer.save(path).with_context(|| format!("saving PNG to {}", path))?;
    Ok(())
}
