//! The `Bus` owns every hardware subsystem and dispatches every CPU/DMA memory access by address
//! range through `read8`/`read16`/`read32`/`write8`/`write16`/`write32`. `tick()` is the central
//! loop that drains due scheduler events and hands them to whichever subsystem owns them.

pub mod io;
pub mod prefetch;
pub mod waitstates;

use crate::hardware::apu::Apu;
use crate::hardware::cartridge::Cartridge;
use crate::hardware::dma::{DmaBus, DmaController};
use crate::hardware::irq::InterruptController;
use crate::hardware::ppu::Ppu;
use crate::hardware::timer::Timers;
use crate::joypad::Joypad;
use crate::scheduler::{EventClass, Scheduler};
use prefetch::Prefetcher;
use waitstates::WaitStates;

const BIOS_SIZE: usize = 16 * 1024;
const EWRAM_SIZE: usize = 256 * 1024;
const IWRAM_SIZE: usize = 32 * 1024;

pub struct Bus {
    pub scheduler: Scheduler,
    pub bios: Vec<u8>,
    pub ewram: Vec<u8>,
    pub iwram: Vec<u8>,
    pub ppu: Ppu,
    pub apu: Apu,
    pub timers: Timers,
    pub dma: DmaController,
    pub irq: InterruptController,
    pub joypad: Joypad,
    pub cartridge: Cartridge,
    pub waitstates: WaitStates,
    pub(crate) prefetcher: Prefetcher,
    pub(crate) last_bios_word: u32,
    pub(crate) last_opcode: u32,
    pub halt_requested: bool,
    pub stop_requested: bool,
    /// End address + region of the last code fetch, used to tell a sequential fetch (the next
    /// instruction in a straight-line run) from a nonsequential one (after a branch, or crossing
    /// into a different region/ROM mirror).
    prev_code: Option<(u32, Region)>,
    /// Same idea for data loads/stores, so a burst (LDM/STM, SWP's two accesses) prices its
    /// non-first members as sequential.
    prev_data: Option<(u32, Region)>,
}

impl Bus {
    pub fn new(cartridge: Cartridge, bios: Vec<u8>, host_sample_rate: u32) -> Self {
        let mut bios_mem = vec![0u8; BIOS_SIZE];
        let n = bios.len().min(BIOS_SIZE);
        bios_mem[..n].copy_from_slice(&bios[..n]);

        Self {
            scheduler: Scheduler::new(),
            bios: bios_mem,
            ewram: vec![0; EWRAM_SIZE],
            iwram: vec![0; IWRAM_SIZE],
            ppu: Ppu::new(),
            apu: Apu::new(host_sample_rate),
            timers: Timers::new(),
            dma: DmaController::new(),
            irq: InterruptController::new(),
            joypad: Joypad::new(),
            cartridge,
            waitstates: WaitStates::new(),
            prefetcher: Prefetcher::new(),
            last_bios_word: 0,
            last_opcode: 0,
            halt_requested: false,
            stop_requested: false,
            prev_code: None,
            prev_data: None,
        }
    }

    pub fn power_on(&mut self) {
        self.ppu.power_on(&mut self.scheduler);
        self.apu.power_on(&mut self.scheduler);
    }

    /// Advances the scheduler by `cycles`, dispatching every event now due into the owning
    /// subsystem.
    pub fn tick(&mut self, cycles: u32) {
        let mut due: Vec<(EventClass, u64, u64)> = Vec::new();
        self.scheduler.add_cycles(cycles as u64, |class, data, ts| due.push((class, data, ts)));
        for (class, data, _ts) in due {
            self.dispatch(class, data);
        }
    }

    fn dispatch(&mut self, class: EventClass, data: u64) {
        match class {
            EventClass::Sentinel => unreachable!("sentinel should never be dispatched"),
            EventClass::PpuPhaseTransition => {
                self.ppu.handle_transition(&mut self.scheduler, &mut self.irq, &mut self.dma);
            }
            EventClass::PpuAffineReload => {}
            EventClass::ApuSequencerTick => self.apu.handle_sequencer_tick(&mut self.scheduler),
            EventClass::ApuSampleTick => self.apu.handle_sample_tick(&mut self.scheduler),
            EventClass::TimerOverflow => {
                let index = data as usize;
                let apu = &mut self.apu;
                let dma = &mut self.dma;
                self.timers.handle_overflow(index, &mut self.scheduler, &mut self.irq, |i, scheduler| {
                    apu.on_timer_overflow(i, dma, scheduler);
                });
            }
            EventClass::TimerWriteReload | EventClass::TimerWriteControl => {
                let index = data as usize;
                self.timers.apply_control_write(index, &mut self.scheduler);
            }
            EventClass::DmaActivate => {
                self.dma.activate(data as usize);
            }
            EventClass::IrqAssert => self.irq.latch(),
            EventClass::EepromReady => {}
        }
    }

    pub fn irq_line_asserted(&self) -> bool {
        self.irq.line_asserted()
    }

    // -- byte/half/word access --------------------------------------------------------------

    pub fn read8(&mut self, address: u32) -> u8 {
        match region(address) {
            Region::Bios => {
                if address < BIOS_SIZE as u32 {
                    self.bios[address as usize]
                } else {
                    (self.last_bios_word >> ((address & 3) * 8)) as u8
                }
            }
            Region::Ewram => self.ewram[(address as usize) & (EWRAM_SIZE - 1)],
            Region::Iwram => self.iwram[(address as usize) & (IWRAM_SIZE - 1)],
            Region::Io => self.read_io8(address & 0x00FF_FFFF),
            Region::Palette => {
                let half = self.ppu.palette.read16((address as usize) & 0x3FE);
                (half >> ((address & 1) * 8)) as u8
            }
            Region::Vram => {
                let offset = vram_offset(address);
                *self.ppu.vram.get(offset).unwrap_or(&0)
            }
            Region::Oam => {
                let offset = (address as usize) & 0x3FF;
                *self.ppu.oam.get(offset).unwrap_or(&0)
            }
            Region::Rom(mirror) => {
                let _ = mirror;
                self.cartridge.read_rom8(address)
            }
            Region::Backup => self.cartridge.backup.read(address),
            Region::Unused => (self.last_opcode >> ((address & 3) * 8)) as u8,
        }
    }

    pub fn write8(&mut self, address: u32, value: u8) {
        match region(address) {
            Region::Bios => {}
            Region::Ewram => self.ewram[(address as usize) & (EWRAM_SIZE - 1)] = value,
            Region::Iwram => self.iwram[(address as usize) & (IWRAM_SIZE - 1)] = value,
            Region::Io => self.write_io8(address & 0x00FF_FFFF, value),
            Region::Palette => {
                // 8-bit writes to palette RAM write the same byte to both halves of the half-word.
                let off = (address as usize) & 0x3FE;
                self.ppu.palette.write16(off, (value as u16) | ((value as u16) << 8));
            }
            Region::Vram => {
                let offset = vram_offset(address);
                if offset < self.ppu.vram.len() {
                    self.ppu.vram[offset] = value;
                }
            }
            Region::Oam => {
                let offset = (address as usize) & 0x3FF;
                if offset < self.ppu.oam.len() {
                    self.ppu.oam[offset] = value;
                }
            }
            Region::Rom(_) => {}
            Region::Backup => self.cartridge.backup.write(address, value),
            Region::Unused => {}
        }
    }

    pub fn read16(&mut self, address: u32) -> u16 {
        let a = address & !1;
        self.read8(a) as u16 | (self.read8(a + 1) as u16) << 8
    }

    pub fn write16(&mut self, address: u32, value: u16) {
        let a = address & !1;
        self.write8(a, value as u8);
        self.write8(a + 1, (value >> 8) as u8);
    }

    pub fn read32(&mut self, address: u32) -> u32 {
        let a = address & !3;
        self.read16(a) as u32 | (self.read16(a + 2) as u32) << 16
    }

    pub fn write32(&mut self, address: u32, value: u32) {
        let a = address & !3;
        self.write16(a, value as u16);
        self.write16(a + 2, (value >> 16) as u16);
    }

    /// Access-cost accounting for one CPU bus cycle, including prefetch/wait-state effects.
    pub fn access_cycles(&mut self, address: u32, width: u32, sequential: bool, is_code_fetch: bool) -> u32 {
        match region(address) {
            Region::Ewram => if width == 4 { 5 } else { 2 },
            Region::Rom(mirror) => {
                if is_code_fetch && self.waitstates.prefetch_enabled {
                    if let Some(cost) = self.prefetcher.try_satisfy(address) {
                        return cost;
                    }
                    self.prefetcher.reset(address.wrapping_add(if width == 4 { 4 } else { 2 }));
                }
                if width == 4 {
                    self.waitstates.rom_access_32(mirror, sequential)
                } else {
                    self.waitstates.rom_access_16(mirror, sequential)
                }
            }
            Region::Backup => self.waitstates.sram_access(),
            _ => 1,
        }
    }

    fn read_io8(&mut self, offset: u32) -> u8 {
        let half = self.read_io16(offset & !1);
        (half >> ((offset & 1) * 8)) as u8
    }

    fn write_io8(&mut self, offset: u32, value: u8) {
        let aligned = offset & !1;
        let mut half = self.read_io16(aligned);
        if offset & 1 == 0 {
            half = (half & 0xFF00) | value as u16;
        } else {
            half = (half & 0x00FF) | ((value as u16) << 8);
        }
        self.write_io16(aligned, half);
    }

    fn read_io16(&mut self, offset: u32) -> u16 {
        use io::*;
        match offset {
            DISPCNT => self.ppu.dispcnt.to_bits(),
            DISPSTAT => self.ppu.dispstat.to_bits(),
            VCOUNT => self.ppu.vcount,
            KEYINPUT => self.joypad.key_input(),
            IE => self.irq.enable.bits(),
            IF => self.irq.flags.bits(),
            IME => self.irq.master_enable as u16,
            WAITCNT => self.waitstates.raw,
            TM0CNT_L => self.timers.read_counter(0, self.scheduler.now()),
            TM1CNT_L => self.timers.read_counter(1, self.scheduler.now()),
            TM2CNT_L => self.timers.read_counter(2, self.scheduler.now()),
            TM3CNT_L => self.timers.read_counter(3, self.scheduler.now()),
            _ => 0,
        }
    }

    fn write_io16(&mut self, offset: u32, value: u16) {
        use io::*;
        match offset {
            DISPCNT => self.ppu.dispcnt = crate::hardware::ppu::registers::DisplayControl::from_bits(value),
            DISPSTAT => {
                self.ppu.dispstat = crate::hardware::ppu::registers::DisplayStatus::from_bits(value, (value >> 8) as u8);
            }
            BG0CNT => self.ppu.bg_control[0] = crate::hardware::ppu::registers::BgControl::from_bits(value),
            BG1CNT => self.ppu.bg_control[1] = crate::hardware::ppu::registers::BgControl::from_bits(value),
            BG2CNT => self.ppu.bg_control[2] = crate::hardware::ppu::registers::BgControl::from_bits(value),
            BG3CNT => self.ppu.bg_control[3] = crate::hardware::ppu::registers::BgControl::from_bits(value),
            BG0HOFS => self.ppu.bg_scroll[0].0 = value & 0x1FF,
            BG0VOFS => self.ppu.bg_scroll[0].1 = value & 0x1FF,
            BG1HOFS => self.ppu.bg_scroll[1].0 = value & 0x1FF,
            BG1VOFS => self.ppu.bg_scroll[1].1 = value & 0x1FF,
            BG2HOFS => self.ppu.bg_scroll[2].0 = value & 0x1FF,
            BG2VOFS => self.ppu.bg_scroll[2].1 = value & 0x1FF,
            BG3HOFS => self.ppu.bg_scroll[3].0 = value & 0x1FF,
            BG3VOFS => self.ppu.bg_scroll[3].1 = value & 0x1FF,
            WININ => {
                self.ppu.win0.set_enable_bits(value as u8);
                self.ppu.win1.set_enable_bits((value >> 8) as u8);
            }
            WINOUT => {
                self.ppu.winout.set_enable_bits(value as u8);
                self.ppu.winobj.set_enable_bits((value >> 8) as u8);
            }
            WIN0H => {
                self.ppu.win0.right = value as u8;
                self.ppu.win0.left = (value >> 8) as u8;
            }
            WIN1H => {
                self.ppu.win1.right = value as u8;
                self.ppu.win1.left = (value >> 8) as u8;
            }
            WIN0V => {
                self.ppu.win0.bottom = value as u8;
                self.ppu.win0.top = (value >> 8) as u8;
            }
            WIN1V => {
                self.ppu.win1.bottom = value as u8;
                self.ppu.win1.top = (value >> 8) as u8;
            }
            BLDCNT => self.ppu.blend_control = crate::hardware::ppu::registers::BlendControl::from_bits(value),
            BLDALPHA => {
                self.ppu.blend_eva = (value & 0x1F) as u8;
                self.ppu.blend_evb = ((value >> 8) & 0x1F) as u8;
            }
            BLDY => self.ppu.blend_evy = (value & 0x1F) as u8,
            KEYCNT => {
                self.joypad.irq_key_select = crate::joypad::KeyFlags::from_bits_truncate(value & 0x3FF);
                self.joypad.irq_condition_and = value & (1 << 15) != 0;
                self.joypad.irq_enable = value & (1 << 14) != 0;
            }
            IE => self.irq.write_ie(value, &mut self.scheduler),
            IF => self.irq.write_if(value, &mut self.scheduler),
            IME => self.irq.write_ime(value & 1 != 0, &mut self.scheduler),
            WAITCNT => self.waitstates.write(value),
            TM0CNT_L => self.timers.write_reload(0, value, &mut self.scheduler),
            TM0CNT_H => self.timers.write_control(0, value, &mut self.scheduler),
            TM1CNT_L => self.timers.write_reload(1, value, &mut self.scheduler),
            TM1CNT_H => self.timers.write_control(1, value, &mut self.scheduler),
            TM2CNT_L => self.timers.write_reload(2, value, &mut self.scheduler),
            TM2CNT_H => self.timers.write_control(2, value, &mut self.scheduler),
            TM3CNT_L => self.timers.write_reload(3, value, &mut self.scheduler),
            TM3CNT_H => self.timers.write_control(3, value, &mut self.scheduler),
            DMA0CNT_H => self.dma.write_control(0, value, &mut self.scheduler),
            DMA1CNT_H => self.dma.write_control(1, value, &mut self.scheduler),
            DMA2CNT_H => self.dma.write_control(2, value, &mut self.scheduler),
            DMA3CNT_H => self.dma.write_control(3, value, &mut self.scheduler),
            HALTCNT => self.halt_requested = true,
            _ => {}
        }
    }

    /// Runs the DMA engine to completion (highest priority first), returning stolen cycles.
    pub fn run_dma_if_pending(&mut self) -> u32 {
        if !self.dma.any_runnable() {
            return 0;
        }
        let dma = &mut self.dma;
        let irq = &mut self.irq;
        let scheduler = &mut self.scheduler;
        let mut bus_shim = BusDmaShim {
            bios: &mut self.bios,
            ewram: &mut self.ewram,
            iwram: &mut self.iwram,
            ppu: &mut self.ppu,
            cartridge: &mut self.cartridge,
            apu: &mut self.apu,
        };
        // The FIFO-A/FIFO-B special-timing channels push their words straight into the APU as
        // part of the transfer loop itself (see `BusDmaShim::dma_write32`); nothing left to drain.
        dma.run(&mut bus_shim, irq, scheduler, |_, _| {})
    }
}

struct BusDmaShim<'a> {
    bios: &'a mut [u8],
    ewram: &'a mut [u8],
    iwram: &'a mut [u8],
    ppu: &'a mut Ppu,
    cartridge: &'a mut Cartridge,
    apu: &'a mut Apu,
}

impl<'a> DmaBus for BusDmaShim<'a> {
    fn dma_read8(&mut self, addr: u32) -> u8 {
        match region(addr) {
            Region::Bios => *self.bios.get(addr as usize).unwrap_or(&0),
            Region::Ewram => self.ewram[(addr as usize) & (EWRAM_SIZE - 1)],
            Region::Iwram => self.iwram[(addr as usize) & (IWRAM_SIZE - 1)],
            Region::Vram => *self.ppu.vram.get(vram_offset(addr)).unwrap_or(&0),
            Region::Oam => *self.ppu.oam.get((addr as usize) & 0x3FF).unwrap_or(&0),
            Region::Rom(_) => self.cartridge.read_rom8(addr),
            _ => 0,
        }
    }

    fn dma_write8(&mut self, addr: u32, value: u8) {
        match region(addr) {
            Region::Ewram => self.ewram[(addr as usize) & (EWRAM_SIZE - 1)] = value,
            Region::Iwram => self.iwram[(addr as usize) & (IWRAM_SIZE - 1)] = value,
            Region::Vram => {
                let off = vram_offset(addr);
                if off < self.ppu.vram.len() {
                    self.ppu.vram[off] = value;
                }
            }
            Region::Oam => {
                let off = (addr as usize) & 0x3FF;
                if off < self.ppu.oam.len() {
                    self.ppu.oam[off] = value;
                }
            }
            _ => {}
        }
    }

    fn dma_read16(&mut self, addr: u32) -> u16 {
        self.dma_read8(addr) as u16 | (self.dma_read8(addr + 1) as u16) << 8
    }

    fn dma_write16(&mut self, addr: u32, value: u16) {
        self.dma_write8(addr, value as u8);
        self.dma_write8(addr + 1, (value >> 8) as u8);
    }

    fn dma_read32(&mut self, addr: u32) -> u32 {
        self.dma_read16(addr) as u32 | (self.dma_read16(addr + 2) as u32) << 16
    }

    fn dma_write32(&mut self, addr: u32, value: u32) {
        if let Region::Io = region(addr) {
            let offset = addr & 0x00FF_FFFF;
            let bytes = value.to_le_bytes().map(|b| b as i8);
            if offset == io::FIFO_A {
                self.apu.fifo_a.push_word(bytes);
                return;
            } else if offset == io::FIFO_B {
                self.apu.fifo_b.push_word(bytes);
                return;
            }
        }
        self.dma_write16(addr, value as u16);
        self.dma_write16(addr + 2, (value >> 16) as u16);
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
enum Region {
    Bios,
    Ewram,
    Iwram,
    Io,
    Palette,
    Vram,
    Oam,
    Rom(u8),
    Backup,
    Unused,
}

fn region(address: u32) -> Region {
    match (address >> 24) & 0xF {
        0x0 => Region::Bios,
        0x2 => Region::Ewram,
        0x3 => Region::Iwram,
        0x4 => Region::Io,
        0x5 => Region::Palette,
        0x6 => Region::Vram,
        0x7 => Region::Oam,
        0x8 | 0x9 => Region::Rom(0),
        0xA | 0xB => Region::Rom(1),
        0xC | 0xD => Region::Rom(2),
        0xE | 0xF => Region::Backup,
        _ => Region::Unused,
    }
}

/// Seam the CPU is generic over: lets `Cpu<B: BusAccess>` be written and tested against anything
/// that looks like a GBA bus. `fetch16`/`fetch32` are the instruction-fetch path (the only one the
/// prefetch buffer serves); `read*`/`write*` are the data path. Both charge real wait-state cycles
/// before handing back the value, since they're the only way the CPU ever touches memory.
pub trait BusAccess {
    fn fetch16(&mut self, address: u32) -> u16;
    fn fetch32(&mut self, address: u32) -> u32;
    fn read8(&mut self, address: u32) -> u8;
    fn read16(&mut self, address: u32) -> u16;
    fn read32(&mut self, address: u32) -> u32;
    fn write8(&mut self, address: u32, value: u8);
    fn write16(&mut self, address: u32, value: u16);
    fn write32(&mut self, address: u32, value: u32);
    fn internal_cycles(&mut self, cycles: u32);
    fn irq_line_asserted(&self) -> bool;
    fn take_halt_request(&mut self) -> bool;
}

impl Bus {
    /// `true` if this access continues straight on from the last access of the same kind (same
    /// region, address picks up exactly where the last one left off) — i.e. a sequential bus
    /// cycle rather than a nonsequential one. Updates `prev` to this access's end address either
    /// way, so the access right after becomes the new baseline.
    fn take_sequential(prev: &mut Option<(u32, Region)>, address: u32, width: u32, reg: Region) -> bool {
        let sequential = matches!(*prev, Some((expected, prev_reg)) if expected == address && prev_reg == reg);
        *prev = Some((address.wrapping_add(width), reg));
        sequential
    }
}

impl BusAccess for Bus {
    fn fetch16(&mut self, address: u32) -> u16 {
        let reg = region(address);
        let sequential = Bus::take_sequential(&mut self.prev_code, address, 2, reg);
        let cost = self.access_cycles(address, 2, sequential, true);
        self.tick(cost);
        Bus::read16(self, address)
    }
    fn fetch32(&mut self, address: u32) -> u32 {
        let reg = region(address);
        let sequential = Bus::take_sequential(&mut self.prev_code, address, 4, reg);
        let cost = self.access_cycles(address, 4, sequential, true);
        self.tick(cost);
        Bus::read32(self, address)
    }
    fn read8(&mut self, address: u32) -> u8 {
        let reg = region(address);
        let sequential = Bus::take_sequential(&mut self.prev_data, address, 1, reg);
        let cost = self.access_cycles(address, 1, sequential, false);
        self.tick(cost);
        Bus::read8(self, address)
    }
    fn read16(&mut self, address: u32) -> u16 {
        let reg = region(address);
        let sequential = Bus::take_sequential(&mut self.prev_data, address, 2, reg);
        let cost = self.access_cycles(address, 2, sequential, false);
        self.tick(cost);
        Bus::read16(self, address)
    }
    fn read32(&mut self, address: u32) -> u32 {
        let reg = region(address);
        let sequential = Bus::take_sequential(&mut self.prev_data, address, 4, reg);
        let cost = self.access_cycles(address, 4, sequential, false);
        self.tick(cost);
        Bus::read32(self, address)
    }
    fn write8(&mut self, address: u32, value: u8) {
        let reg = region(address);
        let sequential = Bus::take_sequential(&mut self.prev_data, address, 1, reg);
        let cost = self.access_cycles(address, 1, sequential, false);
        self.tick(cost);
        Bus::write8(self, address, value)
    }
    fn write16(&mut self, address: u32, value: u16) {
        let reg = region(address);
        let sequential = Bus::take_sequential(&mut self.prev_data, address, 2, reg);
        let cost = self.access_cycles(address, 2, sequential, false);
        self.tick(cost);
        Bus::write16(self, address, value)
    }
    fn write32(&mut self, address: u32, value: u32) {
        let reg = region(address);
        let sequential = Bus::take_sequential(&mut self.prev_data, address, 4, reg);
        let cost = self.access_cycles(address, 4, sequential, false);
        self.tick(cost);
        Bus::write32(self, address, value)
    }
    fn internal_cycles(&mut self, cycles: u32) {
        self.tick(cycles);
        self.run_dma_if_pending();
    }
    fn irq_line_asserted(&self) -> bool {
        Bus::irq_line_asserted(self)
    }
    fn take_halt_request(&mut self) -> bool {
        let requested = self.halt_requested;
        self.halt_requested = false;
        requested
    }
}

fn vram_offset(address: u32) -> usize {
    let offset = (address as usize) & 0x1_FFFF;
    if offset >= 0x18000 {
        offset - 0x8000 // 32 KiB mirror of the last bank
    } else {
        offset
    }
}
