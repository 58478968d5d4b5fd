//! Four-channel priority DMA engine.
//!
//! A control-register write arms a channel; a scheduled event actually performs the transfer.
//! All four channels are independently armed and checked in fixed priority order (0 highest, 3
//! lowest) whenever more than one is runnable at once.

use crate::hardware::irq::{InterruptController, InterruptSource};
use crate::scheduler::{EventClass, Scheduler};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AddressControl {
    Increment,
    Decrement,
    Fixed,
    IncrementReload,
}

impl AddressControl {
    fn from_bits(bits: u16) -> Self {
        match bits & 0b11 {
            0 => AddressControl::Increment,
            1 => AddressControl::Decrement,
            2 => AddressControl::Fixed,
            3 => AddressControl::IncrementReload,
            _ => unreachable!(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StartTiming {
    Immediate,
    VBlank,
    HBlank,
    Special,
}

impl StartTiming {
    fn from_bits(bits: u16) -> Self {
        match bits & 0b11 {
            0 => StartTiming::Immediate,
            1 => StartTiming::VBlank,
            2 => StartTiming::HBlank,
            3 => StartTiming::Special,
            _ => unreachable!(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransferSize {
    Half,
    Word,
}

#[derive(Debug, Clone)]
pub struct DmaChannel {
    pub index: u8,
    pub source: u32,
    pub destination: u32,
    pub count: u16,
    pub(crate) source_internal: u32,
    pub(crate) destination_internal: u32,
    pub(crate) count_internal: u32,
    /// Last word/halfword actually fetched from the bus, returned in place of open-bus reads
    /// when the source address falls below EWRAM (cartridge/BIOS-protected ranges reading back
    /// as `0` would otherwise corrupt transfers that legitimately rely on the stale latch value).
    pub(crate) latch: u32,
    pub dest_control: AddressControl,
    pub source_control: AddressControl,
    pub start_timing: StartTiming,
    pub size: TransferSize,
    pub repeat: bool,
    pub gamepak_drq: bool,
    pub irq_enable: bool,
    pub enable: bool,
    pub(crate) running: bool,
}

impl DmaChannel {
    fn new(index: u8) -> Self {
        Self {
            index,
            source: 0,
            destination: 0,
            count: 0,
            source_internal: 0,
            destination_internal: 0,
            count_internal: 0,
            latch: 0,
            dest_control: AddressControl::Increment,
            source_control: AddressControl::Increment,
            start_timing: StartTiming::Immediate,
            size: TransferSize::Half,
            repeat: false,
            gamepak_drq: false,
            irq_enable: false,
            enable: false,
            running: false,
        }
    }

    fn max_count(&self) -> u32 {
        if self.index == 3 { 0x10000 } else { 0x4000 }
    }

    fn latch(&mut self) {
        self.source_internal = self.source & if self.index == 0 { 0x07FF_FFFF } else { 0x0FFF_FFFF };
        self.destination_internal = self.destination & if self.index == 3 { 0x0FFF_FFFF } else { 0x07FF_FFFF };
        self.count_internal = if self.count == 0 { self.max_count() } else { self.count as u32 };
    }
}

/// Bitset of which channels requested activation for a given start occasion, read by `request`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Occasion {
    VBlank,
    HBlank,
    Special,
}

pub struct DmaController {
    pub channels: [DmaChannel; 4],
    pub(crate) runnable: u8,
}

/// Trait the bus implements so the DMA engine can move bytes without owning the whole bus.
pub trait DmaBus {
    fn dma_read8(&mut self, addr: u32) -> u8;
    fn dma_write8(&mut self, addr: u32, value: u8);
    fn dma_read16(&mut self, addr: u32) -> u16;
    fn dma_write16(&mut self, addr: u32, value: u16);
    fn dma_read32(&mut self, addr: u32) -> u32;
    fn dma_write32(&mut self, addr: u32, value: u32);
}

impl DmaController {
    pub fn new() -> Self {
        Self {
            channels: [DmaChannel::new(0), DmaChannel::new(1), DmaChannel::new(2), DmaChannel::new(3)],
            runnable: 0,
        }
    }

    pub fn write_control(&mut self, index: usize, bits: u16, scheduler: &mut Scheduler) {
        let ch = &mut self.channels[index];
        let was_enabled = ch.enable;
        ch.dest_control = AddressControl::from_bits(bits >> 5);
        ch.source_control = AddressControl::from_bits(bits >> 7);
        ch.repeat = bits & (1 << 9) != 0;
        ch.size = if bits & (1 << 10) != 0 { TransferSize::Word } else { TransferSize::Half };
        ch.gamepak_drq = bits & (1 << 11) != 0;
        ch.start_timing = StartTiming::from_bits(bits >> 12);
        ch.irq_enable = bits & (1 << 14) != 0;
        ch.enable = bits & (1 << 15) != 0;

        if ch.enable && !was_enabled {
            ch.latch();
            if ch.start_timing == StartTiming::Immediate {
                scheduler.add(2, EventClass::DmaActivate, index as u8, index as u64);
            }
        }
    }

    /// Called by the PPU/timer/APU when an occasion occurs; arms and, two cycles later,
    /// activates all channels configured for that occasion.
    pub fn request(&mut self, occasion: Occasion, scheduler: &mut Scheduler) {
        for (i, ch) in self.channels.iter().enumerate() {
            let matches = ch.enable
                && match occasion {
                    Occasion::VBlank => ch.start_timing == StartTiming::VBlank,
                    Occasion::HBlank => ch.start_timing == StartTiming::HBlank,
                    Occasion::Special => ch.start_timing == StartTiming::Special,
                };
            if matches {
                scheduler.add(2, EventClass::DmaActivate, i as u8, i as u64);
            }
        }
    }

    /// Dispatch for `EventClass::DmaActivate`: marks the channel runnable, then runs the DMA
    /// scheduler (highest priority = lowest index first).
    pub fn activate(&mut self, index: usize) {
        self.runnable |= 1 << index;
    }

    pub fn any_runnable(&self) -> bool {
        self.runnable != 0
    }

    /// Runs the single highest-priority runnable channel to completion, stealing cycles from
    /// the caller by returning how many bus cycles elapsed.
    pub fn run(
        &mut self,
        bus: &mut impl DmaBus,
        irq: &mut InterruptController,
        scheduler: &mut Scheduler,
        mut fifo_drain: impl FnMut(usize, &mut dyn DmaBus),
    ) -> u32 {
        let index = match (0..4).find(|i| self.runnable & (1 << i) != 0) {
            Some(i) => i,
            None => return 0,
        };
        self.runnable &= !(1 << index);

        let is_fifo_channel = (index == 1 || index == 2) && self.channels[index].start_timing == StartTiming::Special;
        let ch = &mut self.channels[index];
        ch.running = true;
        let mut cycles = 0u32;

        let unit_count = if is_fifo_channel { 4 } else { ch.count_internal };
        let size = if is_fifo_channel { TransferSize::Word } else { ch.size };

        for unit in 0..unit_count {
            let src = ch.source_internal;
            let dst = ch.destination_internal;
            match size {
                TransferSize::Half => {
                    let value = if src >= 0x0200_0000 {
                        let v = bus.dma_read16(src);
                        ch.latch = (v as u32) | (v as u32) << 16;
                        v
                    } else {
                        ch.latch as u16
                    };
                    bus.dma_write16(dst, value);
                    cycles += 1;
                }
                TransferSize::Word => {
                    let value = if src >= 0x0200_0000 {
                        let v = bus.dma_read32(src);
                        ch.latch = v;
                        v
                    } else {
                        ch.latch
                    };
                    bus.dma_write32(dst, value);
                    cycles += 1;
                }
            }
            let step: u32 = match size {
                TransferSize::Half => 2,
                TransferSize::Word => 4,
            };
            if !is_fifo_channel {
                ch.source_internal = apply_control(ch.source_control, ch.source_internal, step);
            }
            ch.destination_internal = if is_fifo_channel {
                dst
            } else {
                apply_control(ch.dest_control, ch.destination_internal, step)
            };
            let _ = unit;
        }

        if is_fifo_channel {
            fifo_drain(index, bus);
        }

        if self.channels[index].irq_enable {
            irq.raise(scheduler, InterruptSource::Dma(index as u8));
        }

        let ch = &mut self.channels[index];
        ch.running = false;
        if ch.repeat && ch.start_timing != StartTiming::Immediate {
            ch.count_internal = if ch.count == 0 { ch.max_count() } else { ch.count as u32 };
            if ch.dest_control == AddressControl::IncrementReload {
                ch.destination_internal = ch.destination;
            }
        } else {
            ch.enable = false;
        }

        cycles
    }
}

fn apply_control(control: AddressControl, addr: u32, step: u32) -> u32 {
    match control {
        AddressControl::Increment | AddressControl::IncrementReload => addr.wrapping_add(step),
        AddressControl::Decrement => addr.wrapping_sub(step),
        AddressControl::Fixed => addr,
    }
}

impl Default for DmaController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestBus {
        mem: std::collections::HashMap<u32, u8>,
    }

    impl DmaBus for TestBus {
        fn dma_read8(&mut self, addr: u32) -> u8 {
            *self.mem.get(&addr).unwrap_or(&0)
        }
        fn dma_write8(&mut self, addr: u32, value: u8) {
            self.mem.insert(addr, value);
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
            self.dma_write16(addr, value as u16);
            self.dma_write16(addr + 2, (value >> 16) as u16);
        }
    }

    #[test]
    fn immediate_word_transfer_copies_expected_range() {
        let mut dma = DmaController::new();
        let mut bus = TestBus { mem: Default::default() };
        for i in 0..16u32 {
            bus.mem.insert(0x0200_0000 + i, i as u8);
        }
        let mut sched = Scheduler::new();
        let mut irq = InterruptController::new();

        dma.channels[0].source = 0x0200_0000;
        dma.channels[0].destination = 0x0300_0000;
        dma.channels[0].count = 4;
        dma.write_control(0, 0b1000_0100_0000_0000, &mut sched); // size=word, enable=1
        dma.activate(0);
        dma.run(&mut bus, &mut irq, &mut sched, |_, _| {});

        for i in 0..16u32 {
            assert_eq!(bus.mem.get(&(0x0300_0000 + i)), bus.mem.get(&(0x0200_0000 + i)));
        }
    }
}
