//! Save states: a versioned, flat snapshot of every mutable subsystem, encoded with `nanoserde`.
//!
//! The wire format is `b"NBSS"` + a little-endian `u32` version, followed by a `SerBin`-encoded
//! [`Snapshot`]. Every field here is a primitive, `Vec`, `bool`, or a nested struct built from
//! the same, deliberately avoiding fixed-size arrays and tuples: those are the two shapes
//! `nanoserde`'s derive does not reliably cover, so CPU/PPU/APU register files that are natively
//! `[u32; N]` get flattened into `Vec`s here instead of deriving on the hardware structs directly.
//!
//! Scheduler events are re-linked by UID rather than by position: every `EventHandle` a subsystem
//! holds is just a wrapped `u64`, so exporting the scheduler's heap with original UIDs intact and
//! restoring it verbatim makes every subsystem's stored handle valid again with no bookkeeping
//! beyond "does this event still exist" (see `Scheduler::export_events`/`import`).
//!
//! A few bit-serial backup/RTC protocols reset to their idle state across a save boundary rather
//! than preserving the exact mid-transfer bit position; see the doc comments on `Flash::set_bank`
//! and `Rtc::restore_raw_registers` for why that's safe. The APU's resampler is rebuilt fresh on
//! load for the same reason: it only affects audio continuity for a handful of samples, never
//! gameplay.

use std::convert::TryInto;

use nanoserde::{DeBin, SerBin};

use crate::emulator::Emulator;
use crate::error::{EmuError, EmuResult};
use crate::hardware::apu::psg::{NoiseChannel, SquareChannel, WaveChannel};
use crate::hardware::bus::Bus;
use crate::hardware::cartridge::backup::Backup;
use crate::hardware::cartridge::gpio::Gpio;
use crate::hardware::cpu::registers::{Psr, Registers};
use crate::hardware::dma::{AddressControl, DmaChannel, StartTiming, TransferSize};
use crate::hardware::ppu::background::AffineParams;
use crate::hardware::ppu::registers::{BgControl, DisplayControl, DisplayStatus, Window};
use crate::hardware::ppu::{Phase as PpuPhase, Ppu};
use crate::hardware::timer::{TimerChannel, TimerControl};
use crate::scheduler::EventClass;

pub const MAGIC: &[u8; 4] = b"NBSS";
pub const VERSION: u32 = 10;

#[derive(Debug, Clone, SerBin, DeBin)]
struct CpuSnapshot {
    r: Vec<u32>,
    cpsr: u32,
    spsr_fiq: u32,
    spsr_svc: u32,
    spsr_abt: u32,
    spsr_irq: u32,
    spsr_und: u32,
    fiq_hi: Vec<u32>,
    usr_hi: Vec<u32>,
    lo_banks: Vec<u32>,
    halted: bool,
    cycles: u64,
}

#[derive(Debug, Clone, SerBin, DeBin)]
struct SchedulerSnapshot {
    current_time: u64,
    next_uid: u64,
    timestamps: Vec<u64>,
    priorities: Vec<u8>,
    uids: Vec<u64>,
    classes: Vec<u8>,
    user_data: Vec<u64>,
}

#[derive(Debug, Clone, SerBin, DeBin)]
struct IrqSnapshot {
    enable: u16,
    flags: u16,
    master_enable: bool,
    asserted: bool,
}

#[derive(Debug, Clone, SerBin, DeBin)]
struct TimerChannelSnapshot {
    reload: u16,
    counter: u16,
    control: u16,
    started_at: u64,
    has_overflow_event: bool,
    overflow_event_uid: u64,
    has_pending_control: bool,
    pending_control: u16,
}

#[derive(Debug, Clone, SerBin, DeBin)]
struct DmaChannelSnapshot {
    source: u32,
    destination: u32,
    count: u16,
    source_internal: u32,
    destination_internal: u32,
    count_internal: u32,
    latch: u32,
    dest_control: u8,
    source_control: u8,
    start_timing: u8,
    size: u8,
    repeat: bool,
    gamepak_drq: bool,
    irq_enable: bool,
    enable: bool,
    running: bool,
}

#[derive(Debug, Clone, SerBin, DeBin)]
struct BgControlSnapshot {
    priority: u8,
    char_base_block: u8,
    mosaic: bool,
    palette_256: bool,
    screen_base_block: u8,
    wraparound: bool,
    screen_size: u8,
}

#[derive(Debug, Clone, SerBin, DeBin)]
struct AffineSnapshot {
    pa: i32,
    pb: i32,
    pc: i32,
    pd: i32,
    x_ref: i32,
    y_ref: i32,
    x_current: i32,
    y_current: i32,
}

#[derive(Debug, Clone, SerBin, DeBin)]
struct WindowSnapshot {
    left: u8,
    right: u8,
    top: u8,
    bottom: u8,
    layer_enable: Vec<bool>,
    obj_enable: bool,
    blend_enable: bool,
}

#[derive(Debug, Clone, SerBin, DeBin)]
struct PpuSnapshot {
    vram: Vec<u8>,
    oam: Vec<u8>,
    palette: Vec<u8>,
    dispcnt: u16,
    dispstat: u16,
    vcount: u16,
    bg_control: Vec<BgControlSnapshot>,
    bg_scroll_x: Vec<u16>,
    bg_scroll_y: Vec<u16>,
    bg_affine: Vec<AffineSnapshot>,
    win0: WindowSnapshot,
    win1: WindowSnapshot,
    winobj: WindowSnapshot,
    winout: WindowSnapshot,
    win0_enabled: bool,
    win1_enabled: bool,
    obj_win_enabled: bool,
    blend_target_a: u8,
    blend_target_b: u8,
    blend_mode: u8,
    blend_eva: u8,
    blend_evb: u8,
    blend_evy: u8,
    phase: u8,
    frame_ready: bool,
}

#[derive(Debug, Clone, SerBin, DeBin)]
struct EnvelopeSnapshot {
    initial_volume: u8,
    increasing: bool,
    period: u8,
    volume: u8,
    timer: u8,
}

#[derive(Debug, Clone, SerBin, DeBin)]
struct SweepSnapshot {
    period: u8,
    decreasing: bool,
    shift: u8,
    timer: u8,
    enabled: bool,
    shadow_freq: u16,
}

#[derive(Debug, Clone, SerBin, DeBin)]
struct SquareSnapshot {
    duty: u8,
    length_counter: u16,
    length_enable: bool,
    envelope: EnvelopeSnapshot,
    sweep: SweepSnapshot,
    frequency: u16,
    enabled: bool,
    phase: u8,
    timer: i32,
}

#[derive(Debug, Clone, SerBin, DeBin)]
struct WaveSnapshot {
    enabled_flag: bool,
    enabled: bool,
    length_counter: u16,
    length_enable: bool,
    volume_shift: u8,
    frequency: u16,
    bank: Vec<u8>,
    active_bank: u8,
    dimension_mode: bool,
    phase: u8,
    timer: i32,
}

#[derive(Debug, Clone, SerBin, DeBin)]
struct NoiseSnapshot {
    length_counter: u16,
    length_enable: bool,
    envelope: EnvelopeSnapshot,
    divisor_code: u8,
    shift: u8,
    narrow_mode: bool,
    enabled: bool,
    lfsr: u16,
    timer: i32,
}

#[derive(Debug, Clone, SerBin, DeBin)]
struct FifoSnapshot {
    bytes: Vec<i8>,
    latch: i8,
    volume_full: bool,
    enable_left: bool,
    enable_right: bool,
    timer_select: u8,
}

#[derive(Debug, Clone, SerBin, DeBin)]
struct ApuSnapshot {
    psg1: SquareSnapshot,
    psg2: SquareSnapshot,
    psg3: WaveSnapshot,
    psg4: NoiseSnapshot,
    fifo_a: FifoSnapshot,
    fifo_b: FifoSnapshot,
    psg_master_volume_l: u8,
    psg_master_volume_r: u8,
    psg_enable_left: Vec<bool>,
    psg_enable_right: Vec<bool>,
    psg_global_volume: u8,
    fifo_a_enable_l: bool,
    fifo_a_enable_r: bool,
    fifo_b_enable_l: bool,
    fifo_b_enable_r: bool,
    master_enable: bool,
    bias_level: u16,
    sequencer_step: u8,
    last_sample_time: u64,
}

#[derive(Debug, Clone, SerBin, DeBin)]
struct CartridgeSnapshot {
    backup_bytes: Vec<u8>,
    has_flash_bank: bool,
    flash_bank: u8,
    has_rtc: bool,
    rtc_status: u8,
    rtc_datetime: Vec<u8>,
}

#[derive(Debug, Clone, SerBin, DeBin)]
struct JoypadSnapshot {
    pressed: u16,
    irq_enable: bool,
    irq_condition_and: bool,
    irq_key_select: u16,
}

#[derive(Debug, Clone, SerBin, DeBin)]
struct Snapshot {
    cpu: CpuSnapshot,
    ewram: Vec<u8>,
    iwram: Vec<u8>,
    scheduler: SchedulerSnapshot,
    irq: IrqSnapshot,
    timers: Vec<TimerChannelSnapshot>,
    dma: Vec<DmaChannelSnapshot>,
    dma_runnable: u8,
    ppu: PpuSnapshot,
    apu: ApuSnapshot,
    cartridge: CartridgeSnapshot,
    joypad: JoypadSnapshot,
    waitcnt: u16,
    prefetch_head: u32,
    prefetch_count: u32,
    prefetch_active: bool,
}

fn snapshot_cpu(regs: &Registers, halted: bool, cycles: u64) -> CpuSnapshot {
    CpuSnapshot {
        r: regs.r.to_vec(),
        cpsr: regs.cpsr.to_bits(),
        spsr_fiq: regs.spsr_fiq.to_bits(),
        spsr_svc: regs.spsr_svc.to_bits(),
        spsr_abt: regs.spsr_abt.to_bits(),
        spsr_irq: regs.spsr_irq.to_bits(),
        spsr_und: regs.spsr_und.to_bits(),
        fiq_hi: regs.fiq_hi.to_vec(),
        usr_hi: regs.usr_hi.to_vec(),
        lo_banks: regs.lo_banks.iter().flatten().copied().collect(),
        halted,
        cycles,
    }
}

fn restore_cpu(snap: &CpuSnapshot, regs: &mut Registers) -> (bool, u64) {
    regs.r.copy_from_slice(&snap.r);
    regs.cpsr = Psr::from_bits(snap.cpsr);
    regs.spsr_fiq = Psr::from_bits(snap.spsr_fiq);
    regs.spsr_svc = Psr::from_bits(snap.spsr_svc);
    regs.spsr_abt = Psr::from_bits(snap.spsr_abt);
    regs.spsr_irq = Psr::from_bits(snap.spsr_irq);
    regs.spsr_und = Psr::from_bits(snap.spsr_und);
    regs.fiq_hi.copy_from_slice(&snap.fiq_hi);
    regs.usr_hi.copy_from_slice(&snap.usr_hi);
    for (i, chunk) in snap.lo_banks.chunks(2).enumerate() {
        regs.lo_banks[i] = [chunk[0], chunk[1]];
    }
    (snap.halted, snap.cycles)
}

fn snapshot_timer(ch: &TimerChannel) -> TimerChannelSnapshot {
    TimerChannelSnapshot {
        reload: ch.reload,
        counter: ch.counter,
        control: ch.control.to_bits(),
        started_at: ch.started_at,
        has_overflow_event: ch.overflow_event.is_some(),
        overflow_event_uid: ch.overflow_event.map(|h| h.uid_value()).unwrap_or(0),
        has_pending_control: ch.pending_control.is_some(),
        pending_control: ch.pending_control.map(|c| c.to_bits()).unwrap_or(0),
    }
}

fn restore_timer(snap: &TimerChannelSnapshot, ch: &mut TimerChannel) {
    ch.reload = snap.reload;
    ch.counter = snap.counter;
    ch.control = TimerControl::from_bits(snap.control);
    ch.started_at = snap.started_at;
    ch.overflow_event =
        if snap.has_overflow_event { Some(crate::scheduler::EventHandle::from_uid(snap.overflow_event_uid)) } else { None };
    ch.pending_control = if snap.has_pending_control { Some(TimerControl::from_bits(snap.pending_control)) } else { None };
}

fn snapshot_dma(ch: &DmaChannel) -> DmaChannelSnapshot {
    DmaChannelSnapshot {
        source: ch.source,
        destination: ch.destination,
        count: ch.count,
        source_internal: ch.source_internal,
        destination_internal: ch.destination_internal,
        count_internal: ch.count_internal,
        latch: ch.latch,
        dest_control: address_control_to_u8(ch.dest_control),
        source_control: address_control_to_u8(ch.source_control),
        start_timing: start_timing_to_u8(ch.start_timing),
        size: if ch.size == TransferSize::Word { 1 } else { 0 },
        repeat: ch.repeat,
        gamepak_drq: ch.gamepak_drq,
        irq_enable: ch.irq_enable,
        enable: ch.enable,
        running: ch.running,
    }
}

fn restore_dma(snap: &DmaChannelSnapshot, ch: &mut DmaChannel) {
    ch.source = snap.source;
    ch.destination = snap.destination;
    ch.count = snap.count;
    ch.source_internal = snap.source_internal;
    ch.destination_internal = snap.destination_internal;
    ch.count_internal = snap.count_internal;
    ch.latch = snap.latch;
    ch.dest_control = address_control_from_u8(snap.dest_control);
    ch.source_control = address_control_from_u8(snap.source_control);
    ch.start_timing = start_timing_from_u8(snap.start_timing);
    ch.size = if snap.size == 1 { TransferSize::Word } else { TransferSize::Half };
    ch.repeat = snap.repeat;
    ch.gamepak_drq = snap.gamepak_drq;
    ch.irq_enable = snap.irq_enable;
    ch.enable = snap.enable;
    ch.running = snap.running;
}

fn address_control_to_u8(c: AddressControl) -> u8 {
    match c {
        AddressControl::Increment => 0,
        AddressControl::Decrement => 1,
        AddressControl::Fixed => 2,
        AddressControl::IncrementReload => 3,
    }
}

fn address_control_from_u8(v: u8) -> AddressControl {
    match v {
        1 => AddressControl::Decrement,
        2 => AddressControl::Fixed,
        3 => AddressControl::IncrementReload,
        _ => AddressControl::Increment,
    }
}

fn start_timing_to_u8(t: StartTiming) -> u8 {
    match t {
        StartTiming::Immediate => 0,
        StartTiming::VBlank => 1,
        StartTiming::HBlank => 2,
        StartTiming::Special => 3,
    }
}

fn start_timing_from_u8(v: u8) -> StartTiming {
    match v {
        1 => StartTiming::VBlank,
        2 => StartTiming::HBlank,
        3 => StartTiming::Special,
        _ => StartTiming::Immediate,
    }
}

fn snapshot_bg_control(c: &BgControl) -> BgControlSnapshot {
    BgControlSnapshot {
        priority: c.priority,
        char_base_block: c.char_base_block,
        mosaic: c.mosaic,
        palette_256: c.palette_256,
        screen_base_block: c.screen_base_block,
        wraparound: c.wraparound,
        screen_size: c.screen_size,
    }
}

fn restore_bg_control(snap: &BgControlSnapshot) -> BgControl {
    BgControl {
        priority: snap.priority,
        char_base_block: snap.char_base_block,
        mosaic: snap.mosaic,
        palette_256: snap.palette_256,
        screen_base_block: snap.screen_base_block,
        wraparound: snap.wraparound,
        screen_size: snap.screen_size,
    }
}

fn snapshot_window(w: &Window) -> WindowSnapshot {
    WindowSnapshot {
        left: w.left,
        right: w.right,
        top: w.top,
        bottom: w.bottom,
        layer_enable: w.layer_enable.to_vec(),
        obj_enable: w.obj_enable,
        blend_enable: w.blend_enable,
    }
}

fn restore_window(snap: &WindowSnapshot) -> Window {
    let mut layer_enable = [false; 4];
    layer_enable.copy_from_slice(&snap.layer_enable);
    Window {
        left: snap.left,
        right: snap.right,
        top: snap.top,
        bottom: snap.bottom,
        layer_enable,
        obj_enable: snap.obj_enable,
        blend_enable: snap.blend_enable,
    }
}

fn snapshot_affine(a: &AffineParams) -> AffineSnapshot {
    AffineSnapshot {
        pa: a.pa,
        pb: a.pb,
        pc: a.pc,
        pd: a.pd,
        x_ref: a.x_ref,
        y_ref: a.y_ref,
        x_current: a.x_current,
        y_current: a.y_current,
    }
}

fn restore_affine(snap: &AffineSnapshot) -> AffineParams {
    AffineParams {
        pa: snap.pa,
        pb: snap.pb,
        pc: snap.pc,
        pd: snap.pd,
        x_ref: snap.x_ref,
        y_ref: snap.y_ref,
        x_current: snap.x_current,
        y_current: snap.y_current,
    }
}

fn snapshot_ppu(ppu: &Ppu) -> PpuSnapshot {
    PpuSnapshot {
        vram: ppu.vram.clone(),
        oam: ppu.oam.clone(),
        palette: ppu.palette.raw().to_vec(),
        dispcnt: ppu.dispcnt.to_bits(),
        dispstat: ppu.dispstat.to_bits(),
        vcount: ppu.vcount,
        bg_control: ppu.bg_control.iter().map(snapshot_bg_control).collect(),
        bg_scroll_x: ppu.bg_scroll.iter().map(|(x, _)| *x).collect(),
        bg_scroll_y: ppu.bg_scroll.iter().map(|(_, y)| *y).collect(),
        bg_affine: ppu.bg_affine.iter().map(snapshot_affine).collect(),
        win0: snapshot_window(&ppu.win0),
        win1: snapshot_window(&ppu.win1),
        winobj: snapshot_window(&ppu.winobj),
        winout: snapshot_window(&ppu.winout),
        win0_enabled: ppu.win0_enabled,
        win1_enabled: ppu.win1_enabled,
        obj_win_enabled: ppu.obj_win_enabled,
        blend_target_a: ppu.blend_control.target_a,
        blend_target_b: ppu.blend_control.target_b,
        blend_mode: ppu.blend_control.mode,
        blend_eva: ppu.blend_eva,
        blend_evb: ppu.blend_evb,
        blend_evy: ppu.blend_evy,
        phase: if ppu.phase == PpuPhase::HBlank { 1 } else { 0 },
        frame_ready: ppu.frame_ready,
    }
}

fn restore_ppu(snap: &PpuSnapshot, ppu: &mut Ppu) {
    let n = ppu.vram.len().min(snap.vram.len());
    ppu.vram[..n].copy_from_slice(&snap.vram[..n]);
    let n = ppu.oam.len().min(snap.oam.len());
    ppu.oam[..n].copy_from_slice(&snap.oam[..n]);
    ppu.palette.load_raw(&snap.palette);
    ppu.dispcnt = DisplayControl::from_bits(snap.dispcnt);
    ppu.dispstat = DisplayStatus::from_bits(snap.dispstat, (snap.dispstat >> 8) as u8);
    ppu.vcount = snap.vcount;
    for (i, bg) in snap.bg_control.iter().enumerate() {
        ppu.bg_control[i] = restore_bg_control(bg);
    }
    for i in 0..4 {
        ppu.bg_scroll[i] = (snap.bg_scroll_x[i], snap.bg_scroll_y[i]);
    }
    for (i, affine) in snap.bg_affine.iter().enumerate() {
        ppu.bg_affine[i] = restore_affine(affine);
    }
    ppu.win0 = restore_window(&snap.win0);
    ppu.win1 = restore_window(&snap.win1);
    ppu.winobj = restore_window(&snap.winobj);
    ppu.winout = restore_window(&snap.winout);
    ppu.win0_enabled = snap.win0_enabled;
    ppu.win1_enabled = snap.win1_enabled;
    ppu.obj_win_enabled = snap.obj_win_enabled;
    ppu.blend_control.target_a = snap.blend_target_a;
    ppu.blend_control.target_b = snap.blend_target_b;
    ppu.blend_control.mode = snap.blend_mode;
    ppu.blend_eva = snap.blend_eva;
    ppu.blend_evb = snap.blend_evb;
    ppu.blend_evy = snap.blend_evy;
    ppu.phase = if snap.phase == 1 { PpuPhase::HBlank } else { PpuPhase::HDraw };
    ppu.frame_ready = snap.frame_ready;
}

fn snapshot_envelope(e: &crate::hardware::apu::psg::square::Envelope) -> EnvelopeSnapshot {
    EnvelopeSnapshot { initial_volume: e.initial_volume, increasing: e.increasing, period: e.period, volume: e.volume(), timer: e.timer }
}

fn restore_envelope(snap: &EnvelopeSnapshot) -> crate::hardware::apu::psg::square::Envelope {
    let mut e = crate::hardware::apu::psg::square::Envelope::default();
    e.initial_volume = snap.initial_volume;
    e.increasing = snap.increasing;
    e.period = snap.period;
    e.volume = snap.volume;
    e.timer = snap.timer;
    e
}

fn snapshot_sweep(s: &crate::hardware::apu::psg::square::Sweep) -> SweepSnapshot {
    SweepSnapshot { period: s.period, decreasing: s.decreasing, shift: s.shift, timer: s.timer, enabled: s.enabled, shadow_freq: s.shadow_freq }
}

fn restore_sweep(snap: &SweepSnapshot) -> crate::hardware::apu::psg::square::Sweep {
    let mut s = crate::hardware::apu::psg::square::Sweep::default();
    s.period = snap.period;
    s.decreasing = snap.decreasing;
    s.shift = snap.shift;
    s.timer = snap.timer;
    s.enabled = snap.enabled;
    s.shadow_freq = snap.shadow_freq;
    s
}

fn snapshot_square(ch: &SquareChannel) -> SquareSnapshot {
    SquareSnapshot {
        duty: ch.duty,
        length_counter: ch.length_counter,
        length_enable: ch.length_enable,
        envelope: snapshot_envelope(&ch.envelope),
        sweep: snapshot_sweep(&ch.sweep),
        frequency: ch.frequency,
        enabled: ch.enabled,
        phase: ch.phase,
        timer: ch.timer,
    }
}

fn restore_square(snap: &SquareSnapshot, ch: &mut SquareChannel) {
    ch.duty = snap.duty;
    ch.length_counter = snap.length_counter;
    ch.length_enable = snap.length_enable;
    ch.envelope = restore_envelope(&snap.envelope);
    ch.sweep = restore_sweep(&snap.sweep);
    ch.frequency = snap.frequency;
    ch.enabled = snap.enabled;
    ch.phase = snap.phase;
    ch.timer = snap.timer;
}

fn snapshot_wave(ch: &WaveChannel) -> WaveSnapshot {
    WaveSnapshot {
        enabled_flag: ch.enabled_flag,
        enabled: ch.enabled,
        length_counter: ch.length_counter,
        length_enable: ch.length_enable,
        volume_shift: ch.volume_shift,
        frequency: ch.frequency,
        bank: ch.bank.iter().flatten().copied().collect(),
        active_bank: ch.active_bank as u8,
        dimension_mode: ch.dimension_mode,
        phase: ch.phase,
        timer: ch.timer,
    }
}

fn restore_wave(snap: &WaveSnapshot, ch: &mut WaveChannel) {
    ch.enabled_flag = snap.enabled_flag;
    ch.enabled = snap.enabled;
    ch.length_counter = snap.length_counter;
    ch.length_enable = snap.length_enable;
    ch.volume_shift = snap.volume_shift;
    ch.frequency = snap.frequency;
    for (bank, chunk) in ch.bank.iter_mut().zip(snap.bank.chunks(16)) {
        bank.copy_from_slice(chunk);
    }
    ch.active_bank = snap.active_bank as usize;
    ch.dimension_mode = snap.dimension_mode;
    ch.phase = snap.phase;
    ch.timer = snap.timer;
}

fn snapshot_noise(ch: &NoiseChannel) -> NoiseSnapshot {
    NoiseSnapshot {
        length_counter: ch.length_counter,
        length_enable: ch.length_enable,
        envelope: snapshot_envelope(&ch.envelope),
        divisor_code: ch.divisor_code,
        shift: ch.shift,
        narrow_mode: ch.narrow_mode,
        enabled: ch.enabled,
        lfsr: ch.lfsr,
        timer: ch.timer,
    }
}

fn restore_noise(snap: &NoiseSnapshot, ch: &mut NoiseChannel) {
    ch.length_counter = snap.length_counter;
    ch.length_enable = snap.length_enable;
    ch.envelope = restore_envelope(&snap.envelope);
    ch.divisor_code = snap.divisor_code;
    ch.shift = snap.shift;
    ch.narrow_mode = snap.narrow_mode;
    ch.enabled = snap.enabled;
    ch.lfsr = snap.lfsr;
    ch.timer = snap.timer;
}

fn snapshot_fifo(fifo: &crate::hardware::apu::fifo::Fifo) -> FifoSnapshot {
    FifoSnapshot {
        bytes: fifo.raw_bytes(),
        latch: fifo.latch,
        volume_full: fifo.volume_full,
        enable_left: fifo.enable_left,
        enable_right: fifo.enable_right,
        timer_select: fifo.timer_select,
    }
}

fn restore_fifo(snap: &FifoSnapshot, fifo: &mut crate::hardware::apu::fifo::Fifo) {
    fifo.restore_raw_bytes(&snap.bytes);
    fifo.latch = snap.latch;
    fifo.volume_full = snap.volume_full;
    fifo.enable_left = snap.enable_left;
    fifo.enable_right = snap.enable_right;
    fifo.timer_select = snap.timer_select;
}

/// Serializes the emulator's full mutable state into a versioned, self-describing byte blob.
pub fn save(emulator: &Emulator) -> Vec<u8> {
    let cpu = &emulator.cpu;
    let bus = &cpu.bus;

    let (has_flash_bank, flash_bank) = match &bus.cartridge.backup {
        Backup::Flash(flash) => (true, flash.bank() as u8),
        _ => (false, 0),
    };
    let (has_rtc, rtc_status, rtc_datetime) = match &bus.cartridge.gpio {
        Gpio::Rtc(rtc) => {
            let (status, datetime) = rtc.raw_registers();
            (true, status, datetime.to_vec())
        }
        Gpio::None => (false, 0, Vec::new()),
    };

    let events = bus.scheduler.export_events();
    let scheduler = SchedulerSnapshot {
        current_time: bus.scheduler.now(),
        next_uid: bus.scheduler.next_uid_value(),
        timestamps: events.iter().map(|e| e.0).collect(),
        priorities: events.iter().map(|e| e.1).collect(),
        uids: events.iter().map(|e| e.2).collect(),
        classes: events.iter().map(|e| e.3 as u8).collect(),
        user_data: events.iter().map(|e| e.4).collect(),
    };

    let snapshot = Snapshot {
        cpu: snapshot_cpu(&cpu.regs, cpu.halted, cpu.cycles),
        ewram: bus.ewram.clone(),
        iwram: bus.iwram.clone(),
        scheduler,
        irq: IrqSnapshot {
            enable: bus.irq.enable.bits(),
            flags: bus.irq.flags.bits(),
            master_enable: bus.irq.master_enable,
            asserted: bus.irq.asserted,
        },
        timers: bus.timers.channels.iter().map(snapshot_timer).collect(),
        dma: bus.dma.channels.iter().map(snapshot_dma).collect(),
        dma_runnable: bus.dma.runnable,
        ppu: snapshot_ppu(&bus.ppu),
        apu: ApuSnapshot {
            psg1: snapshot_square(&bus.apu.psg1),
            psg2: snapshot_square(&bus.apu.psg2),
            psg3: snapshot_wave(&bus.apu.psg3),
            psg4: snapshot_noise(&bus.apu.psg4),
            fifo_a: snapshot_fifo(&bus.apu.fifo_a),
            fifo_b: snapshot_fifo(&bus.apu.fifo_b),
            psg_master_volume_l: bus.apu.psg_master_volume.0,
            psg_master_volume_r: bus.apu.psg_master_volume.1,
            psg_enable_left: bus.apu.psg_enable_left.to_vec(),
            psg_enable_right: bus.apu.psg_enable_right.to_vec(),
            psg_global_volume: bus.apu.psg_global_volume,
            fifo_a_enable_l: bus.apu.fifo_a_enable.0,
            fifo_a_enable_r: bus.apu.fifo_a_enable.1,
            fifo_b_enable_l: bus.apu.fifo_b_enable.0,
            fifo_b_enable_r: bus.apu.fifo_b_enable.1,
            master_enable: bus.apu.master_enable,
            bias_level: bus.apu.bias_level,
            sequencer_step: bus.apu.sequencer_step,
            last_sample_time: bus.apu.last_sample_time,
        },
        cartridge: CartridgeSnapshot {
            backup_bytes: bus.cartridge.backup.raw().to_vec(),
            has_flash_bank,
            flash_bank,
            has_rtc,
            rtc_status,
            rtc_datetime,
        },
        joypad: JoypadSnapshot {
            pressed: bus.joypad.raw_pressed(),
            irq_enable: bus.joypad.irq_enable,
            irq_condition_and: bus.joypad.irq_condition_and,
            irq_key_select: bus.joypad.irq_key_select.bits(),
        },
        waitcnt: bus.waitstates.raw,
        prefetch_head: bus.prefetcher.head_address,
        prefetch_count: bus.prefetcher.count,
        prefetch_active: bus.prefetcher.active,
    };

    let mut out = Vec::with_capacity(8);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&snapshot.serialize_bin());
    out
}

/// Restores `emulator`'s mutable state from a blob produced by [`save`]. Rejects blobs with a
/// mismatched magic or version rather than guessing at a partial, possibly-corrupt layout.
pub fn load(emulator: &mut Emulator, bytes: &[u8]) -> EmuResult<()> {
    if bytes.len() < 8 || &bytes[0..4] != MAGIC {
        return Err(EmuError::UnsupportedSaveStateVersion { found: 0, supported: VERSION });
    }
    let found_version = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
    if found_version != VERSION {
        return Err(EmuError::UnsupportedSaveStateVersion { found: found_version, supported: VERSION });
    }

    let snapshot = Snapshot::deserialize_bin(&bytes[8..])
        .map_err(|_| EmuError::UnsupportedSaveStateVersion { found: found_version, supported: VERSION })?;

    let cpu = &mut emulator.cpu;
    let (halted, cycles) = restore_cpu(&snapshot.cpu, &mut cpu.regs);
    cpu.halted = halted;
    cpu.cycles = cycles;

    let bus: &mut Bus = &mut cpu.bus;
    let n = bus.ewram.len().min(snapshot.ewram.len());
    bus.ewram[..n].copy_from_slice(&snapshot.ewram[..n]);
    let n = bus.iwram.len().min(snapshot.iwram.len());
    bus.iwram[..n].copy_from_slice(&snapshot.iwram[..n]);

    let events = snapshot
        .scheduler
        .timestamps
        .iter()
        .zip(&snapshot.scheduler.priorities)
        .zip(&snapshot.scheduler.uids)
        .zip(&snapshot.scheduler.classes)
        .zip(&snapshot.scheduler.user_data)
        .map(|((((ts, prio), uid), class), data)| (*ts, *prio, *uid, EventClass::from_u8(*class), *data))
        .collect();
    bus.scheduler.import(snapshot.scheduler.current_time, snapshot.scheduler.next_uid, events);

    bus.irq.enable = crate::hardware::irq::InterruptFlags::from_bits_truncate(snapshot.irq.enable);
    bus.irq.flags = crate::hardware::irq::InterruptFlags::from_bits_truncate(snapshot.irq.flags);
    bus.irq.master_enable = snapshot.irq.master_enable;
    bus.irq.asserted = snapshot.irq.asserted;

    for (ch, snap) in bus.timers.channels.iter_mut().zip(&snapshot.timers) {
        restore_timer(snap, ch);
    }
    for (ch, snap) in bus.dma.channels.iter_mut().zip(&snapshot.dma) {
        restore_dma(snap, ch);
    }
    bus.dma.runnable = snapshot.dma_runnable;

    restore_ppu(&snapshot.ppu, &mut bus.ppu);

    restore_square(&snapshot.apu.psg1, &mut bus.apu.psg1);
    restore_square(&snapshot.apu.psg2, &mut bus.apu.psg2);
    restore_wave(&snapshot.apu.psg3, &mut bus.apu.psg3);
    restore_noise(&snapshot.apu.psg4, &mut bus.apu.psg4);
    restore_fifo(&snapshot.apu.fifo_a, &mut bus.apu.fifo_a);
    restore_fifo(&snapshot.apu.fifo_b, &mut bus.apu.fifo_b);
    bus.apu.psg_master_volume = (snapshot.apu.psg_master_volume_l, snapshot.apu.psg_master_volume_r);
    bus.apu.psg_enable_left.copy_from_slice(&snapshot.apu.psg_enable_left);
    bus.apu.psg_enable_right.copy_from_slice(&snapshot.apu.psg_enable_right);
    bus.apu.psg_global_volume = snapshot.apu.psg_global_volume;
    bus.apu.fifo_a_enable = (snapshot.apu.fifo_a_enable_l, snapshot.apu.fifo_a_enable_r);
    bus.apu.fifo_b_enable = (snapshot.apu.fifo_b_enable_l, snapshot.apu.fifo_b_enable_r);
    bus.apu.master_enable = snapshot.apu.master_enable;
    bus.apu.bias_level = snapshot.apu.bias_level;
    bus.apu.sequencer_step = snapshot.apu.sequencer_step;
    bus.apu.last_sample_time = snapshot.apu.last_sample_time;

    bus.cartridge.backup.load_raw(&snapshot.cartridge.backup_bytes);
    if let (true, Backup::Flash(flash)) = (snapshot.cartridge.has_flash_bank, &mut bus.cartridge.backup) {
        flash.set_bank(snapshot.cartridge.flash_bank as usize);
    }
    if let (true, Gpio::Rtc(rtc)) = (snapshot.cartridge.has_rtc, &mut bus.cartridge.gpio) {
        let mut datetime = [0u8; 7];
        let n = datetime.len().min(snapshot.cartridge.rtc_datetime.len());
        datetime[..n].copy_from_slice(&snapshot.cartridge.rtc_datetime[..n]);
        rtc.restore_raw_registers(snapshot.cartridge.rtc_status, datetime);
    }

    bus.joypad.restore_pressed(snapshot.joypad.pressed);
    bus.joypad.irq_enable = snapshot.joypad.irq_enable;
    bus.joypad.irq_condition_and = snapshot.joypad.irq_condition_and;
    bus.joypad.irq_key_select = crate::joypad::KeyFlags::from_bits_truncate(snapshot.joypad.irq_key_select);

    bus.waitstates.write(snapshot.waitcnt);
    bus.prefetcher.head_address = snapshot.prefetch_head;
    bus.prefetcher.count = snapshot.prefetch_count;
    bus.prefetcher.active = snapshot.prefetch_active;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::timer::TimerControl;
    use crate::EmulatorOptionsBuilder;

    fn test_emulator() -> Emulator {
        let rom = vec![0u8; 0x200];
        let options = EmulatorOptionsBuilder::new().skip_bios(true).build();
        Emulator::new(rom, options).unwrap()
    }

    #[test]
    fn round_trip_preserves_cpu_registers_and_scheduler_time() {
        let mut emulator = test_emulator();
        emulator.run(1000);
        emulator.cpu.regs.r[3] = 0xDEAD_BEEF;
        let blob = save(&emulator);

        let mut restored = test_emulator();
        load(&mut restored, &blob).unwrap();

        assert_eq!(restored.cpu.regs.r, emulator.cpu.regs.r);
        assert_eq!(restored.cpu.bus.scheduler.now(), emulator.cpu.bus.scheduler.now());
        assert_eq!(restored.cpu.cycles, emulator.cpu.cycles);
    }

    #[test]
    fn rejects_wrong_magic() {
        let emulator = test_emulator();
        let mut blob = save(&emulator);
        blob[0] = b'X';
        let mut restored = test_emulator();
        assert!(load(&mut restored, &blob).is_err());
    }

    #[test]
    fn rejects_wrong_version() {
        let emulator = test_emulator();
        let mut blob = save(&emulator);
        blob[4..8].copy_from_slice(&999u32.to_le_bytes());
        let mut restored = test_emulator();
        assert!(load(&mut restored, &blob).is_err());
    }

    #[test]
    fn timer_overflow_handle_round_trips_by_uid() {
        let mut emulator = test_emulator();
        emulator.cpu.bus.timers.write_reload(0, 0xFFF0, &mut emulator.cpu.bus.scheduler);
        emulator.cpu.bus.timers.write_control(
            0,
            TimerControl { prescaler_select: 0, cascade: false, irq_enable: false, enable: true }.to_bits(),
            &mut emulator.cpu.bus.scheduler,
        );
        emulator.cpu.bus.timers.apply_control_write(0, &mut emulator.cpu.bus.scheduler);
        let expected_uid = emulator.cpu.bus.timers.channels[0].overflow_event.map(|h| h.uid_value());

        let blob = save(&emulator);
        let mut restored = test_emulator();
        load(&mut restored, &blob).unwrap();

        assert_eq!(restored.cpu.bus.timers.channels[0].overflow_event.map(|h| h.uid_value()), expected_uid);
    }
}
