//! Scanline state machine driving the background/sprite/window/blend engines.
//!
//! Every phase transition here is a scheduled event rather than a tick counted down on every CPU
//! cycle: `HDRAW_VDRAW -> HBLANK_VDRAW -> HDRAW_VDRAW -> ...`, switching to the VBLANK half of the
//! cycle at VCOUNT 160 and wrapping at 228.

pub mod background;
pub mod blend;
pub mod palette;
pub mod registers;
pub mod sprites;
pub mod window;

use crate::hardware::dma::{DmaController, Occasion};
use crate::hardware::irq::{InterruptController, InterruptSource};
use crate::scheduler::{EventClass, Scheduler};
use background::AffineParams;
use palette::Palette;
use registers::{BgControl, BlendControl, DisplayControl, DisplayStatus, Window};

pub const SCREEN_WIDTH: usize = 240;
pub const SCREEN_HEIGHT: usize = 160;
const CYCLES_PER_SCANLINE: u64 = 1232;
const HDRAW_CYCLES: u64 = 1007;
const HBLANK_CYCLES: u64 = CYCLES_PER_SCANLINE - HDRAW_CYCLES;
const TOTAL_SCANLINES: u16 = 228;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Phase {
    HDraw,
    HBlank,
}

pub struct Ppu {
    pub vram: Vec<u8>,
    pub oam: Vec<u8>,
    pub palette: Palette,
    pub dispcnt: DisplayControl,
    pub dispstat: DisplayStatus,
    pub vcount: u16,
    pub bg_control: [BgControl; 4],
    pub bg_scroll: [(u16, u16); 4],
    pub bg_affine: [AffineParams; 2],
    pub win0: Window,
    pub win1: Window,
    pub winobj: Window,
    pub winout: Window,
    pub win0_enabled: bool,
    pub win1_enabled: bool,
    pub obj_win_enabled: bool,
    pub blend_control: BlendControl,
    pub blend_eva: u8,
    pub blend_evb: u8,
    pub blend_evy: u8,
    pub frame_buffer: Vec<u16>,
    pub(crate) phase: Phase,
    pub frame_ready: bool,
}

impl Ppu {
    pub fn new() -> Self {
        Self {
            vram: vec![0; 96 * 1024],
            oam: vec![0; 1024],
            palette: Palette::new(),
            dispcnt: DisplayControl::default(),
            dispstat: DisplayStatus::default(),
            vcount: 0,
            bg_control: Default::default(),
            bg_scroll: Default::default(),
            bg_affine: Default::default(),
            win0: Window::default(),
            win1: Window::default(),
            winobj: Window::default(),
            winout: Window::default(),
            win0_enabled: false,
            win1_enabled: false,
            obj_win_enabled: false,
            blend_control: BlendControl::default(),
            blend_eva: 0,
            blend_evb: 0,
            blend_evy: 0,
            frame_buffer: vec![0; SCREEN_WIDTH * SCREEN_HEIGHT],
            phase: Phase::HDraw,
            frame_ready: false,
        }
    }

    pub fn power_on(&mut self, scheduler: &mut Scheduler) {
        scheduler.add(HDRAW_CYCLES, EventClass::PpuPhaseTransition, 3, 0);
    }

    /// Dispatch for `EventClass::PpuPhaseTransition`.
    pub fn handle_transition(
        &mut self,
        scheduler: &mut Scheduler,
        irq: &mut InterruptController,
        dma: &mut DmaController,
    ) {
        match self.phase {
            Phase::HDraw => {
                if self.vcount < SCREEN_HEIGHT as u16 {
                    self.render_scanline();
                }
                self.dispstat.hblank = true;
                if self.dispstat.hblank_irq_enable {
                    irq.raise(scheduler, InterruptSource::HBlank);
                }
                if self.vcount < SCREEN_HEIGHT as u16 {
                    dma.request(Occasion::HBlank, scheduler);
                }
                self.phase = Phase::HBlank;
                scheduler.add(HBLANK_CYCLES, EventClass::PpuPhaseTransition, 3, 0);
            }
            Phase::HBlank => {
                self.dispstat.hblank = false;
                self.vcount = (self.vcount + 1) % TOTAL_SCANLINES;
                self.dispstat.vcount_match = self.vcount as u8 == self.dispstat.vcount_target;
                if self.dispstat.vcount_match && self.dispstat.vcount_irq_enable {
                    irq.raise(scheduler, InterruptSource::VCount);
                }

                if self.vcount == SCREEN_HEIGHT as u16 {
                    self.dispstat.vblank = true;
                    self.frame_ready = true;
                    if self.dispstat.vblank_irq_enable {
                        irq.raise(scheduler, InterruptSource::VBlank);
                    }
                    dma.request(Occasion::VBlank, scheduler);
                    self.reload_affine_reference_points();
                } else if self.vcount == 0 {
                    self.dispstat.vblank = false;
                }

                self.phase = Phase::HDraw;
                scheduler.add(HDRAW_CYCLES, EventClass::PpuPhaseTransition, 3, 0);
            }
        }
    }

    fn reload_affine_reference_points(&mut self) {
        for affine in self.bg_affine.iter_mut() {
            affine.x_current = affine.x_ref;
            affine.y_current = affine.y_ref;
        }
    }

    fn render_scanline(&mut self) {
        if self.dispcnt.forced_blank {
            let row = self.vcount as usize * SCREEN_WIDTH;
            for px in self.frame_buffer[row..row + SCREEN_WIDTH].iter_mut() {
                *px = 0x7FFF;
            }
            return;
        }

        match self.dispcnt.mode {
            0 | 1 | 2 => self.render_tiled_scanline(),
            3 => self.render_bitmap_mode3(),
            4 => self.render_bitmap_mode4(),
            5 => self.render_bitmap_mode5(),
            _ => {}
        }

        for affine in self.bg_affine.iter_mut() {
            affine.x_current += affine.pb;
            affine.y_current += affine.pd;
        }
    }

    fn render_tiled_scanline(&mut self) {
        let line = self.vcount;
        let mut layer_colors: [[u16; SCREEN_WIDTH]; 4] = [[self.palette.backdrop(); SCREEN_WIDTH]; 4];
        let mut layer_opaque: [[bool; SCREEN_WIDTH]; 4] = [[false; SCREEN_WIDTH]; 4];

        for bg in 0..4 {
            if !self.dispcnt.bg_enable[bg] {
                continue;
            }
            let is_affine_capable = bg >= 2;
            let use_affine = is_affine_capable && self.dispcnt.mode != 0 && (self.dispcnt.mode != 1 || bg == 3);
            let mut indices = [0u8; SCREEN_WIDTH];
            if use_affine {
                let affine_idx = bg - 2;
                let map_tiles = 16u32 << self.bg_control[bg].screen_size;
                background::render_affine_line(
                    &mut indices,
                    &mut layer_colors[bg],
                    &self.vram,
                    &self.palette,
                    self.bg_control[bg],
                    &self.bg_affine[affine_idx.min(1)],
                    map_tiles,
                );
            } else {
                let (sx, sy) = self.bg_scroll[bg];
                background::render_text_line(
                    &mut indices,
                    &self.vram,
                    &self.palette,
                    self.bg_control[bg],
                    sx,
                    sy,
                    line,
                    &mut layer_colors[bg],
                );
            }
            for x in 0..SCREEN_WIDTH {
                layer_opaque[bg][x] = indices[x] != 0;
            }
        }

        let mut obj_pixels = [sprites::ObjPixel::default(); SCREEN_WIDTH];
        if self.dispcnt.obj_enable {
            sprites::render_obj_line(line, &self.oam, &self.vram, &self.palette, self.dispcnt.obj_char_1d, &mut obj_pixels);
        }

        let window_cfg = window::WindowConfig {
            win0: self.win0,
            win1: self.win1,
            win0_enabled: self.win0_enabled,
            win1_enabled: self.win1_enabled,
            obj_win_enabled: self.obj_win_enabled,
            winobj: self.winobj,
            outside: self.winout,
        };
        let any_window = window::any_window_active(&window_cfg);

        let row = self.vcount as usize * SCREEN_WIDTH;
        for x in 0..SCREEN_WIDTH {
            let mask = if any_window {
                window::resolve(&window_cfg, x as u32, line as u32, obj_pixels[x].is_window)
            } else {
                window::WindowMask { layer_enable: [true; 4], obj_enable: true, blend_enable: true }
            };

            let mut best: Option<(u8, u16, bool)> = None; // (priority, color, is_obj)
            for bg in 0..4 {
                if !mask.layer_enable[bg] || !layer_opaque[bg][x] {
                    continue;
                }
                let priority = self.bg_control[bg].priority;
                if best.map(|(p, _, _)| priority <= p).unwrap_or(true) {
                    best = Some((priority, layer_colors[bg][x], false));
                }
            }
            if mask.obj_enable && obj_pixels[x].opaque {
                let priority = obj_pixels[x].priority;
                if best.map(|(p, _, _)| priority <= p).unwrap_or(true) {
                    best = Some((priority, obj_pixels[x].color, true));
                }
            }

            let top_color = best.map(|(_, c, _)| c).unwrap_or_else(|| self.palette.backdrop());
            let is_obj = best.map(|(_, _, o)| o).unwrap_or(false);
            let semi = is_obj && obj_pixels[x].semi_transparent;

            let final_color = if mask.blend_enable {
                let effect = blend::effect_for(self.blend_control, self.blend_evy, self.blend_eva, self.blend_evb);
                match effect {
                    blend::Effect::Blend { eva, evb } if semi || self.blend_control.mode == 1 => {
                        blend::blend(top_color, self.palette.backdrop(), eva, evb)
                    }
                    blend::Effect::Brighten { evy } => blend::brighten(top_color, evy),
                    blend::Effect::Darken { evy } => blend::darken(top_color, evy),
                    _ => top_color,
                }
            } else {
                top_color
            };

            self.frame_buffer[row + x] = final_color;
        }
    }

    fn render_bitmap_mode3(&mut self) {
        let line = self.vcount as usize;
        let row = line * SCREEN_WIDTH;
        for x in 0..SCREEN_WIDTH {
            let addr = (line * SCREEN_WIDTH + x) * 2;
            let a = *self.vram.get(addr).unwrap_or(&0) as u16;
            let b = *self.vram.get(addr + 1).unwrap_or(&0) as u16;
            self.frame_buffer[row + x] = a | (b << 8);
        }
    }

    fn render_bitmap_mode4(&mut self) {
        let line = self.vcount as usize;
        let frame_offset = if self.dispcnt.frame_select == 1 { 0xA000 } else { 0 };
        let row = line * SCREEN_WIDTH;
        for x in 0..SCREEN_WIDTH {
            let idx = *self.vram.get(frame_offset + line * SCREEN_WIDTH + x).unwrap_or(&0);
            self.frame_buffer[row + x] = self.palette.bg_color(idx);
        }
    }

    fn render_bitmap_mode5(&mut self) {
        const W: usize = 160;
        const H: usize = 128;
        let line = self.vcount as usize;
        let row = line * SCREEN_WIDTH;
        if line >= H {
            for x in 0..SCREEN_WIDTH {
                self.frame_buffer[row + x] = self.palette.backdrop();
            }
            return;
        }
        let frame_offset = if self.dispcnt.frame_select == 1 { 0xA000 } else { 0 };
        for x in 0..SCREEN_WIDTH {
            if x >= W {
                self.frame_buffer[row + x] = self.palette.backdrop();
                continue;
            }
            let addr = frame_offset + (line * W + x) * 2;
            let a = *self.vram.get(addr).unwrap_or(&0) as u16;
            let b = *self.vram.get(addr + 1).unwrap_or(&0) as u16;
            self.frame_buffer[row + x] = a | (b << 8);
        }
    }

    pub fn take_frame(&mut self) -> Option<&[u16]> {
        if self.frame_ready {
            self.frame_ready = false;
            Some(&self.frame_buffer)
        } else {
            None
        }
    }
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_frame_visits_every_scanline_in_order() {
        let mut sched = Scheduler::new();
        let mut ppu = Ppu::new();
        let mut irq = InterruptController::new();
        let mut dma = DmaController::new();
        ppu.power_on(&mut sched);

        let mut vcounts = Vec::new();
        for _ in 0..(228 * 2) {
            let mut fired = false;
            sched.add_cycles(CYCLES_PER_SCANLINE, |class, _, _| {
                if class == EventClass::PpuPhaseTransition {
                    fired = true;
                }
            });
            if fired {
                ppu.handle_transition(&mut sched, &mut irq, &mut dma);
                vcounts.push(ppu.vcount);
            }
        }
        assert!(vcounts.len() >= 228);
    }
}
