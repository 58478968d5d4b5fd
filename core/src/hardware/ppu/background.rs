//! Text and affine background rendering, one scanline at a time.

use super::palette::Palette;
use super::registers::BgControl;

const SCREEN_WIDTH: usize = 240;

#[derive(Debug, Clone, Copy, Default)]
pub struct AffineParams {
    pub pa: i32,
    pub pb: i32,
    pub pc: i32,
    pub pd: i32,
    pub x_ref: i32,
    pub y_ref: i32,
    /// Running reference point, reloaded from x_ref/y_ref at VBlank and on write.
    pub x_current: i32,
    pub y_current: i32,
}

pub fn sign_extend_28(value: u32) -> i32 {
    ((value << 4) as i32) >> 4
}

/// Renders one scanline of a text-mode background into `out`, storing palette indices (0 =
/// transparent) so the compositor can apply priority/blend afterward.
pub fn render_text_line(
    out: &mut [u8; SCREEN_WIDTH],
    vram: &[u8],
    palette: &Palette,
    ctrl: BgControl,
    scroll_x: u16,
    scroll_y: u16,
    line: u16,
    use_8bpp_colors: &mut [u16; SCREEN_WIDTH],
) {
    let (map_w, map_h) = match ctrl.screen_size {
        0 => (256u32, 256u32),
        1 => (512, 256),
        2 => (256, 512),
        _ => (512, 512),
    };
    let char_base = ctrl.char_base_block as usize * 0x4000;
    let screen_base = ctrl.screen_base_block as usize * 0x800;
    let y = (line as u32 + scroll_y as u32) % map_h;
    let tile_row = y / 8;
    let in_tile_y = y % 8;

    for screen_x in 0..SCREEN_WIDTH {
        let x = (screen_x as u32 + scroll_x as u32) % map_w;
        let tile_col = x / 8;
        let in_tile_x = x % 8;

        let sc_index = screen_block_index(tile_col, tile_row, map_w);
        let entry_addr = screen_base + sc_index * 2;
        let entry = read_u16(vram, entry_addr);
        let tile_id = entry & 0x3FF;
        let flip_x = entry & (1 << 10) != 0;
        let flip_y = entry & (1 << 11) != 0;
        let tile_palette = ((entry >> 12) & 0xF) as u8;

        let px = if flip_x { 7 - in_tile_x } else { in_tile_x };
        let py = if flip_y { 7 - in_tile_y } else { in_tile_y };

        let (color_index, color) = if ctrl.palette_256 {
            let tile_addr = char_base + tile_id as usize * 64 + (py * 8 + px) as usize;
            let idx = *vram.get(tile_addr).unwrap_or(&0);
            (idx, palette.bg_color_256(0, idx))
        } else {
            let tile_addr = char_base + tile_id as usize * 32 + (py * 4 + px / 2) as usize;
            let byte = *vram.get(tile_addr).unwrap_or(&0);
            let idx = if px % 2 == 0 { byte & 0xF } else { byte >> 4 };
            (idx, palette.bg_color_256(tile_palette, idx))
        };

        out[screen_x] = color_index;
        use_8bpp_colors[screen_x] = color;
    }
}

fn screen_block_index(tile_col: u32, tile_row: u32, map_w: u32) -> usize {
    // Screen blocks are 32x32 tiles; wide/tall maps lay out extra blocks after the first 32x32.
    let block_col = tile_col / 32;
    let block_row = tile_row / 32;
    let blocks_per_row = map_w / 256;
    let block_index = block_row * blocks_per_row + block_col;
    let local_col = tile_col % 32;
    let local_row = tile_row % 32;
    block_index as usize * 1024 + (local_row * 32 + local_col) as usize
}

fn read_u16(data: &[u8], addr: usize) -> u16 {
    let a = *data.get(addr).unwrap_or(&0) as u16;
    let b = *data.get(addr + 1).unwrap_or(&0) as u16;
    a | (b << 8)
}

/// Renders one scanline of an affine background (8bpp only, optional wraparound).
pub fn render_affine_line(
    out: &mut [u8; SCREEN_WIDTH],
    colors: &mut [u16; SCREEN_WIDTH],
    vram: &[u8],
    palette: &Palette,
    ctrl: BgControl,
    affine: &AffineParams,
    map_size_tiles: u32,
) {
    let char_base = ctrl.char_base_block as usize * 0x4000;
    let screen_base = ctrl.screen_base_block as usize * 0x800;
    let map_pixels = map_size_tiles * 8;

    let mut x_acc = affine.x_current;
    let mut y_acc = affine.y_current;

    for screen_x in 0..SCREEN_WIDTH {
        let (mut px, mut py) = (x_acc >> 8, y_acc >> 8);
        x_acc += affine.pa;
        y_acc += affine.pc;

        let in_bounds = px >= 0 && py >= 0 && (px as u32) < map_pixels && (py as u32) < map_pixels;
        if !in_bounds {
            if ctrl.wraparound {
                px = px.rem_euclid(map_pixels as i32);
                py = py.rem_euclid(map_pixels as i32);
            } else {
                out[screen_x] = 0;
                colors[screen_x] = palette.backdrop();
                continue;
            }
        }

        let tile_col = (px as u32 / 8) % map_size_tiles;
        let tile_row = (py as u32 / 8) % map_size_tiles;
        let tile_id = *vram.get(screen_base + (tile_row * map_size_tiles + tile_col) as usize).unwrap_or(&0);
        let in_tile_x = px as u32 % 8;
        let in_tile_y = py as u32 % 8;
        let tile_addr = char_base + tile_id as usize * 64 + (in_tile_y * 8 + in_tile_x) as usize;
        let idx = *vram.get(tile_addr).unwrap_or(&0);

        out[screen_x] = idx;
        colors[screen_x] = palette.bg_color_256(0, idx);
    }
}
