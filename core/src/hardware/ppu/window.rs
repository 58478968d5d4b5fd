//! Resolves, per pixel, which window (WIN0, WIN1, OBJ, or the implicit "outside") applies and
//! what it enables.

use super::registers::Window;

#[derive(Debug, Copy, Clone)]
pub struct WindowMask {
    pub layer_enable: [bool; 4],
    pub obj_enable: bool,
    pub blend_enable: bool,
}

pub struct WindowConfig {
    pub win0: Window,
    pub win1: Window,
    pub win0_enabled: bool,
    pub win1_enabled: bool,
    pub obj_win_enabled: bool,
    pub winobj: Window,
    pub outside: Window,
}

pub fn resolve(config: &WindowConfig, x: u32, y: u32, obj_window_here: bool) -> WindowMask {
    if config.win0_enabled && config.win0.contains(x, y) {
        return to_mask(config.win0);
    }
    if config.win1_enabled && config.win1.contains(x, y) {
        return to_mask(config.win1);
    }
    if config.obj_win_enabled && obj_window_here {
        return to_mask(config.winobj);
    }
    to_mask(config.outside)
}

fn to_mask(window: Window) -> WindowMask {
    WindowMask { layer_enable: window.layer_enable, obj_enable: window.obj_enable, blend_enable: window.blend_enable }
}

pub fn any_window_active(config: &WindowConfig) -> bool {
    config.win0_enabled || config.win1_enabled || config.obj_win_enabled
}
