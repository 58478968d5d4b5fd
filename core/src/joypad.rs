//! Ten-key GBA joypad. KEYINPUT is active-low; KEYCNT supports an IRQ-on-combination mode.

use bitflags::bitflags;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InputKey {
    A,
    B,
    Select,
    Start,
    Right,
    Left,
    Up,
    Down,
    R,
    L,
}

bitflags! {
    #[derive(Default)]
    pub struct KeyFlags: u16 {
        const A      = 1 << 0;
        const B      = 1 << 1;
        const SELECT = 1 << 2;
        const START  = 1 << 3;
        const RIGHT  = 1 << 4;
        const LEFT   = 1 << 5;
        const UP     = 1 << 6;
        const DOWN   = 1 << 7;
        const R      = 1 << 8;
        const L      = 1 << 9;
    }
}

impl InputKey {
    fn flag(self) -> KeyFlags {
        match self {
            InputKey::A => KeyFlags::A,
            InputKey::B => KeyFlags::B,
            InputKey::Select => KeyFlags::SELECT,
            InputKey::Start => KeyFlags::START,
            InputKey::Right => KeyFlags::RIGHT,
            InputKey::Left => KeyFlags::LEFT,
            InputKey::Up => KeyFlags::UP,
            InputKey::Down => KeyFlags::DOWN,
            InputKey::R => KeyFlags::R,
            InputKey::L => KeyFlags::L,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Joypad {
    pressed: KeyFlags,
    pub irq_enable: bool,
    /// true = fire when ALL selected keys are pressed, false = ANY selected key.
    pub irq_condition_and: bool,
    pub irq_key_select: KeyFlags,
}

impl Joypad {
    pub fn new() -> Self {
        Self {
            pressed: KeyFlags::empty(),
            irq_enable: false,
            irq_condition_and: false,
            irq_key_select: KeyFlags::empty(),
        }
    }

    pub fn press(&mut self, key: InputKey) {
        self.pressed.insert(key.flag());
    }

    pub fn release(&mut self, key: InputKey) {
        self.pressed.remove(key.flag());
    }

    /// KEYINPUT: active-low, unset bit = pressed.
    pub fn key_input(&self) -> u16 {
        !self.pressed.bits() & 0x03FF
    }

    pub(crate) fn raw_pressed(&self) -> u16 {
        self.pressed.bits()
    }

    pub(crate) fn restore_pressed(&mut self, bits: u16) {
        self.pressed = KeyFlags::from_bits_truncate(bits);
    }

    pub fn should_raise_irq(&self) -> bool {
        if !self.irq_enable {
            return false;
        }
        let selected = self.pressed & self.irq_key_select;
        if self.irq_condition_and {
            selected == self.irq_key_select && !self.irq_key_select.is_empty()
        } else {
            !selected.is_empty()
        }
    }
}

impl Default for Joypad {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_input_is_active_low() {
        let mut pad = Joypad::new();
        assert_eq!(pad.key_input(), 0x03FF);
        pad.press(InputKey::A);
        assert_eq!(pad.key_input() & 1, 0);
    }

    #[test]
    fn and_condition_requires_all_selected_keys() {
        let mut pad = Joypad::new();
        pad.irq_enable = true;
        pad.irq_condition_and = true;
        pad.irq_key_select = KeyFlags::A | KeyFlags::B;
        pad.press(InputKey::A);
        assert!(!pad.should_raise_irq());
        pad.press(InputKey::B);
        assert!(pad.should_raise_irq());
    }
}
