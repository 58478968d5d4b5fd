//! Generic GPIO port for devices mapped into the top of the Game Pak region (0x080000C4..C9):
//! a 3-pin data/direction/control interface. RTC is the only implementor today; the trait is
//! shaped so a solar sensor or gyro could be added without touching the cartridge module.

pub mod rtc;

pub use rtc::Rtc;

pub trait GpioDevice {
    fn read_port(&mut self) -> u16;
    fn write_port(&mut self, value: u16, direction: u16);
    fn select(&mut self, readable: bool);
}

pub enum Gpio {
    None,
    Rtc(Rtc),
}

impl Gpio {
    pub fn read(&mut self) -> u16 {
        match self {
            Gpio::None => 0,
            Gpio::Rtc(rtc) => rtc.read_port(),
        }
    }

    pub fn write(&mut self, value: u16, direction: u16) {
        if let Gpio::Rtc(rtc) = self {
            rtc.write_port(value, direction);
        }
    }
}
