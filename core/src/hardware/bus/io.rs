//! I/O register address constants (offsets from 0x0400_0000).

pub const DISPCNT: u32 = 0x000;
pub const DISPSTAT: u32 = 0x004;
pub const VCOUNT: u32 = 0x006;
pub const BG0CNT: u32 = 0x008;
pub const BG1CNT: u32 = 0x00A;
pub const BG2CNT: u32 = 0x00C;
pub const BG3CNT: u32 = 0x00E;
pub const BG0HOFS: u32 = 0x010;
pub const BG0VOFS: u32 = 0x012;
pub const BG1HOFS: u32 = 0x014;
pub const BG1VOFS: u32 = 0x016;
pub const BG2HOFS: u32 = 0x018;
pub const BG2VOFS: u32 = 0x01A;
pub const BG3HOFS: u32 = 0x01C;
pub const BG3VOFS: u32 = 0x01E;
pub const BG2PA: u32 = 0x020;
pub const BG2PB: u32 = 0x022;
pub const BG2PC: u32 = 0x024;
pub const BG2PD: u32 = 0x026;
pub const BG2X: u32 = 0x028;
pub const BG2Y: u32 = 0x02C;
pub const BG3PA: u32 = 0x030;
pub const BG3PB: u32 = 0x032;
pub const BG3PC: u32 = 0x034;
pub const BG3PD: u32 = 0x036;
pub const BG3X: u32 = 0x038;
pub const BG3Y: u32 = 0x03C;
pub const WIN0H: u32 = 0x040;
pub const WIN1H: u32 = 0x042;
pub const WIN0V: u32 = 0x044;
pub const WIN1V: u32 = 0x046;
pub const WININ: u32 = 0x048;
pub const WINOUT: u32 = 0x04A;
pub const MOSAIC: u32 = 0x04C;
pub const BLDCNT: u32 = 0x050;
pub const BLDALPHA: u32 = 0x052;
pub const BLDY: u32 = 0x054;
pub const SOUND1CNT_L: u32 = 0x060;
pub const SOUND1CNT_H: u32 = 0x062;
pub const SOUND1CNT_X: u32 = 0x064;
pub const SOUND2CNT_L: u32 = 0x068;
pub const SOUND2CNT_H: u32 = 0x06C;
pub const SOUND3CNT_L: u32 = 0x070;
pub const SOUND3CNT_H: u32 = 0x072;
pub const SOUND3CNT_X: u32 = 0x074;
pub const SOUND4CNT_L: u32 = 0x078;
pub const SOUND4CNT_H: u32 = 0x07C;
pub const SOUNDCNT_L: u32 = 0x080;
pub const SOUNDCNT_H: u32 = 0x082;
pub const SOUNDCNT_X: u32 = 0x084;
pub const SOUNDBIAS: u32 = 0x088;
pub const WAVE_RAM: u32 = 0x090;
pub const FIFO_A: u32 = 0x0A0;
pub const FIFO_B: u32 = 0x0A4;
pub const DMA0SAD: u32 = 0x0B0;
pub const DMA0DAD: u32 = 0x0B4;
pub const DMA0CNT_L: u32 = 0x0B8;
pub const DMA0CNT_H: u32 = 0x0BA;
pub const DMA1SAD: u32 = 0x0BC;
pub const DMA1DAD: u32 = 0x0C0;
pub const DMA1CNT_L: u32 = 0x0C4;
pub const DMA1CNT_H: u32 = 0x0C6;
pub const DMA2SAD: u32 = 0x0C8;
pub const DMA2DAD: u32 = 0x0CC;
pub const DMA2CNT_L: u32 = 0x0D0;
pub const DMA2CNT_H: u32 = 0x0D2;
pub const DMA3SAD: u32 = 0x0D4;
pub const DMA3DAD: u32 = 0x0D8;
pub const DMA3CNT_L: u32 = 0x0DC;
pub const DMA3CNT_H: u32 = 0x0DE;
pub const TM0CNT_L: u32 = 0x100;
pub const TM0CNT_H: u32 = 0x102;
pub const TM1CNT_L: u32 = 0x104;
pub const TM1CNT_H: u32 = 0x106;
pub const TM2CNT_L: u32 = 0x108;
pub const TM2CNT_H: u32 = 0x10A;
pub const TM3CNT_L: u32 = 0x10C;
pub const TM3CNT_H: u32 = 0x10E;
pub const KEYINPUT: u32 = 0x130;
pub const KEYCNT: u32 = 0x132;
pub const IE: u32 = 0x200;
pub const IF: u32 = 0x202;
pub const WAITCNT: u32 = 0x204;
pub const IME: u32 = 0x208;
pub const POSTFLG: u32 = 0x300;
pub const HALTCNT: u32 = 0x301;
