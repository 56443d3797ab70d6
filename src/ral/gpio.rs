//! GPIO port registers.

use super::{RORegister, RWRegister, WORegister};

/// The number of GPIO ports.
pub const PORTS: usize = 5;

/// One GPIO port.
#[repr(C)]
pub struct RegisterBlock {
    /// Pin multiplexing, two bits per pin
    pub GPCON: RWRegister<u32>,
    pub GPOEN: RWRegister<u16>,
    _reserved0: u16,
    /// Pull-up enable
    pub GPPE: RWRegister<u16>,
    _reserved1: u16,
    /// Input path enable
    pub GPIEN: RWRegister<u16>,
    _reserved2: u16,
    pub GPIN: RORegister<u16>,
    _reserved3: u16,
    pub GPOUT: RWRegister<u16>,
    _reserved4: u16,
    pub GPSET: WORegister<u16>,
    _reserved5: u16,
    pub GPCLR: WORegister<u16>,
    _reserved6: u16,
    pub GPTGL: WORegister<u16>,
    _reserved7: u16,
    /// Group interrupt polarity
    pub GPPOL: RWRegister<u16>,
    _reserved8: u16,
    /// Group A interrupt enable
    pub GPIENA: RWRegister<u16>,
    _reserved9: u16,
    /// Group B interrupt enable
    pub GPIENB: RWRegister<u16>,
    _reserved10: u16,
    /// Group interrupt status, write one to clear
    pub GPINT: RWRegister<u16>,
    _reserved11: [u8; 0x0e],
}

const _: () = assert!(core::mem::offset_of!(RegisterBlock, GPSET) == 0x18);
const _: () = assert!(core::mem::offset_of!(RegisterBlock, GPINT) == 0x30);
const _: () = assert!(core::mem::size_of::<RegisterBlock>() == 0x40);

/// Every GPIO port, back to back.
pub type Ports = [RegisterBlock; PORTS];
