//! Power block registers, including the external interrupt unit.

use super::{RORegister, RWRegister, WORegister};

#[repr(C)]
pub struct RegisterBlock {
    pub PWRMOD: RWRegister<u16>,
    _reserved0: u16,
    pub PWRKEY: RWRegister<u16>,
    _reserved1: u16,
    pub PSMCON: RWRegister<u16>,
    _reserved2: u16,
    pub OSCKEY: RWRegister<u16>,
    _reserved3: u16,
    pub OSCCTRL: RWRegister<u16>,
    _reserved4: [u16; 7],
    /// EINT0 through EINT3 configuration
    pub EI0CFG: RWRegister<u16>,
    _reserved5: u16,
    /// EINT4 through EINT7 configuration
    pub EI1CFG: RWRegister<u16>,
    _reserved6: u16,
    /// EINT8 configuration
    pub EI2CFG: RWRegister<u16>,
    _reserved7: [u16; 3],
    /// External interrupt clear
    pub EICLR: WORegister<u16>,
    _reserved8: u16,
    pub NMICLR: WORegister<u16>,
    _reserved9: u16,
    pub USBWKSTAT: RORegister<u16>,
    _reserved10: [u16; 3],
    pub RSTSTA: RWRegister<u16>,
}

const _: () = assert!(core::mem::offset_of!(RegisterBlock, EI0CFG) == 0x20);
const _: () = assert!(core::mem::offset_of!(RegisterBlock, EICLR) == 0x30);
const _: () = assert!(core::mem::offset_of!(RegisterBlock, RSTSTA) == 0x40);

impl RegisterBlock {
    /// The configuration register for external interrupt `n`, and the
    /// nibble that holds its settings.
    pub fn eicfg(&self, n: u8) -> (&RWRegister<u16>, u16) {
        let reg = match n {
            0..=3 => &self.EI0CFG,
            4..=7 => &self.EI1CFG,
            _ => &self.EI2CFG,
        };
        (reg, u16::from(n % 4) * 4)
    }
}

/// Fields of one EIxCFG nibble, relative to the nibble.
pub mod EICFG {
    fields!(u16;
        MDE @ 0 : 3,
        EN @ 3 : 1,
    );
}
