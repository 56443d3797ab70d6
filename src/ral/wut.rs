//! Wake-up timer registers.

use super::{RORegister, RWRegister, WORegister};

#[repr(C)]
pub struct RegisterBlock {
    /// Current count, low half
    pub T2VAL0: RORegister<u16>,
    _reserved0: u16,
    /// Current count, high half
    pub T2VAL1: RORegister<u16>,
    _reserved1: u16,
    /// Control
    pub T2CON: RWRegister<u16>,
    _reserved2: u16,
    /// Field A increment
    pub T2INC: RWRegister<u16>,
    _reserved3: u16,
    pub T2WUFB0: RWRegister<u16>,
    _reserved4: u16,
    pub T2WUFB1: RWRegister<u16>,
    _reserved5: u16,
    pub T2WUFC0: RWRegister<u16>,
    _reserved6: u16,
    pub T2WUFC1: RWRegister<u16>,
    _reserved7: u16,
    pub T2WUFD0: RWRegister<u16>,
    _reserved8: u16,
    pub T2WUFD1: RWRegister<u16>,
    _reserved9: u16,
    /// Interrupt enable
    pub T2IEN: RWRegister<u16>,
    _reserved10: u16,
    /// Status
    pub T2STA: RORegister<u16>,
    _reserved11: u16,
    /// Clear interrupt
    pub T2CLRI: WORegister<u16>,
    _reserved12: u16,
    pub WUTVAL_LOW: RWRegister<u16>,
    _reserved13: u16,
    pub WUTVAL_HIGH: RWRegister<u16>,
    _reserved14: u16,
    pub T2WUFA0: RWRegister<u16>,
    _reserved15: u16,
    pub T2WUFA1: RWRegister<u16>,
}

const _: () = assert!(core::mem::offset_of!(RegisterBlock, T2IEN) == 0x28);
const _: () = assert!(core::mem::offset_of!(RegisterBlock, T2CLRI) == 0x30);
const _: () = assert!(core::mem::offset_of!(RegisterBlock, T2WUFA1) == 0x40);

impl RegisterBlock {
    /// The `(low, high)` halves of comparator A, B, C or D, for indices 0
    /// through 3.
    pub fn comparator(&self, index: usize) -> (&RWRegister<u16>, &RWRegister<u16>) {
        match index {
            0 => (&self.T2WUFA0, &self.T2WUFA1),
            1 => (&self.T2WUFB0, &self.T2WUFB1),
            2 => (&self.T2WUFC0, &self.T2WUFC1),
            _ => (&self.T2WUFD0, &self.T2WUFD1),
        }
    }
}

pub mod T2CON {
    fields!(u16;
        PRE @ 0 : 2,
        MOD @ 3 : 1,
        ENABLE @ 5 : 1,
        FREEZE @ 6 : 1,
        WUEN @ 8 : 1,
        CLK @ 9 : 2,
        STOP_WUFA @ 11 : 1,
    );
}

/// Shared by `T2IEN`, `T2STA` and `T2CLRI`.
pub mod T2IEN {
    fields!(u16;
        WUFA @ 0 : 1,
        WUFB @ 1 : 1,
        WUFC @ 2 : 1,
        WUFD @ 3 : 1,
        ROLL @ 4 : 1,
    );
}

pub mod T2STA {
    pub use super::T2IEN::*;
}

pub mod T2CLRI {
    pub use super::T2IEN::*;
}
