//! Random number generator registers.

use super::{RORegister, RWRegister};

#[repr(C)]
pub struct RegisterBlock {
    /// Control
    pub RNGCTL: RWRegister<u16>,
    _reserved0: u16,
    /// Sample length
    pub RNGLEN: RWRegister<u16>,
    _reserved1: u16,
    /// Status
    pub RNGSTAT: RWRegister<u16>,
    _reserved2: u16,
    /// Random data
    pub RNGDATA: RORegister<u16>,
    _reserved3: u16,
    /// Oscillator count, low half
    pub RNGCNTL: RORegister<u16>,
    _reserved4: u16,
    /// Oscillator count, high half
    pub RNGCNTH: RORegister<u16>,
}

const _: () = assert!(core::mem::offset_of!(RegisterBlock, RNGCNTH) == 0x14);

pub mod RNGCTL {
    fields!(u16;
        RNGEN @ 0 : 1,
        CNTEN @ 3 : 1,
        TMRMODE @ 4 : 1,
    );
}

pub mod RNGLEN {
    fields!(u16;
        LENRLD @ 0 : 12,
        LENPRE @ 12 : 4,
    );
}

pub mod RNGSTAT {
    fields!(u16;
        RNGRDY @ 0 : 1,
    );
}
