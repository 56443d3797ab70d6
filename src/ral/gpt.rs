//! General purpose timer registers.

use super::{RORegister, RWRegister, WORegister};

#[repr(C)]
pub struct RegisterBlock {
    /// Load value
    pub GPTLD: RWRegister<u16>,
    _reserved0: u16,
    /// Current count
    pub GPTVAL: RORegister<u16>,
    _reserved1: u16,
    /// Control
    pub GPTCON: RWRegister<u16>,
    _reserved2: u16,
    /// Clear interrupt
    pub GPTCLRI: WORegister<u16>,
    _reserved3: u16,
    /// Captured count
    pub GPTCAP: RORegister<u16>,
    _reserved4: u16,
    /// Asynchronous load value
    pub GPTALD: RWRegister<u16>,
    _reserved5: u16,
    pub GPTAVAL: RORegister<u16>,
    _reserved6: u16,
    /// Status
    pub GPTSTA: RORegister<u16>,
    _reserved7: u16,
    /// PWM control
    pub GPTPCON: RWRegister<u16>,
    _reserved8: u16,
    /// PWM match value
    pub GPTPMAT: RWRegister<u16>,
}

const _: () = assert!(core::mem::offset_of!(RegisterBlock, GPTSTA) == 0x1c);
const _: () = assert!(core::mem::offset_of!(RegisterBlock, GPTPMAT) == 0x24);

pub mod GPTCON {
    fields!(u16;
        PRE @ 0 : 2,
        UP @ 2 : 1,
        MOD @ 3 : 1,
        ENABLE @ 4 : 1,
        CLK @ 5 : 2,
        RLD @ 7 : 1,
        EVENT @ 8 : 4,
        EVENTEN @ 12 : 1,
    );
}

pub mod GPTCLRI {
    fields!(u16;
        TMOUT @ 0 : 1,
        CAP @ 1 : 1,
    );
}

pub mod GPTSTA {
    fields!(u16;
        TMOUT @ 0 : 1,
        CAP @ 1 : 1,
        BUSY @ 6 : 1,
        PDOK @ 7 : 1,
    );
}

pub mod GPTPCON {
    fields!(u16;
        MATCH_EN @ 0 : 1,
        IDLE_STATE @ 1 : 1,
    );
}
