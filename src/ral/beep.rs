//! Beeper registers.

use super::RWRegister;

#[repr(C)]
pub struct RegisterBlock {
    /// Beeper configuration
    pub CFG: RWRegister<u16>,
    _reserved0: u16,
    /// Beeper status
    pub STAT: RWRegister<u16>,
    _reserved1: u16,
    /// Tone A data
    pub TONE_A: RWRegister<u16>,
    _reserved2: u16,
    /// Tone B data
    pub TONE_B: RWRegister<u16>,
}

const _: () = assert!(core::mem::offset_of!(RegisterBlock, TONE_B) == 0x0c);

impl RegisterBlock {
    /// Tone A for `0`, tone B otherwise.
    pub fn tone(&self, index: usize) -> &RWRegister<u16> {
        if index == 0 {
            &self.TONE_A
        } else {
            &self.TONE_B
        }
    }
}

pub mod CFG {
    fields!(u16;
        SEQ_REPEAT @ 0 : 8,
        EN @ 8 : 1,
        IRQ_TONEA_START @ 10 : 1,
        IRQ_TONEA_END @ 11 : 1,
        IRQ_TONEB_START @ 12 : 1,
        IRQ_TONEB_END @ 13 : 1,
        IRQ_SEQ_NEAR_END @ 14 : 1,
        IRQ_SEQ_END @ 15 : 1,
    );
}

pub mod STAT {
    fields!(u16;
        SEQ_REMAIN @ 0 : 8,
        BUSY @ 8 : 1,
        EVT_TONEA_START @ 10 : 1,
        EVT_TONEA_END @ 11 : 1,
        EVT_TONEB_START @ 12 : 1,
        EVT_TONEB_END @ 13 : 1,
        EVT_SEQ_NEAR_END @ 14 : 1,
        EVT_SEQ_END @ 15 : 1,
    );
}

pub mod TONE_A {
    fields!(u16;
        DUR @ 0 : 8,
        FREQ @ 8 : 7,
        DISABLE @ 15 : 1,
    );
}

pub mod TONE_B {
    pub use super::TONE_A::*;
}
