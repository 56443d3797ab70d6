//! Segment LCD registers.

use super::RWRegister;

/// One segment data register.
#[repr(C)]
pub struct DataRegister {
    pub DATA: RWRegister<u16>,
    _reserved: u16,
}

/// Number of data registers per screen.
pub const DATA_REGISTERS: usize = 8;

#[repr(C)]
pub struct RegisterBlock {
    /// Control
    pub LCDCON: RWRegister<u16>,
    _reserved0: u16,
    /// Status, write one to clear the interrupt flags
    pub LCDSTAT: RWRegister<u16>,
    _reserved1: u16,
    /// Blink control
    pub LCDBLINK: RWRegister<u16>,
    _reserved2: u16,
    /// Contrast and charge pump
    pub LCDCONTRAST: RWRegister<u16>,
    _reserved3: u16,
    /// Segment data, screen 0 then screen 1
    pub LCDDATA: [[DataRegister; DATA_REGISTERS]; 2],
}

const _: () = assert!(core::mem::offset_of!(RegisterBlock, LCDCONTRAST) == 0x0c);
const _: () = assert!(core::mem::offset_of!(RegisterBlock, LCDDATA) == 0x10);
const _: () = assert!(core::mem::size_of::<RegisterBlock>() == 0x50);

pub mod LCDCON {
    fields!(u16;
        LCDEN @ 0 : 1,
        LCDMUX @ 1 : 1,
        SCREENSEL @ 2 : 1,
        FRAMEINV @ 3 : 1,
        LCDRST @ 4 : 1,
        FRAMEINT_EN @ 5 : 1,
        CPINT_EN @ 6 : 1,
        BLINKEN @ 7 : 1,
        FRAMESEL @ 8 : 4,
    );
}

pub mod LCDSTAT {
    fields!(u16;
        SAFE_TO_WR @ 0 : 1,
        CP_GD @ 1 : 1,
        VLCD_OK @ 2 : 1,
        LCD_IDLE @ 3 : 1,
        FRAMEINT @ 4 : 1,
    );
}

pub mod LCDBLINK {
    fields!(u16;
        BLKMOD @ 0 : 2,
        BLKFREQ @ 2 : 3,
        AUTOSWITCH @ 5 : 1,
    );
}

pub mod LCDCONTRAST {
    fields!(u16;
        BIASLVL @ 0 : 5,
        CP_EN @ 5 : 1,
        CP_PD @ 6 : 1,
    );
}
