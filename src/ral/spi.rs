//! SPI registers. Shared by SPI0, SPI1 and SPIH.

use super::{RORegister, RWRegister, WORegister};

#[repr(C)]
pub struct RegisterBlock {
    pub SPISTA: RORegister<u16>,
    _reserved0: u16,
    /// Receive FIFO
    pub SPIRX: RORegister<u16>,
    _reserved1: u16,
    /// Transmit FIFO
    pub SPITX: WORegister<u16>,
    _reserved2: u16,
    /// Baud rate divider
    pub SPIDIV: RWRegister<u16>,
    _reserved3: u16,
    pub SPICON: RWRegister<u16>,
    _reserved4: u16,
    pub SPIDMA: RWRegister<u16>,
    _reserved5: u16,
    /// Transfer byte count limit
    pub SPICNT: RWRegister<u16>,
}

const _: () = assert!(core::mem::offset_of!(RegisterBlock, SPITX) == 0x08);
const _: () = assert!(core::mem::offset_of!(RegisterBlock, SPICON) == 0x10);
const _: () = assert!(core::mem::offset_of!(RegisterBlock, SPICNT) == 0x18);

pub mod SPISTA {
    fields!(u16;
        IRQ @ 0 : 1,
        TXFSTA @ 1 : 3,
        TXUR @ 4 : 1,
        TX @ 5 : 1,
        RX @ 6 : 1,
        RXOF @ 7 : 1,
        RXFSTA @ 8 : 3,
        RXS @ 11 : 1,
        CSERR @ 12 : 1,
    );

    /// FIFO depth, in bytes.
    pub const FIFO_DEPTH: u16 = 4;
}

pub mod SPIDIV {
    fields!(u16;
        DIV @ 0 : 6,
        HFM @ 6 : 1,
        CS_RST @ 7 : 1,
        CSIRQ_EN @ 8 : 1,
    );
}

pub mod SPICON {
    fields!(u16;
        ENABLE @ 0 : 1,
        MASEN @ 1 : 1,
        CPHA @ 2 : 1,
        CPOL @ 3 : 1,
        WOM @ 4 : 1,
        LSB @ 5 : 1,
        TIM @ 6 : 1,
        ZEN @ 7 : 1,
        RXOF @ 8 : 1,
        OEN @ 9 : 1,
        LOOPBACK @ 10 : 1,
        CON @ 11 : 1,
        RFLUSH @ 12 : 1,
        TFLUSH @ 13 : 1,
        MOD @ 14 : 2,
    );
}

pub mod SPIDMA {
    fields!(u16;
        ENABLE @ 0 : 1,
        IENTXDMA @ 1 : 1,
        IENRXDMA @ 2 : 1,
    );
}

pub mod SPICNT {
    fields!(u16;
        COUNT @ 0 : 8,
    );
}
