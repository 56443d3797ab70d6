//! UART registers.

use super::{RORegister, RWRegister};

#[repr(C)]
pub struct RegisterBlock {
    /// Transmit holding register on write, receive buffer on read
    pub COMTX: RWRegister<u16>,
    _reserved0: u16,
    /// Interrupt enable
    pub COMIEN: RWRegister<u16>,
    _reserved1: u16,
    /// Interrupt identification
    pub COMIIR: RORegister<u16>,
    _reserved2: u16,
    /// Line control
    pub COMLCR: RWRegister<u16>,
    _reserved3: u16,
    /// Modem control
    pub COMMCR: RWRegister<u16>,
    _reserved4: u16,
    /// Line status
    pub COMLSR: RORegister<u16>,
    _reserved5: u16,
    /// Modem status
    pub COMMSR: RORegister<u16>,
    _reserved6: u16,
    pub COMSCR: RWRegister<u16>,
    _reserved7: [u16; 3],
    /// Fractional baud rate
    pub COMFBR: RWRegister<u16>,
    _reserved8: u16,
    /// Baud rate divider
    pub COMDIV: RWRegister<u16>,
    _reserved9: [u16; 3],
    /// UART control
    pub COMCON: RWRegister<u16>,
}

const _: () = assert!(core::mem::offset_of!(RegisterBlock, COMLSR) == 0x14);
const _: () = assert!(core::mem::offset_of!(RegisterBlock, COMFBR) == 0x24);
const _: () = assert!(core::mem::offset_of!(RegisterBlock, COMCON) == 0x30);

impl RegisterBlock {
    /// Read the receive buffer.
    #[inline]
    pub fn receive(&self) -> u8 {
        self.COMTX.read() as u8
    }
}

pub mod COMIEN {
    fields!(u16;
        ERBFI @ 0 : 1,
        ETBEI @ 1 : 1,
        ELSI @ 2 : 1,
        EDSSI @ 3 : 1,
        EDMAT @ 4 : 1,
        EDMAR @ 5 : 1,
    );
}

pub mod COMIIR {
    fields!(u16;
        NINT @ 0 : 1,
        STA @ 1 : 2,
    );

    /// Interrupt source codes in `STA`.
    pub mod status {
        pub const MODEM_STATUS: u16 = 0;
        pub const TX_BUFFER_EMPTY: u16 = 1;
        pub const RX_BUFFER_FULL: u16 = 2;
        pub const RX_LINE_STATUS: u16 = 3;
    }
}

pub mod COMLCR {
    fields!(u16;
        WLS @ 0 : 2,
        STOP @ 2 : 1,
        PEN @ 3 : 1,
        EPS @ 4 : 1,
        SP @ 5 : 1,
        BRK @ 6 : 1,
    );
}

pub mod COMMCR {
    fields!(u16;
        DTR @ 0 : 1,
        RTS @ 1 : 1,
        OUT1 @ 2 : 1,
        OUT2 @ 3 : 1,
        LOOPBACK @ 4 : 1,
    );
}

pub mod COMLSR {
    fields!(u16;
        DR @ 0 : 1,
        OE @ 1 : 1,
        PE @ 2 : 1,
        FE @ 3 : 1,
        BI @ 4 : 1,
        THRE @ 5 : 1,
        TEMT @ 6 : 1,
    );
}

pub mod COMFBR {
    fields!(u16;
        DIVN @ 0 : 11,
        DIVM @ 11 : 2,
        FBEN @ 15 : 1,
    );
}

pub mod COMCON {
    fields!(u16;
        DISABLE @ 0 : 1,
    );
}
