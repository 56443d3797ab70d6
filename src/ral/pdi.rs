//! Parallel display interface registers.

use super::{RWRegister, WORegister};

#[repr(C)]
pub struct RegisterBlock {
    /// Configuration
    pub PDI_CFG: RWRegister<u32>,
    /// Interrupt enable set
    pub PDI_INT_SET: WORegister<u32>,
    /// Interrupt enable clear
    pub PDI_INT_CLR: WORegister<u32>,
    /// Status. Interrupt flags are write-one-to-clear.
    pub PDI_STAT: RWRegister<u32>,
    /// Command
    pub PDI_CMD: RWRegister<u32>,
    /// Frame data count
    pub PDI_FRDATA_N: RWRegister<u32>,
    /// Parameter FIFO
    pub PDI_FIFO: RWRegister<u32>,
    /// Interface timing
    pub PDI_IF_TIMING: RWRegister<u32>,
}

const _: () = assert!(core::mem::offset_of!(RegisterBlock, PDI_IF_TIMING) == 0x1c);

pub mod PDI_CFG {
    fields!(u32;
        PDI_EN @ 0 : 1,
        DBI_TYPE @ 1 : 3,
        DWIDTH_BPP @ 4 : 3,
        FLSH_FIFO @ 7 : 1,
        DMA_EN @ 8 : 1,
        END_XFER @ 9 : 1,
    );
}

/// Shared by `PDI_INT_SET` and `PDI_INT_CLR`.
pub mod PDI_INT_SET {
    fields!(u32;
        FIFO_UDF_IEN @ 0 : 1,
        FIFO_OVF_IEN @ 1 : 1,
        CMD_WR_ERR_IEN @ 2 : 1,
        CMD_DONE_IEN @ 3 : 1,
        DONE_IEN @ 4 : 1,
        TE_IEN @ 5 : 1,
        RX_IEN @ 6 : 1,
        TX_IEN @ 7 : 1,
    );
}

pub mod PDI_INT_CLR {
    pub use super::PDI_INT_SET::*;
}

pub mod PDI_STAT {
    fields!(u32;
        FIFO_UDF @ 0 : 1,
        FIFO_OVF @ 1 : 1,
        CMD_WR_ERR @ 2 : 1,
        CMD_DONE @ 3 : 1,
        DONE_IRQ @ 4 : 1,
        TE_IRQ @ 5 : 1,
        RX_IRQ @ 6 : 1,
        TX_IRQ @ 7 : 1,
        FIFO_FULL @ 8 : 1,
        FIFO_EMPTY @ 9 : 1,
        FIFO_STAT @ 10 : 2,
    );
}

pub mod PDI_CMD {
    fields!(u32;
        CMD @ 0 : 8,
        N_PARAM @ 8 : 4,
        FR_DATA @ 12 : 1,
        WR_RD @ 13 : 1,
    );
}

pub mod PDI_FRDATA_N {
    fields!(u32;
        FR_DATA_N @ 0 : 20,
    );
}

pub mod PDI_IF_TIMING {
    fields!(u32;
        TCSH @ 0 : 4,
        TWRL_RDL @ 4 : 8,
        TWRH_RDH @ 12 : 8,
        TCSF @ 20 : 4,
        TAS_AH @ 24 : 4,
    );
}
