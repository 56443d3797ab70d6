//! µDMA register block and channel control descriptors.

use super::{RORegister, RWRegister, WORegister};

/// µDMA controller registers.
///
/// The `*SET` and `*CLR` registers take one bit per channel. Writing
/// zeros has no effect.
#[repr(C)]
pub struct RegisterBlock {
    /// Status
    pub DMASTA: RORegister<u32>,
    /// Configuration
    pub DMACFG: WORegister<u32>,
    /// Primary control data base pointer
    pub DMAPDBPTR: RWRegister<u32>,
    /// Alternate control data base pointer
    pub DMAADBPTR: RORegister<u32>,
    _reserved0: u32,
    /// Software request
    pub DMASWREQ: WORegister<u32>,
    _reserved1: [u32; 2],
    pub DMARMSKSET: RWRegister<u32>,
    pub DMARMSKCLR: WORegister<u32>,
    pub DMAENSET: RWRegister<u32>,
    pub DMAENCLR: WORegister<u32>,
    pub DMAALTSET: RWRegister<u32>,
    pub DMAALTCLR: WORegister<u32>,
    pub DMAPRISET: RWRegister<u32>,
    pub DMAPRICLR: WORegister<u32>,
    _reserved2: [u32; 2],
    /// Per-channel bus error status and clear
    pub DMAERRCHNLCLR: RWRegister<u32>,
    /// Bus error clear
    pub DMAERRCLR: RWRegister<u32>,
    /// Per-channel invalid descriptor status and clear
    pub DMAINVALIDDESCCLR: RWRegister<u32>,
    _reserved3: [u8; 0x800 - 0x54],
    /// Byte swap
    pub DMABSSET: RWRegister<u32>,
    pub DMABSCLR: WORegister<u32>,
    _reserved4: [u32; 2],
    /// Source address decrement
    pub DMASRCADSSET: RWRegister<u32>,
    pub DMASRCADCLR: WORegister<u32>,
    /// Destination address decrement
    pub DMADSTADSET: RWRegister<u32>,
    pub DMADSTADCLR: WORegister<u32>,
    _reserved5: [u8; 0xfe0 - 0x820],
    /// Revision
    pub DMAREVID: RORegister<u32>,
}

const _: () = assert!(core::mem::offset_of!(RegisterBlock, DMARMSKSET) == 0x20);
const _: () = assert!(core::mem::offset_of!(RegisterBlock, DMAERRCLR) == 0x4c);
const _: () = assert!(core::mem::offset_of!(RegisterBlock, DMABSSET) == 0x800);
const _: () = assert!(core::mem::offset_of!(RegisterBlock, DMASRCADSSET) == 0x810);
const _: () = assert!(core::mem::offset_of!(RegisterBlock, DMAREVID) == 0xfe0);

pub mod DMASTA {
    fields!(u32;
        ENABLE @ 0 : 1,
        STATE @ 4 : 4,
        CHANNELS @ 16 : 5,
    );
}

pub mod DMACFG {
    fields!(u32;
        ENABLE @ 0 : 1,
        PROTCTRL @ 5 : 3,
    );
}

/// The number of channels.
pub const CHANNELS: usize = 16;

/// One channel control descriptor, as the controller reads it from RAM.
#[repr(C)]
pub struct Descriptor {
    /// Source end pointer
    pub SRCEND: RWRegister<u32>,
    /// Destination end pointer
    pub DSTEND: RWRegister<u32>,
    /// Control data configuration
    pub CDC: RWRegister<u32>,
    _reserved: u32,
}

const _: () = assert!(core::mem::size_of::<Descriptor>() == 16);

/// The primary and alternate descriptors for every channel.
///
/// The controller derives the alternate base from the primary base, so
/// the table needs its natural alignment.
#[repr(C, align(512))]
pub struct DescriptorTable {
    pub primary: [Descriptor; CHANNELS],
    pub alternate: [Descriptor; CHANNELS],
}

const _: () = assert!(core::mem::offset_of!(DescriptorTable, alternate) == 0x100);
const _: () = assert!(core::mem::align_of::<DescriptorTable>() == 0x200);

impl DescriptorTable {
    /// An all-zero table.
    pub const fn new() -> Self {
        // Safety: descriptors are plain integers. All zeros is valid, and
        // every cycle control field reads "stop."
        unsafe { core::mem::zeroed() }
    }
}

pub mod CDC {
    fields!(u32;
        CYCLE_CTRL @ 0 : 3,
        NEXT_USEBURST @ 3 : 1,
        N_MINUS_1 @ 4 : 10,
        R_POWER @ 14 : 4,
        SRC_PROT_CTRL @ 18 : 3,
        DST_PROT_CTRL @ 21 : 3,
        SRC_SIZE @ 24 : 2,
        SRC_INC @ 26 : 2,
        DST_SIZE @ 28 : 2,
        DST_INC @ 30 : 2,
    );
}

/// Alternate GPF DMA channel assignment control.
#[repr(C)]
pub struct ChannelAssign {
    pub GPFDMACTL: RWRegister<u16>,
}
