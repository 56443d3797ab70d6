//! µDMA controller driver.
//!
//! The controller has sixteen channels, each with a primary and an
//! alternate channel control descriptor. The descriptor table lives inside
//! the [`Dma`] object, so a `Dma` must be placed in a `static` before you
//! open any channel.
//!
//! Drivers that use DMA (SPI today) open their channels through this
//! driver, then submit descriptors as transfers progress. The controller
//! itself is enabled when the first channel opens, and disabled when the
//! last channel closes.

use crate::interrupt::Shared;
use crate::ral::{self, dma, Static};
use crate::{Error, Result};

/// The largest number of items that one descriptor moves.
pub const MAX_TRANSFER_SIZE: usize = 1024;

/// DMA channels, named for the peripheral request they serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Channel {
    SpihTx = 0,
    SpihRx = 1,
    Spi0Tx = 2,
    Spi0Rx = 3,
    Spi1Tx = 4,
    Spi1Rx = 5,
    UartTx = 6,
    UartRx = 7,
    I2csTx = 8,
    I2csRx = 9,
    I2cm = 10,
    AfeTx = 11,
    AfeRx = 12,
    Crc = 13,
    Pdi = 14,
    I2s = 15,
}

impl Channel {
    const fn bit(self) -> u32 {
        1 << self as u32
    }
}

/// Channel priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Priority {
    /// The reset priority.
    #[default]
    Default,
    High,
}

/// Selects a channel's primary or alternate descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Slot {
    Primary,
    Alternate,
}

impl Slot {
    /// The other slot.
    pub const fn other(self) -> Self {
        match self {
            Slot::Primary => Slot::Alternate,
            Slot::Alternate => Slot::Primary,
        }
    }
}

/// The size of one transferred item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Width {
    Byte = 0,
    Halfword = 1,
    Word = 2,
}

/// How an address moves after each item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Increment {
    /// Address increases by the width.
    Up(Width),
    /// Address decreases by the width.
    Down(Width),
    /// Address stays put.
    None,
}

impl Increment {
    const fn code(self) -> u32 {
        match self {
            Increment::Up(width) | Increment::Down(width) => width as u32,
            Increment::None => 3,
        }
    }

    const fn is_decrement(self) -> bool {
        matches!(self, Increment::Down(_))
    }

    fn width(self) -> Option<Width> {
        match self {
            Increment::Up(width) | Increment::Down(width) => Some(width),
            Increment::None => None,
        }
    }

    /// Compute the end pointer for a transfer of `length` items starting
    /// at `start`.
    fn end(self, start: u32, length: usize) -> u32 {
        let span = length.saturating_sub(1) as u32;
        match self {
            Increment::Up(width) => start.wrapping_add(span << width as u32),
            Increment::Down(width) => start.wrapping_sub(span << width as u32),
            Increment::None => start,
        }
    }
}

/// Descriptor cycle control modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Mode {
    /// Stop. The controller halts when it loads this descriptor.
    Invalid = 0,
    Basic = 1,
    Auto = 2,
    PingPong = 3,
    MemoryScatterGather = 4,
    MemoryScatterGatherAlternate = 5,
    PeripheralScatterGather = 6,
    PeripheralScatterGatherAlternate = 7,
}

impl Mode {
    const fn from_bits(bits: u32) -> Self {
        match bits & 0b111 {
            0 => Mode::Invalid,
            1 => Mode::Basic,
            2 => Mode::Auto,
            3 => Mode::PingPong,
            4 => Mode::MemoryScatterGather,
            5 => Mode::MemoryScatterGatherAlternate,
            6 => Mode::PeripheralScatterGather,
            _ => Mode::PeripheralScatterGatherAlternate,
        }
    }
}

bitflags::bitflags! {
    /// AHB protection control.
    ///
    /// The controller accepts only [`Protection::empty()`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Protection: u8 {
        const PRIVILEGED = 1;
        const BUFFERABLE = 2;
        const CACHEABLE = 4;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Protection {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Protection({=u8:#x})", self.bits())
    }
}

/// Which controller drives the CRC channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Assign {
    Crc,
    Flash,
}

/// The controller state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum State {
    Idle = 0,
    ReadChannelControl = 1,
    ReadSourceEnd = 2,
    ReadDestinationEnd = 3,
    ReadSourceData = 4,
    WriteDestinationData = 5,
    WaitRequestClear = 6,
    WriteChannelControl = 7,
    Stalled = 8,
    Done = 9,
    ScatterGatherTransition = 10,
}

/// Describes one descriptor's worth of work.
#[derive(Debug, Clone, Copy)]
pub struct Transfer {
    pub channel: Channel,
    pub slot: Slot,
    pub width: Width,
    /// The number of items. Zero is only valid in [`Mode::Invalid`].
    pub length: usize,
    pub source: *const (),
    pub destination: *mut (),
    pub source_increment: Increment,
    pub destination_increment: Increment,
    pub protection: Protection,
    /// Arbitrate after 2^`arbitration` items. At most 10.
    pub arbitration: u8,
    pub mode: Mode,
}

struct Channels {
    initialized: bool,
    in_use: u32,
    byte_swap: u32,
}

/// The µDMA controller.
pub struct Dma {
    registers: Static<dma::RegisterBlock>,
    assign: Static<dma::ChannelAssign>,
    descriptors: dma::DescriptorTable,
    state: Shared<Channels>,
}

// Safety: registers and descriptors are only touched through `&self` methods
// that synchronize with critical sections. OK to place in a static.
unsafe impl Sync for Dma {}

impl Dma {
    /// Create the µDMA driver.
    ///
    /// # Safety
    ///
    /// `registers` must point to the µDMA register block, and `assign` to
    /// the GPF DMA channel assignment register. Only create one `Dma`.
    pub const unsafe fn new(registers: *const (), assign: *const ()) -> Self {
        Self {
            registers: Static(registers.cast()),
            assign: Static(assign.cast()),
            descriptors: dma::DescriptorTable::new(),
            state: Shared::new(Channels {
                initialized: false,
                in_use: 0,
                byte_swap: 0,
            }),
        }
    }

    fn descriptor(&self, channel: Channel, slot: Slot) -> &dma::Descriptor {
        match slot {
            Slot::Primary => &self.descriptors.primary[channel as usize],
            Slot::Alternate => &self.descriptors.alternate[channel as usize],
        }
    }

    /// Open `channel` with the given priority.
    ///
    /// The first channel to open resets the descriptor table and the
    /// controller's channel state.
    pub fn init(&'static self, channel: Channel, priority: Priority) -> Result<()> {
        let regs = &self.registers;
        self.state.lock(|state| {
            if state.in_use & channel.bit() != 0 {
                return Err(Error::AlreadyInitialized);
            }
            ral::write_reg!(ral::dma, regs, DMACFG, ENABLE: 1);
            if !state.initialized {
                for (primary, alternate) in self
                    .descriptors
                    .primary
                    .iter()
                    .zip(self.descriptors.alternate.iter())
                {
                    for descriptor in [primary, alternate] {
                        descriptor.SRCEND.write(0);
                        descriptor.DSTEND.write(0);
                        descriptor.CDC.write(0);
                    }
                }
                regs.DMAPDBPTR
                    .write(&self.descriptors as *const dma::DescriptorTable as usize as u32);
                regs.DMARMSKCLR.write(u32::MAX);
                regs.DMAENCLR.write(u32::MAX);
                regs.DMAALTCLR.write(u32::MAX);
                regs.DMAPRICLR.write(u32::MAX);
                regs.DMAERRCLR.write(1);
                state.initialized = true;
                debug!("DMA controller enabled");
            }
            match priority {
                Priority::Default => regs.DMAPRICLR.write(channel.bit()),
                Priority::High => regs.DMAPRISET.write(channel.bit()),
            }
            state.in_use |= channel.bit();
            Ok(())
        })?;
        debug!("DMA channel {} open", channel as u8);
        Ok(())
    }

    /// Close `channel`. Closing the last channel disables the controller.
    pub fn uninit(&self, channel: Channel) -> Result<()> {
        let regs = &self.registers;
        self.state.lock(|state| {
            if !state.initialized || state.in_use & channel.bit() == 0 {
                return Err(Error::NotInitialized);
            }
            state.in_use &= !channel.bit();
            state.byte_swap &= !channel.bit();
            regs.DMAENCLR.write(channel.bit());
            if state.in_use == 0 {
                regs.DMACFG.write(0);
                state.initialized = false;
                debug!("DMA controller disabled");
            }
            Ok(())
        })
    }

    /// Returns `true` if `channel` is open.
    pub fn is_open(&self, channel: Channel) -> bool {
        self.state.lock(|state| state.in_use & channel.bit() != 0)
    }

    /// Hand the CRC channel to the CRC engine or to the flash controller.
    pub fn set_channel_assign(&self, channel: Channel, assign: Assign) -> Result<()> {
        if !self.state.lock(|state| state.initialized) {
            return Err(Error::NotInitialized);
        }
        if channel != Channel::Crc {
            return Err(Error::InvalidChannel);
        }
        self.assign.GPFDMACTL.write(match assign {
            Assign::Crc => 0,
            Assign::Flash => 1,
        });
        Ok(())
    }

    /// Enable or disable byte swapping for transfers submitted on
    /// `channel`.
    pub fn set_byte_swap(&self, channel: Channel, enable: bool) -> Result<()> {
        self.state.lock(|state| {
            if !state.initialized {
                return Err(Error::NotInitialized);
            }
            if enable {
                state.byte_swap |= channel.bit();
            } else {
                state.byte_swap &= !channel.bit();
            }
            Ok(())
        })
    }

    /// Decode the controller state machine.
    pub fn state(&self) -> Result<State> {
        let regs = &self.registers;
        let state = match ral::read_reg!(ral::dma, regs, DMASTA, STATE) {
            0 => State::Idle,
            1 => State::ReadChannelControl,
            2 => State::ReadSourceEnd,
            3 => State::ReadDestinationEnd,
            4 => State::ReadSourceData,
            5 => State::WriteDestinationData,
            6 => State::WaitRequestClear,
            7 => State::WriteChannelControl,
            8 => State::Stalled,
            9 => State::Done,
            10 => State::ScatterGatherTransition,
            _ => return Err(Error::InvalidState),
        };
        Ok(state)
    }

    fn validate(&self, transfer: &Transfer, byte_swap: bool) -> Result<()> {
        if transfer.length > MAX_TRANSFER_SIZE
            || (transfer.length == 0 && transfer.mode != Mode::Invalid)
        {
            return Err(Error::InvalidLength);
        }
        if !transfer.protection.is_empty() {
            return Err(Error::InvalidProtection);
        }
        if transfer.arbitration > 10 {
            return Err(Error::ParamOutOfRange);
        }
        if byte_swap {
            let misaligned = (transfer.source as usize) % 4 != 0
                || (transfer.destination as usize) % 4 != 0
                || transfer.length % 4 != 0;
            if misaligned
                || transfer.source_increment != Increment::None
                || transfer.destination_increment.is_decrement()
            {
                return Err(Error::InvalidByteSwap);
            }
        }
        for increment in [transfer.source_increment, transfer.destination_increment] {
            if increment.width().is_some_and(|step| step < transfer.width) {
                return Err(Error::InvalidIncrement);
            }
        }
        Ok(())
    }

    /// Program a descriptor and enable its channel.
    ///
    /// # Safety
    ///
    /// The controller reads from `source` and writes to `destination`
    /// without any borrow tracking. Both must stay valid until the
    /// transfer finishes or the channel closes.
    pub unsafe fn submit(&self, transfer: &Transfer) -> Result<()> {
        let regs = &self.registers;
        let byte_swap = self.check_open(transfer.channel)?;
        self.validate(transfer, byte_swap)?;
        if !ral::read_reg!(ral::dma, regs, DMASTA, ENABLE == 1) {
            return Err(Error::NotInitialized);
        }

        let descriptor = self.descriptor(transfer.channel, transfer.slot);
        let length = transfer.length;
        let source = transfer.source as usize as u32;
        let destination = transfer.destination as usize as u32;
        critical_section::with(|_| {
            descriptor
                .SRCEND
                .write(transfer.source_increment.end(source, length));
            descriptor
                .DSTEND
                .write(transfer.destination_increment.end(destination, length));
        });
        ral::write_reg!(ral::dma, descriptor, CDC,
            DST_INC: transfer.destination_increment.code(),
            DST_SIZE: transfer.width as u32,
            SRC_INC: transfer.source_increment.code(),
            SRC_SIZE: transfer.width as u32,
            R_POWER: transfer.arbitration as u32,
            N_MINUS_1: length.saturating_sub(1) as u32,
            CYCLE_CTRL: transfer.mode as u32
        );

        let bit = transfer.channel.bit();
        if transfer.source_increment.is_decrement() {
            regs.DMASRCADSSET.write(bit);
        } else {
            regs.DMASRCADCLR.write(bit);
        }
        if transfer.destination_increment.is_decrement() {
            regs.DMADSTADSET.write(bit);
        } else {
            regs.DMADSTADCLR.write(bit);
        }
        if byte_swap {
            regs.DMABSSET.write(bit);
        } else {
            regs.DMABSCLR.write(bit);
        }
        regs.DMAENSET.write(bit);
        trace!(
            "DMA channel {} submit {} items",
            transfer.channel as u8,
            length
        );
        Ok(())
    }

    /// Rearm the primary descriptor with a new length and mode, keeping its
    /// pointers and the rest of its configuration.
    ///
    /// # Safety
    ///
    /// See [`submit`](Self::submit).
    pub unsafe fn resubmit(&self, transfer: &Transfer) -> Result<()> {
        let regs = &self.registers;
        let byte_swap = self.check_open(transfer.channel)?;
        self.validate(transfer, byte_swap)?;
        if !ral::read_reg!(ral::dma, regs, DMASTA, ENABLE == 1) {
            return Err(Error::NotInitialized);
        }
        let descriptor = self.descriptor(transfer.channel, Slot::Primary);
        critical_section::with(|_| {
            ral::modify_reg!(ral::dma, descriptor, CDC,
                NEXT_USEBURST: 0,
                N_MINUS_1: transfer.length.saturating_sub(1) as u32,
                CYCLE_CTRL: transfer.mode as u32
            );
        });
        regs.DMAENSET.write(transfer.channel.bit());
        Ok(())
    }

    /// The number of items left in a descriptor.
    ///
    /// The hardware can't express a full 1024-item descriptor in its
    /// remaining count, so a fresh maximum-length descriptor reads as zero.
    pub fn remaining(&self, channel: Channel, slot: Slot) -> Result<usize> {
        if !self.state.lock(|state| state.initialized) {
            return Err(Error::NotInitialized);
        }
        let descriptor = self.descriptor(channel, slot);
        let n_minus_1 = ral::read_reg!(ral::dma, descriptor, CDC, N_MINUS_1);
        Ok(((n_minus_1 + 1) & 0x3ff) as usize)
    }

    /// The cycle control mode currently in a descriptor.
    ///
    /// The controller writes [`Mode::Invalid`] back into a descriptor once
    /// it's done with it.
    pub fn cycle_mode(&self, channel: Channel, slot: Slot) -> Mode {
        let descriptor = self.descriptor(channel, slot);
        Mode::from_bits(ral::read_reg!(ral::dma, descriptor, CDC, CYCLE_CTRL))
    }

    /// Stop `channel` without closing it.
    pub fn disable(&self, channel: Channel) {
        self.registers.DMAENCLR.write(channel.bit());
    }

    /// Returns the channel's byte swap setting, or an error if it's closed.
    fn check_open(&self, channel: Channel) -> Result<bool> {
        self.state.lock(|state| {
            if !state.initialized {
                Err(Error::NotInitialized)
            } else if state.in_use & channel.bit() == 0 {
                Err(Error::InvalidChannel)
            } else {
                Ok(state.byte_swap & channel.bit() != 0)
            }
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ral::testing;

    pub(crate) fn dma() -> (&'static Dma, &'static dma::RegisterBlock) {
        let regs = testing::block::<dma::RegisterBlock>();
        let assign = testing::block::<dma::ChannelAssign>();
        // Safety: test-owned memory.
        let dma = unsafe {
            Dma::new(
                regs as *const _ as *const (),
                assign as *const _ as *const (),
            )
        };
        (Box::leak(Box::new(dma)), regs)
    }

    /// Stand in for the controller reporting that it's enabled.
    pub(crate) fn hardware_enable(regs: &dma::RegisterBlock) {
        testing::poke(&regs.DMASTA, dma::DMASTA::ENABLE::mask);
    }

    /// Stand in for the controller finishing a descriptor.
    pub(crate) fn retire(dma: &Dma, channel: Channel, slot: Slot) {
        let descriptor = dma.descriptor(channel, slot);
        ral::modify_reg!(ral::dma, descriptor, CDC, CYCLE_CTRL: Mode::Invalid as u32);
    }

    fn transfer(channel: Channel, source: &[u16], destination: *mut u16) -> Transfer {
        Transfer {
            channel,
            slot: Slot::Primary,
            width: Width::Halfword,
            length: source.len(),
            source: source.as_ptr().cast(),
            destination: destination.cast(),
            source_increment: Increment::Up(Width::Halfword),
            destination_increment: Increment::None,
            protection: Protection::empty(),
            arbitration: 0,
            mode: Mode::Basic,
        }
    }

    #[test]
    fn descriptor_table_alignment() {
        let (dma, _) = dma();
        let address = &dma.descriptors as *const _ as usize;
        assert_eq!(address % 512, 0);
    }

    #[test]
    fn open_and_close() {
        let (dma, regs) = dma();
        dma.init(Channel::Spi0Tx, Priority::Default).unwrap();
        assert_eq!(
            dma.init(Channel::Spi0Tx, Priority::Default),
            Err(Error::AlreadyInitialized)
        );
        assert_eq!(testing::peek::<_, u32>(&regs.DMACFG), 1);
        assert_eq!(
            regs.DMAPDBPTR.read(),
            &dma.descriptors as *const _ as usize as u32
        );

        dma.init(Channel::Spi0Rx, Priority::High).unwrap();
        assert_eq!(regs.DMAPRISET.read(), Channel::Spi0Rx.bit());
        assert!(dma.is_open(Channel::Spi0Rx));

        dma.uninit(Channel::Spi0Tx).unwrap();
        assert_eq!(testing::peek::<_, u32>(&regs.DMACFG), 1);
        assert_eq!(dma.uninit(Channel::Spi0Tx), Err(Error::NotInitialized));

        dma.uninit(Channel::Spi0Rx).unwrap();
        assert_eq!(testing::peek::<_, u32>(&regs.DMACFG), 0);
        assert_eq!(
            dma.set_byte_swap(Channel::Spi0Rx, true),
            Err(Error::NotInitialized)
        );
    }

    #[test]
    fn submit_computes_end_pointers_and_control() {
        let (dma, regs) = dma();
        dma.init(Channel::Spi1Tx, Priority::Default).unwrap();
        hardware_enable(regs);

        let source = [0u16; 8];
        let mut destination = 0u16;
        let xfer = transfer(Channel::Spi1Tx, &source, &mut destination);
        unsafe { dma.submit(&xfer) }.unwrap();

        let descriptor = &dma.descriptors.primary[Channel::Spi1Tx as usize];
        let start = source.as_ptr() as usize as u32;
        assert_eq!(descriptor.SRCEND.read(), start + 7 * 2);
        assert_eq!(
            descriptor.DSTEND.read(),
            &destination as *const u16 as usize as u32
        );
        let cdc = descriptor.CDC.read();
        assert_eq!(cdc >> 30, 3, "destination fixed");
        assert_eq!((cdc >> 26) & 3, 1, "source halfword increment");
        assert_eq!((cdc >> 24) & 3, 1, "halfword width");
        assert_eq!((cdc >> 4) & 0x3ff, 7);
        assert_eq!(cdc & 7, Mode::Basic as u32);
        assert_eq!(regs.DMAENSET.read(), Channel::Spi1Tx.bit());
        assert_eq!(
            testing::peek::<_, u32>(&regs.DMASRCADCLR),
            Channel::Spi1Tx.bit()
        );

        assert_eq!(dma.remaining(Channel::Spi1Tx, Slot::Primary), Ok(8));
        assert_eq!(
            dma.cycle_mode(Channel::Spi1Tx, Slot::Primary),
            Mode::Basic
        );
        assert_eq!(
            dma.cycle_mode(Channel::Spi1Tx, Slot::Alternate),
            Mode::Invalid
        );
    }

    #[test]
    fn decrement_uses_address_decrement_registers() {
        let (dma, regs) = dma();
        dma.init(Channel::UartTx, Priority::Default).unwrap();
        hardware_enable(regs);

        let source = [0u16; 4];
        let mut destination = 0u16;
        let mut xfer = transfer(Channel::UartTx, &source, &mut destination);
        let end = unsafe { source.as_ptr().add(3) };
        xfer.source = end.cast();
        xfer.source_increment = Increment::Down(Width::Halfword);
        unsafe { dma.submit(&xfer) }.unwrap();

        let descriptor = &dma.descriptors.primary[Channel::UartTx as usize];
        assert_eq!(descriptor.SRCEND.read(), source.as_ptr() as usize as u32);
        assert_eq!((descriptor.CDC.read() >> 26) & 3, 1);
        assert_eq!(regs.DMASRCADSSET.read(), Channel::UartTx.bit());
    }

    #[test]
    fn submit_validation() {
        let (dma, regs) = dma();
        let source = [0u16; 4];
        let mut destination = 0u16;
        let xfer = transfer(Channel::Pdi, &source, &mut destination);
        assert_eq!(unsafe { dma.submit(&xfer) }, Err(Error::NotInitialized));

        dma.init(Channel::Crc, Priority::Default).unwrap();
        assert_eq!(unsafe { dma.submit(&xfer) }, Err(Error::InvalidChannel));

        dma.init(Channel::Pdi, Priority::Default).unwrap();
        // Controller hasn't reported enabled yet.
        assert_eq!(unsafe { dma.submit(&xfer) }, Err(Error::NotInitialized));
        hardware_enable(regs);

        let mut bad = xfer;
        bad.length = MAX_TRANSFER_SIZE + 1;
        assert_eq!(unsafe { dma.submit(&bad) }, Err(Error::InvalidLength));

        let mut bad = xfer;
        bad.length = 0;
        assert_eq!(unsafe { dma.submit(&bad) }, Err(Error::InvalidLength));
        bad.mode = Mode::Invalid;
        assert_eq!(unsafe { dma.submit(&bad) }, Ok(()));

        let mut bad = xfer;
        bad.protection = Protection::PRIVILEGED;
        assert_eq!(unsafe { dma.submit(&bad) }, Err(Error::InvalidProtection));
        assert_eq!(Protection::from_bits(0x08), None);
        assert!(Protection::from_bits_truncate(0x08).is_empty());

        let mut bad = xfer;
        bad.source_increment = Increment::Up(Width::Byte);
        assert_eq!(unsafe { dma.submit(&bad) }, Err(Error::InvalidIncrement));

        let mut bad = xfer;
        bad.width = Width::Word;
        assert_eq!(unsafe { dma.submit(&bad) }, Err(Error::InvalidIncrement));

        dma.set_byte_swap(Channel::Pdi, true).unwrap();
        assert_eq!(unsafe { dma.submit(&xfer) }, Err(Error::InvalidByteSwap));
    }

    #[test]
    fn resubmit_keeps_pointers() {
        let (dma, regs) = dma();
        dma.init(Channel::AfeRx, Priority::Default).unwrap();
        hardware_enable(regs);

        let source = [0u16; 16];
        let mut destination = 0u16;
        let mut xfer = transfer(Channel::AfeRx, &source, &mut destination);
        unsafe { dma.submit(&xfer) }.unwrap();
        let descriptor = &dma.descriptors.primary[Channel::AfeRx as usize];
        let srcend = descriptor.SRCEND.read();

        xfer.length = 4;
        xfer.mode = Mode::Auto;
        unsafe { dma.resubmit(&xfer) }.unwrap();
        assert_eq!(descriptor.SRCEND.read(), srcend);
        assert_eq!(dma.remaining(Channel::AfeRx, Slot::Primary), Ok(4));
        assert_eq!(dma.cycle_mode(Channel::AfeRx, Slot::Primary), Mode::Auto);
        assert_eq!((descriptor.CDC.read() >> 26) & 3, 1);
    }

    #[test]
    fn channel_assign_only_for_crc() {
        let (dma, _) = dma();
        assert_eq!(
            dma.set_channel_assign(Channel::Crc, Assign::Flash),
            Err(Error::NotInitialized)
        );
        dma.init(Channel::Crc, Priority::Default).unwrap();
        assert_eq!(
            dma.set_channel_assign(Channel::Spi0Tx, Assign::Flash),
            Err(Error::InvalidChannel)
        );
        dma.set_channel_assign(Channel::Crc, Assign::Flash).unwrap();
        assert_eq!(dma.assign.GPFDMACTL.read(), 1);
        dma.set_channel_assign(Channel::Crc, Assign::Crc).unwrap();
        assert_eq!(dma.assign.GPFDMACTL.read(), 0);
    }

    #[test]
    fn controller_state() {
        let (dma, regs) = dma();
        assert_eq!(dma.state(), Ok(State::Idle));
        testing::poke(&regs.DMASTA, 9u32 << 4);
        assert_eq!(dma.state(), Ok(State::Done));
        testing::poke(&regs.DMASTA, 11u32 << 4);
        assert_eq!(dma.state(), Err(Error::InvalidState));
    }
}
