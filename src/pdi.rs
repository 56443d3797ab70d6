//! Parallel display interface (PDI) driver.
//!
//! The PDI talks to display controllers over a MIPI DBI bus. Commands go
//! out through [`Handle::set_command`], and their parameters move through
//! a four-byte-wide FIFO. [`Handle::dispatch_mipi_command`] sequences both
//! for the MIPI display command set (DCS).
//!
//! Parameter bytes pack into FIFO words most significant byte first. A
//! final word with fewer than four bytes is right aligned.

use crate::interrupt::{self, Interrupt, Shared};
use crate::ral::{self, pdi, Static};
use crate::{Callback, Error, Result};

bitflags::bitflags! {
    /// PDI interrupt sources.
    ///
    /// Bits line up with the interrupt enable and status registers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Interrupts: u32 {
        const FIFO_UNDERFLOW = pdi::PDI_STAT::FIFO_UDF::mask;
        const FIFO_OVERFLOW = pdi::PDI_STAT::FIFO_OVF::mask;
        const CMD_WRITE_ERROR = pdi::PDI_STAT::CMD_WR_ERR::mask;
        const CMD_DONE = pdi::PDI_STAT::CMD_DONE::mask;
        const FIFO_DONE = pdi::PDI_STAT::DONE_IRQ::mask;
        const TEAR = pdi::PDI_STAT::TE_IRQ::mask;
        const RX = pdi::PDI_STAT::RX_IRQ::mask;
        const TX = pdi::PDI_STAT::TX_IRQ::mask;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Interrupts {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Interrupts({=u32:#x})", self.bits())
    }
}

/// DBI bus type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum DbiType {
    TypeAFixedE = 0,
    TypeAClockedE = 1,
    TypeB = 2,
    TypeC1 = 3,
    TypeC3 = 4,
}

/// Bus width and bits per pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum DataFormat {
    Bus8Bpp8 = 0,
    Bus8Bpp12 = 1,
    Bus8Bpp16 = 2,
    Bus16Bpp8 = 3,
    Bus16Bpp12 = 4,
    Bus16Bpp16 = 5,
    Bus9Bpp18 = 6,
}

/// The PDI configuration register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Configuration {
    pub enable: bool,
    pub dbi_type: DbiType,
    pub data_format: DataFormat,
    pub flush_fifo: bool,
    pub dma: bool,
    pub end_transfer: bool,
}

impl Configuration {
    const fn bits(&self) -> u32 {
        use pdi::PDI_CFG::*;
        ((self.enable as u32) << PDI_EN::offset)
            | ((self.dbi_type as u32) << DBI_TYPE::offset)
            | ((self.data_format as u32) << DWIDTH_BPP::offset)
            | ((self.flush_fifo as u32) << FLSH_FIFO::offset)
            | ((self.dma as u32) << DMA_EN::offset)
            | ((self.end_transfer as u32) << END_XFER::offset)
    }

    fn from_bits(bits: u32) -> Option<Self> {
        use pdi::PDI_CFG::*;
        let dbi_type = match (bits & DBI_TYPE::mask) >> DBI_TYPE::offset {
            0 => DbiType::TypeAFixedE,
            1 => DbiType::TypeAClockedE,
            2 => DbiType::TypeB,
            3 => DbiType::TypeC1,
            4 => DbiType::TypeC3,
            _ => return None,
        };
        let data_format = match (bits & DWIDTH_BPP::mask) >> DWIDTH_BPP::offset {
            0 => DataFormat::Bus8Bpp8,
            1 => DataFormat::Bus8Bpp12,
            2 => DataFormat::Bus8Bpp16,
            3 => DataFormat::Bus16Bpp8,
            4 => DataFormat::Bus16Bpp12,
            5 => DataFormat::Bus16Bpp16,
            6 => DataFormat::Bus9Bpp18,
            _ => return None,
        };
        Some(Self {
            enable: bits & PDI_EN::mask != 0,
            dbi_type,
            data_format,
            flush_fifo: bits & FLSH_FIFO::mask != 0,
            dma: bits & DMA_EN::mask != 0,
            end_transfer: bits & END_XFER::mask != 0,
        })
    }
}

/// Bus timing, in PDI clock cycles.
///
/// Every field must be nonzero. The chip select and address timings fit
/// four bits, and the strobe timings fit eight bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InterfaceTiming {
    pub cs_setup: u8,
    pub strobe_low: u8,
    pub strobe_high: u8,
    pub cs_hold: u8,
    pub address_setup_hold: u8,
}

impl InterfaceTiming {
    pub const DEFAULT: Self = Self {
        cs_setup: 1,
        strobe_low: 1,
        strobe_high: 1,
        cs_hold: 1,
        address_setup_hold: 1,
    };

    fn bits(&self) -> Result<u32> {
        use pdi::PDI_IF_TIMING::*;
        let fields = [
            (self.cs_setup, TCSH::offset, TCSH::mask),
            (self.strobe_low, TWRL_RDL::offset, TWRL_RDL::mask),
            (self.strobe_high, TWRH_RDH::offset, TWRH_RDH::mask),
            (self.cs_hold, TCSF::offset, TCSF::mask),
            (self.address_setup_hold, TAS_AH::offset, TAS_AH::mask),
        ];
        fields.iter().try_fold(0u32, |bits, &(value, shift, field)| {
            let value = (value as u32) << shift;
            if value == 0 || value & !field != 0 {
                Err(Error::ParamOutOfRange)
            } else {
                Ok(bits | value)
            }
        })
    }

    fn from_bits(bits: u32) -> Self {
        use pdi::PDI_IF_TIMING::*;
        let field = |shift: u32, field: u32| ((bits & field) >> shift) as u8;
        Self {
            cs_setup: field(TCSH::offset, TCSH::mask),
            strobe_low: field(TWRL_RDL::offset, TWRL_RDL::mask),
            strobe_high: field(TWRH_RDH::offset, TWRH_RDH::mask),
            cs_hold: field(TCSF::offset, TCSF::mask),
            address_setup_hold: field(TAS_AH::offset, TAS_AH::mask),
        }
    }
}

impl Default for InterfaceTiming {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A snapshot of the status register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status {
    pub flags: Interrupts,
    pub fifo_full: bool,
    pub fifo_empty: bool,
    /// 0 for one or no entries, through 3 for four entries.
    pub fifo_level: u8,
}

/// What a command's parameters carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParameterKind {
    Control,
    FrameData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Read,
    Write,
}

/// A raw PDI command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Command {
    pub code: u8,
    /// Number of control parameters, at most [`MAX_PARAMETERS`].
    pub parameters: u8,
    pub kind: ParameterKind,
    pub direction: Direction,
}

/// The most control parameters in one command.
pub const MAX_PARAMETERS: u8 = 15;

/// The largest frame data count.
pub const MAX_FRAME_DATA_COUNT: u32 = pdi::PDI_FRDATA_N::FR_DATA_N::mask;

/// MIPI DCS pixel format codes, for [`DcsCommand::SetPixelFormat`].
pub mod pixel_format {
    pub const BITS_3: u8 = 0x01;
    pub const BITS_8: u8 = 0x02;
    pub const BITS_12: u8 = 0x03;
    pub const BITS_16: u8 = 0x05;
    pub const BITS_18: u8 = 0x06;
    pub const BITS_24: u8 = 0x07;
}

/// MIPI display command set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DcsCommand {
    Nop = 0x00,
    SoftReset = 0x01,
    GetRedChannel = 0x06,
    GetGreenChannel = 0x07,
    GetBlueChannel = 0x08,
    GetPowerMode = 0x0a,
    GetAddressMode = 0x0b,
    GetPixelFormat = 0x0c,
    GetDisplayMode = 0x0d,
    GetSignalMode = 0x0e,
    GetDiagnosticMode = 0x0f,
    EnterSleepMode = 0x10,
    ExitSleepMode = 0x11,
    EnterPartialMode = 0x12,
    EnterNormalMode = 0x13,
    ReadDdbStart = 0x1a,
    ExitInvertMode = 0x20,
    EnterInvertMode = 0x21,
    SetGammaCurve = 0x26,
    SetDisplayOff = 0x28,
    SetDisplayOn = 0x29,
    SetColumnAddress = 0x2a,
    SetPageAddress = 0x2b,
    WriteMemoryStart = 0x2c,
    WriteLut = 0x2d,
    ReadMemoryStart = 0x2e,
    SetPartialRows = 0x30,
    SetPartialColumns = 0x31,
    SetScrollArea = 0x33,
    SetTearOff = 0x34,
    SetTearOn = 0x35,
    SetAddressMode = 0x36,
    SetScrollStart = 0x37,
    ExitIdleMode = 0x38,
    EnterIdleMode = 0x39,
    SetPixelFormat = 0x3a,
    WriteMemoryContinue = 0x3c,
    ReadMemoryContinue = 0x3e,
    SetTearScanline = 0x44,
    GetScanline = 0x45,
    ReadDdbContinue = 0xa8,
}

impl DcsCommand {
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// The number of parameter bytes, or `None` for commands that move a
    /// variable amount of frame data.
    pub const fn parameter_count(self) -> Option<u8> {
        use DcsCommand::*;
        match self {
            ReadDdbStart | ReadDdbContinue | ReadMemoryStart | ReadMemoryContinue | WriteLut
            | WriteMemoryStart | WriteMemoryContinue => None,
            GetRedChannel | GetGreenChannel | GetBlueChannel | GetPowerMode | GetAddressMode
            | GetPixelFormat | GetDisplayMode | GetSignalMode | GetDiagnosticMode
            | SetGammaCurve | SetTearOn | SetAddressMode | SetPixelFormat => Some(1),
            GetScanline | SetScrollStart | SetTearScanline => Some(2),
            SetColumnAddress | SetPageAddress | SetPartialRows | SetPartialColumns => Some(4),
            SetScrollArea => Some(6),
            _ => Some(0),
        }
    }

    pub const fn direction(self) -> Direction {
        use DcsCommand::*;
        match self {
            GetRedChannel | GetGreenChannel | GetBlueChannel | GetPowerMode | GetAddressMode
            | GetPixelFormat | GetDisplayMode | GetSignalMode | GetDiagnosticMode
            | GetScanline | ReadDdbStart | ReadDdbContinue | ReadMemoryStart
            | ReadMemoryContinue => Direction::Read,
            _ => Direction::Write,
        }
    }
}

/// Register values applied by `init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Interrupt sources to enable. All others are disabled.
    pub interrupts: Interrupts,
    pub timing: InterfaceTiming,
}

impl Config {
    /// Command done interrupt, shortest timing.
    pub const DEFAULT: Self = Self {
        interrupts: Interrupts::CMD_DONE,
        timing: InterfaceTiming::DEFAULT,
    };
}

impl Default for Config {
    fn default() -> Self {
        Self::DEFAULT
    }
}

struct State {
    initialized: bool,
    /// The enable register is write-only.
    enabled: Interrupts,
    callback: Option<Callback<Interrupts>>,
}

/// The PDI driver.
pub struct Pdi {
    registers: Static<pdi::RegisterBlock>,
    config: Config,
    state: Shared<State>,
}

// Safety: registers are only touched through `&self` methods that
// synchronize with critical sections. OK to place in a static.
unsafe impl Sync for Pdi {}

impl Pdi {
    /// # Safety
    ///
    /// `registers` must point to the PDI register block. Only create one
    /// driver for that block.
    pub const unsafe fn new(registers: *const ()) -> Self {
        Self::with_config(registers, Config::DEFAULT)
    }

    /// # Safety
    ///
    /// See [`new`](Self::new).
    pub const unsafe fn with_config(registers: *const (), config: Config) -> Self {
        Self {
            registers: Static(registers.cast()),
            config,
            state: Shared::new(State {
                initialized: false,
                enabled: Interrupts::empty(),
                callback: None,
            }),
        }
    }

    /// Program interrupt enables and timing, clear stale status, and
    /// unmask the PDI interrupt.
    ///
    /// Returns [`Error::ParamOutOfRange`] if the configured timing is
    /// invalid.
    pub fn init(&self) -> Result<Handle<'_>> {
        let timing = self.config.timing.bits()?;
        self.state.lock(|state| {
            if state.initialized {
                return Err(Error::AlreadyInitialized);
            }
            let pdi = &self.registers;
            let enabled = self.config.interrupts;
            pdi.PDI_INT_SET.write(enabled.bits());
            pdi.PDI_INT_CLR.write((!enabled).bits());
            pdi.PDI_STAT.write(Interrupts::all().bits());
            pdi.PDI_IF_TIMING.write(timing);
            state.enabled = enabled;
            state.callback = None;
            state.initialized = true;
            Ok(())
        })?;
        interrupt::enable(Interrupt::Pdi);
        debug!("PDI initialized");
        Ok(Handle { pdi: self })
    }

    /// Service the PDI interrupt.
    ///
    /// Reports the flagged sources that are enabled, then clears them.
    pub fn on_interrupt(&self) {
        let pdi = &self.registers;
        let (fired, callback) = self.state.lock(|state| {
            let fired = Interrupts::from_bits_truncate(pdi.PDI_STAT.read()) & state.enabled;
            pdi.PDI_STAT.write(fired.bits());
            (fired, state.callback.filter(|_| state.initialized))
        });
        if fired.is_empty() {
            return;
        }
        if let Some(callback) = callback {
            callback(fired);
        }
    }
}

/// A handle to an initialized PDI.
#[derive(Clone, Copy)]
pub struct Handle<'a> {
    pdi: &'a Pdi,
}

impl<'a> Handle<'a> {
    fn registers(&self) -> Result<&'a pdi::RegisterBlock> {
        let pdi = self.pdi;
        if pdi.state.lock(|state| state.initialized) {
            Ok(&*pdi.registers)
        } else {
            Err(Error::NotInitialized)
        }
    }

    /// Disable all PDI interrupts, mask the vector, and drop the callback.
    pub fn uninit(self) -> Result<()> {
        let pdi = self.registers()?;
        interrupt::disable(Interrupt::Pdi);
        self.pdi.state.lock(|state| {
            pdi.PDI_INT_CLR.write(Interrupts::all().bits());
            state.enabled = Interrupts::empty();
            state.initialized = false;
            state.callback = None;
        });
        debug!("PDI uninitialized");
        Ok(())
    }

    pub fn register_callback(&self, callback: Option<Callback<Interrupts>>) -> Result<()> {
        self.registers()?;
        self.pdi.state.lock(|state| state.callback = callback);
        Ok(())
    }

    pub fn set_configuration(&self, configuration: &Configuration) -> Result<()> {
        let pdi = self.registers()?;
        pdi.PDI_CFG.write(configuration.bits());
        Ok(())
    }

    /// The current configuration.
    ///
    /// Returns [`Error::InvalidState`] if the register holds a reserved
    /// bus type or data format.
    pub fn configuration(&self) -> Result<Configuration> {
        let pdi = self.registers()?;
        Configuration::from_bits(pdi.PDI_CFG.read()).ok_or(Error::InvalidState)
    }

    pub fn enable_interrupts(&self, interrupts: Interrupts) -> Result<()> {
        let pdi = self.registers()?;
        self.pdi.state.lock(|state| {
            pdi.PDI_INT_SET.write(interrupts.bits());
            state.enabled |= interrupts;
        });
        Ok(())
    }

    pub fn disable_interrupts(&self, interrupts: Interrupts) -> Result<()> {
        let pdi = self.registers()?;
        self.pdi.state.lock(|state| {
            pdi.PDI_INT_CLR.write(interrupts.bits());
            state.enabled = state.enabled & !interrupts;
        });
        Ok(())
    }

    pub fn enabled_interrupts(&self) -> Result<Interrupts> {
        self.registers()?;
        Ok(self.pdi.state.lock(|state| state.enabled))
    }

    /// Clear status flags.
    pub fn set_status(&self, flags: Interrupts) -> Result<()> {
        let pdi = self.registers()?;
        pdi.PDI_STAT.write(flags.bits());
        Ok(())
    }

    pub fn status(&self) -> Result<Status> {
        use pdi::PDI_STAT::*;
        let bits = self.registers()?.PDI_STAT.read();
        Ok(Status {
            flags: Interrupts::from_bits_truncate(bits),
            fifo_full: bits & FIFO_FULL::mask != 0,
            fifo_empty: bits & FIFO_EMPTY::mask != 0,
            fifo_level: ((bits & FIFO_STAT::mask) >> FIFO_STAT::offset) as u8,
        })
    }

    /// Issue a command.
    ///
    /// This clears the command done flag first. Returns
    /// [`Error::ParamOutOfRange`] if there are more than
    /// [`MAX_PARAMETERS`] parameters.
    pub fn set_command(&self, command: &Command) -> Result<()> {
        let pdi = self.registers()?;
        if command.parameters > MAX_PARAMETERS {
            return Err(Error::ParamOutOfRange);
        }
        pdi.PDI_STAT.write(Interrupts::CMD_DONE.bits());
        ral::write_reg!(ral::pdi, pdi, PDI_CMD,
            CMD: command.code as u32,
            N_PARAM: command.parameters as u32,
            FR_DATA: (command.kind == ParameterKind::FrameData) as u32,
            WR_RD: (command.direction == Direction::Write) as u32
        );
        trace!("PDI command {}", command.code);
        Ok(())
    }

    /// The last command code.
    pub fn command(&self) -> Result<u8> {
        let pdi = self.registers()?;
        Ok(ral::read_reg!(ral::pdi, pdi, PDI_CMD, CMD) as u8)
    }

    /// Set the number of frame data bytes for the next frame data command.
    pub fn set_frame_data_count(&self, count: u32) -> Result<()> {
        let pdi = self.registers()?;
        if count > MAX_FRAME_DATA_COUNT {
            return Err(Error::ParamOutOfRange);
        }
        pdi.PDI_FRDATA_N.write(count);
        Ok(())
    }

    pub fn frame_data_count(&self) -> Result<u32> {
        let pdi = self.registers()?;
        Ok(ral::read_reg!(ral::pdi, pdi, PDI_FRDATA_N, FR_DATA_N))
    }

    pub fn push_parameter_fifo(&self, word: u32) -> Result<()> {
        self.registers()?.PDI_FIFO.write(word);
        Ok(())
    }

    pub fn pull_parameter_fifo(&self) -> Result<u32> {
        Ok(self.registers()?.PDI_FIFO.read())
    }

    /// Returns [`Error::ParamOutOfRange`] if a timing is zero or too
    /// large for its field.
    pub fn set_interface_timing(&self, timing: &InterfaceTiming) -> Result<()> {
        let pdi = self.registers()?;
        pdi.PDI_IF_TIMING.write(timing.bits()?);
        Ok(())
    }

    pub fn interface_timing(&self) -> Result<InterfaceTiming> {
        let pdi = self.registers()?;
        Ok(InterfaceTiming::from_bits(pdi.PDI_IF_TIMING.read()))
    }

    /// Send a DCS command and move its parameters, returning the number
    /// of parameter bytes moved.
    ///
    /// Write commands send bytes from `parameters`. Read commands fill
    /// `parameters`. Fixed-size commands use the first bytes of
    /// `parameters`, and return [`Error::ParamOutOfRange`] if it's too
    /// short. Memory commands move all of `parameters` as frame data.
    ///
    /// Blocks until the PDI signals that the command is done.
    pub fn dispatch_mipi_command(&self, command: DcsCommand, parameters: &mut [u8]) -> Result<usize> {
        let pdi = self.registers()?;
        let (count, kind) = match command.parameter_count() {
            Some(count) if parameters.len() < count as usize => {
                return Err(Error::ParamOutOfRange)
            }
            Some(count) => (count as usize, ParameterKind::Control),
            None if parameters.is_empty() => return Err(Error::ParamOutOfRange),
            None => (parameters.len(), ParameterKind::FrameData),
        };
        let direction = command.direction();
        if kind == ParameterKind::FrameData {
            self.set_frame_data_count(count as u32)?;
        }
        self.set_command(&Command {
            code: command.code(),
            parameters: match kind {
                ParameterKind::Control => count as u8,
                ParameterKind::FrameData => 0,
            },
            kind,
            direction,
        })?;

        let parameters = &mut parameters[..count];
        match direction {
            Direction::Write => {
                for chunk in parameters.chunks(4) {
                    pdi.PDI_FIFO.write(pack(chunk));
                }
            }
            Direction::Read => {
                for chunk in parameters.chunks_mut(4) {
                    unpack(pdi.PDI_FIFO.read(), chunk);
                }
            }
        }
        while !ral::read_reg!(ral::pdi, pdi, PDI_STAT, CMD_DONE == 1) {
            core::hint::spin_loop();
        }
        Ok(count)
    }
}

fn pack(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0, |word, &byte| (word << 8) | byte as u32)
}

fn unpack(word: u32, bytes: &mut [u8]) {
    let len = bytes.len();
    for (idx, byte) in bytes.iter_mut().enumerate() {
        *byte = (word >> (8 * (len - 1 - idx))) as u8;
    }
}
