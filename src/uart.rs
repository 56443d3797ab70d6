//! UART driver.
//!
//! The UART runs in one of two modes:
//!
//! - **Polled**. Transfers spin on the line status register.
//! - **Interrupt**. Transfers go through caller-provided ring buffers that
//!   the UART interrupt fills and drains. Requires the `uart-interrupt`
//!   feature and buffers at `init`.
//!
//! Independently, transfers are blocking or non-blocking. A blocking
//! transfer moves every byte before returning. A non-blocking transfer
//! moves what it can right now, and returns the count.
//!
//! In interrupt mode, a received byte that doesn't fit the receive buffer
//! is dropped, and counted in the [`Statistics`].

use crate::interrupt::{self, Interrupt, Shared};
use crate::ral::{self, uart, Static};
use crate::{Callback, Error, Result};

/// Standard baud rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BaudRate {
    Baud9600,
    Baud19200,
    Baud38400,
    Baud57600,
    Baud115200,
    Baud230400,
    Baud460800,
}

impl BaudRate {
    pub const fn bits_per_second(self) -> u32 {
        match self {
            BaudRate::Baud9600 => 9600,
            BaudRate::Baud19200 => 19200,
            BaudRate::Baud38400 => 38400,
            BaudRate::Baud57600 => 57600,
            BaudRate::Baud115200 => 115200,
            BaudRate::Baud230400 => 230400,
            BaudRate::Baud460800 => 460800,
        }
    }
}

/// `(DIVC, DIVM, DIVN)` per baud rate, by UART clock. A zero `DIVC` means
/// the clock can't produce the rate.
const DIVISORS_16MHZ: [(u16, u16, u16); 7] = [
    (49, 1, 129),
    (19, 1, 759),
    (4, 3, 523),
    (8, 1, 174),
    (3, 1, 915),
    (2, 1, 174),
    (1, 1, 174),
];
const DIVISORS_1MHZ: [(u16, u16, u16); 7] = [
    (1, 3, 523),
    (1, 1, 1285),
    (0, 0, 0),
    (0, 0, 0),
    (0, 0, 0),
    (0, 0, 0),
    (0, 0, 0),
];
const DIVISORS_20MHZ: [(u16, u16, u16); 7] = [
    (17, 3, 1699),
    (10, 3, 523),
    (7, 2, 666),
    (3, 3, 1263),
    (2, 2, 1460),
    (1, 2, 1460),
    (1, 1, 730),
];

fn divisors(clock_hz: u32, baud_rate: BaudRate) -> Result<(u16, u16, u16)> {
    let table = match clock_hz {
        16_000_000 => &DIVISORS_16MHZ,
        1_000_000 => &DIVISORS_1MHZ,
        20_000_000 => &DIVISORS_20MHZ,
        _ => return Err(Error::ParamOutOfRange),
    };
    match table[baud_rate as usize] {
        (0, _, _) => Err(Error::NotSupported),
        divisors => Ok(divisors),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Parity {
    None,
    Odd,
    Even,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum WordLength {
    Bits5 = 0,
    Bits6 = 1,
    Bits7 = 2,
    Bits8 = 3,
}

bitflags::bitflags! {
    /// Receive line errors.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LineErrors: u16 {
        const OVERRUN = uart::COMLSR::OE::mask;
        const PARITY = uart::COMLSR::PE::mask;
        const FRAMING = uart::COMLSR::FE::mask;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for LineErrors {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "LineErrors({=u16:#x})", self.bits())
    }
}

/// UART events reported to a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// A byte landed in the receive buffer.
    Received,
    /// A byte arrived, but the receive buffer was full.
    Overflow,
    /// The transmit buffer drained.
    TransmitDone,
    LineError(LineErrors),
    ModemStatus,
}

/// Interrupt and error counters.
///
/// Counters wrap.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Statistics {
    pub rx_buffer_full_irqs: u16,
    pub tx_buffer_empty_irqs: u16,
    pub rx_status_irqs: u16,
    pub modem_status_irqs: u16,
    pub frame_errors: u16,
    pub parity_errors: u16,
    pub overrun_errors: u16,
    pub rx_dropped_bytes: u16,
}

/// Ring buffers for interrupt mode.
pub struct Buffers {
    pub rx: &'static mut [u8],
    pub tx: &'static mut [u8],
}

/// Settings for [`Handle::set_generic_settings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenericSettings {
    pub baud_rate: BaudRate,
    pub parity: Parity,
    pub word_length: WordLength,
    pub blocking: bool,
    pub interrupt_mode: bool,
}

/// Settings reported by [`Handle::generic_settings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfiguredSettings {
    /// The baud rate that the divisors produce.
    pub baud_rate: u32,
    pub parity: Parity,
    pub word_length: WordLength,
    pub blocking: bool,
    pub interrupt_mode: bool,
    pub dma_mode: bool,
}

/// Settings applied by `init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub baud_rate: BaudRate,
    pub word_length: WordLength,
    /// Send extra stop bits.
    pub stop_bit: bool,
    pub parity: Parity,
    pub loopback: bool,
    pub blocking: bool,
    /// UART clock frequency. 16 MHz, 1 MHz and 20 MHz are supported.
    pub clock_hz: u32,
}

impl Config {
    /// 9600 baud, 8 data bits, no parity, blocking, on a 16 MHz clock.
    pub const DEFAULT: Self = Self {
        baud_rate: BaudRate::Baud9600,
        word_length: WordLength::Bits8,
        stop_bit: true,
        parity: Parity::None,
        loopback: false,
        blocking: true,
        clock_hz: 16_000_000,
    };

    const fn comlcr(&self) -> u16 {
        use uart::COMLCR;
        let parity = match self.parity {
            Parity::None => 0,
            Parity::Odd => COMLCR::PEN::mask,
            Parity::Even => COMLCR::PEN::mask | COMLCR::EPS::mask,
        };
        ((self.word_length as u16) << COMLCR::WLS::offset)
            | ((self.stop_bit as u16) << COMLCR::STOP::offset)
            | parity
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::DEFAULT
    }
}

struct Ring {
    buffer: Option<&'static mut [u8]>,
    read: usize,
    len: usize,
}

impl Ring {
    const fn new() -> Self {
        Self {
            buffer: None,
            read: 0,
            len: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.buffer.as_ref().map_or(0, |buffer| buffer.len())
    }

    fn free(&self) -> usize {
        self.capacity() - self.len
    }

    fn push(&mut self, byte: u8) -> bool {
        let capacity = self.capacity();
        let (read, len) = (self.read, self.len);
        match self.buffer.as_deref_mut() {
            Some(buffer) if len < capacity => {
                buffer[(read + len) % capacity] = byte;
                self.len += 1;
                true
            }
            _ => false,
        }
    }

    fn pop(&mut self) -> Option<u8> {
        let buffer = self.buffer.as_deref()?;
        if self.len == 0 {
            return None;
        }
        let byte = buffer[self.read];
        self.read = (self.read + 1) % buffer.len();
        self.len -= 1;
        Some(byte)
    }

    fn clear(&mut self) {
        self.read = 0;
        self.len = 0;
    }
}

struct State {
    initialized: bool,
    interrupt_mode: bool,
    blocking: bool,
    rx: Ring,
    tx: Ring,
    line_errors: LineErrors,
    statistics: Statistics,
    callback: Option<Callback<Event>>,
}

impl State {
    fn record_line_status(&mut self, status: u16) -> LineErrors {
        let errors = LineErrors::from_bits_truncate(status);
        let stats = &mut self.statistics;
        if errors.contains(LineErrors::OVERRUN) {
            stats.overrun_errors = stats.overrun_errors.wrapping_add(1);
        }
        if errors.contains(LineErrors::PARITY) {
            stats.parity_errors = stats.parity_errors.wrapping_add(1);
        }
        if errors.contains(LineErrors::FRAMING) {
            stats.frame_errors = stats.frame_errors.wrapping_add(1);
        }
        if !errors.is_empty() {
            self.line_errors = errors;
        }
        errors
    }
}

/// The UART driver.
pub struct Uart {
    registers: Static<uart::RegisterBlock>,
    config: Config,
    state: Shared<State>,
}

// Safety: registers are only touched through `&self` methods that
// synchronize with critical sections. OK to place in a static.
unsafe impl Sync for Uart {}

impl Uart {
    /// # Safety
    ///
    /// `registers` must point to the UART register block. Only create one
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
                interrupt_mode: false,
                blocking: config.blocking,
                rx: Ring::new(),
                tx: Ring::new(),
                line_errors: LineErrors::empty(),
                statistics: Statistics {
                    rx_buffer_full_irqs: 0,
                    tx_buffer_empty_irqs: 0,
                    rx_status_irqs: 0,
                    modem_status_irqs: 0,
                    frame_errors: 0,
                    parity_errors: 0,
                    overrun_errors: 0,
                    rx_dropped_bytes: 0,
                },
                callback: None,
            }),
        }
    }

    /// Initialize the UART.
    ///
    /// With `buffers`, the UART starts in interrupt mode. Otherwise it
    /// starts polled. Either way, the UART is left disabled. Call
    /// [`Handle::enable`] to start it.
    pub fn init(&self, buffers: Option<Buffers>) -> Result<Handle<'_>> {
        let (divc, divm, divn) = divisors(self.config.clock_hz, self.config.baud_rate)?;
        let interrupt_mode = buffers.is_some();
        if interrupt_mode && !cfg!(feature = "uart-interrupt") {
            return Err(Error::NotSupported);
        }
        let uart = &self.registers;
        self.state.lock(|state| {
            if state.initialized {
                return Err(Error::AlreadyInitialized);
            }
            if let Some(Buffers { rx, tx }) = buffers {
                if rx.is_empty() || tx.is_empty() {
                    return Err(Error::InvalidBuffer);
                }
                state.rx.buffer = Some(rx);
                state.tx.buffer = Some(tx);
            }
            state.rx.clear();
            state.tx.clear();
            state.interrupt_mode = interrupt_mode;
            state.blocking = self.config.blocking;
            state.line_errors = LineErrors::empty();
            state.statistics = Statistics::default();
            state.callback = None;

            uart.COMDIV.write(divc);
            ral::write_reg!(ral::uart, uart, COMFBR, DIVN: divn, DIVM: divm, FBEN: 1);
            uart.COMLCR.write(self.config.comlcr());
            ral::write_reg!(ral::uart, uart, COMMCR, LOOPBACK: self.config.loopback as u16);
            ral::write_reg!(ral::uart, uart, COMCON, DISABLE: 1);
            if interrupt_mode {
                ral::write_reg!(ral::uart, uart, COMIEN, ERBFI: 1, ELSI: 1);
            } else {
                uart.COMIEN.write(0);
            }
            state.initialized = true;
            Ok(())
        })?;
        if interrupt_mode {
            interrupt::enable(Interrupt::Uart);
        }
        debug!("UART initialized");
        Ok(Handle { uart: self })
    }

    /// Service the UART interrupt.
    ///
    /// Handles the one source that the UART reports, then calls the
    /// callback with the resulting event.
    pub fn on_interrupt(&self) {
        use uart::COMIIR::status;

        let uart = &self.registers;
        let iir = uart.COMIIR.read();
        if iir & uart::COMIIR::NINT::mask != 0 {
            return;
        }
        let source = (iir & uart::COMIIR::STA::mask) >> uart::COMIIR::STA::offset;
        let (event, callback) = self.state.lock(|state| {
            let stats = &mut state.statistics;
            let event = match source {
                status::RX_LINE_STATUS => {
                    stats.rx_status_irqs = stats.rx_status_irqs.wrapping_add(1);
                    let errors = state.record_line_status(uart.COMLSR.read());
                    (!errors.is_empty()).then_some(Event::LineError(errors))
                }
                status::RX_BUFFER_FULL => {
                    stats.rx_buffer_full_irqs = stats.rx_buffer_full_irqs.wrapping_add(1);
                    let byte = uart.receive();
                    if state.rx.push(byte) {
                        Some(Event::Received)
                    } else {
                        stats.rx_dropped_bytes = stats.rx_dropped_bytes.wrapping_add(1);
                        Some(Event::Overflow)
                    }
                }
                status::TX_BUFFER_EMPTY => {
                    stats.tx_buffer_empty_irqs = stats.tx_buffer_empty_irqs.wrapping_add(1);
                    if let Some(byte) = state.tx.pop() {
                        uart.COMTX.write(byte as u16);
                        None
                    } else {
                        ral::modify_reg!(ral::uart, uart, COMIEN, ETBEI: 0);
                        Some(Event::TransmitDone)
                    }
                }
                _ => {
                    stats.modem_status_irqs = stats.modem_status_irqs.wrapping_add(1);
                    Some(Event::ModemStatus)
                }
            };
            let callback = state.callback.filter(|_| state.initialized);
            (event, callback)
        });
        if event == Some(Event::Overflow) {
            warn!("UART receive buffer full; dropped a byte");
        }
        if let (Some(event), Some(callback)) = (event, callback) {
            callback(event);
        }
    }
}

/// A handle to an initialized UART.
#[derive(Clone, Copy)]
pub struct Handle<'a> {
    uart: &'a Uart,
}

impl<'a> Handle<'a> {
    fn registers(&self) -> Result<&'a uart::RegisterBlock> {
        let uart = self.uart;
        if uart.state.lock(|state| state.initialized) {
            Ok(&*uart.registers)
        } else {
            Err(Error::NotInitialized)
        }
    }

    fn modify_lcr(&self, bits: u16, value: u16) -> Result<()> {
        let uart = self.registers()?;
        critical_section::with(|_| {
            let lcr = uart.COMLCR.read();
            uart.COMLCR.write((lcr & !bits) | (value & bits));
        });
        Ok(())
    }

    fn lcr(&self) -> Result<u16> {
        Ok(self.registers()?.COMLCR.read())
    }

    fn modes(&self) -> (bool, bool) {
        self.uart
            .state
            .lock(|state| (state.interrupt_mode, state.blocking))
    }

    /// Sleep until `ready` returns `true`.
    fn wait_until(&self, mut ready: impl FnMut(&mut State) -> bool) {
        while !self.uart.state.lock(&mut ready) {
            interrupt::wait_for_interrupt();
        }
    }

    /// Disable the UART, mask the interrupt, and drop the callback.
    ///
    /// The ring buffers stay with the driver for the next `init`.
    pub fn uninit(self) -> Result<()> {
        let uart = self.registers()?;
        interrupt::disable(Interrupt::Uart);
        critical_section::with(|_| ral::modify_reg!(ral::uart, uart, COMCON, DISABLE: 1));
        self.uart.state.lock(|state| {
            state.initialized = false;
            state.callback = None;
        });
        debug!("UART uninitialized");
        Ok(())
    }

    pub fn register_callback(&self, callback: Option<Callback<Event>>) -> Result<()> {
        self.registers()?;
        self.uart.state.lock(|state| state.callback = callback);
        Ok(())
    }

    /// Send bytes from `data`, returning the number of bytes accepted.
    ///
    /// A blocking transfer accepts every byte. In interrupt mode, it
    /// returns [`Error::InvalidBuffer`] if `data` can never fit the
    /// transmit buffer.
    pub fn buf_tx(&self, data: &[u8]) -> Result<usize> {
        let uart = self.registers()?;
        if data.is_empty() {
            return Err(Error::ParamOutOfRange);
        }
        let (interrupt_mode, blocking) = self.modes();
        if interrupt_mode {
            let count = if blocking {
                if data.len() > self.uart.state.lock(|state| state.tx.capacity()) {
                    return Err(Error::InvalidBuffer);
                }
                self.wait_until(|state| state.tx.free() >= data.len());
                data.len()
            } else {
                data.len().min(self.uart.state.lock(|state| state.tx.free()))
            };
            self.uart.state.lock(|state| {
                for &byte in &data[..count] {
                    state.tx.push(byte);
                }
                if count > 0 {
                    ral::modify_reg!(ral::uart, uart, COMIEN, ETBEI: 1);
                }
            });
            trace!("UART queued {} bytes", count);
            Ok(count)
        } else if blocking {
            for &byte in data {
                while !ral::read_reg!(ral::uart, uart, COMLSR, THRE == 1) {}
                uart.COMTX.write(byte as u16);
            }
            Ok(data.len())
        } else if ral::read_reg!(ral::uart, uart, COMLSR, THRE == 1) {
            uart.COMTX.write(data[0] as u16);
            Ok(1)
        } else {
            Ok(0)
        }
    }

    /// Receive bytes into `data`, returning the number of bytes received.
    ///
    /// A blocking transfer fills `data`. In interrupt mode, it returns
    /// [`Error::InvalidBuffer`] if `data` is larger than the receive
    /// buffer.
    pub fn buf_rx(&self, data: &mut [u8]) -> Result<usize> {
        let uart = self.registers()?;
        if data.is_empty() {
            return Err(Error::ParamOutOfRange);
        }
        let (interrupt_mode, blocking) = self.modes();
        if interrupt_mode {
            let count = if blocking {
                if data.len() > self.uart.state.lock(|state| state.rx.capacity()) {
                    return Err(Error::InvalidBuffer);
                }
                self.wait_until(|state| state.rx.len >= data.len());
                data.len()
            } else {
                data.len().min(self.uart.state.lock(|state| state.rx.len))
            };
            self.uart.state.lock(|state| {
                for slot in &mut data[..count] {
                    // Count was checked against the ring's length.
                    *slot = state.rx.pop().unwrap_or_default();
                }
            });
            Ok(count)
        } else {
            let count = if blocking { data.len() } else { 1 };
            for (received, slot) in data[..count].iter_mut().enumerate() {
                loop {
                    let status = uart.COMLSR.read();
                    self.uart
                        .state
                        .lock(|state| state.record_line_status(status));
                    if status & uart::COMLSR::DR::mask != 0 {
                        break;
                    }
                    if !blocking {
                        return Ok(received);
                    }
                }
                *slot = uart.receive();
            }
            Ok(count)
        }
    }

    /// Drop anything received, wait for the transmitter to finish, and
    /// empty both ring buffers.
    pub fn buf_flush(&self) -> Result<()> {
        let uart = self.registers()?;
        if ral::read_reg!(ral::uart, uart, COMLSR, DR == 1) {
            uart.receive();
        }
        while !ral::read_reg!(ral::uart, uart, COMCON, DISABLE == 1)
            && !ral::read_reg!(ral::uart, uart, COMLSR, TEMT == 1)
        {}
        self.uart.state.lock(|state| {
            state.rx.clear();
            state.tx.clear();
        });
        Ok(())
    }

    /// Bytes ready to read.
    ///
    /// When polled, this is 1 if the receive buffer is full.
    pub fn num_rx_bytes(&self) -> Result<usize> {
        let uart = self.registers()?;
        let (interrupt_mode, _) = self.modes();
        Ok(if interrupt_mode {
            self.uart.state.lock(|state| state.rx.len)
        } else {
            ral::read_reg!(ral::uart, uart, COMLSR, DR) as usize
        })
    }

    /// Bytes that can be sent without blocking.
    ///
    /// When polled, this is 1 if the transmit holding register is empty.
    pub fn num_tx_bytes(&self) -> Result<usize> {
        let uart = self.registers()?;
        let (interrupt_mode, _) = self.modes();
        Ok(if interrupt_mode {
            self.uart.state.lock(|state| state.tx.free())
        } else {
            ral::read_reg!(ral::uart, uart, COMLSR, THRE) as usize
        })
    }

    /// Read and reset the counters.
    pub fn statistics(&self) -> Result<Statistics> {
        self.registers()?;
        Ok(self
            .uart
            .state
            .lock(|state| core::mem::take(&mut state.statistics)))
    }

    /// The most recent receive line errors.
    pub fn line_errors(&self) -> Result<LineErrors> {
        self.registers()?;
        Ok(self.uart.state.lock(|state| state.line_errors))
    }

    /// Program the divisors for `baud_rate`.
    ///
    /// Returns [`Error::ParamOutOfRange`] if the configured UART clock has
    /// no divisor table, and [`Error::NotSupported`] if the clock can't
    /// produce the rate.
    pub fn set_baud_rate(&self, baud_rate: BaudRate) -> Result<()> {
        let uart = self.registers()?;
        let (divc, divm, divn) = divisors(self.uart.config.clock_hz, baud_rate)?;
        uart.COMDIV.write(divc);
        ral::write_reg!(ral::uart, uart, COMFBR, DIVN: divn, DIVM: divm, FBEN: 1);
        Ok(())
    }

    /// The baud rate that the current divisors produce.
    pub fn baud_rate(&self) -> Result<u32> {
        let uart = self.registers()?;
        let divc = uart.COMDIV.read() as u64;
        let (divm, divn) = ral::read_reg!(ral::uart, uart, COMFBR, DIVM, DIVN);
        let divisor = ((divm as u64) << 11 | divn as u64) * divc;
        if divisor == 0 {
            return Ok(0);
        }
        Ok((((self.uart.config.clock_hz as u64) << 6) / divisor) as u32)
    }

    pub fn set_parity(&self, parity: Parity) -> Result<()> {
        use uart::COMLCR::{EPS, PEN, SP};
        let value = match parity {
            Parity::None => 0,
            Parity::Odd => PEN::mask,
            Parity::Even => PEN::mask | EPS::mask,
        };
        self.modify_lcr(PEN::mask | EPS::mask | SP::mask, value)
    }

    pub fn parity(&self) -> Result<Parity> {
        let lcr = self.lcr()?;
        Ok(if lcr & uart::COMLCR::PEN::mask == 0 {
            Parity::None
        } else if lcr & uart::COMLCR::EPS::mask != 0 {
            Parity::Even
        } else {
            Parity::Odd
        })
    }

    pub fn set_loopback(&self, loopback: bool) -> Result<()> {
        let uart = self.registers()?;
        critical_section::with(|_| {
            ral::modify_reg!(ral::uart, uart, COMMCR, LOOPBACK: loopback as u16)
        });
        Ok(())
    }

    pub fn loopback(&self) -> Result<bool> {
        let uart = self.registers()?;
        Ok(ral::read_reg!(ral::uart, uart, COMMCR, LOOPBACK == 1))
    }

    /// Send extra stop bits.
    pub fn set_stop_bit(&self, stop_bit: bool) -> Result<()> {
        let bit = uart::COMLCR::STOP::mask;
        self.modify_lcr(bit, if stop_bit { bit } else { 0 })
    }

    pub fn stop_bit(&self) -> Result<bool> {
        Ok(self.lcr()? & uart::COMLCR::STOP::mask != 0)
    }

    /// Hold the transmit line low.
    pub fn set_break(&self, force: bool) -> Result<()> {
        let bit = uart::COMLCR::BRK::mask;
        self.modify_lcr(bit, if force { bit } else { 0 })
    }

    pub fn is_break(&self) -> Result<bool> {
        Ok(self.lcr()? & uart::COMLCR::BRK::mask != 0)
    }

    /// Force the parity bit to the inverse of the even parity select.
    pub fn set_stick_parity(&self, stick: bool) -> Result<()> {
        let bit = uart::COMLCR::SP::mask;
        self.modify_lcr(bit, if stick { bit } else { 0 })
    }

    pub fn stick_parity(&self) -> Result<bool> {
        Ok(self.lcr()? & uart::COMLCR::SP::mask != 0)
    }

    pub fn set_word_length(&self, word_length: WordLength) -> Result<()> {
        self.modify_lcr(
            uart::COMLCR::WLS::mask,
            (word_length as u16) << uart::COMLCR::WLS::offset,
        )
    }

    pub fn word_length(&self) -> Result<WordLength> {
        Ok(
            match (self.lcr()? & uart::COMLCR::WLS::mask) >> uart::COMLCR::WLS::offset {
                0 => WordLength::Bits5,
                1 => WordLength::Bits6,
                2 => WordLength::Bits7,
                _ => WordLength::Bits8,
            },
        )
    }

    /// DMA isn't supported. Disabling DMA is a no-op.
    pub fn set_dma_mode(&self, enable: bool) -> Result<()> {
        self.registers()?;
        if enable {
            Err(Error::NotSupported)
        } else {
            Ok(())
        }
    }

    pub fn dma_mode(&self) -> Result<bool> {
        self.registers()?;
        Ok(false)
    }

    pub fn enable(&self, enable: bool) -> Result<()> {
        let uart = self.registers()?;
        critical_section::with(|_| {
            ral::modify_reg!(ral::uart, uart, COMCON, DISABLE: !enable as u16)
        });
        Ok(())
    }

    pub fn is_enabled(&self) -> Result<bool> {
        let uart = self.registers()?;
        Ok(ral::read_reg!(ral::uart, uart, COMCON, DISABLE == 0))
    }

    /// Switch between interrupt and polled mode.
    ///
    /// Interrupt mode needs the ring buffers from `init`. Without them,
    /// this returns [`Error::InvalidBuffer`].
    pub fn set_interrupt_mode(&self, enable: bool) -> Result<()> {
        let uart = self.registers()?;
        if enable && !cfg!(feature = "uart-interrupt") {
            return Err(Error::NotSupported);
        }
        self.uart.state.lock(|state| {
            if enable && (state.rx.capacity() == 0 || state.tx.capacity() == 0) {
                return Err(Error::InvalidBuffer);
            }
            state.interrupt_mode = enable;
            ral::modify_reg!(ral::uart, uart, COMIEN, ERBFI: enable as u16, ELSI: 1);
            Ok(())
        })?;
        if enable {
            interrupt::enable(Interrupt::Uart);
        }
        Ok(())
    }

    pub fn interrupt_mode(&self) -> Result<bool> {
        self.registers()?;
        Ok(self.modes().0)
    }

    pub fn set_blocking_mode(&self, blocking: bool) -> Result<()> {
        self.registers()?;
        self.uart.state.lock(|state| state.blocking = blocking);
        Ok(())
    }

    pub fn blocking_mode(&self) -> Result<bool> {
        self.registers()?;
        Ok(self.modes().1)
    }

    /// Apply several settings, stopping at the first error.
    pub fn set_generic_settings(&self, settings: &GenericSettings) -> Result<()> {
        self.set_baud_rate(settings.baud_rate)?;
        self.set_word_length(settings.word_length)?;
        self.set_parity(settings.parity)?;
        self.set_blocking_mode(settings.blocking)?;
        self.set_interrupt_mode(settings.interrupt_mode)
    }

    pub fn generic_settings(&self) -> Result<ConfiguredSettings> {
        Ok(ConfiguredSettings {
            baud_rate: self.baud_rate()?,
            parity: self.parity()?,
            word_length: self.word_length()?,
            blocking: self.blocking_mode()?,
            interrupt_mode: self.interrupt_mode()?,
            dma_mode: self.dma_mode()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ral::testing;
    use core::sync::atomic::{AtomicUsize, Ordering};

    const IIR_TX_EMPTY: u16 = 0b010;
    const IIR_RX_FULL: u16 = 0b100;
    const IIR_RX_LINE: u16 = 0b110;

    fn uart() -> (&'static Uart, &'static uart::RegisterBlock) {
        let regs = testing::block::<uart::RegisterBlock>();
        // Safety: test-owned memory.
        let uart = unsafe { Uart::new(regs as *const _ as *const ()) };
        (Box::leak(Box::new(uart)), regs)
    }

    fn buffers(rx: usize, tx: usize) -> Buffers {
        Buffers {
            rx: Box::leak(vec![0; rx].into_boxed_slice()),
            tx: Box::leak(vec![0; tx].into_boxed_slice()),
        }
    }

    fn receive(uart: &Uart, regs: &uart::RegisterBlock, byte: u8) {
        regs.COMTX.write(byte as u16);
        testing::poke(&regs.COMIIR, IIR_RX_FULL);
        uart.on_interrupt();
    }

    #[test]
    fn init_defaults() {
        let (uart, regs) = uart();
        let handle = uart.init(None).unwrap();
        assert_eq!(regs.COMDIV.read(), 49);
        assert_eq!(handle.baud_rate().unwrap(), 9599);
        assert_eq!(handle.word_length().unwrap(), WordLength::Bits8);
        assert_eq!(handle.parity().unwrap(), Parity::None);
        assert!(handle.stop_bit().unwrap());
        assert!(!handle.is_enabled().unwrap());
        assert!(!handle.interrupt_mode().unwrap());
        assert!(handle.blocking_mode().unwrap());
        assert!(!interrupt::is_enabled(Interrupt::Uart));
        assert!(matches!(uart.init(None), Err(Error::AlreadyInitialized)));

        handle.enable(true).unwrap();
        assert!(handle.is_enabled().unwrap());
        handle.uninit().unwrap();
        assert_eq!(regs.COMCON.read() & uart::COMCON::DISABLE::mask, 1);
        assert_eq!(handle.baud_rate(), Err(Error::NotInitialized));
    }

    #[test]
    fn baud_rate_tables() {
        let (uart, regs) = uart();
        let handle = uart.init(None).unwrap();
        handle.set_baud_rate(BaudRate::Baud115200).unwrap();
        assert_eq!(regs.COMDIV.read(), 3);
        assert_eq!(
            regs.COMFBR.read(),
            915 | 1 << 11 | uart::COMFBR::FBEN::mask
        );
        let baud = handle.baud_rate().unwrap();
        assert!((115_000..=115_400).contains(&baud), "{baud}");

        let slow = unsafe {
            Uart::with_config(
                regs as *const _ as *const (),
                Config {
                    clock_hz: 1_000_000,
                    ..Config::DEFAULT
                },
            )
        };
        handle.uninit().unwrap();
        let handle = slow.init(None).unwrap();
        handle.set_baud_rate(BaudRate::Baud19200).unwrap();
        assert_eq!(
            handle.set_baud_rate(BaudRate::Baud38400),
            Err(Error::NotSupported)
        );

        let odd = unsafe {
            Uart::with_config(
                regs as *const _ as *const (),
                Config {
                    clock_hz: 12_000_000,
                    ..Config::DEFAULT
                },
            )
        };
        assert!(matches!(odd.init(None), Err(Error::ParamOutOfRange)));
    }

    #[test]
    fn line_control_round_trips() {
        let (uart, _) = uart();
        let handle = uart.init(None).unwrap();
        for parity in [Parity::Odd, Parity::Even, Parity::None] {
            handle.set_parity(parity).unwrap();
            assert_eq!(handle.parity().unwrap(), parity);
        }
        for length in [WordLength::Bits5, WordLength::Bits7, WordLength::Bits8] {
            handle.set_word_length(length).unwrap();
            assert_eq!(handle.word_length().unwrap(), length);
        }
        handle.set_stop_bit(false).unwrap();
        handle.set_break(true).unwrap();
        handle.set_stick_parity(true).unwrap();
        handle.set_loopback(true).unwrap();
        assert!(!handle.stop_bit().unwrap());
        assert!(handle.is_break().unwrap());
        assert!(handle.stick_parity().unwrap());
        assert!(handle.loopback().unwrap());
        assert_eq!(handle.set_dma_mode(true), Err(Error::NotSupported));
        assert!(!handle.dma_mode().unwrap());
    }

    #[test]
    fn polled_non_blocking() {
        let (uart, regs) = uart();
        let handle = uart.init(None).unwrap();
        handle.set_blocking_mode(false).unwrap();

        assert_eq!(handle.buf_tx(b"hi").unwrap(), 0);
        assert_eq!(handle.num_tx_bytes().unwrap(), 0);
        testing::poke(&regs.COMLSR, uart::COMLSR::THRE::mask);
        assert_eq!(handle.num_tx_bytes().unwrap(), 1);
        assert_eq!(handle.buf_tx(b"hi").unwrap(), 1);
        assert_eq!(regs.COMTX.read(), b'h' as u16);

        let mut data = [0; 4];
        assert_eq!(handle.buf_rx(&mut data).unwrap(), 0);
        testing::poke(
            &regs.COMLSR,
            uart::COMLSR::DR::mask | uart::COMLSR::PE::mask,
        );
        regs.COMTX.write(b'x' as u16);
        assert_eq!(handle.num_rx_bytes().unwrap(), 1);
        assert_eq!(handle.buf_rx(&mut data).unwrap(), 1);
        assert_eq!(data[0], b'x');
        assert_eq!(handle.line_errors().unwrap(), LineErrors::PARITY);
        assert_eq!(handle.statistics().unwrap().parity_errors, 1);
        assert_eq!(handle.statistics().unwrap(), Statistics::default());
        assert_eq!(handle.buf_rx(&mut []), Err(Error::ParamOutOfRange));
    }

    #[cfg(feature = "uart-interrupt")]
    #[test]
    fn interrupt_receive_and_overflow() {
        let (uart, regs) = uart();
        let handle = uart.init(Some(buffers(2, 4))).unwrap();
        assert!(handle.interrupt_mode().unwrap());
        assert!(interrupt::is_enabled(Interrupt::Uart));
        handle.set_blocking_mode(false).unwrap();

        receive(uart, regs, b'a');
        receive(uart, regs, b'b');
        receive(uart, regs, b'c');
        assert_eq!(handle.num_rx_bytes().unwrap(), 2);

        let mut data = [0; 4];
        assert_eq!(handle.buf_rx(&mut data).unwrap(), 2);
        assert_eq!(&data[..2], b"ab");
        let stats = handle.statistics().unwrap();
        assert_eq!(stats.rx_buffer_full_irqs, 3);
        assert_eq!(stats.rx_dropped_bytes, 1);

        // Ring wraps.
        receive(uart, regs, b'd');
        receive(uart, regs, b'e');
        handle.set_blocking_mode(true).unwrap();
        assert_eq!(handle.buf_rx(&mut data[..2]).unwrap(), 2);
        assert_eq!(&data[..2], b"de");
        assert_eq!(handle.buf_rx(&mut data[..3]), Err(Error::InvalidBuffer));
    }

    #[cfg(feature = "uart-interrupt")]
    #[test]
    fn interrupt_transmit_drains_ring() {
        static DONE: AtomicUsize = AtomicUsize::new(0);
        let (uart, regs) = uart();
        let handle = uart.init(Some(buffers(2, 4))).unwrap();
        handle
            .register_callback(Some(&|event| {
                if event == Event::TransmitDone {
                    DONE.fetch_add(1, Ordering::SeqCst);
                }
            }))
            .unwrap();
        handle.set_blocking_mode(false).unwrap();

        assert_eq!(handle.buf_tx(b"xyz").unwrap(), 3);
        assert_eq!(handle.buf_tx(b"12").unwrap(), 1);
        assert_eq!(handle.num_tx_bytes().unwrap(), 0);
        assert_ne!(regs.COMIEN.read() & uart::COMIEN::ETBEI::mask, 0);

        testing::poke(&regs.COMIIR, IIR_TX_EMPTY);
        let mut sent = Vec::new();
        for _ in 0..4 {
            uart.on_interrupt();
            sent.push(regs.COMTX.read() as u8);
        }
        assert_eq!(sent, b"xyz1");
        assert_eq!(DONE.load(Ordering::SeqCst), 0);

        uart.on_interrupt();
        assert_eq!(DONE.load(Ordering::SeqCst), 1);
        assert_eq!(regs.COMIEN.read() & uart::COMIEN::ETBEI::mask, 0);
        assert_eq!(handle.num_tx_bytes().unwrap(), 4);
        assert_eq!(handle.buf_tx(b"12345"), Ok(4));

        handle.set_blocking_mode(true).unwrap();
        assert_eq!(handle.buf_tx(b"12345"), Err(Error::InvalidBuffer));
    }

    #[test]
    fn line_status_interrupt() {
        static ERRORS: AtomicUsize = AtomicUsize::new(0);
        let (uart, regs) = uart();
        let handle = uart.init(None).unwrap();
        handle
            .register_callback(Some(&|event| {
                if let Event::LineError(errors) = event {
                    ERRORS.store(errors.bits() as usize, Ordering::SeqCst);
                }
            }))
            .unwrap();
        testing::poke(
            &regs.COMLSR,
            uart::COMLSR::OE::mask | uart::COMLSR::FE::mask,
        );
        testing::poke(&regs.COMIIR, IIR_RX_LINE);
        uart.on_interrupt();
        assert_eq!(
            ERRORS.load(Ordering::SeqCst),
            (LineErrors::OVERRUN | LineErrors::FRAMING).bits() as usize
        );
        let stats = handle.statistics().unwrap();
        assert_eq!(stats.rx_status_irqs, 1);
        assert_eq!(stats.overrun_errors, 1);
        assert_eq!(stats.frame_errors, 1);

        // No interrupt pending.
        testing::poke(&regs.COMIIR, 1u16);
        uart.on_interrupt();
        assert_eq!(handle.statistics().unwrap(), Statistics::default());
    }

    #[test]
    fn interrupt_mode_needs_buffers() {
        let (uart, _) = uart();
        let handle = uart.init(None).unwrap();
        #[cfg(feature = "uart-interrupt")]
        assert_eq!(handle.set_interrupt_mode(true), Err(Error::InvalidBuffer));
        handle.set_interrupt_mode(false).unwrap();

        let settings = GenericSettings {
            baud_rate: BaudRate::Baud57600,
            parity: Parity::Odd,
            word_length: WordLength::Bits7,
            blocking: false,
            interrupt_mode: false,
        };
        handle.set_generic_settings(&settings).unwrap();
        let configured = handle.generic_settings().unwrap();
        assert!((57_000..=58_000).contains(&configured.baud_rate));
        assert_eq!(configured.parity, Parity::Odd);
        assert_eq!(configured.word_length, WordLength::Bits7);
        assert!(!configured.blocking);
        assert!(!configured.dma_mode);
    }
}
