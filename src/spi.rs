//! SPI driver for SPI0, SPI1 and SPIH.
//!
//! Each instance runs as a master or as a slave. Masters drive a GPIO chip
//! select, so the driver borrows the [`Gpio`] driver at init. It also
//! borrows the [`Dma`] driver, which backs DMA mode.
//!
//! Transfers move data through the FIFO interrupt, or, with the `spi-dma`
//! feature and DMA mode, through two µDMA channels per instance. DMA
//! transfers use halfword items, so their length must be even.
//!
//! In DMA mode, each direction keeps its primary and alternate descriptors
//! armed in ping-pong. When the controller finishes one, the DMA interrupt
//! refills it with the next chunk, or with a stop descriptor once the data
//! runs out. The transfer completes when the receive channel has retired
//! both descriptors.
//!
//! A transfer in blocking mode returns once it completes. Otherwise it
//! returns right away. Poll [`Handle::master_complete`] or
//! [`Handle::slave_complete`], or register a callback.

use crate::dma::{self, Dma};
use crate::gpio::{self, Gpio, Pins, Port};
use crate::interrupt::{self, Interrupt, Shared};
use crate::ral::{self, spi, Static};
use crate::{Callback, Error, Result};

#[cfg(feature = "spi-dma")]
use crate::dma::{Increment, Mode, Protection, Slot, Width};

/// The most halfwords that one DMA descriptor carries.
pub const MAX_DMA_CHUNK: usize = 256;

/// SPI instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Instance {
    Spi0,
    Spi1,
    Spih,
}

impl Instance {
    pub const fn interrupt(self) -> Interrupt {
        match self {
            Instance::Spi0 => Interrupt::Spi0,
            Instance::Spi1 => Interrupt::Spi1,
            Instance::Spih => Interrupt::Spih,
        }
    }

    /// `(transmit, receive)` DMA interrupts.
    pub const fn dma_interrupts(self) -> (Interrupt, Interrupt) {
        match self {
            Instance::Spi0 => (Interrupt::DmaSpi0Tx, Interrupt::DmaSpi0Rx),
            Instance::Spi1 => (Interrupt::DmaSpi1Tx, Interrupt::DmaSpi1Rx),
            Instance::Spih => (Interrupt::DmaSpihTx, Interrupt::DmaSpihRx),
        }
    }

    /// `(transmit, receive)` DMA channels.
    pub const fn dma_channels(self) -> (dma::Channel, dma::Channel) {
        match self {
            Instance::Spi0 => (dma::Channel::Spi0Tx, dma::Channel::Spi0Rx),
            Instance::Spi1 => (dma::Channel::Spi1Tx, dma::Channel::Spi1Rx),
            Instance::Spih => (dma::Channel::SpihTx, dma::Channel::SpihRx),
        }
    }

    /// The chip select pin wired to the instance on the evaluation board.
    pub const fn default_chip_select(self) -> ChipSelect {
        match self {
            Instance::Spi0 => ChipSelect {
                port: Port::Port3,
                pins: Pins::PIN3,
            },
            Instance::Spi1 => ChipSelect {
                port: Port::Port3,
                pins: Pins::PIN7,
            },
            Instance::Spih => ChipSelect {
                port: Port::Port0,
                pins: Pins::PIN15,
            },
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Instance::Spi0 => "SPI0",
            Instance::Spi1 => "SPI1",
            Instance::Spih => "SPIH",
        }
    }
}

/// A GPIO chip select. Active low.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChipSelect {
    pub port: Port,
    pub pins: Pins,
}

/// FIFO levels that raise the SPI interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InterruptMode {
    /// After each byte.
    Tx1Rx1 = 0,
    Tx2Rx2 = 1,
    Tx3Rx3 = 2,
    /// After four bytes.
    Tx4Rx4 = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// The transfer moved every byte.
    TransferComplete,
}

/// Settings that are usually changed together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GenericSettings {
    pub bitrate: u32,
    pub chip_select: ChipSelect,
    pub blocking: bool,
    pub dma: bool,
}

/// SPI configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// The SPI input clock.
    pub clock_hz: u32,
    /// The master bitrate after init.
    pub bitrate: u32,
    pub blocking: bool,
}

impl Config {
    pub const DEFAULT: Self = Self {
        clock_hz: 16_000_000,
        bitrate: 250_000,
        blocking: false,
    };
}

impl Default for Config {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// One SPI transaction.
///
/// The master first sends the `prologue`, discarding what it receives.
/// Then it exchanges the data: it sends `tx` while receiving into `rx`.
///
/// The data length is the longer of `tx` and `rx`. A buffer that
/// increments must be exactly that long. A buffer that doesn't increment
/// repeats its first item, so it only needs one item: a byte, or a
/// halfword in DMA mode.
#[derive(Debug)]
pub struct Transceive<'a> {
    pub prologue: &'a [u8],
    pub tx: &'a [u8],
    pub rx: &'a mut [u8],
    pub tx_increment: bool,
    pub rx_increment: bool,
}

impl<'a> Transceive<'a> {
    /// Exchange `tx` for `rx`, with no prologue.
    pub fn new(tx: &'a [u8], rx: &'a mut [u8]) -> Self {
        Self {
            prologue: &[],
            tx,
            rx,
            tx_increment: true,
            rx_increment: true,
        }
    }

    pub fn with_prologue(self, prologue: &'a [u8]) -> Self {
        Self { prologue, ..self }
    }

    fn data_len(&self, item: usize) -> Result<usize> {
        let len = self.tx.len().max(self.rx.len());
        let fits = |buffer: usize, increment: bool| {
            if increment {
                buffer == len
            } else {
                len == 0 || buffer >= item
            }
        };
        if fits(self.tx.len(), self.tx_increment) && fits(self.rx.len(), self.rx_increment) {
            Ok(len)
        } else {
            Err(Error::InvalidBuffer)
        }
    }
}

/// Bitrate divider for `bitrate`, given the input clock.
fn divider(clock_hz: u32, bitrate: u32) -> Result<u16> {
    if bitrate == 0 || u64::from(bitrate) * 2 >= u64::from(clock_hz) {
        return Err(Error::ParamOutOfRange);
    }
    let div = (clock_hz / bitrate) / 2 - 1;
    if div > u32::from(spi::SPIDIV::DIV::mask >> spi::SPIDIV::DIV::offset) {
        return Err(Error::ParamOutOfRange);
    }
    Ok(div as u16)
}

fn configure_chip_select(gpio: gpio::Handle<'_>, cs: ChipSelect, active: bool) -> Result<()> {
    gpio.set_pull_up_enable(cs.port, cs.pins, active)
        .and_then(|_| gpio.set_high(cs.port, cs.pins))
        .and_then(|_| gpio.set_output_enable(cs.port, cs.pins, active))
        .map_err(|_| Error::BadGpioConfig)
}

fn select(gpio: gpio::Handle<'_>, cs: ChipSelect, selected: bool) -> Result<()> {
    if selected {
        gpio.set_low(cs.port, cs.pins)
    } else {
        gpio.set_high(cs.port, cs.pins)
    }
    .map_err(|_| Error::BadGpioConfig)
}

/// A cursor over one direction of a transfer.
#[derive(Clone, Copy)]
struct Stream {
    address: usize,
    remaining: usize,
    increment: bool,
    /// Next DMA slot to refill.
    #[cfg(feature = "spi-dma")]
    next: Slot,
}

/// A DMA chunk carved from a stream.
#[cfg(feature = "spi-dma")]
#[derive(Clone, Copy)]
struct Chunk {
    slot: Slot,
    address: usize,
    halfwords: usize,
}

impl Stream {
    const IDLE: Self = Self::new(0, 0, false);

    const fn new(address: usize, remaining: usize, increment: bool) -> Self {
        Self {
            address,
            remaining,
            increment,
            #[cfg(feature = "spi-dma")]
            next: Slot::Primary,
        }
    }

    fn step(&mut self) {
        self.remaining -= 1;
        if self.increment {
            self.address += 1;
        }
    }

    /// # Safety
    ///
    /// The stream must come from a transmit buffer that's still alive.
    unsafe fn read(&mut self) -> Option<u8> {
        if self.remaining == 0 {
            return None;
        }
        // Safety: see function contract.
        let byte = unsafe { *(self.address as *const u8) };
        self.step();
        Some(byte)
    }

    /// # Safety
    ///
    /// The stream must come from a receive buffer that's still alive.
    unsafe fn write(&mut self, byte: u8) {
        if self.remaining == 0 {
            return;
        }
        // Safety: see function contract.
        unsafe { *(self.address as *mut u8) = byte };
        self.step();
    }

    /// Carve the next chunk, and flip the slot.
    ///
    /// Once the stream is drained, every chunk is empty.
    #[cfg(feature = "spi-dma")]
    fn next_chunk(&mut self) -> Chunk {
        let slot = self.next;
        self.next = slot.other();
        let address = self.address;
        let halfwords = (self.remaining / 2).min(MAX_DMA_CHUNK);
        if halfwords == 0 {
            self.remaining = 0;
        } else {
            self.remaining -= halfwords * 2;
            if self.increment {
                self.address += halfwords * 2;
            }
        }
        Chunk {
            slot,
            address,
            halfwords,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Role {
    Master,
    Slave,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Progress {
    Idle,
    Fifo,
    #[cfg(feature = "spi-dma")]
    Dma,
}

#[cfg(feature = "spi-dma")]
#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Transmit,
    Receive,
}

struct State {
    /// Set while init runs, and while initialized.
    claimed: bool,
    role: Option<Role>,
    gpio: Option<gpio::Handle<'static>>,
    dma: Option<&'static Dma>,
    chip_select: ChipSelect,
    blocking: bool,
    dma_mode: bool,
    progress: Progress,
    tx: Stream,
    rx: Stream,
    callback: Option<Callback<Event>>,
}

/// What to do once the state lock is released.
struct Completion {
    chip_select: Option<(gpio::Handle<'static>, ChipSelect)>,
    callback: Option<Callback<Event>>,
}

impl State {
    fn finish(&mut self) -> Completion {
        self.progress = Progress::Idle;
        self.tx = Stream::IDLE;
        self.rx = Stream::IDLE;
        let chip_select = match (self.role, self.gpio) {
            (Some(Role::Master), Some(gpio)) => Some((gpio, self.chip_select)),
            _ => None,
        };
        Completion {
            chip_select,
            callback: self.callback,
        }
    }
}

impl Completion {
    fn run(self) {
        if let Some((gpio, cs)) = self.chip_select {
            if select(gpio, cs, false).is_err() {
                warn!("SPI couldn't release the chip select");
            }
        }
        if let Some(callback) = self.callback {
            callback(Event::TransferComplete);
        }
    }
}

/// An SPI driver.
pub struct Spi {
    registers: Static<spi::RegisterBlock>,
    instance: Instance,
    config: Config,
    state: Shared<State>,
}

// Safety: registers are only touched through `&self` methods that
// synchronize with critical sections. Transfer buffers are reached through
// addresses that the unsafe transfer methods vouch for. OK to place in a
// static.
unsafe impl Sync for Spi {}

impl Spi {
    /// # Safety
    ///
    /// `registers` must point to the register block of `instance`. Only
    /// create one driver for each instance.
    pub const unsafe fn new(instance: Instance, registers: *const ()) -> Self {
        Self::with_config(instance, registers, Config::DEFAULT)
    }

    /// # Safety
    ///
    /// See [`new`](Self::new).
    pub const unsafe fn with_config(
        instance: Instance,
        registers: *const (),
        config: Config,
    ) -> Self {
        Self {
            registers: Static(registers.cast()),
            instance,
            config,
            state: Shared::new(State {
                claimed: false,
                role: None,
                gpio: None,
                dma: None,
                chip_select: instance.default_chip_select(),
                blocking: config.blocking,
                dma_mode: false,
                progress: Progress::Idle,
                tx: Stream::IDLE,
                rx: Stream::IDLE,
                callback: None,
            }),
        }
    }

    pub fn instance(&self) -> Instance {
        self.instance
    }

    fn claim(&self) -> Result<()> {
        self.state.lock(|state| {
            if state.claimed {
                Err(Error::AlreadyInitialized)
            } else {
                state.claimed = true;
                Ok(())
            }
        })
    }

    fn unclaim(&self) {
        self.state.lock(|state| state.claimed = false);
    }

    fn commit(&self, role: Role, gpio: gpio::Handle<'static>, dma: &'static Dma) {
        let instance = self.instance;
        let blocking = self.config.blocking;
        self.state.lock(|state| {
            state.role = Some(role);
            state.gpio = Some(gpio);
            state.dma = Some(dma);
            state.chip_select = instance.default_chip_select();
            state.blocking = blocking;
            state.dma_mode = false;
            state.progress = Progress::Idle;
            state.tx = Stream::IDLE;
            state.rx = Stream::IDLE;
            state.callback = None;
        });
    }

    /// Initialize the instance as a master.
    ///
    /// Claims the GPIO driver for the chip select, which idles high. The
    /// instance starts at the configured bitrate, in FIFO mode, with its
    /// interrupt masked until the first transfer.
    pub fn master_init(&self, gpio: &'static Gpio, dma: &'static Dma) -> Result<Handle<'_>> {
        self.claim()?;
        let gpio = match self.configure_master(gpio) {
            Ok(gpio) => gpio,
            Err(err) => {
                self.unclaim();
                return Err(err);
            }
        };
        self.commit(Role::Master, gpio, dma);
        debug!("{} master initialized", self.instance.name());
        Ok(Handle { spi: self })
    }

    fn configure_master(&self, gpio: &'static Gpio) -> Result<gpio::Handle<'static>> {
        let div = divider(self.config.clock_hz, self.config.bitrate)?;
        let gpio = gpio.init().map_err(|_| Error::BadGpioConfig)?;
        if let Err(err) = configure_chip_select(gpio, self.instance.default_chip_select(), true)
        {
            let _ = gpio.uninit();
            return Err(err);
        }
        let spi = &self.registers;
        critical_section::with(|_| {
            ral::modify_reg!(ral::spi, spi, SPICON, TFLUSH: 1, RFLUSH: 1);
            ral::write_reg!(ral::spi, spi, SPICON, MASEN: 1, ENABLE: 1);
        });
        ral::write_reg!(ral::spi, spi, SPIDIV, DIV: div);
        spi.SPICNT.write(0);
        spi.SPIDMA.write(0);
        Ok(gpio)
    }

    /// Initialize the instance as a slave, and unmask its interrupt.
    pub fn slave_init(&self, gpio: &'static Gpio, dma: &'static Dma) -> Result<Handle<'_>> {
        self.claim()?;
        let gpio = match gpio.init() {
            Ok(gpio) => gpio,
            Err(_) => {
                self.unclaim();
                return Err(Error::BadGpioConfig);
            }
        };
        let spi = &self.registers;
        critical_section::with(|_| {
            ral::modify_reg!(ral::spi, spi, SPICON, TFLUSH: 1, RFLUSH: 1);
            ral::write_reg!(ral::spi, spi, SPICON, OEN: 1, ZEN: 1, ENABLE: 1);
        });
        spi.SPICNT.write(0);
        self.commit(Role::Slave, gpio, dma);
        interrupt::enable(self.instance.interrupt());
        debug!("{} slave initialized", self.instance.name());
        Ok(Handle { spi: self })
    }

    /// Service the SPI interrupt.
    ///
    /// Tops up the transmit FIFO, drains the receive FIFO, and completes
    /// the transfer once both directions are done.
    pub fn on_interrupt(&self) {
        let spi = &self.registers;
        let queued = ral::read_reg!(ral::spi, spi, SPISTA, TXFSTA);
        let readable = ral::read_reg!(ral::spi, spi, SPISTA, RXFSTA);
        let writable = spi::SPISTA::FIFO_DEPTH.saturating_sub(queued);
        let completion = self.state.lock(|state| {
            if state.progress != Progress::Fifo {
                return None;
            }
            for _ in 0..writable {
                // Safety: the transfer's caller keeps the buffer alive
                // until the transfer completes.
                match unsafe { state.tx.read() } {
                    Some(byte) => spi.SPITX.write(byte as u16),
                    None => break,
                }
            }
            for _ in 0..readable {
                if state.rx.remaining == 0 {
                    break;
                }
                let byte = spi.SPIRX.read() as u8;
                // Safety: as above.
                unsafe { state.rx.write(byte) };
            }
            (state.tx.remaining == 0 && state.rx.remaining == 0).then(|| state.finish())
        });
        if let Some(completion) = completion {
            trace!("{} transfer complete", self.instance.name());
            completion.run();
        }
    }
}

#[cfg(feature = "spi-dma")]
impl Spi {
    /// Arm the next descriptor for one direction.
    fn schedule(&self, dma: &Dma, state: &mut State, direction: Direction) -> Result<()> {
        let spi = &self.registers;
        let (tx_channel, rx_channel) = self.instance.dma_channels();
        let (channel, stream) = match direction {
            Direction::Transmit => (tx_channel, &mut state.tx),
            Direction::Receive => (rx_channel, &mut state.rx),
        };
        let increment = if stream.increment {
            Increment::Up(Width::Halfword)
        } else {
            Increment::None
        };
        let chunk = stream.next_chunk();
        let (source, destination, source_increment, destination_increment) = match direction {
            Direction::Transmit => (
                chunk.address as *const (),
                &spi.SPITX as *const _ as *mut (),
                increment,
                Increment::None,
            ),
            Direction::Receive => (
                &spi.SPIRX as *const _ as *const (),
                chunk.address as *mut (),
                Increment::None,
                increment,
            ),
        };
        let transfer = dma::Transfer {
            channel,
            slot: chunk.slot,
            width: Width::Halfword,
            length: chunk.halfwords,
            source,
            destination,
            source_increment,
            destination_increment,
            protection: Protection::empty(),
            arbitration: 0,
            mode: if chunk.halfwords == 0 {
                Mode::Invalid
            } else {
                Mode::PingPong
            },
        };
        trace!(
            "{} DMA channel {} queued {} halfwords",
            self.instance.name(),
            channel as u8,
            chunk.halfwords
        );
        // Safety: the transfer's caller keeps the buffers alive until the
        // transfer completes. The SPI FIFOs are always valid.
        unsafe { dma.submit(&transfer) }.map_err(|_| Error::BadDmaConfig)
    }

    /// Arm both descriptors of both directions, then let the SPI request
    /// DMA.
    fn start_dma(&self, tx: Stream, rx: Stream) -> Result<()> {
        let armed = self.state.lock(|state| {
            let dma = state.dma.ok_or(Error::BadDmaConfig)?;
            state.tx = tx;
            state.rx = rx;
            state.progress = Progress::Dma;
            let result = [
                Direction::Transmit,
                Direction::Transmit,
                Direction::Receive,
                Direction::Receive,
            ]
            .into_iter()
            .try_for_each(|direction| self.schedule(dma, state, direction));
            if result.is_err() {
                state.progress = Progress::Idle;
            }
            result
        });
        armed?;
        let (tx_irq, rx_irq) = self.instance.dma_interrupts();
        interrupt::enable(tx_irq);
        interrupt::enable(rx_irq);
        let spi = &self.registers;
        critical_section::with(|_| {
            ral::modify_reg!(ral::spi, spi, SPIDMA, IENTXDMA: 1, IENRXDMA: 1);
            ral::modify_reg!(ral::spi, spi, SPIDMA, ENABLE: 1);
        });
        Ok(())
    }

    /// Mask the DMA interrupts and stop the SPI from requesting DMA.
    fn stop_dma(&self) {
        let (tx_irq, rx_irq) = self.instance.dma_interrupts();
        interrupt::disable(tx_irq);
        interrupt::disable(rx_irq);
        let spi = &self.registers;
        critical_section::with(|_| {
            ral::modify_reg!(ral::spi, spi, SPIDMA, ENABLE: 0, IENTXDMA: 0, IENRXDMA: 0)
        });
    }

    fn on_dma_interrupt(&self, direction: Direction) {
        let (tx_channel, rx_channel) = self.instance.dma_channels();
        let channel = match direction {
            Direction::Transmit => tx_channel,
            Direction::Receive => rx_channel,
        };
        let completion = self.state.lock(|state| {
            let dma = state.dma.filter(|_| state.progress == Progress::Dma)?;
            let retired = dma.cycle_mode(channel, Slot::Primary) == Mode::Invalid
                && dma.cycle_mode(channel, Slot::Alternate) == Mode::Invalid;
            if !retired {
                if self.schedule(dma, state, direction).is_err() {
                    warn!("{} couldn't queue the next DMA chunk", self.instance.name());
                }
                None
            } else if direction == Direction::Receive {
                Some(state.finish())
            } else {
                // Reception lags transmission by up to a FIFO. The receive
                // channel completes the transfer.
                None
            }
        });
        if let Some(completion) = completion {
            self.stop_dma();
            trace!("{} DMA transfer complete", self.instance.name());
            completion.run();
        }
    }

    /// Service the instance's transmit DMA interrupt.
    pub fn on_dma_tx_interrupt(&self) {
        self.on_dma_interrupt(Direction::Transmit);
    }

    /// Service the instance's receive DMA interrupt.
    pub fn on_dma_rx_interrupt(&self) {
        self.on_dma_interrupt(Direction::Receive);
    }
}

/// A handle to an initialized SPI instance.
#[derive(Clone, Copy)]
pub struct Handle<'a> {
    spi: &'a Spi,
}

impl<'a> Handle<'a> {
    fn registers(&self) -> Result<&'a spi::RegisterBlock> {
        self.in_role(|_| true)
    }

    fn in_role(&self, accept: impl FnOnce(Role) -> bool) -> Result<&'a spi::RegisterBlock> {
        let spi = self.spi;
        if spi.state.lock(|state| state.role.is_some_and(accept)) {
            Ok(&*spi.registers)
        } else {
            Err(Error::NotInitialized)
        }
    }

    fn gpio(&self) -> Result<gpio::Handle<'static>> {
        self.spi
            .state
            .lock(|state| state.gpio)
            .ok_or(Error::NotInitialized)
    }

    fn is_idle(&self) -> bool {
        self.spi
            .state
            .lock(|state| state.progress == Progress::Idle)
    }

    /// Sleep until the current transfer completes.
    fn wait_idle(&self) {
        while !self.is_idle() {
            interrupt::wait_for_interrupt();
        }
    }

    /// Disable the instance, and release DMA and GPIO.
    pub fn uninit(self) -> Result<()> {
        let spi = self.registers()?;
        interrupt::disable(self.spi.instance.interrupt());
        self.close_dma()?;
        self.gpio()?.uninit().map_err(|_| Error::BadGpioConfig)?;
        spi.SPICON.write(0);
        self.spi.state.lock(|state| {
            state.claimed = false;
            state.role = None;
            state.gpio = None;
            state.dma = None;
            state.progress = Progress::Idle;
            state.callback = None;
        });
        debug!("{} uninitialized", self.spi.instance.name());
        Ok(())
    }

    pub fn register_callback(&self, callback: Option<Callback<Event>>) -> Result<()> {
        self.registers()?;
        self.spi.state.lock(|state| state.callback = callback);
        Ok(())
    }

    pub fn set_interrupt_mode(&self, mode: InterruptMode) -> Result<()> {
        let spi = self.registers()?;
        critical_section::with(|_| ral::modify_reg!(ral::spi, spi, SPICON, MOD: mode as u16));
        Ok(())
    }

    pub fn interrupt_mode(&self) -> Result<InterruptMode> {
        let mode = match ral::read_reg!(ral::spi, self.registers()?, SPICON, MOD) {
            0 => InterruptMode::Tx1Rx1,
            1 => InterruptMode::Tx2Rx2,
            2 => InterruptMode::Tx3Rx3,
            _ => InterruptMode::Tx4Rx4,
        };
        Ok(mode)
    }

    /// Set the master bitrate.
    ///
    /// Returns [`Error::ParamOutOfRange`] if the rate isn't below half the
    /// input clock, or if it's too slow for the divider.
    pub fn set_bitrate(&self, hertz: u32) -> Result<()> {
        let spi = self.registers()?;
        let div = divider(self.spi.config.clock_hz, hertz)?;
        critical_section::with(|_| ral::modify_reg!(ral::spi, spi, SPIDIV, DIV: div));
        Ok(())
    }

    /// The bitrate that the divider actually produces.
    pub fn bitrate(&self) -> Result<u32> {
        let div = ral::read_reg!(ral::spi, self.registers()?, SPIDIV, DIV);
        Ok(self.spi.config.clock_hz / (u32::from(div) + 1) / 2)
    }

    /// Move the chip select to another pin.
    ///
    /// The old pin goes back to an input, the new pin idles high.
    pub fn set_chip_select(&self, chip_select: ChipSelect) -> Result<()> {
        self.registers()?;
        let gpio = self.gpio()?;
        let old = self.spi.state.lock(|state| state.chip_select);
        configure_chip_select(gpio, old, false)?;
        self.spi
            .state
            .lock(|state| state.chip_select = chip_select);
        configure_chip_select(gpio, chip_select, true)
    }

    pub fn chip_select(&self) -> Result<ChipSelect> {
        self.registers()?;
        Ok(self.spi.state.lock(|state| state.chip_select))
    }

    pub fn set_blocking_mode(&self, blocking: bool) -> Result<()> {
        self.registers()?;
        self.spi.state.lock(|state| state.blocking = blocking);
        Ok(())
    }

    pub fn blocking_mode(&self) -> Result<bool> {
        self.registers()?;
        Ok(self.spi.state.lock(|state| state.blocking))
    }

    /// Switch between FIFO and DMA transfers.
    ///
    /// DMA mode opens the instance's two DMA channels. Without the
    /// `spi-dma` feature, enabling DMA returns [`Error::NotSupported`].
    pub fn set_dma_mode(&self, enable: bool) -> Result<()> {
        self.registers()?;
        if enable && !cfg!(feature = "spi-dma") {
            return Err(Error::NotSupported);
        }
        if !self.is_idle() {
            return Err(Error::Busy);
        }
        self.close_dma()?;
        if enable {
            self.open_dma()?;
        }
        Ok(())
    }

    pub fn dma_mode(&self) -> Result<bool> {
        self.registers()?;
        Ok(self.spi.state.lock(|state| state.dma_mode))
    }

    fn open_dma(&self) -> Result<()> {
        let dma = self
            .spi
            .state
            .lock(|state| state.dma)
            .ok_or(Error::NotInitialized)?;
        let (tx, rx) = self.spi.instance.dma_channels();
        dma.init(tx, dma::Priority::Default)
            .map_err(|_| Error::BadDmaConfig)?;
        if dma.init(rx, dma::Priority::Default).is_err() {
            let _ = dma.uninit(tx);
            return Err(Error::BadDmaConfig);
        }
        self.spi.state.lock(|state| state.dma_mode = true);
        Ok(())
    }

    fn close_dma(&self) -> Result<()> {
        let (dma, dma_mode) = self.spi.state.lock(|state| (state.dma, state.dma_mode));
        let Some(dma) = dma.filter(|_| dma_mode) else {
            return Ok(());
        };
        let spi = self.registers()?;
        let (tx_irq, rx_irq) = self.spi.instance.dma_interrupts();
        interrupt::disable(tx_irq);
        interrupt::disable(rx_irq);
        critical_section::with(|_| {
            ral::modify_reg!(ral::spi, spi, SPIDMA, ENABLE: 0, IENTXDMA: 0, IENRXDMA: 0)
        });
        let (tx, rx) = self.spi.instance.dma_channels();
        let closed = dma.uninit(tx).and(dma.uninit(rx));
        self.spi.state.lock(|state| state.dma_mode = false);
        closed.map_err(|_| Error::BadDmaConfig)
    }

    pub fn set_generic_settings(&self, settings: &GenericSettings) -> Result<()> {
        self.set_bitrate(settings.bitrate)?;
        self.set_dma_mode(settings.dma)?;
        if self.chip_select()? != settings.chip_select {
            self.set_chip_select(settings.chip_select)?;
        }
        self.set_blocking_mode(settings.blocking)
    }

    pub fn generic_settings(&self) -> Result<GenericSettings> {
        Ok(GenericSettings {
            bitrate: self.bitrate()?,
            chip_select: self.chip_select()?,
            blocking: self.blocking_mode()?,
            dma: self.dma_mode()?,
        })
    }

    /// Shared checks before a transfer. Returns the data length.
    fn prepare(&self, spi: &spi::RegisterBlock, transfer: &Transceive<'_>) -> Result<usize> {
        let (dma_mode, progress) = self
            .spi
            .state
            .lock(|state| (state.dma_mode, state.progress));
        let len = transfer.data_len(if dma_mode { 2 } else { 1 })?;
        if progress != Progress::Idle {
            return Err(Error::Busy);
        }
        if dma_mode {
            if len % 2 != 0 {
                return Err(Error::ParamOutOfRange);
            }
            if ral::read_reg!(ral::spi, spi, SPIDMA, ENABLE == 1) {
                return Err(Error::DmaAlreadyInUse);
            }
        }
        Ok(len)
    }

    /// Start a master transfer.
    ///
    /// Selects the slave, sends the prologue by polling, then exchanges the
    /// data through the FIFO interrupt or DMA. The chip select releases
    /// when the transfer completes. With no data, it releases right after
    /// the prologue.
    ///
    /// # Safety
    ///
    /// Unless the instance is in blocking mode, the transfer continues
    /// after this call returns. The hardware keeps reading `tx` and writing
    /// `rx` until [`master_complete`](Self::master_complete) returns
    /// `true`. Keep both buffers alive, and don't touch them, until then.
    pub unsafe fn master_transfer(&self, transfer: Transceive<'_>) -> Result<()> {
        let spi = self.in_role(|role| role == Role::Master)?;
        let len = self.prepare(spi, &transfer)?;
        let irq = self.spi.instance.interrupt();
        let (gpio, cs, dma_mode, blocking) = self.spi.state.lock(|state| {
            (state.gpio, state.chip_select, state.dma_mode, state.blocking)
        });
        let gpio = gpio.ok_or(Error::NotInitialized)?;

        interrupt::disable(irq);
        let _ = spi.SPISTA.read();
        select(gpio, cs, true)?;

        if !transfer.prologue.is_empty() {
            for &byte in transfer.prologue {
                while ral::read_reg!(ral::spi, spi, SPISTA, TXFSTA) >= spi::SPISTA::FIFO_DEPTH {
                    core::hint::spin_loop();
                }
                spi.SPITX.write(byte as u16);
                while ral::read_reg!(ral::spi, spi, SPISTA, RXFSTA) == 0 {
                    core::hint::spin_loop();
                }
                let _ = spi.SPIRX.read();
            }
            critical_section::with(|_| {
                ral::modify_reg!(ral::spi, spi, SPICON, TFLUSH: 1, RFLUSH: 1);
                ral::modify_reg!(ral::spi, spi, SPICON, TFLUSH: 0, RFLUSH: 0);
            });
            interrupt::unpend(irq);
        }

        if len == 0 {
            return select(gpio, cs, false);
        }

        let tx = Stream::new(transfer.tx.as_ptr() as usize, len, transfer.tx_increment);
        let rx = Stream::new(
            transfer.rx.as_mut_ptr() as usize,
            len,
            transfer.rx_increment,
        );

        #[cfg(feature = "spi-dma")]
        if dma_mode {
            let limit = if len <= spi::SPICNT::COUNT::mask as usize {
                len as u16
            } else {
                0
            };
            spi.SPICNT.write(limit);
            critical_section::with(|_| ral::modify_reg!(ral::spi, spi, SPICON, TIM: 1));
            if let Err(err) = self.spi.start_dma(tx, rx) {
                let _ = select(gpio, cs, false);
                return Err(err);
            }
            if blocking {
                self.wait_idle();
            }
            return Ok(());
        }
        #[cfg(not(feature = "spi-dma"))]
        let _ = dma_mode;

        critical_section::with(|_| ral::modify_reg!(ral::spi, spi, SPICON, TIM: 0));
        let first = self.spi.state.lock(|state| {
            state.tx = tx;
            state.rx = rx;
            state.progress = Progress::Fifo;
            // Safety: see function contract.
            unsafe { state.tx.read() }
        });
        interrupt::enable(irq);
        if let Some(byte) = first {
            spi.SPITX.write(byte as u16);
        }
        let _ = spi.SPIRX.read();
        if blocking {
            self.wait_idle();
        }
        Ok(())
    }

    /// Returns `true` once the last master transfer completed.
    pub fn master_complete(&self) -> Result<bool> {
        self.in_role(|role| role == Role::Master)?;
        Ok(self.is_idle())
    }

    /// Queue a slave transfer for the master to clock out.
    ///
    /// Slave transfers have no prologue, and must carry data.
    ///
    /// # Safety
    ///
    /// See [`master_transfer`](Self::master_transfer). The buffers must
    /// stay alive until [`slave_complete`](Self::slave_complete) returns
    /// `true`.
    pub unsafe fn slave_transfer(&self, transfer: Transceive<'_>) -> Result<()> {
        let spi = self.in_role(|role| role == Role::Slave)?;
        if !transfer.prologue.is_empty() {
            return Err(Error::InvalidBuffer);
        }
        let len = self.prepare(spi, &transfer)?;
        if len == 0 {
            return Err(Error::ParamOutOfRange);
        }
        let (dma_mode, blocking) = self
            .spi
            .state
            .lock(|state| (state.dma_mode, state.blocking));
        critical_section::with(|_| ral::modify_reg!(ral::spi, spi, SPICON, ENABLE: 1));

        let tx = Stream::new(transfer.tx.as_ptr() as usize, len, transfer.tx_increment);
        let rx = Stream::new(
            transfer.rx.as_mut_ptr() as usize,
            len,
            transfer.rx_increment,
        );

        #[cfg(feature = "spi-dma")]
        if dma_mode {
            interrupt::disable(self.spi.instance.interrupt());
            let limit = if len <= spi::SPICNT::COUNT::mask as usize {
                len as u16
            } else {
                0
            };
            spi.SPICNT.write(limit);
            if let Err(err) = self.spi.start_dma(tx, rx) {
                interrupt::enable(self.spi.instance.interrupt());
                return Err(err);
            }
            if blocking {
                self.wait_idle();
            }
            return Ok(());
        }
        #[cfg(not(feature = "spi-dma"))]
        let _ = dma_mode;

        self.spi.state.lock(|state| {
            state.tx = tx;
            state.rx = rx;
            state.progress = Progress::Fifo;
            for _ in 0..spi::SPISTA::FIFO_DEPTH {
                // Safety: see function contract.
                match unsafe { state.tx.read() } {
                    Some(byte) => spi.SPITX.write(byte as u16),
                    None => break,
                }
            }
            let _ = spi.SPIRX.read();
        });
        if blocking {
            self.wait_idle();
        }
        Ok(())
    }

    /// Returns `true` once the last slave transfer completed.
    pub fn slave_complete(&self) -> Result<bool> {
        self.in_role(|role| role == Role::Slave)?;
        Ok(self.is_idle())
    }

    /// Returns `true` once the last DMA transfer completed, in either
    /// role.
    pub fn dma_complete(&self) -> Result<bool> {
        self.registers()?;
        Ok(self.is_idle())
    }
}

/// Generate a setter and getter for a one-bit `SPICON` field.
macro_rules! spicon_flags {
    ($(
        $(#[$meta:meta])*
        $field:ident => $set:ident, $get:ident;
    )*) => {
        impl Handle<'_> {
            $(
                $(#[$meta])*
                pub fn $set(&self, enable: bool) -> Result<()> {
                    let spi = self.registers()?;
                    critical_section::with(|_| {
                        ral::modify_reg!(ral::spi, spi, SPICON, $field: enable as u16)
                    });
                    Ok(())
                }

                pub fn $get(&self) -> Result<bool> {
                    Ok(ral::read_reg!(ral::spi, self.registers()?, SPICON, $field == 1))
                }
            )*
        }
    };
}

spicon_flags! {
    /// Hold the transmit FIFO in flush.
    TFLUSH => set_tx_flush, tx_flush;
    /// Hold the receive FIFO in flush.
    RFLUSH => set_rx_flush, rx_flush;
    /// Keep the hardware chip select asserted between bytes.
    CON => set_continuous_mode, continuous_mode;
    /// Connect MISO to MOSI internally.
    LOOPBACK => set_loopback, loopback;
    /// Drive MISO. Slaves sharing the bus must leave this off.
    OEN => set_miso_output, miso_output;
    /// Overwrite the receive FIFO when it's full.
    RXOF => set_receive_overflow, receive_overflow;
    /// Send zeros when the transmit FIFO underflows, instead of the last
    /// byte.
    ZEN => set_transmit_underflow, transmit_underflow;
    /// Start transfers on a transmit FIFO write, instead of a receive FIFO
    /// read.
    TIM => set_transfer_initiate_mode, transfer_initiate_mode;
    LSB => set_lsb_first, lsb_first;
    /// Open drain outputs.
    WOM => set_wired_or_mode, wired_or_mode;
    /// Idle the clock high.
    CPOL => set_clock_polarity, clock_polarity;
    /// Sample on the trailing clock edge.
    CPHA => set_clock_phase, clock_phase;
    MASEN => set_master_mode, master_mode;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dma::tests as dma_tests;
    use crate::gpio::tests as gpio_tests;
    use crate::ral::testing;
    use core::sync::atomic::{AtomicUsize, Ordering};

    struct Bench {
        spi: &'static Spi,
        regs: &'static spi::RegisterBlock,
        ports: &'static crate::ral::gpio::Ports,
        gpio: &'static Gpio,
        dma: &'static Dma,
        dma_regs: &'static crate::ral::dma::RegisterBlock,
    }

    fn bench() -> Bench {
        let regs = testing::block::<spi::RegisterBlock>();
        // Safety: test-owned memory.
        let spi = unsafe { Spi::new(Instance::Spi0, regs as *const _ as *const ()) };
        let (gpio, ports, _) = gpio_tests::gpio();
        let (dma, dma_regs) = dma_tests::dma();
        dma_tests::hardware_enable(dma_regs);
        Bench {
            spi: Box::leak(Box::new(spi)),
            regs,
            ports,
            gpio,
            dma,
            dma_regs,
        }
    }

    const CS: u16 = 1 << 3;

    fn rx_fifo(regs: &spi::RegisterBlock, queued_tx: u16, queued_rx: u16) {
        testing::poke(
            &regs.SPISTA,
            (queued_tx << spi::SPISTA::TXFSTA::offset) | (queued_rx << spi::SPISTA::RXFSTA::offset),
        );
    }

    #[test]
    fn master_init_and_uninit() {
        let b = bench();
        let handle = b.spi.master_init(b.gpio, b.dma).unwrap();
        assert_eq!(
            b.regs.SPICON.read(),
            spi::SPICON::MASEN::mask | spi::SPICON::ENABLE::mask
        );
        assert_eq!(b.regs.SPIDIV.read(), 31);
        assert_eq!(handle.bitrate().unwrap(), 250_000);
        assert!(handle.master_mode().unwrap());
        assert!(!handle.dma_mode().unwrap());
        assert!(!handle.blocking_mode().unwrap());
        assert!(!interrupt::is_enabled(Interrupt::Spi0));

        assert_eq!(b.ports[3].GPOEN.read(), CS);
        assert_eq!(b.ports[3].GPPE.read(), CS);
        assert_eq!(testing::peek::<_, u16>(&b.ports[3].GPSET), CS);
        assert_eq!(
            handle.chip_select().unwrap(),
            Instance::Spi0.default_chip_select()
        );

        assert!(matches!(
            b.spi.master_init(b.gpio, b.dma),
            Err(Error::AlreadyInitialized)
        ));
        assert!(matches!(
            b.spi.slave_init(b.gpio, b.dma),
            Err(Error::AlreadyInitialized)
        ));

        handle.uninit().unwrap();
        assert_eq!(b.regs.SPICON.read(), 0);
        assert_eq!(handle.bitrate(), Err(Error::NotInitialized));
        assert_eq!(handle.loopback(), Err(Error::NotInitialized));
        assert_eq!(handle.uninit(), Err(Error::NotInitialized));
        // Released its GPIO user, so it can start over.
        assert!(b.spi.master_init(b.gpio, b.dma).is_ok());
    }

    #[test]
    fn control_flags_round_trip() {
        let b = bench();
        let handle = b.spi.master_init(b.gpio, b.dma).unwrap();

        handle.set_loopback(true).unwrap();
        handle.set_clock_phase(true).unwrap();
        handle.set_lsb_first(true).unwrap();
        assert!(handle.loopback().unwrap());
        assert!(handle.clock_phase().unwrap());
        assert!(handle.lsb_first().unwrap());
        assert!(!handle.clock_polarity().unwrap());
        assert!(!handle.wired_or_mode().unwrap());
        assert_eq!(
            b.regs.SPICON.read(),
            spi::SPICON::MASEN::mask
                | spi::SPICON::ENABLE::mask
                | spi::SPICON::LOOPBACK::mask
                | spi::SPICON::CPHA::mask
                | spi::SPICON::LSB::mask
        );
        handle.set_loopback(false).unwrap();
        assert!(!handle.loopback().unwrap());

        handle.set_interrupt_mode(InterruptMode::Tx3Rx3).unwrap();
        assert_eq!(handle.interrupt_mode().unwrap(), InterruptMode::Tx3Rx3);
        assert_eq!(b.regs.SPICON.read() >> 14, 2);
    }

    #[test]
    fn bitrate_limits() {
        let b = bench();
        let handle = b.spi.master_init(b.gpio, b.dma).unwrap();
        handle.set_bitrate(4_000_000).unwrap();
        assert_eq!(b.regs.SPIDIV.read(), 1);
        assert_eq!(handle.bitrate().unwrap(), 4_000_000);
        // Must stay below half the clock.
        assert_eq!(handle.set_bitrate(8_000_000), Err(Error::ParamOutOfRange));
        // Too slow for the divider.
        assert_eq!(handle.set_bitrate(100_000), Err(Error::ParamOutOfRange));
        assert_eq!(handle.set_bitrate(0), Err(Error::ParamOutOfRange));
        assert_eq!(handle.bitrate().unwrap(), 4_000_000);
    }

    #[test]
    fn chip_select_moves() {
        let b = bench();
        let handle = b.spi.master_init(b.gpio, b.dma).unwrap();
        let cs = ChipSelect {
            port: Port::Port1,
            pins: Pins::PIN2,
        };
        handle.set_chip_select(cs).unwrap();
        assert_eq!(handle.chip_select().unwrap(), cs);
        assert_eq!(b.ports[3].GPOEN.read(), 0);
        assert_eq!(b.ports[3].GPPE.read(), 0);
        assert_eq!(b.ports[1].GPOEN.read(), 1 << 2);

        let settings = handle.generic_settings().unwrap();
        assert_eq!(
            settings,
            GenericSettings {
                bitrate: 250_000,
                chip_select: cs,
                blocking: false,
                dma: false,
            }
        );
        handle
            .set_generic_settings(&GenericSettings {
                bitrate: 1_000_000,
                chip_select: Instance::Spi0.default_chip_select(),
                ..settings
            })
            .unwrap();
        assert_eq!(handle.bitrate().unwrap(), 1_000_000);
        assert_eq!(b.ports[3].GPOEN.read(), CS);
        assert_eq!(b.ports[1].GPOEN.read(), 0);
    }

    #[test]
    fn transfer_validation() {
        let b = bench();
        let handle = b.spi.master_init(b.gpio, b.dma).unwrap();
        let tx = [0u8; 4];
        let mut rx = [0u8; 3];
        // Safety: rejected before touching the buffers.
        let result = unsafe { handle.master_transfer(Transceive::new(&tx, &mut rx)) };
        assert_eq!(result, Err(Error::InvalidBuffer));

        let mut empty = [0u8; 0];
        let fixed = Transceive {
            prologue: &[],
            tx: &tx,
            rx: &mut empty,
            tx_increment: true,
            rx_increment: false,
        };
        // Safety: as above.
        let result = unsafe { handle.master_transfer(fixed) };
        assert_eq!(result, Err(Error::InvalidBuffer));

        let mut rx = [0u8; 4];
        // Safety: as above.
        let result = unsafe { handle.slave_transfer(Transceive::new(&tx, &mut rx)) };
        assert_eq!(result, Err(Error::NotInitialized));
    }

    #[test]
    fn prologue_without_data() {
        let b = bench();
        let handle = b.spi.master_init(b.gpio, b.dma).unwrap();
        testing::poke(&b.ports[3].GPSET, 0u16);
        rx_fifo(b.regs, 0, 1);

        let mut rx = [0u8; 0];
        let transfer = Transceive::new(&[], &mut rx).with_prologue(&[0x9f, 0x01]);
        // Safety: no data, so nothing outlives the call.
        unsafe { handle.master_transfer(transfer) }.unwrap();

        assert_eq!(testing::peek::<_, u16>(&b.regs.SPITX), 0x01);
        assert_eq!(testing::peek::<_, u16>(&b.ports[3].GPCLR), CS);
        assert_eq!(testing::peek::<_, u16>(&b.ports[3].GPSET), CS);
        let flush = spi::SPICON::TFLUSH::mask | spi::SPICON::RFLUSH::mask;
        assert_eq!(b.regs.SPICON.read() & flush, 0);
        assert!(handle.master_complete().unwrap());
    }

    #[test]
    fn fifo_master_transfer_completes_once() {
        static DONE: AtomicUsize = AtomicUsize::new(0);
        let b = bench();
        let handle = b.spi.master_init(b.gpio, b.dma).unwrap();
        handle
            .register_callback(Some(&|event| {
                assert_eq!(event, Event::TransferComplete);
                DONE.fetch_add(1, Ordering::Relaxed);
            }))
            .unwrap();

        let tx = [1u8, 2, 3, 4, 5];
        let mut rx = [0u8; 5];
        testing::poke(&b.regs.SPIRX, 0xa5u16);
        // Safety: both buffers outlive the transfer.
        unsafe { handle.master_transfer(Transceive::new(&tx, &mut rx)) }.unwrap();
        assert_eq!(testing::peek::<_, u16>(&b.regs.SPITX), 1);
        assert_eq!(testing::peek::<_, u16>(&b.ports[3].GPCLR), CS);
        assert_eq!(b.regs.SPICON.read() & spi::SPICON::TIM::mask, 0);
        assert!(interrupt::is_enabled(Interrupt::Spi0));
        assert!(!handle.master_complete().unwrap());

        let mut again = [0u8; 5];
        // Safety: rejected while busy.
        let busy = unsafe { handle.master_transfer(Transceive::new(&tx, &mut again)) };
        assert_eq!(busy, Err(Error::Busy));

        testing::poke(&b.ports[3].GPSET, 0u16);
        rx_fifo(b.regs, 0, 4);
        b.spi.on_interrupt();
        assert_eq!(testing::peek::<_, u16>(&b.regs.SPITX), 5);
        assert!(!handle.master_complete().unwrap());
        assert_eq!(DONE.load(Ordering::Relaxed), 0);

        rx_fifo(b.regs, 0, 1);
        b.spi.on_interrupt();
        assert!(handle.master_complete().unwrap());
        assert_eq!(DONE.load(Ordering::Relaxed), 1);
        assert_eq!(testing::peek::<_, u16>(&b.ports[3].GPSET), CS);

        b.spi.on_interrupt();
        assert_eq!(DONE.load(Ordering::Relaxed), 1);
        assert_eq!(rx, [0xa5; 5]);
    }

    #[test]
    fn fifo_slave_transfer() {
        static DONE: AtomicUsize = AtomicUsize::new(0);
        let b = bench();
        let handle = b.spi.slave_init(b.gpio, b.dma).unwrap();
        assert_eq!(
            b.regs.SPICON.read(),
            spi::SPICON::OEN::mask | spi::SPICON::ZEN::mask | spi::SPICON::ENABLE::mask
        );
        assert!(interrupt::is_enabled(Interrupt::Spi0));
        handle
            .register_callback(Some(&|_| {
                DONE.fetch_add(1, Ordering::Relaxed);
            }))
            .unwrap();

        let tx = [10u8, 11, 12, 13, 14, 15];
        let mut rx = [0u8; 6];
        let transfer = Transceive::new(&tx, &mut rx).with_prologue(&[1]);
        // Safety: rejected before touching the buffers.
        let result = unsafe { handle.slave_transfer(transfer) };
        assert_eq!(result, Err(Error::InvalidBuffer));
        let mut empty = [0u8; 0];
        // Safety: as above.
        let result = unsafe { handle.slave_transfer(Transceive::new(&[], &mut empty)) };
        assert_eq!(result, Err(Error::ParamOutOfRange));

        let mut rx = [0u8; 6];
        testing::poke(&b.regs.SPIRX, 0x3cu16);
        // Safety: both buffers outlive the transfer.
        unsafe { handle.slave_transfer(Transceive::new(&tx, &mut rx)) }.unwrap();
        // Preloaded a full FIFO.
        assert_eq!(testing::peek::<_, u16>(&b.regs.SPITX), 13);
        assert!(!handle.slave_complete().unwrap());

        rx_fifo(b.regs, 2, 4);
        b.spi.on_interrupt();
        assert_eq!(testing::peek::<_, u16>(&b.regs.SPITX), 15);
        rx_fifo(b.regs, 0, 2);
        b.spi.on_interrupt();
        assert!(handle.slave_complete().unwrap());
        assert_eq!(DONE.load(Ordering::Relaxed), 1);
        assert_eq!(rx, [0x3c; 6]);
        // Slaves don't touch the chip select.
        assert_eq!(testing::peek::<_, u16>(&b.ports[3].GPCLR), 0);
    }

    #[cfg(not(feature = "spi-dma"))]
    #[test]
    fn dma_mode_needs_feature() {
        let b = bench();
        let handle = b.spi.master_init(b.gpio, b.dma).unwrap();
        assert_eq!(handle.set_dma_mode(true), Err(Error::NotSupported));
    }

    #[cfg(feature = "spi-dma")]
    #[test]
    fn chunks_cover_the_transfer() {
        for len in [2, 64, 510, 512, 514, 1024, 1200, 4096] {
            let base = 0x2000_0000;
            let mut stream = Stream::new(base, len, true);
            let mut covered = 0;
            let mut slot = Slot::Primary;
            loop {
                let chunk = stream.next_chunk();
                assert_eq!(chunk.slot, slot);
                slot = slot.other();
                assert!(chunk.halfwords <= MAX_DMA_CHUNK);
                if chunk.halfwords == 0 {
                    break;
                }
                assert_eq!(chunk.address, base + covered);
                covered += chunk.halfwords * 2;
            }
            assert_eq!(covered, len);
            assert_eq!(stream.remaining, 0);
            // Drained streams stay drained.
            assert_eq!(stream.next_chunk().halfwords, 0);
        }

        let mut fixed = Stream::new(0x2000_0000, 1024, false);
        assert_eq!(fixed.next_chunk().halfwords, MAX_DMA_CHUNK);
        assert_eq!(fixed.next_chunk().address, 0x2000_0000);
    }

    #[cfg(feature = "spi-dma")]
    #[test]
    fn dma_mode_opens_channels() {
        let b = bench();
        let handle = b.spi.master_init(b.gpio, b.dma).unwrap();
        handle.set_dma_mode(true).unwrap();
        assert!(handle.dma_mode().unwrap());
        assert!(b.dma.is_open(dma::Channel::Spi0Tx));
        assert!(b.dma.is_open(dma::Channel::Spi0Rx));

        let tx = [0u8; 3];
        let mut rx = [0u8; 3];
        // Safety: rejected before touching the buffers.
        let odd = unsafe { handle.master_transfer(Transceive::new(&tx, &mut rx)) };
        assert_eq!(odd, Err(Error::ParamOutOfRange));

        b.regs.SPIDMA.write(spi::SPIDMA::ENABLE::mask);
        let tx = [0u8; 4];
        let mut rx = [0u8; 4];
        // Safety: as above.
        let in_use = unsafe { handle.master_transfer(Transceive::new(&tx, &mut rx)) };
        assert_eq!(in_use, Err(Error::DmaAlreadyInUse));
        b.regs.SPIDMA.write(0);

        handle.set_dma_mode(false).unwrap();
        assert!(!b.dma.is_open(dma::Channel::Spi0Tx));
        assert!(!b.dma.is_open(dma::Channel::Spi0Rx));
    }

    #[cfg(feature = "spi-dma")]
    #[test]
    fn slave_dma_failure_reaches_the_caller() {
        let b = bench();
        let handle = b.spi.slave_init(b.gpio, b.dma).unwrap();
        handle.set_dma_mode(true).unwrap();
        // The controller stops reporting that it's enabled.
        testing::poke(&b.dma_regs.DMASTA, 0u32);

        let tx = [0u8; 8];
        let mut rx = [0u8; 8];
        // Safety: both buffers outlive the call.
        let result = unsafe { handle.slave_transfer(Transceive::new(&tx, &mut rx)) };
        assert_eq!(result, Err(Error::BadDmaConfig));
        assert!(handle.slave_complete().unwrap());
        assert!(interrupt::is_enabled(Interrupt::Spi0));
        assert_eq!(b.regs.SPIDMA.read(), 0);

        dma_tests::hardware_enable(b.dma_regs);
        // Safety: as above.
        unsafe { handle.slave_transfer(Transceive::new(&tx, &mut rx)) }.unwrap();
        assert!(!handle.slave_complete().unwrap());
    }

    #[cfg(feature = "spi-dma")]
    #[test]
    fn dma_single_descriptor() {
        static DONE: AtomicUsize = AtomicUsize::new(0);
        let b = bench();
        let handle = b.spi.master_init(b.gpio, b.dma).unwrap();
        handle.set_dma_mode(true).unwrap();
        handle
            .register_callback(Some(&|_| {
                DONE.fetch_add(1, Ordering::Relaxed);
            }))
            .unwrap();

        let tx = [0u16; 50];
        let mut rx = [0u16; 50];
        // Safety: byte views of the same halfword buffers.
        let tx_bytes = unsafe { core::slice::from_raw_parts(tx.as_ptr().cast::<u8>(), 100) };
        // Safety: as above.
        let rx_bytes =
            unsafe { core::slice::from_raw_parts_mut(rx.as_mut_ptr().cast::<u8>(), 100) };
        // Safety: both buffers outlive the transfer.
        unsafe { handle.master_transfer(Transceive::new(tx_bytes, rx_bytes)) }.unwrap();
        assert_eq!(b.regs.SPICNT.read(), 100);

        let rx_channel = dma::Channel::Spi0Rx;
        assert_eq!(b.dma.cycle_mode(rx_channel, Slot::Primary), Mode::PingPong);
        assert_eq!(b.dma.remaining(rx_channel, Slot::Primary).unwrap(), 50);
        assert_eq!(b.dma.cycle_mode(rx_channel, Slot::Alternate), Mode::Invalid);

        dma_tests::retire(b.dma, rx_channel, Slot::Primary);
        b.spi.on_dma_rx_interrupt();
        assert_eq!(DONE.load(Ordering::Relaxed), 1);
        assert!(handle.master_complete().unwrap());
        assert_eq!(b.regs.SPIDMA.read(), 0);
    }

    #[cfg(feature = "spi-dma")]
    #[test]
    fn dma_ping_pong_completes_once() {
        static DONE: AtomicUsize = AtomicUsize::new(0);
        let b = bench();
        let handle = b.spi.master_init(b.gpio, b.dma).unwrap();
        handle.set_dma_mode(true).unwrap();
        handle
            .register_callback(Some(&|_| {
                DONE.fetch_add(1, Ordering::Relaxed);
            }))
            .unwrap();

        // 600 halfwords: two full chunks, then 88.
        let tx = vec![0u16; 600];
        let mut rx = vec![0u16; 600];
        // Safety: byte views of the same halfword buffers.
        let tx_bytes = unsafe { core::slice::from_raw_parts(tx.as_ptr().cast::<u8>(), 1200) };
        // Safety: as above.
        let rx_bytes =
            unsafe { core::slice::from_raw_parts_mut(rx.as_mut_ptr().cast::<u8>(), 1200) };
        testing::poke(&b.ports[3].GPSET, 0u16);
        // Safety: both buffers outlive the transfer.
        unsafe { handle.master_transfer(Transceive::new(tx_bytes, rx_bytes)) }.unwrap();

        // Spans several descriptors, so no count limit.
        assert_eq!(b.regs.SPICNT.read(), 0);
        assert_ne!(b.regs.SPICON.read() & spi::SPICON::TIM::mask, 0);
        assert_eq!(
            b.regs.SPIDMA.read(),
            spi::SPIDMA::ENABLE::mask | spi::SPIDMA::IENTXDMA::mask | spi::SPIDMA::IENRXDMA::mask
        );
        assert!(interrupt::is_enabled(Interrupt::DmaSpi0Tx));
        assert!(interrupt::is_enabled(Interrupt::DmaSpi0Rx));

        let mut scheduled = 0;
        for channel in [dma::Channel::Spi0Tx, dma::Channel::Spi0Rx] {
            for slot in [Slot::Primary, Slot::Alternate] {
                assert_eq!(b.dma.cycle_mode(channel, slot), Mode::PingPong);
                assert_eq!(b.dma.remaining(channel, slot).unwrap(), MAX_DMA_CHUNK);
            }
        }

        let mut step = |channel: dma::Channel, slot: Slot| {
            dma_tests::retire(b.dma, channel, slot);
            if channel == dma::Channel::Spi0Tx {
                b.spi.on_dma_tx_interrupt();
            } else {
                b.spi.on_dma_rx_interrupt();
            }
            if b.dma.cycle_mode(channel, slot) == Mode::PingPong {
                scheduled += b.dma.remaining(channel, slot).unwrap();
            }
        };

        // Transmit finishes first, and never completes the transfer.
        step(dma::Channel::Spi0Tx, Slot::Primary);
        step(dma::Channel::Spi0Tx, Slot::Alternate);
        step(dma::Channel::Spi0Tx, Slot::Primary);
        assert_eq!(DONE.load(Ordering::Relaxed), 0);
        assert!(!handle.master_complete().unwrap());

        step(dma::Channel::Spi0Rx, Slot::Primary);
        assert_eq!(
            b.dma.remaining(dma::Channel::Spi0Rx, Slot::Primary).unwrap(),
            88
        );
        step(dma::Channel::Spi0Rx, Slot::Alternate);
        assert_eq!(
            b.dma.cycle_mode(dma::Channel::Spi0Rx, Slot::Alternate),
            Mode::Invalid
        );
        assert_eq!(DONE.load(Ordering::Relaxed), 0);
        step(dma::Channel::Spi0Rx, Slot::Primary);

        // Each direction refilled one 88 halfword chunk.
        assert_eq!(scheduled, 2 * 88);
        assert_eq!(DONE.load(Ordering::Relaxed), 1);
        assert!(handle.master_complete().unwrap());
        assert!(handle.dma_complete().unwrap());
        assert_eq!(b.regs.SPIDMA.read(), 0);
        assert!(!interrupt::is_enabled(Interrupt::DmaSpi0Rx));
        assert_eq!(testing::peek::<_, u16>(&b.ports[3].GPSET), CS);

        b.spi.on_dma_rx_interrupt();
        b.spi.on_dma_tx_interrupt();
        assert_eq!(DONE.load(Ordering::Relaxed), 1);
    }
}
