//! Peripheral drivers for ADuCM350 microcontrollers.
//!
//! `aducm350-drivers` provides interrupt-aware drivers for the ADuCM350
//! peripherals:
//!
//! - [`beep`], the two-tone beeper.
//! - [`gpio`], GPIO ports, external interrupts and group interrupts.
//! - [`gpt`], the three general purpose timers.
//! - [`lcd`], the segment LCD controller.
//! - [`pdi`], the parallel display interface.
//! - [`rng`], the random number generator.
//! - [`spi`], SPI0, SPI1 and SPIH, with µDMA ping-pong transfers.
//! - [`uart`], the UART, polled or interrupt driven.
//! - [`wut`], the wake-up timer.
//! - [`dma`], the µDMA controller that backs SPI transfers.
//! - [`usb`], glue that adapts a USB controller driver to a USB device
//!   stack.
//!
//! # Getting started
//!
//! Every driver is a plain object that you place in a `static`. The
//! [`Drivers`] collection creates all of them for the ADuCM350 memory map.
//!
//! ```no_run
//! use aducm350_drivers::{beep, Drivers};
//!
//! // Safety: there's one collection of drivers for the whole program.
//! static DRIVERS: Drivers = unsafe { Drivers::new() };
//!
//! let beeper = DRIVERS.beep.init().unwrap();
//! beeper.set_tone(beep::Tone::A, 60, 10).unwrap();
//! beeper.set_enable(true).unwrap();
//! ```
//!
//! `init` returns a handle. All driver operations go through the handle.
//! Handles are `Copy`, and they stay valid after `uninit`. Using a handle
//! after `uninit` returns [`Error::NotInitialized`].
//!
//! # Interrupts
//!
//! Drivers unmask their own interrupts. You're responsible for routing the
//! vector to the driver's `on_interrupt` method.
//!
//! ```no_run
//! # use aducm350_drivers::Drivers;
//! # static DRIVERS: Drivers = unsafe { Drivers::new() };
//! // In your BEEP vector:
//! DRIVERS.beep.on_interrupt();
//! ```
//!
//! Callbacks run synchronously from that interrupt handler. There's at most
//! one callback per driver instance, and it must return quickly.
//!
//! # Features
//!
//! - `spi-dma` (default) enables SPI DMA mode.
//! - `uart-interrupt` (default) enables UART interrupt mode.
//! - `usb-queue` queues pending USB transfers per endpoint.
//! - `defmt` or `log` turn on driver logging.

#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
mod fmt;

pub mod beep;
pub mod dma;
mod error;
pub mod gpio;
pub mod gpt;
pub mod interrupt;
pub mod lcd;
pub mod pdi;
mod ral;
pub mod rng;
pub mod spi;
pub mod uart;
pub mod usb;
pub mod wut;

pub use error::Error;
pub use interrupt::Interrupt;

/// A driver result
pub type Result<T> = core::result::Result<T, Error>;

/// An application callback.
///
/// Drivers call it from their interrupt handler with the event that
/// happened. It runs with interrupts enabled, but it blocks the rest of
/// the handler. Keep it short.
pub type Callback<E> = &'static (dyn Fn(E) + Sync);

/// Every ADuCM350 driver, at its hardware address.
///
/// Place this in a `static`, then initialize the drivers that you need.
/// The SPI drivers borrow the GPIO and DMA drivers, so the collection
/// must live for `'static`.
pub struct Drivers {
    pub beep: beep::Beeper,
    pub dma: dma::Dma,
    pub gpio: gpio::Gpio,
    pub gpt0: gpt::Timer,
    pub gpt1: gpt::Timer,
    pub gpt2: gpt::Timer,
    pub lcd: lcd::Lcd,
    pub pdi: pdi::Pdi,
    pub rng: rng::Rng,
    pub spi0: spi::Spi,
    pub spi1: spi::Spi,
    pub spih: spi::Spi,
    pub uart: uart::Uart,
    pub wut: wut::WakeupTimer,
}

impl Drivers {
    /// Create all drivers with their default configurations.
    ///
    /// # Safety
    ///
    /// Only create one `Drivers` collection. Each driver assumes that it's
    /// the only owner of its registers.
    pub const unsafe fn new() -> Self {
        use ral::address;
        Self {
            beep: beep::Beeper::new(address::BEEP),
            dma: dma::Dma::new(address::DMA, address::GPFDMACTL),
            gpio: gpio::Gpio::new(address::GPIO, address::PWR),
            gpt0: gpt::Timer::new(gpt::Instance::Gpt0, address::GPT0),
            gpt1: gpt::Timer::new(gpt::Instance::Gpt1, address::GPT1),
            gpt2: gpt::Timer::new(gpt::Instance::Gpt2, address::GPT2),
            lcd: lcd::Lcd::new(address::LCD),
            pdi: pdi::Pdi::new(address::PDI),
            rng: rng::Rng::new(address::RNG),
            spi0: spi::Spi::new(spi::Instance::Spi0, address::SPI0),
            spi1: spi::Spi::new(spi::Instance::Spi1, address::SPI1),
            spih: spi::Spi::new(spi::Instance::Spih, address::SPIH),
            uart: uart::Uart::new(address::UART),
            wut: wut::WakeupTimer::new(address::WUT),
        }
    }
}
