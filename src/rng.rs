//! Random number generator driver.
//!
//! The generator samples a free-running ring oscillator against the 32 kHz
//! crystal. After each sample period, it latches a 16-bit value and sets
//! the ready flag. With the counter enabled, it also reports the raw
//! oscillator count for the period.

use crate::interrupt::{self, Interrupt, Shared};
use crate::ral::{self, rng, Static};
use crate::{Callback, Error, Result};

bitflags::bitflags! {
    /// RNG interrupt sources.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Interrupts: u16 {
        /// A sample is ready.
        const READY = rng::RNGSTAT::RNGRDY::mask;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Interrupts {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Interrupts({=u16:#x})", self.bits())
    }
}

/// The largest sample length reload value.
pub const MAX_LEN_RELOAD: u16 = 0xfff;
/// The largest sample length prescaler.
pub const MAX_LEN_PRESCALER: u16 = 0xf;

/// Register values applied by `init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Count oscillator edges during the sample period.
    pub counter_enable: bool,
    /// Stop after one sample (`true`), or run continuously.
    pub single_shot: bool,
    pub len_reload: u16,
    pub len_prescaler: u16,
}

impl Config {
    pub const DEFAULT: Self = Self {
        counter_enable: false,
        single_shot: false,
        len_reload: 0,
        len_prescaler: 0,
    };

    const fn rngctl(&self) -> u16 {
        ((self.counter_enable as u16) << rng::RNGCTL::CNTEN::offset)
            | ((self.single_shot as u16) << rng::RNGCTL::TMRMODE::offset)
    }

    const fn rnglen(&self) -> u16 {
        ((self.len_reload << rng::RNGLEN::LENRLD::offset) & rng::RNGLEN::LENRLD::mask)
            | ((self.len_prescaler << rng::RNGLEN::LENPRE::offset) & rng::RNGLEN::LENPRE::mask)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::DEFAULT
    }
}

struct State {
    initialized: bool,
    callback: Option<(Callback<Interrupts>, Interrupts)>,
}

/// The random number generator.
pub struct Rng {
    registers: Static<rng::RegisterBlock>,
    config: Config,
    state: Shared<State>,
}

// Safety: registers are only touched through `&self` methods that
// synchronize with critical sections. OK to place in a static.
unsafe impl Sync for Rng {}

impl Rng {
    /// # Safety
    ///
    /// `registers` must point to the RNG register block. Only create one
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
                callback: None,
            }),
        }
    }

    /// Clear any stale sample, and apply the configuration. The
    /// generator stays disabled.
    ///
    /// The interrupt is unmasked once a callback is registered.
    pub fn init(&self) -> Result<Handle<'_>> {
        self.state.lock(|state| {
            if state.initialized {
                return Err(Error::AlreadyInitialized);
            }
            let rng = &self.registers;
            rng.RNGSTAT.write(Interrupts::all().bits());
            rng.RNGCTL.write(self.config.rngctl());
            rng.RNGLEN.write(self.config.rnglen());
            state.callback = None;
            state.initialized = true;
            Ok(())
        })?;
        debug!("RNG initialized");
        Ok(Handle { rng: self })
    }

    /// Service the RNG interrupt.
    pub fn on_interrupt(&self) {
        let rng = &self.registers;
        let (fired, callback) = self.state.lock(|state| {
            let fired = Interrupts::from_bits_truncate(rng.RNGSTAT.read());
            let callback = state
                .callback
                .filter(|(_, watch)| state.initialized && watch.intersects(fired));
            (fired, callback)
        });
        if let Some((callback, _)) = callback {
            callback(fired);
        }
        rng.RNGSTAT.write(fired.bits());
    }
}

/// A handle to an initialized RNG.
#[derive(Clone, Copy)]
pub struct Handle<'a> {
    rng: &'a Rng,
}

impl<'a> Handle<'a> {
    fn registers(&self) -> Result<&'a rng::RegisterBlock> {
        let rng = self.rng;
        if rng.state.lock(|state| state.initialized) {
            Ok(&*rng.registers)
        } else {
            Err(Error::NotInitialized)
        }
    }

    fn modify_ctl(&self, bit: u16, set: bool) -> Result<()> {
        let rng = self.registers()?;
        critical_section::with(|_| {
            let ctl = rng.RNGCTL.read();
            rng.RNGCTL.write(if set { ctl | bit } else { ctl & !bit });
        });
        Ok(())
    }

    /// Mask the interrupt, and drop the callback.
    pub fn uninit(self) -> Result<()> {
        self.registers()?;
        interrupt::disable(Interrupt::Rng);
        self.rng.state.lock(|state| {
            state.initialized = false;
            state.callback = None;
        });
        debug!("RNG uninitialized");
        Ok(())
    }

    /// Register a callback for the `watch` interrupts, and unmask the
    /// interrupt. `None` removes the callback.
    pub fn register_callback(
        &self,
        callback: Option<Callback<Interrupts>>,
        watch: Interrupts,
    ) -> Result<()> {
        self.registers()?;
        self.rng
            .state
            .lock(|state| state.callback = callback.map(|cb| (cb, watch)));
        interrupt::enable(Interrupt::Rng);
        Ok(())
    }

    /// Start or stop sampling.
    pub fn enable(&self, enable: bool) -> Result<()> {
        self.modify_ctl(rng::RNGCTL::RNGEN::mask, enable)
    }

    pub fn enable_counter(&self, enable: bool) -> Result<()> {
        self.modify_ctl(rng::RNGCTL::CNTEN::mask, enable)
    }

    /// Select single-shot (`true`) or continuous sampling.
    pub fn set_mode(&self, single_shot: bool) -> Result<()> {
        self.modify_ctl(rng::RNGCTL::TMRMODE::mask, single_shot)
    }

    /// Set the sample length reload value, up to [`MAX_LEN_RELOAD`].
    pub fn set_len_reload(&self, reload: u16) -> Result<()> {
        let rng = self.registers()?;
        if reload > MAX_LEN_RELOAD {
            return Err(Error::ParamOutOfRange);
        }
        critical_section::with(|_| ral::modify_reg!(ral::rng, rng, RNGLEN, LENRLD: reload));
        Ok(())
    }

    /// Set the sample length prescaler, up to [`MAX_LEN_PRESCALER`].
    ///
    /// The sample period is `reload << prescaler` crystal cycles.
    pub fn set_len_prescaler(&self, prescaler: u16) -> Result<()> {
        let rng = self.registers()?;
        if prescaler > MAX_LEN_PRESCALER {
            return Err(Error::ParamOutOfRange);
        }
        critical_section::with(|_| ral::modify_reg!(ral::rng, rng, RNGLEN, LENPRE: prescaler));
        Ok(())
    }

    /// Write the raw control register.
    pub fn set_control(&self, control: u16) -> Result<()> {
        self.registers()?.RNGCTL.write(control);
        Ok(())
    }

    pub fn control(&self) -> Result<u16> {
        Ok(self.registers()?.RNGCTL.read())
    }

    /// Write the raw sample length register.
    pub fn set_sample_len(&self, len: u16) -> Result<()> {
        self.registers()?.RNGLEN.write(len);
        Ok(())
    }

    pub fn sample_len(&self) -> Result<u16> {
        Ok(self.registers()?.RNGLEN.read())
    }

    /// Returns `true` if a sample is ready.
    pub fn rdy_status(&self) -> Result<bool> {
        let rng = self.registers()?;
        Ok(ral::read_reg!(ral::rng, rng, RNGSTAT, RNGRDY == 1))
    }

    /// Read the latest sample.
    ///
    /// Returns [`Error::DataNotReady`] if there's no new sample.
    pub fn rng_data(&self) -> Result<u16> {
        let rng = self.registers()?;
        if ral::read_reg!(ral::rng, rng, RNGSTAT, RNGRDY == 1) {
            Ok(rng.RNGDATA.read())
        } else {
            Err(Error::DataNotReady)
        }
    }

    /// Read the oscillator count for the last sample period.
    ///
    /// Returns [`Error::DataNotReady`] if there's no new sample, or if the
    /// counter is disabled.
    pub fn osc_count(&self) -> Result<u32> {
        let rng = self.registers()?;
        let ready = ral::read_reg!(ral::rng, rng, RNGSTAT, RNGRDY == 1);
        let counting = ral::read_reg!(ral::rng, rng, RNGCTL, CNTEN == 1);
        if ready && counting {
            let high = rng.RNGCNTH.read() as u32;
            Ok(high << 16 | rng.RNGCNTL.read() as u32)
        } else {
            Err(Error::DataNotReady)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ral::testing;
    use core::sync::atomic::{AtomicU16, Ordering};

    fn rng() -> (&'static Rng, &'static rng::RegisterBlock) {
        let regs = testing::block::<rng::RegisterBlock>();
        // Safety: test-owned memory.
        let rng = unsafe { Rng::new(regs as *const _ as *const ()) };
        (Box::leak(Box::new(rng)), regs)
    }

    #[test]
    fn data_needs_ready() {
        let (rng, regs) = rng();
        let handle = rng.init().unwrap();
        // init clears RNGRDY by writing one. RAM keeps the one.
        assert_eq!(regs.RNGSTAT.read(), Interrupts::READY.bits());
        testing::poke(&regs.RNGSTAT, 0u16);
        testing::poke(&regs.RNGDATA, 0x5a5au16);
        assert_eq!(handle.rng_data(), Err(Error::DataNotReady));
        assert!(!handle.rdy_status().unwrap());

        regs.RNGSTAT.write(Interrupts::READY.bits());
        assert!(handle.rdy_status().unwrap());
        assert_eq!(handle.rng_data(), Ok(0x5a5a));
    }

    #[test]
    fn osc_count_needs_counter() {
        let (rng, regs) = rng();
        let handle = rng.init().unwrap();
        regs.RNGSTAT.write(Interrupts::READY.bits());
        testing::poke(&regs.RNGCNTH, 0x0012u16);
        testing::poke(&regs.RNGCNTL, 0x3456u16);
        assert_eq!(handle.osc_count(), Err(Error::DataNotReady));

        handle.enable_counter(true).unwrap();
        assert_eq!(handle.osc_count(), Ok(0x0012_3456));
    }

    #[test]
    fn sample_length_fields() {
        let (rng, _) = rng();
        let handle = rng.init().unwrap();
        handle.set_len_reload(0x123).unwrap();
        handle.set_len_prescaler(0xa).unwrap();
        assert_eq!(handle.sample_len().unwrap(), 0xa123);
        handle.set_len_reload(0xfff).unwrap();
        assert_eq!(handle.sample_len().unwrap(), 0xafff);

        assert_eq!(handle.set_len_reload(0x1000), Err(Error::ParamOutOfRange));
        assert_eq!(handle.set_len_prescaler(16), Err(Error::ParamOutOfRange));

        handle.set_sample_len(0x0042).unwrap();
        assert_eq!(handle.sample_len().unwrap(), 0x0042);
    }

    #[test]
    fn control_bits() {
        let (rng, _) = rng();
        let handle = rng.init().unwrap();
        handle.enable(true).unwrap();
        handle.set_mode(true).unwrap();
        assert_eq!(handle.control().unwrap(), 0b1_0001);
        handle.enable(false).unwrap();
        assert_eq!(handle.control().unwrap(), 0b1_0000);
        handle.set_control(0b1000).unwrap();
        assert_eq!(handle.control().unwrap(), 0b1000);
    }

    #[test]
    fn interrupt_watch() {
        static FIRED: AtomicU16 = AtomicU16::new(0);
        let (rng, regs) = rng();
        let handle = rng.init().unwrap();
        assert!(!interrupt::is_enabled(Interrupt::Rng));

        // Not watching anything.
        handle
            .register_callback(
                Some(&|fired: Interrupts| {
                    FIRED.fetch_add(fired.bits(), Ordering::SeqCst);
                }),
                Interrupts::empty(),
            )
            .unwrap();
        assert!(interrupt::is_enabled(Interrupt::Rng));
        regs.RNGSTAT.write(Interrupts::READY.bits());
        rng.on_interrupt();
        assert_eq!(FIRED.load(Ordering::SeqCst), 0);

        handle
            .register_callback(
                Some(&|fired: Interrupts| {
                    FIRED.fetch_add(fired.bits(), Ordering::SeqCst);
                }),
                Interrupts::READY,
            )
            .unwrap();
        rng.on_interrupt();
        assert_eq!(FIRED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn not_initialized() {
        let (rng, _) = rng();
        let handle = rng.init().unwrap();
        handle.uninit().unwrap();
        assert_eq!(handle.enable(true), Err(Error::NotInitialized));
        assert_eq!(handle.rng_data(), Err(Error::NotInitialized));
        assert!(!interrupt::is_enabled(Interrupt::Rng));
        rng.init().unwrap();
    }
}
