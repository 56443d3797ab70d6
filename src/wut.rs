//! Wake-up timer driver.
//!
//! The wake-up timer is a 32-bit up-counter that keeps running in
//! hibernate. Four comparators, A through D, raise interrupts at
//! programmed counts, and the counter can raise another on rollover.
//! Comparator A can advance itself by an interval after every match,
//! which produces a periodic wake-up.

use crate::interrupt::{self, Interrupt, Shared};
use crate::ral::{wut, Static};
use crate::{Callback, Error, Result};

pub use crate::gpt::Prescaler;

bitflags::bitflags! {
    /// Wake-up timer interrupt sources.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Targets: u16 {
        const COMPA = wut::T2IEN::WUFA::mask;
        const COMPB = wut::T2IEN::WUFB::mask;
        const COMPC = wut::T2IEN::WUFC::mask;
        const COMPD = wut::T2IEN::WUFD::mask;
        const ROLL = wut::T2IEN::ROLL::mask;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Targets {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Targets({=u16:#x})", self.bits())
    }
}

/// A comparator that accepts an absolute match value.
///
/// Comparator A follows the interval instead. See
/// [`Handle::set_interval_a`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Comparator {
    B = 1,
    C = 2,
    D = 3,
}

impl Comparator {
    const fn target(self) -> Targets {
        match self {
            Comparator::B => Targets::COMPB,
            Comparator::C => Targets::COMPC,
            Comparator::D => Targets::COMPD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum ClockSelect {
    Pclk = 0,
    Lfxtal = 1,
    Lfosc = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerMode {
    FreeRunning,
    Periodic,
}

/// The largest interval for comparator A.
pub const MAX_INTERVAL_A: u16 = 0x0fff;

/// Register values applied by `init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Stop comparator A from advancing by the interval.
    pub stop_interval_a: bool,
    pub clock: ClockSelect,
    pub wakeup_enable: bool,
    pub timer_enable: bool,
    pub mode: TimerMode,
    /// Freeze the high half of the count while reading the low half.
    pub freeze: bool,
    pub prescaler: Prescaler,
    pub interval_a: u16,
    pub comparators: [u32; 4],
    pub interrupts: Targets,
}

impl Config {
    /// Free running on the peripheral clock, disabled, no interrupts.
    pub const DEFAULT: Self = Self {
        stop_interval_a: false,
        clock: ClockSelect::Pclk,
        wakeup_enable: false,
        timer_enable: false,
        mode: TimerMode::FreeRunning,
        freeze: false,
        prescaler: Prescaler::Div1,
        interval_a: 0x00c8,
        comparators: [0x1900, 0x1fff, 0x2fff, 0x3fff],
        interrupts: Targets::empty(),
    };

    const fn t2con(&self) -> u16 {
        use wut::T2CON;
        ((self.stop_interval_a as u16) << T2CON::STOP_WUFA::offset)
            | ((self.clock as u16) << T2CON::CLK::offset)
            | ((self.wakeup_enable as u16) << T2CON::WUEN::offset)
            | ((self.timer_enable as u16) << T2CON::ENABLE::offset)
            | ((matches!(self.mode, TimerMode::FreeRunning) as u16) << T2CON::MOD::offset)
            | ((self.freeze as u16) << T2CON::FREEZE::offset)
            | ((self.prescaler as u16) << T2CON::PRE::offset)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::DEFAULT
    }
}

struct State {
    initialized: bool,
    callback: Option<(Callback<Targets>, Targets)>,
}

/// The wake-up timer.
pub struct WakeupTimer {
    registers: Static<wut::RegisterBlock>,
    config: Config,
    state: Shared<State>,
}

// Safety: registers are only touched through `&self` methods that
// synchronize with critical sections. OK to place in a static.
unsafe impl Sync for WakeupTimer {}

impl WakeupTimer {
    /// # Safety
    ///
    /// `registers` must point to the wake-up timer register block. Only
    /// create one driver for that block.
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

    pub fn init(&self) -> Result<Handle<'_>> {
        self.state.lock(|state| {
            if state.initialized {
                return Err(Error::AlreadyInitialized);
            }
            let wut = &self.registers;
            let config = &self.config;
            wut.T2CON.write(config.t2con());
            wut.T2INC.write(config.interval_a);
            for (index, value) in config.comparators.iter().enumerate() {
                let (low, high) = wut.comparator(index);
                high.write((value >> 16) as u16);
                low.write(*value as u16);
            }
            wut.T2IEN.write(config.interrupts.bits());
            wut.T2CLRI.write(Targets::all().bits());
            state.callback = None;
            state.initialized = true;
            Ok(())
        })?;
        interrupt::enable(Interrupt::WakeupTimer);
        debug!("WUT initialized");
        Ok(Handle { wut: self })
    }

    /// Service the wake-up timer interrupt.
    ///
    /// Fired targets are status ∧ enable. The callback sees the watched
    /// ones, if there are any. Every fired target is cleared.
    pub fn on_interrupt(&self) {
        let wut = &self.registers;
        let (fired, callback) = self.state.lock(|state| {
            let fired = Targets::from_bits_truncate(wut.T2STA.read() & wut.T2IEN.read());
            let callback = state
                .callback
                .filter(|(_, watch)| state.initialized && watch.intersects(fired));
            (fired, callback)
        });
        if let Some((callback, watch)) = callback {
            callback(fired & watch);
        }
        wut.T2CLRI.write(fired.bits());
    }
}

/// A handle to an initialized wake-up timer.
#[derive(Clone, Copy)]
pub struct Handle<'a> {
    wut: &'a WakeupTimer,
}

impl<'a> Handle<'a> {
    fn registers(&self) -> Result<&'a wut::RegisterBlock> {
        let wut = self.wut;
        if wut.state.lock(|state| state.initialized) {
            Ok(&*wut.registers)
        } else {
            Err(Error::NotInitialized)
        }
    }

    fn modify_con(&self, bits: u16, value: u16) -> Result<()> {
        let wut = self.registers()?;
        critical_section::with(|_| {
            let con = wut.T2CON.read();
            wut.T2CON.write((con & !bits) | (value & bits));
        });
        Ok(())
    }

    fn con(&self) -> Result<u16> {
        Ok(self.registers()?.T2CON.read())
    }

    /// Stop the timer, mask the interrupt, and drop the callback.
    pub fn uninit(self) -> Result<()> {
        self.set_timer_enable(false)?;
        interrupt::disable(Interrupt::WakeupTimer);
        self.wut.state.lock(|state| {
            state.initialized = false;
            state.callback = None;
        });
        debug!("WUT uninitialized");
        Ok(())
    }

    /// Register a callback for the `watch` targets, or remove the
    /// callback with `None`.
    pub fn register_callback(
        &self,
        callback: Option<Callback<Targets>>,
        watch: Targets,
    ) -> Result<()> {
        self.registers()?;
        self.wut
            .state
            .lock(|state| state.callback = callback.map(|cb| (cb, watch)));
        Ok(())
    }

    pub fn set_clock_select(&self, clock: ClockSelect) -> Result<()> {
        self.modify_con(
            wut::T2CON::CLK::mask,
            (clock as u16) << wut::T2CON::CLK::offset,
        )
    }

    /// Returns [`Error::NotSupported`] if the timer runs from a clock that
    /// this driver doesn't select.
    pub fn clock_select(&self) -> Result<ClockSelect> {
        let con = self.con()?;
        match (con & wut::T2CON::CLK::mask) >> wut::T2CON::CLK::offset {
            0 => Ok(ClockSelect::Pclk),
            1 => Ok(ClockSelect::Lfxtal),
            2 => Ok(ClockSelect::Lfosc),
            _ => Err(Error::NotSupported),
        }
    }

    /// Program a comparator.
    ///
    /// The timer and the comparator's interrupt are disabled during the
    /// update, then restored.
    pub fn set_comparator(&self, comparator: Comparator, value: u32) -> Result<()> {
        let wut = self.registers()?;
        let target = comparator.target();
        let enabled = self.timer_enable()?;
        self.set_timer_enable(false)?;
        let interrupt_enabled = self.interrupt_enable(target)?;
        self.set_interrupt_enable(target, false)?;

        let (low, high) = wut.comparator(comparator as usize);
        high.write((value >> 16) as u16);
        low.write(value as u16);

        self.set_interrupt_enable(target, interrupt_enabled)?;
        self.set_timer_enable(enabled)
    }

    pub fn comparator(&self, comparator: Comparator) -> Result<u32> {
        let (low, high) = self.registers()?.comparator(comparator as usize);
        Ok((high.read() as u32) << 16 | low.read() as u32)
    }

    pub fn set_freeze(&self, freeze: bool) -> Result<()> {
        let bit = wut::T2CON::FREEZE::mask;
        self.modify_con(bit, if freeze { bit } else { 0 })
    }

    pub fn freeze(&self) -> Result<bool> {
        Ok(self.con()? & wut::T2CON::FREEZE::mask != 0)
    }

    pub fn set_interrupt_enable(&self, targets: Targets, enable: bool) -> Result<()> {
        let wut = self.registers()?;
        critical_section::with(|_| {
            let ien = wut.T2IEN.read();
            wut.T2IEN.write(if enable {
                ien | targets.bits()
            } else {
                ien & !targets.bits()
            });
        });
        Ok(())
    }

    /// Returns `true` if any of `targets` are enabled.
    pub fn interrupt_enable(&self, targets: Targets) -> Result<bool> {
        let ien = Targets::from_bits_truncate(self.registers()?.T2IEN.read());
        Ok(ien.intersects(targets))
    }

    /// Allow the timer to wake the core from hibernate.
    pub fn set_wakeup_enable(&self, enable: bool) -> Result<()> {
        let bit = wut::T2CON::WUEN::mask;
        self.modify_con(bit, if enable { bit } else { 0 })
    }

    pub fn wakeup_enable(&self) -> Result<bool> {
        Ok(self.con()? & wut::T2CON::WUEN::mask != 0)
    }

    pub fn set_timer_enable(&self, enable: bool) -> Result<()> {
        let bit = wut::T2CON::ENABLE::mask;
        self.modify_con(bit, if enable { bit } else { 0 })
    }

    pub fn timer_enable(&self) -> Result<bool> {
        Ok(self.con()? & wut::T2CON::ENABLE::mask != 0)
    }

    /// Set the comparator A interval, up to [`MAX_INTERVAL_A`].
    ///
    /// The timer is disabled during the update, then restored.
    pub fn set_interval_a(&self, interval: u16) -> Result<()> {
        let wut = self.registers()?;
        if interval > MAX_INTERVAL_A {
            return Err(Error::ParamOutOfRange);
        }
        let enabled = self.timer_enable()?;
        self.set_timer_enable(false)?;
        wut.T2INC.write(interval);
        self.set_timer_enable(enabled)
    }

    pub fn interval_a(&self) -> Result<u16> {
        Ok(self.registers()?.T2INC.read())
    }

    pub fn set_prescaler(&self, prescaler: Prescaler) -> Result<()> {
        self.modify_con(
            wut::T2CON::PRE::mask,
            (prescaler as u16) << wut::T2CON::PRE::offset,
        )
    }

    pub fn prescaler(&self) -> Result<Prescaler> {
        let con = self.con()?;
        Ok(
            match (con & wut::T2CON::PRE::mask) >> wut::T2CON::PRE::offset {
                0 => Prescaler::Div1,
                1 => Prescaler::Div16,
                2 => Prescaler::Div256,
                _ => Prescaler::Div32768,
            },
        )
    }

    pub fn set_timer_mode(&self, mode: TimerMode) -> Result<()> {
        let bit = wut::T2CON::MOD::mask;
        self.modify_con(
            bit,
            match mode {
                TimerMode::FreeRunning => bit,
                TimerMode::Periodic => 0,
            },
        )
    }

    pub fn timer_mode(&self) -> Result<TimerMode> {
        Ok(if self.con()? & wut::T2CON::MOD::mask != 0 {
            TimerMode::FreeRunning
        } else {
            TimerMode::Periodic
        })
    }

    /// The raw status register.
    pub fn status(&self) -> Result<u16> {
        Ok(self.registers()?.T2STA.read())
    }

    /// Read the 32-bit count.
    ///
    /// The count is frozen while reading the two halves, so that they
    /// belong together. The previous freeze setting is restored.
    pub fn current_count(&self) -> Result<u32> {
        let wut = self.registers()?;
        let frozen = self.freeze()?;
        self.set_freeze(true)?;
        let low = wut.T2VAL0.read() as u32;
        let high = wut.T2VAL1.read() as u32;
        self.set_freeze(frozen)?;
        Ok(high << 16 | low)
    }

    pub fn clear_interrupt(&self, targets: Targets) -> Result<()> {
        self.registers()?.T2CLRI.write(targets.bits());
        Ok(())
    }
}
