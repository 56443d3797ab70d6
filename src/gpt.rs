//! General purpose timer driver.
//!
//! There are three 16-bit timers. Each counts up or down from a load
//! value, and raises a timeout interrupt when it wraps. A timer can also
//! capture its count when a selected event happens elsewhere in the chip.
//! The set of capture events differs per timer.

use crate::gpio::ExternalInterrupt;
use crate::interrupt::{self, Interrupt, Shared};
use crate::ral::{self, gpt, Static};
use crate::{Callback, Error, Result};

/// Timer instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Instance {
    Gpt0,
    Gpt1,
    Gpt2,
}

impl Instance {
    const fn irq(self) -> Interrupt {
        match self {
            Instance::Gpt0 => Interrupt::Timer0,
            Instance::Gpt1 => Interrupt::Timer1,
            Instance::Gpt2 => Interrupt::Timer2,
        }
    }
}

/// Prescaler applied to the timer clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum Prescaler {
    Div1 = 0,
    Div16 = 1,
    Div256 = 2,
    /// Divides by 32768. For a 32 kHz clock, this divides by 4.
    Div32768 = 3,
}

/// Timer clock source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum ClockSelect {
    /// Peripheral clock.
    Pclk = 0,
    /// High frequency oscillator.
    Hfosc = 1,
    /// 32 kHz internal oscillator.
    Lfosc = 2,
    /// 32 kHz external crystal.
    Lfxtal = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CountMode {
    Down,
    Up,
}

/// Events that a timer can capture.
///
/// Not every event reaches every timer. See
/// [`Handle::set_event_to_capture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CaptureEvent {
    WakeupTimer,
    External(ExternalInterrupt),
    Afe,
    CapTouch,
    Watchdog,
    FlashController,
    Timer0,
    Timer1,
    Timer2,
    Uart,
    Spi0,
    Spi1,
    Spih,
    I2cSlave,
    I2cMaster,
    I2s,
    Usb,
    UsbDma,
    Crc,
    Beeper,
    DmaError,
    DmaDone,
    GpFlashController,
    RealTimeClock,
}

impl CaptureEvent {
    /// The EVENT field code for this event on `instance`.
    pub const fn code(self, instance: Instance) -> Option<u16> {
        use CaptureEvent::*;
        let code = match (instance, self) {
            (Instance::Gpt0, WakeupTimer) => 0,
            (Instance::Gpt0, External(irq)) => 1 + irq as u16,
            (Instance::Gpt0, Afe) => 10,
            (Instance::Gpt0, CapTouch) => 11,
            (Instance::Gpt0, Watchdog) => 12,
            (Instance::Gpt0, FlashController) => 13,
            (Instance::Gpt0, Timer1) => 14,
            (Instance::Gpt0, Timer2) => 15,

            (Instance::Gpt1, Uart) => 0,
            (Instance::Gpt1, Spi0) => 1,
            (Instance::Gpt1, Spi1) => 2,
            (Instance::Gpt1, Spih) => 3,
            (Instance::Gpt1, I2cSlave) => 4,
            (Instance::Gpt1, I2cMaster) => 5,
            (Instance::Gpt1, I2s) => 6,
            (Instance::Gpt1, Usb) => 7,
            (Instance::Gpt1, UsbDma) => 8,
            (Instance::Gpt1, Crc) => 9,
            (Instance::Gpt1, Beeper) => 10,
            (Instance::Gpt1, DmaError) => 11,
            (Instance::Gpt1, DmaDone) => 12,
            (Instance::Gpt1, GpFlashController) => 13,
            (Instance::Gpt1, Timer0) => 14,
            (Instance::Gpt1, Timer2) => 15,

            (Instance::Gpt2, External(irq)) => irq as u16,
            (Instance::Gpt2, Afe) => 9,
            (Instance::Gpt2, CapTouch) => 10,
            (Instance::Gpt2, RealTimeClock) => 11,
            (Instance::Gpt2, Timer0) => 12,
            (Instance::Gpt2, Timer1) => 13,

            _ => return None,
        };
        Some(code)
    }
}

/// Timer events reported to a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    Timeout,
    Captured,
}

/// Register values applied by `init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub prescaler: Prescaler,
    pub count_mode: CountMode,
    /// Reload from the load value on timeout. Otherwise, free run.
    pub periodic: bool,
    pub clock: ClockSelect,
    /// Reload when the timeout is cleared.
    pub reload_on_clear: bool,
    /// Raw capture event code.
    pub capture_event: u16,
    pub capture_enable: bool,
    pub load: u16,
    pub async_load: u16,
    pub pwm_match_enable: bool,
    pub pwm_idle_high: bool,
    pub pwm_match: u16,
}

impl Config {
    /// Periodic, counting down from zero, on the peripheral clock divided
    /// by 32768.
    pub const DEFAULT: Self = Self {
        prescaler: Prescaler::Div32768,
        count_mode: CountMode::Down,
        periodic: true,
        clock: ClockSelect::Pclk,
        reload_on_clear: false,
        capture_event: 0,
        capture_enable: false,
        load: 0,
        async_load: 0,
        pwm_match_enable: false,
        pwm_idle_high: false,
        pwm_match: 0,
    };

    const fn gptcon(&self) -> u16 {
        use gpt::GPTCON;
        ((self.prescaler as u16) << GPTCON::PRE::offset)
            | ((matches!(self.count_mode, CountMode::Up) as u16) << GPTCON::UP::offset)
            | ((self.periodic as u16) << GPTCON::MOD::offset)
            | ((self.clock as u16) << GPTCON::CLK::offset)
            | ((self.reload_on_clear as u16) << GPTCON::RLD::offset)
            | ((self.capture_event << GPTCON::EVENT::offset) & GPTCON::EVENT::mask)
            | ((self.capture_enable as u16) << GPTCON::EVENTEN::offset)
    }

    const fn gptpcon(&self) -> u16 {
        ((self.pwm_match_enable as u16) << gpt::GPTPCON::MATCH_EN::offset)
            | ((self.pwm_idle_high as u16) << gpt::GPTPCON::IDLE_STATE::offset)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::DEFAULT
    }
}

struct State {
    initialized: bool,
    callback: Option<Callback<Event>>,
}

/// A general purpose timer.
pub struct Timer {
    instance: Instance,
    registers: Static<gpt::RegisterBlock>,
    config: Config,
    state: Shared<State>,
}

// Safety: registers are only touched through `&self` methods that
// synchronize with critical sections. OK to place in a static.
unsafe impl Sync for Timer {}

impl Timer {
    /// Create a timer driver with the default configuration.
    ///
    /// # Safety
    ///
    /// `registers` must point to the register block of `instance`. Only
    /// create one driver per instance.
    pub const unsafe fn new(instance: Instance, registers: *const ()) -> Self {
        Self::with_config(instance, registers, Config::DEFAULT)
    }

    /// Create a timer driver that applies `config` on `init`.
    ///
    /// # Safety
    ///
    /// See [`new`](Self::new).
    pub const unsafe fn with_config(
        instance: Instance,
        registers: *const (),
        config: Config,
    ) -> Self {
        Self {
            instance,
            registers: Static(registers.cast()),
            config,
            state: Shared::new(State {
                initialized: false,
                callback: None,
            }),
        }
    }

    pub const fn instance(&self) -> Instance {
        self.instance
    }

    /// Apply the configuration, then reset the timer. The timer is left
    /// disabled.
    pub fn init(&self) -> Result<Handle<'_>> {
        let gpt = &self.registers;
        self.state.lock(|state| {
            if state.initialized {
                return Err(Error::AlreadyInitialized);
            }
            gpt.GPTCON.write(self.config.gptcon());
            gpt.GPTLD.write(self.config.load);
            gpt.GPTALD.write(self.config.async_load);
            gpt.GPTPCON.write(self.config.gptpcon());
            gpt.GPTPMAT.write(self.config.pwm_match);
            state.callback = None;
            state.initialized = true;
            Ok(())
        })?;
        interrupt::enable(self.instance.irq());
        let handle = Handle { timer: self };
        handle.reset_timer()?;
        debug!("GPT{} initialized", self.instance as u8);
        Ok(handle)
    }

    /// Service the timer interrupt.
    ///
    /// A timeout always fires. A capture only fires while capture is
    /// enabled. The callback runs once per fired event, then the fired
    /// events are cleared.
    pub fn on_interrupt(&self) {
        let gpt = &self.registers;
        let status = gpt.GPTSTA.read();
        let capture_enabled = ral::read_reg!(ral::gpt, gpt, GPTCON, EVENTEN == 1);
        let timeout = status & gpt::GPTSTA::TMOUT::mask != 0;
        let captured = capture_enabled && status & gpt::GPTSTA::CAP::mask != 0;

        let callback = self
            .state
            .lock(|state| state.callback.filter(|_| state.initialized));
        if let Some(callback) = callback {
            if timeout {
                callback(Event::Timeout);
            }
            if captured {
                callback(Event::Captured);
            }
        }
        ral::write_reg!(ral::gpt, gpt, GPTCLRI,
            TMOUT: timeout as u16,
            CAP: captured as u16
        );
    }
}

/// A handle to an initialized timer.
#[derive(Clone, Copy)]
pub struct Handle<'a> {
    timer: &'a Timer,
}

impl<'a> Handle<'a> {
    fn registers(&self) -> Result<&'a gpt::RegisterBlock> {
        let timer = self.timer;
        if timer.state.lock(|state| state.initialized) {
            Ok(&*timer.registers)
        } else {
            Err(Error::NotInitialized)
        }
    }

    fn modify_con(&self, f: impl FnOnce(u16) -> u16) -> Result<()> {
        let gpt = self.registers()?;
        critical_section::with(|_| gpt.GPTCON.write(f(gpt.GPTCON.read())));
        Ok(())
    }

    /// Stop the timer and mask its interrupt.
    pub fn uninit(self) -> Result<()> {
        self.set_timer_enable(false)?;
        interrupt::disable(self.timer.instance.irq());
        self.timer.state.lock(|state| {
            state.initialized = false;
            state.callback = None;
        });
        debug!("GPT{} uninitialized", self.timer.instance as u8);
        Ok(())
    }

    pub fn register_callback(&self, callback: Option<Callback<Event>>) -> Result<()> {
        self.registers()?;
        self.timer.state.lock(|state| state.callback = callback);
        Ok(())
    }

    pub fn clear_captured_event_status(&self) -> Result<()> {
        let gpt = self.registers()?;
        ral::write_reg!(ral::gpt, gpt, GPTCLRI, CAP: 1);
        Ok(())
    }

    pub fn clear_timeout_interrupt(&self) -> Result<()> {
        let gpt = self.registers()?;
        ral::write_reg!(ral::gpt, gpt, GPTCLRI, TMOUT: 1);
        Ok(())
    }

    /// The count latched by the last capture event.
    pub fn captured_value(&self) -> Result<u16> {
        Ok(self.registers()?.GPTCAP.read())
    }

    /// Returns `true` while the timer is synchronizing a register write
    /// into its clock domain.
    pub fn timer_busy(&self) -> Result<bool> {
        let gpt = self.registers()?;
        Ok(ral::read_reg!(ral::gpt, gpt, GPTSTA, BUSY == 1))
    }

    pub fn capture_event_pending(&self) -> Result<bool> {
        let gpt = self.registers()?;
        Ok(ral::read_reg!(ral::gpt, gpt, GPTSTA, CAP == 1))
    }

    pub fn timeout_status(&self) -> Result<bool> {
        let gpt = self.registers()?;
        Ok(ral::read_reg!(ral::gpt, gpt, GPTSTA, TMOUT == 1))
    }

    /// Returns `true` if the timer is initialized.
    pub fn timer_config_valid(&self) -> bool {
        self.registers().is_ok()
    }

    pub fn set_ld_val(&self, value: u16) -> Result<()> {
        self.registers()?.GPTLD.write(value);
        Ok(())
    }

    pub fn ld_val(&self) -> Result<u16> {
        Ok(self.registers()?.GPTLD.read())
    }

    /// The current count.
    pub fn tx_val(&self) -> Result<u16> {
        Ok(self.registers()?.GPTVAL.read())
    }

    /// Select the event to capture.
    ///
    /// Returns [`Error::ParamOutOfRange`] if `event` doesn't reach this
    /// timer.
    pub fn set_event_to_capture(&self, event: CaptureEvent) -> Result<()> {
        let gpt = self.registers()?;
        let code = event
            .code(self.timer.instance)
            .ok_or(Error::ParamOutOfRange)?;
        critical_section::with(|_| ral::modify_reg!(ral::gpt, gpt, GPTCON, EVENT: code));
        Ok(())
    }

    pub fn set_capture_event_enable(&self, enable: bool) -> Result<()> {
        let gpt = self.registers()?;
        critical_section::with(|_| {
            ral::modify_reg!(ral::gpt, gpt, GPTCON, EVENTEN: enable as u16)
        });
        Ok(())
    }

    pub fn set_prescaler(&self, prescaler: Prescaler) -> Result<()> {
        let gpt = self.registers()?;
        critical_section::with(|_| {
            ral::modify_reg!(ral::gpt, gpt, GPTCON, PRE: prescaler as u16)
        });
        Ok(())
    }

    pub fn set_timer_enable(&self, enable: bool) -> Result<()> {
        let gpt = self.registers()?;
        critical_section::with(|_| {
            ral::modify_reg!(ral::gpt, gpt, GPTCON, ENABLE: enable as u16)
        });
        Ok(())
    }

    pub fn is_timer_enabled(&self) -> Result<bool> {
        let gpt = self.registers()?;
        Ok(ral::read_reg!(ral::gpt, gpt, GPTCON, ENABLE == 1))
    }

    /// Select periodic (`true`) or free running mode, and set the load
    /// value.
    pub fn set_periodic_mode(&self, periodic: bool, reload: u16) -> Result<()> {
        let bit = gpt::GPTCON::MOD::mask;
        self.modify_con(|con| if periodic { con | bit } else { con & !bit })?;
        self.set_ld_val(reload)
    }

    /// Free run through the full 16-bit range.
    pub fn set_free_running_mode(&self) -> Result<()> {
        self.modify_con(|con| con & !gpt::GPTCON::MOD::mask)
    }

    pub fn set_count_mode(&self, mode: CountMode) -> Result<()> {
        let gpt = self.registers()?;
        let up = matches!(mode, CountMode::Up) as u16;
        critical_section::with(|_| ral::modify_reg!(ral::gpt, gpt, GPTCON, UP: up));
        Ok(())
    }

    pub fn set_clock_select(&self, clock: ClockSelect) -> Result<()> {
        let gpt = self.registers()?;
        critical_section::with(|_| ral::modify_reg!(ral::gpt, gpt, GPTCON, CLK: clock as u16));
        Ok(())
    }

    /// Clear both events, and stop the timer.
    pub fn reset_timer(&self) -> Result<()> {
        self.clear_captured_event_status()?;
        self.clear_timeout_interrupt()?;
        self.set_timer_enable(false)
    }
}
