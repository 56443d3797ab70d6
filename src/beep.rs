//! Beeper driver.
//!
//! The beeper plays two tones, A and B. It can play a single tone, or a
//! sequence of A/B pairs that repeats a programmed number of times.
//! Tone frequencies and durations use the hardware encoding: the
//! frequency is a 7-bit divider code, and the duration is counted in
//! 4 ms ticks.

use crate::interrupt::{self, Interrupt, Shared};
use crate::ral::{self, beep, Static};
use crate::{Callback, Error, Result};

bitflags::bitflags! {
    /// Beeper interrupt sources.
    ///
    /// Bits line up with both the configuration (enable) and status
    /// (event) registers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Interrupts: u16 {
        const TONEA_START = beep::CFG::IRQ_TONEA_START::mask;
        const TONEA_END = beep::CFG::IRQ_TONEA_END::mask;
        const TONEB_START = beep::CFG::IRQ_TONEB_START::mask;
        const TONEB_END = beep::CFG::IRQ_TONEB_END::mask;
        const SEQ_NEAR_END = beep::CFG::IRQ_SEQ_NEAR_END::mask;
        const SEQ_END = beep::CFG::IRQ_SEQ_END::mask;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Interrupts {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Interrupts({=u16:#x})", self.bits())
    }
}

/// Tone selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Tone {
    A,
    B,
}

/// The largest frequency code.
pub const MAX_FREQUENCY: u8 = 127;

/// Tone settings applied by `init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToneConfig {
    pub enable: bool,
    pub frequency: u8,
    pub duration: u8,
}

impl ToneConfig {
    const fn bits(self) -> u16 {
        ((!self.enable as u16) << beep::TONE_A::DISABLE::offset)
            | (((self.frequency as u16) << beep::TONE_A::FREQ::offset) & beep::TONE_A::FREQ::mask)
            | ((self.duration as u16) << beep::TONE_A::DUR::offset)
    }
}

/// Register values applied by `init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub enable: bool,
    pub interrupts: Interrupts,
    pub sequence_repeat: u8,
    pub tone_a: ToneConfig,
    pub tone_b: ToneConfig,
}

impl Config {
    /// Beeper off, no interrupts, both tones silent.
    pub const DEFAULT: Self = Self {
        enable: false,
        interrupts: Interrupts::empty(),
        sequence_repeat: 0,
        tone_a: ToneConfig {
            enable: false,
            frequency: 0,
            duration: 0,
        },
        tone_b: ToneConfig {
            enable: false,
            frequency: 0,
            duration: 0,
        },
    };

    const fn cfg_bits(&self) -> u16 {
        self.interrupts.bits()
            | ((self.enable as u16) << beep::CFG::EN::offset)
            | ((self.sequence_repeat as u16) << beep::CFG::SEQ_REPEAT::offset)
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

/// The beeper driver.
pub struct Beeper {
    registers: Static<beep::RegisterBlock>,
    config: Config,
    state: Shared<State>,
}

// Safety: registers are only touched through `&self` methods that
// synchronize with critical sections. OK to place in a static.
unsafe impl Sync for Beeper {}

impl Beeper {
    /// Create a beeper driver with the default configuration.
    ///
    /// # Safety
    ///
    /// `registers` must point to the beeper register block. Only create one
    /// driver for that block.
    pub const unsafe fn new(registers: *const ()) -> Self {
        Self::with_config(registers, Config::DEFAULT)
    }

    /// Create a beeper driver that applies `config` on `init`.
    ///
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

    /// Initialize the beeper and unmask its interrupt.
    pub fn init(&self) -> Result<Handle<'_>> {
        self.state.lock(|state| {
            if state.initialized {
                return Err(Error::AlreadyInitialized);
            }
            let beep = &self.registers;
            beep.CFG.write(self.config.cfg_bits());
            // Clear anything left over.
            beep.STAT.write(Interrupts::all().bits());
            beep.TONE_A.write(self.config.tone_a.bits());
            beep.TONE_B.write(self.config.tone_b.bits());
            state.callback = None;
            state.initialized = true;
            Ok(())
        })?;
        interrupt::enable(Interrupt::Beep);
        debug!("beeper initialized");
        Ok(Handle { beeper: self })
    }

    /// Service the beeper interrupt.
    ///
    /// Forwards the sources that are both latched and enabled to the
    /// callback, if any of them are watched, then clears them.
    pub fn on_interrupt(&self) {
        let beep = &self.registers;
        let (fired, callback) = self.state.lock(|state| {
            let fired = Interrupts::from_bits_truncate(beep.STAT.read() & beep.CFG.read());
            let callback = state
                .callback
                .filter(|(_, watch)| state.initialized && watch.intersects(fired));
            (fired, callback)
        });
        if let Some((callback, _)) = callback {
            callback(fired);
        }
        // Immutable write OK. STAT is write-one-to-clear, so this only
        // clears what we just reported.
        beep.STAT.write(fired.bits());
    }
}

/// A handle to an initialized beeper.
#[derive(Clone, Copy)]
pub struct Handle<'a> {
    beeper: &'a Beeper,
}

impl<'a> Handle<'a> {
    fn registers(&self) -> Result<&'a beep::RegisterBlock> {
        let beeper = self.beeper;
        if beeper.state.lock(|state| state.initialized) {
            Ok(&*beeper.registers)
        } else {
            Err(Error::NotInitialized)
        }
    }

    /// Disable the beeper, mask its interrupt, and drop the callback.
    pub fn uninit(self) -> Result<()> {
        let beep = self.registers()?;
        interrupt::disable(Interrupt::Beep);
        critical_section::with(|_| ral::modify_reg!(ral::beep, beep, CFG, EN: 0));
        self.beeper.state.lock(|state| {
            state.initialized = false;
            state.callback = None;
        });
        debug!("beeper uninitialized");
        Ok(())
    }

    /// Register a callback for the `watch` interrupts, or remove the
    /// callback with `None`.
    pub fn register_callback(
        &self,
        callback: Option<Callback<Interrupts>>,
        watch: Interrupts,
    ) -> Result<()> {
        self.registers()?;
        self.beeper
            .state
            .lock(|state| state.callback = callback.map(|cb| (cb, watch)));
        Ok(())
    }

    /// Enable or disable interrupt sources.
    pub fn set_interrupt_enables(&self, interrupts: Interrupts, enable: bool) -> Result<()> {
        let beep = self.registers()?;
        critical_section::with(|_| {
            let cfg = beep.CFG.read();
            beep.CFG.write(if enable {
                cfg | interrupts.bits()
            } else {
                cfg & !interrupts.bits()
            });
        });
        Ok(())
    }

    /// The enabled interrupt sources.
    pub fn interrupt_enables(&self) -> Result<Interrupts> {
        let beep = self.registers()?;
        Ok(Interrupts::from_bits_truncate(beep.CFG.read()))
    }

    /// The latched interrupt events, enabled or not.
    pub fn interrupt_status(&self) -> Result<Interrupts> {
        let beep = self.registers()?;
        Ok(Interrupts::from_bits_truncate(beep.STAT.read()))
    }

    /// Clear latched interrupt events.
    pub fn clear_interrupt_status(&self, interrupts: Interrupts) -> Result<()> {
        let beep = self.registers()?;
        beep.STAT.write(interrupts.bits());
        Ok(())
    }

    /// Returns `true` while a tone or sequence is playing.
    pub fn is_busy(&self) -> Result<bool> {
        let beep = self.registers()?;
        Ok(ral::read_reg!(ral::beep, beep, STAT, BUSY == 1))
    }

    /// Enable or disable the beeper.
    pub fn set_enable(&self, enable: bool) -> Result<()> {
        let beep = self.registers()?;
        critical_section::with(|_| ral::modify_reg!(ral::beep, beep, CFG, EN: enable as u16));
        Ok(())
    }

    pub fn is_enabled(&self) -> Result<bool> {
        let beep = self.registers()?;
        Ok(ral::read_reg!(ral::beep, beep, CFG, EN == 1))
    }

    /// Mute or unmute one tone.
    pub fn set_tone_enable(&self, tone: Tone, enable: bool) -> Result<()> {
        let reg = beep::RegisterBlock::tone(self.registers()?, tone as usize);
        critical_section::with(|_| {
            let value = reg.read();
            reg.write(if enable {
                value & !beep::TONE_A::DISABLE::mask
            } else {
                value | beep::TONE_A::DISABLE::mask
            });
        });
        Ok(())
    }

    pub fn is_tone_enabled(&self, tone: Tone) -> Result<bool> {
        let reg = beep::RegisterBlock::tone(self.registers()?, tone as usize);
        Ok(reg.read() & beep::TONE_A::DISABLE::mask == 0)
    }

    /// Program a tone. This also unmutes the tone.
    ///
    /// Returns [`Error::ParamOutOfRange`] if `frequency` is greater than
    /// [`MAX_FREQUENCY`].
    pub fn set_tone(&self, tone: Tone, frequency: u8, duration: u8) -> Result<()> {
        let reg = beep::RegisterBlock::tone(self.registers()?, tone as usize);
        if frequency > MAX_FREQUENCY {
            return Err(Error::ParamOutOfRange);
        }
        reg.write(
            ToneConfig {
                enable: true,
                frequency,
                duration,
            }
            .bits(),
        );
        Ok(())
    }

    /// Returns the tone's `(frequency, duration)`.
    pub fn tone(&self, tone: Tone) -> Result<(u8, u8)> {
        let reg = beep::RegisterBlock::tone(self.registers()?, tone as usize);
        let value = reg.read();
        let frequency = (value & beep::TONE_A::FREQ::mask) >> beep::TONE_A::FREQ::offset;
        let duration = (value & beep::TONE_A::DUR::mask) >> beep::TONE_A::DUR::offset;
        Ok((frequency as u8, duration as u8))
    }

    /// Set the number of A/B pairs to play in the next sequence.
    pub fn set_sequence(&self, count: u8) -> Result<()> {
        let beep = self.registers()?;
        critical_section::with(|_| ral::modify_reg!(ral::beep, beep, CFG, SEQ_REPEAT: count as u16));
        Ok(())
    }

    /// The number of A/B pairs left in the running sequence.
    pub fn sequence_remaining(&self) -> Result<u8> {
        let beep = self.registers()?;
        Ok(ral::read_reg!(ral::beep, beep, STAT, SEQ_REMAIN) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ral::testing;
    use core::sync::atomic::{AtomicU16, AtomicUsize, Ordering};

    fn beeper() -> (&'static Beeper, &'static beep::RegisterBlock) {
        let regs = testing::block::<beep::RegisterBlock>();
        // Safety: test-owned memory.
        let beeper = unsafe { Beeper::new(regs as *const _ as *const ()) };
        (Box::leak(Box::new(beeper)), regs)
    }

    #[test]
    fn set_tone_then_get_tone() {
        let (beeper, _) = beeper();
        let handle = beeper.init().unwrap();
        assert!(!handle.is_tone_enabled(Tone::A).unwrap());

        handle.set_tone(Tone::A, 60, 10).unwrap();
        assert_eq!(handle.tone(Tone::A).unwrap(), (60, 10));
        assert!(handle.is_tone_enabled(Tone::A).unwrap());
        assert!(!handle.is_tone_enabled(Tone::B).unwrap());
    }

    #[test]
    fn frequency_out_of_range() {
        let (beeper, _) = beeper();
        let handle = beeper.init().unwrap();
        assert_eq!(
            handle.set_tone(Tone::B, MAX_FREQUENCY + 1, 1),
            Err(Error::ParamOutOfRange)
        );
        handle.set_tone(Tone::B, MAX_FREQUENCY, 255).unwrap();
        assert_eq!(handle.tone(Tone::B).unwrap(), (MAX_FREQUENCY, 255));
    }

    #[test]
    fn tone_enable_round_trip() {
        let (beeper, _) = beeper();
        let handle = beeper.init().unwrap();
        handle.set_tone(Tone::B, 20, 30).unwrap();
        handle.set_tone_enable(Tone::B, false).unwrap();
        assert!(!handle.is_tone_enabled(Tone::B).unwrap());
        assert_eq!(handle.tone(Tone::B).unwrap(), (20, 30));
        handle.set_tone_enable(Tone::B, true).unwrap();
        assert!(handle.is_tone_enabled(Tone::B).unwrap());
    }

    #[test]
    fn init_uninit_lifecycle() {
        let (beeper, regs) = beeper();
        let handle = beeper.init().unwrap();
        assert!(matches!(beeper.init(), Err(Error::AlreadyInitialized)));
        assert!(interrupt::is_enabled(Interrupt::Beep));

        handle.set_enable(true).unwrap();
        handle.set_sequence(5).unwrap();
        assert!(handle.is_enabled().unwrap());

        handle.uninit().unwrap();
        assert!(!interrupt::is_enabled(Interrupt::Beep));
        assert_eq!(regs.CFG.read() & beep::CFG::EN::mask, 0);
        assert_eq!(handle.is_enabled(), Err(Error::NotInitialized));
        assert_eq!(handle.set_tone(Tone::A, 1, 1), Err(Error::NotInitialized));
        assert_eq!(handle.uninit(), Err(Error::NotInitialized));

        // Re-init is allowed after uninit.
        beeper.init().unwrap();
    }

    #[test]
    fn sequence_count() {
        let (beeper, regs) = beeper();
        let handle = beeper.init().unwrap();
        handle.set_interrupt_enables(Interrupts::SEQ_END, true).unwrap();
        handle.set_sequence(0xA5).unwrap();
        assert_eq!(regs.CFG.read() & 0xFF, 0xA5);
        assert_eq!(handle.interrupt_enables().unwrap(), Interrupts::SEQ_END);

        testing::poke(&regs.STAT, 3u16 | beep::STAT::BUSY::mask);
        assert_eq!(handle.sequence_remaining().unwrap(), 3);
        assert!(handle.is_busy().unwrap());
    }

    #[test]
    fn interrupt_forwards_only_enabled_and_watched() {
        static FIRED: AtomicU16 = AtomicU16::new(0);
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let (beeper, regs) = beeper();
        let handle = beeper.init().unwrap();
        handle
            .set_interrupt_enables(Interrupts::TONEA_END | Interrupts::SEQ_END, true)
            .unwrap();
        handle
            .register_callback(
                Some(&|fired: Interrupts| {
                    FIRED.store(fired.bits(), Ordering::SeqCst);
                    CALLS.fetch_add(1, Ordering::SeqCst);
                }),
                Interrupts::TONEA_END,
            )
            .unwrap();

        // TONEB_END is latched, but it isn't enabled.
        let latched = Interrupts::TONEA_END | Interrupts::TONEB_END | Interrupts::SEQ_END;
        regs.STAT.write(latched.bits());
        beeper.on_interrupt();

        let fired = Interrupts::TONEA_END | Interrupts::SEQ_END;
        assert_eq!(FIRED.load(Ordering::SeqCst), fired.bits());
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
        // Only the fired bits are written back to clear.
        assert_eq!(regs.STAT.read(), fired.bits());

        // SEQ_END alone isn't watched.
        regs.STAT.write(Interrupts::SEQ_END.bits());
        beeper.on_interrupt();
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
        assert_eq!(regs.STAT.read(), Interrupts::SEQ_END.bits());
    }
}
