//! Segment LCD driver.
//!
//! The controller drives a static or 4x multiplexed glass from two
//! screens of segment data. One screen is shown at a time. Blinking
//! either toggles between screens in hardware, or leaves it to software
//! through [`Handle::toggle`].

use crate::interrupt::{self, Interrupt, Shared};
use crate::ral::{self, lcd, Static};
use crate::{Callback, Error, Result};

pub use lcd::DATA_REGISTERS;

/// The largest contrast bias level.
pub const MAX_BIAS_LEVEL: u8 = 31;

bitflags::bitflags! {
    /// LCD interrupt events.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Events: u16 {
        /// A frame finished.
        const FRAME_BOUNDARY = lcd::LCDSTAT::FRAMEINT::mask;
        /// The charge pump output is good.
        const CHARGE_PUMP_GOOD = lcd::LCDSTAT::CP_GD::mask;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Events {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Events({=u16:#x})", self.bits())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum FrameRate {
    Hz128 = 0,
    Hz102_4,
    Hz85_3,
    Hz73_1,
    Hz64,
    Hz56_9,
    Hz51_2,
    Hz46_5,
    Hz42_7,
    Hz39_4,
    Hz36_6,
    Hz34_1,
    Hz32,
    Hz30_1,
    Hz28_4,
    Hz26_9,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(usize)]
pub enum Screen {
    Screen0 = 0,
    Screen1 = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum MuxType {
    Static = 0,
    FourX = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum BlinkMode {
    /// Blink under software control, see [`Handle::toggle`].
    Software = 0,
    Disable = 1,
    /// Blink at the blink frequency.
    Hardware = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum BlinkFrequency {
    Hz4 = 0,
    Hz2,
    Hz1,
    TwoThirdsHz,
    HalfHz,
}

/// One segment data register and its value.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DataEntry {
    /// Register number, less than [`DATA_REGISTERS`].
    pub register: u8,
    pub value: u16,
}

/// Register values applied by `init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub mux: MuxType,
    pub screen: Screen,
    pub frame_rate: FrameRate,
    pub frame_inversion: bool,
    /// Clear the segment data on `init`.
    pub data_reset: bool,
    pub frame_boundary_interrupt: bool,
    pub charge_pump_interrupt: bool,
    pub blink_enable: bool,
    pub blink_mode: BlinkMode,
    pub blink_frequency: BlinkFrequency,
    pub auto_switch: bool,
    pub bias_level: u8,
    pub charge_pump: bool,
}

impl Config {
    /// 4x mux at 73.1 Hz, with the charge pump on and its interrupt
    /// enabled.
    pub const DEFAULT: Self = Self {
        mux: MuxType::FourX,
        screen: Screen::Screen0,
        frame_rate: FrameRate::Hz73_1,
        frame_inversion: false,
        data_reset: true,
        frame_boundary_interrupt: false,
        charge_pump_interrupt: true,
        blink_enable: false,
        blink_mode: BlinkMode::Software,
        blink_frequency: BlinkFrequency::Hz4,
        auto_switch: false,
        bias_level: 15,
        charge_pump: true,
    };

    const fn lcdcon(&self) -> u16 {
        use lcd::LCDCON::*;
        ((self.mux as u16) << LCDMUX::offset)
            | ((self.screen as u16) << SCREENSEL::offset)
            | ((self.frame_rate as u16) << FRAMESEL::offset)
            | ((self.frame_inversion as u16) << FRAMEINV::offset)
            | ((self.data_reset as u16) << LCDRST::offset)
            | ((self.frame_boundary_interrupt as u16) << FRAMEINT_EN::offset)
            | ((self.charge_pump_interrupt as u16) << CPINT_EN::offset)
            | ((self.blink_enable as u16) << BLINKEN::offset)
    }

    const fn lcdblink(&self) -> u16 {
        use lcd::LCDBLINK::*;
        ((self.blink_mode as u16) << BLKMOD::offset)
            | ((self.blink_frequency as u16) << BLKFREQ::offset)
            | ((self.auto_switch as u16) << AUTOSWITCH::offset)
    }

    const fn lcdcontrast(&self) -> u16 {
        use lcd::LCDCONTRAST::*;
        (((self.bias_level as u16) << BIASLVL::offset) & BIASLVL::mask)
            | ((self.charge_pump as u16) << CP_EN::offset)
            | ((!self.charge_pump as u16) << CP_PD::offset)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::DEFAULT
    }
}

struct State {
    initialized: bool,
    callback: Option<Callback<Events>>,
}

/// The LCD driver.
pub struct Lcd {
    registers: Static<lcd::RegisterBlock>,
    config: Config,
    state: Shared<State>,
}

// Safety: registers are only touched through `&self` methods that
// synchronize with critical sections. OK to place in a static.
unsafe impl Sync for Lcd {}

impl Lcd {
    /// # Safety
    ///
    /// `registers` must point to the LCD register block. Only create one
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

    /// Reset the segment data, apply the configuration, and unmask the
    /// LCD interrupt.
    ///
    /// The display stays off until [`Handle::enable`].
    pub fn init(&self) -> Result<Handle<'_>> {
        self.state.lock(|state| {
            if state.initialized {
                return Err(Error::AlreadyInitialized);
            }
            let lcd = &self.registers;
            ral::modify_reg!(ral::lcd, lcd, LCDCON, LCDRST: 1);
            lcd.LCDCON.write(self.config.lcdcon());
            lcd.LCDBLINK.write(self.config.lcdblink());
            lcd.LCDCONTRAST.write(self.config.lcdcontrast());
            state.callback = None;
            state.initialized = true;
            Ok(())
        })?;
        interrupt::enable(Interrupt::Lcd);
        debug!("LCD initialized");
        Ok(Handle { lcd: self })
    }

    /// Service the LCD interrupt.
    ///
    /// Reports the events that are both flagged and enabled, then clears
    /// them.
    pub fn on_interrupt(&self) {
        use lcd::{LCDCON, LCDSTAT};

        let lcd = &self.registers;
        let (fired, callback) = self.state.lock(|state| {
            let status = lcd.LCDSTAT.read();
            let con = lcd.LCDCON.read();
            let mut fired = Events::empty();
            if con & LCDCON::FRAMEINT_EN::mask != 0 && status & LCDSTAT::FRAMEINT::mask != 0 {
                fired |= Events::FRAME_BOUNDARY;
            }
            if con & LCDCON::CPINT_EN::mask != 0 && status & LCDSTAT::CP_GD::mask != 0 {
                fired |= Events::CHARGE_PUMP_GOOD;
            }
            lcd.LCDSTAT.write(fired.bits());
            (fired, state.callback.filter(|_| state.initialized))
        });
        if fired.is_empty() {
            warn!("LCD interrupt without an enabled event");
            return;
        }
        if let Some(callback) = callback {
            callback(fired);
        }
    }
}

/// A handle to an initialized LCD.
#[derive(Clone, Copy)]
pub struct Handle<'a> {
    lcd: &'a Lcd,
}

impl<'a> Handle<'a> {
    fn registers(&self) -> Result<&'a lcd::RegisterBlock> {
        let lcd = self.lcd;
        if lcd.state.lock(|state| state.initialized) {
            Ok(&*lcd.registers)
        } else {
            Err(Error::NotInitialized)
        }
    }

    fn modify_con(&self, mask: u16, value: u16) -> Result<()> {
        let lcd = self.registers()?;
        critical_section::with(|_| {
            let con = lcd.LCDCON.read();
            lcd.LCDCON.write((con & !mask) | (value & mask));
        });
        Ok(())
    }

    fn status(&self, mask: u16) -> Result<bool> {
        Ok(self.registers()?.LCDSTAT.read() & mask != 0)
    }

    /// Mask the LCD interrupt and drop the callback.
    ///
    /// The display keeps its current state.
    pub fn uninit(self) -> Result<()> {
        self.registers()?;
        interrupt::disable(Interrupt::Lcd);
        self.lcd.state.lock(|state| {
            state.initialized = false;
            state.callback = None;
        });
        debug!("LCD uninitialized");
        Ok(())
    }

    pub fn register_callback(&self, callback: Option<Callback<Events>>) -> Result<()> {
        self.registers()?;
        self.lcd.state.lock(|state| state.callback = callback);
        Ok(())
    }

    /// Select how the display blinks, or stop blinking.
    pub fn set_blink_mode(&self, mode: BlinkMode) -> Result<()> {
        let lcd = self.registers()?;
        critical_section::with(|_| {
            let blink = mode != BlinkMode::Disable;
            ral::modify_reg!(ral::lcd, lcd, LCDCON, BLINKEN: blink as u16);
            if blink {
                ral::modify_reg!(ral::lcd, lcd, LCDBLINK, BLKMOD: mode as u16);
            }
        });
        Ok(())
    }

    pub fn set_charge_pump_interrupt(&self, enable: bool) -> Result<()> {
        let bit = lcd::LCDCON::CPINT_EN::mask;
        self.modify_con(bit, if enable { bit } else { 0 })
    }

    pub fn set_frame_boundary_interrupt(&self, enable: bool) -> Result<()> {
        let bit = lcd::LCDCON::FRAMEINT_EN::mask;
        self.modify_con(bit, if enable { bit } else { 0 })
    }

    pub fn set_frame_inversion(&self, enable: bool) -> Result<()> {
        let bit = lcd::LCDCON::FRAMEINV::mask;
        self.modify_con(bit, if enable { bit } else { 0 })
    }

    pub fn set_frame_rate(&self, rate: FrameRate) -> Result<()> {
        self.modify_con(
            lcd::LCDCON::FRAMESEL::mask,
            (rate as u16) << lcd::LCDCON::FRAMESEL::offset,
        )
    }

    /// Clear the segment data of both screens.
    pub fn reset(&self) -> Result<()> {
        let bit = lcd::LCDCON::LCDRST::mask;
        self.modify_con(bit, bit)
    }

    /// Select the screen to show.
    pub fn set_screen_select(&self, screen: Screen) -> Result<()> {
        self.modify_con(
            lcd::LCDCON::SCREENSEL::mask,
            (screen as u16) << lcd::LCDCON::SCREENSEL::offset,
        )
    }

    pub fn set_mux_type(&self, mux: MuxType) -> Result<()> {
        self.modify_con(
            lcd::LCDCON::LCDMUX::mask,
            (mux as u16) << lcd::LCDCON::LCDMUX::offset,
        )
    }

    /// Turn the display on or off.
    pub fn enable(&self, enable: bool) -> Result<()> {
        let bit = lcd::LCDCON::LCDEN::mask;
        self.modify_con(bit, if enable { bit } else { 0 })
    }

    pub fn set_blink_frequency(&self, frequency: BlinkFrequency) -> Result<()> {
        let lcd = self.registers()?;
        critical_section::with(|_| {
            ral::modify_reg!(ral::lcd, lcd, LCDBLINK, BLKFREQ: frequency as u16)
        });
        Ok(())
    }

    /// Switch screens at every blink.
    pub fn set_auto_switch(&self, enable: bool) -> Result<()> {
        let lcd = self.registers()?;
        critical_section::with(|_| {
            ral::modify_reg!(ral::lcd, lcd, LCDBLINK, AUTOSWITCH: enable as u16)
        });
        Ok(())
    }

    /// Set the contrast bias level.
    ///
    /// Returns [`Error::BadBiasLevel`] if `level` exceeds
    /// [`MAX_BIAS_LEVEL`].
    pub fn set_contrast(&self, level: u8) -> Result<()> {
        let lcd = self.registers()?;
        if level > MAX_BIAS_LEVEL {
            return Err(Error::BadBiasLevel);
        }
        critical_section::with(|_| {
            ral::modify_reg!(ral::lcd, lcd, LCDCONTRAST, BIASLVL: level as u16)
        });
        Ok(())
    }

    /// Turn the charge pump on, or power it down.
    pub fn enable_charge_pump(&self, enable: bool) -> Result<()> {
        let lcd = self.registers()?;
        critical_section::with(|_| {
            ral::modify_reg!(ral::lcd, lcd, LCDCONTRAST, CP_EN: enable as u16, CP_PD: !enable as u16)
        });
        Ok(())
    }

    /// Write segment data to `screen`.
    ///
    /// Nothing is written if any entry names a register past
    /// [`DATA_REGISTERS`]. That returns [`Error::BadRegisterNumber`].
    pub fn set_data_registers(&self, screen: Screen, entries: &[DataEntry]) -> Result<()> {
        let lcd = self.registers()?;
        if entries
            .iter()
            .any(|entry| entry.register as usize >= DATA_REGISTERS)
        {
            return Err(Error::BadRegisterNumber);
        }
        let data = &lcd.LCDDATA[screen as usize];
        for entry in entries {
            data[entry.register as usize].DATA.write(entry.value);
        }
        Ok(())
    }

    /// Read segment data from `screen` into each entry's `value`.
    pub fn data_registers(&self, screen: Screen, entries: &mut [DataEntry]) -> Result<()> {
        let lcd = self.registers()?;
        if entries
            .iter()
            .any(|entry| entry.register as usize >= DATA_REGISTERS)
        {
            return Err(Error::BadRegisterNumber);
        }
        let data = &lcd.LCDDATA[screen as usize];
        for entry in entries {
            entry.value = data[entry.register as usize].DATA.read();
        }
        Ok(())
    }

    /// Blink once, for software blink mode.
    pub fn toggle(&self) -> Result<()> {
        let lcd = self.registers()?;
        critical_section::with(|_| {
            let blink = lcd.LCDBLINK.read();
            lcd.LCDBLINK.write(blink ^ 1);
        });
        Ok(())
    }

    pub fn is_idle(&self) -> Result<bool> {
        self.status(lcd::LCDSTAT::LCD_IDLE::mask)
    }

    /// The LCD supply is in range.
    pub fn is_vlcd_ok(&self) -> Result<bool> {
        self.status(lcd::LCDSTAT::VLCD_OK::mask)
    }

    pub fn is_charge_pump_good(&self) -> Result<bool> {
        self.status(lcd::LCDSTAT::CP_GD::mask)
    }

    /// Segment data can be written without tearing.
    pub fn is_safe_to_write(&self) -> Result<bool> {
        self.status(lcd::LCDSTAT::SAFE_TO_WR::mask)
    }
}
