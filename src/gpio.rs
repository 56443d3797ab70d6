//! GPIO driver.
//!
//! Covers the five GPIO ports, the nine external interrupts (EINT0
//! through EINT8) and the two pin group interrupts (A and B).
//!
//! The GPIO driver is shared. Other drivers, like SPI, initialize it to
//! drive their chip selects. `init` counts users, and `uninit` releases
//! one user. The driver stays usable until every user has released it.

use crate::interrupt::{self, Interrupt, Shared};
use crate::ral::{gpio, idu, Static};
use crate::{Callback, Error, Result};

bitflags::bitflags! {
    /// A set of pins on one port.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Pins: u16 {
        const PIN0 = 1 << 0;
        const PIN1 = 1 << 1;
        const PIN2 = 1 << 2;
        const PIN3 = 1 << 3;
        const PIN4 = 1 << 4;
        const PIN5 = 1 << 5;
        const PIN6 = 1 << 6;
        const PIN7 = 1 << 7;
        const PIN8 = 1 << 8;
        const PIN9 = 1 << 9;
        const PIN10 = 1 << 10;
        const PIN11 = 1 << 11;
        const PIN12 = 1 << 12;
        const PIN13 = 1 << 13;
        const PIN14 = 1 << 14;
        const PIN15 = 1 << 15;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Pins {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Pins({=u16:#x})", self.bits())
    }
}

impl Pins {
    /// A single pin. Returns `None` for pin numbers past 15.
    pub const fn pin(n: u8) -> Option<Self> {
        if n < 16 {
            Some(Self::from_bits_retain(1 << n))
        } else {
            None
        }
    }
}

/// GPIO ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Port {
    Port0 = 0,
    Port1 = 1,
    Port2 = 2,
    Port3 = 3,
    Port4 = 4,
}

impl Port {
    const ALL: [Port; gpio::PORTS] = [
        Port::Port0,
        Port::Port1,
        Port::Port2,
        Port::Port3,
        Port::Port4,
    ];
}

/// External interrupt lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ExternalInterrupt {
    Eint0 = 0,
    Eint1 = 1,
    Eint2 = 2,
    Eint3 = 3,
    Eint4 = 4,
    Eint5 = 5,
    Eint6 = 6,
    Eint7 = 7,
    Eint8 = 8,
}

impl ExternalInterrupt {
    const fn irq(self) -> Interrupt {
        match self {
            ExternalInterrupt::Eint0 => Interrupt::Eint0,
            ExternalInterrupt::Eint1 => Interrupt::Eint1,
            ExternalInterrupt::Eint2 => Interrupt::Eint2,
            ExternalInterrupt::Eint3 => Interrupt::Eint3,
            ExternalInterrupt::Eint4 => Interrupt::Eint4,
            ExternalInterrupt::Eint5 => Interrupt::Eint5,
            ExternalInterrupt::Eint6 => Interrupt::Eint6,
            ExternalInterrupt::Eint7 => Interrupt::Eint7,
            ExternalInterrupt::Eint8 => Interrupt::Eint8,
        }
    }
}

/// External interrupt trigger conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum Trigger {
    RisingEdge = 0,
    FallingEdge = 1,
    EitherEdge = 2,
    HighLevel = 3,
    LowLevel = 4,
}

/// Pin group interrupts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Group {
    A,
    B,
}

impl Group {
    const fn irq(self) -> Interrupt {
        match self {
            Group::A => Interrupt::GpioA,
            Group::B => Interrupt::GpioB,
        }
    }
}

/// Tells a GPIO callback what happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// An external interrupt line triggered.
    External(ExternalInterrupt),
    /// A group interrupt fired. Holds the enabled, interrupting pins of
    /// each port, indexed by [`Port`].
    Group(Group, [Pins; gpio::PORTS]),
}

/// One callback per external interrupt, then group A and group B.
const CALLBACKS: usize = 11;

const fn slot(event: Slot) -> usize {
    match event {
        Slot::External(irq) => irq as usize,
        Slot::Group(Group::A) => 9,
        Slot::Group(Group::B) => 10,
    }
}

#[derive(Clone, Copy)]
enum Slot {
    External(ExternalInterrupt),
    Group(Group),
}

struct State {
    users: u32,
    callbacks: [Option<Callback<Event>>; CALLBACKS],
}

/// The GPIO driver.
pub struct Gpio {
    ports: Static<gpio::Ports>,
    idu: Static<idu::RegisterBlock>,
    state: Shared<State>,
}

// Safety: registers are only touched through `&self` methods that
// synchronize with critical sections. OK to place in a static.
unsafe impl Sync for Gpio {}

impl Gpio {
    /// Create the GPIO driver.
    ///
    /// # Safety
    ///
    /// `ports` must point to GPIO port 0, followed by the other ports.
    /// `idu` must point to the power block that holds the external
    /// interrupt registers. Only create one `Gpio`.
    pub const unsafe fn new(ports: *const (), idu: *const ()) -> Self {
        Self {
            ports: Static(ports.cast()),
            idu: Static(idu.cast()),
            state: Shared::new(State {
                users: 0,
                callbacks: [None; CALLBACKS],
            }),
        }
    }

    /// Add a user of the GPIO driver.
    ///
    /// The first user clears every callback.
    pub fn init(&self) -> Result<Handle<'_>> {
        let first = self.state.lock(|state| {
            state.users = state.users.saturating_add(1);
            if state.users == 1 {
                state.callbacks = [None; CALLBACKS];
            }
            state.users == 1
        });
        if first {
            debug!("GPIO initialized");
        }
        Ok(Handle { gpio: self })
    }

    /// Service an external interrupt.
    ///
    /// Runs the line's callback, then clears the latched line.
    pub fn on_external_interrupt(&self, irq: ExternalInterrupt) {
        let callback = self
            .state
            .lock(|state| state.callbacks[slot(Slot::External(irq))]);
        if let Some(callback) = callback {
            callback(Event::External(irq));
        }
        self.idu.EICLR.write(1 << irq as u16);
    }

    /// Service a group interrupt.
    ///
    /// Collects the enabled, interrupting pins of every port, runs the
    /// group's callback, then clears those pins.
    pub fn on_group_interrupt(&self, group: Group) {
        let mut pins = [Pins::empty(); gpio::PORTS];
        for (port, pins) in self.ports.iter().zip(pins.iter_mut()) {
            let enabled = match group {
                Group::A => port.GPIENA.read(),
                Group::B => port.GPIENB.read(),
            };
            *pins = Pins::from_bits_retain(port.GPINT.read() & enabled);
        }
        let callback = self
            .state
            .lock(|state| state.callbacks[slot(Slot::Group(group))]);
        match callback {
            Some(callback) => callback(Event::Group(group, pins)),
            None => warn!("GPIO group interrupt without a callback"),
        }
        for (port, pins) in self.ports.iter().zip(pins) {
            if !pins.is_empty() {
                port.GPINT.write(pins.bits());
            }
        }
    }
}

/// A handle to the GPIO driver.
#[derive(Clone, Copy)]
pub struct Handle<'a> {
    gpio: &'a Gpio,
}

fn check_pins(pins: Pins) -> Result<()> {
    if pins.is_empty() {
        Err(Error::ParamOutOfRange)
    } else {
        Ok(())
    }
}

impl<'a> Handle<'a> {
    fn port(&self, port: Port) -> Result<&'a gpio::RegisterBlock> {
        let gpio = self.gpio;
        if gpio.state.lock(|state| state.users > 0) {
            Ok(&gpio.ports[port as usize])
        } else {
            Err(Error::NotInitialized)
        }
    }

    fn idu(&self) -> Result<&'a idu::RegisterBlock> {
        let gpio = self.gpio;
        if gpio.state.lock(|state| state.users > 0) {
            Ok(&*gpio.idu)
        } else {
            Err(Error::NotInitialized)
        }
    }

    /// Release this user.
    ///
    /// Returns [`Error::NotInitialized`] if there are no users left to
    /// release.
    pub fn uninit(self) -> Result<()> {
        self.gpio.state.lock(|state| {
            if state.users == 0 {
                return Err(Error::NotInitialized);
            }
            state.users -= 1;
            Ok(())
        })
    }

    /// Restore every port to its power-on configuration.
    pub fn reset_to_power_up(&self) -> Result<()> {
        for port in Port::ALL {
            let regs = self.port(port)?;
            regs.GPCON.write(0);
            regs.GPOEN.write(0);
            // Port 0 comes out of reset with pull-ups on the debug pins.
            regs.GPPE.write(if port == Port::Port0 { 0x03c0 } else { 0 });
            regs.GPPOL.write(0);
            regs.GPIENA.write(0);
            regs.GPIENB.write(0);
            regs.GPINT.write(0);
        }
        Ok(())
    }

    /// Select the function of one pin.
    ///
    /// `function` is the two-bit multiplexer code from the pin table.
    pub fn set_mux(&self, port: Port, pin: u8, function: u8) -> Result<()> {
        let regs = self.port(port)?;
        if pin > 15 || function > 3 {
            return Err(Error::ParamOutOfRange);
        }
        let shift = u32::from(pin) * 2;
        critical_section::with(|_| {
            let gpcon = regs.GPCON.read() & !(0b11 << shift);
            regs.GPCON.write(gpcon | (u32::from(function) << shift));
        });
        Ok(())
    }

    /// The function code of one pin.
    pub fn mux(&self, port: Port, pin: u8) -> Result<u8> {
        let regs = self.port(port)?;
        if pin > 15 {
            return Err(Error::ParamOutOfRange);
        }
        Ok(((regs.GPCON.read() >> (u32::from(pin) * 2)) & 0b11) as u8)
    }

    /// The whole port's multiplexer register.
    pub fn pin_muxing(&self, port: Port) -> Result<u32> {
        Ok(self.port(port)?.GPCON.read())
    }

    pub fn set_output_enable(&self, port: Port, pins: Pins, enable: bool) -> Result<()> {
        let regs = self.port(port)?;
        check_pins(pins)?;
        critical_section::with(|_| {
            let value = regs.GPOEN.read();
            regs.GPOEN.write(if enable {
                value | pins.bits()
            } else {
                value & !pins.bits()
            });
        });
        Ok(())
    }

    pub fn output_enable(&self, port: Port) -> Result<Pins> {
        Ok(Pins::from_bits_retain(self.port(port)?.GPOEN.read()))
    }

    pub fn set_input_enable(&self, port: Port, pins: Pins, enable: bool) -> Result<()> {
        let regs = self.port(port)?;
        check_pins(pins)?;
        critical_section::with(|_| {
            let value = regs.GPIEN.read();
            regs.GPIEN.write(if enable {
                value | pins.bits()
            } else {
                value & !pins.bits()
            });
        });
        Ok(())
    }

    pub fn input_enable(&self, port: Port) -> Result<Pins> {
        Ok(Pins::from_bits_retain(self.port(port)?.GPIEN.read()))
    }

    pub fn set_pull_up_enable(&self, port: Port, pins: Pins, enable: bool) -> Result<()> {
        let regs = self.port(port)?;
        check_pins(pins)?;
        critical_section::with(|_| {
            let value = regs.GPPE.read();
            regs.GPPE.write(if enable {
                value | pins.bits()
            } else {
                value & !pins.bits()
            });
        });
        Ok(())
    }

    pub fn pull_up_enable(&self, port: Port) -> Result<Pins> {
        Ok(Pins::from_bits_retain(self.port(port)?.GPPE.read()))
    }

    /// Drive `pins` high. Other pins keep their level.
    pub fn set_high(&self, port: Port, pins: Pins) -> Result<()> {
        let regs = self.port(port)?;
        check_pins(pins)?;
        regs.GPSET.write(pins.bits());
        Ok(())
    }

    /// Drive `pins` low. Other pins keep their level.
    pub fn set_low(&self, port: Port, pins: Pins) -> Result<()> {
        let regs = self.port(port)?;
        check_pins(pins)?;
        regs.GPCLR.write(pins.bits());
        Ok(())
    }

    pub fn toggle(&self, port: Port, pins: Pins) -> Result<()> {
        let regs = self.port(port)?;
        check_pins(pins)?;
        regs.GPTGL.write(pins.bits());
        Ok(())
    }

    /// Write the whole output register. Pins outside `pins` go low.
    pub fn set_data(&self, port: Port, pins: Pins) -> Result<()> {
        self.port(port)?.GPOUT.write(pins.bits());
        Ok(())
    }

    /// The pin levels seen by the input path.
    pub fn data(&self, port: Port) -> Result<Pins> {
        Ok(Pins::from_bits_retain(self.port(port)?.GPIN.read()))
    }

    /// The levels that the port drives.
    pub fn output_data(&self, port: Port) -> Result<Pins> {
        Ok(Pins::from_bits_retain(self.port(port)?.GPOUT.read()))
    }

    /// Configure and unmask an external interrupt.
    pub fn enable_irq(&self, irq: ExternalInterrupt, trigger: Trigger) -> Result<()> {
        let idu = self.idu()?;
        let (reg, shift) = idu.eicfg(irq as u8);
        let mask = (idu::EICFG::MDE::mask | idu::EICFG::EN::mask) << shift;
        let pattern = (idu::EICFG::EN::mask | trigger as u16) << shift;
        critical_section::with(|_| reg.write((reg.read() & !mask) | pattern));
        interrupt::enable(irq.irq());
        Ok(())
    }

    /// Mask an external interrupt. The trigger setting is kept.
    pub fn disable_irq(&self, irq: ExternalInterrupt) -> Result<()> {
        let idu = self.idu()?;
        interrupt::disable(irq.irq());
        let (reg, shift) = idu.eicfg(irq as u8);
        critical_section::with(|_| reg.write(reg.read() & !(idu::EICFG::EN::mask << shift)));
        Ok(())
    }

    /// Clear a latched external interrupt.
    pub fn clear_irq(&self, irq: ExternalInterrupt) -> Result<()> {
        self.idu()?.EICLR.write(1 << irq as u16);
        Ok(())
    }

    /// Register the callback for an external interrupt, or remove it with
    /// `None`.
    pub fn register_callback(
        &self,
        irq: ExternalInterrupt,
        callback: Option<Callback<Event>>,
    ) -> Result<()> {
        self.idu()?;
        self.gpio
            .state
            .lock(|state| state.callbacks[slot(Slot::External(irq))] = callback);
        Ok(())
    }

    /// Register the callback for a group interrupt, or remove it with
    /// `None`.
    pub fn register_group_callback(
        &self,
        group: Group,
        callback: Option<Callback<Event>>,
    ) -> Result<()> {
        self.idu()?;
        self.gpio
            .state
            .lock(|state| state.callbacks[slot(Slot::Group(group))] = callback);
        Ok(())
    }

    /// Select which pins of `port` feed `group`.
    pub fn set_group_interrupt_pins(&self, port: Port, group: Group, pins: Pins) -> Result<()> {
        let regs = self.port(port)?;
        match group {
            Group::A => regs.GPIENA.write(pins.bits()),
            Group::B => regs.GPIENB.write(pins.bits()),
        }
        Ok(())
    }

    pub fn group_interrupt_pins(&self, port: Port, group: Group) -> Result<Pins> {
        let regs = self.port(port)?;
        Ok(Pins::from_bits_retain(match group {
            Group::A => regs.GPIENA.read(),
            Group::B => regs.GPIENB.read(),
        }))
    }

    /// Set the pins that interrupt on a rising edge. The rest interrupt on
    /// a falling edge.
    pub fn set_group_interrupt_polarity(&self, port: Port, pins: Pins) -> Result<()> {
        self.port(port)?.GPPOL.write(pins.bits());
        Ok(())
    }

    pub fn group_interrupt_polarity(&self, port: Port) -> Result<Pins> {
        Ok(Pins::from_bits_retain(self.port(port)?.GPPOL.read()))
    }

    pub fn group_interrupt_status(&self, port: Port) -> Result<Pins> {
        Ok(Pins::from_bits_retain(self.port(port)?.GPINT.read()))
    }

    pub fn clear_group_interrupt_status(&self, port: Port, pins: Pins) -> Result<()> {
        let regs = self.port(port)?;
        check_pins(pins)?;
        regs.GPINT.write(pins.bits());
        Ok(())
    }

    /// Unmask a group interrupt in the NVIC.
    pub fn enable_group_irq(&self, group: Group, enable: bool) -> Result<()> {
        self.idu()?;
        if enable {
            interrupt::enable(group.irq());
        } else {
            interrupt::disable(group.irq());
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ral::testing;
    use core::sync::atomic::{AtomicU32, Ordering};

    pub(crate) fn gpio() -> (
        &'static Gpio,
        &'static gpio::Ports,
        &'static idu::RegisterBlock,
    ) {
        let ports = testing::block::<gpio::Ports>();
        let idu = testing::block::<idu::RegisterBlock>();
        // Safety: test-owned memory.
        let gpio = unsafe {
            Gpio::new(
                ports as *const _ as *const (),
                idu as *const _ as *const (),
            )
        };
        (Box::leak(Box::new(gpio)), ports, idu)
    }

    #[test]
    fn reference_counted() {
        let (gpio, _, _) = gpio();
        let first = gpio.init().unwrap();
        let second = gpio.init().unwrap();
        first.uninit().unwrap();
        // Still one user.
        assert!(second.output_enable(Port::Port1).is_ok());
        second.uninit().unwrap();
        assert_eq!(
            second.output_enable(Port::Port1),
            Err(Error::NotInitialized)
        );
        assert_eq!(second.uninit(), Err(Error::NotInitialized));
    }

    #[test]
    fn enable_accessors_round_trip() {
        let (gpio, ports, _) = gpio();
        let handle = gpio.init().unwrap();
        let pins = Pins::PIN3 | Pins::PIN15;
        handle.set_output_enable(Port::Port2, pins, true).unwrap();
        handle.set_output_enable(Port::Port2, Pins::PIN0, true).unwrap();
        handle
            .set_output_enable(Port::Port2, Pins::PIN3, false)
            .unwrap();
        assert_eq!(
            handle.output_enable(Port::Port2).unwrap(),
            Pins::PIN0 | Pins::PIN15
        );
        assert_eq!(ports[2].GPOEN.read(), 0x8001);

        handle.set_pull_up_enable(Port::Port4, pins, true).unwrap();
        assert_eq!(handle.pull_up_enable(Port::Port4).unwrap(), pins);
        handle.set_input_enable(Port::Port0, pins, true).unwrap();
        assert_eq!(handle.input_enable(Port::Port0).unwrap(), pins);

        assert_eq!(
            handle.set_output_enable(Port::Port2, Pins::empty(), true),
            Err(Error::ParamOutOfRange)
        );
    }

    #[test]
    fn data_registers() {
        let (gpio, ports, _) = gpio();
        let handle = gpio.init().unwrap();
        handle.set_high(Port::Port3, Pins::PIN7).unwrap();
        assert_eq!(testing::peek::<_, u16>(&ports[3].GPSET), 0x80);
        handle.set_low(Port::Port3, Pins::PIN6).unwrap();
        assert_eq!(testing::peek::<_, u16>(&ports[3].GPCLR), 0x40);
        handle.toggle(Port::Port3, Pins::PIN1).unwrap();
        assert_eq!(testing::peek::<_, u16>(&ports[3].GPTGL), 0x02);

        handle.set_data(Port::Port1, Pins::PIN2).unwrap();
        assert_eq!(handle.output_data(Port::Port1).unwrap(), Pins::PIN2);
        testing::poke(&ports[1].GPIN, 0x1234u16);
        assert_eq!(handle.data(Port::Port1).unwrap().bits(), 0x1234);
    }

    #[test]
    fn driven_pins_read_back() {
        let (gpio, ports, _) = gpio();
        let handle = gpio.init().unwrap();
        let pins = Pins::from_bits_truncate(0b0101);
        assert_eq!(pins, Pins::PIN0 | Pins::PIN2);
        handle.set_output_enable(Port::Port0, pins, true).unwrap();
        handle.set_high(Port::Port0, pins).unwrap();
        let driven = testing::peek::<_, u16>(&ports[0].GPSET);
        assert_eq!(driven, 0b0101);

        // The pads feed the driven levels back to GPIN. PIN15 floats high.
        testing::poke(&ports[0].GPIN, driven | 0x8000);
        let data = handle.data(Port::Port0).unwrap();
        assert_eq!(data & pins, pins);
        assert!(data.contains(Pins::PIN15));
        assert!(!data.intersects(Pins::PIN1 | Pins::PIN3));
    }

    #[test]
    fn pin_sets() {
        assert_eq!(Pins::pin(0), Some(Pins::PIN0));
        assert_eq!(Pins::pin(15), Some(Pins::PIN15));
        assert_eq!(Pins::pin(16), None);
        assert_eq!(Pins::all().bits(), 0xffff);
        assert!(Pins::empty().is_empty());
        assert_eq!(!(Pins::PIN0 | Pins::PIN1), Pins::from_bits_retain(0xfffc));
        let mut pins = Pins::PIN4;
        pins |= Pins::PIN9;
        pins.remove(Pins::PIN4);
        assert_eq!(pins.bits(), 1 << 9);
    }

    #[test]
    fn pin_mux() {
        let (gpio, ports, _) = gpio();
        let handle = gpio.init().unwrap();
        handle.set_mux(Port::Port1, 0, 3).unwrap();
        handle.set_mux(Port::Port1, 15, 2).unwrap();
        handle.set_mux(Port::Port1, 0, 1).unwrap();
        assert_eq!(handle.mux(Port::Port1, 0).unwrap(), 1);
        assert_eq!(handle.mux(Port::Port1, 15).unwrap(), 2);
        assert_eq!(ports[1].GPCON.read(), 0x8000_0001);
        assert_eq!(handle.set_mux(Port::Port1, 16, 0), Err(Error::ParamOutOfRange));
        assert_eq!(handle.set_mux(Port::Port1, 1, 4), Err(Error::ParamOutOfRange));

        handle.reset_to_power_up().unwrap();
        assert_eq!(handle.pin_muxing(Port::Port1).unwrap(), 0);
        assert_eq!(ports[0].GPPE.read(), 0x03c0);
    }

    #[test]
    fn external_interrupt_configuration() {
        let (gpio, _, idu) = gpio();
        let handle = gpio.init().unwrap();
        handle
            .enable_irq(ExternalInterrupt::Eint5, Trigger::LowLevel)
            .unwrap();
        assert_eq!(idu.EI1CFG.read(), (0x8 | 4) << 4);
        assert!(interrupt::is_enabled(Interrupt::Eint5));

        handle
            .enable_irq(ExternalInterrupt::Eint5, Trigger::FallingEdge)
            .unwrap();
        assert_eq!(idu.EI1CFG.read(), (0x8 | 1) << 4);

        handle
            .enable_irq(ExternalInterrupt::Eint8, Trigger::EitherEdge)
            .unwrap();
        assert_eq!(idu.EI2CFG.read(), 0x8 | 2);

        handle.disable_irq(ExternalInterrupt::Eint5).unwrap();
        assert_eq!(idu.EI1CFG.read(), 1 << 4);
        assert!(!interrupt::is_enabled(Interrupt::Eint5));

        handle.clear_irq(ExternalInterrupt::Eint3).unwrap();
        assert_eq!(testing::peek::<_, u16>(&idu.EICLR), 1 << 3);
    }

    #[test]
    fn external_interrupt_dispatch() {
        static SEEN: AtomicU32 = AtomicU32::new(u32::MAX);
        let (gpio, _, idu) = gpio();
        let handle = gpio.init().unwrap();
        handle
            .register_callback(
                ExternalInterrupt::Eint2,
                Some(&|event| {
                    if let Event::External(irq) = event {
                        SEEN.store(irq as u32, Ordering::SeqCst);
                    }
                }),
            )
            .unwrap();
        gpio.on_external_interrupt(ExternalInterrupt::Eint2);
        assert_eq!(SEEN.load(Ordering::SeqCst), 2);
        assert_eq!(testing::peek::<_, u16>(&idu.EICLR), 1 << 2);
    }

    #[test]
    fn group_interrupt_dispatch() {
        static PORT2: AtomicU32 = AtomicU32::new(0);
        let (gpio, ports, _) = gpio();
        let handle = gpio.init().unwrap();
        handle
            .set_group_interrupt_pins(Port::Port2, Group::B, Pins::PIN4 | Pins::PIN5)
            .unwrap();
        assert_eq!(
            handle.group_interrupt_pins(Port::Port2, Group::B).unwrap(),
            Pins::PIN4 | Pins::PIN5
        );
        handle
            .register_group_callback(
                Group::B,
                Some(&|event| {
                    if let Event::Group(Group::B, pins) = event {
                        PORT2.store(u32::from(pins[2].bits()), Ordering::SeqCst);
                    }
                }),
            )
            .unwrap();

        // PIN6 is latched but not in group B.
        ports[2].GPINT.write(0x0070);
        gpio.on_group_interrupt(Group::B);
        assert_eq!(PORT2.load(Ordering::SeqCst), 0x0030);
        // Only the group's pins are written back to clear.
        assert_eq!(ports[2].GPINT.read(), 0x0030);
    }
}
