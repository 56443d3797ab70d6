//! Interrupt numbers and NVIC access.
//!
//! Drivers unmask and mask their own vectors. On the target this goes
//! through the Cortex-M NVIC. Off target, the enable state is kept in
//! memory so that driver behavior can be observed in tests.

use core::cell::RefCell;
use critical_section::Mutex;

/// Driver state that's shared with an interrupt handler.
///
/// Not reentrant. A closure passed to `lock` must not lock the same
/// state again, and must not run user callbacks.
pub(crate) struct Shared<T>(Mutex<RefCell<T>>);

impl<T> Shared<T> {
    pub(crate) const fn new(value: T) -> Self {
        Self(Mutex::new(RefCell::new(value)))
    }

    pub(crate) fn lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        critical_section::with(|cs| f(&mut self.0.borrow_ref_mut(cs)))
    }
}

/// ADuCM350 interrupt vectors used by the drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum Interrupt {
    WakeupTimer = 0,
    Eint0 = 1,
    Eint1 = 2,
    Eint2 = 3,
    Eint3 = 4,
    Eint4 = 5,
    Eint5 = 6,
    Eint6 = 7,
    Eint7 = 8,
    Eint8 = 9,
    Timer0 = 11,
    Timer1 = 12,
    Uart = 14,
    Spi0 = 15,
    Spih = 16,
    DmaSpihTx = 20,
    DmaSpihRx = 21,
    DmaSpi0Tx = 22,
    DmaSpi0Rx = 23,
    DmaSpi1Tx = 24,
    DmaSpi1Rx = 25,
    DmaPdi = 34,
    UsbController = 37,
    Timer2 = 40,
    Spi1 = 42,
    Beep = 45,
    Lcd = 46,
    GpioA = 47,
    GpioB = 48,
    Rng = 58,
    Pdi = 59,
}

// Safety: every discriminant is a valid ADuCM350 vector number.
unsafe impl cortex_m::interrupt::InterruptNumber for Interrupt {
    fn number(self) -> u16 {
        self as u16
    }
}

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "arm", target_os = "none"))] {
        use cortex_m::peripheral::NVIC;

        /// Unmask `irq` in the NVIC.
        pub(crate) fn enable(irq: Interrupt) {
            // Safety: drivers only unmask their own vectors once their state
            // is ready for the handler.
            unsafe { NVIC::unmask(irq) };
        }

        /// Mask `irq` in the NVIC.
        pub(crate) fn disable(irq: Interrupt) {
            NVIC::mask(irq);
        }

        /// Returns `true` if `irq` is unmasked.
        pub fn is_enabled(irq: Interrupt) -> bool {
            NVIC::is_enabled(irq)
        }

        /// Clear a pending `irq`.
        pub(crate) fn unpend(irq: Interrupt) {
            NVIC::unpend(irq);
        }

        /// Sleep the core until the next interrupt.
        pub(crate) fn wait_for_interrupt() {
            cortex_m::asm::wfi();
        }
    } else {
        #[cfg(test)]
        std::thread_local! {
            static ENABLED: core::cell::Cell<u64> = const { core::cell::Cell::new(0) };
        }

        #[cfg(not(test))]
        static ENABLED: core::sync::atomic::AtomicU64 = core::sync::atomic::AtomicU64::new(0);

        fn update(f: impl FnOnce(u64) -> u64) {
            #[cfg(test)]
            ENABLED.with(|cell| cell.set(f(cell.get())));
            #[cfg(not(test))]
            critical_section::with(|_| {
                use core::sync::atomic::Ordering;
                ENABLED.store(f(ENABLED.load(Ordering::Relaxed)), Ordering::Relaxed);
            });
        }

        fn load() -> u64 {
            #[cfg(test)]
            return ENABLED.with(|cell| cell.get());
            #[cfg(not(test))]
            return ENABLED.load(core::sync::atomic::Ordering::Relaxed);
        }

        pub(crate) fn enable(irq: Interrupt) {
            update(|bits| bits | (1 << irq as u16));
        }

        pub(crate) fn disable(irq: Interrupt) {
            update(|bits| bits & !(1 << irq as u16));
        }

        pub fn is_enabled(irq: Interrupt) -> bool {
            load() & (1 << irq as u16) != 0
        }

        pub(crate) fn unpend(_: Interrupt) {}

        pub(crate) fn wait_for_interrupt() {
            core::hint::spin_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enable_disable() {
        assert!(!is_enabled(Interrupt::Beep));
        enable(Interrupt::Beep);
        enable(Interrupt::Pdi);
        assert!(is_enabled(Interrupt::Beep));
        assert!(is_enabled(Interrupt::Pdi));
        disable(Interrupt::Beep);
        assert!(!is_enabled(Interrupt::Beep));
        assert!(is_enabled(Interrupt::Pdi));
    }
}
