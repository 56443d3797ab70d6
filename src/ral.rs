//! A RAL-like module for ADuCM350 register access
//!
//! Each peripheral gets a `#[repr(C)]` register block and a module per
//! register holding its fields. Field modules carry `offset` and `mask`
//! so that the `ral_registers` macros work, for example
//!
//! ```ignore
//! ral::modify_reg!(ral::beep, beep, CFG, EN: 1);
//! ```
//!
//! Register blocks only describe the registers that the drivers touch.
//! Reserved gaps keep the offsets faithful to the silicon, and every block
//! asserts its layout at compile time.

#![allow(
    non_snake_case, // Compatibility with RAL
    non_upper_case_globals, // Field offset / mask names
    unused,
)]

pub use ral_registers::{modify_reg, read_reg, write_reg};
use ral_registers::{RORegister, RWRegister, WORegister};

/// Declare bitfields for a register.
///
/// `NAME @ offset : width` expands to a module with the `offset`, `mask`
/// and (empty) `R`, `W` and `RW` enumerations expected by the RAL macros.
macro_rules! fields {
    ($ty:ty; $( $name:ident @ $offset:literal : $width:literal ),* $(,)?) => {
        $(
            pub mod $name {
                pub const offset: $ty = $offset;
                pub const mask: $ty = ((((1u64 << $width) - 1) << $offset) & (<$ty>::MAX as u64)) as $ty;
                pub mod R {}
                pub mod W {}
                pub mod RW {}
            }
        )*
    };
}

pub mod beep;
pub mod dma;
pub mod gpio;
pub mod gpt;
pub mod idu;
pub mod lcd;
pub mod pdi;
pub mod rng;
pub mod spi;
pub mod uart;
pub mod wut;

//
// Helper types for static memory
//
// Similar to the RAL's `Instance` type, but more copy.
//

pub(crate) struct Static<T>(pub(crate) *const T);
impl<T> core::ops::Deref for Static<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        // Safety: pointer points to static memory (peripheral memory)
        unsafe { &*self.0 }
    }
}
impl<T> Clone for Static<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Static<T> {}

/// Peripheral base addresses.
pub mod address {
    pub const GPT0: *const () = 0x4000_0000 as _;
    pub const GPT1: *const () = 0x4000_0400 as _;
    pub const GPT2: *const () = 0x4000_0800 as _;
    pub const PWR: *const () = 0x4000_2400 as _;
    pub const WUT: *const () = 0x4000_2500 as _;
    pub const SPI0: *const () = 0x4000_4000 as _;
    pub const SPI1: *const () = 0x4000_4400 as _;
    pub const UART: *const () = 0x4000_5000 as _;
    pub const BEEP: *const () = 0x4000_5c00 as _;
    pub const RNG: *const () = 0x4000_6000 as _;
    pub const LCD: *const () = 0x4000_8000 as _;
    pub const DMA: *const () = 0x4001_0000 as _;
    pub const GPIO: *const () = 0x4002_0000 as _;
    pub const SPIH: *const () = 0x4002_4000 as _;
    /// GPF DMA channel assignment control.
    pub const GPFDMACTL: *const () = 0x4002_8100 as _;
    pub const PDI: *const () = 0x4003_0000 as _;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Register blocks backed by RAM.

    /// Allocate a zeroed register block that lives for the rest of the test.
    pub fn block<T>() -> &'static T {
        // Safety: register blocks are plain integers, so all-zeroes is valid.
        Box::leak(Box::new(unsafe { core::mem::zeroed::<T>() }))
    }

    /// Read back any register, including write-only ones.
    pub fn peek<R, T: Copy>(reg: &R) -> T {
        debug_assert_eq!(core::mem::size_of::<R>(), core::mem::size_of::<T>());
        // Safety: registers are transparent wrappers over their integer.
        unsafe { core::ptr::read_volatile(reg as *const R as *const T) }
    }

    /// Write any register, including read-only ones, to stand in for hardware.
    pub fn poke<R, T: Copy>(reg: &R, value: T) {
        debug_assert_eq!(core::mem::size_of::<R>(), core::mem::size_of::<T>());
        // Safety: registers have interior mutability, and are transparent
        // wrappers over their integer.
        unsafe { core::ptr::write_volatile(core::ptr::addr_of!(*reg) as *mut T, value) }
    }
}
