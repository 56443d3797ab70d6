//! Driver errors.

/// An error returned by a driver call.
///
/// Every driver in this crate reports through this one type. Variants
/// that only make sense for one peripheral say so in their documentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// The driver, or the DMA channel, hasn't been initialized.
    NotInitialized,
    /// `init` was called twice without an intervening `uninit`.
    AlreadyInitialized,
    /// A value doesn't fit its hardware bitfield, or isn't valid for
    /// this instance.
    ParamOutOfRange,
    /// The instance doesn't exist on this part.
    BadInstance,
    /// SPI: a DMA transfer is already running on the device.
    DmaAlreadyInUse,
    /// SPI: the DMA channels couldn't be configured.
    BadDmaConfig,
    /// SPI: the chip select GPIO couldn't be configured.
    BadGpioConfig,
    /// SPI: the requested transfer needs DMA, but DMA mode is off.
    NoDmaForDevice,
    /// The operation isn't available in the current mode.
    UnsupportedMode,
    /// RNG: no sample is ready.
    DataNotReady,
    /// UART: no buffer for interrupt mode, or the request can never
    /// fit the buffer.
    InvalidBuffer,
    /// The hardware doesn't support the request.
    NotSupported,
    /// LCD: data register number out of range.
    BadRegisterNumber,
    /// LCD: bias level out of range.
    BadBiasLevel,
    /// A transfer is still in progress.
    Busy,
    /// DMA: channel number out of range, or the channel isn't open.
    InvalidChannel,
    /// DMA: address increment is narrower than the data width.
    InvalidIncrement,
    /// DMA: transfer length is zero or too long for one descriptor.
    InvalidLength,
    /// DMA: the controller reports an unknown state.
    InvalidState,
    /// DMA: protection settings other than none are unsupported.
    InvalidProtection,
    /// DMA: byte swap requires word aligned, fixed-source transfers.
    InvalidByteSwap,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            Error::NotInitialized => "not initialized",
            Error::AlreadyInitialized => "already initialized",
            Error::ParamOutOfRange => "parameter out of range",
            Error::BadInstance => "bad instance",
            Error::DmaAlreadyInUse => "DMA already in use",
            Error::BadDmaConfig => "bad DMA configuration",
            Error::BadGpioConfig => "bad GPIO configuration",
            Error::NoDmaForDevice => "no DMA for device",
            Error::UnsupportedMode => "unsupported mode",
            Error::DataNotReady => "data not ready",
            Error::InvalidBuffer => "invalid buffer",
            Error::NotSupported => "not supported",
            Error::BadRegisterNumber => "bad register number",
            Error::BadBiasLevel => "bad bias level",
            Error::Busy => "busy",
            Error::InvalidChannel => "invalid DMA channel",
            Error::InvalidIncrement => "invalid DMA increment",
            Error::InvalidLength => "invalid DMA length",
            Error::InvalidState => "invalid DMA state",
            Error::InvalidProtection => "invalid DMA protection",
            Error::InvalidByteSwap => "invalid DMA byte swap",
        };
        f.write_str(msg)
    }
}
