use core::fmt;

/// The capture ring had no free slot; the entry was dropped.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RingFull;

impl fmt::Display for RingFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("capture ring full")
    }
}

impl core::error::Error for RingFull {}

/// Flash operation in flight when a device error or timeout occurred.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Operation {
    Erase,
    Program,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Erase => f.write_str("erase"),
            Operation::Program => f.write_str("program"),
        }
    }
}

/// Error returned by a blackbox flash write or flush.
///
/// In every case the write cursor and the capture ring are left unadvanced, so
/// the same entry is retried at the same address on the next call.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// The device stayed busy for the whole poll budget.
    DeviceTimeout { operation: Operation, address: u32 },
    /// The device rejected the command or the bus transfer failed.
    Device { operation: Operation, address: u32, source: E },
}

impl<E> Error<E> {
    pub fn operation(&self) -> Operation {
        match self {
            Error::DeviceTimeout { operation, .. } | Error::Device { operation, .. } => *operation,
        }
    }

    pub fn address(&self) -> u32 {
        match self {
            Error::DeviceTimeout { address, .. } | Error::Device { address, .. } => *address,
        }
    }
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DeviceTimeout { operation, address } => {
                write!(f, "flash {operation} at {address:#010x} timed out")
            }
            Error::Device {
                operation,
                address,
                source,
            } => write!(f, "flash {operation} at {address:#010x} failed: {source:?}"),
        }
    }
}

impl<E: fmt::Debug> core::error::Error for Error<E> {}

/// Flash geometry or region layout rejected at configuration time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// A size parameter (entry, page, erase block, region, poll budget) is zero.
    ZeroSize,
    /// `region_size` is not a multiple of `erase_block_size`.
    RegionNotBlockMultiple,
    /// `erase_block_size` is not a multiple of `page_size`.
    BlockNotPageMultiple,
    /// The entry is larger than a page or does not divide it evenly.
    EntryPageMismatch,
    /// `region_base` is not aligned to `erase_block_size`.
    UnalignedBase,
    /// `region_base + region_size` does not fit in the 32-bit address space.
    RegionOverflow,
    /// A resumed cursor lies outside the region or off an entry boundary.
    InvalidCursor,
    /// The device's erase or write granularity does not fit the layout.
    DeviceGeometry,
    /// The region is not addressable through the device.
    OutsideDevice,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ConfigError::ZeroSize => "size parameter is zero",
            ConfigError::RegionNotBlockMultiple => "region size is not a multiple of the erase block size",
            ConfigError::BlockNotPageMultiple => "erase block size is not a multiple of the page size",
            ConfigError::EntryPageMismatch => "entry size must evenly divide the page size",
            ConfigError::UnalignedBase => "region base is not erase block aligned",
            ConfigError::RegionOverflow => "region end overflows the address space",
            ConfigError::InvalidCursor => "cursor is outside the region or not entry aligned",
            ConfigError::DeviceGeometry => "device erase or write size does not fit the layout",
            ConfigError::OutsideDevice => "region is not addressable through the device",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for ConfigError {}
