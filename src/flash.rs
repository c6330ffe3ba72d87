//! Wraparound NOR flash writer.
//!
//! [`FlashBlackbox`] owns a write cursor inside `[region_base, region_base +
//! region_size)` and programs one entry per call. An erase block is erased
//! right before the first entry of a lap lands in it, so everything ahead of
//! the cursor still holds the previous lap. Entries are programmed as-is with
//! no padding, header or checksum; a reader needs to know the entry size.
//!
//! The cursor is volatile. Platforms that keep it in retention RAM across a
//! reset hand it back through [`FlashBlackbox::resume`].

use crate::error::{ConfigError, Error, Operation};

/// Blocking NOR flash command interface.
///
/// Addresses are absolute, in the same space as
/// [`BlackboxConfig::region_base`].
pub trait FlashDevice {
    type Error;

    /// Start erasing the erase block beginning at `address`.
    fn erase(&mut self, address: u32) -> Result<(), Self::Error>;

    /// Start programming `data` at `address`. `data` never crosses a page.
    fn program(&mut self, address: u32, data: &[u8]) -> Result<(), Self::Error>;

    /// Whether the last erase or program is still in progress.
    fn is_busy(&mut self) -> bool;

    /// Reject a layout this device cannot serve. Called once when a
    /// [`FlashBlackbox`] is built, after [`BlackboxConfig::validate`].
    fn check_layout(&self, config: &BlackboxConfig, entry_size: usize) -> Result<(), ConfigError> {
        let _ = (config, entry_size);
        Ok(())
    }
}

impl<T: FlashDevice + ?Sized> FlashDevice for &mut T {
    type Error = T::Error;

    #[inline]
    fn erase(&mut self, address: u32) -> Result<(), Self::Error> {
        T::erase(self, address)
    }

    #[inline]
    fn program(&mut self, address: u32, data: &[u8]) -> Result<(), Self::Error> {
        T::program(self, address, data)
    }

    #[inline]
    fn is_busy(&mut self) -> bool {
        T::is_busy(self)
    }

    #[inline]
    fn check_layout(&self, config: &BlackboxConfig, entry_size: usize) -> Result<(), ConfigError> {
        T::check_layout(self, config, entry_size)
    }
}

/// Page size of common QSPI NOR parts.
pub const QSPI_NOR_PAGE_SIZE: u32 = 256;
/// Smallest (sector) erase of common QSPI NOR parts.
pub const QSPI_NOR_SECTOR_SIZE: u32 = 4096;
/// Default number of busy polls before an erase or program is declared timed out.
pub const DEFAULT_BUSY_POLL_LIMIT: u32 = 1_000_000;

/// Region layout and device geometry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BlackboxConfig {
    /// First address of the region. Must be erase block aligned.
    pub region_base: u32,
    /// Region length in bytes. Must be a multiple of `erase_block_size`.
    pub region_size: u32,
    /// Program granularity.
    pub page_size: u32,
    /// Erase granularity. Must be a multiple of `page_size`.
    pub erase_block_size: u32,
    /// `is_busy` polls allowed after each erase or program.
    pub busy_poll_limit: u32,
}

impl BlackboxConfig {
    pub const fn new(region_base: u32, region_size: u32, page_size: u32, erase_block_size: u32) -> Self {
        Self {
            region_base,
            region_size,
            page_size,
            erase_block_size,
            busy_poll_limit: DEFAULT_BUSY_POLL_LIMIT,
        }
    }

    /// 256 B pages with 4 KiB sector erase.
    pub const fn qspi_nor(region_base: u32, region_size: u32) -> Self {
        Self::new(region_base, region_size, QSPI_NOR_PAGE_SIZE, QSPI_NOR_SECTOR_SIZE)
    }

    pub const fn with_busy_poll_limit(mut self, busy_poll_limit: u32) -> Self {
        self.busy_poll_limit = busy_poll_limit;
        self
    }

    /// Check the layout for entries of `entry_size` bytes.
    ///
    /// The entry must evenly divide `page_size`, not just `erase_block_size`:
    /// NOR page program wraps within a page, so an entry crossing one would
    /// overwrite the start of that page.
    ///
    /// Usable in a `const` item to reject a bad layout at compile time.
    pub const fn validate(&self, entry_size: usize) -> Result<(), ConfigError> {
        if entry_size == 0
            || self.page_size == 0
            || self.erase_block_size == 0
            || self.region_size == 0
            || self.busy_poll_limit == 0
        {
            return Err(ConfigError::ZeroSize);
        }
        if self.region_size % self.erase_block_size != 0 {
            return Err(ConfigError::RegionNotBlockMultiple);
        }
        if self.erase_block_size % self.page_size != 0 {
            return Err(ConfigError::BlockNotPageMultiple);
        }
        let entry = entry_size as u64;
        let page = self.page_size as u64;
        if entry > page || page % entry != 0 {
            return Err(ConfigError::EntryPageMismatch);
        }
        if self.region_base % self.erase_block_size != 0 {
            return Err(ConfigError::UnalignedBase);
        }
        if self.region_base as u64 + self.region_size as u64 > 1u64 << 32 {
            return Err(ConfigError::RegionOverflow);
        }
        Ok(())
    }

    /// Entries that fit in one lap of the region, `0` if `entry_size` is zero.
    pub const fn entries_per_lap(&self, entry_size: usize) -> u32 {
        match (self.region_size as u64).checked_div(entry_size as u64) {
            Some(n) => n as u32,
            None => 0,
        }
    }
}

/// Circular entry writer over a NOR flash region.
pub struct FlashBlackbox<D: FlashDevice, const E: usize> {
    device: D,
    config: BlackboxConfig,
    cursor: u32,
    laps: u32,
    // The block at the cursor was erased but nothing has been programmed into
    // it yet (a program failed after the erase).
    block_erased: bool,
}

impl<D: FlashDevice, const E: usize> FlashBlackbox<D, E> {
    /// Start a blackbox at the beginning of the region (cold boot).
    pub fn new(device: D, config: BlackboxConfig) -> Result<Self, ConfigError> {
        Self::resume(device, config, 0)
    }

    /// Continue writing at `cursor`, an offset previously read from
    /// [`cursor`](Self::cursor) and kept across a reset.
    ///
    /// Resuming inside an erase block assumes the rest of that block is still
    /// erased; resuming on a block boundary erases the block first.
    pub fn resume(device: D, config: BlackboxConfig, cursor: u32) -> Result<Self, ConfigError> {
        config.validate(E)?;
        device.check_layout(&config, E)?;
        if cursor >= config.region_size || cursor as usize % E != 0 {
            return Err(ConfigError::InvalidCursor);
        }
        debug!(
            "blackbox region {:#x}+{:#x}, cursor {:#x}",
            config.region_base,
            config.region_size,
            cursor
        );
        Ok(Self {
            device,
            config,
            cursor,
            laps: 0,
            block_erased: false,
        })
    }

    /// Offset of the next entry within the region.
    #[inline]
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    /// Absolute address of the next entry.
    #[inline]
    pub fn next_address(&self) -> u32 {
        self.config.region_base + self.cursor
    }

    /// Times the cursor wrapped back to the start of the region.
    #[inline]
    pub fn laps(&self) -> u32 {
        self.laps
    }

    #[inline]
    pub fn config(&self) -> &BlackboxConfig {
        &self.config
    }

    #[inline]
    pub fn device(&self) -> &D {
        &self.device
    }

    #[inline]
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Give back the device. The cursor is lost unless saved first.
    pub fn release(self) -> D {
        self.device
    }

    /// Persist one entry at the cursor and advance it.
    ///
    /// Erases the block first when the cursor sits on an erase block boundary.
    /// Blocks until the device is ready or the poll budget runs out. On error
    /// the cursor does not move and the next call retries the same address.
    pub fn write(&mut self, entry: &[u8; E]) -> Result<(), Error<D::Error>> {
        let address = self.next_address();

        if self.cursor % self.config.erase_block_size == 0 && !self.block_erased {
            trace!("blackbox erase {:#x}", address);
            self.device.erase(address).map_err(|source| {
                warn!("blackbox erase at {:#x} rejected", address);
                Error::Device {
                    operation: Operation::Erase,
                    address,
                    source,
                }
            })?;
            self.wait_ready(Operation::Erase, address)?;
            self.block_erased = true;
        }

        self.device.program(address, entry).map_err(|source| {
            warn!("blackbox program at {:#x} rejected", address);
            Error::Device {
                operation: Operation::Program,
                address,
                source,
            }
        })?;
        self.wait_ready(Operation::Program, address)?;
        self.block_erased = false;

        self.advance();
        Ok(())
    }

    fn wait_ready(&mut self, operation: Operation, address: u32) -> Result<(), Error<D::Error>> {
        for _ in 0..self.config.busy_poll_limit {
            if !self.device.is_busy() {
                return Ok(());
            }
        }
        warn!("blackbox {} at {:#x} timed out", operation, address);
        Err(Error::DeviceTimeout { operation, address })
    }

    fn advance(&mut self) {
        // cursor <= region_size - E, so this cannot overflow.
        let next = self.cursor + E as u32;
        if next >= self.config.region_size {
            self.cursor = 0;
            self.laps = self.laps.wrapping_add(1);
            debug!("blackbox wrapped, lap {}", self.laps);
        } else {
            self.cursor = next;
        }
    }
}
