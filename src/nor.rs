//! [`FlashDevice`] over a blocking `embedded-storage` NOR driver.

use embedded_storage::nor_flash::NorFlash;

use crate::error::ConfigError;
use crate::flash::{BlackboxConfig, FlashDevice};

/// Adapts any [`NorFlash`] driver.
///
/// `NorFlash` offsets start at zero. If the blackbox region is expressed in a
/// memory-mapped address space (e.g. QSPI at `0x9000_0000`), pass that base to
/// [`with_mapped_base`](Self::with_mapped_base) and it is subtracted before each
/// call. One blackbox erase covers `erase_block_size` bytes, issued as
/// consecutive `F::ERASE_SIZE` erases. The driver completes operations before
/// returning, so the device is never busy.
///
/// A [`FlashBlackbox`](crate::FlashBlackbox) built on this device rejects a
/// layout whose erase block differs from the adapter's, that is not aligned to
/// the driver's erase and write sizes, or that lies outside the device.
pub struct NorFlashDevice<F> {
    flash: F,
    mapped_base: u32,
    erase_block_size: u32,
}

impl<F: NorFlash> NorFlashDevice<F> {
    pub fn new(flash: F) -> Self {
        Self::with_mapped_base(flash, 0)
    }

    pub fn with_mapped_base(flash: F, mapped_base: u32) -> Self {
        Self {
            flash,
            mapped_base,
            erase_block_size: F::ERASE_SIZE as u32,
        }
    }

    /// Erase in blocks of `erase_block_size`, a multiple of `F::ERASE_SIZE`.
    pub fn with_erase_block_size(mut self, erase_block_size: u32) -> Self {
        self.erase_block_size = erase_block_size;
        self
    }

    /// Blackbox layout using this adapter's erase block size.
    pub fn config(&self, region_base: u32, region_size: u32, page_size: u32) -> BlackboxConfig {
        BlackboxConfig::new(region_base, region_size, page_size, self.erase_block_size)
    }

    pub fn inner(&mut self) -> &mut F {
        &mut self.flash
    }

    pub fn release(self) -> F {
        self.flash
    }
}

impl<F: NorFlash> FlashDevice for NorFlashDevice<F> {
    type Error = F::Error;

    fn erase(&mut self, address: u32) -> Result<(), Self::Error> {
        // check_layout guarantees address >= mapped_base.
        let from = address - self.mapped_base;
        let step = F::ERASE_SIZE as u32;
        let mut at = from;
        while at < from + self.erase_block_size {
            self.flash.erase(at, at + step)?;
            at += step;
        }
        Ok(())
    }

    fn program(&mut self, address: u32, data: &[u8]) -> Result<(), Self::Error> {
        self.flash.write(address - self.mapped_base, data)
    }

    fn is_busy(&mut self) -> bool {
        false
    }

    fn check_layout(&self, config: &BlackboxConfig, entry_size: usize) -> Result<(), ConfigError> {
        let erase = F::ERASE_SIZE as u64;
        let write = F::WRITE_SIZE as u64;
        let block = config.erase_block_size as u64;
        if erase == 0 || write == 0 || block != self.erase_block_size as u64 || block % erase != 0 {
            return Err(ConfigError::DeviceGeometry);
        }

        let Some(offset) = config.region_base.checked_sub(self.mapped_base) else {
            return Err(ConfigError::OutsideDevice);
        };
        if offset as u64 + config.region_size as u64 > self.flash.capacity() as u64 {
            return Err(ConfigError::OutsideDevice);
        }

        if offset as u64 % erase != 0 || offset as u64 % write != 0 || entry_size as u64 % write != 0 {
            return Err(ConfigError::DeviceGeometry);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::NorFlashDevice;
    use crate::error::ConfigError;
    use crate::flash::{BlackboxConfig, FlashBlackbox};
    use embedded_storage::nor_flash::{ErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash};
    use std::vec;
    use std::vec::Vec;

    struct RamNor {
        mem: Vec<u8>,
        erases: Vec<(u32, u32)>,
    }

    impl RamNor {
        fn new(size: usize) -> Self {
            Self {
                mem: vec![0; size],
                erases: Vec::new(),
            }
        }
    }

    impl ErrorType for RamNor {
        type Error = NorFlashErrorKind;
    }

    impl ReadNorFlash for RamNor {
        const READ_SIZE: usize = 1;

        fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
            let off = offset as usize;
            bytes.copy_from_slice(&self.mem[off..off + bytes.len()]);
            Ok(())
        }

        fn capacity(&self) -> usize {
            self.mem.len()
        }
    }

    impl NorFlash for RamNor {
        const WRITE_SIZE: usize = 4;
        const ERASE_SIZE: usize = 1024;

        fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
            if to as usize > self.mem.len() {
                return Err(NorFlashErrorKind::OutOfBounds);
            }
            if from as usize % Self::ERASE_SIZE != 0 || to as usize % Self::ERASE_SIZE != 0 {
                return Err(NorFlashErrorKind::NotAligned);
            }
            self.mem[from as usize..to as usize].fill(0xFF);
            self.erases.push((from, to));
            Ok(())
        }

        fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
            if offset as usize % Self::WRITE_SIZE != 0 {
                return Err(NorFlashErrorKind::NotAligned);
            }
            let off = offset as usize;
            let cells = &mut self.mem[off..off + bytes.len()];
            assert!(
                cells.iter().all(|b| *b == 0xFF),
                "write at {offset:#x} into unerased flash"
            );
            cells.copy_from_slice(bytes);
            Ok(())
        }
    }

    #[test]
    fn drives_a_norflash_through_the_blackbox() {
        let device = NorFlashDevice::with_mapped_base(RamNor::new(4096), 0x9000_0000);
        let config = device.config(0x9000_0000 + 2048, 2048, 256);
        let mut bb = FlashBlackbox::<_, 256>::new(device, config).unwrap();

        for i in 0..5u8 {
            bb.write(&[i; 256]).unwrap();
        }

        let mut device = bb.release();
        let nor = device.inner();
        assert_eq!(nor.erases, [(2048, 3072), (3072, 4096)]);
        let mut buf = [0u8; 256];
        nor.read(2048 + 4 * 256, &mut buf).unwrap();
        assert_eq!(buf, [4u8; 256]);
    }

    #[test]
    fn larger_erase_block_is_erased_in_driver_chunks() {
        let device = NorFlashDevice::new(RamNor::new(4096)).with_erase_block_size(2048);
        let config = BlackboxConfig::new(0, 4096, 256, 2048);
        let mut bb = FlashBlackbox::<_, 256>::new(device, config).unwrap();

        for i in 0..8u8 {
            bb.write(&[i; 256]).unwrap();
        }

        let mut device = bb.release();
        let nor = device.inner();
        assert_eq!(nor.erases, [(0, 1024), (1024, 2048)]);
        let mut buf = [0u8; 256];
        nor.read(7 * 256, &mut buf).unwrap();
        assert_eq!(buf, [7u8; 256]);
    }

    #[test]
    fn rejects_erase_block_the_adapter_does_not_use() {
        // Adapter erases 1024 B, layout expects 2048 B blocks.
        let config = BlackboxConfig::new(0, 4096, 256, 2048);
        let res = FlashBlackbox::<_, 256>::new(NorFlashDevice::new(RamNor::new(4096)), config);
        assert!(matches!(res, Err(ConfigError::DeviceGeometry)));

        // Blocks smaller than the driver can erase.
        let device = NorFlashDevice::new(RamNor::new(4096)).with_erase_block_size(512);
        let config = BlackboxConfig::new(0, 4096, 256, 512);
        let res = FlashBlackbox::<_, 256>::new(device, config);
        assert!(matches!(res, Err(ConfigError::DeviceGeometry)));
    }

    #[test]
    fn rejects_region_below_mapped_base() {
        let device = NorFlashDevice::with_mapped_base(RamNor::new(4096), 0x9000_0000);
        let config = BlackboxConfig::new(0, 2048, 256, 1024);
        let res = FlashBlackbox::<_, 256>::new(device, config);
        assert!(matches!(res, Err(ConfigError::OutsideDevice)));
    }

    #[test]
    fn rejects_region_past_capacity() {
        let config = BlackboxConfig::new(2048, 4096, 256, 1024);
        let res = FlashBlackbox::<_, 256>::new(NorFlashDevice::new(RamNor::new(4096)), config);
        assert!(matches!(res, Err(ConfigError::OutsideDevice)));
    }

    #[test]
    fn rejects_entries_off_the_write_granularity() {
        let config = BlackboxConfig::new(0, 4096, 256, 1024);
        let res = FlashBlackbox::<_, 2>::new(NorFlashDevice::new(RamNor::new(4096)), config);
        assert!(matches!(res, Err(ConfigError::DeviceGeometry)));
    }
}
