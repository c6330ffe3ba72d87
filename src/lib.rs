//! Crash-surviving event log ("blackbox") for NOR flash on no-std embedded targets.
//!
//! # Highlights
//! - Lock-free SPSC capture ring: a periodic producer (timer interrupt, 1 kHz
//!   loop) fills fixed-size entries in RAM and never touches flash.
//! - A background flusher persists entries into a circular flash region, erasing
//!   each erase block just before the first write into it and wrapping at the
//!   end of the region.
//! - No allocation, no locks, bounded busy waits.
//!
//! # Quick start
//! ```
//! use ph_blackbox::{BlackboxConfig, EntryRing, FlashBlackbox, FlashDevice, Flusher};
//!
//! struct Ram(Vec<u8>);
//!
//! impl FlashDevice for Ram {
//!     type Error = ();
//!     fn erase(&mut self, addr: u32) -> Result<(), ()> {
//!         self.0[addr as usize..addr as usize + 4096].fill(0xFF);
//!         Ok(())
//!     }
//!     fn program(&mut self, addr: u32, data: &[u8]) -> Result<(), ()> {
//!         self.0[addr as usize..addr as usize + data.len()].copy_from_slice(data);
//!         Ok(())
//!     }
//!     fn is_busy(&mut self) -> bool {
//!         false
//!     }
//! }
//!
//! static RING: EntryRing<256, 64> = EntryRing::new();
//!
//! let producer = RING.producer();
//! let flash = FlashBlackbox::new(Ram(vec![0; 8192]), BlackboxConfig::qspi_nor(0, 8192)).unwrap();
//! let mut flusher = Flusher::new(RING.consumer(), flash);
//!
//! // timer callback
//! producer.capture(|entry| entry[..4].copy_from_slice(&1234u32.to_le_bytes()));
//!
//! // background task
//! assert_eq!(flusher.flush(), Ok(1));
//! assert_eq!(flusher.flash().cursor(), 256);
//! ```
//!
//! # No-std
//! The crate is `#![no_std]` by default. Tests require `std`.
//!
//! # Safety and concurrency
//! Exactly one producer and one consumer may be active per ring.
//! `producer()`/`consumer()` panic if called while another handle of the same kind is live.
//! Handles are `Send` but not `Sync`, so a single handle cannot be used from two contexts at once.
//!
//! # Semantics
//! - A full ring drops the new capture and counts it; unflushed entries are never overwritten.
//! - A flash error leaves both the ring and the write cursor unadvanced; the next
//!   `flush` retries the same entry at the same address.
//! - The flash layout is a contiguous run of entries from `region_base`, wrapping
//!   at `region_size`, with no headers.
//! - The write cursor lives in RAM. Keep [`FlashBlackbox::cursor`] somewhere that
//!   survives reset and pass it to [`FlashBlackbox::resume`] to continue a log.
//!
//! # Features
//! - `defmt`, `log`: emit diagnostics through the chosen logger.
//! - `embedded-storage`: `nor::NorFlashDevice` adapter for `NorFlash` drivers.
//! - `portable-atomic*`: atomics for targets without native CAS.
#![no_std]

mod fmt;

mod atomic;
pub mod blackbox;
pub mod entry_ring;
pub mod error;
pub mod flash;
#[cfg(feature = "embedded-storage")]
pub mod nor;

pub use blackbox::Flusher;
pub use entry_ring::{Consumer, EntryRing, Producer};
pub use error::{ConfigError, Error, Operation, RingFull};
pub use flash::{BlackboxConfig, FlashBlackbox, FlashDevice};
#[cfg(feature = "embedded-storage")]
pub use nor::NorFlashDevice;

#[cfg(test)]
extern crate std;

#[cfg(test)]
mod testutil;
