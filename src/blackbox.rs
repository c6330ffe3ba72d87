//! Background flush task tying the capture ring to the flash writer.

use crate::entry_ring::Consumer;
use crate::error::Error;
use crate::flash::{FlashBlackbox, FlashDevice};

/// Consumer half of a blackbox: drains the ring into flash.
///
/// Run [`flush`](Self::flush) from a low-priority task. A failed flush leaves
/// the failing entry at the head of the ring and the cursor on its address, so
/// calling `flush` again retries it. This type does not give up on its own;
/// use [`consecutive_failures`](Self::consecutive_failures) to decide when to.
pub struct Flusher<'a, D: FlashDevice, const E: usize, const N: usize> {
    consumer: Consumer<'a, E, N>,
    flash: FlashBlackbox<D, E>,
    consecutive_failures: u32,
}

impl<'a, D: FlashDevice, const E: usize, const N: usize> Flusher<'a, D, E, N> {
    pub fn new(consumer: Consumer<'a, E, N>, flash: FlashBlackbox<D, E>) -> Self {
        Self {
            consumer,
            flash,
            consecutive_failures: 0,
        }
    }

    /// Persist every entry captured so far.
    ///
    /// Returns how many entries were written, or the first flash error.
    pub fn flush(&mut self) -> Result<usize, Error<D::Error>> {
        let flash = &mut self.flash;
        let mut written = 0usize;
        let res = self
            .consumer
            .drain(|entry| flash.write(entry).map(|()| written += 1));

        match res {
            Ok(n) => {
                self.consecutive_failures = 0;
                if n > 0 {
                    trace!("blackbox flushed {} entries", n);
                }
                Ok(n)
            }
            Err(err) => {
                // Progress before the failure means a new entry is now stuck.
                self.consecutive_failures = if written > 0 {
                    1
                } else {
                    self.consecutive_failures.saturating_add(1)
                };
                warn!(
                    "blackbox flush stopped after {} entries ({} failures in a row)",
                    written,
                    self.consecutive_failures
                );
                Err(err)
            }
        }
    }

    /// Flushes in a row that failed on the same entry.
    #[inline]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Entries captured but not yet persisted.
    #[inline]
    pub fn pending(&self) -> usize {
        self.consumer.pending()
    }

    #[inline]
    pub fn flash(&self) -> &FlashBlackbox<D, E> {
        &self.flash
    }

    #[inline]
    pub fn flash_mut(&mut self) -> &mut FlashBlackbox<D, E> {
        &mut self.flash
    }

    pub fn into_parts(self) -> (Consumer<'a, E, N>, FlashBlackbox<D, E>) {
        (self.consumer, self.flash)
    }
}
