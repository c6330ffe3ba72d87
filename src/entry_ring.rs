//! Lock-free SPSC capture ring of fixed-size log entries.
//!
//! # Overview
//! - Single producer, single consumer, each represented by a handle that can be
//!   live at most once per ring.
//! - The producer fills a slot in place through an encoder closure and never
//!   blocks or allocates, so it may run from a timer interrupt.
//! - The consumer hands each published slot to a sink (typically a flash write)
//!   and commits it only once the sink succeeds. A failing sink leaves the entry
//!   in place for the next drain (at-least-once delivery).
//!
//! # Full ring
//! When the producer is `N` entries ahead of the consumer the new capture is
//! **dropped**: the encoder is not called, already captured entries are kept and
//! the ring's drop counter is incremented. Unconsumed entries are never
//! overwritten.
//!
//! # Memory ordering
//! The producer writes the slot, then publishes `write_index` with `Release`.
//! The consumer loads `write_index` with `Acquire` before reading slots and
//! publishes `commit_index` with `Release` once the sink is done with a slot.
//! The producer loads `commit_index` with `Acquire` before reusing a slot.
//!
//! # Indices
//! Both indices are free-running `u32` counters that wrap. `N` is a power of two
//! no larger than `2^31`, so `index mod N` stays consistent across the wrap.

use core::cell::{Cell, UnsafeCell};
use core::marker::PhantomData;

use crate::atomic::{AtomicBool, AtomicU32, Ordering};
use crate::error::RingFull;

/// Fixed-capacity SPSC ring of `N` entries of `E` bytes each.
///
/// `new` is `const`, so a ring can live in a `static` shared between an
/// interrupt handler and a background task.
pub struct EntryRing<const E: usize, const N: usize> {
    write_index: AtomicU32,
    commit_index: AtomicU32,
    dropped: AtomicU32,
    producer_live: AtomicBool,
    consumer_live: AtomicBool,
    slots: [UnsafeCell<[u8; E]>; N],
}

// Slots are only touched by the side that currently owns them according to the
// index protocol above; handle exclusivity is enforced at runtime.
unsafe impl<const E: usize, const N: usize> Sync for EntryRing<E, N> {}

impl<const E: usize, const N: usize> Default for EntryRing<E, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const E: usize, const N: usize> EntryRing<E, N> {
    /// Create an empty ring.
    ///
    /// # Panics
    /// If `E` is zero or `N` is not a power of two in `1..=2^31`. In a `static`
    /// initializer this is a compile-time error.
    pub const fn new() -> Self {
        assert!(E > 0, "entry size must be non-zero");
        assert!(N.is_power_of_two(), "ring capacity must be a power of two");
        assert!((N as u64) <= (1u64 << 31), "ring capacity must not exceed 2^31");
        Self {
            write_index: AtomicU32::new(0),
            commit_index: AtomicU32::new(0),
            dropped: AtomicU32::new(0),
            producer_live: AtomicBool::new(false),
            consumer_live: AtomicBool::new(false),
            slots: [const { UnsafeCell::new([0u8; E]) }; N],
        }
    }

    #[inline(always)]
    const fn idx_for(pos: u32) -> usize {
        (pos as usize) & (N - 1)
    }

    /// Number of slots.
    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Entries captured but not yet committed by the consumer.
    #[inline]
    pub fn len(&self) -> usize {
        let commit = self.commit_index.load(Ordering::Acquire);
        let write = self.write_index.load(Ordering::Acquire);
        write.wrapping_sub(commit) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Captures rejected because the ring was full, since creation.
    /// Wraps at `u32::MAX`.
    #[inline]
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Acquire the producer handle, or `None` if one is already live.
    pub fn try_producer(&self) -> Option<Producer<'_, E, N>> {
        if self.producer_live.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(Producer {
            ring: self,
            _not_sync: PhantomData,
        })
    }

    /// Acquire the producer handle.
    ///
    /// # Panics
    /// If another producer handle for this ring is live.
    pub fn producer(&self) -> Producer<'_, E, N> {
        match self.try_producer() {
            Some(producer) => producer,
            None => panic!("EntryRing already has a live producer"),
        }
    }

    /// Acquire the consumer handle, or `None` if one is already live.
    pub fn try_consumer(&self) -> Option<Consumer<'_, E, N>> {
        if self.consumer_live.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(Consumer {
            ring: self,
            _not_sync: PhantomData,
        })
    }

    /// Acquire the consumer handle.
    ///
    /// # Panics
    /// If another consumer handle for this ring is live.
    pub fn consumer(&self) -> Consumer<'_, E, N> {
        match self.try_consumer() {
            Some(consumer) => consumer,
            None => panic!("EntryRing already has a live consumer"),
        }
    }

    #[inline]
    fn capture_inner(&self, encoder: impl FnOnce(&mut [u8; E])) -> Result<u32, RingFull> {
        let write = self.write_index.load(Ordering::Relaxed);
        let commit = self.commit_index.load(Ordering::Acquire);

        if write.wrapping_sub(commit) as usize >= N {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(RingFull);
        }

        // The consumer never reads positions >= write, and the slot's previous
        // occupant (write - N) has been committed.
        let slot = unsafe { &mut *self.slots[Self::idx_for(write)].get() };
        encoder(slot);

        self.write_index.store(write.wrapping_add(1), Ordering::Release);
        Ok(write)
    }

    #[cfg(test)]
    fn start_at(pos: u32) -> Self {
        let ring = Self::new();
        ring.write_index.store(pos, Ordering::Relaxed);
        ring.commit_index.store(pos, Ordering::Relaxed);
        ring
    }
}

/// Producer side of an [`EntryRing`]. `Send` but not `Sync`, so captures can
/// never overlap.
pub struct Producer<'a, const E: usize, const N: usize> {
    ring: &'a EntryRing<E, N>,
    _not_sync: PhantomData<Cell<()>>,
}

impl<'a, const E: usize, const N: usize> Producer<'a, E, N> {
    /// Fill the next slot with `encoder` and publish it.
    ///
    /// Returns the entry's logical position, or [`RingFull`] if the consumer is
    /// `N` entries behind. In that case `encoder` is not called and the drop is
    /// counted.
    #[inline]
    pub fn try_capture(&self, encoder: impl FnOnce(&mut [u8; E])) -> Result<u32, RingFull> {
        self.ring.capture_inner(encoder)
    }

    /// Fill and publish the next slot, absorbing a full ring.
    /// Returns `false` if the capture was dropped.
    #[inline]
    pub fn capture(&self, encoder: impl FnOnce(&mut [u8; E])) -> bool {
        match self.try_capture(encoder) {
            Ok(_) => true,
            Err(RingFull) => {
                trace!("blackbox ring full, capture dropped");
                false
            }
        }
    }
}

impl<'a, const E: usize, const N: usize> Drop for Producer<'a, E, N> {
    fn drop(&mut self) {
        self.ring.producer_live.store(false, Ordering::Release);
    }
}

/// Consumer side of an [`EntryRing`].
pub struct Consumer<'a, const E: usize, const N: usize> {
    ring: &'a EntryRing<E, N>,
    _not_sync: PhantomData<Cell<()>>,
}

impl<'a, const E: usize, const N: usize> Consumer<'a, E, N> {
    /// Entries published and waiting to be drained.
    #[inline]
    pub fn pending(&self) -> usize {
        self.ring.len()
    }

    /// Hand every entry published before this call to `sink`, in order.
    ///
    /// Each entry is committed only after `sink` returns `Ok`. On the first
    /// error draining stops, that entry stays uncommitted and the error is
    /// returned. Entries published while draining are left for the next call.
    ///
    /// Returns the number of entries committed.
    pub fn drain<Err>(
        &mut self,
        mut sink: impl FnMut(&[u8; E]) -> Result<(), Err>,
    ) -> Result<usize, Err> {
        let mut commit = self.ring.commit_index.load(Ordering::Relaxed);
        let write = self.ring.write_index.load(Ordering::Acquire);

        let mut committed = 0usize;
        while commit != write {
            // Positions in commit..write are published and the producer will
            // not reuse them until commit_index moves past.
            let slot = unsafe { &*self.ring.slots[EntryRing::<E, N>::idx_for(commit)].get() };
            sink(slot)?;

            commit = commit.wrapping_add(1);
            self.ring.commit_index.store(commit, Ordering::Release);
            committed += 1;
        }

        Ok(committed)
    }
}

impl<'a, const E: usize, const N: usize> Drop for Consumer<'a, E, N> {
    fn drop(&mut self) {
        self.ring.consumer_live.store(false, Ordering::Release);
    }
}
