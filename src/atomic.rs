//! Atomic backend selection.
//!
//! Targets without native compare-and-swap (e.g. `thumbv6m`) enable one of the
//! `portable-atomic-*` features.

#[cfg(not(feature = "portable-atomic"))]
pub(crate) use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

#[cfg(feature = "portable-atomic")]
pub(crate) use portable_atomic::{AtomicBool, AtomicU32, Ordering};
