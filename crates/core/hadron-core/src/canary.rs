//! Validity canaries for objects reached through raw pointers.
//!
//! Trap context finds its interrupt object through a raw back-reference
//! rather than a counted one. A [`Canary`] embedded in the object lets that
//! path assert it is still looking at a live object of the expected type:
//! the magic is written at construction and overwritten on drop.

use core::fmt;

use crate::sync::loom_compat::{AtomicU32, Ordering};

/// Value a canary holds after its owner has been dropped.
pub const POISON: u32 = 0xDEAD_DEAD;

/// Packs a four-byte tag into a canary magic, first byte most significant.
#[must_use]
pub const fn magic(tag: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*tag)
}

/// A magic number that identifies a live object of a particular type.
pub struct Canary<const MAGIC: u32> {
    value: AtomicU32,
}

impl<const MAGIC: u32> Canary<MAGIC> {
    /// Creates a valid canary.
    #[must_use]
    pub fn new() -> Self {
        Self {
            value: AtomicU32::new(MAGIC),
        }
    }

    /// Returns `true` while the owner is alive.
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.value.load(Ordering::Relaxed) == MAGIC
    }

    /// Panics if the canary no longer holds its magic.
    #[inline]
    #[track_caller]
    pub fn assert(&self) {
        let found = self.value.load(Ordering::Relaxed);
        assert!(
            found == MAGIC,
            "canary mismatch: expected {MAGIC:#010x}, found {found:#010x}"
        );
    }
}

impl<const MAGIC: u32> Default for Canary<MAGIC> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const MAGIC: u32> Drop for Canary<MAGIC> {
    fn drop(&mut self) {
        self.value.store(POISON, Ordering::Relaxed);
    }
}

impl<const MAGIC: u32> fmt::Debug for Canary<MAGIC> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Canary({:#010x})", self.value.load(Ordering::Relaxed))
    }
}
