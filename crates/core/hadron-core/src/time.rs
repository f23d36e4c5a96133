//! Monotonic clock hook.
//!
//! The core crate has no timer of its own. The kernel registers a
//! nanosecond clock once the platform timer is up; until then [`now_nanos`]
//! reads as zero.
//!
//! ```ignore
//! unsafe { hadron_core::time::set_clock_fn(crate::time::boot_nanos) };
//! ```

use core::sync::atomic::{AtomicPtr, Ordering};

static CLOCK_FN: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());

/// Registers the monotonic nanosecond clock.
///
/// # Safety
///
/// `f` must be callable from any context, including interrupt handlers with
/// interrupts disabled. It must not block or take any lock.
pub unsafe fn set_clock_fn(f: fn() -> u64) {
    CLOCK_FN.store(f as *mut (), Ordering::Release);
}

/// Returns `true` once a clock has been registered.
#[must_use]
pub fn has_clock() -> bool {
    !CLOCK_FN.load(Ordering::Acquire).is_null()
}

/// Reads the registered clock, or returns 0 if none is registered yet.
#[inline]
#[must_use]
pub fn now_nanos() -> u64 {
    let ptr = CLOCK_FN.load(Ordering::Acquire);
    if ptr.is_null() {
        return 0;
    }
    // SAFETY: The only non-null value ever stored is a `fn() -> u64` cast in
    // `set_clock_fn`.
    let f: fn() -> u64 = unsafe { core::mem::transmute(ptr) };
    f()
}
