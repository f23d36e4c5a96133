//! Interrupt-safe spin lock.
//!
//! A [`SpinLock`] that masks local interrupts for as long as it is held.
//! This is the only lock that may be shared between trap context and task
//! context: a holder can never be interrupted by a handler that wants the
//! same lock on the same CPU.

use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};

use super::{SpinLock, SpinLockGuard};

/// A spin lock that masks local interrupts while held.
pub struct IrqSpinLock<T> {
    inner: SpinLock<T>,
}

impl<T> IrqSpinLock<T> {
    /// Creates a new unlocked `IrqSpinLock`.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: SpinLock::named("<irq>", value),
        }
    }

    /// Masks interrupts, then spins until the lock is acquired.
    pub fn lock(&self) -> IrqSpinLockGuard<'_, T> {
        let saved = local_irq::save_and_disable();
        IrqSpinLockGuard {
            guard: ManuallyDrop::new(self.inner.lock()),
            saved,
        }
    }

    /// Attempts to acquire the lock without spinning.
    ///
    /// The interrupt state is left untouched on failure.
    pub fn try_lock(&self) -> Option<IrqSpinLockGuard<'_, T>> {
        let saved = local_irq::save_and_disable();
        match self.inner.try_lock() {
            Some(guard) => Some(IrqSpinLockGuard {
                guard: ManuallyDrop::new(guard),
                saved,
            }),
            None => {
                local_irq::restore(saved);
                None
            }
        }
    }
}

/// RAII guard that unlocks and then restores the saved interrupt state.
pub struct IrqSpinLockGuard<'a, T> {
    /// Released by hand in `drop`, before the interrupt state.
    guard: ManuallyDrop<SpinLockGuard<'a, T>>,
    saved: local_irq::Saved,
}

impl<T> Deref for IrqSpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for IrqSpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for IrqSpinLockGuard<'_, T> {
    fn drop(&mut self) {
        // SAFETY: `guard` is not touched again after this.
        unsafe { ManuallyDrop::drop(&mut self.guard) };
        local_irq::restore(self.saved);
    }
}

// The saved interrupt state belongs to the CPU that took the lock.
impl<T> !Send for IrqSpinLockGuard<'_, T> {}

/// Local interrupt masking.
mod local_irq {
    /// Interrupt state captured before masking.
    #[derive(Clone, Copy)]
    pub struct Saved(#[cfg_attr(not(target_os = "none"), allow(dead_code))] u64);

    #[cfg(all(target_os = "none", target_arch = "x86_64"))]
    #[inline]
    pub fn save_and_disable() -> Saved {
        let rflags: u64;
        // SAFETY: Reading RFLAGS and clearing IF only affects this CPU.
        unsafe {
            core::arch::asm!("pushfq", "pop {}", "cli", out(reg) rflags, options(nomem));
        }
        Saved(rflags)
    }

    #[cfg(all(target_os = "none", target_arch = "x86_64"))]
    #[inline]
    pub fn restore(saved: Saved) {
        const RFLAGS_IF: u64 = 1 << 9;
        if saved.0 & RFLAGS_IF != 0 {
            // SAFETY: Interrupts were enabled when the state was saved.
            unsafe {
                core::arch::asm!("sti", options(nomem, nostack, preserves_flags));
            }
        }
    }

    #[cfg(all(target_os = "none", target_arch = "aarch64"))]
    #[inline]
    pub fn save_and_disable() -> Saved {
        let daif: u64;
        // SAFETY: Reading DAIF and masking exceptions only affects this CPU.
        unsafe {
            core::arch::asm!("mrs {}, DAIF", "msr DAIFSet, #0xf", out(reg) daif, options(nomem));
        }
        Saved(daif)
    }

    #[cfg(all(target_os = "none", target_arch = "aarch64"))]
    #[inline]
    pub fn restore(saved: Saved) {
        // SAFETY: Writes back a DAIF value read earlier on this CPU.
        unsafe {
            core::arch::asm!("msr DAIF, {}", in(reg) saved.0, options(nomem, nostack, preserves_flags));
        }
    }

    /// Hosted builds have no interrupts to mask.
    #[cfg(not(target_os = "none"))]
    #[inline]
    pub fn save_and_disable() -> Saved {
        Saved(0)
    }

    #[cfg(not(target_os = "none"))]
    #[inline]
    pub fn restore(_saved: Saved) {}
}
