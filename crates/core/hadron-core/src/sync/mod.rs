//! Synchronization primitives shared by kernel objects and trap context.
//!
//! Provides [`SpinLock`] for consumer-side state, [`IrqSpinLock`] for state
//! an interrupt handler can reach, and [`Event`] for parking tasks until an
//! interrupt (or a cancellation) arrives.

mod event;
mod irq_spinlock;
mod spinlock;

pub mod loom_compat;

#[cfg(test)]
pub(crate) mod test_waker;

pub use event::{Event, EventFlags, EventWait, MAX_WAITERS, WaitError};
pub use irq_spinlock::{IrqSpinLock, IrqSpinLockGuard};
pub use spinlock::{SpinLock, SpinLockGuard};
