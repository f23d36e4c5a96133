//! Loom / shuttle compatibility shim.
//!
//! When compiled with `cfg(loom)` or `cfg(shuttle)`, re-exports that
//! checker's atomics so the primitives built on them are explored by its
//! scheduler. Otherwise, re-exports the plain `core::sync::atomic` types.
//!
//! Spin loops must go through [`spin_loop`]: under a model checker a bare
//! `core::hint::spin_loop` never yields and the model deadlocks.

// ---------------------------------------------------------------------------
// Loom mode
// ---------------------------------------------------------------------------

#[cfg(loom)]
pub use loom::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// Yields to the loom scheduler.
#[cfg(loom)]
#[inline]
pub fn spin_loop() {
    loom::thread::yield_now();
}

// ---------------------------------------------------------------------------
// Shuttle mode
// ---------------------------------------------------------------------------

#[cfg(all(shuttle, not(loom)))]
pub use shuttle::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// Yields to the shuttle scheduler.
#[cfg(all(shuttle, not(loom)))]
#[inline]
pub fn spin_loop() {
    shuttle::thread::yield_now();
}

// ---------------------------------------------------------------------------
// Normal mode
// ---------------------------------------------------------------------------

#[cfg(not(any(loom, shuttle)))]
pub use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// Emits a spin-wait hint to the CPU.
#[cfg(not(any(loom, shuttle)))]
#[inline]
pub fn spin_loop() {
    core::hint::spin_loop();
}
