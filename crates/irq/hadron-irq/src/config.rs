//! Compile-time configuration for interrupt objects.
//!
//! Build-time switches are custom cfgs rather than features:
//!
//! - `--cfg hadron_hardened` keeps validity checks in release builds.
//! - `--cfg hadron_irq_trace` adds `trace!` logging on the consumer path.
//! - `--cfg loom` / `--cfg shuttle` swap in the model checkers' atomics.

/// Bit index of the cancellation bit in the pending mask.
pub const CANCEL_SLOT: u32 = u64::BITS - 1;

/// Pending-mask bit for [`CANCEL_SLOT`].
pub const CANCEL_BIT: u64 = 1 << CANCEL_SLOT;

/// Number of slots an interrupt object can hold: every pending bit except
/// the cancellation bit.
pub const MAX_SLOTS: usize = CANCEL_SLOT as usize;

/// Slot used by bindings that own exactly one vector.
pub const PCI_IRQ_SLOT: u32 = 0;

/// Tasks that can block on one interrupt object at the same time.
pub use hadron_core::sync::MAX_WAITERS as MAX_EVENT_WAITERS;

/// Whether consumer-path tracing is compiled in.
pub const TRACE_WAIT: bool = cfg!(hadron_irq_trace);

const _: () = assert!(MAX_SLOTS < u64::BITS as usize);
const _: () = assert!((PCI_IRQ_SLOT as usize) < MAX_SLOTS);

/// Returns the pending-mask bit for `slot`.
#[must_use]
pub const fn slot_bit(slot: u32) -> u64 {
    1 << slot
}
