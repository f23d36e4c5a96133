//! Bus-independent interrupt wait / signal / cancel engine.
//!
//! [`InterruptCore`] holds the state every interrupt object shares: a
//! pending mask with one bit per slot plus a cancellation bit, an
//! auto-unsignal [`Event`] a consumer parks on, and the [`SlotTable`].
//! The producer side ([`InterruptCore::signal`]) is a `fetch_or` followed by
//! an event signal and is safe from trap context. The consumer side
//! ([`InterruptCore::wait`]) swaps the mask with zero and only parks when
//! the swap came back empty, so a signal raised between the check and the
//! park is never lost: it leaves the event signalled and the wait loops.
//!
//! Cancellation is edge-triggered. The cancellation bit is consumed by the
//! same swap as the slot bits, so one [`cancel`](InterruptCore::cancel)
//! releases exactly one wait. Interrupt objects are single-consumer: with
//! several concurrent waiters only one of them observes a given signal or
//! cancellation.

use core::fmt;
use core::future::Future;
use core::ptr::NonNull;

use hadron_core::assert_unsafe_precondition;
use hadron_core::canary::{Canary, magic};
use hadron_core::sync::loom_compat::{AtomicU64, Ordering};
use hadron_core::sync::{Event, EventFlags, WaitError};

use crate::IrqError;
use crate::bus::IrqId;
use crate::config::{CANCEL_BIT, MAX_SLOTS, TRACE_WAIT};
use crate::object::KernelObject;
use crate::slot::{SlotOptions, SlotTable};

/// Canary magic of a live [`InterruptCore`].
pub const INTERRUPT_MAGIC: u32 = magic(b"INTR");

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// Hardware-specific behaviour an interrupt binding plugs into
/// [`InterruptCore`].
///
/// The core calls these from task context only: around a wait, and while
/// binding or tearing down slots.
pub trait InterruptHooks {
    /// Called before the consumer parks. Re-arms the hardware.
    fn pre_wait(&self);

    /// Called with the consumed mask before a successful wait returns.
    fn post_wait(&self, signals: u64);

    /// Masks `irq` at the hardware.
    fn mask_interrupt(&self, irq: IrqId);

    /// Unmasks `irq` at the hardware.
    fn unmask_interrupt(&self, irq: IrqId);

    /// Installs a trap-context handler for `irq` that signals through `ctx`.
    ///
    /// # Errors
    ///
    /// Whatever the bus reports; the core propagates it unchanged.
    fn register_interrupt_handler(&self, irq: IrqId, ctx: IrqContext) -> Result<(), IrqError>;

    /// Removes the handler for `irq`. Removing an absent handler succeeds.
    ///
    /// # Errors
    ///
    /// Any error means the bus is inconsistent; the core treats it as fatal.
    fn unregister_interrupt_handler(&self, irq: IrqId) -> Result<(), IrqError>;
}

/// Handle-level operations on an interrupt object.
pub trait InterruptDispatcher: KernelObject {
    /// Binds an additional slot to `irq`.
    ///
    /// # Errors
    ///
    /// Binding-specific; bindings that wire themselves at creation return
    /// [`IrqError::NotSupported`].
    fn bind(&self, slot: u32, irq: IrqId, options: SlotOptions) -> Result<(), IrqError>;

    /// Waits until at least one slot fires or the object is cancelled.
    ///
    /// Resolves to the mask of slots that fired.
    fn wait_for_interrupt(&self) -> impl Future<Output = Result<u64, IrqError>> + Send + '_;
}

// ---------------------------------------------------------------------------
// Trap-context back-reference
// ---------------------------------------------------------------------------

/// Context handed to the bus with a handler: which core to signal and which
/// slot bit to raise.
///
/// This is a plain address, not a counted reference. It is valid from the
/// moment the handler is registered until it is unregistered, and the
/// owning object unregisters before it is dropped.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct IrqContext {
    core: NonNull<InterruptCore>,
    slot: u32,
}

// SAFETY: `IrqContext` only hands out `&InterruptCore`, which is `Sync`.
unsafe impl Send for IrqContext {}
// SAFETY: See above.
unsafe impl Sync for IrqContext {}

impl IrqContext {
    /// Returns the slot this context signals.
    #[must_use]
    pub const fn slot(&self) -> u32 {
        self.slot
    }

    /// Returns the core this context points at.
    ///
    /// # Safety
    ///
    /// The handler registered with this context must not have been
    /// unregistered yet.
    #[inline]
    pub unsafe fn core(&self) -> &InterruptCore {
        // SAFETY: The caller guarantees the registration is live, and a live
        // registration keeps the core alive and in place.
        let core = unsafe { self.core.as_ref() };
        assert_unsafe_precondition!(
            core.canary.is_valid(),
            "interrupt context used after its object was destroyed"
        );
        core
    }
}

impl fmt::Debug for IrqContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IrqContext")
            .field("core", &self.core)
            .field("slot", &self.slot)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// InterruptCore
// ---------------------------------------------------------------------------

/// Shared wait / signal / cancel state of an interrupt object.
///
/// Once a handler has been registered through [`add_slot`](Self::add_slot)
/// the core must stay at a fixed address until every handler has been
/// removed again; embed it in a heap allocation.
pub struct InterruptCore {
    canary: Canary<INTERRUPT_MAGIC>,
    pending: AtomicU64,
    event: Event,
    slots: SlotTable,
}

impl InterruptCore {
    /// Creates a core with no slots and nothing pending.
    #[must_use]
    pub fn new() -> Self {
        Self {
            canary: Canary::new(),
            pending: AtomicU64::new(0),
            event: Event::new(EventFlags::AUTO_UNSIGNAL),
            slots: SlotTable::new(),
        }
    }

    #[inline]
    fn check(&self) {
        assert_unsafe_precondition!(
            self.canary.is_valid(),
            "interrupt object used after destruction"
        );
    }

    /// Waits until a slot bit or the cancellation bit is pending.
    ///
    /// Consumes everything pending. Calls `hooks.pre_wait()` every time it is
    /// about to park and `hooks.post_wait()` once before returning a mask.
    ///
    /// # Errors
    ///
    /// - [`IrqError::Cancelled`] if the cancellation bit was pending. Slot
    ///   bits consumed together with it are discarded.
    /// - [`IrqError::Wait`] if the event wait itself failed.
    pub async fn wait<H: InterruptHooks + ?Sized>(&self, hooks: &H) -> Result<u64, IrqError> {
        self.check();
        loop {
            let signals = self.pending.swap(0, Ordering::AcqRel);
            if signals & CANCEL_BIT != 0 {
                if TRACE_WAIT {
                    log::trace!("irq: wait cancelled (pending {signals:#x})");
                }
                return Err(IrqError::Cancelled);
            }
            if signals != 0 {
                hooks.post_wait(signals);
                return Ok(signals);
            }

            hooks.pre_wait();
            if TRACE_WAIT {
                log::trace!("irq: parking");
            }
            self.event.wait().await?;
        }
    }

    /// Raises `mask` and wakes the consumer.
    ///
    /// Returns `true` if a parked consumer was made runnable. Never blocks or
    /// allocates; safe from trap context.
    ///
    /// There is no reschedule request argument. Whether to reschedule is the
    /// caller's decision: a trap handler turns a `true` return into
    /// [`IrqReturn::RESCHED`](crate::bus::IrqReturn::RESCHED), and task
    /// context lets the woken consumer run at the next scheduling point.
    pub fn signal(&self, mask: u64) -> bool {
        self.check();
        self.pending.fetch_or(mask, Ordering::AcqRel);
        self.event.signal() > 0
    }

    /// Releases the next (or current) wait with [`IrqError::Cancelled`].
    ///
    /// Idempotent until a wait consumes it. Like [`signal`](Self::signal),
    /// it reports whether a consumer was woken instead of rescheduling.
    pub fn cancel(&self) -> bool {
        self.signal(CANCEL_BIT)
    }

    /// Wakes every parked wait with `err` without touching the pending mask.
    ///
    /// For the kernel to release waiters when their task is killed or the
    /// object is torn down from under them. Returns how many were woken.
    pub fn interrupt_waiters(&self, err: WaitError) -> usize {
        self.check();
        self.event.interrupt(err)
    }

    /// Binds `slot` to `irq` and registers a handler for it through `hooks`.
    ///
    /// The handler receives an [`IrqContext`] holding this core's address.
    ///
    /// # Errors
    ///
    /// Any [`SlotTable::insert`] error, or the registration error from
    /// `hooks`. On failure nothing stays bound.
    ///
    /// # Safety
    ///
    /// The core must not move or be dropped until the slot has been removed
    /// again with [`unregister_all`](Self::unregister_all). Dropping a core
    /// with slots still bound panics.
    pub unsafe fn add_slot<H: InterruptHooks + ?Sized>(
        &self,
        hooks: &H,
        slot: u32,
        irq: IrqId,
        options: SlotOptions,
    ) -> Result<(), IrqError> {
        self.check();
        self.slots.insert(slot, irq, options)?;
        let ctx = IrqContext {
            core: NonNull::from(self),
            slot,
        };
        if let Err(err) = hooks.register_interrupt_handler(irq, ctx) {
            self.slots.remove(slot);
            return Err(err);
        }
        Ok(())
    }

    /// Unregisters every bound slot's handler and unbinds it.
    ///
    /// # Panics
    ///
    /// Panics if the bus fails to remove a handler: a handler left behind
    /// could still reach this core after it is freed.
    pub fn unregister_all<H: InterruptHooks + ?Sized>(&self, hooks: &H) {
        self.check();
        for slot in 0..MAX_SLOTS as u32 {
            let Some(info) = self.slots.remove(slot) else {
                continue;
            };
            let result = hooks.unregister_interrupt_handler(info.irq);
            assert!(
                result.is_ok(),
                "failed to unregister handler for irq {}: {result:?}",
                info.irq
            );
        }
    }

    /// Returns the mask of bits raised and not yet consumed.
    #[must_use]
    pub fn pending(&self) -> u64 {
        self.pending.load(Ordering::Acquire)
    }

    /// Returns the first-fire timestamp of `slot`, if one is recorded.
    #[must_use]
    pub fn first_fire(&self, slot: u32) -> Option<u64> {
        self.slots.first_fire(slot)
    }

    /// Returns the slot table.
    #[must_use]
    pub fn slots(&self) -> &SlotTable {
        &self.slots
    }
}

impl Drop for InterruptCore {
    fn drop(&mut self) {
        let bound = self.slots.len();
        assert!(
            bound == 0,
            "interrupt core dropped with {bound} handler(s) still registered"
        );
    }
}

impl Default for InterruptCore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InterruptCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptCore")
            .field("canary", &self.canary)
            .field("pending", &format_args!("{:#x}", self.pending()))
            .field("slots", &self.slots)
            .finish_non_exhaustive()
    }
}
