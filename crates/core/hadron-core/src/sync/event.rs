//! Signalable event for parking tasks until something happens.
//!
//! An [`Event`] is the blocking half of every interrupt object: trap
//! context calls [`Event::signal`] and a task awaits [`Event::wait`].
//! With [`EventFlags::AUTO_UNSIGNAL`] the event behaves like a binary
//! semaphore with a hand-off:
//!
//! - signalling with no waiter parked leaves a *ready mark*; the next wait
//!   consumes it and completes immediately;
//! - signalling with waiters parked hands the wake to exactly the oldest
//!   one and leaves the event unsignalled.
//!
//! Without the flag the event is level-triggered: once signalled, every
//! wait completes until [`Event::unsignal`] is called.
//!
//! Signalling never allocates and never blocks; the only lock taken is an
//! [`IrqSpinLock`] and no waker is invoked while it is held.

use core::fmt;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};

use bitflags::bitflags;
use planck_noalloc::vec::ArrayVec;

use super::IrqSpinLock;

/// Maximum number of tasks that can be parked on one event at a time.
pub const MAX_WAITERS: usize = 32;

bitflags! {
    /// Behaviour flags for an [`Event`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EventFlags: u32 {
        /// A successful wait clears the signal; a signal wakes one waiter.
        const AUTO_UNSIGNAL = 1 << 0;
    }
}

/// Reasons a wait on an [`Event`] can complete without a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    /// The waiting task was interrupted (killed or suspended).
    Interrupted,
    /// The object owning the event was destroyed under the waiter.
    Destroyed,
    /// The event's waiter table is full.
    NoResources,
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupted => f.write_str("wait interrupted"),
            Self::Destroyed => f.write_str("object destroyed while waiting"),
            Self::NoResources => f.write_str("too many waiters"),
        }
    }
}

impl core::error::Error for WaitError {}

/// A parked task.
struct Waiter {
    ticket: u64,
    waker: Waker,
}

/// A wake handed to a parked task that has not yet observed it.
struct Delivery {
    ticket: u64,
    status: Result<(), WaitError>,
}

struct EventState {
    signaled: bool,
    next_ticket: u64,
    /// FIFO of parked tasks.
    waiters: ArrayVec<Waiter, MAX_WAITERS>,
    /// Invariant: `waiters.len() + delivered.len() <= MAX_WAITERS`.
    delivered: ArrayVec<Delivery, MAX_WAITERS>,
}

impl EventState {
    fn occupancy(&self) -> usize {
        self.waiters.len() + self.delivered.len()
    }

    /// Moves the oldest waiter to the delivered list and returns its waker.
    fn hand_off_one(&mut self, status: Result<(), WaitError>) -> Option<Waker> {
        if self.waiters.is_empty() {
            return None;
        }
        let waiter = self.waiters.remove(0);
        self.delivered.push(Delivery {
            ticket: waiter.ticket,
            status,
        });
        Some(waiter.waker)
    }

    /// Moves every waiter to the delivered list and returns their wakers.
    fn hand_off_all(&mut self, status: Result<(), WaitError>) -> ArrayVec<Waker, MAX_WAITERS> {
        let mut wakers = ArrayVec::new();
        while let Some(waker) = self.hand_off_one(status) {
            wakers.push(waker);
        }
        wakers
    }
}

/// A signalable event with optional auto-unsignal semantics.
pub struct Event {
    flags: EventFlags,
    state: IrqSpinLock<EventState>,
}

impl Event {
    /// Creates an unsignalled event.
    #[must_use]
    pub fn new(flags: EventFlags) -> Self {
        Self {
            flags,
            state: IrqSpinLock::new(EventState {
                signaled: false,
                next_ticket: 0,
                waiters: ArrayVec::new(),
                delivered: ArrayVec::new(),
            }),
        }
    }

    /// Returns the flags the event was created with.
    #[must_use]
    pub fn flags(&self) -> EventFlags {
        self.flags
    }

    /// Returns `true` if the event currently holds a signal.
    #[must_use]
    pub fn is_signaled(&self) -> bool {
        self.state.lock().signaled
    }

    /// Returns the number of tasks currently parked on the event.
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Returns a future that completes when the event is signalled.
    pub fn wait(&self) -> EventWait<'_> {
        EventWait {
            event: self,
            ticket: None,
        }
    }

    /// Signals the event with a successful status.
    ///
    /// Returns the number of parked tasks made runnable.
    pub fn signal(&self) -> usize {
        self.signal_etc(Ok(()))
    }

    /// Signals the event, handing `status` to the woken waiter(s).
    ///
    /// In auto-unsignal mode at most one waiter is woken and the event is
    /// left unsignalled if one was; otherwise the ready mark is set. In
    /// level mode the event stays signalled and every waiter is woken.
    /// With no waiter parked, `status` is discarded. Safe to call from trap
    /// context.
    pub fn signal_etc(&self, status: Result<(), WaitError>) -> usize {
        if self.flags.contains(EventFlags::AUTO_UNSIGNAL) {
            let waker = {
                let mut state = self.state.lock();
                let waker = state.hand_off_one(status);
                state.signaled = waker.is_none();
                waker
            };
            match waker {
                Some(waker) => {
                    waker.wake();
                    1
                }
                None => 0,
            }
        } else {
            let wakers = {
                let mut state = self.state.lock();
                state.signaled = true;
                state.hand_off_all(status)
            };
            let count = wakers.len();
            for waker in wakers.iter() {
                waker.wake_by_ref();
            }
            count
        }
    }

    /// Clears the signal without waking anyone.
    pub fn unsignal(&self) {
        self.state.lock().signaled = false;
    }

    /// Wakes every parked task with `err`, leaving the signal untouched.
    ///
    /// Returns the number of tasks woken.
    pub fn interrupt(&self, err: WaitError) -> usize {
        let wakers = self.state.lock().hand_off_all(Err(err));
        let count = wakers.len();
        for waker in wakers.iter() {
            waker.wake_by_ref();
        }
        count
    }
}

/// Future returned by [`Event::wait`].
///
/// Dropping a parked wait deregisters it. Dropping a wait that was already
/// handed a successful wake forwards that wake to the event so it is not
/// lost.
pub struct EventWait<'a> {
    event: &'a Event,
    ticket: Option<u64>,
}

impl Future for EventWait<'_> {
    type Output = Result<(), WaitError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let event = self.event;
        let mut state = event.state.lock();

        if let Some(ticket) = self.ticket {
            if let Some(pos) = state.delivered.iter().position(|d| d.ticket == ticket) {
                let delivery = state.delivered.remove(pos);
                self.ticket = None;
                return Poll::Ready(delivery.status);
            }
            if let Some(waiter) = state.waiters.iter_mut().find(|w| w.ticket == ticket) {
                if !waiter.waker.will_wake(cx.waker()) {
                    waiter.waker = cx.waker().clone();
                }
            }
            return Poll::Pending;
        }

        if state.signaled {
            if event.flags.contains(EventFlags::AUTO_UNSIGNAL) {
                state.signaled = false;
            }
            return Poll::Ready(Ok(()));
        }

        if state.occupancy() >= MAX_WAITERS {
            return Poll::Ready(Err(WaitError::NoResources));
        }

        let ticket = state.next_ticket;
        state.next_ticket = state.next_ticket.wrapping_add(1);
        state.waiters.push(Waiter {
            ticket,
            waker: cx.waker().clone(),
        });
        drop(state);
        self.ticket = Some(ticket);
        Poll::Pending
    }
}

impl Drop for EventWait<'_> {
    fn drop(&mut self) {
        let Some(ticket) = self.ticket.take() else {
            return;
        };
        let forward = {
            let mut state = self.event.state.lock();
            if let Some(pos) = state.waiters.iter().position(|w| w.ticket == ticket) {
                drop(state.waiters.remove(pos));
                false
            } else if let Some(pos) = state.delivered.iter().position(|d| d.ticket == ticket) {
                state.delivered.remove(pos).status.is_ok()
            } else {
                false
            }
        };
        if forward {
            self.event.signal();
        }
    }
}
