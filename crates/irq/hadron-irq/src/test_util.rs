//! Host-side helpers for interrupt object tests: an in-memory PCI device, a
//! thread-parking `block_on`, and a per-thread clock.

use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::{Pin, pin};
use std::sync::{Arc, Mutex, Once};
use std::task::{Context, Poll, Wake, Waker};
use std::thread::{self, Thread};

use crate::IrqError;
use crate::bus::{IrqDevice, IrqHandler, IrqId, IrqReturn};

// ---------------------------------------------------------------------------
// Fake bus
// ---------------------------------------------------------------------------

/// A bus operation observed by [`FakePciDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusOp {
    Register(IrqId),
    Unregister(IrqId),
    Mask(IrqId),
    Unmask(IrqId),
}

#[derive(Default)]
struct FakeState {
    handlers: HashMap<IrqId, IrqHandler>,
    masked: HashSet<IrqId>,
    ops: Vec<BusOp>,
    fail_register: Option<IrqError>,
}

/// In-memory PCI device with `num_irqs` valid vectors, all unmasked.
pub struct FakePciDevice {
    num_irqs: u32,
    /// Without masking support, mask requests are recorded but ignored.
    masking: bool,
    state: Mutex<FakeState>,
}

impl FakePciDevice {
    pub fn new(num_irqs: u32) -> Arc<Self> {
        Self::build(num_irqs, true)
    }

    pub fn without_masking(num_irqs: u32) -> Arc<Self> {
        Self::build(num_irqs, false)
    }

    fn build(num_irqs: u32, masking: bool) -> Arc<Self> {
        Arc::new(Self {
            num_irqs,
            masking,
            state: Mutex::new(FakeState::default()),
        })
    }

    /// Delivers `irq` the way the bus would from trap context.
    ///
    /// Returns `None` if the vector is masked or has no handler.
    pub fn fire(&self, irq: IrqId) -> Option<IrqReturn> {
        let handler = {
            let state = self.state.lock().unwrap();
            if state.masked.contains(&irq) {
                return None;
            }
            *state.handlers.get(&irq)?
        };
        let ret = handler.invoke(self, irq);
        if ret.contains(IrqReturn::MASK) && self.masking {
            self.state.lock().unwrap().masked.insert(irq);
        }
        Some(ret)
    }

    /// Makes the next handler registration fail with `err`.
    pub fn fail_next_register(&self, err: IrqError) {
        self.state.lock().unwrap().fail_register = Some(err);
    }

    pub fn has_handler(&self, irq: IrqId) -> bool {
        self.state.lock().unwrap().handlers.contains_key(&irq)
    }

    pub fn is_masked(&self, irq: IrqId) -> bool {
        self.state.lock().unwrap().masked.contains(&irq)
    }

    pub fn ops(&self) -> Vec<BusOp> {
        self.state.lock().unwrap().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.state.lock().unwrap().ops.clear();
    }
}

impl IrqDevice for FakePciDevice {
    fn is_valid_interrupt(&self, irq: IrqId) -> bool {
        irq.as_u32() < self.num_irqs
    }

    fn register_irq_handler(
        &self,
        irq: IrqId,
        handler: Option<IrqHandler>,
    ) -> Result<(), IrqError> {
        let mut state = self.state.lock().unwrap();
        let Some(handler) = handler else {
            state.handlers.remove(&irq);
            state.ops.push(BusOp::Unregister(irq));
            return Ok(());
        };
        if let Some(err) = state.fail_register.take() {
            return Err(err);
        }
        if state.handlers.contains_key(&irq) {
            return Err(IrqError::AlreadyBound);
        }
        state.handlers.insert(irq, handler);
        state.ops.push(BusOp::Register(irq));
        Ok(())
    }

    fn mask_irq(&self, irq: IrqId) {
        let mut state = self.state.lock().unwrap();
        if self.masking {
            state.masked.insert(irq);
        }
        state.ops.push(BusOp::Mask(irq));
    }

    fn unmask_irq(&self, irq: IrqId) {
        let mut state = self.state.lock().unwrap();
        state.masked.remove(&irq);
        state.ops.push(BusOp::Unmask(irq));
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

struct ThreadWaker(Thread);

impl Wake for ThreadWaker {
    fn wake(self: Arc<Self>) {
        self.0.unpark();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.0.unpark();
    }
}

/// Runs `fut` to completion on the current thread, parking between polls.
pub fn block_on<F: Future>(fut: F) -> F::Output {
    let mut fut = pin!(fut);
    let waker = Waker::from(Arc::new(ThreadWaker(thread::current())));
    let mut cx = Context::from_waker(&waker);
    loop {
        if let Poll::Ready(out) = fut.as_mut().poll(&mut cx) {
            return out;
        }
        thread::park();
    }
}

/// Polls `fut` once with a no-op waker.
pub fn poll_once<F: Future + ?Sized>(fut: Pin<&mut F>) -> Poll<F::Output> {
    fut.poll(&mut Context::from_waker(Waker::noop()))
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

std::thread_local! {
    static NOW: Cell<u64> = const { Cell::new(0) };
}

fn thread_clock() -> u64 {
    NOW.with(Cell::get)
}

/// Sets what the kernel clock reads on this thread.
pub fn set_time(nanos: u64) {
    static INSTALL: Once = Once::new();
    // SAFETY: `thread_clock` only reads a thread-local.
    INSTALL.call_once(|| unsafe { hadron_core::time::set_clock_fn(thread_clock) });
    NOW.with(|now| now.set(nanos));
}
