//! Contract between interrupt objects and the bus driver layer.
//!
//! The bus owns the vector tables. An interrupt object only asks it to
//! validate a source, install or remove a trap-context handler, and mask or
//! unmask a vector. Handlers run in trap context and report back through
//! [`IrqReturn`] what the bus should do before returning from the interrupt.

use core::fmt;

use bitflags::bitflags;

use crate::IrqError;
use crate::dispatcher::IrqContext;

/// Bus-level interrupt source identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct IrqId(u32);

impl IrqId {
    /// Creates a new `IrqId`.
    #[must_use]
    pub const fn new(val: u32) -> Self {
        Self(val)
    }

    /// Returns the raw `u32` value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for IrqId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

bitflags! {
    /// Actions a trap-context handler asks the bus to take.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IrqReturn: u32 {
        /// Mask the vector before returning from the interrupt.
        const MASK = 1 << 0;
        /// A task became runnable; reschedule on the way out.
        const RESCHED = 1 << 1;
    }
}

/// Signature of a trap-context interrupt handler.
pub type IrqHandlerFn = fn(&dyn IrqDevice, IrqId, IrqContext) -> IrqReturn;

/// A handler function paired with the context it is invoked with.
#[derive(Clone, Copy)]
pub struct IrqHandler {
    func: IrqHandlerFn,
    ctx: IrqContext,
}

impl IrqHandler {
    /// Pairs `func` with `ctx`.
    #[must_use]
    pub const fn new(func: IrqHandlerFn, ctx: IrqContext) -> Self {
        Self { func, ctx }
    }

    /// Returns the context the handler was registered with.
    #[must_use]
    pub const fn context(&self) -> IrqContext {
        self.ctx
    }

    /// Runs the handler. Called by the bus from trap context.
    #[inline]
    pub fn invoke(&self, device: &dyn IrqDevice, irq: IrqId) -> IrqReturn {
        (self.func)(device, irq, self.ctx)
    }
}

impl fmt::Debug for IrqHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IrqHandler")
            .field("func", &(self.func as *const ()))
            .field("ctx", &self.ctx)
            .finish()
    }
}

/// A device that can deliver interrupts.
///
/// Implementations must make [`mask_irq`](IrqDevice::mask_irq) and
/// [`unmask_irq`](IrqDevice::unmask_irq) idempotent, and must allow
/// removing a handler that is not installed.
pub trait IrqDevice: Send + Sync {
    /// Returns `true` if `irq` names an interrupt source this device owns.
    fn is_valid_interrupt(&self, irq: IrqId) -> bool;

    /// Installs `handler` for `irq`, or removes the current one with `None`.
    ///
    /// # Errors
    ///
    /// Returns [`IrqError::AlreadyBound`] if a handler is already installed
    /// for `irq`, or any other error the bus reports. Removal must succeed.
    fn register_irq_handler(&self, irq: IrqId, handler: Option<IrqHandler>)
    -> Result<(), IrqError>;

    /// Masks `irq` at the device.
    fn mask_irq(&self, irq: IrqId);

    /// Unmasks `irq` at the device.
    fn unmask_irq(&self, irq: IrqId);
}
