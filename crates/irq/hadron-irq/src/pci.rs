//! Interrupt objects bound to one vector of a PCI device.
//!
//! A [`PciInterruptDispatcher`] wires itself to the bus when it is created
//! and stays wired until it is destroyed; there is no separate bind step.
//! Its trap-context handler masks the vector on every firing and only
//! [`pre_wait`](InterruptHooks::pre_wait) unmasks it again, so at most one
//! unconsumed event is outstanding per wait cycle and a storming device
//! cannot outrun the consumer.

use alloc::sync::Arc;
use core::fmt;
use core::future::Future;

use hadron_core::canary::{Canary, magic};
use hadron_core::sync::SpinLock;
use hadron_core::time;

use crate::IrqError;
use crate::bus::{IrqDevice, IrqHandler, IrqId, IrqReturn};
use crate::config::{PCI_IRQ_SLOT, slot_bit};
use crate::dispatcher::{InterruptCore, InterruptDispatcher, InterruptHooks, IrqContext};
use crate::object::{Handle, KernelObject, Object};
use crate::rights::Rights;
use crate::slot::SlotOptions;

/// Canary magic of a live [`PciInterruptDispatcher`].
pub const PCI_INTERRUPT_MAGIC: u32 = magic(b"INPD");

/// An interrupt object for a single PCI interrupt vector.
pub struct PciInterruptDispatcher<D: IrqDevice> {
    canary: Canary<PCI_INTERRUPT_MAGIC>,
    core: InterruptCore,
    /// Attached for exactly as long as the handler is registered.
    device: SpinLock<Option<Arc<D>>>,
    irq_id: IrqId,
    maskable: bool,
}

impl<D: IrqDevice> PciInterruptDispatcher<D> {
    /// Creates an interrupt object for `irq_id` on `device` and registers its
    /// handler with the bus.
    ///
    /// If `maskable`, the vector is unmasked before returning so an
    /// interrupt that fires before the first wait is not lost.
    ///
    /// # Errors
    ///
    /// - [`IrqError::InvalidArgs`] if `device` is `None`.
    /// - [`IrqError::Internal`] if the device does not own `irq_id`.
    /// - [`IrqError::NoMemory`] if the object cannot be allocated.
    /// - Any error from binding the slot or registering the handler, after
    ///   the device reference has been released again.
    pub fn create(
        device: Option<&Arc<D>>,
        irq_id: IrqId,
        maskable: bool,
    ) -> Result<(Rights, Handle<Self>), IrqError> {
        let Some(device) = device else {
            return Err(IrqError::InvalidArgs);
        };
        if !device.is_valid_interrupt(irq_id) {
            log::warn!("pci irq: rejecting invalid interrupt {irq_id}");
            return Err(IrqError::Internal);
        }

        let dispatcher = Self {
            canary: Canary::new(),
            core: InterruptCore::new(),
            device: SpinLock::named("pci_irq_device", Some(Arc::clone(device))),
            irq_id,
            maskable,
        };
        let object = Arc::try_new(Object::new(dispatcher)).map_err(|_| IrqError::NoMemory)?;

        let options = if maskable {
            SlotOptions::MASKABLE
        } else {
            SlotOptions::empty()
        };
        // SAFETY: The core lives inside the `Arc` allocation and never moves.
        // `Drop for PciInterruptDispatcher` unregisters every slot before the
        // core is dropped, and a failed `add_slot` leaves nothing bound.
        let bound = unsafe { object.core.add_slot(&**object, PCI_IRQ_SLOT, irq_id, options) };
        if let Err(err) = bound {
            log::warn!("pci irq: failed to register interrupt {irq_id}: {err}");
            object.device.lock().take();
            return Err(err);
        }

        if maskable {
            object.unmask_interrupt(irq_id);
        }
        log::debug!("pci irq: created interrupt object for {irq_id} (maskable: {maskable})");
        Ok((
            Rights::DEFAULT_PCI_INTERRUPT,
            Handle::new(object, Rights::DEFAULT_PCI_INTERRUPT),
        ))
    }

    /// Trap-context handler installed with the bus.
    fn irq_thunk(_device: &dyn IrqDevice, _irq: IrqId, ctx: IrqContext) -> IrqReturn {
        // SAFETY: The bus only invokes a handler while it is registered, and
        // the dispatcher unregisters before its core is dropped.
        let core = unsafe { ctx.core() };
        core.slots().record_first_fire(ctx.slot(), time::now_nanos());
        if core.signal(slot_bit(ctx.slot())) {
            IrqReturn::MASK | IrqReturn::RESCHED
        } else {
            IrqReturn::MASK
        }
    }

    /// Returns the interrupt source this object is bound to.
    #[must_use]
    pub fn irq_id(&self) -> IrqId {
        self.irq_id
    }

    /// Returns whether the source is masked between waits.
    #[must_use]
    pub fn is_maskable(&self) -> bool {
        self.maskable
    }

    /// Returns `true` while the device reference is held.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.device.lock().is_some()
    }

    /// Returns the shared interrupt state.
    #[must_use]
    pub fn core(&self) -> &InterruptCore {
        &self.core
    }
}

impl<D: IrqDevice> InterruptHooks for PciInterruptDispatcher<D> {
    fn pre_wait(&self) {
        self.core.slots().reset_timestamps();
        if self.maskable {
            self.unmask_interrupt(self.irq_id);
        }
    }

    fn post_wait(&self, _signals: u64) {}

    fn mask_interrupt(&self, irq: IrqId) {
        if let Some(device) = self.device.lock().as_ref() {
            device.mask_irq(irq);
        }
    }

    fn unmask_interrupt(&self, irq: IrqId) {
        if let Some(device) = self.device.lock().as_ref() {
            device.unmask_irq(irq);
        }
    }

    fn register_interrupt_handler(&self, irq: IrqId, ctx: IrqContext) -> Result<(), IrqError> {
        let device = self.device.lock().clone().ok_or(IrqError::Internal)?;
        device.register_irq_handler(irq, Some(IrqHandler::new(Self::irq_thunk, ctx)))
    }

    fn unregister_interrupt_handler(&self, irq: IrqId) -> Result<(), IrqError> {
        let device = self.device.lock().clone();
        match device {
            Some(device) => device.register_irq_handler(irq, None),
            None => Ok(()),
        }
    }
}

impl<D: IrqDevice> KernelObject for PciInterruptDispatcher<D> {
    fn on_zero_handles(&self) {
        self.canary.assert();
        if self.maskable {
            self.mask_interrupt(self.irq_id);
        }
        log::debug!("pci irq: last handle to {} closed, cancelling", self.irq_id);
        self.core.cancel();
    }
}

impl<D: IrqDevice> InterruptDispatcher for PciInterruptDispatcher<D> {
    fn bind(&self, _slot: u32, _irq: IrqId, _options: SlotOptions) -> Result<(), IrqError> {
        self.canary.assert();
        Err(IrqError::NotSupported)
    }

    fn wait_for_interrupt(&self) -> impl Future<Output = Result<u64, IrqError>> + Send + '_ {
        self.canary.assert();
        self.core.wait(self)
    }
}

impl<D: IrqDevice> Drop for PciInterruptDispatcher<D> {
    fn drop(&mut self) {
        self.canary.assert();
        if !self.is_attached() {
            return;
        }
        // The handler must be gone before the device reference is released.
        self.core.unregister_all(&*self);
        self.device.get_mut().take();
        log::debug!("pci irq: released interrupt {}", self.irq_id);
    }
}

impl<D: IrqDevice> fmt::Debug for PciInterruptDispatcher<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PciInterruptDispatcher")
            .field("irq_id", &self.irq_id)
            .field("maskable", &self.maskable)
            .field("attached", &self.is_attached())
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{BusOp, FakePciDevice, block_on, poll_once, set_time};
    use std::pin::pin;
    use std::task::Poll;
    use std::time::Duration;

    type Dispatcher = PciInterruptDispatcher<FakePciDevice>;

    const IRQ: IrqId = IrqId::new(7);

    fn create(device: &Arc<FakePciDevice>, maskable: bool) -> Handle<Dispatcher> {
        let (rights, handle) = Dispatcher::create(Some(device), IRQ, maskable).unwrap();
        assert_eq!(rights, Rights::DEFAULT_PCI_INTERRUPT);
        handle
    }

    #[test]
    fn create_without_device_is_invalid() {
        assert_eq!(
            Dispatcher::create(None, IRQ, true).unwrap_err(),
            IrqError::InvalidArgs
        );
    }

    #[test]
    fn create_with_invalid_irq_registers_nothing() {
        let device = FakePciDevice::new(4);
        assert_eq!(
            Dispatcher::create(Some(&device), IRQ, true).unwrap_err(),
            IrqError::Internal
        );
        assert!(device.ops().is_empty());
        assert_eq!(Arc::strong_count(&device), 1);
    }

    #[test]
    fn create_registers_and_unmasks() {
        let device = FakePciDevice::new(16);
        let handle = create(&device, true);
        assert_eq!(handle.rights(), Rights::DEFAULT_PCI_INTERRUPT);
        assert!(handle.is_attached());
        assert!(device.has_handler(IRQ));
        assert_eq!(device.ops(), [BusOp::Register(IRQ), BusOp::Unmask(IRQ)]);
        assert_eq!(Arc::strong_count(&device), 2);
    }

    #[test]
    fn create_non_maskable_leaves_mask_alone() {
        let device = FakePciDevice::new(16);
        let handle = create(&device, false);
        assert!(!handle.is_maskable());
        assert_eq!(device.ops(), [BusOp::Register(IRQ)]);
    }

    #[test]
    fn failed_registration_releases_device() {
        let device = FakePciDevice::new(16);
        device.fail_next_register(IrqError::NoMemory);
        assert_eq!(
            Dispatcher::create(Some(&device), IRQ, true).unwrap_err(),
            IrqError::NoMemory
        );
        assert!(!device.has_handler(IRQ));
        assert_eq!(Arc::strong_count(&device), 1);
        assert!(device.ops().is_empty());
    }

    #[test]
    fn second_create_on_same_vector_fails() {
        let device = FakePciDevice::new(16);
        let first = create(&device, true);
        assert_eq!(
            Dispatcher::create(Some(&device), IRQ, true).unwrap_err(),
            IrqError::AlreadyBound
        );
        assert_eq!(Arc::strong_count(&device), 2);

        // The first object is untouched by the failed attempt.
        assert!(device.has_handler(IRQ));
        assert!(device.fire(IRQ).is_some());
        assert_eq!(block_on(first.wait_for_interrupt()), Ok(1));
    }

    #[test]
    fn bind_is_not_supported() {
        let device = FakePciDevice::new(16);
        let handle = create(&device, true);
        assert_eq!(
            handle.bind(1, IrqId::new(8), SlotOptions::empty()),
            Err(IrqError::NotSupported)
        );
    }

    #[test]
    fn firings_before_wait_coalesce_and_keep_first_timestamp() {
        let device = FakePciDevice::new(16);
        let handle = create(&device, true);

        set_time(100);
        assert_eq!(device.fire(IRQ), Some(IrqReturn::MASK));
        set_time(200);
        // Masked by the first firing.
        assert_eq!(device.fire(IRQ), None);
        assert_eq!(handle.core().first_fire(PCI_IRQ_SLOT), Some(100));

        assert_eq!(block_on(handle.wait_for_interrupt()), Ok(1));

        let mut next = pin!(handle.wait_for_interrupt());
        assert!(poll_once(next.as_mut()).is_pending());
        assert!(!device.is_masked(IRQ));
        assert_eq!(handle.core().first_fire(PCI_IRQ_SLOT), None);

        set_time(300);
        assert_eq!(
            device.fire(IRQ),
            Some(IrqReturn::MASK | IrqReturn::RESCHED)
        );
        assert_eq!(poll_once(next.as_mut()), Poll::Ready(Ok(1)));
        assert_eq!(handle.core().first_fire(PCI_IRQ_SLOT), Some(300));
    }

    #[test]
    fn unmaskable_source_coalesces_repeated_firings() {
        let device = FakePciDevice::without_masking(16);
        let handle = create(&device, false);

        set_time(10);
        assert!(device.fire(IRQ).is_some());
        set_time(20);
        assert!(device.fire(IRQ).is_some());
        assert_eq!(handle.core().pending(), 1);
        assert_eq!(handle.core().first_fire(PCI_IRQ_SLOT), Some(10));

        assert_eq!(block_on(handle.wait_for_interrupt()), Ok(1));
        let mut next = pin!(handle.wait_for_interrupt());
        assert!(poll_once(next.as_mut()).is_pending());
    }

    #[test]
    fn last_handle_masks_then_cancels_and_drop_unregisters() {
        let device = FakePciDevice::new(16);
        let handle = create(&device, true);
        let object = handle.object();
        device.clear_ops();

        let mut wait = Box::pin(object.wait_for_interrupt());
        assert!(poll_once(wait.as_mut()).is_pending());

        drop(handle);
        assert!(device.is_masked(IRQ));
        assert_eq!(poll_once(wait.as_mut()), Poll::Ready(Err(IrqError::Cancelled)));
        // Still registered while a kernel reference keeps the object alive.
        assert!(device.has_handler(IRQ));

        drop(wait);
        drop(object);
        assert!(!device.has_handler(IRQ));
        assert_eq!(Arc::strong_count(&device), 1);
        assert_eq!(
            device.ops(),
            [
                BusOp::Unmask(IRQ),
                BusOp::Mask(IRQ),
                BusOp::Unregister(IRQ)
            ]
        );
        assert_eq!(device.fire(IRQ), None);
    }

    #[test]
    fn last_handle_of_unmaskable_source_only_cancels() {
        let device = FakePciDevice::new(16);
        let handle = create(&device, false);
        let object = handle.object();
        device.clear_ops();

        let mut wait = Box::pin(object.wait_for_interrupt());
        assert!(poll_once(wait.as_mut()).is_pending());

        drop(handle);
        assert!(object.is_closed());
        assert!(!device.is_masked(IRQ));
        assert_eq!(poll_once(wait.as_mut()), Poll::Ready(Err(IrqError::Cancelled)));
        drop(wait);

        // The handler still reaches the core until the object is destroyed.
        assert_eq!(device.fire(IRQ), Some(IrqReturn::MASK));
        assert_eq!(object.core().pending(), 1);

        drop(object);
        assert!(!device.has_handler(IRQ));
        assert_eq!(Arc::strong_count(&device), 1);
        assert!(!device.ops().contains(&BusOp::Mask(IRQ)));
        assert_eq!(device.ops(), [BusOp::Unregister(IRQ)]);
    }

    #[test]
    fn duplicated_handle_defers_teardown() {
        let device = FakePciDevice::new(16);
        let handle = create(&device, true);
        let dup = handle.duplicate(Rights::WAIT).unwrap();

        drop(handle);
        assert_eq!(dup.core().pending(), 0);
        assert!(!device.is_masked(IRQ));

        drop(dup);
        assert!(!device.has_handler(IRQ));
    }

    #[test]
    fn wait_is_released_by_a_firing_on_another_thread() {
        let device = FakePciDevice::new(16);
        let handle = create(&device, true);

        let firer = {
            let device = Arc::clone(&device);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                while device.fire(IRQ).is_none() {
                    std::thread::yield_now();
                }
            })
        };
        assert_eq!(block_on(handle.wait_for_interrupt()), Ok(1));
        firer.join().unwrap();
    }
}
