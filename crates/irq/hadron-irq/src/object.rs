//! Handle-counted kernel objects.
//!
//! Two counts govern an object's life. The [`Arc`] strong count keeps the
//! memory alive; the handle count tracks references user space can act on.
//! When the last [`Handle`] goes away the object's
//! [`on_zero_handles`](KernelObject::on_zero_handles) runs exactly once, so
//! it can quiesce hardware and release blocked waiters while kernel-internal
//! references (for example a task still inside a wait) keep the memory
//! valid. The destructor runs when the last `Arc` drops.

use alloc::sync::Arc;
use core::fmt;
use core::ops::Deref;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::IrqError;
use crate::rights::Rights;

/// An object that can be referred to by handles.
pub trait KernelObject: Send + Sync {
    /// Called once, when the last handle to the object is dropped.
    fn on_zero_handles(&self) {}
}

/// A kernel object together with its handle count.
pub struct Object<T> {
    handles: AtomicUsize,
    /// Set once `on_zero_handles` has run; never cleared.
    closed: AtomicBool,
    inner: T,
}

impl<T: KernelObject> Object<T> {
    /// Wraps `inner` with no handles.
    #[must_use]
    pub const fn new(inner: T) -> Self {
        Self {
            handles: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            inner,
        }
    }

    /// Returns the number of live handles.
    #[must_use]
    pub fn handle_count(&self) -> usize {
        self.handles.load(Ordering::Acquire)
    }

    /// Returns `true` once the last handle has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<T> Deref for Object<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: fmt::Debug> fmt::Debug for Object<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("handles", &self.handles.load(Ordering::Relaxed))
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .field("inner", &self.inner)
            .finish()
    }
}

/// A rights-carrying, counted reference to a kernel object.
pub struct Handle<T: KernelObject> {
    object: Arc<Object<T>>,
    rights: Rights,
}

impl<T: KernelObject> Handle<T> {
    /// Creates a handle to `object` with `rights`.
    ///
    /// Only the code that created `object` mints its first handle; further
    /// handles come from [`duplicate`](Self::duplicate).
    pub(crate) fn new(object: Arc<Object<T>>, rights: Rights) -> Self {
        object.handles.fetch_add(1, Ordering::AcqRel);
        Self { object, rights }
    }

    /// Returns the rights this handle carries.
    #[must_use]
    pub fn rights(&self) -> Rights {
        self.rights
    }

    /// Creates a second handle to the same object with `rights`.
    ///
    /// # Errors
    ///
    /// [`IrqError::AccessDenied`] if this handle lacks
    /// [`Rights::DUPLICATE`] or `rights` is not a subset of its own.
    pub fn duplicate(&self, rights: Rights) -> Result<Self, IrqError> {
        if !self.rights.contains(Rights::DUPLICATE) || !self.rights.contains(rights) {
            return Err(IrqError::AccessDenied);
        }
        Ok(Self::new(Arc::clone(&self.object), rights))
    }

    /// Checks that this handle carries `required`.
    ///
    /// # Errors
    ///
    /// [`IrqError::AccessDenied`] if any right is missing.
    pub fn require(&self, required: Rights) -> Result<&T, IrqError> {
        if self.rights.contains(required) {
            Ok(&self.object.inner)
        } else {
            Err(IrqError::AccessDenied)
        }
    }

    /// Returns a kernel-internal reference that keeps the object alive but
    /// does not count as a handle.
    #[must_use]
    pub fn object(&self) -> Arc<Object<T>> {
        Arc::clone(&self.object)
    }
}

impl<T: KernelObject> Deref for Handle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.object.inner
    }
}

impl<T: KernelObject> Drop for Handle<T> {
    fn drop(&mut self) {
        if self.object.handles.fetch_sub(1, Ordering::AcqRel) == 1
            && !self.object.closed.swap(true, Ordering::AcqRel)
        {
            self.object.inner.on_zero_handles();
        }
    }
}

impl<T: KernelObject> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("rights", &self.rights)
            .field("handles", &self.object.handle_count())
            .finish_non_exhaustive()
    }
}
