//! Handle rights.

use bitflags::bitflags;

bitflags! {
    /// Operations a handle permits on the object it refers to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Rights: u32 {
        /// The handle may be duplicated.
        const DUPLICATE = 1 << 0;
        /// The handle may be transferred to another process.
        const TRANSFER = 1 << 1;
        /// The object's state may be read.
        const READ = 1 << 2;
        /// The object's state may be written.
        const WRITE = 1 << 3;
        /// The object may be waited on.
        const WAIT = 1 << 4;
    }
}

impl Rights {
    /// Rights granted to a freshly created PCI interrupt handle.
    pub const DEFAULT_PCI_INTERRUPT: Self = Self::DUPLICATE
        .union(Self::TRANSFER)
        .union(Self::WAIT);
}
