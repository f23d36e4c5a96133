//! Slot table: logical interrupt channels of one interrupt object.
//!
//! Each slot maps a pending-mask bit to a bus interrupt source. Records are
//! inserted and removed from task context under a [`SpinLock`]; trap
//! context only ever touches the first-fire timestamp, which is a lone
//! atomic and needs no lock.

use core::fmt;

use bitflags::bitflags;
use hadron_core::sync::SpinLock;
use hadron_core::sync::loom_compat::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crate::IrqError;
use crate::bus::IrqId;
use crate::config::MAX_SLOTS;

bitflags! {
    /// Per-slot options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SlotOptions: u32 {
        /// The source can be masked at the device.
        const MASKABLE = 1 << 0;
    }
}

/// A point-in-time copy of one bound slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotInfo {
    /// Slot index, which is also the slot's pending-mask bit.
    pub slot: u32,
    /// Interrupt source the slot is bound to.
    pub irq: IrqId,
    /// Options given when the slot was bound.
    pub options: SlotOptions,
    /// Time of the first firing since the last re-arm, if any.
    pub first_fire: Option<u64>,
}

struct SlotRecord {
    bound: AtomicBool,
    irq: AtomicU32,
    options: AtomicU32,
    /// Nanoseconds; 0 means unset.
    first_fire: AtomicU64,
}

impl SlotRecord {
    fn new() -> Self {
        Self {
            bound: AtomicBool::new(false),
            irq: AtomicU32::new(0),
            options: AtomicU32::new(0),
            first_fire: AtomicU64::new(0),
        }
    }

    fn is_bound(&self) -> bool {
        self.bound.load(Ordering::Acquire)
    }

    fn irq(&self) -> IrqId {
        IrqId::new(self.irq.load(Ordering::Relaxed))
    }

    fn info(&self, slot: u32) -> SlotInfo {
        let first_fire = self.first_fire.load(Ordering::Acquire);
        SlotInfo {
            slot,
            irq: self.irq(),
            options: SlotOptions::from_bits_retain(self.options.load(Ordering::Relaxed)),
            first_fire: (first_fire != 0).then_some(first_fire),
        }
    }
}

/// Fixed-capacity table of slot records, indexed by slot.
pub struct SlotTable {
    records: [SlotRecord; MAX_SLOTS],
    /// Serializes inserts and removals; holds the bound count.
    writer: SpinLock<usize>,
}

impl SlotTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: core::array::from_fn(|_| SlotRecord::new()),
            writer: SpinLock::named("irq_slot_table", 0),
        }
    }

    /// Binds `slot` to `irq`.
    ///
    /// # Errors
    ///
    /// - [`IrqError::InvalidArgs`] if `slot` is not below [`MAX_SLOTS`].
    /// - [`IrqError::AlreadyBound`] if `irq` is already bound to any slot, or
    ///   `slot` is already in use.
    /// - [`IrqError::OutOfSlots`] if every slot is in use.
    pub fn insert(&self, slot: u32, irq: IrqId, options: SlotOptions) -> Result<(), IrqError> {
        let record = self.record(slot).ok_or(IrqError::InvalidArgs)?;
        let mut bound = self.writer.lock();

        if self.iter().any(|info| info.irq == irq) {
            return Err(IrqError::AlreadyBound);
        }
        if *bound >= MAX_SLOTS {
            return Err(IrqError::OutOfSlots);
        }
        if record.is_bound() {
            return Err(IrqError::AlreadyBound);
        }

        record.irq.store(irq.as_u32(), Ordering::Relaxed);
        record.options.store(options.bits(), Ordering::Relaxed);
        record.first_fire.store(0, Ordering::Relaxed);
        record.bound.store(true, Ordering::Release);
        *bound += 1;
        Ok(())
    }

    /// Unbinds `slot`, returning what it held.
    pub fn remove(&self, slot: u32) -> Option<SlotInfo> {
        let record = self.record(slot)?;
        let mut bound = self.writer.lock();
        if !record.is_bound() {
            return None;
        }
        let info = record.info(slot);
        record.bound.store(false, Ordering::Release);
        *bound -= 1;
        Some(info)
    }

    /// Returns a copy of `slot` if it is bound.
    #[must_use]
    pub fn get(&self, slot: u32) -> Option<SlotInfo> {
        let record = self.record(slot)?;
        record.is_bound().then(|| record.info(slot))
    }

    /// Iterates over the bound slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = SlotInfo> + '_ {
        (0u32..)
            .zip(self.records.iter())
            .filter(|(_, record)| record.is_bound())
            .map(|(slot, record)| record.info(slot))
    }

    /// Returns the number of bound slots.
    #[must_use]
    pub fn len(&self) -> usize {
        *self.writer.lock()
    }

    /// Returns `true` if no slot is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records `now` as the first firing of `slot` unless one is already
    /// recorded. Returns `true` if this call recorded it.
    ///
    /// Lock-free; safe from trap context.
    pub fn record_first_fire(&self, slot: u32, now: u64) -> bool {
        let Some(record) = self.record(slot) else {
            return false;
        };
        // 0 is the unset marker, so a clock that still reads 0 records 1.
        record
            .first_fire
            .compare_exchange(0, now.max(1), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Returns the first-fire timestamp of `slot`, if one is recorded.
    #[must_use]
    pub fn first_fire(&self, slot: u32) -> Option<u64> {
        self.get(slot).and_then(|info| info.first_fire)
    }

    /// Clears every first-fire timestamp.
    pub fn reset_timestamps(&self) {
        for record in &self.records {
            record.first_fire.store(0, Ordering::Release);
        }
    }

    fn record(&self, slot: u32) -> Option<&SlotRecord> {
        self.records.get(usize::try_from(slot).ok()?)
    }
}

impl Default for SlotTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SlotTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
