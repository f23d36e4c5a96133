//! Interrupt objects for the Hadron kernel.
//!
//! An interrupt object lets a task block until a hardware interrupt fires.
//! Delivery happens in trap context, where nothing may block, allocate, or
//! take an ordinary lock, so the two sides meet only through an atomic
//! pending mask and an auto-unsignal [`Event`](hadron_core::sync::Event):
//!
//! - [`dispatcher::InterruptCore`] is the bus-independent wait / signal /
//!   cancel engine, parameterised over the [`dispatcher::InterruptHooks`] a
//!   hardware binding implements.
//! - [`pci::PciInterruptDispatcher`] binds the core to one vector of a PCI
//!   device through the [`bus::IrqDevice`] contract.
//! - [`object`] provides the handle-counted wrapper whose last handle
//!   triggers teardown.

#![cfg_attr(not(test), no_std)]
#![feature(allocator_api)]
#![warn(missing_docs)]

extern crate alloc;

pub mod bus;
pub mod config;
pub mod dispatcher;
mod error;
pub mod object;
pub mod pci;
pub mod rights;
pub mod slot;

#[cfg(test)]
mod test_util;

pub use error::IrqError;
