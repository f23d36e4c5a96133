//! Core synchronization primitives for Hadron kernel objects.
//!
//! This crate contains the host-testable building blocks that kernel
//! objects are assembled from: spin locks, the interrupt-safe spin lock,
//! the auto-unsignal [`Event`](sync::Event) used to park tasks until an
//! interrupt arrives, validity canaries, and the monotonic clock hook.
//!
//! By living outside the kernel crate, these types can be tested with
//! `cargo test`, loom, and shuttle on the host without a kernel target.

#![cfg_attr(not(test), no_std)]
#![feature(negative_impls)]
#![warn(missing_docs)]

pub mod canary;
pub mod safety;
pub mod sync;
pub mod time;
