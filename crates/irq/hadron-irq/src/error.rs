//! Interrupt object error type.

use core::fmt;

use hadron_core::sync::WaitError;

/// Errors returned by interrupt object operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqError {
    /// An argument was missing or malformed.
    InvalidArgs,
    /// The bus does not recognise the interrupt source.
    Internal,
    /// Allocating the interrupt object failed.
    NoMemory,
    /// The operation is not supported by this binding.
    NotSupported,
    /// The wait was released by a cancellation.
    Cancelled,
    /// The slot or interrupt source is already bound.
    AlreadyBound,
    /// The slot table is full.
    OutOfSlots,
    /// The handle lacks the rights for the operation.
    AccessDenied,
    /// The underlying event wait failed.
    Wait(WaitError),
}

impl fmt::Display for IrqError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgs => f.write_str("invalid arguments"),
            Self::Internal => f.write_str("invalid interrupt source"),
            Self::NoMemory => f.write_str("out of memory"),
            Self::NotSupported => f.write_str("operation not supported"),
            Self::Cancelled => f.write_str("wait cancelled"),
            Self::AlreadyBound => f.write_str("interrupt already bound"),
            Self::OutOfSlots => f.write_str("no free interrupt slots"),
            Self::AccessDenied => f.write_str("access denied"),
            Self::Wait(err) => write!(f, "wait failed: {err}"),
        }
    }
}

impl core::error::Error for IrqError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Wait(err) => Some(err),
            _ => None,
        }
    }
}

impl From<WaitError> for IrqError {
    fn from(err: WaitError) -> Self {
        Self::Wait(err)
    }
}
