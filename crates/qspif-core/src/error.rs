//! Error types for qspif-core
//!
//! A single flat, `Copy` error type shared by the SFDP parser, the geometry
//! model and the command sequencer. Adapter-level failures reported by a
//! [`QspiBus`](crate::bus::QspiBus) collapse into [`Error::DeviceError`].

use core::fmt;

use crate::bus::BusError;

/// Block device errors, `Copy` and usable without std
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Device errors
    /// The bus adapter reported a transaction failure
    DeviceError,
    /// Waiting for the device to become ready timed out
    ReadyFailed,
    /// The write enable latch never set
    WriteEnableFailed,

    // Discovery errors
    /// SFDP tables are missing, malformed or describe an unsupported setup
    ParsingFailed,
    /// The device reports more regions or address space than supported
    CapacityExceeded,

    // State errors
    /// Operation attempted before a successful `init()`
    NotReady,

    // Address/size errors
    /// Address is at or beyond the device size
    AddressOutOfBounds,
    /// Address or size violates the program/erase granularity
    InvalidAlignment,
    /// Provided buffer is smaller than the requested transfer
    BufferTooSmall,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceError => write!(f, "QSPI device transaction failed"),
            Self::ReadyFailed => write!(f, "timed out waiting for flash to become ready"),
            Self::WriteEnableFailed => write!(f, "write enable latch did not set"),
            Self::ParsingFailed => write!(f, "SFDP parsing failed"),
            Self::CapacityExceeded => write!(f, "device geometry exceeds driver capacity"),
            Self::NotReady => write!(f, "block device not initialized"),
            Self::AddressOutOfBounds => write!(f, "address out of bounds"),
            Self::InvalidAlignment => write!(f, "invalid alignment"),
            Self::BufferTooSmall => write!(f, "buffer too small"),
        }
    }
}

impl From<BusError> for Error {
    fn from(_: BusError) -> Self {
        Self::DeviceError
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result carrying a block device [`Error`]
pub type Result<T> = core::result::Result<T, Error>;
