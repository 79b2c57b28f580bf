//! qspif-core - SFDP based QSPI NOR flash block device
//!
//! This crate drives a serial NOR flash attached to a quad-SPI controller
//! without knowing the part number at compile time. The chip describes
//! itself through its JEDEC SFDP tables; the driver decodes them into a
//! [`geometry::Geometry`] and then exposes uniform read, program and erase
//! operations through the [`flash::BlockDevice`] trait.
//!
//! The crate is `no_std`. The physical transfer is delegated to an
//! implementation of [`bus::QspiBus`] supplied by the platform.
//!
//! # Features
//!
//! - `std` - Implement `std::error::Error` for [`Error`]
//!
//! # Example
//!
//! ```ignore
//! use embassy_sync::blocking_mutex::raw::NoopRawMutex;
//! use qspif_core::flash::{BlockDevice, QspifBlockDevice, QspifConfig};
//!
//! let device: QspifBlockDevice<NoopRawMutex, _> =
//!     QspifBlockDevice::new(bus, QspifConfig::default());
//! device.init()?;
//!
//! let erase_size = device.erase_size_at(0)?;
//! device.erase(0, erase_size)?;
//! device.program(&data, 0, data.len() as u32)?;
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod bus;
pub mod error;
pub mod flash;
pub mod geometry;
pub mod protocol;
pub mod sfdp;

pub use error::{Error, Result};
