//! QSPI bus types and the transfer adapter seam
//!
//! This module provides the trait the platform implements to perform the
//! physical transfers, the frame format description handed to it, the
//! multi-line I/O modes, and the standard JEDEC opcodes used by the driver.

mod format;
mod io_mode;
pub mod opcodes;
mod traits;

pub use format::{AddressSize, AltSize, BusFormat, BusWidth};
pub use io_mode::IoMode;
pub use traits::{BusError, QspiBus};
