//! Command sequencing
//!
//! This module implements the JEDEC QSPI NOR command sequences the driver
//! needs on top of a [`Session`], which owns the bus adapter and caches
//! the frame format programmed into it.

mod nor;
mod session;

pub use nor::*;
pub use session::Session;
