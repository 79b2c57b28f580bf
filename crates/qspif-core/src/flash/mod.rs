//! Block device layer
//!
//! [`QspifBlockDevice`] ties the SFDP parser, the geometry model and the
//! command sequences together behind the [`BlockDevice`] trait.

mod config;
mod device;
mod qspif;

pub use config::QspifConfig;
pub use device::BlockDevice;
pub use qspif::QspifBlockDevice;
