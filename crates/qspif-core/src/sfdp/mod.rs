//! SFDP (Serial Flash Discoverable Parameters) parsing
//!
//! This module implements parsing of SFDP data structures as defined by
//! JEDEC JESD216. SFDP provides a standardized way for flash chips to
//! describe their capabilities.
//!
//! # Overview
//!
//! SFDP data is stored in a reserved area of the flash chip and can be
//! read using the RDSFDP command (0x5A). The structure contains:
//!
//! - An SFDP header with signature and revision info
//! - One or more parameter headers describing available tables
//! - Parameter tables containing capability information
//!
//! The driver uses two tables: the Basic Flash Parameter Table for size,
//! page size, erase types and bus modes, and the optional Sector Map
//! Parameter Table for non-uniform erase regions.
//!
//! # Usage
//!
//! ```ignore
//! use qspif_core::protocol::Session;
//! use qspif_core::sfdp;
//!
//! let mut session = Session::new(bus);
//! let info = sfdp::probe(&mut session)?;
//! let mode = sfdp::select_read_mode(&info.basic_params);
//! ```

mod parser;
mod read_mode;
mod sector_map;
mod types;

pub use parser::*;
pub use read_mode::{select_read_mode, ReadMode};
pub use sector_map::{
    DetectionCommand, SectorMap, SectorMapConfig, MAX_CONFIGURATIONS, MAX_DETECTION_COMMANDS,
};
pub use types::*;
