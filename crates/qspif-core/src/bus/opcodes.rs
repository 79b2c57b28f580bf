//! Fixed JEDEC instruction codes
//!
//! Read, erase and QPI entry opcodes that vary per part come from the SFDP
//! tables at runtime and are not listed here.

/// Set the write enable latch
pub const WREN: u8 = 0x06;

/// Status register 1 read
pub const RDSR: u8 = 0x05;
/// Status register 2 read
pub const RDSR2: u8 = 0x35;
/// Status register 1 write, or 1 and 2 with a two byte payload
pub const WRSR: u8 = 0x01;
/// Status register 2 write
pub const WRSR2: u8 = 0x31;
/// Status register 2 read for parts with QE in bit 7
pub const RDSR2_ALT: u8 = 0x3F;
/// Status register 2 write for parts with QE in bit 7
pub const WRSR2_ALT: u8 = 0x3E;

/// 1-1-1 read without wait states
pub const READ: u8 = 0x03;
/// Page program
pub const PP: u8 = 0x02;

/// 4 KiB sector erase, the opcode most parts report as their legacy erase
pub const SE_20: u8 = 0x20;

/// Switch to 4-byte addressing
pub const EN4B: u8 = 0xB7;

/// QPI entry, 38h flavour
pub const EQIO_38: u8 = 0x38;
/// QPI entry, 35h flavour
pub const EQIO_35: u8 = 0x35;
/// Addressed register read
pub const RDAR: u8 = 0x65;
/// Addressed register write
pub const WRAR: u8 = 0x71;
/// Volatile enhanced configuration register write
pub const WRVECR: u8 = 0x61;

/// CR2V address, holds the QPI bit on parts entered through WRAR
pub const CR2V_ADDR: u32 = 0x80_0003;

/// Arm the software reset
pub const RSTEN: u8 = 0x66;
/// Perform the software reset
pub const RST: u8 = 0x99;

/// SFDP space read
pub const RDSFDP: u8 = 0x5A;
/// Wait states RDSFDP always needs
pub const RDSFDP_DUMMY_CYCLES: u8 = 8;

/// SR1 busy flag
pub const SR1_WIP: u8 = 0x01;
/// SR1 write enable latch
pub const SR1_WEL: u8 = 0x02;
/// SR1 quad enable, bit 6 parts
pub const SR1_QE_BIT6: u8 = 0x40;
/// SR2 quad enable, bit 1 parts
pub const SR2_QE: u8 = 0x02;
/// SR2 quad enable, bit 7 parts
pub const SR2_QE_BIT7: u8 = 0x80;
