//! Decoded SFDP structures
//!
//! Plain data types for the SFDP header, the parameter directory and the
//! fields of the Basic Flash Parameter Table the driver acts on. Bit
//! positions follow JESD216 up to revision D.

use crate::bus::AddressSize;
use crate::error::{Error, Result};
use crate::geometry::{EraseType, EraseTypes};

use super::SectorMap;

/// `"SFDP"` read as a little-endian u32
pub const SFDP_SIGNATURE: u32 = 0x50444653;

/// Lowest SFDP revision the parser accepts
pub const SFDP_MIN_REVISION: SfdpRevision = SfdpRevision::JESD216;

/// Largest parameter table the parser reads, in bytes
pub const MAX_PARAMETER_TABLE_SIZE: usize = 256;

/// Size of the SFDP address space (24-bit addresses)
pub const SFDP_ADDRESS_SPACE: u32 = 1 << 24;

/// Minimum length of the Basic Flash Parameter Table (JESD216, 9 DWORDs)
pub const BFPT_MIN_SIZE: usize = 36;

/// ID of the Basic Flash Parameter Table
pub const PARAM_ID_BASIC: u16 = 0xFF00;
/// ID of the Sector Map Parameter Table
pub const PARAM_ID_SECTOR_MAP: u16 = 0xFF81;

/// One fast read instruction as declared in the BFPT
///
/// An opcode of zero means the mode is not available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FastReadParams {
    /// Read opcode
    pub opcode: u8,
    /// Mode bit clocks following the address
    pub mode_clocks: u8,
    /// Wait states following the mode clocks
    pub dummy_clocks: u8,
}

impl FastReadParams {
    /// Describe a fast read instruction
    pub const fn new(opcode: u8, mode_clocks: u8, dummy_clocks: u8) -> Self {
        Self {
            opcode,
            mode_clocks,
            dummy_clocks,
        }
    }

    /// Whether an instruction is actually declared
    ///
    /// Both 0x00 and 0xFF are used by vendors to mark an absent instruction.
    pub fn is_supported(&self) -> bool {
        self.opcode != 0x00 && self.opcode != 0xFF
    }

    /// Total clocks between the address and the data phase
    pub fn wait_cycles(&self) -> u8 {
        self.mode_clocks + self.dummy_clocks
    }

    /// Decode the upper 16 bits of a BFPT DWORD
    ///
    /// Opcode in [31:24], mode clocks in [23:21], wait states in [20:16].
    pub fn from_high_half(dword: u32) -> Self {
        Self::from_low_half(dword >> 16)
    }

    /// Decode the lower 16 bits of a BFPT DWORD
    ///
    /// Opcode in [15:8], mode clocks in [7:5], wait states in [4:0].
    pub fn from_low_half(dword: u32) -> Self {
        let field = dword as u16;
        let opcode = (field >> 8) as u8;
        if opcode == 0x00 {
            return Self::default();
        }
        Self::new(opcode, ((field >> 5) & 0x07) as u8, (field & 0x1F) as u8)
    }
}

/// Revision of the SFDP header or of a parameter table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SfdpRevision {
    /// Major revision
    pub major: u8,
    /// Minor revision
    pub minor: u8,
}

impl SfdpRevision {
    /// JESD216, 9 DWORD BFPT
    pub const JESD216: Self = Self::new(1, 0);
    /// JESD216B, 16 DWORD BFPT with quad enable and reset descriptors
    pub const JESD216B: Self = Self::new(1, 6);

    /// Build a revision from its two parts
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Compare against `other` as `(major, minor)`
    pub fn at_least(&self, other: SfdpRevision) -> bool {
        (self.major, self.minor) >= (other.major, other.minor)
    }
}

impl core::fmt::Display for SfdpRevision {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// The 8 bytes at SFDP address 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SfdpHeader {
    /// Must equal [`SFDP_SIGNATURE`]
    pub signature: u32,
    /// Header revision
    pub revision: SfdpRevision,
    /// Directory entries minus one
    pub nph: u8,
    /// 0xFF on devices without an access protocol field
    pub access_protocol: u8,
}

impl SfdpHeader {
    /// Encoded size in bytes
    pub const SIZE: usize = 8;

    /// Decode the header bytes
    pub fn parse(data: &[u8; 8]) -> Self {
        let [s0, s1, s2, s3, minor, major, nph, access_protocol] = *data;
        Self {
            signature: u32::from_le_bytes([s0, s1, s2, s3]),
            revision: SfdpRevision::new(major, minor),
            nph,
            access_protocol,
        }
    }

    /// Whether the signature reads "SFDP"
    pub fn is_valid(&self) -> bool {
        self.signature == SFDP_SIGNATURE
    }

    /// Number of directory entries following the header
    pub fn num_param_headers(&self) -> usize {
        usize::from(self.nph) + 1
    }
}

/// One 8-byte entry of the parameter directory
///
/// Entries follow the header back to back, starting at SFDP address 8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParameterHeader {
    /// Table ID, MSB from byte 7 and LSB from byte 0
    pub id: u16,
    /// Table revision
    pub revision: SfdpRevision,
    /// Table length in DWORDs
    pub length_dwords: u8,
    /// SFDP address of the table
    pub table_pointer: u32,
}

impl ParameterHeader {
    /// Encoded size in bytes
    pub const SIZE: usize = 8;

    /// Decode a directory entry
    pub fn parse(data: &[u8; 8]) -> Self {
        let [id_lsb, minor, major, length_dwords, p0, p1, p2, id_msb] = *data;
        Self {
            id: u16::from_le_bytes([id_lsb, id_msb]),
            revision: SfdpRevision::new(major, minor),
            length_dwords,
            table_pointer: u32::from_le_bytes([p0, p1, p2, 0]),
        }
    }

    /// Table length in bytes
    pub fn length_bytes(&self) -> usize {
        usize::from(self.length_dwords) * 4
    }
}

/// Address bytes the device accepts (BFPT DWORD 1 bits [18:17])
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressMode {
    /// 3-byte addresses only
    #[default]
    ThreeByteOnly,
    /// 3-byte addresses at power-up, 4-byte on request
    ThreeOrFourByte,
    /// 4-byte addresses only
    FourByteOnly,
}

impl AddressMode {
    /// Decode the two-bit field; the reserved value counts as 3-byte only
    pub fn from_bfpt(value: u8) -> Self {
        match value & 0x03 {
            0b01 => Self::ThreeOrFourByte,
            0b10 => Self::FourByteOnly,
            _ => Self::ThreeByteOnly,
        }
    }
}

/// Where the QE bit lives and how to set it (BFPT DWORD 15 bits [22:20])
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuadEnableRequirement {
    /// No QE bit, quad transfers always work
    #[default]
    None,
    /// SR2 bit 1, set by writing SR1 and SR2 together with 01h
    Sr2Bit1,
    /// SR1 bit 6, set with a 1-byte 01h write
    Sr1Bit6,
    /// SR2 bit 7, read with 3Fh and written with 3Eh
    Sr2Bit7,
    /// SR2 bit 1; like `Sr2Bit1` but a 1-byte write keeps SR2
    Sr2Bit1NoClear,
    /// SR2 bit 1; read SR1/SR2 with 05h/35h, write both with 01h
    Sr2Bit1ReadSplit,
    /// SR2 bit 1; read with 35h, write SR2 alone with 31h
    Sr2Bit1Cmd31,
}

impl QuadEnableRequirement {
    /// Decode the three-bit field
    ///
    /// # Errors
    /// `ParsingFailed` for the reserved encoding 111b
    pub fn from_bfpt(value: u8) -> Result<Self> {
        match value & 0x07 {
            0b000 => Ok(Self::None),
            0b001 => Ok(Self::Sr2Bit1),
            0b010 => Ok(Self::Sr1Bit6),
            0b011 => Ok(Self::Sr2Bit7),
            0b100 => Ok(Self::Sr2Bit1NoClear),
            0b101 => Ok(Self::Sr2Bit1ReadSplit),
            0b110 => Ok(Self::Sr2Bit1Cmd31),
            code => {
                log::error!("Reserved quad enable requirement {:03b}", code);
                Err(Error::ParsingFailed)
            }
        }
    }

    /// Whether a QE bit has to be set before quad transfers
    pub fn is_needed(&self) -> bool {
        *self != Self::None
    }
}

/// Ways to enter QPI mode (BFPT DWORD 15 bits [8:4])
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QpiEnableSequence {
    /// Declared sequences, see the associated constants
    pub methods: u8,
}

impl QpiEnableSequence {
    /// Set QE per the quad enable requirement, then issue 0x38
    pub const QE_THEN_38: u8 = 0x01;
    /// Issue 0x38
    pub const INSTR_38: u8 = 0x02;
    /// Issue 0x35
    pub const INSTR_35: u8 = 0x04;
    /// Read configuration with 0x65 at 0x800003, set bit 6, write with 0x71
    pub const CR_BIT6: u8 = 0x08;
    /// Read configuration with 0x65, set bit 7, write with 0x61
    pub const ECR_BIT7: u8 = 0x10;

    /// Decode the five-bit field
    pub fn from_bfpt(value: u8) -> Self {
        Self {
            methods: value & 0x1F,
        }
    }

    /// Whether `method` is among the declared sequences
    pub fn supports(&self, method: u8) -> bool {
        self.methods & method != 0
    }

    /// Whether any sequence is declared at all
    pub fn is_usable(&self) -> bool {
        self.methods != 0
    }
}

/// Ways to reach 4-byte addressing (BFPT DWORD 16 bits [31:24])
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FourByteEntryMethods {
    /// Declared methods, see the associated constants
    pub methods: u8,
}

impl FourByteEntryMethods {
    /// B7h enters, E9h leaves
    pub const INSTR_B7_E9: u8 = 0x01;
    /// WREN then B7h enters, WREN then E9h leaves
    pub const WREN_INSTR_B7_E9: u8 = 0x02;
    /// The device never leaves 4-byte addressing
    pub const ALWAYS_4BYTE: u8 = 0x40;

    /// Decode the eight-bit field
    pub fn from_bfpt(value: u8) -> Self {
        Self { methods: value }
    }

    /// Whether `method` is among the declared methods
    pub fn supports(&self, method: u8) -> bool {
        self.methods & method != 0
    }

    /// Whether the device is permanently in 4-byte mode
    pub fn always_4byte(&self) -> bool {
        self.supports(Self::ALWAYS_4BYTE)
    }
}

/// How the driver gets the device into the address mode it needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressEntry {
    /// 3-byte addresses, nothing to do
    ThreeByte,
    /// 4-byte addresses are already active
    Native4Byte,
    /// Issue 0xB7
    EnterB7,
    /// Issue WREN then 0xB7
    WriteEnableB7,
}

impl AddressEntry {
    /// Address size used once the entry has been performed
    pub fn address_size(&self) -> AddressSize {
        match self {
            Self::ThreeByte => AddressSize::ThreeByte,
            _ => AddressSize::FourByte,
        }
    }
}

/// Declared software reset sequences (BFPT DWORD 16 bits [13:8])
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SoftResetSupport {
    /// Declared sequences; only [`RESET_66_99`](Self::RESET_66_99) is issued
    pub methods: u8,
}

impl SoftResetSupport {
    /// Reset enable 66h followed by reset 99h
    pub const RESET_66_99: u8 = 0x10;

    /// Decode the six-bit field
    pub fn from_bfpt(value: u8) -> Self {
        Self {
            methods: value & 0x3F,
        }
    }

    /// Whether the 66h/99h pair is declared
    pub fn supports_66_99(&self) -> bool {
        self.methods & Self::RESET_66_99 != 0
    }
}

/// The Basic Flash Parameter Table fields the driver uses
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BasicFlashParams {
    /// Table revision from the directory entry
    pub revision: SfdpRevision,
    /// Device size in bytes
    pub density_bytes: u64,
    /// Program page size in bytes
    pub page_size: u32,
    /// Address bytes the device accepts
    pub address_mode: AddressMode,
    /// Erase types from DWORDs 8 and 9
    pub erase_types: EraseTypes,
    /// Legacy 4 KiB erase, if declared in DWORD 1
    pub legacy_erase: Option<EraseType>,

    // Capability bits, DWORDs 1 and 5
    /// 1-1-2 declared
    pub fast_read_112: bool,
    /// 1-2-2 declared
    pub fast_read_122: bool,
    /// 1-1-4 declared
    pub fast_read_114: bool,
    /// 1-4-4 declared
    pub fast_read_144: bool,
    /// 4-4-4 declared
    pub fast_read_444: bool,

    // Instructions, DWORDs 3, 4 and 7
    /// 1-1-4 read, DWORD 3 upper half
    pub fast_read_114_params: FastReadParams,
    /// 1-4-4 read, DWORD 3 lower half
    pub fast_read_144_params: FastReadParams,
    /// 1-2-2 read, DWORD 4 upper half
    pub fast_read_122_params: FastReadParams,
    /// 1-1-2 read, DWORD 4 lower half
    pub fast_read_112_params: FastReadParams,
    /// 4-4-4 read, DWORD 7 upper half
    pub fast_read_444_params: FastReadParams,

    // DWORDs 15 and 16, JESD216B and later
    /// QE bit location
    pub quad_enable: QuadEnableRequirement,
    /// QPI entry sequences
    pub qpi_enable: QpiEnableSequence,
    /// 4-byte address entry
    pub four_byte_entry: FourByteEntryMethods,
    /// Software reset sequences
    pub soft_reset: SoftResetSupport,
}

impl BasicFlashParams {
    /// Decide how the device reaches the address size its density needs
    ///
    /// # Errors
    /// `ParsingFailed` if the device is larger than 16 MiB but declares no
    /// usable way to address it
    pub fn address_entry(&self) -> Result<AddressEntry> {
        if self.density_bytes <= AddressSize::ThreeByte.max_size() {
            return Ok(AddressEntry::ThreeByte);
        }

        let methods = &self.four_byte_entry;
        if self.address_mode == AddressMode::FourByteOnly || methods.always_4byte() {
            Ok(AddressEntry::Native4Byte)
        } else if methods.supports(FourByteEntryMethods::INSTR_B7_E9) {
            Ok(AddressEntry::EnterB7)
        } else if methods.supports(FourByteEntryMethods::WREN_INSTR_B7_E9) {
            Ok(AddressEntry::WriteEnableB7)
        } else {
            log::error!(
                "Device of {} bytes needs 4-byte addressing but declares no entry method",
                self.density_bytes
            );
            Err(Error::ParsingFailed)
        }
    }
}

/// Result of a successful [`probe`](super::probe)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SfdpInfo {
    /// The SFDP header
    pub header: SfdpHeader,
    /// Decoded BFPT
    pub basic_params: BasicFlashParams,
    /// Decoded sector map, if the device has one
    pub sector_map: Option<SectorMap>,
}
