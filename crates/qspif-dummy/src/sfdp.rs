//! SFDP image builder
//!
//! Assembles the raw bytes a device returns for RDSFDP: the SFDP header,
//! the parameter header directory, a Basic Flash Parameter Table and an
//! optional Sector Map Parameter Table. Tables follow the directory back to
//! back.

use qspif_core::bus::IoMode;
use qspif_core::sfdp::{
    AddressMode, QuadEnableRequirement, PARAM_ID_BASIC, PARAM_ID_SECTOR_MAP, SFDP_SIGNATURE,
};

/// Number of DWORDs in a JESD216B Basic Flash Parameter Table
const BFPT_DWORDS: usize = 16;

/// Builder for sector map descriptors
#[derive(Debug, Clone, Default)]
pub struct SectorMapBuilder {
    dwords: Vec<u32>,
    last_header: Option<usize>,
}

impl SectorMapBuilder {
    /// Start an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a configuration detection command
    ///
    /// `address` of `None` sends no address phase; otherwise a 3-byte
    /// address is used.
    pub fn detection_command(
        mut self,
        opcode: u8,
        address: Option<u32>,
        dummy_cycles: u8,
        mask: u8,
    ) -> Self {
        let address_length = if address.is_some() { 0b01 } else { 0b00 };
        let header = ((mask as u32) << 24)
            | (address_length << 22)
            | (((dummy_cycles & 0x0F) as u32) << 16)
            | ((opcode as u32) << 8);
        self.last_header = Some(self.dwords.len());
        self.dwords.push(header);
        self.dwords.push(address.unwrap_or(0));
        self
    }

    /// Append the map for configuration `id`
    ///
    /// Each region is `(size, erase-type mask)`; sizes must be multiples of
    /// 256 bytes.
    pub fn map(mut self, id: u8, regions: &[(u32, u8)]) -> Self {
        let count = regions.len().max(1) as u32 - 1;
        self.last_header = Some(self.dwords.len());
        self.dwords.push((count << 16) | ((id as u32) << 8) | 0x02);
        for &(size, mask) in regions {
            self.dwords.push(((size / 256 - 1) << 8) | (mask & 0x0F) as u32);
        }
        self
    }

    /// Finish the table, marking the last descriptor
    pub fn into_dwords(mut self) -> Vec<u32> {
        if let Some(index) = self.last_header {
            self.dwords[index] |= 0x01;
        }
        self.dwords
    }
}

/// A parameter table placed after the directory
#[derive(Debug, Clone)]
struct Table {
    id: u16,
    revision: (u8, u8),
    dwords: Vec<u32>,
}

/// Builder for complete SFDP images
#[derive(Debug, Clone)]
pub struct SfdpBuilder {
    signature: u32,
    revision: (u8, u8),
    bfpt: [u32; BFPT_DWORDS],
    bfpt_dwords: usize,
    sector_map: Option<Vec<u32>>,
    vendor_tables: Vec<Table>,
}

impl SfdpBuilder {
    /// Start an image for a device of `density_bytes` with 256 byte pages
    pub fn new(density_bytes: u64) -> Self {
        let mut builder = Self {
            signature: SFDP_SIGNATURE,
            revision: (1, 6),
            bfpt: [0; BFPT_DWORDS],
            bfpt_dwords: BFPT_DWORDS,
            sector_map: None,
            vendor_tables: Vec::new(),
        };
        // 4 KiB erase not supported until legacy_erase() says otherwise
        builder.bfpt[0] = 0xFF80_0003;
        builder.density(density_bytes).page_size(256)
    }

    /// Override the header signature
    pub fn signature(mut self, signature: u32) -> Self {
        self.signature = signature;
        self
    }

    /// Override the SFDP revision
    pub fn revision(mut self, major: u8, minor: u8) -> Self {
        self.revision = (major, minor);
        self
    }

    /// Truncate the BFPT to `dwords` DWORDs (9 for JESD216)
    pub fn bfpt_dwords(mut self, dwords: usize) -> Self {
        self.bfpt_dwords = dwords.min(BFPT_DWORDS);
        self
    }

    /// Set the density, in bytes
    pub fn density(mut self, density_bytes: u64) -> Self {
        let bits = density_bytes * 8;
        self.bfpt[1] = if bits <= 1 << 31 {
            (bits - 1) as u32
        } else {
            (1 << 31) | bits.trailing_zeros()
        };
        self
    }

    /// Set the program page size, a power of two
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.bfpt[10] = (self.bfpt[10] & !0xF0) | (page_size.trailing_zeros() << 4);
        self
    }

    /// Declare the legacy 4 KiB erase opcode
    pub fn legacy_erase(mut self, opcode: u8) -> Self {
        self.bfpt[0] = (self.bfpt[0] & !0xFF03) | ((opcode as u32) << 8) | 0x01;
        self
    }

    /// Declare erase type `slot` (0 to 3)
    pub fn erase_type(mut self, slot: usize, opcode: u8, size: u32) -> Self {
        let field = ((opcode as u32) << 8) | size.trailing_zeros();
        let dword = 7 + slot / 2;
        let shift = (slot % 2) * 16;
        self.bfpt[dword] = (self.bfpt[dword] & !(0xFFFF << shift)) | (field << shift);
        self
    }

    /// Declare a fast read mode
    ///
    /// `IoMode::Single` is always available and is ignored.
    pub fn fast_read(
        mut self,
        mode: IoMode,
        opcode: u8,
        mode_clocks: u8,
        dummy_clocks: u8,
    ) -> Self {
        let field = ((opcode as u32) << 8)
            | (((mode_clocks & 0x07) as u32) << 5)
            | (dummy_clocks & 0x1F) as u32;
        let (dword, shift, capability) = match mode {
            IoMode::Single => return self,
            IoMode::DualOut => (3, 0, (0, 1 << 16)),
            IoMode::DualIo => (3, 16, (0, 1 << 20)),
            IoMode::QuadOut => (2, 16, (0, 1 << 22)),
            IoMode::QuadIo => (2, 0, (0, 1 << 21)),
            IoMode::Qpi => (6, 16, (4, 1 << 4)),
        };
        self.bfpt[dword] = (self.bfpt[dword] & !(0xFFFF << shift)) | (field << shift);
        self.bfpt[capability.0] |= capability.1;
        self
    }

    /// Set the address mode bits
    pub fn address_mode(mut self, mode: AddressMode) -> Self {
        let bits = match mode {
            AddressMode::ThreeByteOnly => 0b00,
            AddressMode::ThreeOrFourByte => 0b01,
            AddressMode::FourByteOnly => 0b10,
        };
        self.bfpt[0] = (self.bfpt[0] & !(0x03 << 17)) | (bits << 17);
        self
    }

    /// Set the quad enable requirement
    pub fn quad_enable(self, requirement: QuadEnableRequirement) -> Self {
        let code = match requirement {
            QuadEnableRequirement::None => 0,
            QuadEnableRequirement::Sr2Bit1 => 1,
            QuadEnableRequirement::Sr1Bit6 => 2,
            QuadEnableRequirement::Sr2Bit7 => 3,
            QuadEnableRequirement::Sr2Bit1NoClear => 4,
            QuadEnableRequirement::Sr2Bit1ReadSplit => 5,
            QuadEnableRequirement::Sr2Bit1Cmd31 => 6,
        };
        self.quad_enable_raw(code)
    }

    /// Set the raw quad enable requirement field, including reserved codes
    pub fn quad_enable_raw(mut self, code: u8) -> Self {
        self.bfpt[14] = (self.bfpt[14] & !(0x07 << 20)) | (((code & 0x07) as u32) << 20);
        self
    }

    /// Set the QPI enable sequence bits
    pub fn qpi_enable(mut self, methods: u8) -> Self {
        self.bfpt[14] = (self.bfpt[14] & !(0x1F << 4)) | (((methods & 0x1F) as u32) << 4);
        self
    }

    /// Set the 4-byte address entry method bits
    pub fn four_byte_entry(mut self, methods: u8) -> Self {
        self.bfpt[15] = (self.bfpt[15] & 0x00FF_FFFF) | ((methods as u32) << 24);
        self
    }

    /// Set the soft reset support bits
    pub fn soft_reset(mut self, methods: u8) -> Self {
        self.bfpt[15] = (self.bfpt[15] & !(0x3F << 8)) | (((methods & 0x3F) as u32) << 8);
        self
    }

    /// Add a sector map table
    pub fn sector_map(mut self, map: SectorMapBuilder) -> Self {
        self.sector_map = Some(map.into_dwords());
        self
    }

    /// Add a table the driver does not interpret
    ///
    /// An empty `dwords` produces a directory entry of length zero.
    pub fn vendor_table(mut self, id: u16, dwords: &[u32]) -> Self {
        self.vendor_tables.push(Table {
            id,
            revision: (1, 0),
            dwords: dwords.to_vec(),
        });
        self
    }

    /// Produce the image
    pub fn build(&self) -> Vec<u8> {
        let bfpt_revision = if self.bfpt_dwords >= BFPT_DWORDS { (1, 6) } else { (1, 0) };
        let mut tables = vec![Table {
            id: PARAM_ID_BASIC,
            revision: bfpt_revision,
            dwords: self.bfpt[..self.bfpt_dwords].to_vec(),
        }];
        if let Some(map) = &self.sector_map {
            tables.push(Table {
                id: PARAM_ID_SECTOR_MAP,
                revision: (1, 0),
                dwords: map.clone(),
            });
        }
        tables.extend(self.vendor_tables.iter().cloned());

        let mut image = Vec::new();
        image.extend_from_slice(&self.signature.to_le_bytes());
        image.extend_from_slice(&[
            self.revision.1,
            self.revision.0,
            (tables.len() - 1) as u8,
            0xFF,
        ]);

        let mut pointer = 8 + 8 * tables.len();
        for table in &tables {
            let [ptr0, ptr1, ptr2, _] = (pointer as u32).to_le_bytes();
            image.extend_from_slice(&[
                table.id as u8,
                table.revision.1,
                table.revision.0,
                table.dwords.len() as u8,
                ptr0,
                ptr1,
                ptr2,
                (table.id >> 8) as u8,
            ]);
            pointer += table.dwords.len() * 4;
        }

        for table in &tables {
            for dword in &table.dwords {
                image.extend_from_slice(&dword.to_le_bytes());
            }
        }
        image
    }
}
