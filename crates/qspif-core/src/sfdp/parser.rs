//! SFDP discovery
//!
//! Walks the SFDP header and parameter directory over the bus, then decodes
//! the Basic Flash Parameter Table and the optional Sector Map Parameter
//! Table. Every other table is skipped. Tables are read into fixed-size
//! stack buffers; no allocation takes place.

use crate::bus::QspiBus;
use crate::error::{Error, Result};
use crate::geometry::{EraseType, EraseTypes};
use crate::protocol::{self, Session};

use super::types::*;
use super::SectorMap;

/// Read the SFDP header and check signature and revision
fn parse_header<B: QspiBus>(session: &mut Session<B>) -> Result<SfdpHeader> {
    let mut raw = [0u8; SfdpHeader::SIZE];
    protocol::read_sfdp(session, 0, &mut raw)?;
    log::debug!("SFDP header: {:02X?}", raw);

    let header = SfdpHeader::parse(&raw);
    if !header.is_valid() {
        log::error!(
            "No SFDP signature: read 0x{:08X}, expected 0x{:08X}",
            header.signature,
            SFDP_SIGNATURE
        );
        return Err(Error::ParsingFailed);
    }

    let revision = header.revision;
    if revision.major != SFDP_MIN_REVISION.major || !revision.at_least(SFDP_MIN_REVISION) {
        log::error!("Unsupported SFDP revision {}", revision);
        return Err(Error::ParsingFailed);
    }

    log::debug!(
        "SFDP revision {} with {} parameter table(s)",
        revision,
        header.num_param_headers()
    );
    Ok(header)
}

/// Read directory entry `index`
fn read_param_header<B: QspiBus>(
    session: &mut Session<B>,
    index: usize,
) -> Result<ParameterHeader> {
    let mut raw = [0u8; ParameterHeader::SIZE];
    let address = SfdpHeader::SIZE + index * ParameterHeader::SIZE;
    protocol::read_sfdp(session, address as u32, &mut raw)?;
    Ok(ParameterHeader::parse(&raw))
}

/// Check a directory entry before anything is read from its table
fn validate_param_header(header: &ParameterHeader) -> Result<()> {
    if header.length_dwords == 0 {
        log::error!("Parameter table 0x{:04X} has zero length", header.id);
        return Err(Error::ParsingFailed);
    }

    let end = header.table_pointer as u64 + header.length_bytes() as u64;
    if end > SFDP_ADDRESS_SPACE as u64 {
        log::error!(
            "Parameter table 0x{:04X} at 0x{:06X} runs past the SFDP space",
            header.id,
            header.table_pointer
        );
        return Err(Error::ParsingFailed);
    }

    Ok(())
}

/// Read a parameter table into a bounded buffer
///
/// Returns the number of valid bytes in `buf`.
fn read_table<B: QspiBus>(
    session: &mut Session<B>,
    header: &ParameterHeader,
    buf: &mut [u8; MAX_PARAMETER_TABLE_SIZE],
) -> Result<usize> {
    let len = header.length_bytes();
    if len > MAX_PARAMETER_TABLE_SIZE {
        log::error!(
            "Parameter table 0x{:04X} is {} bytes, limit is {}",
            header.id,
            len,
            MAX_PARAMETER_TABLE_SIZE
        );
        return Err(Error::ParsingFailed);
    }

    protocol::read_sfdp(session, header.table_pointer, &mut buf[..len])?;
    log::debug!(
        "Read parameter table 0x{:04X} rev {}: {} bytes at 0x{:06X}",
        header.id,
        header.revision,
        len,
        header.table_pointer
    );
    Ok(len)
}

/// Little-endian DWORD at 1-based index `n`, 0 if the table is shorter
fn dword(table: &[u8], n: usize) -> u32 {
    let offset = (n - 1) * 4;
    match table.get(offset..offset + 4) {
        Some(b) => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
        None => 0,
    }
}

fn bit(dword: u32, n: u32) -> bool {
    dword & (1 << n) != 0
}

/// DWORD 1: legacy 4 KiB erase, address bytes and the non-QPI read
/// capability bits
fn parse_bfpt_dword1(dword: u32, params: &mut BasicFlashParams) {
    // [1:0] is 01b only when the 4 KiB erase in [15:8] is usable
    params.legacy_erase =
        (dword & 0x03 == 0x01).then(|| EraseType::new((dword >> 8) as u8, 4 * 1024));
    params.address_mode = AddressMode::from_bfpt((dword >> 17) as u8);

    params.fast_read_112 = bit(dword, 16);
    params.fast_read_122 = bit(dword, 20);
    params.fast_read_144 = bit(dword, 21);
    params.fast_read_114 = bit(dword, 22);
}

/// DWORD 2: density
///
/// With bit 31 clear the low bits hold the size in bits minus one,
/// otherwise they hold N for a size of 2^N bits. An exponent that does not
/// fit a u64 byte count decodes to zero.
fn parse_bfpt_dword2(dword: u32, params: &mut BasicFlashParams) {
    let value = dword & 0x7FFF_FFFF;
    params.density_bytes = if bit(dword, 31) {
        match value {
            3..=66 => 1u64 << (value - 3),
            _ => 0,
        }
    } else {
        (value as u64 + 1) / 8
    };
}

/// DWORD 3: 1-1-4 read above, 1-4-4 read below
fn parse_bfpt_dword3(dword: u32, params: &mut BasicFlashParams) {
    params.fast_read_114_params = FastReadParams::from_high_half(dword);
    params.fast_read_144_params = FastReadParams::from_low_half(dword);
}

/// DWORD 4: 1-2-2 read above, 1-1-2 read below
fn parse_bfpt_dword4(dword: u32, params: &mut BasicFlashParams) {
    params.fast_read_122_params = FastReadParams::from_high_half(dword);
    params.fast_read_112_params = FastReadParams::from_low_half(dword);
}

/// DWORD 5: 4-4-4 capability in bit 4
fn parse_bfpt_dword5(dword: u32, params: &mut BasicFlashParams) {
    params.fast_read_444 = bit(dword, 4);
}

/// DWORD 7: 4-4-4 read in the upper half
fn parse_bfpt_dword7(dword: u32, params: &mut BasicFlashParams) {
    params.fast_read_444_params = FastReadParams::from_high_half(dword);
}

/// DWORDs 8 and 9: erase types 1 to 4, one per 16-bit half
///
/// Each half holds the size exponent in its low byte and the opcode in its
/// high byte.
fn parse_bfpt_erase_types(dword8: u32, dword9: u32, params: &mut BasicFlashParams) {
    let slot = |half: u32| EraseType::from_raw(half as u8, (half >> 8) as u8);
    params.erase_types = EraseTypes::new([
        slot(dword8 & 0xFFFF),
        slot(dword8 >> 16),
        slot(dword9 & 0xFFFF),
        slot(dword9 >> 16),
    ]);
}

/// DWORD 11: page size exponent in [7:4]
fn parse_bfpt_dword11(dword: u32, params: &mut BasicFlashParams) {
    match (dword >> 4) & 0x0F {
        0 => {}
        exp => params.page_size = 1 << exp,
    }
}

/// DWORD 15: quad enable requirement in [22:20], QPI entry in [8:4]
fn parse_bfpt_dword15(dword: u32, params: &mut BasicFlashParams) -> Result<()> {
    params.quad_enable = QuadEnableRequirement::from_bfpt((dword >> 20) as u8)?;
    params.qpi_enable = QpiEnableSequence::from_bfpt((dword >> 4) as u8);
    Ok(())
}

/// DWORD 16: 4-byte address entry in [31:24], soft reset in [13:8]
fn parse_bfpt_dword16(dword: u32, params: &mut BasicFlashParams) {
    params.four_byte_entry = FourByteEntryMethods::from_bfpt((dword >> 24) as u8);
    params.soft_reset = SoftResetSupport::from_bfpt((dword >> 8) as u8);
}

/// Decode the Basic Flash Parameter Table
///
/// `table` holds the raw table bytes as read from the device.
///
/// # Errors
/// `ParsingFailed` for a table shorter than 9 DWORDs, a zero density or a
/// reserved quad enable requirement
pub fn decode_basic_table(table: &[u8], revision: SfdpRevision) -> Result<BasicFlashParams> {
    if table.len() < BFPT_MIN_SIZE {
        log::error!("Basic flash parameter table too short: {} bytes", table.len());
        return Err(Error::ParsingFailed);
    }

    let mut params = BasicFlashParams {
        revision,
        page_size: 256,
        ..Default::default()
    };

    // Mandatory DWORDs (JESD216, 9 DWORDs minimum)
    parse_bfpt_dword1(dword(table, 1), &mut params);
    parse_bfpt_dword2(dword(table, 2), &mut params);
    parse_bfpt_dword3(dword(table, 3), &mut params);
    parse_bfpt_dword4(dword(table, 4), &mut params);
    parse_bfpt_dword5(dword(table, 5), &mut params);
    parse_bfpt_dword7(dword(table, 7), &mut params);
    parse_bfpt_erase_types(dword(table, 8), dword(table, 9), &mut params);

    // JESD216A+ (11+ DWORDs)
    if table.len() >= 11 * 4 {
        parse_bfpt_dword11(dword(table, 11), &mut params);
    }

    // JESD216B+ (16 DWORDs)
    if table.len() >= 16 * 4 {
        parse_bfpt_dword15(dword(table, 15), &mut params)?;
        parse_bfpt_dword16(dword(table, 16), &mut params);
    }

    if params.density_bytes == 0 {
        log::error!("Basic flash parameter table declares zero density");
        return Err(Error::ParsingFailed);
    }

    log::debug!(
        "BFPT: {} bytes, page {} bytes, address mode {:?}, QE {:?}",
        params.density_bytes,
        params.page_size,
        params.address_mode,
        params.quad_enable
    );
    for (i, et) in params.erase_types.iter() {
        log::debug!(
            "BFPT: erase type {}: opcode 0x{:02X}, {} bytes",
            i + 1,
            et.opcode,
            et.size
        );
    }

    Ok(params)
}

/// Probe for SFDP support and parse parameters
///
/// Reads the header and the parameter directory, then the Basic Flash
/// Parameter Table (mandatory) and the Sector Map Parameter Table (optional).
/// Every other table is skipped.
///
/// # Errors
/// `ParsingFailed` if the signature or revision is wrong, a directory entry
/// is malformed, the BFPT is missing or either table fails to decode
pub fn probe<B: QspiBus>(session: &mut Session<B>) -> Result<SfdpInfo> {
    let header = parse_header(session)?;

    let mut basic = None;
    let mut sector_map = None;

    for i in 0..header.num_param_headers() {
        let param_header = read_param_header(session, i)?;
        validate_param_header(&param_header)?;

        match param_header.id {
            PARAM_ID_BASIC if basic.is_none() => {
                let mut buf = [0u8; MAX_PARAMETER_TABLE_SIZE];
                let len = read_table(session, &param_header, &mut buf)?;
                basic = Some(decode_basic_table(&buf[..len], param_header.revision)?);
            }
            PARAM_ID_SECTOR_MAP if sector_map.is_none() => {
                let mut buf = [0u8; MAX_PARAMETER_TABLE_SIZE];
                let len = read_table(session, &param_header, &mut buf)?;
                sector_map = Some(SectorMap::parse(&buf[..len])?);
            }
            _ => {
                log::trace!(
                    "Skipping parameter table ID 0x{:04X} (rev {})",
                    param_header.id,
                    param_header.revision
                );
            }
        }
    }

    let Some(basic_params) = basic else {
        log::error!("SFDP has no basic flash parameter table");
        return Err(Error::ParsingFailed);
    };

    Ok(SfdpInfo {
        header,
        basic_params,
        sector_map,
    })
}
