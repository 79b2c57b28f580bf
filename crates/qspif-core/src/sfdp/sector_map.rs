//! Sector Map Parameter Table
//!
//! The table is a sequence of descriptors. Configuration detection command
//! descriptors come first; each reads one register byte, and the masked
//! result contributes one bit to the configuration ID. Map descriptors
//! follow, each tagged with the configuration ID it applies to and listing
//! the regions of that configuration with their erase-type masks.

use heapless::Vec;

use crate::bus::{AddressSize, BusFormat, QspiBus};
use crate::error::{Error, Result};
use crate::geometry::{EraseTypeMask, RegionMap};
use crate::protocol::Session;

/// Maximum number of configuration detection commands
pub const MAX_DETECTION_COMMANDS: usize = 8;

/// Maximum number of configuration maps
pub const MAX_CONFIGURATIONS: usize = 8;

/// DWORD 1 bit 0: last descriptor in the table
const DESCRIPTOR_END: u32 = 1 << 0;
/// DWORD 1 bit 1: 1 for a map descriptor, 0 for a detection command
const DESCRIPTOR_MAP: u32 = 1 << 1;

/// Read latency value meaning "variable"; the SFDP default is used instead
const LATENCY_VARIABLE: u8 = 0x0F;
/// Latency used when the descriptor declares a variable one
const LATENCY_DEFAULT: u8 = 8;

/// A configuration detection command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionCommand {
    /// Register read instruction
    pub opcode: u8,
    /// Register address, if the instruction takes one
    pub address: Option<u32>,
    /// Address size used with `address`
    pub address_size: AddressSize,
    /// Dummy cycles between address and data
    pub dummy_cycles: u8,
    /// Mask applied to the returned byte
    pub mask: u8,
}

impl DetectionCommand {
    /// Decode a command descriptor from its two DWORDs
    fn parse(dword1: u32, dword2: u32) -> Self {
        let opcode = ((dword1 >> 8) & 0xFF) as u8;
        let latency = ((dword1 >> 16) & 0x0F) as u8;
        let mask = ((dword1 >> 24) & 0xFF) as u8;

        // Bits [23:22] - address length: none, 3 bytes, 4 bytes, variable
        let (address, address_size) = match (dword1 >> 22) & 0x03 {
            0b00 => (None, AddressSize::ThreeByte),
            0b10 => (Some(dword2), AddressSize::FourByte),
            // Detection runs before 4-byte entry, so "variable" means 3 bytes
            _ => (Some(dword2), AddressSize::ThreeByte),
        };

        let dummy_cycles = if latency == LATENCY_VARIABLE {
            LATENCY_DEFAULT
        } else {
            latency
        };

        Self {
            opcode,
            address,
            address_size,
            dummy_cycles,
            mask,
        }
    }

    /// Run the command and return its configuration bit
    fn execute<B: QspiBus>(&self, session: &mut Session<B>) -> Result<bool> {
        let format = BusFormat::single(self.address_size).with_dummy_cycles(self.dummy_cycles);
        let mut buf = [0u8; 1];
        session.command_with(&format, self.opcode, self.address, &[], &mut buf)?;
        log::debug!(
            "Sector map detection: opcode 0x{:02X} returned 0x{:02X} (mask 0x{:02X})",
            self.opcode,
            buf[0],
            self.mask
        );
        Ok(buf[0] & self.mask != 0)
    }
}

/// The regions of one device configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectorMapConfig {
    /// Configuration ID this map applies to
    pub id: u8,
    /// Regions in address order
    pub regions: RegionMap,
}

/// Decoded Sector Map Parameter Table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectorMap {
    commands: Vec<DetectionCommand, MAX_DETECTION_COMMANDS>,
    configs: Vec<SectorMapConfig, MAX_CONFIGURATIONS>,
}

impl SectorMap {
    /// Decode the raw table
    ///
    /// # Errors
    /// * `ParsingFailed` - a descriptor is truncated, the end marker is
    ///   missing, no map is present or a region has zero size
    /// * `CapacityExceeded` - too many commands, maps or regions
    pub fn parse(table: &[u8]) -> Result<Self> {
        let dwords = |index: usize| -> Result<u32> {
            table
                .get(index * 4..index * 4 + 4)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .ok_or_else(|| {
                    log::error!("Sector map descriptor truncated at DWORD {}", index + 1);
                    Error::ParsingFailed
                })
        };

        let mut map = Self::default();
        let mut index = 0;
        loop {
            let header = dwords(index)?;

            if header & DESCRIPTOR_MAP == 0 {
                let command = DetectionCommand::parse(header, dwords(index + 1)?);
                map.commands.push(command).map_err(|_| {
                    log::error!("More than {} detection commands", MAX_DETECTION_COMMANDS);
                    Error::CapacityExceeded
                })?;
                index += 2;
            } else {
                let id = ((header >> 8) & 0xFF) as u8;
                let count = ((header >> 16) & 0xFF) as usize + 1;

                let mut regions = RegionMap::new();
                for r in 0..count {
                    let region = dwords(index + 1 + r)?;
                    let mask = EraseTypeMask::from_bits_truncate((region & 0x0F) as u8);
                    let size = ((region >> 8) as u64 + 1) * 256;
                    let size = u32::try_from(size).map_err(|_| Error::CapacityExceeded)?;
                    regions.push(size, mask)?;
                }

                log::debug!(
                    "Sector map configuration {}: {} region(s), {} bytes",
                    id,
                    regions.len(),
                    regions.total_size()
                );
                map.configs
                    .push(SectorMapConfig { id, regions })
                    .map_err(|_| {
                        log::error!("More than {} sector map configurations", MAX_CONFIGURATIONS);
                        Error::CapacityExceeded
                    })?;
                index += 1 + count;
            }

            if header & DESCRIPTOR_END != 0 {
                break;
            }
        }

        if map.configs.is_empty() {
            log::error!("Sector map table has no map descriptor");
            return Err(Error::ParsingFailed);
        }

        Ok(map)
    }

    /// Configuration detection commands, in execution order
    pub fn commands(&self) -> &[DetectionCommand] {
        &self.commands
    }

    /// All configuration maps
    pub fn configs(&self) -> &[SectorMapConfig] {
        &self.configs
    }

    /// Run the detection commands and build the configuration ID
    ///
    /// The first command yields the most significant bit.
    pub fn detect_configuration<B: QspiBus>(&self, session: &mut Session<B>) -> Result<u8> {
        let mut id = 0u8;
        for command in &self.commands {
            id = (id << 1) | command.execute(session)? as u8;
        }
        Ok(id)
    }

    /// Regions of the configuration with ID `id`
    ///
    /// A table without detection commands has a single configuration,
    /// which is used regardless of `id`.
    pub fn config(&self, id: u8) -> Option<&SectorMapConfig> {
        if self.commands.is_empty() {
            return self.configs.first();
        }
        self.configs.iter().find(|c| c.id == id)
    }

    /// Detect the active configuration and return its regions
    ///
    /// # Errors
    /// `ParsingFailed` if no map matches the detected configuration or the
    /// regions do not add up to `device_size`
    pub fn resolve<B: QspiBus>(
        &self,
        session: &mut Session<B>,
        device_size: u32,
    ) -> Result<RegionMap> {
        let id = self.detect_configuration(session)?;
        let Some(config) = self.config(id) else {
            log::error!("No sector map for configuration {}", id);
            return Err(Error::ParsingFailed);
        };

        if config.regions.total_size() != device_size {
            log::error!(
                "Sector map configuration {} covers {} bytes, device has {}",
                config.id,
                config.regions.total_size(),
                device_size
            );
            return Err(Error::ParsingFailed);
        }

        Ok(config.regions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{opcodes, BusError};
    use std::vec::Vec as StdVec;

    const MIB: u32 = 1024 * 1024;

    fn to_bytes(dwords: &[u32]) -> StdVec<u8> {
        dwords.iter().flat_map(|d| d.to_le_bytes()).collect()
    }

    /// Region DWORD: size in 256-byte units minus one, erase-type mask
    fn region(size: u32, mask: u8) -> u32 {
        ((size / 256 - 1) << 8) | mask as u32
    }

    /// Answers register reads from a fixed value
    struct RegisterBus {
        value: u8,
        commands: StdVec<(u8, Option<u32>, BusFormat)>,
        format: BusFormat,
    }

    impl QspiBus for RegisterBus {
        fn configure_format(&mut self, format: &BusFormat) -> core::result::Result<(), BusError> {
            self.format = *format;
            Ok(())
        }

        fn set_frequency(&mut self, _hz: u32) -> core::result::Result<(), BusError> {
            Ok(())
        }

        fn command_transfer(
            &mut self,
            opcode: u8,
            address: Option<u32>,
            _tx: &[u8],
            rx: &mut [u8],
        ) -> core::result::Result<(), BusError> {
            self.commands.push((opcode, address, self.format));
            rx.fill(self.value);
            Ok(())
        }

        fn read(&mut self, _opcode: u8, _address: u32, _buf: &mut [u8]) -> core::result::Result<(), BusError> {
            Err(BusError::NotSupported)
        }

        fn write(&mut self, _opcode: u8, _address: u32, _data: &[u8]) -> core::result::Result<(), BusError> {
            Err(BusError::NotSupported)
        }

        fn delay_us(&mut self, _us: u32) {}
    }

    fn session(value: u8) -> Session<RegisterBus> {
        Session::new(RegisterBus {
            value,
            commands: StdVec::new(),
            format: BusFormat::default(),
        })
    }

    #[test]
    fn test_single_map() {
        // One map, ID 0, two regions, end marker set
        let table = to_bytes(&[
            0x0001_0003,
            region(8 * MIB, 0b0101),
            region(8 * MIB, 0b0111),
        ]);
        let map = SectorMap::parse(&table).unwrap();
        assert!(map.commands().is_empty());

        let regions = map.resolve(&mut session(0), 16 * MIB).unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(
            regions.as_slice()[0].erase_types,
            EraseTypeMask::TYPE_1 | EraseTypeMask::TYPE_3
        );
        assert_eq!(regions.as_slice()[1].high_boundary, 16 * MIB);
    }

    #[test]
    fn test_size_mismatch() {
        let table = to_bytes(&[0x0000_0003, region(8 * MIB, 0b0001)]);
        let map = SectorMap::parse(&table).unwrap();
        assert_eq!(
            map.resolve(&mut session(0), 16 * MIB),
            Err(Error::ParsingFailed)
        );
    }

    #[test]
    fn test_configuration_detection() {
        // Two detection commands, then maps for configurations 0b10 and 0b11
        let table = to_bytes(&[
            // RDSR2 (0x35), no address, latency 0, mask 0x02
            0x0200_3500,
            0xFFFF_FFFF,
            // RDAR (0x65), 3-byte address, latency 8, mask 0x04
            0x0448_6500,
            0x0000_0004,
            // Map for ID 2: one uniform region
            0x0000_0202,
            region(2 * MIB, 0b0001),
            // Map for ID 3: 64 KiB boot area then the rest
            0x0001_0303,
            region(64 * 1024, 0b0001),
            region(2 * MIB - 64 * 1024, 0b0100),
        ]);
        let map = SectorMap::parse(&table).unwrap();
        assert_eq!(map.commands().len(), 2);
        assert_eq!(map.configs().len(), 2);
        assert_eq!(map.commands()[0].address, None);
        assert_eq!(map.commands()[1].address, Some(4));
        assert_eq!(map.commands()[1].dummy_cycles, 8);

        // 0xFF: both bits set -> configuration 3
        let mut s = session(0xFF);
        let regions = map.resolve(&mut s, 2 * MIB).unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions.as_slice()[0].size, 64 * 1024);
        let cmds = &s.bus().commands;
        assert_eq!(cmds[0].0, opcodes::RDSR2);
        assert_eq!((cmds[1].0, cmds[1].1), (opcodes::RDAR, Some(4)));
        assert_eq!(cmds[1].2.dummy_cycles, 8);

        // 0x02: first bit only -> configuration 2
        let regions = map.resolve(&mut session(0x02), 2 * MIB).unwrap();
        assert_eq!(regions.len(), 1);

        // 0x00: configuration 0 has no map
        assert_eq!(
            map.resolve(&mut session(0x00), 2 * MIB),
            Err(Error::ParsingFailed)
        );
    }

    #[test]
    fn test_missing_end_marker() {
        let table = to_bytes(&[0x0000_0002, region(MIB, 0b0001)]);
        assert_eq!(SectorMap::parse(&table), Err(Error::ParsingFailed));
    }

    #[test]
    fn test_truncated_map() {
        // Declares three regions but only one follows
        let table = to_bytes(&[0x0002_0003, region(MIB, 0b0001)]);
        assert_eq!(SectorMap::parse(&table), Err(Error::ParsingFailed));
    }

    #[test]
    fn test_too_many_regions() {
        let mut dwords = std::vec![0x000A_0003];
        dwords.extend((0..11).map(|_| region(4096, 0b0001)));
        let table = to_bytes(&dwords);
        assert_eq!(SectorMap::parse(&table), Err(Error::CapacityExceeded));
    }

    #[test]
    fn test_no_map_descriptor() {
        let table = to_bytes(&[0x0200_3501, 0xFFFF_FFFF]);
        assert_eq!(SectorMap::parse(&table), Err(Error::ParsingFailed));
    }
}
