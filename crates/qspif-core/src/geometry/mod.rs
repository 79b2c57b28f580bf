//! Device geometry model
//!
//! The [`Geometry`] is built once from the SFDP tables during
//! initialization and is read-only afterwards. Every read, program and
//! erase call consults it for bounds, granularity and opcodes.

mod erase;
mod region;

pub use erase::{
    select_erase_type, EraseCommand, ErasePlan, EraseType, EraseTypeMask, EraseTypes,
    MAX_ERASE_TYPES,
};
pub use region::{Region, RegionMap, MAX_REGIONS};

use crate::bus::{opcodes, AddressSize, BusFormat, BusWidth, IoMode};
use crate::error::{Error, Result};

/// Selected bus mode and the opcodes used with it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BusMode {
    /// I/O mode used for reads
    pub read_mode: IoMode,
    /// Read opcode for `read_mode`
    pub read_opcode: u8,
    /// Mode plus dummy clocks between address and data of a read
    pub dummy_cycles: u8,
    /// Address size for every addressed command
    pub address_size: AddressSize,
    /// Width of every phase of non-read commands
    ///
    /// Quad once the device is in QPI mode, single otherwise.
    pub command_width: BusWidth,
    /// Page program opcode
    pub program_opcode: u8,
}

impl BusMode {
    /// Plain 1-1-1 mode with the legacy read and program opcodes
    pub const fn single(address_size: AddressSize) -> Self {
        Self {
            read_mode: IoMode::Single,
            read_opcode: opcodes::READ,
            dummy_cycles: 0,
            address_size,
            command_width: BusWidth::Single,
            program_opcode: opcodes::PP,
        }
    }

    /// Frame format for reads
    pub const fn read_format(&self) -> BusFormat {
        self.read_mode.format(self.address_size, self.dummy_cycles)
    }

    /// Frame format for program, erase and register commands
    pub const fn command_format(&self) -> BusFormat {
        BusFormat::uniform(self.command_width, self.address_size)
    }
}

impl Default for BusMode {
    fn default() -> Self {
        Self::single(AddressSize::ThreeByte)
    }
}

/// Geometry of an initialized device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Geometry {
    device_size: u32,
    page_size: u32,
    erase_types: EraseTypes,
    legacy_erase: Option<EraseType>,
    regions: RegionMap,
    min_common_erase_size: u32,
    bus_mode: BusMode,
}

impl Geometry {
    /// Assemble and validate a geometry
    ///
    /// `legacy_erase` is the 4 KiB erase declared outside the erase-type
    /// table. It is used for regions whose erase-type mask is empty.
    ///
    /// # Errors
    /// `ParsingFailed` if the pieces are inconsistent: an empty device, a
    /// page size that is not a power of two or does not divide the device,
    /// regions that do not cover exactly the device, a region referring
    /// to an undefined erase type, or a region whose size or start is not a
    /// multiple of one of its erase types.
    pub fn new(
        device_size: u32,
        page_size: u32,
        erase_types: EraseTypes,
        legacy_erase: Option<EraseType>,
        regions: RegionMap,
        bus_mode: BusMode,
    ) -> Result<Self> {
        if device_size == 0 {
            log::error!("Device size is zero");
            return Err(Error::ParsingFailed);
        }
        if !page_size.is_power_of_two() || device_size % page_size != 0 {
            log::error!(
                "Page size {} does not divide device size {}",
                page_size,
                device_size
            );
            return Err(Error::ParsingFailed);
        }
        if regions.total_size() != device_size {
            log::error!(
                "Regions cover {} bytes, device has {}",
                regions.total_size(),
                device_size
            );
            return Err(Error::ParsingFailed);
        }

        let supported = erase_types.supported();
        for (i, region) in regions.iter().enumerate() {
            if !supported.contains(region.erase_types) {
                log::error!(
                    "Region {} refers to undefined erase types {:?}",
                    i,
                    region.erase_types.difference(supported)
                );
                return Err(Error::ParsingFailed);
            }
            if region.erase_types.is_empty() && legacy_erase.is_none() {
                log::error!("Region {} has no usable erase type", i);
                return Err(Error::ParsingFailed);
            }

            let usable = erase_types
                .in_mask(region.erase_types)
                .map(|(_, et)| et)
                .chain(legacy_erase.filter(|_| region.erase_types.is_empty()));
            for et in usable {
                if region.size % et.size != 0 || region.low_boundary() % et.size != 0 {
                    log::error!(
                        "Region {} (0x{:08X}, {} bytes) cannot be tiled by {} byte erases",
                        i,
                        region.low_boundary(),
                        region.size,
                        et.size
                    );
                    return Err(Error::ParsingFailed);
                }
            }
        }

        let min_common_erase_size = erase_types
            .largest_in(regions.common_erase_types())
            .map_or(0, |(_, et)| et.size);

        Ok(Self {
            device_size,
            page_size,
            erase_types,
            legacy_erase,
            regions,
            min_common_erase_size,
            bus_mode,
        })
    }

    /// Total size in bytes
    pub fn device_size(&self) -> u32 {
        self.device_size
    }

    /// Program page size in bytes
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// The erase-type table
    pub fn erase_types(&self) -> &EraseTypes {
        &self.erase_types
    }

    /// The legacy 4 KiB erase, if declared
    pub fn legacy_erase(&self) -> Option<EraseType> {
        self.legacy_erase
    }

    /// The region map
    pub fn regions(&self) -> &RegionMap {
        &self.regions
    }

    /// Largest erase size usable in every region, 0 if there is none
    pub fn min_common_erase_size(&self) -> u32 {
        self.min_common_erase_size
    }

    /// Selected bus mode
    pub fn bus_mode(&self) -> &BusMode {
        &self.bus_mode
    }

    /// Find the region containing `address`
    pub fn find_region(&self, address: u32) -> Result<(usize, &Region)> {
        self.regions.find(address)
    }

    /// Erase types usable in `region`
    ///
    /// Falls back to the legacy erase when the region's mask is empty.
    pub fn region_erase_types<'a>(
        &'a self,
        region: &Region,
    ) -> impl Iterator<Item = EraseType> + 'a {
        let mask = region.erase_types;
        self.erase_types
            .in_mask(mask)
            .map(|(_, et)| et)
            .chain(self.legacy_erase.filter(|_| mask.is_empty()))
    }

    /// Device-wide erase size
    ///
    /// The minimum common erase size, or the legacy erase size when no type
    /// is common to all regions.
    pub fn erase_size(&self) -> u32 {
        if self.min_common_erase_size != 0 {
            return self.min_common_erase_size;
        }
        self.legacy_erase
            .or_else(|| {
                self.erase_types
                    .smallest_in(EraseTypeMask::all())
                    .map(|(_, et)| et)
            })
            .map_or(0, |et| et.size)
    }

    /// Smallest erase size usable at `address`
    pub fn erase_size_at(&self, address: u32) -> Result<u32> {
        let (_, region) = self.find_region(address)?;
        self.region_erase_types(region)
            .map(|et| et.size)
            .min()
            .ok_or(Error::ParsingFailed)
    }

    /// Check that `[address, address + len)` lies inside the device
    pub fn check_range(&self, address: u32, len: usize) -> Result<()> {
        let end = address as u64 + len as u64;
        if (address >= self.device_size && len != 0) || end > self.device_size as u64 {
            log::error!(
                "Range 0x{:08X}+{} exceeds device size {}",
                address,
                len,
                self.device_size
            );
            return Err(Error::AddressOutOfBounds);
        }
        Ok(())
    }

    /// Break `[address, address + size)` into erase commands
    ///
    /// The returned plan yields commands in ascending address order.
    /// Alignment problems surface as `InvalidAlignment` items while
    /// iterating; use [`ErasePlan::validate`] to check them up front.
    pub fn plan_erase(&self, address: u32, size: u32) -> Result<ErasePlan<'_>> {
        self.check_range(address, size as usize)?;
        Ok(ErasePlan::new(self, address, address + size))
    }
}
