//! Erase regions
//!
//! A device is partitioned into at most [`MAX_REGIONS`] contiguous regions,
//! each with its own set of usable erase types. Regions are stored in
//! ascending address order and are described by their exclusive high
//! boundary.

use heapless::Vec;

use crate::error::{Error, Result};

use super::EraseTypeMask;

/// Maximum number of regions a device may declare
pub const MAX_REGIONS: usize = 10;

/// A contiguous range of the device sharing one erase-type set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    /// End of the region (exclusive)
    pub high_boundary: u32,
    /// Size of the region in bytes
    pub size: u32,
    /// Erase types usable within the region
    pub erase_types: EraseTypeMask,
}

impl Region {
    /// Start of the region (inclusive)
    pub fn low_boundary(&self) -> u32 {
        self.high_boundary - self.size
    }

    /// Check whether `address` falls inside the region
    pub fn contains(&self, address: u32) -> bool {
        address >= self.low_boundary() && address < self.high_boundary
    }
}

/// Ordered, bounded list of regions
///
/// Regions are appended with [`push`](Self::push), which keeps the running
/// boundary. The map therefore always covers `[0, total_size())` with no
/// gaps and no overlaps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionMap {
    regions: Vec<Region, MAX_REGIONS>,
}

impl RegionMap {
    /// Create an empty region map
    pub const fn new() -> Self {
        Self { regions: Vec::new() }
    }

    /// Single region spanning the whole device
    pub fn uniform(device_size: u32, erase_types: EraseTypeMask) -> Result<Self> {
        let mut map = Self::new();
        map.push(device_size, erase_types)?;
        Ok(map)
    }

    /// Append a region of `size` bytes after the current last region
    ///
    /// # Errors
    /// * `ParsingFailed` - `size` is zero
    /// * `CapacityExceeded` - the map is full or the boundary overflows
    pub fn push(&mut self, size: u32, erase_types: EraseTypeMask) -> Result<()> {
        if size == 0 {
            log::error!("Region {} has zero size", self.regions.len());
            return Err(Error::ParsingFailed);
        }

        let high_boundary = self
            .total_size()
            .checked_add(size)
            .ok_or(Error::CapacityExceeded)?;

        self.regions
            .push(Region {
                high_boundary,
                size,
                erase_types,
            })
            .map_err(|_| {
                log::error!("More than {} erase regions declared", MAX_REGIONS);
                Error::CapacityExceeded
            })
    }

    /// Bytes covered by the map (the last high boundary)
    pub fn total_size(&self) -> u32 {
        self.regions.last().map_or(0, |r| r.high_boundary)
    }

    /// Find the region containing `address`
    ///
    /// Returns the region index and the region itself.
    pub fn find(&self, address: u32) -> Result<(usize, &Region)> {
        let index = self.regions.partition_point(|r| r.high_boundary <= address);
        self.regions
            .get(index)
            .map(|r| (index, r))
            .ok_or(Error::AddressOutOfBounds)
    }

    /// Erase types usable in every region
    pub fn common_erase_types(&self) -> EraseTypeMask {
        self.regions
            .iter()
            .fold(EraseTypeMask::all(), |mask, r| mask & r.erase_types)
    }

    /// Iterate over the regions in address order
    pub fn iter(&self) -> core::slice::Iter<'_, Region> {
        self.regions.iter()
    }

    /// Number of regions
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Returns true if no region has been added
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Regions as a slice
    pub fn as_slice(&self) -> &[Region] {
        &self.regions
    }
}

impl<'a> IntoIterator for &'a RegionMap {
    type Item = &'a Region;
    type IntoIter = core::slice::Iter<'a, Region>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u32 = 1024 * 1024;

    fn two_region_map() -> RegionMap {
        let mut map = RegionMap::new();
        map.push(8 * MIB, EraseTypeMask::TYPE_1 | EraseTypeMask::TYPE_3)
            .unwrap();
        map.push(
            8 * MIB,
            EraseTypeMask::TYPE_1 | EraseTypeMask::TYPE_2 | EraseTypeMask::TYPE_3,
        )
        .unwrap();
        map
    }

    #[test]
    fn test_push_accumulates_boundaries() {
        let map = two_region_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map.as_slice()[0].high_boundary, 8 * MIB);
        assert_eq!(map.as_slice()[1].high_boundary, 16 * MIB);
        assert_eq!(map.as_slice()[1].low_boundary(), 8 * MIB);
        assert_eq!(map.total_size(), 16 * MIB);
    }

    #[test]
    fn test_find() {
        let map = two_region_map();
        assert_eq!(map.find(0).unwrap().0, 0);
        assert_eq!(map.find(8 * MIB - 1).unwrap().0, 0);
        assert_eq!(map.find(8 * MIB).unwrap().0, 1);
        assert_eq!(map.find(16 * MIB - 1).unwrap().0, 1);
        assert_eq!(map.find(16 * MIB), Err(Error::AddressOutOfBounds));
    }

    #[test]
    fn test_find_matches_linear_search() {
        let mut map = RegionMap::new();
        for size in [4096, 28672, 32768, 16 * 65536, 4096] {
            map.push(size, EraseTypeMask::TYPE_1).unwrap();
        }

        let mut addr = 0;
        while addr < map.total_size() {
            let linear = map.iter().position(|r| r.high_boundary > addr).unwrap();
            let (index, region) = map.find(addr).unwrap();
            assert_eq!(index, linear);
            assert!(region.contains(addr));
            addr += 1024;
        }
    }

    #[test]
    fn test_common_erase_types() {
        let map = two_region_map();
        assert_eq!(
            map.common_erase_types(),
            EraseTypeMask::TYPE_1 | EraseTypeMask::TYPE_3
        );
        assert_eq!(RegionMap::new().common_erase_types(), EraseTypeMask::all());
    }

    #[test]
    fn test_capacity() {
        let mut map = RegionMap::new();
        for _ in 0..MAX_REGIONS {
            map.push(4096, EraseTypeMask::TYPE_1).unwrap();
        }
        assert_eq!(
            map.push(4096, EraseTypeMask::TYPE_1),
            Err(Error::CapacityExceeded)
        );
        assert_eq!(map.len(), MAX_REGIONS);
    }

    #[test]
    fn test_zero_size_rejected() {
        let mut map = RegionMap::new();
        assert_eq!(map.push(0, EraseTypeMask::TYPE_1), Err(Error::ParsingFailed));
    }

    #[test]
    fn test_boundary_overflow() {
        let mut map = RegionMap::new();
        map.push(u32::MAX - 10, EraseTypeMask::TYPE_1).unwrap();
        assert_eq!(
            map.push(4096, EraseTypeMask::TYPE_1),
            Err(Error::CapacityExceeded)
        );
    }
}
