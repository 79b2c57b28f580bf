//! Erase types and the erase-type selector
//!
//! SFDP declares up to four erase instructions, each with a power-of-two
//! size. Every region of the device supports a subset of them, encoded as a
//! 4-bit [`EraseTypeMask`]. An erase request is broken into a sequence of
//! [`EraseCommand`]s by greedily choosing, at each step, the largest type
//! the current region supports that is aligned to the current address and
//! fits in what is left of the request.

use bitflags::bitflags;

use crate::error::{Error, Result};

use super::{Geometry, Region};

/// Number of erase types an SFDP table can declare
pub const MAX_ERASE_TYPES: usize = 4;

bitflags! {
    /// Set of erase types usable within a region
    ///
    /// Bit `n` refers to slot `n` of the [`EraseTypes`] table.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EraseTypeMask: u8 {
        /// Erase type 1
        const TYPE_1 = 1 << 0;
        /// Erase type 2
        const TYPE_2 = 1 << 1;
        /// Erase type 3
        const TYPE_3 = 1 << 2;
        /// Erase type 4
        const TYPE_4 = 1 << 3;
    }
}

impl EraseTypeMask {
    /// Mask holding only the erase type at `index` (0-based)
    pub const fn from_index(index: usize) -> Self {
        Self::from_bits_truncate(1 << index)
    }

    /// Returns true if the erase type at `index` is in the set
    pub fn has_index(&self, index: usize) -> bool {
        index < MAX_ERASE_TYPES && self.contains(Self::from_index(index))
    }
}

/// A single erase instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EraseType {
    /// Erase opcode
    pub opcode: u8,
    /// Erase size in bytes, always a power of two
    pub size: u32,
}

impl EraseType {
    /// Create a new erase type
    pub const fn new(opcode: u8, size: u32) -> Self {
        Self { opcode, size }
    }

    /// Parse from size exponent (N where size = 2^N) and opcode
    ///
    /// Returns `None` for an unused slot (exponent 0) or an exponent that
    /// does not fit in 32 bits.
    pub fn from_raw(size_exp: u8, opcode: u8) -> Option<Self> {
        if size_exp == 0 || size_exp >= 32 {
            return None;
        }
        Some(Self::new(opcode, 1u32 << size_exp))
    }

    /// Check if `address` is aligned to this erase size
    pub fn is_aligned(&self, address: u32) -> bool {
        address & (self.size - 1) == 0
    }
}

/// The erase-type table, indexed by erase type slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EraseTypes {
    slots: [Option<EraseType>; MAX_ERASE_TYPES],
}

impl EraseTypes {
    /// Create a table from its four slots
    pub const fn new(slots: [Option<EraseType>; MAX_ERASE_TYPES]) -> Self {
        Self { slots }
    }

    /// Get the erase type in slot `index`
    pub fn get(&self, index: usize) -> Option<EraseType> {
        self.slots.get(index).copied().flatten()
    }

    /// Iterate over valid slots as `(index, erase type)`
    pub fn iter(&self) -> impl Iterator<Item = (usize, EraseType)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.map(|et| (i, et)))
    }

    /// Iterate over valid slots that are part of `mask`
    pub fn in_mask(&self, mask: EraseTypeMask) -> impl Iterator<Item = (usize, EraseType)> + '_ {
        self.iter().filter(move |(i, _)| mask.has_index(*i))
    }

    /// Mask of every valid slot
    pub fn supported(&self) -> EraseTypeMask {
        self.iter()
            .fold(EraseTypeMask::empty(), |mask, (i, _)| mask | EraseTypeMask::from_index(i))
    }

    /// Smallest erase type in `mask`
    pub fn smallest_in(&self, mask: EraseTypeMask) -> Option<(usize, EraseType)> {
        self.in_mask(mask).min_by_key(|(_, et)| et.size)
    }

    /// Largest erase type in `mask`
    pub fn largest_in(&self, mask: EraseTypeMask) -> Option<(usize, EraseType)> {
        self.in_mask(mask).max_by_key(|(_, et)| et.size)
    }
}

/// One erase instruction to issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EraseCommand {
    /// Erase opcode
    pub opcode: u8,
    /// Start address, aligned to `size`
    pub address: u32,
    /// Number of bytes erased by this command
    pub size: u32,
}

/// Choose the erase type for the next step of an erase request
///
/// Picks the largest type supported by `region` that is aligned to
/// `address`, is no larger than `remaining` and does not run past the
/// region's high boundary. If none qualifies, the smallest type of the
/// region is returned as long as `address` is aligned to it.
///
/// # Errors
/// * `AddressOutOfBounds` - `address` is not inside `region`
/// * `InvalidAlignment` - `address` is misaligned even to the smallest type
/// * `ParsingFailed` - the region has no usable erase type at all
pub fn select_erase_type(
    geometry: &Geometry,
    region: &Region,
    address: u32,
    remaining: u32,
) -> Result<EraseType> {
    if !region.contains(address) {
        log::error!(
            "Erase address 0x{:08X} outside region 0x{:08X}..0x{:08X}",
            address,
            region.low_boundary(),
            region.high_boundary
        );
        return Err(Error::AddressOutOfBounds);
    }

    let to_boundary = region.high_boundary - address;
    let limit = remaining.min(to_boundary);

    let best = geometry
        .region_erase_types(region)
        .filter(|et| et.is_aligned(address) && et.size <= limit)
        .max_by_key(|et| et.size);
    if let Some(et) = best {
        return Ok(et);
    }

    let smallest = geometry
        .region_erase_types(region)
        .min_by_key(|et| et.size)
        .ok_or(Error::ParsingFailed)?;
    if !smallest.is_aligned(address) {
        log::error!(
            "Erase address 0x{:08X} not aligned to smallest erase size {} in region",
            address,
            smallest.size
        );
        return Err(Error::InvalidAlignment);
    }
    Ok(smallest)
}

/// Iterator over the erase commands covering a range
///
/// Created by [`Geometry::plan_erase`]. The region is looked up again at
/// every step, so requests that cross region boundaries switch erase type
/// sets on the way. Yields an error at most once and then stops.
#[derive(Debug, Clone)]
pub struct ErasePlan<'a> {
    geometry: &'a Geometry,
    address: u32,
    end: u32,
    failed: bool,
}

impl<'a> ErasePlan<'a> {
    pub(super) fn new(geometry: &'a Geometry, address: u32, end: u32) -> Self {
        Self {
            geometry,
            address,
            end,
            failed: false,
        }
    }

    /// Check the whole plan without consuming it
    ///
    /// Returns the number of commands the plan will produce.
    pub fn validate(&self) -> Result<usize> {
        let mut count = 0;
        for cmd in self.clone() {
            cmd?;
            count += 1;
        }
        Ok(count)
    }

    fn next_command(&self) -> Result<EraseCommand> {
        let (_, region) = self.geometry.find_region(self.address)?;
        let remaining = self.end - self.address;
        let et = select_erase_type(self.geometry, region, self.address, remaining)?;

        let cmd_end = self.address as u64 + et.size as u64;
        if cmd_end > self.end as u64 || cmd_end > region.high_boundary as u64 {
            log::error!(
                "Erase of {} bytes at 0x{:08X} would run past the request or region",
                et.size,
                self.address
            );
            return Err(Error::InvalidAlignment);
        }

        Ok(EraseCommand {
            opcode: et.opcode,
            address: self.address,
            size: et.size,
        })
    }
}

impl Iterator for ErasePlan<'_> {
    type Item = Result<EraseCommand>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.address >= self.end {
            return None;
        }

        match self.next_command() {
            Ok(cmd) => {
                log::trace!(
                    "Erase step: opcode 0x{:02X} at 0x{:08X} ({} bytes)",
                    cmd.opcode,
                    cmd.address,
                    cmd.size
                );
                self.address += cmd.size;
                Some(Ok(cmd))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

impl core::iter::FusedIterator for ErasePlan<'_> {}
