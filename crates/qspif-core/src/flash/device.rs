//! Block device trait
//!
//! This module provides the `BlockDevice` trait: the capability set a
//! storage stack needs from a block-addressed device. Implementations
//! serialize access internally, so every method takes `&self`.

use crate::error::Result;

/// Generic block device
///
/// # Sizes
///
/// - Reads must be a multiple of [`read_size`](Self::read_size).
/// - Programs must be a multiple of [`program_size`](Self::program_size)
///   and start on a program unit boundary.
/// - Erases must be a multiple of the erase size at their start address
///   ([`erase_size_at`](Self::erase_size_at)).
///
/// All addresses are 32-bit byte offsets from the start of the device.
///
/// # Example
///
/// ```ignore
/// use qspif_core::flash::BlockDevice;
///
/// fn rewrite_block<D: BlockDevice>(device: &D, address: u32, data: &[u8]) -> Result<()> {
///     let erase_size = device.erase_size_at(address)?;
///     device.erase(address, erase_size)?;
///     device.program(data, address, data.len() as u32)
/// }
/// ```
pub trait BlockDevice {
    /// Bring the device up
    ///
    /// Must succeed before any other operation is used.
    fn init(&self) -> Result<()>;

    /// Release the device
    ///
    /// Operations fail with `NotReady` until the next successful `init`.
    fn deinit(&self) -> Result<()>;

    /// Read `size` bytes at `address` into the start of `buffer`
    ///
    /// # Errors
    /// * `NotReady` - The device is not initialized
    /// * `BufferTooSmall` - `buffer` holds fewer than `size` bytes
    /// * `AddressOutOfBounds` - The read extends beyond the device
    fn read(&self, buffer: &mut [u8], address: u32, size: u32) -> Result<()>;

    /// Program `size` bytes from the start of `buffer` at `address`
    ///
    /// The target range must have been erased. Nothing checks this.
    ///
    /// # Errors
    /// * `NotReady` - The device is not initialized
    /// * `BufferTooSmall` - `buffer` holds fewer than `size` bytes
    /// * `InvalidAlignment` - `address` or `size` is not a multiple of the program size
    /// * `AddressOutOfBounds` - The program extends beyond the device
    fn program(&self, buffer: &[u8], address: u32, size: u32) -> Result<()>;

    /// Erase `size` bytes at `address`
    ///
    /// Erased content is undefined until it is programmed.
    ///
    /// # Errors
    /// * `NotReady` - The device is not initialized
    /// * `InvalidAlignment` - The range cannot be covered by the erase types available
    /// * `AddressOutOfBounds` - The erase extends beyond the device
    fn erase(&self, address: u32, size: u32) -> Result<()>;

    /// Read granularity in bytes
    fn read_size(&self) -> Result<u32>;

    /// Program granularity in bytes
    fn program_size(&self) -> Result<u32>;

    /// Device-wide erase granularity in bytes
    fn erase_size(&self) -> Result<u32>;

    /// Erase granularity of the region containing `address`
    fn erase_size_at(&self, address: u32) -> Result<u32>;

    /// Total size in bytes
    fn size(&self) -> Result<u32>;
}
