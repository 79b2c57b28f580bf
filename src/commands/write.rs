//! Write command implementation

use qspif_core::flash::BlockDevice;
use std::fs;
use std::path::Path;

use super::erase::erase_with_spinner;
use super::progress_bar;
use super::read::read_with_progress;
use crate::device::Device;
use crate::error::{CliError, Result};

/// Default chunk size for writing
const WRITE_CHUNK_SIZE: u32 = 4096;

/// Run the write command
///
/// The image is padded with 0xFF to a whole number of pages. Unless
/// `no_erase` is set, the covering range is erased first using the erase
/// size of each region it touches.
pub fn run_write(
    device: &Device,
    input: &Path,
    start: u32,
    verify: bool,
    no_erase: bool,
) -> Result<()> {
    let mut data = fs::read(input).map_err(CliError::io(input))?;
    if data.is_empty() {
        println!("{:?} is empty, nothing to write", input);
        return Ok(());
    }

    let size = device.size()?;
    let page_size = device.program_size()?;
    let padded = data.len().div_ceil(page_size as usize) * page_size as usize;
    data.resize(padded, 0xFF);

    let length = u32::try_from(data.len())
        .ok()
        .filter(|&len| start as u64 + len as u64 <= size as u64)
        .ok_or(CliError::ImageTooLarge {
            image: data.len(),
            device: size - start.min(size),
        })?;
    if start % page_size != 0 {
        return Err(CliError::InvalidRange {
            start,
            length,
            reason: "start is not page aligned",
        });
    }

    if !no_erase {
        let erase_length = erase_extent(device, start, length)?;
        erase_with_spinner(device, start, erase_length)?;
    }

    let chunk_size = WRITE_CHUNK_SIZE.max(page_size);
    let pb = progress_bar(length as u64, "Writing")?;
    let mut offset = 0u32;
    for chunk in data.chunks(chunk_size as usize) {
        let chunk_len = chunk.len() as u32;
        device.program(chunk, start + offset, chunk_len)?;
        offset += chunk_len;
        pb.set_position(offset as u64);
    }
    pb.finish_with_message("Write complete");

    if verify {
        let readback = read_with_progress(device, start, length)?;
        if let Some(pos) = readback.iter().zip(&data).position(|(a, b)| a != b) {
            return Err(CliError::VerifyFailed(start + pos as u32));
        }
        println!("Verified {} bytes", length);
    }

    println!("Wrote {} bytes at 0x{:08X}", length, start);
    Ok(())
}

/// Length of the erase covering `[start, start + length)`
///
/// Steps through the smallest erase size at each address, so the result
/// reaches the end of the last sector the range touches.
fn erase_extent(device: &Device, start: u32, length: u32) -> Result<u32> {
    let end = start as u64 + length as u64;
    let mut address = start as u64;
    while address < end {
        address += device.erase_size_at(address as u32)? as u64;
    }
    Ok((address - start as u64) as u32)
}
