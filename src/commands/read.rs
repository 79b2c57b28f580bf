//! Read command implementation

use qspif_core::flash::BlockDevice;
use std::fs;
use std::path::Path;

use super::{progress_bar, resolve_range};
use crate::device::Device;
use crate::error::{CliError, Result};

/// Default chunk size for reading (4 KiB)
const READ_CHUNK_SIZE: u32 = 4096;

/// Run the read command
pub fn run_read(
    device: &Device,
    output: &Path,
    start: Option<u32>,
    length: Option<u32>,
) -> Result<()> {
    let (start, length) = resolve_range(device, start, length)?;
    let data = read_with_progress(device, start, length)?;

    fs::write(output, &data).map_err(CliError::io(output))?;
    println!("Wrote {} bytes to {:?}", data.len(), output);
    Ok(())
}

/// Read `[start, start + length)` with a progress bar
pub fn read_with_progress(device: &Device, start: u32, length: u32) -> Result<Vec<u8>> {
    let mut data = vec![0u8; length as usize];
    let pb = progress_bar(length as u64, "Reading")?;

    let mut offset = 0u32;
    for chunk in data.chunks_mut(READ_CHUNK_SIZE as usize) {
        let chunk_len = chunk.len() as u32;
        device.read(chunk, start + offset, chunk_len)?;
        offset += chunk_len;
        pb.set_position(offset as u64);
    }

    pb.finish_with_message("Read complete");
    Ok(data)
}
