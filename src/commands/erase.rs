//! Erase command implementation

use indicatif::{ProgressBar, ProgressStyle};
use qspif_core::flash::BlockDevice;
use std::time::Duration;

use crate::device::Device;
use crate::error::{CliError, Result};

/// Run the erase command
pub fn run_erase(device: &Device, start: Option<u32>, length: Option<u32>) -> Result<()> {
    match (start, length) {
        (Some(start), Some(length)) => {
            erase_with_spinner(device, start, length)?;
            println!("Erased {} bytes starting at 0x{:08X}", length, start);
        }
        (Some(_), None) | (None, Some(_)) => {
            return Err(CliError::InvalidRange {
                start: start.unwrap_or(0),
                length: length.unwrap_or(0),
                reason: "both --start and --length must be specified for partial erase",
            });
        }
        (None, None) => {
            let size = device.size()?;
            erase_with_spinner(device, 0, size)?;
            println!("Chip erase complete");
        }
    }
    Ok(())
}

/// Erase a range with a progress spinner
pub fn erase_with_spinner(device: &Device, start: u32, length: u32) -> Result<()> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(format!("Erasing {} bytes at 0x{:08X}...", length, start));
    pb.enable_steady_tick(Duration::from_millis(100));

    if let Err(e) = device.erase(start, length) {
        pb.abandon_with_message("Erase failed");
        return Err(e.into());
    }

    pb.finish_with_message(format!("Erased {} bytes", length));
    Ok(())
}
