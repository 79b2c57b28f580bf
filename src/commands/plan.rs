//! Erase plan command implementation

use crate::device::Device;
use crate::error::{CliError, Result};

/// Print the erase commands covering `[start, start + length)`
///
/// Nothing is sent to the device.
pub fn run_plan_erase(device: &Device, start: u32, length: u32) -> Result<()> {
    let geometry = device.geometry().ok_or(CliError::Flash(qspif_core::Error::NotReady))?;
    let plan = geometry.plan_erase(start, length)?;
    let count = plan.validate()?;

    println!(
        "Erasing 0x{:08X} - 0x{:08X} takes {} command(s):",
        start,
        start as u64 + length as u64,
        count
    );
    for command in plan {
        let command = command?;
        println!(
            "  0x{:02X} at 0x{:08X} ({} KiB)",
            command.opcode,
            command.address,
            command.size / 1024
        );
    }
    Ok(())
}
