//! CLI command implementations
//!
//! Every command runs against an initialized [`Device`](crate::device::Device)
//! through the [`BlockDevice`](qspif_core::flash::BlockDevice) trait, except
//! `plan-erase` which only consults the discovered geometry.

mod erase;
mod list;
mod plan;
mod probe;
mod read;
mod write;

pub use erase::run_erase;
pub use list::list_presets;
pub use plan::run_plan_erase;
pub use probe::run_probe;
pub use read::run_read;
pub use write::run_write;

use indicatif::{ProgressBar, ProgressStyle};

use crate::error::Result;

/// Byte progress bar with a trailing label
fn progress_bar(total: u64, phase: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}, {{eta}}) {}",
                phase
            ))?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Default `[start, start + length)` to the rest of the device
fn resolve_range(
    device: &crate::device::Device,
    start: Option<u32>,
    length: Option<u32>,
) -> Result<(u32, u32)> {
    use qspif_core::flash::BlockDevice;

    let size = device.size()?;
    let start = start.unwrap_or(0);
    let length = match length {
        Some(length) => length,
        None => size.checked_sub(start).ok_or(crate::error::CliError::InvalidRange {
            start,
            length: 0,
            reason: "start is beyond the end of the device",
        })?,
    };
    Ok((start, length))
}
