//! Probe command implementation

use qspif_core::geometry::Geometry;

use crate::device::Device;
use crate::error::{CliError, Result};

/// Show the geometry discovered from SFDP
pub fn run_probe(device: &Device) -> Result<()> {
    let geometry = device.geometry().ok_or(CliError::Flash(qspif_core::Error::NotReady))?;
    print_geometry(&geometry);
    Ok(())
}

fn print_geometry(geometry: &Geometry) {
    let size = geometry.device_size();
    println!("Found SFDP flash:");
    println!("  Size:      {} bytes ({} KiB)", size, size / 1024);
    println!("  Page size: {} bytes", geometry.page_size());

    let mode = geometry.bus_mode();
    println!(
        "  Read mode: {} (opcode 0x{:02X}, {} dummy cycles, {}-byte addresses)",
        mode.read_mode,
        mode.read_opcode,
        mode.dummy_cycles,
        mode.address_size.bytes()
    );

    println!();
    println!("Erase types:");
    for (index, et) in geometry.erase_types().iter() {
        println!(
            "  Type {}: opcode 0x{:02X}, {} KiB",
            index + 1,
            et.opcode,
            et.size / 1024
        );
    }
    if let Some(legacy) = geometry.legacy_erase() {
        println!("  Legacy: opcode 0x{:02X}, {} KiB", legacy.opcode, legacy.size / 1024);
    }

    println!();
    println!("Regions:");
    for region in geometry.regions() {
        let sizes: Vec<String> = geometry
            .region_erase_types(region)
            .map(|et| format!("{}K", et.size / 1024))
            .collect();
        println!(
            "  0x{:08X} - 0x{:08X} ({} KiB) erase {}",
            region.low_boundary(),
            region.high_boundary - 1,
            region.size / 1024,
            sizes.join("/")
        );
    }

    println!();
    match geometry.min_common_erase_size() {
        0 => println!("No erase type common to all regions"),
        common => println!("Minimum common erase size: {} KiB", common / 1024),
    }
}
