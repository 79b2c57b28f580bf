//! Opening the block device on top of the emulated flash

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use qspif_core::flash::{BlockDevice, QspifBlockDevice, QspifConfig};
use qspif_dummy::DummyQspiFlash;
use std::fs;

use crate::cli::DeviceArgs;
use crate::error::{CliError, Result};

/// Block device used by every command
pub type Device = QspifBlockDevice<NoopRawMutex, DummyQspiFlash>;

/// Build the emulated flash described by `args`
pub fn build_flash(args: &DeviceArgs) -> Result<DummyQspiFlash> {
    let mut config = args.preset.config();
    if let Some(path) = &args.sfdp {
        config.sfdp = fs::read(path).map_err(CliError::io(path))?;
        log::info!("Serving SFDP image {} ({} bytes)", path.display(), config.sfdp.len());
    }

    let Some(path) = &args.image else {
        return Ok(DummyQspiFlash::new(config));
    };
    let image = fs::read(path).map_err(CliError::io(path))?;
    if image.len() > config.size as usize {
        return Err(CliError::ImageTooLarge {
            image: image.len(),
            device: config.size,
        });
    }
    log::info!("Loaded {} bytes from {}", image.len(), path.display());
    Ok(DummyQspiFlash::with_data(config, &image))
}

/// Create and initialize the block device
pub fn open(args: &DeviceArgs) -> Result<Device> {
    let flash = build_flash(args)?;
    let mut config = QspifConfig::default();
    if let Some(hz) = args.frequency {
        config.frequency_hz = hz;
    }

    let device = Device::new(flash, config);
    device.init()?;
    Ok(device)
}

/// Deinitialize the device and save the flash contents if requested
pub fn close(device: Device, args: &DeviceArgs) -> Result<()> {
    device.deinit()?;
    let flash = device.free();
    if flash.violations() > 0 {
        log::warn!("{} bus transaction(s) rejected by the emulator", flash.violations());
    }

    if let Some(path) = &args.save {
        fs::write(path, flash.data()).map_err(CliError::io(path))?;
        println!("Saved {} bytes to {}", flash.data().len(), path.display());
    }
    Ok(())
}
