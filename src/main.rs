//! qspif - SFDP QSPI NOR flash block device
//!
//! Runs the `qspif-core` block device against the `qspif-dummy` emulator.
//! The device is discovered from its SFDP tables on every run, so the same
//! commands work for every emulated model and for any SFDP image passed
//! with `--sfdp`.
//!
//! Flash contents start erased, or from `--image`, and are written back
//! with `--save`.

mod cli;
mod commands;
mod device;
mod error;

use clap::Parser;
use cli::{Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    if let Commands::ListPresets = cli.command {
        commands::list_presets();
        return Ok(());
    }

    let device = device::open(&cli.device)?;
    let result = match cli.command {
        Commands::Probe => commands::run_probe(&device),
        Commands::PlanErase { start, length } => commands::run_plan_erase(&device, start, length),
        Commands::Read {
            output,
            start,
            length,
        } => commands::run_read(&device, &output, start, length),
        Commands::Write {
            input,
            start,
            no_verify,
            no_erase,
        } => commands::run_write(&device, &input, start, !no_verify, no_erase),
        Commands::Erase { start, length } => commands::run_erase(&device, start, length),
        Commands::ListPresets => Ok(()),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    device::close(device, &cli.device)?;
    Ok(())
}
