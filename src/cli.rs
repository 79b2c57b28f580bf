//! CLI argument parsing

use clap::{Parser, Subcommand};
use qspif_dummy::Preset;
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse an emulated device name
fn parse_preset(s: &str) -> Result<Preset, String> {
    Preset::from_name(s).ok_or_else(|| {
        format!(
            "Unknown preset '{}' [available: {}]",
            s,
            preset_names()
        )
    })
}

fn preset_names() -> String {
    Preset::ALL
        .iter()
        .map(Preset::name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Generate dynamic help text for the preset argument
fn preset_help() -> String {
    format!("Emulated device model [available: {}]", preset_names())
}

#[derive(Parser)]
#[command(name = "qspif")]
#[command(author, version, about = "SFDP QSPI NOR flash block device", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(flatten)]
    pub device: DeviceArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Emulated device options shared across commands
#[derive(clap::Args, Debug, Clone)]
pub struct DeviceArgs {
    /// Emulated device model
    #[arg(long, global = true, default_value = "uniform-8m", value_parser = parse_preset, help = preset_help())]
    pub preset: Preset,

    /// Serve this SFDP image instead of the preset's own tables
    #[arg(long, global = true)]
    pub sfdp: Option<PathBuf>,

    /// Initial flash contents
    #[arg(long, global = true)]
    pub image: Option<PathBuf>,

    /// Save the flash contents to this file when done
    #[arg(long, global = true)]
    pub save: Option<PathBuf>,

    /// Bus clock once the device is discovered, in Hz
    #[arg(long, global = true)]
    pub frequency: Option<u32>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Discover the device and show its geometry
    Probe,

    /// Show the erase commands an erase would issue, without erasing
    PlanErase {
        /// Start address (hex, e.g., 0x10000)
        #[arg(long, value_parser = parse_hex_u32)]
        start: u32,

        /// Length in bytes (hex or decimal)
        #[arg(long, value_parser = parse_hex_u32)]
        length: u32,
    },

    /// Read flash contents to file
    Read {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Start address (hex, e.g., 0x10000)
        #[arg(long, value_parser = parse_hex_u32)]
        start: Option<u32>,

        /// Number of bytes to read (defaults to the rest of the device)
        #[arg(long, value_parser = parse_hex_u32)]
        length: Option<u32>,
    },

    /// Write file to flash
    Write {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// Start address, aligned to the erase size there
        #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
        start: u32,

        /// Skip reading back and comparing after writing
        #[arg(long)]
        no_verify: bool,

        /// Don't erase before writing
        #[arg(long)]
        no_erase: bool,
    },

    /// Erase flash
    Erase {
        /// Start address for partial erase (hex, e.g., 0x10000)
        #[arg(long, value_parser = parse_hex_u32)]
        start: Option<u32>,

        /// Length of region to erase (hex or decimal)
        #[arg(long, value_parser = parse_hex_u32)]
        length: Option<u32>,
    },

    /// List emulated device models
    ListPresets,
}
