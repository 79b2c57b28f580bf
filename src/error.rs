//! Error types for the qspif command line

use std::path::PathBuf;

use thiserror::Error;

/// Command line errors
#[derive(Debug, Error)]
pub enum CliError {
    /// The block device reported a failure
    #[error("Flash operation failed: {0}")]
    Flash(#[from] qspif_core::Error),

    /// A file could not be read or written
    #[error("Failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The image file is larger than the emulated device
    #[error("Image of {image} bytes does not fit a {device} byte device")]
    ImageTooLarge { image: usize, device: u32 },

    /// The requested range is not usable as given
    #[error("Invalid range 0x{start:08X}+{length}: {reason}")]
    InvalidRange {
        start: u32,
        length: u32,
        reason: &'static str,
    },

    /// Read back data differs from what was written
    #[error("Verification failed at 0x{0:08X}")]
    VerifyFailed(u32),

    /// Progress bar template error
    #[error("Progress bar template: {0}")]
    Template(#[from] indicatif::style::TemplateError),
}

impl CliError {
    /// Wrap an I/O error with the path it concerns
    pub fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}

/// Result type for CLI commands
pub type Result<T> = std::result::Result<T, CliError>;
