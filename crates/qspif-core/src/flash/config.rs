//! Driver configuration

use crate::protocol::Timing;

/// Bus frequency and timeout budgets for a [`QspifBlockDevice`](super::QspifBlockDevice)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QspifConfig {
    /// Bus clock applied once discovery has succeeded
    pub frequency_hz: u32,
    /// Delay between two status register polls
    pub poll_interval_us: u32,
    /// Number of status polls waiting for the write enable latch
    pub write_enable_polls: u32,
    /// Budget for a page program to complete
    pub program_timeout_us: u32,
    /// Budget for a status or configuration register write to complete
    pub status_write_timeout_us: u32,
    /// Budget for erasing up to 4 KiB
    pub erase_4k_timeout_us: u32,
    /// Budget for erasing up to 64 KiB
    pub erase_64k_timeout_us: u32,
    /// Budget for erasing anything larger
    pub erase_large_timeout_us: u32,
    /// Delay after a soft reset before the device accepts commands
    pub reset_recovery_us: u32,
}

impl QspifConfig {
    /// Poll budgets used by the command sequences
    pub fn timing(&self) -> Timing {
        Timing {
            poll_interval_us: self.poll_interval_us,
            write_enable_polls: self.write_enable_polls,
            status_write_timeout_us: self.status_write_timeout_us,
        }
    }

    /// Ready-poll budget for one erase command of `size` bytes
    pub fn erase_timeout(&self, size: u32) -> u32 {
        match size {
            s if s <= 4 * 1024 => self.erase_4k_timeout_us,
            s if s <= 64 * 1024 => self.erase_64k_timeout_us,
            _ => self.erase_large_timeout_us,
        }
    }
}

impl Default for QspifConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 40_000_000,
            poll_interval_us: 10,
            write_enable_polls: 10,
            // Page program: typical 0.7-3ms
            program_timeout_us: 10_000,
            status_write_timeout_us: 50_000,
            erase_4k_timeout_us: 500_000,
            erase_64k_timeout_us: 2_000_000,
            erase_large_timeout_us: 60_000_000,
            reset_recovery_us: 50,
        }
    }
}
