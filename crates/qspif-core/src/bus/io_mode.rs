//! QSPI I/O modes

use super::{AddressSize, BusFormat, BusWidth};

/// I/O mode for read transactions
///
/// Named after the instruction-address-data line counts. The variants are
/// declared in ascending order of throughput, so `Ord` ranks them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IoMode {
    /// Standard SPI: 1-1-1
    #[default]
    Single,
    /// Dual Output: 1-1-2
    DualOut,
    /// Dual I/O: 1-2-2
    DualIo,
    /// Quad Output: 1-1-4
    QuadOut,
    /// Quad I/O: 1-4-4
    QuadIo,
    /// QPI: 4-4-4
    Qpi,
}

impl IoMode {
    /// Width used for the instruction phase
    pub const fn instruction_width(&self) -> BusWidth {
        match self {
            Self::Qpi => BusWidth::Quad,
            _ => BusWidth::Single,
        }
    }

    /// Width used for the address phase
    pub const fn address_width(&self) -> BusWidth {
        match self {
            Self::Single | Self::DualOut | Self::QuadOut => BusWidth::Single,
            Self::DualIo => BusWidth::Dual,
            Self::QuadIo | Self::Qpi => BusWidth::Quad,
        }
    }

    /// Width used for the data phase
    pub const fn data_width(&self) -> BusWidth {
        match self {
            Self::Single => BusWidth::Single,
            Self::DualOut | Self::DualIo => BusWidth::Dual,
            Self::QuadOut | Self::QuadIo | Self::Qpi => BusWidth::Quad,
        }
    }

    /// Returns true if this mode only works once quad mode is enabled
    pub const fn requires_quad(&self) -> bool {
        matches!(self, Self::QuadOut | Self::QuadIo | Self::Qpi)
    }

    /// Build the frame format for a read in this mode
    pub const fn format(&self, address_size: AddressSize, dummy_cycles: u8) -> BusFormat {
        BusFormat {
            instruction_width: self.instruction_width(),
            address_width: self.address_width(),
            address_size,
            alt_width: self.address_width(),
            alt_size: super::AltSize::Bits8,
            data_width: self.data_width(),
            dummy_cycles,
        }
    }
}

impl core::fmt::Display for IoMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Single => "1-1-1",
            Self::DualOut => "1-1-2",
            Self::DualIo => "1-2-2",
            Self::QuadOut => "1-1-4",
            Self::QuadIo => "1-4-4",
            Self::Qpi => "4-4-4",
        };
        f.write_str(name)
    }
}
