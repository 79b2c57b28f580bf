//! Frame format types

/// Number of lines used by one phase of a transaction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BusWidth {
    /// One line (standard SPI)
    #[default]
    Single,
    /// Two lines
    Dual,
    /// Four lines
    Quad,
}

/// Address width for QSPI commands
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AddressSize {
    /// 3-byte (24-bit) address - supports up to 16 MiB
    #[default]
    ThreeByte,
    /// 4-byte (32-bit) address - supports up to 4 GiB
    FourByte,
}

impl AddressSize {
    /// Returns the number of address bytes
    pub const fn bytes(&self) -> u8 {
        match self {
            Self::ThreeByte => 3,
            Self::FourByte => 4,
        }
    }

    /// Returns the maximum addressable size in bytes
    pub const fn max_size(&self) -> u64 {
        match self {
            Self::ThreeByte => 16 * 1024 * 1024,
            Self::FourByte => 1 << 32,
        }
    }
}

/// Size of the alternate-byte (mode bits) phase
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AltSize {
    /// 8 alternate bits
    #[default]
    Bits8,
    /// 16 alternate bits
    Bits16,
    /// 24 alternate bits
    Bits24,
    /// 32 alternate bits
    Bits32,
}

/// Complete frame format for the following transactions
///
/// The driver never sends alternate bytes; mode clocks are folded into
/// `dummy_cycles`, so `alt_width`/`alt_size` keep the adapter defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BusFormat {
    /// Width of the instruction phase
    pub instruction_width: BusWidth,
    /// Width of the address phase
    pub address_width: BusWidth,
    /// Number of address bytes
    pub address_size: AddressSize,
    /// Width of the alternate-byte phase
    pub alt_width: BusWidth,
    /// Size of the alternate-byte phase
    pub alt_size: AltSize,
    /// Width of the data phase
    pub data_width: BusWidth,
    /// Dummy (and mode) clock cycles between address and data
    pub dummy_cycles: u8,
}

impl BusFormat {
    /// All phases on a single line, no dummy cycles
    pub const fn single(address_size: AddressSize) -> Self {
        Self::uniform(BusWidth::Single, address_size)
    }

    /// All phases on the same number of lines, no dummy cycles
    pub const fn uniform(width: BusWidth, address_size: AddressSize) -> Self {
        Self {
            instruction_width: width,
            address_width: width,
            address_size,
            alt_width: width,
            alt_size: AltSize::Bits8,
            data_width: width,
            dummy_cycles: 0,
        }
    }

    /// Set the number of dummy cycles
    pub const fn with_dummy_cycles(mut self, cycles: u8) -> Self {
        self.dummy_cycles = cycles;
        self
    }

    /// Returns true if any phase uses four lines
    pub fn uses_quad(&self) -> bool {
        [self.instruction_width, self.address_width, self.data_width].contains(&BusWidth::Quad)
    }
}

impl Default for BusFormat {
    fn default() -> Self {
        Self::single(AddressSize::ThreeByte)
    }
}
