//! Bus adapter trait definitions

use core::fmt;

use super::BusFormat;

/// Status reported by a bus adapter when a transaction fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// The physical transfer failed
    TransferFailed,
    /// The adapter rejected the requested format or parameters
    InvalidParameter,
    /// The adapter does not implement the requested operation
    NotSupported,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransferFailed => write!(f, "transfer failed"),
            Self::InvalidParameter => write!(f, "invalid parameter"),
            Self::NotSupported => write!(f, "operation not supported"),
        }
    }
}

/// QSPI transfer adapter
///
/// This trait represents the quad-SPI peripheral that performs the
/// physical transfers. The driver never touches hardware except through it.
///
/// A transaction is framed by the format most recently passed to
/// [`configure_format`](Self::configure_format): line counts for the
/// instruction, address and data phases, the address size and the number
/// of dummy cycles. The adapter keeps that format until it is changed.
///
/// ## Example
///
/// ```ignore
/// impl QspiBus for Stm32Qspi {
///     fn configure_format(&mut self, format: &BusFormat) -> Result<(), BusError> {
///         self.ccr = Ccr::from_format(format);
///         Ok(())
///     }
///
///     fn read(&mut self, opcode: u8, address: u32, buf: &mut [u8]) -> Result<(), BusError> {
///         self.indirect_read(opcode, Some(address), buf)
///     }
///     // ...
/// }
/// ```
pub trait QspiBus {
    /// Set the frame format used by subsequent transactions
    fn configure_format(&mut self, format: &BusFormat) -> Result<(), BusError>;

    /// Set the bus clock frequency in Hz
    fn set_frequency(&mut self, hz: u32) -> Result<(), BusError>;

    /// Issue a command with an optional address and optional data phases
    ///
    /// Used for register accesses, write enable, erase and reset commands.
    /// `tx` is sent after the address; `rx` is filled after that. Either may
    /// be empty. `None` for `address` skips the address phase.
    fn command_transfer(
        &mut self,
        opcode: u8,
        address: Option<u32>,
        tx: &[u8],
        rx: &mut [u8],
    ) -> Result<(), BusError>;

    /// Read `buf.len()` bytes starting at `address`
    fn read(&mut self, opcode: u8, address: u32, buf: &mut [u8]) -> Result<(), BusError>;

    /// Write `data` starting at `address`
    fn write(&mut self, opcode: u8, address: u32, data: &[u8]) -> Result<(), BusError>;

    /// Delay for the specified number of microseconds
    fn delay_us(&mut self, us: u32);
}

impl<B: QspiBus + ?Sized> QspiBus for &mut B {
    fn configure_format(&mut self, format: &BusFormat) -> Result<(), BusError> {
        (**self).configure_format(format)
    }

    fn set_frequency(&mut self, hz: u32) -> Result<(), BusError> {
        (**self).set_frequency(hz)
    }

    fn command_transfer(
        &mut self,
        opcode: u8,
        address: Option<u32>,
        tx: &[u8],
        rx: &mut [u8],
    ) -> Result<(), BusError> {
        (**self).command_transfer(opcode, address, tx, rx)
    }

    fn read(&mut self, opcode: u8, address: u32, buf: &mut [u8]) -> Result<(), BusError> {
        (**self).read(opcode, address, buf)
    }

    fn write(&mut self, opcode: u8, address: u32, data: &[u8]) -> Result<(), BusError> {
        (**self).write(opcode, address, data)
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }
}
