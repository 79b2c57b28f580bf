//! Bus session with frame format caching

use crate::bus::{BusError, BusFormat, QspiBus};
use crate::error::{Error, Result};

/// Map an adapter failure to a device error, logging the failed step
fn device_error(what: &'static str) -> impl FnOnce(BusError) -> Error {
    move |e| {
        log::error!("{} failed: {}", what, e);
        Error::DeviceError
    }
}

/// A QSPI bus plus the frame format currently programmed into it
///
/// The session remembers the last format handed to
/// [`QspiBus::configure_format`] and only reconfigures the adapter when a
/// transaction needs a different one. It also holds the format used for
/// non-read commands, which changes when the device enters QPI or 4-byte
/// address mode.
#[derive(Debug)]
pub struct Session<B> {
    bus: B,
    active: Option<BusFormat>,
    command_format: BusFormat,
}

impl<B: QspiBus> Session<B> {
    /// Wrap a bus adapter
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            active: None,
            command_format: BusFormat::default(),
        }
    }

    /// Release the bus adapter
    pub fn into_inner(self) -> B {
        self.bus
    }

    /// Access the bus adapter
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Mutable access to the bus adapter
    ///
    /// Changing the adapter format directly desynchronizes the cache; call
    /// [`reset`](Self::reset) afterwards.
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Format used for program, erase and register commands
    pub fn command_format(&self) -> BusFormat {
        self.command_format
    }

    /// Change the format used for program, erase and register commands
    pub fn set_command_format(&mut self, format: BusFormat) {
        self.command_format = format;
    }

    /// Forget the cached format and return to single-line commands
    pub fn reset(&mut self) {
        self.active = None;
        self.command_format = BusFormat::default();
    }

    /// Program `format` into the adapter unless it is already active
    pub fn apply_format(&mut self, format: &BusFormat) -> Result<()> {
        if self.active.as_ref() == Some(format) {
            return Ok(());
        }
        // A failed configure leaves the adapter state unknown
        self.active = None;
        self.bus
            .configure_format(format)
            .map_err(device_error("Bus format configuration"))?;
        self.active = Some(*format);
        Ok(())
    }

    /// Set the bus clock frequency
    pub fn set_frequency(&mut self, hz: u32) -> Result<()> {
        self.bus
            .set_frequency(hz)
            .map_err(device_error("Bus frequency configuration"))
    }

    /// Issue a command using the command format
    pub fn command(
        &mut self,
        opcode: u8,
        address: Option<u32>,
        tx: &[u8],
        rx: &mut [u8],
    ) -> Result<()> {
        let format = self.command_format;
        self.command_with(&format, opcode, address, tx, rx)
    }

    /// Issue a command using an explicit format
    pub fn command_with(
        &mut self,
        format: &BusFormat,
        opcode: u8,
        address: Option<u32>,
        tx: &[u8],
        rx: &mut [u8],
    ) -> Result<()> {
        self.apply_format(format)?;
        self.bus
            .command_transfer(opcode, address, tx, rx)
            .map_err(device_error("Command transfer"))
    }

    /// Read data using an explicit format
    pub fn read(&mut self, format: &BusFormat, opcode: u8, address: u32, buf: &mut [u8]) -> Result<()> {
        self.apply_format(format)?;
        self.bus
            .read(opcode, address, buf)
            .map_err(device_error("Read transfer"))
    }

    /// Write data using the command format
    pub fn write(&mut self, opcode: u8, address: u32, data: &[u8]) -> Result<()> {
        let format = self.command_format;
        self.apply_format(&format)?;
        self.bus
            .write(opcode, address, data)
            .map_err(device_error("Write transfer"))
    }

    /// Delay for the specified number of microseconds
    pub fn delay_us(&mut self, us: u32) {
        self.bus.delay_us(us)
    }
}
