//! qspif-dummy - In-memory QSPI NOR flash emulator for testing
//!
//! This crate provides [`DummyQspiFlash`], a [`QspiBus`] implementation that
//! behaves like a serial NOR flash chip held in memory. It serves an SFDP
//! image, tracks the status registers, the QPI and 4-byte address states and
//! applies program and erase commands to its contents. Every transaction is
//! recorded so tests can check exactly what the driver sent.
//!
//! The emulator is strict: a transaction framed with the wrong line widths,
//! address size or dummy cycles for the current device state is rejected
//! with [`BusError::InvalidParameter`] and counted as a violation.
//!
//! Faults can be injected through [`Faults`] to exercise the driver's error
//! paths.

mod presets;
mod sfdp;

use std::collections::HashMap;

use qspif_core::bus::{opcodes, AddressSize, BusError, BusFormat, BusWidth, IoMode, QspiBus};
use qspif_core::sfdp::QuadEnableRequirement;

pub use presets::{Preset, HYBRID_DETECT_ADDR, HYBRID_DETECT_MASK};
pub use sfdp::{SectorMapBuilder, SfdpBuilder};

/// A fast read instruction the emulated device accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOp {
    /// Line counts
    pub mode: IoMode,
    /// Instruction
    pub opcode: u8,
    /// Mode plus dummy clocks
    pub dummy_cycles: u8,
}

/// How the device reaches 4-byte addressing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FourByteMode {
    /// 3-byte addresses only
    #[default]
    Never,
    /// 4-byte addresses from power-up
    Native,
    /// B7h switches to 4-byte addresses
    Instruction,
}

/// Emulated part description
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Flash size in bytes
    pub size: u32,
    /// Largest single program transaction
    pub page_size: u32,
    /// Image returned by RDSFDP
    pub sfdp: Vec<u8>,
    /// Accepted erase instructions as `(opcode, size)`
    pub erase_ops: Vec<(u8, u32)>,
    /// Accepted fast read instructions, besides 03h
    pub read_ops: Vec<ReadOp>,
    /// Where the QE bit lives; quad transfers fail while it is clear
    pub quad_enable: QuadEnableRequirement,
    /// Whether 38h/35h and the configuration register bits enter QPI mode
    pub qpi: bool,
    /// 4-byte address behaviour
    pub four_byte: FourByteMode,
    /// Number of status polls a program or erase stays busy
    pub busy_polls: u32,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Preset::Uniform8M.config()
    }
}

/// Faults injected into the emulated device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Faults {
    /// WREN never sets the write enable latch
    pub stuck_wel: bool,
    /// The busy bit never clears
    pub stuck_busy: bool,
    /// Status register writes are ignored
    pub stuck_status: bool,
    /// Any transaction using this opcode fails
    pub fail_opcode: Option<u8>,
}

/// One transaction seen on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// `configure_format`
    Configure(BusFormat),
    /// `set_frequency`
    Frequency(u32),
    /// `command_transfer`
    Command {
        /// Instruction
        opcode: u8,
        /// Address phase, if any
        address: Option<u32>,
        /// Bytes sent after the address
        tx: Vec<u8>,
        /// Bytes requested back
        rx_len: usize,
    },
    /// `read`
    Read {
        /// Instruction
        opcode: u8,
        /// Start address
        address: u32,
        /// Length
        len: usize,
    },
    /// `write`
    Write {
        /// Instruction
        opcode: u8,
        /// Start address
        address: u32,
        /// Length
        len: usize,
    },
}

impl BusEvent {
    /// Instruction of a transfer event
    pub fn opcode(&self) -> Option<u8> {
        match self {
            Self::Command { opcode, .. } | Self::Read { opcode, .. } | Self::Write { opcode, .. } => {
                Some(*opcode)
            }
            Self::Configure(_) | Self::Frequency(_) => None,
        }
    }
}

/// Emulated QSPI NOR flash
pub struct DummyQspiFlash {
    config: DummyConfig,
    data: Vec<u8>,
    format: BusFormat,
    frequency: Option<u32>,
    status_reg1: u8,
    status_reg2: u8,
    registers: HashMap<(u8, Option<u32>), u8>,
    write_enabled: bool,
    busy_polls: u32,
    qpi: bool,
    in_4byte_mode: bool,
    reset_enabled: bool,
    resets: u32,
    elapsed_us: u64,
    violations: u32,
    faults: Faults,
    events: Vec<BusEvent>,
}

impl DummyQspiFlash {
    /// Create an erased flash with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        let data = vec![0xFF; config.size as usize];
        let in_4byte_mode = config.four_byte == FourByteMode::Native;
        Self {
            config,
            data,
            format: BusFormat::default(),
            frequency: None,
            status_reg1: 0,
            status_reg2: 0,
            registers: HashMap::new(),
            write_enabled: false,
            busy_polls: 0,
            qpi: false,
            in_4byte_mode,
            reset_enabled: false,
            resets: 0,
            elapsed_us: 0,
            violations: 0,
            faults: Faults::default(),
            events: Vec::new(),
        }
    }

    /// Create a flash from a preset
    pub fn preset(preset: Preset) -> Self {
        Self::new(preset.config())
    }

    /// Create a flash with pre-filled data
    pub fn with_data(config: DummyConfig, initial_data: &[u8]) -> Self {
        let mut flash = Self::new(config);
        let len = initial_data.len().min(flash.data.len());
        flash.data[..len].copy_from_slice(&initial_data[..len]);
        flash
    }

    /// Array contents
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Array contents, writable without going through the bus
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Injected faults
    pub fn faults_mut(&mut self) -> &mut Faults {
        &mut self.faults
    }

    /// Set the value a register read with `opcode` at `address` returns
    pub fn set_register(&mut self, opcode: u8, address: Option<u32>, value: u8) {
        self.registers.insert((opcode, address), value);
    }

    /// Leave the part in the modes an earlier boot may have switched on
    ///
    /// QPI also sets the QE bit, as every QPI entry sequence does.
    pub fn set_warm_state(&mut self, qpi: bool, four_byte: bool) {
        if qpi {
            match self.config.quad_enable {
                QuadEnableRequirement::None => {}
                QuadEnableRequirement::Sr1Bit6 => self.status_reg1 |= opcodes::SR1_QE_BIT6,
                QuadEnableRequirement::Sr2Bit7 => self.status_reg2 |= opcodes::SR2_QE_BIT7,
                _ => self.status_reg2 |= opcodes::SR2_QE,
            }
        }
        self.qpi = qpi;
        self.in_4byte_mode = four_byte || self.config.four_byte == FourByteMode::Native;
    }

    /// Status register 1, without the volatile WEL and WIP bits
    pub fn status_reg1(&self) -> u8 {
        self.status_reg1
    }

    /// Status register 2
    pub fn status_reg2(&self) -> u8 {
        self.status_reg2
    }

    /// Check if the device is in QPI mode
    pub fn is_qpi(&self) -> bool {
        self.qpi
    }

    /// Check if the device uses 4-byte addresses
    pub fn is_4byte(&self) -> bool {
        self.in_4byte_mode
    }

    /// Check if the QE bit is set
    pub fn quad_enabled(&self) -> bool {
        match self.config.quad_enable {
            QuadEnableRequirement::None => true,
            QuadEnableRequirement::Sr1Bit6 => self.status_reg1 & opcodes::SR1_QE_BIT6 != 0,
            QuadEnableRequirement::Sr2Bit7 => self.status_reg2 & opcodes::SR2_QE_BIT7 != 0,
            _ => self.status_reg2 & opcodes::SR2_QE != 0,
        }
    }

    /// Frequency last set, if any
    pub fn frequency(&self) -> Option<u32> {
        self.frequency
    }

    /// Number of completed soft resets
    pub fn resets(&self) -> u32 {
        self.resets
    }

    /// Total time spent in `delay_us`
    pub fn elapsed_us(&self) -> u64 {
        self.elapsed_us
    }

    /// Number of rejected transactions
    pub fn violations(&self) -> u32 {
        self.violations
    }

    /// All recorded bus events
    pub fn events(&self) -> &[BusEvent] {
        &self.events
    }

    /// Forget the recorded bus events
    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Opcodes of all recorded transfers, in order
    pub fn opcodes(&self) -> Vec<u8> {
        self.events.iter().filter_map(BusEvent::opcode).collect()
    }

    /// Formats passed to `configure_format`, in order
    pub fn formats(&self) -> Vec<BusFormat> {
        self.events
            .iter()
            .filter_map(|e| match e {
                BusEvent::Configure(format) => Some(*format),
                _ => None,
            })
            .collect()
    }

    /// Erase commands seen, as `(opcode, address)`
    pub fn erase_commands(&self) -> Vec<(u8, u32)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                BusEvent::Command {
                    opcode,
                    address: Some(address),
                    tx,
                    rx_len: 0,
                } if tx.is_empty() && self.erase_size(*opcode).is_some() => {
                    Some((*opcode, *address))
                }
                _ => None,
            })
            .collect()
    }

    fn erase_size(&self, opcode: u8) -> Option<u32> {
        self.config
            .erase_ops
            .iter()
            .find(|(op, _)| *op == opcode)
            .map(|&(_, size)| size)
    }

    fn reject(&mut self, what: &str) -> Result<(), BusError> {
        log::warn!("dummy: rejected {} (format {:?})", what, self.format);
        self.violations += 1;
        Err(BusError::InvalidParameter)
    }

    fn check_fault(&self, opcode: u8) -> Result<(), BusError> {
        if self.faults.fail_opcode == Some(opcode) {
            log::debug!("dummy: injected failure for opcode 0x{:02X}", opcode);
            return Err(BusError::TransferFailed);
        }
        Ok(())
    }

    /// The instruction phase must match the QPI state
    fn check_instruction_width(&mut self, opcode: u8) -> Result<(), BusError> {
        let expected = if self.qpi {
            BusWidth::Quad
        } else {
            BusWidth::Single
        };
        if self.format.instruction_width != expected {
            return self.reject(&format!("instruction 0x{:02X} width", opcode));
        }
        if self.format.uses_quad() && !self.quad_enabled() {
            return self.reject(&format!("quad transfer 0x{:02X} with QE clear", opcode));
        }
        Ok(())
    }

    /// Array accesses must use the current address size
    fn check_array_address(&mut self, opcode: u8, address: u32, len: usize) -> Result<(), BusError> {
        let expected = if self.in_4byte_mode {
            AddressSize::FourByte
        } else {
            AddressSize::ThreeByte
        };
        if self.format.address_size != expected {
            return self.reject(&format!("address size of 0x{:02X}", opcode));
        }
        if address as u64 + len as u64 > self.data.len() as u64 {
            return self.reject(&format!("0x{:02X} past the end at 0x{:08X}", opcode, address));
        }
        Ok(())
    }

    /// Check a data command that needs WEL, then clear WEL and go busy
    fn begin_write(&mut self, opcode: u8) -> bool {
        if !self.write_enabled {
            log::debug!("dummy: 0x{:02X} ignored, write enable latch clear", opcode);
            return false;
        }
        self.write_enabled = false;
        self.busy_polls = self.config.busy_polls;
        true
    }

    fn status1(&mut self) -> u8 {
        let mut sr1 = self.status_reg1;
        if self.write_enabled {
            sr1 |= opcodes::SR1_WEL;
        }
        if self.faults.stuck_busy || self.busy_polls > 0 {
            sr1 |= opcodes::SR1_WIP;
            self.busy_polls = self.busy_polls.saturating_sub(1);
        }
        sr1
    }

    fn write_status(&mut self, opcode: u8, tx: &[u8]) -> Result<(), BusError> {
        if !self.begin_write(opcode) || self.faults.stuck_status {
            return Ok(());
        }
        match (opcode, tx) {
            (opcodes::WRSR, [sr1]) => self.status_reg1 = *sr1,
            (opcodes::WRSR, [sr1, sr2, ..]) => {
                self.status_reg1 = *sr1;
                self.status_reg2 = *sr2;
            }
            (opcodes::WRSR2 | opcodes::WRSR2_ALT, [sr2, ..]) => self.status_reg2 = *sr2,
            _ => return self.reject(&format!("status write 0x{:02X}", opcode)),
        }
        Ok(())
    }

    fn write_any_register(&mut self, address: Option<u32>, tx: &[u8]) -> Result<(), BusError> {
        if !self.begin_write(opcodes::WRAR) {
            return Ok(());
        }
        let Some(&value) = tx.first() else {
            return self.reject("empty register write");
        };
        self.registers.insert((opcodes::RDAR, address), value);
        if self.config.qpi && address == Some(opcodes::CR2V_ADDR) && value & 0x40 != 0 {
            self.qpi = true;
        }
        Ok(())
    }

    fn write_enhanced_config(&mut self, tx: &[u8]) -> Result<(), BusError> {
        if !self.begin_write(opcodes::WRVECR) {
            return Ok(());
        }
        let Some(&value) = tx.first() else {
            return self.reject("empty register write");
        };
        self.registers.insert((opcodes::RDAR, None), value);
        if self.config.qpi && value & 0x80 != 0 {
            self.qpi = true;
        }
        Ok(())
    }

    fn erase(&mut self, opcode: u8, size: u32, address: Option<u32>) -> Result<(), BusError> {
        let Some(address) = address else {
            return self.reject(&format!("erase 0x{:02X} without address", opcode));
        };
        self.check_array_address(opcode, address, size as usize)?;
        if address % size != 0 {
            return self.reject(&format!("erase 0x{:02X} at unaligned 0x{:08X}", opcode, address));
        }
        if self.begin_write(opcode) {
            let start = address as usize;
            self.data[start..start + size as usize].fill(0xFF);
        }
        Ok(())
    }

    fn soft_reset(&mut self) {
        self.qpi = false;
        self.in_4byte_mode = self.config.four_byte == FourByteMode::Native;
        self.write_enabled = false;
        self.busy_polls = 0;
        self.resets += 1;
    }

    fn read_sfdp(&mut self, address: u32, buf: &mut [u8]) -> Result<(), BusError> {
        let expected = BusFormat::single(AddressSize::ThreeByte)
            .with_dummy_cycles(opcodes::RDSFDP_DUMMY_CYCLES);
        if self.qpi || self.format != expected {
            return self.reject("RDSFDP");
        }
        let start = address as usize;
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = self.config.sfdp.get(start + i).copied().unwrap_or(0xFF);
        }
        Ok(())
    }

    fn read_array(&mut self, opcode: u8, address: u32, buf: &mut [u8]) -> Result<(), BusError> {
        let op = if opcode == opcodes::READ && !self.qpi {
            Some(ReadOp {
                mode: IoMode::Single,
                opcode,
                dummy_cycles: 0,
            })
        } else {
            let qpi = self.qpi;
            self.config
                .read_ops
                .iter()
                .copied()
                .find(|op| op.opcode == opcode && (op.mode == IoMode::Qpi) == qpi)
        };
        let Some(op) = op else {
            return self.reject(&format!("unknown read 0x{:02X}", opcode));
        };

        let format = self.format;
        if format.instruction_width != op.mode.instruction_width()
            || format.address_width != op.mode.address_width()
            || format.data_width != op.mode.data_width()
            || format.dummy_cycles != op.dummy_cycles
        {
            return self.reject(&format!("read 0x{:02X} as {}", opcode, op.mode));
        }
        self.check_instruction_width(opcode)?;
        self.check_array_address(opcode, address, buf.len())?;

        let start = address as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }
}

impl QspiBus for DummyQspiFlash {
    fn configure_format(&mut self, format: &BusFormat) -> Result<(), BusError> {
        self.events.push(BusEvent::Configure(*format));
        self.format = *format;
        Ok(())
    }

    fn set_frequency(&mut self, hz: u32) -> Result<(), BusError> {
        self.events.push(BusEvent::Frequency(hz));
        self.frequency = Some(hz);
        Ok(())
    }

    fn command_transfer(
        &mut self,
        opcode: u8,
        address: Option<u32>,
        tx: &[u8],
        rx: &mut [u8],
    ) -> Result<(), BusError> {
        self.events.push(BusEvent::Command {
            opcode,
            address,
            tx: tx.to_vec(),
            rx_len: rx.len(),
        });
        self.check_fault(opcode)?;
        self.check_instruction_width(opcode)?;

        if opcode != opcodes::RST {
            self.reset_enabled = false;
        }

        match opcode {
            opcodes::WREN => {
                if !self.faults.stuck_wel {
                    self.write_enabled = true;
                }
            }
            opcodes::RDSR => {
                let sr1 = self.status1();
                rx.fill(sr1);
            }
            opcodes::RDSR2
                if !rx.is_empty()
                    && matches!(
                        self.config.quad_enable,
                        QuadEnableRequirement::Sr2Bit1 | QuadEnableRequirement::Sr2Bit1NoClear
                    ) =>
            {
                return self.reject("RDSR2 on a part without a status register 2 read");
            }
            opcodes::RDSR2 if !rx.is_empty() => rx.fill(self.status_reg2),
            opcodes::RDSR2_ALT => rx.fill(self.status_reg2),
            opcodes::WRSR | opcodes::WRSR2 | opcodes::WRSR2_ALT => self.write_status(opcode, tx)?,
            opcodes::EQIO_38 | opcodes::EQIO_35 if rx.is_empty() && self.config.qpi => {
                self.qpi = true;
            }
            opcodes::RDAR => {
                let value = self.registers.get(&(opcode, address)).copied().unwrap_or(0);
                rx.fill(value);
            }
            opcodes::WRAR => self.write_any_register(address, tx)?,
            opcodes::WRVECR => self.write_enhanced_config(tx)?,
            opcodes::EN4B if self.config.four_byte != FourByteMode::Never => {
                self.in_4byte_mode = true;
            }
            opcodes::RSTEN => self.reset_enabled = true,
            opcodes::RST => {
                if self.reset_enabled {
                    self.soft_reset();
                }
                self.reset_enabled = false;
            }
            _ => {
                if let Some(size) = self.erase_size(opcode) {
                    return self.erase(opcode, size, address);
                }
                match self.registers.get(&(opcode, address)).copied() {
                    Some(value) => rx.fill(value),
                    None => return self.reject(&format!("unknown command 0x{:02X}", opcode)),
                }
            }
        }
        Ok(())
    }

    fn read(&mut self, opcode: u8, address: u32, buf: &mut [u8]) -> Result<(), BusError> {
        self.events.push(BusEvent::Read {
            opcode,
            address,
            len: buf.len(),
        });
        self.check_fault(opcode)?;
        self.reset_enabled = false;

        if opcode == opcodes::RDSFDP {
            self.read_sfdp(address, buf)
        } else {
            self.read_array(opcode, address, buf)
        }
    }

    fn write(&mut self, opcode: u8, address: u32, data: &[u8]) -> Result<(), BusError> {
        self.events.push(BusEvent::Write {
            opcode,
            address,
            len: data.len(),
        });
        self.check_fault(opcode)?;
        self.check_instruction_width(opcode)?;
        self.reset_enabled = false;

        if opcode != opcodes::PP {
            return self.reject(&format!("unknown write 0x{:02X}", opcode));
        }
        self.check_array_address(opcode, address, data.len())?;

        let page = self.config.page_size;
        let page_end = (address / page + 1) * page;
        if address as u64 + data.len() as u64 > page_end as u64 {
            return self.reject(&format!("program across page end at 0x{:08X}", address));
        }

        if self.begin_write(opcode) {
            // Programming only clears bits
            let start = address as usize;
            for (cell, &byte) in self.data[start..start + data.len()].iter_mut().zip(data) {
                *cell &= byte;
            }
        }
        Ok(())
    }

    fn delay_us(&mut self, us: u32) {
        self.elapsed_us += us as u64;
    }
}
