//! QSPI NOR command sequences
//!
//! Each function runs one multi-step sequence against the device through a
//! [`Session`]. Program, erase and status writes all follow the same
//! pattern: write enable with a latch poll, the transfer itself, then a
//! ready poll. Nothing here retries on failure.

use crate::bus::{opcodes, AddressSize, BusFormat, BusWidth, QspiBus};
use crate::error::{Error, Result};
use crate::geometry::EraseCommand;
use crate::sfdp::{AddressEntry, QpiEnableSequence, QuadEnableRequirement, SoftResetSupport};

use super::Session;

/// Poll budgets shared by the write-enable and status-write sequences
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Delay between two status register polls
    pub poll_interval_us: u32,
    /// Number of status polls waiting for the write enable latch
    pub write_enable_polls: u32,
    /// Budget for a status or configuration register write to complete
    pub status_write_timeout_us: u32,
}

/// Read a one-byte register with the command format
pub fn read_register<B: QspiBus>(session: &mut Session<B>, opcode: u8) -> Result<u8> {
    let mut buf = [0u8; 1];
    session.command(opcode, None, &[], &mut buf)?;
    Ok(buf[0])
}

/// Read the status register 1
pub fn read_status1<B: QspiBus>(session: &mut Session<B>) -> Result<u8> {
    read_register(session, opcodes::RDSR)
}

/// Send Write Enable and wait for the latch to set
///
/// # Errors
/// `WriteEnableFailed` if WEL is still clear after the poll budget
pub fn write_enable<B: QspiBus>(session: &mut Session<B>, timing: &Timing) -> Result<()> {
    session.command(opcodes::WREN, None, &[], &mut [])?;

    for _ in 0..timing.write_enable_polls.max(1) {
        if read_status1(session)? & opcodes::SR1_WEL != 0 {
            return Ok(());
        }
        session.delay_us(timing.poll_interval_us);
    }

    log::error!(
        "Write enable latch not set after {} polls",
        timing.write_enable_polls.max(1)
    );
    Err(Error::WriteEnableFailed)
}

/// Wait for the WIP (Write In Progress) bit to clear
///
/// # Arguments
/// * `poll_delay_us` - Delay in microseconds between status register polls
/// * `timeout_us` - Maximum time to wait before returning `ReadyFailed`
pub fn wait_ready<B: QspiBus>(
    session: &mut Session<B>,
    poll_delay_us: u32,
    timeout_us: u32,
) -> Result<()> {
    let max_polls = if poll_delay_us > 0 {
        timeout_us / poll_delay_us
    } else {
        timeout_us
    };

    for _ in 0..max_polls.max(1) {
        if read_status1(session)? & opcodes::SR1_WIP == 0 {
            return Ok(());
        }
        session.delay_us(poll_delay_us);
    }

    log::error!("Device still busy after {} us", timeout_us);
    Err(Error::ReadyFailed)
}

/// Program up to one page
///
/// The data must not cross a page boundary.
pub fn program_page<B: QspiBus>(
    session: &mut Session<B>,
    opcode: u8,
    address: u32,
    data: &[u8],
    timing: &Timing,
    timeout_us: u32,
) -> Result<()> {
    write_enable(session, timing)?;
    session.write(opcode, address, data)?;
    wait_ready(session, timing.poll_interval_us, timeout_us)
}

/// Run a single erase command
pub fn erase_block<B: QspiBus>(
    session: &mut Session<B>,
    command: &EraseCommand,
    timing: &Timing,
    timeout_us: u32,
) -> Result<()> {
    write_enable(session, timing)?;
    session.command(command.opcode, Some(command.address), &[], &mut [])?;
    wait_ready(session, timing.poll_interval_us, timeout_us)
}

/// Read raw SFDP data
///
/// RDSFDP is always issued 1-1-1 with a 3-byte address and 8 dummy cycles.
pub fn read_sfdp<B: QspiBus>(session: &mut Session<B>, address: u32, buf: &mut [u8]) -> Result<()> {
    let format =
        BusFormat::single(AddressSize::ThreeByte).with_dummy_cycles(opcodes::RDSFDP_DUMMY_CYCLES);
    session.read(&format, opcodes::RDSFDP, address, buf)
}

/// Write a status or configuration register and wait for completion
fn write_register<B: QspiBus>(
    session: &mut Session<B>,
    opcode: u8,
    address: Option<u32>,
    data: &[u8],
    timing: &Timing,
) -> Result<()> {
    write_enable(session, timing)?;
    session.command(opcode, address, data, &mut [])?;
    wait_ready(
        session,
        timing.poll_interval_us,
        timing.status_write_timeout_us,
    )
}

// ============================================================================
// Quad Enable (QE) Functions
// ============================================================================

/// Register read opcode and bit holding QE for a requirement
///
/// `None` for parts without a readable QE register.
fn quad_enable_bit(requirement: QuadEnableRequirement) -> Option<(u8, u8)> {
    match requirement {
        QuadEnableRequirement::None
        | QuadEnableRequirement::Sr2Bit1
        | QuadEnableRequirement::Sr2Bit1NoClear => None,
        QuadEnableRequirement::Sr1Bit6 => Some((opcodes::RDSR, opcodes::SR1_QE_BIT6)),
        QuadEnableRequirement::Sr2Bit7 => Some((opcodes::RDSR2_ALT, opcodes::SR2_QE_BIT7)),
        QuadEnableRequirement::Sr2Bit1ReadSplit | QuadEnableRequirement::Sr2Bit1Cmd31 => {
            Some((opcodes::RDSR2, opcodes::SR2_QE))
        }
    }
}

/// Set the QE bit using the mechanism the device declares
///
/// Where status register 2 can be read the bit is checked first and read
/// back after writing. Parts declaring QER 001b or 100b have no 35h read,
/// so both registers are written with SR2 holding only QE.
///
/// # Errors
/// `ParsingFailed` if the bit does not stick
pub fn enable_quad<B: QspiBus>(
    session: &mut Session<B>,
    requirement: QuadEnableRequirement,
    timing: &Timing,
) -> Result<()> {
    if matches!(
        requirement,
        QuadEnableRequirement::Sr2Bit1 | QuadEnableRequirement::Sr2Bit1NoClear
    ) {
        let sr1 = read_status1(session)? & !(opcodes::SR1_WEL | opcodes::SR1_WIP);
        write_register(session, opcodes::WRSR, None, &[sr1, opcodes::SR2_QE], timing)?;
        log::debug!("Quad enable bit written ({:?})", requirement);
        return Ok(());
    }

    let Some((read_opcode, bit)) = quad_enable_bit(requirement) else {
        return Ok(());
    };

    let current = read_register(session, read_opcode)?;
    if current & bit != 0 {
        log::debug!("Quad enable bit already set");
        return Ok(());
    }

    match requirement {
        QuadEnableRequirement::Sr2Bit1ReadSplit => {
            let sr1 = read_status1(session)?;
            write_register(session, opcodes::WRSR, None, &[sr1, current | bit], timing)?;
        }
        QuadEnableRequirement::Sr1Bit6 => {
            write_register(session, opcodes::WRSR, None, &[current | bit], timing)?;
        }
        QuadEnableRequirement::Sr2Bit7 => {
            write_register(session, opcodes::WRSR2_ALT, None, &[current | bit], timing)?;
        }
        QuadEnableRequirement::Sr2Bit1Cmd31 => {
            write_register(session, opcodes::WRSR2, None, &[current | bit], timing)?;
        }
        QuadEnableRequirement::None
        | QuadEnableRequirement::Sr2Bit1
        | QuadEnableRequirement::Sr2Bit1NoClear => {}
    }

    if read_register(session, read_opcode)? & bit == 0 {
        log::error!("Quad enable bit did not set ({:?})", requirement);
        return Err(Error::ParsingFailed);
    }

    log::debug!("Quad enable bit set ({:?})", requirement);
    Ok(())
}

// ============================================================================
// QPI Mode Functions
// ============================================================================

/// Put the device into QPI (4-4-4) mode
///
/// Uses the first declared sequence. On success every later command is
/// sent with all phases on four lines.
///
/// # Errors
/// `ParsingFailed` if no sequence is declared
pub fn enable_qpi<B: QspiBus>(
    session: &mut Session<B>,
    sequence: QpiEnableSequence,
    quad_enable: QuadEnableRequirement,
    timing: &Timing,
) -> Result<()> {
    if sequence.supports(QpiEnableSequence::QE_THEN_38) {
        enable_quad(session, quad_enable, timing)?;
        session.command(opcodes::EQIO_38, None, &[], &mut [])?;
    } else if sequence.supports(QpiEnableSequence::INSTR_38) {
        session.command(opcodes::EQIO_38, None, &[], &mut [])?;
    } else if sequence.supports(QpiEnableSequence::INSTR_35) {
        session.command(opcodes::EQIO_35, None, &[], &mut [])?;
    } else if sequence.supports(QpiEnableSequence::CR_BIT6) {
        let read_format = BusFormat::single(AddressSize::ThreeByte)
            .with_dummy_cycles(opcodes::RDSFDP_DUMMY_CYCLES);
        let mut cr = [0u8; 1];
        session.command_with(
            &read_format,
            opcodes::RDAR,
            Some(opcodes::CR2V_ADDR),
            &[],
            &mut cr,
        )?;
        write_register(
            session,
            opcodes::WRAR,
            Some(opcodes::CR2V_ADDR),
            &[cr[0] | 0x40],
            timing,
        )?;
    } else if sequence.supports(QpiEnableSequence::ECR_BIT7) {
        let ecr = read_register(session, opcodes::RDAR)?;
        write_register(session, opcodes::WRVECR, None, &[ecr | 0x80], timing)?;
    } else {
        log::error!("No QPI enable sequence declared");
        return Err(Error::ParsingFailed);
    }

    let address_size = session.command_format().address_size;
    session.set_command_format(BusFormat::uniform(BusWidth::Quad, address_size));
    log::debug!("Entered QPI mode");
    Ok(())
}

// ============================================================================
// Address mode and reset
// ============================================================================

/// Switch the device to the address size `entry` calls for
pub fn enter_4byte<B: QspiBus>(
    session: &mut Session<B>,
    entry: AddressEntry,
    timing: &Timing,
) -> Result<()> {
    match entry {
        AddressEntry::ThreeByte | AddressEntry::Native4Byte => {}
        AddressEntry::EnterB7 => {
            session.command(opcodes::EN4B, None, &[], &mut [])?;
        }
        AddressEntry::WriteEnableB7 => {
            write_enable(session, timing)?;
            session.command(opcodes::EN4B, None, &[], &mut [])?;
        }
    }

    let mut format = session.command_format();
    format.address_size = entry.address_size();
    session.set_command_format(format);
    if entry != AddressEntry::ThreeByte {
        log::debug!("Using 4-byte addresses ({:?})", entry);
    }
    Ok(())
}

/// Send 66h/99h in the current command format and wait `recovery_us`
///
/// Parts without this reset ignore both instructions.
pub fn reset_device<B: QspiBus>(session: &mut Session<B>, recovery_us: u32) -> Result<()> {
    session.command(opcodes::RSTEN, None, &[], &mut [])?;
    session.command(opcodes::RST, None, &[], &mut [])?;
    session.delay_us(recovery_us);
    Ok(())
}

/// Send the 66h/99h software reset if the device declares it
///
/// Returns whether a reset was issued.
pub fn soft_reset<B: QspiBus>(
    session: &mut Session<B>,
    support: SoftResetSupport,
    recovery_us: u32,
) -> Result<bool> {
    if !support.supports_66_99() {
        log::debug!("Soft reset 66h/99h not supported, skipping");
        return Ok(false);
    }

    reset_device(session, recovery_us)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusError, IoMode};
    use std::vec::Vec;

    const TIMING: Timing = Timing {
        poll_interval_us: 10,
        write_enable_polls: 4,
        status_write_timeout_us: 100,
    };

    /// Minimal status register model
    #[derive(Default)]
    struct MockBus {
        sr1: u8,
        sr2: u8,
        cr2: u8,
        busy_polls: u32,
        ignore_wren: bool,
        ignore_status_write: bool,
        formats: Vec<BusFormat>,
        opcodes: Vec<u8>,
        writes: Vec<(u8, Vec<u8>)>,
    }

    impl QspiBus for MockBus {
        fn configure_format(&mut self, format: &BusFormat) -> core::result::Result<(), BusError> {
            self.formats.push(*format);
            Ok(())
        }

        fn set_frequency(&mut self, _hz: u32) -> core::result::Result<(), BusError> {
            Ok(())
        }

        fn command_transfer(
            &mut self,
            opcode: u8,
            _address: Option<u32>,
            tx: &[u8],
            rx: &mut [u8],
        ) -> core::result::Result<(), BusError> {
            self.opcodes.push(opcode);
            match opcode {
                opcodes::WREN if !self.ignore_wren => self.sr1 |= opcodes::SR1_WEL,
                opcodes::RDSR => {
                    if self.busy_polls > 0 {
                        self.busy_polls -= 1;
                        rx[0] = self.sr1 | opcodes::SR1_WIP;
                    } else {
                        rx[0] = self.sr1;
                    }
                }
                opcodes::RDSR2 | opcodes::RDSR2_ALT => rx[0] = self.sr2,
                opcodes::RDAR => rx[0] = self.cr2,
                opcodes::WRSR | opcodes::WRSR2 | opcodes::WRSR2_ALT | opcodes::WRAR => {
                    self.writes.push((opcode, tx.to_vec()));
                    if !self.ignore_status_write {
                        match (opcode, tx) {
                            (opcodes::WRSR, [sr1]) => self.sr1 = *sr1,
                            (opcodes::WRSR, [sr1, sr2]) => {
                                self.sr1 = *sr1;
                                self.sr2 = *sr2;
                            }
                            (opcodes::WRAR, [cr]) => self.cr2 = *cr,
                            (_, [sr2]) => self.sr2 = *sr2,
                            _ => {}
                        }
                    }
                    self.sr1 &= !opcodes::SR1_WEL;
                }
                _ => {}
            }
            Ok(())
        }

        fn read(&mut self, opcode: u8, _address: u32, buf: &mut [u8]) -> core::result::Result<(), BusError> {
            self.opcodes.push(opcode);
            buf.fill(0xFF);
            Ok(())
        }

        fn write(&mut self, opcode: u8, _address: u32, data: &[u8]) -> core::result::Result<(), BusError> {
            self.writes.push((opcode, data.to_vec()));
            self.sr1 &= !opcodes::SR1_WEL;
            Ok(())
        }

        fn delay_us(&mut self, _us: u32) {}
    }

    #[test]
    fn test_write_enable() {
        let mut session = Session::new(MockBus::default());
        assert!(write_enable(&mut session, &TIMING).is_ok());
        assert_eq!(session.bus().opcodes[..2], [opcodes::WREN, opcodes::RDSR]);
    }

    #[test]
    fn test_write_enable_stuck() {
        let mut session = Session::new(MockBus {
            ignore_wren: true,
            ..Default::default()
        });
        assert_eq!(
            write_enable(&mut session, &TIMING),
            Err(Error::WriteEnableFailed)
        );
        // One WREN and exactly the poll budget of status reads
        let rdsr = session
            .bus()
            .opcodes
            .iter()
            .filter(|&&op| op == opcodes::RDSR)
            .count();
        assert_eq!(rdsr, TIMING.write_enable_polls as usize);
    }

    #[test]
    fn test_program_page_not_issued_without_wel() {
        let mut session = Session::new(MockBus {
            ignore_wren: true,
            ..Default::default()
        });
        let result = program_page(&mut session, opcodes::PP, 0, &[1, 2, 3], &TIMING, 100);
        assert_eq!(result, Err(Error::WriteEnableFailed));
        assert!(session.bus().writes.is_empty());
    }

    #[test]
    fn test_wait_ready() {
        let mut session = Session::new(MockBus {
            busy_polls: 3,
            ..Default::default()
        });
        assert!(wait_ready(&mut session, 10, 100).is_ok());

        session.bus_mut().busy_polls = 100;
        assert_eq!(wait_ready(&mut session, 10, 100), Err(Error::ReadyFailed));
    }

    #[test]
    fn test_enable_quad_sr2_bit1() {
        let mut session = Session::new(MockBus {
            sr1: 0x1C,
            ..Default::default()
        });
        enable_quad(&mut session, QuadEnableRequirement::Sr2Bit1, &TIMING).unwrap();
        assert_eq!(session.bus().sr2, opcodes::SR2_QE);
        assert_eq!(session.bus().writes, [(opcodes::WRSR, std::vec![0x1C, 0x02])]);
        // These parts have no status register 2 read
        assert!(!session.bus().opcodes.contains(&opcodes::RDSR2));
    }

    #[test]
    fn test_enable_quad_without_sr2_read_always_writes() {
        // QE already set is invisible without 35h, so the write still happens
        let mut session = Session::new(MockBus {
            sr2: opcodes::SR2_QE | 0x40,
            ..Default::default()
        });
        enable_quad(&mut session, QuadEnableRequirement::Sr2Bit1NoClear, &TIMING).unwrap();
        assert_eq!(session.bus().writes, [(opcodes::WRSR, std::vec![0x00, 0x02])]);
        assert!(!session.bus().opcodes.contains(&opcodes::RDSR2));
    }

    #[test]
    fn test_enable_quad_read_split_checks_sr2() {
        let mut session = Session::new(MockBus {
            sr1: 0x04,
            sr2: 0x40,
            ..Default::default()
        });
        enable_quad(&mut session, QuadEnableRequirement::Sr2Bit1ReadSplit, &TIMING).unwrap();
        assert_eq!(session.bus().writes, [(opcodes::WRSR, std::vec![0x04, 0x42])]);
        assert_eq!(
            session
                .bus()
                .opcodes
                .iter()
                .filter(|&&op| op == opcodes::RDSR2)
                .count(),
            2
        );
    }

    #[test]
    fn test_enable_quad_cmd31_and_bit7() {
        let mut session = Session::new(MockBus::default());
        enable_quad(&mut session, QuadEnableRequirement::Sr2Bit1Cmd31, &TIMING).unwrap();
        assert_eq!(session.bus().writes[0].0, opcodes::WRSR2);

        let mut session = Session::new(MockBus::default());
        enable_quad(&mut session, QuadEnableRequirement::Sr2Bit7, &TIMING).unwrap();
        assert_eq!(session.bus().writes[0], (opcodes::WRSR2_ALT, std::vec![0x80]));
    }

    #[test]
    fn test_enable_quad_already_set() {
        let mut session = Session::new(MockBus {
            sr1: opcodes::SR1_QE_BIT6,
            ..Default::default()
        });
        enable_quad(&mut session, QuadEnableRequirement::Sr1Bit6, &TIMING).unwrap();
        assert!(session.bus().writes.is_empty());
    }

    #[test]
    fn test_enable_quad_verify_fails() {
        let mut session = Session::new(MockBus {
            ignore_status_write: true,
            ..Default::default()
        });
        assert_eq!(
            enable_quad(&mut session, QuadEnableRequirement::Sr1Bit6, &TIMING),
            Err(Error::ParsingFailed)
        );
    }

    #[test]
    fn test_enable_qpi_switches_command_format() {
        let mut session = Session::new(MockBus::default());
        let sequence = QpiEnableSequence::from_bfpt(QpiEnableSequence::INSTR_38);
        enable_qpi(&mut session, sequence, QuadEnableRequirement::None, &TIMING).unwrap();
        assert!(session.bus().opcodes.contains(&opcodes::EQIO_38));
        assert_eq!(
            session.command_format(),
            BusFormat::uniform(BusWidth::Quad, AddressSize::ThreeByte)
        );

        // The next status read goes out on four lines
        read_status1(&mut session).unwrap();
        assert_eq!(session.bus().formats.last().unwrap().instruction_width, BusWidth::Quad);
    }

    #[test]
    fn test_enable_qpi_config_register() {
        let mut session = Session::new(MockBus::default());
        let sequence = QpiEnableSequence::from_bfpt(QpiEnableSequence::CR_BIT6);
        enable_qpi(&mut session, sequence, QuadEnableRequirement::None, &TIMING).unwrap();
        assert_eq!(session.bus().cr2, 0x40);

        let mut session = Session::new(MockBus::default());
        assert_eq!(
            enable_qpi(
                &mut session,
                QpiEnableSequence::default(),
                QuadEnableRequirement::None,
                &TIMING
            ),
            Err(Error::ParsingFailed)
        );
    }

    #[test]
    fn test_enter_4byte() {
        let mut session = Session::new(MockBus::default());
        enter_4byte(&mut session, AddressEntry::WriteEnableB7, &TIMING).unwrap();
        assert_eq!(session.bus().opcodes[0], opcodes::WREN);
        assert_eq!(*session.bus().opcodes.last().unwrap(), opcodes::EN4B);
        assert_eq!(session.command_format().address_size, AddressSize::FourByte);

        let mut session = Session::new(MockBus::default());
        enter_4byte(&mut session, AddressEntry::Native4Byte, &TIMING).unwrap();
        assert!(session.bus().opcodes.is_empty());
        assert_eq!(session.command_format().address_size, AddressSize::FourByte);
    }

    #[test]
    fn test_soft_reset() {
        let mut session = Session::new(MockBus::default());
        assert_eq!(soft_reset(&mut session, SoftResetSupport::default(), 50), Ok(false));
        assert!(session.bus().opcodes.is_empty());

        let support = SoftResetSupport::from_bfpt(SoftResetSupport::RESET_66_99);
        assert_eq!(soft_reset(&mut session, support, 50), Ok(true));
        assert_eq!(session.bus().opcodes, [opcodes::RSTEN, opcodes::RST]);
    }

    #[test]
    fn test_format_cache() {
        let mut session = Session::new(MockBus::default());
        read_status1(&mut session).unwrap();
        read_status1(&mut session).unwrap();
        assert_eq!(session.bus().formats.len(), 1);

        let quad_read = IoMode::QuadIo.format(AddressSize::ThreeByte, 6);
        session.read(&quad_read, 0xEB, 0, &mut [0u8; 4]).unwrap();
        read_status1(&mut session).unwrap();
        assert_eq!(session.bus().formats.len(), 3);

        session.reset();
        read_status1(&mut session).unwrap();
        assert_eq!(session.bus().formats.len(), 4);
    }
}
