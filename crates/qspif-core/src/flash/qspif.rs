//! SFDP-discovering QSPI NOR block device

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::bus::{opcodes, AddressSize, BusFormat, BusWidth, QspiBus};
use crate::error::{Error, Result};
use crate::geometry::{BusMode, Geometry, RegionMap};
use crate::protocol::{self, Session};
use crate::sfdp::{self, AddressEntry, ReadMode, SoftResetSupport};

use super::{BlockDevice, QspifConfig};

/// Device setup steps decided during discovery
#[derive(Debug, Clone, Copy)]
struct DeviceSetup {
    read_mode: ReadMode,
    address_entry: AddressEntry,
    soft_reset: SoftResetSupport,
}

struct State<B> {
    session: Session<B>,
    geometry: Option<Geometry>,
    soft_reset: SoftResetSupport,
}

/// Block device for a serial NOR flash behind a quad-SPI controller
///
/// The part is not known in advance: [`init`](BlockDevice::init) reads the
/// SFDP tables, builds the [`Geometry`] and puts the device into the
/// fastest read mode it declares.
///
/// Every operation runs with the internal mutex held for its whole
/// duration, including every write-enable and ready poll. `M` selects the
/// mutex flavour. `NoopRawMutex`, or `ThreadModeRawMutex` on Cortex-M, suits
/// a device owned by one task. `CriticalSectionRawMutex` masks interrupts
/// for as long as the lock is held, which for a chip erase can be the whole
/// erase timeout; only pick it when the device really is shared with an
/// interrupt handler.
///
/// # Warm restarts
///
/// `init` makes no assumption about the mode an earlier boot left the part
/// in. A 66h/99h reset is sent on one line, and again on four lines if the
/// SFDP signature still does not read back, before discovery starts.
///
/// # Erase failures
///
/// An erase request is checked against the geometry in full before the
/// first command is sent. A device failure halfway through still leaves the
/// range partially erased; the caller has to erase the whole range again.
pub struct QspifBlockDevice<M: RawMutex, B> {
    state: Mutex<M, RefCell<State<B>>>,
    config: QspifConfig,
}

impl<M: RawMutex, B: QspiBus> QspifBlockDevice<M, B> {
    /// Create a device on top of `bus`
    ///
    /// Nothing is sent on the bus until [`init`](BlockDevice::init).
    pub fn new(bus: B, config: QspifConfig) -> Self {
        Self {
            state: Mutex::new(RefCell::new(State {
                session: Session::new(bus),
                geometry: None,
                soft_reset: SoftResetSupport::default(),
            })),
            config,
        }
    }

    /// Driver configuration
    pub fn config(&self) -> &QspifConfig {
        &self.config
    }

    /// Check if `init` has succeeded and `deinit` has not been called since
    pub fn is_initialized(&self) -> bool {
        self.with_state(|state| state.geometry.is_some())
    }

    /// Snapshot of the discovered geometry
    pub fn geometry(&self) -> Option<Geometry> {
        self.with_state(|state| state.geometry.clone())
    }

    /// Destroy the device and hand back the bus adapter
    pub fn free(self) -> B {
        self.state.into_inner().into_inner().session.into_inner()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State<B>) -> R) -> R {
        self.state.lock(|cell| {
            let mut state = cell.borrow_mut();
            f(&mut *state)
        })
    }

    fn with_geometry<R>(
        &self,
        f: impl FnOnce(&mut Session<B>, &Geometry) -> Result<R>,
    ) -> Result<R> {
        self.with_state(|state| {
            let Some(geometry) = state.geometry.as_ref() else {
                log::error!("Block device used before init");
                return Err(Error::NotReady);
            };
            f(&mut state.session, geometry)
        })
    }
}

impl<M: RawMutex, B: QspiBus> BlockDevice for QspifBlockDevice<M, B> {
    fn init(&self) -> Result<()> {
        self.with_state(|state| {
            if state.geometry.is_some() {
                log::debug!("Block device already initialized");
                return Ok(());
            }

            recover(&mut state.session, self.config.reset_recovery_us);
            let (geometry, setup) = discover(&mut state.session)?;
            if let Err(e) = configure(&mut state.session, &setup, &self.config) {
                // Undo any QPI or 4-byte mode entered before the failure
                if let Err(reset_err) =
                    protocol::reset_device(&mut state.session, self.config.reset_recovery_us)
                {
                    log::warn!("Reset after failed setup failed: {}", reset_err);
                }
                state.session.reset();
                return Err(e);
            }

            log::info!(
                "QSPI flash ready: {} bytes, {} byte pages, {} region(s), read mode {}",
                geometry.device_size(),
                geometry.page_size(),
                geometry.regions().len(),
                geometry.bus_mode().read_mode
            );
            state.soft_reset = setup.soft_reset;
            state.geometry = Some(geometry);
            Ok(())
        })
    }

    fn deinit(&self) -> Result<()> {
        self.with_state(|state| {
            if state.geometry.take().is_none() {
                return Ok(());
            }

            // Leave the device in 1-1-1 mode with 3-byte addresses
            if let Err(e) = protocol::soft_reset(
                &mut state.session,
                state.soft_reset,
                self.config.reset_recovery_us,
            ) {
                log::warn!("Soft reset during deinit failed: {}", e);
            }
            state.session.reset();
            Ok(())
        })
    }

    fn read(&self, buffer: &mut [u8], address: u32, size: u32) -> Result<()> {
        self.with_geometry(|session, geometry| {
            let buffer = buffer
                .get_mut(..size as usize)
                .ok_or(Error::BufferTooSmall)?;
            geometry.check_range(address, buffer.len())?;
            if buffer.is_empty() {
                return Ok(());
            }

            let mode = geometry.bus_mode();
            session.read(&mode.read_format(), mode.read_opcode, address, buffer)
        })
    }

    fn program(&self, buffer: &[u8], address: u32, size: u32) -> Result<()> {
        self.with_geometry(|session, geometry| {
            let data = buffer.get(..size as usize).ok_or(Error::BufferTooSmall)?;
            geometry.check_range(address, data.len())?;

            let page_size = geometry.page_size();
            if address % page_size != 0 || size % page_size != 0 {
                log::error!(
                    "Program of {} bytes at 0x{:08X} not aligned to {} byte pages",
                    size,
                    address,
                    page_size
                );
                return Err(Error::InvalidAlignment);
            }

            let timing = self.config.timing();
            let opcode = geometry.bus_mode().program_opcode;
            let mut page_address = address;
            for page in data.chunks(page_size as usize) {
                protocol::program_page(
                    session,
                    opcode,
                    page_address,
                    page,
                    &timing,
                    self.config.program_timeout_us,
                )?;
                page_address += page_size;
            }
            Ok(())
        })
    }

    fn erase(&self, address: u32, size: u32) -> Result<()> {
        self.with_geometry(|session, geometry| {
            let plan = geometry.plan_erase(address, size)?;
            let count = plan.validate()?;
            log::debug!(
                "Erasing {} bytes at 0x{:08X} with {} command(s)",
                size,
                address,
                count
            );

            let timing = self.config.timing();
            for command in plan {
                let command = command?;
                let timeout_us = self.config.erase_timeout(command.size);
                protocol::erase_block(session, &command, &timing, timeout_us).map_err(|e| {
                    log::error!(
                        "Erase aborted at 0x{:08X}, range 0x{:08X}+{} partially erased",
                        command.address,
                        address,
                        size
                    );
                    e
                })?;
            }
            Ok(())
        })
    }

    fn read_size(&self) -> Result<u32> {
        self.with_geometry(|_, _| Ok(1))
    }

    fn program_size(&self) -> Result<u32> {
        self.with_geometry(|_, geometry| Ok(geometry.page_size()))
    }

    fn erase_size(&self) -> Result<u32> {
        self.with_geometry(|_, geometry| Ok(geometry.erase_size()))
    }

    fn erase_size_at(&self, address: u32) -> Result<u32> {
        self.with_geometry(|_, geometry| geometry.erase_size_at(address))
    }

    fn size(&self) -> Result<u32> {
        self.with_geometry(|_, geometry| Ok(geometry.device_size()))
    }
}

/// Read the SFDP tables and build the geometry
///
/// Nothing but SFDP reads and sector map detection commands reach the
/// device here.
fn discover<B: QspiBus>(session: &mut Session<B>) -> Result<(Geometry, DeviceSetup)> {
    let info = sfdp::probe(session)?;
    let params = &info.basic_params;

    let device_size = u32::try_from(params.density_bytes).map_err(|_| {
        log::error!(
            "Device size {} exceeds the 32-bit address space",
            params.density_bytes
        );
        Error::CapacityExceeded
    })?;

    let regions = match &info.sector_map {
        Some(map) => map.resolve(session, device_size)?,
        None => RegionMap::uniform(device_size, params.erase_types.supported())?,
    };

    let read_mode = sfdp::select_read_mode(params);
    let address_entry = params.address_entry()?;
    let command_width = if read_mode.qpi_enable.is_some() {
        BusWidth::Quad
    } else {
        BusWidth::Single
    };
    let bus_mode = BusMode {
        read_mode: read_mode.io_mode,
        read_opcode: read_mode.opcode,
        dummy_cycles: read_mode.dummy_cycles,
        address_size: address_entry.address_size(),
        command_width,
        program_opcode: opcodes::PP,
    };

    let geometry = Geometry::new(
        device_size,
        params.page_size,
        params.erase_types,
        params.legacy_erase,
        regions,
        bus_mode,
    )?;

    Ok((
        geometry,
        DeviceSetup {
            read_mode,
            address_entry,
            soft_reset: params.soft_reset,
        },
    ))
}

/// Bring the device back to 1-1-1 mode with 3-byte addresses
///
/// Errors are only logged; discovery reports a device that is still
/// unreachable.
fn recover<B: QspiBus>(session: &mut Session<B>, recovery_us: u32) {
    session.reset();
    if let Err(e) = protocol::reset_device(session, recovery_us) {
        log::debug!("Single line reset not accepted: {}", e);
    }

    let mut signature = [0u8; 4];
    if protocol::read_sfdp(session, 0, &mut signature).is_ok()
        && u32::from_le_bytes(signature) == sfdp::SFDP_SIGNATURE
    {
        return;
    }

    log::debug!("No SFDP signature, resetting in QPI mode");
    session.set_command_format(BusFormat::uniform(BusWidth::Quad, AddressSize::ThreeByte));
    if let Err(e) = protocol::reset_device(session, recovery_us) {
        log::debug!("QPI reset not accepted: {}", e);
    }
    session.reset();
}

/// Put the device into the mode chosen by [`discover`]
fn configure<B: QspiBus>(
    session: &mut Session<B>,
    setup: &DeviceSetup,
    config: &QspifConfig,
) -> Result<()> {
    let timing = config.timing();

    protocol::wait_ready(
        session,
        timing.poll_interval_us,
        timing.status_write_timeout_us,
    )?;

    let mode = &setup.read_mode;
    if mode.needs_quad_enable() {
        protocol::enable_quad(session, mode.quad_enable, &timing)?;
    }
    if let Some(sequence) = mode.qpi_enable {
        protocol::enable_qpi(session, sequence, mode.quad_enable, &timing)?;
    }
    protocol::enter_4byte(session, setup.address_entry, &timing)?;

    session.set_frequency(config.frequency_hz)
}
