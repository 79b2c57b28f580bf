//! End-to-end tests of `QspifBlockDevice` against the emulated flash

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use qspif_core::bus::{opcodes, AddressSize, BusFormat, IoMode};
use qspif_core::flash::{BlockDevice, QspifBlockDevice, QspifConfig};
use qspif_core::Error;
use qspif_dummy::{
    BusEvent, DummyConfig, DummyQspiFlash, Preset, SectorMapBuilder, HYBRID_DETECT_ADDR,
    HYBRID_DETECT_MASK,
};

const KIB: u32 = 1024;
const MIB: u32 = 1024 * KIB;

type Device<'a> = QspifBlockDevice<NoopRawMutex, &'a mut DummyQspiFlash>;

fn open(flash: &mut DummyQspiFlash) -> Device<'_> {
    QspifBlockDevice::new(flash, QspifConfig::default())
}

fn init(flash: &mut DummyQspiFlash) -> Device<'_> {
    let device = open(flash);
    device.init().unwrap();
    device
}

fn with_sfdp(preset: Preset, sfdp: Vec<u8>) -> DummyQspiFlash {
    DummyQspiFlash::new(DummyConfig {
        sfdp,
        ..preset.config()
    })
}

#[test]
fn test_hybrid_geometry() {
    let mut flash = DummyQspiFlash::preset(Preset::Hybrid16M);
    let device = init(&mut flash);

    let geometry = device.geometry().unwrap();
    assert_eq!(geometry.device_size(), 16 * MIB);
    assert_eq!(geometry.regions().len(), 2);
    assert_eq!(geometry.min_common_erase_size(), 64 * KIB);
    assert_eq!(device.size(), Ok(16 * MIB));
    assert_eq!(device.erase_size(), Ok(64 * KIB));
    assert_eq!(device.program_size(), Ok(256));
    assert_eq!(device.read_size(), Ok(1));

    assert_eq!(device.erase_size_at(0), Ok(4 * KIB));
    assert_eq!(device.erase_size_at(8 * MIB), Ok(4 * KIB));
    assert_eq!(device.erase_size_at(16 * MIB), Err(Error::AddressOutOfBounds));

    let flash = device.free();
    assert!(flash.quad_enabled());
    assert_eq!(flash.resets(), 1);
    assert_eq!(flash.frequency(), Some(QspifConfig::default().frequency_hz));
    assert_eq!(flash.violations(), 0);
}

#[test]
fn test_erase_prefers_largest_common_type() {
    let mut flash = DummyQspiFlash::preset(Preset::Hybrid16M);
    let device = init(&mut flash);

    device.erase(0, 128 * KIB).unwrap();

    let flash = device.free();
    assert_eq!(flash.erase_commands(), vec![(0xD8, 0), (0xD8, 0x10000)]);
}

#[test]
fn test_erase_mixes_types_and_crosses_regions() {
    let mut flash = DummyQspiFlash::preset(Preset::Hybrid16M);
    let device = init(&mut flash);

    device.erase(0xF000, 0x12000).unwrap();
    device.erase(8 * MIB - 4 * KIB, 40 * KIB).unwrap();

    let flash = device.free();
    assert_eq!(
        flash.erase_commands(),
        vec![
            (0x20, 0xF000),
            (0xD8, 0x10000),
            (0x20, 0x20000),
            (0x20, 0x7F_F000),
            (0x52, 0x80_0000),
            (0x20, 0x80_8000),
        ]
    );
    assert_eq!(flash.violations(), 0);
}

#[test]
fn test_erase_tiling_is_idempotent() {
    let start = 0x7E_0000;
    let len = 0x40000;

    let mut whole = DummyQspiFlash::preset(Preset::Hybrid16M);
    let device = init(&mut whole);
    device.erase(start, len).unwrap();
    let whole = device.free().erase_commands();

    let mut tiled = DummyQspiFlash::preset(Preset::Hybrid16M);
    let device = init(&mut tiled);
    for offset in (0..len).step_by(64 * KIB as usize) {
        device.erase(start + offset, 64 * KIB).unwrap();
    }
    let tiled = device.free().erase_commands();

    assert_eq!(whole.len(), 4);
    assert_eq!(whole, tiled);
}

#[test]
fn test_misaligned_erase_sends_nothing() {
    let mut flash = DummyQspiFlash::preset(Preset::Hybrid16M);
    let device = init(&mut flash);

    assert_eq!(device.erase(0x100, 4 * KIB), Err(Error::InvalidAlignment));
    // Aligned start, but the tail is not a whole sector
    assert_eq!(device.erase(0, 68 * KIB + 1), Err(Error::InvalidAlignment));
    assert_eq!(device.erase(16 * MIB - 4 * KIB, 8 * KIB), Err(Error::AddressOutOfBounds));

    let flash = device.free();
    assert!(flash.erase_commands().is_empty());
}

#[test]
fn test_program_read_round_trip() {
    let mut flash = DummyQspiFlash::preset(Preset::Hybrid16M);
    let device = init(&mut flash);

    let data: Vec<u8> = (0..768u32).map(|i| (i * 7 + 3) as u8).collect();
    device.erase(0x1000, 4 * KIB).unwrap();
    device.program(&data, 0x1100, data.len() as u32).unwrap();

    let mut readback = vec![0u8; data.len()];
    device.read(&mut readback, 0x1100, data.len() as u32).unwrap();
    assert_eq!(readback, data);

    // Unaligned reads are fine
    let mut tail = [0u8; 5];
    device.read(&mut tail, 0x1100 + 763, 5).unwrap();
    assert_eq!(tail, data[763..]);

    let flash = device.free();
    let writes = flash
        .events()
        .iter()
        .filter(|e| matches!(e, BusEvent::Write { len: 256, .. }))
        .count();
    assert_eq!(writes, 3);
    assert!(flash
        .events()
        .iter()
        .any(|e| matches!(e, BusEvent::Read { opcode: 0x6B, .. })));
    assert_eq!(flash.violations(), 0);
}

#[test]
fn test_program_checks_page_alignment_and_buffer() {
    let mut flash = DummyQspiFlash::preset(Preset::Uniform8M);
    let device = init(&mut flash);
    let data = [0u8; 512];

    assert_eq!(device.program(&data, 0x10, 256), Err(Error::InvalidAlignment));
    assert_eq!(device.program(&data, 0, 100), Err(Error::InvalidAlignment));
    assert_eq!(device.program(&data, 0, 1024), Err(Error::BufferTooSmall));
    assert_eq!(
        device.program(&data, 8 * MIB - 256, 512),
        Err(Error::AddressOutOfBounds)
    );

    let mut buf = [0u8; 16];
    assert_eq!(device.read(&mut buf, 0, 32), Err(Error::BufferTooSmall));
    assert_eq!(device.read(&mut buf, 8 * MIB - 8, 16), Err(Error::AddressOutOfBounds));
    assert_eq!(device.read(&mut buf, 0, 0), Ok(()));

    let flash = device.free();
    assert!(!flash
        .events()
        .iter()
        .any(|e| matches!(e, BusEvent::Write { .. })));
}

#[test]
fn test_bad_signature_stops_before_setup() {
    let sfdp = Preset::Uniform8M.sfdp().signature(0x1234_5678).build();
    let mut flash = with_sfdp(Preset::Uniform8M, sfdp);
    let device = open(&mut flash);

    assert_eq!(device.init(), Err(Error::ParsingFailed));
    assert!(!device.is_initialized());
    assert_eq!(device.size(), Err(Error::NotReady));

    let flash = device.free();
    let sfdp_format =
        BusFormat::single(AddressSize::ThreeByte).with_dummy_cycles(opcodes::RDSFDP_DUMMY_CYCLES);
    assert_eq!(flash.formats().last(), Some(&sfdp_format));
    assert!(flash
        .opcodes()
        .iter()
        .all(|op| [opcodes::RSTEN, opcodes::RST, opcodes::RDSFDP].contains(op)));
    assert!(!flash.is_qpi());
    assert_eq!(flash.frequency(), None);
}

#[test]
fn test_write_enable_never_latches() {
    let mut flash = DummyQspiFlash::preset(Preset::Uniform8M);
    flash.faults_mut().stuck_wel = true;
    let device = init(&mut flash);

    assert_eq!(device.program(&[0u8; 256], 0, 256), Err(Error::WriteEnableFailed));
    assert_eq!(device.erase(0, 4 * KIB), Err(Error::WriteEnableFailed));

    let flash = device.free();
    assert!(!flash
        .events()
        .iter()
        .any(|e| matches!(e, BusEvent::Write { .. })));
    assert!(flash.erase_commands().is_empty());
}

#[test]
fn test_stuck_busy_times_out() {
    let mut flash = DummyQspiFlash::preset(Preset::Uniform8M);
    flash.faults_mut().stuck_busy = true;
    let device = open(&mut flash);

    assert_eq!(device.init(), Err(Error::ReadyFailed));
    assert!(!device.is_initialized());

    let flash = device.free();
    let config = QspifConfig::default();
    let budget = config.status_write_timeout_us - config.poll_interval_us;
    assert!(flash.elapsed_us() >= budget as u64);
}

#[test]
fn test_failing_erase_reports_device_error() {
    let mut flash = DummyQspiFlash::preset(Preset::Uniform8M);
    flash.faults_mut().fail_opcode = Some(0xD8);
    let device = init(&mut flash);

    assert_eq!(device.erase(0, 192 * KIB), Err(Error::DeviceError));

    let flash = device.free();
    assert_eq!(flash.erase_commands(), vec![(0xD8, 0)]);
}

#[test]
fn test_uniform_selects_quad_io() {
    let mut flash = DummyQspiFlash::preset(Preset::Uniform8M);
    let device = init(&mut flash);

    let geometry = device.geometry().unwrap();
    let mode = geometry.bus_mode();
    assert_eq!(mode.read_mode, IoMode::QuadIo);
    assert_eq!(mode.read_opcode, 0xEB);
    assert_eq!(mode.dummy_cycles, 6);
    assert_eq!(geometry.regions().len(), 1);
    assert_eq!(device.erase_size(), Ok(64 * KIB));

    let mut buf = [0u8; 64];
    device.read(&mut buf, 0x100, 64).unwrap();
    assert_eq!(buf, [0xFF; 64]);

    let flash = device.free();
    // Only the reset sent before discovery; the tables declare none
    assert_eq!(flash.resets(), 1);
    assert_eq!(
        flash.opcodes().iter().filter(|&&op| op == opcodes::RSTEN).count(),
        1
    );
    assert_eq!(flash.violations(), 0);
}

#[test]
fn test_qpi_device_with_4byte_addresses() {
    let mut flash = DummyQspiFlash::preset(Preset::Qpi32M);
    let device = init(&mut flash);

    let geometry = device.geometry().unwrap();
    assert_eq!(geometry.bus_mode().read_mode, IoMode::Qpi);
    assert_eq!(geometry.bus_mode().address_size, AddressSize::FourByte);
    assert_eq!(device.erase_size_at(0), Ok(4 * KIB));

    let top = 32 * MIB - 64 * KIB;
    let data = [0x5Au8; 256];
    device.erase(top, 64 * KIB).unwrap();
    device.program(&data, top, 256).unwrap();
    let mut readback = [0u8; 256];
    device.read(&mut readback, top, 256).unwrap();
    assert_eq!(readback, data);

    let flash = device.free();
    assert!(flash.is_qpi());
    assert!(flash.is_4byte());
    assert!(flash.opcodes().contains(&opcodes::EN4B));
    assert_eq!(flash.erase_commands(), vec![(0xD8, top)]);
    assert_eq!(flash.violations(), 0);
}

#[test]
fn test_deinit_then_reinit() {
    let mut flash = DummyQspiFlash::preset(Preset::Qpi32M);
    let device = init(&mut flash);

    device.deinit().unwrap();
    assert!(!device.is_initialized());
    assert_eq!(device.size(), Err(Error::NotReady));
    assert_eq!(device.deinit(), Ok(()));

    device.init().unwrap();
    assert_eq!(device.size(), Ok(32 * MIB));

    let flash = device.free();
    // One reset before each discovery and one from deinit
    assert_eq!(flash.resets(), 3);
    assert!(flash.is_qpi());
    assert_eq!(flash.violations(), 0);
}

#[test]
fn test_init_recovers_device_left_in_qpi() {
    let mut flash = DummyQspiFlash::preset(Preset::Qpi32M);
    flash.set_warm_state(true, true);
    let device = init(&mut flash);

    assert_eq!(device.size(), Ok(32 * MIB));
    let data = [0xA5u8; 256];
    device.program(&data, 0, 256).unwrap();
    let mut readback = [0u8; 256];
    device.read(&mut readback, 0, 256).unwrap();
    assert_eq!(readback, data);

    let flash = device.free();
    // The single line reset and SFDP read go unanswered, the QPI reset lands
    assert_eq!(flash.resets(), 1);
    assert_eq!(flash.violations(), 2);
    assert!(flash.is_qpi());
    assert!(flash.is_4byte());
}

#[test]
fn test_init_recovers_device_left_in_4byte_mode() {
    let mut flash = DummyQspiFlash::preset(Preset::Hybrid16M);
    flash.set_warm_state(false, true);
    let device = init(&mut flash);

    assert_eq!(device.size(), Ok(16 * MIB));
    let flash = device.free();
    assert!(!flash.is_4byte());
    assert_eq!(flash.violations(), 0);
}

#[test]
fn test_failed_setup_leaves_qpi_mode() {
    let mut flash = DummyQspiFlash::preset(Preset::Qpi32M);
    flash.faults_mut().fail_opcode = Some(opcodes::EN4B);
    let device = open(&mut flash);

    assert_eq!(device.init(), Err(Error::DeviceError));
    assert!(!device.is_initialized());

    let flash = device.free();
    assert!(!flash.is_qpi());
    assert!(flash.frequency().is_none());
    assert_eq!(flash.violations(), 0);

    flash.faults_mut().fail_opcode = None;
    let device = init(flash);
    assert_eq!(device.size(), Ok(32 * MIB));
    assert_eq!(device.free().violations(), 0);
}

#[test]
fn test_second_init_is_silent() {
    let mut once = DummyQspiFlash::preset(Preset::Hybrid16M);
    let device = init(&mut once);
    let once = device.free().events().to_vec();

    let mut twice = DummyQspiFlash::preset(Preset::Hybrid16M);
    let device = init(&mut twice);
    device.init().unwrap();
    let twice = device.free().events().to_vec();

    assert_eq!(once, twice);
}

#[test]
fn test_configuration_detection_selects_map() {
    let mut flash = DummyQspiFlash::preset(Preset::Hybrid16M);
    flash.set_register(opcodes::RDAR, Some(HYBRID_DETECT_ADDR), HYBRID_DETECT_MASK);
    let device = init(&mut flash);

    let geometry = device.geometry().unwrap();
    assert_eq!(geometry.regions().len(), 1);
    assert_eq!(device.erase_size_at(0), Ok(64 * KIB));
    assert_eq!(device.erase(0, 4 * KIB), Err(Error::InvalidAlignment));

    let flash = device.free();
    let detect = BusEvent::Command {
        opcode: opcodes::RDAR,
        address: Some(HYBRID_DETECT_ADDR),
        tx: Vec::new(),
        rx_len: 1,
    };
    assert!(flash.events().contains(&detect));
}

#[test]
fn test_oversized_device_is_rejected() {
    let sfdp = Preset::Uniform8M.sfdp().density(8 << 30).build();
    let mut flash = with_sfdp(Preset::Uniform8M, sfdp);
    let device = open(&mut flash);

    assert_eq!(device.init(), Err(Error::CapacityExceeded));
    assert!(device.free().frequency().is_none());
}

#[test]
fn test_reserved_quad_enable_code_is_rejected() {
    let sfdp = Preset::Hybrid16M.sfdp().quad_enable_raw(0b111).build();
    let mut flash = with_sfdp(Preset::Hybrid16M, sfdp);
    let device = open(&mut flash);

    assert_eq!(device.init(), Err(Error::ParsingFailed));
}

#[test]
fn test_malformed_directory_is_rejected() {
    let sfdp = Preset::Uniform8M.sfdp().vendor_table(0xFF84, &[]).build();
    let mut flash = with_sfdp(Preset::Uniform8M, sfdp);
    let device = open(&mut flash);
    assert_eq!(device.init(), Err(Error::ParsingFailed));

    // A well-formed unknown table is skipped
    let sfdp = Preset::Uniform8M
        .sfdp()
        .vendor_table(0xFF84, &[0xDEAD_BEEF, 0])
        .build();
    let mut flash = with_sfdp(Preset::Uniform8M, sfdp);
    let device = open(&mut flash);
    assert_eq!(device.init(), Ok(()));
}

#[test]
fn test_sector_map_must_cover_device() {
    let sfdp = Preset::Hybrid16M.sfdp().density(32 * MIB as u64).build();
    let mut flash = with_sfdp(Preset::Hybrid16M, sfdp);
    let device = open(&mut flash);

    assert_eq!(device.init(), Err(Error::ParsingFailed));
}

#[test]
fn test_sector_map_region_must_fit_its_erase_types() {
    // 32 KiB region that only allows 64 KiB erases
    let map = SectorMapBuilder::new().map(0, &[(32 * KIB, 0b0100), (16 * MIB - 32 * KIB, 0b0001)]);
    let sfdp = Preset::Hybrid16M.sfdp().sector_map(map).build();
    let mut flash = with_sfdp(Preset::Hybrid16M, sfdp);
    let device = open(&mut flash);

    assert_eq!(device.init(), Err(Error::ParsingFailed));
    assert!(device.free().frequency().is_none());
}
