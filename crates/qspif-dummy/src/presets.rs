//! Ready-made emulated devices

use std::fmt;

use qspif_core::bus::{opcodes, IoMode};
use qspif_core::sfdp::{
    AddressMode, FourByteEntryMethods, QpiEnableSequence, QuadEnableRequirement, SoftResetSupport,
};

use crate::{DummyConfig, FourByteMode, ReadOp, SectorMapBuilder, SfdpBuilder};

const KIB: u32 = 1024;
const MIB: u32 = 1024 * KIB;

/// Register read used by the hybrid device's configuration detection
pub const HYBRID_DETECT_ADDR: u32 = 0x80_0004;
/// Bit of the detection register selecting the uniform configuration
pub const HYBRID_DETECT_MASK: u8 = 0x04;

/// Emulated device models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    /// 8 MiB, uniform 4/32/64 KiB erase, JESD216 tables, 1-4-4 reads
    Uniform8M,
    /// 16 MiB with a sector map: 4/64 KiB erase in the low half and
    /// 4/32/64 KiB in the high half, 1-1-4 reads behind SR2 bit 1
    Hybrid16M,
    /// 32 MiB, 4-byte addressing through B7h, QPI entered with 38h
    Qpi32M,
}

impl Preset {
    /// Every preset
    pub const ALL: [Preset; 3] = [Self::Uniform8M, Self::Hybrid16M, Self::Qpi32M];

    /// Name used on the command line
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uniform8M => "uniform-8m",
            Self::Hybrid16M => "hybrid-16m",
            Self::Qpi32M => "qpi-32m",
        }
    }

    /// Look up a preset by name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    /// SFDP image of the preset
    pub fn sfdp(&self) -> SfdpBuilder {
        match self {
            Self::Uniform8M => SfdpBuilder::new(8 * MIB as u64)
                .bfpt_dwords(9)
                .legacy_erase(opcodes::SE_20)
                .erase_type(0, 0x20, 4 * KIB)
                .erase_type(1, 0x52, 32 * KIB)
                .erase_type(2, 0xD8, 64 * KIB)
                .fast_read(IoMode::DualOut, 0x3B, 0, 8)
                .fast_read(IoMode::DualIo, 0xBB, 0, 4)
                .fast_read(IoMode::QuadOut, 0x6B, 0, 8)
                .fast_read(IoMode::QuadIo, 0xEB, 2, 4),
            Self::Hybrid16M => SfdpBuilder::new(16 * MIB as u64)
                .legacy_erase(opcodes::SE_20)
                .erase_type(0, 0x20, 4 * KIB)
                .erase_type(1, 0x52, 32 * KIB)
                .erase_type(2, 0xD8, 64 * KIB)
                .fast_read(IoMode::DualOut, 0x3B, 0, 8)
                .fast_read(IoMode::QuadOut, 0x6B, 0, 8)
                .quad_enable(QuadEnableRequirement::Sr2Bit1)
                .soft_reset(SoftResetSupport::RESET_66_99)
                .sector_map(
                    SectorMapBuilder::new()
                        .detection_command(
                            opcodes::RDAR,
                            Some(HYBRID_DETECT_ADDR),
                            8,
                            HYBRID_DETECT_MASK,
                        )
                        .map(0, &[(8 * MIB, 0b0101), (8 * MIB, 0b0111)])
                        .map(1, &[(16 * MIB, 0b0100)]),
                ),
            Self::Qpi32M => SfdpBuilder::new(32 * MIB as u64)
                .address_mode(AddressMode::ThreeOrFourByte)
                .legacy_erase(opcodes::SE_20)
                .erase_type(0, 0x20, 4 * KIB)
                .erase_type(1, 0xD8, 64 * KIB)
                .fast_read(IoMode::QuadIo, 0xEB, 2, 4)
                .fast_read(IoMode::Qpi, 0xEB, 2, 4)
                .quad_enable(QuadEnableRequirement::Sr2Bit1)
                .qpi_enable(QpiEnableSequence::QE_THEN_38)
                .four_byte_entry(FourByteEntryMethods::INSTR_B7_E9)
                .soft_reset(SoftResetSupport::RESET_66_99),
        }
    }

    /// Emulator configuration matching [`sfdp`](Self::sfdp)
    pub fn config(&self) -> DummyConfig {
        let read = |mode, opcode, dummy_cycles| ReadOp {
            mode,
            opcode,
            dummy_cycles,
        };
        let base = DummyConfig {
            size: 0,
            page_size: 256,
            sfdp: self.sfdp().build(),
            erase_ops: vec![(0x20, 4 * KIB), (0x52, 32 * KIB), (0xD8, 64 * KIB)],
            read_ops: Vec::new(),
            quad_enable: QuadEnableRequirement::None,
            qpi: false,
            four_byte: FourByteMode::Never,
            busy_polls: 2,
        };

        match self {
            Self::Uniform8M => DummyConfig {
                size: 8 * MIB,
                read_ops: vec![
                    read(IoMode::DualOut, 0x3B, 8),
                    read(IoMode::DualIo, 0xBB, 4),
                    read(IoMode::QuadOut, 0x6B, 8),
                    read(IoMode::QuadIo, 0xEB, 6),
                ],
                ..base
            },
            Self::Hybrid16M => DummyConfig {
                size: 16 * MIB,
                read_ops: vec![read(IoMode::DualOut, 0x3B, 8), read(IoMode::QuadOut, 0x6B, 8)],
                quad_enable: QuadEnableRequirement::Sr2Bit1,
                ..base
            },
            Self::Qpi32M => DummyConfig {
                size: 32 * MIB,
                erase_ops: vec![(0x20, 4 * KIB), (0xD8, 64 * KIB)],
                read_ops: vec![read(IoMode::QuadIo, 0xEB, 6), read(IoMode::Qpi, 0xEB, 6)],
                quad_enable: QuadEnableRequirement::Sr2Bit1,
                qpi: true,
                four_byte: FourByteMode::Instruction,
                ..base
            },
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_names() {
        for preset in Preset::ALL {
            assert_eq!(Preset::from_name(preset.name()), Some(preset));
        }
        assert_eq!(Preset::from_name("w25q128"), None);
    }

    #[test]
    fn test_preset_sizes_match_sfdp() {
        for preset in Preset::ALL {
            let config = preset.config();
            assert_eq!(config.sfdp[..4], *b"SFDP");
            assert_eq!(config.size % (64 * KIB), 0);
        }
    }
}
