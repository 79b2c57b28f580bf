//! Best read mode selection

use crate::bus::{opcodes, IoMode};

use super::{BasicFlashParams, FastReadParams, QpiEnableSequence, QuadEnableRequirement};

/// The read mode chosen for a device and the setup it needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadMode {
    /// Line counts of the read
    pub io_mode: IoMode,
    /// Read opcode
    pub opcode: u8,
    /// Mode plus dummy clocks between address and data
    pub dummy_cycles: u8,
    /// QE bit to set before the mode may be used
    pub quad_enable: QuadEnableRequirement,
    /// Sequence to enter QPI, for 4-4-4 only
    pub qpi_enable: Option<QpiEnableSequence>,
}

impl ReadMode {
    /// Plain 1-1-1 read with opcode 0x03 and no dummy cycles
    pub const fn single() -> Self {
        Self {
            io_mode: IoMode::Single,
            opcode: opcodes::READ,
            dummy_cycles: 0,
            quad_enable: QuadEnableRequirement::None,
            qpi_enable: None,
        }
    }

    /// Returns true if a quad enable step must run before the first read
    pub fn needs_quad_enable(&self) -> bool {
        self.io_mode.requires_quad() && self.quad_enable.is_needed()
    }
}

/// Pick the fastest read mode the device declares
///
/// Modes are tried in the order 4-4-4, 1-4-4, 1-1-4, 1-2-2, 1-1-2 and the
/// first one whose capability bit is set and whose instruction is present
/// wins. 4-4-4 additionally needs a declared QPI enable sequence. 1-1-1 is
/// always available.
pub fn select_read_mode(params: &BasicFlashParams) -> ReadMode {
    let candidates: [(IoMode, bool, FastReadParams); 5] = [
        (
            IoMode::Qpi,
            params.fast_read_444 && params.qpi_enable.is_usable(),
            params.fast_read_444_params,
        ),
        (IoMode::QuadIo, params.fast_read_144, params.fast_read_144_params),
        (IoMode::QuadOut, params.fast_read_114, params.fast_read_114_params),
        (IoMode::DualIo, params.fast_read_122, params.fast_read_122_params),
        (IoMode::DualOut, params.fast_read_112, params.fast_read_112_params),
    ];

    let mode = candidates
        .iter()
        .find(|(_, supported, fast_read)| *supported && fast_read.is_supported())
        .map(|&(io_mode, _, fast_read)| ReadMode {
            io_mode,
            opcode: fast_read.opcode,
            dummy_cycles: fast_read.wait_cycles(),
            quad_enable: if io_mode.requires_quad() {
                params.quad_enable
            } else {
                QuadEnableRequirement::None
            },
            qpi_enable: (io_mode == IoMode::Qpi).then_some(params.qpi_enable),
        })
        .unwrap_or_else(ReadMode::single);

    log::debug!(
        "Selected read mode {} (opcode 0x{:02X}, {} dummy cycles)",
        mode.io_mode,
        mode.opcode,
        mode.dummy_cycles
    );
    mode
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_modes() -> BasicFlashParams {
        BasicFlashParams {
            fast_read_112: true,
            fast_read_122: true,
            fast_read_114: true,
            fast_read_144: true,
            fast_read_444: true,
            fast_read_112_params: FastReadParams::new(0x3B, 0, 8),
            fast_read_122_params: FastReadParams::new(0xBB, 4, 0),
            fast_read_114_params: FastReadParams::new(0x6B, 0, 8),
            fast_read_144_params: FastReadParams::new(0xEB, 2, 4),
            fast_read_444_params: FastReadParams::new(0xEB, 2, 4),
            quad_enable: QuadEnableRequirement::Sr2Bit1,
            qpi_enable: QpiEnableSequence::from_bfpt(QpiEnableSequence::QE_THEN_38),
            ..Default::default()
        }
    }

    #[test]
    fn test_preference_order() {
        let mut params = all_modes();
        let expected = [
            IoMode::Qpi,
            IoMode::QuadIo,
            IoMode::QuadOut,
            IoMode::DualIo,
            IoMode::DualOut,
            IoMode::Single,
        ];

        for want in expected {
            let mode = select_read_mode(&params);
            assert_eq!(mode.io_mode, want);
            // Remove the winner and try again
            match want {
                IoMode::Qpi => params.fast_read_444 = false,
                IoMode::QuadIo => params.fast_read_144 = false,
                IoMode::QuadOut => params.fast_read_114 = false,
                IoMode::DualIo => params.fast_read_122 = false,
                IoMode::DualOut => params.fast_read_112 = false,
                IoMode::Single => {}
            }
        }
    }

    #[test]
    fn test_quad_schedules_quad_enable() {
        let params = all_modes();
        let mode = select_read_mode(&params);
        assert_eq!(mode.io_mode, IoMode::Qpi);
        assert!(mode.needs_quad_enable());
        assert!(mode.qpi_enable.is_some());
        assert_eq!(mode.dummy_cycles, 6);

        let dual = BasicFlashParams {
            fast_read_444: false,
            fast_read_144: false,
            fast_read_114: false,
            ..all_modes()
        };
        let mode = select_read_mode(&dual);
        assert_eq!(mode.io_mode, IoMode::DualIo);
        assert!(!mode.needs_quad_enable());
        assert_eq!(mode.quad_enable, QuadEnableRequirement::None);
    }

    #[test]
    fn test_qpi_needs_enable_sequence() {
        let params = BasicFlashParams {
            qpi_enable: QpiEnableSequence::default(),
            ..all_modes()
        };
        assert_eq!(select_read_mode(&params).io_mode, IoMode::QuadIo);
    }

    #[test]
    fn test_missing_instruction_skips_mode() {
        let params = BasicFlashParams {
            fast_read_444: false,
            fast_read_144_params: FastReadParams::new(0xFF, 0, 0),
            ..all_modes()
        };
        let mode = select_read_mode(&params);
        assert_eq!(mode.io_mode, IoMode::QuadOut);
        assert_eq!(mode.opcode, 0x6B);
        assert_eq!(mode.dummy_cycles, 8);
    }

    #[test]
    fn test_single_fallback() {
        let mode = select_read_mode(&BasicFlashParams::default());
        assert_eq!(mode, ReadMode::single());
        assert!(!mode.needs_quad_enable());
    }
}
