//! Command, subcommand, end-code and device-code tables.

use plc_device::DeviceClass;

/// Batch read (word or bit units by subcommand).
pub const CMD_BATCH_READ: u16 = 0x0401;
/// Batch write (word or bit units by subcommand).
pub const CMD_BATCH_WRITE: u16 = 0x1401;
/// Read CPU model name.
pub const CMD_READ_CPU_MODEL: u16 = 0x0101;
/// Remote STOP.
pub const CMD_REMOTE_STOP: u16 = 0x1001;
/// Remote RUN.
pub const CMD_REMOTE_RUN: u16 = 0x1002;
/// Remote PAUSE.
pub const CMD_REMOTE_PAUSE: u16 = 0x1003;
/// Remote RESET.
pub const CMD_REMOTE_RESET: u16 = 0x1006;

/// Subcommand: word units.
pub const SUB_WORD: u16 = 0x0001;
/// Subcommand: word units, classic Q-series encoding. Accepted on decode;
/// never emitted.
pub const SUB_WORD_CLASSIC: u16 = 0x0000;
/// Subcommand: bit units.
pub const SUB_BIT: u16 = 0x0003;
/// Subcommand for control and model-name commands.
pub const SUB_CONTROL: u16 = 0x0000;

/// MC end codes: `0x0000` is success, everything else aborts the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndCode {
    /// 0x0000 — request completed.
    Success,
    /// 0xC050 — device specification error.
    DeviceSpec,
    /// 0xC051 — point count beyond the command's ceiling.
    TooManyPoints,
    /// 0xC056 — head (or head + count) beyond the device range.
    AddressRange,
    /// 0xC059 — command/subcommand not supported.
    UnknownCommand,
    /// 0xC05C — device code not recognized.
    InvalidDevice,
    /// 0xC061 — request data length disagrees with the payload.
    LengthMismatch,
    /// Any other non-zero code.
    Other(u16),
}

impl EndCode {
    /// Numeric wire value.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Success => 0x0000,
            Self::DeviceSpec => 0xC050,
            Self::TooManyPoints => 0xC051,
            Self::AddressRange => 0xC056,
            Self::UnknownCommand => 0xC059,
            Self::InvalidDevice => 0xC05C,
            Self::LengthMismatch => 0xC061,
            Self::Other(code) => code,
        }
    }

    /// Classify a wire value.
    #[must_use]
    pub const fn from_code(code: u16) -> Self {
        match code {
            0x0000 => Self::Success,
            0xC050 => Self::DeviceSpec,
            0xC051 => Self::TooManyPoints,
            0xC056 => Self::AddressRange,
            0xC059 => Self::UnknownCommand,
            0xC05C => Self::InvalidDevice,
            0xC061 => Self::LengthMismatch,
            other => Self::Other(other),
        }
    }

    /// True for `Success`.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// One-byte (3E) device code for a class.
#[must_use]
pub const fn device_code(class: DeviceClass) -> u8 {
    match class {
        DeviceClass::M => 0x90,
        DeviceClass::Sm => 0x91,
        DeviceClass::L => 0x92,
        DeviceClass::F => 0x93,
        DeviceClass::V => 0x94,
        DeviceClass::S => 0x98,
        DeviceClass::X => 0x9C,
        DeviceClass::Y => 0x9D,
        DeviceClass::B => 0xA0,
        DeviceClass::Sb => 0xA1,
        DeviceClass::D => 0xA8,
        DeviceClass::Sd => 0xA9,
        DeviceClass::R => 0xAF,
        DeviceClass::Zr => 0xB0,
        DeviceClass::W => 0xB4,
        DeviceClass::Sw => 0xB5,
        DeviceClass::Ts => 0xC0,
        DeviceClass::Tc => 0xC1,
        DeviceClass::Tn => 0xC2,
        DeviceClass::Cs => 0xC3,
        DeviceClass::Cc => 0xC4,
        DeviceClass::Cn => 0xC5,
        DeviceClass::Z => 0xCC,
    }
}

/// Two-byte (4E) device code: the 3E value zero-extended.
#[must_use]
pub const fn wide_device_code(class: DeviceClass) -> u16 {
    device_code(class) as u16
}

/// Class for a one-byte device code.
#[must_use]
pub fn class_from_code(code: u8) -> Option<DeviceClass> {
    DeviceClass::ALL
        .iter()
        .copied()
        .find(|class| device_code(*class) == code)
}

/// Class for a two-byte device code.
#[must_use]
pub fn class_from_wide_code(code: u16) -> Option<DeviceClass> {
    u8::try_from(code).ok().and_then(class_from_code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_codes_round_trip() {
        for class in DeviceClass::ALL {
            assert_eq!(class_from_code(device_code(class)), Some(class));
            assert_eq!(class_from_wide_code(wide_device_code(class)), Some(class));
        }
    }

    #[test]
    fn known_code_values() {
        assert_eq!(device_code(DeviceClass::D), 0xA8);
        assert_eq!(device_code(DeviceClass::M), 0x90);
        assert_eq!(device_code(DeviceClass::X), 0x9C);
        assert_eq!(device_code(DeviceClass::Tn), 0xC2);
        assert_eq!(class_from_code(0xB0), Some(DeviceClass::Zr));
        assert_eq!(class_from_code(0x00), None);
        assert_eq!(class_from_wide_code(0x0100), None);
    }

    #[test]
    fn end_codes_round_trip() {
        for code in [0x0000, 0xC050, 0xC051, 0xC056, 0xC059, 0xC05C, 0xC061, 0xC0FF] {
            assert_eq!(EndCode::from_code(code).code(), code);
        }
        assert!(EndCode::Success.is_success());
        assert!(!EndCode::AddressRange.is_success());
    }
}
