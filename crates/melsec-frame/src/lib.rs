//! MC protocol codec for the two MELSEC binary frame families.
//!
//! **3E (Q series)**: request subheader `50 00`, reply `D0 00`, 9-byte
//! fixed header, one-byte device codes.
//!
//! **4E (iQ-R series)**: request subheader `54 00`, reply `D4 00`, 13-byte
//! fixed header carrying a client-chosen serial number (echoed verbatim in
//! the reply) and a reserved word, two-byte device codes.
//!
//! All multibyte fields are little-endian. The data length field counts
//! everything after itself. Bit payloads pack two points per byte, high
//! nibble first, zero-padded to a whole byte.

mod codes;
mod request;
mod response;

pub use codes::{
    CMD_BATCH_READ, CMD_BATCH_WRITE, CMD_READ_CPU_MODEL, CMD_REMOTE_PAUSE, CMD_REMOTE_RESET,
    CMD_REMOTE_RUN, CMD_REMOTE_STOP, EndCode, SUB_BIT, SUB_CONTROL, SUB_WORD, class_from_code,
    class_from_wide_code, device_code, wide_device_code,
};
pub use request::{
    DEFAULT_MONITOR_TIMER, Request, RequestFrame, decode_request, decode_request_envelope,
    encode_request, request_data_length,
};
pub use response::{
    Expect, Response, ResponseFrame, decode_response, encode_response, response_data_length,
};

use std::fmt;

/// Frame family selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Series {
    /// Q series, 3E frames.
    Q,
    /// iQ-R series, 4E frames.
    IqR,
}

impl Series {
    /// Fixed request/reply header length up to and including the data
    /// length field: 9 bytes for 3E, 13 for 4E.
    #[must_use]
    pub const fn header_len(self) -> usize {
        match self {
            Self::Q => 9,
            Self::IqR => 13,
        }
    }

    pub(crate) const fn request_subheader(self) -> [u8; 2] {
        match self {
            Self::Q => [0x50, 0x00],
            Self::IqR => [0x54, 0x00],
        }
    }

    pub(crate) const fn response_subheader(self) -> [u8; 2] {
        match self {
            Self::Q => [0xD0, 0x00],
            Self::IqR => [0xD4, 0x00],
        }
    }
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Q => "Q",
            Self::IqR => "iQ-R",
        })
    }
}

/// Routing bytes carried in every frame and echoed in replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// Network number.
    pub network: u8,
    /// PC number.
    pub pc: u8,
    /// Request destination module I/O number.
    pub io: u16,
    /// Request destination module station number.
    pub station: u8,
}

impl Default for Route {
    /// The host-station default: network 0, PC 0xFF, I/O 0x03FF, station 0.
    fn default() -> Self {
        Self {
            network: 0,
            pc: 0xFF,
            io: 0x03FF,
            station: 0,
        }
    }
}

/// Frame-level decode errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Fewer bytes than the fixed header or declared body require.
    Truncated { expected: usize, actual: usize },
    /// The leading two bytes are not the expected subheader.
    BadSubheader([u8; 2]),
    /// Declared data length disagrees with the bytes present.
    LengthMismatch { declared: usize, actual: usize },
    /// Command/subcommand pair is not one the mock speaks.
    UnknownCommand { command: u16, subcommand: u16 },
    /// Device code with no class mapping.
    UnknownDeviceCode(u16),
}

impl FrameError {
    /// The MC end code a server answers with when the request body decodes
    /// but is unserviceable. (Subheader and truncation faults have no
    /// reply; the connection closes instead.)
    #[must_use]
    pub fn end_code(&self) -> EndCode {
        match self {
            Self::UnknownCommand { .. } => EndCode::UnknownCommand,
            Self::UnknownDeviceCode(_) => EndCode::InvalidDevice,
            Self::Truncated { .. } | Self::LengthMismatch { .. } => EndCode::LengthMismatch,
            Self::BadSubheader(_) => EndCode::DeviceSpec,
        }
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { expected, actual } => {
                write!(f, "truncated frame: need {expected} bytes, have {actual}")
            }
            Self::BadSubheader(bytes) => {
                write!(f, "bad subheader {:02X} {:02X}", bytes[0], bytes[1])
            }
            Self::LengthMismatch { declared, actual } => {
                write!(
                    f,
                    "data length mismatch: header declares {declared}, body has {actual}"
                )
            }
            Self::UnknownCommand {
                command,
                subcommand,
            } => {
                write!(f, "unknown command {command:04X}/{subcommand:04X}")
            }
            Self::UnknownDeviceCode(code) => write!(f, "unknown device code {code:04X}"),
        }
    }
}

impl std::error::Error for FrameError {}

/// Pack bits for the wire: two points per byte, earlier point in the high
/// nibble, zero padding when the count is odd.
#[must_use]
pub fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; bits.len().div_ceil(2)];
    for (i, bit) in bits.iter().enumerate() {
        if *bit {
            bytes[i / 2] |= if i % 2 == 0 { 0x10 } else { 0x01 };
        }
    }
    bytes
}

/// Unpack `count` bits from wire bytes (inverse of [`pack_bits`]).
#[must_use]
pub fn unpack_bits(bytes: &[u8], count: usize) -> Vec<bool> {
    (0..count)
        .map(|i| {
            let byte = bytes.get(i / 2).copied().unwrap_or(0);
            let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0F };
            nibble != 0
        })
        .collect()
}
