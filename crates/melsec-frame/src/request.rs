//! Request-direction framing: command encode for the client, decode for
//! the server.

use plc_device::DeviceClass;

use crate::codes::{
    CMD_BATCH_READ, CMD_BATCH_WRITE, CMD_READ_CPU_MODEL, CMD_REMOTE_PAUSE, CMD_REMOTE_RESET,
    CMD_REMOTE_RUN, CMD_REMOTE_STOP, SUB_BIT, SUB_CONTROL, SUB_WORD, SUB_WORD_CLASSIC,
    class_from_code, class_from_wide_code, device_code, wide_device_code,
};
use crate::{FrameError, Route, Series, pack_bits, unpack_bits};

/// Default monitoring timer: 0x0010 × 250 ms = 4 s.
pub const DEFAULT_MONITOR_TIMER: u16 = 0x0010;

/// A decoded MC request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Batch read, word units.
    ReadWords {
        class: DeviceClass,
        head: u32,
        count: u16,
    },
    /// Batch read, bit units.
    ReadBits {
        class: DeviceClass,
        head: u32,
        count: u16,
    },
    /// Batch write, word units.
    WriteWords {
        class: DeviceClass,
        head: u32,
        values: Vec<u16>,
    },
    /// Batch write, bit units.
    WriteBits {
        class: DeviceClass,
        head: u32,
        bits: Vec<bool>,
    },
    /// Read the CPU model name.
    ReadCpuModel,
    /// Remote STOP.
    RemoteStop,
    /// Remote RUN.
    RemoteRun,
    /// Remote PAUSE.
    RemotePause,
    /// Remote RESET.
    RemoteReset,
}

impl Request {
    const fn command(&self) -> (u16, u16) {
        match self {
            Self::ReadWords { .. } => (CMD_BATCH_READ, SUB_WORD),
            Self::ReadBits { .. } => (CMD_BATCH_READ, SUB_BIT),
            Self::WriteWords { .. } => (CMD_BATCH_WRITE, SUB_WORD),
            Self::WriteBits { .. } => (CMD_BATCH_WRITE, SUB_BIT),
            Self::ReadCpuModel => (CMD_READ_CPU_MODEL, SUB_CONTROL),
            Self::RemoteStop => (CMD_REMOTE_STOP, SUB_CONTROL),
            Self::RemoteRun => (CMD_REMOTE_RUN, SUB_CONTROL),
            Self::RemotePause => (CMD_REMOTE_PAUSE, SUB_CONTROL),
            Self::RemoteReset => (CMD_REMOTE_RESET, SUB_CONTROL),
        }
    }
}

/// A full request frame: envelope plus command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    /// 4E serial number, echoed in the reply. Unused (0) for 3E.
    pub serial: u16,
    /// Routing bytes.
    pub route: Route,
    /// Monitoring timer in 250 ms units.
    pub monitor_timer: u16,
    /// The command.
    pub request: Request,
}

impl RequestFrame {
    /// A frame with default routing and monitoring timer.
    #[must_use]
    pub fn new(request: Request) -> Self {
        Self {
            serial: 0,
            route: Route::default(),
            monitor_timer: DEFAULT_MONITOR_TIMER,
            request,
        }
    }
}

fn push_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Append a device specification: 3 head bytes + code (3E) or 3 head
/// bytes + reserved + 2 code bytes (4E).
fn push_device_spec(buf: &mut Vec<u8>, series: Series, class: DeviceClass, head: u32) {
    let head_bytes = head.to_le_bytes();
    buf.extend_from_slice(&head_bytes[..3]);
    match series {
        Series::Q => buf.push(device_code(class)),
        Series::IqR => {
            buf.push(0x00);
            push_u16(buf, wide_device_code(class));
        }
    }
}

/// Encode a request frame for the wire.
#[must_use]
pub fn encode_request(series: Series, frame: &RequestFrame) -> Vec<u8> {
    let mut body = Vec::new();
    push_u16(&mut body, frame.monitor_timer);
    let (command, subcommand) = frame.request.command();
    push_u16(&mut body, command);
    push_u16(&mut body, subcommand);

    match &frame.request {
        Request::ReadWords { class, head, count } | Request::ReadBits { class, head, count } => {
            push_device_spec(&mut body, series, *class, *head);
            push_u16(&mut body, *count);
        }
        Request::WriteWords {
            class,
            head,
            values,
        } => {
            push_device_spec(&mut body, series, *class, *head);
            push_u16(&mut body, values.len() as u16);
            for value in values {
                push_u16(&mut body, *value);
            }
        }
        Request::WriteBits { class, head, bits } => {
            push_device_spec(&mut body, series, *class, *head);
            push_u16(&mut body, bits.len() as u16);
            body.extend_from_slice(&pack_bits(bits));
        }
        Request::ReadCpuModel
        | Request::RemoteStop
        | Request::RemoteRun
        | Request::RemotePause
        | Request::RemoteReset => {}
    }

    let mut buf = Vec::with_capacity(series.header_len() + body.len());
    buf.extend_from_slice(&series.request_subheader());
    if series == Series::IqR {
        push_u16(&mut buf, frame.serial);
        push_u16(&mut buf, 0x0000);
    }
    buf.push(frame.route.network);
    buf.push(frame.route.pc);
    push_u16(&mut buf, frame.route.io);
    buf.push(frame.route.station);
    push_u16(&mut buf, body.len() as u16);
    buf.extend_from_slice(&body);
    buf
}

/// Cursor over frame bytes with truncation tracking.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], FrameError> {
        if self.pos + len > self.data.len() {
            return Err(FrameError::Truncated {
                expected: self.pos + len,
                actual: self.data.len(),
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, FrameError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, FrameError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// 24-bit little-endian head number.
    fn u24(&mut self) -> Result<u32, FrameError> {
        let bytes = self.take(3)?;
        Ok(u32::from(bytes[0]) | u32::from(bytes[1]) << 8 | u32::from(bytes[2]) << 16)
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

fn read_device_spec(
    reader: &mut Reader<'_>,
    series: Series,
) -> Result<(DeviceClass, u32), FrameError> {
    let head = reader.u24()?;
    let class = match series {
        Series::Q => {
            let code = reader.u8()?;
            class_from_code(code).ok_or(FrameError::UnknownDeviceCode(u16::from(code)))?
        }
        Series::IqR => {
            let _reserved = reader.u8()?;
            let code = reader.u16()?;
            class_from_wide_code(code).ok_or(FrameError::UnknownDeviceCode(code))?
        }
    };
    Ok((class, head))
}

/// Parse the envelope of a request frame: subheader, serial, routing.
///
/// Used by the server to address an error reply even when the body is
/// unserviceable.
pub fn decode_request_envelope(series: Series, data: &[u8]) -> Result<(u16, Route), FrameError> {
    let mut reader = Reader::new(data);
    let subheader = reader.take(2)?;
    if subheader != series.request_subheader() {
        return Err(FrameError::BadSubheader([subheader[0], subheader[1]]));
    }
    let serial = if series == Series::IqR {
        let serial = reader.u16()?;
        let _fixed = reader.u16()?;
        serial
    } else {
        0
    };
    let route = Route {
        network: reader.u8()?,
        pc: reader.u8()?,
        io: reader.u16()?,
        station: reader.u8()?,
    };
    Ok((serial, route))
}

/// The declared body length of a request whose fixed header has been read.
///
/// Validates the subheader; the caller then reads exactly this many more
/// bytes to complete the frame.
pub fn request_data_length(series: Series, header: &[u8]) -> Result<usize, FrameError> {
    if header.len() < series.header_len() {
        return Err(FrameError::Truncated {
            expected: series.header_len(),
            actual: header.len(),
        });
    }
    if header[..2] != series.request_subheader() {
        return Err(FrameError::BadSubheader([header[0], header[1]]));
    }
    let len_offset = series.header_len() - 2;
    Ok(usize::from(u16::from_le_bytes([
        header[len_offset],
        header[len_offset + 1],
    ])))
}

/// Decode a complete request frame (header plus body).
pub fn decode_request(series: Series, data: &[u8]) -> Result<RequestFrame, FrameError> {
    let (serial, route) = decode_request_envelope(series, data)?;

    let header_len = series.header_len();
    if data.len() < header_len {
        return Err(FrameError::Truncated {
            expected: header_len,
            actual: data.len(),
        });
    }
    let declared = usize::from(u16::from_le_bytes([
        data[header_len - 2],
        data[header_len - 1],
    ]));
    let body = &data[header_len..];
    if declared != body.len() {
        return Err(FrameError::LengthMismatch {
            declared,
            actual: body.len(),
        });
    }

    let mut reader = Reader::new(body);
    let monitor_timer = reader.u16()?;
    let command = reader.u16()?;
    let subcommand = reader.u16()?;

    let request = match (command, subcommand) {
        (CMD_BATCH_READ, SUB_WORD | SUB_WORD_CLASSIC | SUB_BIT) => {
            let (class, head) = read_device_spec(&mut reader, series)?;
            let count = reader.u16()?;
            if subcommand == SUB_BIT {
                Request::ReadBits { class, head, count }
            } else {
                Request::ReadWords { class, head, count }
            }
        }
        (CMD_BATCH_WRITE, SUB_WORD | SUB_WORD_CLASSIC) => {
            let (class, head) = read_device_spec(&mut reader, series)?;
            let count = reader.u16()?;
            let expected = usize::from(count) * 2;
            if reader.remaining() != expected {
                return Err(FrameError::LengthMismatch {
                    declared: expected,
                    actual: reader.remaining(),
                });
            }
            let mut values = Vec::with_capacity(usize::from(count));
            for _ in 0..count {
                values.push(reader.u16()?);
            }
            Request::WriteWords {
                class,
                head,
                values,
            }
        }
        (CMD_BATCH_WRITE, SUB_BIT) => {
            let (class, head) = read_device_spec(&mut reader, series)?;
            let count = reader.u16()?;
            let expected = usize::from(count).div_ceil(2);
            if reader.remaining() != expected {
                return Err(FrameError::LengthMismatch {
                    declared: expected,
                    actual: reader.remaining(),
                });
            }
            let packed = reader.take(expected)?;
            Request::WriteBits {
                class,
                head,
                bits: unpack_bits(packed, usize::from(count)),
            }
        }
        (CMD_READ_CPU_MODEL, SUB_CONTROL) => Request::ReadCpuModel,
        (CMD_REMOTE_STOP, SUB_CONTROL) => Request::RemoteStop,
        (CMD_REMOTE_RUN, SUB_CONTROL) => Request::RemoteRun,
        (CMD_REMOTE_PAUSE, SUB_CONTROL) => Request::RemotePause,
        (CMD_REMOTE_RESET, SUB_CONTROL) => Request::RemoteReset,
        (command, subcommand) => {
            return Err(FrameError::UnknownCommand {
                command,
                subcommand,
            });
        }
    };

    if reader.remaining() != 0 {
        return Err(FrameError::LengthMismatch {
            declared,
            actual: declared + reader.remaining(),
        });
    }

    Ok(RequestFrame {
        serial,
        route,
        monitor_timer,
        request,
    })
}
