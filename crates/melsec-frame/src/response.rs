//! Reply-direction framing: encode for the server, decode for the client.
//!
//! Reply payloads are untyped on the wire (a word read and a bit read of
//! the right sizes are indistinguishable), so decoding takes an [`Expect`]
//! describing the shape the caller's request implies.

use crate::codes::EndCode;
use crate::{FrameError, Route, Series, pack_bits, unpack_bits};

/// Length of the CPU model name field in a model-read reply.
pub const MODEL_NAME_LEN: usize = 16;

/// A decoded MC reply payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Word data from a batch read.
    Words(Vec<u16>),
    /// Bit data from a batch read.
    Bits(Vec<bool>),
    /// CPU model name and model code.
    CpuModel { name: String, code: u16 },
    /// Empty payload (writes and remote control).
    Ack,
}

/// Payload shape implied by the request a reply answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// `count` words.
    Words(u16),
    /// `count` bits.
    Bits(u16),
    /// Model name + model code.
    CpuModel,
    /// Empty payload.
    Ack,
}

/// A full reply frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    /// Echo of the request serial (4E only; 0 for 3E).
    pub serial: u16,
    /// Echo of the request routing bytes.
    pub route: Route,
    /// Completion status.
    pub end_code: EndCode,
    /// Payload; `Ack` when the end code is a failure.
    pub response: Response,
}

impl ResponseFrame {
    /// A successful reply.
    #[must_use]
    pub fn success(serial: u16, route: Route, response: Response) -> Self {
        Self {
            serial,
            route,
            end_code: EndCode::Success,
            response,
        }
    }

    /// A failure reply carrying only the end code.
    #[must_use]
    pub fn failure(serial: u16, route: Route, end_code: EndCode) -> Self {
        Self {
            serial,
            route,
            end_code,
            response: Response::Ack,
        }
    }
}

fn push_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Encode a reply frame for the wire.
///
/// On failure the 3E reply stops at the end code; the 4E reply carries two
/// abort-info bytes (zeros in the mock).
#[must_use]
pub fn encode_response(series: Series, frame: &ResponseFrame) -> Vec<u8> {
    let mut body = Vec::new();
    push_u16(&mut body, frame.end_code.code());

    if frame.end_code.is_success() {
        match &frame.response {
            Response::Words(words) => {
                for word in words {
                    push_u16(&mut body, *word);
                }
            }
            Response::Bits(bits) => body.extend_from_slice(&pack_bits(bits)),
            Response::CpuModel { name, code } => {
                let mut field = [b' '; MODEL_NAME_LEN];
                for (slot, byte) in field.iter_mut().zip(name.bytes()) {
                    *slot = byte;
                }
                body.extend_from_slice(&field);
                push_u16(&mut body, *code);
            }
            Response::Ack => {}
        }
    } else if series == Series::IqR {
        body.extend_from_slice(&[0x00, 0x00]);
    }

    let mut buf = Vec::with_capacity(series.header_len() + body.len());
    buf.extend_from_slice(&series.response_subheader());
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

/// The declared body length of a reply whose fixed header has been read.
pub fn response_data_length(series: Series, header: &[u8]) -> Result<usize, FrameError> {
    if header.len() < series.header_len() {
        return Err(FrameError::Truncated {
            expected: series.header_len(),
            actual: header.len(),
        });
    }
    if header[..2] != series.response_subheader() {
        return Err(FrameError::BadSubheader([header[0], header[1]]));
    }
    let len_offset = series.header_len() - 2;
    Ok(usize::from(u16::from_le_bytes([
        header[len_offset],
        header[len_offset + 1],
    ])))
}

/// Decode a complete reply frame (header plus body).
pub fn decode_response(
    series: Series,
    data: &[u8],
    expect: Expect,
) -> Result<ResponseFrame, FrameError> {
    let header_len = series.header_len();
    if data.len() < header_len {
        return Err(FrameError::Truncated {
            expected: header_len,
            actual: data.len(),
        });
    }
    if data[..2] != series.response_subheader() {
        return Err(FrameError::BadSubheader([data[0], data[1]]));
    }

    let mut pos = 2;
    let serial = if series == Series::IqR {
        let serial = u16::from_le_bytes([data[pos], data[pos + 1]]);
        pos += 4; // serial + fixed word
        serial
    } else {
        0
    };
    let route = Route {
        network: data[pos],
        pc: data[pos + 1],
        io: u16::from_le_bytes([data[pos + 2], data[pos + 3]]),
        station: data[pos + 4],
    };
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
    if body.len() < 2 {
        return Err(FrameError::Truncated {
            expected: header_len + 2,
            actual: data.len(),
        });
    }

    let end_code = EndCode::from_code(u16::from_le_bytes([body[0], body[1]]));
    let payload = &body[2..];

    if !end_code.is_success() {
        // 3E failure replies stop at the end code; 4E carries two
        // abort-info bytes. Either way there is nothing further to parse.
        return Ok(ResponseFrame::failure(serial, route, end_code));
    }

    let check_len = |expected: usize| -> Result<(), FrameError> {
        if payload.len() == expected {
            Ok(())
        } else {
            Err(FrameError::LengthMismatch {
                declared: expected,
                actual: payload.len(),
            })
        }
    };

    let response = match expect {
        Expect::Words(count) => {
            check_len(usize::from(count) * 2)?;
            let words = payload
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            Response::Words(words)
        }
        Expect::Bits(count) => {
            check_len(usize::from(count).div_ceil(2))?;
            Response::Bits(unpack_bits(payload, usize::from(count)))
        }
        Expect::CpuModel => {
            check_len(MODEL_NAME_LEN + 2)?;
            let name = String::from_utf8_lossy(&payload[..MODEL_NAME_LEN])
                .trim_end()
                .to_string();
            let code = u16::from_le_bytes([payload[MODEL_NAME_LEN], payload[MODEL_NAME_LEN + 1]]);
            Response::CpuModel { name, code }
        }
        Expect::Ack => {
            check_len(0)?;
            Response::Ack
        }
    };

    Ok(ResponseFrame::success(serial, route, response))
}
