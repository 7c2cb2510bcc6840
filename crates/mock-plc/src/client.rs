//! MC protocol client.
//!
//! Keeps one TCP connection open across calls, frames requests for the
//! configured series, and parses replies into typed results. Non-zero end
//! codes surface as [`ClientError::EndCode`] carrying the numeric code.
//! On 4E the serial number increments per request and the reply's echo is
//! verified, so a peer that answers out of order is caught immediately.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use melsec_frame::{
    Expect, FrameError, Request, RequestFrame, Response, ResponseFrame, Series, decode_response,
    encode_request, response_data_length,
};
use plc_device::DeviceClass;

/// Default socket read timeout, matching the 0x0010 × 250 ms monitoring
/// timer sent in every request.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(4);

/// Client-side errors.
#[derive(Debug)]
pub enum ClientError {
    /// No connection; call `connect` first.
    NotConnected,
    /// The peer closed the connection.
    ConnectionClosed,
    /// The peer did not answer within the timeout.
    Timeout,
    /// Any other socket error.
    Io(io::Error),
    /// The reply did not decode.
    Frame(FrameError),
    /// The 4E reply echoed a different serial than the request carried.
    SerialMismatch { sent: u16, received: u16 },
    /// The server answered with a non-zero MC end code.
    EndCode(u16),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected"),
            Self::ConnectionClosed => write!(f, "connection closed by peer"),
            Self::Timeout => write!(f, "timed out waiting for a reply"),
            Self::Io(error) => write!(f, "socket error: {error}"),
            Self::Frame(error) => write!(f, "bad reply: {error}"),
            Self::SerialMismatch { sent, received } => {
                write!(f, "serial mismatch: sent {sent}, reply echoed {received}")
            }
            Self::EndCode(code) => write!(f, "server answered end code 0x{code:04X}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<FrameError> for ClientError {
    fn from(error: FrameError) -> Self {
        Self::Frame(error)
    }
}

/// Fold socket errors into the client taxonomy.
fn io_error(error: io::Error) -> ClientError {
    match error.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => ClientError::Timeout,
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => ClientError::ConnectionClosed,
        _ => ClientError::Io(error),
    }
}

/// An MC protocol client for one server.
pub struct McClient {
    host: String,
    port: u16,
    series: Series,
    timeout: Duration,
    stream: Option<TcpStream>,
    serial: u16,
}

impl McClient {
    /// Create a client (not yet connected).
    #[must_use]
    pub fn new(host: &str, port: u16, series: Series) -> Self {
        Self {
            host: host.to_string(),
            port,
            series,
            timeout: DEFAULT_TIMEOUT,
            stream: None,
            serial: 0,
        }
    }

    /// Change the reply timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Open the connection.
    pub fn connect(&mut self) -> Result<(), ClientError> {
        let stream = TcpStream::connect((self.host.as_str(), self.port)).map_err(io_error)?;
        stream.set_read_timeout(Some(self.timeout)).map_err(io_error)?;
        stream.set_nodelay(true).map_err(io_error)?;
        log::debug!("connected to {}:{} ({})", self.host, self.port, self.series);
        self.stream = Some(stream);
        Ok(())
    }

    /// Close the connection. Safe to call when already closed.
    pub fn disconnect(&mut self) {
        self.stream = None;
    }

    /// True while a connection is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Send one request and read its reply.
    fn call(&mut self, request: Request, expect: Expect) -> Result<ResponseFrame, ClientError> {
        let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;

        let mut frame = RequestFrame::new(request);
        if self.series == Series::IqR {
            self.serial = self.serial.wrapping_add(1);
            frame.serial = self.serial;
        }

        stream
            .write_all(&encode_request(self.series, &frame))
            .map_err(io_error)?;

        let header_len = self.series.header_len();
        let mut reply = vec![0u8; header_len];
        stream.read_exact(&mut reply).map_err(io_error)?;
        let body_len = response_data_length(self.series, &reply)?;
        reply.resize(header_len + body_len, 0);
        stream
            .read_exact(&mut reply[header_len..])
            .map_err(io_error)?;

        let response = decode_response(self.series, &reply, expect)?;
        if self.series == Series::IqR && response.serial != frame.serial {
            return Err(ClientError::SerialMismatch {
                sent: frame.serial,
                received: response.serial,
            });
        }
        if !response.end_code.is_success() {
            return Err(ClientError::EndCode(response.end_code.code()));
        }
        Ok(response)
    }

    /// Read one word device.
    pub fn read_word(&mut self, class: DeviceClass, head: u32) -> Result<u16, ClientError> {
        Ok(self.read_words(class, head, 1)?[0])
    }

    /// Batch-read word devices.
    pub fn read_words(
        &mut self,
        class: DeviceClass,
        head: u32,
        count: u16,
    ) -> Result<Vec<u16>, ClientError> {
        let reply = self.call(
            Request::ReadWords { class, head, count },
            Expect::Words(count),
        )?;
        match reply.response {
            Response::Words(words) => Ok(words),
            _ => Err(ClientError::Frame(FrameError::LengthMismatch {
                declared: usize::from(count),
                actual: 0,
            })),
        }
    }

    /// Write one word device.
    pub fn write_word(
        &mut self,
        class: DeviceClass,
        head: u32,
        value: u16,
    ) -> Result<(), ClientError> {
        self.write_words(class, head, &[value])
    }

    /// Batch-write word devices.
    pub fn write_words(
        &mut self,
        class: DeviceClass,
        head: u32,
        values: &[u16],
    ) -> Result<(), ClientError> {
        self.call(
            Request::WriteWords {
                class,
                head,
                values: values.to_vec(),
            },
            Expect::Ack,
        )?;
        Ok(())
    }

    /// Read one bit device.
    pub fn read_bit(&mut self, class: DeviceClass, head: u32) -> Result<bool, ClientError> {
        Ok(self.read_bits(class, head, 1)?[0])
    }

    /// Batch-read bit devices.
    pub fn read_bits(
        &mut self,
        class: DeviceClass,
        head: u32,
        count: u16,
    ) -> Result<Vec<bool>, ClientError> {
        let reply = self.call(
            Request::ReadBits { class, head, count },
            Expect::Bits(count),
        )?;
        match reply.response {
            Response::Bits(bits) => Ok(bits),
            _ => Err(ClientError::Frame(FrameError::LengthMismatch {
                declared: usize::from(count),
                actual: 0,
            })),
        }
    }

    /// Write one bit device.
    pub fn write_bit(
        &mut self,
        class: DeviceClass,
        head: u32,
        value: bool,
    ) -> Result<(), ClientError> {
        self.write_bits(class, head, &[value])
    }

    /// Batch-write bit devices.
    pub fn write_bits(
        &mut self,
        class: DeviceClass,
        head: u32,
        bits: &[bool],
    ) -> Result<(), ClientError> {
        self.call(
            Request::WriteBits {
                class,
                head,
                bits: bits.to_vec(),
            },
            Expect::Ack,
        )?;
        Ok(())
    }

    /// Read the CPU model name.
    pub fn read_cpu_model(&mut self) -> Result<String, ClientError> {
        let reply = self.call(Request::ReadCpuModel, Expect::CpuModel)?;
        match reply.response {
            Response::CpuModel { name, .. } => Ok(name),
            _ => Err(ClientError::Frame(FrameError::LengthMismatch {
                declared: 18,
                actual: 0,
            })),
        }
    }

    /// Remote RUN: the server's engine begins scanning.
    pub fn remote_run(&mut self) -> Result<(), ClientError> {
        self.call(Request::RemoteRun, Expect::Ack).map(|_| ())
    }

    /// Remote STOP.
    pub fn remote_stop(&mut self) -> Result<(), ClientError> {
        self.call(Request::RemoteStop, Expect::Ack).map(|_| ())
    }

    /// Remote PAUSE.
    pub fn remote_pause(&mut self) -> Result<(), ClientError> {
        self.call(Request::RemotePause, Expect::Ack).map(|_| ())
    }

    /// Remote RESET: clears all device memory, mode returns to STOP.
    pub fn remote_reset(&mut self) -> Result<(), ClientError> {
        self.call(Request::RemoteReset, Expect::Ack).map(|_| ())
    }

    /// Connectivity probe: reads `D0` and discards the value.
    pub fn test_connection(&mut self) -> Result<(), ClientError> {
        self.read_word(DeviceClass::D, 0).map(|_| ())
    }
}
