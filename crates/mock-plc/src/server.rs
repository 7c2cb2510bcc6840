//! The TCP server: accept loop, per-connection handlers, frame I/O.
//!
//! Framing is length-prefixed: each request starts with the series' fixed
//! header (9 bytes for 3E, 13 for 4E), whose last two bytes give the body
//! length. A request that decodes but cannot be serviced gets an error
//! reply and the connection stays open; a request that cannot even be
//! framed (wrong subheader, truncated header) closes the connection.
//!
//! All sockets use short read timeouts so handlers and the accept loop
//! notice the shutdown flag promptly; a blocked `read` never outlives the
//! server by more than one timeout tick.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use format_ladder::ParseError;
use ladder_engine::{Engine, EngineError};
use melsec_frame::{
    ResponseFrame, decode_request, decode_request_envelope, encode_response, request_data_length,
};
use plc_device::{DeviceMemory, ModeCell};

use crate::config::ServerConfig;
use crate::handler::dispatch;

/// How long a blocked socket read waits before re-checking shutdown.
const READ_TICK: Duration = Duration::from_millis(100);

/// How long the accept loop sleeps when no connection is pending.
const ACCEPT_TICK: Duration = Duration::from_millis(10);

/// Errors from loading a ladder program into the server.
#[derive(Debug)]
pub enum LoadError {
    /// The source failed to parse.
    Parse(ParseError),
    /// The engine refused the program (not stopped).
    Engine(EngineError),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(error) => write!(f, "{error}"),
            Self::Engine(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<ParseError> for LoadError {
    fn from(error: ParseError) -> Self {
        Self::Parse(error)
    }
}

impl From<EngineError> for LoadError {
    fn from(error: EngineError) -> Self {
        Self::Engine(error)
    }
}

/// Shared state every connection handler sees.
struct Ctx {
    config: ServerConfig,
    memory: Arc<DeviceMemory>,
    engine: Arc<Engine>,
    shutdown: AtomicBool,
}

/// The mock PLC server.
pub struct Server {
    ctx: Arc<Ctx>,
    mode: Arc<ModeCell>,
    local_addr: SocketAddr,
    listener: Option<TcpListener>,
    accept_thread: Option<thread::JoinHandle<()>>,
}

impl Server {
    /// Bind the listener and spawn the ladder engine. Call [`start`] to
    /// begin accepting connections.
    ///
    /// [`start`]: Server::start
    pub fn bind(config: ServerConfig) -> io::Result<Self> {
        let listener = TcpListener::bind((config.host.as_str(), config.port))?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let memory = Arc::new(DeviceMemory::new());
        let mode = Arc::new(ModeCell::new());
        let engine = Arc::new(Engine::new(
            Arc::clone(&memory),
            Arc::clone(&mode),
            config.scan_period,
        ));

        log::info!(
            "mock plc bound to {local_addr} ({} series)",
            config.series
        );

        Ok(Self {
            ctx: Arc::new(Ctx {
                config,
                memory,
                engine,
                shutdown: AtomicBool::new(false),
            }),
            mode,
            local_addr,
            listener: Some(listener),
            accept_thread: None,
        })
    }

    /// The bound address (useful when the port was 0).
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The shared device memory.
    #[must_use]
    pub fn memory(&self) -> &Arc<DeviceMemory> {
        &self.ctx.memory
    }

    /// The ladder engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<Engine> {
        &self.ctx.engine
    }

    /// The shared CPU mode cell.
    #[must_use]
    pub fn mode(&self) -> &Arc<ModeCell> {
        &self.mode
    }

    /// Parse ladder source and load it into the engine (STOP only).
    pub fn load_program(&self, source: &str) -> Result<(), LoadError> {
        let program = format_ladder::parse(source)?;
        self.ctx.engine.load(program)?;
        Ok(())
    }

    /// Start accepting connections.
    pub fn start(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let ctx = Arc::clone(&self.ctx);
        let thread = thread::Builder::new()
            .name("mc-accept".to_string())
            .spawn(move || accept_loop(&listener, &ctx));
        match thread {
            Ok(handle) => self.accept_thread = Some(handle),
            Err(error) => log::error!("failed to spawn accept thread: {error}"),
        }
    }

    /// Signal every handler to close, join the accept loop and shut the
    /// engine down.
    pub fn stop(&mut self) {
        self.ctx.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }
        self.ctx.engine.shutdown();
        log::info!("mock plc stopped");
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(listener: &TcpListener, ctx: &Arc<Ctx>) {
    let mut handlers = Vec::new();

    while !ctx.shutdown.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, peer)) => {
                log::info!("connection from {peer}");
                let ctx = Arc::clone(ctx);
                let handle = thread::Builder::new()
                    .name(format!("mc-conn-{peer}"))
                    .spawn(move || handle_connection(stream, &ctx));
                match handle {
                    Ok(handle) => handlers.push(handle),
                    Err(error) => log::error!("failed to spawn handler: {error}"),
                }
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_TICK);
            }
            Err(error) => {
                log::error!("accept failed: {error}");
                break;
            }
        }
    }

    for handle in handlers {
        let _ = handle.join();
    }
}

/// Fill `buf` from the stream, re-checking shutdown on every timeout.
///
/// Returns false when the peer closed or the server is shutting down.
fn read_full(stream: &mut TcpStream, buf: &mut [u8], shutdown: &AtomicBool) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        if shutdown.load(Ordering::Acquire) {
            return Ok(false);
        }
        match stream.read(&mut buf[filled..]) {
            Ok(0) => return Ok(false),
            Ok(n) => filled += n,
            Err(error)
                if error.kind() == io::ErrorKind::WouldBlock
                    || error.kind() == io::ErrorKind::TimedOut => {}
            Err(error) => return Err(error),
        }
    }
    Ok(true)
}

fn handle_connection(mut stream: TcpStream, ctx: &Ctx) {
    let peer = stream
        .peer_addr()
        .map_or_else(|_| "<unknown>".to_string(), |addr| addr.to_string());
    let _ = stream.set_nodelay(true);
    // Accepted sockets can inherit the listener's nonblocking flag.
    if stream.set_nonblocking(false).is_err() || stream.set_read_timeout(Some(READ_TICK)).is_err() {
        log::error!("{peer}: cannot configure socket");
        return;
    }

    let series = ctx.config.series;
    let header_len = series.header_len();
    let mut header = vec![0u8; header_len];

    loop {
        match read_full(&mut stream, &mut header, &ctx.shutdown) {
            Ok(true) => {}
            Ok(false) => break,
            Err(error) => {
                log::warn!("{peer}: read failed: {error}");
                break;
            }
        }

        let body_len = match request_data_length(series, &header) {
            Ok(len) => len,
            Err(error) => {
                // Unframeable input: nothing sensible to reply to.
                log::warn!("{peer}: bad frame header: {error}");
                break;
            }
        };

        let mut frame = header.clone();
        frame.resize(header_len + body_len, 0);
        match read_full(&mut stream, &mut frame[header_len..], &ctx.shutdown) {
            Ok(true) => {}
            Ok(false) => break,
            Err(error) => {
                log::warn!("{peer}: read failed: {error}");
                break;
            }
        }

        let reply = match decode_request(series, &frame) {
            Ok(request) => {
                let (end_code, response) =
                    dispatch(&request.request, &ctx.memory, &ctx.engine, &ctx.config);
                log::debug!("{peer}: {:?} -> {end_code:?}", request.request);
                encode_response(
                    series,
                    &ResponseFrame {
                        serial: request.serial,
                        route: request.route,
                        end_code,
                        response,
                    },
                )
            }
            Err(error) => match decode_request_envelope(series, &frame) {
                Ok((serial, route)) => {
                    log::warn!("{peer}: unserviceable request: {error}");
                    encode_response(
                        series,
                        &ResponseFrame::failure(serial, route, error.end_code()),
                    )
                }
                Err(_) => {
                    log::warn!("{peer}: undecodable request: {error}");
                    break;
                }
            },
        };

        if let Err(error) = stream.write_all(&reply) {
            log::warn!("{peer}: write failed: {error}");
            break;
        }
    }

    log::info!("connection {peer} closed");
}
