//! Mock MELSEC PLC over TCP.
//!
//! The server accepts MC protocol connections (3E or 4E framing, fixed at
//! construction), dispatches batch read/write and remote-control commands
//! onto the shared device memory and CPU mode, and runs the ladder scan
//! engine concurrently against the same memory. The client is the
//! symmetric half: it frames requests, parses replies and surfaces MC end
//! codes as typed errors.

mod client;
mod config;
mod handler;
mod server;

pub use client::{ClientError, McClient};
pub use config::ServerConfig;
pub use server::{LoadError, Server};
