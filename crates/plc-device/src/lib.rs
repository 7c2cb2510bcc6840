//! MELSEC device model: typed device classes, the simulated device memory,
//! and the shared CPU operating mode.
//!
//! Device memory is the substrate everything else runs against: the MC
//! protocol handlers and the ladder scan engine both read and write it
//! concurrently for the lifetime of the process.

mod class;
mod memory;
mod mode;

pub use class::{DeviceClass, DeviceRef, RefParseError, Width};
pub use memory::{DeviceError, DeviceMemory, MAX_BIT_POINTS, MAX_WORD_POINTS};
pub use mode::{CpuMode, ModeCell};
