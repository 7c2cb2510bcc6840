//! CPU operating mode shared between the protocol dispatcher and the
//! scan engine.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// CPU operating mode.
///
/// `Reset` is momentary: the reset sequence clears device memory and the
/// engine's transient state, then publishes `Stop`. The cell never rests
/// in `Reset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuMode {
    /// Scanning halted, outputs held. Initial mode.
    Stop,
    /// Ladder program scanning.
    Run,
    /// Scanning halted, outputs held (operationally identical to `Stop`
    /// in the mock).
    Pause,
    /// Transient state during a reset sequence.
    Reset,
}

impl CpuMode {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Stop => 0,
            Self::Run => 1,
            Self::Pause => 2,
            Self::Reset => 3,
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Run,
            2 => Self::Pause,
            3 => Self::Reset,
            _ => Self::Stop,
        }
    }
}

impl fmt::Display for CpuMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stop => "STOP",
            Self::Run => "RUN",
            Self::Pause => "PAUSE",
            Self::Reset => "RESET",
        })
    }
}

/// Shared, lock-free holder of the CPU mode.
#[derive(Debug)]
pub struct ModeCell {
    mode: AtomicU8,
}

impl Default for ModeCell {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeCell {
    /// Create a cell in the initial `Stop` mode.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            mode: AtomicU8::new(CpuMode::Stop.as_u8()),
        }
    }

    /// Current mode.
    #[must_use]
    pub fn get(&self) -> CpuMode {
        CpuMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    /// Publish a new mode.
    pub fn set(&self, mode: CpuMode) {
        let previous = CpuMode::from_u8(self.mode.swap(mode.as_u8(), Ordering::AcqRel));
        if previous != mode {
            log::info!("cpu mode {previous} -> {mode}");
        }
    }
}
