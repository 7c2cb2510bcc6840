//! The scan engine thread.
//!
//! One thread runs the interpreter on a soft period: when a scan overruns
//! the deadline, the next scan starts immediately and the deadline rebases
//! to now (no catch-up burst). Whether a scan happens at all is governed
//! by the shared CPU mode — the thread keeps ticking in `Stop`/`Pause`
//! and simply skips execution, so a remote RUN takes effect within one
//! period.
//!
//! Control operations synchronize with the scan thread through the
//! interpreter mutex: the thread holds it for the duration of one scan,
//! never across the period sleep, so `load` and `reset` wait at most one
//! scan (or less, via the abort flag, which the interpreter checks at
//! every instruction boundary).

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use plc_device::{CpuMode, DeviceMemory, ModeCell};

use crate::instruction::Program;
use crate::interp::Interpreter;

/// Engine control errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    /// A program can only be loaded while the CPU is stopped.
    NotStopped(CpuMode),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStopped(mode) => {
                write!(f, "program load requires STOP (cpu is {mode})")
            }
        }
    }
}

impl std::error::Error for EngineError {}

struct Shared {
    interp: Mutex<Interpreter>,
    memory: Arc<DeviceMemory>,
    mode: Arc<ModeCell>,
    shutdown: AtomicBool,
    abort_scan: AtomicBool,
    scan_count: AtomicU64,
}

impl Shared {
    fn lock_interp(&self) -> MutexGuard<'_, Interpreter> {
        self.interp.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The ladder engine: owns the scan thread and the loaded program.
pub struct Engine {
    shared: Arc<Shared>,
    scan_period: Duration,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Engine {
    /// Spawn the scan thread against the shared memory and mode cell.
    ///
    /// The engine starts idle: the initial mode is whatever the cell
    /// holds (`Stop` at process start), and no program is loaded.
    #[must_use]
    pub fn new(memory: Arc<DeviceMemory>, mode: Arc<ModeCell>, scan_period: Duration) -> Self {
        let shared = Arc::new(Shared {
            interp: Mutex::new(Interpreter::new(scan_period)),
            memory,
            mode,
            shutdown: AtomicBool::new(false),
            abort_scan: AtomicBool::new(false),
            scan_count: AtomicU64::new(0),
        });

        let thread_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("ladder-scan".to_string())
            .spawn(move || scan_loop(&thread_shared, scan_period))
            .ok();
        if thread.is_none() {
            log::error!("failed to spawn scan thread; engine will not run");
        }

        Self {
            shared,
            scan_period,
            thread: Mutex::new(thread),
        }
    }

    /// The configured scan period.
    #[must_use]
    pub fn scan_period(&self) -> Duration {
        self.scan_period
    }

    /// Completed scan count since start.
    #[must_use]
    pub fn scan_count(&self) -> u64 {
        self.shared.scan_count.load(Ordering::Relaxed)
    }

    /// Load a program. Only honored while the CPU is stopped.
    pub fn load(&self, program: Program) -> Result<(), EngineError> {
        let mode = self.shared.mode.get();
        if mode != CpuMode::Stop {
            return Err(EngineError::NotStopped(mode));
        }
        let mut interp = self.shared.lock_interp();
        log::info!("program loaded: {} instructions", program.len());
        interp.set_program(program);
        Ok(())
    }

    /// Begin scanning (RUN).
    pub fn start(&self) {
        self.shared.mode.set(CpuMode::Run);
    }

    /// Halt scanning, outputs held (STOP).
    pub fn stop(&self) {
        self.shared.mode.set(CpuMode::Stop);
    }

    /// Halt scanning, outputs held (PAUSE).
    pub fn pause(&self) {
        self.shared.mode.set(CpuMode::Pause);
    }

    /// Reset: abort any in-flight scan at the next instruction boundary,
    /// clear the engine's transient state and all device memory, and
    /// publish `Stop`.
    pub fn reset(&self) {
        self.shared.mode.set(CpuMode::Reset);
        self.shared.abort_scan.store(true, Ordering::Release);
        // Taking the interpreter lock waits out any in-flight scan.
        let mut interp = self.shared.lock_interp();
        self.shared.abort_scan.store(false, Ordering::Release);
        interp.clear_transient();
        self.shared.memory.reset_all();
        self.shared.mode.set(CpuMode::Stop);
    }

    /// Stop the scan thread. An in-flight scan completes to the next
    /// instruction boundary before the thread exits.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.abort_scan.store(true, Ordering::Release);
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        self.shared.abort_scan.store(false, Ordering::Release);
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn scan_loop(shared: &Shared, period: Duration) {
    log::info!("scan thread running, period {period:?}");
    let mut deadline = Instant::now();

    while !shared.shutdown.load(Ordering::Acquire) {
        if shared.mode.get() == CpuMode::Run {
            let mut interp = shared.lock_interp();
            // Re-check under the lock: a reset may have landed while this
            // thread waited, and a stale scan would repaint cleared memory.
            if shared.mode.get() == CpuMode::Run
                && interp.scan_abortable(&shared.memory, &shared.abort_scan)
            {
                shared.scan_count.fetch_add(1, Ordering::Relaxed);
            }
        }

        deadline += period;
        let now = Instant::now();
        if deadline <= now {
            // Overrun: start the next scan immediately, no catch-up.
            deadline = now;
        } else {
            thread::sleep(deadline - now);
        }
    }
    log::info!("scan thread exiting after {} scans", shared.scan_count.load(Ordering::Relaxed));
}
