//! Simulated device memory.
//!
//! One storage bank per device class, each behind its own lock, so MC
//! request handlers and the ladder scan thread interleave at single-slot
//! granularity. Multi-point reads and writes hold one class lock for the
//! span of the copy; nothing ever holds two word-bank locks at once.
//!
//! Timer/counter aliasing: clearing a `TC`/`TS` (or `CC`/`CS`) bit also
//! clears the paired `TN` (`CN`) current value, so a protocol-side reset
//! cannot leave a contact and its current value disagreeing.

use std::fmt;
use std::sync::Mutex;

use crate::class::{DeviceClass, Width};

/// Maximum points in one bit-unit batch operation (MC ceiling).
pub const MAX_BIT_POINTS: u32 = 3584;

/// Maximum points in one word-unit batch operation (MC ceiling).
pub const MAX_WORD_POINTS: u32 = 960;

/// Errors raised by device memory operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// The class does not support the requested access width.
    InvalidDevice(DeviceClass, Width),
    /// Head (or head + count) lies outside the class's address space.
    AddressOutOfRange(DeviceClass, u32),
    /// Point count is zero or exceeds the MC ceiling for the width.
    PointCount(u32),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDevice(class, width) => {
                write!(f, "device class {class} does not support {width:?} access")
            }
            Self::AddressOutOfRange(class, head) => {
                write!(
                    f,
                    "address {class}{head} out of range (class size {})",
                    class.size()
                )
            }
            Self::PointCount(count) => write!(f, "invalid point count {count}"),
        }
    }
}

impl std::error::Error for DeviceError {}

/// Storage for one device class.
enum Cells {
    Bits(Vec<bool>),
    Words(Vec<u16>),
}

impl Cells {
    fn clear(&mut self) {
        match self {
            Self::Bits(bits) => bits.fill(false),
            Self::Words(words) => words.fill(0),
        }
    }
}

/// The simulated device memory: every class, zero-initialized.
pub struct DeviceMemory {
    banks: Vec<Mutex<Cells>>,
}

impl Default for DeviceMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceMemory {
    /// Create a device memory with every device at 0.
    #[must_use]
    pub fn new() -> Self {
        let banks = DeviceClass::ALL
            .iter()
            .map(|class| {
                let size = class.size() as usize;
                Mutex::new(match class.width() {
                    Width::Bit => Cells::Bits(vec![false; size]),
                    Width::Word => Cells::Words(vec![0; size]),
                })
            })
            .collect();
        Self { banks }
    }

    /// Validate that `head..head + count` fits the class's address space.
    fn check_range(class: DeviceClass, head: u32, count: u32) -> Result<(), DeviceError> {
        let end = u64::from(head) + u64::from(count);
        if end > u64::from(class.size()) {
            return Err(DeviceError::AddressOutOfRange(class, head));
        }
        Ok(())
    }

    fn check_count(width: Width, count: u32) -> Result<(), DeviceError> {
        let max = match width {
            Width::Bit => MAX_BIT_POINTS,
            Width::Word => MAX_WORD_POINTS,
        };
        if count == 0 || count > max {
            return Err(DeviceError::PointCount(count));
        }
        Ok(())
    }

    fn bank(&self, class: DeviceClass) -> &Mutex<Cells> {
        &self.banks[class.index()]
    }

    /// Read a single bit.
    pub fn read_bit(&self, class: DeviceClass, head: u32) -> Result<bool, DeviceError> {
        if !class.is_bit() {
            return Err(DeviceError::InvalidDevice(class, Width::Bit));
        }
        Self::check_range(class, head, 1)?;
        match &*lock(self.bank(class)) {
            Cells::Bits(bits) => Ok(bits[head as usize]),
            Cells::Words(_) => Err(DeviceError::InvalidDevice(class, Width::Bit)),
        }
    }

    /// Write a single bit.
    ///
    /// Writing 0 to a timer/counter contact or coil also clears the paired
    /// current-value register (MC `RST` semantics).
    pub fn write_bit(&self, class: DeviceClass, head: u32, value: bool) -> Result<(), DeviceError> {
        if !class.is_bit() {
            return Err(DeviceError::InvalidDevice(class, Width::Bit));
        }
        Self::check_range(class, head, 1)?;
        if let Cells::Bits(bits) = &mut *lock(self.bank(class)) {
            bits[head as usize] = value;
        }
        if !value {
            if let Some(current) = class.paired_current() {
                // Contact heads beyond the current-value space have no pair.
                if head < current.size() {
                    self.write_word(current, head, 0)?;
                }
            }
        }
        Ok(())
    }

    /// Read a single word.
    pub fn read_word(&self, class: DeviceClass, head: u32) -> Result<u16, DeviceError> {
        if class.is_bit() {
            return Err(DeviceError::InvalidDevice(class, Width::Word));
        }
        Self::check_range(class, head, 1)?;
        match &*lock(self.bank(class)) {
            Cells::Words(words) => Ok(words[head as usize]),
            Cells::Bits(_) => Err(DeviceError::InvalidDevice(class, Width::Word)),
        }
    }

    /// Write a single word.
    pub fn write_word(&self, class: DeviceClass, head: u32, value: u16) -> Result<(), DeviceError> {
        if class.is_bit() {
            return Err(DeviceError::InvalidDevice(class, Width::Word));
        }
        Self::check_range(class, head, 1)?;
        if let Cells::Words(words) = &mut *lock(self.bank(class)) {
            words[head as usize] = value;
        }
        Ok(())
    }

    /// Read `count` consecutive bits starting at `head`.
    pub fn read_bits(
        &self,
        class: DeviceClass,
        head: u32,
        count: u32,
    ) -> Result<Vec<bool>, DeviceError> {
        if !class.is_bit() {
            return Err(DeviceError::InvalidDevice(class, Width::Bit));
        }
        Self::check_count(Width::Bit, count)?;
        Self::check_range(class, head, count)?;
        match &*lock(self.bank(class)) {
            Cells::Bits(bits) => {
                Ok(bits[head as usize..(head + count) as usize].to_vec())
            }
            Cells::Words(_) => Err(DeviceError::InvalidDevice(class, Width::Bit)),
        }
    }

    /// Write consecutive bits starting at `head`.
    pub fn write_bits(
        &self,
        class: DeviceClass,
        head: u32,
        values: &[bool],
    ) -> Result<(), DeviceError> {
        if !class.is_bit() {
            return Err(DeviceError::InvalidDevice(class, Width::Bit));
        }
        let count = values.len() as u32;
        Self::check_count(Width::Bit, count)?;
        Self::check_range(class, head, count)?;
        if let Cells::Bits(bits) = &mut *lock(self.bank(class)) {
            bits[head as usize..(head + count) as usize].copy_from_slice(values);
        }
        if let Some(current) = class.paired_current() {
            for (offset, value) in values.iter().enumerate() {
                let n = head + offset as u32;
                if !value && n < current.size() {
                    self.write_word(current, n, 0)?;
                }
            }
        }
        Ok(())
    }

    /// Read `count` consecutive words starting at `head`.
    pub fn read_words(
        &self,
        class: DeviceClass,
        head: u32,
        count: u32,
    ) -> Result<Vec<u16>, DeviceError> {
        if class.is_bit() {
            return Err(DeviceError::InvalidDevice(class, Width::Word));
        }
        Self::check_count(Width::Word, count)?;
        Self::check_range(class, head, count)?;
        match &*lock(self.bank(class)) {
            Cells::Words(words) => {
                Ok(words[head as usize..(head + count) as usize].to_vec())
            }
            Cells::Bits(_) => Err(DeviceError::InvalidDevice(class, Width::Word)),
        }
    }

    /// Write consecutive words starting at `head`.
    pub fn write_words(
        &self,
        class: DeviceClass,
        head: u32,
        values: &[u16],
    ) -> Result<(), DeviceError> {
        if class.is_bit() {
            return Err(DeviceError::InvalidDevice(class, Width::Word));
        }
        let count = values.len() as u32;
        Self::check_count(Width::Word, count)?;
        Self::check_range(class, head, count)?;
        if let Cells::Words(words) = &mut *lock(self.bank(class)) {
            words[head as usize..(head + count) as usize].copy_from_slice(values);
        }
        Ok(())
    }

    /// Clear every device in every class to 0.
    pub fn reset_all(&self) {
        for bank in &self.banks {
            lock(bank).clear();
        }
        log::debug!("device memory cleared");
    }
}

/// Lock a bank, recovering from a poisoned mutex.
///
/// A panic while holding a bank lock can only leave a half-written range,
/// which the mock treats the same as a torn multi-point write.
fn lock(bank: &Mutex<Cells>) -> std::sync::MutexGuard<'_, Cells> {
    bank.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
