//! Stack-based scan interpreter.
//!
//! One `scan()` executes the program from the first instruction to `END`.
//! Evaluation state is a boolean accumulator, a block stack (`ANB`/`ORB`)
//! and a branch stack (`MPS`/`MRD`/`MPP`), all cleared at scan start.
//! `LD`/`LDI` push the running accumulator onto the block stack and load a
//! fresh one, which is what lets `LD A / LD B / ORB` express parallel
//! blocks the way GX IL does.
//!
//! Timer and counter working state (elapsed time, edge memory, counts) is
//! private to the interpreter, keyed by timer/counter number; device
//! memory only ever holds the resulting `TN`/`CN` words and contact bits.
//! Contacts are written before current values: clearing a contact clears
//! the paired current value, so the value write must land last.
//!
//! Runtime faults (division by zero, word access to a bit device, stack
//! underflow) never abort the scan: the diagnostic relay `SM1` latches
//! and execution continues with the faulting instruction skipped.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use plc_device::{DeviceClass, DeviceError, DeviceMemory, DeviceRef};

use crate::instruction::{Instruction, Operand, Program};

/// Default scan period: 10 ms, a soft minimum.
pub const DEFAULT_SCAN_PERIOD: Duration = Duration::from_millis(10);

/// `SM1`: latched diagnostic relay for runtime faults.
pub const DIAG_RELAY: u32 = 1;

/// `SM400`: always ON while scanning.
pub const ALWAYS_ON_RELAY: u32 = 400;

/// `SM401`: always OFF while scanning.
pub const ALWAYS_OFF_RELAY: u32 = 401;

/// A runtime fault inside one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    DivideByZero,
    BitOperandExpected(DeviceRef),
    WordOperandExpected(DeviceRef),
    BlockStackUnderflow,
    BranchStackUnderflow,
    TimerIndex(u16),
    CounterIndex(u16),
    Device(DeviceError),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DivideByZero => write!(f, "division by zero"),
            Self::BitOperandExpected(device) => {
                write!(f, "{device} is not a bit device")
            }
            Self::WordOperandExpected(device) => {
                write!(f, "{device} is not a word device")
            }
            Self::BlockStackUnderflow => write!(f, "block stack underflow"),
            Self::BranchStackUnderflow => write!(f, "branch stack underflow"),
            Self::TimerIndex(timer) => write!(f, "timer T{timer} out of range"),
            Self::CounterIndex(counter) => write!(f, "counter C{counter} out of range"),
            Self::Device(error) => write!(f, "{error}"),
        }
    }
}

impl From<DeviceError> for Fault {
    fn from(error: DeviceError) -> Self {
        Self::Device(error)
    }
}

/// Working state of one timer.
#[derive(Debug, Clone, Copy, Default)]
struct TimerState {
    /// Accumulated on-time in milliseconds.
    elapsed_ms: u32,
}

/// Working state of one counter.
#[derive(Debug, Clone, Copy, Default)]
struct CounterState {
    current: u16,
    last_input: bool,
}

/// The scan interpreter.
pub struct Interpreter {
    program: Program,
    scan_period: Duration,
    period_ms: u32,
    acc: bool,
    block_stack: Vec<bool>,
    branch_stack: Vec<bool>,
    /// Previous-scan accumulator per instruction index (PLS/PLF edges).
    prev_acc: Vec<bool>,
    timers: HashMap<u16, TimerState>,
    counters: HashMap<u16, CounterState>,
}

impl Interpreter {
    /// Create an interpreter with an empty program.
    #[must_use]
    pub fn new(scan_period: Duration) -> Self {
        Self {
            program: Program::default(),
            scan_period,
            period_ms: scan_period.as_millis() as u32,
            acc: false,
            block_stack: Vec::new(),
            branch_stack: Vec::new(),
            prev_acc: Vec::new(),
            timers: HashMap::new(),
            counters: HashMap::new(),
        }
    }

    /// Replace the program and clear all transient state.
    pub fn set_program(&mut self, program: Program) {
        self.prev_acc = vec![false; program.len()];
        self.program = program;
        self.clear_transient();
    }

    /// The loaded program.
    #[must_use]
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// The configured scan period.
    #[must_use]
    pub fn scan_period(&self) -> Duration {
        self.scan_period
    }

    /// Drop all working state: stacks, edge memory, timers, counters.
    pub fn clear_transient(&mut self) {
        self.acc = false;
        self.block_stack.clear();
        self.branch_stack.clear();
        self.prev_acc.fill(false);
        self.timers.clear();
        self.counters.clear();
    }

    /// Execute one full scan.
    pub fn scan(&mut self, memory: &DeviceMemory) {
        let no_abort = AtomicBool::new(false);
        self.scan_abortable(memory, &no_abort);
    }

    /// Execute one scan, bailing at the next instruction boundary once
    /// `abort` is set. Returns true when the scan ran to `END`.
    pub fn scan_abortable(&mut self, memory: &DeviceMemory, abort: &AtomicBool) -> bool {
        self.acc = false;
        self.block_stack.clear();
        self.branch_stack.clear();

        // System relays are refreshed at the top of every scan.
        let _ = memory.write_bit(DeviceClass::Sm, ALWAYS_ON_RELAY, true);
        let _ = memory.write_bit(DeviceClass::Sm, ALWAYS_OFF_RELAY, false);

        for index in 0..self.program.len() {
            if abort.load(Ordering::Relaxed) {
                return false;
            }
            let instruction = self.program.instructions()[index].clone();
            if instruction == Instruction::End {
                break;
            }
            if let Err(fault) = self.execute(memory, index, &instruction) {
                log::warn!("instruction {index} ({instruction:?}): {fault}");
                let _ = memory.write_bit(DeviceClass::Sm, DIAG_RELAY, true);
            }
        }
        true
    }

    fn execute(
        &mut self,
        memory: &DeviceMemory,
        index: usize,
        instruction: &Instruction,
    ) -> Result<(), Fault> {
        match *instruction {
            Instruction::Ld(device) => {
                let value = contact(memory, device)?;
                self.block_stack.push(self.acc);
                self.acc = value;
            }
            Instruction::Ldi(device) => {
                let value = contact(memory, device)?;
                self.block_stack.push(self.acc);
                self.acc = !value;
            }
            Instruction::And(device) => self.acc = self.acc && contact(memory, device)?,
            Instruction::Ani(device) => self.acc = self.acc && !contact(memory, device)?,
            Instruction::Or(device) => self.acc = self.acc || contact(memory, device)?,
            Instruction::Ori(device) => self.acc = self.acc || !contact(memory, device)?,
            Instruction::Anb => {
                let block = self.block_stack.pop().ok_or(Fault::BlockStackUnderflow)?;
                self.acc = block && self.acc;
            }
            Instruction::Orb => {
                let block = self.block_stack.pop().ok_or(Fault::BlockStackUnderflow)?;
                self.acc = block || self.acc;
            }
            Instruction::Mps => self.branch_stack.push(self.acc),
            Instruction::Mrd => {
                self.acc = *self
                    .branch_stack
                    .last()
                    .ok_or(Fault::BranchStackUnderflow)?;
            }
            Instruction::Mpp => {
                self.acc = self.branch_stack.pop().ok_or(Fault::BranchStackUnderflow)?;
            }
            Instruction::Out(device) => {
                memory.write_bit(device.class, device.head, self.acc)?;
            }
            Instruction::Set(device) => {
                if self.acc {
                    memory.write_bit(device.class, device.head, true)?;
                }
            }
            Instruction::Rst(device) => {
                if self.acc {
                    memory.write_bit(device.class, device.head, false)?;
                }
            }
            Instruction::Pls(device) => {
                let rising = self.acc && !self.prev_acc[index];
                self.prev_acc[index] = self.acc;
                memory.write_bit(device.class, device.head, rising)?;
            }
            Instruction::Plf(device) => {
                let falling = !self.acc && self.prev_acc[index];
                self.prev_acc[index] = self.acc;
                memory.write_bit(device.class, device.head, falling)?;
            }
            Instruction::OutTimer { timer, preset } => self.out_timer(memory, timer, preset)?,
            Instruction::OutCounter { counter, preset } => {
                self.out_counter(memory, counter, preset)?;
            }
            Instruction::RstTimer(timer) => {
                if self.acc {
                    if u32::from(timer) >= DeviceClass::Tn.size() {
                        return Err(Fault::TimerIndex(timer));
                    }
                    if let Some(state) = self.timers.get_mut(&timer) {
                        state.elapsed_ms = 0;
                    }
                    memory.write_bit(DeviceClass::Tc, u32::from(timer), false)?;
                    memory.write_bit(DeviceClass::Ts, u32::from(timer), false)?;
                }
            }
            Instruction::RstCounter(counter) => {
                if self.acc {
                    if u32::from(counter) >= DeviceClass::Cn.size() {
                        return Err(Fault::CounterIndex(counter));
                    }
                    if let Some(state) = self.counters.get_mut(&counter) {
                        state.current = 0;
                    }
                    memory.write_bit(DeviceClass::Cc, u32::from(counter), false)?;
                    memory.write_bit(DeviceClass::Cs, u32::from(counter), false)?;
                }
            }
            Instruction::Mov { src, dst } => {
                if self.acc {
                    let value = word_value(memory, src)?;
                    write_word(memory, dst, value as u16)?;
                }
            }
            Instruction::Add { a, b, dst } => self.arithmetic(memory, a, b, dst, i16::wrapping_add)?,
            Instruction::Sub { a, b, dst } => self.arithmetic(memory, a, b, dst, i16::wrapping_sub)?,
            Instruction::Mul { a, b, dst } => self.arithmetic(memory, a, b, dst, i16::wrapping_mul)?,
            Instruction::Div { a, b, dst } => {
                if self.acc {
                    let divisor = word_value(memory, b)?;
                    if divisor == 0 {
                        return Err(Fault::DivideByZero);
                    }
                    let dividend = word_value(memory, a)?;
                    write_word(memory, dst, dividend.wrapping_div(divisor) as u16)?;
                }
            }
            Instruction::End => {}
        }
        Ok(())
    }

    fn arithmetic(
        &mut self,
        memory: &DeviceMemory,
        a: Operand,
        b: Operand,
        dst: DeviceRef,
        op: fn(i16, i16) -> i16,
    ) -> Result<(), Fault> {
        if self.acc {
            let lhs = word_value(memory, a)?;
            let rhs = word_value(memory, b)?;
            write_word(memory, dst, op(lhs, rhs) as u16)?;
        }
        Ok(())
    }

    fn out_timer(&mut self, memory: &DeviceMemory, timer: u16, preset: u16) -> Result<(), Fault> {
        if u32::from(timer) >= DeviceClass::Tn.size() {
            return Err(Fault::TimerIndex(timer));
        }
        let head = u32::from(timer);
        let period_ms = self.period_ms;
        let acc = self.acc;
        let state = self.timers.entry(timer).or_default();

        if acc {
            // A protocol-side reset clears TN between scans; track it so
            // the timer restarts instead of resurrecting its contact.
            let current = u32::from(memory.read_word(DeviceClass::Tn, head)?);
            if current * 100 < state.elapsed_ms {
                state.elapsed_ms = current * 100;
            }
            state.elapsed_ms = state.elapsed_ms.saturating_add(period_ms);

            let done = state.elapsed_ms >= u32::from(preset) * 100;
            let ticks = (state.elapsed_ms / 100).min(u32::from(preset)) as u16;
            memory.write_bit(DeviceClass::Tc, head, done)?;
            memory.write_bit(DeviceClass::Ts, head, done)?;
            memory.write_word(DeviceClass::Tn, head, ticks)?;
        } else {
            state.elapsed_ms = 0;
            memory.write_bit(DeviceClass::Tc, head, false)?;
            memory.write_bit(DeviceClass::Ts, head, false)?;
        }
        Ok(())
    }

    fn out_counter(
        &mut self,
        memory: &DeviceMemory,
        counter: u16,
        preset: u16,
    ) -> Result<(), Fault> {
        if u32::from(counter) >= DeviceClass::Cn.size() {
            return Err(Fault::CounterIndex(counter));
        }
        let head = u32::from(counter);
        let mem_current = memory.read_word(DeviceClass::Cn, head)?;
        let acc = self.acc;
        let state = self.counters.entry(counter).or_default();

        // A protocol-side reset clears CN between scans.
        if mem_current < state.current {
            state.current = mem_current;
        }
        let rising = acc && !state.last_input;
        state.last_input = acc;
        if rising {
            state.current = state.current.saturating_add(1);
        }

        let done = state.current >= preset;
        let current = state.current;
        memory.write_bit(DeviceClass::Cc, head, done)?;
        memory.write_bit(DeviceClass::Cs, head, done)?;
        memory.write_word(DeviceClass::Cn, head, current)?;
        Ok(())
    }
}

fn contact(memory: &DeviceMemory, device: DeviceRef) -> Result<bool, Fault> {
    if !device.class.is_bit() {
        return Err(Fault::BitOperandExpected(device));
    }
    Ok(memory.read_bit(device.class, device.head)?)
}

fn word_value(memory: &DeviceMemory, operand: Operand) -> Result<i16, Fault> {
    match operand {
        Operand::Const(value) => Ok(value),
        Operand::Device(device) => {
            if device.class.is_bit() {
                return Err(Fault::WordOperandExpected(device));
            }
            Ok(memory.read_word(device.class, device.head)? as i16)
        }
    }
}

fn write_word(memory: &DeviceMemory, device: DeviceRef, value: u16) -> Result<(), Fault> {
    if device.class.is_bit() {
        return Err(Fault::WordOperandExpected(device));
    }
    memory.write_word(device.class, device.head, value)?;
    Ok(())
}
