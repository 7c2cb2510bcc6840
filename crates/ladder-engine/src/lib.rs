//! Ladder-logic execution: the compiled instruction set, a stack-based
//! scan interpreter, and the engine thread that runs it on a soft period
//! against the shared device memory.
//!
//! The interpreter mirrors a real PLC's evaluation model: a boolean
//! accumulator carries the current rung result, a block stack serves
//! `ANB`/`ORB`, and a branch stack serves `MPS`/`MRD`/`MPP`. Device
//! memory is read at the moment each instruction executes, so MC protocol
//! writes land between instructions exactly as they do on hardware.

mod engine;
mod instruction;
mod interp;

pub use engine::{Engine, EngineError};
pub use instruction::{Instruction, Operand, Program};
pub use interp::{
    ALWAYS_OFF_RELAY, ALWAYS_ON_RELAY, DEFAULT_SCAN_PERIOD, DIAG_RELAY, Interpreter,
};
