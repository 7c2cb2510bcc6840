//! Ladder text format parser.
//!
//! A line-oriented instruction-list format in the GX Works style:
//!
//! ```text
//! ; self-holding start circuit
//! NETWORK 1
//! COMMENT motor latch
//! LD X0
//! OR Y0
//! ANI X1
//! OUT Y0
//! END
//! ```
//!
//! Comment lines start with `;` or `//`. `NETWORK <n>` opens a rung
//! group and `COMMENT <text>` annotates it; both compile to nothing.
//! Instruction lines are `MNEMONIC OPERAND…` with device references
//! (`X0`, `M100`, `TC3`, `ZR1000` — head numbers in the class radix) and
//! immediates `K<dec>` / `H<hex>` as signed 16-bit values. Timers and
//! counters use the `T`/`C` pseudo-classes: `OUT T0 K10`, `RST C2`.
//!
//! The recognized mnemonic set is exactly one textual form per compiled
//! instruction variant. Any error rejects the whole program; nothing
//! partial ever loads.

use std::fmt;

use ladder_engine::{Instruction, Operand, Program};
use plc_device::{DeviceClass, DeviceRef, RefParseError};

/// What went wrong on a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Mnemonic not in the instruction set.
    UnknownMnemonic,
    /// Line needs more operands.
    MissingOperand,
    /// Line has operands beyond what the mnemonic takes.
    ExtraOperand,
    /// Token is not a device reference.
    UnknownDevice,
    /// Head number or constant failed to parse in its radix.
    BadNumber,
    /// Head number beyond the class's address space.
    AddressOutOfRange,
    /// Immediate constant where a contact or coil is required.
    ConstantInBitContext,
    /// Bit device where a word device is required.
    WordDeviceExpected,
    /// Word device where a bit device is required.
    BitDeviceExpected,
}

impl ErrorKind {
    const fn describe(self) -> &'static str {
        match self {
            Self::UnknownMnemonic => "unknown mnemonic",
            Self::MissingOperand => "missing operand",
            Self::ExtraOperand => "unexpected extra operand",
            Self::UnknownDevice => "unknown device",
            Self::BadNumber => "bad number",
            Self::AddressOutOfRange => "address out of range",
            Self::ConstantInBitContext => "constant not allowed here",
            Self::WordDeviceExpected => "word device required",
            Self::BitDeviceExpected => "bit device required",
        }
    }
}

/// A parse error: 1-based line number plus the offending token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// 1-based source line.
    pub line: usize,
    /// The token the error points at.
    pub token: String,
    /// Error category.
    pub kind: ErrorKind,
}

impl ParseError {
    fn new(line: usize, token: &str, kind: ErrorKind) -> Self {
        Self {
            line,
            token: token.to_string(),
            kind,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {}: {} '{}'",
            self.line,
            self.kind.describe(),
            self.token
        )
    }
}

impl std::error::Error for ParseError {}

/// A timer or counter pseudo-class operand (`T0`, `C2`).
enum Pseudo {
    Timer(u16),
    Counter(u16),
}

/// Parse ladder source into a compiled program.
pub fn parse(source: &str) -> Result<Program, ParseError> {
    let mut instructions = Vec::new();

    for (index, raw) in source.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with("//") {
            continue;
        }

        let mut tokens = line.split_whitespace();
        let Some(first) = tokens.next() else {
            continue;
        };
        let mnemonic = first.to_ascii_uppercase();
        let mut cursor = Cursor {
            line: line_no,
            tokens,
        };

        match mnemonic.as_str() {
            "NETWORK" => {
                let token = cursor.next("NETWORK")?;
                if token.parse::<u32>().is_err() {
                    return Err(ParseError::new(line_no, token, ErrorKind::BadNumber));
                }
                cursor.finish()?;
            }
            // Free text to end of line.
            "COMMENT" => {}

            "LD" => instructions.push(Instruction::Ld(cursor.bit_device()?)),
            "LDI" => instructions.push(Instruction::Ldi(cursor.bit_device()?)),
            "AND" => instructions.push(Instruction::And(cursor.bit_device()?)),
            "ANI" => instructions.push(Instruction::Ani(cursor.bit_device()?)),
            "OR" => instructions.push(Instruction::Or(cursor.bit_device()?)),
            "ORI" => instructions.push(Instruction::Ori(cursor.bit_device()?)),

            "ANB" => instructions.push(Instruction::Anb),
            "ORB" => instructions.push(Instruction::Orb),
            "MPS" => instructions.push(Instruction::Mps),
            "MRD" => instructions.push(Instruction::Mrd),
            "MPP" => instructions.push(Instruction::Mpp),

            "OUT" => {
                let token = cursor.next("OUT")?;
                match parse_pseudo(line_no, token)? {
                    Some(Pseudo::Timer(timer)) => {
                        let preset = cursor.preset()?;
                        instructions.push(Instruction::OutTimer { timer, preset });
                    }
                    Some(Pseudo::Counter(counter)) => {
                        let preset = cursor.preset()?;
                        instructions.push(Instruction::OutCounter { counter, preset });
                    }
                    None => {
                        instructions.push(Instruction::Out(bit_device(line_no, token)?));
                    }
                }
            }
            "SET" => instructions.push(Instruction::Set(cursor.bit_device()?)),
            "RST" => {
                let token = cursor.next("RST")?;
                match parse_pseudo(line_no, token)? {
                    Some(Pseudo::Timer(timer)) => instructions.push(Instruction::RstTimer(timer)),
                    Some(Pseudo::Counter(counter)) => {
                        instructions.push(Instruction::RstCounter(counter));
                    }
                    None => instructions.push(Instruction::Rst(bit_device(line_no, token)?)),
                }
            }
            "PLS" => instructions.push(Instruction::Pls(cursor.bit_device()?)),
            "PLF" => instructions.push(Instruction::Plf(cursor.bit_device()?)),

            "MOV" => {
                let src = cursor.word_operand()?;
                let dst = cursor.word_device()?;
                instructions.push(Instruction::Mov { src, dst });
            }
            "ADD" | "SUB" | "MUL" | "DIV" => {
                let a = cursor.word_operand()?;
                let b = cursor.word_operand()?;
                let dst = cursor.word_device()?;
                instructions.push(match mnemonic.as_str() {
                    "ADD" => Instruction::Add { a, b, dst },
                    "SUB" => Instruction::Sub { a, b, dst },
                    "MUL" => Instruction::Mul { a, b, dst },
                    _ => Instruction::Div { a, b, dst },
                });
            }

            "END" => {
                cursor.finish()?;
                instructions.push(Instruction::End);
            }

            _ => return Err(ParseError::new(line_no, first, ErrorKind::UnknownMnemonic)),
        }

        if mnemonic != "COMMENT" {
            cursor.finish()?;
        }
    }

    Ok(Program::new(instructions))
}

/// Token cursor for one instruction line.
struct Cursor<'a> {
    line: usize,
    tokens: std::str::SplitWhitespace<'a>,
}

impl<'a> Cursor<'a> {
    fn next(&mut self, fallback: &str) -> Result<&'a str, ParseError> {
        self.tokens
            .next()
            .ok_or_else(|| ParseError::new(self.line, fallback, ErrorKind::MissingOperand))
    }

    fn finish(&mut self) -> Result<(), ParseError> {
        match self.tokens.next() {
            Some(extra) => Err(ParseError::new(self.line, extra, ErrorKind::ExtraOperand)),
            None => Ok(()),
        }
    }

    fn bit_device(&mut self) -> Result<DeviceRef, ParseError> {
        let line = self.line;
        let token = self.next("")?;
        bit_device(line, token)
    }

    fn word_device(&mut self) -> Result<DeviceRef, ParseError> {
        let line = self.line;
        let token = self.next("")?;
        let device = parse_device(line, token)?;
        if device.class.is_bit() {
            return Err(ParseError::new(line, token, ErrorKind::WordDeviceExpected));
        }
        Ok(device)
    }

    fn word_operand(&mut self) -> Result<Operand, ParseError> {
        let line = self.line;
        let token = self.next("")?;
        if let Some(value) = parse_constant(line, token)? {
            return Ok(Operand::Const(value));
        }
        let device = parse_device(line, token)?;
        if device.class.is_bit() {
            return Err(ParseError::new(line, token, ErrorKind::WordDeviceExpected));
        }
        Ok(Operand::Device(device))
    }

    /// Timer/counter preset: a non-negative `K` or `H` constant.
    fn preset(&mut self) -> Result<u16, ParseError> {
        let line = self.line;
        let token = self.next("")?;
        match parse_constant(line, token)? {
            Some(value) if value >= 0 => Ok(value as u16),
            Some(_) => Err(ParseError::new(line, token, ErrorKind::BadNumber)),
            None => Err(ParseError::new(line, token, ErrorKind::BadNumber)),
        }
    }
}

fn bit_device(line: usize, token: &str) -> Result<DeviceRef, ParseError> {
    if parse_constant(line, token)?.is_some() {
        return Err(ParseError::new(line, token, ErrorKind::ConstantInBitContext));
    }
    let device = parse_device(line, token)?;
    if !device.class.is_bit() {
        return Err(ParseError::new(line, token, ErrorKind::BitDeviceExpected));
    }
    Ok(device)
}

/// `K<dec>` / `H<hex>` immediates. Returns `None` for anything else so the
/// caller can try a device reference.
fn parse_constant(line: usize, token: &str) -> Result<Option<i16>, ParseError> {
    let upper = token.to_ascii_uppercase();
    if let Some(digits) = upper.strip_prefix('K') {
        // K belongs to no device class, so the rest must be a number.
        let value = digits
            .parse::<i16>()
            .map_err(|_| ParseError::new(line, token, ErrorKind::BadNumber))?;
        return Ok(Some(value));
    }
    if let Some(digits) = upper.strip_prefix('H') {
        let value = u16::from_str_radix(digits, 16)
            .map_err(|_| ParseError::new(line, token, ErrorKind::BadNumber))?;
        return Ok(Some(value as i16));
    }
    Ok(None)
}

/// `T<n>` / `C<n>` pseudo-classes for timer and counter coils.
fn parse_pseudo(line: usize, token: &str) -> Result<Option<Pseudo>, ParseError> {
    let upper = token.to_ascii_uppercase();
    let (kind, digits) = match upper.split_at_checked(1) {
        Some(("T", digits)) if !digits.is_empty() => (true, digits),
        Some(("C", digits)) if !digits.is_empty() => (false, digits),
        _ => return Ok(None),
    };
    if !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        // Two-letter classes like TC or CS fall through to device parsing.
        return Ok(None);
    }
    let number = digits
        .parse::<u16>()
        .map_err(|_| ParseError::new(line, token, ErrorKind::BadNumber))?;
    let space = if kind {
        DeviceClass::Tn.size()
    } else {
        DeviceClass::Cn.size()
    };
    if u32::from(number) >= space {
        return Err(ParseError::new(line, token, ErrorKind::AddressOutOfRange));
    }
    Ok(Some(if kind {
        Pseudo::Timer(number)
    } else {
        Pseudo::Counter(number)
    }))
}

/// A device reference, with the reference error mapped to a line error.
fn parse_device(line: usize, token: &str) -> Result<DeviceRef, ParseError> {
    DeviceRef::parse(token).map_err(|error| {
        let kind = match error {
            RefParseError::UnknownClass => ErrorKind::UnknownDevice,
            RefParseError::BadHead => ErrorKind::BadNumber,
            RefParseError::OutOfRange => ErrorKind::AddressOutOfRange,
        };
        ParseError::new(line, token, kind)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ladder_engine::{Instruction as I, Operand as Op};

    fn device(class: DeviceClass, head: u32) -> DeviceRef {
        DeviceRef::new(class, head)
    }

    #[test]
    fn parses_self_holding_rung() {
        let source = "\
; start/stop latch
NETWORK 1
COMMENT motor control
LD X0
OR Y0
ANI X1
OUT Y0
END
";
        let program = parse(source).unwrap();
        assert_eq!(
            program.instructions(),
            &[
                I::Ld(device(DeviceClass::X, 0)),
                I::Or(device(DeviceClass::Y, 0)),
                I::Ani(device(DeviceClass::X, 1)),
                I::Out(device(DeviceClass::Y, 0)),
                I::End,
            ]
        );
    }

    #[test]
    fn parses_timer_and_counter_coils() {
        let program = parse("LD X0\nOUT T0 K10\nLD X1\nOUT C2 K5\nLD X2\nRST T0\nRST C2\nEND\n")
            .unwrap();
        assert_eq!(
            program.instructions(),
            &[
                I::Ld(device(DeviceClass::X, 0)),
                I::OutTimer { timer: 0, preset: 10 },
                I::Ld(device(DeviceClass::X, 1)),
                I::OutCounter { counter: 2, preset: 5 },
                I::Ld(device(DeviceClass::X, 2)),
                I::RstTimer(0),
                I::RstCounter(2),
                I::End,
            ]
        );
    }

    #[test]
    fn parses_data_instructions() {
        let program =
            parse("LD SM400\nMOV K100 D0\nADD D0 K23 D1\nDIV D1 H10 D2\nEND\n").unwrap();
        assert_eq!(
            program.instructions(),
            &[
                I::Ld(device(DeviceClass::Sm, 400)),
                I::Mov {
                    src: Op::Const(100),
                    dst: device(DeviceClass::D, 0),
                },
                I::Add {
                    a: Op::Device(device(DeviceClass::D, 0)),
                    b: Op::Const(23),
                    dst: device(DeviceClass::D, 1),
                },
                I::Div {
                    a: Op::Device(device(DeviceClass::D, 1)),
                    b: Op::Const(0x10),
                    dst: device(DeviceClass::D, 2),
                },
                I::End,
            ]
        );
    }

    #[test]
    fn hex_classes_parse_hex_heads() {
        let program = parse("LD X1F\nOUT Y0A\nEND\n").unwrap();
        assert_eq!(
            program.instructions()[0],
            I::Ld(device(DeviceClass::X, 0x1F))
        );
        assert_eq!(
            program.instructions()[1],
            I::Out(device(DeviceClass::Y, 0x0A))
        );
    }

    #[test]
    fn hex_head_may_start_with_a_letter() {
        let program = parse("LD XFF\nEND\n").unwrap();
        assert_eq!(
            program.instructions()[0],
            I::Ld(device(DeviceClass::X, 0xFF))
        );
    }

    #[test]
    fn two_letter_classes_win_over_pseudo_classes() {
        // TC3 is the timer contact device, not timer pseudo-class T.
        let program = parse("LD TC3\nOUT Y0\nLD X0\nRST TC3\nEND\n").unwrap();
        assert_eq!(
            program.instructions()[0],
            I::Ld(device(DeviceClass::Tc, 3))
        );
        assert_eq!(
            program.instructions()[3],
            I::Rst(device(DeviceClass::Tc, 3))
        );
    }

    #[test]
    fn negative_and_hex_constants() {
        let program = parse("LD X0\nMOV K-42 D0\nMOV HFFFF D1\nEND\n").unwrap();
        assert_eq!(
            program.instructions()[1],
            I::Mov {
                src: Op::Const(-42),
                dst: device(DeviceClass::D, 0),
            }
        );
        assert_eq!(
            program.instructions()[2],
            I::Mov {
                src: Op::Const(-1),
                dst: device(DeviceClass::D, 1),
            }
        );
    }

    #[test]
    fn zr_parses_decimal() {
        let program = parse("LD X0\nMOV ZR1000 D0\nEND\n").unwrap();
        assert_eq!(
            program.instructions()[1],
            I::Mov {
                src: Op::Device(device(DeviceClass::Zr, 1000)),
                dst: device(DeviceClass::D, 0),
            }
        );
    }

    #[test]
    fn unknown_mnemonic_reports_line() {
        let error = parse("LD X0\nFROB Y0\n").unwrap_err();
        assert_eq!(error.line, 2);
        assert_eq!(error.kind, ErrorKind::UnknownMnemonic);
        assert_eq!(error.token, "FROB");
    }

    #[test]
    fn constant_rejected_in_bit_context() {
        let error = parse("LD K1\n").unwrap_err();
        assert_eq!(error.kind, ErrorKind::ConstantInBitContext);
        assert_eq!(error.line, 1);
    }

    #[test]
    fn word_device_rejected_as_contact() {
        let error = parse("LD D0\n").unwrap_err();
        assert_eq!(error.kind, ErrorKind::BitDeviceExpected);
    }

    #[test]
    fn bit_device_rejected_in_word_context() {
        let error = parse("LD X0\nMOV M0 D0\n").unwrap_err();
        assert_eq!(error.kind, ErrorKind::WordDeviceExpected);
        assert_eq!(error.line, 2);
    }

    #[test]
    fn missing_operand_is_rejected() {
        let error = parse("LD\n").unwrap_err();
        assert_eq!(error.kind, ErrorKind::MissingOperand);
    }

    #[test]
    fn extra_operand_is_rejected() {
        let error = parse("LD X0 X1\n").unwrap_err();
        assert_eq!(error.kind, ErrorKind::ExtraOperand);
        assert_eq!(error.token, "X1");
    }

    #[test]
    fn out_of_range_head_is_rejected() {
        let error = parse("LD X0\nOUT Y2000\n").unwrap_err();
        assert_eq!(error.kind, ErrorKind::AddressOutOfRange);
        assert_eq!(error.line, 2);
    }

    #[test]
    fn out_of_range_timer_is_rejected() {
        let error = parse("LD X0\nOUT T2048 K1\n").unwrap_err();
        assert_eq!(error.kind, ErrorKind::AddressOutOfRange);
    }

    #[test]
    fn bad_network_number_is_rejected() {
        let error = parse("NETWORK one\n").unwrap_err();
        assert_eq!(error.kind, ErrorKind::BadNumber);
    }

    #[test]
    fn negative_preset_is_rejected() {
        let error = parse("LD X0\nOUT T0 K-1\n").unwrap_err();
        assert_eq!(error.kind, ErrorKind::BadNumber);
    }

    #[test]
    fn lowercase_source_is_accepted() {
        let program = parse("ld x0\nout y0\nend\n").unwrap();
        assert_eq!(
            program.instructions(),
            &[
                I::Ld(device(DeviceClass::X, 0)),
                I::Out(device(DeviceClass::Y, 0)),
                I::End,
            ]
        );
    }

    #[test]
    fn error_display_carries_position_and_token() {
        let error = parse("LD X0\nADD D0 D1\n").unwrap_err();
        assert_eq!(error.to_string(), "line 2: missing operand ''");
    }
}
