//! Device classes: the named, typed address spaces of the simulated PLC.
//!
//! Sizes follow a Q-series CPU with default parameters. Bit classes hold
//! booleans, word classes hold 16-bit unsigned values. `X`/`Y` and the
//! link relays/registers (`B`/`W`, `SB`/`SW`) use hexadecimal head
//! numbers in textual addresses; everything else is decimal.

use std::fmt;

/// Storage width of a device class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    /// Single-bit devices (relays, contacts).
    Bit,
    /// 16-bit unsigned word devices (registers, current values).
    Word,
}

/// A MELSEC device class.
///
/// Timer and counter classes are split the way the protocol addresses
/// them: `TC`/`TS` are the timer contact and coil (bit), `TN` the timer
/// current value (word); `CC`/`CS`/`CN` are the counter equivalents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    /// Input relay (bit, hex).
    X,
    /// Output relay (bit, hex).
    Y,
    /// Internal relay (bit).
    M,
    /// Latch relay (bit).
    L,
    /// Link relay (bit, hex).
    B,
    /// Annunciator (bit).
    F,
    /// Edge relay (bit).
    V,
    /// Step relay (bit).
    S,
    /// Special relay (bit).
    Sm,
    /// Special link relay (bit, hex).
    Sb,
    /// Timer contact (bit).
    Tc,
    /// Timer coil (bit).
    Ts,
    /// Counter contact (bit).
    Cc,
    /// Counter coil (bit).
    Cs,
    /// Data register (word).
    D,
    /// Link register (word, hex).
    W,
    /// File register (word).
    R,
    /// Serial-number file register (word).
    Zr,
    /// Timer current value (word).
    Tn,
    /// Counter current value (word).
    Cn,
    /// Special register (word).
    Sd,
    /// Special link register (word, hex).
    Sw,
    /// Index register (word).
    Z,
}

impl DeviceClass {
    /// Every device class, in bank order.
    pub const ALL: [Self; 23] = [
        Self::X,
        Self::Y,
        Self::M,
        Self::L,
        Self::B,
        Self::F,
        Self::V,
        Self::S,
        Self::Sm,
        Self::Sb,
        Self::Tc,
        Self::Ts,
        Self::Cc,
        Self::Cs,
        Self::D,
        Self::W,
        Self::R,
        Self::Zr,
        Self::Tn,
        Self::Cn,
        Self::Sd,
        Self::Sw,
        Self::Z,
    ];

    /// Storage width of this class.
    #[must_use]
    pub const fn width(self) -> Width {
        match self {
            Self::X
            | Self::Y
            | Self::M
            | Self::L
            | Self::B
            | Self::F
            | Self::V
            | Self::S
            | Self::Sm
            | Self::Sb
            | Self::Tc
            | Self::Ts
            | Self::Cc
            | Self::Cs => Width::Bit,
            Self::D
            | Self::W
            | Self::R
            | Self::Zr
            | Self::Tn
            | Self::Cn
            | Self::Sd
            | Self::Sw
            | Self::Z => Width::Word,
        }
    }

    /// True for bit-width classes.
    #[must_use]
    pub const fn is_bit(self) -> bool {
        matches!(self.width(), Width::Bit)
    }

    /// Number of addressable points (valid heads are `0..size()`).
    #[must_use]
    pub const fn size(self) -> u32 {
        match self {
            Self::X | Self::Y | Self::B | Self::W => 0x2000,
            Self::M | Self::L | Self::S => 8192,
            Self::F | Self::V | Self::Sm | Self::Sd => 2048,
            Self::Sb | Self::Sw => 0x800,
            Self::Tc | Self::Ts | Self::Tn => 2048,
            Self::Cc | Self::Cs | Self::Cn => 1024,
            Self::D => 12288,
            Self::R => 32768,
            Self::Zr => 65536,
            Self::Z => 20,
        }
    }

    /// True when textual head numbers for this class are hexadecimal.
    #[must_use]
    pub const fn is_hex(self) -> bool {
        matches!(
            self,
            Self::X | Self::Y | Self::B | Self::W | Self::Sb | Self::Sw
        )
    }

    /// The textual symbol (`"M"`, `"TC"`, `"ZR"`, ...).
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::X => "X",
            Self::Y => "Y",
            Self::M => "M",
            Self::L => "L",
            Self::B => "B",
            Self::F => "F",
            Self::V => "V",
            Self::S => "S",
            Self::Sm => "SM",
            Self::Sb => "SB",
            Self::Tc => "TC",
            Self::Ts => "TS",
            Self::Cc => "CC",
            Self::Cs => "CS",
            Self::D => "D",
            Self::W => "W",
            Self::R => "R",
            Self::Zr => "ZR",
            Self::Tn => "TN",
            Self::Cn => "CN",
            Self::Sd => "SD",
            Self::Sw => "SW",
            Self::Z => "Z",
        }
    }

    /// Look up a class by its textual symbol (case-sensitive, uppercase).
    #[must_use]
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.symbol() == symbol)
    }

    /// The word class whose current value is paired with this contact/coil
    /// class: `TC`/`TS` → `TN`, `CC`/`CS` → `CN`.
    #[must_use]
    pub const fn paired_current(self) -> Option<Self> {
        match self {
            Self::Tc | Self::Ts => Some(Self::Tn),
            Self::Cc | Self::Cs => Some(Self::Cn),
            _ => None,
        }
    }

    /// Bank index for per-class storage.
    #[must_use]
    pub(crate) fn index(self) -> usize {
        Self::ALL
            .iter()
            .position(|c| *c == self)
            .unwrap_or_default()
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A reference to a single device: class plus head number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceRef {
    /// Device class.
    pub class: DeviceClass,
    /// Head (starting address) within the class.
    pub head: u32,
}

impl DeviceRef {
    /// Create a device reference.
    #[must_use]
    pub const fn new(class: DeviceClass, head: u32) -> Self {
        Self { class, head }
    }
}

impl fmt::Display for DeviceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.class.is_hex() {
            write!(f, "{}{:X}", self.class, self.head)
        } else {
            write!(f, "{}{}", self.class, self.head)
        }
    }
}

/// Errors from parsing a textual device reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefParseError {
    /// No device class matches the symbol prefix.
    UnknownClass,
    /// The head number failed to parse in the class's radix.
    BadHead,
    /// The head number is beyond the class's address space.
    OutOfRange,
}

impl fmt::Display for RefParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UnknownClass => "unknown device class",
            Self::BadHead => "bad head number",
            Self::OutOfRange => "head number out of range",
        })
    }
}

impl std::error::Error for RefParseError {}

impl DeviceRef {
    /// Parse a textual reference like `X1F`, `M100`, `TC3` or `ZR1000`.
    ///
    /// The longest matching class symbol wins (`SB1` is `SB` head 1, not
    /// `S` head 0xB1) and the head is read in the class's radix, so hex
    /// heads may start with a letter (`XFF`).
    pub fn parse(text: &str) -> Result<Self, RefParseError> {
        let upper = text.trim().to_ascii_uppercase();
        let (symbol_len, class) =
            if let Some(class) = upper.get(..2).and_then(DeviceClass::from_symbol) {
                (2, class)
            } else if let Some(class) = upper.get(..1).and_then(DeviceClass::from_symbol) {
                (1, class)
            } else {
                return Err(RefParseError::UnknownClass);
            };
        let digits = &upper[symbol_len..];
        if digits.is_empty() {
            return Err(RefParseError::UnknownClass);
        }
        let radix = if class.is_hex() { 16 } else { 10 };
        let head = u32::from_str_radix(digits, radix).map_err(|_| RefParseError::BadHead)?;
        if head >= class.size() {
            return Err(RefParseError::OutOfRange);
        }
        Ok(Self { class, head })
    }
}

impl std::str::FromStr for DeviceRef {
    type Err = RefParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::parse(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_split_bit_and_word() {
        assert_eq!(DeviceClass::M.width(), Width::Bit);
        assert_eq!(DeviceClass::D.width(), Width::Word);
        assert!(DeviceClass::Tc.is_bit());
        assert!(!DeviceClass::Tn.is_bit());
    }

    #[test]
    fn symbols_round_trip() {
        for class in DeviceClass::ALL {
            assert_eq!(DeviceClass::from_symbol(class.symbol()), Some(class));
        }
        assert_eq!(DeviceClass::from_symbol("Q"), None);
    }

    #[test]
    fn hex_classes() {
        assert!(DeviceClass::X.is_hex());
        assert!(DeviceClass::Y.is_hex());
        assert!(DeviceClass::W.is_hex());
        assert!(!DeviceClass::D.is_hex());
        assert!(!DeviceClass::Zr.is_hex());
    }

    #[test]
    fn timer_counter_pairing() {
        assert_eq!(DeviceClass::Tc.paired_current(), Some(DeviceClass::Tn));
        assert_eq!(DeviceClass::Ts.paired_current(), Some(DeviceClass::Tn));
        assert_eq!(DeviceClass::Cc.paired_current(), Some(DeviceClass::Cn));
        assert_eq!(DeviceClass::M.paired_current(), None);
    }

    #[test]
    fn display_uses_class_radix() {
        assert_eq!(DeviceRef::new(DeviceClass::X, 0x1F).to_string(), "X1F");
        assert_eq!(DeviceRef::new(DeviceClass::D, 100).to_string(), "D100");
    }

    #[test]
    fn parse_textual_references() {
        assert_eq!(
            DeviceRef::parse("X1F").unwrap(),
            DeviceRef::new(DeviceClass::X, 0x1F)
        );
        assert_eq!(
            DeviceRef::parse("XFF").unwrap(),
            DeviceRef::new(DeviceClass::X, 0xFF)
        );
        assert_eq!(
            DeviceRef::parse("M100").unwrap(),
            DeviceRef::new(DeviceClass::M, 100)
        );
        assert_eq!(
            DeviceRef::parse("TC3").unwrap(),
            DeviceRef::new(DeviceClass::Tc, 3)
        );
        assert_eq!(
            DeviceRef::parse("SB1").unwrap(),
            DeviceRef::new(DeviceClass::Sb, 1)
        );
        assert_eq!(
            DeviceRef::parse("ZR1000").unwrap(),
            DeviceRef::new(DeviceClass::Zr, 1000)
        );
    }

    #[test]
    fn parse_rejects_bad_references() {
        assert_eq!(DeviceRef::parse("Q5"), Err(RefParseError::UnknownClass));
        assert_eq!(DeviceRef::parse("M"), Err(RefParseError::UnknownClass));
        assert_eq!(DeviceRef::parse("D1A"), Err(RefParseError::BadHead));
        assert_eq!(DeviceRef::parse("Z99"), Err(RefParseError::OutOfRange));
    }

    #[test]
    fn bank_indices_are_unique() {
        for (i, class) in DeviceClass::ALL.iter().enumerate() {
            assert_eq!(class.index(), i);
        }
    }
}
