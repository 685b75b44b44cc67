use std::{fmt, str::FromStr};
use thiserror::Error;

pub const WORD_BITS: u8 = 16;
pub const WORD_BYTES: usize = 2;

#[derive(Debug, Error, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OpcodeError {
    #[error("bit range {0}:{1} out of bounds, must satisfy 15 >= start >= end")]
    BitRangeOutOfBounds(u8, u8),
    #[error("bit range {0:?} is not of the form \"start:end\" or \"bit\"")]
    BitRangeSyntax(String),
    #[error("opcode pattern {0:?} is not a binary string of 1 to 16 digits")]
    InvalidPattern(String),
}

pub type Result<T> = std::result::Result<T, OpcodeError>;

pub fn extract(word: u16, start: u8, end: u8) -> u32 {
    debug_assert!(start >= end && start < WORD_BITS);
    let mask = ((1u32 << (start - end + 1)) - 1) << end;
    (u32::from(word) & mask) >> end
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BitRange {
    start: u8,
    end: u8,
}

impl BitRange {
    pub fn new(start: u8, end: u8) -> Result<Self> {
        if start < end || start >= WORD_BITS {
            return Err(OpcodeError::BitRangeOutOfBounds(start, end));
        }
        Ok(Self { start, end })
    }

    pub fn single(bit: u8) -> Result<Self> {
        Self::new(bit, bit)
    }

    pub fn start(&self) -> u8 {
        self.start
    }

    pub fn end(&self) -> u8 {
        self.end
    }

    pub fn width(&self) -> u8 {
        self.start - self.end + 1
    }

    pub fn extract(&self, opcode: Opcode16) -> u32 {
        extract(opcode.value(), self.start, self.end)
    }
}

impl FromStr for BitRange {
    type Err = OpcodeError;

    fn from_str(s: &str) -> Result<Self> {
        let parse = |part: &str| {
            part.trim()
                .parse::<u8>()
                .map_err(|_| OpcodeError::BitRangeSyntax(s.to_owned()))
        };
        match s.split_once(':') {
            Some((start, end)) => Self::new(parse(start)?, parse(end)?),
            None => Self::single(parse(s)?),
        }
    }
}

impl fmt::Debug for BitRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "[{}]", self.start)
        } else {
            write!(f, "[{}:{}]", self.start, self.end)
        }
    }
}

#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Opcode16 {
    value: u16,
}

impl Opcode16 {
    pub const fn new(value: u16) -> Self {
        Self { value }
    }

    /// Reads the first word of `bytes`, or `None` when fewer than two bytes remain.
    pub fn from_le_bytes(bytes: &[u8]) -> Option<Self> {
        let word: [u8; WORD_BYTES] = bytes.get(..WORD_BYTES)?.try_into().ok()?;
        Some(Self::new(u16::from_le_bytes(word)))
    }

    pub fn value(&self) -> u16 {
        self.value
    }

    pub fn bits(&self, range: BitRange) -> u32 {
        range.extract(*self)
    }
}

impl fmt::Debug for Opcode16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("0x{:04X}", self.value))
    }
}

impl From<u16> for Opcode16 {
    fn from(value: u16) -> Self {
        Self::new(value)
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct OpcodePattern {
    text: String,
    value: u16,
}

impl OpcodePattern {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn value(&self) -> u16 {
        self.value
    }

    pub fn matches(&self, opcode: Opcode16) -> bool {
        let end = WORD_BITS - self.len() as u8;
        extract(opcode.value(), WORD_BITS - 1, end) == u32::from(self.value)
    }
}

impl FromStr for OpcodePattern {
    type Err = OpcodeError;

    fn from_str(s: &str) -> Result<Self> {
        let is_binary = s.bytes().all(|b| b == b'0' || b == b'1');
        if s.is_empty() || s.len() > WORD_BITS as usize || !is_binary {
            return Err(OpcodeError::InvalidPattern(s.to_owned()));
        }
        let value =
            u16::from_str_radix(s, 2).map_err(|_| OpcodeError::InvalidPattern(s.to_owned()))?;
        Ok(Self {
            text: s.to_owned(),
            value,
        })
    }
}

impl fmt::Debug for OpcodePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{}/{}", self.text, self.len()))
    }
}

impl fmt::Display for OpcodePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
