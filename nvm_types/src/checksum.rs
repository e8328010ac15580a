//! CRC-16 checksum service
//!
//! All NvM components use CRC-16/CCITT-FALSE:
//! polynomial `0x1021`, initial value `0xFFFF`, no input/output reflection,
//! no final XOR. The value is carried as [`Checksum`] so it cannot be mixed up
//! with lengths or offsets, and it renders as fixed-width hex (`0x29B1`).

use crc::{Crc, CRC_16_IBM_3740};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// CRC-16/CCITT-FALSE, catalogued as CRC-16/IBM-3740
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Computes the CRC-16/CCITT-FALSE checksum of `data`
pub fn crc16(data: &[u8]) -> Checksum {
    Checksum(CRC16.checksum(data))
}

/// A 16-bit integrity code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Checksum(u16);

impl Checksum {
    /// Wraps a raw 16-bit value
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// Returns the raw 16-bit value
    pub const fn as_u16(&self) -> u16 {
        self.0
    }

    /// Returns true if `data` hashes to this checksum
    pub fn matches(&self, data: &[u8]) -> bool {
        crc16(data) == *self
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// Error parsing a rendered checksum
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChecksumParseError {
    #[error("checksum must start with 0x: {0}")]
    MissingPrefix(String),

    #[error("checksum must have exactly 4 hex digits: {0}")]
    InvalidWidth(String),

    #[error("invalid hex digits in checksum: {0}")]
    InvalidDigits(String),
}

impl FromStr for Checksum {
    type Err = ChecksumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| ChecksumParseError::MissingPrefix(s.to_string()))?;
        if digits.len() != 4 {
            return Err(ChecksumParseError::InvalidWidth(s.to_string()));
        }
        u16::from_str_radix(digits, 16)
            .map(Checksum)
            .map_err(|_| ChecksumParseError::InvalidDigits(s.to_string()))
    }
}

impl Serialize for Checksum {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Checksum {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
